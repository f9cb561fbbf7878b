//! Frame Data and Swapchain Coordination
//!
//! Owns the per-frame-in-flight command encoders, fences and semaphores,
//! and drives one frame end to end: fence wait, swapchain acquire, command
//! recording (allocator flush + graph execute), blit of the designated
//! final image onto the swapchain image, overlay, submit and present.
//!
//! CPU/GPU asynchrony is bounded by [`FRAMES_IN_FLIGHT`]: the per-frame
//! fence guarantees a frame slot is never recycled while its GPU work is
//! still running. An out-of-date swapchain is a non-fatal resize signal —
//! the frame is dropped and the swapchain (plus every window-relative
//! graph resource) is rebuilt before the next acquire.

use std::sync::Arc;

use log::info;

use crate::errors::{EmberError, Result};
use crate::gpu::{
    AccessFlags, BlitRegion, CommandEncoder, Dependency, Extent2d, FenceHandle, Filter, Gpu,
    ImageAspectFlags, ImageBarrier, ImageHandle, ImageLayout, PipelineStageFlags, SemaphoreHandle,
};
use crate::graph::FrameGraph;
use crate::resources::{ResourceAllocator, ResourceHandle, ResourceState};
use crate::window::WindowSource;

/// Number of independently recorded frames in flight.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Draws on top of the swapchain image between blit and present (UI
/// overlay). The image is in color-attachment layout when called.
pub trait OverlayRenderer {
    fn draw(&mut self, cmd: &mut dyn CommandEncoder, target: ImageHandle, extent: Extent2d);
}

struct FrameInFlight {
    encoder: Box<dyn CommandEncoder>,
    fence: FenceHandle,
    acquire_semaphore: SemaphoreHandle,
    render_semaphore: SemaphoreHandle,
}

pub struct FrameData {
    gpu: Arc<dyn Gpu>,
    window: Arc<dyn WindowSource>,
    frames: Vec<FrameInFlight>,
    frame_counter: u64,
    resize_requested: bool,
}

impl FrameData {
    pub fn new(gpu: Arc<dyn Gpu>, window: Arc<dyn WindowSource>) -> Result<Self> {
        let mut frames = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for slot in 0..FRAMES_IN_FLIGHT {
            frames.push(FrameInFlight {
                encoder: gpu.create_command_encoder(&format!("frame_{slot}"))?,
                fence: gpu.create_fence(true)?,
                acquire_semaphore: gpu.create_semaphore()?,
                render_semaphore: gpu.create_semaphore()?,
            });
        }
        Ok(Self {
            gpu,
            window,
            frames,
            frame_counter: 0,
            resize_requested: false,
        })
    }

    /// Flags the swapchain for a rebuild before the next acquire.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Frames completed so far.
    #[must_use]
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Records, submits and presents one frame.
    ///
    /// `final_image` names the graph image blitted onto the swapchain.
    /// Returns `Ok(())` when the frame was dropped due to a stale
    /// swapchain; the next call rebuilds and resumes.
    pub fn render_frame(
        &mut self,
        allocator: &ResourceAllocator,
        graph: &mut FrameGraph,
        final_image: ResourceHandle,
        vsync: bool,
        mut overlay: Option<&mut dyn OverlayRenderer>,
    ) -> Result<()> {
        let slot = (self.frame_counter % FRAMES_IN_FLIGHT as u64) as usize;

        // 1. Wait until this slot's previous GPU work has finished.
        let fence = self.frames[slot].fence;
        self.gpu.wait_for_fence(fence, u64::MAX)?;

        // 2. Rebuild the swapchain if a previous acquire/present went stale.
        if self.resize_requested {
            self.rebuild_swapchain(graph, vsync)?;
            if self.resize_requested {
                // Window has no drawable area yet; stay parked.
                return Ok(());
            }
        }

        let acquire_semaphore = self.frames[slot].acquire_semaphore;
        let acquired = match self.gpu.acquire_next_image(acquire_semaphore) {
            Ok(acquired) => acquired,
            Err(EmberError::SwapchainStale) => {
                self.resize_requested = true;
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        self.gpu.reset_fence(fence)?;

        // 3. Record the frame.
        let frame = &mut self.frames[slot];
        let cmd = frame.encoder.as_mut();
        cmd.reset()?;
        cmd.begin()?;

        allocator.flush(cmd);
        graph.execute(cmd)?;

        // 4. Blit the final image onto the swapchain image and hand the
        //    swapchain image to the overlay.
        let final_instance = graph.registry().image(final_image);
        let final_state = final_instance.state();
        cmd.pipeline_barrier(&transition(
            final_instance.image(),
            final_instance.aspect(),
            final_state.layout,
            ImageLayout::TransferSrcOptimal,
            (final_state.stage, final_state.access),
            (PipelineStageFlags::TRANSFER, AccessFlags::TRANSFER_READ),
        ));
        final_instance.set_state(ResourceState {
            layout: ImageLayout::TransferSrcOptimal,
            access: AccessFlags::TRANSFER_READ,
            stage: PipelineStageFlags::TRANSFER,
        });
        cmd.pipeline_barrier(&transition(
            acquired.image,
            ImageAspectFlags::COLOR,
            ImageLayout::Undefined,
            ImageLayout::TransferDstOptimal,
            (PipelineStageFlags::TOP_OF_PIPE, AccessFlags::empty()),
            (PipelineStageFlags::TRANSFER, AccessFlags::TRANSFER_WRITE),
        ));
        cmd.blit_image(&BlitRegion {
            src: final_instance.image(),
            src_layout: ImageLayout::TransferSrcOptimal,
            src_extent: final_instance.extent(),
            dst: acquired.image,
            dst_layout: ImageLayout::TransferDstOptimal,
            dst_extent: acquired.extent.into(),
            filter: Filter::Linear,
        });

        cmd.pipeline_barrier(&transition(
            acquired.image,
            ImageAspectFlags::COLOR,
            ImageLayout::TransferDstOptimal,
            ImageLayout::ColorAttachmentOptimal,
            (PipelineStageFlags::TRANSFER, AccessFlags::TRANSFER_WRITE),
            (
                PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
        ));
        if let Some(overlay) = overlay.as_mut() {
            overlay.draw(cmd, acquired.image, acquired.extent);
        }
        cmd.pipeline_barrier(&transition(
            acquired.image,
            ImageAspectFlags::COLOR,
            ImageLayout::ColorAttachmentOptimal,
            ImageLayout::PresentSrc,
            (
                PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                AccessFlags::COLOR_ATTACHMENT_WRITE,
            ),
            (PipelineStageFlags::BOTTOM_OF_PIPE, AccessFlags::empty()),
        ));
        cmd.end()?;

        // 5. Submit and present.
        let render_semaphore = frame.render_semaphore;
        self.gpu
            .submit(frame.encoder.as_mut(), acquire_semaphore, render_semaphore, fence)?;
        match self.gpu.present(acquired.index, render_semaphore) {
            Ok(()) => {}
            Err(EmberError::SwapchainStale) => self.resize_requested = true,
            Err(err) => return Err(err),
        }

        self.frame_counter += 1;
        Ok(())
    }

    fn rebuild_swapchain(&mut self, graph: &mut FrameGraph, vsync: bool) -> Result<()> {
        self.gpu.device_wait_idle();
        self.window.update_window_size();
        let extent = self.window.extent();
        if extent.width == 0 || extent.height == 0 {
            // Minimized; keep the resize pending and skip frames.
            return Ok(());
        }
        info!(
            "frame: rebuilding swapchain at {}x{}",
            extent.width, extent.height
        );
        self.gpu.recreate_swapchain(extent, vsync)?;
        graph.rebuild_relative_resources()?;
        self.resize_requested = false;
        Ok(())
    }

    /// Destroys fences and semaphores. Call with the device idle.
    pub fn destroy(&mut self) {
        for frame in &self.frames {
            self.gpu.destroy_fence(frame.fence);
            self.gpu.destroy_semaphore(frame.acquire_semaphore);
            self.gpu.destroy_semaphore(frame.render_semaphore);
        }
        self.frames.clear();
    }
}

fn transition(
    image: ImageHandle,
    aspect: ImageAspectFlags,
    old_layout: ImageLayout,
    new_layout: ImageLayout,
    src: (PipelineStageFlags, AccessFlags),
    dst: (PipelineStageFlags, AccessFlags),
) -> Dependency {
    let mut dep = Dependency::new();
    dep.images.push(ImageBarrier {
        image,
        old_layout,
        new_layout,
        aspect,
        src_stage: src.0,
        src_access: src.1,
        dst_stage: dst.0,
        dst_access: dst.1,
    });
    dep
}

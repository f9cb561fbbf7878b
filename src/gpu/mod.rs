//! GPU Facade
//!
//! The engine core does not talk to a concrete GPU API. Everything it
//! needs from the device is expressed through the [`Gpu`] trait and the
//! [`CommandEncoder`] recording trait, over the dialect-neutral value
//! vocabulary in [`types`].
//!
//! A host embeds the engine by implementing [`Gpu`] against its backend
//! (the handle types map one-to-one onto explicit-API objects). The test
//! suite implements it with a recording mock, which is what makes barrier
//! sequences and command order directly assertable.

pub mod barrier;
pub mod encoder;
pub mod types;

pub use barrier::{BufferBarrier, Dependency, ImageBarrier, MemoryBarrier};
pub use encoder::{
    BlitRegion, ColorAttachmentInfo, CommandEncoder, DepthAttachmentInfo, LoadOp, RenderingInfo,
};
pub use types::*;

use crate::errors::Result;

/// One acquired swapchain image.
#[derive(Clone, Copy, Debug)]
pub struct AcquiredImage {
    /// Index to pass back to [`Gpu::present`].
    pub index: u32,
    /// The swapchain image; not owned by the engine.
    pub image: ImageHandle,
    /// Current swapchain extent.
    pub extent: Extent2d,
}

/// Device-level facade consumed by the engine core.
///
/// Implementations must be internally synchronized for creation calls
/// (`Send + Sync`); command recording itself is single-threaded on the
/// render thread.
pub trait Gpu: Send + Sync {
    // ------------------------------------------------------------------
    // Resource creation / destruction
    // ------------------------------------------------------------------

    fn create_image(&self, desc: &ImageDesc<'_>) -> Result<AllocatedImage>;
    fn destroy_image(&self, image: AllocatedImage);

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<AllocatedBuffer>;
    fn destroy_buffer(&self, buffer: BufferHandle);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle>;
    fn destroy_sampler(&self, sampler: SamplerHandle);

    fn create_shader_module(&self, name: &str, code: &[u8]) -> Result<ShaderModuleHandle>;
    fn destroy_shader_module(&self, module: ShaderModuleHandle);

    fn create_set_layout(&self, bindings: &[DescriptorSetLayoutBinding]) -> Result<SetLayoutHandle>;
    fn destroy_set_layout(&self, layout: SetLayoutHandle);

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc<'_>) -> Result<PipelineLayoutHandle>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineHandle>;
    fn create_compute_pipeline(&self, desc: &ComputePipelineDesc<'_>) -> Result<PipelineHandle>;
    fn destroy_pipeline(&self, pipeline: PipelineHandle);

    // ------------------------------------------------------------------
    // Host-visible memory
    // ------------------------------------------------------------------

    /// Writes `data` into a host-visible buffer at `offset`.
    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()>;

    // ------------------------------------------------------------------
    // Descriptor buffers
    // ------------------------------------------------------------------

    /// Size in bytes of one descriptor record of the given type.
    fn descriptor_size(&self, descriptor_type: DescriptorType) -> u64;

    /// Required alignment of per-set offsets within a descriptor buffer.
    fn descriptor_buffer_offset_alignment(&self) -> u64;

    /// Writes one descriptor record into a host-visible descriptor buffer.
    fn write_descriptor(
        &self,
        buffer: BufferHandle,
        offset: u64,
        write: &DescriptorWrite,
    ) -> Result<()>;

    // ------------------------------------------------------------------
    // Synchronization primitives
    // ------------------------------------------------------------------

    fn create_fence(&self, signaled: bool) -> Result<FenceHandle>;
    fn destroy_fence(&self, fence: FenceHandle);
    fn wait_for_fence(&self, fence: FenceHandle, timeout_ns: u64) -> Result<()>;
    fn reset_fence(&self, fence: FenceHandle) -> Result<()>;

    fn create_semaphore(&self) -> Result<SemaphoreHandle>;
    fn destroy_semaphore(&self, semaphore: SemaphoreHandle);

    // ------------------------------------------------------------------
    // Command submission
    // ------------------------------------------------------------------

    /// Creates a primary command encoder on the graphics queue family.
    fn create_command_encoder(&self, name: &str) -> Result<Box<dyn CommandEncoder>>;

    /// Submits a finished encoder to the graphics queue.
    fn submit(
        &self,
        encoder: &mut dyn CommandEncoder,
        wait: SemaphoreHandle,
        signal: SemaphoreHandle,
        fence: FenceHandle,
    ) -> Result<()>;

    /// Records and submits a one-shot command stream, blocking until the
    /// GPU has finished executing it.
    fn immediate_submit(
        &self,
        record: &mut dyn FnMut(&mut dyn CommandEncoder) -> Result<()>,
    ) -> Result<()>;

    /// Blocks until the device is idle. Used before swapchain teardown.
    fn device_wait_idle(&self);

    // ------------------------------------------------------------------
    // Swapchain
    // ------------------------------------------------------------------

    /// Acquires the next swapchain image, signaling `semaphore` when it is
    /// ready. Returns [`EmberError::SwapchainStale`](crate::EmberError) when
    /// the swapchain no longer matches the surface.
    fn acquire_next_image(&self, semaphore: SemaphoreHandle) -> Result<AcquiredImage>;

    /// Presents a previously acquired image after `wait` has signaled.
    fn present(&self, image_index: u32, wait: SemaphoreHandle) -> Result<()>;

    /// Rebuilds the swapchain at a new extent. `vsync` selects FIFO versus
    /// immediate presentation.
    fn recreate_swapchain(&self, extent: Extent2d, vsync: bool) -> Result<()>;

    fn swapchain_format(&self) -> Format;
    fn swapchain_extent(&self) -> Extent2d;

    // ------------------------------------------------------------------
    // Debugging
    // ------------------------------------------------------------------

    /// Attaches a human-readable name to a backend object.
    fn set_debug_name(&self, name: &str, handle: u64);
}

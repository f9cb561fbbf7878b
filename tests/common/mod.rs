//! Shared test backend: a recording mock of the GPU facade.
//!
//! `MockGpu` hands out sequential handles and records every device-level
//! call; `MockEncoder` records every command. Both append to one shared
//! log so tests can assert on the exact command and barrier sequences a
//! graph produces.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use ember::errors::{EmberError, Result};
use ember::gpu::{
    AcquiredImage, AllocatedBuffer, AllocatedImage, BindPoint, BlitRegion,
    BufferDesc, BufferHandle, CommandEncoder, ComputePipelineDesc, Dependency,
    DescriptorBufferBindingInfo, DescriptorSetLayoutBinding, DescriptorType, DescriptorWrite,
    Extent2d, Extent3d, FenceHandle, Format, Gpu, GraphicsPipelineDesc, ImageAspectFlags,
    ImageDesc, ImageHandle, ImageLayout, PipelineHandle, PipelineLayoutDesc, PipelineLayoutHandle,
    Rect2d, SamplerDesc, SamplerHandle, SemaphoreHandle, SetLayoutHandle, ShaderModuleHandle,
    ShaderStageFlags, Viewport,
};
use ember::graph::passes::{ExecuteContext, RenderPass, ResourceBinding};
use ember::resources::{ResourceHandle, ResourceUsage};
use ember::window::WindowSource;

// ============================================================================
// Recorded commands
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Begin,
    End,
    Reset,
    PipelineBarrier(Dependency),
    BeginRendering {
        color_count: usize,
        has_depth: bool,
        area: Extent2d,
    },
    EndRendering,
    SetViewport(Viewport),
    SetScissor(Rect2d),
    BindPipeline(BindPoint, PipelineHandle),
    BindDescriptorBuffers(Vec<DescriptorBufferBindingInfo>),
    SetDescriptorOffsets {
        first_set: u32,
    },
    PushConstants(Vec<u8>),
    Draw {
        vertex_count: u32,
    },
    DrawMeshTasksIndirectCount {
        buffer: BufferHandle,
        count_buffer: BufferHandle,
        max_draw_count: u32,
    },
    Dispatch(u32, u32, u32),
    ClearColorImage(ImageHandle, [f32; 4]),
    ClearDepthImage(ImageHandle, f32),
    CopyBufferToImage {
        src: BufferHandle,
        dst: ImageHandle,
    },
    Blit(BlitRegion),
    BeginLabel(String),
    EndLabel,
    Submit,
    Present(u32),
    WriteDescriptor(BufferHandle, u64, DescriptorWrite),
    WriteBuffer(BufferHandle, u64, usize),
}

pub type CommandLog = Arc<Mutex<Vec<Recorded>>>;

// ============================================================================
// Mock encoder
// ============================================================================

pub struct MockEncoder {
    log: CommandLog,
}

impl MockEncoder {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_log(log: CommandLog) -> Self {
        Self { log }
    }

    pub fn commands(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    /// Every emitted pipeline-barrier dependency, in order.
    pub fn barriers(&self) -> Vec<Dependency> {
        self.log
            .lock()
            .iter()
            .filter_map(|command| match command {
                Recorded::PipelineBarrier(dep) => Some(dep.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    fn push(&self, command: Recorded) {
        self.log.lock().push(command);
    }
}

impl CommandEncoder for MockEncoder {
    fn begin(&mut self) -> Result<()> {
        self.push(Recorded::Begin);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.push(Recorded::End);
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.push(Recorded::Reset);
        Ok(())
    }

    fn pipeline_barrier(&mut self, dependency: &Dependency) {
        self.push(Recorded::PipelineBarrier(dependency.clone()));
    }

    fn begin_rendering(&mut self, info: &ember::gpu::RenderingInfo<'_>) {
        self.push(Recorded::BeginRendering {
            color_count: info.color_attachments.len(),
            has_depth: info.depth_attachment.is_some(),
            area: info.render_area,
        });
    }

    fn end_rendering(&mut self) {
        self.push(Recorded::EndRendering);
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.push(Recorded::SetViewport(viewport));
    }

    fn set_scissor(&mut self, scissor: Rect2d) {
        self.push(Recorded::SetScissor(scissor));
    }

    fn bind_pipeline(&mut self, bind_point: BindPoint, pipeline: PipelineHandle) {
        self.push(Recorded::BindPipeline(bind_point, pipeline));
    }

    fn bind_descriptor_buffers(&mut self, buffers: &[DescriptorBufferBindingInfo]) {
        self.push(Recorded::BindDescriptorBuffers(buffers.to_vec()));
    }

    fn set_descriptor_buffer_offsets(
        &mut self,
        _bind_point: BindPoint,
        _layout: PipelineLayoutHandle,
        first_set: u32,
        _buffer_indices: &[u32],
        _offsets: &[u64],
    ) {
        self.push(Recorded::SetDescriptorOffsets { first_set });
    }

    fn push_constants(
        &mut self,
        _layout: PipelineLayoutHandle,
        _stages: ShaderStageFlags,
        data: &[u8],
    ) {
        self.push(Recorded::PushConstants(data.to_vec()));
    }

    fn draw(
        &mut self,
        vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.push(Recorded::Draw { vertex_count });
    }

    fn draw_mesh_tasks_indirect_count(
        &mut self,
        buffer: BufferHandle,
        _offset: u64,
        count_buffer: BufferHandle,
        _count_offset: u64,
        max_draw_count: u32,
        _stride: u32,
    ) {
        self.push(Recorded::DrawMeshTasksIndirectCount {
            buffer,
            count_buffer,
            max_draw_count,
        });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.push(Recorded::Dispatch(x, y, z));
    }

    fn clear_color_image(&mut self, image: ImageHandle, _layout: ImageLayout, color: [f32; 4]) {
        self.push(Recorded::ClearColorImage(image, color));
    }

    fn clear_depth_image(
        &mut self,
        image: ImageHandle,
        _layout: ImageLayout,
        _aspect: ImageAspectFlags,
        depth: f32,
        _stencil: u32,
    ) {
        self.push(Recorded::ClearDepthImage(image, depth));
    }

    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        dst: ImageHandle,
        _dst_layout: ImageLayout,
        _extent: Extent3d,
    ) {
        self.push(Recorded::CopyBufferToImage { src, dst });
    }

    fn blit_image(&mut self, region: &BlitRegion) {
        self.push(Recorded::Blit(*region));
    }

    fn begin_label(&mut self, name: &str) {
        self.push(Recorded::BeginLabel(name.to_owned()));
    }

    fn end_label(&mut self) {
        self.push(Recorded::EndLabel);
    }
}

// ============================================================================
// Mock GPU
// ============================================================================

pub struct MockGpu {
    next_handle: AtomicU64,
    log: CommandLog,
    swapchain_extent: Mutex<Extent2d>,
    /// Remaining acquires that should report a stale swapchain.
    stale_acquires: Mutex<u32>,
}

impl MockGpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_handle: AtomicU64::new(1),
            log: Arc::new(Mutex::new(Vec::new())),
            swapchain_extent: Mutex::new(Extent2d::new(800, 600)),
            stale_acquires: Mutex::new(0),
        })
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }

    pub fn commands(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    pub fn make_stale(&self, count: u32) {
        *self.stale_acquires.lock() = count;
    }

    fn next(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Gpu for MockGpu {
    fn create_image(&self, _desc: &ImageDesc<'_>) -> Result<AllocatedImage> {
        Ok(AllocatedImage {
            image: ImageHandle(self.next()),
            view: ember::gpu::ImageViewHandle(self.next()),
        })
    }

    fn destroy_image(&self, _image: AllocatedImage) {}

    fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<AllocatedBuffer> {
        let handle = self.next();
        Ok(AllocatedBuffer {
            buffer: BufferHandle(handle),
            address: 0x1000_0000 + handle * 0x1_0000,
            host_visible: matches!(desc.memory, ember::gpu::MemoryUsage::CpuToGpu),
        })
    }

    fn destroy_buffer(&self, _buffer: BufferHandle) {}

    fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle> {
        Ok(SamplerHandle(self.next()))
    }

    fn destroy_sampler(&self, _sampler: SamplerHandle) {}

    fn create_shader_module(&self, _name: &str, _code: &[u8]) -> Result<ShaderModuleHandle> {
        Ok(ShaderModuleHandle(self.next()))
    }

    fn destroy_shader_module(&self, _module: ShaderModuleHandle) {}

    fn create_set_layout(
        &self,
        _bindings: &[DescriptorSetLayoutBinding],
    ) -> Result<SetLayoutHandle> {
        Ok(SetLayoutHandle(self.next()))
    }

    fn destroy_set_layout(&self, _layout: SetLayoutHandle) {}

    fn create_pipeline_layout(
        &self,
        _desc: &PipelineLayoutDesc<'_>,
    ) -> Result<PipelineLayoutHandle> {
        Ok(PipelineLayoutHandle(self.next()))
    }

    fn destroy_pipeline_layout(&self, _layout: PipelineLayoutHandle) {}

    fn create_graphics_pipeline(&self, _desc: &GraphicsPipelineDesc<'_>) -> Result<PipelineHandle> {
        Ok(PipelineHandle(self.next()))
    }

    fn create_compute_pipeline(&self, _desc: &ComputePipelineDesc<'_>) -> Result<PipelineHandle> {
        Ok(PipelineHandle(self.next()))
    }

    fn destroy_pipeline(&self, _pipeline: PipelineHandle) {}

    fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> Result<()> {
        self.log
            .lock()
            .push(Recorded::WriteBuffer(buffer, offset, data.len()));
        Ok(())
    }

    fn descriptor_size(&self, descriptor_type: DescriptorType) -> u64 {
        match descriptor_type {
            DescriptorType::Sampler => 16,
            _ => 32,
        }
    }

    fn descriptor_buffer_offset_alignment(&self) -> u64 {
        64
    }

    fn write_descriptor(
        &self,
        buffer: BufferHandle,
        offset: u64,
        write: &DescriptorWrite,
    ) -> Result<()> {
        self.log
            .lock()
            .push(Recorded::WriteDescriptor(buffer, offset, *write));
        Ok(())
    }

    fn create_fence(&self, _signaled: bool) -> Result<FenceHandle> {
        Ok(FenceHandle(self.next()))
    }

    fn destroy_fence(&self, _fence: FenceHandle) {}

    fn wait_for_fence(&self, _fence: FenceHandle, _timeout_ns: u64) -> Result<()> {
        Ok(())
    }

    fn reset_fence(&self, _fence: FenceHandle) -> Result<()> {
        Ok(())
    }

    fn create_semaphore(&self) -> Result<SemaphoreHandle> {
        Ok(SemaphoreHandle(self.next()))
    }

    fn destroy_semaphore(&self, _semaphore: SemaphoreHandle) {}

    fn create_command_encoder(&self, _name: &str) -> Result<Box<dyn CommandEncoder>> {
        Ok(Box::new(MockEncoder::with_log(self.log.clone())))
    }

    fn submit(
        &self,
        _encoder: &mut dyn CommandEncoder,
        _wait: SemaphoreHandle,
        _signal: SemaphoreHandle,
        _fence: FenceHandle,
    ) -> Result<()> {
        self.log.lock().push(Recorded::Submit);
        Ok(())
    }

    fn immediate_submit(
        &self,
        record: &mut dyn FnMut(&mut dyn CommandEncoder) -> Result<()>,
    ) -> Result<()> {
        let mut encoder = MockEncoder::with_log(self.log.clone());
        record(&mut encoder)
    }

    fn device_wait_idle(&self) {}

    fn acquire_next_image(&self, _semaphore: SemaphoreHandle) -> Result<AcquiredImage> {
        let mut stale = self.stale_acquires.lock();
        if *stale > 0 {
            *stale -= 1;
            return Err(EmberError::SwapchainStale);
        }
        Ok(AcquiredImage {
            index: 0,
            image: ImageHandle(u64::MAX),
            extent: *self.swapchain_extent.lock(),
        })
    }

    fn present(&self, image_index: u32, _wait: SemaphoreHandle) -> Result<()> {
        self.log.lock().push(Recorded::Present(image_index));
        Ok(())
    }

    fn recreate_swapchain(&self, extent: Extent2d, _vsync: bool) -> Result<()> {
        *self.swapchain_extent.lock() = extent;
        Ok(())
    }

    fn swapchain_format(&self) -> Format {
        Format::B8G8R8A8Unorm
    }

    fn swapchain_extent(&self) -> Extent2d {
        *self.swapchain_extent.lock()
    }

    fn set_debug_name(&self, _name: &str, _handle: u64) {}
}

// ============================================================================
// Mock window
// ============================================================================

pub struct MockWindow {
    extent: Mutex<Extent2d>,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            extent: Mutex::new(Extent2d::new(width, height)),
        })
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.extent.lock() = Extent2d::new(width, height);
    }
}

impl WindowSource for MockWindow {
    fn extent(&self) -> Extent2d {
        *self.extent.lock()
    }

    fn update_window_size(&self) {}
}

// ============================================================================
// Test pass
// ============================================================================

/// A pass with explicitly declared reads/writes and a no-op execute, for
/// topology and synchronization tests.
pub struct TestPass {
    name: String,
    bind_point: BindPoint,
    reads: Vec<(ResourceHandle, ShaderStageFlags)>,
    writes: Vec<(ResourceHandle, ShaderStageFlags)>,
}

impl TestPass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            bind_point: BindPoint::Compute,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn graphics(mut self) -> Self {
        self.bind_point = BindPoint::Graphics;
        self
    }

    pub fn reads(mut self, resource: ResourceHandle) -> Self {
        self.reads.push((resource, ShaderStageFlags::COMPUTE));
        self
    }

    pub fn reads_at(mut self, resource: ResourceHandle, stages: ShaderStageFlags) -> Self {
        self.reads.push((resource, stages));
        self
    }

    pub fn writes(mut self, resource: ResourceHandle) -> Self {
        self.writes.push((resource, ShaderStageFlags::COMPUTE));
        self
    }

    pub fn writes_at(mut self, resource: ResourceHandle, stages: ShaderStageFlags) -> Self {
        self.writes.push((resource, stages));
        self
    }
}

impl RenderPass for TestPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind_point(&self) -> BindPoint {
        self.bind_point
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        let list = match usage {
            ResourceUsage::Read => &self.reads,
            ResourceUsage::Write => &self.writes,
        };
        list.iter()
            .map(|&(resource, stages)| ResourceBinding {
                resource,
                usage,
                stages,
                slot: None,
            })
            .collect()
    }

    fn execute(&mut self, _ctx: &ExecuteContext<'_>, _cmd: &mut dyn CommandEncoder) -> Result<()> {
        Ok(())
    }
}

/// Identity check: a barrier whose source and destination state coincide.
#[allow(dead_code)]
pub fn is_identity_image_barrier(barrier: &ember::gpu::ImageBarrier) -> bool {
    barrier.old_layout == barrier.new_layout
        && barrier.src_access == barrier.dst_access
        && barrier.src_stage == barrier.dst_stage
}

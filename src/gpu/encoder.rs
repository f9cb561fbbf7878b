//! Command Recording Surface
//!
//! [`CommandEncoder`] is the trait through which every GPU command the
//! engine records flows: barriers from the synchronization manager,
//! dynamic-rendering scopes and draws from graphics passes, dispatches
//! from compute passes, and the transfer work of the allocator and the
//! swapchain coordinator.
//!
//! Backends implement it against their native command buffer; the test
//! suite implements it with a recorder so barrier and command sequences
//! can be asserted structurally.

use crate::errors::Result;

use super::barrier::Dependency;
use super::types::{
    BindPoint, BufferHandle, ClearValue, DescriptorBufferBindingInfo, Extent2d, Extent3d, Filter,
    ImageAspectFlags, ImageHandle, ImageLayout, ImageViewHandle, PipelineHandle,
    PipelineLayoutHandle, Rect2d, ShaderStageFlags, Viewport,
};

/// Attachment load behavior at the start of a rendering scope.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LoadOp {
    Load,
    Clear(ClearValue),
    DontCare,
}

/// One color attachment of a dynamic-rendering scope.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ColorAttachmentInfo {
    pub view: ImageViewHandle,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
}

/// The depth attachment of a dynamic-rendering scope.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct DepthAttachmentInfo {
    pub view: ImageViewHandle,
    pub layout: ImageLayout,
    pub load_op: LoadOp,
}

/// Parameters for a dynamic-rendering scope.
#[derive(Clone, PartialEq, Debug)]
pub struct RenderingInfo<'a> {
    pub render_area: Extent2d,
    pub color_attachments: &'a [ColorAttachmentInfo],
    pub depth_attachment: Option<DepthAttachmentInfo>,
}

/// Source/destination description of a blit.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct BlitRegion {
    pub src: ImageHandle,
    pub src_layout: ImageLayout,
    pub src_extent: Extent3d,
    pub dst: ImageHandle,
    pub dst_layout: ImageLayout,
    pub dst_extent: Extent3d,
    pub filter: Filter,
}

/// A recordable command stream backed by one primary command buffer.
///
/// The lifecycle is `reset` → `begin` → commands → `end` → submit via
/// [`Gpu::submit`](super::Gpu::submit). Recording methods are infallible;
/// errors surface at submit time, matching explicit-API semantics.
pub trait CommandEncoder {
    fn begin(&mut self) -> Result<()>;
    fn end(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;

    /// Emits one combined pipeline barrier.
    fn pipeline_barrier(&mut self, dependency: &Dependency);

    fn begin_rendering(&mut self, info: &RenderingInfo<'_>);
    fn end_rendering(&mut self);

    fn set_viewport(&mut self, viewport: Viewport);
    fn set_scissor(&mut self, scissor: Rect2d);

    fn bind_pipeline(&mut self, bind_point: BindPoint, pipeline: PipelineHandle);

    /// Makes the given descriptor buffers resident for subsequent
    /// [`set_descriptor_buffer_offsets`](Self::set_descriptor_buffer_offsets)
    /// calls.
    fn bind_descriptor_buffers(&mut self, buffers: &[DescriptorBufferBindingInfo]);

    /// Points a contiguous range of descriptor sets at offsets within the
    /// resident descriptor buffers.
    fn set_descriptor_buffer_offsets(
        &mut self,
        bind_point: BindPoint,
        layout: PipelineLayoutHandle,
        first_set: u32,
        buffer_indices: &[u32],
        offsets: &[u64],
    );

    fn push_constants(
        &mut self,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        data: &[u8],
    );

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Indirect mesh-task draw where the draw count is read from
    /// `count_buffer` at execute time.
    fn draw_mesh_tasks_indirect_count(
        &mut self,
        buffer: BufferHandle,
        offset: u64,
        count_buffer: BufferHandle,
        count_offset: u64,
        max_draw_count: u32,
        stride: u32,
    );

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);

    fn clear_color_image(&mut self, image: ImageHandle, layout: ImageLayout, color: [f32; 4]);

    fn clear_depth_image(
        &mut self,
        image: ImageHandle,
        layout: ImageLayout,
        aspect: ImageAspectFlags,
        depth: f32,
        stencil: u32,
    );

    fn copy_buffer_to_image(
        &mut self,
        src: BufferHandle,
        dst: ImageHandle,
        dst_layout: ImageLayout,
        extent: Extent3d,
    );

    fn blit_image(&mut self, region: &BlitRegion);

    /// Opens a debug label scope (shown in GPU captures).
    fn begin_label(&mut self, name: &str);
    fn end_label(&mut self);
}

//! Synchronization Manager
//!
//! Given a node's declared reads and writes, emits the exact barrier set
//! transitioning each touched resource from its current state to the state
//! the pass requires, as **one** combined pipeline barrier per node.
//!
//! The barrier computation is a visitor over the resource instance
//! variants: images produce an image barrier with a layout transition,
//! buffers a buffer barrier, and image arrays one image barrier per
//! element. After computing a barrier the visitor writes the destination
//! state back into the instance, so the next pass's calculation (and the
//! next frame's) starts from the up-to-date state. Re-running a node's
//! synchronization with unchanged inputs therefore emits identity
//! barriers: the emission count stays fixed while the transitions
//! converge.

use log::trace;

use crate::gpu::{
    AccessFlags, BindPoint, BufferBarrier, CommandEncoder, Dependency, ImageBarrier, ImageLayout,
    ImageRole, MemoryBarrier, PipelineStageFlags, ShaderStageFlags,
};
use crate::resources::{
    BufferInstance, ImageInstance, ResourceRegistry, ResourceState, ResourceUsage, ResourceVisitor,
};

use super::passes::RenderPass;

// ============================================================================
// Destination derivation
// ============================================================================

/// Collapses a binding's shader stages to a destination pipeline stage.
///
/// Fragment-only collapses to all-graphics; any compute use collapses to
/// the compute stage; other graphics-stage combinations fall back to the
/// pass's bind point; anything unknown is all-commands.
pub(crate) fn destination_stage(
    stages: ShaderStageFlags,
    bind_point: BindPoint,
) -> PipelineStageFlags {
    if stages == ShaderStageFlags::FRAGMENT {
        PipelineStageFlags::ALL_GRAPHICS
    } else if stages.contains(ShaderStageFlags::COMPUTE) {
        PipelineStageFlags::COMPUTE_SHADER
    } else if stages.intersects(ShaderStageFlags::ALL_GRAPHICS) {
        match bind_point {
            BindPoint::Graphics => PipelineStageFlags::ALL_GRAPHICS,
            BindPoint::Compute => PipelineStageFlags::ALL_COMMANDS,
        }
    } else {
        PipelineStageFlags::ALL_COMMANDS
    }
}

/// Destination access mask and layout for an image use.
pub(crate) fn image_destination(
    role: ImageRole,
    usage: ResourceUsage,
    bind_point: BindPoint,
) -> (AccessFlags, ImageLayout) {
    match (role, bind_point, usage) {
        // Depth attachments are read and written by the fixed-function
        // depth test.
        (ImageRole::Depth, BindPoint::Graphics, ResourceUsage::Write) => (
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            ImageLayout::DepthStencilAttachmentOptimal,
        ),
        (ImageRole::Depth, BindPoint::Graphics, ResourceUsage::Read) => (
            AccessFlags::SHADER_SAMPLED_READ,
            ImageLayout::DepthStencilReadOnlyOptimal,
        ),
        (ImageRole::Color, BindPoint::Graphics, ResourceUsage::Write) => (
            AccessFlags::COLOR_ATTACHMENT_WRITE,
            ImageLayout::ColorAttachmentOptimal,
        ),
        // Compute treats depth like color.
        (_, _, ResourceUsage::Read) => (
            AccessFlags::SHADER_SAMPLED_READ,
            ImageLayout::ShaderReadOnlyOptimal,
        ),
        (_, BindPoint::Compute, ResourceUsage::Write) => (
            AccessFlags::SHADER_STORAGE_READ | AccessFlags::SHADER_STORAGE_WRITE,
            ImageLayout::General,
        ),
    }
}

/// Destination access mask for a buffer use. Uniform buffers alias the
/// storage-read mask for barrier purposes.
pub(crate) fn buffer_destination(usage: ResourceUsage) -> AccessFlags {
    match usage {
        ResourceUsage::Read => AccessFlags::SHADER_STORAGE_READ,
        ResourceUsage::Write => AccessFlags::SHADER_STORAGE_WRITE,
    }
}

// ============================================================================
// Barrier visitor
// ============================================================================

struct BarrierVisitor {
    bind_point: BindPoint,
    dependency: Dependency,
}

impl ResourceVisitor for BarrierVisitor {
    fn visit_image(
        &mut self,
        image: &ImageInstance,
        usage: ResourceUsage,
        stages: ShaderStageFlags,
    ) {
        let src = image.state();
        let dst_stage = destination_stage(stages, self.bind_point);
        let (dst_access, new_layout) = image_destination(image.role(), usage, self.bind_point);
        self.dependency.images.push(ImageBarrier {
            image: image.image(),
            old_layout: src.layout,
            new_layout,
            aspect: image.aspect(),
            src_stage: src.stage,
            src_access: src.access,
            dst_stage,
            dst_access,
        });
        image.set_state(ResourceState {
            layout: new_layout,
            access: dst_access,
            stage: dst_stage,
        });
    }

    fn visit_buffer(
        &mut self,
        buffer: &BufferInstance,
        usage: ResourceUsage,
        stages: ShaderStageFlags,
    ) {
        let src = buffer.state();
        let dst_stage = destination_stage(stages, self.bind_point);
        let dst_access = buffer_destination(usage);
        self.dependency.buffers.push(BufferBarrier {
            buffer: buffer.buffer(),
            src_stage: src.stage,
            src_access: src.access,
            dst_stage,
            dst_access,
        });
        buffer.set_state(ResourceState {
            layout: ImageLayout::Undefined,
            access: dst_access,
            stage: dst_stage,
        });
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Computes and emits the barrier set for one node.
#[derive(Default)]
pub struct SynchronizationManager;

impl SynchronizationManager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Enumerates the node's reads then writes, accumulates every barrier
    /// into one dependency and emits it. Exactly one pipeline-barrier
    /// emission per call, identity or not.
    pub fn synchronize_resources(
        &self,
        pass: &dyn RenderPass,
        registry: &ResourceRegistry,
        cmd: &mut dyn CommandEncoder,
    ) {
        let mut visitor = BarrierVisitor {
            bind_point: pass.bind_point(),
            dependency: Dependency::new(),
        };
        for usage in [ResourceUsage::Read, ResourceUsage::Write] {
            for binding in pass.resources(usage) {
                registry
                    .get(binding.resource)
                    .accept(&mut visitor, usage, binding.stages);
            }
        }
        trace!(
            "sync: '{}' emits {} barriers",
            pass.name(),
            visitor.dependency.len()
        );
        cmd.pipeline_barrier(&visitor.dependency);
    }
}

/// Frame-start barrier: host writes become visible to shader reads.
#[must_use]
pub(crate) fn frame_start_dependency() -> Dependency {
    Dependency::global(MemoryBarrier {
        src_stage: PipelineStageFlags::HOST,
        src_access: AccessFlags::HOST_WRITE,
        dst_stage: PipelineStageFlags::ALL_COMMANDS,
        dst_access: AccessFlags::MEMORY_READ,
    })
}

/// Frame-end barrier: shader reads complete before host writes resume.
#[must_use]
pub(crate) fn frame_end_dependency() -> Dependency {
    Dependency::global(MemoryBarrier {
        src_stage: PipelineStageFlags::ALL_COMMANDS,
        src_access: AccessFlags::MEMORY_READ,
        dst_stage: PipelineStageFlags::HOST,
        dst_access: AccessFlags::HOST_WRITE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_only_collapses_to_all_graphics() {
        assert_eq!(
            destination_stage(ShaderStageFlags::FRAGMENT, BindPoint::Graphics),
            PipelineStageFlags::ALL_GRAPHICS
        );
    }

    #[test]
    fn compute_stage_collapses_to_compute_shader() {
        assert_eq!(
            destination_stage(ShaderStageFlags::COMPUTE, BindPoint::Compute),
            PipelineStageFlags::COMPUTE_SHADER
        );
    }

    #[test]
    fn all_graphics_stays_all_graphics() {
        assert_eq!(
            destination_stage(ShaderStageFlags::ALL_GRAPHICS, BindPoint::Graphics),
            PipelineStageFlags::ALL_GRAPHICS
        );
    }

    #[test]
    fn mesh_stages_fall_back_to_bind_point() {
        let stages = ShaderStageFlags::TASK | ShaderStageFlags::MESH | ShaderStageFlags::FRAGMENT;
        assert_eq!(
            destination_stage(stages, BindPoint::Graphics),
            PipelineStageFlags::ALL_GRAPHICS
        );
    }

    #[test]
    fn unknown_stages_collapse_to_all_commands() {
        assert_eq!(
            destination_stage(ShaderStageFlags::empty(), BindPoint::Graphics),
            PipelineStageFlags::ALL_COMMANDS
        );
    }

    #[test]
    fn color_write_destination_differs_by_bind_point() {
        let (graphics_access, graphics_layout) =
            image_destination(ImageRole::Color, ResourceUsage::Write, BindPoint::Graphics);
        assert_eq!(graphics_access, AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(graphics_layout, ImageLayout::ColorAttachmentOptimal);

        let (compute_access, compute_layout) =
            image_destination(ImageRole::Color, ResourceUsage::Write, BindPoint::Compute);
        assert_eq!(
            compute_access,
            AccessFlags::SHADER_STORAGE_READ | AccessFlags::SHADER_STORAGE_WRITE
        );
        assert_eq!(compute_layout, ImageLayout::General);
    }

    #[test]
    fn depth_reads_depend_on_bind_point() {
        let (_, graphics_layout) =
            image_destination(ImageRole::Depth, ResourceUsage::Read, BindPoint::Graphics);
        assert_eq!(graphics_layout, ImageLayout::DepthStencilReadOnlyOptimal);

        let (_, compute_layout) =
            image_destination(ImageRole::Depth, ResourceUsage::Read, BindPoint::Compute);
        assert_eq!(compute_layout, ImageLayout::ShaderReadOnlyOptimal);
    }

    #[test]
    fn depth_write_is_read_write_attachment_access() {
        let (access, layout) =
            image_destination(ImageRole::Depth, ResourceUsage::Write, BindPoint::Graphics);
        assert_eq!(
            access,
            AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(layout, ImageLayout::DepthStencilAttachmentOptimal);
    }
}

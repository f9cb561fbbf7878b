//! Draw Culling Passes
//!
//! GPU-driven culling front-end of the meshlet pipeline. [`DrawCullPass`]
//! tests every mesh draw against the camera and appends surviving meshlet
//! task commands plus a command count; [`TaskSubmitPass`] folds that count
//! into the indirect argument layout the meshlet passes consume.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{BindPoint, CommandEncoder, Gpu, PushConstantRange, ShaderStageFlags};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

/// Work-group size of the culling shader.
const CULL_GROUP_SIZE: u32 = 64;

/// Push constants of the culling dispatch.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawCullConstants {
    /// Total number of mesh draws to test.
    pub draw_count: u32,
    pub _pad: [u32; 3],
}

/// Frustum-culling compute pass.
///
/// Reads the camera and the mesh-draw buffer, writes the task-command
/// buffer and the command-count buffer.
pub struct DrawCullPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    draw_count: Provider<u32>,
}

impl DrawCullPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        mesh_draws: ResourceHandle,
        task_commands: ResourceHandle,
        command_count: ResourceHandle,
        draw_count: Provider<u32>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(camera, 0, 0, stages);
        bindings.storage_buffer(mesh_draws, 0, 1, stages, ResourceUsage::Read);
        bindings.storage_buffer(task_commands, 0, 2, stages, ResourceUsage::Write);
        bindings.storage_buffer(command_count, 0, 3, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "draw_cull",
            "draw_cull.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<DrawCullConstants>() as u32,
                stages,
            }),
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;

        Ok(Self {
            bundle,
            bindings,
            draw_count,
        })
    }
}

impl RenderPass for DrawCullPass {
    fn name(&self) -> &str {
        "draw_cull"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Compute
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, _ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        let draw_count = (self.draw_count)();
        self.bundle.bind(cmd);
        self.bundle.push_constants(
            cmd,
            bytemuck::bytes_of(&DrawCullConstants {
                draw_count,
                _pad: [0; 3],
            }),
        );
        cmd.dispatch(dispatch_groups(draw_count, CULL_GROUP_SIZE), 1, 1);
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

/// Indirect-argument fixup pass.
///
/// Trivial single-group dispatch that rewrites the command count produced
/// by [`DrawCullPass`] into the task-command indirect argument layout.
pub struct TaskSubmitPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
}

impl TaskSubmitPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        task_commands: ResourceHandle,
        command_count: ResourceHandle,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.storage_buffer(task_commands, 0, 0, stages, ResourceUsage::Read);
        // Read-modify-write of the count in place; declared as WRITE.
        bindings.storage_buffer(command_count, 0, 1, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "task_submit",
            "task_submit.comp.spv",
            &collection,
            None,
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;

        Ok(Self { bundle, bindings })
    }
}

impl RenderPass for TaskSubmitPass {
    fn name(&self) -> &str {
        "task_submit"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Compute
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, _ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        self.bundle.bind(cmd);
        cmd.dispatch(1, 1, 1);
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

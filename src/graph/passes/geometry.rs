//! Meshlet Geometry Passes
//!
//! The mesh-shading back-end of the GPU-driven pipeline. Both passes
//! consume the task commands emitted by the culling passes through an
//! indirect count draw: [`MeshletDepthPass`] renders depth only (shadow
//! map), [`MeshletGBufferPass`] lays down the three color G-buffers plus
//! scene depth.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, CompareOp, CullMode, FrontFace, Gpu, LoadOp, SamplerHandle,
    ShaderStageFlags,
};
use crate::pipeline::{GraphicsPipelineBuilder, GraphicsShaderSet, PipelineBundle};
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding};

/// Stride of one task-command record in the indirect buffer.
const TASK_COMMAND_STRIDE: u32 = 16;

/// The mesh buffers every meshlet pass reads.
#[derive(Clone, Copy)]
pub struct MeshBufferSet {
    pub vertex_positions: ResourceHandle,
    pub vertex_data: ResourceHandle,
    pub meshlets: ResourceHandle,
    pub meshlet_vertices: ResourceHandle,
    pub meshlet_triangles: ResourceHandle,
    pub mesh_draws: ResourceHandle,
    pub task_commands: ResourceHandle,
    pub command_count: ResourceHandle,
}

fn bind_mesh_buffers(bindings: &mut BindingSet, set: u32, buffers: &MeshBufferSet) {
    let stages = ShaderStageFlags::TASK | ShaderStageFlags::MESH;
    bindings.storage_buffer(buffers.vertex_positions, set, 0, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.vertex_data, set, 1, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.meshlets, set, 2, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.meshlet_vertices, set, 3, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.meshlet_triangles, set, 4, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.mesh_draws, set, 5, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.task_commands, set, 6, stages, ResourceUsage::Read);
    bindings.storage_buffer(buffers.command_count, set, 7, stages, ResourceUsage::Read);
}

/// Depth-only meshlet pass rendering the directional shadow map.
pub struct MeshletDepthPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    task_commands: ResourceHandle,
    command_count: ResourceHandle,
    max_draws: Provider<u32>,
}

impl MeshletDepthPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        light_matrices: ResourceHandle,
        buffers: MeshBufferSet,
        shadow_map: ResourceHandle,
        max_draws: Provider<u32>,
    ) -> Result<Self> {
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(
            camera,
            0,
            0,
            ShaderStageFlags::TASK | ShaderStageFlags::MESH,
        );
        bindings.uniform_buffer(light_matrices, 0, 1, ShaderStageFlags::MESH);
        bind_mesh_buffers(&mut bindings, 1, &buffers);
        bindings.depth_attachment(shadow_map, LoadOp::Load);

        let depth_format = registry.image(shadow_map).format();
        let builder = GraphicsPipelineBuilder::new("meshlet_depth")
            .set_cull_mode(CullMode::Front, FrontFace::CounterClockwise)
            .set_multisampling_none()
            .disable_blending(0)
            .enable_depthtest(true, CompareOp::GreaterOrEqual)
            .set_depth_format(depth_format)
            .enable_dynamic_depth_bias();
        bindings.validate_attachment_formats(registry, &builder, "meshlet_depth")?;

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_graphics(
            gpu,
            registry,
            "meshlet_depth",
            &GraphicsShaderSet::MeshShading {
                task: "meshlet_depth.task.spv".into(),
                mesh: "meshlet_depth.mesh.spv".into(),
                fragment: "meshlet_depth.frag.spv".into(),
            },
            builder,
            &collection,
            None,
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Graphics)?;

        Ok(Self {
            bundle,
            bindings,
            task_commands: buffers.task_commands,
            command_count: buffers.command_count,
            max_draws,
        })
    }
}

impl RenderPass for MeshletDepthPass {
    fn name(&self) -> &str {
        "meshlet_depth"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Graphics
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        self.bindings.begin_rendering(ctx.registry, cmd);
        self.bundle.bind(cmd);
        cmd.draw_mesh_tasks_indirect_count(
            ctx.registry.buffer(self.task_commands).buffer(),
            0,
            ctx.registry.buffer(self.command_count).buffer(),
            0,
            (self.max_draws)(),
            TASK_COMMAND_STRIDE,
        );
        cmd.end_rendering();
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

/// Meshlet G-buffer pass writing albedo/normal/material targets plus
/// scene depth.
pub struct MeshletGBufferPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    task_commands: ResourceHandle,
    command_count: ResourceHandle,
    max_draws: Provider<u32>,
}

impl MeshletGBufferPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        materials: ResourceHandle,
        textures: ResourceHandle,
        texture_sampler: SamplerHandle,
        texture_capacity: u32,
        buffers: MeshBufferSet,
        gbuffer: [ResourceHandle; 3],
        depth: ResourceHandle,
        max_draws: Provider<u32>,
    ) -> Result<Self> {
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(
            camera,
            0,
            0,
            ShaderStageFlags::TASK | ShaderStageFlags::MESH | ShaderStageFlags::FRAGMENT,
        );
        bind_mesh_buffers(&mut bindings, 1, &buffers);
        bindings.storage_buffer(
            materials,
            2,
            0,
            ShaderStageFlags::FRAGMENT,
            ResourceUsage::Read,
        );
        bindings.sampled_array(
            textures,
            2,
            1,
            ShaderStageFlags::FRAGMENT,
            texture_sampler,
            texture_capacity,
        );
        for &target in &gbuffer {
            bindings.color_attachment(target, LoadOp::Load);
        }
        bindings.depth_attachment(depth, LoadOp::Load);

        let color_formats: Vec<_> = gbuffer
            .iter()
            .map(|&target| registry.image(target).format())
            .collect();
        let depth_format = registry.image(depth).format();
        let builder = GraphicsPipelineBuilder::new("meshlet_gbuffer")
            .set_cull_mode(CullMode::Back, FrontFace::CounterClockwise)
            .set_multisampling_none()
            .disable_blending(color_formats.len())
            .enable_depthtest(true, CompareOp::GreaterOrEqual)
            .set_color_attachment_formats(&color_formats)
            .set_depth_format(depth_format);
        bindings.validate_attachment_formats(registry, &builder, "meshlet_gbuffer")?;

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_graphics(
            gpu,
            registry,
            "meshlet_gbuffer",
            &GraphicsShaderSet::MeshShading {
                task: "meshlet.task.spv".into(),
                mesh: "meshlet.mesh.spv".into(),
                fragment: "meshlet.frag.spv".into(),
            },
            builder,
            &collection,
            None,
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Graphics)?;

        Ok(Self {
            bundle,
            bindings,
            task_commands: buffers.task_commands,
            command_count: buffers.command_count,
            max_draws,
        })
    }
}

impl RenderPass for MeshletGBufferPass {
    fn name(&self) -> &str {
        "meshlet_gbuffer"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Graphics
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        self.bindings.begin_rendering(ctx.registry, cmd);
        self.bundle.bind(cmd);
        cmd.draw_mesh_tasks_indirect_count(
            ctx.registry.buffer(self.task_commands).buffer(),
            0,
            ctx.registry.buffer(self.command_count).buffer(),
            0,
            (self.max_draws)(),
            TASK_COMMAND_STRIDE,
        );
        cmd.end_rendering();
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

//! Deferred Lighting Pass
//!
//! The shading resolve: reads the G-buffers, scene depth, the shadow map,
//! ambient occlusion, the integrated volumetric scattering and the
//! environment/irradiance cubemaps, and writes the lit HDR scene image.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Gpu, PushConstantRange, SamplerHandle, ShaderStageFlags,
};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

const LIGHTING_GROUP_SIZE: u32 = 16;

/// Push constants of the lighting resolve.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightingConstants {
    pub directional_light_count: u32,
    pub point_light_count: u32,
    pub ambient_occlusion_strength: f32,
    /// Nonzero when the volumetric integration result should be applied.
    pub volumetric_enabled: u32,
}

/// Externally owned inputs of the lighting pass.
#[derive(Clone, Copy)]
pub struct LightingInputs {
    pub camera: ResourceHandle,
    pub materials: ResourceHandle,
    pub directional_lights: ResourceHandle,
    pub point_lights: ResourceHandle,
    pub light_matrices: ResourceHandle,
    pub environment_cubemap: ResourceHandle,
    pub irradiance_cubemap: ResourceHandle,
}

pub struct LightingPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    target: ResourceHandle,
    params: Provider<LightingConstants>,
}

impl LightingPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        inputs: LightingInputs,
        gbuffer: [ResourceHandle; 3],
        depth: ResourceHandle,
        shadow_map: ResourceHandle,
        ambient_occlusion: ResourceHandle,
        volumetric_integrated: ResourceHandle,
        target: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<LightingConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(inputs.camera, 0, 0, stages);
        bindings.storage_buffer(inputs.materials, 0, 1, stages, ResourceUsage::Read);
        bindings.storage_buffer(inputs.directional_lights, 0, 2, stages, ResourceUsage::Read);
        bindings.storage_buffer(inputs.point_lights, 0, 3, stages, ResourceUsage::Read);
        bindings.uniform_buffer(inputs.light_matrices, 0, 4, stages);

        bindings.sampled(gbuffer[0], 1, 0, stages, sampler);
        bindings.sampled(gbuffer[1], 1, 1, stages, sampler);
        bindings.sampled(gbuffer[2], 1, 2, stages, sampler);
        bindings.sampled(depth, 1, 3, stages, sampler);
        bindings.sampled(shadow_map, 1, 4, stages, sampler);
        bindings.sampled(ambient_occlusion, 1, 5, stages, sampler);
        bindings.sampled(volumetric_integrated, 1, 6, stages, sampler);

        bindings.sampled(inputs.environment_cubemap, 2, 0, stages, sampler);
        bindings.sampled(inputs.irradiance_cubemap, 2, 1, stages, sampler);

        bindings.storage_image(target, 3, 0, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "lighting",
            "lighting.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<LightingConstants>() as u32,
                stages,
            }),
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;

        Ok(Self {
            bundle,
            bindings,
            target,
            params,
        })
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "lighting"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Compute
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        let params = (self.params)();
        self.bundle.bind(cmd);
        self.bundle.push_constants(cmd, bytemuck::bytes_of(&params));
        let extent = ctx.registry.image(self.target).extent();
        cmd.dispatch(
            dispatch_groups(extent.width, LIGHTING_GROUP_SIZE),
            dispatch_groups(extent.height, LIGHTING_GROUP_SIZE),
            1,
        );
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

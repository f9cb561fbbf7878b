//! Tone-Map Pass
//!
//! Composes the lit scene with the skybox image, applies auto-exposure
//! from the adapted luminance texel and maps the HDR result into the final
//! displayable scene image the frame coordinator blits to the swapchain.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Gpu, PushConstantRange, SamplerHandle, ShaderStageFlags,
};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

const TONE_MAP_GROUP_SIZE: u32 = 16;

/// Push constants of the tone-map dispatch.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ToneMapConstants {
    /// Exposure bias in f-stops.
    pub exposure: f32,
    pub gamma: f32,
    /// Blend between plain exposure (0) and the filmic curve (1).
    pub filmic_strength: f32,
    pub _pad: u32,
}

pub struct ToneMapPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    target: ResourceHandle,
    params: Provider<ToneMapConstants>,
}

impl ToneMapPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        scene_lit: ResourceHandle,
        skybox: ResourceHandle,
        adapted_luminance: ResourceHandle,
        target: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<ToneMapConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(scene_lit, 0, 0, stages, sampler);
        bindings.sampled(skybox, 0, 1, stages, sampler);
        bindings.sampled(adapted_luminance, 0, 2, stages, sampler);
        bindings.storage_image(target, 0, 3, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "tone_map",
            "tone_map.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<ToneMapConstants>() as u32,
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

impl RenderPass for ToneMapPass {
    fn name(&self) -> &str {
        "tone_map"
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
            dispatch_groups(extent.width, TONE_MAP_GROUP_SIZE),
            dispatch_groups(extent.height, TONE_MAP_GROUP_SIZE),
            1,
        );
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

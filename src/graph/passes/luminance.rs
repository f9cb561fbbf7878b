//! Luminance Adaptation Chain
//!
//! Auto-exposure support for the tone-map pass:
//!
//! 1. [`LuminancePass`] extracts log-luminance from the lit scene into a
//!    64×64 image.
//! 2. [`LuminanceDownscalePass`] reduces it to a single texel.
//! 3. [`LightAdaptationPass`] blends that frame luminance into the
//!    persistent adapted-luminance texel over time.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Gpu, PushConstantRange, SamplerHandle, ShaderStageFlags,
};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

const LUMINANCE_GROUP_SIZE: u32 = 16;

/// Push constants of the luminance extraction and adaptation dispatches.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LuminanceConstants {
    pub min_log_luminance: f32,
    pub max_log_luminance: f32,
    /// Adaptation speed in f-stops per second.
    pub adaptation_speed: f32,
    /// Seconds since the previous frame.
    pub delta_time: f32,
}

/// Extracts per-tile log-luminance from the lit scene.
pub struct LuminancePass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    target: ResourceHandle,
    params: Provider<LuminanceConstants>,
}

impl LuminancePass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        scene_lit: ResourceHandle,
        target: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<LuminanceConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(scene_lit, 0, 0, stages, sampler);
        bindings.storage_image(target, 0, 1, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "luminance",
            "luminance.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<LuminanceConstants>() as u32,
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

impl RenderPass for LuminancePass {
    fn name(&self) -> &str {
        "luminance"
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
            dispatch_groups(extent.width, LUMINANCE_GROUP_SIZE),
            dispatch_groups(extent.height, LUMINANCE_GROUP_SIZE),
            1,
        );
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

/// Parallel reduction of the luminance tile image down to one texel.
pub struct LuminanceDownscalePass {
    bundle: PipelineBundle,
    bindings: BindingSet,
}

impl LuminanceDownscalePass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        tiles: ResourceHandle,
        average: ResourceHandle,
        sampler: SamplerHandle,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(tiles, 0, 0, stages, sampler);
        bindings.storage_image(average, 0, 1, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "luminance_downscale",
            "luminance_downscale.comp.spv",
            &collection,
            None,
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;

        Ok(Self { bundle, bindings })
    }
}

impl RenderPass for LuminanceDownscalePass {
    fn name(&self) -> &str {
        "luminance_downscale"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Compute
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, _ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        self.bundle.bind(cmd);
        // The shader reduces the full tile image within one work group.
        cmd.dispatch(1, 1, 1);
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

/// Temporal eye-adaptation blend into the persistent adapted-luminance
/// texel. The adapted image is read and written in place, so it is
/// declared as a write.
pub struct LightAdaptationPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    params: Provider<LuminanceConstants>,
}

impl LightAdaptationPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        average: ResourceHandle,
        adapted: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<LuminanceConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(average, 0, 0, stages, sampler);
        bindings.storage_image(adapted, 0, 1, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "light_adaptation",
            "light_adaptation.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<LuminanceConstants>() as u32,
                stages,
            }),
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;

        Ok(Self {
            bundle,
            bindings,
            params,
        })
    }
}

impl RenderPass for LightAdaptationPass {
    fn name(&self) -> &str {
        "light_adaptation"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Compute
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, _ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        let params = (self.params)();
        self.bundle.bind(cmd);
        self.bundle.push_constants(cmd, bytemuck::bytes_of(&params));
        cmd.dispatch(1, 1, 1);
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

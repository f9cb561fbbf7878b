//! Screen-Space Ambient Occlusion Pass
//!
//! Samples scene depth and the normal G-buffer around each pixel, rotated
//! by a small tiling noise texture, and writes an occlusion factor into a
//! half-resolution AO image consumed by the lighting pass.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Gpu, PushConstantRange, SamplerHandle, ShaderStageFlags,
};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

const SSAO_GROUP_SIZE: u32 = 16;

/// Push constants of the SSAO dispatch.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SsaoConstants {
    pub radius: f32,
    pub strength: f32,
    /// Nonzero enables occlusion sampling; zero writes full visibility so
    /// the pass's barriers and dispatch stay uniform.
    pub enabled: u32,
    pub _pad: u32,
}

pub struct SsaoPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    target: ResourceHandle,
    params: Provider<SsaoConstants>,
}

impl SsaoPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        depth: ResourceHandle,
        normals: ResourceHandle,
        rotation_noise: ResourceHandle,
        target: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<SsaoConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(camera, 0, 0, stages);
        bindings.sampled(depth, 0, 1, stages, sampler);
        bindings.sampled(normals, 0, 2, stages, sampler);
        bindings.sampled(rotation_noise, 0, 3, stages, sampler);
        bindings.storage_image(target, 0, 4, stages, ResourceUsage::Write);

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            "ssao",
            "ssao.comp.spv",
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<SsaoConstants>() as u32,
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

impl RenderPass for SsaoPass {
    fn name(&self) -> &str {
        "ssao"
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
            dispatch_groups(extent.width, SSAO_GROUP_SIZE),
            dispatch_groups(extent.height, SSAO_GROUP_SIZE),
            1,
        );
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

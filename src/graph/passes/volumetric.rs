//! Volumetric Lighting Chain
//!
//! Five 3D-image compute passes implementing froxel-based volumetric
//! lighting:
//!
//! 1. noise generation (tiling jitter volume)
//! 2. density/light injection into the froxel grid
//! 3. in-scattering against the shadowed directional light
//! 4. spatial filtering of the scattering volume
//! 5. front-to-back integration into the texture the lighting pass reads
//!
//! All five share one push-constant block so the whole chain reacts to the
//! same configuration values.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Extent3d, Gpu, PushConstantRange, SamplerHandle, ShaderStageFlags,
};
use crate::pipeline::PipelineBundle;
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding, dispatch_groups};

const VOLUME_GROUP_SIZE: u32 = 8;

/// Push constants shared by the volumetric chain.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct VolumetricConstants {
    pub density: f32,
    pub anisotropy: f32,
    pub noise_scale: f32,
    /// Frame index for temporal jitter.
    pub frame_index: u32,
}

/// Shared shape of the five chain stages: one compute bundle dispatching
/// over a 3D target.
struct VolumeStage {
    name: &'static str,
    bundle: PipelineBundle,
    bindings: BindingSet,
    target: ResourceHandle,
    params: Provider<VolumetricConstants>,
}

impl VolumeStage {
    fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        name: &'static str,
        shader: &str,
        bindings: BindingSet,
        target: ResourceHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_compute(
            gpu,
            registry,
            name,
            shader,
            &collection,
            Some(PushConstantRange {
                size: std::mem::size_of::<VolumetricConstants>() as u32,
                stages: ShaderStageFlags::COMPUTE,
            }),
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Compute)?;
        Ok(Self {
            name,
            bundle,
            bindings,
            target,
            params,
        })
    }

    fn dispatch_volume(&self, extent: Extent3d, cmd: &mut dyn CommandEncoder) {
        cmd.dispatch(
            dispatch_groups(extent.width, VOLUME_GROUP_SIZE),
            dispatch_groups(extent.height, VOLUME_GROUP_SIZE),
            dispatch_groups(extent.depth, VOLUME_GROUP_SIZE),
        );
    }
}

macro_rules! volume_pass {
    ($(#[$doc:meta])* $pass:ident) => {
        $(#[$doc])*
        pub struct $pass {
            stage: VolumeStage,
        }

        impl RenderPass for $pass {
            fn name(&self) -> &str {
                self.stage.name
            }

            fn bind_point(&self) -> BindPoint {
                BindPoint::Compute
            }

            fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
                self.stage.bindings.resources(usage)
            }

            fn execute(
                &mut self,
                ctx: &ExecuteContext<'_>,
                cmd: &mut dyn CommandEncoder,
            ) -> Result<()> {
                let mut params = (self.stage.params)();
                params.frame_index = ctx.frame_index as u32;
                self.stage.bundle.bind(cmd);
                self.stage.bundle.push_constants(cmd, bytemuck::bytes_of(&params));
                let extent = ctx.registry.image(self.stage.target).extent();
                self.stage.dispatch_volume(extent, cmd);
                Ok(())
            }

            fn destroy(&mut self, gpu: &dyn Gpu) {
                self.stage.bundle.destroy(gpu);
            }
        }
    };
}

volume_pass!(
    /// Stage 1: regenerates the tiling jitter noise volume.
    VolumetricNoisePass
);
volume_pass!(
    /// Stage 2: injects fog density and directional light into the froxels.
    VolumetricInjectionPass
);
volume_pass!(
    /// Stage 3: accumulates shadowed in-scattering per froxel.
    VolumetricScatteringPass
);
volume_pass!(
    /// Stage 4: spatially filters the scattering volume.
    VolumetricSpatialFilterPass
);
volume_pass!(
    /// Stage 5: integrates the filtered volume front to back.
    VolumetricIntegrationPass
);

impl VolumetricNoisePass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        noise: ResourceHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let mut bindings = BindingSet::new();
        bindings.storage_image(noise, 0, 0, ShaderStageFlags::COMPUTE, ResourceUsage::Write);
        Ok(Self {
            stage: VolumeStage::new(
                gpu,
                registry,
                "volumetric_noise",
                "volumetric_noise.comp.spv",
                bindings,
                noise,
                params,
            )?,
        })
    }
}

impl VolumetricInjectionPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        noise: ResourceHandle,
        froxel_data: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(camera, 0, 0, stages);
        bindings.sampled(noise, 0, 1, stages, sampler);
        bindings.storage_image(froxel_data, 0, 2, stages, ResourceUsage::Write);
        Ok(Self {
            stage: VolumeStage::new(
                gpu,
                registry,
                "volumetric_injection",
                "volumetric_injection.comp.spv",
                bindings,
                froxel_data,
                params,
            )?,
        })
    }
}

impl VolumetricScatteringPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        directional_light: ResourceHandle,
        light_matrices: ResourceHandle,
        froxel_data: ResourceHandle,
        shadow_map: ResourceHandle,
        scattering: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(camera, 0, 0, stages);
        bindings.storage_buffer(directional_light, 0, 1, stages, ResourceUsage::Read);
        bindings.uniform_buffer(light_matrices, 0, 2, stages);
        bindings.sampled(froxel_data, 0, 3, stages, sampler);
        bindings.sampled(shadow_map, 0, 4, stages, sampler);
        bindings.storage_image(scattering, 0, 5, stages, ResourceUsage::Write);
        Ok(Self {
            stage: VolumeStage::new(
                gpu,
                registry,
                "volumetric_scattering",
                "volumetric_scattering.comp.spv",
                bindings,
                scattering,
                params,
            )?,
        })
    }
}

impl VolumetricSpatialFilterPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        scattering: ResourceHandle,
        filtered: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(scattering, 0, 0, stages, sampler);
        bindings.storage_image(filtered, 0, 1, stages, ResourceUsage::Write);
        Ok(Self {
            stage: VolumeStage::new(
                gpu,
                registry,
                "volumetric_spatial_filter",
                "volumetric_spatial_filter.comp.spv",
                bindings,
                filtered,
                params,
            )?,
        })
    }
}

impl VolumetricIntegrationPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        filtered: ResourceHandle,
        integrated: ResourceHandle,
        sampler: SamplerHandle,
        params: Provider<VolumetricConstants>,
    ) -> Result<Self> {
        let stages = ShaderStageFlags::COMPUTE;
        let mut bindings = BindingSet::new();
        bindings.sampled(filtered, 0, 0, stages, sampler);
        bindings.storage_image(integrated, 0, 1, stages, ResourceUsage::Write);
        Ok(Self {
            stage: VolumeStage::new(
                gpu,
                registry,
                "volumetric_integration",
                "volumetric_integration.comp.spv",
                bindings,
                integrated,
                params,
            )?,
        })
    }
}

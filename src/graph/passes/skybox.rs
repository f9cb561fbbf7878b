//! Skybox Pass
//!
//! Renders the environment cubemap into a skybox-only color image, composed
//! with the lit scene by the tone-map pass. Drawn as a single fullscreen
//! triangle whose direction vectors are reconstructed in the fragment
//! shader.

use smallvec::SmallVec;

use crate::errors::Result;
use crate::gpu::{
    BindPoint, ClearValue, CommandEncoder, CullMode, FrontFace, Gpu, LoadOp, SamplerHandle,
    ShaderStageFlags,
};
use crate::pipeline::{GraphicsPipelineBuilder, GraphicsShaderSet, PipelineBundle};
use crate::resources::{ResourceHandle, ResourceRegistry, ResourceUsage};

use super::{BindingSet, ExecuteContext, Provider, RenderPass, ResourceBinding};

pub struct SkyboxPass {
    bundle: PipelineBundle,
    bindings: BindingSet,
    enabled: Provider<bool>,
}

impl SkyboxPass {
    pub fn new(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        camera: ResourceHandle,
        environment_cubemap: ResourceHandle,
        target: ResourceHandle,
        sampler: SamplerHandle,
        enabled: Provider<bool>,
    ) -> Result<Self> {
        let mut bindings = BindingSet::new();
        bindings.uniform_buffer(
            camera,
            0,
            0,
            ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
        );
        bindings.sampled(environment_cubemap, 0, 1, ShaderStageFlags::FRAGMENT, sampler);
        bindings.color_attachment(target, LoadOp::Clear(ClearValue::Color([0.0; 4])));

        let format = registry.image(target).format();
        let builder = GraphicsPipelineBuilder::new("skybox")
            .set_cull_mode(CullMode::None, FrontFace::CounterClockwise)
            .set_multisampling_none()
            .disable_blending(1)
            .disable_depthtest()
            .set_color_attachment_formats(&[format]);
        bindings.validate_attachment_formats(registry, &builder, "skybox")?;

        let collection = bindings.descriptor_collection()?;
        let bundle = PipelineBundle::new_graphics(
            gpu,
            registry,
            "skybox",
            &GraphicsShaderSet::Classic {
                vertex: "skybox.vert.spv".into(),
                fragment: "skybox.frag.spv".into(),
            },
            builder,
            &collection,
            None,
        )?;
        bindings.write_descriptors(gpu, registry, bundle.descriptors(), BindPoint::Graphics)?;

        Ok(Self {
            bundle,
            bindings,
            enabled,
        })
    }
}

impl RenderPass for SkyboxPass {
    fn name(&self) -> &str {
        "skybox"
    }

    fn bind_point(&self) -> BindPoint {
        BindPoint::Graphics
    }

    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        self.bindings.resources(usage)
    }

    fn execute(&mut self, ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()> {
        // The rendering scope runs even when disabled so the clear keeps
        // the target deterministic and the resource state converged.
        self.bindings.begin_rendering(ctx.registry, cmd);
        if (self.enabled)() {
            self.bundle.bind(cmd);
            cmd.draw(3, 1, 0, 0);
        }
        cmd.end_rendering();
        Ok(())
    }

    fn destroy(&mut self, gpu: &dyn Gpu) {
        self.bundle.destroy(gpu);
    }
}

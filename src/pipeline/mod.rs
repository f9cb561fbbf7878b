//! Pipeline Construction
//!
//! Everything a pass needs to go from shader binaries and binding
//! declarations to a bound pipeline: descriptor-set layout compilation,
//! pipeline layout and pipeline creation, and descriptor buffers.
//!
//! [`PipelineBundle`] is the per-pass owner: one pipeline, its layout, its
//! set layouts and its descriptor buffers, with a single `bind` call that
//! makes the pass ready to draw or dispatch.

pub mod builder;
pub mod descriptor;

pub use builder::{ComputePipelineBuilder, GraphicsPipelineBuilder};
pub use descriptor::{
    BindingSlot, DescriptorBufferSet, DescriptorCollection, descriptor_image_layout,
};

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::gpu::{
    BindPoint, CommandEncoder, Gpu, PipelineHandle, PipelineLayoutDesc, PipelineLayoutHandle,
    PushConstantRange, SetLayoutHandle,
};
use crate::resources::ResourceRegistry;

/// Resolves a shader name against the fixed shader binary directory.
#[must_use]
pub fn shader_path(name: &str) -> PathBuf {
    Path::new("../shaders").join(name)
}

/// Shader set for a graphics pipeline.
pub enum GraphicsShaderSet {
    /// Vertex + fragment.
    Classic { vertex: String, fragment: String },
    /// Task + mesh + fragment.
    MeshShading {
        task: String,
        mesh: String,
        fragment: String,
    },
}

/// One pass's pipeline state: pipeline, layouts and descriptor buffers.
pub struct PipelineBundle {
    name: String,
    bind_point: BindPoint,
    pipeline: PipelineHandle,
    layout: PipelineLayoutHandle,
    set_layouts: Vec<SetLayoutHandle>,
    descriptors: DescriptorBufferSet,
    push_constant: Option<PushConstantRange>,
}

impl PipelineBundle {
    /// Builds a compute bundle from a single compute shader.
    pub fn new_compute(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        name: &str,
        shader: &str,
        collection: &DescriptorCollection,
        push_constant: Option<PushConstantRange>,
    ) -> Result<Self> {
        let (layout, set_layouts) = Self::build_layouts(gpu, collection, push_constant)?;
        let module = registry.shader(gpu, &shader_path(shader))?;
        let pipeline = ComputePipelineBuilder::new(name)
            .set_shader(module)
            .build(gpu, layout)?;
        let descriptors = DescriptorBufferSet::build(gpu, name, collection)?;
        Ok(Self {
            name: name.to_owned(),
            bind_point: BindPoint::Compute,
            pipeline,
            layout,
            set_layouts,
            descriptors,
            push_constant,
        })
    }

    /// Builds a graphics bundle. The caller configures fixed-function state
    /// on `builder`; shader modules are loaded here through the registry
    /// cache.
    pub fn new_graphics(
        gpu: &dyn Gpu,
        registry: &mut ResourceRegistry,
        name: &str,
        shaders: &GraphicsShaderSet,
        builder: GraphicsPipelineBuilder,
        collection: &DescriptorCollection,
        push_constant: Option<PushConstantRange>,
    ) -> Result<Self> {
        let (layout, set_layouts) = Self::build_layouts(gpu, collection, push_constant)?;
        let builder = match shaders {
            GraphicsShaderSet::Classic { vertex, fragment } => {
                let vertex = registry.shader(gpu, &shader_path(vertex))?;
                let fragment = registry.shader(gpu, &shader_path(fragment))?;
                builder.set_shaders(vertex, fragment)
            }
            GraphicsShaderSet::MeshShading {
                task,
                mesh,
                fragment,
            } => {
                let task = registry.shader(gpu, &shader_path(task))?;
                let mesh = registry.shader(gpu, &shader_path(mesh))?;
                let fragment = registry.shader(gpu, &shader_path(fragment))?;
                builder.set_mesh_shaders(task, mesh, fragment)
            }
        };
        let pipeline = builder.build(gpu, layout)?;
        let descriptors = DescriptorBufferSet::build(gpu, name, collection)?;
        Ok(Self {
            name: name.to_owned(),
            bind_point: BindPoint::Graphics,
            pipeline,
            layout,
            set_layouts,
            descriptors,
            push_constant,
        })
    }

    fn build_layouts(
        gpu: &dyn Gpu,
        collection: &DescriptorCollection,
        push_constant: Option<PushConstantRange>,
    ) -> Result<(PipelineLayoutHandle, Vec<SetLayoutHandle>)> {
        let set_layouts: Vec<SetLayoutHandle> = collection
            .build_layouts(gpu)?
            .into_iter()
            .map(|(_, layout)| layout)
            .collect();
        let layout = gpu.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: &set_layouts,
            push_constant_range: push_constant,
        })?;
        Ok((layout, set_layouts))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn bind_point(&self) -> BindPoint {
        self.bind_point
    }

    #[must_use]
    pub fn pipeline(&self) -> PipelineHandle {
        self.pipeline
    }

    #[must_use]
    pub fn layout(&self) -> PipelineLayoutHandle {
        self.layout
    }

    #[must_use]
    pub fn descriptors(&self) -> &DescriptorBufferSet {
        &self.descriptors
    }

    /// Binds the pipeline, then all descriptor buffers and sets.
    pub fn bind(&self, cmd: &mut dyn CommandEncoder) {
        cmd.bind_pipeline(self.bind_point, self.pipeline);
        self.descriptors.bind(cmd, self.bind_point, self.layout);
    }

    /// Pushes constants through the bundle's declared range.
    pub fn push_constants(&self, cmd: &mut dyn CommandEncoder, data: &[u8]) {
        if let Some(range) = self.push_constant {
            debug_assert!(
                data.len() as u32 <= range.size,
                "push constant payload exceeds declared range for '{}'",
                self.name
            );
            cmd.push_constants(self.layout, range.stages, data);
        }
    }

    /// Destroys every owned backend object.
    pub fn destroy(&self, gpu: &dyn Gpu) {
        gpu.destroy_pipeline(self.pipeline);
        gpu.destroy_pipeline_layout(self.layout);
        for &layout in &self.set_layouts {
            gpu.destroy_set_layout(layout);
        }
        self.descriptors.destroy(gpu);
    }
}

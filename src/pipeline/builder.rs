//! Pipeline Builders
//!
//! Declarative builders for graphics and compute pipelines. The graphics
//! builder covers the fixed-function state the engine's passes vary:
//! topology, polygon mode, culling, blending per color attachment, depth
//! test, attachment formats, and the dynamic states (viewport/scissor are
//! always dynamic; depth bias optionally).

use crate::errors::{EmberError, Result};
use crate::gpu::{
    BlendMode, CompareOp, ComputePipelineDesc, CullMode, DepthState, Format, FrontFace,
    GraphicsPipelineDesc, Gpu, PipelineHandle, PipelineLayoutHandle, PolygonMode,
    PrimitiveTopology, ShaderModuleHandle, ShaderStageDesc, ShaderStageFlags,
};

/// Builder for a graphics pipeline using dynamic rendering.
pub struct GraphicsPipelineBuilder {
    name: String,
    vertex: Option<ShaderModuleHandle>,
    task: Option<ShaderModuleHandle>,
    mesh: Option<ShaderModuleHandle>,
    fragment: Option<ShaderModuleHandle>,
    topology: PrimitiveTopology,
    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,
    blend: Vec<BlendMode>,
    depth: DepthState,
    color_formats: Vec<Format>,
    depth_format: Option<Format>,
    samples: u32,
    dynamic_depth_bias: bool,
}

impl GraphicsPipelineBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: None,
            task: None,
            mesh: None,
            fragment: None,
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            blend: Vec::new(),
            depth: DepthState::default(),
            color_formats: Vec::new(),
            depth_format: None,
            samples: 1,
            dynamic_depth_bias: false,
        }
    }

    /// Classic vertex + fragment stage pair.
    #[must_use]
    pub fn set_shaders(mut self, vertex: ShaderModuleHandle, fragment: ShaderModuleHandle) -> Self {
        self.vertex = Some(vertex);
        self.fragment = Some(fragment);
        self
    }

    /// Mesh-shading stage triple.
    #[must_use]
    pub fn set_mesh_shaders(
        mut self,
        task: ShaderModuleHandle,
        mesh: ShaderModuleHandle,
        fragment: ShaderModuleHandle,
    ) -> Self {
        self.task = Some(task);
        self.mesh = Some(mesh);
        self.fragment = Some(fragment);
        self
    }

    #[must_use]
    pub fn set_input_topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    #[must_use]
    pub fn set_polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    #[must_use]
    pub fn set_cull_mode(mut self, cull_mode: CullMode, front_face: FrontFace) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    #[must_use]
    pub fn set_multisampling_none(mut self) -> Self {
        self.samples = 1;
        self
    }

    /// Disables blending on `count` color attachments.
    #[must_use]
    pub fn disable_blending(mut self, count: usize) -> Self {
        self.blend = vec![BlendMode::None; count];
        self
    }

    #[must_use]
    pub fn enable_blending_additive(mut self) -> Self {
        self.blend = vec![BlendMode::Additive];
        self
    }

    #[must_use]
    pub fn enable_blending_alphablend(mut self) -> Self {
        self.blend = vec![BlendMode::Alpha];
        self
    }

    #[must_use]
    pub fn set_color_attachment_formats(mut self, formats: &[Format]) -> Self {
        self.color_formats = formats.to_vec();
        self
    }

    #[must_use]
    pub fn set_depth_format(mut self, format: Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    #[must_use]
    pub fn disable_depthtest(mut self) -> Self {
        self.depth = DepthState::default();
        self
    }

    #[must_use]
    pub fn enable_depthtest(mut self, write_enable: bool, compare: CompareOp) -> Self {
        self.depth = DepthState {
            test_enable: true,
            write_enable,
            compare,
        };
        self
    }

    #[must_use]
    pub fn enable_dynamic_depth_bias(mut self) -> Self {
        self.dynamic_depth_bias = true;
        self
    }

    /// Declared color attachment formats, in attachment order.
    #[must_use]
    pub fn color_formats(&self) -> &[Format] {
        &self.color_formats
    }

    /// Declared depth attachment format.
    #[must_use]
    pub fn depth_format(&self) -> Option<Format> {
        self.depth_format
    }

    /// Builds the pipeline. Requires either the vertex+fragment pair or
    /// the task+mesh+fragment triple.
    pub fn build(&self, gpu: &dyn Gpu, layout: PipelineLayoutHandle) -> Result<PipelineHandle> {
        let mut stages: Vec<ShaderStageDesc> = Vec::with_capacity(3);
        match (self.vertex, self.task, self.mesh, self.fragment) {
            (Some(vertex), None, None, Some(fragment)) => {
                stages.push(ShaderStageDesc {
                    stage: ShaderStageFlags::VERTEX,
                    module: vertex,
                });
                stages.push(ShaderStageDesc {
                    stage: ShaderStageFlags::FRAGMENT,
                    module: fragment,
                });
            }
            (None, Some(task), Some(mesh), Some(fragment)) => {
                stages.push(ShaderStageDesc {
                    stage: ShaderStageFlags::TASK,
                    module: task,
                });
                stages.push(ShaderStageDesc {
                    stage: ShaderStageFlags::MESH,
                    module: mesh,
                });
                stages.push(ShaderStageDesc {
                    stage: ShaderStageFlags::FRAGMENT,
                    module: fragment,
                });
            }
            _ => {
                return Err(EmberError::Config(format!(
                    "missing shader stage for graphics pipeline '{}'",
                    self.name
                )));
            }
        }

        let blend: Vec<BlendMode> = if self.blend.is_empty() {
            vec![BlendMode::None; self.color_formats.len()]
        } else if self.blend.len() == self.color_formats.len() {
            self.blend.clone()
        } else {
            return Err(EmberError::Config(format!(
                "pipeline '{}' declares {} blend states for {} color attachments",
                self.name,
                self.blend.len(),
                self.color_formats.len()
            )));
        };

        gpu.create_graphics_pipeline(&GraphicsPipelineDesc {
            name: &self.name,
            stages: &stages,
            topology: self.topology,
            polygon_mode: self.polygon_mode,
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            blend: &blend,
            depth: self.depth,
            color_formats: &self.color_formats,
            depth_format: self.depth_format,
            samples: self.samples,
            dynamic_depth_bias: self.dynamic_depth_bias,
            layout,
        })
    }
}

/// Builder for a compute pipeline.
pub struct ComputePipelineBuilder {
    name: String,
    shader: Option<ShaderModuleHandle>,
}

impl ComputePipelineBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shader: None,
        }
    }

    #[must_use]
    pub fn set_shader(mut self, shader: ShaderModuleHandle) -> Self {
        self.shader = Some(shader);
        self
    }

    pub fn build(&self, gpu: &dyn Gpu, layout: PipelineLayoutHandle) -> Result<PipelineHandle> {
        let shader = self.shader.ok_or_else(|| {
            EmberError::Config(format!(
                "missing shader stage for compute pipeline '{}'",
                self.name
            ))
        })?;
        gpu.create_compute_pipeline(&ComputePipelineDesc {
            name: &self.name,
            shader,
            layout,
        })
    }
}

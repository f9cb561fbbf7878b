//! Render Engine
//!
//! Ties the subsystems together: owns the allocator, the frame graph with
//! the default deferred pass chain, the frame-in-flight coordinator and
//! the engine configuration. The host supplies the GPU and window facades
//! plus a [`Repository`] of scene resources, then calls
//! [`render_frame`](RenderEngine::render_frame) once per frame.
//!
//! The engine is single-threaded on the render thread and is neither
//! `Send` nor `Sync`.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;
use std::sync::Arc;

use log::info;

use crate::config::RenderConfig;
use crate::errors::Result;
use crate::frame::{FrameData, OverlayRenderer};
use crate::gpu::{
    AddressMode, CompareOp, Format, Gpu, ImageRole, ImageType, SamplerDesc, SamplerHandle,
};
use crate::graph::passes::cull::{DrawCullPass, TaskSubmitPass};
use crate::graph::passes::geometry::{MeshBufferSet, MeshletDepthPass, MeshletGBufferPass};
use crate::graph::passes::lighting::{LightingConstants, LightingInputs, LightingPass};
use crate::graph::passes::luminance::{
    LightAdaptationPass, LuminanceConstants, LuminanceDownscalePass, LuminancePass,
};
use crate::graph::passes::skybox::SkyboxPass;
use crate::graph::passes::ssao::{SsaoConstants, SsaoPass};
use crate::graph::passes::tone_map::{ToneMapConstants, ToneMapPass};
use crate::graph::passes::volumetric::{
    VolumetricConstants, VolumetricInjectionPass, VolumetricIntegrationPass, VolumetricNoisePass,
    VolumetricScatteringPass, VolumetricSpatialFilterPass,
};
use crate::graph::{CreationType, FrameGraph};
use crate::repository::Repository;
use crate::resources::{
    ImageTemplate, ResourceAllocator, ResourceHandle, ResourceInstance, SamplerTemplate,
};
use crate::window::WindowSource;

const SHADOW_MAP_SIZE: u32 = 8192;
const FROXEL_GRID_SIZE: u32 = 128;
const NOISE_VOLUME_SIZE: u32 = 64;
const LUMINANCE_TILE_SIZE: u32 = 64;

pub struct RenderEngine {
    gpu: Arc<dyn Gpu>,
    config: Rc<RefCell<RenderConfig>>,
    allocator: Arc<ResourceAllocator>,
    graph: FrameGraph,
    frames: FrameData,
    final_image: ResourceHandle,
    delta_time: Rc<Cell<f32>>,
}

impl RenderEngine {
    /// Builds the default deferred frame graph over the given scene
    /// repository and compiles it.
    pub fn new(
        gpu: Arc<dyn Gpu>,
        window: Arc<dyn WindowSource>,
        repository: Repository,
        config: RenderConfig,
    ) -> Result<Self> {
        let config = Rc::new(RefCell::new(config));
        let delta_time = Rc::new(Cell::new(0.0f32));
        let allocator = Arc::new(ResourceAllocator::new(gpu.clone(), window.clone()));
        let mut graph = FrameGraph::new(gpu.clone(), allocator.clone());

        // ------------------------------------------------------------------
        // Internal resources
        // ------------------------------------------------------------------

        let shadow_map = graph.add_image_resource(
            ImageTemplate::new("shadow_map")
                .set_role(ImageRole::Depth, Format::D32Sfloat)
                .set_size_absolute(SHADOW_MAP_SIZE, SHADOW_MAP_SIZE, 1),
            CreationType::Internal,
        )?;
        let g_buffer_1 =
            graph.add_image_resource(ImageTemplate::new("g_buffer_1"), CreationType::Internal)?;
        let g_buffer_2 =
            graph.add_image_resource(ImageTemplate::new("g_buffer_2"), CreationType::Internal)?;
        let g_buffer_3 =
            graph.add_image_resource(ImageTemplate::new("g_buffer_3"), CreationType::Internal)?;
        let g_buffer_depth = graph.add_image_resource(
            ImageTemplate::new("g_buffer_depth").set_role(ImageRole::Depth, Format::D32Sfloat),
            CreationType::Internal,
        )?;
        let scene_lit =
            graph.add_image_resource(ImageTemplate::new("scene_lit"), CreationType::Internal)?;
        let scene_skybox =
            graph.add_image_resource(ImageTemplate::new("scene_skybox"), CreationType::Internal)?;
        let scene_final =
            graph.add_image_resource(ImageTemplate::new("scene_final"), CreationType::Internal)?;

        let ambient_occlusion = graph.add_image_resource(
            ImageTemplate::new("ambient_occlusion")
                .set_role(ImageRole::Color, Format::R16Sfloat)
                .set_size_relative(0.5),
            CreationType::Internal,
        )?;
        let rotation_noise = graph.add_image_resource(
            ImageTemplate::new("ssao_rotation_noise")
                .set_role(ImageRole::Color, Format::R8G8B8A8Unorm)
                .set_size_absolute(4, 4, 1),
            CreationType::Internal,
        )?;

        let volumetric_noise = graph.add_image_resource(
            ImageTemplate::new("volumetric_noise")
                .set_role(ImageRole::Color, Format::R8Unorm)
                .set_image_type(ImageType::Image3d)
                .set_size_absolute(NOISE_VOLUME_SIZE, NOISE_VOLUME_SIZE, NOISE_VOLUME_SIZE),
            CreationType::Internal,
        )?;
        let froxel_template = |name: &str| {
            ImageTemplate::new(name)
                .set_image_type(ImageType::Image3d)
                .set_size_absolute(FROXEL_GRID_SIZE, FROXEL_GRID_SIZE, FROXEL_GRID_SIZE)
        };
        let froxel_data =
            graph.add_image_resource(froxel_template("froxel_data"), CreationType::Internal)?;
        let light_scattering = graph
            .add_image_resource(froxel_template("light_scattering"), CreationType::Internal)?;
        let scattering_filtered = graph.add_image_resource(
            froxel_template("scattering_filtered"),
            CreationType::Internal,
        )?;
        let integrated_scattering = graph.add_image_resource(
            froxel_template("integrated_scattering"),
            CreationType::Internal,
        )?;

        let luminance_tiles = graph.add_image_resource(
            ImageTemplate::new("luminance_tiles")
                .set_role(ImageRole::Color, Format::R16Sfloat)
                .set_size_absolute(LUMINANCE_TILE_SIZE, LUMINANCE_TILE_SIZE, 1),
            CreationType::Internal,
        )?;
        let luminance_average = graph.add_image_resource(
            ImageTemplate::new("luminance_average")
                .set_role(ImageRole::Color, Format::R16Sfloat)
                .set_size_absolute(1, 1, 1),
            CreationType::Internal,
        )?;
        let adapted_luminance = graph.add_image_resource(
            ImageTemplate::new("adapted_luminance")
                .set_role(ImageRole::Color, Format::R16Sfloat)
                .set_size_absolute(1, 1, 1)
                .set_initial_color([1.0e7, 0.0, 0.0, 1.0]),
            CreationType::Internal,
        )?;

        let linear_sampler_handle = graph.add_sampler_resource(SamplerTemplate::new(
            "linear_sampler",
            SamplerDesc::default(),
        ))?;
        let shadow_sampler_handle = graph.add_sampler_resource(SamplerTemplate::new(
            "shadow_sampler",
            SamplerDesc {
                address_mode_u: AddressMode::ClampToBorder,
                address_mode_v: AddressMode::ClampToBorder,
                address_mode_w: AddressMode::ClampToBorder,
                compare: Some(CompareOp::GreaterOrEqual),
                ..SamplerDesc::default()
            },
        ))?;
        let linear_sampler: SamplerHandle =
            graph.registry().sampler(linear_sampler_handle).sampler();
        let shadow_sampler: SamplerHandle =
            graph.registry().sampler(shadow_sampler_handle).sampler();

        // ------------------------------------------------------------------
        // External resources
        // ------------------------------------------------------------------

        let draw_count = repository.draw_count.clone();
        let directional_light_count = repository.directional_light_count.clone();
        let point_light_count = repository.point_light_count.clone();
        let texture_capacity = repository.textures.capacity() as u32;

        let camera = graph.import_resource(ResourceInstance::Buffer(repository.camera))?;
        let mesh = repository.mesh;
        let buffers = MeshBufferSet {
            vertex_positions: graph
                .import_resource(ResourceInstance::Buffer(mesh.vertex_positions))?,
            vertex_data: graph.import_resource(ResourceInstance::Buffer(mesh.vertex_data))?,
            meshlets: graph.import_resource(ResourceInstance::Buffer(mesh.meshlets))?,
            meshlet_vertices: graph
                .import_resource(ResourceInstance::Buffer(mesh.meshlet_vertices))?,
            meshlet_triangles: graph
                .import_resource(ResourceInstance::Buffer(mesh.meshlet_triangles))?,
            mesh_draws: graph.import_resource(ResourceInstance::Buffer(mesh.mesh_draws))?,
            task_commands: graph.import_resource(ResourceInstance::Buffer(mesh.task_commands))?,
            command_count: graph.import_resource(ResourceInstance::Buffer(mesh.command_count))?,
        };
        let materials = graph.import_resource(ResourceInstance::Buffer(repository.materials))?;
        let directional_lights = graph
            .import_resource(ResourceInstance::Buffer(repository.lights.directional_lights))?;
        let point_lights =
            graph.import_resource(ResourceInstance::Buffer(repository.lights.point_lights))?;
        let light_matrices =
            graph.import_resource(ResourceInstance::Buffer(repository.lights.view_projections))?;
        let textures =
            graph.import_resource(ResourceInstance::ImageArray(repository.textures))?;
        let environment_cubemap = graph
            .import_resource(ResourceInstance::Image(repository.environment_cubemap))?;
        let irradiance_cubemap =
            graph.import_resource(ResourceInstance::Image(repository.irradiance_cubemap))?;
        if let Some(tlas) = repository.acceleration_structure {
            graph.import_resource(ResourceInstance::Buffer(tlas))?;
        }

        // ------------------------------------------------------------------
        // Passes, in submission order
        // ------------------------------------------------------------------

        let gpu_ref = gpu.as_ref();

        {
            let count = draw_count.clone();
            let pass = DrawCullPass::new(
                gpu_ref,
                graph.registry_mut(),
                camera,
                buffers.mesh_draws,
                buffers.task_commands,
                buffers.command_count,
                Box::new(move || count.get()),
            )?;
            graph.add_pass(pass)?;
        }
        {
            let pass = TaskSubmitPass::new(
                gpu_ref,
                graph.registry_mut(),
                buffers.task_commands,
                buffers.command_count,
            )?;
            graph.add_pass(pass)?;
        }
        {
            let count = draw_count.clone();
            let pass = MeshletDepthPass::new(
                gpu_ref,
                graph.registry_mut(),
                camera,
                light_matrices,
                buffers,
                shadow_map,
                Box::new(move || count.get()),
            )?;
            graph.add_pass(pass)?;
        }
        {
            let count = draw_count.clone();
            let pass = MeshletGBufferPass::new(
                gpu_ref,
                graph.registry_mut(),
                camera,
                materials,
                textures,
                linear_sampler,
                texture_capacity,
                buffers,
                [g_buffer_1, g_buffer_2, g_buffer_3],
                g_buffer_depth,
                Box::new(move || count.get()),
            )?;
            graph.add_pass(pass)?;
        }
        {
            let cfg = config.clone();
            let pass = SsaoPass::new(
                gpu_ref,
                graph.registry_mut(),
                camera,
                g_buffer_depth,
                g_buffer_2,
                rotation_noise,
                ambient_occlusion,
                linear_sampler,
                Box::new(move || {
                    let ssao = cfg.borrow().ssao;
                    SsaoConstants {
                        radius: ssao.radius,
                        strength: ssao.strength,
                        enabled: u32::from(ssao.enabled),
                        _pad: 0,
                    }
                }),
            )?;
            graph.add_pass(pass)?;
        }

        let volumetric_params = |config: &Rc<RefCell<RenderConfig>>| {
            let cfg = config.clone();
            Box::new(move || {
                let volumetric = cfg.borrow().volumetric;
                VolumetricConstants {
                    density: if volumetric.enabled {
                        volumetric.density
                    } else {
                        0.0
                    },
                    anisotropy: volumetric.anisotropy,
                    noise_scale: volumetric.noise_scale,
                    frame_index: 0,
                }
            }) as Box<dyn Fn() -> VolumetricConstants>
        };
        let pass = VolumetricNoisePass::new(
            gpu_ref,
            graph.registry_mut(),
            volumetric_noise,
            volumetric_params(&config),
        )?;
        graph.add_pass(pass)?;
        let pass = VolumetricInjectionPass::new(
            gpu_ref,
            graph.registry_mut(),
            camera,
            volumetric_noise,
            froxel_data,
            linear_sampler,
            volumetric_params(&config),
        )?;
        graph.add_pass(pass)?;
        let pass = VolumetricScatteringPass::new(
            gpu_ref,
            graph.registry_mut(),
            camera,
            directional_lights,
            light_matrices,
            froxel_data,
            shadow_map,
            light_scattering,
            shadow_sampler,
            volumetric_params(&config),
        )?;
        graph.add_pass(pass)?;
        let pass = VolumetricSpatialFilterPass::new(
            gpu_ref,
            graph.registry_mut(),
            light_scattering,
            scattering_filtered,
            linear_sampler,
            volumetric_params(&config),
        )?;
        graph.add_pass(pass)?;
        let pass = VolumetricIntegrationPass::new(
            gpu_ref,
            graph.registry_mut(),
            scattering_filtered,
            integrated_scattering,
            linear_sampler,
            volumetric_params(&config),
        )?;
        graph.add_pass(pass)?;

        {
            let cfg = config.clone();
            let dir_count = directional_light_count.clone();
            let point_count = point_light_count.clone();
            let pass = LightingPass::new(
                gpu_ref,
                graph.registry_mut(),
                LightingInputs {
                    camera,
                    materials,
                    directional_lights,
                    point_lights,
                    light_matrices,
                    environment_cubemap,
                    irradiance_cubemap,
                },
                [g_buffer_1, g_buffer_2, g_buffer_3],
                g_buffer_depth,
                shadow_map,
                ambient_occlusion,
                integrated_scattering,
                scene_lit,
                linear_sampler,
                Box::new(move || {
                    let c = cfg.borrow();
                    LightingConstants {
                        directional_light_count: dir_count.get(),
                        point_light_count: point_count.get(),
                        ambient_occlusion_strength: if c.ssao.enabled { c.ssao.strength } else { 0.0 },
                        volumetric_enabled: u32::from(c.volumetric.enabled),
                    }
                }),
            )?;
            graph.add_pass(pass)?;
        }
        {
            let cfg = config.clone();
            let pass = SkyboxPass::new(
                gpu_ref,
                graph.registry_mut(),
                camera,
                environment_cubemap,
                scene_skybox,
                linear_sampler,
                Box::new(move || cfg.borrow().skybox_enabled),
            )?;
            graph.add_pass(pass)?;
        }

        let luminance_params = |config: &Rc<RefCell<RenderConfig>>,
                                delta_time: &Rc<Cell<f32>>| {
            let cfg = config.clone();
            let dt = delta_time.clone();
            Box::new(move || {
                let luminance = cfg.borrow().luminance;
                LuminanceConstants {
                    min_log_luminance: luminance.min_log_luminance,
                    max_log_luminance: luminance.max_log_luminance,
                    adaptation_speed: luminance.adaptation_speed,
                    delta_time: dt.get(),
                }
            }) as Box<dyn Fn() -> LuminanceConstants>
        };
        let pass = LuminancePass::new(
            gpu_ref,
            graph.registry_mut(),
            scene_lit,
            luminance_tiles,
            linear_sampler,
            luminance_params(&config, &delta_time),
        )?;
        graph.add_pass(pass)?;
        let pass = LuminanceDownscalePass::new(
            gpu_ref,
            graph.registry_mut(),
            luminance_tiles,
            luminance_average,
            linear_sampler,
        )?;
        graph.add_pass(pass)?;
        let pass = LightAdaptationPass::new(
            gpu_ref,
            graph.registry_mut(),
            luminance_average,
            adapted_luminance,
            linear_sampler,
            luminance_params(&config, &delta_time),
        )?;
        graph.add_pass(pass)?;
        {
            let cfg = config.clone();
            let pass = ToneMapPass::new(
                gpu_ref,
                graph.registry_mut(),
                scene_lit,
                scene_skybox,
                adapted_luminance,
                scene_final,
                linear_sampler,
                Box::new(move || {
                    let hdr = cfg.borrow().hdr;
                    ToneMapConstants {
                        exposure: hdr.exposure,
                        gamma: hdr.gamma,
                        filmic_strength: hdr.filmic_strength,
                        _pad: 0,
                    }
                }),
            )?;
            graph.add_pass(pass)?;
        }

        graph.registry_mut().clear_shader_cache(gpu_ref);
        graph.compile()?;
        info!(
            "engine: compiled deferred graph with {} passes",
            graph.pass_count()
        );

        let frames = FrameData::new(gpu.clone(), window)?;

        Ok(Self {
            gpu,
            config,
            allocator,
            graph,
            frames,
            final_image: scene_final,
            delta_time,
        })
    }

    /// Shared read access to the engine configuration.
    #[must_use]
    pub fn config(&self) -> Ref<'_, RenderConfig> {
        self.config.borrow()
    }

    /// Mutable access to the engine configuration; changes take effect on
    /// the next frame.
    #[must_use]
    pub fn config_mut(&self) -> RefMut<'_, RenderConfig> {
        self.config.borrow_mut()
    }

    /// Pipeline-construction input for the UI overlay.
    #[must_use]
    pub fn swapchain_format(&self) -> Format {
        self.gpu.swapchain_format()
    }

    #[must_use]
    pub fn graph(&self) -> &FrameGraph {
        &self.graph
    }

    /// The image blitted to the swapchain each frame.
    #[must_use]
    pub fn final_image(&self) -> ResourceHandle {
        self.final_image
    }

    /// Signals that the window was resized; the swapchain and every
    /// window-relative resource rebuild before the next frame.
    pub fn request_resize(&mut self) {
        self.frames.request_resize();
    }

    /// Renders one frame. `delta_time` feeds the luminance adaptation.
    pub fn render_frame(
        &mut self,
        delta_time: f32,
        overlay: Option<&mut dyn OverlayRenderer>,
    ) -> Result<()> {
        self.delta_time.set(delta_time);
        let vsync = self.config.borrow().vsync;
        self.frames
            .render_frame(&self.allocator, &mut self.graph, self.final_image, vsync, overlay)
    }

    /// Tears the engine down: waits for the device, destroys graph-owned
    /// resources, staging memory and frame synchronization objects.
    pub fn shutdown(&mut self) {
        self.gpu.device_wait_idle();
        self.graph.destroy();
        self.allocator.shutdown();
        self.frames.destroy();
    }
}

//! # Ember
//!
//! A real-time 3D rendering engine core built around a declarative frame
//! graph over an explicit GPU API facade.
//!
//! Per frame, the [`FrameGraph`](graph::FrameGraph) holds a DAG of render
//! passes and the resources they consume and produce. It allocates and
//! reuses GPU resources from declared templates, topologically orders
//! passes by their read/write dependencies, synthesizes the minimal
//! memory/image/buffer barriers between them, manages descriptor buffers
//! and pipelines per pass, and executes the ordered passes into a command
//! buffer. [`RenderEngine`](engine::RenderEngine) wires the default
//! deferred pipeline (GPU-driven meshlet culling, G-buffer, SSAO,
//! volumetric lighting, deferred shading, skybox, auto-exposure, tone
//! mapping) on top of that machinery.
//!
//! The crate never talks to a concrete GPU API: hosts implement the
//! [`Gpu`](gpu::Gpu) and [`CommandEncoder`](gpu::CommandEncoder) facade
//! traits for their backend, the [`WindowSource`](window::WindowSource)
//! facade for surface sizing, and supply scene resources through a
//! [`Repository`](repository::Repository). Scene/ECS management, asset
//! import and UI rendering live outside this crate.

pub mod config;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod gpu;
pub mod graph;
pub mod pipeline;
pub mod repository;
pub mod resources;
pub mod window;

pub use config::RenderConfig;
pub use engine::RenderEngine;
pub use errors::{EmberError, Result};
pub use frame::{FRAMES_IN_FLIGHT, FrameData, OverlayRenderer};
pub use graph::{CreationType, FrameGraph};
pub use repository::{CameraData, Repository};
pub use resources::{
    BufferTemplate, ImageTemplate, ResourceAllocator, ResourceHandle, ResourceRegistry,
    SamplerTemplate,
};
pub use window::WindowSource;

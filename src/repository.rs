//! Scene Resource Repository
//!
//! The externally owned GPU resources the engine imports into its frame
//! graph: camera and light buffers, the meshlet geometry buffers, the
//! material table, the bindless texture array and the environment maps.
//! The owning subsystem (ECS, asset streaming) creates these — typically
//! through the [`ResourceAllocator`](crate::resources::ResourceAllocator) —
//! updates their contents between frames, and hands them over here by
//! value; the engine re-exports them as EXTERNAL graph edges.
//!
//! The `Cell` counters are shared knobs the owner updates per frame and
//! pass providers read at execute time.

use std::cell::Cell;
use std::rc::Rc;

use glam::{Mat4, Vec4};

use crate::resources::{BufferInstance, ImageArrayInstance, ImageInstance};

/// CPU-side layout of the per-frame camera buffer.
///
/// The owner writes one of these into [`Repository::camera`] between the
/// previous frame's fence wait and the current frame's execute; shaders
/// read it as a uniform block.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraData {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// World-space camera position; `w` is unused padding.
    pub position: Vec4,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            position: Vec4::ZERO,
        }
    }
}

/// Meshlet geometry buffers.
pub struct MeshBuffers {
    pub vertex_positions: BufferInstance,
    pub vertex_data: BufferInstance,
    pub meshlets: BufferInstance,
    pub meshlet_vertices: BufferInstance,
    pub meshlet_triangles: BufferInstance,
    pub mesh_draws: BufferInstance,
    /// Task commands written by the culling pass, consumed indirectly.
    pub task_commands: BufferInstance,
    /// Surviving-command count written by the culling pass.
    pub command_count: BufferInstance,
}

/// Light data buffers.
pub struct LightBuffers {
    pub directional_lights: BufferInstance,
    pub point_lights: BufferInstance,
    pub view_projections: BufferInstance,
}

/// Everything the scene side supplies to the renderer.
pub struct Repository {
    pub camera: BufferInstance,
    pub mesh: MeshBuffers,
    pub lights: LightBuffers,
    pub materials: BufferInstance,
    /// Bindless material textures.
    pub textures: ImageArrayInstance,
    pub environment_cubemap: ImageInstance,
    pub irradiance_cubemap: ImageInstance,
    /// Top-level acceleration structure buffer, present when the host
    /// builds one. No default pass consumes it; it is re-exported for
    /// custom ray-query passes.
    pub acceleration_structure: Option<BufferInstance>,

    /// Total mesh-draw count for the culling dispatch.
    pub draw_count: Rc<Cell<u32>>,
    pub directional_light_count: Rc<Cell<u32>>,
    pub point_light_count: Rc<Cell<u32>>,
}

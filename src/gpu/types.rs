//! GPU Value Types
//!
//! The dialect-neutral vocabulary shared between the engine core and the
//! GPU facade: formats, image layouts, access and pipeline-stage masks,
//! usage flags, extents, clear values and opaque object handles.
//!
//! The names mirror explicit-API (Vulkan-style) semantics so that barrier
//! synthesis can be expressed precisely, but none of these types commit
//! the engine to a particular backend. A backend maps handles to its own
//! objects; the mock backend used by the test suite maps them to counters.

use bitflags::bitflags;

// ============================================================================
// Opaque object handles
// ============================================================================

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The null handle.
            pub const NULL: Self = Self(0);

            /// Returns `true` if this is the null handle.
            #[inline]
            #[must_use]
            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

define_handle!(
    /// Backend image object.
    ImageHandle
);
define_handle!(
    /// Backend image view object.
    ImageViewHandle
);
define_handle!(
    /// Backend buffer object.
    BufferHandle
);
define_handle!(
    /// Backend sampler object.
    SamplerHandle
);
define_handle!(
    /// Backend shader module object.
    ShaderModuleHandle
);
define_handle!(
    /// Backend pipeline object (graphics or compute).
    PipelineHandle
);
define_handle!(
    /// Backend pipeline layout object.
    PipelineLayoutHandle
);
define_handle!(
    /// Backend descriptor-set layout object.
    SetLayoutHandle
);
define_handle!(
    /// Backend fence object.
    FenceHandle
);
define_handle!(
    /// Backend semaphore object.
    SemaphoreHandle
);

/// GPU virtual address of a buffer.
pub type DeviceAddress = u64;

// ============================================================================
// Formats
// ============================================================================

/// Texel formats used by the engine core.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Format {
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    B8G8R8A8Unorm,
    R16Sfloat,
    R16G16B16A16Sfloat,
    R32G32B32A32Sfloat,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

impl Format {
    /// Returns `true` for depth and depth-stencil formats.
    #[inline]
    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Format::D32Sfloat | Format::D24UnormS8Uint | Format::D32SfloatS8Uint
        )
    }

    /// Returns `true` for combined depth-stencil formats.
    #[inline]
    #[must_use]
    pub fn has_stencil(self) -> bool {
        matches!(self, Format::D24UnormS8Uint | Format::D32SfloatS8Uint)
    }

    /// The image aspect implied by this format.
    #[must_use]
    pub fn aspect(self) -> ImageAspectFlags {
        if self.is_depth() {
            if self.has_stencil() {
                ImageAspectFlags::DEPTH | ImageAspectFlags::STENCIL
            } else {
                ImageAspectFlags::DEPTH
            }
        } else {
            ImageAspectFlags::COLOR
        }
    }

    /// Bytes per texel; used to size staging uploads.
    #[must_use]
    pub fn texel_size(self) -> u64 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::R8G8Unorm | Format::R16Sfloat => 2,
            Format::R8G8B8A8Unorm
            | Format::B8G8R8A8Unorm
            | Format::D32Sfloat
            | Format::D24UnormS8Uint => 4,
            Format::D32SfloatS8Uint => 5,
            Format::R16G16B16A16Sfloat => 8,
            Format::R32G32B32A32Sfloat => 16,
        }
    }
}

// ============================================================================
// Layouts, access and stage masks
// ============================================================================

/// Image memory layout as observed by the next GPU command.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
}

bitflags! {
    /// Memory access mask for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u64 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const UNIFORM_READ = 1 << 1;
        const SHADER_SAMPLED_READ = 1 << 2;
        const SHADER_STORAGE_READ = 1 << 3;
        const SHADER_STORAGE_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const HOST_READ = 1 << 11;
        const HOST_WRITE = 1 << 12;
        const MEMORY_READ = 1 << 13;
        const MEMORY_WRITE = 1 << 14;
    }
}

bitflags! {
    /// Pipeline stage mask for barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStageFlags: u64 {
        const TOP_OF_PIPE = 1 << 0;
        const DRAW_INDIRECT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const TASK_SHADER = 1 << 3;
        const MESH_SHADER = 1 << 4;
        const FRAGMENT_SHADER = 1 << 5;
        const EARLY_FRAGMENT_TESTS = 1 << 6;
        const LATE_FRAGMENT_TESTS = 1 << 7;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 8;
        const COMPUTE_SHADER = 1 << 9;
        const TRANSFER = 1 << 10;
        const HOST = 1 << 11;
        const ALL_GRAPHICS = 1 << 12;
        const ALL_COMMANDS = 1 << 13;
        const BOTTOM_OF_PIPE = 1 << 14;
    }
}

bitflags! {
    /// Shader stages a binding or push-constant range is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const COMPUTE = 1 << 2;
        const TASK = 1 << 3;
        const MESH = 1 << 4;
    }
}

impl ShaderStageFlags {
    /// All graphics-capable stages.
    pub const ALL_GRAPHICS: Self = Self::VERTEX
        .union(Self::FRAGMENT)
        .union(Self::TASK)
        .union(Self::MESH);
}

// ============================================================================
// Usage flags and aspects
// ============================================================================

bitflags! {
    /// Image usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageUsageFlags: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

bitflags! {
    /// Buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferUsageFlags: u32 {
        const UNIFORM = 1 << 0;
        const STORAGE = 1 << 1;
        const INDEX = 1 << 2;
        const VERTEX = 1 << 3;
        const INDIRECT = 1 << 4;
        const TRANSFER_SRC = 1 << 5;
        const TRANSFER_DST = 1 << 6;
        const SHADER_DEVICE_ADDRESS = 1 << 7;
        const RESOURCE_DESCRIPTOR = 1 << 8;
        const SAMPLER_DESCRIPTOR = 1 << 9;
    }
}

bitflags! {
    /// Image aspect flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ImageAspectFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

/// Memory placement hint for buffer allocations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum MemoryUsage {
    /// Device-local memory, not host accessible.
    #[default]
    GpuOnly,
    /// Host-visible memory for per-frame CPU writes.
    CpuToGpu,
}

// ============================================================================
// Geometry
// ============================================================================

/// Two-dimensional extent in pixels.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Three-dimensional extent in texels; `depth == 1` for 2D images.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3d {
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Total texel count.
    #[inline]
    #[must_use]
    pub fn texel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height) * u64::from(self.depth)
    }
}

impl From<Extent2d> for Extent3d {
    fn from(e: Extent2d) -> Self {
        Self::new(e.width, e.height, 1)
    }
}

/// Viewport rectangle with depth range.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Scissor rectangle.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

// ============================================================================
// Clear values
// ============================================================================

/// Initial or attachment clear value for an image.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0, 0.0, 0.0, 1.0])
    }
}

// ============================================================================
// Images, buffers, samplers
// ============================================================================

/// Dimensionality of an image resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ImageType {
    #[default]
    Image2d,
    Image3d,
    Cubemap,
}

impl ImageType {
    /// Array layers implied by the image type.
    #[inline]
    #[must_use]
    pub fn layer_count(self) -> u32 {
        match self {
            ImageType::Image2d | ImageType::Image3d => 1,
            ImageType::Cubemap => 6,
        }
    }
}

/// Whether an image participates as a color or depth target.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum ImageRole {
    #[default]
    Color,
    Depth,
}

/// Creation parameters for a backend image plus its default view.
#[derive(Clone, Debug)]
pub struct ImageDesc<'a> {
    pub name: &'a str,
    pub image_type: ImageType,
    pub format: Format,
    pub extent: Extent3d,
    pub usage: ImageUsageFlags,
    pub aspect: ImageAspectFlags,
    pub mip_levels: u32,
}

/// An image plus its default full-subresource view, as returned by the
/// backend.
#[derive(Clone, Copy, Debug)]
pub struct AllocatedImage {
    pub image: ImageHandle,
    pub view: ImageViewHandle,
}

/// Creation parameters for a backend buffer.
#[derive(Clone, Debug)]
pub struct BufferDesc<'a> {
    pub name: &'a str,
    pub size: u64,
    pub usage: BufferUsageFlags,
    pub memory: MemoryUsage,
}

/// A buffer allocation, as returned by the backend.
#[derive(Clone, Copy, Debug)]
pub struct AllocatedBuffer {
    pub buffer: BufferHandle,
    pub address: DeviceAddress,
    /// `true` when the allocation is mapped and reachable through
    /// [`Gpu::write_buffer`](super::Gpu::write_buffer).
    pub host_visible: bool,
}

/// Texture filtering mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Mipmap selection mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum MipmapMode {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate addressing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Depth/stencil and sampler comparison operator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum CompareOp {
    Never,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    #[default]
    GreaterOrEqual,
    Greater,
    Always,
}

/// Border color for `AddressMode::ClampToBorder`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

/// Creation parameters for a backend sampler.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: MipmapMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub max_anisotropy: Option<f32>,
    pub compare: Option<CompareOp>,
    pub border_color: BorderColor,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: MipmapMode::Linear,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            max_anisotropy: None,
            compare: None,
            border_color: BorderColor::TransparentBlack,
        }
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Descriptor record kinds supported by the pipeline builder.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
    SampledImage,
    StorageImage,
    Sampler,
}

/// One binding within a descriptor-set layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub descriptor_count: u32,
    pub stages: ShaderStageFlags,
}

/// A single descriptor record to be written into a descriptor buffer.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum DescriptorWrite {
    Image {
        descriptor_type: DescriptorType,
        view: ImageViewHandle,
        layout: ImageLayout,
        sampler: Option<SamplerHandle>,
    },
    Buffer {
        descriptor_type: DescriptorType,
        address: DeviceAddress,
        range: u64,
    },
    Sampler {
        sampler: SamplerHandle,
    },
}

/// A descriptor buffer made resident for the subsequent set bindings.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DescriptorBufferBindingInfo {
    pub address: DeviceAddress,
    pub usage: BufferUsageFlags,
}

// ============================================================================
// Pipelines
// ============================================================================

/// Pipeline bind point.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BindPoint {
    Graphics,
    Compute,
}

/// Push constant range attached to a pipeline layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PushConstantRange {
    pub size: u32,
    pub stages: ShaderStageFlags,
}

/// Creation parameters for a pipeline layout.
#[derive(Clone, Debug)]
pub struct PipelineLayoutDesc<'a> {
    pub set_layouts: &'a [SetLayoutHandle],
    pub push_constant_range: Option<PushConstantRange>,
}

/// Primitive assembly topology.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

/// Face culling mode.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

/// Winding order considered front-facing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

/// Per-color-attachment blend configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum BlendMode {
    #[default]
    None,
    Additive,
    Alpha,
}

/// Depth test configuration.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: false,
            write_enable: false,
            compare: CompareOp::Always,
        }
    }
}

/// One shader stage of a pipeline.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ShaderStageDesc {
    pub stage: ShaderStageFlags,
    pub module: ShaderModuleHandle,
}

/// Creation parameters for a graphics pipeline (dynamic rendering,
/// dynamic viewport/scissor).
#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc<'a> {
    pub name: &'a str,
    pub stages: &'a [ShaderStageDesc],
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub blend: &'a [BlendMode],
    pub depth: DepthState,
    pub color_formats: &'a [Format],
    pub depth_format: Option<Format>,
    pub samples: u32,
    pub dynamic_depth_bias: bool,
    pub layout: PipelineLayoutHandle,
}

/// Creation parameters for a compute pipeline.
#[derive(Clone, Debug)]
pub struct ComputePipelineDesc<'a> {
    pub name: &'a str,
    pub shader: ShaderModuleHandle,
    pub layout: PipelineLayoutHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_report_depth_aspect() {
        assert!(Format::D32Sfloat.is_depth());
        assert!(!Format::D32Sfloat.has_stencil());
        assert_eq!(Format::D32Sfloat.aspect(), ImageAspectFlags::DEPTH);
        assert_eq!(
            Format::D24UnormS8Uint.aspect(),
            ImageAspectFlags::DEPTH | ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn color_formats_report_color_aspect() {
        assert_eq!(Format::R8G8B8A8Unorm.aspect(), ImageAspectFlags::COLOR);
        assert_eq!(Format::R16G16B16A16Sfloat.aspect(), ImageAspectFlags::COLOR);
    }

    #[test]
    fn all_graphics_covers_every_graphics_stage() {
        assert!(ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::FRAGMENT));
        assert!(ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::MESH));
        assert!(!ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::COMPUTE));
    }
}

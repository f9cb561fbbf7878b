//! Resource Templates
//!
//! Templates describe a GPU resource without creating it. The frame graph
//! consumes them at build time through the
//! [`ResourceAllocator`](super::allocator::ResourceAllocator), which turns
//! each template into a live instance.

use std::path::PathBuf;

use crate::gpu::{
    BufferUsageFlags, ClearValue, Extent3d, Format, ImageRole, ImageType, MemoryUsage, SamplerDesc,
};

/// Size specification for an image template.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ImageSize {
    /// Scale factor applied to the current window resolution.
    Relative(f32),
    /// Fixed dimensions, independent of the window.
    Absolute(Extent3d),
}

/// Initial contents of an image.
#[derive(Clone, PartialEq, Debug)]
pub enum ImageInitial {
    /// Cleared to a constant value at the next allocator flush.
    Clear(ClearValue),
    /// Decoded from a file and uploaded at the next allocator flush.
    File(PathBuf),
}

/// Description of an image resource.
///
/// Defaults: 2D color image, `R16G16B16A16Sfloat`, full window resolution,
/// cleared to opaque black, no mip chain.
#[derive(Clone, Debug)]
pub struct ImageTemplate {
    pub name: String,
    pub image_type: ImageType,
    pub role: ImageRole,
    pub format: Format,
    pub size: ImageSize,
    pub initial: ImageInitial,
    pub mipmapped: bool,
}

impl ImageTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image_type: ImageType::Image2d,
            role: ImageRole::Color,
            format: Format::R16G16B16A16Sfloat,
            size: ImageSize::Relative(1.0),
            initial: ImageInitial::Clear(ClearValue::default()),
            mipmapped: false,
        }
    }

    #[must_use]
    pub fn set_image_type(mut self, image_type: ImageType) -> Self {
        self.image_type = image_type;
        self
    }

    /// Sets role and format together; depth roles require depth formats.
    #[must_use]
    pub fn set_role(mut self, role: ImageRole, format: Format) -> Self {
        assert!(
            (role == ImageRole::Depth) == format.is_depth(),
            "image role and format disagree for '{}'",
            self.name
        );
        self.role = role;
        self.format = format;
        if role == ImageRole::Depth {
            self.initial = ImageInitial::Clear(ClearValue::DepthStencil {
                depth: 0.0,
                stencil: 0,
            });
        }
        self
    }

    #[must_use]
    pub fn set_initial_color(mut self, color: [f32; 4]) -> Self {
        assert!(
            self.role == ImageRole::Color,
            "clear color only supported for color images"
        );
        self.initial = ImageInitial::Clear(ClearValue::Color(color));
        self
    }

    #[must_use]
    pub fn set_initial_depth(mut self, depth: f32) -> Self {
        assert!(
            self.role == ImageRole::Depth,
            "clear depth only supported for depth images"
        );
        self.initial = ImageInitial::Clear(ClearValue::DepthStencil { depth, stencil: 0 });
        self
    }

    /// Initial contents decoded from a file; the format is derived from the
    /// file's channel count at allocation time.
    #[must_use]
    pub fn set_initial_file(mut self, path: impl Into<PathBuf>) -> Self {
        assert!(
            self.role == ImageRole::Color,
            "file contents only supported for color images"
        );
        self.initial = ImageInitial::File(path.into());
        self
    }

    /// Sizes the image as a scale of the window resolution.
    #[must_use]
    pub fn set_size_relative(mut self, scale: f32) -> Self {
        assert!(scale > 0.0, "scale must be positive");
        assert!(scale <= 16.0, "scale cannot be higher than 16.0");
        self.size = ImageSize::Relative(scale);
        self
    }

    /// Sizes the image with fixed dimensions. `depth > 1` implies a 3D image.
    #[must_use]
    pub fn set_size_absolute(mut self, width: u32, height: u32, depth: u32) -> Self {
        assert!(width > 0 && height > 0, "width and height must be positive");
        self.size = ImageSize::Absolute(Extent3d::new(width, height, depth.max(1)));
        self
    }

    #[must_use]
    pub fn set_mipmapped(mut self, mipmapped: bool) -> Self {
        self.mipmapped = mipmapped;
        self
    }
}

/// Description of a buffer resource.
#[derive(Clone, Debug)]
pub struct BufferTemplate {
    pub name: String,
    pub size: u64,
    pub usage: BufferUsageFlags,
    pub memory: MemoryUsage,
}

impl BufferTemplate {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        size: u64,
        usage: BufferUsageFlags,
        memory: MemoryUsage,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            usage,
            memory,
        }
    }
}

/// Description of an immutable sampler.
#[derive(Clone, Debug)]
pub struct SamplerTemplate {
    pub name: String,
    pub desc: SamplerDesc,
}

impl SamplerTemplate {
    #[must_use]
    pub fn new(name: impl Into<String>, desc: SamplerDesc) -> Self {
        Self {
            name: name.into(),
            desc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_template_defaults() {
        let t = ImageTemplate::new("scene_lit");
        assert_eq!(t.format, Format::R16G16B16A16Sfloat);
        assert_eq!(t.size, ImageSize::Relative(1.0));
        assert!(matches!(t.initial, ImageInitial::Clear(_)));
    }

    #[test]
    fn depth_role_swaps_default_clear() {
        let t = ImageTemplate::new("g_buffer_depth").set_role(ImageRole::Depth, Format::D32Sfloat);
        assert!(matches!(
            t.initial,
            ImageInitial::Clear(ClearValue::DepthStencil { .. })
        ));
    }

    #[test]
    #[should_panic(expected = "scale")]
    fn oversized_relative_scale_is_rejected() {
        let _ = ImageTemplate::new("bad").set_size_relative(17.0);
    }
}

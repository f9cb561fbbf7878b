//! Resource Allocator
//!
//! Turns [`ImageTemplate`]s and [`BufferTemplate`]s into live instances and
//! owns the deferred initialization work: clear values and decoded file
//! contents are queued as tasks and drained onto a command buffer once per
//! frame by [`flush`](ResourceAllocator::flush), immediately before the
//! frame graph executes.
//!
//! Relative-sized images resolve against the current window extent at
//! creation time and can be rebuilt after a resize via
//! [`recreate_image`](ResourceAllocator::recreate_image).

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::errors::{EmberError, Result};
use crate::gpu::{
    AccessFlags, AllocatedBuffer, AllocatedImage, BufferDesc, BufferUsageFlags, ClearValue,
    CommandEncoder, Dependency, Extent3d, Format, Gpu, ImageBarrier, ImageDesc, ImageLayout,
    ImageRole, ImageType, ImageUsageFlags, MemoryUsage, PipelineStageFlags,
};
use crate::window::WindowSource;

use super::instance::{BufferInstance, ImageInstance, ResourceState, SamplerInstance};
use super::template::{BufferTemplate, ImageInitial, ImageSize, ImageTemplate, SamplerTemplate};

// ============================================================================
// Image file decoding
// ============================================================================

/// CPU-side decoded image contents ready for upload.
struct DecodedImage {
    pixels: Vec<u8>,
    extent: Extent3d,
    format: Format,
}

/// Format selection by channel count. Three-channel data is promoted to
/// four channels; anything wider than four is rejected.
fn format_for_channels(channels: u8) -> Result<Format> {
    match channels {
        1 => Ok(Format::R8Unorm),
        2 => Ok(Format::R8G8Unorm),
        3 | 4 => Ok(Format::R8G8B8A8Unorm),
        n => Err(EmberError::Allocation(format!(
            "unsupported number of channels in image data: {n}"
        ))),
    }
}

/// Returns `true` for floating-point HDR containers, detected by extension.
fn is_hdr_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("hdr") || e.eq_ignore_ascii_case("exr"))
}

fn decode_image_file(path: &Path) -> Result<DecodedImage> {
    let decoded = image::open(path).map_err(|err| {
        EmberError::Allocation(format!("cannot decode '{}': {err}", path.display()))
    })?;

    if is_hdr_file(path) {
        let rgba = decoded.to_rgba32f();
        let (width, height) = rgba.dimensions();
        return Ok(DecodedImage {
            pixels: bytemuck::cast_slice(rgba.as_raw()).to_vec(),
            extent: Extent3d::new(width, height, 1),
            format: Format::R32G32B32A32Sfloat,
        });
    }

    let channels = decoded.color().channel_count();
    let format = format_for_channels(channels)?;
    let (width, height) = (decoded.width(), decoded.height());
    let pixels = match format {
        Format::R8Unorm => decoded.to_luma8().into_raw(),
        Format::R8G8Unorm => decoded.to_luma_alpha8().into_raw(),
        Format::R8G8B8A8Unorm => decoded.to_rgba8().into_raw(),
        _ => unreachable!("format_for_channels only yields 8-bit formats"),
    };
    Ok(DecodedImage {
        pixels,
        extent: Extent3d::new(width, height, 1),
        format,
    })
}

// ============================================================================
// Deferred initialization tasks
// ============================================================================

enum PendingTask {
    Clear {
        image: crate::gpu::ImageHandle,
        role: ImageRole,
        aspect: crate::gpu::ImageAspectFlags,
        value: ClearValue,
    },
    Upload {
        staging: crate::gpu::BufferHandle,
        image: crate::gpu::ImageHandle,
        extent: Extent3d,
    },
}

// ============================================================================
// Allocator
// ============================================================================

pub struct ResourceAllocator {
    gpu: Arc<dyn Gpu>,
    window: Arc<dyn WindowSource>,
    pending: Mutex<VecDeque<PendingTask>>,
    /// Staging buffers whose copies have been recorded. Freed at shutdown;
    /// they must outlive the frames that reference them.
    spent_staging: Mutex<Vec<crate::gpu::BufferHandle>>,
}

impl ResourceAllocator {
    #[must_use]
    pub fn new(gpu: Arc<dyn Gpu>, window: Arc<dyn WindowSource>) -> Self {
        Self {
            gpu,
            window,
            pending: Mutex::new(VecDeque::new()),
            spent_staging: Mutex::new(Vec::new()),
        }
    }

    /// Resolves a template's size against the current window extent.
    fn resolve_extent(&self, template: &ImageTemplate) -> Result<Extent3d> {
        let extent = match template.size {
            ImageSize::Absolute(extent) => extent,
            ImageSize::Relative(scale) => {
                let window = self.window.extent();
                Extent3d::new(
                    (window.width as f32 * scale) as u32,
                    (window.height as f32 * scale) as u32,
                    1,
                )
            }
        };
        if extent.width == 0 || extent.height == 0 {
            return Err(EmberError::Allocation(format!(
                "image '{}' resolves to a zero-sized extent",
                template.name
            )));
        }
        Ok(extent)
    }

    fn usage_for_role(role: ImageRole) -> ImageUsageFlags {
        match role {
            ImageRole::Color => {
                ImageUsageFlags::SAMPLED
                    | ImageUsageFlags::STORAGE
                    | ImageUsageFlags::COLOR_ATTACHMENT
                    | ImageUsageFlags::TRANSFER_SRC
                    | ImageUsageFlags::TRANSFER_DST
            }
            ImageRole::Depth => {
                ImageUsageFlags::SAMPLED
                    | ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | ImageUsageFlags::TRANSFER_SRC
                    | ImageUsageFlags::TRANSFER_DST
            }
        }
    }

    fn mip_levels(template: &ImageTemplate, extent: Extent3d) -> u32 {
        if template.mipmapped {
            extent.width.max(extent.height).max(1).ilog2() + 1
        } else {
            1
        }
    }

    /// Creates a live image from a template.
    ///
    /// File-backed templates take their format and extent from the decoded
    /// file. All images are queued for initialization (clear or upload) at
    /// the next [`flush`](Self::flush).
    pub fn create_image(&self, template: &ImageTemplate) -> Result<ImageInstance> {
        let (format, extent, upload) = match &template.initial {
            ImageInitial::File(path) => {
                let decoded = decode_image_file(path)?;
                (decoded.format, decoded.extent, Some(decoded))
            }
            ImageInitial::Clear(_) => (template.format, self.resolve_extent(template)?, None),
        };

        let image_type = if extent.depth > 1 {
            ImageType::Image3d
        } else {
            template.image_type
        };

        let allocated = self.gpu.create_image(&ImageDesc {
            name: &template.name,
            image_type,
            format,
            extent,
            usage: Self::usage_for_role(template.role),
            aspect: format.aspect(),
            mip_levels: Self::mip_levels(template, extent),
        })?;
        self.gpu.set_debug_name(&template.name, allocated.image.0);
        debug!(
            "allocator: image '{}' {}x{}x{} {:?}",
            template.name, extent.width, extent.height, extent.depth, format
        );

        let instance = ImageInstance::new(
            &template.name,
            allocated.image,
            allocated.view,
            format,
            extent,
            image_type,
            template.role,
        );

        match (&template.initial, upload) {
            (ImageInitial::File(_), Some(decoded)) => {
                self.enqueue_upload(&template.name, &instance, &decoded)?;
            }
            (ImageInitial::Clear(value), _) => {
                self.pending.lock().push_back(PendingTask::Clear {
                    image: allocated.image,
                    role: template.role,
                    aspect: format.aspect(),
                    value: *value,
                });
            }
            (ImageInitial::File(_), None) => unreachable!("file templates always decode"),
        }

        // The queued task leaves the image in transfer-dst state; record it
        // now so the first graph barrier sees the post-flush truth.
        instance.set_state(ResourceState {
            layout: ImageLayout::TransferDstOptimal,
            access: AccessFlags::TRANSFER_WRITE,
            stage: PipelineStageFlags::TRANSFER,
        });
        Ok(instance)
    }

    fn enqueue_upload(
        &self,
        name: &str,
        instance: &ImageInstance,
        decoded: &DecodedImage,
    ) -> Result<()> {
        let staging = self.gpu.create_buffer(&BufferDesc {
            name: &format!("{name}_staging"),
            size: decoded.pixels.len() as u64,
            usage: BufferUsageFlags::TRANSFER_SRC,
            memory: MemoryUsage::CpuToGpu,
        })?;
        self.gpu.write_buffer(staging.buffer, 0, &decoded.pixels)?;
        self.pending.lock().push_back(PendingTask::Upload {
            staging: staging.buffer,
            image: instance.image(),
            extent: decoded.extent,
        });
        Ok(())
    }

    /// Creates a live buffer from a template.
    pub fn create_buffer(&self, template: &BufferTemplate) -> Result<BufferInstance> {
        let allocated: AllocatedBuffer = self.gpu.create_buffer(&BufferDesc {
            name: &template.name,
            size: template.size,
            usage: template.usage | BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            memory: template.memory,
        })?;
        self.gpu.set_debug_name(&template.name, allocated.buffer.0);
        debug!("allocator: buffer '{}' {} bytes", template.name, template.size);
        Ok(BufferInstance::new(
            &template.name,
            allocated.buffer,
            allocated.address,
            template.size,
            template.usage,
            allocated.host_visible,
        ))
    }

    /// Creates an immutable sampler from a template.
    pub fn create_sampler(&self, template: &SamplerTemplate) -> Result<SamplerInstance> {
        let sampler = self.gpu.create_sampler(&template.desc)?;
        self.gpu.set_debug_name(&template.name, sampler.0);
        Ok(SamplerInstance::new(&template.name, sampler))
    }

    /// Rebuilds a relative-sized image at the current window extent,
    /// swapping the instance's backing objects in place and re-queueing its
    /// clear task. Must only be called between frames.
    pub fn recreate_image(
        &self,
        instance: &mut ImageInstance,
        template: &ImageTemplate,
    ) -> Result<()> {
        debug_assert!(matches!(template.size, ImageSize::Relative(_)));
        let extent = self.resolve_extent(template)?;
        if extent == instance.extent() {
            return Ok(());
        }

        self.gpu.destroy_image(AllocatedImage {
            image: instance.image(),
            view: instance.view(),
        });
        let allocated = self.gpu.create_image(&ImageDesc {
            name: &template.name,
            image_type: template.image_type,
            format: instance.format(),
            extent,
            usage: Self::usage_for_role(template.role),
            aspect: instance.format().aspect(),
            mip_levels: Self::mip_levels(template, extent),
        })?;
        self.gpu.set_debug_name(&template.name, allocated.image.0);
        instance.replace_backing(allocated.image, allocated.view, extent);

        if let ImageInitial::Clear(value) = template.initial {
            self.pending.lock().push_back(PendingTask::Clear {
                image: allocated.image,
                role: template.role,
                aspect: instance.format().aspect(),
                value,
            });
            instance.set_state(ResourceState {
                layout: ImageLayout::TransferDstOptimal,
                access: AccessFlags::TRANSFER_WRITE,
                stage: PipelineStageFlags::TRANSFER,
            });
        }
        debug!(
            "allocator: rebuilt '{}' at {}x{}",
            template.name, extent.width, extent.height
        );
        Ok(())
    }

    /// Number of tasks waiting for the next flush.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drains all pending upload/clear tasks onto the given command buffer.
    /// Invoked once per frame immediately before the graph executes.
    pub fn flush(&self, cmd: &mut dyn CommandEncoder) {
        let mut pending = self.pending.lock();
        while let Some(task) = pending.pop_front() {
            match task {
                PendingTask::Clear {
                    image,
                    role,
                    aspect,
                    value,
                } => {
                    cmd.pipeline_barrier(&transfer_dst_dependency(image, aspect));
                    match (role, value) {
                        (ImageRole::Color, ClearValue::Color(color)) => {
                            cmd.clear_color_image(image, ImageLayout::TransferDstOptimal, color);
                        }
                        (ImageRole::Depth, ClearValue::DepthStencil { depth, stencil }) => {
                            cmd.clear_depth_image(
                                image,
                                ImageLayout::TransferDstOptimal,
                                aspect,
                                depth,
                                stencil,
                            );
                        }
                        // Role/value mismatches are rejected by the template
                        // builder; clear with the role's default instead of
                        // trusting the value.
                        (ImageRole::Color, _) => {
                            cmd.clear_color_image(
                                image,
                                ImageLayout::TransferDstOptimal,
                                [0.0, 0.0, 0.0, 1.0],
                            );
                        }
                        (ImageRole::Depth, _) => {
                            cmd.clear_depth_image(
                                image,
                                ImageLayout::TransferDstOptimal,
                                aspect,
                                0.0,
                                0,
                            );
                        }
                    }
                }
                PendingTask::Upload {
                    staging,
                    image,
                    extent,
                } => {
                    cmd.pipeline_barrier(&transfer_dst_dependency(
                        image,
                        crate::gpu::ImageAspectFlags::COLOR,
                    ));
                    cmd.copy_buffer_to_image(
                        staging,
                        image,
                        ImageLayout::TransferDstOptimal,
                        extent,
                    );
                    self.spent_staging.lock().push(staging);
                }
            }
        }
    }

    /// Frees retired staging buffers. Call after the device is idle.
    pub fn shutdown(&self) {
        for staging in self.spent_staging.lock().drain(..) {
            self.gpu.destroy_buffer(staging);
        }
    }
}

/// Transition into transfer-dst for initialization, discarding previous
/// contents.
fn transfer_dst_dependency(
    image: crate::gpu::ImageHandle,
    aspect: crate::gpu::ImageAspectFlags,
) -> Dependency {
    let mut dep = Dependency::new();
    dep.images.push(ImageBarrier {
        image,
        old_layout: ImageLayout::Undefined,
        new_layout: ImageLayout::TransferDstOptimal,
        aspect,
        src_stage: PipelineStageFlags::TOP_OF_PIPE,
        src_access: AccessFlags::empty(),
        dst_stage: PipelineStageFlags::TRANSFER,
        dst_access: AccessFlags::TRANSFER_WRITE,
    });
    dep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_count_selects_format() {
        assert_eq!(format_for_channels(1).unwrap(), Format::R8Unorm);
        assert_eq!(format_for_channels(2).unwrap(), Format::R8G8Unorm);
        assert_eq!(format_for_channels(3).unwrap(), Format::R8G8B8A8Unorm);
        assert_eq!(format_for_channels(4).unwrap(), Format::R8G8B8A8Unorm);
        assert!(format_for_channels(5).is_err());
    }

    #[test]
    fn hdr_detection_is_extension_based() {
        assert!(is_hdr_file(Path::new("probe.hdr")));
        assert!(is_hdr_file(Path::new("probe.EXR")));
        assert!(!is_hdr_file(Path::new("albedo.png")));
    }
}

//! Render Passes
//!
//! A pass is the atomic unit of GPU work in the frame graph: one pipeline,
//! one set of declared resource bindings, one draw or dispatch. Passes
//! declare *what* they touch through [`BindingSet`]; the graph derives
//! topology from those declarations and the synchronization manager
//! derives barriers from them. `execute` only records commands.
//!
//! Passes may take *providers* — plain closures evaluated once per execute
//! that supply small dynamic values (push-constant payloads, draw counts,
//! per-frame camera data) without coupling passes to their owners.

pub mod cull;
pub mod geometry;
pub mod lighting;
pub mod luminance;
pub mod skybox;
pub mod ssao;
pub mod tone_map;
pub mod volumetric;

use smallvec::SmallVec;

use crate::errors::{EmberError, Result};
use crate::gpu::{
    BindPoint, ColorAttachmentInfo, CommandEncoder, DepthAttachmentInfo, DescriptorType, Extent2d,
    Extent3d, Gpu, ImageLayout, ImageRole, LoadOp, Rect2d, RenderingInfo, SamplerHandle,
    ShaderStageFlags, Viewport,
};
use crate::pipeline::{
    BindingSlot, DescriptorBufferSet, DescriptorCollection, GraphicsPipelineBuilder,
    descriptor_image_layout,
};
use crate::resources::{ResourceHandle, ResourceInstance, ResourceRegistry, ResourceUsage};

/// Provider closure yielding a per-frame value.
pub type Provider<T> = Box<dyn Fn() -> T>;

/// Hard limit on color attachments per pass.
pub const MAX_COLOR_ATTACHMENTS: usize = 8;

// ============================================================================
// Bindings
// ============================================================================

/// Descriptor slot occupied by a binding; attachments have none.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DescriptorSlot {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub sampler: Option<SamplerHandle>,
}

/// One declared use of a resource by a pass.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceBinding {
    pub resource: ResourceHandle,
    pub usage: ResourceUsage,
    pub stages: ShaderStageFlags,
    /// Descriptor slot; `None` for attachment bindings.
    pub slot: Option<DescriptorSlot>,
}

/// A declared color or depth attachment (always a write).
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct AttachmentBinding {
    pub resource: ResourceHandle,
    pub load_op: LoadOp,
}

/// The full binding declaration of one pass.
///
/// A resource declared both READ and WRITE within the same pass is a
/// read-modify-write and collapses to WRITE: the duplicate READ is dropped
/// so the barrier visitor sees one declaration with the prior state as its
/// source.
#[derive(Default)]
pub struct BindingSet {
    bindings: Vec<ResourceBinding>,
    color_attachments: SmallVec<[AttachmentBinding; MAX_COLOR_ATTACHMENTS]>,
    depth_attachment: Option<AttachmentBinding>,
}

impl BindingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, applying the read-modify-write collapse rule.
    pub fn add(&mut self, binding: ResourceBinding) -> &mut Self {
        match binding.usage {
            ResourceUsage::Read => {
                let written = self
                    .bindings
                    .iter()
                    .any(|b| b.resource == binding.resource && b.usage == ResourceUsage::Write);
                if !written {
                    self.bindings.push(binding);
                }
            }
            ResourceUsage::Write => {
                self.bindings
                    .retain(|b| !(b.resource == binding.resource && b.usage == ResourceUsage::Read));
                self.bindings.push(binding);
            }
        }
        self
    }

    /// Declares a sampled-image read through a combined image sampler.
    pub fn sampled(
        &mut self,
        resource: ResourceHandle,
        set: u32,
        binding: u32,
        stages: ShaderStageFlags,
        sampler: SamplerHandle,
    ) -> &mut Self {
        self.add(ResourceBinding {
            resource,
            usage: ResourceUsage::Read,
            stages,
            slot: Some(DescriptorSlot {
                set,
                binding,
                descriptor_type: DescriptorType::CombinedImageSampler,
                count: 1,
                sampler: Some(sampler),
            }),
        })
    }

    /// Declares a sampled-image-array read.
    pub fn sampled_array(
        &mut self,
        resource: ResourceHandle,
        set: u32,
        binding: u32,
        stages: ShaderStageFlags,
        sampler: SamplerHandle,
        count: u32,
    ) -> &mut Self {
        self.add(ResourceBinding {
            resource,
            usage: ResourceUsage::Read,
            stages,
            slot: Some(DescriptorSlot {
                set,
                binding,
                descriptor_type: DescriptorType::CombinedImageSampler,
                count,
                sampler: Some(sampler),
            }),
        })
    }

    /// Declares a storage-image binding.
    pub fn storage_image(
        &mut self,
        resource: ResourceHandle,
        set: u32,
        binding: u32,
        stages: ShaderStageFlags,
        usage: ResourceUsage,
    ) -> &mut Self {
        self.add(ResourceBinding {
            resource,
            usage,
            stages,
            slot: Some(DescriptorSlot {
                set,
                binding,
                descriptor_type: DescriptorType::StorageImage,
                count: 1,
                sampler: None,
            }),
        })
    }

    /// Declares a storage-buffer binding.
    pub fn storage_buffer(
        &mut self,
        resource: ResourceHandle,
        set: u32,
        binding: u32,
        stages: ShaderStageFlags,
        usage: ResourceUsage,
    ) -> &mut Self {
        self.add(ResourceBinding {
            resource,
            usage,
            stages,
            slot: Some(DescriptorSlot {
                set,
                binding,
                descriptor_type: DescriptorType::StorageBuffer,
                count: 1,
                sampler: None,
            }),
        })
    }

    /// Declares a uniform-buffer read.
    pub fn uniform_buffer(
        &mut self,
        resource: ResourceHandle,
        set: u32,
        binding: u32,
        stages: ShaderStageFlags,
    ) -> &mut Self {
        self.add(ResourceBinding {
            resource,
            usage: ResourceUsage::Read,
            stages,
            slot: Some(DescriptorSlot {
                set,
                binding,
                descriptor_type: DescriptorType::UniformBuffer,
                count: 1,
                sampler: None,
            }),
        })
    }

    /// Declares a color attachment (write).
    pub fn color_attachment(&mut self, resource: ResourceHandle, load_op: LoadOp) -> &mut Self {
        assert!(
            self.color_attachments.len() < MAX_COLOR_ATTACHMENTS,
            "attachment index out of range"
        );
        self.color_attachments.push(AttachmentBinding { resource, load_op });
        self
    }

    /// Declares the depth attachment (write).
    pub fn depth_attachment(&mut self, resource: ResourceHandle, load_op: LoadOp) -> &mut Self {
        self.depth_attachment = Some(AttachmentBinding { resource, load_op });
        self
    }

    #[must_use]
    pub fn color_attachments(&self) -> &[AttachmentBinding] {
        &self.color_attachments
    }

    #[must_use]
    pub fn depth_attachment_binding(&self) -> Option<&AttachmentBinding> {
        self.depth_attachment.as_ref()
    }

    /// All reads, or all writes including attachments.
    #[must_use]
    pub fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]> {
        let mut out: SmallVec<[ResourceBinding; 16]> = self
            .bindings
            .iter()
            .filter(|b| b.usage == usage)
            .copied()
            .collect();
        if usage == ResourceUsage::Write {
            for attachment in &self.color_attachments {
                out.push(ResourceBinding {
                    resource: attachment.resource,
                    usage: ResourceUsage::Write,
                    stages: ShaderStageFlags::FRAGMENT,
                    slot: None,
                });
            }
            if let Some(depth) = &self.depth_attachment {
                out.push(ResourceBinding {
                    resource: depth.resource,
                    usage: ResourceUsage::Write,
                    stages: ShaderStageFlags::FRAGMENT,
                    slot: None,
                });
            }
        }
        out
    }

    /// Builds the descriptor collection from slotted bindings.
    pub fn descriptor_collection(&self) -> Result<DescriptorCollection> {
        let mut collection = DescriptorCollection::new();
        for binding in &self.bindings {
            if let Some(slot) = binding.slot {
                collection.add(BindingSlot {
                    set: slot.set,
                    binding: slot.binding,
                    descriptor_type: slot.descriptor_type,
                    count: slot.count,
                    stages: binding.stages,
                })?;
            }
        }
        Ok(collection)
    }

    /// Writes every slotted binding's descriptor record, resolving live
    /// instances through the registry.
    pub fn write_descriptors(
        &self,
        gpu: &dyn Gpu,
        registry: &ResourceRegistry,
        descriptors: &DescriptorBufferSet,
        bind_point: BindPoint,
    ) -> Result<()> {
        for binding in &self.bindings {
            let Some(slot) = binding.slot else { continue };
            match registry.try_get(binding.resource) {
                Some(ResourceInstance::Image(image)) => {
                    let layout =
                        descriptor_image_layout(image.role(), slot.descriptor_type, bind_point);
                    descriptors.write_image(
                        gpu,
                        slot.set,
                        slot.binding,
                        0,
                        slot.descriptor_type,
                        image.view(),
                        layout,
                        slot.sampler,
                    )?;
                }
                Some(ResourceInstance::ImageArray(array)) => {
                    for (element, image) in array.images().iter().enumerate() {
                        if element as u32 >= slot.count {
                            break;
                        }
                        let layout =
                            descriptor_image_layout(image.role(), slot.descriptor_type, bind_point);
                        descriptors.write_image(
                            gpu,
                            slot.set,
                            slot.binding,
                            element as u32,
                            slot.descriptor_type,
                            image.view(),
                            layout,
                            slot.sampler,
                        )?;
                    }
                }
                Some(ResourceInstance::Buffer(buffer)) => {
                    descriptors.write_buffer(
                        gpu,
                        slot.set,
                        slot.binding,
                        slot.descriptor_type,
                        buffer.address(),
                        buffer.size(),
                    )?;
                }
                Some(ResourceInstance::Sampler(sampler)) => {
                    descriptors.write_sampler(gpu, slot.set, slot.binding, sampler.sampler())?;
                }
                None => {
                    return Err(EmberError::Config(format!(
                        "binding {}:{} references unknown resource {}",
                        slot.set,
                        slot.binding,
                        binding.resource.raw()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Checks that the declared attachment formats match the pipeline's, in
    /// order.
    pub fn validate_attachment_formats(
        &self,
        registry: &ResourceRegistry,
        builder: &GraphicsPipelineBuilder,
        pass_name: &str,
    ) -> Result<()> {
        let declared = builder.color_formats();
        if declared.len() != self.color_attachments.len() {
            return Err(EmberError::Config(format!(
                "pass '{pass_name}' declares {} color attachments but its pipeline declares {}",
                self.color_attachments.len(),
                declared.len()
            )));
        }
        for (index, (attachment, &format)) in
            self.color_attachments.iter().zip(declared).enumerate()
        {
            let image = registry.image(attachment.resource);
            if image.format() != format {
                return Err(EmberError::Config(format!(
                    "pass '{pass_name}' color attachment {index} ('{}') is {:?} but the pipeline expects {:?}",
                    image.name(),
                    image.format(),
                    format
                )));
            }
        }
        match (self.depth_attachment.as_ref(), builder.depth_format()) {
            (Some(depth), Some(format)) => {
                let image = registry.image(depth.resource);
                if image.format() != format {
                    return Err(EmberError::Config(format!(
                        "pass '{pass_name}' depth attachment ('{}') is {:?} but the pipeline expects {:?}",
                        image.name(),
                        image.format(),
                        format
                    )));
                }
            }
            (None, None) => {}
            (Some(_), None) | (None, Some(_)) => {
                return Err(EmberError::Config(format!(
                    "pass '{pass_name}' depth attachment declaration does not match its pipeline"
                )));
            }
        }
        Ok(())
    }

    /// Begins dynamic rendering over the declared attachments using their
    /// live views and layouts, and sets viewport/scissor from the first
    /// attachment's extent. Returns the render area.
    pub fn begin_rendering(
        &self,
        registry: &ResourceRegistry,
        cmd: &mut dyn CommandEncoder,
    ) -> Extent2d {
        let mut colors: SmallVec<[ColorAttachmentInfo; MAX_COLOR_ATTACHMENTS]> = SmallVec::new();
        let mut area: Option<Extent3d> = None;
        for attachment in &self.color_attachments {
            let image = registry.image(attachment.resource);
            area.get_or_insert(image.extent());
            colors.push(ColorAttachmentInfo {
                view: image.view(),
                layout: ImageLayout::ColorAttachmentOptimal,
                load_op: attachment.load_op,
            });
        }
        let depth = self.depth_attachment.as_ref().map(|attachment| {
            let image = registry.image(attachment.resource);
            debug_assert!(image.role() == ImageRole::Depth);
            area.get_or_insert(image.extent());
            DepthAttachmentInfo {
                view: image.view(),
                layout: ImageLayout::DepthStencilAttachmentOptimal,
                load_op: attachment.load_op,
            }
        });

        let extent = area.map_or(Extent2d::new(0, 0), |e| Extent2d::new(e.width, e.height));
        cmd.begin_rendering(&RenderingInfo {
            render_area: extent,
            color_attachments: &colors,
            depth_attachment: depth,
        });
        cmd.set_viewport(Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(Rect2d {
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        });
        extent
    }
}

// ============================================================================
// Pass trait and execute context
// ============================================================================

/// Per-execute context handed to passes by the graph.
pub struct ExecuteContext<'a> {
    pub registry: &'a ResourceRegistry,
    /// Monotonic frame counter, incremented per graph execute.
    pub frame_index: u64,
}

/// The abstract render pass.
pub trait RenderPass {
    /// Stable identifier used in diagnostics and debug labels.
    fn name(&self) -> &str;

    /// Pipeline bind point; also the synchronization manager's fallback for
    /// ambiguous destination stages.
    fn bind_point(&self) -> BindPoint;

    /// All reads or all writes, attachments included in the writes.
    fn resources(&self, usage: ResourceUsage) -> SmallVec<[ResourceBinding; 16]>;

    /// Records the pass's commands. Barriers have already been emitted.
    fn execute(&mut self, ctx: &ExecuteContext<'_>, cmd: &mut dyn CommandEncoder) -> Result<()>;

    /// Releases backend objects owned by the pass.
    fn destroy(&mut self, gpu: &dyn Gpu) {
        let _ = gpu;
    }
}

/// Dispatch group count for `total` items at `local_size` invocations per
/// group.
#[must_use]
pub fn dispatch_groups(total: u32, local_size: u32) -> u32 {
    total.div_ceil(local_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ResourceHandle;

    fn handle(raw: u64) -> ResourceHandle {
        ResourceHandle::from_raw(raw).unwrap()
    }

    fn read_of(resource: ResourceHandle) -> ResourceBinding {
        ResourceBinding {
            resource,
            usage: ResourceUsage::Read,
            stages: ShaderStageFlags::COMPUTE,
            slot: None,
        }
    }

    fn write_of(resource: ResourceHandle) -> ResourceBinding {
        ResourceBinding {
            resource,
            usage: ResourceUsage::Write,
            stages: ShaderStageFlags::COMPUTE,
            slot: None,
        }
    }

    #[test]
    fn read_write_same_resource_collapses_to_write() {
        let mut set = BindingSet::new();
        set.add(read_of(handle(1)));
        set.add(write_of(handle(1)));
        assert!(set.resources(ResourceUsage::Read).is_empty());
        assert_eq!(set.resources(ResourceUsage::Write).len(), 1);

        // Declaration order must not matter.
        let mut set = BindingSet::new();
        set.add(write_of(handle(2)));
        set.add(read_of(handle(2)));
        assert!(set.resources(ResourceUsage::Read).is_empty());
        assert_eq!(set.resources(ResourceUsage::Write).len(), 1);
    }

    #[test]
    fn attachments_count_as_writes() {
        let mut set = BindingSet::new();
        set.color_attachment(handle(3), LoadOp::Load);
        set.depth_attachment(handle(4), LoadOp::Load);
        let writes = set.resources(ResourceUsage::Write);
        assert_eq!(writes.len(), 2);
        assert!(writes.iter().all(|b| b.slot.is_none()));
    }

    #[test]
    fn dispatch_groups_rounds_up() {
        assert_eq!(dispatch_groups(0, 64), 0);
        assert_eq!(dispatch_groups(1, 64), 1);
        assert_eq!(dispatch_groups(64, 64), 1);
        assert_eq!(dispatch_groups(65, 64), 2);
    }
}

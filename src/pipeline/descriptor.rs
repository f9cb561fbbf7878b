//! Descriptor Layouts and Descriptor Buffers
//!
//! Passes declare bindings grouped by `(set, binding)`; this module turns
//! those declarations into descriptor-set layouts (sorted by set index for
//! layout-compatibility ordering) and into descriptor buffers: one
//! GPU-addressable buffer per set holding the descriptor records, written
//! at device-reported sizes and bound by address instead of through
//! descriptor pools.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::errors::{EmberError, Result};
use crate::gpu::{
    BindPoint, BufferHandle, BufferUsageFlags, CommandEncoder, DescriptorBufferBindingInfo,
    DescriptorSetLayoutBinding, DescriptorType, DescriptorWrite, DeviceAddress, Gpu, ImageLayout,
    ImageRole, ImageViewHandle, MemoryUsage, PipelineLayoutHandle, SamplerHandle, SetLayoutHandle,
    ShaderStageFlags,
};

/// One declared binding slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BindingSlot {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

/// Collects binding declarations and rejects colliding slots.
#[derive(Default)]
pub struct DescriptorCollection {
    sets: BTreeMap<u32, BTreeMap<u32, BindingSlot>>,
}

impl DescriptorCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding slot. Duplicate binding indices within a set are a
    /// configuration error.
    pub fn add(&mut self, slot: BindingSlot) -> Result<()> {
        let set = self.sets.entry(slot.set).or_default();
        if set.insert(slot.binding, slot).is_some() {
            return Err(EmberError::Config(format!(
                "duplicate binding index {} in descriptor set {}",
                slot.binding, slot.set
            )));
        }
        Ok(())
    }

    /// Declared set indices in ascending order.
    pub fn set_indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.sets.keys().copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Compiles one descriptor-set layout per declared set, ascending by
    /// set index.
    pub fn build_layouts(&self, gpu: &dyn Gpu) -> Result<Vec<(u32, SetLayoutHandle)>> {
        let mut layouts = Vec::with_capacity(self.sets.len());
        for (&set_index, bindings) in &self.sets {
            let entries: Vec<DescriptorSetLayoutBinding> = bindings
                .values()
                .map(|slot| DescriptorSetLayoutBinding {
                    binding: slot.binding,
                    descriptor_type: slot.descriptor_type,
                    descriptor_count: slot.count,
                    stages: slot.stages,
                })
                .collect();
            layouts.push((set_index, gpu.create_set_layout(&entries)?));
        }
        Ok(layouts)
    }
}

/// The image layout a descriptor record must advertise, consistent with
/// the destination layouts the synchronization manager transitions to.
#[must_use]
pub fn descriptor_image_layout(
    role: ImageRole,
    descriptor_type: DescriptorType,
    bind_point: BindPoint,
) -> ImageLayout {
    match descriptor_type {
        DescriptorType::StorageImage => ImageLayout::General,
        _ => match (role, bind_point) {
            (ImageRole::Depth, BindPoint::Graphics) => ImageLayout::DepthStencilReadOnlyOptimal,
            _ => ImageLayout::ShaderReadOnlyOptimal,
        },
    }
}

// ============================================================================
// Descriptor buffers
// ============================================================================

struct SetBuffer {
    set: u32,
    buffer: BufferHandle,
    address: DeviceAddress,
    usage: BufferUsageFlags,
    /// Byte offset of each `(binding, element)` record within the buffer.
    record_offsets: BTreeMap<(u32, u32), u64>,
}

/// One descriptor buffer per declared set, addressable for binding.
pub struct DescriptorBufferSet {
    buffers: Vec<SetBuffer>,
}

impl DescriptorBufferSet {
    /// Allocates and lays out one host-visible descriptor buffer per set.
    pub fn build(gpu: &dyn Gpu, name: &str, collection: &DescriptorCollection) -> Result<Self> {
        let alignment = gpu.descriptor_buffer_offset_alignment().max(1);
        let mut buffers = Vec::new();

        for (&set_index, bindings) in &collection.sets {
            let mut offset = 0u64;
            let mut record_offsets = BTreeMap::new();
            let mut usage = BufferUsageFlags::RESOURCE_DESCRIPTOR
                | BufferUsageFlags::SHADER_DEVICE_ADDRESS;

            for slot in bindings.values() {
                if matches!(
                    slot.descriptor_type,
                    DescriptorType::Sampler | DescriptorType::CombinedImageSampler
                ) {
                    usage |= BufferUsageFlags::SAMPLER_DESCRIPTOR;
                }
                let record = gpu.descriptor_size(slot.descriptor_type);
                for element in 0..slot.count {
                    record_offsets.insert((slot.binding, element), offset);
                    offset += record;
                }
            }

            let size = offset.max(1).next_multiple_of(alignment);
            let allocated = gpu.create_buffer(&crate::gpu::BufferDesc {
                name: &format!("{name}_set{set_index}_descriptors"),
                size,
                usage,
                memory: MemoryUsage::CpuToGpu,
            })?;
            buffers.push(SetBuffer {
                set: set_index,
                buffer: allocated.buffer,
                address: allocated.address,
                usage,
                record_offsets,
            });
        }
        Ok(Self { buffers })
    }

    fn record_offset(&self, set: u32, binding: u32, element: u32) -> Result<(&SetBuffer, u64)> {
        let set_buffer = self
            .buffers
            .iter()
            .find(|b| b.set == set)
            .ok_or_else(|| EmberError::Config(format!("descriptor set {set} was not declared")))?;
        let offset = set_buffer
            .record_offsets
            .get(&(binding, element))
            .copied()
            .ok_or_else(|| {
                EmberError::Config(format!(
                    "descriptor binding {binding}[{element}] in set {set} was not declared"
                ))
            })?;
        Ok((set_buffer, offset))
    }

    /// Writes an image (or combined image/sampler) descriptor record.
    pub fn write_image(
        &self,
        gpu: &dyn Gpu,
        set: u32,
        binding: u32,
        element: u32,
        descriptor_type: DescriptorType,
        view: ImageViewHandle,
        layout: ImageLayout,
        sampler: Option<SamplerHandle>,
    ) -> Result<()> {
        let (set_buffer, offset) = self.record_offset(set, binding, element)?;
        gpu.write_descriptor(
            set_buffer.buffer,
            offset,
            &DescriptorWrite::Image {
                descriptor_type,
                view,
                layout,
                sampler,
            },
        )
    }

    /// Writes a buffer descriptor record by device address and range.
    pub fn write_buffer(
        &self,
        gpu: &dyn Gpu,
        set: u32,
        binding: u32,
        descriptor_type: DescriptorType,
        address: DeviceAddress,
        range: u64,
    ) -> Result<()> {
        let (set_buffer, offset) = self.record_offset(set, binding, 0)?;
        gpu.write_descriptor(
            set_buffer.buffer,
            offset,
            &DescriptorWrite::Buffer {
                descriptor_type,
                address,
                range,
            },
        )
    }

    /// Writes a standalone sampler descriptor record.
    pub fn write_sampler(
        &self,
        gpu: &dyn Gpu,
        set: u32,
        binding: u32,
        sampler: SamplerHandle,
    ) -> Result<()> {
        let (set_buffer, offset) = self.record_offset(set, binding, 0)?;
        gpu.write_descriptor(set_buffer.buffer, offset, &DescriptorWrite::Sampler { sampler })
    }

    /// Binds all descriptor buffers, then points each declared set at its
    /// buffer.
    pub fn bind(
        &self,
        cmd: &mut dyn CommandEncoder,
        bind_point: BindPoint,
        layout: PipelineLayoutHandle,
    ) {
        if self.buffers.is_empty() {
            return;
        }
        let infos: SmallVec<[DescriptorBufferBindingInfo; 4]> = self
            .buffers
            .iter()
            .map(|b| DescriptorBufferBindingInfo {
                address: b.address,
                usage: b.usage,
            })
            .collect();
        cmd.bind_descriptor_buffers(&infos);
        for (index, set_buffer) in self.buffers.iter().enumerate() {
            cmd.set_descriptor_buffer_offsets(
                bind_point,
                layout,
                set_buffer.set,
                &[index as u32],
                &[0],
            );
        }
    }

    /// Destroys the underlying buffers.
    pub fn destroy(&self, gpu: &dyn Gpu) {
        for set_buffer in &self.buffers {
            gpu.destroy_buffer(set_buffer.buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(set: u32, binding: u32) -> BindingSlot {
        BindingSlot {
            set,
            binding,
            descriptor_type: DescriptorType::StorageBuffer,
            count: 1,
            stages: ShaderStageFlags::COMPUTE,
        }
    }

    #[test]
    fn duplicate_binding_in_set_is_rejected() {
        let mut collection = DescriptorCollection::new();
        collection.add(slot(0, 0)).unwrap();
        collection.add(slot(0, 1)).unwrap();
        let err = collection.add(slot(0, 1)).unwrap_err();
        assert!(matches!(err, EmberError::Config(_)));
    }

    #[test]
    fn same_binding_in_different_sets_is_fine() {
        let mut collection = DescriptorCollection::new();
        collection.add(slot(0, 0)).unwrap();
        collection.add(slot(1, 0)).unwrap();
        assert_eq!(collection.set_indices().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn storage_image_descriptors_use_general_layout() {
        assert_eq!(
            descriptor_image_layout(
                ImageRole::Color,
                DescriptorType::StorageImage,
                BindPoint::Compute
            ),
            ImageLayout::General
        );
        assert_eq!(
            descriptor_image_layout(
                ImageRole::Depth,
                DescriptorType::CombinedImageSampler,
                BindPoint::Graphics
            ),
            ImageLayout::DepthStencilReadOnlyOptimal
        );
        assert_eq!(
            descriptor_image_layout(
                ImageRole::Depth,
                DescriptorType::CombinedImageSampler,
                BindPoint::Compute
            ),
            ImageLayout::ShaderReadOnlyOptimal
        );
    }
}

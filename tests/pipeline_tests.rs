//! Pipeline Builder Tests
//!
//! Descriptor collection validation, descriptor buffer layout/writes and
//! graphics pipeline builder validation against the mock device.

mod common;

use common::{MockEncoder, MockGpu, Recorded};

use ember::EmberError;
use ember::gpu::{
    BindPoint, CompareOp, DescriptorType, DescriptorWrite, Format, ImageLayout, ImageViewHandle,
    PipelineLayoutHandle, ShaderModuleHandle, ShaderStageFlags,
};
use ember::pipeline::{
    BindingSlot, DescriptorBufferSet, DescriptorCollection, GraphicsPipelineBuilder,
};

fn slot(set: u32, binding: u32, descriptor_type: DescriptorType, count: u32) -> BindingSlot {
    BindingSlot {
        set,
        binding,
        descriptor_type,
        count,
        stages: ShaderStageFlags::COMPUTE,
    }
}

// ============================================================================
// Descriptor buffers
// ============================================================================

#[test]
fn one_descriptor_buffer_per_declared_set() {
    let gpu = MockGpu::new();
    let mut collection = DescriptorCollection::new();
    collection
        .add(slot(0, 0, DescriptorType::StorageBuffer, 1))
        .unwrap();
    collection
        .add(slot(0, 1, DescriptorType::CombinedImageSampler, 1))
        .unwrap();
    collection
        .add(slot(2, 0, DescriptorType::StorageImage, 1))
        .unwrap();

    let buffers = DescriptorBufferSet::build(gpu.as_ref(), "test", &collection).unwrap();

    let mut encoder = MockEncoder::new();
    buffers.bind(&mut encoder, BindPoint::Compute, PipelineLayoutHandle(1));
    let commands = encoder.commands();
    // One resident-buffer bind, then one offset bind per set.
    assert!(matches!(&commands[0], Recorded::BindDescriptorBuffers(infos) if infos.len() == 2));
    assert_eq!(
        commands[1],
        Recorded::SetDescriptorOffsets { first_set: 0 }
    );
    assert_eq!(
        commands[2],
        Recorded::SetDescriptorOffsets { first_set: 2 }
    );
}

#[test]
fn array_elements_are_written_at_record_stride() {
    let gpu = MockGpu::new();
    let mut collection = DescriptorCollection::new();
    collection
        .add(slot(0, 0, DescriptorType::CombinedImageSampler, 4))
        .unwrap();
    let buffers = DescriptorBufferSet::build(gpu.as_ref(), "test", &collection).unwrap();

    for element in 0..4 {
        buffers
            .write_image(
                gpu.as_ref(),
                0,
                0,
                element,
                DescriptorType::CombinedImageSampler,
                ImageViewHandle(10 + u64::from(element)),
                ImageLayout::ShaderReadOnlyOptimal,
                None,
            )
            .unwrap();
    }

    let offsets: Vec<u64> = gpu
        .commands()
        .iter()
        .filter_map(|command| match command {
            Recorded::WriteDescriptor(_, offset, DescriptorWrite::Image { .. }) => Some(*offset),
            _ => None,
        })
        .collect();
    // The mock reports 32-byte image descriptors.
    assert_eq!(offsets, [0, 32, 64, 96]);
}

#[test]
fn writing_an_undeclared_slot_is_a_config_error() {
    let gpu = MockGpu::new();
    let mut collection = DescriptorCollection::new();
    collection
        .add(slot(0, 0, DescriptorType::StorageBuffer, 1))
        .unwrap();
    let buffers = DescriptorBufferSet::build(gpu.as_ref(), "test", &collection).unwrap();

    let err = buffers
        .write_buffer(gpu.as_ref(), 0, 5, DescriptorType::StorageBuffer, 0x1000, 64)
        .unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
    let err = buffers
        .write_buffer(gpu.as_ref(), 3, 0, DescriptorType::StorageBuffer, 0x1000, 64)
        .unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
}

// ============================================================================
// Graphics pipeline builder
// ============================================================================

#[test]
fn graphics_pipeline_without_fragment_stage_is_rejected() {
    let gpu = MockGpu::new();
    let builder = GraphicsPipelineBuilder::new("broken")
        .set_color_attachment_formats(&[Format::R16G16B16A16Sfloat]);
    let err = builder
        .build(gpu.as_ref(), PipelineLayoutHandle(1))
        .unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
}

#[test]
fn graphics_pipeline_with_classic_stage_pair_builds() {
    let gpu = MockGpu::new();
    let builder = GraphicsPipelineBuilder::new("ok")
        .set_shaders(ShaderModuleHandle(1), ShaderModuleHandle(2))
        .set_color_attachment_formats(&[Format::R16G16B16A16Sfloat])
        .enable_depthtest(true, CompareOp::GreaterOrEqual)
        .set_depth_format(Format::D32Sfloat);
    assert!(builder.build(gpu.as_ref(), PipelineLayoutHandle(1)).is_ok());
}

#[test]
fn blend_state_count_must_match_color_attachments() {
    let gpu = MockGpu::new();
    let builder = GraphicsPipelineBuilder::new("mismatch")
        .set_shaders(ShaderModuleHandle(1), ShaderModuleHandle(2))
        .enable_blending_alphablend()
        .set_color_attachment_formats(&[
            Format::R16G16B16A16Sfloat,
            Format::R16G16B16A16Sfloat,
        ]);
    let err = builder
        .build(gpu.as_ref(), PipelineLayoutHandle(1))
        .unwrap_err();
    assert!(matches!(err, EmberError::Config(_)));
}

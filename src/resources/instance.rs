//! Resource Instances
//!
//! Live GPU objects created from templates (or imported from another
//! subsystem), each carrying the synchronization state the GPU will
//! observe on the next command referencing it.
//!
//! # State tracking
//!
//! For any [`ImageInstance`], the triple (layout, access mask, stage mask)
//! in [`ResourceState`] is authoritative. The synchronization manager is
//! the **only** writer of this state during graph execution; everything
//! else treats instances as read-only. State lives in a `Cell` because the
//! render thread is single-threaded and passes only ever need shared
//! references to instances resolved from the registry.
//!
//! # Visitor protocol
//!
//! Barrier synthesis is polymorphic over the instance variants through
//! [`ResourceInstance::accept`] and [`ResourceVisitor`]: images and buffers
//! dispatch to their respective `visit` methods, and image arrays forward
//! to `visit_image` once per populated element.

use std::cell::Cell;
use std::num::NonZeroU64;

use crate::gpu::{
    AccessFlags, BufferHandle, BufferUsageFlags, DeviceAddress, Extent3d, Format,
    ImageAspectFlags, ImageHandle, ImageLayout, ImageRole, ImageType, ImageViewHandle,
    PipelineStageFlags, SamplerHandle, ShaderStageFlags,
};

// ============================================================================
// Handles and usage
// ============================================================================

/// Stable 64-bit key of a resource in the registry and the frame graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ResourceHandle(NonZeroU64);

impl ResourceHandle {
    /// Wraps a raw nonzero value. Only the registry mints new handles.
    #[must_use]
    pub(crate) fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    /// The raw key value.
    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0.get()
    }
}

/// How a pass uses a bound resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ResourceUsage {
    Read,
    Write,
}

// ============================================================================
// Synchronization state
// ============================================================================

/// The (layout, access, stage) triple the GPU observes on the next command
/// referencing a resource.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ResourceState {
    pub layout: ImageLayout,
    pub access: AccessFlags,
    pub stage: PipelineStageFlags,
}

impl ResourceState {
    /// State of a freshly created or imported resource: undefined layout,
    /// no prior access, top-of-pipe stage.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            layout: ImageLayout::Undefined,
            access: AccessFlags::empty(),
            stage: PipelineStageFlags::TOP_OF_PIPE,
        }
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::initial()
    }
}

// ============================================================================
// Instance variants
// ============================================================================

/// A live image with its default view.
#[derive(Debug)]
pub struct ImageInstance {
    name: String,
    image: ImageHandle,
    view: ImageViewHandle,
    format: Format,
    extent: Extent3d,
    image_type: ImageType,
    role: ImageRole,
    aspect: ImageAspectFlags,
    state: Cell<ResourceState>,
}

impl ImageInstance {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        image: ImageHandle,
        view: ImageViewHandle,
        format: Format,
        extent: Extent3d,
        image_type: ImageType,
        role: ImageRole,
    ) -> Self {
        Self {
            name: name.into(),
            image,
            view,
            format,
            extent,
            image_type,
            role,
            aspect: format.aspect(),
            state: Cell::new(ResourceState::initial()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn image(&self) -> ImageHandle {
        self.image
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> ImageViewHandle {
        self.view
    }

    #[inline]
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    #[must_use]
    pub fn extent(&self) -> Extent3d {
        self.extent
    }

    #[inline]
    #[must_use]
    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    #[inline]
    #[must_use]
    pub fn role(&self) -> ImageRole {
        self.role
    }

    #[inline]
    #[must_use]
    pub fn aspect(&self) -> ImageAspectFlags {
        self.aspect
    }

    /// Current synchronization state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    /// Replaces the synchronization state. Called by the synchronization
    /// manager after emitting a barrier, and by the allocator after its
    /// upload/clear transfers.
    #[inline]
    pub fn set_state(&self, state: ResourceState) {
        self.state.set(state);
    }

    /// Swaps the backing image objects after a resize rebuild. State is
    /// reset because the new image starts in an undefined layout.
    pub(crate) fn replace_backing(
        &mut self,
        image: ImageHandle,
        view: ImageViewHandle,
        extent: Extent3d,
    ) {
        self.image = image;
        self.view = view;
        self.extent = extent;
        self.state.set(ResourceState::initial());
    }
}

/// A logical fixed-capacity array of image slots, populated by a callback
/// supplied by the external owner (e.g. the scene's bindless texture set).
pub struct ImageArrayInstance {
    name: String,
    capacity: usize,
    images: Vec<ImageInstance>,
    populate: Box<dyn Fn(&mut Vec<ImageInstance>)>,
}

impl ImageArrayInstance {
    /// Creates the array and populates it immediately. The callback may
    /// push up to `capacity` images; extra entries are truncated.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
        populate: Box<dyn Fn(&mut Vec<ImageInstance>)>,
    ) -> Self {
        let mut array = Self {
            name: name.into(),
            capacity,
            images: Vec::new(),
            populate,
        };
        array.refresh();
        array
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Currently populated image slots.
    #[inline]
    #[must_use]
    pub fn images(&self) -> &[ImageInstance] {
        &self.images
    }

    /// Re-runs the populate callback, bounded by the array capacity.
    pub fn refresh(&mut self) {
        self.images.clear();
        (self.populate)(&mut self.images);
        self.images.truncate(self.capacity);
    }
}

/// A live buffer.
pub struct BufferInstance {
    name: String,
    buffer: BufferHandle,
    address: DeviceAddress,
    size: u64,
    usage: BufferUsageFlags,
    host_visible: bool,
    state: Cell<ResourceState>,
}

impl BufferInstance {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        buffer: BufferHandle,
        address: DeviceAddress,
        size: u64,
        usage: BufferUsageFlags,
        host_visible: bool,
    ) -> Self {
        Self {
            name: name.into(),
            buffer,
            address,
            size,
            usage,
            host_visible,
            state: Cell::new(ResourceState::initial()),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    #[inline]
    #[must_use]
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Requested size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn usage(&self) -> BufferUsageFlags {
        self.usage
    }

    #[inline]
    #[must_use]
    pub fn host_visible(&self) -> bool {
        self.host_visible
    }

    /// Current synchronization state; the layout field is unused for
    /// buffers and stays `Undefined`.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ResourceState {
        self.state.get()
    }

    #[inline]
    pub fn set_state(&self, state: ResourceState) {
        self.state.set(state);
    }
}

/// An immutable sampler. Carries no synchronization state.
pub struct SamplerInstance {
    name: String,
    sampler: SamplerHandle,
}

impl SamplerInstance {
    #[must_use]
    pub fn new(name: impl Into<String>, sampler: SamplerHandle) -> Self {
        Self {
            name: name.into(),
            sampler,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn sampler(&self) -> SamplerHandle {
        self.sampler
    }
}

// ============================================================================
// Visitor protocol
// ============================================================================

/// Double-dispatch target for barrier synthesis over instance variants.
pub trait ResourceVisitor {
    fn visit_image(&mut self, image: &ImageInstance, usage: ResourceUsage, stages: ShaderStageFlags);

    fn visit_buffer(
        &mut self,
        buffer: &BufferInstance,
        usage: ResourceUsage,
        stages: ShaderStageFlags,
    );

    /// Arrays forward to `visit_image` per populated element; every element
    /// shares the same usage and shader-stage derivation.
    fn visit_image_array(
        &mut self,
        array: &ImageArrayInstance,
        usage: ResourceUsage,
        stages: ShaderStageFlags,
    ) {
        for image in array.images() {
            self.visit_image(image, usage, stages);
        }
    }
}

/// A live resource owned by the registry.
pub enum ResourceInstance {
    Image(ImageInstance),
    ImageArray(ImageArrayInstance),
    Buffer(BufferInstance),
    Sampler(SamplerInstance),
}

impl ResourceInstance {
    /// Human-readable name, used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ResourceInstance::Image(i) => i.name(),
            ResourceInstance::ImageArray(a) => a.name(),
            ResourceInstance::Buffer(b) => b.name(),
            ResourceInstance::Sampler(s) => s.name(),
        }
    }

    /// Dispatches to the matching `visit` method. Samplers carry no
    /// synchronization state and are skipped.
    pub fn accept(
        &self,
        visitor: &mut dyn ResourceVisitor,
        usage: ResourceUsage,
        stages: ShaderStageFlags,
    ) {
        match self {
            ResourceInstance::Image(image) => visitor.visit_image(image, usage, stages),
            ResourceInstance::ImageArray(array) => visitor.visit_image_array(array, usage, stages),
            ResourceInstance::Buffer(buffer) => visitor.visit_buffer(buffer, usage, stages),
            ResourceInstance::Sampler(_) => {}
        }
    }

    #[must_use]
    pub fn as_image(&self) -> Option<&ImageInstance> {
        match self {
            ResourceInstance::Image(i) => Some(i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_buffer(&self) -> Option<&BufferInstance> {
        match self {
            ResourceInstance::Buffer(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_image_array(&self) -> Option<&ImageArrayInstance> {
        match self {
            ResourceInstance::ImageArray(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sampler(&self) -> Option<&SamplerInstance> {
        match self {
            ResourceInstance::Sampler(s) => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(name: &str) -> ImageInstance {
        ImageInstance::new(
            name,
            ImageHandle(1),
            ImageViewHandle(2),
            Format::R16G16B16A16Sfloat,
            Extent3d::new(4, 4, 1),
            ImageType::Image2d,
            ImageRole::Color,
        )
    }

    struct CountingVisitor {
        images: usize,
        buffers: usize,
    }

    impl ResourceVisitor for CountingVisitor {
        fn visit_image(&mut self, _: &ImageInstance, _: ResourceUsage, _: ShaderStageFlags) {
            self.images += 1;
        }
        fn visit_buffer(&mut self, _: &BufferInstance, _: ResourceUsage, _: ShaderStageFlags) {
            self.buffers += 1;
        }
    }

    #[test]
    fn initial_state_is_undefined_top_of_pipe() {
        let img = test_image("t");
        assert_eq!(img.state().layout, ImageLayout::Undefined);
        assert_eq!(img.state().stage, PipelineStageFlags::TOP_OF_PIPE);
        assert!(img.state().access.is_empty());
    }

    #[test]
    fn array_accept_forwards_per_element() {
        let array = ImageArrayInstance::new(
            "textures",
            8,
            Box::new(|slots| {
                for i in 0..3 {
                    slots.push(ImageInstance::new(
                        format!("tex_{i}"),
                        ImageHandle(10 + i),
                        ImageViewHandle(20 + i),
                        Format::R8G8B8A8Unorm,
                        Extent3d::new(1, 1, 1),
                        ImageType::Image2d,
                        ImageRole::Color,
                    ));
                }
            }),
        );
        let instance = ResourceInstance::ImageArray(array);
        let mut visitor = CountingVisitor {
            images: 0,
            buffers: 0,
        };
        instance.accept(
            &mut visitor,
            ResourceUsage::Read,
            ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(visitor.images, 3);
        assert_eq!(visitor.buffers, 0);
    }

    #[test]
    fn array_populate_is_capacity_bounded() {
        let array = ImageArrayInstance::new(
            "textures",
            2,
            Box::new(|slots| {
                for i in 0..5 {
                    slots.push(ImageInstance::new(
                        format!("tex_{i}"),
                        ImageHandle(i + 1),
                        ImageViewHandle(i + 1),
                        Format::R8G8B8A8Unorm,
                        Extent3d::new(1, 1, 1),
                        ImageType::Image2d,
                        ImageRole::Color,
                    ));
                }
            }),
        );
        assert_eq!(array.images().len(), 2);
    }
}

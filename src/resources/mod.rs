//! Resource Model
//!
//! Templates describe resources, the allocator turns templates into live
//! instances, and the registry owns every instance behind a stable handle.

pub mod allocator;
pub mod instance;
pub mod registry;
pub mod template;

pub use allocator::ResourceAllocator;
pub use instance::{
    BufferInstance, ImageArrayInstance, ImageInstance, ResourceHandle, ResourceInstance,
    ResourceState, ResourceUsage, ResourceVisitor, SamplerInstance,
};
pub use registry::ResourceRegistry;
pub use template::{
    BufferTemplate, ImageInitial, ImageSize, ImageTemplate, SamplerTemplate,
};

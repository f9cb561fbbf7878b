//! Pipeline Barriers
//!
//! Barrier structs accumulated by the synchronization visitor and emitted
//! as one combined dependency per frame-graph node.

use smallvec::SmallVec;

use super::types::{
    AccessFlags, BufferHandle, ImageAspectFlags, ImageHandle, ImageLayout, PipelineStageFlags,
};

/// Global execution/memory dependency with no resource attached.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct MemoryBarrier {
    pub src_stage: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStageFlags,
    pub dst_access: AccessFlags,
}

/// Whole-buffer memory dependency.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferBarrier {
    pub buffer: BufferHandle,
    pub src_stage: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStageFlags,
    pub dst_access: AccessFlags,
}

/// Image memory dependency with a layout transition.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ImageBarrier {
    pub image: ImageHandle,
    pub old_layout: ImageLayout,
    pub new_layout: ImageLayout,
    pub aspect: ImageAspectFlags,
    pub src_stage: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_stage: PipelineStageFlags,
    pub dst_access: AccessFlags,
}

/// One combined pipeline-barrier emission.
///
/// The synchronization manager collects every barrier a node needs into a
/// single `Dependency` and emits it with one
/// [`CommandEncoder::pipeline_barrier`](super::CommandEncoder::pipeline_barrier)
/// call, so the per-frame emission count stays at one per node plus the two
/// frame boundaries.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Dependency {
    pub memory: SmallVec<[MemoryBarrier; 1]>,
    pub buffers: SmallVec<[BufferBarrier; 8]>,
    pub images: SmallVec<[ImageBarrier; 8]>,
}

impl Dependency {
    /// Creates an empty dependency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A dependency holding a single global memory barrier.
    #[must_use]
    pub fn global(barrier: MemoryBarrier) -> Self {
        let mut dep = Self::default();
        dep.memory.push(barrier);
        dep
    }

    /// Total number of barriers carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.memory.len() + self.buffers.len() + self.images.len()
    }

    /// Returns `true` when no barrier is carried.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

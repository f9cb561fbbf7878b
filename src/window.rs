//! Window Facade
//!
//! The engine never owns the OS window. It only needs the current surface
//! size for resolving relative-sized resources and rebuilding the
//! swapchain; the windowing layer supplies both through this trait.

use crate::gpu::Extent2d;

/// Source of the current window surface size.
pub trait WindowSource: Send + Sync {
    /// Current drawable surface extent in pixels.
    fn extent(&self) -> Extent2d;

    /// Re-queries the platform for the current size. Called by the frame
    /// coordinator before a swapchain rebuild.
    fn update_window_size(&self);
}

//! Synchronization primitives.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations, not
//!   observable from the CPU
//! - [`Fence`] - GPU-to-CPU completion detection, waited on by the host
//! - [`SyncPair`] - the two per-frame semaphores ordering the presentation
//!   engine against the GPU queue
//!
//! # Usage pattern
//!
//! ```text
//! 1. Acquire swapchain image (arms image_acquired)
//! 2. Wait + reset the acquired slot's completion fence
//! 3. Submit commands:
//!    - wait on image_acquired at the color output stage
//!    - signal render_complete and the slot's completion fence
//! 4. Present (waits on render_complete)
//! ```
//!
//! One `SyncPair` is shared across all frames. Combined with the
//! end-of-frame queue-idle barrier this caps the engine at a single frame
//! in flight; the per-slot completion fences are still tracked exactly as a
//! multi-frame design would need them.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Semaphores establish execution order between queue submissions. The two
/// used here are the image-acquired and render-complete signals of a frame.
///
/// # Thread Safety
///
/// The semaphore is immutable after creation and can be safely shared
/// between threads.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// Fences let the host detect completion of submitted GPU work. Each
/// swapchain slot owns one: it is signaled exactly when all GPU work
/// previously submitted against that slot has finished, and waiting on it is
/// the sole gate before the slot's command buffer may be rewritten.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state.
    ///   Slot fences start signaled so the first frame does not block
    ///   waiting on work that was never submitted.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled, with a bounded budget.
    ///
    /// A fence already signaled (such as a slot fence before its first
    /// submission) returns immediately.
    ///
    /// # Arguments
    ///
    /// * `timeout_ns` - Wait budget in nanoseconds
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SyncTimeout`] if the budget is exhausted, which
    /// callers can tell apart from device loss.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns)
                .map_err(|code| RhiError::from_wait_result(code, "fence wait", timeout_ns))?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any queue operation when this is
    /// called.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset operation fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Checks if the fence is currently signaled without blocking.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// The per-frame semaphore pair ordering the presentation engine against
/// the GPU queue.
///
/// - `image_acquired` is armed by swapchain acquisition and waited on by
///   the frame's submission at the color output stage, so earlier pipeline
///   stages may run before the image is actually free.
/// - `render_complete` is signaled by the frame's submission and waited on
///   by presentation.
///
/// Exactly one pair exists and is reused every frame; the queue-idle
/// barrier at the end of each frame guarantees both semaphores are idle
/// before reuse.
pub struct SyncPair {
    /// Semaphore signaled when the acquired swapchain image is usable.
    image_acquired: Semaphore,
    /// Semaphore signaled when rendering into the image has completed.
    render_complete: Semaphore,
}

impl SyncPair {
    /// Creates the semaphore pair.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_acquired = Semaphore::new(device.clone())?;
        let render_complete = Semaphore::new(device)?;

        info!("Created frame synchronization pair");

        Ok(Self {
            image_acquired,
            render_complete,
        })
    }

    /// Returns a reference to the image-acquired semaphore.
    #[inline]
    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    /// Returns a reference to the render-complete semaphore.
    #[inline]
    pub fn render_complete(&self) -> &Semaphore {
        &self.render_complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        // Compile-time check that Semaphore is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        // Compile-time check that Fence is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_sync_pair_is_send_sync() {
        // Compile-time check that SyncPair is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncPair>();
    }
}

//! The per-frame synchronization protocol.
//!
//! [`Presenter`] drives the strictly sequential state machine each frame
//! passes through:
//!
//! 1. **Acquiring** - ask the presentation engine for the next image
//!    index, arming the image-acquired semaphore.
//! 2. **Waiting** - block on the acquired slot's completion fence, then
//!    reset it. This is the only thing preventing the slot's command
//!    buffer from being rewritten while still referenced by in-flight GPU
//!    execution.
//! 3. **Submitting** - record the slot and submit, waiting on
//!    image-acquired at the color output stage and signaling both the
//!    render-complete semaphore and the slot's fence.
//! 4. **Presenting** - queue the image for presentation, gated on
//!    render-complete.
//! 5. Block until the queue is idle. This serializes frames completely:
//!    frame N+1 never begins recording until frame N's GPU work has fully
//!    retired, which is what makes the single shared [`SyncPair`] sound.
//!
//! Every wait is bounded. An exhausted budget surfaces as
//! [`RhiError::SyncTimeout`], distinct from device loss; an out-of-date or
//! suboptimal surface is reported as [`FrameOutcome::SurfaceOutdated`] so
//! the caller can rebuild the image set instead of aborting.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use prism_rhi::buffer::Buffer;
use prism_rhi::device::Device;
use prism_rhi::sync::SyncPair;
use prism_rhi::{RhiError, RhiResult};

use crate::image_set::ImageSet;
use crate::recorder::Recorder;
use crate::transform::TransformUbo;

/// Budget for the swapchain acquire wait, in nanoseconds.
pub const ACQUIRE_TIMEOUT_NS: u64 = 1_000_000_000;

/// Budget for a slot completion fence wait, in nanoseconds.
pub const FENCE_WAIT_TIMEOUT_NS: u64 = 5_000_000_000;

/// What happened to a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and queued for presentation.
    Presented {
        /// Monotonically increasing count of presented frames.
        frame_index: u64,
    },
    /// The surface is out of date or suboptimal; the caller should rebuild
    /// the image set and retry on the next redraw.
    SurfaceOutdated,
}

/// Owns the acquire/submit/present handshake and the frame counter.
pub struct Presenter {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// The one semaphore pair, reused every frame.
    sync: SyncPair,
    /// Count of successfully presented frames.
    frame_index: u64,
}

impl Presenter {
    /// Creates the presenter and its semaphore pair.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let sync = SyncPair::new(device.clone())?;

        Ok(Self {
            device,
            sync,
            frame_index: 0,
        })
    }

    /// Returns the number of frames presented so far.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Replaces the semaphore pair.
    ///
    /// Called after the image set is rebuilt so both semaphores are in a
    /// known unsignaled state. The caller must ensure the queue is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn reset_sync(&mut self) -> RhiResult<()> {
        self.sync = SyncPair::new(self.device.clone())?;
        debug!("Frame synchronization pair reset");
        Ok(())
    }

    /// Runs one full frame through the presentation protocol.
    ///
    /// Between a successful acquire of a slot and the next acquire of the
    /// same slot, exactly one submit and one present referencing it occur,
    /// in that order.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SyncTimeout`] when the acquire or fence wait exceeds
    ///   its budget
    /// - any other Vulkan error is fatal to the caller; out-of-date
    ///   surfaces are not errors but [`FrameOutcome::SurfaceOutdated`]
    pub fn present_frame(
        &mut self,
        image_set: &ImageSet,
        recorder: &Recorder,
        uniform: &Buffer,
        transform: &TransformUbo,
    ) -> RhiResult<FrameOutcome> {
        // Acquiring
        let (image_index, mut outdated) = match image_set
            .swapchain()
            .acquire_next_image(self.sync.image_acquired().handle(), ACQUIRE_TIMEOUT_NS)
        {
            Ok((index, suboptimal)) => (index, suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                return Ok(FrameOutcome::SurfaceOutdated);
            }
            Err(code @ (vk::Result::TIMEOUT | vk::Result::NOT_READY)) => {
                return Err(RhiError::from_wait_result(
                    code,
                    "swapchain acquire",
                    ACQUIRE_TIMEOUT_NS,
                ));
            }
            Err(code) => return Err(code.into()),
        };

        trace!("Acquired image slot {}", image_index);
        let slot = image_set.slot(image_index);

        // Waiting: gate on this slot's previous GPU work, then take the
        // fence back to unsignaled for this frame's submission
        slot.completion_fence().wait(FENCE_WAIT_TIMEOUT_NS)?;
        slot.completion_fence().reset()?;

        // Submitting
        recorder.record(slot, image_set.extent(), uniform, transform)?;

        let wait_semaphores = [self.sync.image_acquired().handle()];
        // Only color output waits on the acquired image; earlier stages run free
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.sync.render_complete().handle()];
        let command_buffers = [slot.commands().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit(&[submit_info], slot.completion_fence().handle())?;
        }

        // Presenting
        match image_set.swapchain().present(
            self.device.queue(),
            image_index,
            self.sync.render_complete().handle(),
        ) {
            Ok(false) => {}
            Ok(true) => {
                debug!("Present reported suboptimal surface");
                outdated = true;
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain out of date during present");
                outdated = true;
            }
            Err(code) => return Err(code.into()),
        }

        // Strict single-frame-in-flight: nothing of this frame survives
        // into the next iteration
        self.device.queue_wait_idle()?;

        self.frame_index += 1;
        trace!("Presented frame {}", self.frame_index);

        if outdated {
            Ok(FrameOutcome::SurfaceOutdated)
        } else {
            Ok(FrameOutcome::Presented {
                frame_index: self.frame_index,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_budgets_are_bounded() {
        // Every CPU-side wait carries a finite, nonzero budget
        assert!(ACQUIRE_TIMEOUT_NS > 0 && ACQUIRE_TIMEOUT_NS < u64::MAX);
        assert!(FENCE_WAIT_TIMEOUT_NS > 0 && FENCE_WAIT_TIMEOUT_NS < u64::MAX);
    }

    #[test]
    fn test_frame_outcome_equality() {
        assert_eq!(
            FrameOutcome::Presented { frame_index: 1 },
            FrameOutcome::Presented { frame_index: 1 }
        );
        assert_ne!(
            FrameOutcome::Presented { frame_index: 1 },
            FrameOutcome::SurfaceOutdated
        );
    }
}

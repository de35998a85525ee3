//! RHI-specific error types.
//!
//! Errors fall into three classes that callers are expected to treat
//! differently:
//!
//! - **Fatal configuration errors**: a required device, memory type, surface
//!   capability or format is missing. Nothing can be presented; startup must
//!   abort with context.
//! - **Transient presentation errors**: the surface reports out-of-date or
//!   suboptimal. The swapchain image set should be rebuilt and the frame
//!   retried, never the process aborted. See [`RhiError::is_surface_outdated`].
//! - **Synchronization timeouts**: a fence or acquire wait exceeded its
//!   budget. Distinguishable from true device loss so callers can decide
//!   whether to retry or to fail. See [`RhiError::SyncTimeout`].

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No physical device exposes a queue family with graphics and present
    /// support
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No enumerated memory type satisfies both the resource requirements and
    /// the requested property flags
    #[error("no memory type matches type bits {type_bits:#x} with properties {flags:?}")]
    NoSuitableMemoryType {
        /// Memory type mask reported by the resource
        type_bits: u32,
        /// Property flags the allocation requested
        flags: vk::MemoryPropertyFlags,
    },

    /// The surface does not expose the required color format
    #[error("surface does not expose required format {0:?}")]
    MissingSurfaceFormat(vk::Format),

    /// The surface capabilities are outside what the engine supports
    #[error("unsupported surface: {0}")]
    UnsupportedSurface(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    Shader(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Invalid handle or argument error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// A bounded CPU-side wait ran out of budget before the GPU signaled
    #[error("{operation} did not complete within {waited_ns}ns")]
    SyncTimeout {
        /// Which wait ran out of budget
        operation: &'static str,
        /// The budget that was exhausted, in nanoseconds
        waited_ns: u64,
    },
}

impl RhiError {
    /// Classifies the result of a bounded wait.
    ///
    /// `TIMEOUT` and `NOT_READY` become [`RhiError::SyncTimeout`] so callers
    /// can tell an exhausted budget apart from device loss; every other code
    /// passes through as a Vulkan error.
    pub fn from_wait_result(code: vk::Result, operation: &'static str, waited_ns: u64) -> Self {
        match code {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => RhiError::SyncTimeout {
                operation,
                waited_ns,
            },
            other => RhiError::Vulkan(other),
        }
    }

    /// Returns true for surface conditions that call for rebuilding the
    /// swapchain image set rather than failing.
    pub fn is_surface_outdated(&self) -> bool {
        matches!(
            self,
            RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR)
                | RhiError::Vulkan(vk::Result::SUBOPTIMAL_KHR)
        )
    }

    /// Returns true if the underlying device was lost.
    pub fn is_device_lost(&self) -> bool {
        matches!(self, RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_timeout_is_classified() {
        let err = RhiError::from_wait_result(vk::Result::TIMEOUT, "fence wait", 1_000);
        assert!(matches!(
            err,
            RhiError::SyncTimeout {
                operation: "fence wait",
                waited_ns: 1_000,
            }
        ));
    }

    #[test]
    fn test_device_loss_passes_through() {
        let err = RhiError::from_wait_result(vk::Result::ERROR_DEVICE_LOST, "fence wait", 1_000);
        assert!(err.is_device_lost());
        assert!(!matches!(err, RhiError::SyncTimeout { .. }));
    }

    #[test]
    fn test_surface_outdated_classification() {
        assert!(RhiError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR).is_surface_outdated());
        assert!(RhiError::Vulkan(vk::Result::SUBOPTIMAL_KHR).is_surface_outdated());
        assert!(!RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST).is_surface_outdated());
        assert!(!RhiError::NoSuitableGpu.is_surface_outdated());
    }
}

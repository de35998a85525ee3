//! Vulkan abstraction layer for the presentation engine.
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - GPU buffer allocation with explicit memory type selection
//! - Swapchain negotiation, image acquisition and presentation
//! - Command buffer recording
//! - Synchronization primitives
//! - Render pass, pipeline and descriptor objects

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

//! Platform abstraction layer for the presentation engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Raw window handles and Vulkan surface creation

mod window;

pub use window::{Surface, Window, get_required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;

//! Core utilities for the prism presentation engine.
//!
//! This crate provides foundational pieces used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Compiled-in configuration constants

mod config;
mod error;
mod logging;

pub use config::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
pub use error::{Error, Result};
pub use logging::init_logging;

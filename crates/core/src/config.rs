//! Compiled-in configuration.
//!
//! The engine takes no command-line flags, environment variables (other than
//! `RUST_LOG`, consumed by the logging layer), or persisted state. The window
//! geometry is a fixed constant, not configuration.

/// Logical window width in pixels.
pub const WINDOW_WIDTH: u32 = 250;

/// Logical window height in pixels.
pub const WINDOW_HEIGHT: u32 = 250;

/// Window title shown by the compositor.
pub const WINDOW_TITLE: &str = "prism";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_extent_is_nonzero() {
        assert!(WINDOW_WIDTH > 0);
        assert!(WINDOW_HEIGHT > 0);
    }
}

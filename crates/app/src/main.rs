//! Prism - Main Entry Point
//!
//! A Vulkan frame presentation engine: one fixed-size window, one triangle,
//! one frame in flight. The event loop drives a redraw per pending event
//! batch and exits when the window system requests close.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use prism_core::{WINDOW_HEIGHT, WINDOW_TITLE, WINDOW_WIDTH};
use prism_platform::Window;
use prism_present::Engine;

struct App {
    // Declared before the window so the engine's surface is destroyed
    // while the native window still exists
    engine: Option<Engine>,
    window: Option<Window>,
}

impl App {
    fn new() -> Self {
        Self {
            engine: None,
            window: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        // The window is configured once resumed fires; only then are
        // surface capability queries valid
        if self.window.is_none() {
            match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, WINDOW_TITLE) {
                Ok(window) => match Engine::new(&window) {
                    Ok(engine) => {
                        info!("Initialization complete, entering main loop");
                        self.engine = Some(engine);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to create engine: {:?}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut engine) = self.engine {
                    if let Err(e) = engine.render_frame() {
                        error!("Render error: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    prism_core::init_logging();
    info!("Starting prism");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}

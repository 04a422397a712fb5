//! Platform half of the multi-viewport protocol over winit: one native
//! window per secondary viewport, plus routing of their window events back
//! into the library's Io.

use std::collections::HashMap;

use opal_api::{Io, PlatformMonitor, PlatformViewportBackend, Viewport, ViewportFlags};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::PhysicalKey;
use winit::window::{Window, WindowAttributes, WindowId, WindowLevel};

use crate::{pixel_delta_to_lines, screen_space_pos, translate_key, translate_mouse_button};

struct ViewportWindow {
    window: Window,
    /// Set when the library itself moved/resized the window this frame, so
    /// the echoing OS event is not reported back as a platform request.
    programmatic_move: bool,
    programmatic_resize: bool,
}

/// winit implementation of [`PlatformViewportBackend`].
///
/// winit can only create windows while inside an event-loop callback, so the
/// host must call [`WinitViewportBackend::set_event_loop`] at the top of each
/// callback before the library updates its platform windows. The stored
/// pointer is only dereferenced inside `create_window`/`monitors` during that
/// same callback.
#[derive(Default)]
pub struct WinitViewportBackend {
    event_loop: Option<*const ActiveEventLoop>,
    windows: HashMap<u32, ViewportWindow>,
}

impl WinitViewportBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the frame-scoped event loop handle. Must be called on every
    /// event-loop callback that may update platform windows.
    pub fn set_event_loop(&mut self, event_loop: &ActiveEventLoop) {
        self.event_loop = Some(event_loop as *const ActiveEventLoop);
    }

    fn active_event_loop(&self) -> Result<&ActiveEventLoop, String> {
        let ptr = self
            .event_loop
            .ok_or("no ActiveEventLoop registered (call set_event_loop first)")?;
        // Valid for the duration of the current event-loop callback only.
        Ok(unsafe { &*ptr })
    }

    fn viewport_window(&self, viewport: &Viewport) -> Option<&Window> {
        self.windows.get(&viewport.id.0).map(|vw| &vw.window)
    }

    /// Id of the viewport owning the given native window, if any.
    pub fn viewport_for_window(&self, window_id: WindowId) -> Option<u32> {
        self.windows
            .iter()
            .find(|(_, vw)| vw.window.id() == window_id)
            .map(|(id, _)| *id)
    }

    /// Route a window event belonging to a secondary viewport: flags
    /// move/resize/close requests on the viewport and forwards input into Io.
    /// Returns false when the window is not one of ours (main window events
    /// go through [`crate::WinitPlatform::handle_event`] instead).
    pub fn route_event(
        &mut self,
        io: &mut Io,
        viewports: &mut [Viewport],
        window_id: WindowId,
        event: &WindowEvent,
    ) -> bool {
        let Some(vp_id) = self.viewport_for_window(window_id) else {
            return false;
        };
        let Some(viewport) = viewports.iter_mut().find(|vp| vp.id.0 == vp_id) else {
            return false;
        };
        let state = self.windows.get_mut(&vp_id).expect("window map entry");
        match event {
            WindowEvent::Moved(_) => {
                if !std::mem::take(&mut state.programmatic_move) {
                    viewport.platform_request_move = true;
                }
            }
            WindowEvent::Resized(_) => {
                if !std::mem::take(&mut state.programmatic_resize) {
                    viewport.platform_request_resize = true;
                }
            }
            WindowEvent::CloseRequested => viewport.platform_request_close = true,
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                viewport.dpi_scale = *scale_factor as f32;
            }
            WindowEvent::Focused(focused) => {
                viewport.flags.set(ViewportFlags::IS_FOCUSED, *focused);
                io.add_focus_event(*focused);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = translate_key(code) {
                        io.add_key_event(key, event.state == ElementState::Pressed);
                    }
                }
                if event.state == ElementState::Pressed {
                    if let Some(text) = &event.text {
                        for c in text.chars() {
                            io.add_input_character(c);
                        }
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = translate_mouse_button(*button) {
                    io.add_mouse_button_event(button, *state == ElementState::Pressed);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match *delta {
                    MouseScrollDelta::LineDelta(x, y) => [x, y],
                    MouseScrollDelta::PixelDelta(pos) => {
                        let logical = pos.to_logical::<f64>(state.window.scale_factor());
                        pixel_delta_to_lines(logical.x, logical.y)
                    }
                };
                io.add_mouse_wheel_event(lines);
            }
            WindowEvent::CursorMoved { position, .. } => {
                // Secondary viewports always feed screen-space positions.
                let pos = screen_space_pos(&state.window, [position.x, position.y]);
                io.add_mouse_pos_event(pos);
            }
            WindowEvent::CursorLeft { .. } => {
                io.add_mouse_pos_event([-f32::MAX, -f32::MAX]);
            }
            _ => {}
        }
        true
    }
}

impl PlatformViewportBackend for WinitViewportBackend {
    fn create_window(&mut self, viewport: &mut Viewport) -> Result<(), String> {
        let event_loop = self.active_event_loop()?;
        let mut attrs = WindowAttributes::default()
            .with_title("opal viewport")
            .with_position(PhysicalPosition::new(
                viewport.pos[0] as i32,
                viewport.pos[1] as i32,
            ))
            .with_inner_size(PhysicalSize::new(
                viewport.size[0].max(1.0) as u32,
                viewport.size[1].max(1.0) as u32,
            ))
            .with_visible(false);
        if viewport.flags.contains(ViewportFlags::NO_DECORATION) {
            attrs = attrs.with_decorations(false);
        }
        if viewport.flags.contains(ViewportFlags::TOP_MOST) {
            attrs = attrs.with_window_level(WindowLevel::AlwaysOnTop);
        }
        let window = event_loop
            .create_window(attrs)
            .map_err(|e| format!("create viewport window: {e}"))?;

        viewport.dpi_scale = window.scale_factor() as f32;
        viewport.raw_window_handle = Some(
            window
                .window_handle()
                .map_err(|e| e.to_string())?
                .as_raw(),
        );
        viewport.raw_display_handle = Some(
            window
                .display_handle()
                .map_err(|e| e.to_string())?
                .as_raw(),
        );
        log::debug!(
            "created viewport window id={} size={:?}",
            viewport.id.0,
            viewport.size
        );
        self.windows.insert(
            viewport.id.0,
            ViewportWindow {
                window,
                programmatic_move: false,
                programmatic_resize: false,
            },
        );
        Ok(())
    }

    fn destroy_window(&mut self, viewport: &mut Viewport) {
        self.windows.remove(&viewport.id.0);
        viewport.raw_window_handle = None;
        viewport.raw_display_handle = None;
    }

    fn show_window(&mut self, viewport: &Viewport) {
        if let Some(window) = self.viewport_window(viewport) {
            window.set_visible(true);
        }
    }

    fn set_window_pos(&mut self, viewport: &Viewport, pos: [f32; 2]) {
        if let Some(state) = self.windows.get_mut(&viewport.id.0) {
            state
                .window
                .set_outer_position(PhysicalPosition::new(pos[0] as i32, pos[1] as i32));
            state.programmatic_move = true;
        }
    }

    fn get_window_pos(&mut self, viewport: &Viewport) -> [f32; 2] {
        match self.viewport_window(viewport) {
            Some(window) => window
                .inner_position()
                .or_else(|_| window.outer_position())
                .map(|p| [p.x as f32, p.y as f32])
                .unwrap_or(viewport.pos),
            None => viewport.pos,
        }
    }

    fn set_window_size(&mut self, viewport: &Viewport, size: [f32; 2]) {
        if let Some(state) = self.windows.get_mut(&viewport.id.0) {
            let _ = state
                .window
                .request_inner_size(PhysicalSize::new(size[0].max(1.0), size[1].max(1.0)));
            state.programmatic_resize = true;
        }
    }

    fn get_window_size(&mut self, viewport: &Viewport) -> [f32; 2] {
        match self.viewport_window(viewport) {
            Some(window) => {
                let size = window.inner_size();
                [size.width as f32, size.height as f32]
            }
            None => viewport.size,
        }
    }

    fn set_window_title(&mut self, viewport: &Viewport, title: &str) {
        if let Some(window) = self.viewport_window(viewport) {
            window.set_title(title);
        }
    }

    fn set_window_focus(&mut self, viewport: &Viewport) {
        if let Some(window) = self.viewport_window(viewport) {
            window.focus_window();
        }
    }

    fn get_window_focus(&mut self, viewport: &Viewport) -> bool {
        self.viewport_window(viewport)
            .map(|w| w.has_focus())
            .unwrap_or(false)
    }

    fn get_window_minimized(&mut self, viewport: &Viewport) -> bool {
        self.viewport_window(viewport)
            .and_then(|w| w.is_minimized())
            .unwrap_or(false)
    }

    fn monitors(&self) -> Vec<PlatformMonitor> {
        let Ok(event_loop) = self.active_event_loop() else {
            return Vec::new();
        };
        event_loop
            .available_monitors()
            .map(|m| {
                let pos = m.position();
                let size = m.size();
                let main_pos = [pos.x as f32, pos.y as f32];
                let main_size = [size.width as f32, size.height as f32];
                PlatformMonitor {
                    main_pos,
                    main_size,
                    work_pos: main_pos,
                    work_size: main_size,
                    dpi_scale: m.scale_factor() as f32,
                }
            })
            .collect()
    }
}

//! SDL2 platform backend for the Opal GUI library.
//! Translates SDL events into the library's Io event queue, pushes display
//! metrics each frame, applies the requested mouse cursor, and (via
//! [`SdlViewportBackend`]) manages the native windows of secondary viewports.

mod keymap;
mod viewport;

pub use keymap::{decode_mods, system_cursor, translate_key, translate_mouse_button};
pub use viewport::SdlViewportBackend;

use std::time::Instant;

use opal_api::{BackendFlags, ConfigFlags, Io, MouseCursor};
use sdl2::event::{Event, WindowEvent};
use sdl2::mouse::{Cursor, MouseUtil, MouseWheelDirection};
use sdl2::video::Window;
use sdl2::Sdl;

/// SDL2 platform backend state for the main window.
pub struct SdlPlatform {
    last_frame: Instant,
    /// Keep the active SDL cursor alive: SDL reverts to the default cursor
    /// when the object is dropped.
    active_cursor: Option<(MouseCursor, Cursor)>,
    cursor_hidden: bool,
    warned_cursor_failure: bool,
}

impl SdlPlatform {
    /// Register the backend with the library: declares capabilities.
    pub fn new(io: &mut Io) -> Self {
        io.backend_flags |= BackendFlags::HAS_MOUSE_CURSORS | BackendFlags::HAS_SET_MOUSE_POS;
        Self {
            last_frame: Instant::now(),
            active_cursor: None,
            cursor_hidden: false,
            warned_cursor_failure: false,
        }
    }

    /// Enable the multi-viewport capability flag once an
    /// [`SdlViewportBackend`] has been installed.
    pub fn enable_viewports(io: &mut Io) {
        io.backend_flags |= BackendFlags::PLATFORM_HAS_VIEWPORTS;
    }

    /// Translate one SDL event for the main window into Io events. Returns
    /// whether the library currently claims this class of event.
    pub fn handle_event(&mut self, io: &mut Io, window: &Window, event: &Event) -> bool {
        match event {
            Event::KeyDown {
                keycode: Some(keycode),
                ..
            } => {
                if let Some(key) = translate_key(*keycode) {
                    io.add_key_event(key, true);
                }
                io.want_capture_keyboard
            }
            Event::KeyUp {
                keycode: Some(keycode),
                ..
            } => {
                if let Some(key) = translate_key(*keycode) {
                    io.add_key_event(key, false);
                }
                io.want_capture_keyboard
            }
            Event::TextInput { text, .. } => {
                for c in text.chars() {
                    io.add_input_character(c);
                }
                io.want_capture_keyboard
            }
            Event::MouseMotion { x, y, .. } => {
                let pos = if io.config_flags.contains(ConfigFlags::VIEWPORTS_ENABLE) {
                    let (wx, wy) = window.position();
                    [(wx + x) as f32, (wy + y) as f32]
                } else {
                    [*x as f32, *y as f32]
                };
                io.add_mouse_pos_event(pos);
                io.want_capture_mouse
            }
            Event::MouseButtonDown { mouse_btn, .. } => {
                if let Some(button) = translate_mouse_button(*mouse_btn) {
                    io.add_mouse_button_event(button, true);
                }
                io.want_capture_mouse
            }
            Event::MouseButtonUp { mouse_btn, .. } => {
                if let Some(button) = translate_mouse_button(*mouse_btn) {
                    io.add_mouse_button_event(button, false);
                }
                io.want_capture_mouse
            }
            Event::MouseWheel {
                precise_x,
                precise_y,
                direction,
                ..
            } => {
                let mut delta = [*precise_x, *precise_y];
                if matches!(direction, MouseWheelDirection::Flipped) {
                    delta = [-delta[0], -delta[1]];
                }
                io.add_mouse_wheel_event(delta);
                io.want_capture_mouse
            }
            Event::Window { win_event, .. } => {
                match win_event {
                    WindowEvent::FocusGained => io.add_focus_event(true),
                    WindowEvent::FocusLost => io.add_focus_event(false),
                    WindowEvent::Leave => io.add_mouse_pos_event([-f32::MAX, -f32::MAX]),
                    _ => {}
                }
                false
            }
            _ => false,
        }
    }

    /// Per-frame push: display size/scale, time delta, mouse warp, cursor.
    pub fn new_frame(&mut self, io: &mut Io, sdl: &Sdl, window: &Window) {
        let (w, h) = window.size();
        let (dw, dh) = window.drawable_size();
        io.display_size = [w as f32, h as f32];
        io.display_framebuffer_scale = [
            if w > 0 { dw as f32 / w as f32 } else { 1.0 },
            if h > 0 { dh as f32 / h as f32 } else { 1.0 },
        ];

        let now = Instant::now();
        io.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let mouse = sdl.mouse();
        if io.want_set_mouse_pos {
            let mut target = io.mouse_pos_request;
            if io.config_flags.contains(ConfigFlags::VIEWPORTS_ENABLE) {
                let (wx, wy) = window.position();
                target = [target[0] - wx as f32, target[1] - wy as f32];
            }
            mouse.warp_mouse_in_window(window, target[0] as i32, target[1] as i32);
        }

        self.update_cursor(io, &mouse);
    }

    fn update_cursor(&mut self, io: &Io, mouse: &MouseUtil) {
        if io.config_flags.contains(ConfigFlags::NO_MOUSE_CURSOR_CHANGE) {
            return;
        }
        let desired = if io.mouse_draw_cursor {
            None
        } else {
            io.mouse_cursor
        };
        let Some(shape) = desired else {
            if !self.cursor_hidden {
                mouse.show_cursor(false);
                self.cursor_hidden = true;
            }
            return;
        };
        if self.cursor_hidden {
            mouse.show_cursor(true);
            self.cursor_hidden = false;
        }
        if self.active_cursor.as_ref().map(|(s, _)| *s) == Some(shape) {
            return;
        }
        match Cursor::from_system(system_cursor(shape)) {
            Ok(cursor) => {
                cursor.set();
                self.active_cursor = Some((shape, cursor));
            }
            // Some platforms lack certain shapes; keep the current cursor.
            Err(e) => {
                if !self.warned_cursor_failure {
                    log::warn!("cursor shape {:?} unavailable: {}", shape, e);
                    self.warned_cursor_failure = true;
                }
            }
        }
    }
}

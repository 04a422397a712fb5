//! winit platform backend for the Opal GUI library.
//! Translates winit window events into the library's Io event queue, pushes
//! display metrics each frame, applies the requested mouse cursor, and (via
//! [`WinitViewportBackend`]) manages the native windows of secondary
//! viewports.

mod keymap;
mod viewport;

pub use keymap::{cursor_icon, translate_key, translate_mouse_button};
pub use viewport::WinitViewportBackend;

use std::time::Instant;

use opal_api::{BackendFlags, ConfigFlags, Io, Key, MouseCursor};
use winit::dpi::LogicalPosition;
use winit::event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::keyboard::{ModifiersState, PhysicalKey};
use winit::window::Window;

/// Logical pixels of precise-scroll travel that count as one wheel line.
const WHEEL_PIXELS_PER_LINE: f64 = 40.0;

/// Convert a precise (pixel) scroll delta, already in logical units, to
/// wheel lines.
pub(crate) fn pixel_delta_to_lines(x: f64, y: f64) -> [f32; 2] {
    [
        (x / WHEEL_PIXELS_PER_LINE) as f32,
        (y / WHEEL_PIXELS_PER_LINE) as f32,
    ]
}

/// winit platform backend state for the main window.
/// One per Io; create after the main window exists, then route every
/// WindowEvent through [`WinitPlatform::handle_event`] and call
/// [`WinitPlatform::new_frame`] once per frame before the library's frame.
pub struct WinitPlatform {
    last_frame: Instant,
    scale_factor: f64,
    modifiers: ModifiersState,
    /// Last cursor applied to the window; None = not yet applied.
    applied_cursor: Option<Option<MouseCursor>>,
}

impl WinitPlatform {
    /// Register the backend with the library: declares capabilities and
    /// records the main window's scale factor.
    pub fn new(io: &mut Io, window: &Window) -> Self {
        io.backend_flags |= BackendFlags::HAS_MOUSE_CURSORS
            | BackendFlags::HAS_SET_MOUSE_POS
            | BackendFlags::PLATFORM_HAS_VIEWPORTS;
        Self {
            last_frame: Instant::now(),
            scale_factor: window.scale_factor(),
            modifiers: ModifiersState::default(),
            applied_cursor: None,
        }
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Translate one window event for the main window into Io events.
    /// Returns whether the library currently claims this class of event
    /// (want_capture_*), so the host can skip its own handling.
    pub fn handle_event(&mut self, io: &mut Io, window: &Window, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                self.handle_key_event(io, event);
                io.want_capture_keyboard
            }
            WindowEvent::ModifiersChanged(new_mods) => {
                self.handle_modifiers(io, new_mods.state());
                io.want_capture_keyboard
            }
            WindowEvent::CursorMoved { position, .. } => {
                let pos = if io.config_flags.contains(ConfigFlags::VIEWPORTS_ENABLE) {
                    screen_space_pos(window, [position.x, position.y])
                } else {
                    let logical = position.to_logical::<f64>(self.scale_factor);
                    [logical.x as f32, logical.y as f32]
                };
                io.add_mouse_pos_event(pos);
                io.want_capture_mouse
            }
            WindowEvent::CursorLeft { .. } => {
                io.add_mouse_pos_event([-f32::MAX, -f32::MAX]);
                false
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if let Some(button) = translate_mouse_button(*button) {
                    io.add_mouse_button_event(button, *state == ElementState::Pressed);
                }
                io.want_capture_mouse
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match *delta {
                    MouseScrollDelta::LineDelta(x, y) => [x, y],
                    MouseScrollDelta::PixelDelta(pos) => {
                        let logical = pos.to_logical::<f64>(self.scale_factor);
                        pixel_delta_to_lines(logical.x, logical.y)
                    }
                };
                io.add_mouse_wheel_event(lines);
                io.want_capture_mouse
            }
            WindowEvent::Focused(focused) => {
                io.add_focus_event(*focused);
                false
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = *scale_factor;
                false
            }
            _ => false,
        }
    }

    fn handle_key_event(&mut self, io: &mut Io, event: &KeyEvent) {
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

    /// winit reports modifiers as combined state; diff against the previous
    /// state and emit key transitions for the left-hand variants.
    fn handle_modifiers(&mut self, io: &mut Io, new: ModifiersState) {
        let old = self.modifiers;
        let pairs = [
            (old.control_key(), new.control_key(), Key::LeftCtrl),
            (old.shift_key(), new.shift_key(), Key::LeftShift),
            (old.alt_key(), new.alt_key(), Key::LeftAlt),
            (old.super_key(), new.super_key(), Key::LeftSuper),
        ];
        for (was, is, key) in pairs {
            if was != is {
                io.add_key_event(key, is);
            }
        }
        self.modifiers = new;
    }

    /// Per-frame push: display size/scale, time delta, mouse warp, cursor.
    pub fn new_frame(&mut self, io: &mut Io, window: &Window) {
        self.scale_factor = window.scale_factor();
        let physical = window.inner_size();
        let logical = physical.to_logical::<f64>(self.scale_factor);
        io.display_size = [logical.width as f32, logical.height as f32];
        io.display_framebuffer_scale = [self.scale_factor as f32, self.scale_factor as f32];

        let now = Instant::now();
        io.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if io.want_set_mouse_pos {
            let target = LogicalPosition::new(
                io.mouse_pos_request[0] as f64,
                io.mouse_pos_request[1] as f64,
            );
            if let Err(e) = window.set_cursor_position(target) {
                log::warn!("set_cursor_position failed: {e}");
            }
        }

        self.update_cursor(io, window);
    }

    fn update_cursor(&mut self, io: &Io, window: &Window) {
        if io.config_flags.contains(ConfigFlags::NO_MOUSE_CURSOR_CHANGE) {
            return;
        }
        let desired = if io.mouse_draw_cursor {
            None
        } else {
            io.mouse_cursor
        };
        if self.applied_cursor == Some(desired) {
            return;
        }
        match desired {
            Some(shape) => {
                window.set_cursor(cursor_icon(shape));
                window.set_cursor_visible(true);
            }
            None => window.set_cursor_visible(false),
        }
        self.applied_cursor = Some(desired);
    }
}

/// Client-area position (physical pixels) to absolute screen position.
/// Falls back to the client position itself when the window position is
/// unavailable (some Wayland compositors).
pub(crate) fn screen_space_pos(window: &Window, client: [f64; 2]) -> [f32; 2] {
    let base = window
        .inner_position()
        .or_else(|_| window.outer_position())
        .map(|p| [p.x as f64, p.y as f64])
        .unwrap_or([0.0, 0.0]);
    [(base[0] + client[0]) as f32, (base[1] + client[1]) as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_scroll_converts_to_lines() {
        let [x, y] = pixel_delta_to_lines(0.0, -80.0);
        assert_eq!(x, 0.0);
        assert_eq!(y, -2.0);
    }

    #[test]
    fn modifier_diff_emits_transitions_once() {
        // Exercise the diff logic directly through Io; a second identical
        // state must not queue another event.
        let mut io = Io::new();
        let mut platform = WinitPlatform {
            last_frame: Instant::now(),
            scale_factor: 1.0,
            modifiers: ModifiersState::default(),
            applied_cursor: None,
        };
        platform.handle_modifiers(&mut io, ModifiersState::CONTROL);
        platform.handle_modifiers(&mut io, ModifiersState::CONTROL);
        assert_eq!(io.events().len(), 1);
        assert!(io.key_ctrl());
        platform.handle_modifiers(&mut io, ModifiersState::default());
        assert!(!io.key_ctrl());
    }
}

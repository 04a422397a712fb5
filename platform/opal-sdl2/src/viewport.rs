//! Platform half of the multi-viewport protocol over SDL2. Unlike winit,
//! SDL can create windows at any time through a cloned VideoSubsystem
//! handle, so no frame-scoped state is needed.

use std::collections::HashMap;

use opal_api::{Io, PlatformMonitor, PlatformViewportBackend, Viewport, ViewportFlags};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use sdl2::event::{Event, WindowEvent};
use sdl2::mouse::MouseWheelDirection;
use sdl2::video::{Window, WindowPos};
use sdl2::VideoSubsystem;

use crate::{translate_key, translate_mouse_button};

struct ViewportWindow {
    window: Window,
    programmatic_move: bool,
    programmatic_resize: bool,
}

/// SDL2 implementation of [`PlatformViewportBackend`].
pub struct SdlViewportBackend {
    video: VideoSubsystem,
    windows: HashMap<u32, ViewportWindow>,
}

impl SdlViewportBackend {
    pub fn new(video: VideoSubsystem) -> Self {
        Self {
            video,
            windows: HashMap::new(),
        }
    }

    fn window(&self, viewport: &Viewport) -> Option<&Window> {
        self.windows.get(&viewport.id.0).map(|vw| &vw.window)
    }

    fn window_mut(&mut self, viewport: &Viewport) -> Option<&mut Window> {
        self.windows.get_mut(&viewport.id.0).map(|vw| &mut vw.window)
    }

    /// Id of the viewport owning the given SDL window, if any.
    pub fn viewport_for_window(&self, window_id: u32) -> Option<u32> {
        self.windows
            .iter()
            .find(|(_, vw)| vw.window.id() == window_id)
            .map(|(id, _)| *id)
    }

    /// Route an SDL event belonging to a secondary viewport. Returns false
    /// when the event's window is not one of ours.
    pub fn route_event(&mut self, io: &mut Io, viewports: &mut [Viewport], event: &Event) -> bool {
        let window_id = match event {
            Event::Window { window_id, .. }
            | Event::KeyDown { window_id, .. }
            | Event::KeyUp { window_id, .. }
            | Event::TextInput { window_id, .. }
            | Event::MouseMotion { window_id, .. }
            | Event::MouseButtonDown { window_id, .. }
            | Event::MouseButtonUp { window_id, .. }
            | Event::MouseWheel { window_id, .. } => *window_id,
            _ => return false,
        };
        let Some(vp_id) = self.viewport_for_window(window_id) else {
            return false;
        };
        let Some(viewport) = viewports.iter_mut().find(|vp| vp.id.0 == vp_id) else {
            return false;
        };
        let state = self.windows.get_mut(&vp_id).expect("window map entry");
        match event {
            Event::Window { win_event, .. } => match win_event {
                WindowEvent::Moved(..) => {
                    if !std::mem::take(&mut state.programmatic_move) {
                        viewport.platform_request_move = true;
                    }
                }
                WindowEvent::Resized(..) | WindowEvent::SizeChanged(..) => {
                    if !std::mem::take(&mut state.programmatic_resize) {
                        viewport.platform_request_resize = true;
                    }
                }
                WindowEvent::Close => viewport.platform_request_close = true,
                WindowEvent::Minimized => viewport.flags.insert(ViewportFlags::IS_MINIMIZED),
                WindowEvent::Restored => viewport.flags.remove(ViewportFlags::IS_MINIMIZED),
                WindowEvent::FocusGained => {
                    viewport.flags.insert(ViewportFlags::IS_FOCUSED);
                    io.add_focus_event(true);
                }
                WindowEvent::FocusLost => {
                    viewport.flags.remove(ViewportFlags::IS_FOCUSED);
                    io.add_focus_event(false);
                }
                WindowEvent::Leave => io.add_mouse_pos_event([-f32::MAX, -f32::MAX]),
                _ => {}
            },
            Event::KeyDown {
                keycode: Some(keycode),
                ..
            } => {
                if let Some(key) = translate_key(*keycode) {
                    io.add_key_event(key, true);
                }
            }
            Event::KeyUp {
                keycode: Some(keycode),
                ..
            } => {
                if let Some(key) = translate_key(*keycode) {
                    io.add_key_event(key, false);
                }
            }
            Event::TextInput { text, .. } => {
                for c in text.chars() {
                    io.add_input_character(c);
                }
            }
            Event::MouseMotion { x, y, .. } => {
                // Secondary viewports always feed screen-space positions.
                let (wx, wy) = state.window.position();
                io.add_mouse_pos_event([(wx + x) as f32, (wy + y) as f32]);
            }
            Event::MouseButtonDown { mouse_btn, .. } => {
                if let Some(button) = translate_mouse_button(*mouse_btn) {
                    io.add_mouse_button_event(button, true);
                }
            }
            Event::MouseButtonUp { mouse_btn, .. } => {
                if let Some(button) = translate_mouse_button(*mouse_btn) {
                    io.add_mouse_button_event(button, false);
                }
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
            }
            _ => {}
        }
        true
    }
}

impl PlatformViewportBackend for SdlViewportBackend {
    fn create_window(&mut self, viewport: &mut Viewport) -> Result<(), String> {
        let mut builder = self.video.window(
            "opal viewport",
            viewport.size[0].max(1.0) as u32,
            viewport.size[1].max(1.0) as u32,
        );
        builder
            .position(viewport.pos[0] as i32, viewport.pos[1] as i32)
            .hidden()
            .allow_highdpi();
        if viewport.flags.contains(ViewportFlags::NO_DECORATION) {
            builder.borderless();
        }
        let window = builder.build().map_err(|e| e.to_string())?;
        if viewport.flags.contains(ViewportFlags::TOP_MOST) {
            unsafe {
                sdl2::sys::SDL_SetWindowAlwaysOnTop(window.raw(), sdl2::sys::SDL_bool::SDL_TRUE);
            }
        }

        let (w, _) = window.size();
        let (dw, _) = window.drawable_size();
        viewport.dpi_scale = if w > 0 { dw as f32 / w as f32 } else { 1.0 };
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
        if let Some(window) = self.window_mut(viewport) {
            window.show();
        }
    }

    fn set_window_pos(&mut self, viewport: &Viewport, pos: [f32; 2]) {
        if let Some(state) = self.windows.get_mut(&viewport.id.0) {
            state.window.set_position(
                WindowPos::Positioned(pos[0] as i32),
                WindowPos::Positioned(pos[1] as i32),
            );
            state.programmatic_move = true;
        }
    }

    fn get_window_pos(&mut self, viewport: &Viewport) -> [f32; 2] {
        match self.window(viewport) {
            Some(window) => {
                let (x, y) = window.position();
                [x as f32, y as f32]
            }
            None => viewport.pos,
        }
    }

    fn set_window_size(&mut self, viewport: &Viewport, size: [f32; 2]) {
        if let Some(state) = self.windows.get_mut(&viewport.id.0) {
            if let Err(e) = state
                .window
                .set_size(size[0].max(1.0) as u32, size[1].max(1.0) as u32)
            {
                log::warn!("set_size failed for viewport {}: {}", viewport.id.0, e);
                return;
            }
            state.programmatic_resize = true;
        }
    }

    fn get_window_size(&mut self, viewport: &Viewport) -> [f32; 2] {
        match self.window(viewport) {
            Some(window) => {
                let (w, h) = window.size();
                [w as f32, h as f32]
            }
            None => viewport.size,
        }
    }

    fn set_window_title(&mut self, viewport: &Viewport, title: &str) {
        if let Some(window) = self.window_mut(viewport) {
            // Titles with interior NULs cannot be represented; drop them.
            let _ = window.set_title(title);
        }
    }

    fn set_window_focus(&mut self, viewport: &Viewport) {
        if let Some(window) = self.window_mut(viewport) {
            window.raise();
        }
    }

    fn get_window_focus(&mut self, viewport: &Viewport) -> bool {
        self.window(viewport)
            .map(|w| {
                w.window_flags() & sdl2::sys::SDL_WindowFlags::SDL_WINDOW_INPUT_FOCUS as u32 != 0
            })
            .unwrap_or(false)
    }

    fn get_window_minimized(&mut self, viewport: &Viewport) -> bool {
        self.window(viewport)
            .map(|w| w.window_flags() & sdl2::sys::SDL_WindowFlags::SDL_WINDOW_MINIMIZED as u32 != 0)
            .unwrap_or(false)
    }

    fn set_window_alpha(&mut self, viewport: &Viewport, alpha: f32) {
        if let Some(window) = self.window_mut(viewport) {
            // Not supported by every compositor; SDL reports that as an error.
            let _ = window.set_opacity(alpha.clamp(0.0, 1.0));
        }
    }

    fn monitors(&self) -> Vec<PlatformMonitor> {
        let Ok(count) = self.video.num_video_displays() else {
            return Vec::new();
        };
        let mut monitors = Vec::new();
        for display in 0..count {
            let Ok(bounds) = self.video.display_bounds(display) else {
                continue;
            };
            let work = self
                .video
                .display_usable_bounds(display)
                .unwrap_or(bounds);
            let dpi_scale = self
                .video
                .display_dpi(display)
                .map(|(ddpi, _, _)| ddpi / 96.0)
                .unwrap_or(1.0);
            monitors.push(PlatformMonitor {
                main_pos: [bounds.x() as f32, bounds.y() as f32],
                main_size: [bounds.width() as f32, bounds.height() as f32],
                work_pos: [work.x() as f32, work.y() as f32],
                work_size: [work.width() as f32, work.height() as f32],
                dpi_scale,
            });
        }
        monitors
    }
}

//! Multi-viewport protocol: the library describes each OS-level window as a
//! Viewport and drives the backend hook traits to open/move/resize/close the
//! native windows and to render into them. Raw window handles published by
//! the platform backend flow to renderer backends through the Viewport, so
//! the two sides never need to know each other's window types.

use crate::draw::DrawData;
use bitflags::bitflags;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

/// Library-assigned viewport identifier. Stable for the viewport's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewportId(pub u32);

impl ViewportId {
    /// The main viewport (the application's own window).
    pub const MAIN: ViewportId = ViewportId(0);
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ViewportFlags: u32 {
        /// Window is created and destroyed by the application, not the hooks.
        const OWNED_BY_APP = 1 << 0;
        const NO_DECORATION = 1 << 1;
        const NO_TASKBAR_ICON = 1 << 2;
        const NO_FOCUS_ON_APPEARING = 1 << 3;
        const NO_FOCUS_ON_CLICK = 1 << 4;
        const NO_INPUTS = 1 << 5;
        const TOP_MOST = 1 << 6;
        const IS_MINIMIZED = 1 << 7;
        const IS_FOCUSED = 1 << 8;
    }
}

/// One OS-level window as the library sees it. Positions and sizes are in
/// screen-space pixels.
#[derive(Debug, Clone)]
pub struct Viewport {
    pub id: ViewportId,
    pub flags: ViewportFlags,
    pub pos: [f32; 2],
    pub size: [f32; 2],
    pub dpi_scale: f32,
    /// Set by the platform backend when the OS (not the library) moved,
    /// resized or asked to close the window; cleared by the library once it
    /// has absorbed the change.
    pub platform_request_move: bool,
    pub platform_request_resize: bool,
    pub platform_request_close: bool,
    /// Published by the platform backend after create_window; cleared by
    /// destroy_window. Renderer backends build their surfaces from these.
    pub raw_window_handle: Option<RawWindowHandle>,
    pub raw_display_handle: Option<RawDisplayHandle>,
}

impl Viewport {
    pub fn new(id: ViewportId) -> Self {
        Self {
            id,
            flags: ViewportFlags::default(),
            pos: [0.0, 0.0],
            size: [0.0, 0.0],
            dpi_scale: 1.0,
            platform_request_move: false,
            platform_request_resize: false,
            platform_request_close: false,
            raw_window_handle: None,
            raw_display_handle: None,
        }
    }

    /// Main viewport adopting the application-owned window.
    pub fn main(size: [f32; 2], dpi_scale: f32) -> Self {
        let mut vp = Viewport::new(ViewportId::MAIN);
        vp.flags = ViewportFlags::OWNED_BY_APP;
        vp.size = size;
        vp.dpi_scale = dpi_scale;
        vp
    }

    pub fn owned_by_app(&self) -> bool {
        self.flags.contains(ViewportFlags::OWNED_BY_APP)
    }
}

/// One monitor as reported by the platform backend. Used by the library to
/// clamp viewport placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlatformMonitor {
    pub main_pos: [f32; 2],
    pub main_size: [f32; 2],
    pub work_pos: [f32; 2],
    pub work_size: [f32; 2],
    pub dpi_scale: f32,
}

/// Platform half of the multi-viewport protocol. Implementations own the
/// native windows for every viewport not OWNED_BY_APP.
///
/// create_window must leave the window hidden; the library calls show_window
/// once the viewport contents exist. destroy_window must clear the raw
/// handles it published.
pub trait PlatformViewportBackend {
    fn create_window(&mut self, viewport: &mut Viewport) -> Result<(), String>;
    fn destroy_window(&mut self, viewport: &mut Viewport);
    fn show_window(&mut self, viewport: &Viewport);
    fn set_window_pos(&mut self, viewport: &Viewport, pos: [f32; 2]);
    fn get_window_pos(&mut self, viewport: &Viewport) -> [f32; 2];
    fn set_window_size(&mut self, viewport: &Viewport, size: [f32; 2]);
    fn get_window_size(&mut self, viewport: &Viewport) -> [f32; 2];
    fn set_window_title(&mut self, viewport: &Viewport, title: &str);
    fn set_window_focus(&mut self, viewport: &Viewport);
    fn get_window_focus(&mut self, viewport: &Viewport) -> bool;
    fn get_window_minimized(&mut self, viewport: &Viewport) -> bool;
    /// Per-window opacity; platforms without support ignore the call.
    fn set_window_alpha(&mut self, _viewport: &Viewport, _alpha: f32) {}
    /// Per-frame hook for platform-specific housekeeping.
    fn update_window(&mut self, _viewport: &mut Viewport) {}
    fn monitors(&self) -> Vec<PlatformMonitor> {
        Vec::new()
    }
}

/// Renderer half of the multi-viewport protocol. Implementations own the
/// per-viewport presentation resources (surface/swapchain).
pub trait RendererViewportBackend {
    fn create_window(&mut self, viewport: &Viewport) -> Result<(), String>;
    fn destroy_window(&mut self, viewport: &Viewport);
    fn set_window_size(&mut self, viewport: &Viewport, size: [f32; 2]) -> Result<(), String>;
    /// Render the viewport's draw data. Must tolerate zero-sized/minimized
    /// viewports by returning without drawing.
    fn render_window(&mut self, viewport: &Viewport, draw_data: &DrawData) -> Result<(), String>;
    /// Present the rendered frame. No-op for APIs where the platform swaps.
    fn swap_buffers(&mut self, viewport: &Viewport) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_viewport_is_app_owned() {
        let vp = Viewport::main([800.0, 600.0], 2.0);
        assert_eq!(vp.id, ViewportId::MAIN);
        assert!(vp.owned_by_app());
        assert_eq!(vp.dpi_scale, 2.0);
    }

    #[test]
    fn new_viewport_has_no_handles_or_requests() {
        let vp = Viewport::new(ViewportId(3));
        assert!(vp.raw_window_handle.is_none());
        assert!(vp.raw_display_handle.is_none());
        assert!(!vp.platform_request_move && !vp.platform_request_resize);
    }
}

//! Shared backend API for the Opal GUI library.
//! Defines the Io/DrawData/Viewport types and the hook traits through which
//! platform backends (winit, SDL2) and renderer backends (wgpu, Vulkan, GL)
//! talk to the library, so the host can mix any platform with any renderer.

mod draw;
mod io;
mod texture;
mod viewport;

pub use draw::{DrawCmd, DrawData, DrawIdx, DrawList, DrawVert};
pub use io::{BackendFlags, ConfigFlags, InputEvent, Io, Key, MouseButton, MouseCursor};
pub use texture::{FontAtlas, TextureId};
pub use viewport::{
    PlatformMonitor, PlatformViewportBackend, RendererViewportBackend, Viewport, ViewportFlags,
    ViewportId,
};
pub use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

//! Exercises the multi-viewport hook traits end to end with in-memory
//! backends: the window lifecycle, handle publication, and the
//! render-then-swap ordering renderers rely on.

use opal_api::{
    DrawData, PlatformViewportBackend, RendererViewportBackend, Viewport, ViewportFlags,
    ViewportId,
};

#[derive(Default)]
struct FakePlatform {
    windows: Vec<u32>,
    shown: Vec<u32>,
}

impl PlatformViewportBackend for FakePlatform {
    fn create_window(&mut self, viewport: &mut Viewport) -> Result<(), String> {
        // A real backend publishes OS handles here; the fake only records
        // the call. Handles stay None, which renderers must reject.
        self.windows.push(viewport.id.0);
        Ok(())
    }
    fn destroy_window(&mut self, viewport: &mut Viewport) {
        self.windows.retain(|id| *id != viewport.id.0);
        viewport.raw_window_handle = None;
        viewport.raw_display_handle = None;
    }
    fn show_window(&mut self, viewport: &Viewport) {
        self.shown.push(viewport.id.0);
    }
    fn set_window_pos(&mut self, _viewport: &Viewport, _pos: [f32; 2]) {}
    fn get_window_pos(&mut self, viewport: &Viewport) -> [f32; 2] {
        viewport.pos
    }
    fn set_window_size(&mut self, _viewport: &Viewport, _size: [f32; 2]) {}
    fn get_window_size(&mut self, viewport: &Viewport) -> [f32; 2] {
        viewport.size
    }
    fn set_window_title(&mut self, _viewport: &Viewport, _title: &str) {}
    fn set_window_focus(&mut self, _viewport: &Viewport) {}
    fn get_window_focus(&mut self, _viewport: &Viewport) -> bool {
        false
    }
    fn get_window_minimized(&mut self, _viewport: &Viewport) -> bool {
        false
    }
}

#[derive(Default)]
struct FakeRenderer {
    surfaces: Vec<u32>,
    rendered: Vec<u32>,
    swapped: Vec<u32>,
}

impl RendererViewportBackend for FakeRenderer {
    fn create_window(&mut self, viewport: &Viewport) -> Result<(), String> {
        self.surfaces.push(viewport.id.0);
        Ok(())
    }
    fn destroy_window(&mut self, viewport: &Viewport) {
        self.surfaces.retain(|id| *id != viewport.id.0);
    }
    fn set_window_size(&mut self, _viewport: &Viewport, _size: [f32; 2]) -> Result<(), String> {
        Ok(())
    }
    fn render_window(&mut self, viewport: &Viewport, draw_data: &DrawData) -> Result<(), String> {
        // Minimized/empty viewports must be tolerated without drawing.
        if draw_data.valid() {
            self.rendered.push(viewport.id.0);
        }
        Ok(())
    }
    fn swap_buffers(&mut self, viewport: &Viewport) -> Result<(), String> {
        self.swapped.push(viewport.id.0);
        Ok(())
    }
}

#[test]
fn secondary_viewport_window_lifecycle() {
    let mut platform = FakePlatform::default();
    let mut renderer = FakeRenderer::default();

    let mut viewport = Viewport::new(ViewportId(2));
    viewport.pos = [300.0, 200.0];
    viewport.size = [400.0, 300.0];
    viewport.flags = ViewportFlags::NO_DECORATION;

    platform.create_window(&mut viewport).unwrap();
    renderer.create_window(&viewport).unwrap();
    platform.show_window(&viewport);

    let draw_data = DrawData {
        display_pos: viewport.pos,
        display_size: viewport.size,
        ..Default::default()
    };
    // No geometry yet: render_window is a no-op, swap still legal.
    renderer.render_window(&viewport, &draw_data).unwrap();
    renderer.swap_buffers(&viewport).unwrap();
    assert!(renderer.rendered.is_empty());
    assert_eq!(renderer.swapped, vec![2]);

    renderer.destroy_window(&viewport);
    platform.destroy_window(&mut viewport);
    assert!(platform.windows.is_empty());
    assert!(renderer.surfaces.is_empty());
    assert!(viewport.raw_window_handle.is_none());
}

#[test]
fn main_viewport_is_never_created_through_hooks() {
    let main = Viewport::main([800.0, 600.0], 1.0);
    assert!(main.owned_by_app());
    // The library-side driver skips OWNED_BY_APP viewports; backends can
    // rely on create_window never seeing one.
    assert_eq!(main.id, ViewportId::MAIN);
}

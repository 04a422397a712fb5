//! Per-frame draw output of the library: vertex/index buffers plus a command
//! list with clip rectangles and texture bindings. Renderer backends consume
//! this; nothing here issues GPU work.

use crate::texture::TextureId;

/// Index type used by all draw lists. Large meshes address past 64k vertices
/// via DrawCmd::vtx_offset (renderers declare RENDERER_HAS_VTX_OFFSET).
pub type DrawIdx = u16;

/// One UI vertex. Layout is fixed; renderers describe it verbatim to the GPU.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawVert {
    /// Position in the same space as DrawData::display_pos (logical units).
    pub pos: [f32; 2],
    pub uv: [f32; 2],
    /// RGBA, linear 0..255.
    pub color: [u8; 4],
}

/// One draw command: a contiguous index range sharing a clip rect and texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCmd {
    /// Clip rectangle (min_x, min_y, max_x, max_y) in display space, not yet
    /// scaled by framebuffer_scale.
    pub clip_rect: [f32; 4],
    pub texture: TextureId,
    /// Added to every index in the range (16-bit index extension).
    pub vtx_offset: u32,
    /// First index within the list's index buffer.
    pub idx_offset: u32,
    pub elem_count: u32,
}

/// One draw list: shared buffers plus commands drawn in order.
#[derive(Debug, Clone, Default)]
pub struct DrawList {
    pub vtx_buffer: Vec<DrawVert>,
    pub idx_buffer: Vec<DrawIdx>,
    pub commands: Vec<DrawCmd>,
}

/// All draw lists for one viewport for one frame.
#[derive(Debug, Clone)]
pub struct DrawData {
    /// Top-left of the target viewport in the vertex coordinate space.
    pub display_pos: [f32; 2],
    /// Size of the target viewport in logical units.
    pub display_size: [f32; 2],
    /// Framebuffer pixels per logical unit.
    pub framebuffer_scale: [f32; 2],
    pub lists: Vec<DrawList>,
    pub total_vtx_count: usize,
    pub total_idx_count: usize,
}

impl Default for DrawData {
    fn default() -> Self {
        Self {
            display_pos: [0.0, 0.0],
            display_size: [0.0, 0.0],
            framebuffer_scale: [1.0, 1.0],
            lists: Vec::new(),
            total_vtx_count: 0,
            total_idx_count: 0,
        }
    }
}

impl DrawData {
    /// Append a list and keep the totals in sync.
    pub fn push_list(&mut self, list: DrawList) {
        self.total_vtx_count += list.vtx_buffer.len();
        self.total_idx_count += list.idx_buffer.len();
        self.lists.push(list);
    }

    /// Framebuffer size in pixels. Zero in either axis means "do not render"
    /// (minimized window).
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let w = self.display_size[0] * self.framebuffer_scale[0];
        let h = self.display_size[1] * self.framebuffer_scale[1];
        (w.max(0.0) as u32, h.max(0.0) as u32)
    }

    /// Whether renderers should process this frame at all.
    pub fn valid(&self) -> bool {
        let (w, h) = self.framebuffer_size();
        w > 0 && h > 0 && self.total_vtx_count > 0 && self.total_idx_count > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_list() -> DrawList {
        let v = |x: f32, y: f32| DrawVert {
            pos: [x, y],
            uv: [0.0, 0.0],
            color: [255, 255, 255, 255],
        };
        DrawList {
            vtx_buffer: vec![v(0.0, 0.0), v(1.0, 0.0), v(1.0, 1.0), v(0.0, 1.0)],
            idx_buffer: vec![0, 1, 2, 0, 2, 3],
            commands: vec![DrawCmd {
                clip_rect: [0.0, 0.0, 1.0, 1.0],
                texture: TextureId(1),
                vtx_offset: 0,
                idx_offset: 0,
                elem_count: 6,
            }],
        }
    }

    #[test]
    fn push_list_tracks_totals() {
        let mut data = DrawData {
            display_size: [100.0, 100.0],
            ..Default::default()
        };
        data.push_list(quad_list());
        data.push_list(quad_list());
        assert_eq!(data.total_vtx_count, 8);
        assert_eq!(data.total_idx_count, 12);
        assert!(data.valid());
    }

    #[test]
    fn empty_or_minimized_is_invalid() {
        let mut data = DrawData {
            display_size: [100.0, 100.0],
            ..Default::default()
        };
        assert!(!data.valid()); // no geometry
        data.push_list(quad_list());
        data.display_size = [0.0, 100.0];
        assert!(!data.valid()); // minimized
    }

    #[test]
    fn framebuffer_size_applies_scale() {
        let data = DrawData {
            display_size: [640.0, 360.0],
            framebuffer_scale: [2.0, 2.0],
            ..Default::default()
        };
        assert_eq!(data.framebuffer_size(), (1280, 720));
    }

    #[test]
    fn draw_vert_layout_is_20_bytes() {
        assert_eq!(std::mem::size_of::<DrawVert>(), 20);
        assert_eq!(std::mem::align_of::<DrawVert>(), 4);
    }
}

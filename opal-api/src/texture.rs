//! Texture handles and the font atlas block backends upload at init.

/// Opaque renderer-assigned texture handle carried in DrawCmd. The zero id is
/// reserved for "unset"; renderers substitute their fallback texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureId(pub u64);

impl TextureId {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Font atlas pixels produced by the library (RGBA, 8 bits per channel,
/// tightly packed rows). The renderer backend uploads them once and writes
/// the assigned id back so the library can reference the atlas in DrawCmds.
#[derive(Debug, Clone)]
pub struct FontAtlas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    tex_id: TextureId,
}

impl FontAtlas {
    pub fn from_rgba32(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, String> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(format!(
                "font atlas pixel buffer is {} bytes, expected {} for {}x{} RGBA",
                pixels.len(),
                expected,
                width,
                height
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
            tex_id: TextureId::default(),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn rgba32_pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn texture_id(&self) -> TextureId {
        self.tex_id
    }

    /// Called by the renderer backend after uploading the atlas.
    pub fn set_texture_id(&mut self, id: TextureId) {
        self.tex_id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_pixel_buffer() {
        assert!(FontAtlas::from_rgba32(2, 2, vec![0; 15]).is_err());
        assert!(FontAtlas::from_rgba32(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn texture_id_round_trip() {
        let mut atlas = FontAtlas::from_rgba32(1, 1, vec![255; 4]).unwrap();
        assert!(atlas.texture_id().is_null());
        atlas.set_texture_id(TextureId(7));
        assert_eq!(atlas.texture_id(), TextureId(7));
    }
}

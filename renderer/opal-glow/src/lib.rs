//! OpenGL 3 renderer backend for the Opal GUI library, on glow.
//!
//! All rendering methods require a current OpenGL context (3.2+ for
//! `glDrawElementsBaseVertex`); they are internally unsafe because they issue
//! raw GL calls. For secondary viewports the platform backend makes the
//! target context current before `render_window`, and swapping is the
//! platform's job (GL convention), so `swap_buffers` is a no-op here.

use std::collections::HashMap;
use std::rc::Rc;

use glow::HasContext;
use opal_api::{
    BackendFlags, DrawData, DrawVert, FontAtlas, Io, RendererViewportBackend, TextureId, Viewport,
};

const VERTEX_SHADER: &str = r#"
layout (location = 0) in vec2 a_pos;
layout (location = 1) in vec2 a_uv;
layout (location = 2) in vec4 a_color;
uniform mat4 u_proj;
out vec2 v_uv;
out vec4 v_color;
void main() {
    v_uv = a_uv;
    v_color = a_color;
    gl_Position = u_proj * vec4(a_pos, 0.0, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
#ifdef GL_ES
precision mediump float;
#endif
in vec2 v_uv;
in vec4 v_color;
uniform sampler2D u_texture;
out vec4 o_color;
void main() {
    o_color = v_color * texture(u_texture, v_uv);
}
"#;

/// GL renderer backend. Create with a current context; keep using it only
/// while that context (or a sharing one) is current.
pub struct GlowRenderer {
    gl: Rc<glow::Context>,
    program: glow::Program,
    u_proj: glow::UniformLocation,
    u_texture: glow::UniformLocation,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    ebo: glow::Buffer,
    font_texture: Option<glow::Texture>,
    textures: HashMap<u64, glow::Texture>,
    next_texture_id: u64,
}

impl GlowRenderer {
    /// Single-init entry point: compiles the program, sets up the vertex
    /// layout, uploads the font atlas and declares renderer capabilities.
    pub fn new(
        gl: Rc<glow::Context>,
        io: &mut Io,
        atlas: &mut FontAtlas,
        shader_version: &str,
    ) -> Result<Self, String> {
        let (program, u_proj, u_texture) = unsafe { compile_program(&gl, shader_version)? };
        let (vao, vbo, ebo) = unsafe { create_vertex_objects(&gl)? };
        let mut renderer = Self {
            gl,
            program,
            u_proj,
            u_texture,
            vao,
            vbo,
            ebo,
            font_texture: None,
            textures: HashMap::new(),
            next_texture_id: 1,
        };
        renderer.upload_font_atlas(atlas)?;
        io.backend_flags |=
            BackendFlags::RENDERER_HAS_VTX_OFFSET | BackendFlags::RENDERER_HAS_VIEWPORTS;
        Ok(renderer)
    }

    /// Upload the library's font atlas and hand the id back through it.
    pub fn upload_font_atlas(&mut self, atlas: &mut FontAtlas) -> Result<(), String> {
        let (width, height) = atlas.size();
        let gl = &self.gl;
        let texture = unsafe {
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(atlas.rgba32_pixels()),
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
            texture
        };
        if let Some(old) = self.font_texture.take() {
            unsafe { gl.delete_texture(old) };
        }
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id.0, texture);
        self.font_texture = Some(texture);
        atlas.set_texture_id(id);
        log::debug!("uploaded font atlas {}x{} as texture {:?}", width, height, id);
        Ok(())
    }

    /// Register a user GL texture. The caller keeps it alive for as long as
    /// draw lists use the id.
    pub fn register_texture(&mut self, texture: glow::Texture) -> TextureId {
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id.0, texture);
        id
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        self.textures.remove(&id.0);
    }

    /// Render draw data into the currently bound framebuffer. Sets the GL
    /// state the UI needs each call (blend on, scissor on, cull/depth off)
    /// without saving or restoring the host's state.
    pub fn render(&mut self, draw_data: &DrawData) -> Result<(), String> {
        if !draw_data.valid() {
            return Ok(());
        }
        let (fb_width, fb_height) = draw_data.framebuffer_size();
        let gl = &self.gl;
        unsafe {
            gl.enable(glow::BLEND);
            gl.blend_equation(glow::FUNC_ADD);
            gl.blend_func_separate(
                glow::SRC_ALPHA,
                glow::ONE_MINUS_SRC_ALPHA,
                glow::ONE,
                glow::ONE_MINUS_SRC_ALPHA,
            );
            gl.disable(glow::CULL_FACE);
            gl.disable(glow::DEPTH_TEST);
            gl.enable(glow::SCISSOR_TEST);
            gl.viewport(0, 0, fb_width as i32, fb_height as i32);

            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(
                Some(&self.u_proj),
                false,
                &ortho_projection(draw_data.display_pos, draw_data.display_size),
            );
            gl.uniform_1_i32(Some(&self.u_texture), 0);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_vertex_array(Some(self.vao));
        }

        for list in &draw_data.lists {
            unsafe {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
                gl.buffer_data_u8_slice(
                    glow::ARRAY_BUFFER,
                    bytemuck::cast_slice(&list.vtx_buffer),
                    glow::STREAM_DRAW,
                );
                gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
                gl.buffer_data_u8_slice(
                    glow::ELEMENT_ARRAY_BUFFER,
                    bytemuck::cast_slice(&list.idx_buffer),
                    glow::STREAM_DRAW,
                );
            }
            for cmd in &list.commands {
                if cmd.elem_count == 0 {
                    continue;
                }
                let Some((x, y, w, h)) = scissor_rect(
                    cmd.clip_rect,
                    draw_data.display_pos,
                    draw_data.framebuffer_scale,
                    (fb_width, fb_height),
                ) else {
                    continue;
                };
                let texture = self
                    .textures
                    .get(&cmd.texture.0)
                    .copied()
                    .or(self.font_texture);
                unsafe {
                    gl.bind_texture(glow::TEXTURE_2D, texture);
                    // GL scissor origin is the lower-left corner.
                    gl.scissor(
                        x as i32,
                        fb_height as i32 - (y + h) as i32,
                        w as i32,
                        h as i32,
                    );
                    gl.draw_elements_base_vertex(
                        glow::TRIANGLES,
                        cmd.elem_count as i32,
                        glow::UNSIGNED_SHORT,
                        (cmd.idx_offset as usize * std::mem::size_of::<opal_api::DrawIdx>())
                            as i32,
                        cmd.vtx_offset as i32,
                    );
                }
            }
        }
        unsafe {
            gl.bind_vertex_array(None);
            gl.use_program(None);
            gl.disable(glow::SCISSOR_TEST);
        }
        Ok(())
    }
}

impl Drop for GlowRenderer {
    fn drop(&mut self) {
        let gl = &self.gl;
        unsafe {
            if let Some(font) = self.font_texture.take() {
                gl.delete_texture(font);
            }
            gl.delete_buffer(self.vbo);
            gl.delete_buffer(self.ebo);
            gl.delete_vertex_array(self.vao);
            gl.delete_program(self.program);
        }
    }
}

impl RendererViewportBackend for GlowRenderer {
    // GL windows carry their own contexts; the platform backend owns them
    // and makes the right one current before render_window.
    fn create_window(&mut self, _viewport: &Viewport) -> Result<(), String> {
        Ok(())
    }

    fn destroy_window(&mut self, _viewport: &Viewport) {}

    fn set_window_size(&mut self, _viewport: &Viewport, _size: [f32; 2]) -> Result<(), String> {
        Ok(())
    }

    fn render_window(&mut self, _viewport: &Viewport, draw_data: &DrawData) -> Result<(), String> {
        self.render(draw_data)
    }

    fn swap_buffers(&mut self, _viewport: &Viewport) -> Result<(), String> {
        Ok(())
    }
}

unsafe fn compile_program(
    gl: &glow::Context,
    shader_version: &str,
) -> Result<(glow::Program, glow::UniformLocation, glow::UniformLocation), String> {
    let program = gl.create_program()?;
    let sources = [
        (glow::VERTEX_SHADER, VERTEX_SHADER),
        (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
    ];
    let mut shaders = Vec::with_capacity(sources.len());
    for (stage, source) in sources {
        let shader = gl.create_shader(stage)?;
        gl.shader_source(shader, &format!("{shader_version}\n{source}"));
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            return Err(format!("shader compile: {}", gl.get_shader_info_log(shader)));
        }
        gl.attach_shader(program, shader);
        shaders.push(shader);
    }
    gl.link_program(program);
    if !gl.get_program_link_status(program) {
        return Err(format!("program link: {}", gl.get_program_info_log(program)));
    }
    for shader in shaders {
        gl.detach_shader(program, shader);
        gl.delete_shader(shader);
    }
    let u_proj = gl
        .get_uniform_location(program, "u_proj")
        .ok_or("missing uniform u_proj")?;
    let u_texture = gl
        .get_uniform_location(program, "u_texture")
        .ok_or("missing uniform u_texture")?;
    Ok((program, u_proj, u_texture))
}

unsafe fn create_vertex_objects(
    gl: &glow::Context,
) -> Result<(glow::VertexArray, glow::Buffer, glow::Buffer), String> {
    let vao = gl.create_vertex_array()?;
    let vbo = gl.create_buffer()?;
    let ebo = gl.create_buffer()?;
    gl.bind_vertex_array(Some(vao));
    gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
    gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
    let stride = std::mem::size_of::<DrawVert>() as i32;
    gl.enable_vertex_attrib_array(0);
    gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, stride, 0);
    gl.enable_vertex_attrib_array(1);
    gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, stride, 8);
    gl.enable_vertex_attrib_array(2);
    gl.vertex_attrib_pointer_f32(2, 4, glow::UNSIGNED_BYTE, true, stride, 16);
    gl.bind_vertex_array(None);
    Ok((vao, vbo, ebo))
}

/// Orthographic projection mapping display space to GL clip space (y up).
fn ortho_projection(display_pos: [f32; 2], display_size: [f32; 2]) -> [f32; 16] {
    let l = display_pos[0];
    let r = display_pos[0] + display_size[0];
    let t = display_pos[1];
    let b = display_pos[1] + display_size[1];
    [
        2.0 / (r - l),
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 / (t - b),
        0.0,
        0.0,
        0.0,
        0.0,
        -1.0,
        0.0,
        (r + l) / (l - r),
        (t + b) / (b - t),
        0.0,
        1.0,
    ]
}

/// Clip rect (display space) to a framebuffer scissor, y-down. None when
/// empty after clamping.
fn scissor_rect(
    clip_rect: [f32; 4],
    display_pos: [f32; 2],
    fb_scale: [f32; 2],
    fb_size: (u32, u32),
) -> Option<(u32, u32, u32, u32)> {
    let min_x = ((clip_rect[0] - display_pos[0]) * fb_scale[0]).max(0.0);
    let min_y = ((clip_rect[1] - display_pos[1]) * fb_scale[1]).max(0.0);
    let max_x = ((clip_rect[2] - display_pos[0]) * fb_scale[0]).min(fb_size.0 as f32);
    let max_y = ((clip_rect[3] - display_pos[1]) * fb_scale[1]).min(fb_size.1 as f32);
    if max_x <= min_x || max_y <= min_y {
        return None;
    }
    Some((
        min_x as u32,
        min_y as u32,
        (max_x - min_x) as u32,
        (max_y - min_y) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ortho_maps_display_corners_to_clip_corners() {
        let m = ortho_projection([0.0, 0.0], [640.0, 480.0]);
        let apply = |x: f32, y: f32| [m[0] * x + m[12], m[5] * y + m[13]];
        let tl = apply(0.0, 0.0);
        let br = apply(640.0, 480.0);
        // Top-left of the display is (-1, +1) in GL clip space.
        assert!((tl[0] + 1.0).abs() < 1e-5 && (tl[1] - 1.0).abs() < 1e-5);
        assert!((br[0] - 1.0).abs() < 1e-5 && (br[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn scissor_flip_math_stays_in_bounds() {
        // A rect at the top of a 100px-tall framebuffer lands at the top in
        // GL coordinates: y = fb_h - (min_y + h).
        let (x, y, w, h) =
            scissor_rect([0.0, 0.0, 50.0, 10.0], [0.0, 0.0], [1.0, 1.0], (100, 100)).unwrap();
        assert_eq!((x, y, w, h), (0, 0, 50, 10));
        let flipped_y = 100 - (y + h);
        assert_eq!(flipped_y, 90);
    }

    #[test]
    fn offscreen_rects_are_skipped() {
        assert_eq!(
            scissor_rect([120.0, 0.0, 150.0, 50.0], [0.0, 0.0], [1.0, 1.0], (100, 100)),
            None
        );
    }
}

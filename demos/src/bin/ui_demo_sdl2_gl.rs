//! SDL2 + OpenGL demo: SdlPlatform event translation feeding the glow
//! renderer over an SDL GL 3.3 core context.
//! Run: cargo run -p demos --bin ui_demo_sdl2_gl

use std::rc::Rc;

use glow::HasContext;
use opal_api::{DrawCmd, DrawData, DrawList, DrawVert, FontAtlas, Io, TextureId};
use opal_glow::GlowRenderer;
use opal_sdl2::SdlPlatform;
use sdl2::event::Event;
use sdl2::video::GLProfile;

/// A quad in display space with one color, as two triangles.
fn quad(list: &mut DrawList, min: [f32; 2], max: [f32; 2], color: [u8; 4], texture: TextureId) {
    let base = list.vtx_buffer.len() as u16;
    let uv = [0.5, 0.5];
    for pos in [
        [min[0], min[1]],
        [max[0], min[1]],
        [max[0], max[1]],
        [min[0], max[1]],
    ] {
        list.vtx_buffer.push(DrawVert { pos, uv, color });
    }
    let idx_offset = list.idx_buffer.len() as u32;
    for i in [0u16, 1, 2, 0, 2, 3] {
        list.idx_buffer.push(i + base);
    }
    list.commands.push(DrawCmd {
        clip_rect: [min[0], min[1], max[0], max[1]],
        texture,
        vtx_offset: 0,
        idx_offset,
        elem_count: 6,
    });
}

fn build_draw_data(io: &Io, font_texture: TextureId, tick: f32) -> DrawData {
    let [w, h] = io.display_size;
    let mut list = DrawList::default();
    quad(
        &mut list,
        [20.0, 20.0],
        [w - 20.0, h - 20.0],
        [40, 44, 52, 240],
        font_texture,
    );
    let y = 40.0 + (tick.cos() * 0.5 + 0.5) * (h - 120.0).max(0.0);
    quad(
        &mut list,
        [40.0, y],
        [140.0, y + 40.0],
        [152, 195, 121, 255],
        font_texture,
    );
    if let Some(cmd) = list.commands.last_mut() {
        cmd.clip_rect = [20.0, 20.0, w - 20.0, h - 20.0];
    }
    let mut draw_data = DrawData {
        display_pos: [0.0, 0.0],
        display_size: io.display_size,
        framebuffer_scale: io.display_framebuffer_scale,
        ..Default::default()
    };
    draw_data.push_list(list);
    draw_data
}

fn main() -> Result<(), String> {
    env_logger::init();
    let sdl = sdl2::init()?;
    let video = sdl.video()?;
    let gl_attr = video.gl_attr();
    gl_attr.set_context_profile(GLProfile::Core);
    gl_attr.set_context_version(3, 3);

    let window = video
        .window("Opal SDL2 + GL demo", 900, 600)
        .opengl()
        .resizable()
        .position_centered()
        .allow_highdpi()
        .build()
        .map_err(|e| e.to_string())?;
    let _gl_context = window.gl_create_context()?;
    let gl = unsafe {
        glow::Context::from_loader_function(|s| video.gl_get_proc_address(s) as *const _)
    };
    let gl = Rc::new(gl);

    let mut io = Io::new();
    let mut platform = SdlPlatform::new(&mut io);
    let mut atlas = FontAtlas::from_rgba32(2, 2, vec![255; 16])?;
    let mut renderer = GlowRenderer::new(Rc::clone(&gl), &mut io, &mut atlas, "#version 330 core")?;

    let mut event_pump = sdl.event_pump()?;
    let mut tick = 0.0f32;
    'running: loop {
        let events: Vec<Event> = event_pump.poll_iter().collect();
        for event in &events {
            if matches!(event, Event::Quit { .. }) {
                break 'running;
            }
            platform.handle_event(&mut io, &window, event);
        }

        platform.new_frame(&mut io, &sdl, &window);
        tick += io.delta_time.max(1.0 / 240.0);
        let draw_data = build_draw_data(&io, atlas.texture_id(), tick);

        let (dw, dh) = window.drawable_size();
        unsafe {
            gl.viewport(0, 0, dw as i32, dh as i32);
            gl.clear_color(0.1, 0.1, 0.12, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);
        }
        renderer.render(&draw_data)?;
        window.gl_swap_window();
    }
    Ok(())
}

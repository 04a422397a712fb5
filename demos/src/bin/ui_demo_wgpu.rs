//! winit + wgpu demo: feeds synthetic draw lists through the full backend
//! path (platform new_frame/event handling + renderer RenderDrawData).
//! Run: cargo run -p demos --bin ui_demo_wgpu

use std::sync::Arc;

use opal_api::{DrawCmd, DrawData, DrawList, DrawVert, FontAtlas, Io, TextureId};
use opal_wgpu::{WgpuInit, WgpuRenderer, WgpuRendererConfig};
use opal_winit::WinitPlatform;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

/// A quad in display space with one color, as two triangles.
fn quad(list: &mut DrawList, min: [f32; 2], max: [f32; 2], color: [u8; 4], texture: TextureId) {
    let base = list.vtx_buffer.len() as u32;
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
        list.idx_buffer.push(i + base as u16);
    }
    list.commands.push(DrawCmd {
        clip_rect: [min[0], min[1], max[0], max[1]],
        texture,
        vtx_offset: 0,
        idx_offset,
        elem_count: 6,
    });
}

/// Synthesize one frame of draw data sized to the current display.
fn build_draw_data(io: &Io, font_texture: TextureId, tick: f32) -> DrawData {
    let [w, h] = io.display_size;
    let mut list = DrawList::default();
    // Background panel.
    quad(
        &mut list,
        [20.0, 20.0],
        [w - 20.0, h - 20.0],
        [40, 44, 52, 240],
        font_texture,
    );
    // A moving accent bar, clipped by the panel.
    let x = 40.0 + (tick.sin() * 0.5 + 0.5) * (w - 180.0).max(0.0);
    quad(
        &mut list,
        [x, 40.0],
        [x + 100.0, 80.0],
        [97, 175, 239, 255],
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

struct Gfx {
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    renderer: WgpuRenderer,
    platform: WinitPlatform,
    io: Io,
    atlas: FontAtlas,
}

struct App {
    window: Option<Arc<winit::window::Window>>,
    gfx: Option<Gfx>,
    tick: f32,
}

impl App {
    fn init_gfx(&mut self, window: Arc<winit::window::Window>) -> Result<Gfx, String> {
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|e| e.to_string())?;
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or("no adapter")?;
        let (device, queue) = pollster::block_on(
            adapter.request_device(&wgpu::DeviceDescriptor::default(), None),
        )
        .map_err(|e| e.to_string())?;
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .first()
            .copied()
            .unwrap_or(wgpu::TextureFormat::Bgra8Unorm);
        let size = window.inner_size();
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let mut io = Io::new();
        let platform = WinitPlatform::new(&mut io, &window);
        // Stand-in atlas: a 2x2 white block (the real library supplies its
        // rasterized font pixels here).
        let mut atlas = FontAtlas::from_rgba32(2, 2, vec![255; 16])?;
        let renderer = WgpuRenderer::new(
            WgpuInit {
                instance,
                adapter,
                device,
                queue,
                target_format: format,
            },
            &mut io,
            &mut atlas,
            WgpuRendererConfig::default(),
        )?;
        Ok(Gfx {
            surface,
            surface_config,
            renderer,
            platform,
            io,
            atlas,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::WindowAttributes::default()
            .with_title("Opal wgpu demo")
            .with_inner_size(winit::dpi::LogicalSize::new(900, 600));
        let window = Arc::new(event_loop.create_window(attrs).expect("create window"));
        match self.init_gfx(Arc::clone(&window)) {
            Ok(gfx) => self.gfx = Some(gfx),
            Err(e) => {
                eprintln!("init failed: {e}");
                event_loop.exit();
                return;
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let (Some(window), Some(gfx)) = (&self.window, &mut self.gfx) else {
            return;
        };
        gfx.platform.handle_event(&mut gfx.io, window, &event);
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(physical) => {
                gfx.surface_config.width = physical.width.max(1);
                gfx.surface_config.height = physical.height.max(1);
                gfx.surface
                    .configure(gfx.renderer.device(), &gfx.surface_config);
                window.request_redraw();
            }
            WindowEvent::RedrawRequested => {
                gfx.platform.new_frame(&mut gfx.io, window);
                self.tick += gfx.io.delta_time.max(1.0 / 240.0);
                let draw_data =
                    build_draw_data(&gfx.io, gfx.atlas.texture_id(), self.tick);

                let frame = match gfx.surface.get_current_texture() {
                    Ok(frame) => frame,
                    Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                        gfx.surface
                            .configure(gfx.renderer.device(), &gfx.surface_config);
                        match gfx.surface.get_current_texture() {
                            Ok(frame) => frame,
                            Err(e) => {
                                eprintln!("get_current_texture: {e}");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        eprintln!("get_current_texture: {e}");
                        return;
                    }
                };
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                let mut encoder = gfx.renderer.device().create_command_encoder(
                    &wgpu::CommandEncoderDescriptor {
                        label: Some("demo_frame"),
                    },
                );
                {
                    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("demo_pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: 0.1,
                                    g: 0.1,
                                    b: 0.12,
                                    a: 1.0,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        depth_stencil_attachment: None,
                        timestamp_writes: None,
                        occlusion_query_set: None,
                    });
                    if let Err(e) = gfx.renderer.render(&draw_data, &mut pass) {
                        eprintln!("render: {e}");
                    }
                }
                gfx.renderer.queue().submit([encoder.finish()]);
                frame.present();
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let event_loop = winit::event_loop::EventLoop::new().map_err(|e| e.to_string())?;
    let mut app = App {
        window: None,
        gfx: None,
        tick: 0.0,
    };
    event_loop.run_app(&mut app).map_err(|e| e.to_string())?;
    Ok(())
}

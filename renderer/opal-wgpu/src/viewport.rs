//! Renderer half of the multi-viewport protocol: one wgpu surface per
//! secondary viewport, configured from the raw handles the platform backend
//! published on the Viewport.

use opal_api::{DrawData, RendererViewportBackend, Viewport};
use wgpu::SurfaceTargetUnsafe;

use crate::WgpuRenderer;

pub(crate) struct ViewportSurface {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    /// Frame acquired by render_window, presented by swap_buffers.
    pending: Option<wgpu::SurfaceTexture>,
}

fn surface_config(format: wgpu::TextureFormat, width: u32, height: u32) -> wgpu::SurfaceConfiguration {
    wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format,
        width: width.max(1),
        height: height.max(1),
        present_mode: wgpu::PresentMode::Fifo,
        alpha_mode: wgpu::CompositeAlphaMode::Opaque,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    }
}

impl RendererViewportBackend for WgpuRenderer {
    fn create_window(&mut self, viewport: &Viewport) -> Result<(), String> {
        let raw_window_handle = viewport
            .raw_window_handle
            .ok_or("viewport has no window handle (platform backend not attached?)")?;
        let raw_display_handle = viewport
            .raw_display_handle
            .ok_or("viewport has no display handle")?;
        // The platform backend keeps the native window alive for as long as
        // the viewport exists; destroy_window drops the surface first.
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(SurfaceTargetUnsafe::RawHandle {
                    raw_window_handle,
                    raw_display_handle,
                })
                .map_err(|e| e.to_string())?
        };
        let caps = surface.get_capabilities(&self.adapter);
        let format = if caps.formats.contains(&self.target_format) {
            self.target_format
        } else {
            let fallback = caps
                .formats
                .first()
                .copied()
                .ok_or("surface reports no supported formats")?;
            log::warn!(
                "viewport {} surface does not support {:?}; using {:?}",
                viewport.id.0,
                self.target_format,
                fallback
            );
            fallback
        };
        let scale = viewport.dpi_scale.max(0.01);
        let config = surface_config(
            format,
            (viewport.size[0] * scale) as u32,
            (viewport.size[1] * scale) as u32,
        );
        surface.configure(&self.device, &config);
        self.viewports.insert(
            viewport.id.0,
            ViewportSurface {
                surface,
                config,
                pending: None,
            },
        );
        Ok(())
    }

    fn destroy_window(&mut self, viewport: &Viewport) {
        self.viewports.remove(&viewport.id.0);
    }

    fn set_window_size(&mut self, viewport: &Viewport, size: [f32; 2]) -> Result<(), String> {
        let Some(vs) = self.viewports.get_mut(&viewport.id.0) else {
            return Ok(());
        };
        let scale = viewport.dpi_scale.max(0.01);
        vs.config.width = ((size[0] * scale) as u32).max(1);
        vs.config.height = ((size[1] * scale) as u32).max(1);
        vs.pending = None;
        vs.surface.configure(&self.device, &vs.config);
        Ok(())
    }

    fn render_window(&mut self, viewport: &Viewport, draw_data: &DrawData) -> Result<(), String> {
        if !draw_data.valid() {
            return Ok(());
        }
        let (fb_width, fb_height) = draw_data.framebuffer_size();
        let Some(vs) = self.viewports.get_mut(&viewport.id.0) else {
            return Err(format!("render_window: unknown viewport {}", viewport.id.0));
        };
        if vs.config.width != fb_width || vs.config.height != fb_height {
            vs.config.width = fb_width;
            vs.config.height = fb_height;
            vs.surface.configure(&self.device, &vs.config);
        }
        let frame = match vs.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                vs.surface.configure(&self.device, &vs.config);
                vs.surface
                    .get_current_texture()
                    .map_err(|e| e.to_string())?
            }
            Err(e) => return Err(e.to_string()),
        };
        let format = vs.config.format;
        let clear = self.config.viewport_clear_color;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("opal_viewport_frame"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("opal_viewport_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            self.render_to_format(draw_data, &mut pass, format)?;
        }
        self.queue.submit([encoder.finish()]);

        if let Some(vs) = self.viewports.get_mut(&viewport.id.0) {
            vs.pending = Some(frame);
        }
        Ok(())
    }

    fn swap_buffers(&mut self, viewport: &Viewport) -> Result<(), String> {
        if let Some(vs) = self.viewports.get_mut(&viewport.id.0) {
            if let Some(frame) = vs.pending.take() {
                frame.present();
            }
        }
        Ok(())
    }
}

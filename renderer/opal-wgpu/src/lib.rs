//! WebGPU renderer backend for the Opal GUI library.
//! Consumes the library's per-frame DrawData and issues the equivalent wgpu
//! draw calls: one pipeline, a ring of per-frame vertex/index buffers, one
//! bind group per texture, scissored indexed draws. Secondary viewports get
//! their own surfaces through the RendererViewportBackend impl in
//! [`viewport`].

mod textures;
mod viewport;

pub use textures::TextureMap;

use opal_api::{BackendFlags, DrawData, DrawIdx, DrawVert, FontAtlas, Io, TextureId};

const UI_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/ui.wgsl"));

/// Frame-buffer growth granularity. Buffers never shrink.
const BUFFER_CHUNK: u64 = 4096;

/// Gamma handling for the fragment shader.
#[derive(Clone, Copy, Debug, Default)]
pub enum GammaMode {
    /// 2.2 for sRGB target formats, 1.0 otherwise.
    #[default]
    Auto,
    Linear,
    Gamma22,
}

/// Renderer configuration.
#[derive(Clone, Debug)]
pub struct WgpuRendererConfig {
    /// Number of in-flight frames the vertex/index ring covers.
    pub in_flight_frames: usize,
    pub gamma_mode: GammaMode,
    /// Clear color for secondary viewport windows.
    pub viewport_clear_color: wgpu::Color,
}

impl Default for WgpuRendererConfig {
    fn default() -> Self {
        Self {
            in_flight_frames: 3,
            gamma_mode: GammaMode::default(),
            viewport_clear_color: wgpu::Color::BLACK,
        }
    }
}

/// Everything the renderer needs from the host's wgpu setup. The instance
/// and adapter are kept for creating secondary viewport surfaces.
pub struct WgpuInit {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// Format of the main render target the host draws the UI into.
    pub target_format: wgpu::TextureFormat,
}

struct FrameBuffers {
    vertex: Option<wgpu::Buffer>,
    vertex_capacity: u64,
    index: Option<wgpu::Buffer>,
    index_capacity: u64,
    uniform: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    proj: [[f32; 4]; 4],
    gamma: f32,
    _pad: [f32; 3],
}

/// WebGPU renderer backend. One per device/target-format pair.
pub struct WgpuRenderer {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    config: WgpuRendererConfig,

    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    /// Pipelines keyed by color target format; the main target's pipeline is
    /// created eagerly, secondary viewport formats lazily.
    pipelines: std::collections::HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,

    textures: TextureMap,
    fallback_bind_group: wgpu::BindGroup,
    font_texture: Option<TextureId>,

    frames: Vec<FrameBuffers>,
    frame_index: usize,

    pub(crate) viewports: std::collections::HashMap<u32, viewport::ViewportSurface>,
}

impl WgpuRenderer {
    /// Single-init entry point: builds GPU objects, uploads the font atlas
    /// and declares renderer capabilities on the Io.
    pub fn new(
        init: WgpuInit,
        io: &mut Io,
        atlas: &mut FontAtlas,
        config: WgpuRendererConfig,
    ) -> Result<Self, String> {
        if config.in_flight_frames == 0 {
            return Err("in_flight_frames must be at least 1".to_string());
        }
        let WgpuInit {
            instance,
            adapter,
            device,
            queue,
            target_format,
        } = init;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("opal_ui_shader"),
            source: wgpu::ShaderSource::Wgsl(UI_SHADER.into()),
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("opal_uniform_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(
                        std::mem::size_of::<Uniforms>() as u64
                    ),
                },
                count: None,
            }],
        });
        let textures = TextureMap::new(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("opal_pipeline_layout"),
            bind_group_layouts: &[&uniform_layout, textures.layout()],
            push_constant_ranges: &[],
        });

        let mut frames = Vec::with_capacity(config.in_flight_frames);
        for _ in 0..config.in_flight_frames {
            let uniform = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("opal_uniforms"),
                size: std::mem::size_of::<Uniforms>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("opal_uniform_bind_group"),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform.as_entire_binding(),
                }],
            });
            frames.push(FrameBuffers {
                vertex: None,
                vertex_capacity: 0,
                index: None,
                index_capacity: 0,
                uniform,
                uniform_bind_group,
            });
        }

        let fallback_bind_group = create_white_texel_bind_group(&device, &queue, &textures);
        let mut renderer = Self {
            instance,
            adapter,
            device,
            queue,
            target_format,
            config,
            shader,
            pipeline_layout,
            pipelines: std::collections::HashMap::new(),
            textures,
            fallback_bind_group,
            font_texture: None,
            frames,
            frame_index: 0,
            viewports: std::collections::HashMap::new(),
        };
        renderer.create_pipeline(target_format);
        renderer.upload_font_atlas(atlas)?;

        io.backend_flags |=
            BackendFlags::RENDERER_HAS_VTX_OFFSET | BackendFlags::RENDERER_HAS_VIEWPORTS;
        Ok(renderer)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
    pub fn config(&self) -> &WgpuRendererConfig {
        &self.config
    }

    fn create_pipeline(&mut self, format: wgpu::TextureFormat) {
        let vertex_attributes = [
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: 0,
                shader_location: 0,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Float32x2,
                offset: 8,
                shader_location: 1,
            },
            wgpu::VertexAttribute {
                format: wgpu::VertexFormat::Unorm8x4,
                offset: 16,
                shader_location: 2,
            },
        ];
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("opal_ui_pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<DrawVert>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &vertex_attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState {
                            color: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::SrcAlpha,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                            alpha: wgpu::BlendComponent {
                                src_factor: wgpu::BlendFactor::One,
                                dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
                                operation: wgpu::BlendOperation::Add,
                            },
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        self.pipelines.insert(format, pipeline);
    }

    fn pipeline_for(&mut self, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        if !self.pipelines.contains_key(&format) {
            self.create_pipeline(format);
        }
        &self.pipelines[&format]
    }

    /// Upload the library's font atlas and hand the id back through it.
    pub fn upload_font_atlas(&mut self, atlas: &mut FontAtlas) -> Result<(), String> {
        let (width, height) = atlas.size();
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("opal_font_atlas"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            atlas.rgba32_pixels(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        // Replacing an existing atlas releases the old texture.
        if let Some(old) = self.font_texture.take() {
            self.textures.unregister(old);
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.textures.register(&self.device, &view);
        atlas.set_texture_id(id);
        self.font_texture = Some(id);
        log::debug!("uploaded font atlas {}x{} as texture {:?}", width, height, id);
        Ok(())
    }

    /// Register a user texture view for use in DrawCmds.
    pub fn register_texture(&mut self, view: &wgpu::TextureView) -> TextureId {
        self.textures.register(&self.device, view)
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        self.textures.unregister(id);
    }

    /// Render draw data into a render pass targeting the main format.
    pub fn render(
        &mut self,
        draw_data: &DrawData,
        pass: &mut wgpu::RenderPass<'_>,
    ) -> Result<(), String> {
        let format = self.target_format;
        self.render_to_format(draw_data, pass, format)
    }

    /// Render draw data into a pass whose color target uses `format`
    /// (secondary viewport surfaces may differ from the main target).
    pub fn render_to_format(
        &mut self,
        draw_data: &DrawData,
        pass: &mut wgpu::RenderPass<'_>,
        format: wgpu::TextureFormat,
    ) -> Result<(), String> {
        if !draw_data.valid() {
            return Ok(());
        }
        let (fb_width, fb_height) = draw_data.framebuffer_size();

        self.frame_index = (self.frame_index + 1) % self.frames.len();
        self.prepare_frame_buffers(draw_data)?;
        let gamma = gamma_for(self.config.gamma_mode, format);
        let uniforms = Uniforms {
            proj: ortho_projection(draw_data.display_pos, draw_data.display_size),
            gamma,
            _pad: [0.0; 3],
        };
        {
            let frame = &self.frames[self.frame_index];
            self.queue
                .write_buffer(&frame.uniform, 0, bytemuck::bytes_of(&uniforms));
        }

        // Recording: lazily create the pipeline first (needs &mut self), then
        // only shared borrows below.
        self.pipeline_for(format);
        let frame = &self.frames[self.frame_index];
        let vertex = frame.vertex.as_ref().ok_or("frame vertex buffer missing")?;
        let index = frame.index.as_ref().ok_or("frame index buffer missing")?;

        pass.set_pipeline(&self.pipelines[&format]);
        pass.set_bind_group(0, &frame.uniform_bind_group, &[]);
        pass.set_vertex_buffer(0, vertex.slice(..));
        pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint16);
        pass.set_viewport(0.0, 0.0, fb_width as f32, fb_height as f32, 0.0, 1.0);

        let mut list_vtx_base: i32 = 0;
        let mut list_idx_base: u32 = 0;
        for list in &draw_data.lists {
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
                let bind_group = self
                    .textures
                    .get(cmd.texture)
                    .unwrap_or(&self.fallback_bind_group);
                pass.set_bind_group(1, bind_group, &[]);
                pass.set_scissor_rect(x, y, w, h);
                let start = list_idx_base + cmd.idx_offset;
                pass.draw_indexed(
                    start..start + cmd.elem_count,
                    list_vtx_base + cmd.vtx_offset as i32,
                    0..1,
                );
            }
            list_vtx_base += list.vtx_buffer.len() as i32;
            list_idx_base += list.idx_buffer.len() as u32;
        }
        Ok(())
    }

    /// Grow (never shrink) this frame's buffers and upload all lists packed.
    fn prepare_frame_buffers(&mut self, draw_data: &DrawData) -> Result<(), String> {
        let vtx_bytes = (draw_data.total_vtx_count * std::mem::size_of::<DrawVert>()) as u64;
        let idx_bytes = (draw_data.total_idx_count * std::mem::size_of::<DrawIdx>()) as u64;
        let frame = &mut self.frames[self.frame_index];

        if frame.vertex.is_none() || frame.vertex_capacity < vtx_bytes {
            frame.vertex_capacity = grow_capacity(vtx_bytes);
            frame.vertex = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("opal_vertex"),
                size: frame.vertex_capacity,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }
        if frame.index.is_none() || frame.index_capacity < idx_bytes {
            frame.index_capacity = grow_capacity(idx_bytes);
            frame.index = Some(self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("opal_index"),
                size: frame.index_capacity,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }));
        }

        let mut vtx_data: Vec<u8> = Vec::with_capacity(vtx_bytes as usize);
        let mut idx_data: Vec<u8> = Vec::with_capacity(idx_bytes as usize + 2);
        for list in &draw_data.lists {
            vtx_data.extend_from_slice(bytemuck::cast_slice(&list.vtx_buffer));
            idx_data.extend_from_slice(bytemuck::cast_slice(&list.idx_buffer));
        }
        // write_buffer requires 4-byte-aligned sizes; u16 indices may end odd.
        while idx_data.len() % 4 != 0 {
            idx_data.extend_from_slice(&[0, 0]);
        }

        let frame = &self.frames[self.frame_index];
        if !vtx_data.is_empty() {
            self.queue
                .write_buffer(frame.vertex.as_ref().unwrap(), 0, &vtx_data);
        }
        if !idx_data.is_empty() {
            self.queue
                .write_buffer(frame.index.as_ref().unwrap(), 0, &idx_data);
        }
        Ok(())
    }
}

/// Orthographic projection mapping display space to clip space (column major).
fn ortho_projection(display_pos: [f32; 2], display_size: [f32; 2]) -> [[f32; 4]; 4] {
    let l = display_pos[0];
    let r = display_pos[0] + display_size[0];
    let t = display_pos[1];
    let b = display_pos[1] + display_size[1];
    [
        [2.0 / (r - l), 0.0, 0.0, 0.0],
        [0.0, 2.0 / (t - b), 0.0, 0.0],
        [0.0, 0.0, 0.5, 0.0],
        [(r + l) / (l - r), (t + b) / (b - t), 0.5, 1.0],
    ]
}

fn gamma_for(mode: GammaMode, format: wgpu::TextureFormat) -> f32 {
    match mode {
        GammaMode::Auto => {
            if format.is_srgb() {
                2.2
            } else {
                1.0
            }
        }
        GammaMode::Linear => 1.0,
        GammaMode::Gamma22 => 2.2,
    }
}

/// Clip rect (display space) to a framebuffer scissor. None when the rect is
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

fn grow_capacity(required: u64) -> u64 {
    required.div_ceil(BUFFER_CHUNK).max(1) * BUFFER_CHUNK
}

/// 1x1 white texel used when a DrawCmd references an unknown texture id.
fn create_white_texel_bind_group(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    textures: &TextureMap,
) -> wgpu::BindGroup {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("opal_fallback_texture"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255u8, 255, 255, 255],
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    textures.bind_group_for_view(device, &view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_clamps_to_framebuffer() {
        let rect = scissor_rect([-10.0, -10.0, 500.0, 500.0], [0.0, 0.0], [2.0, 2.0], (640, 480));
        assert_eq!(rect, Some((0, 0, 640, 480)));
    }

    #[test]
    fn scissor_applies_display_offset_and_scale() {
        let rect = scissor_rect([110.0, 120.0, 210.0, 170.0], [100.0, 100.0], [2.0, 2.0], (800, 600));
        assert_eq!(rect, Some((20, 40, 200, 100)));
    }

    #[test]
    fn empty_scissor_is_skipped() {
        assert_eq!(
            scissor_rect([50.0, 50.0, 50.0, 80.0], [0.0, 0.0], [1.0, 1.0], (100, 100)),
            None
        );
        // Entirely off-screen.
        assert_eq!(
            scissor_rect([200.0, 0.0, 300.0, 50.0], [0.0, 0.0], [1.0, 1.0], (100, 100)),
            None
        );
    }

    #[test]
    fn ortho_maps_display_corners_to_clip_corners() {
        let m = ortho_projection([100.0, 50.0], [200.0, 100.0]);
        let apply = |x: f32, y: f32| {
            [
                m[0][0] * x + m[3][0],
                m[1][1] * y + m[3][1],
            ]
        };
        let tl = apply(100.0, 50.0);
        let br = apply(300.0, 150.0);
        assert!((tl[0] + 1.0).abs() < 1e-5 && (tl[1] - 1.0).abs() < 1e-5);
        assert!((br[0] - 1.0).abs() < 1e-5 && (br[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn buffers_grow_in_chunks() {
        assert_eq!(grow_capacity(0), BUFFER_CHUNK);
        assert_eq!(grow_capacity(1), BUFFER_CHUNK);
        assert_eq!(grow_capacity(BUFFER_CHUNK), BUFFER_CHUNK);
        assert_eq!(grow_capacity(BUFFER_CHUNK + 1), 2 * BUFFER_CHUNK);
    }

    #[test]
    fn gamma_tracks_target_format() {
        assert_eq!(gamma_for(GammaMode::Auto, wgpu::TextureFormat::Bgra8UnormSrgb), 2.2);
        assert_eq!(gamma_for(GammaMode::Auto, wgpu::TextureFormat::Bgra8Unorm), 1.0);
        assert_eq!(gamma_for(GammaMode::Linear, wgpu::TextureFormat::Bgra8UnormSrgb), 1.0);
    }
}

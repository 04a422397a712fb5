//! Vulkan renderer backend for the Opal GUI library, on ash.
//! Records the library's per-frame DrawData into a caller-supplied command
//! buffer: one pipeline with push-constant scale/translate, per-frame
//! host-visible vertex/index buffers recreated on overflow, one combined
//! image sampler descriptor set per texture. Secondary viewports get their
//! own surface/swapchain/frame resources through the
//! RendererViewportBackend impl in [`viewport`].
//!
//! The backend never submits work for the main window; the host owns the
//! frame loop and synchronization there. Secondary viewport windows are
//! submitted and presented internally.

mod buffers;
mod shaders;
mod viewport;

use std::collections::HashMap;
use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use opal_api::{BackendFlags, DrawData, DrawIdx, DrawVert, FontAtlas, Io, TextureId};

use buffers::{BufferBlock, FrameBuffers};

const UI_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/ui.wgsl"));

/// Everything the renderer needs from the host's Vulkan setup. The entry and
/// instance are kept for creating secondary viewport surfaces.
pub struct VulkanInit {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: Arc<ash::Device>,
    pub queue: vk::Queue,
    pub queue_family_index: u32,
    /// Pool used for the font upload command buffer; must allow reset.
    pub command_pool: vk::CommandPool,
    /// Render pass the main UI is recorded in; its color attachment format
    /// fixes the main pipeline's target format.
    pub render_pass: vk::RenderPass,
}

/// Renderer configuration.
#[derive(Clone, Debug)]
pub struct VulkanRendererConfig {
    /// Vertex/index buffer ring depth for the main window.
    pub in_flight_frames: usize,
    /// Descriptor pool capacity: the font atlas plus user textures.
    pub max_textures: u32,
    /// Clear color for secondary viewport windows.
    pub viewport_clear_color: [f32; 4],
}

impl Default for VulkanRendererConfig {
    fn default() -> Self {
        Self {
            in_flight_frames: 2,
            max_textures: 64,
            viewport_clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

struct FontTexture {
    device: Arc<ash::Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

impl Drop for FontTexture {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Vulkan renderer backend. One per device.
pub struct VulkanRenderer {
    entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: Arc<ash::Device>,
    queue: vk::Queue,
    queue_family_index: u32,
    command_pool: vk::CommandPool,
    mem_props: vk::PhysicalDeviceMemoryProperties,
    config: VulkanRendererConfig,

    shader_module: vk::ShaderModule,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_pool: vk::DescriptorPool,
    pipeline_layout: vk::PipelineLayout,
    sampler: vk::Sampler,
    /// Pipeline compatible with the host's main render pass.
    pipeline: vk::Pipeline,

    font: Option<FontTexture>,
    font_set: vk::DescriptorSet,
    font_id: Option<TextureId>,
    textures: HashMap<u64, vk::DescriptorSet>,
    next_texture_id: u64,

    frames: Vec<FrameBuffers>,
    frame_index: usize,

    viewports: HashMap<u32, viewport::ViewportResources>,
}

impl VulkanRenderer {
    /// Single-init entry point: builds the pipeline and descriptor objects,
    /// uploads the font atlas and declares renderer capabilities on the Io.
    pub fn new(
        init: VulkanInit,
        io: &mut Io,
        atlas: &mut FontAtlas,
        config: VulkanRendererConfig,
    ) -> Result<Self, String> {
        if config.in_flight_frames == 0 {
            return Err("in_flight_frames must be at least 1".to_string());
        }
        let VulkanInit {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            command_pool,
            render_pass,
        } = init;
        let mem_props =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let spirv = shaders::compile_wgsl(UI_SHADER)?;
        let shader_info = vk::ShaderModuleCreateInfo::default().code(&spirv);
        let shader_module = unsafe {
            device
                .create_shader_module(&shader_info, None)
                .map_err(|e| format!("create_shader_module: {e:?}"))?
        };

        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)];
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let descriptor_set_layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(|e| format!("create_descriptor_set_layout: {e:?}"))?
        };

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(config.max_textures)];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(config.max_textures)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(|e| format!("create_descriptor_pool: {e:?}"))?
        };

        let push_ranges = [vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(16)];
        let set_layouts = [descriptor_set_layout];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_ranges);
        let pipeline_layout = unsafe {
            device
                .create_pipeline_layout(&pipeline_layout_info, None)
                .map_err(|e| format!("create_pipeline_layout: {e:?}"))?
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .min_filter(vk::Filter::LINEAR)
            .mag_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        let sampler = unsafe {
            device
                .create_sampler(&sampler_info, None)
                .map_err(|e| format!("create_sampler: {e:?}"))?
        };

        let pipeline =
            create_ui_pipeline(&device, shader_module, pipeline_layout, render_pass)?;

        let mut frames = Vec::with_capacity(config.in_flight_frames);
        for _ in 0..config.in_flight_frames {
            frames.push(FrameBuffers::default());
        }

        let mut renderer = Self {
            entry,
            instance,
            physical_device,
            device,
            queue,
            queue_family_index,
            command_pool,
            mem_props,
            config,
            shader_module,
            descriptor_set_layout,
            descriptor_pool,
            pipeline_layout,
            sampler,
            pipeline,
            font: None,
            font_set: vk::DescriptorSet::null(),
            font_id: None,
            textures: HashMap::new(),
            next_texture_id: 1,
            frames,
            frame_index: 0,
            viewports: HashMap::new(),
        };
        renderer.upload_font_atlas(atlas)?;

        io.backend_flags |=
            BackendFlags::RENDERER_HAS_VTX_OFFSET | BackendFlags::RENDERER_HAS_VIEWPORTS;
        Ok(renderer)
    }

    /// Upload the library's font atlas: staging buffer, layout transition,
    /// copy, transition to shader-read. Blocks until the copy completes so
    /// the staging buffer can be freed.
    pub fn upload_font_atlas(&mut self, atlas: &mut FontAtlas) -> Result<(), String> {
        let (width, height) = atlas.size();
        let extent = vk::Extent3D {
            width: width.max(1),
            height: height.max(1),
            depth: 1,
        };
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let image = unsafe {
            self.device
                .create_image(&image_info, None)
                .map_err(|e| format!("create_image: {e:?}"))?
        };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        let memory_type_index = buffers::find_memory_type(
            &self.mem_props,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            self.device
                .allocate_memory(&allocate_info, None)
                .map_err(|e| format!("allocate_memory: {e:?}"))?
        };
        unsafe {
            self.device
                .bind_image_memory(image, memory, 0)
                .map_err(|e| format!("bind_image_memory: {e:?}"))?;
        }

        let staging = BufferBlock::new(
            Arc::clone(&self.device),
            &self.mem_props,
            atlas.rgba32_pixels().len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.upload(atlas.rgba32_pixels())?;

        self.with_one_time_commands(|device, cmd| unsafe {
            let subresource = vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1);
            let to_transfer = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource);
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            );
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_extent(extent);
            device.cmd_copy_buffer_to_image(
                cmd,
                staging.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
            let to_sampled = vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                .dst_access_mask(vk::AccessFlags::SHADER_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(subresource);
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_sampled],
            );
        })?;
        drop(staging);

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe {
            self.device
                .create_image_view(&view_info, None)
                .map_err(|e| format!("create_image_view: {e:?}"))?
        };

        // Replacing an existing atlas releases the old resources.
        if self.font.take().is_some() {
            unsafe {
                let _ = self
                    .device
                    .free_descriptor_sets(self.descriptor_pool, &[self.font_set]);
            }
            if let Some(old_id) = self.font_id.take() {
                self.textures.remove(&old_id.0);
            }
        }
        let set = self.allocate_texture_set(view)?;
        self.font_set = set;
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id.0, set);
        self.font_id = Some(id);
        atlas.set_texture_id(id);
        self.font = Some(FontTexture {
            device: Arc::clone(&self.device),
            image,
            memory,
            view,
        });
        log::debug!("uploaded font atlas {}x{} as texture {:?}", width, height, id);
        Ok(())
    }

    /// Register a user texture view (already in SHADER_READ_ONLY layout).
    /// The caller keeps the view alive for as long as draw lists use the id.
    pub fn register_texture(&mut self, view: vk::ImageView) -> Result<TextureId, String> {
        let set = self.allocate_texture_set(view)?;
        let id = TextureId(self.next_texture_id);
        self.next_texture_id += 1;
        self.textures.insert(id.0, set);
        Ok(id)
    }

    pub fn unregister_texture(&mut self, id: TextureId) {
        if let Some(set) = self.textures.remove(&id.0) {
            unsafe {
                let _ = self.device.free_descriptor_sets(self.descriptor_pool, &[set]);
            }
        }
    }

    fn allocate_texture_set(&self, view: vk::ImageView) -> Result<vk::DescriptorSet, String> {
        let layouts = [self.descriptor_set_layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.descriptor_pool)
            .set_layouts(&layouts);
        let set = unsafe {
            self.device
                .allocate_descriptor_sets(&allocate_info)
                .map_err(|e| format!("allocate_descriptor_sets: {e:?}"))?[0]
        };
        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(self.sampler)
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
        Ok(set)
    }

    /// Record a one-time command buffer on the shared pool and wait for it.
    fn with_one_time_commands(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), String> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe {
            self.device
                .allocate_command_buffers(&allocate_info)
                .map_err(|e| format!("allocate_command_buffers: {e:?}"))?[0]
        };
        let begin = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| format!("begin_command_buffer: {e:?}"))?;
        }
        record(&self.device, cmd);
        unsafe {
            self.device
                .end_command_buffer(cmd)
                .map_err(|e| format!("end_command_buffer: {e:?}"))?;
        }
        let fence_info = vk::FenceCreateInfo::default();
        let fence = unsafe {
            self.device
                .create_fence(&fence_info, None)
                .map_err(|e| format!("create_fence: {e:?}"))?
        };
        let cmds = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmds);
        let result = unsafe {
            self.device
                .queue_submit(self.queue, &[submit], fence)
                .map_err(|e| format!("queue_submit: {e:?}"))
                .and_then(|_| {
                    self.device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| format!("wait_for_fences: {e:?}"))
                })
        };
        unsafe {
            self.device.destroy_fence(fence, None);
            self.device.free_command_buffers(self.command_pool, &cmds);
        }
        result
    }

    /// Record the draw data into a caller-supplied command buffer that is
    /// inside a render pass compatible with the one given at init. Does not
    /// submit anything.
    pub fn cmd_render(
        &mut self,
        draw_data: &DrawData,
        command_buffer: vk::CommandBuffer,
    ) -> Result<(), String> {
        if !draw_data.valid() {
            return Ok(());
        }
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        let mut frame = std::mem::take(&mut self.frames[self.frame_index]);
        let result = self.record_into(&mut frame, draw_data, command_buffer, self.pipeline);
        self.frames[self.frame_index] = frame;
        result
    }

    /// Upload geometry into the frame's buffers and record bind/draw calls.
    pub(crate) fn record_into(
        &self,
        frame: &mut FrameBuffers,
        draw_data: &DrawData,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
    ) -> Result<(), String> {
        let vtx_bytes = (draw_data.total_vtx_count * std::mem::size_of::<DrawVert>()) as u64;
        let idx_bytes = (draw_data.total_idx_count * std::mem::size_of::<DrawIdx>()) as u64;
        frame.ensure_capacity(&self.device, &self.mem_props, vtx_bytes, idx_bytes)?;

        let mut vtx_data: Vec<u8> = Vec::with_capacity(vtx_bytes as usize);
        let mut idx_data: Vec<u8> = Vec::with_capacity(idx_bytes as usize);
        for list in &draw_data.lists {
            vtx_data.extend_from_slice(bytemuck::cast_slice(&list.vtx_buffer));
            idx_data.extend_from_slice(bytemuck::cast_slice(&list.idx_buffer));
        }
        let vertex = frame.vertex.as_ref().ok_or("frame vertex buffer missing")?;
        let index = frame.index.as_ref().ok_or("frame index buffer missing")?;
        vertex.upload(&vtx_data)?;
        index.upload(&idx_data)?;

        let (fb_width, fb_height) = draw_data.framebuffer_size();
        let device = &self.device;
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
            device.cmd_bind_vertex_buffers(cmd, 0, &[vertex.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, index.buffer, 0, vk::IndexType::UINT16);
            device.cmd_set_viewport(
                cmd,
                0,
                &[vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: fb_width as f32,
                    height: fb_height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            let push = push_constants(draw_data.display_pos, draw_data.display_size);
            device.cmd_push_constants(
                cmd,
                self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::cast_slice(&push),
            );
        }

        let mut list_vtx_base: i32 = 0;
        let mut list_idx_base: u32 = 0;
        for list in &draw_data.lists {
            for draw in &list.commands {
                if draw.elem_count == 0 {
                    continue;
                }
                let Some((x, y, w, h)) = scissor_rect(
                    draw.clip_rect,
                    draw_data.display_pos,
                    draw_data.framebuffer_scale,
                    (fb_width, fb_height),
                ) else {
                    continue;
                };
                let set = self
                    .textures
                    .get(&draw.texture.0)
                    .copied()
                    .unwrap_or(self.font_set);
                unsafe {
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        self.pipeline_layout,
                        0,
                        &[set],
                        &[],
                    );
                    device.cmd_set_scissor(
                        cmd,
                        0,
                        &[vk::Rect2D {
                            offset: vk::Offset2D {
                                x: x as i32,
                                y: y as i32,
                            },
                            extent: vk::Extent2D {
                                width: w,
                                height: h,
                            },
                        }],
                    );
                    device.cmd_draw_indexed(
                        cmd,
                        draw.elem_count,
                        1,
                        list_idx_base + draw.idx_offset,
                        list_vtx_base + draw.vtx_offset as i32,
                        0,
                    );
                }
            }
            list_vtx_base += list.vtx_buffer.len() as i32;
            list_idx_base += list.idx_buffer.len() as u32;
        }
        Ok(())
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.viewports.clear();
        self.frames.clear();
        self.font = None;
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_sampler(self.sampler, None);
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
            self.device
                .destroy_descriptor_pool(self.descriptor_pool, None);
            self.device
                .destroy_descriptor_set_layout(self.descriptor_set_layout, None);
            self.device.destroy_shader_module(self.shader_module, None);
        }
    }
}

/// Push constant block: scale + translate mapping display space (y down) to
/// WGSL clip space (y up). The SPIR-V writer's coordinate adjustment then
/// flips y once more for Vulkan's y-down clip space.
fn push_constants(display_pos: [f32; 2], display_size: [f32; 2]) -> [f32; 4] {
    let scale = [2.0 / display_size[0], -2.0 / display_size[1]];
    [
        scale[0],
        scale[1],
        -1.0 - display_pos[0] * scale[0],
        1.0 - display_pos[1] * scale[1],
    ]
}

/// Clip rect (display space) to a framebuffer scissor. None when empty.
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

/// Build the UI graphics pipeline against the given render pass.
pub(crate) fn create_ui_pipeline(
    device: &ash::Device,
    shader_module: vk::ShaderModule,
    pipeline_layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
) -> Result<vk::Pipeline, String> {
    let vs_name = CString::new("vs_main").unwrap();
    let fs_name = CString::new("fs_main").unwrap();
    let stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(shader_module)
            .name(&vs_name),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(shader_module)
            .name(&fs_name),
    ];

    let bindings = [vk::VertexInputBindingDescription::default()
        .binding(0)
        .stride(std::mem::size_of::<DrawVert>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)];
    let attributes = [
        vk::VertexInputAttributeDescription::default()
            .location(0)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(0),
        vk::VertexInputAttributeDescription::default()
            .location(1)
            .binding(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(8),
        vk::VertexInputAttributeDescription::default()
            .location(2)
            .binding(0)
            .format(vk::Format::R8G8B8A8_UNORM)
            .offset(16),
    ];
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .line_width(1.0);
    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);
    let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)];
    let color_blend =
        vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let create_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0);
    let pipelines = unsafe {
        device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
            .map_err(|(_, e)| format!("create_graphics_pipelines: {e:?}"))?
    };
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_map_display_corners_to_clip() {
        let pc = push_constants([100.0, 50.0], [200.0, 100.0]);
        let apply = |x: f32, y: f32| [x * pc[0] + pc[2], y * pc[1] + pc[3]];
        let tl = apply(100.0, 50.0);
        let br = apply(300.0, 150.0);
        // Display top-left is (-1, +1) in WGSL clip space.
        assert!((tl[0] + 1.0).abs() < 1e-5 && (tl[1] - 1.0).abs() < 1e-5);
        assert!((br[0] - 1.0).abs() < 1e-5 && (br[1] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn scissor_clamps_and_rejects_empty() {
        assert_eq!(
            scissor_rect([-5.0, -5.0, 1000.0, 1000.0], [0.0, 0.0], [1.0, 1.0], (640, 480)),
            Some((0, 0, 640, 480))
        );
        assert_eq!(
            scissor_rect([10.0, 10.0, 10.0, 20.0], [0.0, 0.0], [1.0, 1.0], (640, 480)),
            None
        );
    }
}

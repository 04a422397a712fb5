//! Renderer half of the multi-viewport protocol: per-viewport surface,
//! swapchain and frame resources, driven by the standard recipe: wait fence,
//! acquire, record, submit, present, recreate on OUT_OF_DATE.

use std::sync::Arc;

use ash::vk;
use opal_api::{DrawData, RendererViewportBackend, Viewport};

use crate::buffers::FrameBuffers;
use crate::{create_ui_pipeline, VulkanRenderer};

/// Frames in flight per secondary viewport window.
const VIEWPORT_FRAMES: usize = 2;

pub(crate) struct ViewportResources {
    device: Arc<ash::Device>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,

    surface: vk::SurfaceKHR,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    swapchain: vk::SwapchainKHR,
    extent: vk::Extent2D,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    framebuffers: Vec<vk::Framebuffer>,
    render_pass: vk::RenderPass,
    pipeline: vk::Pipeline,

    command_pool: vk::CommandPool,
    command_buffers: Vec<vk::CommandBuffer>,
    image_available: Vec<vk::Semaphore>,
    render_finished: Vec<vk::Semaphore>,
    in_flight: Vec<vk::Fence>,
    frames: Vec<FrameBuffers>,
    frame_index: usize,
    /// (image index, frame slot) acquired by render_window, waiting for
    /// swap_buffers to present.
    pending: Option<(u32, usize)>,
    needs_rebuild: bool,
}

impl Drop for ViewportResources {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
        }
        self.frames.clear();
        unsafe {
            self.destroy_swapchain_objects();
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
            for &semaphore in self.image_available.iter().chain(&self.render_finished) {
                self.device.destroy_semaphore(semaphore, None);
            }
            for &fence in &self.in_flight {
                self.device.destroy_fence(fence, None);
            }
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_pipeline(self.pipeline, None);
            self.device.destroy_render_pass(self.render_pass, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

impl ViewportResources {
    /// Destroy framebuffers and image views (the swapchain itself is handled
    /// separately so it can be passed as old_swapchain).
    unsafe fn destroy_swapchain_objects(&mut self) {
        for &fb in &self.framebuffers {
            self.device.destroy_framebuffer(fb, None);
        }
        self.framebuffers.clear();
        for &view in &self.views {
            self.device.destroy_image_view(view, None);
        }
        self.views.clear();
        self.images.clear();
    }

    /// Recreate the swapchain (reusing the old one) and its views and
    /// framebuffers, e.g. after a resize or OUT_OF_DATE.
    fn rebuild(&mut self, desired_extent: vk::Extent2D) -> Result<(), String> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| format!("device_wait_idle: {e:?}"))?;
        }
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.physical_device, self.surface)
                .map_err(|e| format!("get_surface_capabilities: {e:?}"))?
        };
        let extent = choose_extent(&caps, desired_extent);
        if extent.width == 0 || extent.height == 0 {
            // Minimized; keep the old swapchain and try again later.
            self.needs_rebuild = true;
            return Ok(());
        }
        let image_count = choose_image_count(&caps);
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);
        let new_swapchain = unsafe {
            self.swapchain_loader
                .create_swapchain(&swapchain_info, None)
                .map_err(|e| format!("create_swapchain: {e:?}"))?
        };
        unsafe {
            self.destroy_swapchain_objects();
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
        self.swapchain = new_swapchain;
        self.extent = extent;
        self.create_swapchain_objects()?;
        self.pending = None;
        log::debug!("rebuilt viewport swapchain at {}x{}", extent.width, extent.height);
        Ok(())
    }

    fn create_swapchain_objects(&mut self) -> Result<(), String> {
        self.images = unsafe {
            self.swapchain_loader
                .get_swapchain_images(self.swapchain)
                .map_err(|e| format!("get_swapchain_images: {e:?}"))?
        };
        for &image in &self.images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format.format)
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
            self.views.push(view);
            let attachments = [view];
            let fb_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);
            let framebuffer = unsafe {
                self.device
                    .create_framebuffer(&fb_info, None)
                    .map_err(|e| format!("create_framebuffer: {e:?}"))?
            };
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }
}

/// Prefer an 8-bit UNORM format so vertex colors pass through unconverted;
/// fall back to whatever the surface offers first.
pub(crate) fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if formats.len() == 1 && formats[0].format == vk::Format::UNDEFINED {
        return vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: formats[0].color_space,
        };
    }
    for preferred in [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM] {
        if let Some(found) = formats.iter().find(|f| f.format == preferred) {
            return *found;
        }
    }
    formats.first().copied().unwrap_or(vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    })
}

/// MAILBOX when available (no tearing, no throttling of the main window),
/// otherwise FIFO which every implementation must support.
pub(crate) fn select_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count = count.min(caps.max_image_count);
    }
    count
}

pub(crate) fn choose_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: desired
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: desired
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

fn create_present_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> Result<vk::RenderPass, String> {
    let attachments = [vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)];
    let color_refs = [vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)];
    let dependencies = [vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)];
    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe {
        device
            .create_render_pass(&create_info, None)
            .map_err(|e| format!("create_render_pass: {e:?}"))
    }
}

impl VulkanRenderer {
    fn render_viewport(
        &self,
        vres: &mut ViewportResources,
        draw_data: &DrawData,
    ) -> Result<(), String> {
        let (fb_width, fb_height) = draw_data.framebuffer_size();
        let desired = vk::Extent2D {
            width: fb_width,
            height: fb_height,
        };
        if vres.needs_rebuild || vres.extent.width != fb_width || vres.extent.height != fb_height
        {
            vres.needs_rebuild = false;
            vres.rebuild(desired)?;
            if vres.needs_rebuild {
                // Still minimized; nothing to draw.
                return Ok(());
            }
        }
        let device = Arc::clone(&vres.device);
        let slot = vres.frame_index;
        unsafe {
            device
                .wait_for_fences(&[vres.in_flight[slot]], true, u64::MAX)
                .map_err(|e| format!("wait_for_fences: {e:?}"))?;
        }

        let mut image_index = None;
        for attempt in 0..2 {
            let acquired = unsafe {
                vres.swapchain_loader.acquire_next_image(
                    vres.swapchain,
                    u64::MAX,
                    vres.image_available[slot],
                    vk::Fence::null(),
                )
            };
            match acquired {
                Ok((index, suboptimal)) => {
                    if suboptimal {
                        vres.needs_rebuild = true;
                    }
                    image_index = Some(index);
                    break;
                }
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) if attempt == 0 => {
                    vres.rebuild(desired)?;
                }
                Err(e) => return Err(format!("acquire_next_image: {e:?}")),
            }
        }
        let Some(image_index) = image_index else {
            return Err("acquire_next_image: still out of date after rebuild".to_string());
        };

        unsafe {
            device
                .reset_fences(&[vres.in_flight[slot]])
                .map_err(|e| format!("reset_fences: {e:?}"))?;
        }

        let cmd = vres.command_buffers[slot];
        let clear = self.config.viewport_clear_color;
        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(|e| format!("reset_command_buffer: {e:?}"))?;
            let begin = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device
                .begin_command_buffer(cmd, &begin)
                .map_err(|e| format!("begin_command_buffer: {e:?}"))?;
            let clear_values = [vk::ClearValue {
                color: vk::ClearColorValue { float32: clear },
            }];
            let pass_begin = vk::RenderPassBeginInfo::default()
                .render_pass(vres.render_pass)
                .framebuffer(vres.framebuffers[image_index as usize])
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vres.extent,
                })
                .clear_values(&clear_values);
            device.cmd_begin_render_pass(cmd, &pass_begin, vk::SubpassContents::INLINE);
        }

        let mut frame = std::mem::take(&mut vres.frames[slot]);
        let recorded = self.record_into(&mut frame, draw_data, cmd, vres.pipeline);
        vres.frames[slot] = frame;

        unsafe {
            device.cmd_end_render_pass(cmd);
            device
                .end_command_buffer(cmd)
                .map_err(|e| format!("end_command_buffer: {e:?}"))?;
        }
        recorded?;

        let wait_semaphores = [vres.image_available[slot]];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [vres.render_finished[slot]];
        let command_buffers = [cmd];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            device
                .queue_submit(vres.queue, &[submit], vres.in_flight[slot])
                .map_err(|e| format!("queue_submit: {e:?}"))?;
        }
        vres.pending = Some((image_index, slot));
        Ok(())
    }
}

impl RendererViewportBackend for VulkanRenderer {
    fn create_window(&mut self, viewport: &Viewport) -> Result<(), String> {
        let raw_window_handle = viewport
            .raw_window_handle
            .ok_or("viewport has no window handle (platform backend not attached?)")?;
        let raw_display_handle = viewport
            .raw_display_handle
            .ok_or("viewport has no display handle")?;
        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                raw_display_handle,
                raw_window_handle,
                None,
            )
            .map_err(|e| format!("create_surface: {e:?}"))?
        };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);
        let supported = unsafe {
            surface_loader
                .get_physical_device_surface_support(
                    self.physical_device,
                    self.queue_family_index,
                    surface,
                )
                .unwrap_or(false)
        };
        if !supported {
            unsafe { surface_loader.destroy_surface(surface, None) };
            return Err("queue family cannot present to viewport surface".to_string());
        }
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(self.physical_device, surface)
                .map_err(|e| format!("get_surface_formats: {e:?}"))?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(self.physical_device, surface)
                .map_err(|e| format!("get_present_modes: {e:?}"))?
        };
        let format = select_surface_format(&formats);
        let present_mode = select_present_mode(&present_modes);

        let render_pass = create_present_render_pass(&self.device, format.format)?;
        let pipeline = create_ui_pipeline(
            &self.device,
            self.shader_module,
            self.pipeline_layout,
            render_pass,
        )?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe {
            self.device
                .create_command_pool(&pool_info, None)
                .map_err(|e| format!("create_command_pool: {e:?}"))?
        };
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(VIEWPORT_FRAMES as u32);
        let command_buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| format!("allocate_command_buffers: {e:?}"))?
        };
        let mut image_available = Vec::with_capacity(VIEWPORT_FRAMES);
        let mut render_finished = Vec::with_capacity(VIEWPORT_FRAMES);
        let mut in_flight = Vec::with_capacity(VIEWPORT_FRAMES);
        let mut frames = Vec::with_capacity(VIEWPORT_FRAMES);
        for _ in 0..VIEWPORT_FRAMES {
            unsafe {
                image_available.push(
                    self.device
                        .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                        .map_err(|e| format!("create_semaphore: {e:?}"))?,
                );
                render_finished.push(
                    self.device
                        .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                        .map_err(|e| format!("create_semaphore: {e:?}"))?,
                );
                in_flight.push(
                    self.device
                        .create_fence(
                            &vk::FenceCreateInfo::default()
                                .flags(vk::FenceCreateFlags::SIGNALED),
                            None,
                        )
                        .map_err(|e| format!("create_fence: {e:?}"))?,
                );
            }
            frames.push(FrameBuffers::default());
        }

        let scale = viewport.dpi_scale.max(0.01);
        let mut vres = ViewportResources {
            device: Arc::clone(&self.device),
            surface_loader,
            swapchain_loader: ash::khr::swapchain::Device::new(&self.instance, &self.device),
            physical_device: self.physical_device,
            queue: self.queue,
            surface,
            format,
            present_mode,
            swapchain: vk::SwapchainKHR::null(),
            extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
            render_pass,
            pipeline,
            command_pool,
            command_buffers,
            image_available,
            render_finished,
            in_flight,
            frames,
            frame_index: 0,
            pending: None,
            needs_rebuild: false,
        };
        vres.rebuild(vk::Extent2D {
            width: (viewport.size[0] * scale) as u32,
            height: (viewport.size[1] * scale) as u32,
        })?;
        self.viewports.insert(viewport.id.0, vres);
        Ok(())
    }

    fn destroy_window(&mut self, viewport: &Viewport) {
        // ViewportResources::drop waits for the device and releases
        // everything in dependency order.
        self.viewports.remove(&viewport.id.0);
    }

    fn set_window_size(&mut self, viewport: &Viewport, _size: [f32; 2]) -> Result<(), String> {
        if let Some(vres) = self.viewports.get_mut(&viewport.id.0) {
            vres.needs_rebuild = true;
        }
        Ok(())
    }

    fn render_window(&mut self, viewport: &Viewport, draw_data: &DrawData) -> Result<(), String> {
        if !draw_data.valid() {
            return Ok(());
        }
        let Some(mut vres) = self.viewports.remove(&viewport.id.0) else {
            return Err(format!("render_window: unknown viewport {}", viewport.id.0));
        };
        let result = self.render_viewport(&mut vres, draw_data);
        self.viewports.insert(viewport.id.0, vres);
        result
    }

    fn swap_buffers(&mut self, viewport: &Viewport) -> Result<(), String> {
        let Some(vres) = self.viewports.get_mut(&viewport.id.0) else {
            return Ok(());
        };
        let Some((image_index, slot)) = vres.pending.take() else {
            return Ok(());
        };
        let wait_semaphores = [vres.render_finished[slot]];
        let swapchains = [vres.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            vres.swapchain_loader
                .queue_present(vres.queue, &present_info)
        };
        match presented {
            Ok(suboptimal) => {
                if suboptimal {
                    vres.needs_rebuild = true;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => vres.needs_rebuild = true,
            Err(e) => return Err(format!("queue_present: {e:?}")),
        }
        vres.frame_index = (vres.frame_index + 1) % VIEWPORT_FRAMES;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_format_prefers_unorm() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        assert_eq!(
            select_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            select_surface_format(&formats).format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn present_mode_prefers_mailbox_falls_back_to_fifo() {
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_clamped_by_caps() {
        let mut caps = vk::SurfaceCapabilitiesKHR::default();
        caps.min_image_count = 2;
        caps.max_image_count = 0; // unlimited
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn extent_uses_current_when_fixed() {
        let mut caps = vk::SurfaceCapabilitiesKHR::default();
        caps.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let desired = vk::Extent2D {
            width: 123,
            height: 456,
        };
        assert_eq!(choose_extent(&caps, desired), caps.current_extent);

        caps.current_extent.width = u32::MAX;
        caps.min_image_extent = vk::Extent2D {
            width: 200,
            height: 200,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 400,
            height: 400,
        };
        let clamped = choose_extent(&caps, desired);
        assert_eq!((clamped.width, clamped.height), (200, 400));
    }
}

//! Host-visible Vulkan buffers for per-frame vertex/index streaming.
//! Buffers are recreated (destroy + create) when a frame needs more space.

use std::sync::Arc;

use ash::vk;

/// Pick a memory type index matching the requirement mask and properties.
pub(crate) fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Result<u32, String> {
    (0..props.memory_type_count)
        .find(|&i| {
            (type_bits & (1 << i)) != 0
                && props.memory_types[i as usize].property_flags.contains(flags)
        })
        .ok_or_else(|| format!("no memory type for bits {type_bits:#x} with {flags:?}"))
}

/// One buffer plus its backing allocation. Host-visible and coherent, so
/// uploads are a map/copy/unmap with no explicit flush.
pub(crate) struct BufferBlock {
    device: Arc<ash::Device>,
    pub buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    pub capacity: u64,
}

impl BufferBlock {
    pub fn new(
        device: Arc<ash::Device>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        size: u64,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self, String> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe {
            device
                .create_buffer(&create_info, None)
                .map_err(|e| format!("create_buffer: {e:?}"))?
        };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = find_memory_type(
            mem_props,
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&allocate_info, None)
                .map_err(|e| format!("allocate_memory: {e:?}"))?
        };
        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(|e| format!("bind_buffer_memory: {e:?}"))?;
        }
        Ok(Self {
            device,
            buffer,
            memory,
            capacity: size,
        })
    }

    /// Copy bytes into the buffer. Caller guarantees data fits (capacity is
    /// checked by the frame-buffer grow path).
    pub fn upload(&self, data: &[u8]) -> Result<(), String> {
        let ptr = unsafe {
            self.device
                .map_memory(self.memory, 0, data.len() as u64, vk::MemoryMapFlags::empty())
                .map_err(|e| format!("map_memory: {e:?}"))?
        };
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }
}

impl Drop for BufferBlock {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

impl std::fmt::Debug for BufferBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferBlock")
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Vertex + index buffers for one in-flight frame, grown on demand.
#[derive(Debug, Default)]
pub(crate) struct FrameBuffers {
    pub vertex: Option<BufferBlock>,
    pub index: Option<BufferBlock>,
}

impl FrameBuffers {
    pub fn ensure_capacity(
        &mut self,
        device: &Arc<ash::Device>,
        mem_props: &vk::PhysicalDeviceMemoryProperties,
        vertex_bytes: u64,
        index_bytes: u64,
    ) -> Result<(), String> {
        if self.vertex.as_ref().map_or(true, |b| b.capacity < vertex_bytes) {
            self.vertex = Some(BufferBlock::new(
                Arc::clone(device),
                mem_props,
                grow_capacity(vertex_bytes),
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?);
        }
        if self.index.as_ref().map_or(true, |b| b.capacity < index_bytes) {
            self.index = Some(BufferBlock::new(
                Arc::clone(device),
                mem_props,
                grow_capacity(index_bytes),
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?);
        }
        Ok(())
    }
}

/// Buffer growth granularity; never shrink.
const BUFFER_CHUNK: u64 = 4096;

pub(crate) fn grow_capacity(required: u64) -> u64 {
    required.div_ceil(BUFFER_CHUNK).max(1) * BUFFER_CHUNK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_is_chunked_and_nonzero() {
        assert_eq!(grow_capacity(0), BUFFER_CHUNK);
        assert_eq!(grow_capacity(BUFFER_CHUNK - 1), BUFFER_CHUNK);
        assert_eq!(grow_capacity(BUFFER_CHUNK + 1), 2 * BUFFER_CHUNK);
    }

    #[test]
    fn memory_type_selection_respects_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_type_count = 2;
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let idx = find_memory_type(
            &props,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(idx, 1);
        // Mask excludes the only matching type.
        assert!(find_memory_type(
            &props,
            0b01,
            vk::MemoryPropertyFlags::HOST_VISIBLE
        )
        .is_err());
    }
}

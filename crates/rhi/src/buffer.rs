//! GPU buffer allocation.
//!
//! This module is the device resource pool: every call creates one fresh
//! `VkBuffer` and one dedicated `VkDeviceMemory` allocation, with no pooling
//! or reuse. Backing memory is chosen by enumerating the physical device's
//! memory types and taking the first one that satisfies both the resource's
//! hardware requirements and the requested property flags.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use prism_rhi::device::Device;
//! use prism_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), prism_rhi::RhiError> {
//! // Create a vertex buffer with initial data
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_ne_bytes()).collect();
//! let vertex_buffer = Buffer::allocate_with_data(device, BufferUsage::Vertex, &bytes)?;
//! # Ok(())
//! # }
//! ```

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which selects the Vulkan usage
/// flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Uniform buffer - stores shader uniform data
    Uniform,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Uniform => "uniform",
        }
    }
}

/// The kind of memory backing a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryKind {
    /// Device-local memory, not addressable from the host.
    DeviceLocal,
    /// Host-visible, coherent memory. Writes through a mapping become
    /// visible to the GPU without explicit flushes.
    HostVisible,
}

impl MemoryKind {
    /// Converts to the Vulkan property flags an allocation must carry.
    pub fn property_flags(self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryKind::DeviceLocal => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryKind::HostVisible => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
        }
    }
}

/// Picks the first memory type index that is permitted by `type_bits` and
/// carries all of `flags`.
///
/// Returns `None` when no enumerated type qualifies.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        let permitted = type_bits & (1 << i) != 0;
        let satisfies = properties.memory_types[i as usize]
            .property_flags
            .contains(flags);
        permitted && satisfies
    })
}

/// GPU buffer with a dedicated memory allocation.
///
/// Host-mappable buffers are mapped once at creation; the pointer stays
/// valid for the buffer's entire lifetime. Buffers backed by device-local
/// memory carry no host pointer.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Dedicated memory allocation backing the buffer.
    memory: vk::DeviceMemory,
    /// Buffer size in bytes as requested by the caller.
    size: vk::DeviceSize,
    /// Persistent host pointer, present only for mapped buffers.
    mapped: Option<NonNull<c_void>>,
    /// Buffer usage type.
    usage: BufferUsage,
}

impl Buffer {
    /// Allocates a new buffer.
    ///
    /// The allocation size is the larger of `size` and the hardware-reported
    /// minimum for the buffer, so alignment and packing requirements are
    /// always met.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `size` - Requested size in bytes
    /// * `usage` - The intended buffer usage
    /// * `kind` - Device-local or host-visible backing
    /// * `want_host_map` - Map the memory at creation and keep the pointer
    ///   for the buffer's lifetime. Requires [`MemoryKind::HostVisible`].
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSuitableMemoryType`] when no memory type
    /// satisfies both the buffer's requirements and the requested kind, an
    /// unrecoverable configuration error.
    pub fn allocate(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: BufferUsage,
        kind: MemoryKind,
        want_host_map: bool,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let flags = kind.property_flags();
        let memory_type = match find_memory_type(
            device.memory_properties(),
            requirements.memory_type_bits,
            flags,
        ) {
            Some(index) => index,
            None => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(RhiError::NoSuitableMemoryType {
                    type_bits: requirements.memory_type_bits,
                    flags,
                });
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size.max(requirements.size))
            .memory_type_index(memory_type);

        let memory = match unsafe { device.handle().allocate_memory(&alloc_info, None) } {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe { device.handle().bind_buffer_memory(buffer, memory, 0)? };

        let mapped = if want_host_map {
            let ptr = unsafe {
                device
                    .handle()
                    .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())?
            };
            NonNull::new(ptr)
        } else {
            None
        };

        debug!(
            "Allocated {} buffer: {} bytes, memory type {}{}",
            usage.name(),
            size,
            memory_type,
            if mapped.is_some() { ", host-mapped" } else { "" }
        );

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            mapped,
            usage,
        })
    }

    /// Allocates a host-visible buffer and initializes it with data.
    ///
    /// The buffer stays persistently mapped for its lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the initial write fails.
    pub fn allocate_with_data(
        device: Arc<Device>,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let buffer = Self::allocate(
            device,
            data.len() as vk::DeviceSize,
            usage,
            MemoryKind::HostVisible,
            true,
        )?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Writes data through the persistent host pointer at the given offset.
    ///
    /// The backing memory is coherent, so no flush is required afterwards.
    /// The caller remains responsible for GPU-side ordering: the memory must
    /// not be read by in-flight GPU work during the write.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not host-mapped or the write would
    /// exceed the buffer size.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped = self
            .mapped
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    /// Returns the persistent host pointer, if the buffer is mapped.
    #[inline]
    pub fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.mapped
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.handle().unmap_memory(self.memory);
            }
            self.device.handle().destroy_buffer(self.buffer, None);
            self.device.handle().free_memory(self.memory, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

// Safety: the mapped pointer is exclusively owned by this buffer and the
// backing memory is host-coherent; handles are plain Copy values.
unsafe impl Send for Buffer {}
unsafe impl Sync for Buffer {}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(
        types: &[(vk::MemoryPropertyFlags, u32)],
    ) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &(flags, heap_index)) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: flags,
                heap_index,
            };
        }
        properties
    }

    #[test]
    fn test_find_memory_type_first_fit() {
        let properties = memory_properties(&[
            (vk::MemoryPropertyFlags::DEVICE_LOCAL, 0),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_CACHED,
                1,
            ),
        ]);

        // The first qualifying index wins, not the "best" one
        let found = find_memory_type(
            &properties,
            0b111,
            MemoryKind::HostVisible.property_flags(),
        );
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let properties = memory_properties(&[
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                0,
            ),
            (
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                1,
            ),
        ]);

        // Type 0 is excluded by the resource's mask
        let found = find_memory_type(
            &properties,
            0b10,
            MemoryKind::HostVisible.property_flags(),
        );
        assert_eq!(found, Some(1));
    }

    #[test]
    fn test_find_memory_type_none_matches() {
        let properties = memory_properties(&[(vk::MemoryPropertyFlags::DEVICE_LOCAL, 0)]);

        let found = find_memory_type(
            &properties,
            0b1,
            MemoryKind::HostVisible.property_flags(),
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
    }

    #[test]
    fn test_memory_kind_flags() {
        assert_eq!(
            MemoryKind::DeviceLocal.property_flags(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert!(
            MemoryKind::HostVisible
                .property_flags()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        );
    }
}

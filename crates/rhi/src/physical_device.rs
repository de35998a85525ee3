//! Physical device selection.
//!
//! The engine drives a single queue for both graphics and presentation, so
//! selection is intentionally simple: the first enumerated device exposing a
//! queue family that supports graphics work and can present to the target
//! surface wins. There is no scoring of discrete versus integrated GPUs.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};

/// Information about the selected physical device.
///
/// Captured once at selection time so later components (logical device
/// creation, the buffer pool) do not need to re-query the instance.
pub struct PhysicalDeviceInfo {
    /// Physical device handle.
    pub device: vk::PhysicalDevice,
    /// Queue family used for both graphics and presentation.
    pub queue_family: u32,
    /// Memory types and heaps exposed by the device. The buffer pool
    /// enumerates these to pick backing memory.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

/// Selects a physical device with a queue family supporting both graphics
/// and presentation to the given surface.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no enumerated device has such a
/// queue family. This is a fatal configuration error: nothing can be
/// presented without one.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    debug!("Found {} physical device(s)", devices.len());

    for device in devices {
        if let Some(queue_family) = find_queue_family(instance, device, surface, surface_loader)? {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
            info!(
                "Selected physical device: {} (queue family {})",
                name.to_string_lossy(),
                queue_family
            );

            let memory_properties =
                unsafe { instance.get_physical_device_memory_properties(device) };

            return Ok(PhysicalDeviceInfo {
                device,
                queue_family,
                memory_properties,
            });
        }
    }

    Err(RhiError::NoSuitableGpu)
}

/// Finds the first queue family on `device` that supports graphics and can
/// present to `surface`.
fn find_queue_family(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<u32>> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;

        if !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }

        let present_supported = unsafe {
            surface_loader.get_physical_device_surface_support(device, index, surface)?
        };

        if present_supported {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

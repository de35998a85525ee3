//! Swapchain negotiation, image acquisition and presentation.
//!
//! The swapchain is created once against the negotiated surface
//! capabilities and never resized: the window is fixed-size, and the only
//! reason to rebuild is a surface that reports out-of-date at acquire or
//! present time.
//!
//! Negotiation is deliberately strict. The engine requires:
//! - `B8G8R8A8_UNORM` among the supported surface formats
//! - opaque composite alpha
//! - a minimum image count within `[2, MAX_SWAPCHAIN_IMAGES]`
//! - FIFO presentation (vsync-locked, no tearing, strict submission order;
//!   always available per the Vulkan specification)
//!
//! Anything else is a fatal configuration error at startup.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Upper bound on swapchain images the engine will manage.
///
/// Per-image resources live in a fixed-size collection sized by this bound;
/// a surface whose minimum image count exceeds it is rejected at
/// construction.
pub const MAX_SWAPCHAIN_IMAGES: u32 = 4;

/// The color format every created image view uses.
///
/// Selected by scanning the supported surface formats; its absence is a
/// fatal configuration error.
pub const REQUIRED_SURFACE_FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

/// Swapchain surface support details.
///
/// Contains what the surface reports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
}

impl SurfaceSupport {
    /// Queries surface support details for a physical device and surface.
    ///
    /// Only valid after the windowing system reports the surface as
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        debug!(
            "Surface support: {} formats, image count {}-{}",
            formats.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
        })
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and the image views over its images. The
/// images themselves belong to the presentation engine and are only
/// borrowed by index.
///
/// # Thread Safety
///
/// Not thread-safe; a single thread drives acquisition and presentation.
pub struct Swapchain {
    /// Reference to the logical device
    device: Arc<Device>,
    /// Swapchain extension loader
    swapchain_loader: ash::khr::swapchain::Device,
    /// Swapchain handle
    swapchain: vk::SwapchainKHR,
    /// Swapchain images (owned by the swapchain)
    images: Vec<vk::Image>,
    /// Image views for the swapchain images
    image_views: Vec<vk::ImageView>,
    /// Swapchain image format
    format: vk::Format,
    /// Swapchain extent (resolution)
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a new swapchain against the negotiated surface capabilities.
    ///
    /// Configuration follows the engine's fixed policy: the required color
    /// format, the surface's minimum image count, exclusive single-queue
    /// sharing, identity pre-transform, opaque composite alpha and FIFO
    /// presentation.
    ///
    /// # Errors
    ///
    /// Returns a fatal configuration error if:
    /// - the surface does not expose [`REQUIRED_SURFACE_FORMAT`]
    /// - opaque composite alpha is unsupported
    /// - the minimum image count falls outside `[2, MAX_SWAPCHAIN_IMAGES]`
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        Self::create_internal(
            instance,
            device,
            surface,
            surface_loader,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    /// Creates a swapchain that replaces `old_swapchain`.
    ///
    /// Used when the surface reports out-of-date: the retired swapchain may
    /// still own presentable images, so the replacement is created against
    /// it and the old wrapper dropped afterwards.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Swapchain::new`].
    pub fn new_replacing(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        Self::create_internal(
            instance,
            device,
            surface,
            surface_loader,
            width,
            height,
            old_swapchain,
        )
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let support = SurfaceSupport::query(device.physical_device(), surface, surface_loader)?;

        require_opaque_composite(&support.capabilities)?;
        let image_count = validate_image_count(&support.capabilities)?;
        let surface_format = select_surface_format(&support.formats)?;

        let extent = vk::Extent2D { width, height };

        info!(
            "Creating swapchain: {}x{}, format {:?}, {} images, FIFO",
            extent.width, extent.height, surface_format.format, image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(vk::SurfaceTransformFlagsKHR::IDENTITY)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        if images.is_empty() || images.len() as u32 > MAX_SWAPCHAIN_IMAGES {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(RhiError::UnsupportedSurface(format!(
                "swapchain returned {} images, expected 1..={}",
                images.len(),
                MAX_SWAPCHAIN_IMAGES
            )));
        }
        info!("Swapchain created with {} images", images.len());

        let image_views = match create_image_views(&device, &images, surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
        })
    }

    /// Acquires the next swapchain image for rendering.
    ///
    /// Arms `semaphore` to signal when the image becomes usable; the index
    /// is returned as soon as the presentation engine picks one, which may
    /// be before the image is actually free.
    ///
    /// # Arguments
    ///
    /// * `semaphore` - Semaphore to signal when the image is available
    /// * `timeout_ns` - Wait budget in nanoseconds
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)` on success. On failure the raw Vulkan
    /// code is returned so the caller can classify out-of-date, timeout and
    /// fatal conditions.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents the rendered image to the surface.
    ///
    /// # Arguments
    ///
    /// * `queue` - The presentation queue
    /// * `image_index` - Index of the image to present (from
    ///   [`acquire_next_image`](Self::acquire_next_image))
    /// * `wait_semaphore` - Semaphore to wait on before presenting
    ///
    /// # Returns
    ///
    /// `true` if the swapchain is suboptimal and should be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan code; `ERROR_OUT_OF_DATE_KHR` means the
    /// caller should rebuild the swapchain.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }

        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.extent.width,
            self.extent.height,
            self.images.len()
        );
    }
}

/// Scans the supported surface formats for [`REQUIRED_SURFACE_FORMAT`].
///
/// Unlike a preference scan with fallbacks, absence of the required format
/// is an error: every created view must use it.
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == REQUIRED_SURFACE_FORMAT)
        .ok_or(RhiError::MissingSurfaceFormat(REQUIRED_SURFACE_FORMAT))
}

/// Validates that the surface's minimum image count is within the supported
/// range `[2, MAX_SWAPCHAIN_IMAGES]` and returns it as the requested count.
pub fn validate_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> RhiResult<u32> {
    let min = capabilities.min_image_count;
    if !(2..=MAX_SWAPCHAIN_IMAGES).contains(&min) {
        return Err(RhiError::UnsupportedSurface(format!(
            "surface minimum image count {} outside supported range 2..={}",
            min, MAX_SWAPCHAIN_IMAGES
        )));
    }
    Ok(min)
}

/// Requires the surface to support opaque composite alpha.
pub fn require_opaque_composite(capabilities: &vk::SurfaceCapabilitiesKHR) -> RhiResult<()> {
    if !capabilities
        .supported_composite_alpha
        .contains(vk::CompositeAlphaFlagsKHR::OPAQUE)
    {
        return Err(RhiError::UnsupportedSurface(
            "surface does not support opaque composite alpha".to_string(),
        ));
    }
    Ok(())
}

/// Creates a 2D color view over the full mip and array range of each image.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(vk::REMAINING_MIP_LEVELS)
                    .base_array_layer(0)
                    .layer_count(vk::REMAINING_ARRAY_LAYERS),
            );

        let image_view = unsafe { device.handle().create_image_view(&create_info, None)? };
        image_views.push(image_view);
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_surface_format_picks_required() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = select_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_select_surface_format_missing_is_fatal() {
        let formats = vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];

        let err = select_surface_format(&formats).unwrap_err();
        assert!(matches!(
            err,
            RhiError::MissingSurfaceFormat(vk::Format::B8G8R8A8_UNORM)
        ));
    }

    #[test]
    fn test_validate_image_count_range() {
        let capabilities = |min| vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            ..Default::default()
        };

        assert_eq!(validate_image_count(&capabilities(2)).unwrap(), 2);
        assert_eq!(validate_image_count(&capabilities(3)).unwrap(), 3);

        // Exactly the bound succeeds
        assert_eq!(
            validate_image_count(&capabilities(MAX_SWAPCHAIN_IMAGES)).unwrap(),
            MAX_SWAPCHAIN_IMAGES
        );

        // One past the bound is rejected at construction
        assert!(validate_image_count(&capabilities(MAX_SWAPCHAIN_IMAGES + 1)).is_err());
        assert!(validate_image_count(&capabilities(1)).is_err());
        assert!(validate_image_count(&capabilities(0)).is_err());
    }

    #[test]
    fn test_require_opaque_composite() {
        let supported = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE
                | vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            ..Default::default()
        };
        assert!(require_opaque_composite(&supported).is_ok());

        let unsupported = vk::SurfaceCapabilitiesKHR {
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            ..Default::default()
        };
        assert!(require_opaque_composite(&unsupported).is_err());
    }
}

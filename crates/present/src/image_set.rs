//! The swapchain image set.
//!
//! One [`ImageSlot`] exists per presentable image, created once against the
//! negotiated surface capabilities and indexed by the value the acquire
//! step returns. Slots are never allocated per frame.
//!
//! Each slot bundles everything a frame needs to render into its image:
//! the color view, the framebuffer over that view, the slot's completion
//! fence and its dedicated command buffer. The fence is created signaled so
//! the very first use of a slot does not block waiting on work that was
//! never submitted; afterwards it is signaled exactly when all GPU work
//! submitted against the slot has retired, and waiting on it is the sole
//! gate before re-recording the slot's commands.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use prism_rhi::command::{CommandBuffer, CommandPool};
use prism_rhi::device::Device;
use prism_rhi::instance::Instance;
use prism_rhi::render_pass::RenderPass;
use prism_rhi::swapchain::Swapchain;
use prism_rhi::sync::Fence;
use prism_rhi::RhiResult;

/// Per-image resources for one swapchain slot.
pub struct ImageSlot {
    /// The presentable image, owned by the swapchain.
    image: vk::Image,
    /// Color view over the image, owned by the swapchain.
    view: vk::ImageView,
    /// Framebuffer binding the view at the swapchain extent.
    framebuffer: vk::Framebuffer,
    /// Signaled when all GPU work submitted against this slot has retired.
    completion_fence: Fence,
    /// Dedicated command buffer, re-recorded each time the slot is acquired.
    commands: CommandBuffer,
}

impl ImageSlot {
    /// Returns the presentable image handle.
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Returns the color view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the framebuffer handle.
    #[inline]
    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the slot's completion fence.
    #[inline]
    pub fn completion_fence(&self) -> &Fence {
        &self.completion_fence
    }

    /// Returns the slot's command buffer.
    #[inline]
    pub fn commands(&self) -> &CommandBuffer {
        &self.commands
    }
}

/// The fixed collection of presentable images and their per-slot resources.
///
/// Exclusively owns every slot and the swapchain beneath them. Built once
/// after surface negotiation; rebuilt only when the surface reports
/// out-of-date.
pub struct ImageSet {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Per-image slots, indexed by the acquire result.
    slots: Vec<ImageSlot>,
    /// The underlying swapchain.
    swapchain: Swapchain,
    /// Extent the swapchain and framebuffers were created at.
    extent: vk::Extent2D,
}

impl ImageSet {
    /// Builds the image set against the surface's negotiated capabilities.
    ///
    /// For every image the presentation engine returns, this creates a 2D
    /// color view (owned by the swapchain), a framebuffer sized to the
    /// extent, a completion fence initialized signaled, and one command
    /// buffer from the shared recording pool.
    ///
    /// # Errors
    ///
    /// Propagates the swapchain's fatal negotiation errors (missing format,
    /// unsupported composite alpha, image count out of range) and any
    /// resource creation failure.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        render_pass: &RenderPass,
        command_pool: &CommandPool,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain = Swapchain::new(
            instance,
            device.clone(),
            surface,
            surface_loader,
            width,
            height,
        )?;
        let extent = swapchain.extent();

        let slots = Self::create_slots(&device, &swapchain, render_pass, command_pool, extent)?;

        info!(
            "Image set built: {} slot(s) at {}x{}",
            slots.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            device,
            slots,
            swapchain,
            extent,
        })
    }

    /// Rebuilds the swapchain and all per-slot resources at the same extent.
    ///
    /// Called when the surface reports out-of-date or suboptimal. Waits for
    /// the device to go idle first, so no slot resource is destroyed while
    /// referenced by in-flight work.
    ///
    /// # Errors
    ///
    /// Returns an error if the idle wait or any resource creation fails.
    pub fn rebuild(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        render_pass: &RenderPass,
        command_pool: &CommandPool,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;

        self.destroy_framebuffers();
        self.slots.clear();

        let replacement = Swapchain::new_replacing(
            instance,
            self.device.clone(),
            surface,
            surface_loader,
            self.extent.width,
            self.extent.height,
            self.swapchain.handle(),
        )?;
        let retired = std::mem::replace(&mut self.swapchain, replacement);
        drop(retired);

        self.slots = Self::create_slots(
            &self.device,
            &self.swapchain,
            render_pass,
            command_pool,
            self.extent,
        )?;

        info!("Image set rebuilt with {} slot(s)", self.slots.len());
        Ok(())
    }

    fn create_slots(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
        command_pool: &CommandPool,
        extent: vk::Extent2D,
    ) -> RhiResult<Vec<ImageSlot>> {
        let mut slots = Vec::with_capacity(swapchain.image_count());

        for index in 0..swapchain.image_count() {
            let view = swapchain.image_view(index);

            let attachments = [view];
            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device
                    .handle()
                    .create_framebuffer(&framebuffer_info, None)?
            };

            // Signaled so the first frame using this slot does not block
            let completion_fence = Fence::new(device.clone(), true)?;
            let commands = CommandBuffer::new(device.clone(), command_pool)?;

            slots.push(ImageSlot {
                image: swapchain.image(index),
                view,
                framebuffer,
                completion_fence,
                commands,
            });

            debug!("Created image slot {}", index);
        }

        Ok(slots)
    }

    /// Returns the underlying swapchain.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Returns the slot for an acquired image index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds for the slot collection.
    #[inline]
    pub fn slot(&self, index: u32) -> &ImageSlot {
        &self.slots[index as usize]
    }

    /// Returns the number of slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the extent the set was built at.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn destroy_framebuffers(&mut self) {
        for slot in &self.slots {
            unsafe {
                self.device
                    .handle()
                    .destroy_framebuffer(slot.framebuffer, None);
            }
        }
    }
}

impl Drop for ImageSet {
    fn drop(&mut self) {
        self.destroy_framebuffers();
        debug!("Image set destroyed ({} slots)", self.slots.len());
        // Slot fences and the swapchain are released by their own Drop impls
    }
}

//! Engine assembly and teardown.
//!
//! [`Engine`] owns every GPU object the frame loop touches and is the only
//! place that knows their destruction order. Construction runs once after
//! the window reports itself configured; per-frame work goes through
//! [`Engine::render_frame`].
//!
//! # Resource Destruction Order
//!
//! Vulkan resources must be destroyed in the correct order:
//! 1. Wait for all GPU work to complete
//! 2. Semaphores, buffers, pipeline and descriptor objects
//! 3. Image set (framebuffers, fences, swapchain)
//! 4. Command pool and render pass
//! 5. Device
//! 6. Surface
//! 7. Instance
//!
//! ManuallyDrop is used to enforce this order in `Drop`.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use prism_platform::{Surface, Window};
use prism_rhi::buffer::{Buffer, BufferUsage, MemoryKind};
use prism_rhi::command::CommandPool;
use prism_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, uniform_buffer_binding, write_uniform_buffer,
};
use prism_rhi::device::Device;
use prism_rhi::instance::Instance;
use prism_rhi::physical_device::select_physical_device;
use prism_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use prism_rhi::render_pass::RenderPass;
use prism_rhi::shader::{Shader, ShaderStage};
use prism_rhi::swapchain::REQUIRED_SURFACE_FORMAT;
use prism_rhi::{RhiError, RhiResult};

use crate::geometry::{TRIANGLE_VERTICES, Vertex};
use crate::image_set::ImageSet;
use crate::presenter::{FrameOutcome, Presenter};
use crate::recorder::Recorder;
use crate::transform::TransformUbo;

/// On-disk locations of the compiled shader stages.
const VERTEX_SHADER_PATH: &str = "shaders/triangle.vert.spv";
const FRAGMENT_SHADER_PATH: &str = "shaders/triangle.frag.spv";

/// The assembled presentation engine.
///
/// Field order matters only insofar as `Drop` releases everything
/// explicitly; see the module documentation for the required sequence.
pub struct Engine {
    /// Per-frame transform payload, identity in the baseline.
    transform: TransformUbo,
    /// Per-frame command sequence builder (plain handles, owns nothing).
    recorder: Recorder,
    /// The acquire/submit/present state machine.
    presenter: ManuallyDrop<Presenter>,
    /// Uniform buffer the recorder writes each frame.
    uniform_buffer: ManuallyDrop<Buffer>,
    /// Static triangle vertex buffer.
    vertex_buffer: ManuallyDrop<Buffer>,
    /// The one graphics pipeline.
    pipeline: ManuallyDrop<Pipeline>,
    /// Layout shared by pipeline and descriptor binds.
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// Pool the frame descriptor set lives in.
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    /// Layout of the uniform-buffer descriptor set.
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    /// The swapchain image set.
    image_set: ManuallyDrop<ImageSet>,
    /// Shared recording pool for per-slot command buffers.
    command_pool: ManuallyDrop<CommandPool>,
    /// The presentation render pass.
    render_pass: ManuallyDrop<RenderPass>,
    /// Logical device; dropped after everything that holds a clone.
    device: ManuallyDrop<Arc<Device>>,
    /// Window surface; destroyed after the swapchain, before the instance.
    surface: ManuallyDrop<Surface>,
    /// Vulkan instance; destroyed last.
    instance: ManuallyDrop<Instance>,
}

impl Engine {
    /// Builds the engine against a configured window.
    ///
    /// One-time setup: instance, surface, device, render pass, swapchain
    /// image set, geometry and uniform buffers, descriptor set, shaders and
    /// pipeline, and the frame synchronizer.
    ///
    /// # Errors
    ///
    /// Any missing capability, format or memory type surfaces here as a
    /// fatal configuration error; nothing is retried.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let instance = Instance::new(cfg!(debug_assertions))?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::Surface(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let render_pass = RenderPass::new(device.clone(), REQUIRED_SURFACE_FORMAT)?;
        let command_pool = CommandPool::new(device.clone(), device.queue_family())?;

        let image_set = ImageSet::build(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader(),
            &render_pass,
            &command_pool,
            window.width(),
            window.height(),
        )?;

        let vertex_buffer = Buffer::allocate_with_data(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&TRIANGLE_VERTICES),
        )?;

        let uniform_buffer = Buffer::allocate(
            device.clone(),
            TransformUbo::SIZE as vk::DeviceSize,
            BufferUsage::Uniform,
            MemoryKind::HostVisible,
            true,
        )?;

        let descriptor_set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX)],
        )?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)];
        let descriptor_pool = DescriptorPool::new(device.clone(), &pool_sizes, 1)?;

        let descriptor_set = descriptor_pool.allocate(&[descriptor_set_layout.handle()])?[0];
        write_uniform_buffer(&device, descriptor_set, 0, &uniform_buffer);

        let pipeline_layout = PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(VERTEX_SHADER_PATH),
            ShaderStage::Vertex,
            "main",
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            Path::new(FRAGMENT_SHADER_PATH),
            ShaderStage::Fragment,
            "main",
        )?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .render_pass(render_pass.handle())
            .layout(pipeline_layout.handle())
            .build(device.clone())?;

        // Shader modules are no longer needed once the pipeline exists
        drop(vertex_shader);
        drop(fragment_shader);

        let presenter = Presenter::new(device.clone())?;

        let recorder = Recorder::new(
            render_pass.handle(),
            pipeline.handle(),
            pipeline_layout.handle(),
            descriptor_set,
            vertex_buffer.handle(),
            TRIANGLE_VERTICES.len() as u32,
        );

        info!("Engine initialized, ready to present");

        Ok(Self {
            transform: TransformUbo::identity(),
            recorder,
            presenter: ManuallyDrop::new(presenter),
            uniform_buffer: ManuallyDrop::new(uniform_buffer),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            image_set: ManuallyDrop::new(image_set),
            command_pool: ManuallyDrop::new(command_pool),
            render_pass: ManuallyDrop::new(render_pass),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Returns the number of frames presented so far.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.presenter.frame_index()
    }

    /// Runs one frame through the presentation protocol.
    ///
    /// An out-of-date surface rebuilds the image set in place; the frame is
    /// then retried on the next redraw rather than within this call.
    ///
    /// # Errors
    ///
    /// Propagates fatal Vulkan errors and synchronization timeouts.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        let outcome = self.presenter.present_frame(
            &self.image_set,
            &self.recorder,
            &self.uniform_buffer,
            &self.transform,
        )?;

        match outcome {
            FrameOutcome::Presented { .. } => Ok(()),
            FrameOutcome::SurfaceOutdated => {
                info!("Surface outdated, rebuilding image set");
                self.rebuild_surface_resources()
            }
        }
    }

    /// Rebuilds the image set and resets the semaphore pair after the
    /// surface reported out-of-date.
    fn rebuild_surface_resources(&mut self) -> RhiResult<()> {
        self.image_set.rebuild(
            &self.instance,
            self.surface.handle(),
            self.surface.loader(),
            &self.render_pass,
            &self.command_pool,
        )?;
        self.presenter.reset_sync()?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still references it
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during engine drop: {:?}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.presenter);
            ManuallyDrop::drop(&mut self.uniform_buffer);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.image_set);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.render_pass);
            // Last clone of the device Arc; the device is destroyed here,
            // before the surface and instance
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Engine destroyed");
    }
}

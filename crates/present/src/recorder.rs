//! Per-frame command recording.
//!
//! The recorder rebuilds one slot's command sequence from scratch every
//! frame. Structurally the sequence never changes: clear, bind the static
//! vertex buffer and pipeline, refresh the transform uniform, bind the
//! descriptor set, set viewport and scissor, one draw call. Only the
//! uniform payload varies between frames.

use ash::vk;

use prism_rhi::buffer::Buffer;
use prism_rhi::RhiResult;

use crate::image_set::ImageSlot;
use crate::transform::TransformUbo;

/// Color every frame clears the attachment to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.5];

/// Builds the per-frame command sequence against one acquired image slot.
///
/// Holds plain handles to the startup-built objects it binds; ownership
/// stays with the engine.
pub struct Recorder {
    /// Render pass the sequence runs within.
    render_pass: vk::RenderPass,
    /// The one graphics pipeline, built at startup.
    pipeline: vk::Pipeline,
    /// Layout the descriptor set binds against.
    pipeline_layout: vk::PipelineLayout,
    /// Descriptor set exposing the transform uniform buffer.
    descriptor_set: vk::DescriptorSet,
    /// The static vertex buffer.
    vertex_buffer: vk::Buffer,
    /// Vertices per draw call.
    vertex_count: u32,
}

impl Recorder {
    /// Creates a recorder over the startup-built pipeline objects.
    pub fn new(
        render_pass: vk::RenderPass,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        descriptor_set: vk::DescriptorSet,
        vertex_buffer: vk::Buffer,
        vertex_count: u32,
    ) -> Self {
        Self {
            render_pass,
            pipeline,
            pipeline_layout,
            descriptor_set,
            vertex_buffer,
            vertex_count,
        }
    }

    /// Records the frame's command sequence into the slot's command buffer.
    ///
    /// The buffer is reset and begun fresh on every call; nothing is
    /// appended across frames. The transform is written through the uniform
    /// buffer's persistent host pointer, which is safe only because the
    /// caller has already waited on the slot's completion fence and no
    /// other frame is in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if command recording or the uniform write fails.
    pub fn record(
        &self,
        slot: &ImageSlot,
        extent: vk::Extent2D,
        uniform: &Buffer,
        transform: &TransformUbo,
    ) -> RhiResult<()> {
        let cmd = slot.commands();

        cmd.reset()?;
        cmd.begin()?;

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: CLEAR_COLOR,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(slot.framebuffer())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);

        cmd.bind_vertex_buffers(0, &[self.vertex_buffer], &[0]);
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);

        uniform.write(0, bytemuck::bytes_of(transform))?;

        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            self.pipeline_layout,
            0,
            &[self.descriptor_set],
            &[],
        );

        cmd.set_viewport(&vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });

        cmd.draw(self.vertex_count, 1, 0, 0);

        cmd.end_render_pass();
        cmd.end()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_color_is_fixed() {
        // The clear color is part of the structurally identical per-frame
        // sequence and must not drift
        assert_eq!(CLEAR_COLOR, [0.0, 0.0, 0.0, 0.5]);
    }
}

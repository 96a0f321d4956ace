//! Deferred command recording.
//!
//! Stages append `Command`s to a `CommandStream` during `RenderGraph::record`; the stream is
//! replayed onto a Vulkan command buffer afterwards (see `VulkanDevice::encode`).
use crate::{vk, ImageBarrier};
use std::cell::{Ref, RefCell};

/// Clear value of a render pass attachment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl From<[f32; 4]> for ClearValue {
    fn from(v: [f32; 4]) -> Self {
        ClearValue::Color(v)
    }
}

impl From<ClearValue> for vk::ClearValue {
    fn from(v: ClearValue) -> Self {
        match v {
            ClearValue::Color(color) => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// Shader binding table regions passed to `vkCmdTraceRaysKHR`.
#[derive(Copy, Clone, Debug, Default)]
pub struct ShaderBindingTable {
    pub raygen: vk::StridedDeviceAddressRegionKHR,
    pub miss: vk::StridedDeviceAddressRegionKHR,
    pub hit: vk::StridedDeviceAddressRegionKHR,
    pub callable: vk::StridedDeviceAddressRegionKHR,
}

#[derive(Clone, Debug)]
pub enum Command {
    BeginDebugLabel {
        name: String,
    },
    EndDebugLabel,
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: Vec<ClearValue>,
    },
    EndRenderPass,
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    BindPipeline {
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    },
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer {
        binding: u32,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Dispatch {
        group_count_x: u32,
        group_count_y: u32,
        group_count_z: u32,
    },
    TraceRays {
        table: ShaderBindingTable,
        width: u32,
        height: u32,
        depth: u32,
    },
    PipelineBarrier {
        image_barriers: Vec<ImageBarrier>,
    },
}

/// Append-only list of commands recorded for one frame.
///
/// Commands are pushed through a shared reference so that the stream can live inside
/// the immutable `FrameContext`.
#[derive(Debug, Default)]
pub struct CommandStream {
    commands: RefCell<Vec<Command>>,
}

impl CommandStream {
    pub fn new() -> CommandStream {
        CommandStream::default()
    }

    pub fn push(&self, command: Command) {
        self.commands.borrow_mut().push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.borrow().is_empty()
    }

    /// Borrows the recorded commands.
    ///
    /// # Panics
    ///
    /// If called while a command is being pushed.
    pub fn commands(&self) -> Ref<'_, [Command]> {
        Ref::map(self.commands.borrow(), Vec::as_slice)
    }

    /// Removes and returns all recorded commands, leaving the stream empty for the next frame.
    pub fn take(&self) -> Vec<Command> {
        self.commands.take()
    }

    pub fn begin_debug_label(&self, name: &str) {
        self.push(Command::BeginDebugLabel { name: name.to_string() });
    }

    pub fn end_debug_label(&self) {
        self.push(Command::EndDebugLabel);
    }

    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: Vec<ClearValue>,
    ) {
        self.push(Command::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            clear_values,
        });
    }

    pub fn end_render_pass(&self) {
        self.push(Command::EndRenderPass);
    }

    /// Sets a viewport and scissor covering `extent`.
    pub fn set_viewport_and_scissor(&self, extent: vk::Extent2D) {
        self.push(Command::SetViewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }));
        self.push(Command::SetScissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }));
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.push(Command::BindPipeline { bind_point, pipeline });
    }

    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.push(Command::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    pub fn push_constants(&self, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        self.push(Command::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    pub fn bind_vertex_buffer(&self, binding: u32, buffer: vk::Buffer, offset: vk::DeviceSize) {
        self.push(Command::BindVertexBuffer { binding, buffer, offset });
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.push(Command::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    pub fn draw(&self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.push(Command::Dispatch {
            group_count_x,
            group_count_y,
            group_count_z,
        });
    }

    pub fn trace_rays(&self, table: &ShaderBindingTable, width: u32, height: u32, depth: u32) {
        self.push(Command::TraceRays {
            table: *table,
            width,
            height,
            depth,
        });
    }

    /// Records a pipeline barrier. Does nothing if `image_barriers` is empty.
    pub fn pipeline_barrier(&self, image_barriers: &[ImageBarrier]) {
        if image_barriers.is_empty() {
            return;
        }
        self.push(Command::PipelineBarrier {
            image_barriers: image_barriers.to_vec(),
        });
    }
}

/// Reinterprets a list of 32-bit values as push constant bytes.
pub fn push_constant_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_ne_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_barrier_is_not_recorded() {
        let stream = CommandStream::new();
        stream.pipeline_barrier(&[]);
        assert!(stream.is_empty());
    }

    #[test]
    fn take_drains_the_stream() {
        let stream = CommandStream::new();
        stream.draw(3, 1, 0, 0);
        stream.dispatch(8, 8, 1);
        let commands = stream.take();
        assert_eq!(commands.len(), 2);
        assert!(matches!(commands[0], Command::Draw { vertex_count: 3, .. }));
        assert!(stream.is_empty());
    }

    #[test]
    fn viewport_matches_extent() {
        let stream = CommandStream::new();
        stream.set_viewport_and_scissor(vk::Extent2D { width: 640, height: 360 });
        let commands = stream.commands();
        match (&commands[0], &commands[1]) {
            (Command::SetViewport(viewport), Command::SetScissor(scissor)) => {
                assert_eq!(viewport.width, 640.0);
                assert_eq!(viewport.height, 360.0);
                assert_eq!(scissor.extent.width, 640);
                assert_eq!(scissor.extent.height, 360);
            }
            other => panic!("unexpected commands: {:?}", other),
        }
    }

    #[test]
    fn push_constant_bytes_are_word_aligned() {
        let bytes = push_constant_bytes(&[1.5f32.to_bits(), 7]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 7);
    }
}

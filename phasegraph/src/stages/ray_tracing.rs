use crate::{
    vk, AccessIntent, AllocatedImage, Descriptor, DescriptorWrite, DeviceRef, FrameContext, GpuDevice, ImageBarrier,
    ImageCreateInfo, MemoryLocation, Phase, ResourceState, Result, ShaderBindingTable, SharedImage,
    SharedImageRegistry, SharedSettings, Stage,
};
use tracing::debug;

/// Name of the image written by `RayTracingStage`.
pub const RT_SHADOW_IMAGE: &str = "rt_shadow";

const RT_SHADOW_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Ray-tracing pipeline and the per-frame descriptor sets it is invoked with.
#[derive(Clone, Debug)]
pub struct RayTracingPipelineInfo {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub shader_binding_table: ShaderBindingTable,
    /// Set 0 of `layout`, one per frame in flight. The stage writes its output image into
    /// `output_binding` of each of them.
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub output_binding: u32,
}

/// Traces one ray per pixel into `"rt_shadow"` before the scene pass.
///
/// Enabled when `settings.ray_tracing` is set.
pub struct RayTracingStage {
    device: DeviceRef,
    settings: SharedSettings,
    info: RayTracingPipelineInfo,
    output: AllocatedImage,
}

impl RayTracingStage {
    pub fn new(
        device: &DeviceRef,
        images: &mut SharedImageRegistry,
        settings: SharedSettings,
        extent: vk::Extent2D,
        info: RayTracingPipelineInfo,
    ) -> Result<RayTracingStage> {
        let output = create_output(&**device, extent)?;
        let stage = RayTracingStage {
            device: device.clone(),
            settings,
            info,
            output,
        };
        stage.write_descriptors(&**device);
        stage.publish(images);
        images.declare_access(RT_SHADOW_IMAGE, stage.name(), Phase::PrePass, AccessIntent::WRITE);
        Ok(stage)
    }

    pub fn output(&self) -> &AllocatedImage {
        &self.output
    }

    /// Replaces the pipeline, e.g. after a shader reload. The layout must be compatible.
    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline, shader_binding_table: ShaderBindingTable) {
        self.info.pipeline = pipeline;
        self.info.shader_binding_table = shader_binding_table;
    }

    fn write_descriptors(&self, device: &dyn GpuDevice) {
        let writes: Vec<_> = self
            .info
            .descriptor_sets
            .iter()
            .map(|&set| DescriptorWrite::new(set, self.info.output_binding, Descriptor::storage(self.output.view)))
            .collect();
        device.update_descriptor_sets(&writes);
    }

    fn publish(&self, images: &mut SharedImageRegistry) {
        images.set(
            RT_SHADOW_IMAGE,
            SharedImage {
                image: self.output.image,
                view: self.output.view,
                sampler: None,
                format: self.output.format,
                extent: self.output.extent,
            },
        );
    }
}

fn create_output(device: &dyn GpuDevice, extent: vk::Extent2D) -> Result<AllocatedImage> {
    device.create_image(
        RT_SHADOW_IMAGE,
        &ImageCreateInfo {
            usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            format: RT_SHADOW_FORMAT,
            extent,
            samples: 1,
            memory_location: MemoryLocation::GpuOnly,
        },
    )
}

impl Stage for RayTracingStage {
    fn name(&self) -> &str {
        "ray_tracing"
    }

    fn phase(&self) -> Phase {
        Phase::PrePass
    }

    fn is_enabled(&self) -> bool {
        self.settings.ray_tracing.get()
    }

    fn record(&self, ctx: &FrameContext) {
        let cmd = ctx.commands;
        // overwritten entirely, after the previous frame's composite pass is done sampling it
        cmd.pipeline_barrier(&[ImageBarrier::discard(
            self.output.image,
            self.output.format,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            ResourceState::RAY_TRACING_WRITE,
        )]);
        cmd.bind_pipeline(vk::PipelineBindPoint::RAY_TRACING_KHR, self.info.pipeline);
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::RAY_TRACING_KHR,
            self.info.layout,
            0,
            &[self.info.descriptor_sets[ctx.frame_index]],
        );
        cmd.trace_rays(&self.info.shader_binding_table, ctx.extent.width, ctx.extent.height, 1);
        cmd.pipeline_barrier(&[ImageBarrier::new(
            self.output.image,
            self.output.format,
            ResourceState::RAY_TRACING_WRITE,
            ResourceState::FRAGMENT_SHADER_READ,
        )]);
    }

    fn on_resize(
        &mut self,
        device: &dyn GpuDevice,
        extent: vk::Extent2D,
        images: &mut SharedImageRegistry,
    ) -> Result<()> {
        debug!(width = extent.width, height = extent.height, "recreating ray tracing output");
        let output = create_output(device, extent)?;
        device.destroy_image(&std::mem::replace(&mut self.output, output));
        self.write_descriptors(device);
        self.publish(images);
        Ok(())
    }
}

impl Drop for RayTracingStage {
    fn drop(&mut self) {
        self.device.destroy_image(&self.output);
    }
}

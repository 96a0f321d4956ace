use super::{group_count, StageDescriptors};
use crate::{
    push_constant_bytes, vk, AccessIntent, AllocatedImage, Descriptor, DescriptorBinding, DescriptorWrite, DeviceRef,
    FrameContext, GpuDevice, ImageBarrier, ImageCreateInfo, MemoryLocation, Phase, ResourceState, Result,
    SamplerCreateInfo, SharedImage, SharedImageRegistry, SharedSettings, Stage, HDR_IMAGE,
};
use tracing::debug;

/// Name of the blurred image published by `BloomStage`.
pub const BLOOM_IMAGE: &str = "bloom";

const BLOOM_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
const WORKGROUP_SIZE: u32 = 16;

const INPUT_BINDING: u32 = 0;
const OUTPUT_BINDING: u32 = 1;

/// Compute pipeline of the blur.
///
/// Set 0 must follow `BloomStage::set_layout_bindings`. The push constant block is
/// `{ uint direction; float radius; }`, direction 0 being horizontal.
#[derive(Copy, Clone, Debug)]
pub struct BloomPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set_layout: vk::DescriptorSetLayout,
}

struct BlurTargets {
    ping: AllocatedImage,
    pong: AllocatedImage,
}

impl BlurTargets {
    fn new(device: &dyn GpuDevice, extent: vk::Extent2D) -> Result<BlurTargets> {
        let info = ImageCreateInfo {
            usage: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::SAMPLED,
            format: BLOOM_FORMAT,
            extent,
            samples: 1,
            memory_location: MemoryLocation::GpuOnly,
        };
        let ping = device.create_image("bloom_ping", &info)?;
        let pong = match device.create_image("bloom_pong", &info) {
            Ok(pong) => pong,
            Err(err) => {
                device.destroy_image(&ping);
                return Err(err);
            }
        };
        Ok(BlurTargets { ping, pong })
    }

    fn destroy(&self, device: &dyn GpuDevice) {
        device.destroy_image(&self.ping);
        device.destroy_image(&self.pong);
    }
}

/// Separable blur of the HDR image, published as `"bloom"`.
///
/// The horizontal pass reads `"hdr"` and writes an intermediate image, the vertical pass reads the
/// intermediate image and writes the output. Both images are shared by all frames in flight.
/// Enabled when `settings.bloom` is set.
pub struct BloomStage {
    device: DeviceRef,
    settings: SharedSettings,
    pipeline: BloomPipeline,
    sampler: vk::Sampler,
    targets: BlurTargets,
    /// `[horizontal, vertical]`
    descriptors: StageDescriptors,
}

impl BloomStage {
    /// Bindings of the blur set layout: a sampled input and a storage output.
    pub fn set_layout_bindings() -> [DescriptorBinding; 2] {
        [
            DescriptorBinding::new(
                INPUT_BINDING,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::COMPUTE,
            ),
            DescriptorBinding::new(OUTPUT_BINDING, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE),
        ]
    }

    /// Creates the blur images and descriptor sets. Requires `"hdr"` to be registered.
    pub fn new(
        device: &DeviceRef,
        images: &mut SharedImageRegistry,
        settings: SharedSettings,
        extent: vk::Extent2D,
        pipeline: BloomPipeline,
    ) -> Result<BloomStage> {
        let hdr = images.require(HDR_IMAGE)?;
        let descriptors = StageDescriptors::new(device, pipeline.set_layout, &Self::set_layout_bindings(), 2)?;
        let sampler = device.create_sampler(&SamplerCreateInfo::default())?;
        let targets = match BlurTargets::new(&**device, extent) {
            Ok(targets) => targets,
            Err(err) => {
                device.destroy_sampler(sampler);
                return Err(err);
            }
        };

        let stage = BloomStage {
            device: device.clone(),
            settings,
            pipeline,
            sampler,
            targets,
            descriptors,
        };
        stage.write_descriptors(&**device, hdr.view);
        stage.publish(images);
        images.declare_access(HDR_IMAGE, stage.name(), Phase::Intermediate, AccessIntent::READ);
        images.declare_access(BLOOM_IMAGE, stage.name(), Phase::Intermediate, AccessIntent::WRITE);
        Ok(stage)
    }

    pub fn output(&self) -> &AllocatedImage {
        &self.targets.pong
    }

    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipeline.pipeline = pipeline;
    }

    fn write_descriptors(&self, device: &dyn GpuDevice, hdr_view: vk::ImageView) {
        let (horizontal, vertical) = (self.descriptors.sets[0], self.descriptors.sets[1]);
        device.update_descriptor_sets(&[
            DescriptorWrite::new(horizontal, INPUT_BINDING, Descriptor::sampled(hdr_view, self.sampler)),
            DescriptorWrite::new(horizontal, OUTPUT_BINDING, Descriptor::storage(self.targets.ping.view)),
            DescriptorWrite::new(
                vertical,
                INPUT_BINDING,
                Descriptor::sampled(self.targets.ping.view, self.sampler),
            ),
            DescriptorWrite::new(vertical, OUTPUT_BINDING, Descriptor::storage(self.targets.pong.view)),
        ]);
    }

    fn publish(&self, images: &mut SharedImageRegistry) {
        let output = &self.targets.pong;
        images.set(
            BLOOM_IMAGE,
            SharedImage {
                image: output.image,
                view: output.view,
                sampler: Some(self.sampler),
                format: output.format,
                extent: output.extent,
            },
        );
    }

    fn record_pass(&self, ctx: &FrameContext, set: vk::DescriptorSet, direction: u32) {
        let cmd = ctx.commands;
        let radius = self.settings.bloom_radius.get();
        cmd.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, self.pipeline.layout, 0, &[set]);
        cmd.push_constants(
            self.pipeline.layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            &push_constant_bytes(&[direction, radius.to_bits()]),
        );
        cmd.dispatch(
            group_count(ctx.extent.width, WORKGROUP_SIZE),
            group_count(ctx.extent.height, WORKGROUP_SIZE),
            1,
        );
    }
}

impl Stage for BloomStage {
    fn name(&self) -> &str {
        "bloom"
    }

    fn phase(&self) -> Phase {
        Phase::Intermediate
    }

    fn is_enabled(&self) -> bool {
        self.settings.bloom.get()
    }

    fn record(&self, ctx: &FrameContext) {
        let cmd = ctx.commands;
        let BlurTargets { ping, pong } = &self.targets;

        // "hdr" is in SHADER_READ_ONLY_OPTIMAL, whether or not the scene pass ran.
        // Both targets are shared by all frames in flight: wait for the previous frame's readers.
        cmd.pipeline_barrier(&[ImageBarrier::discard(
            ping.image,
            ping.format,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            ResourceState::COMPUTE_SHADER_WRITE,
        )]);
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline.pipeline);
        self.record_pass(ctx, self.descriptors.sets[0], 0);

        cmd.pipeline_barrier(&[
            ImageBarrier::new(
                ping.image,
                ping.format,
                ResourceState::COMPUTE_SHADER_WRITE,
                ResourceState::COMPUTE_SHADER_READ,
            ),
            ImageBarrier::discard(
                pong.image,
                pong.format,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                ResourceState::COMPUTE_SHADER_WRITE,
            ),
        ]);
        self.record_pass(ctx, self.descriptors.sets[1], 1);

        cmd.pipeline_barrier(&[ImageBarrier::new(
            pong.image,
            pong.format,
            ResourceState::COMPUTE_SHADER_WRITE,
            ResourceState::FRAGMENT_SHADER_READ,
        )]);
    }

    fn on_resize(
        &mut self,
        device: &dyn GpuDevice,
        extent: vk::Extent2D,
        images: &mut SharedImageRegistry,
    ) -> Result<()> {
        debug!(width = extent.width, height = extent.height, "recreating bloom targets");
        let hdr = images.require(HDR_IMAGE)?;
        let targets = BlurTargets::new(device, extent)?;
        std::mem::replace(&mut self.targets, targets).destroy(device);
        self.write_descriptors(device, hdr.view);
        self.publish(images);
        Ok(())
    }
}

impl Drop for BloomStage {
    fn drop(&mut self) {
        self.targets.destroy(&*self.device);
        self.device.destroy_sampler(self.sampler);
    }
}

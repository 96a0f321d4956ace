use super::{StageDescriptors, BLOOM_IMAGE, RT_SHADOW_IMAGE};
use crate::{
    push_constant_bytes, vk, AccessIntent, Descriptor, DescriptorBinding, DescriptorWrite, DeviceRef, FrameContext,
    GpuDevice, Phase, Result, SamplerCreateInfo, SharedImageRegistry, SharedSettings, Stage, HDR_IMAGE,
};

const HDR_BINDING: u32 = 0;
const BLOOM_BINDING: u32 = 1;
const SHADOW_BINDING: u32 = 2;

/// Full-screen tone-mapping pipeline.
///
/// Set 0 must follow `CompositeStage::set_layout_bindings`. The fragment push constant block is
/// `{ float exposure; float bloom_strength; uint debug_view; }`.
#[derive(Copy, Clone, Debug)]
pub struct CompositePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set_layout: vk::DescriptorSetLayout,
}

/// Index of the descriptor set sampling the given optional inputs.
fn set_index(bloom: bool, shadow: bool) -> usize {
    usize::from(!bloom) | (usize::from(!shadow) << 1)
}

/// Tone-maps `"hdr"` plus `"bloom"` into the output image.
///
/// `"rt_shadow"` is bound for `DebugView::RayTracing`. An input that is not registered, or whose
/// producer is disabled this frame, is replaced by `"hdr"`.
pub struct CompositeStage {
    device: DeviceRef,
    settings: SharedSettings,
    pipeline: CompositePipeline,
    sampler: vk::Sampler,
    /// One set per combination of optional inputs, see `set_index`.
    descriptors: StageDescriptors,
    has_bloom: bool,
    has_shadow: bool,
}

impl CompositeStage {
    pub fn set_layout_bindings() -> [DescriptorBinding; 3] {
        [HDR_BINDING, BLOOM_BINDING, SHADOW_BINDING].map(|binding| {
            DescriptorBinding::new(
                binding,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )
        })
    }

    /// Requires `"hdr"` to be registered. Uses `"bloom"` and `"rt_shadow"` if they are registered at
    /// this point or at the next resize.
    pub fn new(
        device: &DeviceRef,
        images: &mut SharedImageRegistry,
        settings: SharedSettings,
        pipeline: CompositePipeline,
    ) -> Result<CompositeStage> {
        images.require(HDR_IMAGE)?;
        let descriptors = StageDescriptors::new(device, pipeline.set_layout, &Self::set_layout_bindings(), 4)?;
        let sampler = device.create_sampler(&SamplerCreateInfo::default())?;
        let mut stage = CompositeStage {
            device: device.clone(),
            settings,
            pipeline,
            sampler,
            descriptors,
            has_bloom: false,
            has_shadow: false,
        };
        stage.write_descriptors(&**device, images)?;
        images.declare_access(HDR_IMAGE, stage.name(), Phase::CompositePass, AccessIntent::READ);
        images.declare_access(BLOOM_IMAGE, stage.name(), Phase::CompositePass, AccessIntent::READ);
        images.declare_access(RT_SHADOW_IMAGE, stage.name(), Phase::CompositePass, AccessIntent::READ);
        Ok(stage)
    }

    pub fn has_bloom(&self) -> bool {
        self.has_bloom
    }

    pub fn has_shadow(&self) -> bool {
        self.has_shadow
    }

    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipeline.pipeline = pipeline;
    }

    fn write_descriptors(&mut self, device: &dyn GpuDevice, images: &SharedImageRegistry) -> Result<()> {
        let hdr = Descriptor::sampled(images.require(HDR_IMAGE)?.view, self.sampler);
        let input = |name: &str| {
            images
                .get(name)
                .map(|image| Descriptor::sampled(image.view, self.sampler))
        };
        let (bloom, shadow) = (input(BLOOM_IMAGE), input(RT_SHADOW_IMAGE));

        let mut writes = Vec::with_capacity(12);
        for (use_bloom, use_shadow) in [(true, true), (false, true), (true, false), (false, false)] {
            let set = self.descriptors.sets[set_index(use_bloom, use_shadow)];
            let bloom = bloom.filter(|_| use_bloom).unwrap_or(hdr);
            let shadow = shadow.filter(|_| use_shadow).unwrap_or(hdr);
            writes.push(DescriptorWrite::new(set, HDR_BINDING, hdr));
            writes.push(DescriptorWrite::new(set, BLOOM_BINDING, bloom));
            writes.push(DescriptorWrite::new(set, SHADOW_BINDING, shadow));
        }
        device.update_descriptor_sets(&writes);
        self.has_bloom = bloom.is_some();
        self.has_shadow = shadow.is_some();
        Ok(())
    }
}

impl Stage for CompositeStage {
    fn name(&self) -> &str {
        "composite"
    }

    fn phase(&self) -> Phase {
        Phase::CompositePass
    }

    fn record(&self, ctx: &FrameContext) {
        let cmd = ctx.commands;
        let settings = &self.settings;
        let bloom = self.has_bloom && settings.bloom.get();
        let shadow = self.has_shadow && settings.ray_tracing.get();
        let set = self.descriptors.sets[set_index(bloom, shadow)];
        let bloom_strength = if bloom { settings.bloom_strength.get() } else { 0.0 };

        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
        cmd.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, self.pipeline.layout, 0, &[set]);
        cmd.push_constants(
            self.pipeline.layout,
            vk::ShaderStageFlags::FRAGMENT,
            0,
            &push_constant_bytes(&[
                settings.exposure.get().to_bits(),
                bloom_strength.to_bits(),
                settings.debug_view.get() as u32,
            ]),
        );
        cmd.draw(3, 1, 0, 0);
    }

    fn on_resize(
        &mut self,
        device: &dyn GpuDevice,
        _extent: vk::Extent2D,
        images: &mut SharedImageRegistry,
    ) -> Result<()> {
        self.write_descriptors(device, images)
    }
}

impl Drop for CompositeStage {
    fn drop(&mut self) {
        self.device.destroy_sampler(self.sampler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_input_combination_has_its_own_set() {
        let mut indices: Vec<_> = [(true, true), (true, false), (false, true), (false, false)]
            .into_iter()
            .map(|(bloom, shadow)| set_index(bloom, shadow))
            .collect();
        indices.sort();
        assert_eq!(indices, [0, 1, 2, 3]);
    }
}

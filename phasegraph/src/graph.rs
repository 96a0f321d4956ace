//! The render graph: fixed-phase stage scheduling plus the scene render-target infrastructure.
use crate::{
    stage::{StageKey, StageObject},
    is_valid_sample_count, vk, AllocatedImage, ClearValue, CommandStream, DeviceRef, FrameContext, ImageBarrier,
    ImageCreateInfo, MaterialDescriptors, MaterialTextures, MemoryLocation, Phase, ResourceState, Result,
    SamplerCreateInfo, Scene, SceneTargetDesc, SharedImage, SharedImageRegistry, Stage, StageHandle,
};
use slotmap::SlotMap;
use tracing::{debug, trace_span, warn};

/// Name of the HDR color image published by the graph.
pub const HDR_IMAGE: &str = "hdr";
/// Name of the multisampled color target published by the graph when multisampling is enabled.
pub const HDR_MSAA_IMAGE: &str = "hdr_msaa";
/// Name under which the application publishes the scene depth-stencil image.
pub const DEPTH_STENCIL_IMAGE: &str = "depth_stencil";

/// Parameters of a `RenderGraph`.
#[derive(Clone, Debug)]
pub struct RenderGraphConfig {
    /// Initial size of the output.
    pub extent: vk::Extent2D,
    pub hdr_format: vk::Format,
    /// Format of the depth-stencil image published by the application under `"depth_stencil"`.
    pub depth_format: vk::Format,
    /// Sample count of the scene pass. Values above 1 enable a multisampled target resolved into the
    /// HDR image.
    pub samples: u32,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
    pub clear_stencil: u32,
    /// Sampler published with the HDR image.
    pub hdr_sampler: SamplerCreateInfo,
}

impl Default for RenderGraphConfig {
    fn default() -> Self {
        RenderGraphConfig {
            extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            hdr_format: vk::Format::R16G16B16A16_SFLOAT,
            depth_format: vk::Format::D32_SFLOAT_S8_UINT,
            samples: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            hdr_sampler: SamplerCreateInfo::default(),
        }
    }
}

impl RenderGraphConfig {
    pub fn scene_target_desc(&self) -> SceneTargetDesc {
        SceneTargetDesc {
            hdr_format: self.hdr_format,
            depth_format: self.depth_format,
            samples: self.samples,
        }
    }
}

struct HdrTarget {
    color: AllocatedImage,
    msaa: Option<AllocatedImage>,
}

/// Schedules stages into the four phases and owns the resources shared by the scene pass.
///
/// # Frame recording
///
/// `record` runs the phases `PrePass`, `ScenePass`, `Intermediate`, `CompositePass` in this order.
/// Within a phase, enabled stages run in registration order. `ScenePass` and `CompositePass` are
/// framed by a render pass opened by the graph, but only if at least one of their stages is enabled.
/// After `ScenePass`, `"hdr"` is in `SHADER_READ_ONLY_OPTIMAL` even if the scene pass was skipped.
///
/// # Owned resources
///
/// * the HDR color image (published as `"hdr"`) and its sampler
/// * the multisampled color target (`"hdr_msaa"`), if `samples > 1`
/// * one scene framebuffer and one composite framebuffer per output image
/// * the material descriptor grid
///
/// Render passes, the depth-stencil image and the output image views belong to the application.
pub struct RenderGraph {
    device: DeviceRef,
    config: RenderGraphConfig,
    stages: SlotMap<StageKey, Box<dyn StageObject>>,
    /// Registration order.
    order: Vec<StageKey>,
    images: SharedImageRegistry,
    render_passes: [Option<vk::RenderPass>; Phase::COUNT],
    output_views: Vec<vk::ImageView>,
    scene_framebuffers: Vec<vk::Framebuffer>,
    composite_framebuffers: Vec<vk::Framebuffer>,
    hdr: Option<HdrTarget>,
    hdr_sampler: vk::Sampler,
    materials: MaterialDescriptors,
}

impl RenderGraph {
    /// Creates the graph, its HDR target and sampler, and the material descriptor layout.
    pub fn new(device: DeviceRef, mut config: RenderGraphConfig) -> Result<RenderGraph> {
        if !is_valid_sample_count(config.samples) {
            warn!(samples = config.samples, "invalid sample count, falling back to 1");
            config.samples = 1;
        }

        let materials = MaterialDescriptors::new(device.clone())?;
        let hdr_sampler = device.create_sampler(&config.hdr_sampler)?;
        let mut graph = RenderGraph {
            device,
            config,
            stages: SlotMap::with_key(),
            order: Vec::new(),
            images: SharedImageRegistry::new(),
            render_passes: [None; Phase::COUNT],
            output_views: Vec::new(),
            scene_framebuffers: Vec::new(),
            composite_framebuffers: Vec::new(),
            hdr: None,
            hdr_sampler,
            materials,
        };
        graph.create_hdr()?;
        Ok(graph)
    }

    pub fn device(&self) -> &DeviceRef {
        &self.device
    }

    pub fn config(&self) -> &RenderGraphConfig {
        &self.config
    }

    /// Current output size.
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Stages

    /// Registers a stage after all previously registered stages.
    pub fn add_stage<S: Stage + 'static>(&mut self, stage: S) -> StageHandle<S> {
        debug!(name = stage.name(), phase = ?stage.phase(), "add stage");
        let key = self.stages.insert(Box::new(stage));
        self.order.push(key);
        StageHandle::new(key)
    }

    /// Constructs a stage with access to the device and the shared image registry, then registers it.
    pub fn add_stage_with<S, F>(&mut self, f: F) -> Result<StageHandle<S>>
    where
        S: Stage + 'static,
        F: FnOnce(&DeviceRef, &mut SharedImageRegistry) -> Result<S>,
    {
        let stage = f(&self.device, &mut self.images)?;
        Ok(self.add_stage(stage))
    }

    /// Returns the stage, or `None` if it was removed.
    pub fn stage<S: Stage + 'static>(&self, handle: StageHandle<S>) -> Option<&S> {
        self.stages.get(handle.key)?.as_any().downcast_ref()
    }

    pub fn stage_mut<S: Stage + 'static>(&mut self, handle: StageHandle<S>) -> Option<&mut S> {
        self.stages.get_mut(handle.key)?.as_any_mut().downcast_mut()
    }

    /// Unregisters a stage and gives it back to the caller.
    pub fn remove_stage<S: Stage + 'static>(&mut self, handle: StageHandle<S>) -> Option<S> {
        let stage = self.stages.remove(handle.key)?;
        self.order.retain(|&key| key != handle.key);
        stage.into_any().downcast::<S>().ok().map(|stage| *stage)
    }

    pub fn stage_count(&self) -> usize {
        self.order.len()
    }

    fn stages_in(&self, phase: Phase) -> impl Iterator<Item = &dyn StageObject> + '_ {
        self.order
            .iter()
            .map(move |&key| &*self.stages[key])
            .filter(move |stage| stage.phase() == phase)
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Recording

    /// Records one frame into `ctx.commands`.
    ///
    /// # Panics
    ///
    /// If a framed phase has enabled stages but no render pass was set for it, or if
    /// `ctx.image_index` has no framebuffer.
    pub fn record(&self, ctx: &FrameContext) {
        let _span = trace_span!(
            "render_graph_record",
            frame_index = ctx.frame_index,
            image_index = ctx.image_index
        )
        .entered();

        let enabled: [Vec<&dyn StageObject>; Phase::COUNT] =
            Phase::ALL.map(|phase| self.stages_in(phase).filter(|stage| stage.is_enabled()).collect());
        for phase in Phase::ALL {
            let stages = &enabled[phase.index()];
            if stages.is_empty() {
                let enabled_later = enabled[phase.index() + 1..].iter().any(|later| !later.is_empty());
                if phase == Phase::ScenePass && enabled_later {
                    self.transition_unrendered_hdr(ctx);
                }
                continue;
            }

            let _span = trace_span!("phase", phase = phase.name(), stages = stages.len()).entered();
            if phase.has_framing() {
                self.begin_framing(phase, ctx);
            }
            for stage in stages.iter() {
                ctx.commands.begin_debug_label(stage.name());
                stage.record(ctx);
                ctx.commands.end_debug_label();
            }
            if phase.has_framing() {
                ctx.commands.end_render_pass();
            }
        }
    }

    fn begin_framing(&self, phase: Phase, ctx: &FrameContext) {
        let render_pass = self.render_passes[phase.index()]
            .unwrap_or_else(|| panic!("no render pass set for phase {:?}", phase));
        let (framebuffers, clear_values) = match phase {
            Phase::ScenePass => (&self.scene_framebuffers, self.scene_clear_values()),
            Phase::CompositePass => (
                &self.composite_framebuffers,
                vec![ClearValue::Color(self.config.clear_color)],
            ),
            _ => unreachable!("phase {:?} has no framing", phase),
        };
        assert!(
            ctx.image_index < framebuffers.len(),
            "no {:?} framebuffer for image index {} ({} created)",
            phase,
            ctx.image_index,
            framebuffers.len()
        );
        ctx.commands
            .begin_render_pass(render_pass, framebuffers[ctx.image_index], ctx.extent, clear_values);
        ctx.commands.set_viewport_and_scissor(ctx.extent);
    }

    /// Puts `"hdr"` in the layout the scene pass would have left it in, for the stages sampling it
    /// in later phases. Its contents are undefined.
    fn transition_unrendered_hdr(&self, ctx: &FrameContext) {
        if let Some(hdr) = self.hdr.as_ref() {
            ctx.commands.pipeline_barrier(&[ImageBarrier::discard(
                hdr.color.image,
                hdr.color.format,
                ResourceState::SHADER_READ.stages,
                ResourceState::SHADER_READ,
            )]);
        }
    }

    /// Clear values in framebuffer attachment order: color, depth-stencil, then resolve.
    fn scene_clear_values(&self) -> Vec<ClearValue> {
        let mut clear_values = vec![
            ClearValue::Color(self.config.clear_color),
            ClearValue::DepthStencil {
                depth: self.config.clear_depth,
                stencil: self.config.clear_stencil,
            },
        ];
        if self.config.samples > 1 {
            clear_values.push(ClearValue::Color(self.config.clear_color));
        }
        clear_values
    }

    /// Builds a frame context for this graph's extent and material grid.
    pub fn frame_context<'a>(
        &'a self,
        commands: &'a CommandStream,
        frame_index: usize,
        image_index: usize,
        scene: &'a Scene,
    ) -> FrameContext<'a> {
        FrameContext {
            commands,
            frame_index,
            image_index,
            extent: self.config.extent,
            scene,
            materials: &self.materials,
        }
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Render passes and framebuffers

    /// Sets the render pass used to frame `phase`. The render pass remains owned by the caller.
    pub fn set_render_pass(&mut self, phase: Phase, render_pass: vk::RenderPass) {
        assert!(phase.has_framing(), "phase {:?} has no render pass", phase);
        self.render_passes[phase.index()] = Some(render_pass);
    }

    pub fn render_pass(&self, phase: Phase) -> Option<vk::RenderPass> {
        self.render_passes[phase.index()]
    }

    /// Sets the views of the output images, one per output slot.
    ///
    /// Takes effect at the next `create_scene_framebuffers` or resize.
    pub fn set_output_views(&mut self, views: &[vk::ImageView]) {
        self.output_views = views.to_vec();
    }

    pub fn output_views(&self) -> &[vk::ImageView] {
        &self.output_views
    }

    /// Creates one scene framebuffer and one composite framebuffer per output view.
    ///
    /// Existing framebuffers are destroyed first. Fails if `"hdr"`, `"depth_stencil"` (and
    /// `"hdr_msaa"` when multisampling) are not registered, or if a framed phase has no render pass.
    pub fn create_scene_framebuffers(&mut self) -> Result<()> {
        self.destroy_framebuffers();

        let scene_pass = self.required_render_pass(Phase::ScenePass)?;
        let composite_pass = self.required_render_pass(Phase::CompositePass)?;
        let hdr = self.images.require(HDR_IMAGE)?;
        let depth_stencil = self.images.require(DEPTH_STENCIL_IMAGE)?;
        let scene_attachments = if self.config.samples > 1 {
            let msaa = self.images.require(HDR_MSAA_IMAGE)?;
            vec![msaa.view, depth_stencil.view, hdr.view]
        } else {
            vec![hdr.view, depth_stencil.view]
        };

        let extent = self.config.extent;
        for &output in self.output_views.iter() {
            let framebuffer = self.device.create_framebuffer(scene_pass, &scene_attachments, extent)?;
            self.scene_framebuffers.push(framebuffer);
            let framebuffer = self.device.create_framebuffer(composite_pass, &[output], extent)?;
            self.composite_framebuffers.push(framebuffer);
        }
        debug!(
            count = self.output_views.len(),
            width = extent.width,
            height = extent.height,
            "created scene framebuffers"
        );
        Ok(())
    }

    /// Destroys and rebuilds every framebuffer from the current registry entries.
    ///
    /// Must be called after any change to the handles published under `"hdr"` or `"depth_stencil"`.
    pub fn recreate_scene_framebuffers(&mut self) -> Result<()> {
        self.create_scene_framebuffers()
    }

    fn required_render_pass(&self, phase: Phase) -> Result<vk::RenderPass> {
        self.render_passes[phase.index()].ok_or(crate::Error::MissingRenderPass(phase))
    }

    fn destroy_framebuffers(&mut self) {
        for framebuffer in self
            .scene_framebuffers
            .drain(..)
            .chain(self.composite_framebuffers.drain(..))
        {
            self.device.destroy_framebuffer(framebuffer);
        }
    }

    pub fn scene_framebuffers(&self) -> &[vk::Framebuffer] {
        &self.scene_framebuffers
    }

    pub fn composite_framebuffers(&self) -> &[vk::Framebuffer] {
        &self.composite_framebuffers
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // HDR target

    fn create_hdr(&mut self) -> Result<()> {
        let extent = self.config.extent;
        let format = self.config.hdr_format;
        let color = self.device.create_image(
            HDR_IMAGE,
            &ImageCreateInfo {
                usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                format,
                extent,
                samples: 1,
                memory_location: MemoryLocation::GpuOnly,
            },
        )?;
        self.hdr = Some(HdrTarget { color, msaa: None });
        self.images.set(
            HDR_IMAGE,
            SharedImage {
                image: color.image,
                view: color.view,
                sampler: Some(self.hdr_sampler),
                format,
                extent,
            },
        );

        if self.config.samples > 1 {
            let msaa = self.device.create_image(
                HDR_MSAA_IMAGE,
                &ImageCreateInfo {
                    usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                    format,
                    extent,
                    samples: self.config.samples,
                    memory_location: MemoryLocation::GpuOnly,
                },
            )?;
            if let Some(hdr) = self.hdr.as_mut() {
                hdr.msaa = Some(msaa);
            }
            self.images.set(
                HDR_MSAA_IMAGE,
                SharedImage {
                    image: msaa.image,
                    view: msaa.view,
                    sampler: None,
                    format,
                    extent,
                },
            );
        }

        debug!(
            width = extent.width,
            height = extent.height,
            ?format,
            samples = self.config.samples,
            "created HDR target"
        );
        Ok(())
    }

    fn destroy_hdr(&mut self) {
        if let Some(hdr) = self.hdr.take() {
            self.images.remove(HDR_IMAGE);
            self.device.destroy_image(&hdr.color);
            if let Some(msaa) = hdr.msaa {
                self.images.remove(HDR_MSAA_IMAGE);
                self.device.destroy_image(&msaa);
            }
        }
    }

    /// The HDR color image. `None` only while a resize is in progress or after it failed.
    pub fn hdr_image(&self) -> Option<&AllocatedImage> {
        self.hdr.as_ref().map(|hdr| &hdr.color)
    }

    pub fn hdr_msaa_image(&self) -> Option<&AllocatedImage> {
        self.hdr.as_ref().and_then(|hdr| hdr.msaa.as_ref())
    }

    /// Sampler of the HDR image. Created once, kept across resizes.
    pub fn hdr_sampler(&self) -> vk::Sampler {
        self.hdr_sampler
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Resize

    /// Rebuilds the size-dependent resources, then forwards the resize to every stage, phase by phase
    /// and in registration order within a phase.
    ///
    /// The caller must have waited for all GPU work referencing the old resources, and must have
    /// published the resized `"depth_stencil"` image and the new output views beforehand.
    pub fn on_swapchain_resize(&mut self, extent: vk::Extent2D) -> Result<()> {
        debug!(width = extent.width, height = extent.height, "swapchain resize");
        self.config.extent = extent;
        self.destroy_framebuffers();
        self.destroy_hdr();
        self.create_hdr()?;
        self.create_scene_framebuffers()?;
        // producers republish their images before the stages of later phases read them
        for phase in Phase::ALL {
            let keys: Vec<StageKey> = self
                .order
                .iter()
                .copied()
                .filter(|&key| self.stages[key].phase() == phase)
                .collect();
            for key in keys {
                self.stages[key].on_resize(&*self.device, extent, &mut self.images)?;
            }
        }
        Ok(())
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Shared images

    pub fn image_registry(&self) -> &SharedImageRegistry {
        &self.images
    }

    pub fn image_registry_mut(&mut self) -> &mut SharedImageRegistry {
        &mut self.images
    }

    ////////////////////////////////////////////////////////////////////////////////////////////////
    // Materials

    /// Rebuilds the material descriptor grid: one default set plus one set per material, for each
    /// entry of `uniform_buffers`.
    ///
    /// Invalidates every descriptor set handle obtained from the previous grid.
    pub fn allocate_material_descriptors(
        &mut self,
        default_textures: &MaterialTextures,
        material_textures: &[MaterialTextures],
        uniform_buffers: &[vk::DescriptorBufferInfo],
    ) -> Result<()> {
        self.materials
            .allocate(default_textures, material_textures, uniform_buffers)
    }

    pub fn material_descriptors(&self) -> &MaterialDescriptors {
        &self.materials
    }

    /// Layout shared by every material set, for building pipeline layouts.
    pub fn material_set_layout(&self) -> vk::DescriptorSetLayout {
        self.materials.layout()
    }
}

impl Drop for RenderGraph {
    fn drop(&mut self) {
        // stages may reference graph-owned images
        self.order.clear();
        self.stages.clear();
        self.destroy_framebuffers();
        self.destroy_hdr();
        self.materials.destroy();
        self.device.destroy_sampler(self.hdr_sampler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_single_sampled_hdr() {
        let config = RenderGraphConfig::default();
        assert_eq!(config.hdr_format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(config.samples, 1);
        assert!(!config.scene_target_desc().is_multisampled());
    }
}

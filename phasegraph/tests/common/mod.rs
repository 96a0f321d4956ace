//! Recording fake of `GpuDevice` and helpers shared by the integration tests.
#![allow(dead_code)]

use phasegraph::{
    vk::{self, Handle},
    AllocatedImage, Command, CommandStream, DescriptorBinding, DescriptorWrite, Error, FrameContext, GpuDevice,
    ImageCreateInfo, Phase, RenderGraph, RenderGraphConfig, RenderPassDesc, Result, SamplerCreateInfo, Scene,
    SharedImage, Stage, DEPTH_STENCIL_IMAGE,
};
use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, HashSet},
    rc::Rc,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One call made to the device.
#[derive(Clone, Debug)]
pub enum Call {
    CreateImage {
        name: String,
        image: vk::Image,
        view: vk::ImageView,
        samples: u32,
        extent: vk::Extent2D,
    },
    DestroyImage(vk::Image),
    CreateSampler(vk::Sampler),
    DestroySampler(vk::Sampler),
    CreateRenderPass(vk::RenderPass),
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer {
        framebuffer: vk::Framebuffer,
        render_pass: vk::RenderPass,
        attachments: Vec<vk::ImageView>,
        extent: vk::Extent2D,
    },
    DestroyFramebuffer(vk::Framebuffer),
    CreateSetLayout(vk::DescriptorSetLayout),
    DestroySetLayout(vk::DescriptorSetLayout),
    CreatePool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        sizes: Vec<(vk::DescriptorType, u32)>,
    },
    DestroyPool(vk::DescriptorPool),
    AllocateSets {
        pool: vk::DescriptorPool,
        sets: Vec<vk::DescriptorSet>,
    },
    UpdateSets(Vec<DescriptorWrite>),
}

/// A device that hands out unique fake handles and logs every call.
#[derive(Default)]
pub struct RecordingDevice {
    next_handle: Cell<u64>,
    calls: RefCell<Vec<Call>>,
    live: RefCell<HashSet<u64>>,
    dead: RefCell<HashSet<u64>>,
    pool_sets: RefCell<HashMap<vk::DescriptorPool, Vec<vk::DescriptorSet>>>,
    /// Make the next `create_image` calls with this name fail.
    pub fail_image: RefCell<Option<String>>,
}

impl RecordingDevice {
    pub fn new() -> Rc<RecordingDevice> {
        Rc::new(RecordingDevice::default())
    }

    fn handle<T: Handle>(&self) -> T {
        let raw = self.next_handle.get() + 1;
        self.next_handle.set(raw);
        self.live.borrow_mut().insert(raw);
        T::from_raw(raw)
    }

    fn release<T: Handle>(&self, handle: T) {
        let raw = handle.as_raw();
        assert!(self.live.borrow_mut().remove(&raw), "destroyed a dead or unknown handle {:#x}", raw);
        self.dead.borrow_mut().insert(raw);
    }

    fn log(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn is_live<T: Handle>(&self, handle: T) -> bool {
        self.live.borrow().contains(&handle.as_raw())
    }

    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Framebuffers created and not yet destroyed, in creation order.
    pub fn live_framebuffers(&self) -> Vec<(vk::Framebuffer, Vec<vk::ImageView>)> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::CreateFramebuffer {
                    framebuffer, attachments, ..
                } if self.is_live(*framebuffer) => Some((*framebuffer, attachments.clone())),
                _ => None,
            })
            .collect()
    }

    /// Last image created under `name`.
    pub fn last_image(&self, name: &str) -> Option<(vk::Image, vk::ImageView)> {
        self.calls.borrow().iter().rev().find_map(|c| match c {
            Call::CreateImage { name: n, image, view, .. } if n == name => Some((*image, *view)),
            _ => None,
        })
    }

    /// Index of the first call matching `pred`.
    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(|c| pred(c))
    }
}

impl GpuDevice for RecordingDevice {
    fn create_image(&self, name: &str, info: &ImageCreateInfo) -> Result<AllocatedImage> {
        if self.fail_image.borrow().as_deref() == Some(name) {
            return Err(Error::Vulkan(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        }
        let image = AllocatedImage {
            image: self.handle(),
            view: self.handle(),
            format: info.format,
            extent: info.extent,
        };
        self.log(Call::CreateImage {
            name: name.to_string(),
            image: image.image,
            view: image.view,
            samples: info.samples,
            extent: info.extent,
        });
        Ok(image)
    }

    fn destroy_image(&self, image: &AllocatedImage) {
        self.release(image.view);
        self.release(image.image);
        self.log(Call::DestroyImage(image.image));
    }

    fn create_sampler(&self, _info: &SamplerCreateInfo) -> Result<vk::Sampler> {
        let sampler = self.handle();
        self.log(Call::CreateSampler(sampler));
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.release(sampler);
        self.log(Call::DestroySampler(sampler));
    }

    fn create_render_pass(&self, _desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        let render_pass = self.handle();
        self.log(Call::CreateRenderPass(render_pass));
        Ok(render_pass)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.release(render_pass);
        self.log(Call::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let framebuffer = self.handle();
        self.log(Call::CreateFramebuffer {
            framebuffer,
            render_pass,
            attachments: attachments.to_vec(),
            extent,
        });
        Ok(framebuffer)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.release(framebuffer);
        self.log(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        let layout = self.handle();
        self.log(Call::CreateSetLayout(layout));
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.release(layout);
        self.log(Call::DestroySetLayout(layout));
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let pool = self.handle();
        self.log(Call::CreatePool {
            pool,
            max_sets,
            sizes: pool_sizes.iter().map(|s| (s.ty, s.descriptor_count)).collect(),
        });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        for set in self.pool_sets.borrow_mut().remove(&pool).unwrap_or_default() {
            self.release(set);
        }
        self.release(pool);
        self.log(Call::DestroyPool(pool));
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        assert!(self.is_live(pool), "allocating from a dead pool");
        let sets: Vec<vk::DescriptorSet> = layouts.iter().map(|_| self.handle()).collect();
        self.pool_sets.borrow_mut().entry(pool).or_default().extend(&sets);
        self.log(Call::AllocateSets { pool, sets: sets.clone() });
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        // sets not allocated here belong to the application
        for write in writes {
            assert!(
                !self.dead.borrow().contains(&write.set.as_raw()),
                "writing into a freed descriptor set"
            );
        }
        self.log(Call::UpdateSets(writes.to_vec()));
    }
}

/// Stage logging its invocations into a shared list.
pub struct TestStage {
    pub name: String,
    pub phase: Phase,
    pub enabled: Rc<Cell<bool>>,
    pub log: Rc<RefCell<Vec<String>>>,
    pub resizes: Rc<Cell<u32>>,
}

impl TestStage {
    pub fn new(name: &str, phase: Phase, log: &Rc<RefCell<Vec<String>>>) -> TestStage {
        TestStage {
            name: name.to_string(),
            phase,
            enabled: Rc::new(Cell::new(true)),
            log: log.clone(),
            resizes: Rc::new(Cell::new(0)),
        }
    }
}

impl Stage for TestStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn record(&self, ctx: &FrameContext) {
        self.log.borrow_mut().push(self.name.clone());
        ctx.commands.draw(3, 1, 0, 0);
    }

    fn on_resize(
        &mut self,
        _device: &dyn GpuDevice,
        _extent: vk::Extent2D,
        _images: &mut phasegraph::SharedImageRegistry,
    ) -> Result<()> {
        self.resizes.set(self.resizes.get() + 1);
        self.log.borrow_mut().push(format!("resize {}", self.name));
        Ok(())
    }
}

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

/// Application-side resources around a graph: render passes, depth image, output views.
pub struct TestApp {
    pub device: Rc<RecordingDevice>,
    pub graph: RenderGraph,
    pub depth: AllocatedImage,
    pub output_views: Vec<vk::ImageView>,
}

impl TestApp {
    pub fn new(output_slots: usize, samples: u32) -> TestApp {
        init_tracing();
        let device = RecordingDevice::new();
        let config = RenderGraphConfig {
            extent: EXTENT,
            samples,
            ..Default::default()
        };
        let mut graph = RenderGraph::new(device.clone(), config.clone()).unwrap();

        let scene_pass = device.create_render_pass(&config.scene_target_desc().render_pass_desc()).unwrap();
        let composite_pass = device
            .create_render_pass(&phasegraph::composite_render_pass_desc(vk::Format::B8G8R8A8_SRGB))
            .unwrap();
        graph.set_render_pass(Phase::ScenePass, scene_pass);
        graph.set_render_pass(Phase::CompositePass, composite_pass);

        let depth = create_depth(&*device, EXTENT);
        publish_depth(&mut graph, &depth);
        let output_views: Vec<vk::ImageView> = (0..output_slots).map(|_| device.handle()).collect();
        graph.set_output_views(&output_views);
        graph.create_scene_framebuffers().unwrap();

        TestApp {
            device,
            graph,
            depth,
            output_views,
        }
    }

    /// Application side of a resize: new depth image and output views, then the graph.
    pub fn resize(&mut self, extent: vk::Extent2D, output_slots: usize) {
        self.device.destroy_image(&self.depth);
        self.depth = create_depth(&*self.device, extent);
        publish_depth(&mut self.graph, &self.depth);
        self.output_views = (0..output_slots).map(|_| self.device.handle()).collect();
        self.graph.set_output_views(&self.output_views);
        self.graph.on_swapchain_resize(extent).unwrap();
    }

    /// Records one frame and returns the commands.
    pub fn record(&self, frame_index: usize, image_index: usize, scene: &Scene) -> Vec<Command> {
        let commands = CommandStream::new();
        let ctx = self.graph.frame_context(&commands, frame_index, image_index, scene);
        self.graph.record(&ctx);
        commands.take()
    }
}

pub fn create_depth(device: &dyn GpuDevice, extent: vk::Extent2D) -> AllocatedImage {
    device
        .create_image(
            DEPTH_STENCIL_IMAGE,
            &ImageCreateInfo {
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                format: vk::Format::D32_SFLOAT_S8_UINT,
                extent,
                samples: 1,
                memory_location: phasegraph::MemoryLocation::GpuOnly,
            },
        )
        .unwrap()
}

fn publish_depth(graph: &mut RenderGraph, depth: &AllocatedImage) {
    graph.image_registry_mut().set(
        DEPTH_STENCIL_IMAGE,
        SharedImage {
            image: depth.image,
            view: depth.view,
            sampler: None,
            format: depth.format,
            extent: depth.extent,
        },
    );
}

pub fn is_begin_render_pass(command: &Command) -> bool {
    matches!(command, Command::BeginRenderPass { .. })
}

pub fn is_end_render_pass(command: &Command) -> bool {
    matches!(command, Command::EndRenderPass)
}

//! The resource-creation capability consumed by the graph and by stages that own GPU objects.
mod vulkan;

pub use vulkan::VulkanDevice;

use crate::{vk, DescriptorBinding, DescriptorWrite, MemoryLocation, RenderPassDesc, Result, SamplerCreateInfo};
use std::rc::Rc;

/// Information passed to `GpuDevice::create_image` to describe the image to be created.
#[derive(Copy, Clone, Debug)]
pub struct ImageCreateInfo {
    /// Image usage flags. Must include all intended uses of the image.
    pub usage: vk::ImageUsageFlags,
    /// Format of the image.
    pub format: vk::Format,
    /// Size of the image.
    pub extent: vk::Extent2D,
    /// Number of samples. `0` is *not* a valid value.
    pub samples: u32,
    pub memory_location: MemoryLocation,
}

/// A device image with its bound memory and a view of its base mip level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AllocatedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Creation and destruction of the Vulkan objects owned by a render graph and its stages.
///
/// Destroying an object that is still referenced by in-flight GPU work is undefined behavior; callers
/// are expected to wait for the relevant frames before destroying anything.
pub trait GpuDevice {
    /// Creates a 2D image, binds memory to it and creates a view of the base mip level.
    fn create_image(&self, name: &str, info: &ImageCreateInfo) -> Result<AllocatedImage>;
    /// Destroys the view and the image, and releases the memory.
    fn destroy_image(&self, image: &AllocatedImage);

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&self, render_pass: vk::RenderPass);

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer);

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize])
        -> Result<vk::DescriptorPool>;
    /// Destroys the pool and, implicitly, every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Allocates one set per entry of `layouts` in a single call.
    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>>;

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]);
}

/// Shared handle to the device, cloned into every object that must destroy GPU resources on drop.
pub type DeviceRef = Rc<dyn GpuDevice>;

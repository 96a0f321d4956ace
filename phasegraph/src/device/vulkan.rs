//! `GpuDevice` implementation over an `ash::Device`.
use crate::{
    aspects_for_format,
    command::Command,
    device::{AllocatedImage, GpuDevice, ImageCreateInfo},
    render_target::sample_count_flags,
    vk, AttachmentDesc, DescriptorBinding, Descriptor, DescriptorWrite, Error, RenderPassDesc, Result,
    SamplerCreateInfo,
};
use ash::extensions::{ext::DebugUtils, khr::RayTracingPipeline};
use fxhash::FxHashMap;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use std::{cell::RefCell, ffi::CString, fmt, ptr};
use tracing::{debug, warn};

/// Wrapper around a vulkan device and a memory allocator.
///
/// Device selection and creation happen elsewhere: this only borrows the device and the allocator
/// created for it.
pub struct VulkanDevice {
    device: ash::Device,
    allocator: RefCell<Allocator>,
    allocations: RefCell<FxHashMap<vk::Image, Allocation>>,
    debug_utils: Option<DebugUtils>,
    ray_tracing: Option<RayTracingPipeline>,
}

impl fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("VulkanDevice").finish()
    }
}

impl VulkanDevice {
    pub fn new(device: ash::Device, allocator: Allocator) -> VulkanDevice {
        VulkanDevice {
            device,
            allocator: RefCell::new(allocator),
            allocations: RefCell::new(FxHashMap::default()),
            debug_utils: None,
            ray_tracing: None,
        }
    }

    /// Emits debug labels around stages when replaying command streams. Requires `VK_EXT_debug_utils`.
    pub fn with_debug_utils(mut self, entry: &ash::Entry, instance: &ash::Instance) -> VulkanDevice {
        self.debug_utils = Some(DebugUtils::new(entry, instance));
        self
    }

    /// Enables replay of trace-rays commands. Requires `VK_KHR_ray_tracing_pipeline`.
    pub fn with_ray_tracing(mut self, instance: &ash::Instance) -> VulkanDevice {
        self.ray_tracing = Some(RayTracingPipeline::new(instance, &self.device));
        self
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Replays recorded commands onto `command_buffer`.
    ///
    /// # Safety
    ///
    /// `command_buffer` must be in the recording state, and every handle referenced by `commands`
    /// must be alive.
    pub unsafe fn encode(&self, command_buffer: vk::CommandBuffer, commands: &[Command]) -> Result<()> {
        let device = &self.device;
        for command in commands {
            match command {
                Command::BeginDebugLabel { name } => {
                    if let Some(debug_utils) = &self.debug_utils {
                        let name = CString::new(name.as_str()).unwrap_or_default();
                        debug_utils.cmd_begin_debug_utils_label(
                            command_buffer,
                            &vk::DebugUtilsLabelEXT {
                                p_label_name: name.as_ptr(),
                                ..Default::default()
                            },
                        );
                    }
                }
                Command::EndDebugLabel => {
                    if let Some(debug_utils) = &self.debug_utils {
                        debug_utils.cmd_end_debug_utils_label(command_buffer);
                    }
                }
                Command::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    render_area,
                    clear_values,
                } => {
                    let clear_values: Vec<vk::ClearValue> = clear_values.iter().map(|&v| v.into()).collect();
                    let begin_info = vk::RenderPassBeginInfo {
                        render_pass: *render_pass,
                        framebuffer: *framebuffer,
                        render_area: *render_area,
                        clear_value_count: clear_values.len() as u32,
                        p_clear_values: clear_values.as_ptr(),
                        ..Default::default()
                    };
                    device.cmd_begin_render_pass(command_buffer, &begin_info, vk::SubpassContents::INLINE);
                }
                Command::EndRenderPass => device.cmd_end_render_pass(command_buffer),
                Command::SetViewport(viewport) => device.cmd_set_viewport(command_buffer, 0, &[*viewport]),
                Command::SetScissor(scissor) => device.cmd_set_scissor(command_buffer, 0, &[*scissor]),
                Command::BindPipeline { bind_point, pipeline } => {
                    device.cmd_bind_pipeline(command_buffer, *bind_point, *pipeline)
                }
                Command::BindDescriptorSets {
                    bind_point,
                    layout,
                    first_set,
                    sets,
                } => device.cmd_bind_descriptor_sets(command_buffer, *bind_point, *layout, *first_set, sets, &[]),
                Command::PushConstants {
                    layout,
                    stages,
                    offset,
                    data,
                } => device.cmd_push_constants(command_buffer, *layout, *stages, *offset, data),
                Command::BindVertexBuffer { binding, buffer, offset } => {
                    device.cmd_bind_vertex_buffers(command_buffer, *binding, &[*buffer], &[*offset])
                }
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => device.cmd_bind_index_buffer(command_buffer, *buffer, *offset, *index_type),
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => device.cmd_draw(command_buffer, *vertex_count, *instance_count, *first_vertex, *first_instance),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => device.cmd_draw_indexed(
                    command_buffer,
                    *index_count,
                    *instance_count,
                    *first_index,
                    *vertex_offset,
                    *first_instance,
                ),
                Command::Dispatch {
                    group_count_x,
                    group_count_y,
                    group_count_z,
                } => device.cmd_dispatch(command_buffer, *group_count_x, *group_count_y, *group_count_z),
                Command::TraceRays {
                    table,
                    width,
                    height,
                    depth,
                } => {
                    let ray_tracing = self
                        .ray_tracing
                        .as_ref()
                        .ok_or(Error::MissingExtension("VK_KHR_ray_tracing_pipeline"))?;
                    ray_tracing.cmd_trace_rays(
                        command_buffer,
                        &table.raygen,
                        &table.miss,
                        &table.hit,
                        &table.callable,
                        *width,
                        *height,
                        *depth,
                    );
                }
                Command::PipelineBarrier { image_barriers } => {
                    let barriers: Vec<vk::ImageMemoryBarrier2> = image_barriers.iter().map(|b| b.to_vk()).collect();
                    device.cmd_pipeline_barrier2(
                        command_buffer,
                        &vk::DependencyInfo {
                            image_memory_barrier_count: barriers.len() as u32,
                            p_image_memory_barriers: barriers.as_ptr(),
                            ..Default::default()
                        },
                    );
                }
            }
        }
        Ok(())
    }
}

impl GpuDevice for VulkanDevice {
    fn create_image(&self, name: &str, info: &ImageCreateInfo) -> Result<AllocatedImage> {
        let create_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: info.format,
            extent: vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: sample_count_flags(info.samples)?,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: info.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        // SAFETY: the device is valid, the create info is valid
        let image = unsafe { self.device.create_image(&create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation = self.allocator.borrow_mut().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: info.memory_location,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(err.into());
            }
        };
        // SAFETY: the allocation was made for this image's memory requirements
        let bound = unsafe { self.device.bind_image_memory(image, allocation.memory(), allocation.offset()) };
        self.allocations.borrow_mut().insert(image, allocation);

        let view_info = vk::ImageViewCreateInfo {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: info.format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspects_for_format(info.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        let view = bound.and_then(|()| unsafe { self.device.create_image_view(&view_info, None) });
        let view = match view {
            Ok(view) => view,
            Err(err) => {
                self.destroy_image(&AllocatedImage {
                    image,
                    view: vk::ImageView::null(),
                    format: info.format,
                    extent: info.extent,
                });
                return Err(err.into());
            }
        };

        debug!(
            image = name,
            width = info.extent.width,
            height = info.extent.height,
            format = ?info.format,
            "created image"
        );
        Ok(AllocatedImage {
            image,
            view,
            format: info.format,
            extent: info.extent,
        })
    }

    fn destroy_image(&self, image: &AllocatedImage) {
        unsafe {
            self.device.destroy_image_view(image.view, None);
            self.device.destroy_image(image.image, None);
        }
        if let Some(allocation) = self.allocations.borrow_mut().remove(&image.image) {
            if let Err(err) = self.allocator.borrow_mut().free(allocation) {
                warn!("failed to free image memory: {}", err);
            }
        }
    }

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<vk::Sampler> {
        Ok(unsafe { self.device.create_sampler(&info.to_vk(), None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<vk::RenderPass> {
        let mut attachments = vec![desc.color.to_vk()?];
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let mut push_attachment = |attachment: Option<AttachmentDesc>, layout| -> Result<_> {
            let Some(attachment) = attachment else {
                return Ok(None);
            };
            attachments.push(attachment.to_vk()?);
            Ok(Some(vk::AttachmentReference {
                attachment: attachments.len() as u32 - 1,
                layout,
            }))
        };
        let depth_ref = push_attachment(
            desc.depth_stencil,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;
        let resolve_ref = push_attachment(desc.resolve, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &color_ref,
            p_resolve_attachments: resolve_ref.as_ref().map_or(ptr::null(), |r| r as *const _),
            p_depth_stencil_attachment: depth_ref.as_ref().map_or(ptr::null(), |r| r as *const _),
            ..Default::default()
        };

        let dependencies = [
            vk::SubpassDependency {
                src_subpass: vk::SUBPASS_EXTERNAL,
                dst_subpass: 0,
                // previous frame's samplers of the color target
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::COMPUTE_SHADER,
                dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dependency_flags: vk::DependencyFlags::empty(),
            },
            vk::SubpassDependency {
                src_subpass: 0,
                dst_subpass: vk::SUBPASS_EXTERNAL,
                src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                dst_stage_mask: vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::COMPUTE_SHADER,
                src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                dst_access_mask: vk::AccessFlags::SHADER_READ,
                dependency_flags: vk::DependencyFlags::BY_REGION,
            },
        ];

        let create_info = vk::RenderPassCreateInfo {
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: dependencies.len() as u32,
            p_dependencies: dependencies.as_ptr(),
            ..Default::default()
        };
        Ok(unsafe { self.device.create_render_pass(&create_info, None)? })
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<vk::Framebuffer> {
        let create_info = vk::FramebufferCreateInfo {
            render_pass,
            attachment_count: attachments.len() as u32,
            p_attachments: attachments.as_ptr(),
            width: extent.width,
            height: extent.height,
            layers: 1,
            ..Default::default()
        };
        Ok(unsafe { self.device.create_framebuffer(&create_info, None)? })
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        let bindings: Vec<_> = bindings.iter().map(DescriptorBinding::to_vk).collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo {
            flags: vk::DescriptorSetLayoutCreateFlags::empty(),
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        Ok(unsafe { self.device.create_descriptor_set_layout(&create_info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo {
            max_sets,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        Ok(unsafe { self.device.create_descriptor_pool(&create_info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let allocate_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: pool,
            descriptor_set_count: layouts.len() as u32,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        Ok(unsafe { self.device.allocate_descriptor_sets(&allocate_info)? })
    }

    fn update_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        if writes.is_empty() {
            return;
        }

        // Fill the info arrays completely before taking pointers into them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for write in writes {
            match write.descriptor {
                Descriptor::UniformBuffer(info) => buffer_infos.push(info),
                Descriptor::CombinedImageSampler {
                    image_view,
                    sampler,
                    layout,
                } => image_infos.push(vk::DescriptorImageInfo {
                    sampler,
                    image_view,
                    image_layout: layout,
                }),
                Descriptor::StorageImage { image_view, layout } => image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view,
                    image_layout: layout,
                }),
            }
        }

        let mut next_buffer = 0;
        let mut next_image = 0;
        let vk_writes: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .map(|write| {
                let mut vk_write = vk::WriteDescriptorSet {
                    dst_set: write.set,
                    dst_binding: write.binding,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: write.descriptor.descriptor_type(),
                    ..Default::default()
                };
                match write.descriptor {
                    Descriptor::UniformBuffer(_) => {
                        vk_write.p_buffer_info = &buffer_infos[next_buffer];
                        next_buffer += 1;
                    }
                    Descriptor::CombinedImageSampler { .. } | Descriptor::StorageImage { .. } => {
                        vk_write.p_image_info = &image_infos[next_image];
                        next_image += 1;
                    }
                }
                vk_write
            })
            .collect();

        unsafe {
            self.device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

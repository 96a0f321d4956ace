//! Backend-neutral descriptor set layout and update descriptions.
use crate::vk;

/// One binding of a descriptor set layout.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    /// Which shader stages can access a resource for this binding.
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub const fn new(binding: u32, descriptor_type: vk::DescriptorType, stages: vk::ShaderStageFlags) -> Self {
        DescriptorBinding {
            binding,
            descriptor_type,
            stages,
        }
    }

    pub(crate) fn to_vk(&self) -> vk::DescriptorSetLayoutBinding {
        vk::DescriptorSetLayoutBinding {
            binding: self.binding,
            descriptor_type: self.descriptor_type,
            descriptor_count: 1,
            stage_flags: self.stages,
            ..Default::default()
        }
    }
}

/// Resource written into a descriptor.
#[derive(Copy, Clone, Debug)]
pub enum Descriptor {
    UniformBuffer(vk::DescriptorBufferInfo),
    CombinedImageSampler {
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
    StorageImage {
        image_view: vk::ImageView,
        layout: vk::ImageLayout,
    },
}

impl Descriptor {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Descriptor::UniformBuffer(_) => vk::DescriptorType::UNIFORM_BUFFER,
            Descriptor::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            Descriptor::StorageImage { .. } => vk::DescriptorType::STORAGE_IMAGE,
        }
    }

    /// A sampled image in `SHADER_READ_ONLY_OPTIMAL` layout.
    pub fn sampled(image_view: vk::ImageView, sampler: vk::Sampler) -> Descriptor {
        Descriptor::CombinedImageSampler {
            image_view,
            sampler,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// A storage image in `GENERAL` layout.
    pub fn storage(image_view: vk::ImageView) -> Descriptor {
        Descriptor::StorageImage {
            image_view,
            layout: vk::ImageLayout::GENERAL,
        }
    }
}

/// A write of one descriptor into a set.
#[derive(Copy, Clone, Debug)]
pub struct DescriptorWrite {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub descriptor: Descriptor,
}

impl DescriptorWrite {
    pub fn new(set: vk::DescriptorSet, binding: u32, descriptor: Descriptor) -> DescriptorWrite {
        DescriptorWrite {
            set,
            binding,
            descriptor,
        }
    }
}

/// Computes pool sizes for `set_count` sets of the given layout.
pub fn pool_sizes_for(bindings: &[DescriptorBinding], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
    for binding in bindings {
        if let Some(size) = sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
            size.descriptor_count += set_count;
        } else {
            sizes.push(vk::DescriptorPoolSize {
                ty: binding.descriptor_type,
                descriptor_count: set_count,
            });
        }
    }
    sizes
}

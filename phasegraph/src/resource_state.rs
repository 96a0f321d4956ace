use crate::{aspects_for_format, vk};

/// Synchronization scope and layout of an image at a point in the command stream.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResourceState {
    /// Stages that will access the resource.
    pub stages: vk::PipelineStageFlags2,
    /// Access flags for the resource.
    pub access: vk::AccessFlags2,
    /// Requested layout for the resource.
    pub layout: vk::ImageLayout,
}

impl ResourceState {
    pub const UNDEFINED: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::TOP_OF_PIPE,
        access: vk::AccessFlags2::NONE,
        layout: vk::ImageLayout::UNDEFINED,
    };
    /// Sampled by fragment shaders (material textures, composite inputs).
    pub const FRAGMENT_SHADER_READ: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    /// Sampled by compute or fragment shaders. Layout the scene pass leaves the HDR image in.
    pub const SHADER_READ: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw() | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
        ),
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    pub const COMPUTE_SHADER_READ: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    pub const COMPUTE_SHADER_WRITE: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
        layout: vk::ImageLayout::GENERAL,
    };
    pub const RAY_TRACING_WRITE: ResourceState = ResourceState {
        stages: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
        layout: vk::ImageLayout::GENERAL,
    };
}

/// Layout transition and memory dependency on a whole image (single mip, single layer).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect_mask: vk::ImageAspectFlags,
    pub src: ResourceState,
    pub dst: ResourceState,
}

impl ImageBarrier {
    pub fn new(image: vk::Image, format: vk::Format, src: ResourceState, dst: ResourceState) -> ImageBarrier {
        ImageBarrier {
            image,
            aspect_mask: aspects_for_format(format),
            src,
            dst,
        }
    }

    /// Transition from whatever the image contained before; previous contents are discarded.
    ///
    /// `after` are the stages that last read the image, possibly in an earlier frame. They must
    /// complete before the image is written again.
    pub fn discard(
        image: vk::Image,
        format: vk::Format,
        after: vk::PipelineStageFlags2,
        dst: ResourceState,
    ) -> ImageBarrier {
        let src = ResourceState {
            stages: after,
            ..ResourceState::UNDEFINED
        };
        ImageBarrier::new(image, format, src, dst)
    }

    pub(crate) fn to_vk(&self) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2 {
            src_stage_mask: self.src.stages,
            src_access_mask: self.src.access,
            dst_stage_mask: self.dst.stages,
            dst_access_mask: self.dst.access,
            old_layout: self.src.layout,
            new_layout: self.dst.layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: self.image,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: self.aspect_mask,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discard_waits_for_the_last_readers() {
        let barrier = ImageBarrier::discard(
            vk::Image::null(),
            vk::Format::R8G8B8A8_UNORM,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            ResourceState::COMPUTE_SHADER_WRITE,
        )
        .to_vk();
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::NONE);
        assert_eq!(barrier.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }
}

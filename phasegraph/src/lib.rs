//! Fixed-phase render graph.
//!
//! Stages are scheduled into four phases (`PrePass`, `ScenePass`, `Intermediate`, `CompositePass`)
//! and record their commands into a `CommandStream` that is later replayed onto a Vulkan command
//! buffer. The graph owns the HDR scene target, the scene and composite framebuffers, and the
//! per-frame material descriptor sets.

pub use ash::{self, vk};
pub use gpu_allocator::MemoryLocation;

pub use command::*;
pub use descriptor::*;
pub use device::*;
pub use error::*;
pub use frame::*;
pub use graph::*;
pub use material::*;
pub use phase::*;
pub use registry::*;
pub use render_target::*;
pub use resource_state::*;
pub use sampler::*;
pub use scene::*;
pub use settings::*;
pub use stage::{Stage, StageHandle, StageKey};

mod command;
mod descriptor;
mod device;
mod error;
mod frame;
mod graph;
mod material;
mod phase;
mod registry;
mod render_target;
mod resource_state;
mod sampler;
mod scene;
mod settings;
mod stage;
pub mod stages;

////////////////////////////////////////////////////////////////////////////////////////////////////

pub fn is_depth_and_stencil_format(fmt: vk::Format) -> bool {
    matches!(
        fmt,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    )
}

pub fn is_depth_only_format(fmt: vk::Format) -> bool {
    matches!(
        fmt,
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT
    )
}

pub fn is_stencil_only_format(fmt: vk::Format) -> bool {
    matches!(fmt, vk::Format::S8_UINT)
}

pub fn aspects_for_format(fmt: vk::Format) -> vk::ImageAspectFlags {
    if is_depth_only_format(fmt) {
        vk::ImageAspectFlags::DEPTH
    } else if is_stencil_only_format(fmt) {
        vk::ImageAspectFlags::STENCIL
    } else if is_depth_and_stencil_format(fmt) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspects_of_depth_formats() {
        assert_eq!(aspects_for_format(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspects_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspects_for_format(vk::Format::R16G16B16A16_SFLOAT),
            vk::ImageAspectFlags::COLOR
        );
    }
}

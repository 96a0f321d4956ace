use crate::{vk, Phase};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
    #[error("device memory allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),
    #[error("shared image `{0}` is not registered")]
    MissingSharedImage(String),
    #[error("no render pass set for phase {0:?}")]
    MissingRenderPass(Phase),
    #[error("unsupported sample count {0}")]
    UnsupportedSampleCount(u32),
    #[error("device extension {0} is not enabled")]
    MissingExtension(&'static str),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

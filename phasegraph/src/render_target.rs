//! Descriptions of the scene and composite render targets.
use crate::{aspects_for_format, vk, Error, Result};

/// One attachment of a single-subpass render pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AttachmentDesc {
    pub format: vk::Format,
    pub samples: u32,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentDesc {
    pub(crate) fn to_vk(&self) -> Result<vk::AttachmentDescription> {
        let has_stencil = aspects_for_format(self.format).contains(vk::ImageAspectFlags::STENCIL);
        let (stencil_load_op, stencil_store_op) = if has_stencil {
            (self.load_op, self.store_op)
        } else {
            (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
        };
        Ok(vk::AttachmentDescription {
            flags: vk::AttachmentDescriptionFlags::empty(),
            format: self.format,
            samples: sample_count_flags(self.samples)?,
            load_op: self.load_op,
            store_op: self.store_op,
            stencil_load_op,
            stencil_store_op,
            initial_layout: self.initial_layout,
            final_layout: self.final_layout,
        })
    }
}

/// A render pass with one subpass writing one color attachment, an optional depth-stencil
/// attachment and an optional resolve target for the color attachment.
///
/// Framebuffer attachments are ordered `[color, depth?, resolve?]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RenderPassDesc {
    pub color: AttachmentDesc,
    pub depth_stencil: Option<AttachmentDesc>,
    pub resolve: Option<AttachmentDesc>,
}

impl RenderPassDesc {
    pub fn attachment_count(&self) -> usize {
        1 + self.depth_stencil.is_some() as usize + self.resolve.is_some() as usize
    }
}

/// Formats and sample count of the scene render target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SceneTargetDesc {
    pub hdr_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: u32,
}

impl SceneTargetDesc {
    pub fn is_multisampled(&self) -> bool {
        self.samples > 1
    }

    /// Render pass description for the scene pass.
    ///
    /// The HDR image ends up in `SHADER_READ_ONLY_OPTIMAL`, which is what compute and composite
    /// stages sample from.
    pub fn render_pass_desc(&self) -> RenderPassDesc {
        let depth_stencil = Some(AttachmentDesc {
            format: self.depth_format,
            samples: self.samples,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        });
        let hdr = AttachmentDesc {
            format: self.hdr_format,
            samples: 1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        if self.is_multisampled() {
            RenderPassDesc {
                color: AttachmentDesc {
                    format: self.hdr_format,
                    samples: self.samples,
                    load_op: vk::AttachmentLoadOp::CLEAR,
                    store_op: vk::AttachmentStoreOp::DONT_CARE,
                    initial_layout: vk::ImageLayout::UNDEFINED,
                    final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                },
                depth_stencil,
                resolve: Some(AttachmentDesc {
                    load_op: vk::AttachmentLoadOp::DONT_CARE,
                    ..hdr
                }),
            }
        } else {
            RenderPassDesc {
                color: hdr,
                depth_stencil,
                resolve: None,
            }
        }
    }
}

/// Render pass description for the composite pass writing to a presentable image.
pub fn composite_render_pass_desc(output_format: vk::Format) -> RenderPassDesc {
    RenderPassDesc {
        color: AttachmentDesc {
            format: output_format,
            samples: 1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        },
        depth_stencil: None,
        resolve: None,
    }
}

/// Whether `count` is a sample count Vulkan can express (a power of two up to 64).
pub fn is_valid_sample_count(count: u32) -> bool {
    count.is_power_of_two() && count <= 64
}

pub(crate) fn sample_count_flags(count: u32) -> Result<vk::SampleCountFlags> {
    if is_valid_sample_count(count) {
        Ok(vk::SampleCountFlags::from_raw(count))
    } else {
        Err(Error::UnsupportedSampleCount(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(samples: u32) -> SceneTargetDesc {
        SceneTargetDesc {
            hdr_format: vk::Format::R16G16B16A16_SFLOAT,
            depth_format: vk::Format::D32_SFLOAT_S8_UINT,
            samples,
        }
    }

    #[test]
    fn single_sampled_scene_writes_hdr_directly() {
        let desc = scene(1).render_pass_desc();
        assert_eq!(desc.attachment_count(), 2);
        assert!(desc.resolve.is_none());
        assert_eq!(desc.color.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn multisampled_scene_resolves_into_hdr() {
        let desc = scene(4).render_pass_desc();
        assert_eq!(desc.attachment_count(), 3);
        assert_eq!(desc.color.samples, 4);
        assert_eq!(desc.depth_stencil.unwrap().samples, 4);
        let resolve = desc.resolve.unwrap();
        assert_eq!(resolve.samples, 1);
        assert_eq!(resolve.final_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn invalid_sample_counts_are_rejected() {
        assert_eq!(scene(8).render_pass_desc().color.to_vk().unwrap().samples, vk::SampleCountFlags::TYPE_8);
        for samples in [0, 3, 128] {
            let desc = scene(samples).render_pass_desc();
            assert!(matches!(
                desc.depth_stencil.unwrap().to_vk(),
                Err(Error::UnsupportedSampleCount(n)) if n == samples
            ));
        }
    }
}

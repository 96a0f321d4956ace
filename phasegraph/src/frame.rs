use crate::{vk, CommandStream, MaterialDescriptors, Scene};

/// Everything a stage needs to record one frame.
///
/// Built fresh by the caller every frame; all members are borrowed.
#[derive(Copy, Clone)]
pub struct FrameContext<'a> {
    /// Where stages record their commands.
    pub commands: &'a CommandStream,
    /// Frame-in-flight slot. Indexes per-frame resources (uniform buffers, descriptor sets).
    pub frame_index: usize,
    /// Index of the output (swapchain) image this frame renders to.
    pub image_index: usize,
    pub extent: vk::Extent2D,
    pub scene: &'a Scene,
    pub materials: &'a MaterialDescriptors,
}

impl<'a> FrameContext<'a> {
    /// Descriptor set for a primitive using `material`, or the default set if `None`.
    pub fn material_set(&self, material: Option<usize>) -> vk::DescriptorSet {
        self.materials.descriptor_set_for(self.frame_index, material)
    }
}

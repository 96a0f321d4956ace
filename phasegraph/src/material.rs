//! Per-material, per-frame descriptor sets.
//!
//! Every material set shares one layout:
//!
//! | binding | type                     | stages            |
//! |---------|--------------------------|-------------------|
//! | 0       | uniform buffer           | vertex + fragment |
//! | 1..=11  | combined image + sampler | fragment          |
//!
//! The grid holds, for each frame in flight, a default set followed by one set per material, all
//! allocated from a single pool.
use crate::{
    descriptor::pool_sizes_for, vk, Descriptor, DescriptorBinding, DescriptorWrite, DeviceRef, Result,
};
use tracing::debug;

/// Number of texture bindings in a material set.
pub const TEXTURE_SLOT_COUNT: usize = 11;

/// Binding of the per-frame uniform buffer.
pub const UNIFORM_BINDING: u32 = 0;

/// Texture slots of a material set, in binding order (binding = slot index + 1).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum TextureSlot {
    BaseColor = 0,
    Normal = 1,
    MetallicRoughness = 2,
    Emissive = 3,
    Occlusion = 4,
    /// Diffuse irradiance cube map.
    Irradiance = 5,
    /// Specular pre-filtered environment cube map.
    Prefiltered = 6,
    /// Split-sum BRDF lookup table.
    BrdfLut = 7,
    Iridescence = 8,
    IridescenceThickness = 9,
    Thickness = 10,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; TEXTURE_SLOT_COUNT] = [
        TextureSlot::BaseColor,
        TextureSlot::Normal,
        TextureSlot::MetallicRoughness,
        TextureSlot::Emissive,
        TextureSlot::Occlusion,
        TextureSlot::Irradiance,
        TextureSlot::Prefiltered,
        TextureSlot::BrdfLut,
        TextureSlot::Iridescence,
        TextureSlot::IridescenceThickness,
        TextureSlot::Thickness,
    ];

    pub const fn binding(self) -> u32 {
        self as u32 + 1
    }
}

/// An image view and the sampler to read it with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Texture {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// The 11 textures of one material, indexed by `TextureSlot`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MaterialTextures {
    pub textures: [Texture; TEXTURE_SLOT_COUNT],
}

impl MaterialTextures {
    /// A set using `texture` in every slot.
    pub fn filled(texture: Texture) -> MaterialTextures {
        MaterialTextures {
            textures: [texture; TEXTURE_SLOT_COUNT],
        }
    }

    /// Replaces the texture in `slot`.
    pub fn with(mut self, slot: TextureSlot, texture: Texture) -> MaterialTextures {
        self.textures[slot as usize] = texture;
        self
    }

    pub fn get(&self, slot: TextureSlot) -> Texture {
        self.textures[slot as usize]
    }
}

/// Bindings of the shared material set layout.
pub fn material_layout_bindings() -> Vec<DescriptorBinding> {
    let mut bindings = vec![DescriptorBinding::new(
        UNIFORM_BINDING,
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
    )];
    bindings.extend(TextureSlot::ALL.iter().map(|slot| {
        DescriptorBinding::new(
            slot.binding(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            vk::ShaderStageFlags::FRAGMENT,
        )
    }));
    bindings
}

/// The shared material layout and the `[frame][set]` grid allocated against it.
pub struct MaterialDescriptors {
    device: DeviceRef,
    layout: vk::DescriptorSetLayout,
    pool: Option<vk::DescriptorPool>,
    /// `sets[frame][0]` is the default set, `sets[frame][1 + material]` the set of `material`.
    sets: Vec<Vec<vk::DescriptorSet>>,
}

impl MaterialDescriptors {
    /// Creates the shared layout. No sets are allocated until `allocate`.
    pub fn new(device: DeviceRef) -> Result<MaterialDescriptors> {
        let layout = device.create_descriptor_set_layout(&material_layout_bindings())?;
        Ok(MaterialDescriptors {
            device,
            layout,
            pool: None,
            sets: Vec::new(),
        })
    }

    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn pool(&self) -> Option<vk::DescriptorPool> {
        self.pool
    }

    /// Rebuilds the whole grid.
    ///
    /// The previous pool is destroyed first, which invalidates every set handle obtained before
    /// this call. One frame is created per entry of `uniform_buffers`.
    ///
    /// If this fails, the grid is left empty.
    pub fn allocate(
        &mut self,
        default_textures: &MaterialTextures,
        material_textures: &[MaterialTextures],
        uniform_buffers: &[vk::DescriptorBufferInfo],
    ) -> Result<()> {
        self.destroy_pool();

        let frames_in_flight = uniform_buffers.len();
        let sets_per_frame = 1 + material_textures.len();
        let total_sets = (sets_per_frame * frames_in_flight) as u32;
        if total_sets == 0 {
            debug!("no frames in flight, material descriptor grid is empty");
            return Ok(());
        }

        let pool = self
            .device
            .create_descriptor_pool(total_sets, &pool_sizes_for(&material_layout_bindings(), total_sets))?;
        self.pool = Some(pool);

        let layouts = vec![self.layout; total_sets as usize];
        let sets = self.device.allocate_descriptor_sets(pool, &layouts)?;
        debug!(
            frames_in_flight,
            materials = material_textures.len(),
            total_sets,
            "allocated material descriptor sets"
        );

        let mut writes = Vec::with_capacity(sets.len() * (1 + TEXTURE_SLOT_COUNT));
        for (frame, frame_sets) in sets.chunks_exact(sets_per_frame).enumerate() {
            let textures = std::iter::once(default_textures).chain(material_textures.iter());
            for (&set, textures) in frame_sets.iter().zip(textures) {
                writes.push(DescriptorWrite::new(
                    set,
                    UNIFORM_BINDING,
                    Descriptor::UniformBuffer(uniform_buffers[frame]),
                ));
                for slot in TextureSlot::ALL {
                    let texture = textures.get(slot);
                    writes.push(DescriptorWrite::new(
                        set,
                        slot.binding(),
                        Descriptor::sampled(texture.view, texture.sampler),
                    ));
                }
            }
        }
        self.device.update_descriptor_sets(&writes);

        self.sets = sets.chunks_exact(sets_per_frame).map(<[_]>::to_vec).collect();
        Ok(())
    }

    pub fn frames_in_flight(&self) -> usize {
        self.sets.len()
    }

    pub fn material_count(&self) -> usize {
        self.sets.first().map_or(0, |frame| frame.len() - 1)
    }

    /// Total number of sets in the grid.
    pub fn set_count(&self) -> usize {
        self.sets.iter().map(Vec::len).sum()
    }

    /// # Panics
    ///
    /// If `frame` or `material` is out of range.
    pub fn material_descriptor_set(&self, frame: usize, material: usize) -> vk::DescriptorSet {
        self.sets[frame][1 + material]
    }

    /// # Panics
    ///
    /// If `frame` is out of range.
    pub fn default_descriptor_set(&self, frame: usize) -> vk::DescriptorSet {
        self.sets[frame][0]
    }

    /// The material set of `material` if any, the default set otherwise.
    pub fn descriptor_set_for(&self, frame: usize, material: Option<usize>) -> vk::DescriptorSet {
        match material {
            Some(material) => self.material_descriptor_set(frame, material),
            None => self.default_descriptor_set(frame),
        }
    }

    fn destroy_pool(&mut self) {
        self.sets.clear();
        if let Some(pool) = self.pool.take() {
            self.device.destroy_descriptor_pool(pool);
        }
    }

    /// Destroys the pool, then the layout. Safe to call more than once.
    pub(crate) fn destroy(&mut self) {
        self.destroy_pool();
        if self.layout != vk::DescriptorSetLayout::null() {
            self.device.destroy_descriptor_set_layout(self.layout);
            self.layout = vk::DescriptorSetLayout::null();
        }
    }
}

impl Drop for MaterialDescriptors {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_has_one_uniform_and_eleven_textures() {
        let bindings = material_layout_bindings();
        assert_eq!(bindings.len(), 12);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(
            bindings[0].stages,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        for (i, binding) in bindings[1..].iter().enumerate() {
            assert_eq!(binding.binding, i as u32 + 1);
            assert_eq!(binding.descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
            assert_eq!(binding.stages, vk::ShaderStageFlags::FRAGMENT);
        }
    }

    #[test]
    fn pool_is_sized_for_every_binding() {
        let sizes = pool_sizes_for(&material_layout_bindings(), 9);
        let uniform = sizes.iter().find(|s| s.ty == vk::DescriptorType::UNIFORM_BUFFER).unwrap();
        let samplers = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .unwrap();
        assert_eq!(uniform.descriptor_count, 9);
        assert_eq!(samplers.descriptor_count, 99);
    }

    #[test]
    fn slots_bind_after_the_uniform_buffer() {
        assert_eq!(TextureSlot::BaseColor.binding(), 1);
        assert_eq!(TextureSlot::Thickness.binding(), 11);
    }
}

//! Scene data handed to stages. Buffers are owned by the asset loader.
use crate::vk;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// A range of indices drawn with one material.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Primitive {
    pub first_index: u32,
    pub index_count: u32,
    pub vertex_offset: i32,
    /// Index into the material grid, or `None` for the default material.
    pub material: Option<usize>,
    pub alpha_mode: AlphaMode,
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_type: vk::IndexType,
    /// Column-major model matrix.
    pub transform: [f32; 16],
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub meshes: Vec<Mesh>,
}

pub const IDENTITY_TRANSFORM: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

//! Runtime toggles read by stages every frame.
//!
//! Settings are shared through `Rc` and mutated through `Cell`s, so a change made between two
//! frames (e.g. from a UI checkbox) is seen by the next `record` without any explicit update call.
use std::{cell::Cell, rc::Rc};

/// What the composite pass outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Default)]
#[repr(u32)]
pub enum DebugView {
    /// Tone-mapped final image.
    #[default]
    Final = 0,
    /// Linear HDR color without tone mapping.
    Hdr = 1,
    /// Bloom contribution only.
    Bloom = 2,
    /// Ray-traced shadow mask.
    RayTracing = 3,
}

#[derive(Debug)]
pub struct RenderSettings {
    pub ray_tracing: Cell<bool>,
    pub transparency: Cell<bool>,
    pub bloom: Cell<bool>,
    /// Blur radius of the bloom pass, in pixels.
    pub bloom_radius: Cell<f32>,
    pub bloom_strength: Cell<f32>,
    pub exposure: Cell<f32>,
    pub debug_view: Cell<DebugView>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            ray_tracing: Cell::new(false),
            transparency: Cell::new(true),
            bloom: Cell::new(true),
            bloom_radius: Cell::new(4.0),
            bloom_strength: Cell::new(0.04),
            exposure: Cell::new(1.0),
            debug_view: Cell::new(DebugView::Final),
        }
    }
}

pub type SharedSettings = Rc<RenderSettings>;

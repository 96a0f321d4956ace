use crate::{vk, FrameContext, GpuDevice, Phase, Result, SharedImageRegistry};
use std::{any::Any, fmt, marker::PhantomData};

slotmap::new_key_type! {
    /// Untyped identifier of a stage registered in a `RenderGraph`.
    pub struct StageKey;
}

/// A rendering technique invoked once per frame by the render graph.
///
/// # Render pass framing
///
/// Stages in `Phase::ScenePass` and `Phase::CompositePass` record inside a render pass opened by the
/// graph and must not begin or end one themselves. Stages in `Phase::PrePass` and `Phase::Intermediate`
/// get no framing and are responsible for the layout transitions of the images they touch.
///
/// # Borrowed state
///
/// Stages typically hold `Rc` handles to the settings and shared layouts they read at record time.
/// Raw handles of images published in the `SharedImageRegistry` are only valid until the next resize;
/// stages that cache them must refresh them in `on_resize`.
pub trait Stage {
    /// Name used for debug labels and access declarations. Not required to be unique.
    fn name(&self) -> &str;

    /// The phase this stage runs in. Must not change over the lifetime of the stage.
    fn phase(&self) -> Phase;

    /// Whether the stage runs this frame. Evaluated once per frame, before any recording in the phase.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Records the commands of this stage into `ctx.commands`.
    fn record(&self, ctx: &FrameContext);

    /// Called after the graph has recreated its size-dependent resources.
    ///
    /// Stages owning images sized to the output must recreate them here, and re-publish them in
    /// `images` if other stages read them.
    fn on_resize(
        &mut self,
        _device: &dyn GpuDevice,
        _extent: vk::Extent2D,
        _images: &mut SharedImageRegistry,
    ) -> Result<()> {
        Ok(())
    }
}

/// Object-safe extension of `Stage` used for storage and downcasting.
pub(crate) trait StageObject: Stage {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Stage + 'static> StageObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Typed handle to a stage registered in a `RenderGraph`, returned by `RenderGraph::add_stage`.
pub struct StageHandle<S> {
    pub(crate) key: StageKey,
    _marker: PhantomData<fn() -> S>,
}

impl<S> StageHandle<S> {
    pub(crate) fn new(key: StageKey) -> StageHandle<S> {
        StageHandle {
            key,
            _marker: PhantomData,
        }
    }

    pub fn key(&self) -> StageKey {
        self.key
    }
}

impl<S> Clone for StageHandle<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S> Copy for StageHandle<S> {}

impl<S> PartialEq for StageHandle<S> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<S> Eq for StageHandle<S> {}

impl<S> fmt::Debug for StageHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageHandle").field(&self.key).finish()
    }
}

//! Name-keyed table of images shared between stages.
use crate::{vk, Phase};
use fxhash::FxHashMap;

/// Borrowed handles of an image published under a name (e.g. `"hdr"`, `"depth_stencil"`).
///
/// The registry never owns these handles: replacing or removing an entry does not destroy anything.
#[derive(Copy, Clone, Debug)]
pub struct SharedImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    /// Sampler to read the image with, if the registrant provides one.
    pub sampler: Option<vk::Sampler>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

bitflags::bitflags! {
    /// How a stage intends to access a shared image.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct AccessIntent: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// One declared access to a shared image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccessRecord {
    pub stage: String,
    pub phase: Phase,
    pub intent: AccessIntent,
}

impl AccessRecord {
    pub fn new(stage: impl Into<String>, phase: Phase, intent: AccessIntent) -> AccessRecord {
        AccessRecord {
            stage: stage.into(),
            phase,
            intent,
        }
    }
}

/// Shared images plus the log of which stage intends to read or write them.
///
/// The access log is advisory: nothing in the graph inserts barriers from it.
#[derive(Debug, Default)]
pub struct SharedImageRegistry {
    images: FxHashMap<String, SharedImage>,
    accesses: FxHashMap<String, Vec<AccessRecord>>,
}

impl SharedImageRegistry {
    pub fn new() -> SharedImageRegistry {
        SharedImageRegistry::default()
    }

    /// Publishes `image` under `name`, returning the entry it replaces.
    ///
    /// The previous entry is not destroyed; that remains the responsibility of whoever registered it.
    pub fn set(&mut self, name: impl Into<String>, image: SharedImage) -> Option<SharedImage> {
        self.images.insert(name.into(), image)
    }

    pub fn get(&self, name: &str) -> Option<SharedImage> {
        self.images.get(name).copied()
    }

    /// Like `get`, but reports absence as an error.
    pub fn require(&self, name: &str) -> crate::Result<SharedImage> {
        self.get(name)
            .ok_or_else(|| crate::Error::MissingSharedImage(name.to_string()))
    }

    /// Removes the entry under `name` without destroying it.
    pub fn remove(&mut self, name: &str) -> Option<SharedImage> {
        self.images.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    /// Appends to the access log of `image_name`. Called once per stage at construction.
    pub fn declare_access(&mut self, image_name: &str, stage_name: &str, phase: Phase, intent: AccessIntent) {
        self.accesses
            .entry(image_name.to_string())
            .or_default()
            .push(AccessRecord::new(stage_name, phase, intent));
    }

    /// Accesses declared on `image_name`, in declaration order.
    pub fn access_records(&self, image_name: &str) -> &[AccessRecord] {
        self.accesses.get(image_name).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image(raw: u64) -> SharedImage {
        SharedImage {
            image: vk::Image::from_raw(raw),
            view: vk::ImageView::from_raw(raw),
            sampler: None,
            format: vk::Format::R16G16B16A16_SFLOAT,
            extent: vk::Extent2D { width: 16, height: 16 },
        }
    }

    #[test]
    fn set_replaces_without_consuming() {
        let mut registry = SharedImageRegistry::new();
        assert!(registry.get("hdr").is_none());
        assert!(registry.set("hdr", image(1)).is_none());
        let previous = registry.set("hdr", image(2)).unwrap();
        assert_eq!(previous.image, vk::Image::from_raw(1));
        assert_eq!(registry.get("hdr").unwrap().image, vk::Image::from_raw(2));
    }

    #[test]
    fn missing_image_is_reported_by_name() {
        let registry = SharedImageRegistry::new();
        match registry.require("depth_stencil") {
            Err(crate::Error::MissingSharedImage(name)) => assert_eq!(name, "depth_stencil"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn access_records_keep_declaration_order() {
        let mut registry = SharedImageRegistry::new();
        registry.declare_access("hdr", "StageA", Phase::ScenePass, AccessIntent::WRITE);
        registry.declare_access("hdr", "StageB", Phase::Intermediate, AccessIntent::READ);
        assert_eq!(
            registry.access_records("hdr"),
            &[
                AccessRecord::new("StageA", Phase::ScenePass, AccessIntent::WRITE),
                AccessRecord::new("StageB", Phase::Intermediate, AccessIntent::READ),
            ]
        );
        assert!(registry.access_records("bloom").is_empty());
    }

    #[test]
    fn access_log_survives_entry_replacement() {
        let mut registry = SharedImageRegistry::new();
        registry.set("hdr", image(1));
        registry.declare_access("hdr", "Composite", Phase::CompositePass, AccessIntent::READ);
        registry.set("hdr", image(2));
        registry.remove("hdr");
        assert_eq!(registry.access_records("hdr").len(), 1);
    }
}

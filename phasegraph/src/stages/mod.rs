//! Stages shipped with the crate.
//!
//! Pipelines and pipeline layouts are created by the application and handed to the stages, which
//! only record commands and own the images and descriptor sets specific to their technique.
mod bloom;
mod composite;
mod geometry;
mod ray_tracing;

pub use bloom::{BloomPipeline, BloomStage, BLOOM_IMAGE};
pub use composite::{CompositePipeline, CompositeStage};
pub use geometry::{GeometryPass, GeometryStage, MATERIAL_SET_INDEX};
pub use ray_tracing::{RayTracingPipelineInfo, RayTracingStage, RT_SHADOW_IMAGE};

use crate::{pool_sizes_for, vk, DescriptorBinding, DeviceRef, Result};

/// A pool and the sets allocated from it, owned by one stage.
struct StageDescriptors {
    device: DeviceRef,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl StageDescriptors {
    /// Allocates `count` sets of `set_layout`, whose shape is described by `bindings`.
    fn new(
        device: &DeviceRef,
        set_layout: vk::DescriptorSetLayout,
        bindings: &[DescriptorBinding],
        count: u32,
    ) -> Result<StageDescriptors> {
        let pool = device.create_descriptor_pool(count, &pool_sizes_for(bindings, count))?;
        let sets = match device.allocate_descriptor_sets(pool, &vec![set_layout; count as usize]) {
            Ok(sets) => sets,
            Err(err) => {
                device.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };
        Ok(StageDescriptors {
            device: device.clone(),
            pool,
            sets,
        })
    }
}

impl Drop for StageDescriptors {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

/// Number of `group_size` workgroups covering `n` invocations.
fn group_count(n: u32, group_size: u32) -> u32 {
    (n + group_size - 1) / group_size
}

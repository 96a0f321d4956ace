use crate::{
    push_constant_bytes, vk, AccessIntent, AlphaMode, FrameContext, Mesh, Phase, SharedImageRegistry, SharedSettings,
    Stage, DEPTH_STENCIL_IMAGE, HDR_IMAGE,
};

/// Index of the material descriptor set in the geometry pipeline layout.
pub const MATERIAL_SET_INDEX: u32 = 0;

/// Which primitives a `GeometryStage` draws.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GeometryPass {
    /// Opaque and alpha-masked primitives.
    Opaque,
    /// Alpha-blended primitives. Enabled when `settings.transparency` is set.
    Blend,
}

impl GeometryPass {
    pub fn draws(self, alpha_mode: AlphaMode) -> bool {
        match self {
            GeometryPass::Opaque => matches!(alpha_mode, AlphaMode::Opaque | AlphaMode::Mask),
            GeometryPass::Blend => alpha_mode == AlphaMode::Blend,
        }
    }
}

/// Draws the scene meshes into the scene render target.
///
/// The pipeline layout must have the material set layout at `MATERIAL_SET_INDEX` and a vertex
/// stage push constant range holding the mesh transform (16 floats).
pub struct GeometryStage {
    pass: GeometryPass,
    settings: SharedSettings,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GeometryStage {
    pub fn new(
        pass: GeometryPass,
        settings: SharedSettings,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        images: &mut SharedImageRegistry,
    ) -> GeometryStage {
        let stage = GeometryStage {
            pass,
            settings,
            pipeline,
            layout,
        };
        images.declare_access(HDR_IMAGE, stage.name(), Phase::ScenePass, AccessIntent::WRITE);
        images.declare_access(DEPTH_STENCIL_IMAGE, stage.name(), Phase::ScenePass, AccessIntent::READ_WRITE);
        stage
    }

    pub fn pass(&self) -> GeometryPass {
        self.pass
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Replaces the pipeline, e.g. after a shader reload. The new pipeline must be compatible with the
    /// layout given at construction.
    pub fn set_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipeline = pipeline;
    }

    fn record_mesh(&self, ctx: &FrameContext, mesh: &Mesh) {
        let cmd = ctx.commands;
        let mut bound = false;
        for primitive in mesh.primitives.iter().filter(|p| self.pass.draws(p.alpha_mode)) {
            if !bound {
                let transform: Vec<u32> = mesh.transform.iter().map(|v| v.to_bits()).collect();
                cmd.bind_vertex_buffer(0, mesh.vertex_buffer, 0);
                cmd.bind_index_buffer(mesh.index_buffer, 0, mesh.index_type);
                cmd.push_constants(
                    self.layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    &push_constant_bytes(&transform),
                );
                bound = true;
            }
            cmd.bind_descriptor_sets(
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                MATERIAL_SET_INDEX,
                &[ctx.material_set(primitive.material)],
            );
            cmd.draw_indexed(primitive.index_count, 1, primitive.first_index, primitive.vertex_offset, 0);
        }
    }
}

impl Stage for GeometryStage {
    fn name(&self) -> &str {
        match self.pass {
            GeometryPass::Opaque => "geometry_opaque",
            GeometryPass::Blend => "geometry_blend",
        }
    }

    fn phase(&self) -> Phase {
        Phase::ScenePass
    }

    fn is_enabled(&self) -> bool {
        match self.pass {
            GeometryPass::Opaque => true,
            GeometryPass::Blend => self.settings.transparency.get(),
        }
    }

    fn record(&self, ctx: &FrameContext) {
        ctx.commands
            .bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline);
        for mesh in ctx.scene.meshes.iter() {
            self.record_mesh(ctx, mesh);
        }
    }
}

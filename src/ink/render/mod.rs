pub mod gpu;
pub mod gpu_blend;
pub mod gpu_pipeline;
pub mod path_sync;
pub mod raster;
pub mod scene_graph;
pub mod tessellate;

use crate::ink::model::{NodeId, RenderNode};
use crate::ink::scene::Scene;
use crate::ink::settings::BackendKind;
pub use raster::RgbaFrame;

/// Called once per node drawn, in paint order.
pub type VisitHook = Box<dyn FnMut(NodeId)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { drawn: usize },
    /// No device yet; the frame was dropped without error.
    NotReady,
}

/// Backend contract. The façade forwards scene journal entries through
/// `add_node`/`remove_node`/`mark_dirty` and calls `present` once per frame.
pub trait Renderer {
    fn kind(&self) -> BackendKind;

    fn add_node(&mut self, node: &RenderNode);

    fn remove_node(&mut self, id: NodeId);

    fn mark_dirty(&mut self, node: &RenderNode);

    /// Drops every node the backend holds.
    fn clear_nodes(&mut self);

    fn resize(&mut self, width: u32, height: u32, scene: &Scene);

    fn present(&mut self, scene: &Scene) -> FrameOutcome;

    fn frame(&self) -> Option<&RgbaFrame>;

    fn supports_pixel_erase(&self) -> bool {
        true
    }

    fn set_visit_hook(&mut self, hook: Option<VisitHook>);

    fn take_visit_hook(&mut self) -> Option<VisitHook>;
}

#[derive(Default)]
pub(crate) struct HookSlot(Option<VisitHook>);

impl HookSlot {
    pub(crate) fn set(&mut self, hook: Option<VisitHook>) {
        self.0 = hook;
    }

    pub(crate) fn take(&mut self) -> Option<VisitHook> {
        self.0.take()
    }

    pub(crate) fn visit(&mut self, id: NodeId) {
        if let Some(hook) = self.0.as_mut() {
            hook(id);
        }
    }
}

impl std::fmt::Debug for HookSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HookSlot").field(&self.0.is_some()).finish()
    }
}

/// Builds a software backend; GPU kinds go through [`gpu::GpuProvider`].
pub fn software_renderer(kind: BackendKind, width: u32, height: u32) -> Option<Box<dyn Renderer>> {
    match kind {
        BackendKind::SceneGraph => Some(Box::new(scene_graph::SceneGraphRenderer::new(width, height))),
        BackendKind::PathSync => Some(Box::new(path_sync::PathSyncRenderer::new(width, height))),
        BackendKind::GpuBlend | BackendKind::GpuPipeline => None,
    }
}

/// Re-adds every live node after a backend switch or page change.
pub fn populate(renderer: &mut dyn Renderer, scene: &Scene) {
    renderer.clear_nodes();
    for node in scene.nodes() {
        renderer.add_node(node);
    }
}

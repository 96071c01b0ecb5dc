use crate::ink::model::{NodeId, RenderNode};
use crate::ink::render::raster::{node_color, CompositeMode, Coverage, RgbaFrame};
use crate::ink::render::{FrameOutcome, HookSlot, Renderer, VisitHook};
use crate::ink::scene::Scene;
use crate::ink::settings::BackendKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct Drawable {
    coverage: Coverage,
    color: [f32; 4],
    mode: CompositeMode,
    visible: bool,
}

impl Drawable {
    fn build(node: &RenderNode, width: u32, height: u32) -> Self {
        Self {
            coverage: Coverage::for_node(node, width, height),
            color: node_color(node),
            mode: CompositeMode::for_node(node),
            visible: node.is_visible(),
        }
    }
}

/// Retained backend: one cached drawable per node, rebuilt only when the
/// node changes.
#[derive(Debug)]
pub struct SceneGraphRenderer {
    frame: RgbaFrame,
    drawables: BTreeMap<NodeId, Drawable>,
    hook: HookSlot,
    rebuilds: u64,
}

impl SceneGraphRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaFrame::new(width, height),
            drawables: BTreeMap::new(),
            hook: HookSlot::default(),
            rebuilds: 0,
        }
    }

    pub fn node_count(&self) -> usize {
        self.drawables.len()
    }

    /// Drawables built since creation, including rebuilds after changes.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    fn insert(&mut self, node: &RenderNode) {
        let drawable = Drawable::build(node, self.frame.width(), self.frame.height());
        self.drawables.insert(node.id, drawable);
        self.rebuilds += 1;
    }
}

impl Renderer for SceneGraphRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::SceneGraph
    }

    fn add_node(&mut self, node: &RenderNode) {
        if !self.drawables.contains_key(&node.id) {
            self.insert(node);
        }
    }

    fn remove_node(&mut self, id: NodeId) {
        self.drawables.remove(&id);
    }

    fn mark_dirty(&mut self, node: &RenderNode) {
        self.insert(node);
    }

    fn clear_nodes(&mut self) {
        self.drawables.clear();
    }

    fn resize(&mut self, width: u32, height: u32, scene: &Scene) {
        self.frame.resize(width, height);
        self.drawables.clear();
        for node in scene.nodes() {
            self.insert(node);
        }
    }

    fn present(&mut self, _scene: &Scene) -> FrameOutcome {
        self.frame.clear();
        let mut drawn = 0;
        for (id, drawable) in &self.drawables {
            if !drawable.visible {
                continue;
            }
            self.hook.visit(*id);
            self.frame
                .composite(&drawable.coverage, drawable.color, drawable.mode);
            drawn += 1;
        }
        FrameOutcome::Presented { drawn }
    }

    fn frame(&self) -> Option<&RgbaFrame> {
        Some(&self.frame)
    }

    fn set_visit_hook(&mut self, hook: Option<VisitHook>) {
        self.hook.set(hook);
    }

    fn take_visit_hook(&mut self) -> Option<VisitHook> {
        self.hook.take()
    }
}

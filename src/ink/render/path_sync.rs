use crate::ink::model::{NodeId, NodeRole, RenderNode};
use crate::ink::render::raster::{node_color, CompositeMode, Coverage, RgbaFrame};
use crate::ink::render::{FrameOutcome, HookSlot, Renderer, VisitHook};
use crate::ink::scene::Scene;
use crate::ink::settings::BackendKind;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// SVG-style path data for a node: `M`/`L` commands, closed with `Z` for
/// filled outlines.
pub fn path_data(node: &RenderNode) -> String {
    let mut d = String::new();
    for (i, p) in node.points().iter().enumerate() {
        let cmd = if i == 0 { 'M' } else { 'L' };
        let _ = write!(d, "{}{cmd}{:.2} {:.2}", if i == 0 { "" } else { " " }, p.x, p.y);
    }
    if node.pfh && !d.is_empty() {
        d.push_str(" Z");
    }
    d
}

#[derive(Debug, Clone, Default)]
struct PathElement {
    d: String,
    coverage: Coverage,
    color: [f32; 4],
    mode: Option<CompositeMode>,
    visible: bool,
    dirty: bool,
}

/// One path element per stroke node. Geometry is regenerated lazily at
/// present time for elements flagged dirty. Pixel-eraser nodes have no
/// element.
#[derive(Debug)]
pub struct PathSyncRenderer {
    frame: RgbaFrame,
    paths: BTreeMap<NodeId, PathElement>,
    hook: HookSlot,
    regenerations: u64,
}

impl PathSyncRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaFrame::new(width, height),
            paths: BTreeMap::new(),
            hook: HookSlot::default(),
            regenerations: 0,
        }
    }

    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    pub fn path_data(&self, id: NodeId) -> Option<&str> {
        self.paths
            .get(&id)
            .filter(|p| !p.dirty)
            .map(|p| p.d.as_str())
    }

    pub fn regeneration_count(&self) -> u64 {
        self.regenerations
    }

    fn regenerate(&mut self, scene: &Scene) {
        let (width, height) = (self.frame.width(), self.frame.height());
        for (id, element) in self.paths.iter_mut().filter(|(_, e)| e.dirty) {
            let Some(node) = scene.get(*id) else {
                continue;
            };
            element.d = path_data(node);
            element.coverage = Coverage::for_node(node, width, height);
            element.color = node_color(node);
            element.mode = Some(CompositeMode::for_node(node));
            element.visible = node.is_visible();
            element.dirty = false;
            self.regenerations += 1;
        }
    }
}

impl Renderer for PathSyncRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::PathSync
    }

    fn add_node(&mut self, node: &RenderNode) {
        if node.role != NodeRole::Stroke {
            tracing::debug!(node = node.id.0, "path sync skips pixel eraser node");
            return;
        }
        self.paths.entry(node.id).or_insert_with(|| PathElement {
            dirty: true,
            ..PathElement::default()
        });
    }

    fn remove_node(&mut self, id: NodeId) {
        self.paths.remove(&id);
    }

    fn mark_dirty(&mut self, node: &RenderNode) {
        match self.paths.get_mut(&node.id) {
            Some(element) => element.dirty = true,
            None => self.add_node(node),
        }
    }

    fn clear_nodes(&mut self) {
        self.paths.clear();
    }

    fn resize(&mut self, width: u32, height: u32, _scene: &Scene) {
        self.frame.resize(width, height);
        for element in self.paths.values_mut() {
            element.dirty = true;
        }
    }

    fn present(&mut self, scene: &Scene) -> FrameOutcome {
        self.regenerate(scene);
        self.frame.clear();
        let mut drawn = 0;
        for (id, element) in &self.paths {
            let Some(mode) = element.mode.filter(|_| element.visible && !element.dirty) else {
                continue;
            };
            self.hook.visit(*id);
            self.frame.composite(&element.coverage, element.color, mode);
            drawn += 1;
        }
        FrameOutcome::Presented { drawn }
    }

    fn frame(&self) -> Option<&RgbaFrame> {
        Some(&self.frame)
    }

    fn supports_pixel_erase(&self) -> bool {
        false
    }

    fn set_visit_hook(&mut self, hook: Option<VisitHook>) {
        self.hook.set(hook);
    }

    fn take_visit_hook(&mut self) -> Option<VisitHook> {
        self.hook.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::model::{Color, Point};

    fn stroke(id: u64) -> RenderNode {
        RenderNode::new(NodeId(id), NodeRole::Stroke, 2.0, Color::rgba(0, 0, 0, 255), 1.0)
            .with_points(vec![Point::new(1.0, 2.0), Point::new(10.5, 2.0)])
    }

    #[test]
    fn path_data_uses_move_and_line_commands() {
        let mut node = stroke(1);
        assert_eq!(path_data(&node), "M1.00 2.00 L10.50 2.00");
        node.pfh = true;
        node.set_points(vec![
            Point::new(0.0, 0.0),
            Point::new(4.0, 0.0),
            Point::new(4.0, 4.0),
        ]);
        assert_eq!(path_data(&node), "M0.00 0.00 L4.00 0.00 L4.00 4.00 Z");
    }

    #[test]
    fn geometry_regenerates_only_when_dirty() {
        let mut scene = Scene::new();
        let node = stroke(1);
        scene.add_node(node.clone());
        let mut renderer = PathSyncRenderer::new(16, 16);
        renderer.add_node(&node);

        renderer.present(&scene);
        renderer.present(&scene);
        assert_eq!(renderer.regeneration_count(), 1);

        scene.push_point(NodeId(1), Point::new(10.5, 12.0));
        renderer.mark_dirty(scene.get(NodeId(1)).expect("node"));
        renderer.present(&scene);
        assert_eq!(renderer.regeneration_count(), 2);
        assert!(renderer
            .path_data(NodeId(1))
            .expect("path")
            .ends_with("L10.50 12.00"));
    }

    #[test]
    fn pixel_eraser_nodes_are_not_supported() {
        let mut renderer = PathSyncRenderer::new(16, 16);
        let eraser = RenderNode::new(NodeId(2), NodeRole::EraserPixel, 6.0, Color::default(), 1.0)
            .with_points(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        renderer.add_node(&eraser);
        assert_eq!(renderer.path_count(), 0);
        assert!(!renderer.supports_pixel_erase());
    }
}

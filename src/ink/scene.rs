use crate::ink::model::{GroupId, NodeId, Point, RenderNode};
use std::collections::HashMap;

/// Journal entry consumed by the façade to keep the active backend in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneChange {
    Added(NodeId),
    Removed(NodeId),
    Updated(NodeId),
}

/// Live nodes in paint order. Ids are allocated monotonically, so id order
/// is insertion order; nodes restored by undo return to their original slot.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    order: Vec<NodeId>,
    live: HashMap<NodeId, RenderNode>,
    changes: Vec<SceneChange>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.live.contains_key(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&RenderNode> {
        self.live.get(&id)
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    pub fn nodes(&self) -> impl Iterator<Item = &RenderNode> + '_ {
        self.order.iter().filter_map(|id| self.live.get(id))
    }

    pub fn snapshot(&self) -> Vec<RenderNode> {
        self.nodes().cloned().collect()
    }

    pub fn group_members(&self, group: GroupId) -> Vec<NodeId> {
        self.nodes()
            .filter(|node| node.group_id == Some(group))
            .map(|node| node.id)
            .collect()
    }

    /// Adding a node that is already live is a no-op.
    pub fn add_node(&mut self, node: RenderNode) -> bool {
        let id = node.id;
        if self.live.contains_key(&id) {
            return false;
        }
        match self.order.last() {
            Some(last) if *last > id => {
                let slot = self.order.binary_search(&id).unwrap_or_else(|slot| slot);
                self.order.insert(slot, id);
            }
            _ => self.order.push(id),
        }
        self.live.insert(id, node);
        self.changes.push(SceneChange::Added(id));
        true
    }

    pub fn add_nodes<I>(&mut self, nodes: I) -> usize
    where
        I: IntoIterator<Item = RenderNode>,
    {
        nodes
            .into_iter()
            .map(|node| self.add_node(node))
            .filter(|added| *added)
            .count()
    }

    pub fn remove_node(&mut self, id: NodeId) -> Option<RenderNode> {
        let node = self.live.remove(&id)?;
        if let Ok(slot) = self.order.binary_search(&id) {
            self.order.remove(slot);
        }
        self.changes.push(SceneChange::Removed(id));
        Some(node)
    }

    /// Removes every id that is live; unknown ids are skipped.
    pub fn remove_nodes(&mut self, ids: &[NodeId]) -> Vec<RenderNode> {
        ids.iter().filter_map(|id| self.remove_node(*id)).collect()
    }

    pub fn update_points(&mut self, id: NodeId, points: Vec<Point>) -> bool {
        let Some(node) = self.live.get_mut(&id) else {
            return false;
        };
        node.set_points(points);
        self.changes.push(SceneChange::Updated(id));
        true
    }

    pub fn push_point(&mut self, id: NodeId, point: Point) -> bool {
        let Some(node) = self.live.get_mut(&id) else {
            return false;
        };
        node.push_point(point);
        self.changes.push(SceneChange::Updated(id));
        true
    }

    /// Swaps in a new version of a live node, keeping its paint slot.
    pub fn replace_node(&mut self, node: RenderNode) -> bool {
        let id = node.id;
        let Some(slot) = self.live.get_mut(&id) else {
            return false;
        };
        *slot = node;
        self.changes.push(SceneChange::Updated(id));
        true
    }

    pub fn drain_changes(&mut self) -> Vec<SceneChange> {
        std::mem::take(&mut self.changes)
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}

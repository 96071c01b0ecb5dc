use crate::ink::model::{NodeId, RenderNode};
use crate::ink::scene::Scene;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Add,
    Remove,
}

impl ActionKind {
    pub fn inverse(self) -> Self {
        match self {
            ActionKind::Add => ActionKind::Remove,
            ActionKind::Remove => ActionKind::Add,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub nodes: Vec<RenderNode>,
}

impl Action {
    pub fn add(nodes: Vec<RenderNode>) -> Self {
        Self {
            kind: ActionKind::Add,
            nodes,
        }
    }

    pub fn remove(nodes: Vec<RenderNode>) -> Self {
        Self {
            kind: ActionKind::Remove,
            nodes,
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|node| node.id).collect()
    }

    fn apply_as(&self, kind: ActionKind, scene: &mut Scene) {
        match kind {
            ActionKind::Add => {
                scene.add_nodes(self.nodes.iter().cloned());
            }
            ActionKind::Remove => {
                scene.remove_nodes(&self.node_ids());
            }
        }
    }

    pub fn apply(&self, scene: &mut Scene) {
        self.apply_as(self.kind, scene);
    }

    pub fn revert(&self, scene: &mut Scene) {
        self.apply_as(self.kind.inverse(), scene);
    }
}

/// Linear action log with a cursor; everything at or past the cursor is the
/// redo tail.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct History {
    actions: Vec<Action>,
    cursor: usize,
}

impl History {
    /// Records an action that has already been applied to the scene. Empty
    /// actions are dropped.
    pub fn push(&mut self, action: Action) -> bool {
        if action.nodes.is_empty() {
            return false;
        }
        self.actions.truncate(self.cursor);
        self.actions.push(action);
        self.cursor = self.actions.len();
        true
    }

    pub fn undo(&mut self, scene: &mut Scene) -> Option<&Action> {
        if self.cursor == 0 {
            return None;
        }
        self.cursor -= 1;
        let action = &self.actions[self.cursor];
        action.revert(scene);
        Some(action)
    }

    pub fn redo(&mut self, scene: &mut Scene) -> Option<&Action> {
        let action = self.actions.get(self.cursor)?;
        action.apply(scene);
        self.cursor += 1;
        Some(action)
    }

    /// Removes every committed live node as one undoable action. Nodes in
    /// `keep` (provisional ink of active captures) stay on the canvas.
    pub fn clear(&mut self, scene: &mut Scene, keep: &HashSet<NodeId>) -> bool {
        let committed: Vec<RenderNode> = scene
            .nodes()
            .filter(|n| !keep.contains(&n.id))
            .cloned()
            .collect();
        if committed.is_empty() {
            return false;
        }
        let action = Action::remove(committed);
        action.apply(scene);
        self.push(action)
    }

    /// Rewrites stored copies of `node` so undo/redo restore its current geometry.
    pub fn refresh_node(&mut self, node: &RenderNode) {
        for stored in self.actions.iter_mut().flat_map(|a| a.nodes.iter_mut()) {
            if stored.id == node.id {
                *stored = node.clone();
            }
        }
    }

    pub fn undo_len(&self) -> usize {
        self.cursor
    }

    pub fn redo_len(&self) -> usize {
        self.actions.len() - self.cursor
    }

    /// The applied prefix of the log, oldest first.
    pub fn applied(&self) -> &[Action] {
        &self.actions[..self.cursor]
    }
}

use crate::ink::history::History;
use crate::ink::model::{GroupId, NodeId};
use crate::ink::scene::Scene;
use crate::ink::session::{BakeJob, SessionManager};
use std::collections::VecDeque;

/// Scene and history of one logical page.
#[derive(Debug, Default)]
pub struct Page {
    pub scene: Scene,
    pub history: History,
}

/// Everything the input controller and renderers mutate, passed explicitly
/// instead of living in statics.
#[derive(Debug)]
pub struct EngineState {
    pub sessions: SessionManager,
    pub scene: Scene,
    pub history: History,
    next_node: u64,
    next_group: u64,
    bake_queue: VecDeque<BakeJob>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            sessions: SessionManager::default(),
            scene: Scene::new(),
            history: History::default(),
            next_node: 1,
            next_group: 1,
            bake_queue: VecDeque::new(),
        }
    }
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn next_group_id(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    pub fn queue_bake(&mut self, job: BakeJob) {
        self.bake_queue.push_back(job);
    }

    pub fn pending_bakes(&self) -> usize {
        self.bake_queue.len()
    }

    pub fn take_bake_jobs(&mut self) -> Vec<BakeJob> {
        self.bake_queue.drain(..).collect()
    }

    /// Installs `page` as the current scene/history and hands back the
    /// previous one. Id counters are shared across pages.
    pub fn swap_page(&mut self, page: Page) -> Page {
        let previous = Page {
            scene: std::mem::replace(&mut self.scene, page.scene),
            history: std::mem::replace(&mut self.history, page.history),
        };
        self.bake_queue.clear();
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_independent() {
        let mut state = EngineState::new();
        assert_eq!(state.next_node_id(), NodeId(1));
        assert_eq!(state.next_node_id(), NodeId(2));
        assert_eq!(state.next_group_id(), GroupId(1));
        assert_eq!(state.next_node_id(), NodeId(3));
    }

    #[test]
    fn swap_page_keeps_id_counters() {
        let mut state = EngineState::new();
        state.next_node_id();
        let previous = state.swap_page(Page::default());
        assert!(previous.scene.is_empty());
        assert_eq!(state.next_node_id(), NodeId(2));
    }
}

use crate::ink::geometry::optimize_polyline;
use crate::ink::history::Action;
use crate::ink::input::{InputController, InputOutcome, PointerEnd, PointerEvent};
use crate::ink::model::{NodeRole, RenderNode};
use crate::ink::render::gpu::{BoxedDevice, DeviceRequest, GpuInitState, GpuProvider, RequestPoll};
use crate::ink::render::gpu_blend::GpuBlendRenderer;
use crate::ink::render::gpu_pipeline::GpuPipelineRenderer;
use crate::ink::render::{populate, software_renderer, FrameOutcome, Renderer, RgbaFrame, VisitHook};
use crate::ink::scene::{Scene, SceneChange};
use crate::ink::session::PointerId;
use crate::ink::settings::{BackendKind, InkSettings};
use crate::ink::state::{EngineState, Page};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Live nodes of a page in paint order plus the applied op-log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageExport {
    pub page: usize,
    pub nodes: Vec<RenderNode>,
    pub ops: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub requested: BackendKind,
    pub active: Option<BackendKind>,
    pub gpu: GpuInitState,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Revisions {
    undo: u64,
    redo: u64,
    clear: u64,
    optimize: u64,
}

impl Revisions {
    fn of(settings: &InkSettings) -> Self {
        Self {
            undo: settings.undo_revision,
            redo: settings.redo_revision,
            clear: settings.clear_revision,
            optimize: settings.optimize_revision,
        }
    }
}

enum BackendSlot {
    Ready(Box<dyn Renderer>),
    Pending {
        kind: BackendKind,
        request: DeviceRequest,
    },
}

/// Entry point for hosts: owns the ink state, the input controller and the
/// active backend, and keeps the backend in sync with the scene.
pub struct InkEngine {
    state: EngineState,
    input: InputController,
    settings: InkSettings,
    provider: Box<dyn GpuProvider>,
    backend: BackendSlot,
    status: BackendStatus,
    size: (u32, u32),
    frame_pending: bool,
    seen: Revisions,
    page: usize,
    pages: BTreeMap<usize, Page>,
    parked_hook: Option<VisitHook>,
}

impl std::fmt::Debug for InkEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InkEngine")
            .field("status", &self.status)
            .field("page", &self.page)
            .field("nodes", &self.state.scene.len())
            .finish_non_exhaustive()
    }
}

impl InkEngine {
    pub fn new(
        mut settings: InkSettings,
        width: u32,
        height: u32,
        provider: Box<dyn GpuProvider>,
    ) -> Self {
        if settings.sanitize() {
            tracing::warn!("ink settings were out of range and have been clamped");
        }
        let requested = settings.backend;
        let mut engine = Self {
            state: EngineState::new(),
            input: InputController::new(settings.clone()),
            seen: Revisions::of(&settings),
            settings,
            provider,
            backend: BackendSlot::Pending {
                kind: requested,
                request: DeviceRequest::failed(anyhow::anyhow!("backend not created")),
            },
            status: BackendStatus {
                requested,
                active: None,
                gpu: GpuInitState::Uninitialized,
                fallback_reason: None,
            },
            size: (width, height),
            frame_pending: false,
            page: 0,
            pages: BTreeMap::new(),
            parked_hook: None,
        };
        engine.switch_backend(requested);
        engine
    }

    pub fn settings(&self) -> &InkSettings {
        &self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.state.scene
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn backend_status(&self) -> BackendStatus {
        self.status.clone()
    }

    pub fn frame_pending(&self) -> bool {
        self.frame_pending
    }

    pub fn frame(&self) -> Option<&RgbaFrame> {
        match &self.backend {
            BackendSlot::Ready(renderer) => renderer.frame(),
            BackendSlot::Pending { .. } => None,
        }
    }

    /// Applies a new settings value. Tool fields affect sessions started after
    /// this call; each changed revision counter fires its command once.
    pub fn apply_settings(&mut self, mut settings: InkSettings) {
        if settings.sanitize() {
            tracing::warn!("ink settings were out of range and have been clamped");
        }
        let backend_changed = settings.backend != self.settings.backend;
        self.input.set_settings(&settings);
        let revisions = Revisions::of(&settings);
        self.settings = settings;

        if backend_changed {
            self.switch_backend(self.settings.backend);
        }
        if revisions.undo != self.seen.undo {
            self.seen.undo = revisions.undo;
            self.undo();
        }
        if revisions.redo != self.seen.redo {
            self.seen.redo = revisions.redo;
            self.redo();
        }
        if revisions.clear != self.seen.clear {
            self.seen.clear = revisions.clear;
            self.clear();
        }
        if revisions.optimize != self.seen.optimize {
            self.seen.optimize = revisions.optimize;
            self.optimize_now();
        }
    }

    pub fn pointer_down(&mut self, pointer_id: PointerId, x: f32, y: f32, time_ms: f64) -> InputOutcome {
        let outcome = self
            .input
            .pointer_down(&mut self.state, PointerEvent::new(pointer_id, x, y, time_ms));
        self.after_input(outcome)
    }

    pub fn pointer_move(&mut self, pointer_id: PointerId, x: f32, y: f32, time_ms: f64) -> InputOutcome {
        let outcome = self
            .input
            .pointer_move(&mut self.state, PointerEvent::new(pointer_id, x, y, time_ms));
        self.after_input(outcome)
    }

    pub fn pointer_end(&mut self, pointer_id: PointerId, end: PointerEnd) -> InputOutcome {
        let outcome = self.input.pointer_end(&mut self.state, pointer_id, end);
        self.after_input(outcome)
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.input.cancel_all(&mut self.state);
        if cancelled > 0 {
            self.request_frame();
        }
        cancelled
    }

    fn after_input(&mut self, outcome: InputOutcome) -> InputOutcome {
        if outcome != InputOutcome::Ignored {
            self.request_frame();
        }
        outcome
    }

    pub fn run_pending_bakes(&mut self) -> usize {
        let applied = self.input.run_pending_bakes(&mut self.state);
        if applied > 0 {
            self.request_frame();
        }
        applied
    }

    /// Schedules a frame. Returns false when one is already pending.
    pub fn request_frame(&mut self) -> bool {
        if self.frame_pending {
            return false;
        }
        self.frame_pending = true;
        true
    }

    /// Frame callback: resolves a pending GPU device, syncs scene changes
    /// into the backend and presents.
    pub fn on_frame(&mut self) -> FrameOutcome {
        self.frame_pending = false;
        self.poll_device();
        self.sync_backend();
        match &mut self.backend {
            BackendSlot::Ready(renderer) => renderer.present(&self.state.scene),
            BackendSlot::Pending { kind, .. } => {
                tracing::debug!(backend = kind.as_label(), "frame skipped, device not ready");
                FrameOutcome::NotReady
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        let undone = self.state.history.undo(&mut self.state.scene).is_some();
        if undone {
            self.request_frame();
        }
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = self.state.history.redo(&mut self.state.scene).is_some();
        if redone {
            self.request_frame();
        }
        redone
    }

    pub fn clear(&mut self) -> bool {
        let provisional = self.state.sessions.live_nodes();
        let cleared = self
            .state
            .history
            .clear(&mut self.state.scene, &provisional);
        if cleared {
            self.request_frame();
        }
        cleared
    }

    /// Simplifies every finished centerline stroke in place. Ids are kept
    /// and stored history copies are refreshed. Returns the nodes rewritten.
    pub fn optimize_now(&mut self) -> usize {
        let provisional = self.state.sessions.live_nodes();
        let rewritten: Vec<RenderNode> = self
            .state
            .scene
            .nodes()
            .filter(|n| n.role == NodeRole::Stroke && !n.pfh && !provisional.contains(&n.id))
            .filter_map(|n| {
                let simplified = optimize_polyline(n.points(), n.stroke_width);
                (simplified.len() < n.points().len()).then(|| {
                    let mut node = n.clone();
                    node.set_points(simplified);
                    node
                })
            })
            .collect();

        for node in &rewritten {
            self.state.scene.replace_node(node.clone());
            self.state.history.refresh_node(node);
        }
        if !rewritten.is_empty() {
            tracing::debug!(nodes = rewritten.len(), "optimized strokes");
            self.request_frame();
        }
        rewritten.len()
    }

    /// Switches to another page, finalizing in-progress strokes first. Pages
    /// keep their own scene and history.
    pub fn set_page(&mut self, page: usize) -> bool {
        if page == self.page {
            return false;
        }
        self.cancel_all();
        self.sync_backend();
        let incoming = self.pages.remove(&page).unwrap_or_default();
        let previous = self.state.swap_page(incoming);
        self.pages.insert(self.page, previous);
        self.page = page;
        self.state.scene.drain_changes();
        if let BackendSlot::Ready(renderer) = &mut self.backend {
            populate(renderer.as_mut(), &self.state.scene);
        }
        tracing::info!(page, nodes = self.state.scene.len(), "page switched");
        self.request_frame();
        true
    }

    pub fn export_page(&self) -> PageExport {
        PageExport {
            page: self.page,
            nodes: self.state.scene.snapshot(),
            ops: self.state.history.applied().to_vec(),
        }
    }

    pub fn export_page_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export_page())
            .with_context(|| format!("serializing page {}", self.page))
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.size == (width, height) {
            return;
        }
        self.size = (width, height);
        self.sync_backend();
        if let BackendSlot::Ready(renderer) = &mut self.backend {
            renderer.resize(width, height, &self.state.scene);
        }
        self.request_frame();
    }

    /// Installs a hook called for every node drawn. The hook survives backend
    /// switches.
    pub fn set_visit_hook(&mut self, hook: Option<VisitHook>) {
        match &mut self.backend {
            BackendSlot::Ready(renderer) => renderer.set_visit_hook(hook),
            BackendSlot::Pending { .. } => self.parked_hook = hook,
        }
    }

    fn switch_backend(&mut self, kind: BackendKind) {
        if let BackendSlot::Ready(renderer) = &mut self.backend {
            if let Some(hook) = renderer.take_visit_hook() {
                self.parked_hook = Some(hook);
            }
        }
        self.state.scene.drain_changes();
        self.status.requested = kind;
        self.status.fallback_reason = None;
        self.input.set_pixel_erase_supported(kind != BackendKind::PathSync);

        let (width, height) = self.size;
        match software_renderer(kind, width, height) {
            Some(renderer) => {
                self.status.gpu = GpuInitState::Uninitialized;
                self.install(renderer);
            }
            None => {
                self.status.gpu = GpuInitState::Initializing;
                self.status.active = None;
                self.backend = BackendSlot::Pending {
                    kind,
                    request: self.provider.request_device(width, height),
                };
                self.poll_device();
            }
        }
        tracing::info!(
            requested = kind.as_label(),
            active = self.status.active.map(BackendKind::as_label),
            "backend selected"
        );
    }

    fn install(&mut self, mut renderer: Box<dyn Renderer>) {
        populate(renderer.as_mut(), &self.state.scene);
        if let Some(hook) = self.parked_hook.take() {
            renderer.set_visit_hook(Some(hook));
        }
        self.input
            .set_pixel_erase_supported(renderer.supports_pixel_erase());
        self.status.active = Some(renderer.kind());
        self.backend = BackendSlot::Ready(renderer);
        self.request_frame();
    }

    fn poll_device(&mut self) {
        let (kind, poll) = match &mut self.backend {
            BackendSlot::Pending { kind, request } => (*kind, request.poll()),
            BackendSlot::Ready(_) => return,
        };
        match poll {
            RequestPoll::Pending => {}
            RequestPoll::Ready(device) => match gpu_renderer(kind, device) {
                Ok(renderer) => {
                    tracing::info!(backend = kind.as_label(), "gpu device ready");
                    self.status.gpu = GpuInitState::Ready;
                    self.install(renderer);
                }
                Err(err) => self.fall_back(err),
            },
            RequestPoll::Failed(err) => self.fall_back(err),
        }
    }

    fn fall_back(&mut self, err: anyhow::Error) {
        tracing::warn!(error = %format!("{err:#}"), "gpu backend unavailable, falling back to scene graph");
        self.status.gpu = GpuInitState::Failed;
        self.status.fallback_reason = Some(format!("{err:#}"));
        let (width, height) = self.size;
        if let Some(renderer) = software_renderer(BackendKind::SceneGraph, width, height) {
            self.state.scene.drain_changes();
            self.install(renderer);
        }
    }

    fn sync_backend(&mut self) {
        let changes = self.state.scene.drain_changes();
        let BackendSlot::Ready(renderer) = &mut self.backend else {
            return;
        };
        let scene = &self.state.scene;
        for change in changes {
            match change {
                SceneChange::Added(id) => {
                    if let Some(node) = scene.get(id) {
                        renderer.add_node(node);
                    }
                }
                SceneChange::Removed(id) => renderer.remove_node(id),
                SceneChange::Updated(id) => {
                    if let Some(node) = scene.get(id) {
                        renderer.mark_dirty(node);
                    }
                }
            }
        }
    }
}

fn gpu_renderer(kind: BackendKind, device: BoxedDevice) -> Result<Box<dyn Renderer>> {
    match kind {
        BackendKind::GpuPipeline => Ok(Box::new(GpuPipelineRenderer::new(device)?)),
        _ => Ok(Box::new(GpuBlendRenderer::new(device))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::history::ActionKind;
    use crate::ink::render::gpu::{NoGpuProvider, SoftwareGpuProvider};
    use crate::ink::settings::Tool;

    fn engine(backend: BackendKind) -> InkEngine {
        let mut settings = InkSettings::default();
        settings.backend = backend;
        InkEngine::new(settings, 64, 64, Box::new(SoftwareGpuProvider))
    }

    fn stroke(engine: &mut InkEngine, pointer: PointerId, y: f32) {
        engine.pointer_down(pointer, 4.0, y, 0.0);
        for i in 1..=10 {
            engine.pointer_move(pointer, 4.0 + i as f32 * 5.0, y, i as f64 * 10.0);
        }
        engine.pointer_end(pointer, PointerEnd::Up);
    }

    #[test]
    fn frames_are_coalesced() {
        let mut engine = engine(BackendKind::SceneGraph);
        engine.on_frame();
        assert!(engine.request_frame());
        assert!(!engine.request_frame());
        engine.on_frame();
        assert!(!engine.frame_pending());
    }

    #[test]
    fn revision_counters_fire_once() {
        let mut engine = engine(BackendKind::SceneGraph);
        stroke(&mut engine, 1, 10.0);
        stroke(&mut engine, 2, 30.0);

        let mut settings = engine.settings().clone();
        settings.undo_revision += 1;
        engine.apply_settings(settings.clone());
        assert_eq!(engine.scene().len(), 1);
        engine.apply_settings(settings.clone());
        assert_eq!(engine.scene().len(), 1);

        settings.redo_revision += 1;
        settings.clear_revision += 1;
        engine.apply_settings(settings.clone());
        assert!(engine.scene().is_empty());
        assert_eq!(engine.state().history.undo_len(), 3);
    }

    #[test]
    fn gpu_failure_falls_back_without_losing_ink() {
        let mut settings = InkSettings::default();
        settings.backend = BackendKind::GpuBlend;
        let mut engine = InkEngine::new(settings, 64, 64, Box::new(NoGpuProvider));
        let status = engine.backend_status();
        assert_eq!(status.active, Some(BackendKind::SceneGraph));
        assert_eq!(status.gpu, GpuInitState::Failed);
        assert!(status.fallback_reason.is_some());

        stroke(&mut engine, 1, 20.0);
        assert_eq!(engine.on_frame(), FrameOutcome::Presented { drawn: 1 });
    }

    #[test]
    fn path_sync_turns_pixel_erase_into_stroke_erase() {
        let mut engine = engine(BackendKind::PathSync);
        stroke(&mut engine, 1, 20.0);

        let mut settings = engine.settings().clone();
        settings.tool = Tool::Eraser;
        settings.eraser_kind = crate::ink::settings::EraserKind::Pixel;
        engine.apply_settings(settings);
        engine.pointer_down(2, 20.0, 20.0, 200.0);
        let outcome = engine.pointer_end(2, PointerEnd::Up);
        assert_eq!(outcome, InputOutcome::Finalized(Some(ActionKind::Remove)));
        assert!(engine.scene().is_empty());
    }

    #[test]
    fn optimize_now_keeps_ids_and_undo_restores_optimized_geometry() {
        let mut engine = engine(BackendKind::SceneGraph);
        stroke(&mut engine, 1, 20.0);
        let before = engine.scene().snapshot();
        assert_eq!(engine.optimize_now(), 1);
        let after = engine.scene().snapshot();
        assert_eq!(after[0].id, before[0].id);
        assert!(after[0].points().len() < before[0].points().len());

        engine.undo();
        engine.redo();
        assert_eq!(engine.scene().snapshot(), after);
    }

    #[test]
    fn pages_keep_separate_scenes() {
        let mut engine = engine(BackendKind::SceneGraph);
        stroke(&mut engine, 1, 20.0);
        assert!(engine.set_page(1));
        assert!(engine.scene().is_empty());
        stroke(&mut engine, 1, 40.0);
        assert!(engine.set_page(0));
        assert_eq!(engine.scene().len(), 1);
        assert_eq!(engine.export_page().ops.len(), 1);
        assert!(!engine.set_page(0));
    }

    #[test]
    fn export_serializes_nodes_and_ops() {
        let mut engine = engine(BackendKind::SceneGraph);
        stroke(&mut engine, 1, 20.0);
        let json = engine.export_page_json().expect("export");
        let decoded: PageExport = serde_json::from_str(&json).expect("decode");
        assert_eq!(decoded.nodes.len(), 1);
        assert_eq!(decoded.ops[0].kind, ActionKind::Add);
    }
}

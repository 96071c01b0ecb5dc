use crate::ink::geometry::{
    bake, bake_with_tail, optimize_polyline, outline, point_in_polygon, point_segment_distance_sq,
    polyline_length, sanitize, sanitize_timed, segment_by_width, segment_target_len,
    split_on_jumps, width_profile, WidthRun,
};
use crate::ink::history::{Action, ActionKind};
use crate::ink::model::{Color, NodeId, NodeRole, Point, RenderNode};
use crate::ink::scene::Scene;
use crate::ink::session::{CaptureSession, PointerId, BAKE_TAIL_POINTS};
use crate::ink::settings::{EraserKind, InkSettings, NibMode, OptimizeMode, Tool, ToolSnapshot};
use crate::ink::state::EngineState;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: PointerId,
    pub position: Point,
    pub time_ms: f64,
}

impl PointerEvent {
    pub fn new(pointer_id: PointerId, x: f32, y: f32, time_ms: f64) -> Self {
        Self {
            pointer_id,
            position: Point::new(x, y),
            time_ms,
        }
    }

    fn is_well_formed(&self) -> bool {
        self.position.is_finite() && self.time_ms.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEnd {
    Up,
    Leave,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Ignored,
    Started,
    Updated,
    Finalized(Option<ActionKind>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureMode {
    Draw,
    PixelErase,
    StrokeErase,
}

fn capture_mode(tool: &ToolSnapshot) -> Option<CaptureMode> {
    match (tool.tool, tool.eraser_kind) {
        (Tool::Mouse, _) => None,
        (Tool::Pen, _) => Some(CaptureMode::Draw),
        (Tool::Eraser, EraserKind::Pixel) => Some(CaptureMode::PixelErase),
        (Tool::Eraser, EraserKind::Stroke) => Some(CaptureMode::StrokeErase),
    }
}

/// Pointer-event state machine. Owns only tool configuration; all ink state
/// lives in the [`EngineState`] handed to each call.
#[derive(Debug, Clone)]
pub struct InputController {
    settings: InkSettings,
    pixel_erase_supported: bool,
    optimize_once_armed: bool,
}

impl InputController {
    pub fn new(settings: InkSettings) -> Self {
        let optimize_once_armed = settings.optimize == OptimizeMode::Once;
        Self {
            settings,
            pixel_erase_supported: true,
            optimize_once_armed,
        }
    }

    pub fn settings(&self) -> &InkSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: &InkSettings) {
        if settings.optimize == OptimizeMode::Once && self.settings.optimize != OptimizeMode::Once {
            self.optimize_once_armed = true;
        }
        self.settings = settings.clone();
    }

    /// Backends that cannot composite destructively get stroke erasing instead.
    pub fn set_pixel_erase_supported(&mut self, supported: bool) {
        self.pixel_erase_supported = supported;
    }

    pub fn effective_snapshot(&self) -> ToolSnapshot {
        let mut snapshot = self.settings.snapshot();
        if !self.pixel_erase_supported && snapshot.eraser_kind == EraserKind::Pixel {
            snapshot.eraser_kind = EraserKind::Stroke;
        }
        snapshot
    }

    pub fn pointer_down(&mut self, state: &mut EngineState, event: PointerEvent) -> InputOutcome {
        let snapshot = self.effective_snapshot();
        let Some(mode) = capture_mode(&snapshot) else {
            return InputOutcome::Ignored;
        };
        if !event.is_well_formed() || state.sessions.is_active(event.pointer_id) {
            return InputOutcome::Ignored;
        }
        if !self.settings.multi_touch && state.sessions.active_count() > 0 {
            return InputOutcome::Ignored;
        }

        let group_id = state.next_group_id();
        let mut session = CaptureSession::new(
            event.pointer_id,
            group_id,
            snapshot,
            event.position,
            event.time_ms,
        );

        match mode {
            CaptureMode::StrokeErase => {
                let protected = state.sessions.live_nodes();
                erase_hits(&mut state.scene, &mut session, &[event.position], &protected);
            }
            CaptureMode::Draw | CaptureMode::PixelErase => {
                let id = state.next_node_id();
                let node = provisional_node(id, &session, mode, event.position);
                state.scene.add_node(node);
                session.live_node = Some(id);
            }
        }

        tracing::debug!(
            pointer = event.pointer_id,
            group = group_id.0,
            ?mode,
            "capture session started"
        );
        state.sessions.begin(session);
        InputOutcome::Started
    }

    pub fn pointer_move(&mut self, state: &mut EngineState, event: PointerEvent) -> InputOutcome {
        if !event.is_well_formed() {
            return InputOutcome::Ignored;
        }
        let protected = state.sessions.live_nodes();
        let Some(session) = state.sessions.get_mut(event.pointer_id) else {
            return InputOutcome::Ignored;
        };
        let Some(mode) = capture_mode(&session.tool) else {
            return InputOutcome::Ignored;
        };

        let appended = session.advance(
            event.position,
            event.time_ms,
            mode == CaptureMode::Draw,
        );

        match mode {
            CaptureMode::StrokeErase => {
                erase_hits(&mut state.scene, session, &appended, &protected);
            }
            CaptureMode::PixelErase | CaptureMode::Draw => {
                if let Some(id) = session.live_node {
                    for point in appended {
                        state.scene.push_point(id, point);
                    }
                }
                if mode == CaptureMode::Draw && session.should_schedule_bake(event.time_ms) {
                    let job = session.begin_bake(event.time_ms);
                    state.queue_bake(job);
                }
            }
        }
        InputOutcome::Updated
    }

    /// Finalizes the pointer's session. Safe to call any number of times for
    /// the same pointer: only the first signal does work.
    pub fn pointer_end(
        &mut self,
        state: &mut EngineState,
        pointer_id: PointerId,
        end: PointerEnd,
    ) -> InputOutcome {
        let Some(mut session) = state.sessions.take(pointer_id) else {
            return InputOutcome::Ignored;
        };
        if !session.begin_finalize() {
            return InputOutcome::Ignored;
        }
        let Some(mode) = capture_mode(&session.tool) else {
            return InputOutcome::Ignored;
        };

        let action = match mode {
            CaptureMode::StrokeErase => {
                let erased = session.take_erased();
                state.history.push(Action::remove(erased)).then_some(ActionKind::Remove)
            }
            CaptureMode::PixelErase => finalize_pixel_erase(state, &session),
            CaptureMode::Draw => {
                let optimize = match session.tool.optimize {
                    OptimizeMode::Off => false,
                    OptimizeMode::Always => true,
                    OptimizeMode::Once => std::mem::take(&mut self.optimize_once_armed),
                };
                finalize_stroke(state, &session, optimize)
            }
        };

        tracing::debug!(
            pointer = pointer_id,
            group = session.group_id.0,
            ?end,
            ?action,
            "capture session finalized"
        );
        InputOutcome::Finalized(action)
    }

    /// Ends every active session, e.g. before switching pages.
    pub fn cancel_all(&mut self, state: &mut EngineState) -> usize {
        let ids = state.sessions.pointer_ids();
        for id in &ids {
            self.pointer_end(state, *id, PointerEnd::Cancel);
        }
        ids.len()
    }

    /// Runs queued bake passes and installs results into sessions that are
    /// still capturing. Returns the number of sessions updated.
    pub fn run_pending_bakes(&mut self, state: &mut EngineState) -> usize {
        let mut applied = 0;
        for job in state.take_bake_jobs() {
            let baked = bake_with_tail(&job.snapshot, job.width, BAKE_TAIL_POINTS);
            let Some(session) = state.sessions.get_mut(job.pointer_id) else {
                tracing::debug!(pointer = job.pointer_id, "dropping bake for finished session");
                continue;
            };
            if !session.complete_bake(&job, baked) {
                continue;
            }
            if let Some(id) = session.live_node {
                state.scene.update_points(id, session.working().to_vec());
            }
            applied += 1;
        }
        applied
    }
}

fn provisional_node(id: NodeId, session: &CaptureSession, mode: CaptureMode, at: Point) -> RenderNode {
    let tool = &session.tool;
    let mut node = match mode {
        CaptureMode::PixelErase => RenderNode::new(
            id,
            NodeRole::EraserPixel,
            tool.eraser_thickness,
            Color::rgba(0, 0, 0, 255),
            1.0,
        ),
        CaptureMode::Draw | CaptureMode::StrokeErase => {
            let mut node = RenderNode::new(id, NodeRole::Stroke, tool.width, tool.color, tool.opacity);
            node.blend = tool.blend;
            node
        }
    };
    node.group_id = Some(session.group_id);
    node.with_points(vec![at])
}

fn finalize_pixel_erase(state: &mut EngineState, session: &CaptureSession) -> Option<ActionKind> {
    let id = session.live_node?;
    let mut node = state.scene.remove_node(id)?;
    let mut points = sanitize(session.working());
    match points.len() {
        0 => return None,
        1 => points.push(points[0]),
        _ => {}
    }
    node.set_points(points);
    state.scene.add_node(node.clone());
    state
        .history
        .push(Action::add(vec![node]))
        .then_some(ActionKind::Add)
}

/// Full-quality pass over the raw capture: jump splitting, bake, nib
/// segmentation, outline and optimize, then one grouped `add` action.
fn finalize_stroke(
    state: &mut EngineState,
    session: &CaptureSession,
    optimize: bool,
) -> Option<ActionKind> {
    if let Some(id) = session.live_node {
        state.scene.remove_node(id);
    }

    let tool = &session.tool;
    let (points, times) = sanitize_timed(session.raw_points(), session.raw_times());
    if points.is_empty() {
        return None;
    }
    let width = tool.width;

    let profile = match tool.nib_mode {
        NibMode::Dynamic => width_profile(&points, &times, width),
        NibMode::Off => None,
    };

    let mut runs: Vec<WidthRun> = Vec::new();
    for segment in split_on_jumps(&points, width) {
        let seg_points = if polyline_length(&segment.points) <= f32::EPSILON {
            vec![segment.points[0], segment.points[0]]
        } else if tool.smoothing {
            bake(&segment.points, width)
        } else {
            segment.points.clone()
        };

        match &profile {
            Some(profile) if seg_points.len() > 2 => {
                let span = segment.t1 - segment.t0;
                runs.extend(segment_by_width(
                    &seg_points,
                    width,
                    |t| profile.width_at(segment.t0 + t * span),
                    segment_target_len(width),
                ));
            }
            _ => runs.push(WidthRun {
                points: seg_points,
                width,
            }),
        }
    }

    let mut nodes = Vec::with_capacity(runs.len());
    for run in runs {
        let centerline = if optimize {
            optimize_polyline(&run.points, run.width)
        } else {
            run.points
        };
        let mut node = RenderNode::new(
            state.next_node_id(),
            NodeRole::Stroke,
            run.width,
            tool.color,
            tool.opacity,
        );
        node.blend = tool.blend;
        node.group_id = Some(session.group_id);
        match tool.pressure_look.then(|| outline(&centerline, run.width)).flatten() {
            Some(polygon) => {
                node.pfh = true;
                node.set_points(polygon);
            }
            None => node.set_points(centerline),
        }
        nodes.push(node);
    }

    state.scene.add_nodes(nodes.iter().cloned());
    state.history.push(Action::add(nodes)).then_some(ActionKind::Add)
}

fn node_hit(node: &RenderNode, probe: Point, eraser_radius: f32) -> bool {
    let points = node.points();
    if node.pfh {
        if point_in_polygon(probe, points) {
            return true;
        }
        let reach_sq = eraser_radius * eraser_radius;
        let closing = points.last().zip(points.first()).map(|(a, b)| (*a, *b));
        return points
            .windows(2)
            .map(|w| (w[0], w[1]))
            .chain(closing)
            .any(|(a, b)| point_segment_distance_sq(probe, a, b) <= reach_sq);
    }

    let reach = eraser_radius + node.stroke_width * 0.5;
    let reach_sq = reach * reach;
    match points {
        [] => false,
        [only] => only.distance_sq(probe) <= reach_sq,
        _ => points
            .windows(2)
            .any(|w| point_segment_distance_sq(probe, w[0], w[1]) <= reach_sq),
    }
}

/// Stroke-eraser hit test. A hit on a grouped node removes the whole group in
/// one step; `protected` nodes (other sessions' provisional ink) are skipped.
fn erase_hits(
    scene: &mut Scene,
    session: &mut CaptureSession,
    probes: &[Point],
    protected: &HashSet<NodeId>,
) -> usize {
    let eraser_radius = session.tool.eraser_thickness * 0.5;
    let probes: Vec<Point> = probes.iter().copied().filter(|p| p.is_finite()).collect();
    if probes.is_empty() {
        return 0;
    }

    let hits: Vec<NodeId> = scene
        .nodes()
        .filter(|node| node.role == NodeRole::Stroke)
        .filter(|node| !protected.contains(&node.id) && !session.is_node_erased(node.id))
        .filter(|node| {
            let reach = node.bounds().inflate(eraser_radius);
            probes.iter().any(|p| reach.contains(*p))
        })
        .filter(|node| probes.iter().any(|p| node_hit(node, *p, eraser_radius)))
        .map(|node| node.id)
        .collect();

    let before = session.erased_count();
    for id in hits {
        let Some(group) = scene.get(id).map(|node| node.group_id) else {
            continue;
        };
        match group {
            Some(group) if !session.is_group_erased(group) => {
                session.mark_group_erased(group);
                for member in scene.group_members(group) {
                    if !protected.contains(&member) {
                        if let Some(node) = scene.remove_node(member) {
                            session.record_erased(node);
                        }
                    }
                }
            }
            Some(_) => {}
            None => {
                if let Some(node) = scene.remove_node(id) {
                    session.record_erased(node);
                }
            }
        }
    }
    session.erased_count() - before
}

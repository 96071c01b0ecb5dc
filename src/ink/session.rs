use crate::ink::model::{GroupId, NodeId, Point, RenderNode};
use crate::ink::settings::ToolSnapshot;
use std::collections::{HashMap, HashSet};

pub type PointerId = u64;

pub const BAKE_INTERVAL_MS: f64 = 56.0;
/// Flattened coordinates, i.e. twelve points.
pub const BAKE_MIN_NEW_COORDS: usize = 24;
pub const BAKE_TAIL_POINTS: usize = 8;
pub const MAX_INTERPOLATED_POINTS: usize = 6;
const MIN_SPEED_DT_MS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Capturing,
    Finalizing,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BakeCursor {
    pub last_bake_at: f64,
    pub last_bake_len: usize,
}

/// Snapshot of a session's working buffer queued for the deferred bake pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BakeJob {
    pub pointer_id: PointerId,
    pub group_id: GroupId,
    pub snapshot: Vec<Point>,
    pub width: f32,
    pub scheduled_at: f64,
}

pub fn smoothing_blend(speed_px_per_ms: f32) -> f32 {
    (0.22 + speed_px_per_ms * 0.28).clamp(0.22, 0.78)
}

pub fn interpolation_step(width: f32) -> f32 {
    (width * 0.45).clamp(1.6, 4.8)
}

#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub pointer_id: PointerId,
    pub group_id: GroupId,
    pub tool: ToolSnapshot,
    pub live_node: Option<NodeId>,
    pub bake: BakeCursor,
    phase: SessionPhase,
    raw_points: Vec<Point>,
    raw_times: Vec<f64>,
    working: Vec<Point>,
    bake_in_flight: bool,
    erased_nodes: HashSet<NodeId>,
    erased_groups: HashSet<GroupId>,
    erased: Vec<RenderNode>,
}

impl CaptureSession {
    pub fn new(
        pointer_id: PointerId,
        group_id: GroupId,
        tool: ToolSnapshot,
        start: Point,
        time_ms: f64,
    ) -> Self {
        Self {
            pointer_id,
            group_id,
            tool,
            live_node: None,
            bake: BakeCursor {
                last_bake_at: time_ms,
                last_bake_len: 1,
            },
            phase: SessionPhase::Capturing,
            raw_points: vec![start],
            raw_times: vec![time_ms],
            working: vec![start],
            bake_in_flight: false,
            erased_nodes: HashSet::new(),
            erased_groups: HashSet::new(),
            erased: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn raw_points(&self) -> &[Point] {
        &self.raw_points
    }

    pub fn raw_times(&self) -> &[f64] {
        &self.raw_times
    }

    pub fn working(&self) -> &[Point] {
        &self.working
    }

    /// Records a raw sample and extends the working buffer with the smoothed
    /// point, plus interpolated fillers when the step is too long. Returns the
    /// points appended to the working buffer.
    pub fn advance(&mut self, point: Point, time_ms: f64, smooth: bool) -> Vec<Point> {
        let prev_raw = self.raw_points[self.raw_points.len() - 1];
        let prev_time = self.raw_times[self.raw_times.len() - 1];
        self.raw_points.push(point);
        self.raw_times.push(time_ms);

        let last = self.working[self.working.len() - 1];
        let target = if smooth {
            let dt = (time_ms - prev_time).max(MIN_SPEED_DT_MS);
            let speed = prev_raw.distance(point) / dt as f32;
            last.lerp(point, smoothing_blend(speed))
        } else {
            point
        };

        let mut appended = Vec::new();
        let step = last.distance(target);
        let max_step = interpolation_step(self.tool.working_width());
        if step > max_step {
            let inserts = ((step / max_step).ceil() as usize)
                .saturating_sub(1)
                .min(MAX_INTERPOLATED_POINTS);
            for k in 1..=inserts {
                appended.push(last.lerp(target, k as f32 / (inserts + 1) as f32));
            }
        }
        appended.push(target);
        self.working.extend_from_slice(&appended);
        appended
    }

    pub fn should_schedule_bake(&self, now_ms: f64) -> bool {
        self.phase == SessionPhase::Capturing
            && !self.bake_in_flight
            && now_ms - self.bake.last_bake_at >= BAKE_INTERVAL_MS
            && self.working.len().saturating_sub(self.bake.last_bake_len) * 2 >= BAKE_MIN_NEW_COORDS
    }

    pub fn bake_in_flight(&self) -> bool {
        self.bake_in_flight
    }

    pub fn begin_bake(&mut self, now_ms: f64) -> BakeJob {
        self.bake_in_flight = true;
        BakeJob {
            pointer_id: self.pointer_id,
            group_id: self.group_id,
            snapshot: self.working.clone(),
            width: self.tool.width,
            scheduled_at: now_ms,
        }
    }

    /// Installs a finished bake: the baked prefix replaces the snapshot and
    /// points captured since the snapshot are kept after it.
    pub fn complete_bake(&mut self, job: &BakeJob, baked: Vec<Point>) -> bool {
        self.bake_in_flight = false;
        if self.phase != SessionPhase::Capturing || job.group_id != self.group_id {
            return false;
        }
        let tail_start = job.snapshot.len().min(self.working.len());
        let mut next = baked;
        next.extend_from_slice(&self.working[tail_start..]);
        self.working = next;
        self.bake = BakeCursor {
            last_bake_at: job.scheduled_at,
            last_bake_len: self.working.len(),
        };
        true
    }

    pub fn is_node_erased(&self, id: NodeId) -> bool {
        self.erased_nodes.contains(&id)
    }

    pub fn is_group_erased(&self, group: GroupId) -> bool {
        self.erased_groups.contains(&group)
    }

    pub fn mark_group_erased(&mut self, group: GroupId) {
        self.erased_groups.insert(group);
    }

    /// Accumulates a node removed by this drag; each node is kept once.
    pub fn record_erased(&mut self, node: RenderNode) -> bool {
        if !self.erased_nodes.insert(node.id) {
            return false;
        }
        self.erased.push(node);
        true
    }

    pub fn erased_count(&self) -> usize {
        self.erased.len()
    }

    pub fn take_erased(&mut self) -> Vec<RenderNode> {
        std::mem::take(&mut self.erased)
    }

    /// Moves the session into finalizing; only the first call succeeds.
    pub fn begin_finalize(&mut self) -> bool {
        if self.phase != SessionPhase::Capturing {
            return false;
        }
        self.phase = SessionPhase::Finalizing;
        true
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    sessions: HashMap<PointerId, CaptureSession>,
}

impl SessionManager {
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_active(&self, pointer_id: PointerId) -> bool {
        self.sessions.contains_key(&pointer_id)
    }

    pub fn begin(&mut self, session: CaptureSession) -> bool {
        if self.sessions.contains_key(&session.pointer_id) {
            return false;
        }
        self.sessions.insert(session.pointer_id, session);
        true
    }

    pub fn get(&self, pointer_id: PointerId) -> Option<&CaptureSession> {
        self.sessions.get(&pointer_id)
    }

    pub fn get_mut(&mut self, pointer_id: PointerId) -> Option<&mut CaptureSession> {
        self.sessions.get_mut(&pointer_id)
    }

    /// Detaches the session so later termination signals find nothing.
    pub fn take(&mut self, pointer_id: PointerId) -> Option<CaptureSession> {
        self.sessions.remove(&pointer_id)
    }

    /// Provisional nodes owned by in-progress sessions.
    pub fn live_nodes(&self) -> HashSet<NodeId> {
        self.sessions.values().filter_map(|s| s.live_node).collect()
    }

    pub fn pointer_ids(&self) -> Vec<PointerId> {
        let mut ids: Vec<PointerId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::settings::InkSettings;

    fn session() -> CaptureSession {
        CaptureSession::new(
            1,
            GroupId(1),
            InkSettings::default().snapshot(),
            Point::new(0.0, 0.0),
            0.0,
        )
    }

    #[test]
    fn smoothing_blend_drops_with_slow_motion() {
        assert_eq!(smoothing_blend(0.0), 0.22);
        assert_eq!(smoothing_blend(10.0), 0.78);
        assert!(smoothing_blend(1.0) > smoothing_blend(0.5));
    }

    #[test]
    fn long_steps_are_interpolated_with_cap() {
        let mut s = session();
        let appended = s.advance(Point::new(200.0, 0.0), 1.0, false);
        assert_eq!(appended.len(), MAX_INTERPOLATED_POINTS + 1);
        assert_eq!(appended[appended.len() - 1], Point::new(200.0, 0.0));
        assert_eq!(s.raw_points().len(), 2);
        assert_eq!(s.working().len(), 1 + MAX_INTERPOLATED_POINTS + 1);
    }

    #[test]
    fn smoothed_point_lags_raw_point() {
        let mut s = session();
        let appended = s.advance(Point::new(1.0, 0.0), 16.0, true);
        let last = appended[appended.len() - 1];
        assert!(last.x > 0.0 && last.x < 1.0);
        assert_eq!(s.raw_points()[1], Point::new(1.0, 0.0));
    }

    #[test]
    fn bake_is_throttled_and_single_flight() {
        let mut s = session();
        for i in 1..=20 {
            s.advance(Point::new(i as f32 * 2.0, 0.0), i as f64 * 2.0, false);
        }
        assert!(!s.should_schedule_bake(40.0));
        assert!(s.should_schedule_bake(60.0));

        let job = s.begin_bake(60.0);
        assert!(s.bake_in_flight());
        assert!(!s.should_schedule_bake(500.0));

        s.advance(Point::new(41.5, 0.0), 61.0, false);
        let baked = vec![Point::new(0.0, 0.0), Point::new(40.0, 0.0)];
        assert!(s.complete_bake(&job, baked));
        assert_eq!(
            s.working(),
            &[Point::new(0.0, 0.0), Point::new(40.0, 0.0), Point::new(41.5, 0.0)]
        );
        assert!(!s.bake_in_flight());
        assert_eq!(s.bake.last_bake_len, 3);
    }

    #[test]
    fn finalize_begins_only_once() {
        let mut s = session();
        assert!(s.begin_finalize());
        assert!(!s.begin_finalize());
        assert_eq!(s.phase(), SessionPhase::Finalizing);
    }

    #[test]
    fn erased_nodes_are_recorded_once() {
        use crate::ink::model::{Color, NodeRole};
        let mut s = session();
        let node = RenderNode::new(NodeId(3), NodeRole::Stroke, 2.0, Color::default(), 1.0);
        assert!(s.record_erased(node.clone()));
        assert!(!s.record_erased(node));
        assert_eq!(s.erased_count(), 1);
        assert!(s.is_node_erased(NodeId(3)));
    }

    #[test]
    fn manager_rejects_duplicate_pointer_and_detaches_on_take() {
        let mut manager = SessionManager::default();
        assert!(manager.begin(session()));
        assert!(!manager.begin(session()));
        assert!(manager.take(1).is_some());
        assert!(manager.take(1).is_none());
        assert_eq!(manager.active_count(), 0);
    }
}

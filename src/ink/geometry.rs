//! Stroke geometry kernel.
//!
//! Every function here is total: when its preconditions are not met (too few
//! points, zero-length input, mismatched timestamps) it hands back the input
//! unchanged or `None`, and callers treat that as a legitimate result.

use crate::ink::model::Point;
use std::f32::consts::PI;
use std::ops::Range;

const NEAR_DUPLICATE_DIST: f32 = 0.01;
const LENGTH_EPSILON: f32 = 1e-4;
const JUMP_MIN_GAP: f32 = 30.0;
const TAPER_FRACTION: f32 = 0.12;
const SPEED_WEIGHTS: [f32; 5] = [1.0, 2.0, 3.0, 2.0, 1.0];
const MIN_SAMPLE_DT_MS: f64 = 0.5;
const OUTLINE_CAP_STEPS: usize = 6;
const MAX_RESAMPLE_POINTS: f32 = 65_536.0;

pub const BAKE_ITERATIONS: usize = 2;

pub fn sanitize(points: &[Point]) -> Vec<Point> {
    points.iter().copied().filter(|p| p.is_finite()).collect()
}

/// Drops samples whose point or timestamp is not finite, keeping both
/// sequences aligned.
pub fn sanitize_timed(points: &[Point], timestamps: &[f64]) -> (Vec<Point>, Vec<f64>) {
    points
        .iter()
        .zip(timestamps)
        .filter(|(p, t)| p.is_finite() && t.is_finite())
        .map(|(p, t)| (*p, *t))
        .unzip()
}

pub fn polyline_length(points: &[Point]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x >= edge1 { 1.0 } else { 0.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

pub fn point_segment_distance_sq(point: Point, start: Point, end: Point) -> f32 {
    let vx = end.x - start.x;
    let vy = end.y - start.y;
    let len_sq = vx * vx + vy * vy;
    if len_sq <= f32::EPSILON {
        return point.distance_sq(start);
    }
    let wx = point.x - start.x;
    let wy = point.y - start.y;
    let t = ((wx * vx + wy * vy) / len_sq).clamp(0.0, 1.0);
    point.distance_sq(Point::new(start.x + vx * t, start.y + vy * t))
}

/// Even-odd containment test against a closed polygon.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > point.y) != (b.y > point.y) {
            let x_cross = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
            if point.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn dedupe(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        match out.last() {
            Some(last) if last.distance(p) < NEAR_DUPLICATE_DIST => {}
            _ => out.push(p),
        }
    }
    // Keep the true endpoint even when it was a near-duplicate of its predecessor.
    if let (Some(&end), true) = (points.last(), out.len() > 1) {
        if let Some(last) = out.last_mut() {
            *last = end;
        }
    }
    out
}

pub fn bake_step(width: f32) -> f32 {
    (width * 0.32).clamp(1.2, 3.6)
}

/// Reparametrizes the polyline to uniform arc-length spacing. The first and
/// last points are kept exactly. The step widens on absurdly long input so
/// the output never exceeds `MAX_RESAMPLE_POINTS` samples.
pub fn resample(points: &[Point], step: f32) -> Vec<Point> {
    if !(step.is_finite() && step > 0.0) {
        return points.to_vec();
    }
    let pts = dedupe(points);
    if pts.len() < 2 {
        return points.to_vec();
    }
    let length = polyline_length(&pts);
    if !length.is_finite() {
        return points.to_vec();
    }
    let step = step.max(length / MAX_RESAMPLE_POINTS);
    let first = pts[0];
    let last = pts[pts.len() - 1];

    let mut out = vec![first];
    let mut k: u32 = 1;
    let mut travelled = 0.0_f32;
    for w in pts.windows(2) {
        let seg_len = w[0].distance(w[1]);
        if seg_len <= LENGTH_EPSILON {
            continue;
        }
        loop {
            let target = step * k as f32;
            if target > travelled + seg_len {
                break;
            }
            out.push(w[0].lerp(w[1], (target - travelled) / seg_len));
            k += 1;
        }
        travelled += seg_len;
    }

    while out.len() > 1 && out[out.len() - 1].distance(last) < step * 0.5 {
        out.pop();
    }
    out.push(last);
    out
}

/// Open-curve corner cutting; endpoints are preserved and inputs shorter than
/// four points are returned as-is.
pub fn chaikin(points: &[Point], iterations: usize) -> Vec<Point> {
    let mut current = points.to_vec();
    for _ in 0..iterations {
        if current.len() < 4 {
            break;
        }
        let mut next = Vec::with_capacity(current.len() * 2);
        next.push(current[0]);
        for w in current.windows(2) {
            next.push(w[0].lerp(w[1], 0.25));
            next.push(w[0].lerp(w[1], 0.75));
        }
        next.push(current[current.len() - 1]);
        current = next;
    }
    current
}

pub fn bake(points: &[Point], width: f32) -> Vec<Point> {
    chaikin(&resample(points, bake_step(width)), BAKE_ITERATIONS)
}

/// Bakes everything but the last `tail_count` points, which are reattached
/// untouched so the geometry under the stylus keeps full fidelity.
pub fn bake_with_tail(points: &[Point], width: f32, tail_count: usize) -> Vec<Point> {
    if points.len() <= tail_count + 2 {
        return points.to_vec();
    }
    let split = points.len() - tail_count;
    let mut out = bake(&points[..split], width);
    out.extend_from_slice(&points[split..]);
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct JumpSegment {
    /// Indices into the input polyline.
    pub range: Range<usize>,
    pub points: Vec<Point>,
    pub t0: f32,
    pub t1: f32,
}

fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

pub fn jump_threshold(width: f32, median_gap: f32) -> f32 {
    JUMP_MIN_GAP.max(width * 12.0).max(median_gap * 10.0)
}

#[derive(Debug, Clone, Copy)]
struct Gap {
    len: f32,
    jump: bool,
}

/// Measures every consecutive gap and flags the ones past the jump threshold.
/// Jump splitting and the nib width profile both read these flags so their
/// arc-length fractions agree.
fn classify_gaps(points: &[Point], width: f32) -> Vec<Gap> {
    let lens: Vec<f32> = points.windows(2).map(|w| w[0].distance(w[1])).collect();
    let threshold = jump_threshold(width, median(&lens));
    lens.into_iter()
        .map(|len| Gap {
            len,
            jump: len > threshold,
        })
        .collect()
}

/// Splits the polyline wherever consecutive points are abnormally far apart.
/// Jump gaps do not count toward arc length, so the `[t0, t1]` ranges of the
/// returned segments tile `[0, 1]` exactly.
pub fn split_on_jumps(points: &[Point], width: f32) -> Vec<JumpSegment> {
    if points.is_empty() {
        return Vec::new();
    }
    if points.len() < 2 {
        return vec![JumpSegment {
            range: 0..points.len(),
            points: points.to_vec(),
            t0: 0.0,
            t1: 1.0,
        }];
    }

    let gaps = classify_gaps(points, width);

    let mut starts = vec![0_usize];
    let mut lengths_at_start = vec![0.0_f32];
    let mut travelled = 0.0_f32;
    for (i, gap) in gaps.iter().enumerate() {
        if gap.jump {
            starts.push(i + 1);
            lengths_at_start.push(travelled);
        } else {
            travelled += gap.len;
        }
    }
    let total = travelled;
    let n = points.len();

    let mut bounds: Vec<f32> = starts
        .iter()
        .zip(&lengths_at_start)
        .map(|(&start, &len)| {
            if total > LENGTH_EPSILON {
                len / total
            } else {
                start as f32 / n as f32
            }
        })
        .collect();
    bounds[0] = 0.0;
    bounds.push(1.0);

    starts
        .iter()
        .enumerate()
        .map(|(k, &start)| {
            let end = starts.get(k + 1).copied().unwrap_or(n);
            JumpSegment {
                range: start..end,
                points: points[start..end].to_vec(),
                t0: bounds[k],
                t1: bounds[k + 1],
            }
        })
        .collect()
}

/// Width as a function of arc-length fraction, built from start/end taper and
/// an inverse-speed factor.
#[derive(Debug, Clone, PartialEq)]
pub struct WidthProfile {
    base_width: f32,
    fractions: Vec<f32>,
    factors: Vec<f32>,
}

impl WidthProfile {
    pub fn base_width(&self) -> f32 {
        self.base_width
    }

    pub fn width_at(&self, t: f32) -> f32 {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
        let taper = smoothstep(0.0, TAPER_FRACTION, t).min(smoothstep(0.0, TAPER_FRACTION, 1.0 - t));
        self.base_width * (0.55 + 0.45 * taper) * self.speed_factor_at(t)
    }

    fn speed_factor_at(&self, t: f32) -> f32 {
        let idx = self.fractions.partition_point(|&f| f < t);
        if idx == 0 {
            return self.factors[0];
        }
        if idx >= self.fractions.len() {
            return self.factors[self.factors.len() - 1];
        }
        let (f0, f1) = (self.fractions[idx - 1], self.fractions[idx]);
        let span = f1 - f0;
        if span <= f32::EPSILON {
            return self.factors[idx];
        }
        let local = (t - f0) / span;
        self.factors[idx - 1] + (self.factors[idx] - self.factors[idx - 1]) * local
    }
}

/// Builds the nib width profile. Jump gaps (see [`split_on_jumps`]) carry no
/// arc length, travel time or speed, so `t` here is the same fraction the jump
/// segments record.
pub fn width_profile(points: &[Point], timestamps: &[f64], base_width: f32) -> Option<WidthProfile> {
    let n = points.len();
    if n < 3 || timestamps.len() != n {
        return None;
    }
    let gaps = classify_gaps(points, base_width);

    let mut cumulative = Vec::with_capacity(n);
    cumulative.push(0.0_f32);
    let mut run_of = Vec::with_capacity(n);
    run_of.push(0_usize);
    let mut segment_speeds: Vec<Option<f32>> = Vec::with_capacity(n - 1);
    let mut duration = 0.0_f64;
    for (i, gap) in gaps.iter().enumerate() {
        if gap.jump {
            cumulative.push(cumulative[i]);
            run_of.push(run_of[i] + 1);
            segment_speeds.push(None);
            continue;
        }
        let dt = timestamps[i + 1] - timestamps[i];
        duration += dt.max(0.0);
        cumulative.push(cumulative[i] + gap.len);
        run_of.push(run_of[i]);
        segment_speeds.push(Some(gap.len / dt.max(MIN_SAMPLE_DT_MS) as f32));
    }
    if !(duration > 0.0) {
        return None;
    }
    let total = cumulative[n - 1];
    if total <= LENGTH_EPSILON {
        return None;
    }
    let average_speed = total / duration as f32;

    let point_speeds: Vec<f32> = (0..n)
        .map(|i| {
            let before = i.checked_sub(1).and_then(|j| segment_speeds[j]);
            let after = segment_speeds.get(i).copied().flatten();
            match (before, after) {
                (Some(a), Some(b)) => (a + b) * 0.5,
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => average_speed,
            }
        })
        .collect();

    let factors = (0..n)
        .map(|i| {
            let mut weighted = 0.0;
            let mut weight_sum = 0.0;
            for (k, weight) in SPEED_WEIGHTS.iter().enumerate() {
                let Some(j) = (i + k).checked_sub(2) else {
                    continue;
                };
                if j >= n || run_of[j] != run_of[i] {
                    continue;
                }
                weighted += point_speeds[j] * weight;
                weight_sum += weight;
            }
            let speed = weighted / weight_sum;
            (1.0 / (0.6 + 0.4 * speed / average_speed)).clamp(0.6, 1.35)
        })
        .collect();

    Some(WidthProfile {
        base_width,
        fractions: cumulative.iter().map(|c| c / total).collect(),
        factors,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct WidthRun {
    pub points: Vec<Point>,
    pub width: f32,
}

pub fn segment_target_len(width: f32) -> f32 {
    (width * 2.2).clamp(18.0, 46.0)
}

/// Chops the polyline into runs of roughly `target_seg_len` whose width is
/// sampled at the run's arc-length midpoint. Adjacent runs share their
/// boundary point.
pub fn segment_by_width<F>(
    points: &[Point],
    base_width: f32,
    width_fn: F,
    target_seg_len: f32,
) -> Vec<WidthRun>
where
    F: Fn(f32) -> f32,
{
    if points.is_empty() {
        return Vec::new();
    }
    let target = if target_seg_len > 0.0 {
        target_seg_len
    } else {
        segment_target_len(base_width)
    };

    let mut cumulative = Vec::with_capacity(points.len());
    cumulative.push(0.0_f32);
    for i in 1..points.len() {
        cumulative.push(cumulative[i - 1] + points[i - 1].distance(points[i]));
    }
    let total = cumulative[cumulative.len() - 1];
    if points.len() < 2 || total <= LENGTH_EPSILON {
        return vec![WidthRun {
            points: points.to_vec(),
            width: width_fn(0.5),
        }];
    }

    let last = points.len() - 1;
    let mut spans: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for i in 1..=last {
        if i < last && cumulative[i] - cumulative[start] >= target {
            spans.push((start, i));
            start = i;
        }
    }
    spans.push((start, last));

    // A stub shorter than a third of the target reads as a width glitch.
    if spans.len() > 1 {
        let (s, e) = spans[spans.len() - 1];
        if cumulative[e] - cumulative[s] < target * 0.35 {
            spans.pop();
            if let Some(prev) = spans.last_mut() {
                prev.1 = e;
            }
        }
    }

    spans
        .into_iter()
        .map(|(s, e)| {
            let mid = (cumulative[s] + cumulative[e]) * 0.5 / total;
            WidthRun {
                points: points[s..=e].to_vec(),
                width: width_fn(mid),
            }
        })
        .collect()
}

/// Filled envelope with simulated pen pressure: thin at both ends and where
/// samples are widely spaced (fast motion). Returns `None` when the polygon
/// would have fewer than three vertices.
pub fn outline(points: &[Point], width: f32) -> Option<Vec<Point>> {
    let pts = dedupe(points);
    let n = pts.len();
    if n < 2 || !(width > 0.0) {
        return None;
    }

    let mut cumulative = Vec::with_capacity(n);
    cumulative.push(0.0_f32);
    for i in 1..n {
        cumulative.push(cumulative[i - 1] + pts[i - 1].distance(pts[i]));
    }
    let total = cumulative[n - 1];
    if total <= LENGTH_EPSILON {
        return None;
    }
    let mean_spacing = total / (n - 1) as f32;

    let mut left = Vec::with_capacity(n);
    let mut right = Vec::with_capacity(n);
    let mut normals = Vec::with_capacity(n);
    let mut radii = Vec::with_capacity(n);
    for i in 0..n {
        let prev = pts[i.saturating_sub(1)];
        let next = pts[(i + 1).min(n - 1)];
        let (tx, ty) = (next.x - prev.x, next.y - prev.y);
        let len = (tx * tx + ty * ty).sqrt().max(f32::EPSILON);
        let normal = Point::new(-ty / len, tx / len);

        let s = cumulative[i] / total;
        let taper = smoothstep(0.0, TAPER_FRACTION, s).min(smoothstep(0.0, TAPER_FRACTION, 1.0 - s));
        let spacing = if i == 0 {
            pts[0].distance(pts[1])
        } else if i == n - 1 {
            pts[n - 2].distance(pts[n - 1])
        } else {
            (pts[i - 1].distance(pts[i]) + pts[i].distance(pts[i + 1])) * 0.5
        };
        let thinning = (1.0 - 0.3 * (spacing / mean_spacing - 1.0)).clamp(0.7, 1.15);
        let radius = (width * 0.5 * (0.35 + 0.65 * taper) * thinning).max(0.25);

        left.push(Point::new(pts[i].x + normal.x * radius, pts[i].y + normal.y * radius));
        right.push(Point::new(pts[i].x - normal.x * radius, pts[i].y - normal.y * radius));
        normals.push(normal);
        radii.push(radius);
    }

    let mut polygon = Vec::with_capacity(n * 2 + OUTLINE_CAP_STEPS * 2);
    polygon.extend_from_slice(&left);
    push_cap(&mut polygon, pts[n - 1], normals[n - 1], radii[n - 1], 0.0);
    polygon.extend(right.iter().rev());
    push_cap(&mut polygon, pts[0], normals[0], radii[0], PI);

    if polygon.len() < 3 {
        return None;
    }
    Some(polygon)
}

fn push_cap(polygon: &mut Vec<Point>, center: Point, normal: Point, radius: f32, offset: f32) {
    let base = normal.y.atan2(normal.x) + offset;
    for k in 1..OUTLINE_CAP_STEPS {
        let angle = base - PI * k as f32 / OUTLINE_CAP_STEPS as f32;
        polygon.push(Point::new(
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        ));
    }
}

pub fn optimize_tolerance(width: f32) -> f32 {
    (width * 0.05).clamp(0.15, 0.6)
}

/// Douglas-Peucker simplification used by the post-bake optimize pass.
pub fn optimize_polyline(points: &[Point], width: f32) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let tolerance_sq = optimize_tolerance(width).powi(2);
    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0_usize, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let mut worst = 0.0_f32;
        let mut worst_idx = first;
        for i in (first + 1)..last {
            let d = point_segment_distance_sq(points[i], points[first], points[last]);
            if d > worst {
                worst = d;
                worst_idx = i;
            }
        }
        if worst > tolerance_sq {
            keep[worst_idx] = true;
            stack.push((first, worst_idx));
            stack.push((worst_idx, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

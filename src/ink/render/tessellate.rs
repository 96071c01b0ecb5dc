//! Triangle meshes for the GPU backends.
//!
//! Centerline strokes become one quad per segment, with round fans at joints
//! that turn more than [`ROUND_JOIN_MIN_TURN_DEG`] and half-disc caps at both
//! ends. Filled outlines go through lyon's fill tessellator.

use crate::ink::model::{Point, RenderNode};
use crate::ink::render::raster::node_color;
use lyon::lyon_tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, VertexBuffers,
};
use lyon::math::point;
use lyon::path::Path as LyonPath;
use std::f32::consts::PI;

pub const ROUND_JOIN_MIN_TURN_DEG: f32 = 15.0;
const FAN_STEP_RADIANS: f32 = PI / 8.0;
const DOT_SEGMENTS: usize = 16;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InkVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<InkVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn positions(&self) -> Vec<[f32; 2]> {
        self.vertices.iter().map(|v| v.position).collect()
    }

    /// Vertex data as uploaded to a vertex buffer.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn color(&self) -> Option<[f32; 4]> {
        self.vertices.first().map(|v| v.color)
    }

    fn push_vertex(&mut self, p: Point, color: [f32; 4]) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(InkVertex {
            position: [p.x, p.y],
            color,
        });
        index
    }

    fn push_quad(&mut self, corners: [Point; 4], color: [f32; 4]) {
        let [a, b, c, d] = corners.map(|p| self.push_vertex(p, color));
        self.indices.extend_from_slice(&[a, b, c, b, d, c]);
    }

    /// Pie slice around `center` starting at offset `from` and sweeping
    /// `sweep` radians.
    fn push_fan(&mut self, center: Point, from: Point, sweep: f32, color: [f32; 4]) {
        let radius = (from.x * from.x + from.y * from.y).sqrt();
        if radius <= f32::EPSILON || sweep.abs() <= f32::EPSILON {
            return;
        }
        let start = from.y.atan2(from.x);
        let steps = ((sweep.abs() / FAN_STEP_RADIANS - 1e-3).ceil() as usize).max(1);
        let hub = self.push_vertex(center, color);
        let mut previous = None;
        for k in 0..=steps {
            let angle = start + sweep * k as f32 / steps as f32;
            let rim = self.push_vertex(
                Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin()),
                color,
            );
            if let Some(prev) = previous {
                self.indices.extend_from_slice(&[hub, prev, rim]);
            }
            previous = Some(rim);
        }
    }
}

fn dedupe(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for p in points.iter().copied().filter(|p| p.is_finite()) {
        if out.last().map_or(true, |last| last.distance_sq(p) > 1e-6) {
            out.push(p);
        }
    }
    out
}

fn unit(v: Point) -> Point {
    let len = (v.x * v.x + v.y * v.y).sqrt();
    Point::new(v.x / len, v.y / len)
}

fn scaled(v: Point, s: f32) -> Point {
    Point::new(v.x * s, v.y * s)
}

fn offset(p: Point, v: Point) -> Point {
    Point::new(p.x + v.x, p.y + v.y)
}

pub fn tessellate_dot(center: Point, radius: f32, color: [f32; 4]) -> Mesh {
    let mut mesh = Mesh::default();
    let hub = mesh.push_vertex(center, color);
    let first = hub + 1;
    for k in 0..DOT_SEGMENTS {
        let angle = 2.0 * PI * k as f32 / DOT_SEGMENTS as f32;
        mesh.push_vertex(
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin()),
            color,
        );
    }
    for k in 0..DOT_SEGMENTS as u32 {
        let next = (k + 1) % DOT_SEGMENTS as u32;
        mesh.indices.extend_from_slice(&[hub, first + k, first + next]);
    }
    mesh
}

pub fn tessellate_polyline(points: &[Point], width: f32, color: [f32; 4]) -> Mesh {
    let pts = dedupe(points);
    let radius = (width * 0.5).max(0.5);
    match pts.as_slice() {
        [] => return Mesh::default(),
        [only] => return tessellate_dot(*only, radius, color),
        _ => {}
    }

    let dirs: Vec<Point> = pts
        .windows(2)
        .map(|w| unit(Point::new(w[1].x - w[0].x, w[1].y - w[0].y)))
        .collect();
    let normals: Vec<Point> = dirs
        .iter()
        .map(|d| Point::new(-d.y * radius, d.x * radius))
        .collect();

    let mut mesh = Mesh::default();
    for (i, w) in pts.windows(2).enumerate() {
        let n = normals[i];
        mesh.push_quad(
            [
                offset(w[0], n),
                offset(w[0], scaled(n, -1.0)),
                offset(w[1], n),
                offset(w[1], scaled(n, -1.0)),
            ],
            color,
        );
    }

    let min_turn = ROUND_JOIN_MIN_TURN_DEG.to_radians();
    for j in 1..pts.len() - 1 {
        let (d0, d1) = (dirs[j - 1], dirs[j]);
        let turn = (d0.x * d1.x + d0.y * d1.y).clamp(-1.0, 1.0).acos();
        if turn <= min_turn {
            continue;
        }
        let cross = d0.x * d1.y - d0.y * d1.x;
        // The gap opens on the side away from the turn.
        let (from, sweep) = if cross > 0.0 {
            (scaled(normals[j - 1], -1.0), turn)
        } else {
            (normals[j - 1], -turn)
        };
        mesh.push_fan(pts[j], from, sweep, color);
    }

    let last = pts.len() - 1;
    mesh.push_fan(pts[0], normals[0], PI, color);
    mesh.push_fan(pts[last], scaled(normals[last - 1], -1.0), PI, color);
    mesh
}

/// Fills a closed outline polygon (even-odd) through lyon.
pub fn tessellate_outline(polygon: &[Point], color: [f32; 4]) -> Mesh {
    let pts = dedupe(polygon);
    if pts.len() < 3 {
        return Mesh::default();
    }

    let mut builder = LyonPath::builder();
    builder.begin(point(pts[0].x, pts[0].y));
    for p in &pts[1..] {
        builder.line_to(point(p.x, p.y));
    }
    builder.end(true);
    let path = builder.build();

    let mut geometry: VertexBuffers<InkVertex, u32> = VertexBuffers::new();
    let mut tessellator = FillTessellator::new();
    let options = FillOptions::default()
        .with_tolerance(0.1)
        .with_fill_rule(FillRule::EvenOdd);

    let result = tessellator.tessellate_path(
        &path,
        &options,
        &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| InkVertex {
            position: vertex.position().to_array(),
            color,
        }),
    );

    if let Err(err) = result {
        tracing::warn!(?err, "outline fill tessellation failed");
        return Mesh::default();
    }

    Mesh {
        vertices: geometry.vertices,
        indices: geometry.indices,
    }
}

pub fn tessellate_node(node: &RenderNode) -> Mesh {
    let color = node_color(node);
    if node.pfh {
        tessellate_outline(node.points(), color)
    } else {
        tessellate_polyline(node.points(), node.stroke_width, color)
    }
}

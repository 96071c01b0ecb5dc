use crate::ink::geometry::{point_in_polygon, point_segment_distance_sq};
use crate::ink::model::{BlendMode, Bounds, NodeRole, Point, RenderNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl DirtyRect {
    pub fn from_bounds(bounds: Bounds) -> Self {
        let x0 = bounds.min_x.floor() as i32;
        let y0 = bounds.min_y.floor() as i32;
        let x1 = bounds.max_x.ceil() as i32;
        let y1 = bounds.max_y.ceil() as i32;
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0 + 1).max(1),
            height: (y1 - y0 + 1).max(1),
        }
    }

    pub fn union(self, other: DirtyRect) -> DirtyRect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        DirtyRect {
            x: min_x,
            y: min_y,
            width: (max_x - min_x).max(1),
            height: (max_y - min_y).max(1),
        }
    }

    /// Intersection with the `width x height` surface, `None` when nothing is left.
    pub fn clamp(self, width: u32, height: u32) -> Option<DirtyRect> {
        let max_w = width as i32;
        let max_h = height as i32;
        let x0 = self.x.clamp(0, max_w);
        let y0 = self.y.clamp(0, max_h);
        let x1 = (self.x + self.width).clamp(0, max_w);
        let y1 = (self.y + self.height).clamp(0, max_h);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(DirtyRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    fn area(self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }
}

/// Straight-alpha RGBA8 surface shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        let px = self.pixels.get(idx..idx + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Pixels with non-zero alpha.
    pub fn painted_pixel_count(&self) -> usize {
        self.pixels.chunks_exact(4).filter(|px| px[3] > 0).count()
    }

    /// Composites `color` (straight RGBA in `[0, 1]`) through `coverage`.
    pub fn composite(&mut self, coverage: &Coverage, color: [f32; 4], mode: CompositeMode) {
        let Some(rect) = coverage.rect else {
            return;
        };
        let stride = rect.width as usize;
        for row in 0..rect.height {
            let y = rect.y + row;
            for col in 0..rect.width {
                let cov = coverage.alpha[row as usize * stride + col as usize];
                if cov <= 0.0 {
                    continue;
                }
                let x = rect.x + col;
                let idx = ((y as u32 * self.width + x as u32) * 4) as usize;
                if let Some(dst) = self.pixels.get_mut(idx..idx + 4) {
                    blend_pixel(dst, color, cov * color[3], mode);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeMode {
    Normal,
    Multiply,
    Additive,
    /// Destination-out.
    Erase,
}

impl CompositeMode {
    pub const ALL: [CompositeMode; 4] = [
        CompositeMode::Normal,
        CompositeMode::Multiply,
        CompositeMode::Additive,
        CompositeMode::Erase,
    ];

    pub fn for_node(node: &RenderNode) -> Self {
        match (node.role, node.blend) {
            (NodeRole::EraserPixel, _) => CompositeMode::Erase,
            (NodeRole::Stroke, BlendMode::Normal) => CompositeMode::Normal,
            (NodeRole::Stroke, BlendMode::Multiply) => CompositeMode::Multiply,
            (NodeRole::Stroke, BlendMode::Additive) => CompositeMode::Additive,
        }
    }
}

/// Paint color of a node, opacity folded into alpha.
pub fn node_color(node: &RenderNode) -> [f32; 4] {
    match node.role {
        NodeRole::EraserPixel => [0.0, 0.0, 0.0, 1.0],
        NodeRole::Stroke => node.color.to_f32_with_opacity(node.opacity),
    }
}

fn to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn to_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn blend_pixel(dst: &mut [u8], src: [f32; 4], alpha: f32, mode: CompositeMode) {
    let sa = alpha.clamp(0.0, 1.0);
    let da = to_unit(dst[3]);

    if mode == CompositeMode::Erase {
        dst[3] = to_byte(da * (1.0 - sa));
        return;
    }

    let out_a = match mode {
        CompositeMode::Additive => (sa + da).min(1.0),
        _ => sa + da * (1.0 - sa),
    };
    if out_a <= 0.0 {
        dst.copy_from_slice(&[0, 0, 0, 0]);
        return;
    }

    for c in 0..3 {
        let sp = src[c] * sa;
        let dp = to_unit(dst[c]) * da;
        let premul = match mode {
            CompositeMode::Normal => sp + dp * (1.0 - sa),
            CompositeMode::Multiply => sp * (1.0 - da) + dp * (1.0 - sa) + sp * dp,
            CompositeMode::Additive => (sp + dp).min(1.0),
            CompositeMode::Erase => dp,
        };
        dst[c] = to_byte(premul / out_a);
    }
    dst[3] = to_byte(out_a);
}

/// Per-pixel coverage in `[0, 1]` over a surface-clipped rectangle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Coverage {
    rect: Option<DirtyRect>,
    alpha: Vec<f32>,
}

impl Coverage {
    fn with_rect(rect: DirtyRect, width: u32, height: u32) -> Self {
        match rect.clamp(width, height) {
            Some(rect) => Self {
                rect: Some(rect),
                alpha: vec![0.0; rect.area()],
            },
            None => Self::default(),
        }
    }

    pub fn rect(&self) -> Option<DirtyRect> {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.alpha.iter().all(|a| *a <= 0.0)
    }

    pub fn at(&self, x: i32, y: i32) -> f32 {
        let Some(rect) = self.rect else {
            return 0.0;
        };
        if x < rect.x || y < rect.y || x >= rect.x + rect.width || y >= rect.y + rect.height {
            return 0.0;
        }
        self.alpha[((y - rect.y) * rect.width + (x - rect.x)) as usize]
    }

    /// Visits pixel centers inside `area` (already within `self.rect`).
    fn accumulate<F>(&mut self, area: DirtyRect, mut sample: F)
    where
        F: FnMut(Point) -> f32,
    {
        let Some(rect) = self.rect else {
            return;
        };
        let Some(area) = intersect(area, rect) else {
            return;
        };
        for y in area.y..(area.y + area.height) {
            for x in area.x..(area.x + area.width) {
                let value = sample(Point::new(x as f32 + 0.5, y as f32 + 0.5));
                if value > 0.0 {
                    let idx = ((y - rect.y) * rect.width + (x - rect.x)) as usize;
                    if value > self.alpha[idx] {
                        self.alpha[idx] = value.min(1.0);
                    }
                }
            }
        }
    }

    /// Union of round-capped capsules along `points`; one point or a run of
    /// identical points gives a dot.
    pub fn stroke(points: &[Point], stroke_width: f32, width: u32, height: u32) -> Self {
        let Some(first) = points.first().copied() else {
            return Self::default();
        };
        let radius = (stroke_width * 0.5).max(0.5);
        let mut coverage = Self::with_rect(
            DirtyRect::from_bounds(Bounds::from_points(points, radius + 1.0)),
            width,
            height,
        );
        let segments: Vec<(Point, Point)> = if points.len() == 1 {
            vec![(first, first)]
        } else {
            points.windows(2).map(|w| (w[0], w[1])).collect()
        };
        for (start, end) in segments {
            let area = DirtyRect::from_bounds(Bounds::from_points(&[start, end], radius + 1.0));
            coverage.accumulate(area, |p| {
                let d = point_segment_distance_sq(p, start, end).sqrt();
                (radius + 0.5 - d).clamp(0.0, 1.0)
            });
        }
        coverage
    }

    /// Even-odd fill of a closed polygon.
    pub fn polygon(polygon: &[Point], width: u32, height: u32) -> Self {
        if polygon.len() < 3 {
            return Self::default();
        }
        let area = DirtyRect::from_bounds(Bounds::from_points(polygon, 0.5));
        let mut coverage = Self::with_rect(area, width, height);
        coverage.accumulate(area, |p| if point_in_polygon(p, polygon) { 1.0 } else { 0.0 });
        coverage
    }

    /// Coverage of an indexed triangle list, counted once per pixel however
    /// many triangles overlap it.
    pub fn triangles(positions: &[[f32; 2]], indices: &[u32], width: u32, height: u32) -> Self {
        let points: Vec<Point> = positions.iter().map(|p| Point::new(p[0], p[1])).collect();
        if points.is_empty() {
            return Self::default();
        }
        let mut coverage = Self::with_rect(
            DirtyRect::from_bounds(Bounds::from_points(&points, 1.0)),
            width,
            height,
        );
        for tri in indices.chunks_exact(3) {
            let fetch = |i: u32| points.get(i as usize).copied();
            let (Some(a), Some(b), Some(c)) = (fetch(tri[0]), fetch(tri[1]), fetch(tri[2])) else {
                continue;
            };
            let area = DirtyRect::from_bounds(Bounds::from_points(&[a, b, c], 0.5));
            coverage.accumulate(area, |p| if in_triangle(p, a, b, c) { 1.0 } else { 0.0 });
        }
        coverage
    }

    pub fn for_node(node: &RenderNode, width: u32, height: u32) -> Self {
        if node.pfh {
            Self::polygon(node.points(), width, height)
        } else {
            Self::stroke(node.points(), node.stroke_width, width, height)
        }
    }
}

fn intersect(a: DirtyRect, b: DirtyRect) -> Option<DirtyRect> {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.width).min(b.x + b.width);
    let y1 = (a.y + a.height).min(b.y + b.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(DirtyRect {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
    })
}

fn edge(a: Point, b: Point, p: Point) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

fn in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let e0 = edge(a, b, p);
    let e1 = edge(b, c, p);
    let e2 = edge(c, a, p);
    (e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0) || (e0 <= 0.0 && e1 <= 0.0 && e2 <= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::model::{Color, NodeId};

    const RED: [f32; 4] = [1.0, 0.0, 0.0, 1.0];

    #[test]
    fn clamp_drops_offscreen_rects() {
        let rect = DirtyRect {
            x: -10,
            y: -10,
            width: 5,
            height: 5,
        };
        assert_eq!(rect.clamp(100, 100), None);
        let rect = DirtyRect {
            x: 90,
            y: -2,
            width: 20,
            height: 4,
        };
        assert_eq!(
            rect.clamp(100, 100),
            Some(DirtyRect {
                x: 90,
                y: 0,
                width: 10,
                height: 2
            })
        );
    }

    #[test]
    fn stroke_coverage_is_solid_on_centerline_and_empty_far_away() {
        let points = [Point::new(10.0, 20.5), Point::new(50.0, 20.5)];
        let coverage = Coverage::stroke(&points, 6.0, 64, 64);
        assert_eq!(coverage.at(30, 20), 1.0);
        assert_eq!(coverage.at(30, 30), 0.0);
        assert_eq!(coverage.at(60, 20), 0.0);
    }

    #[test]
    fn repeated_point_renders_as_dot() {
        let points = [Point::new(20.5, 20.5), Point::new(20.5, 20.5)];
        let coverage = Coverage::stroke(&points, 8.0, 64, 64);
        assert_eq!(coverage.at(20, 20), 1.0);
        assert_eq!(coverage.at(23, 20), 1.0);
        assert_eq!(coverage.at(27, 20), 0.0);
    }

    #[test]
    fn polygon_coverage_fills_interior() {
        let square = [
            Point::new(10.0, 10.0),
            Point::new(30.0, 10.0),
            Point::new(30.0, 30.0),
            Point::new(10.0, 30.0),
        ];
        let coverage = Coverage::polygon(&square, 64, 64);
        assert_eq!(coverage.at(20, 20), 1.0);
        assert_eq!(coverage.at(40, 20), 0.0);
    }

    #[test]
    fn overlapping_triangles_count_once() {
        let positions = [[0.0, 0.0], [20.0, 0.0], [0.0, 20.0], [20.0, 20.0]];
        let coverage = Coverage::triangles(&positions, &[0, 1, 2, 0, 1, 2, 1, 3, 2], 32, 32);
        assert_eq!(coverage.at(5, 5), 1.0);
        assert_eq!(coverage.at(15, 15), 1.0);
        assert_eq!(coverage.at(25, 25), 0.0);
    }

    #[test]
    fn normal_blend_over_transparent_is_source() {
        let mut frame = RgbaFrame::new(8, 8);
        let coverage = Coverage::stroke(&[Point::new(4.0, 4.0)], 4.0, 8, 8);
        frame.composite(&coverage, RED, CompositeMode::Normal);
        assert_eq!(frame.pixel(4, 4), Some([255, 0, 0, 255]));
    }

    #[test]
    fn erase_clears_alpha_and_multiply_darkens() {
        let mut frame = RgbaFrame::new(8, 8);
        let dot = Coverage::stroke(&[Point::new(4.0, 4.0)], 4.0, 8, 8);
        frame.composite(&dot, [1.0, 1.0, 1.0, 1.0], CompositeMode::Normal);
        frame.composite(&dot, [0.5, 0.5, 0.5, 1.0], CompositeMode::Multiply);
        let px = frame.pixel(4, 4).expect("pixel");
        assert_eq!(px, [128, 128, 128, 255]);

        frame.composite(&dot, RED, CompositeMode::Erase);
        assert_eq!(frame.pixel(4, 4).expect("pixel")[3], 0);
    }

    #[test]
    fn additive_saturates() {
        let mut frame = RgbaFrame::new(4, 4);
        let dot = Coverage::stroke(&[Point::new(2.0, 2.0)], 4.0, 4, 4);
        frame.composite(&dot, [0.75, 0.0, 0.0, 1.0], CompositeMode::Additive);
        frame.composite(&dot, [0.75, 0.0, 0.0, 1.0], CompositeMode::Additive);
        assert_eq!(frame.pixel(2, 2), Some([255, 0, 0, 255]));
    }

    #[test]
    fn eraser_nodes_composite_destructively() {
        let node = RenderNode::new(NodeId(1), NodeRole::EraserPixel, 4.0, Color::default(), 1.0);
        assert_eq!(CompositeMode::for_node(&node), CompositeMode::Erase);
        assert_eq!(node_color(&node)[3], 1.0);
    }
}

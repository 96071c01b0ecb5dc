use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn distance(self, other: Point) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_sq(self, other: Point) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        dx * dx + dy * dy
    }

    pub fn lerp(self, other: Point, t: f32) -> Point {
        Point::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

impl From<(f32, f32)> for Point {
    fn from(value: (f32, f32)) -> Self {
        Point::new(value.0, value.1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_rgba_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Linear `[0, 1]` channels with `opacity` folded into alpha.
    pub fn to_f32_with_opacity(self, opacity: f32) -> [f32; 4] {
        [
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
            f32::from(self.a) / 255.0 * opacity.clamp(0.0, 1.0),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Stroke,
    EraserPixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    /// Bounds of `points` grown by `pad` on every side. Empty input gives a
    /// zero-sized box at the origin.
    pub fn from_points(points: &[Point], pad: f32) -> Self {
        let Some(first) = points.first() else {
            return Bounds::default();
        };
        let mut bounds = Bounds {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bounds.min_x = bounds.min_x.min(p.x);
            bounds.min_y = bounds.min_y.min(p.y);
            bounds.max_x = bounds.max_x.max(p.x);
            bounds.max_y = bounds.max_y.max(p.y);
        }
        bounds.inflate(pad.max(0.0))
    }

    pub fn inflate(self, pad: f32) -> Self {
        Bounds {
            min_x: self.min_x - pad,
            min_y: self.min_y - pad,
            max_x: self.max_x + pad,
            max_y: self.max_y + pad,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && other.min_x <= self.max_x
            && self.min_y <= other.max_y
            && other.min_y <= self.max_y
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RenderNodeRepr")]
pub struct RenderNode {
    pub id: NodeId,
    pub role: NodeRole,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    pub stroke_width: f32,
    points: Vec<Point>,
    pub color: Color,
    pub opacity: f32,
    #[serde(default)]
    pub blend: BlendMode,
    #[serde(default)]
    pub pfh: bool,
    #[serde(skip)]
    bounds: Bounds,
}

/// Wire shape of a node; bounds are rebuilt when it is read back.
#[derive(Deserialize)]
struct RenderNodeRepr {
    id: NodeId,
    role: NodeRole,
    #[serde(default)]
    group_id: Option<GroupId>,
    stroke_width: f32,
    points: Vec<Point>,
    color: Color,
    opacity: f32,
    #[serde(default)]
    blend: BlendMode,
    #[serde(default)]
    pfh: bool,
}

impl From<RenderNodeRepr> for RenderNode {
    fn from(repr: RenderNodeRepr) -> Self {
        let mut node = RenderNode::new(
            repr.id,
            repr.role,
            repr.stroke_width,
            repr.color,
            repr.opacity,
        );
        node.group_id = repr.group_id;
        node.blend = repr.blend;
        node.pfh = repr.pfh;
        node.with_points(repr.points)
    }
}

impl RenderNode {
    pub fn new(id: NodeId, role: NodeRole, stroke_width: f32, color: Color, opacity: f32) -> Self {
        Self {
            id,
            role,
            group_id: None,
            stroke_width,
            points: Vec::new(),
            color,
            opacity,
            blend: BlendMode::Normal,
            pfh: false,
            bounds: Bounds::default(),
        }
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.set_points(points);
        self
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Replaces the geometry; the cached bounds are rebuilt from scratch.
    pub fn set_points(&mut self, points: Vec<Point>) {
        self.points = points;
        self.refresh_bounds();
    }

    pub fn push_point(&mut self, point: Point) {
        self.points.push(point);
        self.refresh_bounds();
    }

    pub fn set_stroke_width(&mut self, width: f32) {
        self.stroke_width = width;
        self.refresh_bounds();
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn refresh_bounds(&mut self) {
        let pad = if self.pfh { 0.5 } else { self.stroke_width * 0.5 };
        self.bounds = Bounds::from_points(&self.points, pad);
    }

    pub fn is_visible(&self) -> bool {
        self.points.len() >= 2
    }

    /// Flattened `x, y` pairs, the layout handed to export collaborators.
    pub fn flat_points(&self) -> Vec<f32> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

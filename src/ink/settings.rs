use crate::ink::model::{BlendMode, Color};
use serde::{Deserialize, Serialize};

const MIN_BASE_WIDTH: f32 = 0.5;
const MAX_BASE_WIDTH: f32 = 128.0;
const MIN_ERASER_THICKNESS: f32 = 1.0;
const MAX_ERASER_THICKNESS: f32 = 512.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Mouse,
    Pen,
    Eraser,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PenKind {
    Writing,
    Highlighter,
    Laser,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EraserKind {
    Pixel,
    Stroke,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NibMode {
    Off,
    Dynamic,
}

/// Post-bake optimize: `Once` applies to the next finalized stroke only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizeMode {
    Off,
    Once,
    Always,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    SceneGraph,
    PathSync,
    GpuBlend,
    GpuPipeline,
}

impl BackendKind {
    pub fn is_gpu(self) -> bool {
        matches!(self, BackendKind::GpuBlend | BackendKind::GpuPipeline)
    }

    pub fn as_label(self) -> &'static str {
        match self {
            BackendKind::SceneGraph => "scene_graph",
            BackendKind::PathSync => "path_sync",
            BackendKind::GpuBlend => "gpu_blend",
            BackendKind::GpuPipeline => "gpu_pipeline",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenPreset {
    pub width_scale: f32,
    pub opacity: f32,
    pub blend: BlendMode,
}

impl PenKind {
    pub fn preset(self) -> PenPreset {
        match self {
            PenKind::Writing => PenPreset {
                width_scale: 1.0,
                opacity: 1.0,
                blend: BlendMode::Normal,
            },
            PenKind::Highlighter => PenPreset {
                width_scale: 3.0,
                opacity: 0.35,
                blend: BlendMode::Multiply,
            },
            PenKind::Laser => PenPreset {
                width_scale: 1.2,
                opacity: 0.9,
                blend: BlendMode::Additive,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InkSettings {
    #[serde(default = "default_tool")]
    pub tool: Tool,
    #[serde(default = "default_pen_kind")]
    pub pen_kind: PenKind,
    #[serde(default = "default_eraser_kind")]
    pub eraser_kind: EraserKind,
    #[serde(default = "default_eraser_thickness")]
    pub eraser_thickness: f32,
    #[serde(default = "default_color")]
    pub color: Color,
    #[serde(default = "default_base_width")]
    pub base_width: f32,
    #[serde(default = "default_multi_touch")]
    pub multi_touch: bool,
    #[serde(default = "default_smoothing")]
    pub smoothing: bool,
    #[serde(default = "default_nib_mode")]
    pub nib_mode: NibMode,
    #[serde(default)]
    pub pressure_look: bool,
    #[serde(default = "default_optimize")]
    pub optimize: OptimizeMode,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(skip)]
    pub undo_revision: u64,
    #[serde(skip)]
    pub redo_revision: u64,
    #[serde(skip)]
    pub clear_revision: u64,
    #[serde(skip)]
    pub optimize_revision: u64,
}

fn default_tool() -> Tool {
    Tool::Pen
}

fn default_pen_kind() -> PenKind {
    PenKind::Writing
}

fn default_eraser_kind() -> EraserKind {
    EraserKind::Stroke
}

fn default_eraser_thickness() -> f32 {
    24.0
}

fn default_color() -> Color {
    Color::rgba(230, 40, 40, 255)
}

fn default_base_width() -> f32 {
    4.0
}

fn default_multi_touch() -> bool {
    true
}

fn default_smoothing() -> bool {
    true
}

fn default_nib_mode() -> NibMode {
    NibMode::Off
}

fn default_optimize() -> OptimizeMode {
    OptimizeMode::Off
}

fn default_backend() -> BackendKind {
    BackendKind::SceneGraph
}

impl Default for InkSettings {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            pen_kind: default_pen_kind(),
            eraser_kind: default_eraser_kind(),
            eraser_thickness: default_eraser_thickness(),
            color: default_color(),
            base_width: default_base_width(),
            multi_touch: default_multi_touch(),
            smoothing: default_smoothing(),
            nib_mode: default_nib_mode(),
            pressure_look: false,
            optimize: default_optimize(),
            backend: default_backend(),
            undo_revision: 0,
            redo_revision: 0,
            clear_revision: 0,
            optimize_revision: 0,
        }
    }
}

impl InkSettings {
    /// Pulls out-of-range widths back into range. Returns whether anything changed.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;

        let width = if self.base_width.is_finite() {
            self.base_width.clamp(MIN_BASE_WIDTH, MAX_BASE_WIDTH)
        } else {
            default_base_width()
        };
        changed |= width != self.base_width;
        self.base_width = width;

        let thickness = if self.eraser_thickness.is_finite() {
            self.eraser_thickness
                .clamp(MIN_ERASER_THICKNESS, MAX_ERASER_THICKNESS)
        } else {
            default_eraser_thickness()
        };
        changed |= thickness != self.eraser_thickness;
        self.eraser_thickness = thickness;

        changed
    }

    pub fn snapshot(&self) -> ToolSnapshot {
        let preset = self.pen_kind.preset();
        ToolSnapshot {
            tool: self.tool,
            pen_kind: self.pen_kind,
            eraser_kind: self.eraser_kind,
            eraser_thickness: self.eraser_thickness,
            color: self.color,
            width: self.base_width * preset.width_scale,
            opacity: preset.opacity,
            blend: preset.blend,
            smoothing: self.smoothing,
            nib_mode: self.nib_mode,
            pressure_look: self.pressure_look,
            optimize: self.optimize,
        }
    }
}

/// Tool state frozen at pointer-down; later settings changes do not affect
/// a stroke already in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolSnapshot {
    pub tool: Tool,
    pub pen_kind: PenKind,
    pub eraser_kind: EraserKind,
    pub eraser_thickness: f32,
    pub color: Color,
    pub width: f32,
    pub opacity: f32,
    pub blend: BlendMode,
    pub smoothing: bool,
    pub nib_mode: NibMode,
    pub pressure_look: bool,
    pub optimize: OptimizeMode,
}

impl ToolSnapshot {
    /// Width used for geometry: the eraser thickness while erasing.
    pub fn working_width(&self) -> f32 {
        match self.tool {
            Tool::Eraser => self.eraser_thickness,
            Tool::Pen | Tool::Mouse => self.width,
        }
    }
}

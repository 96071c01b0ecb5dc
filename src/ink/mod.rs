pub mod engine;
pub mod geometry;
pub mod history;
pub mod input;
pub mod model;
pub mod render;
pub mod replay;
pub mod scene;
pub mod session;
pub mod settings;
pub mod settings_store;
pub mod state;

pub use engine::{BackendStatus, InkEngine, PageExport};
pub use input::{InputController, InputOutcome, PointerEnd, PointerEvent};
pub use model::{BlendMode, Color, GroupId, NodeId, NodeRole, Point, RenderNode};
pub use render::{FrameOutcome, Renderer, RgbaFrame};
pub use settings::{BackendKind, InkSettings};

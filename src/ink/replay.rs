//! Scripted pointer sessions for headless runs and regression tests.

use crate::ink::engine::InkEngine;
use crate::ink::input::PointerEnd;
use crate::ink::render::gpu::GpuProvider;
use crate::ink::render::FrameOutcome;
use crate::ink::session::PointerId;
use crate::ink::settings::InkSettings;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MAX_FRAME_ATTEMPTS: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplayEvent {
    Down {
        pointer: PointerId,
        x: f32,
        y: f32,
        #[serde(default)]
        t: f64,
    },
    Move {
        pointer: PointerId,
        x: f32,
        y: f32,
        #[serde(default)]
        t: f64,
    },
    Up {
        pointer: PointerId,
    },
    Leave {
        pointer: PointerId,
    },
    Cancel {
        pointer: PointerId,
    },
    Bake,
    Frame,
    Undo,
    Redo,
    Clear,
    Optimize,
    Page {
        page: usize,
    },
    Settings {
        settings: InkSettings,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_extent")]
    pub width: u32,
    #[serde(default = "default_extent")]
    pub height: u32,
    #[serde(default)]
    pub settings: InkSettings,
    #[serde(default)]
    pub events: Vec<ReplayEvent>,
}

fn default_extent() -> u32 {
    256
}

pub fn load_script(path: &Path) -> Result<ReplayScript> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading replay script {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("parsing replay script {}", path.display()))
}

/// Feeds every event into a fresh engine. Pending bakes run after each move,
/// the way a host drains them on idle.
pub fn run_script(script: &ReplayScript, provider: Box<dyn GpuProvider>) -> Result<InkEngine> {
    if script.width == 0 || script.height == 0 {
        bail!("surface must be non-empty, got {}x{}", script.width, script.height);
    }
    let mut engine = InkEngine::new(script.settings.clone(), script.width, script.height, provider);
    for (index, event) in script.events.iter().enumerate() {
        tracing::trace!(index, ?event, "replay event");
        match event {
            ReplayEvent::Down { pointer, x, y, t } => {
                engine.pointer_down(*pointer, *x, *y, *t);
            }
            ReplayEvent::Move { pointer, x, y, t } => {
                engine.pointer_move(*pointer, *x, *y, *t);
                engine.run_pending_bakes();
            }
            ReplayEvent::Up { pointer } => {
                engine.pointer_end(*pointer, PointerEnd::Up);
            }
            ReplayEvent::Leave { pointer } => {
                engine.pointer_end(*pointer, PointerEnd::Leave);
            }
            ReplayEvent::Cancel { pointer } => {
                engine.pointer_end(*pointer, PointerEnd::Cancel);
            }
            ReplayEvent::Bake => {
                engine.run_pending_bakes();
            }
            ReplayEvent::Frame => {
                engine.on_frame();
            }
            ReplayEvent::Undo => {
                engine.undo();
            }
            ReplayEvent::Redo => {
                engine.redo();
            }
            ReplayEvent::Clear => {
                engine.clear();
            }
            ReplayEvent::Optimize => {
                engine.optimize_now();
            }
            ReplayEvent::Page { page } => {
                engine.set_page(*page);
            }
            ReplayEvent::Settings { settings } => {
                engine.apply_settings(settings.clone());
            }
        }
    }
    Ok(engine)
}

/// Presents until the backend produces a frame, waiting out a device that is
/// still initializing.
pub fn present(engine: &mut InkEngine) -> Result<usize> {
    for _ in 0..MAX_FRAME_ATTEMPTS {
        match engine.on_frame() {
            FrameOutcome::Presented { drawn } => return Ok(drawn),
            FrameOutcome::NotReady => std::thread::sleep(std::time::Duration::from_millis(5)),
        }
    }
    bail!("backend never became ready")
}

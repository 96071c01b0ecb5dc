use screen_ink::ink::history::ActionKind;
use screen_ink::ink::render::gpu::{NoGpuProvider, SoftwareGpuProvider};
use screen_ink::ink::replay::{load_script, present, run_script, ReplayEvent, ReplayScript};
use screen_ink::ink::settings::BackendKind;
use std::fs;
use tempfile::tempdir;

const SCRIPT: &str = r#"{
    "width": 96,
    "height": 64,
    "settings": { "backend": "gpu_blend", "pressure_look": true },
    "events": [
        { "op": "down", "pointer": 1, "x": 8, "y": 32, "t": 0 },
        { "op": "move", "pointer": 1, "x": 20, "y": 30, "t": 16 },
        { "op": "move", "pointer": 1, "x": 40, "y": 28, "t": 32 },
        { "op": "move", "pointer": 1, "x": 60, "y": 30, "t": 48 },
        { "op": "move", "pointer": 1, "x": 80, "y": 34, "t": 64 },
        { "op": "up", "pointer": 1 },
        { "op": "down", "pointer": 2, "x": 10, "y": 50 },
        { "op": "move", "pointer": 2, "x": 50, "y": 50, "t": 20 },
        { "op": "cancel", "pointer": 2 },
        { "op": "undo" },
        { "op": "frame" }
    ]
}"#;

#[test]
fn script_parses_with_defaults() {
    let script: ReplayScript = serde_json::from_str(r#"{ "events": [ { "op": "clear" } ] }"#)
        .expect("parse minimal script");
    assert_eq!(script.width, 256);
    assert_eq!(script.events, vec![ReplayEvent::Clear]);
    assert_eq!(script.settings.backend, BackendKind::SceneGraph);
}

#[test]
fn replay_produces_frame_and_op_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("script.json");
    fs::write(&path, SCRIPT).unwrap();

    let script = load_script(&path).unwrap();
    let mut engine = run_script(&script, Box::new(SoftwareGpuProvider)).unwrap();
    assert_eq!(present(&mut engine).unwrap(), 1);

    let export = engine.export_page();
    assert_eq!(export.ops.len(), 1);
    assert_eq!(export.ops[0].kind, ActionKind::Add);
    assert!(export.nodes[0].pfh);

    let frame = engine.frame().unwrap();
    assert_eq!((frame.width(), frame.height()), (96, 64));
    assert!(frame.painted_pixel_count() > 0);
}

#[test]
fn replay_without_gpu_still_renders() {
    let script: ReplayScript = serde_json::from_str(SCRIPT).unwrap();
    let mut engine = run_script(&script, Box::new(NoGpuProvider)).unwrap();
    assert_eq!(present(&mut engine).unwrap(), 1);
    assert_eq!(
        engine.backend_status().active,
        Some(BackendKind::SceneGraph)
    );
}

#[test]
fn empty_surface_is_rejected() {
    let script: ReplayScript = serde_json::from_str(r#"{ "width": 0 }"#).unwrap();
    assert!(run_script(&script, Box::new(SoftwareGpuProvider)).is_err());
}

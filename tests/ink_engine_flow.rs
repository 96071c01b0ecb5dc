use anyhow::anyhow;
use screen_ink::ink::history::ActionKind;
use screen_ink::ink::input::{InputOutcome, PointerEnd};
use screen_ink::ink::render::gpu::{
    BoxedDevice, DeviceRequest, GpuInitState, GpuProvider, SoftwareGpu, SoftwareGpuProvider,
    ThreadedGpuProvider,
};
use screen_ink::ink::replay::present;
use screen_ink::ink::settings::{BackendKind, EraserKind, NibMode, Tool};
use screen_ink::ink::{FrameOutcome, InkEngine, InkSettings};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;

type DeviceSender = Sender<anyhow::Result<BoxedDevice>>;

/// Hands the device sender to the test so it decides when the GPU is ready.
#[derive(Default, Clone)]
struct ManualProvider {
    sender: Rc<RefCell<Option<DeviceSender>>>,
}

impl GpuProvider for ManualProvider {
    fn request_device(&self, _width: u32, _height: u32) -> DeviceRequest {
        let (tx, request) = DeviceRequest::channel();
        *self.sender.borrow_mut() = Some(tx);
        request
    }
}

impl ManualProvider {
    fn resolve(&self, result: anyhow::Result<BoxedDevice>) {
        let sender = self.sender.borrow_mut().take().expect("pending request");
        sender.send(result).expect("engine still listening");
    }
}

fn settings_with(backend: BackendKind) -> InkSettings {
    let mut settings = InkSettings::default();
    settings.backend = backend;
    settings
}

fn scribble(engine: &mut InkEngine, pointer: u64, y: f32) {
    engine.pointer_down(pointer, 8.0, y, 0.0);
    for i in 1..=16 {
        engine.pointer_move(pointer, 8.0 + i as f32 * 6.0, y, i as f64 * 10.0);
    }
    engine.pointer_end(pointer, PointerEnd::Up);
}

#[test]
fn draws_before_gpu_ready_are_skipped_then_presented() {
    let provider = ManualProvider::default();
    let mut engine = InkEngine::new(
        settings_with(BackendKind::GpuPipeline),
        128,
        128,
        Box::new(provider.clone()),
    );
    assert_eq!(engine.backend_status().gpu, GpuInitState::Initializing);
    assert_eq!(engine.backend_status().active, None);

    scribble(&mut engine, 1, 40.0);
    assert_eq!(engine.on_frame(), FrameOutcome::NotReady);
    assert!(engine.frame().is_none());

    let device: BoxedDevice = Box::new(SoftwareGpu::new(128, 128));
    provider.resolve(Ok(device));
    assert_eq!(engine.on_frame(), FrameOutcome::Presented { drawn: 1 });
    let status = engine.backend_status();
    assert_eq!(status.gpu, GpuInitState::Ready);
    assert_eq!(status.active, Some(BackendKind::GpuPipeline));
}

#[test]
fn late_gpu_failure_falls_back_with_every_node() {
    let provider = ManualProvider::default();
    let mut engine = InkEngine::new(
        settings_with(BackendKind::GpuBlend),
        128,
        128,
        Box::new(provider.clone()),
    );
    scribble(&mut engine, 1, 20.0);
    scribble(&mut engine, 2, 60.0);
    assert_eq!(engine.on_frame(), FrameOutcome::NotReady);

    provider.resolve(Err(anyhow!("adapter lost")));
    assert_eq!(engine.on_frame(), FrameOutcome::Presented { drawn: 2 });
    let status = engine.backend_status();
    assert_eq!(status.active, Some(BackendKind::SceneGraph));
    assert_eq!(status.gpu, GpuInitState::Failed);
    assert!(status
        .fallback_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("adapter lost")));
}

#[test]
fn threaded_device_eventually_presents() {
    let mut engine = InkEngine::new(
        settings_with(BackendKind::GpuBlend),
        64,
        64,
        Box::new(ThreadedGpuProvider),
    );
    scribble(&mut engine, 1, 30.0);
    assert_eq!(present(&mut engine).expect("device ready"), 1);
    assert_eq!(engine.backend_status().gpu, GpuInitState::Ready);
}

#[test]
fn erase_undo_redo_round_trip() {
    let mut engine = InkEngine::new(
        settings_with(BackendKind::SceneGraph),
        128,
        128,
        Box::new(SoftwareGpuProvider),
    );
    let mut settings = engine.settings().clone();
    settings.nib_mode = NibMode::Dynamic;
    engine.apply_settings(settings.clone());
    scribble(&mut engine, 1, 30.0);
    let nib_nodes = engine.scene().len();
    assert!(nib_nodes > 1);

    settings.nib_mode = NibMode::Off;
    engine.apply_settings(settings.clone());
    scribble(&mut engine, 2, 90.0);
    let before = engine.scene().snapshot();

    settings.tool = Tool::Eraser;
    settings.eraser_kind = EraserKind::Stroke;
    engine.apply_settings(settings);
    engine.pointer_down(3, 50.0, 30.0, 500.0);
    let outcome = engine.pointer_end(3, PointerEnd::Up);
    assert_eq!(outcome, InputOutcome::Finalized(Some(ActionKind::Remove)));
    assert_eq!(engine.scene().len(), 1);

    assert!(engine.undo());
    assert_eq!(engine.scene().snapshot(), before);
    assert!(engine.redo());
    assert_eq!(engine.scene().len(), 1);
    assert!(!engine.redo());
    assert_eq!(engine.on_frame(), FrameOutcome::Presented { drawn: 1 });
}

#[test]
fn duplicate_termination_signals_push_one_action() {
    let mut engine = InkEngine::new(
        settings_with(BackendKind::SceneGraph),
        64,
        64,
        Box::new(SoftwareGpuProvider),
    );
    engine.pointer_down(7, 4.0, 4.0, 0.0);
    engine.pointer_move(7, 30.0, 30.0, 20.0);
    assert!(matches!(
        engine.pointer_end(7, PointerEnd::Leave),
        InputOutcome::Finalized(Some(ActionKind::Add))
    ));
    assert_eq!(engine.pointer_end(7, PointerEnd::Up), InputOutcome::Ignored);
    assert_eq!(engine.pointer_end(7, PointerEnd::Cancel), InputOutcome::Ignored);
    assert_eq!(engine.export_page().ops.len(), 1);
}

#[test]
fn clear_during_capture_keeps_the_live_stroke_out_of_history() {
    let mut engine = InkEngine::new(
        settings_with(BackendKind::SceneGraph),
        128,
        128,
        Box::new(SoftwareGpuProvider),
    );
    scribble(&mut engine, 1, 20.0);
    let committed = engine.scene().snapshot();

    engine.pointer_down(2, 8.0, 80.0, 1_000.0);
    for i in 1..=10 {
        engine.pointer_move(2, 8.0 + i as f32 * 8.0, 80.0, 1_000.0 + i as f64 * 10.0);
    }
    let mut settings = engine.settings().clone();
    settings.clear_revision += 1;
    engine.apply_settings(settings);
    assert_eq!(engine.scene().len(), 1);
    assert!(committed.iter().all(|n| !engine.scene().contains(n.id)));

    assert_eq!(
        engine.pointer_end(2, PointerEnd::Up),
        InputOutcome::Finalized(Some(ActionKind::Add))
    );
    assert!(engine.undo());
    assert!(engine.scene().is_empty());
    assert!(engine.undo());
    assert_eq!(engine.scene().snapshot(), committed);
}

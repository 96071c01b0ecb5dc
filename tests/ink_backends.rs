use screen_ink::ink::input::PointerEnd;
use screen_ink::ink::render::gpu::SoftwareGpuProvider;
use screen_ink::ink::settings::{BackendKind, PenKind};
use screen_ink::ink::{FrameOutcome, InkEngine, InkSettings, NodeId};
use std::cell::RefCell;
use std::rc::Rc;

const BACKENDS: [BackendKind; 4] = [
    BackendKind::SceneGraph,
    BackendKind::PathSync,
    BackendKind::GpuBlend,
    BackendKind::GpuPipeline,
];

fn draw_line(engine: &mut InkEngine, pointer: u64, from: (f32, f32), to: (f32, f32)) {
    engine.pointer_down(pointer, from.0, from.1, 0.0);
    for i in 1..=20 {
        let t = i as f32 / 20.0;
        engine.pointer_move(
            pointer,
            from.0 + (to.0 - from.0) * t,
            from.1 + (to.1 - from.1) * t,
            i as f64 * 12.0,
        );
        engine.run_pending_bakes();
    }
    engine.pointer_end(pointer, PointerEnd::Up);
}

fn scripted_engine(backend: BackendKind) -> InkEngine {
    let mut settings = InkSettings::default();
    settings.backend = backend;
    let mut engine = InkEngine::new(settings.clone(), 128, 128, Box::new(SoftwareGpuProvider));

    draw_line(&mut engine, 1, (10.0, 20.0), (110.0, 20.0));
    settings.pen_kind = PenKind::Highlighter;
    engine.apply_settings(settings.clone());
    draw_line(&mut engine, 2, (10.0, 60.0), (110.0, 70.0));
    settings.pen_kind = PenKind::Laser;
    engine.apply_settings(settings);
    draw_line(&mut engine, 3, (60.0, 5.0), (60.0, 120.0));
    engine
}

#[test]
fn every_backend_visits_the_same_nodes_in_paint_order() {
    let mut visits_per_backend = Vec::new();
    for backend in BACKENDS {
        let mut engine = scripted_engine(backend);
        let visited = Rc::new(RefCell::new(Vec::<NodeId>::new()));
        let sink = Rc::clone(&visited);
        engine.set_visit_hook(Some(Box::new(move |id| sink.borrow_mut().push(id))));

        let outcome = engine.on_frame();
        assert_eq!(outcome, FrameOutcome::Presented { drawn: 3 }, "{backend:?}");
        assert_eq!(engine.backend_status().active, Some(backend));

        let visited = visited.borrow().clone();
        assert_eq!(visited, engine.scene().ids().to_vec(), "{backend:?}");
        visits_per_backend.push(visited);
    }
    assert!(visits_per_backend.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn visit_hook_survives_backend_switch() {
    let mut engine = scripted_engine(BackendKind::SceneGraph);
    let count = Rc::new(RefCell::new(0_usize));
    let sink = Rc::clone(&count);
    engine.set_visit_hook(Some(Box::new(move |_| *sink.borrow_mut() += 1)));
    engine.on_frame();

    let mut settings = engine.settings().clone();
    settings.backend = BackendKind::GpuBlend;
    engine.apply_settings(settings);
    engine.on_frame();
    assert_eq!(*count.borrow(), 6);
}

#[test]
fn software_backends_paint_the_same_ink() {
    let mut scene_graph = scripted_engine(BackendKind::SceneGraph);
    let mut path_sync = scripted_engine(BackendKind::PathSync);
    scene_graph.on_frame();
    path_sync.on_frame();

    let a = scene_graph.frame().expect("scene graph frame");
    let b = path_sync.frame().expect("path sync frame");
    assert!(a.painted_pixel_count() > 0);
    assert_eq!(a.pixels(), b.pixels());
}

#[test]
fn gpu_backends_cover_the_stroke_centerline() {
    for backend in [BackendKind::GpuBlend, BackendKind::GpuPipeline] {
        let mut engine = scripted_engine(backend);
        engine.on_frame();
        let frame = engine.frame().expect("gpu frame");
        let px = frame.pixel(30, 20).expect("pixel");
        assert_eq!(px[3], 255, "{backend:?}");
    }
}

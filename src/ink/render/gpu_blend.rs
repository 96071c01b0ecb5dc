use crate::ink::model::{NodeId, RenderNode};
use crate::ink::render::gpu::BoxedDevice;
use crate::ink::render::raster::{CompositeMode, RgbaFrame};
use crate::ink::render::tessellate::tessellate_node;
use crate::ink::render::{FrameOutcome, HookSlot, Renderer, VisitHook};
use crate::ink::scene::Scene;
use crate::ink::settings::BackendKind;

/// Immediate-mode GPU backend. Holds no per-node state: every frame walks the
/// scene, tessellates each node and switches blend state only when it changes
/// between consecutive draws.
pub struct GpuBlendRenderer {
    device: BoxedDevice,
    hook: HookSlot,
}

impl std::fmt::Debug for GpuBlendRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBlendRenderer")
            .field("device", &self.device.label())
            .finish_non_exhaustive()
    }
}

impl GpuBlendRenderer {
    pub fn new(device: BoxedDevice) -> Self {
        Self {
            device,
            hook: HookSlot::default(),
        }
    }
}

impl Renderer for GpuBlendRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::GpuBlend
    }

    fn add_node(&mut self, _node: &RenderNode) {}

    fn remove_node(&mut self, _id: NodeId) {}

    fn mark_dirty(&mut self, _node: &RenderNode) {}

    fn clear_nodes(&mut self) {}

    fn resize(&mut self, width: u32, height: u32, _scene: &Scene) {
        self.device.resize(width, height);
    }

    fn present(&mut self, scene: &Scene) -> FrameOutcome {
        self.device.begin_frame();
        let mut current: Option<CompositeMode> = None;
        let mut drawn = 0;
        for node in scene.nodes().filter(|n| n.is_visible()) {
            let mesh = tessellate_node(node);
            if mesh.is_empty() {
                continue;
            }
            let mode = CompositeMode::for_node(node);
            if current != Some(mode) {
                self.device.set_blend(mode);
                current = Some(mode);
            }
            self.hook.visit(node.id);
            self.device.draw_mesh(&mesh);
            drawn += 1;
        }
        self.device.end_frame();
        FrameOutcome::Presented { drawn }
    }

    fn frame(&self) -> Option<&RgbaFrame> {
        Some(self.device.frame())
    }

    fn set_visit_hook(&mut self, hook: Option<VisitHook>) {
        self.hook.set(hook);
    }

    fn take_visit_hook(&mut self) -> Option<VisitHook> {
        self.hook.take()
    }
}

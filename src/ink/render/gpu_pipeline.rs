use crate::ink::model::{NodeId, RenderNode};
use crate::ink::render::gpu::{BoxedDevice, PipelineDesc, PipelineId};
use crate::ink::render::raster::{CompositeMode, RgbaFrame};
use crate::ink::render::tessellate::{tessellate_node, Mesh};
use crate::ink::render::{FrameOutcome, HookSlot, Renderer, VisitHook};
use crate::ink::scene::Scene;
use crate::ink::settings::BackendKind;
use anyhow::{Context, Result};
use std::collections::{BTreeMap, HashMap};

fn pipeline_label(mode: CompositeMode) -> &'static str {
    match mode {
        CompositeMode::Normal => "ink-paint-normal",
        CompositeMode::Multiply => "ink-paint-multiply",
        CompositeMode::Additive => "ink-paint-additive",
        CompositeMode::Erase => "ink-erase",
    }
}

/// Pipeline-object GPU backend: one paint pipeline per blend mode plus an
/// erase pipeline, all created up front. Meshes are cached per node and
/// re-tessellated when the node is marked dirty.
pub struct GpuPipelineRenderer {
    device: BoxedDevice,
    pipelines: HashMap<CompositeMode, PipelineId>,
    meshes: BTreeMap<NodeId, (CompositeMode, Mesh)>,
    hook: HookSlot,
}

impl std::fmt::Debug for GpuPipelineRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuPipelineRenderer")
            .field("device", &self.device.label())
            .field("pipelines", &self.pipelines.len())
            .field("meshes", &self.meshes.len())
            .finish_non_exhaustive()
    }
}

impl GpuPipelineRenderer {
    pub fn new(mut device: BoxedDevice) -> Result<Self> {
        let mut pipelines = HashMap::new();
        for mode in CompositeMode::ALL {
            let label = pipeline_label(mode);
            let id = device
                .create_pipeline(PipelineDesc {
                    label: label.to_string(),
                    mode,
                })
                .with_context(|| format!("creating pipeline {label}"))?;
            pipelines.insert(mode, id);
        }
        tracing::debug!(device = device.label(), "gpu pipelines ready");
        Ok(Self {
            device,
            pipelines,
            meshes: BTreeMap::new(),
            hook: HookSlot::default(),
        })
    }

    pub fn cached_meshes(&self) -> usize {
        self.meshes.len()
    }

    fn upload(&mut self, node: &RenderNode) {
        if !node.is_visible() {
            self.meshes.remove(&node.id);
            return;
        }
        let mesh = tessellate_node(node);
        self.meshes
            .insert(node.id, (CompositeMode::for_node(node), mesh));
    }
}

impl Renderer for GpuPipelineRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::GpuPipeline
    }

    fn add_node(&mut self, node: &RenderNode) {
        if !self.meshes.contains_key(&node.id) {
            self.upload(node);
        }
    }

    fn remove_node(&mut self, id: NodeId) {
        self.meshes.remove(&id);
    }

    fn mark_dirty(&mut self, node: &RenderNode) {
        self.upload(node);
    }

    fn clear_nodes(&mut self) {
        self.meshes.clear();
    }

    fn resize(&mut self, width: u32, height: u32, _scene: &Scene) {
        self.device.resize(width, height);
    }

    fn present(&mut self, _scene: &Scene) -> FrameOutcome {
        self.device.begin_frame();
        let mut drawn = 0;
        for (id, (mode, mesh)) in &self.meshes {
            if mesh.is_empty() {
                continue;
            }
            let Some(pipeline) = self.pipelines.get(mode).copied() else {
                continue;
            };
            self.hook.visit(*id);
            match self.device.draw_with_pipeline(pipeline, mesh) {
                Ok(()) => drawn += 1,
                Err(err) => tracing::warn!(node = id.0, ?err, "pipeline draw failed"),
            }
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

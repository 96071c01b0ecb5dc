//! Device abstraction for the two GPU backends.
//!
//! A [`GpuProvider`] hands out a [`DeviceRequest`] that resolves later over an
//! mpsc channel. The façade polls it with `try_recv` once per frame and never
//! blocks on device acquisition.

use crate::ink::render::raster::{CompositeMode, Coverage, RgbaFrame};
use crate::ink::render::tessellate::Mesh;
use anyhow::{anyhow, bail, Result};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuInitState {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDesc {
    pub label: String,
    pub mode: CompositeMode,
}

/// Both command styles the backends use: immediate blend-state switching and
/// pre-built pipeline objects.
pub trait GpuDevice: Send {
    fn label(&self) -> &str;

    fn resize(&mut self, width: u32, height: u32);

    fn begin_frame(&mut self);

    fn set_blend(&mut self, mode: CompositeMode);

    fn draw_mesh(&mut self, mesh: &Mesh);

    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<PipelineId>;

    fn draw_with_pipeline(&mut self, pipeline: PipelineId, mesh: &Mesh) -> Result<()>;

    fn end_frame(&mut self);

    fn frame(&self) -> &RgbaFrame;
}

pub type BoxedDevice = Box<dyn GpuDevice>;

pub enum RequestPoll {
    Pending,
    Ready(BoxedDevice),
    Failed(anyhow::Error),
}

/// Handle to an in-flight device acquisition.
pub struct DeviceRequest {
    receiver: Receiver<Result<BoxedDevice>>,
}

impl std::fmt::Debug for DeviceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRequest").finish_non_exhaustive()
    }
}

impl DeviceRequest {
    pub fn channel() -> (Sender<Result<BoxedDevice>>, DeviceRequest) {
        let (tx, rx) = mpsc::channel();
        (tx, DeviceRequest { receiver: rx })
    }

    pub fn ready(device: BoxedDevice) -> Self {
        let (tx, request) = Self::channel();
        let _ = tx.send(Ok(device));
        request
    }

    pub fn failed(err: anyhow::Error) -> Self {
        let (tx, request) = Self::channel();
        let _ = tx.send(Err(err));
        request
    }

    pub fn poll(&mut self) -> RequestPoll {
        match self.receiver.try_recv() {
            Ok(Ok(device)) => RequestPoll::Ready(device),
            Ok(Err(err)) => RequestPoll::Failed(err),
            Err(TryRecvError::Empty) => RequestPoll::Pending,
            Err(TryRecvError::Disconnected) => {
                RequestPoll::Failed(anyhow!("device request dropped before completion"))
            }
        }
    }
}

pub trait GpuProvider {
    fn request_device(&self, width: u32, height: u32) -> DeviceRequest;
}

/// CPU implementation of [`GpuDevice`]: every draw call rasterizes its
/// triangles into one coverage mask and composites it with the active blend.
#[derive(Debug)]
pub struct SoftwareGpu {
    frame: RgbaFrame,
    blend: CompositeMode,
    pipelines: Vec<PipelineDesc>,
    draw_calls: u64,
    blend_switches: u64,
    in_frame: bool,
}

impl SoftwareGpu {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaFrame::new(width, height),
            blend: CompositeMode::Normal,
            pipelines: Vec::new(),
            draw_calls: 0,
            blend_switches: 0,
            in_frame: false,
        }
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn blend_switches(&self) -> u64 {
        self.blend_switches
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn rasterize(&mut self, mesh: &Mesh, mode: CompositeMode) {
        let Some(color) = mesh.color() else {
            return;
        };
        let coverage = Coverage::triangles(
            &mesh.positions(),
            &mesh.indices,
            self.frame.width(),
            self.frame.height(),
        );
        self.frame.composite(&coverage, color, mode);
        self.draw_calls += 1;
    }
}

impl GpuDevice for SoftwareGpu {
    fn label(&self) -> &str {
        "software"
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.frame.resize(width, height);
    }

    fn begin_frame(&mut self) {
        self.frame.clear();
        self.in_frame = true;
    }

    fn set_blend(&mut self, mode: CompositeMode) {
        if self.blend != mode {
            self.blend_switches += 1;
        }
        self.blend = mode;
    }

    fn draw_mesh(&mut self, mesh: &Mesh) {
        if !self.in_frame {
            return;
        }
        let mode = self.blend;
        self.rasterize(mesh, mode);
    }

    fn create_pipeline(&mut self, desc: PipelineDesc) -> Result<PipelineId> {
        if let Some(existing) = self.pipelines.iter().position(|p| p.label == desc.label) {
            bail!("pipeline {:?} already exists as #{existing}", desc.label);
        }
        self.pipelines.push(desc);
        Ok(PipelineId(self.pipelines.len() as u32 - 1))
    }

    fn draw_with_pipeline(&mut self, pipeline: PipelineId, mesh: &Mesh) -> Result<()> {
        let Some(desc) = self.pipelines.get(pipeline.0 as usize) else {
            bail!("unknown pipeline #{}", pipeline.0);
        };
        let mode = desc.mode;
        if self.in_frame {
            self.rasterize(mesh, mode);
        }
        Ok(())
    }

    fn end_frame(&mut self) {
        self.in_frame = false;
    }

    fn frame(&self) -> &RgbaFrame {
        &self.frame
    }
}

/// Resolves immediately with a [`SoftwareGpu`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareGpuProvider;

impl GpuProvider for SoftwareGpuProvider {
    fn request_device(&self, width: u32, height: u32) -> DeviceRequest {
        DeviceRequest::ready(Box::new(SoftwareGpu::new(width, height)))
    }
}

/// Builds the device on a worker thread, like a real adapter request.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedGpuProvider;

impl GpuProvider for ThreadedGpuProvider {
    fn request_device(&self, width: u32, height: u32) -> DeviceRequest {
        let (tx, request) = DeviceRequest::channel();
        let spawned = thread::Builder::new()
            .name("ink-gpu-init".into())
            .spawn(move || {
                let device: BoxedDevice = Box::new(SoftwareGpu::new(width, height));
                let _ = tx.send(Ok(device));
            });
        match spawned {
            Ok(_) => request,
            Err(err) => DeviceRequest::failed(anyhow!(err).context("spawning gpu init thread")),
        }
    }
}

/// For hosts without a usable adapter; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoGpuProvider;

impl GpuProvider for NoGpuProvider {
    fn request_device(&self, _width: u32, _height: u32) -> DeviceRequest {
        DeviceRequest::failed(anyhow!("no GPU adapter available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ink::model::Point;
    use crate::ink::render::tessellate::tessellate_polyline;

    #[test]
    fn ready_request_resolves_on_first_poll() {
        let mut request = SoftwareGpuProvider.request_device(8, 8);
        assert!(matches!(request.poll(), RequestPoll::Ready(_)));
        assert!(matches!(request.poll(), RequestPoll::Failed(_)));
    }

    #[test]
    fn pending_until_sender_delivers() {
        let (tx, mut request) = DeviceRequest::channel();
        assert!(matches!(request.poll(), RequestPoll::Pending));
        let device: BoxedDevice = Box::new(SoftwareGpu::new(4, 4));
        tx.send(Ok(device)).expect("send device");
        assert!(matches!(request.poll(), RequestPoll::Ready(_)));
    }

    #[test]
    fn dropped_sender_is_a_failure() {
        let (tx, mut request) = DeviceRequest::channel();
        drop(tx);
        assert!(matches!(request.poll(), RequestPoll::Failed(_)));
        assert!(matches!(
            NoGpuProvider.request_device(4, 4).poll(),
            RequestPoll::Failed(_)
        ));
    }

    #[test]
    fn duplicate_pipeline_labels_are_rejected() {
        let mut gpu = SoftwareGpu::new(4, 4);
        let desc = PipelineDesc {
            label: "paint-normal".into(),
            mode: CompositeMode::Normal,
        };
        assert_eq!(gpu.create_pipeline(desc.clone()).expect("pipeline"), PipelineId(0));
        assert!(gpu.create_pipeline(desc).is_err());
        assert!(gpu.draw_with_pipeline(PipelineId(7), &Mesh::default()).is_err());
    }

    #[test]
    fn draws_outside_a_frame_are_ignored() {
        let mut gpu = SoftwareGpu::new(16, 16);
        let mesh = tessellate_polyline(&[Point::new(2.0, 8.0), Point::new(14.0, 8.0)], 4.0, [1.0, 1.0, 1.0, 1.0]);
        gpu.draw_mesh(&mesh);
        assert_eq!(gpu.draw_calls(), 0);

        gpu.begin_frame();
        gpu.draw_mesh(&mesh);
        gpu.end_frame();
        assert_eq!(gpu.draw_calls(), 1);
        assert_eq!(gpu.frame().pixel(8, 8), Some([255, 255, 255, 255]));
    }
}

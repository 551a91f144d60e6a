//! Messages exchanged between the client, the marshal and its workers.
//!
//! Nothing is shared between threads except what these messages carry.

use std::sync::Arc;
use std::time::Duration;

use wray_core::{RenderError, SceneSettings};
use wray_renderer::SurfaceBuffer;

/// Client → marshal.
#[derive(Debug, Clone)]
pub enum MarshalCommand {
    /// Replace the scene. Answered by `ReadyToRender` once every worker has built it.
    AssignRenderSettings(Arc<SceneSettings>),
    /// Render for the given wall-clock time. Answered by `RenderingFinished`.
    Render { duration_ms: u64 },
    /// Collect and merge the workers' surfaces. Answered by `RenderBuffer`.
    UploadRenderBuffer { flatten: bool },
    Shutdown,
}

/// Marshal → client.
#[derive(Debug, Clone, PartialEq)]
pub enum MarshalEvent {
    ThreadInitialized,
    ReadyToRender,
    RenderingFinished(RenderStats),
    RenderingFailed(RenderError),
    RenderBuffer(RenderBuffer),
    WorkerInitializationFailed(RenderError),
}

/// Aggregate statistics of one render round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderStats {
    /// Mean over workers of each worker's median per-pixel sample count
    pub avg_samples_per_pixel: f64,
    /// Sum over workers
    pub samples_per_second: u64,
}

/// Merged render result handed to display or image codecs.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderBuffer {
    pub width: usize,
    pub height: usize,
    /// Linear RGBA, row-major, top row first
    pub pixels: Vec<f64>,
    pub avg_samples_per_pixel: f64,
}

/// Scene assignment as sent to one worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub scene: Arc<SceneSettings>,
    pub generation: u64,
}

/// Marshal → worker.
#[derive(Debug, Clone)]
pub enum WorkerCommand {
    AssignRenderSettings(WorkerSettings),
    Render { duration: Duration },
    UploadRenderBuffer,
    Wipe,
    Shutdown,
}

/// Worker → marshal, tagged with the sender and its settings generation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReply {
    pub worker: usize,
    pub generation: u64,
    pub message: WorkerMessage,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    ThreadInitialized,
    ReadyToRender,
    RenderingFinished {
        avg_samples_per_pixel: u32,
        samples_per_second: u64,
    },
    RenderingFailed {
        reason: String,
    },
    /// `None` when the worker has nothing valid to upload.
    RenderBuffer(Option<SurfaceBuffer>),
}

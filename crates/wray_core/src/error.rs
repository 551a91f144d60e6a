//! Error taxonomy for scene assignment, rendering and coordination.

use thiserror::Error;

use crate::config::MAX_RENDER_DURATION_MS;

/// Everything that can go wrong between receiving a scene and returning pixels.
///
/// Errors are `Clone` so they can travel between worker threads and the
/// marshal inside messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Missing or invalid settings, rejected before any worker is spawned.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed scene geometry.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Render duration outside `(0, MAX_RENDER_DURATION_MS)`.
    #[error("render duration of {0} ms is out of bounds (expected 0 < ms < {max})", max = MAX_RENDER_DURATION_MS)]
    Bounds(u64),

    /// The marshal is not in a state where it can serve the request.
    #[error("{0}")]
    NotReady(String),

    /// A worker reported in while in an impossible state.
    #[error("worker initialization failed: {0}")]
    WorkerInitialization(String),

    /// A single worker could not complete its round.
    #[error("worker #{worker} failed: {reason}")]
    RenderingFailure { worker: usize, reason: String },

    /// One or more workers failed during a round.
    #[error("rendering failed: {}", join_failures(.0))]
    AggregateFailure(Vec<RenderError>),

    /// An internal invariant was violated; the unit that raised it is done.
    #[error("assertion failed: {0}")]
    FatalAssertion(String),
}

fn join_failures(failures: &[RenderError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Errors that can occur while reading a scene description.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Invalid(#[from] RenderError),
}

//! Multi-threaded progressive rendering for Wray.
//!
//! A [`Marshal`] owns a pool of render workers, each with its own copy of the
//! scene and its own accumulation surface. Clients talk to it through
//! [`MarshalCommand`]s and [`MarshalEvent`]s, or through the blocking
//! [`RenderSession`] wrapper.

pub mod marshal;
pub mod message;
pub mod session;
pub mod worker;

pub use marshal::{Coordinator, Marshal};
pub use message::{
    MarshalCommand, MarshalEvent, RenderBuffer, RenderStats, WorkerCommand, WorkerMessage,
    WorkerReply, WorkerSettings,
};
pub use session::RenderSession;
pub use worker::{ThreadSpawner, Worker, WorkerHandle, WorkerPhase, WorkerSpawner};

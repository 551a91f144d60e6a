//! Render worker: owns a private BVH and surface, samples on request.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::SeedableRng;
use wray_core::{RenderError, RenderResult};
use wray_renderer::{render_for, RenderScene, Surface};

use crate::message::{WorkerCommand, WorkerMessage, WorkerReply, WorkerSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Uninitialized,
    BuildingScene,
    ReadyToRender,
    Rendering,
    /// Terminal. Every later request is answered with a failure.
    Failed,
}

/// Marshal-side handle of a worker.
#[derive(Debug)]
pub struct WorkerHandle {
    pub id: usize,
    pub commands: Sender<WorkerCommand>,
    pub thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn send(&self, command: WorkerCommand) {
        if self.commands.send(command).is_err() {
            log::warn!("Worker #{} is no longer listening", self.id);
        }
    }
}

/// Creates workers for the marshal.
pub trait WorkerSpawner: Send {
    fn spawn(
        &mut self,
        id: usize,
        generation: u64,
        replies: Sender<WorkerReply>,
    ) -> RenderResult<WorkerHandle>;
}

/// Spawns each worker on its own OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl WorkerSpawner for ThreadSpawner {
    fn spawn(
        &mut self,
        id: usize,
        generation: u64,
        replies: Sender<WorkerReply>,
    ) -> RenderResult<WorkerHandle> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name(format!("wray-worker-{id}"))
            .spawn(move || Worker::new(id, generation, replies).run(rx))
            .map_err(|e| {
                RenderError::WorkerInitialization(format!("could not spawn worker #{id}: {e}"))
            })?;

        Ok(WorkerHandle {
            id,
            commands: tx,
            thread: Some(thread),
        })
    }
}

/// Per-thread worker state.
pub struct Worker {
    id: usize,
    generation: u64,
    phase: WorkerPhase,
    replies: Sender<WorkerReply>,
    scene: Option<RenderScene>,
    surface: Option<Surface>,
    rng: StdRng,
}

impl Worker {
    pub fn new(id: usize, generation: u64, replies: Sender<WorkerReply>) -> Self {
        Self {
            id,
            generation,
            phase: WorkerPhase::Uninitialized,
            replies,
            scene: None,
            surface: None,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Announce the thread, then serve commands until shut down.
    pub fn run(mut self, commands: Receiver<WorkerCommand>) {
        self.reply(WorkerMessage::ThreadInitialized);

        for command in commands.iter() {
            if !self.handle(command) {
                break;
            }
        }
        log::debug!("Worker #{} exiting", self.id);
    }

    /// Handle one command. Returns false when the worker should stop.
    pub fn handle(&mut self, command: WorkerCommand) -> bool {
        match command {
            WorkerCommand::AssignRenderSettings(settings) => self.assign(settings),
            WorkerCommand::Render { duration } => self.render(duration),
            WorkerCommand::UploadRenderBuffer => {
                let buffer = match self.phase {
                    WorkerPhase::Failed => None,
                    _ => self.surface.as_ref().map(Surface::to_raw),
                };
                self.reply(WorkerMessage::RenderBuffer(buffer));
            }
            WorkerCommand::Wipe => {
                if let Some(surface) = &mut self.surface {
                    surface.wipe();
                }
            }
            WorkerCommand::Shutdown => return false,
        }
        true
    }

    fn assign(&mut self, settings: WorkerSettings) {
        self.generation = settings.generation;

        if self.phase == WorkerPhase::Failed {
            self.fail_again();
            return;
        }

        self.phase = WorkerPhase::BuildingScene;
        self.scene = None;
        self.surface = None;

        let built = RenderScene::from_settings(&settings.scene, &mut self.rng).and_then(|scene| {
            let (width, height) = scene.camera().viewport();
            Ok((scene, Surface::new(width, height)?))
        });

        match built {
            Ok((scene, surface)) => {
                log::debug!(
                    "Worker #{} built a BVH of {} triangles",
                    self.id,
                    scene.bvh().triangle_count()
                );
                self.scene = Some(scene);
                self.surface = Some(surface);
                self.phase = WorkerPhase::ReadyToRender;
                self.reply(WorkerMessage::ReadyToRender);
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    fn render(&mut self, duration: Duration) {
        if self.phase == WorkerPhase::Failed {
            self.fail_again();
            return;
        }

        let invalid = match (&self.scene, &self.surface) {
            (None, _) => Some("Invalid BVH tree"),
            (_, None) => Some("Invalid render surface"),
            (Some(scene), Some(surface)) => {
                (scene.camera().viewport() != (surface.width(), surface.height()))
                    .then_some("Invalid render surface")
            }
        };
        if let Some(reason) = invalid {
            self.reply_failure(reason);
            return;
        }
        let (Some(scene), Some(surface)) = (&self.scene, &mut self.surface) else {
            return;
        };

        self.phase = WorkerPhase::Rendering;
        let stats = render_for(
            scene.camera(),
            scene.bvh(),
            scene.config(),
            surface,
            duration,
            &mut self.rng,
        );
        let avg_samples_per_pixel = surface.median_sample_count();
        self.phase = WorkerPhase::ReadyToRender;

        log::debug!(
            "Worker #{} took {} samples in {:.2?}",
            self.id,
            stats.samples,
            stats.elapsed
        );
        self.reply(WorkerMessage::RenderingFinished {
            avg_samples_per_pixel,
            samples_per_second: stats.samples_per_second(),
        });
    }

    /// Enter the failed phase for good.
    fn fail(&mut self, reason: String) {
        log::error!("Worker #{} failed: {}", self.id, reason);
        self.phase = WorkerPhase::Failed;
        self.scene = None;
        self.surface = None;
        self.reply(WorkerMessage::RenderingFailed { reason });
    }

    fn fail_again(&self) {
        self.reply_failure("Assertion failure had been flagged");
    }

    fn reply_failure(&self, reason: &str) {
        self.reply(WorkerMessage::RenderingFailed {
            reason: reason.to_string(),
        });
    }

    fn reply(&self, message: WorkerMessage) {
        let reply = WorkerReply {
            worker: self.id,
            generation: self.generation,
            message,
        };
        if self.replies.send(reply).is_err() {
            log::warn!("Worker #{} has no marshal to reply to", self.id);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Keep the marshal's barriers from waiting on a dead thread
        if thread::panicking() {
            self.reply_failure("worker thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wray_core::SceneSettings;

    const SCENE: &str = r#"{
        "triangles": [{
            "vertices": [
                {"position": {"x": -10, "y": -10, "z": -5}},
                {"position": {"x": 10, "y": -10, "z": -5}},
                {"position": {"x": -10, "y": 10, "z": -5}}
            ],
            "material": "light"
        }],
        "materials": {"light": {"type": "emissive", "color": {"r": 1, "g": 1, "b": 1}}},
        "camera": {"position": {"x": 0, "y": 0, "z": 0}, "fov": 20},
        "outputResolution": {"width": 4, "height": 4},
        "renderThreadCount": 1
    }"#;

    fn settings(generation: u64) -> WorkerSettings {
        WorkerSettings {
            scene: Arc::new(SceneSettings::from_json(SCENE).unwrap()),
            generation,
        }
    }

    fn worker() -> (Worker, Receiver<WorkerReply>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Worker::new(3, 1, tx), rx)
    }

    #[test]
    fn test_assign_then_render() {
        let (mut worker, replies) = worker();

        assert!(worker.handle(WorkerCommand::AssignRenderSettings(settings(2))));
        let reply = replies.try_recv().unwrap();
        assert_eq!(reply.worker, 3);
        assert_eq!(reply.generation, 2);
        assert_eq!(reply.message, WorkerMessage::ReadyToRender);
        assert_eq!(worker.phase(), WorkerPhase::ReadyToRender);

        worker.handle(WorkerCommand::Render {
            duration: Duration::from_millis(10),
        });
        match replies.try_recv().unwrap().message {
            WorkerMessage::RenderingFinished {
                samples_per_second, ..
            } => assert!(samples_per_second > 0),
            other => panic!("unexpected reply {other:?}"),
        }

        worker.handle(WorkerCommand::UploadRenderBuffer);
        match replies.try_recv().unwrap().message {
            WorkerMessage::RenderBuffer(Some(buffer)) => {
                assert_eq!((buffer.width, buffer.height), (4, 4));
                assert!(buffer.pixels.iter().any(|p| p.sample_count > 0));
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_render_without_scene_fails() {
        let (mut worker, replies) = worker();

        worker.handle(WorkerCommand::Render {
            duration: Duration::from_millis(1),
        });
        assert_eq!(
            replies.try_recv().unwrap().message,
            WorkerMessage::RenderingFailed {
                reason: "Invalid BVH tree".into()
            }
        );
        // Not fatal
        assert_eq!(worker.phase(), WorkerPhase::Uninitialized);
    }

    #[test]
    fn test_failed_worker_stays_failed() {
        let (mut worker, replies) = worker();

        let mut bad = SceneSettings::from_json(SCENE).unwrap();
        bad.triangles[0].vertices.pop();
        worker.handle(WorkerCommand::AssignRenderSettings(WorkerSettings {
            scene: Arc::new(bad),
            generation: 1,
        }));
        assert!(matches!(
            replies.try_recv().unwrap().message,
            WorkerMessage::RenderingFailed { .. }
        ));
        assert_eq!(worker.phase(), WorkerPhase::Failed);

        // A valid scene doesn't revive it
        worker.handle(WorkerCommand::AssignRenderSettings(settings(2)));
        assert_eq!(
            replies.try_recv().unwrap().message,
            WorkerMessage::RenderingFailed {
                reason: "Assertion failure had been flagged".into()
            }
        );

        worker.handle(WorkerCommand::UploadRenderBuffer);
        assert_eq!(replies.try_recv().unwrap().message, WorkerMessage::RenderBuffer(None));
    }

    #[test]
    fn test_wipe_clears_surface() {
        let (mut worker, replies) = worker();
        worker.handle(WorkerCommand::AssignRenderSettings(settings(1)));
        worker.handle(WorkerCommand::Render {
            duration: Duration::from_millis(5),
        });
        worker.handle(WorkerCommand::Wipe);
        worker.handle(WorkerCommand::UploadRenderBuffer);

        let buffer = replies
            .try_iter()
            .find_map(|r| match r.message {
                WorkerMessage::RenderBuffer(buffer) => buffer,
                _ => None,
            })
            .unwrap();
        assert!(buffer.pixels.iter().all(|p| p.sample_count == 0));
    }

    #[test]
    fn test_thread_announces_itself_and_stops() {
        let (tx, replies) = crossbeam_channel::unbounded();
        let mut handle = ThreadSpawner.spawn(0, 7, tx).unwrap();

        let reply = replies.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(reply.message, WorkerMessage::ThreadInitialized);
        assert_eq!(reply.generation, 7);

        handle.send(WorkerCommand::Shutdown);
        handle.thread.take().unwrap().join().unwrap();
    }

    #[test]
    fn test_panicking_worker_reports_failure() {
        let (tx, replies) = crossbeam_channel::unbounded();
        let thread = thread::spawn(move || {
            let mut worker = Worker::new(5, 1, tx);
            worker.handle(WorkerCommand::AssignRenderSettings(settings(4)));
            panic!("sampling blew up");
        });
        assert!(thread.join().is_err());

        let messages: Vec<WorkerReply> = replies.try_iter().collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message, WorkerMessage::ReadyToRender);
        assert_eq!(messages[1].worker, 5);
        assert_eq!(messages[1].generation, 4);
        assert_eq!(
            messages[1].message,
            WorkerMessage::RenderingFailed {
                reason: "worker thread panicked".into()
            }
        );
    }
}

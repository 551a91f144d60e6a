//! Blocking request/response wrapper around a [`Marshal`].

use std::sync::Arc;

use wray_core::{RenderError, RenderResult, SceneSettings};

use crate::marshal::Marshal;
use crate::message::{MarshalCommand, MarshalEvent, RenderBuffer, RenderStats};

/// One client's view of a running marshal. Every call waits for its answer.
pub struct RenderSession {
    marshal: Marshal,
}

impl RenderSession {
    /// Start a marshal with OS-thread workers.
    pub fn start() -> RenderResult<Self> {
        Self::with_marshal(Marshal::spawn()?)
    }

    /// Wrap an already spawned marshal, waiting for it to come up.
    pub fn with_marshal(marshal: Marshal) -> RenderResult<Self> {
        let session = Self { marshal };
        session.wait_for(|event| matches!(event, MarshalEvent::ThreadInitialized).then_some(()))?;
        Ok(session)
    }

    /// Hand the scene to every worker and wait until all of them can render it.
    pub fn assign_settings(&self, scene: SceneSettings) -> RenderResult<()> {
        self.marshal
            .send(MarshalCommand::AssignRenderSettings(Arc::new(scene)))?;
        self.wait_for(|event| matches!(event, MarshalEvent::ReadyToRender).then_some(()))
    }

    /// Run one render round on all workers.
    pub fn render(&self, duration_ms: u64) -> RenderResult<RenderStats> {
        self.marshal.send(MarshalCommand::Render { duration_ms })?;
        self.wait_for(|event| match event {
            MarshalEvent::RenderingFinished(stats) => Some(stats),
            _ => None,
        })
    }

    /// Merge the workers' samples into the accumulated image and return it.
    pub fn upload_render_buffer(&self, flatten: bool) -> RenderResult<RenderBuffer> {
        self.marshal
            .send(MarshalCommand::UploadRenderBuffer { flatten })?;
        self.wait_for(|event| match event {
            MarshalEvent::RenderBuffer(buffer) => Some(buffer),
            _ => None,
        })
    }

    pub fn shutdown(self) {
        self.marshal.shutdown();
    }

    fn wait_for<T>(&self, mut accept: impl FnMut(MarshalEvent) -> Option<T>) -> RenderResult<T> {
        loop {
            let event = self.marshal.events().recv().map_err(|_| {
                RenderError::WorkerInitialization("the marshal thread is gone".into())
            })?;

            match event {
                MarshalEvent::RenderingFailed(err) => return Err(err),
                MarshalEvent::WorkerInitializationFailed(err) => return Err(err),
                other => {
                    let name = event_name(&other);
                    if let Some(value) = accept(other) {
                        return Ok(value);
                    }
                    log::warn!("Ignoring unexpected marshal event {}", name);
                }
            }
        }
    }
}

fn event_name(event: &MarshalEvent) -> &'static str {
    match event {
        MarshalEvent::ThreadInitialized => "ThreadInitialized",
        MarshalEvent::ReadyToRender => "ReadyToRender",
        MarshalEvent::RenderingFinished(_) => "RenderingFinished",
        MarshalEvent::RenderingFailed(_) => "RenderingFailed",
        MarshalEvent::RenderBuffer(_) => "RenderBuffer",
        MarshalEvent::WorkerInitializationFailed(_) => "WorkerInitializationFailed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    use crossbeam_channel::Sender;

    use crate::message::{WorkerCommand, WorkerMessage, WorkerReply};
    use crate::worker::{ThreadSpawner, Worker, WorkerHandle, WorkerSpawner};

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
        "camera": {"position": {"x": 0, "y": 0, "z": 0}, "fov": 20, "antialiasing": false},
        "outputResolution": {"width": 4, "height": 4},
        "renderThreadCount": 2,
        "maxRayDepth": 1,
        "sky": {"model": "solid-fill", "fillColor": {"r": 0.1, "g": 0.2, "b": 0.3}}
    }"#;

    /// Runs real workers that panic as soon as they are asked to render.
    struct CrashingSpawner;

    impl WorkerSpawner for CrashingSpawner {
        fn spawn(
            &mut self,
            id: usize,
            generation: u64,
            replies: Sender<WorkerReply>,
        ) -> RenderResult<WorkerHandle> {
            let (tx, rx) = crossbeam_channel::unbounded();
            let thread = thread::spawn(move || {
                let _ = replies.send(WorkerReply {
                    worker: id,
                    generation,
                    message: WorkerMessage::ThreadInitialized,
                });
                let mut worker = Worker::new(id, generation, replies);
                for command in rx.iter() {
                    if matches!(command, WorkerCommand::Render { .. }) {
                        panic!("worker #{id} crashed while sampling");
                    }
                    if !worker.handle(command) {
                        break;
                    }
                }
            });

            Ok(WorkerHandle {
                id,
                commands: tx,
                thread: Some(thread),
            })
        }
    }

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn session() -> RenderSession {
        init_logger();
        RenderSession::with_marshal(Marshal::spawn_with(ThreadSpawner, 4).unwrap()).unwrap()
    }

    fn rgba(buffer: &RenderBuffer, x: usize, y: usize) -> &[f64] {
        let idx = (x + y * buffer.width) * 4;
        &buffer.pixels[idx..idx + 4]
    }

    #[test]
    fn test_render_end_to_end() {
        let session = session();
        session
            .assign_settings(SceneSettings::from_json(SCENE).unwrap())
            .unwrap();

        let stats = session.render(40).unwrap();
        assert!(stats.avg_samples_per_pixel >= 1.0);
        assert!(stats.samples_per_second > 0);
        session.render(30).unwrap();

        let buffer = session.upload_render_buffer(true).unwrap();
        assert_eq!((buffer.width, buffer.height), (4, 4));
        assert_eq!(buffer.pixels.len(), 4 * 4 * 4);
        assert!(buffer.avg_samples_per_pixel >= 1.0);

        // The light covers the lower-left half of the view
        assert_eq!(rgba(&buffer, 0, 3), &[1.0, 1.0, 1.0, 1.0]);
        let sky = rgba(&buffer, 3, 0);
        assert!((sky[0] - 0.1).abs() < 1e-9);
        assert!((sky[1] - 0.2).abs() < 1e-9);
        assert!((sky[2] - 0.3).abs() < 1e-9);

        session.shutdown();
    }

    #[test]
    fn test_render_before_settings_fails() {
        let session = session();
        assert!(matches!(session.render(10), Err(RenderError::NotReady(_))));
        assert!(matches!(
            session.upload_render_buffer(false),
            Err(RenderError::NotReady(_))
        ));
        session.shutdown();
    }

    #[test]
    fn test_invalid_settings_fail() {
        let session = session();
        let scene = SceneSettings::from_json(&SCENE.replace(
            "\"material\": \"light\"",
            "\"material\": \"missing\"",
        ))
        .unwrap();
        assert!(matches!(
            session.assign_settings(scene),
            Err(RenderError::Configuration(_))
        ));
        session.shutdown();
    }

    #[test]
    fn test_render_duration_out_of_bounds() {
        let session = session();
        session
            .assign_settings(SceneSettings::from_json(SCENE).unwrap())
            .unwrap();
        assert_eq!(session.render(0).unwrap_err(), RenderError::Bounds(0));
        assert_eq!(session.render(60_000).unwrap_err(), RenderError::Bounds(60_000));
        session.render(5).unwrap();
        session.shutdown();
    }

    #[test]
    fn test_panicking_worker_fails_render() {
        init_logger();
        let session =
            RenderSession::with_marshal(Marshal::spawn_with(CrashingSpawner, 4).unwrap()).unwrap();
        let scene = SCENE.replace("\"renderThreadCount\": 2", "\"renderThreadCount\": 1");
        session
            .assign_settings(SceneSettings::from_json(&scene).unwrap())
            .unwrap();

        assert_eq!(
            session.render(20).unwrap_err(),
            RenderError::RenderingFailure {
                worker: 0,
                reason: "worker thread panicked".into(),
            }
        );
        assert!(matches!(session.render(20), Err(RenderError::NotReady(_))));
        session.shutdown();
    }
}

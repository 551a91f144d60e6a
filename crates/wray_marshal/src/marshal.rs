//! The marshal: supervises the render workers on behalf of a client.
//!
//! The [`Coordinator`] holds all protocol state and reacts to one message at
//! a time; [`Marshal`] runs it on its own thread and selects over client
//! commands and worker replies.
//!
//! Two barriers are enforced. No `Render` is accepted until every worker has
//! answered the current assignment with `ReadyToRender`, and no round result
//! is reported until every worker has finished (or failed) that round.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender};
use wray_core::{
    hardware_concurrency, validate_render_duration, RenderError, RenderResult, SceneSettings,
};
use wray_renderer::{Surface, SurfaceBuffer};

use crate::message::{
    MarshalCommand, MarshalEvent, RenderBuffer, RenderStats, WorkerCommand, WorkerMessage,
    WorkerReply, WorkerSettings,
};
use crate::worker::{ThreadSpawner, WorkerHandle, WorkerSpawner};

type RoundResult = Result<(u32, u64), String>;

/// Protocol state of the marshal.
pub struct Coordinator<S: WorkerSpawner> {
    spawner: S,
    hardware: usize,
    events: Sender<MarshalEvent>,
    replies: Sender<WorkerReply>,

    workers: Vec<WorkerHandle>,
    /// Threads of replaced workers, joined on shutdown
    retired: Vec<JoinHandle<()>>,
    needs_respawn: bool,

    /// Bumped on every assignment; replies from older ones are ignored
    generation: u64,
    scene: Option<Arc<SceneSettings>>,
    surface: Option<Surface>,
    samples_per_pixel: f64,

    initialized: usize,
    ready: usize,
    init_failure_reported: bool,
    round: Option<Vec<Option<RoundResult>>>,
    upload: Option<Upload>,
}

struct Upload {
    flatten: bool,
    buffers: Vec<Option<Option<SurfaceBuffer>>>,
}

impl<S: WorkerSpawner> Coordinator<S> {
    pub fn new(
        spawner: S,
        hardware: usize,
        events: Sender<MarshalEvent>,
        replies: Sender<WorkerReply>,
    ) -> Self {
        Self {
            spawner,
            hardware,
            events,
            replies,
            workers: Vec::new(),
            retired: Vec::new(),
            needs_respawn: false,
            generation: 0,
            scene: None,
            surface: None,
            samples_per_pixel: 0.0,
            initialized: 0,
            ready: 0,
            init_failure_reported: false,
            round: None,
            upload: None,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True once every worker has acknowledged the current scene.
    pub fn is_ready(&self) -> bool {
        self.scene.is_some() && !self.workers.is_empty() && self.ready == self.workers.len()
    }

    fn emit(&self, event: MarshalEvent) {
        if self.events.send(event).is_err() {
            log::warn!("Marshal client has gone away");
        }
    }

    fn broadcast(&self, command: WorkerCommand) {
        for worker in &self.workers {
            worker.send(command.clone());
        }
    }

    /// Handle a client command. Returns false once the marshal should stop.
    pub fn handle_command(&mut self, command: MarshalCommand) -> bool {
        log::debug!("Marshal received {}", command_name(&command));

        match command {
            MarshalCommand::AssignRenderSettings(scene) => self.assign(scene),
            MarshalCommand::Render { duration_ms } => self.render(duration_ms),
            MarshalCommand::UploadRenderBuffer { flatten } => self.request_upload(flatten),
            MarshalCommand::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn assign(&mut self, scene: Arc<SceneSettings>) {
        if self.round.take().is_some() || self.upload.take().is_some() {
            self.emit(MarshalEvent::RenderingFailed(RenderError::NotReady(
                "render settings were reassigned before the previous request completed".into(),
            )));
        }

        let prepared = scene.validate().and_then(|_| {
            let count = scene.worker_count(self.hardware)?;
            let resolution = scene.resolution()?;
            let surface = Surface::new(resolution.width as usize, resolution.height as usize)?;
            Ok((count, surface))
        });
        let (count, surface) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                log::error!("Rejected render settings: {}", err);
                self.emit(MarshalEvent::RenderingFailed(err));
                return;
            }
        };

        self.generation += 1;
        self.scene = Some(scene);
        self.surface = Some(surface);
        self.samples_per_pixel = 0.0;
        self.ready = 0;
        self.init_failure_reported = false;

        if count != self.workers.len() || self.needs_respawn {
            if let Err(err) = self.respawn(count) {
                // Drop the partial pool; its late replies belong to a dead generation
                self.retire_workers();
                self.needs_respawn = true;
                self.generation += 1;
                self.report_init_failure(err);
            }
        } else {
            self.send_settings();
        }
    }

    fn retire_workers(&mut self) {
        self.broadcast(WorkerCommand::Shutdown);
        self.retired
            .extend(self.workers.drain(..).filter_map(|mut w| w.thread.take()));
        self.initialized = 0;
        self.ready = 0;
    }

    fn respawn(&mut self, count: usize) -> RenderResult<()> {
        self.retire_workers();
        self.needs_respawn = false;

        log::info!("Spawning {} render workers", count);
        for id in 0..count {
            let worker = self.spawner.spawn(id, self.generation, self.replies.clone())?;
            self.workers.push(worker);
        }
        Ok(())
    }

    fn send_settings(&self) {
        let Some(scene) = &self.scene else {
            return;
        };
        let settings = WorkerSettings {
            scene: Arc::clone(scene),
            generation: self.generation,
        };
        self.broadcast(WorkerCommand::AssignRenderSettings(settings));
    }

    fn check_ready(&self) -> RenderResult<()> {
        if self.scene.is_none() {
            return Err(RenderError::NotReady("no render settings have been assigned".into()));
        }
        if self.needs_respawn {
            return Err(RenderError::NotReady(
                "a worker has failed; render settings must be reassigned".into(),
            ));
        }
        if !self.is_ready() {
            return Err(RenderError::NotReady("worker threads aren't ready yet".into()));
        }
        if self.round.is_some() || self.upload.is_some() {
            return Err(RenderError::NotReady("a previous request is still in progress".into()));
        }
        Ok(())
    }

    fn render(&mut self, duration_ms: u64) {
        let accepted = validate_render_duration(duration_ms)
            .and_then(|duration| self.check_ready().map(|_| duration));

        match accepted {
            Ok(duration) => {
                self.round = Some(vec![None; self.workers.len()]);
                self.broadcast(WorkerCommand::Render { duration });
            }
            Err(err) => {
                log::warn!("Rejected render request: {}", err);
                self.emit(MarshalEvent::RenderingFailed(err));
            }
        }
    }

    fn request_upload(&mut self, flatten: bool) {
        if let Err(err) = self.check_ready() {
            log::warn!("Rejected upload request: {}", err);
            self.emit(MarshalEvent::RenderingFailed(err));
            return;
        }
        self.upload = Some(Upload {
            flatten,
            buffers: vec![None; self.workers.len()],
        });
        self.broadcast(WorkerCommand::UploadRenderBuffer);
    }

    /// Handle a worker reply.
    pub fn handle_reply(&mut self, reply: WorkerReply) {
        let WorkerReply {
            worker,
            generation,
            message,
        } = reply;

        if generation != self.generation {
            log::warn!(
                "Dropping stale reply from worker #{} (generation {}, current {})",
                worker,
                generation,
                self.generation
            );
            return;
        }
        if self.workers.is_empty() {
            self.emit(MarshalEvent::WorkerInitializationFailed(
                RenderError::WorkerInitialization(format!(
                    "worker #{worker} is reporting in, even though no workers have been created"
                )),
            ));
            return;
        }
        if worker >= self.workers.len() {
            log::warn!("Dropping reply from unknown worker #{}", worker);
            return;
        }

        match message {
            WorkerMessage::ThreadInitialized => {
                self.initialized += 1;
                if self.initialized == self.workers.len() {
                    log::debug!("All {} workers initialized", self.initialized);
                    self.send_settings();
                }
            }
            WorkerMessage::ReadyToRender => {
                self.ready += 1;
                if self.ready == self.workers.len() {
                    log::info!("Threads ({}) are ready to render", self.ready);
                    self.emit(MarshalEvent::ReadyToRender);
                }
            }
            WorkerMessage::RenderingFinished {
                avg_samples_per_pixel,
                samples_per_second,
            } => self.record_round(worker, Ok((avg_samples_per_pixel, samples_per_second))),
            WorkerMessage::RenderingFailed { reason } => {
                self.needs_respawn = true;
                if self.round.is_some() {
                    self.record_round(worker, Err(reason));
                } else {
                    self.report_init_failure(RenderError::RenderingFailure { worker, reason });
                }
            }
            WorkerMessage::RenderBuffer(buffer) => self.record_upload(worker, buffer),
        }
    }

    fn report_init_failure(&mut self, err: RenderError) {
        log::error!("Worker initialization failed: {}", err);
        if !self.init_failure_reported {
            self.init_failure_reported = true;
            self.emit(MarshalEvent::WorkerInitializationFailed(err));
        }
    }

    fn record_round(&mut self, worker: usize, result: RoundResult) {
        let Some(round) = &mut self.round else {
            log::warn!("Worker #{} finished a round nobody asked for", worker);
            return;
        };
        if round[worker].replace(result).is_some() {
            log::warn!("Worker #{} reported twice in one round", worker);
        }
        if round.iter().any(Option::is_none) {
            return;
        }

        let results = self.round.take().unwrap_or_default();
        let worker_count = results.len();
        let mut failures = Vec::new();
        let mut avg_total = 0.0;
        let mut samples_per_second = 0;

        for (worker, result) in results.into_iter().flatten().enumerate() {
            match result {
                Ok((avg, sps)) => {
                    avg_total += f64::from(avg);
                    samples_per_second += sps;
                }
                Err(reason) => failures.push(RenderError::RenderingFailure { worker, reason }),
            }
        }

        let event = match failures.len() {
            0 => {
                let stats = RenderStats {
                    avg_samples_per_pixel: avg_total / worker_count as f64,
                    samples_per_second,
                };
                log::info!(
                    "Round finished: {:.1} samples per pixel, {} samples/s",
                    stats.avg_samples_per_pixel,
                    stats.samples_per_second
                );
                MarshalEvent::RenderingFinished(stats)
            }
            1 => MarshalEvent::RenderingFailed(failures.remove(0)),
            _ => MarshalEvent::RenderingFailed(RenderError::AggregateFailure(failures)),
        };
        self.emit(event);
    }

    fn record_upload(&mut self, worker: usize, buffer: Option<SurfaceBuffer>) {
        let Some(upload) = &mut self.upload else {
            log::warn!("Worker #{} uploaded a buffer nobody asked for", worker);
            return;
        };
        if upload.buffers[worker].replace(buffer).is_some() {
            log::warn!("Worker #{} uploaded twice", worker);
        }
        if upload.buffers.iter().any(Option::is_none) {
            return;
        }

        let Some(upload) = self.upload.take() else {
            return;
        };
        let event = match self.merge_upload(upload) {
            Ok(buffer) => MarshalEvent::RenderBuffer(buffer),
            Err(err) => {
                log::error!("Could not merge render buffers: {}", err);
                MarshalEvent::RenderingFailed(err)
            }
        };
        self.emit(event);
    }

    fn merge_upload(&mut self, upload: Upload) -> RenderResult<RenderBuffer> {
        let surface = self
            .surface
            .as_mut()
            .ok_or_else(|| RenderError::NotReady("no render surface".into()))?;

        // Worker order is fixed, so the merged sums are deterministic
        let mut merged = Surface::new(surface.width(), surface.height())?;
        for buffer in upload.buffers.into_iter().flatten().flatten() {
            merged.merge(&Surface::from_raw(buffer)?)?;
        }

        self.samples_per_pixel += f64::from(merged.median_sample_count());
        surface.merge(&merged)?;
        if upload.flatten {
            surface.flatten();
        }

        let buffer = RenderBuffer {
            width: surface.width(),
            height: surface.height(),
            pixels: surface.to_buffer(),
            avg_samples_per_pixel: self.samples_per_pixel,
        };

        // Their samples now live in the marshal's surface
        self.broadcast(WorkerCommand::Wipe);
        Ok(buffer)
    }

    /// Stop every worker and wait for their threads.
    pub fn shutdown(&mut self) {
        self.broadcast(WorkerCommand::Shutdown);
        let threads = self
            .workers
            .drain(..)
            .filter_map(|mut w| w.thread.take())
            .chain(self.retired.drain(..));

        for thread in threads {
            if thread.join().is_err() {
                log::error!("A render worker panicked");
            }
        }
    }
}

fn command_name(command: &MarshalCommand) -> &'static str {
    match command {
        MarshalCommand::AssignRenderSettings(_) => "AssignRenderSettings",
        MarshalCommand::Render { .. } => "Render",
        MarshalCommand::UploadRenderBuffer { .. } => "UploadRenderBuffer",
        MarshalCommand::Shutdown => "Shutdown",
    }
}

/// Handle to a running marshal thread.
pub struct Marshal {
    commands: Sender<MarshalCommand>,
    events: Receiver<MarshalEvent>,
    thread: Option<JoinHandle<()>>,
}

impl Marshal {
    /// Spawn a marshal that runs workers on OS threads.
    pub fn spawn() -> RenderResult<Self> {
        Self::spawn_with(ThreadSpawner, hardware_concurrency())
    }

    /// Spawn a marshal with a custom worker spawner and hardware concurrency
    /// (used to resolve `"all"` and `"half"` thread counts).
    pub fn spawn_with<S: WorkerSpawner + 'static>(spawner: S, hardware: usize) -> RenderResult<Self> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<MarshalCommand>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<MarshalEvent>();
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<WorkerReply>();

        let thread = thread::Builder::new()
            .name("wray-marshal".into())
            .spawn(move || {
                let mut coordinator = Coordinator::new(spawner, hardware, event_tx, reply_tx);
                coordinator.emit(MarshalEvent::ThreadInitialized);
                run(&mut coordinator, &command_rx, &reply_rx);
            })
            .map_err(|e| {
                RenderError::WorkerInitialization(format!("could not spawn the marshal: {e}"))
            })?;

        Ok(Self {
            commands: command_tx,
            events: event_rx,
            thread: Some(thread),
        })
    }

    pub fn send(&self, command: MarshalCommand) -> RenderResult<()> {
        self.commands
            .send(command)
            .map_err(|_| RenderError::NotReady("the marshal thread has stopped".into()))
    }

    pub fn events(&self) -> &Receiver<MarshalEvent> {
        &self.events
    }

    /// Stop the marshal and all its workers, waiting for their threads.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = self.commands.send(MarshalCommand::Shutdown);
            if thread.join().is_err() {
                log::error!("The marshal thread panicked");
            }
        }
    }
}

impl Drop for Marshal {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<S: WorkerSpawner>(
    coordinator: &mut Coordinator<S>,
    commands: &Receiver<MarshalCommand>,
    replies: &Receiver<WorkerReply>,
) {
    loop {
        select! {
            recv(commands) -> msg => match msg {
                Ok(command) => {
                    if !coordinator.handle_command(command) {
                        break;
                    }
                }
                Err(_) => {
                    log::debug!("Marshal: command channel closed");
                    coordinator.shutdown();
                    break;
                }
            },
            recv(replies) -> msg => {
                if let Ok(reply) = msg {
                    coordinator.handle_reply(reply);
                }
            }
        }
    }
}

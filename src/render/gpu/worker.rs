use std::{sync::Arc, thread::JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};

use crate::{
    effects::ramp::MixRamp,
    foundation::core::{Frame, Surface},
    foundation::error::{DitherError, DitherResult},
    render::{
        frame_progress,
        gpu::{
            protocol::{WorkerCommand, WorkerEvent, WorkerState},
            shader::{DitherShader, ShaderParams, ShaderProvider},
        },
    },
    settings::GpuEffect,
};

/// Worker-side state. Runs on its own thread and owns the surface and GPU resources for the
/// lifetime of the session.
struct Worker {
    provider: Arc<dyn ShaderProvider>,
    events: Sender<WorkerEvent>,
    state: WorkerState,
    shader: Option<Box<dyn DitherShader>>,
    surface: Option<Surface>,
    effect: Option<GpuEffect>,
    ramp: MixRamp,
    ignored_frames: u64,
}

impl Worker {
    fn run(mut self, commands: Receiver<WorkerCommand>) {
        for cmd in commands.iter() {
            if let Err(e) = self.handle(cmd) {
                self.fail(&e);
            }
            if self.state.is_terminal() {
                break;
            }
        }
        self.release();
        tracing::debug!(
            provider = self.provider.name(),
            state = ?self.state,
            ignored_frames = self.ignored_frames,
            "gpu worker exiting"
        );
    }

    fn handle(&mut self, cmd: WorkerCommand) -> DitherResult<()> {
        match cmd {
            WorkerCommand::Init {
                surface,
                width,
                height,
                effect,
            } => self.init(surface, width, height, effect),
            WorkerCommand::Frame {
                image,
                timestamp,
                duration,
            } => self.frame(image, timestamp, duration),
            WorkerCommand::UpdateOptions { effect } => {
                self.effect = Some(effect);
                Ok(())
            }
            WorkerCommand::Finish => {
                self.release();
                self.state = WorkerState::Finished;
                self.send(WorkerEvent::Finished);
                Ok(())
            }
        }
    }

    fn init(
        &mut self,
        surface: Surface,
        width: u32,
        height: u32,
        effect: GpuEffect,
    ) -> DitherResult<()> {
        if self.state != WorkerState::Uninitialized {
            return Err(DitherError::protocol(format!(
                "init received in state {:?}",
                self.state
            )));
        }
        if surface.width() != width || surface.height() != height {
            return Err(DitherError::initialization(format!(
                "surface is {}x{} but init requested {width}x{height}",
                surface.width(),
                surface.height()
            )));
        }
        let shader = self.provider.create(width, height).map_err(|e| {
            if e.is_initialization() {
                e
            } else {
                DitherError::initialization(e.to_string())
            }
        })?;

        self.shader = Some(shader);
        self.surface = Some(surface);
        self.effect = Some(effect);
        self.state = WorkerState::Ready;
        tracing::debug!(provider = self.provider.name(), width, height, "gpu worker ready");
        self.send(WorkerEvent::Ready);
        Ok(())
    }

    fn frame(&mut self, image: Frame, timestamp: f64, duration: f64) -> DitherResult<()> {
        if self.state != WorkerState::Ready {
            self.ignored_frames += 1;
            tracing::warn!(state = ?self.state, "gpu worker ignored a frame");
            return Ok(());
        }
        self.state = WorkerState::Busy;

        let (Some(shader), Some(surface), Some(effect)) =
            (self.shader.as_mut(), self.surface.as_mut(), self.effect.as_ref())
        else {
            return Err(DitherError::protocol("gpu worker is missing its resources"));
        };

        shader
            .upload(&image)
            .map_err(|e| DitherError::frame_processing(format!("texture upload failed: {e}")))?;
        drop(image);

        let mix = self.ramp.update(timestamp, duration, effect.settings());
        shader
            .draw(&ShaderParams::new(effect, mix), surface)
            .map_err(|e| DitherError::frame_processing(format!("draw failed: {e}")))?;

        let (progress, done) = frame_progress(timestamp, duration);
        let presented = surface.snapshot();
        self.send(WorkerEvent::FrameRendered {
            progress,
            done,
            presented,
        });
        if done {
            self.release();
            self.state = WorkerState::Finished;
        } else {
            self.state = WorkerState::Ready;
        }
        Ok(())
    }

    fn fail(&mut self, err: &DitherError) {
        tracing::warn!(error = %err, "gpu worker failed");
        self.release();
        self.state = WorkerState::Failed;
        self.send(WorkerEvent::Error {
            message: err.to_string(),
        });
    }

    fn release(&mut self) {
        self.shader = None;
        self.surface = None;
    }

    fn send(&self, event: WorkerEvent) {
        // The session may already have hung up; nothing is waiting for the event then.
        let _ = self.events.send(event);
    }
}

/// Main-side handle to a GPU worker thread.
///
/// Mirrors the worker's lifecycle from the events it has seen, so at most one frame is ever in
/// flight.
pub struct GpuRenderer {
    commands: Option<Sender<WorkerCommand>>,
    events: Receiver<WorkerEvent>,
    thread: Option<JoinHandle<()>>,
    state: WorkerState,
    initialized: bool,
}

impl GpuRenderer {
    /// Spawn the worker thread. The shader itself is created on `init`.
    pub fn spawn(provider: Arc<dyn ShaderProvider>) -> DitherResult<Self> {
        let (cmd_tx, cmd_rx) = unbounded::<WorkerCommand>();
        let (evt_tx, evt_rx) = unbounded::<WorkerEvent>();
        // Shaders are not `Send`, so the worker is assembled on its own thread.
        let thread = std::thread::Builder::new()
            .name("retrodither-gpu".to_string())
            .spawn(move || {
                let worker = Worker {
                    provider,
                    events: evt_tx,
                    state: WorkerState::Uninitialized,
                    shader: None,
                    surface: None,
                    effect: None,
                    ramp: MixRamp::new(),
                    ignored_frames: 0,
                };
                worker.run(cmd_rx)
            })
            .map_err(|e| DitherError::initialization(format!("failed to spawn gpu worker: {e}")))?;
        Ok(Self {
            commands: Some(cmd_tx),
            events: evt_rx,
            thread: Some(thread),
            state: WorkerState::Uninitialized,
            initialized: false,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Hand the surface to the worker. Completion is signalled by [`WorkerEvent::Ready`].
    pub fn init(&mut self, surface: Surface, effect: GpuEffect) -> DitherResult<()> {
        if self.initialized {
            return Err(DitherError::protocol("gpu renderer already initialized"));
        }
        self.initialized = true;
        let (width, height) = (surface.width(), surface.height());
        self.send(WorkerCommand::Init {
            surface,
            width,
            height,
            effect,
        })
    }

    /// Submit a frame. Only valid while the worker is [`WorkerState::Ready`].
    pub fn submit(&mut self, image: Frame) -> DitherResult<()> {
        if self.state != WorkerState::Ready {
            return Err(DitherError::protocol(format!(
                "frame submitted while worker is {:?}",
                self.state
            )));
        }
        let (timestamp, duration) = (image.timestamp, image.duration);
        self.send(WorkerCommand::Frame {
            image,
            timestamp,
            duration,
        })?;
        self.state = WorkerState::Busy;
        Ok(())
    }

    pub fn update_options(&mut self, effect: GpuEffect) -> DitherResult<()> {
        self.send(WorkerCommand::UpdateOptions { effect })
    }

    /// Ask the worker to release its resources and stop.
    pub fn finish(&mut self) -> DitherResult<()> {
        if self.state.is_terminal() {
            return Ok(());
        }
        self.send(WorkerCommand::Finish)
    }

    /// Block until the next event.
    pub fn recv(&mut self) -> DitherResult<WorkerEvent> {
        let event = self.events.recv().map_err(|_| {
            self.state = WorkerState::Failed;
            DitherError::protocol("gpu worker hung up")
        })?;
        self.observe(&event);
        Ok(event)
    }

    /// Next event if one is queued.
    pub fn try_recv(&mut self) -> DitherResult<Option<WorkerEvent>> {
        match self.events.try_recv() {
            Ok(event) => {
                self.observe(&event);
                Ok(Some(event))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.state = WorkerState::Failed;
                Err(DitherError::protocol("gpu worker hung up"))
            }
        }
    }

    /// Close the command channel and join the worker thread.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn observe(&mut self, event: &WorkerEvent) {
        self.state = match event {
            WorkerEvent::Ready => WorkerState::Ready,
            WorkerEvent::FrameRendered { done: true, .. } | WorkerEvent::Finished => {
                WorkerState::Finished
            }
            WorkerEvent::FrameRendered { done: false, .. } => WorkerState::Ready,
            WorkerEvent::Error { .. } => WorkerState::Failed,
        };
    }

    fn send(&mut self, cmd: WorkerCommand) -> DitherResult<()> {
        let tx = self
            .commands
            .as_ref()
            .ok_or_else(|| DitherError::protocol("gpu worker already shut down"))?;
        tx.send(cmd).map_err(|_| {
            self.state = WorkerState::Failed;
            DitherError::protocol("gpu worker hung up")
        })
    }

    fn join(&mut self) {
        drop(self.commands.take());
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            tracing::warn!("gpu worker thread panicked");
        }
    }
}

impl Drop for GpuRenderer {
    fn drop(&mut self) {
        self.join();
    }
}

use std::sync::Arc;

use crate::{
    foundation::core::{FrameRGBA, Surface},
    foundation::error::{DitherError, DitherResult},
    render::{
        BackendPreference, ProgressTracker, RenderPath,
        clock::{CancelToken, RefreshClock, RefreshPacing},
        cpu::{CpuRenderer, TickOutcome},
        gpu::{self, GpuRenderer, ShaderProvider, WorkerEvent, WorkerState},
    },
    settings::{EffectSettings, GpuEffect, SharedSettings},
    sink::{Completion, FrameSink, SinkConfig},
    source::FrameSource,
};

/// Session-level options that are not part of the effect itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OrchestratorOpts {
    pub backend: BackendPreference,
    pub pacing: RefreshPacing,
    /// Output size in pixels. Defaults to the source's native size.
    pub output_size: Option<(u32, u32)>,
}

/// Summary of a finished session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionReport {
    pub started_on: RenderPath,
    pub finished_on: RenderPath,
    pub width: u32,
    pub height: u32,
    pub frames_rendered: u64,
    /// Frames the source skipped plus frames lost in flight when the GPU worker failed.
    pub frames_dropped: u64,
    /// Non-fatal problems, such as the reason for a GPU → CPU fallback.
    pub warnings: Vec<String>,
    pub completion: Completion,
}

impl SessionReport {
    pub fn fell_back(&self) -> bool {
        self.started_on != self.finished_on
    }
}

/// Picks a rendering path for each session, runs it, and falls back to the CPU when the GPU
/// worker cannot continue.
pub struct Orchestrator {
    settings: SharedSettings,
    provider: Option<Arc<dyn ShaderProvider>>,
    opts: OrchestratorOpts,
}

impl Orchestrator {
    /// Uses the platform's shader provider when this build has one.
    pub fn new(settings: SharedSettings, opts: OrchestratorOpts) -> Self {
        Self {
            settings,
            provider: gpu::default_provider(),
            opts,
        }
    }

    pub fn with_shader_provider(mut self, provider: Arc<dyn ShaderProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn without_gpu(mut self) -> Self {
        self.provider = None;
        self
    }

    /// The settings cell sessions read from. Replace its contents to change the effect of a
    /// running session from the next frame on.
    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn opts(&self) -> &OrchestratorOpts {
        &self.opts
    }

    /// GPU when a provider is present, the backend preference allows it and the algorithm is
    /// GPU-eligible.
    pub fn select_path(&self, settings: &EffectSettings) -> RenderPath {
        let gpu_allowed = self.opts.backend == BackendPreference::Auto;
        if gpu_allowed && self.provider.is_some() && settings.gpu_effect().is_some() {
            RenderPath::Gpu
        } else {
            RenderPath::Cpu
        }
    }

    /// Run one session from the source's current position to its end (or cancellation).
    ///
    /// The sink sees `begin`, then frames and progress, then exactly one `finish`. Errors from
    /// the source or the sink end the session with [`Completion::Error`] and are returned.
    #[tracing::instrument(skip_all, fields(backend = ?self.opts.backend))]
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        cancel: &CancelToken,
    ) -> DitherResult<SessionReport> {
        let initial = self.settings.snapshot();
        let (width, height) = self.opts.output_size.unwrap_or_else(|| source.dimensions());
        if width == 0 || height == 0 {
            return Err(DitherError::validation(
                "session output width/height must be non-zero",
            ));
        }
        sink.begin(SinkConfig {
            width,
            height,
            fps: source.fps(),
        })?;

        let started_on = self.select_path(&initial);
        tracing::info!(
            path = ?started_on,
            width,
            height,
            algorithm = initial.algorithm().name(),
            duration = source.duration(),
            "starting dither session"
        );

        let mut session = Session {
            settings: &self.settings,
            source,
            sink,
            cancel,
            clock: RefreshClock::new(self.opts.pacing),
            progress: ProgressTracker::new(),
            width,
            height,
            frames_rendered: 0,
            lost_in_flight: 0,
            warnings: Vec::new(),
        };

        let gpu_start = match (&self.provider, initial.gpu_effect()) {
            (Some(provider), Some(effect)) if started_on == RenderPath::Gpu => {
                Some((Arc::clone(provider), effect))
            }
            _ => None,
        };

        let mut finished_on = started_on;
        let result = match gpu_start {
            Some((provider, effect)) => match session.run_gpu(provider, effect) {
                Ok(GpuOutcome::Finished(end)) => Ok(end),
                Ok(GpuOutcome::Handover(reason)) => {
                    tracing::warn!(%reason, "gpu path stopped, continuing on cpu");
                    session.warnings.push(reason);
                    finished_on = RenderPath::Cpu;
                    session.run_cpu()
                }
                Err(e) => Err(e),
            },
            None => session.run_cpu(),
        };

        let completion = match &result {
            Ok(SessionEnd::Completed) => {
                session.report_progress(1.0);
                Completion::Done
            }
            Ok(SessionEnd::Cancelled) => Completion::Cancelled,
            Err(e) => Completion::Error(e.to_string()),
        };
        session.source.pause();
        let finished = session.sink.finish(&completion);

        let frames_dropped = session.source.dropped_frames() + session.lost_in_flight;
        tracing::info!(
            ?completion,
            path = ?finished_on,
            frames = session.frames_rendered,
            dropped = frames_dropped,
            "dither session ended"
        );

        if let Err(e) = result {
            if let Err(sink_err) = finished {
                tracing::warn!(error = %sink_err, "sink failed while closing an errored session");
            }
            return Err(e);
        }
        finished?;

        Ok(SessionReport {
            started_on,
            finished_on,
            width,
            height,
            frames_rendered: session.frames_rendered,
            frames_dropped,
            warnings: session.warnings,
            completion,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SessionEnd {
    Completed,
    Cancelled,
}

#[derive(Debug)]
enum GpuOutcome {
    Finished(SessionEnd),
    /// The GPU path cannot go on; the session continues on the CPU.
    Handover(String),
}

struct Session<'a> {
    settings: &'a SharedSettings,
    source: &'a mut dyn FrameSource,
    sink: &'a mut dyn FrameSink,
    cancel: &'a CancelToken,
    clock: RefreshClock,
    progress: ProgressTracker,
    width: u32,
    height: u32,
    frames_rendered: u64,
    lost_in_flight: u64,
    warnings: Vec<String>,
}

impl Session<'_> {
    fn present(&mut self, frame: &FrameRGBA, progress: f64) -> DitherResult<()> {
        self.sink.push_frame(frame)?;
        self.frames_rendered += 1;
        self.report_progress(progress);
        Ok(())
    }

    fn report_progress(&mut self, raw: f64) {
        if let Some(v) = self.progress.advance(raw) {
            self.sink.progress(v);
        }
    }

    fn run_cpu(&mut self) -> DitherResult<SessionEnd> {
        let mut renderer = CpuRenderer::new(Surface::new(self.width, self.height)?);
        let end = loop {
            if self.cancel.is_cancelled() {
                break SessionEnd::Cancelled;
            }
            self.clock.wait_next();
            let settings = self.settings.snapshot();
            match renderer.tick(&mut *self.source, &settings)? {
                TickOutcome::Skipped => continue,
                TickOutcome::Rendered { progress, .. } => {
                    self.present(renderer.surface().as_frame(), progress)?;
                }
                TickOutcome::Completed | TickOutcome::Idle => break SessionEnd::Completed,
            }
        };
        renderer.release();
        Ok(end)
    }

    fn run_gpu(
        &mut self,
        provider: Arc<dyn ShaderProvider>,
        effect: GpuEffect,
    ) -> DitherResult<GpuOutcome> {
        let mut gpu = match GpuRenderer::spawn(provider) {
            Ok(gpu) => gpu,
            Err(e) => return Ok(GpuOutcome::Handover(e.to_string())),
        };
        if let Err(e) = gpu.init(Surface::new(self.width, self.height)?, effect) {
            return Ok(GpuOutcome::Handover(e.to_string()));
        }
        let mut current = *effect.settings();

        loop {
            if self.cancel.is_cancelled() {
                stop_worker(gpu);
                return Ok(GpuOutcome::Finished(SessionEnd::Cancelled));
            }

            match gpu.state() {
                state @ (WorkerState::Uninitialized | WorkerState::Busy) => {
                    let in_flight = state == WorkerState::Busy;
                    let event = match gpu.recv() {
                        Ok(event) => event,
                        Err(e) => {
                            self.lost_in_flight += u64::from(in_flight);
                            return Ok(GpuOutcome::Handover(e.to_string()));
                        }
                    };
                    if let Some(outcome) = self.on_worker_event(event, in_flight)? {
                        return Ok(outcome);
                    }
                    continue;
                }
                WorkerState::Finished => return Ok(GpuOutcome::Finished(SessionEnd::Completed)),
                WorkerState::Failed => {
                    return Ok(GpuOutcome::Handover("gpu worker failed".to_string()));
                }
                WorkerState::Ready => {}
            }

            self.clock.wait_next();

            let settings = self.settings.snapshot();
            if settings != current {
                current = settings;
                match settings.gpu_effect() {
                    Some(effect) => {
                        if let Err(e) = gpu.update_options(effect) {
                            return Ok(GpuOutcome::Handover(e.to_string()));
                        }
                    }
                    None => {
                        stop_worker(gpu);
                        return Ok(GpuOutcome::Handover(format!(
                            "algorithm changed to {}, which the gpu path does not support",
                            settings.algorithm().name()
                        )));
                    }
                }
            }

            if self.source.is_ended() {
                stop_worker(gpu);
                return Ok(GpuOutcome::Finished(SessionEnd::Completed));
            }
            if self.source.is_paused() {
                continue;
            }

            let frame = self.source.grab()?;
            if let Err(e) = gpu.submit(frame) {
                return Ok(GpuOutcome::Handover(e.to_string()));
            }
        }
    }

    fn on_worker_event(
        &mut self,
        event: WorkerEvent,
        in_flight: bool,
    ) -> DitherResult<Option<GpuOutcome>> {
        match event {
            WorkerEvent::Ready => Ok(None),
            WorkerEvent::FrameRendered {
                progress,
                done,
                presented,
            } => {
                self.present(&presented, progress)?;
                Ok(done.then_some(GpuOutcome::Finished(SessionEnd::Completed)))
            }
            WorkerEvent::Finished => Ok(Some(GpuOutcome::Finished(SessionEnd::Completed))),
            WorkerEvent::Error { message } => {
                self.lost_in_flight += u64::from(in_flight);
                Ok(Some(GpuOutcome::Handover(message)))
            }
        }
    }
}

/// Ask the worker to finish, wait for it to release its resources, and join it. Frames still in
/// flight are discarded.
fn stop_worker(mut gpu: GpuRenderer) {
    if gpu.finish().is_ok() {
        while let Ok(event) = gpu.recv() {
            if matches!(event, WorkerEvent::Finished | WorkerEvent::Error { .. }) {
                break;
            }
        }
    }
    gpu.shutdown();
}

use retrodither::{
    Algorithm, CancelToken, Completion, DitherResult, EffectSettings, Fps, FrameRGBA, FrameSink,
    InMemorySink, IndexedSource, Orchestrator, OrchestratorOpts, RefreshPacing, RenderPath,
    SharedSettings, SinkConfig, source::synthetic::SyntheticClip,
};

fn opts() -> OrchestratorOpts {
    OrchestratorOpts {
        pacing: RefreshPacing::Unthrottled,
        ..OrchestratorOpts::default()
    }
}

fn fps30() -> Fps {
    Fps::new(30, 1).unwrap()
}

fn assert_monotonic(progress: &[f64]) {
    assert!(!progress.is_empty());
    for pair in progress.windows(2) {
        assert!(pair[1] >= pair[0], "progress went backwards: {progress:?}");
    }
    assert!(progress.iter().all(|p| (0.0..=1.0).contains(p)));
}

/// Sink that runs a callback after every pushed frame.
struct HookSink<F> {
    inner: InMemorySink,
    hook: F,
}

impl<F: FnMut(usize)> FrameSink for HookSink<F> {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()> {
        self.inner.begin(cfg)
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()> {
        self.inner.push_frame(frame)?;
        (self.hook)(self.inner.frames().len());
        Ok(())
    }

    fn progress(&mut self, fraction: f64) {
        self.inner.progress(fraction);
    }

    fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
        self.inner.finish(completion)
    }
}

#[test]
fn ten_frame_session_runs_to_completion() {
    let settings = EffectSettings::new(Algorithm::Ordered, 0.85, 1, 2.5).unwrap();
    let orch = Orchestrator::new(SharedSettings::new(settings), opts()).without_gpu();
    let mut src = SyntheticClip::stepped(32, 18, fps30(), 10);
    let mut sink = InMemorySink::new();

    let report = orch.run(&mut src, &mut sink, &CancelToken::new()).unwrap();

    assert_eq!(report.started_on, RenderPath::Cpu);
    assert!(!report.fell_back());
    assert_eq!(report.frames_rendered, 10);
    assert_eq!(report.frames_dropped, 0);
    assert!(report.warnings.is_empty());
    assert_eq!(report.completion, Completion::Done);

    assert_eq!(sink.completions(), &[Completion::Done]);
    assert_eq!(sink.frames().len(), 10);
    let cfg = sink.config().unwrap();
    assert_eq!((cfg.width, cfg.height, cfg.fps), (32, 18, Some(fps30())));

    let progress = sink.progress_reports();
    assert_monotonic(progress);
    assert_eq!(progress.last(), Some(&1.0));
    assert!((progress[1] - 0.1).abs() < 1e-9);
}

#[test]
fn first_frame_is_undithered_because_the_ramp_starts_at_zero() {
    let orch = Orchestrator::new(SharedSettings::default(), opts()).without_gpu();
    let mut src = SyntheticClip::stepped(16, 16, fps30(), 4);
    let mut sink = InMemorySink::new();
    orch.run(&mut src, &mut sink, &CancelToken::new()).unwrap();

    let raw = SyntheticClip::new(16, 16, fps30(), 4).frame_at(0).unwrap();
    assert_eq!(sink.frames()[0].data, raw.data);
}

#[test]
fn zero_mix_session_only_pixelates() {
    let settings = EffectSettings::new(Algorithm::ErrorDiffusion, 0.0, 1, 0.5).unwrap();
    let orch = Orchestrator::new(SharedSettings::new(settings), opts()).without_gpu();
    let mut src = SyntheticClip::stepped(12, 8, fps30(), 6);
    let mut sink = InMemorySink::new();
    orch.run(&mut src, &mut sink, &CancelToken::new()).unwrap();

    let mut clip = SyntheticClip::new(12, 8, fps30(), 6);
    for (i, frame) in sink.frames().iter().enumerate() {
        assert_eq!(frame.data, clip.frame_at(i as u64).unwrap().data, "frame {i}");
    }
}

#[test]
fn settings_replaced_mid_session_apply_to_the_next_frame() {
    let shared = SharedSettings::new(
        EffectSettings::new(Algorithm::None, 0.0, 1, 1.0).unwrap(),
    );
    let orch = Orchestrator::new(shared.clone(), opts()).without_gpu();
    let writer = shared.clone();
    let mut sink = HookSink {
        inner: InMemorySink::new(),
        hook: move |n: usize| {
            if n == 2 {
                writer.replace(writer.snapshot().with_pixel_block(4));
            }
        },
    };
    let mut src = SyntheticClip::stepped(8, 8, fps30(), 4);
    orch.run(&mut src, &mut sink, &CancelToken::new()).unwrap();

    let frames = sink.inner.frames();
    let distinct = |f: &FrameRGBA| {
        let mut px: Vec<&[u8]> = f.data.chunks_exact(4).collect();
        px.sort();
        px.dedup();
        px.len()
    };
    assert!(distinct(&frames[1]) > 4);
    assert!(distinct(&frames[2]) <= 4);
    assert!(distinct(&frames[3]) <= 4);
}

#[test]
fn cancellation_completes_once_as_cancelled() {
    let orch = Orchestrator::new(SharedSettings::default(), opts()).without_gpu();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut sink = HookSink {
        inner: InMemorySink::new(),
        hook: move |n: usize| {
            if n == 3 {
                trigger.cancel();
            }
        },
    };
    let mut src = SyntheticClip::stepped(8, 8, fps30(), 30);

    let report = orch.run(&mut src, &mut sink, &cancel).unwrap();

    assert_eq!(report.completion, Completion::Cancelled);
    assert_eq!(report.frames_rendered, 3);
    assert_eq!(sink.inner.completions(), &[Completion::Cancelled]);
    assert!(sink.inner.progress_reports().iter().all(|&p| p < 1.0));
}

#[test]
fn sink_error_ends_the_session_with_an_error_completion() {
    struct FailingSink {
        completions: Vec<Completion>,
    }
    impl FrameSink for FailingSink {
        fn begin(&mut self, _: SinkConfig) -> DitherResult<()> {
            Ok(())
        }
        fn push_frame(&mut self, _: &FrameRGBA) -> DitherResult<()> {
            Err(retrodither::DitherError::frame_processing("disk full"))
        }
        fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
            self.completions.push(completion.clone());
            Ok(())
        }
    }

    let orch = Orchestrator::new(SharedSettings::default(), opts()).without_gpu();
    let mut src = SyntheticClip::stepped(4, 4, fps30(), 5);
    let mut sink = FailingSink {
        completions: Vec::new(),
    };
    let err = orch
        .run(&mut src, &mut sink, &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("disk full"));
    assert_eq!(sink.completions.len(), 1);
    assert!(matches!(&sink.completions[0], Completion::Error(m) if m.contains("disk full")));
}

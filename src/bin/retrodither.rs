use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use retrodither::{
    Algorithm, BackendPreference, CancelToken, Completion, DitherResult, EffectSettings, Fps,
    FrameRGBA, FrameSink, FrameSource, Orchestrator, OrchestratorOpts, PreviewOpts, RefreshPacing,
    SharedSettings, SinkConfig,
    sink::{
        ffmpeg::{FfmpegSink, FfmpegSinkOpts},
        png::PngSequenceSink,
    },
    source::{
        Stepped,
        ffmpeg::{FfmpegSource, decode_still, probe_video},
        images::{ImageSequence, load_still},
        realtime::Realtime,
    },
};
use tracing_subscriber::EnvFilter;

const VIDEO_OUT_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm"];
const IMAGE_IN_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

#[derive(Parser, Debug)]
#[command(name = "retrodither", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dither a video file or image directory into an MP4 (requires `ffmpeg`) or a PNG sequence.
    Render(RenderArgs),
    /// Write a single downscaled preview PNG.
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct EffectArgs {
    /// Effect settings JSON. Flags below override its fields.
    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmChoice>,

    /// Dither intensity in [0, 1].
    #[arg(long)]
    mix: Option<f32>,

    /// Pixelation block size in pixels.
    #[arg(long)]
    pixel_block: Option<u32>,

    /// Seconds over which the intensity ramps up from zero.
    #[arg(long)]
    ramp_seconds: Option<f64>,

    /// RGB multiplier applied after pixelation.
    #[arg(long)]
    brightness: Option<f32>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Input video file, image file or directory of images.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output MP4/MOV/MKV/WEBM file, or a directory for a PNG sequence.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    effect: EffectArgs,

    #[arg(long, value_enum, default_value_t = BackendChoice::Auto)]
    backend: BackendChoice,

    /// Frame rate for image inputs.
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Output size as WIDTHxHEIGHT. Defaults to the input size.
    #[arg(long, value_parser = parse_size)]
    size: Option<(u32, u32)>,

    /// Play image inputs against the wall clock at display rate, dropping late frames.
    #[arg(long)]
    realtime: bool,

    /// Copy the input's audio track into a video output.
    #[arg(long)]
    keep_audio: bool,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    /// Input video or image file.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[command(flatten)]
    effect: EffectArgs,

    #[arg(long, default_value_t = retrodither::preview::PREVIEW_MAX_WIDTH)]
    max_width: u32,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmChoice {
    None,
    Ordered,
    ErrorDiffusion,
}

impl From<AlgorithmChoice> for Algorithm {
    fn from(c: AlgorithmChoice) -> Self {
        match c {
            AlgorithmChoice::None => Algorithm::None,
            AlgorithmChoice::Ordered => Algorithm::Ordered,
            AlgorithmChoice::ErrorDiffusion => Algorithm::ErrorDiffusion,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendChoice {
    Auto,
    Cpu,
}

fn main() -> anyhow::Result<()> {
    initialise_tracing();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Preview(args) => cmd_preview(args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{s}'"))?;
    let w = w.trim().parse::<u32>().map_err(|e| e.to_string())?;
    let h = h.trim().parse::<u32>().map_err(|e| e.to_string())?;
    if w == 0 || h == 0 {
        return Err("size must be non-zero".to_string());
    }
    Ok((w, h))
}

fn effect_settings(args: &EffectArgs) -> anyhow::Result<EffectSettings> {
    let mut s = match &args.settings {
        Some(path) => EffectSettings::from_json_file(path)?,
        None => EffectSettings::default(),
    };
    if let Some(a) = args.algorithm {
        s = s.with_algorithm(a.into());
    }
    if let Some(m) = args.mix {
        s = s.with_mix(m);
    }
    if let Some(b) = args.pixel_block {
        s = s.with_pixel_block(b);
    }
    if let Some(r) = args.ramp_seconds {
        s = s.with_ramp_seconds(r)?;
    }
    if let Some(b) = args.brightness {
        s = s.with_brightness(b)?;
    }
    Ok(s)
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| exts.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn open_source(args: &RenderArgs) -> anyhow::Result<Box<dyn FrameSource>> {
    let fps = Fps::new(args.fps, 1)?;
    let seq = if args.in_path.is_dir() {
        Some(ImageSequence::from_dir(&args.in_path, fps)?)
    } else if has_extension(&args.in_path, IMAGE_IN_EXTENSIONS) {
        Some(ImageSequence::from_paths(vec![args.in_path.clone()], fps)?)
    } else {
        None
    };
    Ok(match seq {
        Some(seq) if args.realtime => Box::new(Realtime::new(seq)),
        Some(seq) => Box::new(Stepped::new(seq)),
        None => Box::new(FfmpegSource::open(&args.in_path)?),
    })
}

/// Prints progress to stderr in 10% steps and forwards everything to the wrapped sink.
struct ProgressPrinter<'a> {
    inner: &'a mut dyn FrameSink,
    last_step: Option<u32>,
}

impl FrameSink for ProgressPrinter<'_> {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()> {
        self.last_step = None;
        self.inner.begin(cfg)
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()> {
        self.inner.push_frame(frame)
    }

    fn progress(&mut self, fraction: f64) {
        let step = (fraction * 10.0).floor() as u32;
        if self.last_step.is_none_or(|last| step > last) {
            eprintln!("progress: {}%", step * 10);
            self.last_step = Some(step);
        }
        self.inner.progress(fraction);
    }

    fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
        self.inner.finish(completion)
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let settings = effect_settings(&args.effect)?;
    let mut source = open_source(&args)?;

    let mut sink: Box<dyn FrameSink> = if has_extension(&args.out, VIDEO_OUT_EXTENSIONS) {
        let mut opts = FfmpegSinkOpts::new(&args.out);
        if args.keep_audio && !args.in_path.is_dir() {
            opts = opts.with_audio_from(&args.in_path);
        }
        Box::new(FfmpegSink::new(opts))
    } else {
        Box::new(PngSequenceSink::new(&args.out))
    };

    let opts = OrchestratorOpts {
        backend: match args.backend {
            BackendChoice::Auto => BackendPreference::Auto,
            BackendChoice::Cpu => BackendPreference::Cpu,
        },
        pacing: if args.realtime {
            RefreshPacing::default()
        } else {
            RefreshPacing::Unthrottled
        },
        output_size: args.size,
    };
    let orchestrator = Orchestrator::new(SharedSettings::new(settings), opts);
    let mut printer = ProgressPrinter {
        inner: sink.as_mut(),
        last_step: None,
    };
    let report = orchestrator
        .run(source.as_mut(), &mut printer, &CancelToken::new())
        .with_context(|| format!("render '{}'", args.in_path.display()))?;

    for w in &report.warnings {
        eprintln!("warning: {w}");
    }
    eprintln!(
        "wrote {} ({} frames, {}x{}, {:?}{}, {} dropped)",
        args.out.display(),
        report.frames_rendered,
        report.width,
        report.height,
        report.finished_on,
        if report.fell_back() { " after fallback" } else { "" },
        report.frames_dropped
    );
    Ok(())
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let settings = effect_settings(&args.effect)?;
    let frame = if has_extension(&args.in_path, IMAGE_IN_EXTENSIONS) {
        load_still(&args.in_path)?
    } else {
        let info = probe_video(&args.in_path)?;
        decode_still(&info, info.preview_time())?
    };

    let out = retrodither::render_preview(
        &frame,
        &settings,
        &PreviewOpts {
            max_width: args.max_width,
        },
    )?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &out.data,
        out.width,
        out.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {} ({}x{})", args.out.display(), out.width, out.height);
    Ok(())
}

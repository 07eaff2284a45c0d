use std::{
    ffi::OsString,
    io::{Read as _, Write as _},
    path::PathBuf,
    process::{Child, ChildStdin, Command, Stdio},
    thread::JoinHandle,
};

use crate::{
    foundation::core::{Fps, FrameRGBA},
    foundation::error::{DitherError, DitherResult},
    sink::{Completion, FrameSink, SinkConfig, ensure_parent_dir},
    source::ffmpeg::is_ffmpeg_on_path,
};

/// Where and how [`FfmpegSink`] writes its video.
#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    /// Replace an existing file instead of failing.
    pub overwrite: bool,
    /// Color that shows through transparent pixels; the encoded video has no alpha.
    pub background: [u8; 3],
    /// Media file whose first audio track (if any) is muxed into the output.
    pub audio_from: Option<PathBuf>,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
            background: [0, 0, 0],
            audio_from: None,
        }
    }

    pub fn with_audio_from(mut self, path: impl Into<PathBuf>) -> Self {
        self.audio_from = Some(path.into());
        self
    }
}

/// A running `ffmpeg` process fed raw RGBA frames on stdin.
struct Encoder {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
}

impl Encoder {
    fn spawn(args: Vec<OsString>) -> DitherResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DitherError::initialization(format!("could not start ffmpeg encoder: {e}"))
            })?;
        let stdin = child.stdin.take();
        // Drain stderr continuously so a chatty encoder never blocks on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });
        if stdin.is_none() {
            return Err(DitherError::initialization("ffmpeg encoder has no stdin"));
        }
        Ok(Self {
            child,
            stdin,
            stderr,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> DitherResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DitherError::frame_processing("ffmpeg encoder input already closed"))?;
        stdin
            .write_all(bytes)
            .map_err(|e| DitherError::frame_processing(format!("ffmpeg encoder write failed: {e}")))
    }

    /// Close stdin and wait for the encoder to flush the file.
    fn close(mut self) -> DitherResult<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| DitherError::frame_processing(format!("ffmpeg encoder wait failed: {e}")))?;
        let log = self
            .stderr
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(());
        }
        Err(DitherError::frame_processing(format!(
            "ffmpeg encoder exited with {status}: {}",
            log.trim()
        )))
    }
}

impl Drop for Encoder {
    fn drop(&mut self) {
        if self.stdin.take().is_some() {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
    }
}

/// Encodes the session to H.264/yuv420p through the system `ffmpeg`, optionally carrying over the
/// input's audio.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    encoder: Option<Encoder>,
    size: (u32, u32),
    opaque: Vec<u8>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            encoder: None,
            size: (0, 0),
            opaque: Vec::new(),
        }
    }
}

/// Command line for an encoder reading `width × height` RGBA frames at `fps` from stdin.
fn encoder_args(opts: &FfmpegSinkOpts, width: u32, height: u32, fps: Fps) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    let mut push = |a: &str| args.push(a.into());
    push(if opts.overwrite { "-y" } else { "-n" });
    for a in ["-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgba"] {
        push(a);
    }
    push("-s");
    push(&format!("{width}x{height}"));
    // Before `-i`, `-r` is the input rate of the raw stream.
    push("-r");
    push(&format!("{}/{}", fps.num, fps.den));
    push("-i");
    push("pipe:0");
    match &opts.audio_from {
        Some(audio) => {
            args.push("-i".into());
            args.push(audio.into());
            // The trailing `?` tolerates inputs without an audio track.
            for a in ["-map", "0:v:0", "-map", "1:a:0?", "-c:a", "aac", "-shortest"] {
                args.push(a.into());
            }
        }
        None => args.push("-an".into()),
    }
    for a in [
        "-vf",
        "pad=ceil(iw/2)*2:ceil(ih/2)*2",
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-movflags",
        "+faststart",
    ] {
        args.push(a.into());
    }
    args.push(opts.out_path.clone().into());
    args
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()> {
        let fps = cfg
            .fps
            .ok_or_else(|| DitherError::validation("ffmpeg sink needs a source frame rate"))?;
        if cfg.width == 0 || cfg.height == 0 {
            return Err(DitherError::validation("ffmpeg sink needs a non-empty frame size"));
        }
        ensure_parent_dir(&self.opts.out_path)?;
        if !self.opts.overwrite && self.opts.out_path.exists() {
            return Err(DitherError::validation(format!(
                "refusing to overwrite '{}'",
                self.opts.out_path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(DitherError::initialization(
                "video output needs ffmpeg, which is not on PATH",
            ));
        }

        self.encoder = Some(Encoder::spawn(encoder_args(
            &self.opts,
            cfg.width,
            cfg.height,
            fps,
        ))?);
        self.size = (cfg.width, cfg.height);
        self.opaque.clear();
        tracing::debug!(
            out = %self.opts.out_path.display(),
            width = cfg.width,
            height = cfg.height,
            audio = self.opts.audio_from.is_some(),
            "ffmpeg encoder started"
        );
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()> {
        if (frame.width, frame.height) != self.size {
            return Err(DitherError::validation(format!(
                "ffmpeg sink expects {}x{} frames, got {}x{}",
                self.size.0, self.size.1, frame.width, frame.height
            )));
        }
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| DitherError::frame_processing("ffmpeg sink is not running"))?;
        flatten_alpha(&frame.data, self.opts.background, &mut self.opaque);
        encoder.write(&self.opaque)
    }

    fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
        let Some(encoder) = self.encoder.take() else {
            return Ok(());
        };
        // Frames encoded so far are kept even when the session was cancelled.
        match (encoder.close(), completion) {
            (Err(e), Completion::Error(_)) => {
                tracing::warn!(error = %e, "ffmpeg encoder also failed while closing");
                Ok(())
            }
            (result, _) => result,
        }
    }
}

/// Composite straight-alpha RGBA over an opaque `background` into `out`.
fn flatten_alpha(rgba: &[u8], background: [u8; 3], out: &mut Vec<u8>) {
    out.clear();
    out.reserve(rgba.len());
    for px in rgba.chunks_exact(4) {
        let a = u32::from(px[3]);
        if a == 255 {
            out.extend_from_slice(px);
            continue;
        }
        for (c, bg) in px[..3].iter().zip(background) {
            let v = (u32::from(*c) * a + u32::from(bg) * (255 - a) + 127) / 255;
            out.push(v as u8);
        }
        out.push(255);
    }
}

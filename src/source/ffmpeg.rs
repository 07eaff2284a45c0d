use std::{
    io::Read as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::{
    foundation::core::{Fps, Frame, rgba8_len},
    foundation::error::{DitherError, DitherResult},
    source::FrameSource,
};

/// Stream layout reported by `ffprobe`.
#[derive(Clone, Debug)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: Fps,
    pub duration_sec: f64,
    pub has_audio: bool,
}

impl VideoInfo {
    /// Moment sampled for an instant preview: 5% into the clip, kept clear of the last frame.
    pub fn preview_time(&self) -> f64 {
        crate::preview::preview_sample_time(self.duration_sec)
    }
}

pub fn probe_video(path: &Path) -> DitherResult<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| DitherError::initialization(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(DitherError::initialization(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| DitherError::initialization(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| DitherError::validation("no video stream found"))?;
    let width = video
        .width
        .ok_or_else(|| DitherError::validation("missing video width from ffprobe"))?;
    let height = video
        .height
        .ok_or_else(|| DitherError::validation("missing video height from ffprobe"))?;
    let (num, den) = parse_ff_ratio(video.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| DitherError::validation("invalid video r_frame_rate"))?;
    let duration_sec = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
        .unwrap_or(0.0);

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps: Fps::new(num, den)?,
        duration_sec,
        has_audio: parsed
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some("audio")),
    })
}

/// Decode the single frame at `time_sec` as a static frame.
pub fn decode_still(info: &VideoInfo, time_sec: f64) -> DitherResult<Frame> {
    let out = Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{time_sec:.6}")])
        .arg("-i")
        .arg(&info.path)
        .args(["-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .output()
        .map_err(|e| DitherError::frame_processing(format!("failed to run ffmpeg: {e}")))?;
    if !out.status.success() {
        return Err(DitherError::frame_processing(format!(
            "ffmpeg still decode failed for '{}': {}",
            info.path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    let expected = rgba8_len(info.width, info.height)?;
    if out.stdout.len() < expected {
        return Err(DitherError::frame_processing(format!(
            "ffmpeg returned {} bytes, expected {expected}",
            out.stdout.len()
        )));
    }
    let mut data = out.stdout;
    data.truncate(expected);
    Frame::new(info.width, info.height, data, 0.0, 0.0)
}

/// Sequential decode of a video file through a long-running `ffmpeg` process.
///
/// Playback position is the index of the next decoded frame, so a session never drops frames.
/// One frame is read ahead so the end of the stream is known before the next grab.
pub struct FfmpegSource {
    info: VideoInfo,
    child: Child,
    stdout: ChildStdout,
    stderr_log: Option<std::thread::JoinHandle<String>>,
    frame_len: usize,
    pending: Option<Vec<u8>>,
    next: u64,
    paused: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> DitherResult<Self> {
        let info = probe_video(path)?;
        Self::from_info(info)
    }

    pub fn from_info(info: VideoInfo) -> DitherResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-nostdin", "-loglevel", "error", "-i"])
            .arg(&info.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                DitherError::initialization(format!("could not start ffmpeg decoder: {e}"))
            })?;
        let (Some(stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(DitherError::initialization("ffmpeg decoder pipes are unavailable"));
        };
        let stderr_log = std::thread::spawn(move || {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text);
            text
        });

        let mut source = Self {
            frame_len: rgba8_len(info.width, info.height)?,
            info,
            child,
            stdout,
            stderr_log: Some(stderr_log),
            pending: None,
            next: 0,
            paused: false,
        };
        source.pending = source.read_frame()?;
        if source.pending.is_none() {
            let detail = source.stderr_text();
            return Err(DitherError::initialization(format!(
                "ffmpeg produced no frames for '{}': {detail}",
                source.info.path.display()
            )));
        }
        tracing::debug!(
            path = %source.info.path.display(),
            width = source.info.width,
            height = source.info.height,
            fps = source.info.fps.as_f64(),
            duration = source.info.duration_sec,
            "opened ffmpeg source"
        );
        Ok(source)
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    fn read_frame(&mut self) -> DitherResult<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.frame_len];
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.stdout.read(&mut buf[filled..]).map_err(|e| {
                DitherError::frame_processing(format!("failed to read ffmpeg output: {e}"))
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        match filled {
            0 => Ok(None),
            n if n == buf.len() => Ok(Some(buf)),
            n => Err(DitherError::frame_processing(format!(
                "ffmpeg output ended mid-frame ({n} of {} bytes)",
                buf.len()
            ))),
        }
    }

    fn stderr_text(&mut self) -> String {
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.stderr_log
            .take()
            .and_then(|h| h.join().ok())
            .map(|text| text.trim().to_owned())
            .unwrap_or_default()
    }
}

impl FrameSource for FfmpegSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn fps(&self) -> Option<Fps> {
        Some(self.info.fps)
    }

    fn duration(&self) -> f64 {
        self.info.duration_sec
    }

    fn current_time(&self) -> f64 {
        self.info.fps.frames_to_secs(self.next)
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_ended(&self) -> bool {
        self.pending.is_none()
    }

    fn grab(&mut self) -> DitherResult<Frame> {
        let data = self
            .pending
            .take()
            .ok_or_else(|| DitherError::validation("cannot grab from an ended source"))?;
        let timestamp = self.current_time();
        self.next += 1;
        self.pending = self.read_frame()?;
        Frame::new(
            self.info.width,
            self.info.height,
            data,
            timestamp,
            self.info.duration_sec,
        )
    }

    fn pause(&mut self) {
        self.paused = true;
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(h) = self.stderr_log.take() {
            let _ = h.join();
        }
    }
}

/// Parse ffprobe's `num/den` rate notation; zero on either side means unknown.
fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.trim().split_once('/')?;
    let pair = (num.parse::<u32>().ok()?, den.parse::<u32>().ok()?);
    (pair.0 > 0 && pair.1 > 0).then_some(pair)
}

/// Whether an `ffmpeg` binary answers `-version` from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ff_ratio_parsing() {
        assert_eq!(parse_ff_ratio("30000/1001"), Some((30000, 1001)));
        assert_eq!(parse_ff_ratio("25/1"), Some((25, 1)));
        assert_eq!(parse_ff_ratio("0/0"), None);
        assert_eq!(parse_ff_ratio("garbage"), None);
    }

    #[test]
    fn preview_time_of_probed_clip() {
        let info = VideoInfo {
            path: PathBuf::from("clip.mp4"),
            width: 2,
            height: 2,
            fps: Fps::new(30, 1).unwrap(),
            duration_sec: 10.0,
            has_audio: false,
        };
        assert!((info.preview_time() - 0.5).abs() < 1e-12);
    }
}

use std::path::PathBuf;

use anyhow::Context as _;

use crate::{
    foundation::core::FrameRGBA,
    foundation::error::{DitherError, DitherResult},
    sink::{Completion, FrameSink, SinkConfig},
};

/// Writes each presented frame as `frame_000000.png`, `frame_000001.png`, ... under a directory.
#[derive(Debug)]
pub struct PngSequenceSink {
    dir: PathBuf,
    cfg: Option<SinkConfig>,
    written: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cfg: None,
            written: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{index:06}.png"))
    }
}

impl FrameSink for PngSequenceSink {
    fn begin(&mut self, cfg: SinkConfig) -> DitherResult<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create output directory '{}'", self.dir.display()))?;
        self.cfg = Some(cfg);
        self.written = 0;
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> DitherResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| DitherError::validation("png sink not started"))?;
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(DitherError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        let path = self.frame_path(self.written);
        image::save_buffer_with_format(
            &path,
            &frame.data,
            frame.width,
            frame.height,
            image::ColorType::Rgba8,
            image::ImageFormat::Png,
        )
        .with_context(|| format!("write '{}'", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self, completion: &Completion) -> DitherResult<()> {
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.written,
            ?completion,
            "png sequence finished"
        );
        self.cfg = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_numbered_pngs() {
        let dir = std::env::temp_dir().join(format!("retrodither-png-{}", std::process::id()));
        let mut sink = PngSequenceSink::new(&dir);
        sink.begin(SinkConfig {
            width: 2,
            height: 1,
            fps: None,
        })
        .unwrap();
        let frame = FrameRGBA {
            width: 2,
            height: 1,
            data: vec![0, 0, 0, 255, 255, 255, 255, 255],
        };
        sink.push_frame(&frame).unwrap();
        sink.push_frame(&frame).unwrap();
        sink.finish(&Completion::Done).unwrap();

        assert_eq!(sink.frames_written(), 2);
        let img = image::open(dir.join("frame_000001.png")).unwrap().to_rgba8();
        assert_eq!(img.into_raw(), frame.data);

        let wrong = FrameRGBA {
            width: 1,
            height: 1,
            data: vec![0; 4],
        };
        sink.begin(SinkConfig {
            width: 2,
            height: 1,
            fps: None,
        })
        .unwrap();
        assert!(sink.push_frame(&wrong).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::{
    foundation::core::{Fps, Frame},
    foundation::error::{DitherError, DitherResult},
    source::IndexedSource,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp"];

/// A directory (or explicit list) of still images treated as consecutive frames.
///
/// Images are decoded on demand. Each frame keeps its own size; the pipeline resamples to the
/// session's output size.
#[derive(Clone, Debug)]
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    fps: Fps,
    width: u32,
    height: u32,
}

impl ImageSequence {
    pub fn from_paths(paths: Vec<PathBuf>, fps: Fps) -> DitherResult<Self> {
        let first = paths
            .first()
            .ok_or_else(|| DitherError::validation("image sequence is empty"))?;
        let (width, height) = image::image_dimensions(first)
            .with_context(|| format!("read image header '{}'", first.display()))?;
        Ok(Self {
            paths,
            fps,
            width,
            height,
        })
    }

    /// All images in `dir` with a known extension, in lexicographic file-name order.
    pub fn from_dir(dir: &Path, fps: Fps) -> DitherResult<Self> {
        let mut paths = Vec::new();
        let entries =
            std::fs::read_dir(dir).with_context(|| format!("list '{}'", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("list '{}'", dir.display()))?
                .path();
            let known = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if known && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        tracing::debug!(dir = %dir.display(), frames = paths.len(), "image sequence");
        Self::from_paths(paths, fps)
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

/// Decode one still image into a static frame (`duration == 0`).
pub fn load_still(path: &Path) -> DitherResult<Frame> {
    let img = image::open(path)
        .with_context(|| format!("decode image '{}'", path.display()))?
        .to_rgba8();
    let (w, h) = img.dimensions();
    Frame::new(w, h, img.into_raw(), 0.0, 0.0)
}

impl IndexedSource for ImageSequence {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fps(&self) -> Fps {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.paths.len() as u64
    }

    fn frame_at(&mut self, index: u64) -> DitherResult<Frame> {
        let path = usize::try_from(index)
            .ok()
            .and_then(|i| self.paths.get(i))
            .ok_or_else(|| {
                DitherError::validation(format!("image sequence has no frame {index}"))
            })?;
        load_still(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_is_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("retrodither-seq-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for (name, shade) in [("b.png", 200u8), ("a.png", 10u8)] {
            image::save_buffer_with_format(
                dir.join(name),
                &[shade, shade, shade, 255].repeat(6),
                3,
                2,
                image::ColorType::Rgba8,
                image::ImageFormat::Png,
            )
            .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "skip me").unwrap();

        let mut seq = ImageSequence::from_dir(&dir, Fps::new(12, 1).unwrap()).unwrap();
        assert_eq!(seq.frame_count(), 2);
        assert_eq!(seq.dimensions(), (3, 2));
        assert_eq!(seq.frame_at(0).unwrap().data[0], 10);
        assert_eq!(seq.frame_at(1).unwrap().data[0], 200);
        assert!(seq.frame_at(2).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(ImageSequence::from_paths(Vec::new(), Fps::new(1, 1).unwrap()).is_err());
    }
}

use crate::{
    foundation::core::{Frame, rgba8_len},
    foundation::error::{DitherError, DitherResult},
};

/// Mosaic stage: area-average downsample into a `⌊W/B⌋ × ⌊H/B⌋` buffer, then nearest-neighbor
/// upsample back to the target size.
///
/// The intermediate buffer is cached and only reallocated when the block size or target size
/// changes.
#[derive(Debug, Default)]
pub struct PixelationStage {
    block: u32,
    target_w: u32,
    target_h: u32,
    small_w: u32,
    small_h: u32,
    small: Vec<u8>,
    reallocations: u64,
}

impl PixelationStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intermediate buffer size for a target size and block.
    pub fn reduced_size(target_w: u32, target_h: u32, block: u32) -> (u32, u32) {
        let block = block.max(1);
        ((target_w / block).max(1), (target_h / block).max(1))
    }

    /// Number of intermediate-buffer allocations performed so far.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Render `src` into `dst` (`target_w × target_h` RGBA8).
    pub fn apply(
        &mut self,
        src: &Frame,
        block: u32,
        dst: &mut [u8],
        target_w: u32,
        target_h: u32,
    ) -> DitherResult<()> {
        if dst.len() != rgba8_len(target_w, target_h)? {
            return Err(DitherError::frame_processing(
                "pixelation target buffer does not match target size",
            ));
        }
        if src.data.len() != rgba8_len(src.width, src.height)? {
            return Err(DitherError::frame_processing(
                "pixelation source buffer does not match frame size",
            ));
        }

        if block <= 1 {
            if src.width == target_w && src.height == target_h {
                dst.copy_from_slice(&src.data);
            } else {
                resample_area(&src.data, src.width, src.height, dst, target_w, target_h);
            }
            return Ok(());
        }

        self.ensure_buffer(block, target_w, target_h)?;
        resample_area(
            &src.data,
            src.width,
            src.height,
            &mut self.small,
            self.small_w,
            self.small_h,
        );
        upsample_nearest(
            &self.small,
            self.small_w,
            self.small_h,
            dst,
            target_w,
            target_h,
        );
        Ok(())
    }

    /// Drop the cached intermediate buffer.
    pub fn release(&mut self) {
        self.small = Vec::new();
        self.block = 0;
        self.small_w = 0;
        self.small_h = 0;
    }

    fn ensure_buffer(&mut self, block: u32, target_w: u32, target_h: u32) -> DitherResult<()> {
        if self.block == block
            && self.target_w == target_w
            && self.target_h == target_h
            && !self.small.is_empty()
        {
            return Ok(());
        }
        let (w, h) = Self::reduced_size(target_w, target_h, block);
        tracing::debug!(block, w, h, "allocating pixelation buffer");
        self.small = vec![0u8; rgba8_len(w, h)?];
        self.small_w = w;
        self.small_h = h;
        self.block = block;
        self.target_w = target_w;
        self.target_h = target_h;
        self.reallocations += 1;
        Ok(())
    }
}

/// Box-filter resample. Each destination pixel averages the source rectangle it covers; when
/// enlarging the rectangle is a single pixel, which degenerates to nearest-neighbor.
pub(crate) fn resample_area(src: &[u8], sw: u32, sh: u32, dst: &mut [u8], dw: u32, dh: u32) {
    let (sw_us, dw_us) = (sw as usize, dw as usize);
    for dy in 0..dh as usize {
        let y0 = dy * sh as usize / dh as usize;
        let y1 = ((dy + 1) * sh as usize / dh as usize).max(y0 + 1);
        for dx in 0..dw_us {
            let x0 = dx * sw_us / dw_us;
            let x1 = ((dx + 1) * sw_us / dw_us).max(x0 + 1);

            let mut acc = [0u32; 4];
            for sy in y0..y1 {
                let row = sy * sw_us;
                for sx in x0..x1 {
                    let idx = (row + sx) * 4;
                    for c in 0..4 {
                        acc[c] += u32::from(src[idx + c]);
                    }
                }
            }
            let n = ((y1 - y0) * (x1 - x0)) as u32;
            let out = (dy * dw_us + dx) * 4;
            for c in 0..4 {
                dst[out + c] = ((acc[c] + n / 2) / n) as u8;
            }
        }
    }
}

fn upsample_nearest(src: &[u8], sw: u32, sh: u32, dst: &mut [u8], dw: u32, dh: u32) {
    let (sw_us, dw_us) = (sw as usize, dw as usize);
    for dy in 0..dh as usize {
        let sy = dy * sh as usize / dh as usize;
        for dx in 0..dw_us {
            let sx = dx * sw_us / dw_us;
            let s = (sy * sw_us + sx) * 4;
            let d = (dy * dw_us + dx) * 4;
            dst[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn unique_pixels(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 255]);
            }
        }
        Frame::new(width, height, data, 0.0, 0.0).unwrap()
    }

    #[test]
    fn block_one_is_identity() {
        let src = unique_pixels(17, 9);
        let mut dst = vec![0u8; src.data.len()];
        let mut stage = PixelationStage::new();
        stage.apply(&src, 1, &mut dst, 17, 9).unwrap();
        assert_eq!(dst, src.data);
        assert_eq!(stage.reallocations(), 0);
    }

    #[test]
    fn block_n_limits_distinct_regions() {
        let (w, h, n) = (24u32, 18u32, 5u32);
        let src = unique_pixels(w, h);
        let mut dst = vec![0u8; src.data.len()];
        let mut stage = PixelationStage::new();
        stage.apply(&src, n, &mut dst, w, h).unwrap();

        let distinct: HashSet<&[u8]> = dst.chunks_exact(4).collect();
        assert!(distinct.len() as u32 <= (w / n) * (h / n));
        assert!(distinct.len() > 1);
    }

    #[test]
    fn blocks_are_uniform_squares() {
        let src = unique_pixels(8, 8);
        let mut dst = vec![0u8; src.data.len()];
        let mut stage = PixelationStage::new();
        stage.apply(&src, 4, &mut dst, 8, 8).unwrap();
        let px = |x: usize, y: usize| &dst[(y * 8 + x) * 4..(y * 8 + x) * 4 + 4];
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(px(x, y), px(0, 0));
                assert_eq!(px(x + 4, y + 4), px(4, 4));
            }
        }
        assert_ne!(px(0, 0), px(4, 4));
    }

    #[test]
    fn buffer_reallocates_only_on_block_change() {
        let src = unique_pixels(16, 16);
        let mut dst = vec![0u8; src.data.len()];
        let mut stage = PixelationStage::new();
        for _ in 0..3 {
            stage.apply(&src, 4, &mut dst, 16, 16).unwrap();
        }
        assert_eq!(stage.reallocations(), 1);
        stage.apply(&src, 2, &mut dst, 16, 16).unwrap();
        stage.apply(&src, 2, &mut dst, 16, 16).unwrap();
        assert_eq!(stage.reallocations(), 2);
    }

    #[test]
    fn block_larger_than_frame_collapses_to_one_color() {
        let src = Frame::solid(5, 3, [10, 20, 30, 255]).unwrap();
        let mut dst = vec![0u8; src.data.len()];
        let mut stage = PixelationStage::new();
        stage.apply(&src, 64, &mut dst, 5, 3).unwrap();
        assert!(dst.chunks_exact(4).all(|p| p == [10, 20, 30, 255]));
    }

    #[test]
    fn resamples_to_a_different_target_size() {
        let src = Frame::solid(4, 4, [9, 8, 7, 255]).unwrap();
        let mut dst = vec![0u8; 2 * 2 * 4];
        let mut stage = PixelationStage::new();
        stage.apply(&src, 1, &mut dst, 2, 2).unwrap();
        assert!(dst.chunks_exact(4).all(|p| p == [9, 8, 7, 255]));
    }
}

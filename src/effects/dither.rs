use crate::{
    effects::bayer::bayer_threshold,
    foundation::core::rgba8_len,
    foundation::error::{DitherError, DitherResult},
    settings::Algorithm,
};

const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Rec. 601 luma of an RGB8 triple, clamped to `[0, 255]`.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> f32 {
    (LUMA_R * f32::from(r) + LUMA_G * f32::from(g) + LUMA_B * f32::from(b)).clamp(0.0, 255.0)
}

#[inline]
fn binarize(v: f32) -> f32 {
    if v < 128.0 { 0.0 } else { 255.0 }
}

#[inline]
fn blend_channel(c: u8, bw: f32, mix: f32) -> u8 {
    let c = f32::from(c);
    (c + (bw - c) * mix).round().clamp(0.0, 255.0) as u8
}

#[inline]
fn blend_pixel(px: &mut [u8], bw: f32, mix: f32) {
    px[0] = blend_channel(px[0], bw, mix);
    px[1] = blend_channel(px[1], bw, mix);
    px[2] = blend_channel(px[2], bw, mix);
}

fn check_len(pixels: &[u8], width: u32, height: u32) -> DitherResult<()> {
    if pixels.len() != rgba8_len(width, height)? {
        return Err(DitherError::frame_processing(format!(
            "dither expects {width}x{height} rgba8 pixels, got {} bytes",
            pixels.len()
        )));
    }
    Ok(())
}

/// Multiply RGB by `factor`, saturating at 255. Alpha is untouched.
pub fn apply_brightness(pixels: &mut [u8], factor: f32) {
    for px in pixels.chunks_exact_mut(4) {
        for c in &mut px[..3] {
            *c = (f32::from(*c) * factor).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Ordered (Bayer 4x4) dither, blended toward the source by `mix`.
///
/// Pure per-pixel function: the output of a pixel depends only on its value, its coordinates and
/// `mix`.
pub fn ordered_dither(pixels: &mut [u8], width: u32, height: u32, mix: f32) -> DitherResult<()> {
    check_len(pixels, width, height)?;
    if mix <= 0.0 {
        return Ok(());
    }

    for (i, px) in pixels.chunks_exact_mut(4).enumerate() {
        let x = (i % width as usize) as u32;
        let y = (i / width as usize) as u32;
        let gray = luma(px[0], px[1], px[2]);
        let adjusted = gray + bayer_threshold(x, y) * 255.0 * mix;
        blend_pixel(px, binarize(adjusted), mix);
    }
    Ok(())
}

/// Floyd-Steinberg quantization of a luma plane in place.
///
/// Every entry ends up exactly 0 or 255. Returns the total error that fell off the frame edges,
/// so `sum(before) == sum(after) + returned` up to float rounding.
pub fn diffuse_luma(plane: &mut [f32], width: usize, height: usize) -> f32 {
    let mut clipped = 0.0f32;
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let old = plane[idx];
            let new = binarize(old);
            let err = old - new;
            plane[idx] = new;

            let has_right = x + 1 < width;
            let has_left = x > 0;
            let has_below = y + 1 < height;

            if has_right {
                plane[idx + 1] += err * 7.0 / 16.0;
            } else {
                clipped += err * 7.0 / 16.0;
            }

            if has_below {
                if has_left {
                    plane[idx + width - 1] += err * 3.0 / 16.0;
                } else {
                    clipped += err * 3.0 / 16.0;
                }
                plane[idx + width] += err * 5.0 / 16.0;
                if has_right {
                    plane[idx + width + 1] += err / 16.0;
                } else {
                    clipped += err / 16.0;
                }
            } else {
                clipped += err * 9.0 / 16.0;
            }
        }
    }
    clipped
}

/// Error-diffusion dither, blended toward the source by `mix`.
///
/// `luma_plane` is scratch storage reused across frames.
pub fn error_diffusion_dither(
    pixels: &mut [u8],
    width: u32,
    height: u32,
    mix: f32,
    luma_plane: &mut Vec<f32>,
) -> DitherResult<()> {
    check_len(pixels, width, height)?;
    if mix <= 0.0 {
        return Ok(());
    }

    luma_plane.clear();
    luma_plane.extend(
        pixels
            .chunks_exact(4)
            .map(|px| LUMA_R * f32::from(px[0]) + LUMA_G * f32::from(px[1]) + LUMA_B * f32::from(px[2])),
    );
    diffuse_luma(luma_plane, width as usize, height as usize);

    for (px, &q) in pixels.chunks_exact_mut(4).zip(luma_plane.iter()) {
        blend_pixel(px, binarize(q), mix);
    }
    Ok(())
}

/// Dither stage with its per-session scratch buffers.
#[derive(Debug, Default)]
pub struct DitherStage {
    luma_plane: Vec<f32>,
}

impl DitherStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(
        &mut self,
        algorithm: Algorithm,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        mix: f32,
    ) -> DitherResult<()> {
        match algorithm {
            Algorithm::None => check_len(pixels, width, height),
            Algorithm::Ordered => ordered_dither(pixels, width, height, mix),
            Algorithm::ErrorDiffusion => {
                error_diffusion_dither(pixels, width, height, mix, &mut self.luma_plane)
            }
        }
    }

    /// Drop scratch storage.
    pub fn release(&mut self) {
        self.luma_plane = Vec::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::bayer::BAYER_4X4;

    fn gradient(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                out.extend_from_slice(&[
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    ((x + y) * 7 % 256) as u8,
                    200,
                ]);
            }
        }
        out
    }

    #[test]
    fn luma_of_gray_is_gray() {
        assert!((luma(128, 128, 128) - 128.0).abs() < 1e-3);
        assert_eq!(luma(255, 255, 255), 255.0);
        assert_eq!(luma(0, 0, 0), 0.0);
    }

    #[test]
    fn ordered_mid_gray_reproduces_bayer_pattern() {
        let mut px = [128u8, 128, 128, 255].repeat(16);
        ordered_dither(&mut px, 4, 4, 1.0).unwrap();
        for (i, chunk) in px.chunks_exact(4).enumerate() {
            let expected = if BAYER_4X4[i] >= 8 { 255 } else { 0 };
            assert_eq!(chunk, &[expected, expected, expected, 255], "pixel {i}");
        }
    }

    #[test]
    fn ordered_is_deterministic() {
        let src = gradient(13, 7);
        let mut a = src.clone();
        let mut b = src.clone();
        ordered_dither(&mut a, 13, 7, 0.6).unwrap();
        ordered_dither(&mut b, 13, 7, 0.6).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, src);
    }

    #[test]
    fn zero_mix_is_identity_for_both_algorithms() {
        let src = gradient(9, 5);
        let mut stage = DitherStage::new();
        for algorithm in [Algorithm::None, Algorithm::Ordered, Algorithm::ErrorDiffusion] {
            let mut px = src.clone();
            stage.apply(algorithm, &mut px, 9, 5, 0.0).unwrap();
            assert_eq!(px, src, "{algorithm:?}");
        }
    }

    #[test]
    fn alpha_is_never_touched() {
        let src = gradient(8, 8);
        let mut stage = DitherStage::new();
        for algorithm in [Algorithm::Ordered, Algorithm::ErrorDiffusion] {
            let mut px = src.clone();
            stage.apply(algorithm, &mut px, 8, 8, 1.0).unwrap();
            assert!(px.chunks_exact(4).all(|p| p[3] == 200));
        }
    }

    #[test]
    fn full_mix_is_binary() {
        let mut px = gradient(16, 16);
        let mut plane = Vec::new();
        error_diffusion_dither(&mut px, 16, 16, 1.0, &mut plane).unwrap();
        assert!(
            px.chunks_exact(4)
                .all(|p| p[..3].iter().all(|&c| c == 0 || c == 255))
        );
    }

    #[test]
    fn diffusion_conserves_luma_up_to_border_loss() {
        let (w, h) = (16usize, 12usize);
        let mut plane: Vec<f32> = (0..w * h).map(|i| ((i * 37) % 256) as f32).collect();
        let before: f64 = plane.iter().map(|&v| f64::from(v)).sum();
        let clipped = diffuse_luma(&mut plane, w, h);
        let after: f64 = plane.iter().map(|&v| f64::from(v)).sum();
        assert!(plane.iter().all(|&v| v == 0.0 || v == 255.0));
        let residual = before - after - f64::from(clipped);
        assert!(residual.abs() < 0.5, "residual {residual}");
    }

    #[test]
    fn diffusion_of_mid_gray_is_roughly_half_white() {
        let (w, h) = (32usize, 32usize);
        let mut plane = vec![127.5f32; w * h];
        diffuse_luma(&mut plane, w, h);
        let white = plane.iter().filter(|&&v| v == 255.0).count();
        let ratio = white as f64 / (w * h) as f64;
        assert!((ratio - 0.5).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn brightness_scales_rgb_only() {
        let mut px = vec![100u8, 200, 10, 50];
        apply_brightness(&mut px, 1.5);
        assert_eq!(px, vec![150, 255, 15, 50]);
    }

    #[test]
    fn rejects_wrong_buffer_size() {
        let mut px = vec![0u8; 12];
        assert!(ordered_dither(&mut px, 2, 2, 1.0).is_err());
    }
}

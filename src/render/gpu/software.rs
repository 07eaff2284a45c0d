use crate::{
    effects::dither::{apply_brightness, ordered_dither},
    foundation::core::{Frame, Surface},
    foundation::error::{DitherError, DitherResult},
    render::gpu::shader::{DitherShader, ShaderParams, ShaderProvider},
    settings::GpuAlgorithm,
};

/// Reference rendition of the dither shader on the CPU.
///
/// Samples exactly like the fragment shader (nearest texel at the snapped block center) so its
/// output is the parity target for hardware backends. Also lets the worker protocol run on
/// machines without a GPU.
#[derive(Clone, Copy, Debug, Default)]
pub struct SoftwareShaderProvider;

impl ShaderProvider for SoftwareShaderProvider {
    fn name(&self) -> &str {
        "software"
    }

    fn create(&self, width: u32, height: u32) -> DitherResult<Box<dyn DitherShader>> {
        if width == 0 || height == 0 {
            return Err(DitherError::initialization(
                "shader target width/height must be non-zero",
            ));
        }
        Ok(Box::new(SoftwareShader {
            width,
            height,
            source: None,
        }))
    }
}

struct SoftwareShader {
    width: u32,
    height: u32,
    source: Option<Frame>,
}

impl DitherShader for SoftwareShader {
    fn upload(&mut self, image: &Frame) -> DitherResult<()> {
        self.source = Some(image.clone());
        Ok(())
    }

    fn draw(&mut self, params: &ShaderParams, surface: &mut Surface) -> DitherResult<()> {
        let src = self
            .source
            .as_ref()
            .ok_or_else(|| DitherError::frame_processing("draw before upload"))?;
        if surface.width() != self.width || surface.height() != self.height {
            return Err(DitherError::frame_processing(
                "surface size does not match shader target",
            ));
        }
        sample_snapped(src, params.pixel_block, surface.data_mut(), self.width, self.height);
        if params.brightness != 1.0 {
            apply_brightness(surface.data_mut(), params.brightness);
        }
        if params.algorithm == GpuAlgorithm::Ordered {
            ordered_dither(surface.data_mut(), self.width, self.height, params.mix)?;
        }
        Ok(())
    }
}

/// Nearest-texel sampling with UVs snapped to the center of each `block`-sized cell.
pub(crate) fn sample_snapped(src: &Frame, block: u32, dst: &mut [u8], dw: u32, dh: u32) {
    let (sw, sh) = (src.width as f64, src.height as f64);
    let block = f64::from(block.max(1));
    let cells_x = (f64::from(dw) / block).floor().max(1.0);
    let cells_y = (f64::from(dh) / block).floor().max(1.0);
    let snap = |uv: f64, cells: f64| {
        if block > 1.0 {
            ((uv * cells).floor() + 0.5) / cells
        } else {
            uv
        }
    };
    for y in 0..dh {
        let v = snap((f64::from(y) + 0.5) / f64::from(dh), cells_y);
        let sy = ((v * sh).floor() as i64).clamp(0, src.height as i64 - 1) as usize;
        for x in 0..dw {
            let u = snap((f64::from(x) + 0.5) / f64::from(dw), cells_x);
            let sx = ((u * sw).floor() as i64).clamp(0, src.width as i64 - 1) as usize;
            let s = (sy * src.width as usize + sx) * 4;
            let d = (y as usize * dw as usize + x as usize) * 4;
            dst[d..d + 4].copy_from_slice(&src.data[s..s + 4]);
        }
    }
}

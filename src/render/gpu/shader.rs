use crate::{
    foundation::core::{Frame, Surface},
    foundation::error::DitherResult,
    settings::{GpuAlgorithm, GpuEffect},
};

/// Uniforms for one draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShaderParams {
    pub algorithm: GpuAlgorithm,
    /// Eased intensity for this frame.
    pub mix: f32,
    pub pixel_block: u32,
    pub brightness: f32,
}

impl ShaderParams {
    pub fn new(effect: &GpuEffect, mix: f32) -> Self {
        Self {
            algorithm: effect.algorithm(),
            mix,
            pixel_block: effect.settings().pixel_block(),
            brightness: effect.settings().brightness(),
        }
    }

    /// Little-endian uniform block: `mix, brightness, block, algorithm, out_w, out_h, 0, 0`.
    pub fn to_uniform_bytes(&self, out_w: u32, out_h: u32) -> [u8; UNIFORM_BYTES] {
        let algorithm = match self.algorithm {
            GpuAlgorithm::None => 0.0f32,
            GpuAlgorithm::Ordered => 1.0,
        };
        let fields = [
            self.mix,
            self.brightness,
            self.pixel_block.max(1) as f32,
            algorithm,
            out_w as f32,
            out_h as f32,
            0.0,
            0.0,
        ];
        let mut out = [0u8; UNIFORM_BYTES];
        for (chunk, v) in out.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

pub const UNIFORM_BYTES: usize = 32;

/// A compiled pixelate/dither program bound to one output size.
///
/// Lives on the worker thread only. Dropping it releases every GPU resource it holds.
pub trait DitherShader {
    /// Upload a source image into the source texture.
    fn upload(&mut self, image: &Frame) -> DitherResult<()>;
    /// Draw the last uploaded image into `surface`.
    fn draw(&mut self, params: &ShaderParams, surface: &mut Surface) -> DitherResult<()>;
}

/// Creates [`DitherShader`]s. Called on the worker thread, so implementations that need a
/// thread-affine context create it there.
pub trait ShaderProvider: Send + Sync {
    fn name(&self) -> &str;
    /// Compile and link the program and allocate its textures. Failures here are
    /// initialization failures.
    fn create(&self, width: u32, height: u32) -> DitherResult<Box<dyn DitherShader>>;
}

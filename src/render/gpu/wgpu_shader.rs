use crate::{
    effects::bayer::BAYER_4X4,
    foundation::core::{Frame, Surface},
    foundation::error::{DitherError, DitherResult},
    render::gpu::shader::{DitherShader, ShaderParams, ShaderProvider, UNIFORM_BYTES},
};

const DITHER_WGSL: &str = r#"
struct VsOut {
  @builtin(position) pos: vec4<f32>,
};

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VsOut {
  var p = array<vec2<f32>, 3>(
    vec2<f32>(-1.0, -1.0),
    vec2<f32>( 3.0, -1.0),
    vec2<f32>(-1.0,  3.0),
  );
  var o: VsOut;
  o.pos = vec4<f32>(p[vi], 0.0, 1.0);
  return o;
}

struct Params {
  amount: f32,
  brightness: f32,
  block: f32,
  algorithm: f32,
  out_size: vec2<f32>,
  pad: vec2<f32>,
};

@group(0) @binding(0) var t_src: texture_2d<f32>;
@group(0) @binding(1) var t_bayer: texture_2d<u32>;
@group(0) @binding(2) var<uniform> params: Params;

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
  let px = floor(in.pos.xy);
  let src_size = vec2<f32>(textureDimensions(t_src));

  var uv = (px + vec2<f32>(0.5)) / params.out_size;
  if (params.block > 1.0) {
    let cells = max(floor(params.out_size / params.block), vec2<f32>(1.0));
    uv = (floor(uv * cells) + vec2<f32>(0.5)) / cells;
  }
  let max_texel = vec2<i32>(src_size) - vec2<i32>(1);
  let texel = clamp(vec2<i32>(floor(uv * src_size)), vec2<i32>(0), max_texel);
  let c = textureLoad(t_src, texel, 0);

  var rgb = clamp(c.rgb * params.brightness, vec3<f32>(0.0), vec3<f32>(1.0));
  if (params.algorithm > 0.5 && params.amount > 0.0) {
    let gray = min(dot(rgb * 255.0, vec3<f32>(0.299, 0.587, 0.114)), 255.0);
    let cell = vec2<i32>(i32(px.x) & 3, i32(px.y) & 3);
    let b = f32(textureLoad(t_bayer, cell, 0).r);
    let adjusted = gray + ((b + 0.5) / 16.0 - 0.5) * 255.0 * params.amount;
    let bw = select(1.0, 0.0, adjusted < 128.0);
    rgb = mix(rgb, vec3<f32>(bw), params.amount);
  }
  return vec4<f32>(rgb, c.a);
}
"#;

/// Hardware shader provider backed by `wgpu`.
#[derive(Clone, Copy, Debug)]
pub struct WgpuShaderProvider {
    pub power_preference: wgpu::PowerPreference,
}

impl Default for WgpuShaderProvider {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
        }
    }
}

impl ShaderProvider for WgpuShaderProvider {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create(&self, width: u32, height: u32) -> DitherResult<Box<dyn DitherShader>> {
        Ok(Box::new(WgpuDitherShader::new(
            width,
            height,
            self.power_preference,
        )?))
    }
}

struct SourceTexture {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuDitherShader {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    params: wgpu::Buffer,
    bayer_view: wgpu::TextureView,
    source: Option<SourceTexture>,

    target: wgpu::Texture,
    target_view: wgpu::TextureView,
    readback: wgpu::Buffer,
    readback_bytes_per_row: u32,
    width: u32,
    height: u32,
}

impl WgpuDitherShader {
    pub fn new(
        width: u32,
        height: u32,
        power_preference: wgpu::PowerPreference,
    ) -> DitherResult<Self> {
        if width == 0 || height == 0 {
            return Err(DitherError::initialization(
                "shader target width/height must be non-zero",
            ));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| match e {
            wgpu::RequestAdapterError::NotFound { .. } => {
                DitherError::initialization("no gpu adapter available")
            }
            other => {
                DitherError::initialization(format!("wgpu request_adapter failed: {other:?}"))
            }
        })?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| DitherError::initialization(format!("wgpu request_device failed: {e:?}")))?;

        let max_dim = device.limits().max_texture_dimension_2d;
        if width > max_dim || height > max_dim {
            return Err(DitherError::initialization(format!(
                "{width}x{height} exceeds the device texture limit {max_dim}"
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("retrodither_shader"),
            source: wgpu::ShaderSource::Wgsl(DITHER_WGSL.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("retrodither_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Uint,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(UNIFORM_BYTES as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("retrodither_pl"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("retrodither_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(DitherError::initialization(format!(
                "dither shader failed to compile or link: {err}"
            )));
        }

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("retrodither_params"),
            size: UNIFORM_BYTES as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bayer = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retrodither_bayer"),
            size: wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Uint,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &bayer,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &BAYER_4X4,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(4),
            },
            wgpu::Extent3d {
                width: 4,
                height: 4,
                depth_or_array_layers: 1,
            },
        );
        let bayer_view = bayer.create_view(&wgpu::TextureViewDescriptor::default());

        let target = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retrodither_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let bytes_per_row_unpadded = width
            .checked_mul(4)
            .ok_or_else(|| DitherError::initialization("render target width overflow"))?;
        let bytes_per_row = align_to(bytes_per_row_unpadded, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer_size = (bytes_per_row as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| DitherError::initialization("readback buffer size overflow"))?;
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("retrodither_readback"),
            size: buffer_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(
            adapter = %adapter.get_info().name,
            backend = ?adapter.get_info().backend,
            width,
            height,
            "wgpu dither shader initialized"
        );

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            params,
            bayer_view,
            source: None,
            target,
            target_view,
            readback,
            readback_bytes_per_row: bytes_per_row,
            width,
            height,
        })
    }

    fn ensure_source(&mut self, width: u32, height: u32) {
        if self
            .source
            .as_ref()
            .is_some_and(|s| s.width == width && s.height == height)
        {
            return;
        }
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("retrodither_source"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("retrodither_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.bayer_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.params.as_entire_binding(),
                },
            ],
        });
        tracing::debug!(width, height, "allocated source texture");
        self.source = Some(SourceTexture {
            width,
            height,
            texture,
            bind_group,
        });
    }
}

impl DitherShader for WgpuDitherShader {
    fn upload(&mut self, image: &Frame) -> DitherResult<()> {
        let max_dim = self.device.limits().max_texture_dimension_2d;
        if image.width > max_dim || image.height > max_dim {
            return Err(DitherError::frame_processing(format!(
                "source frame {}x{} exceeds the device texture limit {max_dim}",
                image.width, image.height
            )));
        }
        self.ensure_source(image.width, image.height);
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| DitherError::frame_processing("source texture missing"))?;
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &source.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn draw(&mut self, params: &ShaderParams, surface: &mut Surface) -> DitherResult<()> {
        if surface.width() != self.width || surface.height() != self.height {
            return Err(DitherError::frame_processing(
                "surface size does not match shader target",
            ));
        }
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| DitherError::frame_processing("draw before upload"))?;

        self.queue.write_buffer(
            &self.params,
            0,
            &params.to_uniform_bytes(self.width, self.height),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("retrodither_encoder"),
            });
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("retrodither_rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&self.pipeline);
            rp.set_bind_group(0, &source.bind_group, &[]);
            rp.draw(0..3, 0..1);
        }
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.readback_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| DitherError::frame_processing(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| DitherError::frame_processing("readback channel closed"))?
            .map_err(|e| DitherError::frame_processing(format!("readback map failed: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = (self.width as usize) * 4;
        let padded_row_bytes = self.readback_bytes_per_row as usize;
        let out = surface.data_mut();
        for row in 0..self.height as usize {
            let start = row * padded_row_bytes;
            out[row * row_bytes..(row + 1) * row_bytes]
                .copy_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        self.readback.unmap();
        Ok(())
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_align_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1284, 256), 1536);
    }
}

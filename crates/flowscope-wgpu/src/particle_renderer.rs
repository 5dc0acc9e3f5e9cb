//! GPU program for flow particles.
//!
//! Owns its pipeline, vertex buffer, camera uniform and sprite texture
//! exclusively. The vertex buffer is sized once for the whole pool and
//! rewritten every frame from [`ParticleSystem::write_vertices`] output.
//!
//! [`ParticleSystem::write_vertices`]: flowscope_core::ParticleSystem::write_vertices

use std::path::Path;

use flowscope_core::particles::{BlendFactor, ParticleVertex};
use flowscope_core::{BlendMode, Camera};
use glam::Vec2;

use crate::error::Result;
use crate::gpu;

const SHADER: &str = include_str!("shaders/particles.wgsl");

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32,
    3 => Float32,
    4 => Float32x4
];

/// Camera uniform of the particle program.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleUniforms {
    pub resolution: [f32; 2],
    pub offset: [f32; 2],
    pub zoom: f32,
    /// 1.0 when a sprite texture is bound
    pub use_texture: f32,
    pub _pad: [f32; 2],
}

/// Vertex layout for [`ParticleVertex`].
pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<ParticleVertex>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRIBUTES,
    }
}

fn wgpu_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::Dst => wgpu::BlendFactor::Dst,
    }
}

/// Pipeline blend state for a blend mode.
pub fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    let (src, dst) = mode.factors();
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu_factor(src),
            dst_factor: wgpu_factor(dst),
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent::OVER,
    }
}

/// GPU objects released by [`ParticleRenderer::dispose`].
struct Resources {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    texture: wgpu::Texture,
    camera_bind_group: wgpu::BindGroup,
    sprite_bind_group: wgpu::BindGroup,
}

/// Draws packed particle quads.
pub struct ParticleRenderer {
    resources: Option<Resources>,
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    format: wgpu::TextureFormat,
    blend_mode: BlendMode,
    /// Resolution last written to the uniform
    resolution: Vec2,
    use_texture: bool,
    vertex_capacity: usize,
    vertex_count: u32,
}

impl ParticleRenderer {
    /// Build the program for a pool of `max_vertices` vertices.
    ///
    /// `texture_source` is loaded as the sprite; without one the fragment
    /// stage draws soft discs.
    pub async fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        blend_mode: BlendMode,
        texture_source: Option<&Path>,
        max_vertices: usize,
    ) -> Result<Self> {
        let shader = gpu::create_shader(device, "Particle Shader", SHADER).await?;

        let (texture, use_texture) = match texture_source {
            Some(path) => (load_texture(device, queue, path)?, true),
            None => (white_texture(device, queue), false),
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Particle Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Camera Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let sprite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Particle Sprite Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Uniforms"),
            size: std::mem::size_of::<ParticleUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Camera Bind Group"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let sprite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Sprite Bind Group"),
            layout: &sprite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&camera_layout, &sprite_layout],
            push_constant_ranges: &[],
        });

        let pipeline = create_pipeline(device, &pipeline_layout, &shader, format, blend_mode).await?;

        let vertex_capacity = max_vertices.max(1);
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Vertices"),
            size: (vertex_capacity * std::mem::size_of::<ParticleVertex>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(
            vertices = vertex_capacity,
            ?blend_mode,
            textured = use_texture,
            "Particle program ready"
        );

        Ok(Self {
            resources: Some(Resources {
                pipeline,
                vertex_buffer,
                uniform_buffer,
                texture,
                camera_bind_group,
                sprite_bind_group,
            }),
            shader,
            pipeline_layout,
            format,
            blend_mode,
            resolution: Vec2::ZERO,
            use_texture,
            vertex_capacity,
            vertex_count: 0,
        })
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Switch blend mode, rebuilding the pipeline.
    pub async fn set_blend_mode(&mut self, device: &wgpu::Device, mode: BlendMode) -> Result<()> {
        if mode == self.blend_mode {
            return Ok(());
        }
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };
        resources.pipeline = create_pipeline(device, &self.pipeline_layout, &self.shader, self.format, mode).await?;
        self.blend_mode = mode;
        tracing::debug!(?mode, "Particle blend mode changed");
        Ok(())
    }

    /// Update the resolution uniform if the target size changed.
    ///
    /// Returns `true` when the uniform was rewritten.
    pub fn reconcile(&mut self, queue: &wgpu::Queue, camera: &Camera, size: Vec2) -> bool {
        let Some(resources) = self.resources.as_ref() else {
            return false;
        };
        let changed = size != self.resolution;
        if changed {
            self.resolution = size;
        }
        // Offset and zoom are written on every call
        let uniforms = ParticleUniforms {
            resolution: size.to_array(),
            offset: camera.offset().to_array(),
            zoom: camera.zoom(),
            use_texture: if self.use_texture { 1.0 } else { 0.0 },
            _pad: [0.0; 2],
        };
        queue.write_buffer(&resources.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        changed
    }

    /// Upload this frame's vertices. Extra vertices past the pool size are dropped.
    pub fn prepare(&mut self, queue: &wgpu::Queue, vertices: &[ParticleVertex]) {
        let Some(resources) = self.resources.as_ref() else {
            self.vertex_count = 0;
            return;
        };
        let count = vertices.len().min(self.vertex_capacity);
        if count > 0 {
            queue.write_buffer(&resources.vertex_buffer, 0, bytemuck::cast_slice(&vertices[..count]));
        }
        self.vertex_count = count as u32;
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        let Some(resources) = self.resources.as_ref() else {
            return;
        };
        if self.vertex_count == 0 {
            return;
        }
        pass.set_pipeline(&resources.pipeline);
        pass.set_bind_group(0, &resources.camera_bind_group, &[]);
        pass.set_bind_group(1, &resources.sprite_bind_group, &[]);
        pass.set_vertex_buffer(0, resources.vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count, 0..1);
    }

    /// Release GPU resources. Later calls do nothing.
    pub fn dispose(&mut self) {
        if let Some(resources) = self.resources.take() {
            resources.vertex_buffer.destroy();
            resources.uniform_buffer.destroy();
            resources.texture.destroy();
            self.vertex_count = 0;
            tracing::debug!("Particle program disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.resources.is_none()
    }
}

impl Drop for ParticleRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    mode: BlendMode,
) -> Result<wgpu::RenderPipeline> {
    let buffers = [vertex_layout()];
    let targets = [Some(wgpu::ColorTargetState {
        format,
        blend: Some(blend_state(mode)),
        write_mask: wgpu::ColorWrites::ALL,
    })];
    gpu::create_pipeline(
        device,
        &wgpu::RenderPipelineDescriptor {
            label: Some("Particle Pipeline"),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        },
    )
    .await
}

fn load_texture(device: &wgpu::Device, queue: &wgpu::Queue, path: &Path) -> Result<wgpu::Texture> {
    let image = image::open(path)?.to_rgba8();
    let (width, height) = image.dimensions();
    tracing::info!(path = %path.display(), width, height, "Loaded particle texture");
    Ok(upload_rgba(device, queue, "Particle Texture", width, height, image.as_raw()))
}

/// 1x1 white texture bound when no sprite is configured.
fn white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
    upload_rgba(device, queue, "Particle Placeholder", 1, 1, &[255, 255, 255, 255])
}

fn upload_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    label: &str,
    width: u32,
    height: u32,
    data: &[u8],
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, std::mem::size_of::<ParticleVertex>() as u64);
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.offset + last.format.size(), layout.array_stride);
        assert_eq!(last.shader_location, 4);
    }

    #[test]
    fn blend_modes_use_distinct_states() {
        let normal = blend_state(BlendMode::Normal);
        let additive = blend_state(BlendMode::Additive);
        let multiply = blend_state(BlendMode::Multiply);
        assert_ne!(normal, additive);
        assert_ne!(additive, multiply);
        assert_ne!(normal, multiply);

        assert_eq!(additive.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(additive.color.dst_factor, wgpu::BlendFactor::One);
        assert_eq!(multiply.color.src_factor, wgpu::BlendFactor::Dst);
        assert_eq!(normal.color, wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        });
    }

    #[test]
    fn uniforms_are_aligned() {
        assert_eq!(std::mem::size_of::<ParticleUniforms>() % 16, 0);
    }
}

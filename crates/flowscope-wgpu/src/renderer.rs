//! Frame presentation: scene pass, then particles and text.

use std::sync::Arc;

use flowscope_core::particles::ParticleVertex;
use flowscope_core::{BlendMode, Camera, FrameDrawList, ParticleConfig, QualitySettings};
use glam::Vec2;
use winit::dpi::PhysicalSize;
use winit::window::Window;

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::particle_renderer::ParticleRenderer;
use crate::scene::SceneRenderer;
use crate::text::TextOverlay;

/// Surface size for a window at a given resolution scale.
///
/// The engine works in logical pixels; the surface is the logical size
/// multiplied by the quality's resolution scale.
pub fn surface_size_for(physical: PhysicalSize<u32>, scale_factor: f64, resolution_scale: f32) -> (u32, u32) {
    let scale_factor = scale_factor.max(0.1);
    let logical_w = physical.width as f64 / scale_factor;
    let logical_h = physical.height as f64 / scale_factor;
    let scale = resolution_scale.max(0.1) as f64;
    (
        ((logical_w * scale).round() as u32).max(1),
        ((logical_h * scale).round() as u32).max(1),
    )
}

/// Window renderer.
pub struct Renderer {
    gpu: GpuContext,
    scene: SceneRenderer,
    particles: ParticleRenderer,
    text: TextOverlay,
    physical: PhysicalSize<u32>,
    scale_factor: f64,
    resolution_scale: f32,
}

impl Renderer {
    /// Create every GPU object. Any failure aborts construction.
    pub async fn new(window: Arc<Window>, particles: &ParticleConfig) -> Result<Self> {
        let physical = window.inner_size();
        let scale_factor = window.scale_factor();

        let gpu = GpuContext::new(window).await?;
        let scene = SceneRenderer::new(&gpu.device, gpu.format()).await?;
        let max_vertices = particles.max_particles * flowscope_core::particles::VERTICES_PER_PARTICLE;
        let particle_renderer = ParticleRenderer::new(
            &gpu.device,
            &gpu.queue,
            gpu.format(),
            particles.blend_mode,
            particles.texture_source.as_deref(),
            max_vertices,
        )
        .await?;
        let text = TextOverlay::new(&gpu.device, &gpu.queue, gpu.format());

        let mut renderer = Self {
            gpu,
            scene,
            particles: particle_renderer,
            text,
            physical,
            scale_factor,
            resolution_scale: 1.0,
        };
        renderer.apply_surface_size();
        Ok(renderer)
    }

    /// Physical window size.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.physical
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Window size in logical pixels, the space the engine works in.
    pub fn logical_size(&self) -> Vec2 {
        let s = self.scale_factor.max(0.1);
        Vec2::new(
            (self.physical.width as f64 / s) as f32,
            (self.physical.height as f64 / s) as f32,
        )
    }

    /// Track a new window size and apply the quality's resolution scale.
    pub fn resize(&mut self, physical: PhysicalSize<u32>, scale_factor: f64, quality: &QualitySettings) {
        self.physical = physical;
        self.scale_factor = scale_factor;
        self.resolution_scale = quality.resolution_scale;
        self.apply_surface_size();
    }

    fn apply_surface_size(&mut self) {
        if self.physical.width == 0 || self.physical.height == 0 {
            return;
        }
        let (w, h) = surface_size_for(self.physical, self.scale_factor, self.resolution_scale);
        self.gpu.configure(w, h);
    }

    /// Reconfigure after the surface was lost.
    pub fn recover(&mut self) {
        tracing::warn!("Surface lost, reconfiguring");
        self.gpu.reconfigure();
    }

    pub async fn set_blend_mode(&mut self, mode: BlendMode) -> Result<()> {
        self.particles.set_blend_mode(&self.gpu.device, mode).await
    }

    /// Draw one frame.
    pub fn render(
        &mut self,
        list: &FrameDrawList,
        particles: &[ParticleVertex],
        camera: &Camera,
    ) -> std::result::Result<(), wgpu::SurfaceError> {
        if (list.quality.resolution_scale - self.resolution_scale).abs() > f32::EPSILON {
            self.resolution_scale = list.quality.resolution_scale;
            self.apply_surface_size();
        }

        let logical = self.logical_size();
        self.scene
            .prepare(&self.gpu.device, &self.gpu.queue, list, camera, logical);
        self.particles.reconcile(&self.gpu.queue, camera, logical);
        self.particles.prepare(&self.gpu.queue, particles);
        self.text.prepare(
            &self.gpu.device,
            &self.gpu.queue,
            list,
            camera,
            logical,
            self.gpu.surface_size(),
        );

        let output = self.gpu.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let [r, g, b, a] = list.clear_color;
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: a as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.scene.draw(&mut pass);
        }
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Particle And Text Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.particles.draw(&mut pass);
            self.text.draw(&mut pass);
        }

        self.gpu.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.text.trim();
        Ok(())
    }

    /// Release the particle program ahead of drop.
    pub fn dispose(&mut self) {
        self.particles.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_follows_resolution_scale() {
        let physical = PhysicalSize::new(2560, 1440);
        assert_eq!(surface_size_for(physical, 2.0, 2.0), (2560, 1440));
        assert_eq!(surface_size_for(physical, 2.0, 1.0), (1280, 720));
    }

    #[test]
    fn surface_never_collapses() {
        assert_eq!(surface_size_for(PhysicalSize::new(0, 0), 1.0, 1.0), (1, 1));
    }
}

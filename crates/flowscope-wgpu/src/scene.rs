//! Instanced node and edge drawing.

use flowscope_core::compositor::{pack_rgba, EdgeInstance, NodeInstance, Overlay};
use flowscope_core::{Camera, FrameDrawList};
use glam::Vec2;

use crate::error::Result;
use crate::gpu;

const SHADER: &str = include_str!("shaders/scene.wgsl");

/// Quad vertices per instance.
const QUAD_VERTICES: u32 = 6;

const NODE_ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32,
    2 => Uint32,
    3 => Float32,
    4 => Uint32
];

const EDGE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32x2,
    2 => Float32,
    3 => Uint32
];

const WARNING_BAR: u32 = pack_rgba(0xf5, 0x9e, 0x0b, 0xff);

/// Camera and surface state shared by the scene shaders.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniforms {
    /// Logical surface size in pixels
    pub resolution: [f32; 2],
    pub offset: [f32; 2],
    pub zoom: f32,
    /// 1.0 enables soft edges
    pub antialias: f32,
    pub _pad: [f32; 2],
}

impl SceneUniforms {
    pub fn new(camera: &Camera, logical_size: Vec2, antialias: bool) -> Self {
        Self {
            resolution: logical_size.to_array(),
            offset: camera.offset().to_array(),
            zoom: camera.zoom(),
            antialias: if antialias { 1.0 } else { 0.0 },
            _pad: [0.0; 2],
        }
    }
}

/// Per-instance layout for [`NodeInstance`].
pub fn node_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<NodeInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &NODE_ATTRIBUTES,
    }
}

/// Per-instance layout for [`EdgeInstance`].
pub fn edge_instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<EdgeInstance>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &EDGE_ATTRIBUTES,
    }
}

/// A vertex buffer that grows to fit its contents.
struct InstanceBuffer {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: usize,
    len: u32,
}

impl InstanceBuffer {
    fn new(device: &wgpu::Device, label: &'static str, capacity: usize, stride: usize) -> Self {
        Self {
            label,
            buffer: create_vertex_buffer(device, label, capacity * stride),
            capacity,
            len: 0,
        }
    }

    fn write<T: bytemuck::Pod>(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, items: &[T]) {
        if items.len() > self.capacity {
            self.capacity = items.len().next_power_of_two();
            self.buffer = create_vertex_buffer(device, self.label, self.capacity * std::mem::size_of::<T>());
            tracing::debug!(label = self.label, capacity = self.capacity, "Grew instance buffer");
        }
        if !items.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(items));
        }
        self.len = items.len() as u32;
    }
}

fn create_vertex_buffer(device: &wgpu::Device, label: &str, size: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(16) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Draws the node and edge layers of a [`FrameDrawList`].
pub struct SceneRenderer {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    node_pipeline: wgpu::RenderPipeline,
    edge_pipeline: wgpu::RenderPipeline,
    nodes: InstanceBuffer,
    /// Edges followed by overlay strokes
    edges: InstanceBuffer,
    strokes: Vec<EdgeInstance>,
}

impl SceneRenderer {
    pub async fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let shader = gpu::create_shader(device, "Scene Shader", SHADER).await?;

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Uniforms"),
            size: std::mem::size_of::<SceneUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Scene Bind Group Layout"),
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

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let targets = [Some(wgpu::ColorTargetState {
            format,
            blend: Some(wgpu::BlendState::ALPHA_BLENDING),
            write_mask: wgpu::ColorWrites::ALL,
        })];

        let node_buffers = [node_instance_layout()];
        let node_pipeline = gpu::create_pipeline(
            device,
            &instanced_pipeline("Node Pipeline", &layout, &shader, ("vs_node", "fs_node"), &node_buffers, &targets),
        )
        .await?;

        let edge_buffers = [edge_instance_layout()];
        let edge_pipeline = gpu::create_pipeline(
            device,
            &instanced_pipeline("Edge Pipeline", &layout, &shader, ("vs_edge", "fs_edge"), &edge_buffers, &targets),
        )
        .await?;

        tracing::info!("Scene pipelines created");

        Ok(Self {
            uniform_buffer,
            bind_group,
            node_pipeline,
            edge_pipeline,
            nodes: InstanceBuffer::new(device, "Node Instances", 256, std::mem::size_of::<NodeInstance>()),
            edges: InstanceBuffer::new(device, "Edge Instances", 512, std::mem::size_of::<EdgeInstance>()),
            strokes: Vec::new(),
        })
    }

    /// Upload this frame's instances and camera.
    pub fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        list: &FrameDrawList,
        camera: &Camera,
        logical_size: Vec2,
    ) {
        let uniforms = SceneUniforms::new(camera, logical_size, list.quality.antialiasing);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        self.nodes.write(device, queue, &list.nodes);

        self.strokes.clear();
        self.strokes.extend_from_slice(&list.edges);
        overlay_strokes(list, camera, logical_size, &mut self.strokes);
        self.edges.write(device, queue, &self.strokes);
    }

    /// Record nodes, then edges and overlays.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_bind_group(0, &self.bind_group, &[]);

        if self.nodes.len > 0 {
            pass.set_pipeline(&self.node_pipeline);
            pass.set_vertex_buffer(0, self.nodes.buffer.slice(..));
            pass.draw(0..QUAD_VERTICES, 0..self.nodes.len);
        }
        if self.edges.len > 0 {
            pass.set_pipeline(&self.edge_pipeline);
            pass.set_vertex_buffer(0, self.edges.buffer.slice(..));
            pass.draw(0..QUAD_VERTICES, 0..self.edges.len);
        }
    }
}

/// The performance warning bar along the top edge, expressed as a stroke
/// for the edge pipeline. Label and HUD text is drawn by [`crate::text`].
pub fn overlay_strokes(list: &FrameDrawList, camera: &Camera, logical_size: Vec2, out: &mut Vec<EdgeInstance>) {
    if list.overlays.contains(&Overlay::PerformanceWarning) {
        let left = camera.screen_to_world(Vec2::new(0.0, 3.0));
        let right = camera.screen_to_world(Vec2::new(logical_size.x, 3.0));
        out.push(EdgeInstance {
            from: left.to_array(),
            to: right.to_array(),
            width: 6.0,
            color: WARNING_BAR,
        });
    }
}

fn instanced_pipeline<'a>(
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    (vs, fs): (&'a str, &'a str),
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    targets: &'a [Option<wgpu::ColorTargetState>],
) -> wgpu::RenderPipelineDescriptor<'a> {
    wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(vs),
            buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs),
            targets,
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowscope_core::compositor::Label;
    use flowscope_core::{DetailTier, NodeId, QualitySettings};

    fn ends_at_stride(layout: &wgpu::VertexBufferLayout<'_>) -> bool {
        let last = layout.attributes.last().unwrap();
        last.offset + last.format.size() == layout.array_stride
    }

    #[test]
    fn instance_layouts_match_structs() {
        let nodes = node_instance_layout();
        assert_eq!(nodes.array_stride, std::mem::size_of::<NodeInstance>() as u64);
        assert!(ends_at_stride(&nodes));

        let edges = edge_instance_layout();
        assert_eq!(edges.array_stride, std::mem::size_of::<EdgeInstance>() as u64);
        assert!(ends_at_stride(&edges));
    }

    #[test]
    fn uniforms_are_aligned() {
        assert_eq!(std::mem::size_of::<SceneUniforms>() % 16, 0);
    }

    #[test]
    fn warning_becomes_stroke() {
        let mut list = FrameDrawList {
            clear_color: [0.0; 4],
            tier: DetailTier::High,
            quality: QualitySettings {
                antialiasing: true,
                resolution_scale: 1.0,
                max_edges: 10,
                emission_scale: 1.0,
            },
            nodes: Vec::new(),
            edges: Vec::new(),
            labels: vec![Label {
                node: NodeId(1),
                anchor: Vec2::new(10.0, 10.0),
                offset: 12.0,
            }],
            overlays: vec![Overlay::PerformanceWarning],
        };
        let mut camera = Camera::default();
        camera.set_zoom(2.0);

        let mut out = Vec::new();
        overlay_strokes(&list, &camera, Vec2::new(800.0, 600.0), &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].from, [0.0, 1.5]);
        assert_eq!(out[0].to, [400.0, 1.5]);

        list.overlays.clear();
        out.clear();
        overlay_strokes(&list, &camera, Vec2::new(800.0, 600.0), &mut out);
        assert!(out.is_empty());
    }
}

use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec3};
use wgpu::util::DeviceExt;

use crate::{
    camera::Camera,
    resource::Release,
    scene::{Light, Scene},
};

pub struct VertexBuffer(wgpu::Buffer);

impl VertexBuffer {
    pub fn init_immediate<'label>(
        device: &wgpu::Device,
        content: &[u8],
        label: Option<&'label str>,
    ) -> Self {
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label,
            contents: content,
            usage: wgpu::BufferUsages::VERTEX,
        };
        let buffer = device.create_buffer_init(&init_descriptor);
        Self(buffer)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.0
    }
}

pub struct IndexBuffer {
    buffer: wgpu::Buffer,
    format: wgpu::IndexFormat,
    count: u32,
}

macro_rules! index_buffer_init_immediate {
    ($device:expr, $content:expr, $label:expr, $ty:ident) => {{
        let init_descriptor = wgpu::util::BufferInitDescriptor {
            label: $label,
            contents: bytemuck::cast_slice($content),
            usage: wgpu::BufferUsages::INDEX,
        };
        let buffer = $device.create_buffer_init(&init_descriptor);
        IndexBuffer {
            buffer,
            format: wgpu::IndexFormat::$ty,
            // the buffer itself may be padded to COPY_BUFFER_ALIGNMENT
            count: $content.len() as u32,
        }
    }};
}

impl IndexBuffer {
    pub fn init_immediate_u16<'label>(
        device: &wgpu::Device,
        content: &[u16],
        label: Option<&'label str>,
    ) -> Self {
        index_buffer_init_immediate!(device, content, label, Uint16)
    }

    pub fn init_immediate_u32<'label>(
        device: &wgpu::Device,
        content: &[u32],
        label: Option<&'label str>,
    ) -> Self {
        index_buffer_init_immediate!(device, content, label, Uint32)
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        self.format
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Vertex of the quad used to composite a render surface into its region.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[rustfmt::skip]
pub const QUAD_VERTICES: &[QuadVertex] = &[
    QuadVertex { position: [-1.0,  1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [ 1.0, -1.0], uv: [1.0, 1.0] },
    QuadVertex { position: [ 1.0,  1.0], uv: [1.0, 0.0] },
];

pub const QUAD_INDICES: &[u16] = &[0, 1, 2, 0, 2, 3];

/// CPU side triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// UV sphere centred on the origin. Rows run from the north pole (`v = 0`)
    /// to the south pole (`v = 1`); the seam column is duplicated so the
    /// texture wraps without stretching.
    pub fn sphere(radius: f32, width_segments: u32, height_segments: u32) -> Self {
        let width_segments = width_segments.max(3);
        let height_segments = height_segments.max(2);

        let vertex_count = (width_segments + 1) * (height_segments + 1);
        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for iy in 0..=height_segments {
            let v = iy as f32 / height_segments as f32;
            for ix in 0..=width_segments {
                let u = ix as f32 / width_segments as f32;
                let (sin_theta, cos_theta) = (v * PI).sin_cos();
                let (sin_phi, cos_phi) = (u * TAU).sin_cos();
                let normal = Vec3::new(-cos_phi * sin_theta, cos_theta, sin_phi * sin_theta);
                vertices.push(Vertex {
                    position: (normal * radius).to_array(),
                    normal: normal.to_array(),
                    uv: [u, v],
                });
            }
        }

        let row = width_segments + 1;
        let mut indices = Vec::with_capacity((6 * width_segments * (height_segments - 1)) as usize);
        for iy in 0..height_segments {
            for ix in 0..width_segments {
                let a = iy * row + ix + 1;
                let b = iy * row + ix;
                let c = (iy + 1) * row + ix;
                let d = (iy + 1) * row + ix + 1;

                // the pole rows collapse to a single triangle per quad
                if iy != 0 {
                    indices.extend_from_slice(&[a, b, d]);
                }
                if iy != height_segments - 1 {
                    indices.extend_from_slice(&[b, c, d]);
                }
            }
        }

        Self { vertices, indices }
    }
}

/// Vertex and index buffers of an uploaded mesh.
pub struct Geometry {
    vertex_buffer: VertexBuffer,
    index_buffer: IndexBuffer,
}

impl Geometry {
    pub fn upload(device: &wgpu::Device, mesh: &MeshData, label: &str) -> Self {
        let vertex_buffer = VertexBuffer::init_immediate(
            device,
            bytemuck::cast_slice(&mesh.vertices),
            Some(format!("{label} vertices").as_str()),
        );

        let index_label = format!("{label} indices");
        let index_buffer = if mesh.vertices.len() <= u16::MAX as usize + 1 {
            let indices: Vec<u16> = mesh.indices.iter().map(|&i| i as u16).collect();
            IndexBuffer::init_immediate_u16(device, &indices, Some(index_label.as_str()))
        } else {
            IndexBuffer::init_immediate_u32(device, &mesh.indices, Some(index_label.as_str()))
        };

        tracing::debug!(
            label,
            vertices = mesh.vertices.len(),
            indices = index_buffer.count(),
            "geometry uploaded"
        );

        Self {
            vertex_buffer,
            index_buffer,
        }
    }

    /// Full-viewport quad the compositor draws each render surface with.
    pub fn quad(device: &wgpu::Device) -> Self {
        Self {
            vertex_buffer: VertexBuffer::init_immediate(
                device,
                bytemuck::cast_slice(QUAD_VERTICES),
                Some("Quad Vertex Buffer"),
            ),
            index_buffer: IndexBuffer::init_immediate_u16(
                device,
                QUAD_INDICES,
                Some("Quad Index Buffer"),
            ),
        }
    }

    pub fn draw<'pass>(&'pass self, render_pass: &mut wgpu::RenderPass<'pass>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.buffer().slice(..));
        render_pass.set_index_buffer(
            self.index_buffer.buffer().slice(..),
            self.index_buffer.format(),
        );
        render_pass.draw_indexed(0..self.index_buffer.count(), 0, 0..1);
    }
}

impl Release for Geometry {
    fn release(&mut self) {
        self.vertex_buffer.buffer().destroy();
        self.index_buffer.buffer().destroy();
    }
}

/// Per-view camera and lighting data, bound at group 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SceneUniform {
    pub view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    /// rgb premultiplied by intensity
    pub ambient: [f32; 4],
    /// xyz: travel direction when w == 0, position when w == 1
    pub light_vector: [f32; 4],
    /// rgb premultiplied by intensity
    pub light_color: [f32; 4],
    /// x: cutoff distance (0 = none), y: decay exponent
    pub light_falloff: [f32; 4],
}

impl SceneUniform {
    pub fn new(camera: &Camera, scene: &Scene) -> Self {
        let (light_vector, light_color, light_falloff) = match scene.light {
            Light::Directional {
                direction,
                color,
                intensity,
            } => (
                direction.normalize_or_zero().extend(0.0),
                color * intensity,
                [0.0; 4],
            ),
            Light::Point {
                position,
                color,
                intensity,
                distance,
                decay,
            } => (
                position.extend(1.0),
                color * intensity,
                [distance, decay, 0.0, 0.0],
            ),
        };

        Self {
            view_projection: camera.view_projection_matrix().to_cols_array_2d(),
            camera_position: camera.eye.extend(1.0).to_array(),
            ambient: (scene.ambient.color * scene.ambient.intensity)
                .extend(1.0)
                .to_array(),
            light_vector: light_vector.to_array(),
            light_color: light_color.extend(1.0).to_array(),
            light_falloff,
        }
    }
}

/// Per-object transform, bound at group 2.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniform {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 4],
}

impl ModelUniform {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            normal: model.inverse().transpose().to_cols_array_2d(),
        }
    }
}

use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::{resource::Release, texture::Texture};

/// Surface reflectance parameters, comparable to a standard PBR material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub color: Vec3,
    pub emissive: Vec3,
    pub roughness: f32,
    pub metalness: f32,
    pub use_color_map: bool,
    pub use_reflectance_map: bool,
}

impl MaterialParams {
    pub fn earth() -> Self {
        Self {
            color: Vec3::ONE,
            emissive: Vec3::ZERO,
            roughness: 0.7,
            metalness: 0.0,
            use_color_map: true,
            use_reflectance_map: true,
        }
    }

    pub fn moon() -> Self {
        Self {
            color: Vec3::splat(0.8),
            emissive: Vec3::splat(0.6),
            roughness: 1.0,
            metalness: 0.0,
            use_color_map: false,
            use_reflectance_map: false,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub color: [f32; 4],
    pub emissive: [f32; 4],
    /// roughness, metalness, color map weight, reflectance map weight
    pub params: [f32; 4],
}

impl From<&MaterialParams> for MaterialUniform {
    fn from(params: &MaterialParams) -> Self {
        let weight = |enabled: bool| if enabled { 1.0 } else { 0.0 };
        Self {
            color: params.color.extend(1.0).to_array(),
            emissive: params.emissive.extend(1.0).to_array(),
            params: [
                params.roughness.clamp(0.0, 1.0),
                params.metalness.clamp(0.0, 1.0),
                weight(params.use_color_map),
                weight(params.use_reflectance_map),
            ],
        }
    }
}

/// One material instance per scene. The maps it samples are shared, so the
/// bind group is rebuilt whenever one of them is replaced.
pub struct Material {
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    label: &'static str,
}

impl Material {
    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };

        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("material_bind_group_layout"),
        })
    }

    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: MaterialParams,
        color_map: &Texture,
        reflectance_map: &Texture,
        label: &'static str,
    ) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(&[MaterialUniform::from(&params)]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = Self::create_bind_group(
            device,
            layout,
            &uniform_buffer,
            color_map,
            reflectance_map,
            label,
        );

        Self {
            uniform_buffer,
            bind_group,
            label,
        }
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        uniform_buffer: &wgpu::Buffer,
        color_map: &Texture,
        reflectance_map: &Texture,
        label: &str,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&color_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&reflectance_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&color_map.sampler),
                },
            ],
            label: Some(label),
        })
    }

    /// Point the material at the current map textures.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        color_map: &Texture,
        reflectance_map: &Texture,
    ) {
        self.bind_group = Self::create_bind_group(
            device,
            layout,
            &self.uniform_buffer,
            color_map,
            reflectance_map,
            self.label,
        );
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

impl Release for Material {
    fn release(&mut self) {
        self.uniform_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earth_uniform_samples_both_maps() {
        let uniform = MaterialUniform::from(&MaterialParams::earth());
        assert_eq!(uniform.params, [0.7, 0.0, 1.0, 1.0]);
        assert_eq!(uniform.color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn moon_uniform_ignores_maps() {
        let uniform = MaterialUniform::from(&MaterialParams::moon());
        assert_eq!(uniform.params[2], 0.0);
        assert_eq!(uniform.params[3], 0.0);
        assert!(uniform.emissive[0] > 0.0);
    }

    #[test]
    fn out_of_range_parameters_are_clamped() {
        let params = MaterialParams {
            roughness: 3.0,
            metalness: -1.0,
            ..MaterialParams::earth()
        };
        let uniform = MaterialUniform::from(&params);
        assert_eq!(uniform.params[0], 1.0);
        assert_eq!(uniform.params[1], 0.0);
    }
}

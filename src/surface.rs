use glam::Vec2;

use crate::{
    renderer::{Geometry, QuadVertex},
    resource::Release,
    texture::Texture,
};

/// Rectangular region of the window a view is mounted on, in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mount {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Mount {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.x as f32
            && point.y >= self.y as f32
            && point.x < (self.x + self.width) as f32
            && point.y < (self.y + self.height) as f32
    }

    /// Convert a window position into this region's local coordinates.
    pub fn to_local(&self, point: Vec2) -> Vec2 {
        point - Vec2::new(self.x as f32, self.y as f32)
    }

    /// Part of the region that lies inside a `width` x `height` target.
    pub fn clip(&self, width: u32, height: u32) -> Option<Mount> {
        let right = (self.x + self.width).min(width);
        let bottom = (self.y + self.height).min(height);
        if self.x >= right || self.y >= bottom {
            return None;
        }
        Some(Mount::new(self.x, self.y, right - self.x, bottom - self.y))
    }
}

pub struct Layout;

impl Layout {
    /// Split the window into a left and a right region. A window too small to
    /// hold two non-empty regions has no mounts.
    pub fn side_by_side(width: u32, height: u32) -> Option<[Mount; 2]> {
        if width < 2 || height == 0 {
            return None;
        }
        let left = width / 2;
        Some([
            Mount::new(0, 0, left, height),
            Mount::new(left, 0, width - left, height),
        ])
    }
}

/// Offscreen color and depth targets a scene is drawn into, sized to the
/// region it is mounted on.
pub struct RenderSurface {
    mount: Mount,
    format: wgpu::TextureFormat,
    color: Texture,
    depth: Texture,
    present_bind_group: wgpu::BindGroup,
    label: &'static str,
}

impl RenderSurface {
    pub fn new(
        device: &wgpu::Device,
        mount: Mount,
        format: wgpu::TextureFormat,
        compositor: &Compositor,
        label: &'static str,
    ) -> Self {
        let color = Texture::render_target(device, mount.width, mount.height, format, Some(label));
        let depth = Texture::depth(device, mount.width, mount.height, Some(label));
        let present_bind_group = compositor.bind_surface(device, &color, label);

        Self {
            mount,
            format,
            color,
            depth,
            present_bind_group,
            label,
        }
    }

    /// Re-attach to `mount`, recreating the targets if its size changed.
    pub fn resize(&mut self, device: &wgpu::Device, mount: Mount, compositor: &Compositor) {
        if mount.is_empty() {
            return;
        }
        let resized = (mount.width, mount.height) != self.draw_size();
        self.mount = mount;
        if !resized {
            return;
        }

        let mut replaced = Self::new(device, mount, self.format, compositor, self.label);
        std::mem::swap(self, &mut replaced);
        replaced.release();
        tracing::debug!(
            label = self.label,
            width = mount.width,
            height = mount.height,
            "render surface resized"
        );
    }

    pub fn mount(&self) -> Mount {
        self.mount
    }

    pub fn draw_size(&self) -> (u32, u32) {
        self.color.size()
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.color.view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth.view
    }
}

impl Release for RenderSurface {
    fn release(&mut self) {
        self.color.release();
        self.depth.release();
    }
}

/// Copies every render surface into its region of the window.
pub struct Compositor {
    bind_group_layout: wgpu::BindGroupLayout,
    render_pipeline: wgpu::RenderPipeline,
    quad: Geometry,
}

impl Compositor {
    pub fn new(device: &wgpu::Device, target_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("asset/shader/present.wgsl"));

        let quad = Geometry::quad(device);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
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
            label: Some("surface_bind_group_layout"),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Compositor Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Compositor Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[QuadVertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        Self {
            bind_group_layout,
            render_pipeline,
            quad,
        }
    }

    fn bind_surface(&self, device: &wgpu::Device, color: &Texture, label: &str) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&color.sampler),
                },
            ],
            label: Some(label),
        })
    }

    /// Draw each surface as a quad covering its region of `target`.
    pub fn composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        target_size: (u32, u32),
        surfaces: &[&RenderSurface],
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Compositor Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: true,
                },
            })],
            depth_stencil_attachment: None,
        });

        render_pass.set_pipeline(&self.render_pipeline);

        let (target_width, target_height) = target_size;
        for surface in surfaces {
            let Some(region) = surface.mount().clip(target_width, target_height) else {
                continue;
            };
            render_pass.set_viewport(
                region.x as f32,
                region.y as f32,
                region.width as f32,
                region.height as f32,
                0.0,
                1.0,
            );
            render_pass.set_bind_group(0, &surface.present_bind_group, &[]);
            self.quad.draw(&mut render_pass);
        }
    }
}

impl Release for Compositor {
    fn release(&mut self) {
        self.quad.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_by_side_splits_width() {
        let [left, right] = Layout::side_by_side(1600, 800).unwrap();
        assert_eq!(left, Mount::new(0, 0, 800, 800));
        assert_eq!(right, Mount::new(800, 0, 800, 800));
    }

    #[test]
    fn odd_width_goes_to_the_right_region() {
        let [left, right] = Layout::side_by_side(801, 600).unwrap();
        assert_eq!(left.width + right.width, 801);
        assert_eq!(right.x, left.width);
        assert_eq!(right.width, 401);
    }

    #[test]
    fn tiny_windows_have_no_mounts() {
        assert!(Layout::side_by_side(0, 600).is_none());
        assert!(Layout::side_by_side(1, 600).is_none());
        assert!(Layout::side_by_side(800, 0).is_none());
        assert!(Layout::side_by_side(2, 1).is_some());
    }

    #[test]
    fn mount_hit_testing() {
        let [left, right] = Layout::side_by_side(1000, 500).unwrap();
        let point = Vec2::new(700.0, 120.0);
        assert!(!left.contains(point));
        assert!(right.contains(point));
        assert_eq!(right.to_local(point), Vec2::new(200.0, 120.0));
        // the shared edge belongs to the right region only
        assert!(!left.contains(Vec2::new(500.0, 0.0)));
        assert!(right.contains(Vec2::new(500.0, 0.0)));
    }

    #[test]
    fn clip_to_target() {
        let mount = Mount::new(800, 0, 800, 800);
        assert_eq!(mount.clip(1600, 800), Some(mount));
        assert_eq!(mount.clip(1000, 600), Some(Mount::new(800, 0, 200, 600)));
        assert_eq!(mount.clip(700, 600), None);
    }
}

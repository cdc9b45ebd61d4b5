use std::time::Instant;

use glam::{Vec2, Vec3};
use wgpu::util::DeviceExt;
use winit::{
    dpi::PhysicalSize,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent},
};

use crate::{
    application::{AppState, Layer, Screen},
    camera::{Camera, OrbitControls, PointerInput},
    loader::{LoadedImage, MapSlot, TextureLoader, TextureSource},
    material::{Material, MaterialParams},
    renderer::{Geometry, MeshData, ModelUniform, SceneUniform, Vertex},
    resource::{Release, ResourceKind, ResourceLedger, Tracked},
    scene::{Scene, SceneKind, SceneObject},
    surface::{Compositor, Layout, Mount, RenderSurface},
    texture::{Texture, TextureMap},
};

pub const DEFAULT_COLOR_MAP: &str =
    "https://threejs.org/examples/textures/planets/earth_atmos_2048.jpg";
pub const DEFAULT_REFLECTANCE_MAP: &str =
    "https://threejs.org/examples/textures/planets/earth_specular_2048.jpg";

const FOV_Y_DEGREES: f32 = 75.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 1000.0;
const CAMERA_START: Vec3 = Vec3::new(0.0, 0.0, 6.0);
const MIN_DISTANCE: f32 = 3.0;
const MAX_DISTANCE: f32 = 10.0;
const SPHERE_SEGMENTS: u32 = 64;

const COLOR_PLACEHOLDER: [u8; 4] = [48, 84, 150, 255];
const REFLECTANCE_PLACEHOLDER: [u8; 4] = [0, 0, 0, 255];

#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub color_map: TextureSource,
    pub reflectance_map: TextureSource,
    pub damping: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            color_map: TextureSource::Url(DEFAULT_COLOR_MAP.to_owned()),
            reflectance_map: TextureSource::Url(DEFAULT_REFLECTANCE_MAP.to_owned()),
            damping: 0.05,
        }
    }
}

/// Teardown failures. Only resources tracked by the view's ledger are counted.
#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("{outstanding} resource(s) still live after teardown")]
    Leaked { outstanding: u32 },
}

struct Pipelines {
    scene_layout: wgpu::BindGroupLayout,
    material_layout: wgpu::BindGroupLayout,
    object_layout: wgpu::BindGroupLayout,
    render_pipeline: wgpu::RenderPipeline,
}

impl Pipelines {
    fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::include_wgsl!("asset/shader/earth.wgsl"));

        let uniform_entry = |visibility| wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(
                wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            )],
            label: Some("scene_bind_group_layout"),
        });
        let material_layout = Material::bind_group_layout(device);
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(wgpu::ShaderStages::VERTEX)],
            label: Some("object_bind_group_layout"),
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Earth Pipeline Layout"),
            bind_group_layouts: &[&scene_layout, &material_layout, &object_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Earth Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
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
            depth_stencil: Some(wgpu::DepthStencilState {
                format: Texture::DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        Self {
            scene_layout,
            material_layout,
            object_layout,
            render_pipeline,
        }
    }
}

/// Geometry and maps uploaded once and used by both scenes.
struct SharedAssets {
    geometry: Tracked<Geometry>,
    color_map: Tracked<TextureMap>,
    reflectance_map: Tracked<TextureMap>,
}

impl SharedAssets {
    fn new(device: &wgpu::Device, queue: &wgpu::Queue, ledger: &ResourceLedger) -> Self {
        let mesh = MeshData::sphere(1.0, SPHERE_SEGMENTS, SPHERE_SEGMENTS);
        let geometry = Geometry::upload(device, &mesh, "sphere");

        let color_map = TextureMap::placeholder(
            device,
            queue,
            COLOR_PLACEHOLDER,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            "color map",
        );
        let reflectance_map = TextureMap::placeholder(
            device,
            queue,
            REFLECTANCE_PLACEHOLDER,
            wgpu::TextureFormat::Rgba8Unorm,
            "reflectance map",
        );

        Self {
            geometry: ledger.track(ResourceKind::Geometry, "sphere", geometry),
            color_map: ledger.track(ResourceKind::Texture, "color map", color_map),
            reflectance_map: ledger.track(
                ResourceKind::Texture,
                "reflectance map",
                reflectance_map,
            ),
        }
    }

    fn map_mut(&mut self, slot: MapSlot) -> &mut TextureMap {
        match slot {
            MapSlot::Color => &mut *self.color_map,
            MapSlot::Reflectance => &mut *self.reflectance_map,
        }
    }
}

/// Uniform buffer and the bind group exposing it at binding 0.
struct UniformBinding {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl UniformBinding {
    fn new<T: bytemuck::Pod>(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        value: &T,
        label: &str,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some(label),
        });
        Self { buffer, bind_group }
    }

    fn write<T: bytemuck::Pod>(&self, queue: &wgpu::Queue, value: &T) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(value));
    }
}

impl Release for UniformBinding {
    fn release(&mut self) {
        self.buffer.destroy();
    }
}

struct SetupContext<'a> {
    device: &'a wgpu::Device,
    ledger: &'a ResourceLedger,
    pipelines: &'a Pipelines,
    compositor: &'a Compositor,
    shared: &'a SharedAssets,
    format: wgpu::TextureFormat,
    damping: f32,
}

/// One scene with its own camera, controls and render surface.
struct SceneView {
    scene: Scene,
    camera: Camera,
    controls: Tracked<OrbitControls>,
    surface: Tracked<RenderSurface>,
    earth_material: Tracked<Material>,
    moon_material: Option<Tracked<Material>>,
    scene_uniform: Tracked<UniformBinding>,
    earth_uniform: Tracked<UniformBinding>,
    moon_uniform: Option<Tracked<UniformBinding>>,
}

impl SceneView {
    fn new(ctx: &SetupContext<'_>, kind: SceneKind, mount: Mount) -> Self {
        let name = kind.name();
        let device = ctx.device;
        let scene = Scene::new(kind);

        let camera = Camera::perspective(
            FOV_Y_DEGREES.to_radians(),
            mount.width as f32 / mount.height as f32,
            Z_NEAR,
            Z_FAR,
        )
        .looking_at(CAMERA_START, Vec3::ZERO);
        let controls = OrbitControls::new(&camera)
            .with_distance_limits(MIN_DISTANCE, MAX_DISTANCE)
            .with_damping(ctx.damping);

        let surface = RenderSurface::new(device, mount, ctx.format, ctx.compositor, name);

        let material = |params: MaterialParams, label: &'static str| {
            let material = Material::new(
                device,
                &ctx.pipelines.material_layout,
                params,
                ctx.shared.color_map.texture(),
                ctx.shared.reflectance_map.texture(),
                label,
            );
            ctx.ledger.track(ResourceKind::Material, label, material)
        };
        let earth_material = material(MaterialParams::earth(), "earth material");
        let moon_material = scene
            .moon
            .map(|_| material(MaterialParams::moon(), "moon material"));

        let scene_uniform = UniformBinding::new(
            device,
            &ctx.pipelines.scene_layout,
            &SceneUniform::new(&camera, &scene),
            name,
        );
        let object_uniform = |object: &SceneObject, label: &'static str| {
            let uniform = UniformBinding::new(
                device,
                &ctx.pipelines.object_layout,
                &ModelUniform::new(object.model_matrix()),
                label,
            );
            ctx.ledger.track(ResourceKind::Uniform, label, uniform)
        };
        let earth_uniform = object_uniform(&scene.earth, "earth transform");
        let moon_uniform = scene
            .moon
            .as_ref()
            .map(|moon| object_uniform(moon, "moon transform"));

        Self {
            controls: ctx.ledger.track(ResourceKind::Controls, name, controls),
            surface: ctx.ledger.track(ResourceKind::RenderSurface, name, surface),
            scene_uniform: ctx.ledger.track(ResourceKind::Uniform, name, scene_uniform),
            scene,
            camera,
            earth_material,
            moon_material,
            earth_uniform,
            moon_uniform,
        }
    }

    fn pointer(&mut self, input: PointerInput) {
        let height = self.surface.mount().height as f32;
        self.controls.handle(input, height);
    }

    fn resize(&mut self, device: &wgpu::Device, mount: Mount, compositor: &Compositor) {
        self.surface.resize(device, mount, compositor);
        self.camera.set_viewport(mount.width, mount.height);
    }

    fn rebind_materials(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        shared: &SharedAssets,
    ) {
        let color = shared.color_map.texture();
        let reflectance = shared.reflectance_map.texture();
        self.earth_material.rebind(device, layout, color, reflectance);
        if let Some(moon_material) = self.moon_material.as_mut() {
            moon_material.rebind(device, layout, color, reflectance);
        }
    }

    fn update(&mut self, queue: &wgpu::Queue, elapsed: f32) {
        self.scene.animate(elapsed);
        self.controls.update(&mut self.camera);

        self.scene_uniform
            .write(queue, &SceneUniform::new(&self.camera, &self.scene));
        self.earth_uniform
            .write(queue, &ModelUniform::new(self.scene.earth.model_matrix()));
        if let (Some(uniform), Some(moon)) = (&self.moon_uniform, &self.scene.moon) {
            uniform.write(queue, &ModelUniform::new(moon.model_matrix()));
        }
    }

    fn draw(&self, encoder: &mut wgpu::CommandEncoder, pipelines: &Pipelines, geometry: &Geometry) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.scene.kind.name()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: self.surface.color_view(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: true,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: self.surface.depth_view(),
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: true,
                }),
                stencil_ops: None,
            }),
        });

        render_pass.set_pipeline(&pipelines.render_pipeline);
        render_pass.set_bind_group(0, &self.scene_uniform.bind_group, &[]);

        render_pass.set_bind_group(1, self.earth_material.bind_group(), &[]);
        render_pass.set_bind_group(2, &self.earth_uniform.bind_group, &[]);
        geometry.draw(&mut render_pass);

        if let (Some(material), Some(uniform)) = (&self.moon_material, &self.moon_uniform) {
            render_pass.set_bind_group(1, material.bind_group(), &[]);
            render_pass.set_bind_group(2, &uniform.bind_group, &[]);
            geometry.draw(&mut render_pass);
        }
    }
}

/// Sunlit and moonlit Earth side by side, each with its own orbit camera.
pub struct EarthView {
    ledger: ResourceLedger,
    started: Instant,
    loader: Option<TextureLoader>,
    pipelines: Pipelines,
    compositor: Tracked<Compositor>,
    shared: SharedAssets,
    views: [SceneView; 2],
    cursor: Vec2,
    /// View that received the button press of the current drag.
    captured: Option<usize>,
}

impl EarthView {
    /// Build both scenes on the left and right halves of a `size` target.
    /// Returns `None` without acquiring anything when there is no room for two
    /// regions.
    pub fn new(
        config: &ViewConfig,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        ledger: ResourceLedger,
        started: Instant,
    ) -> Option<Self> {
        let Some([left, right]) = Layout::side_by_side(size.width, size.height) else {
            tracing::debug!(width = size.width, height = size.height, "no room to mount views");
            return None;
        };

        let pipelines = Pipelines::new(device, format);
        let compositor = ledger.track(
            ResourceKind::Geometry,
            "compositor quad",
            Compositor::new(device, format),
        );
        let shared = SharedAssets::new(device, queue, &ledger);

        let ctx = SetupContext {
            device,
            ledger: &ledger,
            pipelines: &pipelines,
            compositor: &compositor,
            shared: &shared,
            format,
            damping: config.damping,
        };
        let views = [
            SceneView::new(&ctx, SceneKind::Sunlight, left),
            SceneView::new(&ctx, SceneKind::Moonlight, right),
        ];

        let loader = TextureLoader::spawn([
            (MapSlot::Color, config.color_map.clone()),
            (MapSlot::Reflectance, config.reflectance_map.clone()),
        ]);

        tracing::info!(
            live = ledger.live(),
            color_map = %config.color_map,
            reflectance_map = %config.reflectance_map,
            "earth view mounted"
        );

        Some(Self {
            ledger,
            started,
            loader: Some(loader),
            pipelines,
            compositor,
            shared,
            views,
            cursor: Vec2::ZERO,
            captured: None,
        })
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Window regions the two scenes are attached to, left then right.
    pub fn regions(&self) -> [Mount; 2] {
        [self.views[0].surface.mount(), self.views[1].surface.mount()]
    }

    /// Size of each scene's color target.
    pub fn draw_sizes(&self) -> [(u32, u32); 2] {
        [self.views[0].surface.draw_size(), self.views[1].surface.draw_size()]
    }

    pub fn aspects(&self) -> [f32; 2] {
        [self.views[0].camera.aspect, self.views[1].camera.aspect]
    }

    /// True while a map download has not reported back.
    pub fn textures_pending(&self) -> bool {
        self.loader.is_some()
    }

    pub fn map_size(&self, slot: MapSlot) -> (u32, u32) {
        match slot {
            MapSlot::Color => self.shared.color_map.texture().size(),
            MapSlot::Reflectance => self.shared.reflectance_map.texture().size(),
        }
    }

    /// Re-split a `size` target between the scenes. Sizes with no room for two
    /// regions are ignored.
    pub fn resize_regions(&mut self, device: &wgpu::Device, size: PhysicalSize<u32>) {
        let Some(mounts) = Layout::side_by_side(size.width, size.height) else {
            return;
        };
        for (view, mount) in self.views.iter_mut().zip(mounts) {
            view.resize(device, mount, &self.compositor);
        }
    }

    /// Pick up finished map downloads and animate both scenes to `now`.
    pub fn advance(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, now: Instant) {
        self.poll_textures(device, queue);

        let elapsed = now.duration_since(self.started).as_secs_f32();
        for view in &mut self.views {
            view.update(queue, elapsed);
        }
    }

    /// Release everything the view acquired: controls, render surfaces,
    /// geometry, materials, uniforms, then textures. Outstanding downloads are
    /// abandoned first. Calling it again does nothing.
    pub fn release_all(&mut self) -> Result<(), ViewError> {
        if let Some(loader) = self.loader.take() {
            tracing::debug!(pending = loader.pending(), "abandoning texture downloads");
        }
        self.captured = None;

        for view in &mut self.views {
            view.controls.release();
        }
        for view in &mut self.views {
            view.surface.release();
        }
        self.shared.geometry.release();
        self.compositor.release();
        for view in &mut self.views {
            view.earth_material.release();
            if let Some(moon_material) = view.moon_material.as_mut() {
                moon_material.release();
            }
        }
        for view in &mut self.views {
            view.scene_uniform.release();
            view.earth_uniform.release();
            if let Some(moon_uniform) = view.moon_uniform.as_mut() {
                moon_uniform.release();
            }
        }
        self.shared.color_map.release();
        self.shared.reflectance_map.release();

        let outstanding = self.ledger.live();
        if outstanding > 0 {
            return Err(ViewError::Leaked { outstanding });
        }
        tracing::info!("earth view torn down");
        Ok(())
    }

    fn view_at(&self, point: Vec2) -> Option<usize> {
        self.views
            .iter()
            .position(|view| view.surface.mount().contains(point))
    }

    fn pointer_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Vec2::new(position.x as f32, position.y as f32);
                if let Some(index) = self.captured {
                    let view = &mut self.views[index];
                    let local = view.surface.mount().to_local(self.cursor);
                    view.pointer(PointerInput::Move(local));
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(index) = self.view_at(self.cursor) {
                    let view = &mut self.views[index];
                    let local = view.surface.mount().to_local(self.cursor);
                    view.pointer(PointerInput::Down(local));
                    self.captured = Some(index);
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Released,
                button: MouseButton::Left,
                ..
            } => {
                if let Some(index) = self.captured.take() {
                    self.views[index].pointer(PointerInput::Up);
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                };
                if let Some(index) = self.view_at(self.cursor) {
                    self.views[index].pointer(PointerInput::Wheel(amount));
                }
            }
            _ => {}
        }
    }

    fn poll_textures(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let Some(loader) = self.loader.as_mut() else {
            return;
        };
        let loaded = loader.poll();
        if loader.is_idle() {
            self.loader = None;
            tracing::debug!("texture downloads settled");
        }
        if loaded.is_empty() {
            return;
        }

        for LoadedImage { slot, image } in loaded {
            self.shared.map_mut(slot).upload(device, queue, &image);
        }
        for view in &mut self.views {
            view.rebind_materials(device, &self.pipelines.material_layout, &self.shared);
        }
    }
}

impl Layer for EarthView {
    type Config = ViewConfig;
    type LayerErr = ViewError;

    fn start(config: &ViewConfig, screen: &mut Screen, app: &AppState) -> Option<Self> {
        Self::new(
            config,
            &screen.device,
            &screen.queue,
            screen.config.format,
            screen.size(),
            ResourceLedger::new(),
            app.now(),
        )
    }

    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen) {
        if let Event::WindowEvent { window_id, event } = event {
            if *window_id == screen.window().id() {
                self.pointer_event(event);
            }
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>, _app: &AppState, screen: &mut Screen) {
        self.resize_regions(&screen.device, new_size);
    }

    fn update(&mut self, app: &AppState, screen: &mut Screen) {
        self.advance(&screen.device, &screen.queue, app.now());
    }

    fn render(&mut self, _app: &AppState, screen: &mut Screen) -> Result<(), wgpu::SurfaceError> {
        let output = screen.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = screen
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        for scene_view in &self.views {
            scene_view.draw(&mut encoder, &self.pipelines, &self.shared.geometry);
        }

        let surfaces: Vec<&RenderSurface> = self.views.iter().map(|v| &*v.surface).collect();
        self.compositor.composite(
            &mut encoder,
            &view,
            (screen.config.width, screen.config.height),
            &surfaces,
        );

        screen.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }

    fn shutdown(&mut self, _app: &AppState, _screen: &mut Screen) -> Result<(), ViewError> {
        self.release_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_remote_maps() {
        let config = ViewConfig::default();
        let url = |source: &TextureSource| match source {
            TextureSource::Url(url) => url.clone(),
            TextureSource::Path(path) => panic!("expected a url, got {}", path.display()),
        };
        assert!(url(&config.color_map).ends_with("earth_atmos_2048.jpg"));
        assert!(url(&config.reflectance_map).ends_with("earth_specular_2048.jpg"));
        assert_eq!(config.damping, 0.05);
    }

    #[test]
    fn camera_starts_inside_distance_limits() {
        let distance = CAMERA_START.length();
        assert!((MIN_DISTANCE..=MAX_DISTANCE).contains(&distance));
    }

    #[test]
    fn leak_error_reports_count() {
        let err = ViewError::Leaked { outstanding: 3 };
        assert_eq!(err.to_string(), "3 resource(s) still live after teardown");
    }
}

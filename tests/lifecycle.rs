//! Mount, resize, teardown and remount of the two orbit views on a headless
//! device. Tests return early when the machine has no usable adapter.

use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use earthlight::{
    camera::{Camera, OrbitControls, PointerInput},
    loader::{MapSlot, TextureSource},
    resource::{ResourceKind, ResourceLedger},
    surface::Mount,
    view::{EarthView, ViewConfig},
};
use glam::{Vec2, Vec3};
use winit::dpi::PhysicalSize;

const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Every resource one mounted view holds: two controls, two surfaces, the
/// sphere and the compositor quad, three materials, five uniforms and two maps.
const MOUNTED_RESOURCES: u32 = 16;

fn create_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await?;
        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("lifecycle test device"),
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .ok()
    })
}

fn scratch_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("earthlight-lifecycle-{}-{name}", std::process::id()))
}

/// Maps that fail fast without touching the network.
fn offline_config() -> ViewConfig {
    ViewConfig {
        color_map: TextureSource::Path(scratch_path("missing-color.png")),
        reflectance_map: TextureSource::Path(scratch_path("missing-reflectance.png")),
        ..ViewConfig::default()
    }
}

fn mount(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    config: &ViewConfig,
    ledger: &ResourceLedger,
    width: u32,
    height: u32,
) -> Option<EarthView> {
    EarthView::new(
        config,
        device,
        queue,
        FORMAT,
        PhysicalSize::new(width, height),
        ledger.clone(),
        Instant::now(),
    )
}

fn settle(view: &mut EarthView, device: &wgpu::Device, queue: &wgpu::Queue) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while view.textures_pending() && Instant::now() < deadline {
        view.advance(device, queue, Instant::now());
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn mount_binds_one_surface_per_region() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let view = mount(&device, &queue, &offline_config(), &ledger, 1280, 720).unwrap();

    assert_eq!(
        view.regions(),
        [Mount::new(0, 0, 640, 720), Mount::new(640, 0, 640, 720)]
    );
    assert_eq!(view.draw_sizes(), [(640, 720), (640, 720)]);
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).live(), 2);
    assert_eq!(ledger.counts(ResourceKind::Controls).live(), 2);
    assert_eq!(ledger.live(), MOUNTED_RESOURCES);
}

#[test]
fn missing_regions_skip_setup() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let config = offline_config();

    assert!(mount(&device, &queue, &config, &ledger, 1, 720).is_none());
    assert!(mount(&device, &queue, &config, &ledger, 1280, 0).is_none());
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).acquired, 0);
    assert!(ledger.release_log().is_empty());
}

#[test]
fn resize_draws_each_scene_at_its_region_size() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let mut view = mount(&device, &queue, &offline_config(), &ledger, 1600, 800).unwrap();

    view.resize_regions(&device, PhysicalSize::new(900, 300));
    assert_eq!(view.draw_sizes(), [(450, 300), (450, 300)]);
    assert_eq!(view.aspects(), [1.5, 1.5]);

    view.resize_regions(&device, PhysicalSize::new(901, 200));
    assert_eq!(
        view.regions(),
        [Mount::new(0, 0, 450, 200), Mount::new(450, 0, 451, 200)]
    );
    assert_eq!(view.draw_sizes(), [(450, 200), (451, 200)]);
    assert_eq!(view.aspects(), [450.0 / 200.0, 451.0 / 200.0]);

    // too small for two regions: the previous layout stays
    view.resize_regions(&device, PhysicalSize::new(1, 1));
    assert_eq!(view.draw_sizes(), [(450, 200), (451, 200)]);

    // surfaces recreated on resize are not new acquisitions
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).acquired, 2);
}

#[test]
fn teardown_releases_every_resource_in_order() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let mut view = mount(&device, &queue, &offline_config(), &ledger, 1600, 800).unwrap();
    view.advance(&device, &queue, Instant::now());

    view.release_all().unwrap();

    assert!(ledger.is_balanced());
    assert!(!view.textures_pending());
    let log = ledger.release_log();
    assert_eq!(log.len(), MOUNTED_RESOURCES as usize);
    assert!(
        log.windows(2).all(|pair| pair[0].0 <= pair[1].0),
        "out of order: {log:?}"
    );
    assert_eq!(log.first().map(|(kind, _)| *kind), Some(ResourceKind::Controls));
    assert_eq!(log.last().map(|(kind, _)| *kind), Some(ResourceKind::Texture));
}

#[test]
fn second_teardown_and_drop_release_nothing() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let mut view = mount(&device, &queue, &offline_config(), &ledger, 1600, 800).unwrap();

    view.release_all().unwrap();
    view.release_all().unwrap();
    drop(view);

    assert_eq!(ledger.release_log().len(), MOUNTED_RESOURCES as usize);
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).released, 2);
    assert!(ledger.is_balanced());
}

#[test]
fn dropping_a_mounted_view_still_balances_the_ledger() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let view = mount(&device, &queue, &offline_config(), &ledger, 1600, 800).unwrap();
    drop(view);

    assert!(ledger.is_balanced());
    assert_eq!(ledger.release_log().len(), MOUNTED_RESOURCES as usize);
}

#[test]
fn remount_leaves_a_single_live_set() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let ledger = ResourceLedger::new();
    let config = offline_config();

    let mut first = mount(&device, &queue, &config, &ledger, 1600, 800).unwrap();
    let live_after_mount = ledger.live();
    first.release_all().unwrap();
    drop(first);

    let second = mount(&device, &queue, &config, &ledger, 1600, 800).unwrap();
    assert_eq!(ledger.live(), live_after_mount);
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).acquired, 4);
    assert_eq!(ledger.counts(ResourceKind::RenderSurface).live(), 2);
    assert_eq!(second.draw_sizes(), [(800, 800), (800, 800)]);
}

#[test]
fn local_map_replaces_its_placeholder() {
    let Some((device, queue)) = create_test_device() else {
        eprintln!("no GPU adapter, skipping");
        return;
    };
    let path = scratch_path("color.png");
    image::RgbaImage::from_pixel(8, 4, image::Rgba([30, 90, 160, 255]))
        .save(&path)
        .unwrap();
    let config = ViewConfig {
        color_map: TextureSource::Path(path.clone()),
        ..offline_config()
    };

    let ledger = ResourceLedger::new();
    let mut view = mount(&device, &queue, &config, &ledger, 1600, 800).unwrap();
    assert_eq!(view.map_size(MapSlot::Color), (1, 1));

    settle(&mut view, &device, &queue);
    std::fs::remove_file(&path).ok();

    assert!(!view.textures_pending());
    assert_eq!(view.map_size(MapSlot::Color), (8, 4));
    // the missing reflectance map keeps its placeholder
    assert_eq!(view.map_size(MapSlot::Reflectance), (1, 1));
    assert_eq!(ledger.live(), MOUNTED_RESOURCES);
}

#[test]
fn zoom_stays_in_range() {
    let mut camera = Camera::perspective(75f32.to_radians(), 1.0, 0.1, 1000.0)
        .looking_at(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
    let mut controls = OrbitControls::new(&camera).with_distance_limits(3.0, 10.0);

    for step in 0..200 {
        let lines = if step % 3 == 0 { -1.0 } else { 1.0 };
        controls.handle(PointerInput::Wheel(lines), 800.0);
        controls.update(&mut camera);
        let distance = camera.distance_to_target();
        assert!((3.0 - 1e-4..=10.0 + 1e-4).contains(&distance));
    }
}

#[test]
fn released_controls_stop_orbiting() {
    let ledger = ResourceLedger::new();
    let mut camera = Camera::perspective(75f32.to_radians(), 1.0, 0.1, 1000.0)
        .looking_at(Vec3::new(0.0, 0.0, 6.0), Vec3::ZERO);
    let mut controls = ledger.track(
        ResourceKind::Controls,
        "controls",
        OrbitControls::new(&camera).with_distance_limits(3.0, 10.0),
    );
    controls.release();

    controls.update(&mut camera);
    let eye = camera.eye;
    controls.handle(PointerInput::Down(Vec2::ZERO), 800.0);
    controls.handle(PointerInput::Move(Vec2::new(200.0, 50.0)), 800.0);
    assert!(!controls.update(&mut camera));
    assert_eq!(camera.eye, eye);
}

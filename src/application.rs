use std::time::Instant;

use anyhow::Context;
use wgpu::SurfaceError;
use winit::{
    dpi::PhysicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop, EventLoopWindowTarget},
    window::{Window, WindowBuilder},
};

#[derive(Debug)]
pub struct AppState {
    previous_time: Instant,
    current_time: Instant,
    delta_time: f32,
}

impl AppState {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            previous_time: now,
            current_time: now,
            delta_time: 0.0,
        }
    }

    pub fn update(&mut self) {
        self.advance_to(Instant::now());
    }

    /// Move the clock to `now`; earlier instants count as no time passing.
    pub fn advance_to(&mut self, now: Instant) {
        let now = now.max(self.current_time);
        self.delta_time = now.duration_since(self.previous_time).as_secs_f32();
        self.previous_time = now;
        self.current_time = now;
    }

    pub fn now(&self) -> Instant {
        self.current_time
    }

    /// Seconds between the two latest updates.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-frame redraw requests of a mounted layer.
///
/// The loop only ever goes from running to cancelled. Remounting creates a new
/// loop; a cancelled one never schedules another frame.
#[derive(Debug)]
pub struct FrameLoop {
    cancelled: bool,
    frames: u64,
}

impl FrameLoop {
    pub fn start() -> Self {
        Self {
            cancelled: false,
            frames: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancelled
    }

    /// Ask the window for the next display tick. Does nothing once cancelled.
    pub fn request_next(&self, window: &Window) {
        if !self.cancelled {
            window.request_redraw();
        }
    }

    /// Enter a frame, returning its sequence number, or `None` once cancelled.
    pub fn begin_frame(&mut self) -> Option<u64> {
        if self.cancelled {
            return None;
        }
        self.frames += 1;
        Some(self.frames)
    }

    /// Stop scheduling frames. Returns `false` if the loop was already cancelled.
    pub fn cancel(&mut self) -> bool {
        let was_running = !self.cancelled;
        self.cancelled = true;
        was_running
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

pub struct Application<L: Layer + 'static> {
    config: L::Config,
    layer: Option<L>,
    frame_loop: Option<FrameLoop>,
    screen: Screen,
    state: AppState,
}

impl<L: Layer + 'static> Application<L> {
    pub fn new(screen: Screen, config: L::Config) -> Self {
        Self {
            config,
            screen,
            layer: None,
            frame_loop: None,
            state: AppState::new(),
        }
    }

    /// Set the layer up, unless it is already mounted.
    fn mount(&mut self) {
        if self.layer.is_some() {
            return;
        }

        match L::start(&self.config, &mut self.screen, &self.state) {
            Some(layer) => {
                self.layer = Some(layer);
                self.frame_loop = Some(FrameLoop::start());
                self.screen.window().request_redraw();
                tracing::info!("layer mounted");
            }
            None => tracing::debug!("layer declined to mount"),
        }
    }

    /// Stop the frame loop, then tear the layer down. Returns the exit code
    /// the teardown asks for.
    fn unmount(&mut self) -> i32 {
        if let Some(frame_loop) = self.frame_loop.as_mut() {
            frame_loop.cancel();
        }

        let Some(mut layer) = self.layer.take() else {
            return 0;
        };
        let exit_code = match layer.shutdown(&self.state, &mut self.screen) {
            Ok(()) => 0,
            Err(err) => {
                tracing::error!(%err, "teardown failed");
                1
            }
        };
        drop(layer);

        let frames = self.frame_loop.take().map_or(0, |frame_loop| frame_loop.frames());
        tracing::info!(frames, "layer unmounted");
        exit_code
    }

    fn run(
        &mut self,
        event: Event<()>,
        _event_loop: &EventLoopWindowTarget<()>,
        control_flow: &mut ControlFlow,
    ) {
        control_flow.set_wait();

        if let Some(layer) = self.layer.as_mut() {
            layer.process_event(&event, &mut self.screen);
        }

        match event {
            Event::Resumed => self.mount(),
            Event::Suspended => {
                let exit_code = self.unmount();
                if exit_code != 0 {
                    control_flow.set_exit_with_code(exit_code);
                }
            }
            Event::WindowEvent {
                window_id,
                ref event,
            } if self.screen.window().id() == window_id => match event {
                WindowEvent::CloseRequested => {
                    let exit_code = self.unmount();
                    control_flow.set_exit_with_code(exit_code);
                }
                WindowEvent::Resized(physical_size) => self.resize(*physical_size),
                WindowEvent::ScaleFactorChanged { new_inner_size, .. } => {
                    self.resize(**new_inner_size)
                }
                _ => {}
            },
            Event::MainEventsCleared => {
                self.state.update();
                if let Some(frame_loop) = self.frame_loop.as_ref() {
                    frame_loop.request_next(self.screen.window());
                }
            }
            Event::RedrawRequested(window_id) if self.screen.window().id() == window_id => {
                let layer = self.layer.as_mut();
                let frame_loop = self.frame_loop.as_mut();
                let (Some(layer), Some(frame_loop)) = (layer, frame_loop) else {
                    return;
                };
                if frame_loop.begin_frame().is_none() {
                    return;
                }

                layer.update(&self.state, &mut self.screen);
                match layer.render(&self.state, &mut self.screen) {
                    Ok(_) => {}
                    Err(SurfaceError::Lost) => self.screen.resize_to_current(),
                    Err(SurfaceError::OutOfMemory) => control_flow.set_exit_with_code(137),
                    Err(e) => tracing::error!("{:?}", e),
                }
            }
            Event::LoopDestroyed => {
                self.unmount();
            }
            _ => {}
        }
    }

    fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.screen.resize(new_size);
        if let Some(layer) = self.layer.as_mut() {
            layer.resize(new_size, &self.state, &mut self.screen);
        }
    }

    pub async fn init(config: L::Config, window: WindowBuilder) -> anyhow::Result<()> {
        let event_loop = EventLoop::new();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let screen = Screen::new(&event_loop, &instance, window).await?;
        let mut application = Self::new(screen, config);
        event_loop.run(move |event, event_loop, control_flow| {
            application.run(event, event_loop, control_flow);
        });
    }
}

pub struct Screen {
    pub surface: wgpu::Surface,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    window: Window,
}

impl Screen {
    pub async fn new(
        event_loop: &EventLoopWindowTarget<()>,
        instance: &wgpu::Instance,
        window: WindowBuilder,
    ) -> anyhow::Result<Self> {
        let window = window
            .build(event_loop)
            .context("failed to create window")?;

        // SAFETY:
        // The surface needs to live as long as the window that created it.
        // Screen owns the window and drops the surface first.
        let surface = unsafe { instance.create_surface(&window) }
            .context("failed to create surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no GPU adapter compatible with the window surface")?;
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default(),
                    label: None,
                },
                None,
            )
            .await
            .context("failed to open GPU device")?;
        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .context("surface is not supported by the adapter")?;
        surface.configure(&device, &config);

        tracing::info!(
            adapter = ?adapter.get_info().name,
            backend = ?adapter.get_info().backend,
            format = ?config.format,
            "screen ready"
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            window,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Current drawable size, which may be zero while minimized.
    pub fn size(&self) -> PhysicalSize<u32> {
        self.window.inner_size()
    }

    /// Resize the screen to new window size.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Resize the screen to current window inner size.
    pub fn resize_to_current(&mut self) {
        self.resize(self.window.inner_size());
    }
}

/// A component mounted on the application window.
///
/// `start` is the setup hook and `shutdown` the matching teardown; the
/// application stops the frame loop before calling `shutdown` and drops the
/// layer right after it.
pub trait Layer: Sized {
    type Config: 'static;
    type LayerErr: std::fmt::Display + 'static;

    /// Build the layer, or decline with `None` when the screen cannot host it.
    fn start(config: &Self::Config, screen: &mut Screen, app: &AppState) -> Option<Self>;
    fn process_event(&mut self, event: &Event<()>, screen: &mut Screen);
    fn resize(&mut self, new_size: PhysicalSize<u32>, app: &AppState, screen: &mut Screen);
    fn update(&mut self, app: &AppState, screen: &mut Screen);
    fn render(&mut self, app: &AppState, screen: &mut Screen) -> Result<(), SurfaceError>;
    fn shutdown(&mut self, app: &AppState, screen: &mut Screen) -> Result<(), Self::LayerErr>;
}

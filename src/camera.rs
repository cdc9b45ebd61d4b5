use std::f32::consts::{PI, TAU};

use glam::{Mat4, Vec2, Vec3};

use crate::resource::Release;

pub struct Camera {
    pub eye: glam::Vec3,
    pub target: glam::Vec3,
    pub up: glam::Vec3,
    pub aspect: f32,
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
}

impl Camera {
    pub fn perspective(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 1.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect,
            fov_y,
            z_near,
            z_far,
        }
    }

    pub fn looking_at(mut self, eye: Vec3, target: Vec3) -> Self {
        self.eye = eye;
        self.target = target;
        self
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, self.up);
        // glam's perspective already maps depth to wgpu's [0, 1] range
        let proj = Mat4::perspective_rh(self.fov_y, self.aspect, self.z_near, self.z_far);
        proj * view
    }

    /// Match the projection to a viewport of `width` x `height` pixels.
    /// Degenerate sizes leave the aspect untouched.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn distance_to_target(&self) -> f32 {
        self.eye.distance(self.target)
    }
}

/// Pointer input already mapped into a view's local pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    Down(Vec2),
    Move(Vec2),
    Up,
    /// Scroll amount in lines, positive away from the user (zoom in).
    Wheel(f32),
}

/// Radius, azimuth around +Y (from +Z) and polar angle from +Y.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Spherical {
    radius: f32,
    theta: f32,
    phi: f32,
}

impl Spherical {
    fn from_offset(offset: Vec3) -> Self {
        let radius = offset.length();
        if radius == 0.0 {
            return Self {
                radius,
                theta: 0.0,
                phi: 0.0,
            };
        }
        Self {
            radius,
            theta: offset.x.atan2(offset.z),
            phi: (offset.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    fn to_offset(self) -> Vec3 {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vec3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

/// Drag to orbit, scroll to zoom, with damped motion around a fixed target.
///
/// Input only accumulates deltas; [`OrbitControls::update`] must be called once
/// per frame to move the camera. Rotation keeps easing out after the pointer
/// is released, while zoom is applied on the next update and clamped to
/// `[min_distance, max_distance]`.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub enabled: bool,
    pub target: Vec3,
    pub min_distance: f32,
    pub max_distance: f32,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    spherical: Spherical,
    theta_delta: f32,
    phi_delta: f32,
    scale: f32,
    drag_from: Option<Vec2>,
}

impl OrbitControls {
    const MIN_POLAR: f32 = 1e-6;
    const EPS: f32 = 1e-6;

    pub fn new(camera: &Camera) -> Self {
        Self {
            enabled: true,
            target: camera.target,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            spherical: Spherical::from_offset(camera.eye - camera.target),
            theta_delta: 0.0,
            phi_delta: 0.0,
            scale: 1.0,
            drag_from: None,
        }
    }

    pub fn with_distance_limits(mut self, min: f32, max: f32) -> Self {
        self.min_distance = min;
        self.max_distance = max;
        self
    }

    pub fn with_damping(mut self, factor: f32) -> Self {
        self.damping_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_from.is_some()
    }

    pub fn distance(&self) -> f32 {
        self.spherical.radius
    }

    /// Feed one pointer event. `viewport_height` is the height in pixels of the
    /// view receiving the input; a full-height drag turns the camera once.
    pub fn handle(&mut self, input: PointerInput, viewport_height: f32) {
        if !self.enabled {
            return;
        }

        match input {
            PointerInput::Down(position) => self.drag_from = Some(position),
            PointerInput::Move(position) => {
                if let Some(from) = self.drag_from {
                    let delta = position - from;
                    let height = viewport_height.max(1.0);
                    self.rotate_left(TAU * delta.x / height * self.rotate_speed);
                    self.rotate_up(TAU * delta.y / height * self.rotate_speed);
                    self.drag_from = Some(position);
                }
            }
            PointerInput::Up => self.drag_from = None,
            PointerInput::Wheel(lines) => {
                if lines > 0.0 {
                    self.scale *= self.zoom_scale();
                } else if lines < 0.0 {
                    self.scale /= self.zoom_scale();
                }
            }
        }
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    fn rotate_left(&mut self, angle: f32) {
        self.theta_delta -= angle;
    }

    fn rotate_up(&mut self, angle: f32) {
        self.phi_delta -= angle;
    }

    /// Advance the damped motion by one frame and place `camera` accordingly.
    /// Returns `true` if the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let before = self.spherical;

        self.spherical.theta += self.theta_delta * self.damping_factor;
        self.spherical.phi += self.phi_delta * self.damping_factor;
        self.spherical.phi = self
            .spherical
            .phi
            .clamp(Self::MIN_POLAR, PI - Self::MIN_POLAR);
        self.spherical.radius =
            (self.spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        self.theta_delta *= 1.0 - self.damping_factor;
        self.phi_delta *= 1.0 - self.damping_factor;
        self.scale = 1.0;

        camera.target = self.target;
        camera.eye = self.target + self.spherical.to_offset();

        (self.spherical.theta - before.theta).abs() > Self::EPS
            || (self.spherical.phi - before.phi).abs() > Self::EPS
            || (self.spherical.radius - before.radius).abs() > Self::EPS
    }
}

impl Release for OrbitControls {
    fn release(&mut self) {
        self.enabled = false;
        self.drag_from = None;
        self.theta_delta = 0.0;
        self.phi_delta = 0.0;
        self.scale = 1.0;
    }
}

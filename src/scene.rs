use std::f32::consts::TAU;

use glam::{Mat4, Quat, Vec3};

pub const EARTH_RADIUS: f32 = 2.0;
pub const MOON_RADIUS: f32 = 0.5;

/// Earth spin, radians per second.
pub const EARTH_SPIN_RATE: f32 = 0.1;
/// Moon orbit, radians per second.
pub const MOON_ORBIT_RATE: f32 = 0.5;
pub const MOON_ORBIT_RADIUS: f32 = 3.5;

/// Earth rotation around Y after `elapsed` seconds, wrapped into `[0, 2π)`.
pub fn earth_rotation(elapsed: f32) -> f32 {
    (elapsed * EARTH_SPIN_RATE).rem_euclid(TAU)
}

/// Moon position on its circular orbit in the XZ plane after `elapsed` seconds.
pub fn moon_position(elapsed: f32) -> Vec3 {
    let angle = elapsed * MOON_ORBIT_RATE;
    Vec3::new(
        angle.sin() * MOON_ORBIT_RADIUS,
        0.0,
        angle.cos() * MOON_ORBIT_RADIUS,
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Light {
    /// Parallel rays travelling along `direction`; no falloff.
    Directional {
        direction: Vec3,
        color: Vec3,
        intensity: f32,
    },
    /// Light radiating from `position`. A `distance` of 0 means no cutoff.
    Point {
        position: Vec3,
        color: Vec3,
        intensity: f32,
        distance: f32,
        decay: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ambient {
    pub color: Vec3,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneObject {
    pub position: Vec3,
    pub rotation_y: f32,
    pub scale: f32,
}

impl SceneObject {
    pub fn new(position: Vec3, scale: f32) -> Self {
        Self {
            position,
            rotation_y: 0.0,
            scale,
        }
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_rotation_y(self.rotation_y),
            self.position,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneKind {
    Sunlight,
    Moonlight,
}

impl SceneKind {
    pub fn name(&self) -> &'static str {
        match self {
            SceneKind::Sunlight => "sunlight",
            SceneKind::Moonlight => "moonlight",
        }
    }
}

/// Objects and lights drawn together through one camera.
#[derive(Debug, Clone)]
pub struct Scene {
    pub kind: SceneKind,
    pub earth: SceneObject,
    pub moon: Option<SceneObject>,
    pub light: Light,
    pub ambient: Ambient,
}

impl Scene {
    pub fn new(kind: SceneKind) -> Self {
        match kind {
            SceneKind::Sunlight => Self::sunlight(),
            SceneKind::Moonlight => Self::moonlight(),
        }
    }

    pub fn sunlight() -> Self {
        Self {
            kind: SceneKind::Sunlight,
            earth: SceneObject::new(Vec3::ZERO, EARTH_RADIUS),
            moon: None,
            light: Light::Directional {
                direction: -Vec3::new(5.0, 3.0, 5.0).normalize(),
                color: Vec3::ONE,
                intensity: 1.0,
            },
            ambient: Ambient {
                color: Vec3::ONE,
                intensity: 0.1,
            },
        }
    }

    pub fn moonlight() -> Self {
        let moon = SceneObject::new(moon_position(0.0), MOON_RADIUS);
        Self {
            kind: SceneKind::Moonlight,
            earth: SceneObject::new(Vec3::ZERO, EARTH_RADIUS),
            moon: Some(moon),
            light: Light::Point {
                position: moon.position,
                color: Vec3::new(0.8, 0.85, 1.0),
                intensity: 2.0,
                distance: 0.0,
                decay: 2.0,
            },
            ambient: Ambient {
                color: Vec3::ONE,
                intensity: 0.05,
            },
        }
    }

    /// Place every animated object at its pose for `elapsed` seconds since setup.
    pub fn animate(&mut self, elapsed: f32) {
        self.earth.rotation_y = earth_rotation(elapsed);

        if let Some(moon) = self.moon.as_mut() {
            moon.position = moon_position(elapsed);
            // the point light rides on the moon
            if let Light::Point { position, .. } = &mut self.light {
                *position = moon.position;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    #[test]
    fn earth_rotation_follows_fixed_rate() {
        assert_eq!(earth_rotation(0.0), 0.0);
        assert!((earth_rotation(5.0) - 0.5).abs() < EPS);
        assert!((earth_rotation(20.0) - 2.0).abs() < EPS);
    }

    #[test]
    fn earth_rotation_wraps() {
        let t = 100.0;
        let expected = (0.1 * t) % TAU;
        let angle = earth_rotation(t);
        assert!((angle - expected).abs() < EPS);
        assert!(angle >= 0.0 && angle < TAU);
    }

    #[test]
    fn moon_orbit_matches_parametric_circle() {
        for t in [0.0f32, 0.5, 1.0, std::f32::consts::PI, 12.25, 300.0] {
            let p = moon_position(t);
            let expected = Vec3::new((0.5 * t).sin() * 3.5, 0.0, (0.5 * t).cos() * 3.5);
            assert!((p - expected).length() < EPS, "t = {t}");
            assert!((p.length() - MOON_ORBIT_RADIUS).abs() < EPS);
        }
    }

    #[test]
    fn moonlight_light_follows_moon() {
        let mut scene = Scene::moonlight();
        scene.animate(3.0);

        let moon = scene.moon.expect("moonlight scene has a moon");
        assert_eq!(moon.position, moon_position(3.0));
        match scene.light {
            Light::Point { position, .. } => assert_eq!(position, moon.position),
            other => panic!("unexpected light {other:?}"),
        }
        assert!((scene.earth.rotation_y - 0.3).abs() < EPS);
    }

    #[test]
    fn sunlight_has_no_moon() {
        let mut scene = Scene::sunlight();
        scene.animate(7.0);

        assert!(scene.moon.is_none());
        assert!(matches!(scene.light, Light::Directional { .. }));
        assert!((scene.earth.rotation_y - 0.7).abs() < EPS);
    }

    #[test]
    fn model_matrix_applies_scale_then_translation() {
        let object = SceneObject::new(Vec3::new(1.0, 0.0, 0.0), 2.0);
        let p = object.model_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(3.0, 0.0, 0.0)).length() < EPS);
    }
}

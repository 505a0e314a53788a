//! Directional lights and the demo scene's rotating light rig.

use glam::{Mat3, Vec3};

/// A directional light.
#[derive(Clone, Copy, Debug)]
pub struct DirectionalLight {
    /// Direction the light travels (normalized).
    pub direction: Vec3,
    /// Radiance.
    pub strength: Vec3,
}

/// The scene's three directional lights, slowly orbiting the Y axis.
///
/// Only the first (key) light casts a shadow; the other two are dim fill
/// lights.
#[derive(Clone, Debug)]
pub struct LightRig {
    base_directions: [Vec3; 3],
    strengths: [Vec3; 3],
    rotation_angle: f32,
}

impl LightRig {
    /// Creates the rig with the demo's light directions and strengths.
    pub fn new() -> Self {
        Self {
            base_directions: [
                Vec3::new(0.57735, -0.57735, 0.57735),
                Vec3::new(-0.57735, -0.57735, 0.57735),
                Vec3::new(0.0, -0.707, -0.707),
            ],
            strengths: [
                Vec3::new(0.4, 0.4, 0.5),
                Vec3::new(0.1, 0.1, 0.1),
                Vec3::new(0.0, 0.0, 0.0),
            ],
            rotation_angle: 0.0,
        }
    }

    /// Advances the orbit. `delta_time` in seconds.
    pub fn animate(&mut self, delta_time: f32) {
        self.rotation_angle += 0.1 * delta_time;
    }

    /// The lights at the current orbit angle.
    pub fn lights(&self) -> [DirectionalLight; 3] {
        let rotation = Mat3::from_rotation_y(self.rotation_angle);
        std::array::from_fn(|i| DirectionalLight {
            direction: (rotation * self.base_directions[i]).normalize(),
            strength: self.strengths[i],
        })
    }

    /// Direction of the shadow-casting key light.
    pub fn key_light_direction(&self) -> Vec3 {
        self.lights()[0].direction
    }
}

impl Default for LightRig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directions_stay_normalized() {
        let mut rig = LightRig::new();
        rig.animate(3.7);
        for light in rig.lights() {
            assert!((light.direction.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_rotation_preserves_elevation() {
        // Orbiting about Y must not change the vertical component.
        let mut rig = LightRig::new();
        let before = rig.lights()[0].direction.y;
        rig.animate(10.0);
        let after = rig.lights()[0].direction.y;
        assert!((before - after).abs() < 1e-5);
    }

    #[test]
    fn test_key_light_matches_first_light() {
        let rig = LightRig::new();
        assert_eq!(rig.key_light_direction(), rig.lights()[0].direction);
    }
}

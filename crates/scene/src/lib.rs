//! Scene state: camera and lights.

pub mod camera;
pub mod light;

pub use camera::Camera;
pub use light::{DirectionalLight, LightRig};

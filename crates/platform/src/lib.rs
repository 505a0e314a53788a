//! Platform layer: windowing and input.
//!
//! - Window management via winit
//! - Vulkan surface creation
//! - Keyboard/mouse input state

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

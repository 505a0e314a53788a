//! The rendering pipeline.
//!
//! This crate orchestrates the frame: per-frame resource ring, dirty
//! constant propagation, the shadow / normal-depth / SSAO / main pass
//! sequence with its layout transitions, and the contracts the UI overlay
//! consumes.

pub mod constants;
pub mod depth_buffer;
pub mod frame;
pub mod graph;
pub mod items;
pub mod mesh;
pub mod renderer;
pub mod shadow;
pub mod ssao;
pub mod targets;
pub mod ui;

pub use renderer::Renderer;
pub use ui::{RenderControl, RenderSettings, UiTextureAllocator, ViewportSubmissions};

/// Number of frames the CPU may record ahead of the GPU.
///
/// Every per-frame buffer exists this many times, and dirty counters start
/// at this value so a change propagates into every ring slot.
pub const NUM_FRAME_RESOURCES: usize = 3;

/// Capacity of the shader-visible descriptor slot table.
pub const MAX_SRV_SLOTS: u32 = 10_000;

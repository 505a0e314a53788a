//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan 1.3 using the `ash`
//! crate. It handles:
//! - Instance and device creation
//! - Swapchain management
//! - Command pool/buffer recording
//! - Buffer and image ownership, image layout transitions
//! - The shader-visible descriptor slot table and its free-list allocator
//! - Pipeline and shader module creation
//! - Synchronization primitives, including the timeline fence that gates
//!   frame-resource reuse

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;

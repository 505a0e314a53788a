//! Asset generation and loading.
//!
//! The demo scene's geometry is either generated procedurally (box, grid,
//! sphere, cylinder, quad) or loaded from the skull text model. Texture
//! assets are out of scope; the renderer substitutes generated placeholder
//! pixels.

mod error;
pub mod geometry;
pub mod skull;

pub use error::{ResourceError, ResourceResult};
pub use geometry::MeshData;

//! The contracts the debug UI overlay consumes.
//!
//! The UI widget layer is an external collaborator; the renderer exposes
//! exactly three surfaces to it:
//!
//! - [`UiTextureAllocator`]: descriptor slot allocation for UI-owned
//!   textures (fonts, icons), delegating to the slot allocator. Injected
//!   into the UI explicitly; there is no global allocator.
//! - [`ViewportSubmissions`]: a per-frame, write-only registry of
//!   textures the UI may display in its viewport panels. The renderer
//!   never reads it back.
//! - [`RenderControl`]: the UI's only mutable control surface into the
//!   orchestrator - the dock-space/offscreen toggle and the clear color.

use drake_rhi::descriptor::{CpuDescriptor, GpuDescriptor};

/// Descriptor allocation callbacks for UI-owned textures.
pub trait UiTextureAllocator {
    /// Allocates one slot; returns its handle pair.
    fn allocate_ui_texture(&mut self) -> (CpuDescriptor, GpuDescriptor);

    /// Frees a slot through its handle pair. The pair must match.
    fn free_ui_texture(&mut self, cpu: CpuDescriptor, gpu: GpuDescriptor);
}

/// User-tunable render settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderSettings {
    /// Main viewport clear color.
    pub clear_color: [f32; 4],
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [30.0 / 255.0, 30.0 / 255.0, 30.0 / 255.0, 1.0],
        }
    }
}

/// The render-settings control surface exposed to the UI.
pub trait RenderControl {
    /// Selects whether the scene renders to the offscreen target (shown
    /// inside the UI's dock-space viewport) or directly to the swapchain.
    fn set_render_to_offscreen(&mut self, enabled: bool);

    /// Whether dock-space/offscreen mode is active.
    fn render_to_offscreen(&self) -> bool;

    /// Mutable access to the render settings.
    fn render_settings(&mut self) -> &mut RenderSettings;
}

/// One texture offered to the UI's viewport list for a single frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewportTexture {
    pub name: String,
    pub handle: GpuDescriptor,
    pub width: u32,
    pub height: u32,
}

/// Per-frame registry of viewport textures.
///
/// The renderer clears and refills this every frame; the UI drains it
/// while building its panels.
#[derive(Debug, Default)]
pub struct ViewportSubmissions {
    textures: Vec<ViewportTexture>,
}

impl ViewportSubmissions {
    /// Name of the default scene viewport.
    pub const DEFAULT_VIEW: &'static str = "Scene";

    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears last frame's submissions. Call once per frame before the
    /// passes submit.
    pub fn begin_frame(&mut self) {
        self.textures.clear();
    }

    /// Registers a texture for display this frame.
    pub fn submit(&mut self, name: &str, handle: GpuDescriptor, width: u32, height: u32) {
        self.textures.push(ViewportTexture {
            name: name.to_string(),
            handle,
            width,
            height,
        });
    }

    /// The textures submitted this frame.
    pub fn textures(&self) -> &[ViewportTexture] {
        &self.textures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submissions_reset_each_frame() {
        let mut submissions = ViewportSubmissions::new();
        submissions.submit("SSAO", GpuDescriptor { ptr: 0x40 }, 800, 600);
        submissions.submit("Scene Normals", GpuDescriptor { ptr: 0x80 }, 800, 600);
        assert_eq!(submissions.textures().len(), 2);

        submissions.begin_frame();
        assert!(submissions.textures().is_empty());
    }

    #[test]
    fn test_submission_preserves_order_and_fields() {
        let mut submissions = ViewportSubmissions::new();
        submissions.submit("A", GpuDescriptor { ptr: 1 }, 10, 20);
        submissions.submit("B", GpuDescriptor { ptr: 2 }, 30, 40);
        let textures = submissions.textures();
        assert_eq!(textures[0].name, "A");
        assert_eq!(textures[1].handle, GpuDescriptor { ptr: 2 });
        assert_eq!(textures[1].width, 30);
        assert_eq!(textures[1].height, 40);
    }

    #[test]
    fn test_default_clear_color_is_dark_gray() {
        let settings = RenderSettings::default();
        assert!(settings.clear_color[0] > 0.0 && settings.clear_color[0] < 0.2);
        assert_eq!(settings.clear_color[3], 1.0);
    }
}

//! Dynamic rendering attachment helpers.
//!
//! Small builders over `VkRenderingAttachmentInfo` so pass-recording code
//! states only what differs between passes: target view, clear value, and
//! whether existing contents are loaded (the main pass reloads the depth
//! laid down by the normals pass).

use ash::vk;

/// Color attachment configuration.
#[derive(Clone)]
pub struct ColorAttachment {
    image_view: vk::ImageView,
    load_op: vk::AttachmentLoadOp,
    clear_value: [f32; 4],
}

impl ColorAttachment {
    /// An attachment cleared to `clear_value` at pass start.
    pub fn clear(image_view: vk::ImageView, clear_value: [f32; 4]) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            clear_value,
        }
    }

    /// An attachment that preserves its existing contents.
    pub fn load(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::LOAD,
            clear_value: [0.0; 4],
        }
    }

    fn to_vk(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_value,
                },
            })
    }
}

/// Depth attachment configuration.
#[derive(Clone)]
pub struct DepthAttachment {
    image_view: vk::ImageView,
    load_op: vk::AttachmentLoadOp,
    store_op: vk::AttachmentStoreOp,
}

impl DepthAttachment {
    /// Cleared to 1.0 and stored (the SSAO pass reads it afterwards).
    pub fn clear_store(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }

    /// Loaded from the previous pass and preserved (main pass EQUAL test).
    pub fn load(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
        }
    }

    fn to_vk(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            })
    }
}

/// Bundled rendering info with owned attachment arrays.
///
/// `vk::RenderingInfo` borrows its attachment slices; this bundle keeps
/// them alive for the duration of `begin_rendering`.
pub struct RenderingBundle {
    color: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
    extent: vk::Extent2D,
}

impl RenderingBundle {
    /// Builds a bundle for a pass over `extent`.
    pub fn new(
        extent: vk::Extent2D,
        color: Option<&ColorAttachment>,
        depth: Option<&DepthAttachment>,
    ) -> Self {
        Self {
            color: color.iter().map(|c| c.to_vk()).collect(),
            depth: depth.map(|d| d.to_vk()),
            extent,
        }
    }

    /// The rendering info to pass to `cmd_begin_rendering`.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            })
            .layer_count(1)
            .color_attachments(&self.color);
        if let Some(depth) = &self.depth {
            info = info.depth_attachment(depth);
        }
        info
    }

    /// Full-extent viewport for this pass.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    /// Full-extent scissor for this pass.
    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

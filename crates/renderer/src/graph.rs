//! The fixed pass sequence and pipeline-layout binding protocol.
//!
//! Every frame executes the same hand-ordered pass list; resource
//! dependencies between passes are realized with image layout transitions
//! recorded by the renderer. What this module owns is the *binding*
//! protocol: when the bound pipeline layout changes, previously bound
//! descriptor sets are disturbed (incompatible layouts invalidate them),
//! so the recorder must rebind every parameter of the newly active
//! layout. Rebinding on every pass would also be correct but wasteful, so
//! [`PassGraph`] tracks the active layout as explicit state and reports
//! exactly when a full rebind is required.

use tracing::debug;

/// Pipeline layout family a pass records against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutKind {
    /// Shadow, normal-depth, and main passes: pass constants, per-object
    /// constants, material buffer, texture table, environment set.
    Scene,
    /// SSAO and blur passes: SSAO constants, blur push constant, input
    /// map sets.
    Ssao,
    /// The UI overlay binds its own layout; whatever it leaves bound is
    /// unknown to us.
    External,
}

impl LayoutKind {
    /// Number of parameters a full rebind of this layout touches.
    pub fn parameter_count(self) -> u32 {
        match self {
            // pass CB, object CB, material buffer, texture table,
            // environment (cube/shadow/ambient) set
            LayoutKind::Scene => 5,
            // SSAO CB, blur-direction constant, normal/depth set, input set
            LayoutKind::Ssao => 4,
            LayoutKind::External => 0,
        }
    }
}

/// Identifies one pass of the frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassId {
    Shadow,
    NormalsDepth,
    Ssao,
    SsaoBlur,
    Main,
    UiOverlay,
}

impl PassId {
    /// The layout family this pass records against.
    pub fn layout(self) -> LayoutKind {
        match self {
            PassId::Shadow | PassId::NormalsDepth | PassId::Main => LayoutKind::Scene,
            PassId::Ssao | PassId::SsaoBlur => LayoutKind::Ssao,
            PassId::UiOverlay => LayoutKind::External,
        }
    }

    /// Display name for logs.
    pub fn name(self) -> &'static str {
        match self {
            PassId::Shadow => "shadow",
            PassId::NormalsDepth => "normals-depth",
            PassId::Ssao => "ssao",
            PassId::SsaoBlur => "ssao-blur",
            PassId::Main => "main",
            PassId::UiOverlay => "ui-overlay",
        }
    }
}

/// The frame's pass order. SsaoBlur runs its horizontal and vertical
/// halves inside one pass entry.
pub const FRAME_PASSES: [PassId; 6] = [
    PassId::Shadow,
    PassId::NormalsDepth,
    PassId::Ssao,
    PassId::SsaoBlur,
    PassId::Main,
    PassId::UiOverlay,
];

/// Tracks which pipeline layout is currently bound.
#[derive(Debug, Default)]
pub struct BindingTracker {
    active: Option<LayoutKind>,
}

impl BindingTracker {
    /// Creates a tracker with nothing bound.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `kind` the active layout. Returns true when the caller
    /// must rebind all of that layout's parameters.
    ///
    /// `External` layouts leave the binding state unknown, so the next
    /// engine layout always rebinds.
    pub fn activate(&mut self, kind: LayoutKind) -> bool {
        if kind == LayoutKind::External {
            self.active = None;
            return false;
        }
        let needs_rebind = self.active != Some(kind);
        self.active = Some(kind);
        needs_rebind
    }

    /// Forgets the active layout (new command buffer, nothing bound).
    pub fn invalidate(&mut self) {
        self.active = None;
    }

    /// The currently active layout, if any.
    pub fn active(&self) -> Option<LayoutKind> {
        self.active
    }
}

/// Per-frame pass sequencing state.
pub struct PassGraph {
    tracker: BindingTracker,
}

impl PassGraph {
    /// Creates the graph.
    pub fn new() -> Self {
        Self {
            tracker: BindingTracker::new(),
        }
    }

    /// Call at the top of each frame: a freshly reset command buffer has
    /// no bindings.
    pub fn begin_frame(&mut self) {
        self.tracker.invalidate();
    }

    /// Enters `pass`. Returns true when every parameter of the pass's
    /// layout must be (re)bound before recording its draws.
    pub fn begin_pass(&mut self, pass: PassId) -> bool {
        let layout = pass.layout();
        let rebind = self.tracker.activate(layout);
        if rebind {
            debug!(
                "pass '{}': layout changed, rebinding {} parameters",
                pass.name(),
                layout.parameter_count()
            );
        }
        rebind
    }
}

impl Default for PassGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test double that counts individual parameter binds the way the
    /// recorder would issue them.
    #[derive(Default)]
    struct BindCounter {
        binds: u32,
        rebind_events: Vec<PassId>,
    }

    impl BindCounter {
        fn record_frame(&mut self, graph: &mut PassGraph) {
            graph.begin_frame();
            for pass in FRAME_PASSES {
                if graph.begin_pass(pass) {
                    self.rebind_events.push(pass);
                    // A full rebind touches every parameter of the layout.
                    self.binds += pass.layout().parameter_count();
                }
            }
        }
    }

    #[test]
    fn test_rebind_exactly_on_layout_changes() {
        let mut graph = PassGraph::new();
        let mut counter = BindCounter::default();
        counter.record_frame(&mut graph);

        // Scene (shadow), Ssao (ssao), Scene (main): three switches.
        assert_eq!(
            counter.rebind_events,
            vec![PassId::Shadow, PassId::Ssao, PassId::Main]
        );
        // Full rebinds only: 5 + 4 + 5 parameters.
        assert_eq!(counter.binds, 14);
    }

    #[test]
    fn test_no_rebind_between_same_layout_passes() {
        let mut graph = PassGraph::new();
        graph.begin_frame();
        assert!(graph.begin_pass(PassId::Shadow));
        // Normals/depth shares the scene layout with the shadow pass.
        assert!(!graph.begin_pass(PassId::NormalsDepth));
        assert!(graph.begin_pass(PassId::Ssao));
        // The two blur directions stay on the SSAO layout.
        assert!(!graph.begin_pass(PassId::SsaoBlur));
        assert!(graph.begin_pass(PassId::Main));
    }

    #[test]
    fn test_every_frame_starts_unbound() {
        let mut graph = PassGraph::new();
        let mut counter = BindCounter::default();
        counter.record_frame(&mut graph);
        counter.record_frame(&mut graph);
        // The second frame repeats the same three rebinds; nothing
        // carries over across command buffer resets.
        assert_eq!(counter.rebind_events.len(), 6);
        assert_eq!(counter.binds, 28);
    }

    #[test]
    fn test_external_layout_poisons_binding_state() {
        let mut tracker = BindingTracker::new();
        assert!(tracker.activate(LayoutKind::Scene));
        assert!(!tracker.activate(LayoutKind::Scene));
        // The UI bound its own layout...
        assert!(!tracker.activate(LayoutKind::External));
        // ...so the scene layout must fully rebind afterwards.
        assert!(tracker.activate(LayoutKind::Scene));
    }

    #[test]
    fn test_frame_pass_order_is_fixed() {
        assert_eq!(FRAME_PASSES[0], PassId::Shadow);
        assert_eq!(FRAME_PASSES[1], PassId::NormalsDepth);
        assert_eq!(FRAME_PASSES[2], PassId::Ssao);
        assert_eq!(FRAME_PASSES[3], PassId::SsaoBlur);
        assert_eq!(FRAME_PASSES[4], PassId::Main);
        assert_eq!(FRAME_PASSES[5], PassId::UiOverlay);
    }

    #[test]
    fn test_parameter_counts() {
        assert_eq!(LayoutKind::Scene.parameter_count(), 5);
        assert_eq!(LayoutKind::Ssao.parameter_count(), 4);
        assert_eq!(LayoutKind::External.parameter_count(), 0);
    }
}

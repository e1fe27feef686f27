use std::sync::Arc;

use dartdbg_config::{DebuggerConfig, VmServiceConfig};
use dartdbg_vmservice::{FrameDescriptor, InstanceRef, VmServiceClientConfig};
use parking_lot::Mutex;

use crate::{
    error::FrameError,
    frame::{resolve_stack, FrameKey, StackFrame},
    pause::PauseTracker,
    registry::{FrameRegistry, NodeHandle},
    scope_scan::AutoExpressionScanner,
    source::SourceDocuments,
};

/// A frame of the current pause together with the node that shows it.
#[derive(Clone, Debug)]
pub struct PausedFrame {
    /// Node for the frame's location. Frames of a recursive call share a
    /// location and therefore share this handle; it does not identify a
    /// stack slot.
    pub handle: NodeHandle,
    pub frame: Arc<StackFrame>,
}

/// Per-session services shared by every frame expansion.
///
/// Cloning is cheap; clones share the same pause state and registry.
#[derive(Clone)]
pub struct SessionContext {
    documents: Arc<dyn SourceDocuments>,
    pauses: PauseTracker,
    frames: Arc<Mutex<FrameRegistry>>,
    scanner: AutoExpressionScanner,
    auto_expressions: bool,
}

impl SessionContext {
    pub fn new(documents: Arc<dyn SourceDocuments>) -> Self {
        Self {
            documents,
            pauses: PauseTracker::new(),
            frames: Arc::new(Mutex::new(FrameRegistry::new())),
            scanner: AutoExpressionScanner::new(),
            auto_expressions: false,
        }
    }

    pub fn from_config(config: &DebuggerConfig, documents: Arc<dyn SourceDocuments>) -> Self {
        Self {
            frames: Arc::new(Mutex::new(FrameRegistry::with_max_frames(
                config.frames.max_cached_frames,
            ))),
            scanner: AutoExpressionScanner::for_strategy(config.data_view.auto_expression_strategy),
            auto_expressions: config.data_view.auto_expressions,
            ..Self::new(documents)
        }
    }

    pub fn with_auto_expressions(mut self, enabled: bool) -> Self {
        self.auto_expressions = enabled;
        self
    }

    pub fn with_scanner(mut self, scanner: AutoExpressionScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn documents(&self) -> &dyn SourceDocuments {
        self.documents.as_ref()
    }

    pub fn pauses(&self) -> &PauseTracker {
        &self.pauses
    }

    pub fn scanner(&self) -> &AutoExpressionScanner {
        &self.scanner
    }

    pub fn auto_expressions(&self) -> bool {
        self.auto_expressions
    }

    pub fn node_handle(&self, key: &FrameKey) -> Option<NodeHandle> {
        self.frames.lock().handle_for(key)
    }

    /// Resolve the stack of a pause event and make its frames the live ones
    /// for `isolate_id`. Frames of other isolates are left alone.
    ///
    /// Malformed descriptors keep their slot as an error so callers can still
    /// show the remaining frames.
    pub fn on_paused(
        &self,
        isolate_id: &str,
        descriptors: &[FrameDescriptor],
        exception: Option<InstanceRef>,
    ) -> Vec<Result<PausedFrame, FrameError>> {
        let resolved = resolve_stack(isolate_id, descriptors, exception, self.documents());

        let paused: Vec<Result<PausedFrame, FrameError>> = {
            let mut registry = self.frames.lock();
            resolved
                .into_iter()
                .map(|frame| {
                    let frame = frame?;
                    Ok(PausedFrame {
                        handle: registry.track(frame.key()),
                        frame: Arc::new(frame),
                    })
                })
                .collect()
        };

        self.pauses.on_paused(
            isolate_id,
            paused
                .iter()
                .flatten()
                .map(|paused| paused.frame.key().clone()),
        );
        paused
    }

    pub fn on_resumed(&self, isolate_id: &str) {
        self.pauses.on_resumed(isolate_id);
    }

    pub fn on_isolate_exit(&self, isolate_id: &str) {
        self.pauses.on_isolate_exit(isolate_id);
    }
}

/// Client settings for the VM service connection.
pub fn client_config(config: &VmServiceConfig) -> VmServiceClientConfig {
    VmServiceClientConfig {
        reply_timeout: config.reply_timeout(),
        pending_capacity: config.pending_capacity,
    }
}

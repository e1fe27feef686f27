use std::collections::{HashMap, VecDeque};

use crate::frame::FrameKey;

/// Default number of frame nodes remembered across pause events.
pub const DEFAULT_MAX_FRAMES: usize = 1024;

/// Small, stable handle for the UI node that shows a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u32);

impl NodeHandle {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps frame identity keys to node handles so that the same logical frame
/// keeps its node when the VM pauses there again.
///
/// The oldest keys are forgotten once more than `max_frames` are tracked.
/// Handles are never reused, so a forgotten key gets a fresh handle.
pub struct FrameRegistry {
    next_handle: u32,
    key_to_handle: HashMap<FrameKey, NodeHandle>,
    handle_to_key: HashMap<NodeHandle, FrameKey>,
    max_frames: usize,
    fifo: VecDeque<NodeHandle>,
}

impl FrameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frames(max_frames: usize) -> Self {
        Self {
            max_frames: max_frames.max(1),
            ..Self::default()
        }
    }

    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    pub fn track(&mut self, key: &FrameKey) -> NodeHandle {
        if let Some(handle) = self.key_to_handle.get(key).copied() {
            return handle;
        }

        let handle = NodeHandle(self.next_handle.max(1));
        self.next_handle = handle.0.saturating_add(1);
        self.key_to_handle.insert(key.clone(), handle);
        self.handle_to_key.insert(handle, key.clone());
        self.fifo.push_back(handle);
        self.evict_oldest();
        handle
    }

    pub fn handle_for(&self, key: &FrameKey) -> Option<NodeHandle> {
        self.key_to_handle.get(key).copied()
    }

    pub fn key_for(&self, handle: NodeHandle) -> Option<&FrameKey> {
        self.handle_to_key.get(&handle)
    }

    pub fn len(&self) -> usize {
        self.key_to_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_to_handle.is_empty()
    }

    /// Forget every frame, e.g. when the isolate exits.
    pub fn clear(&mut self) {
        self.key_to_handle.clear();
        self.handle_to_key.clear();
        self.fifo.clear();
    }

    fn evict_oldest(&mut self) {
        while self.fifo.len() > self.max_frames {
            let Some(handle) = self.fifo.pop_front() else {
                break;
            };
            if let Some(key) = self.handle_to_key.remove(&handle) {
                self.key_to_handle.remove(&key);
            }
        }
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self {
            next_handle: 1,
            key_to_handle: HashMap::new(),
            handle_to_key: HashMap::new(),
            max_frames: DEFAULT_MAX_FRAMES,
            fifo: VecDeque::new(),
        }
    }
}

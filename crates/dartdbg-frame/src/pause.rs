use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::frame::FrameKey;

struct PauseState {
    generation: u64,
    live: HashSet<FrameKey>,
    token: CancellationToken,
}

impl Default for PauseState {
    fn default() -> Self {
        Self {
            generation: 0,
            live: HashSet::new(),
            token: cancelled_token(),
        }
    }
}

fn cancelled_token() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}

/// Tracks which frames belong to the current pause of each isolate.
///
/// Every pause starts a new generation for its isolate. Work started for an
/// older generation is cancelled through its token and must not reach the
/// UI. Isolates pause and resume independently of each other.
#[derive(Clone, Default)]
pub struct PauseTracker {
    isolates: Arc<Mutex<HashMap<String, PauseState>>>,
}

/// Captured at the start of an expansion; checked again before delivery.
#[derive(Clone, Debug)]
pub struct DeliveryTicket {
    isolate_id: String,
    key: FrameKey,
    generation: u64,
    token: CancellationToken,
}

impl DeliveryTicket {
    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    pub fn key(&self) -> &FrameKey {
        &self.key
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolves once the pause this ticket was issued in has ended.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

impl PauseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pause of `isolate_id` with `keys` as its frames; returns
    /// the isolate's new generation.
    pub fn on_paused<I>(&self, isolate_id: &str, keys: I) -> u64
    where
        I: IntoIterator<Item = FrameKey>,
    {
        let mut isolates = self.isolates.lock();
        let state = isolates.entry(isolate_id.to_string()).or_default();
        state.token.cancel();
        state.generation += 1;
        state.token = CancellationToken::new();
        state.live = keys.into_iter().collect();
        tracing::debug!(
            target: "dartdbg.frame",
            isolate = isolate_id,
            generation = state.generation,
            frames = state.live.len(),
            "isolate paused"
        );
        state.generation
    }

    pub fn on_resumed(&self, isolate_id: &str) {
        let mut isolates = self.isolates.lock();
        let Some(state) = isolates.get_mut(isolate_id) else {
            return;
        };
        state.token.cancel();
        state.live.clear();
        tracing::debug!(
            target: "dartdbg.frame",
            isolate = isolate_id,
            generation = state.generation,
            "isolate resumed"
        );
    }

    /// Forget an isolate that has exited, cancelling its outstanding work.
    pub fn on_isolate_exit(&self, isolate_id: &str) {
        if let Some(state) = self.isolates.lock().remove(isolate_id) {
            state.token.cancel();
        }
    }

    /// Generation of the isolate's latest pause, 0 if it never paused.
    pub fn generation(&self, isolate_id: &str) -> u64 {
        self.isolates
            .lock()
            .get(isolate_id)
            .map_or(0, |state| state.generation)
    }

    pub fn ticket(&self, isolate_id: &str, key: &FrameKey) -> DeliveryTicket {
        let isolates = self.isolates.lock();
        let (generation, token) = match isolates.get(isolate_id) {
            Some(state) => (state.generation, state.token.clone()),
            None => (0, cancelled_token()),
        };
        DeliveryTicket {
            isolate_id: isolate_id.to_string(),
            key: key.clone(),
            generation,
            token,
        }
    }

    pub fn is_live(&self, ticket: &DeliveryTicket) -> bool {
        if ticket.token.is_cancelled() {
            return false;
        }
        self.isolates
            .lock()
            .get(&ticket.isolate_id)
            .is_some_and(|state| {
                state.generation == ticket.generation && state.live.contains(&ticket.key)
            })
    }
}

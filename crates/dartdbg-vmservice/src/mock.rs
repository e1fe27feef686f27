use std::{collections::HashMap, future::Future, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

use crate::{
    client::ObjectInspector,
    types::{ClassObj, InspectOutcome, RpcError, Sentinel, VmServiceError, ERROR_INVALID_PARAMS},
};

#[derive(Clone, Debug)]
enum MockReply {
    Class(ClassObj),
    Sentinel(Sentinel),
    Error(VmServiceError),
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, MockReply>,
    gates: HashMap<String, Arc<Semaphore>>,
    calls: Vec<(String, String)>,
}

/// Deterministic, in-memory VM service test double.
///
/// Calls are recorded as soon as `fetch_class` is invoked, before the
/// returned future is polled.
#[derive(Clone, Default)]
pub struct MockVmService {
    state: Arc<Mutex<MockState>>,
    call_made: Arc<Notify>,
}

/// Holds replies for one class id until released.
#[derive(Clone)]
pub struct ReplyGate {
    semaphore: Arc<Semaphore>,
}

impl ReplyGate {
    /// Let one held reply through.
    pub fn release(&self) {
        self.semaphore.add_permits(1);
    }
}

impl MockVmService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class(&self, class: ClassObj) {
        let id = class.id.clone();
        self.state.lock()
            .replies
            .insert(id, MockReply::Class(class));
    }

    pub fn set_sentinel(&self, class_id: impl Into<String>, sentinel: Sentinel) {
        self.state.lock()
            .replies
            .insert(class_id.into(), MockReply::Sentinel(sentinel));
    }

    pub fn set_error(&self, class_id: impl Into<String>, error: VmServiceError) {
        self.state.lock()
            .replies
            .insert(class_id.into(), MockReply::Error(error));
    }

    /// Hold replies for `class_id` until [`ReplyGate::release`] is called.
    pub fn gate(&self, class_id: impl Into<String>) -> ReplyGate {
        let semaphore = Arc::new(Semaphore::new(0));
        self.state.lock()
            .gates
            .insert(class_id.into(), semaphore.clone());
        ReplyGate { semaphore }
    }

    /// Every `(isolate_id, class_id)` requested so far, in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Wait until at least `count` requests have been issued.
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.call_made.notified();
            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn reply_for(&self, class_id: &str) -> InspectOutcome<ClassObj> {
        match self.state.lock().replies.get(class_id).cloned() {
            Some(MockReply::Class(class)) => InspectOutcome::Resolved(class),
            Some(MockReply::Sentinel(sentinel)) => InspectOutcome::Sentinel(sentinel),
            Some(MockReply::Error(err)) => InspectOutcome::Failure(err),
            None => InspectOutcome::Failure(VmServiceError::Rpc(RpcError {
                code: ERROR_INVALID_PARAMS,
                message: format!("no mock class configured for `{class_id}`"),
                details: None,
            })),
        }
    }
}

impl ObjectInspector for MockVmService {
    fn fetch_class(
        &self,
        isolate_id: String,
        class_id: String,
    ) -> impl Future<Output = InspectOutcome<ClassObj>> + Send {
        let gate = {
            let mut state = self.state.lock();
            state.calls.push((isolate_id, class_id.clone()));
            state.gates.get(&class_id).cloned()
        };
        self.call_made.notify_waiters();

        let mock = self.clone();
        async move {
            if let Some(gate) = gate {
                match gate.acquire().await {
                    Ok(permit) => permit.forget(),
                    Err(_closed) => return InspectOutcome::Failure(VmServiceError::Cancelled),
                }
            }
            mock.reply_for(&class_id)
        }
    }
}

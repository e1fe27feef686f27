use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::types::{ClassObj, InspectOutcome, Result, RpcError, Sentinel, VmServiceError};

/// Fetches class metadata for a receiver.
///
/// Implementations deliver exactly one outcome per call and never retry. The
/// arguments are owned so the returned future does not borrow from the caller.
pub trait ObjectInspector: Send + Sync {
    fn fetch_class(
        &self,
        isolate_id: String,
        class_id: String,
    ) -> impl Future<Output = InspectOutcome<ClassObj>> + Send;
}

impl<T: ObjectInspector> ObjectInspector for Arc<T> {
    fn fetch_class(
        &self,
        isolate_id: String,
        class_id: String,
    ) -> impl Future<Output = InspectOutcome<ClassObj>> + Send {
        (**self).fetch_class(isolate_id, class_id)
    }
}

#[derive(Debug, Clone)]
pub struct VmServiceClientConfig {
    pub reply_timeout: Duration,
    pub pending_capacity: usize,
}

impl Default for VmServiceClientConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(10),
            pending_capacity: 256,
        }
    }
}

/// An outgoing JSON-RPC call, handed to the transport for encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// A reply read by the transport, routed back to the waiting caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: String,
    pub result: std::result::Result<serde_json::Value, RpcError>,
}

type PendingReply = oneshot::Sender<Result<serde_json::Value>>;

#[derive(Debug)]
struct Inner {
    outgoing: mpsc::Sender<Request>,
    pending: Mutex<HashMap<String, PendingReply>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    shutdown: CancellationToken,
    config: VmServiceClientConfig,
}

/// Request/response multiplexer for the VM service.
///
/// The client never touches the wire: requests are queued on the channel
/// returned by [`VmServiceClient::new`] and the transport feeds replies back
/// through [`VmServiceClient::dispatch`].
#[derive(Clone, Debug)]
pub struct VmServiceClient {
    inner: Arc<Inner>,
}

impl VmServiceClient {
    pub fn new(config: VmServiceClientConfig) -> (Self, mpsc::Receiver<Request>) {
        let (outgoing, requests) = mpsc::channel(config.pending_capacity.max(1));
        let inner = Arc::new(Inner {
            outgoing,
            pending: Mutex::new(HashMap::with_capacity(config.pending_capacity)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            config,
        });
        (Self { inner }, requests)
    }

    /// Cancel every outstanding and future request.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Cancelled when the client is shut down or the transport goes away.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Called by the transport when the connection to the VM is lost.
    pub fn close_transport(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let pending = std::mem::take(&mut *self.inner.pending.lock());
        for (_id, tx) in pending {
            let _ = tx.send(Err(VmServiceError::ConnectionClosed));
        }
        self.inner.shutdown.cancel();
    }

    /// Route a reply to its caller. Replies nobody waits for are dropped.
    pub fn dispatch(&self, response: Response) {
        let tx = self.inner.pending.lock().remove(&response.id);
        match tx {
            Some(tx) => {
                let _ = tx.send(response.result.map_err(VmServiceError::Rpc));
            }
            None => {
                tracing::debug!(
                    target: "dartdbg.vmservice",
                    id = %response.id,
                    "dropping reply for unknown or abandoned request"
                );
            }
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    async fn send_request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(VmServiceError::ConnectionClosed);
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(VmServiceError::Cancelled);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id.clone(), tx);

        tracing::debug!(target: "dartdbg.vmservice", %id, method, "sending request");
        let request = Request {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        // A full queue counts against the reply timeout and yields to shutdown.
        let exchange = async {
            if self.inner.outgoing.send(request).await.is_err() {
                return Err(VmServiceError::ConnectionClosed);
            }
            rx.await.unwrap_or(Err(VmServiceError::ConnectionClosed))
        };

        let result = tokio::select! {
            _ = self.inner.shutdown.cancelled() => {
                if self.inner.closed.load(Ordering::SeqCst) {
                    Err(VmServiceError::ConnectionClosed)
                } else {
                    Err(VmServiceError::Cancelled)
                }
            }
            res = tokio::time::timeout(self.inner.config.reply_timeout, exchange) => {
                res.unwrap_or(Err(VmServiceError::Timeout))
            }
        };
        self.remove_pending(&id);
        result
    }

    fn remove_pending(&self, id: &str) {
        self.inner.pending.lock().remove(id);
    }

    /// `getObject` for a class id.
    pub async fn get_class(&self, isolate_id: &str, class_id: &str) -> InspectOutcome<ClassObj> {
        let params = json!({ "isolateId": isolate_id, "objectId": class_id });
        match self.send_request("getObject", params).await {
            Ok(reply) => decode_class_reply(reply),
            Err(err) => InspectOutcome::Failure(err),
        }
    }
}

impl ObjectInspector for VmServiceClient {
    fn fetch_class(
        &self,
        isolate_id: String,
        class_id: String,
    ) -> impl Future<Output = InspectOutcome<ClassObj>> + Send {
        let client = self.clone();
        async move {
            let outcome = client.get_class(&isolate_id, &class_id).await;
            match &outcome {
                InspectOutcome::Resolved(class) => tracing::debug!(
                    target: "dartdbg.vmservice",
                    class_id = %class_id,
                    fields = class.fields.len(),
                    "class resolved"
                ),
                InspectOutcome::Sentinel(sentinel) => tracing::debug!(
                    target: "dartdbg.vmservice",
                    class_id = %class_id,
                    kind = %sentinel.kind,
                    "class lookup returned a sentinel"
                ),
                InspectOutcome::Failure(err) => tracing::warn!(
                    target: "dartdbg.vmservice",
                    class_id = %class_id,
                    error = %err,
                    "class lookup failed"
                ),
            }
            outcome
        }
    }
}

/// Interpret a `getObject` result expected to describe a class.
pub fn decode_class_reply(reply: serde_json::Value) -> InspectOutcome<ClassObj> {
    let kind = reply
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string();
    match kind.as_str() {
        "Class" => match serde_json::from_value::<ClassObj>(reply) {
            Ok(class) => InspectOutcome::Resolved(class),
            Err(err) => InspectOutcome::Failure(VmServiceError::Decode(err.to_string())),
        },
        "Sentinel" => match serde_json::from_value::<Sentinel>(reply) {
            Ok(sentinel) => InspectOutcome::Sentinel(sentinel),
            Err(err) => InspectOutcome::Failure(VmServiceError::Decode(err.to_string())),
        },
        _ => InspectOutcome::Failure(VmServiceError::UnexpectedType(kind)),
    }
}

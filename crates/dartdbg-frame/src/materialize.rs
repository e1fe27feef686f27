//! Turns a paused frame into the children shown under its node.

use dartdbg_vmservice::{ClassObj, InspectOutcome, ObjectInspector};

use crate::{
    children::{ChildGroup, ChildList, StaticFieldGroup, ValueRow, VarLocation},
    context::SessionContext,
    error::ExpansionError,
    frame::{FrameKey, StackFrame, RECEIVER_NAME},
};

/// Name of the pseudo-variable that carries the pending exception.
pub const EXCEPTION_ROW_NAME: &str = "exception";

/// Receives children for a frame node. Implemented by the UI tree.
pub trait ChildrenSink: Send {
    /// `is_final` is false while more children are still on their way.
    fn deliver_children(&mut self, children: ChildList, is_final: bool);

    fn set_error_state(&mut self, message: &str);
}

/// The class lookup a frame with a receiver needs before it can be shown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassRequest {
    pub key: FrameKey,
    pub isolate_id: String,
    pub class_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Plan {
    /// No receiver: the children are known without asking the VM.
    Ready(ChildList),
    NeedsClass(ClassRequest),
}

// Everything but the exception marker.
enum Tail {
    Ready(ChildList),
    Fetch(ClassRequest),
}

/// Builds frame children, inspecting the receiver's class when there is one.
///
/// Each call issues at most one inspection request and never retries it.
#[derive(Clone)]
pub struct Materializer<I> {
    inspector: I,
    context: SessionContext,
}

impl<I: ObjectInspector> Materializer<I> {
    pub fn new(inspector: I, context: SessionContext) -> Self {
        Self { inspector, context }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn inspector(&self) -> &I {
        &self.inspector
    }

    /// Decide synchronously whether `frame` needs a round trip.
    pub fn plan(&self, frame: &StackFrame) -> Result<Plan, ExpansionError> {
        Ok(match self.tail(frame)? {
            Tail::Ready(tail) => {
                let mut list = exception_marker(frame);
                list.extend(tail);
                Plan::Ready(list)
            }
            Tail::Fetch(request) => Plan::NeedsClass(request),
        })
    }

    /// All children of `frame`, in display order.
    pub async fn materialize(&self, frame: &StackFrame) -> Result<ChildList, ExpansionError> {
        let request = match self.plan(frame)? {
            Plan::Ready(list) => return Ok(list),
            Plan::NeedsClass(request) => request,
        };
        let outcome = self
            .inspector
            .fetch_class(request.isolate_id, request.class_id)
            .await;
        let tail = self.complete(frame, outcome)?;
        let mut list = exception_marker(frame);
        list.extend(tail);
        Ok(list)
    }

    /// Expand a frame node.
    ///
    /// The exception marker, if any, is delivered right away as a partial
    /// list. The rest follows as the final list, or the node is put in an
    /// error state. Nothing reaches `sink` once the frame's pause has ended.
    pub async fn expand<S>(&self, frame: &StackFrame, sink: &mut S) -> Result<(), ExpansionError>
    where
        S: ChildrenSink + ?Sized,
    {
        let pauses = self.context.pauses();
        let ticket = pauses.ticket(frame.isolate_id(), frame.key());
        if !pauses.is_live(&ticket) {
            tracing::debug!(target: "dartdbg.frame", key = %frame.key(), "not expanding inactive frame");
            return Err(ExpansionError::Stale);
        }

        let head = exception_marker(frame);
        if !head.is_empty() {
            sink.deliver_children(head, false);
        }

        let result = match self.tail(frame) {
            Ok(Tail::Ready(tail)) => Ok(tail),
            Ok(Tail::Fetch(request)) => {
                let fetch = self.inspector.fetch_class(request.isolate_id, request.class_id);
                tokio::select! {
                    _ = ticket.cancelled() => {
                        tracing::debug!(
                            target: "dartdbg.frame",
                            key = %frame.key(),
                            "abandoning class lookup for a frame that is no longer active"
                        );
                        return Err(ExpansionError::Stale);
                    }
                    outcome = fetch => self.complete(frame, outcome),
                }
            }
            Err(err) => Err(err),
        };

        if !pauses.is_live(&ticket) {
            tracing::debug!(
                target: "dartdbg.frame",
                isolate = ticket.isolate_id(),
                key = %frame.key(),
                generation = ticket.generation(),
                "dropping children for a frame that is no longer active"
            );
            return Err(ExpansionError::Stale);
        }

        match result {
            Ok(children) => {
                sink.deliver_children(children, true);
                Ok(())
            }
            Err(err) => {
                tracing::debug!(target: "dartdbg.frame", key = %frame.key(), error = %err, "frame expansion failed");
                sink.set_error_state(&err.to_string());
                Err(err)
            }
        }
    }

    fn tail(&self, frame: &StackFrame) -> Result<Tail, ExpansionError> {
        let Some(receiver) = frame.receiver() else {
            return Ok(Tail::Ready(self.assemble(frame, None)));
        };
        let class = receiver
            .value
            .as_ref()
            .ok_or_else(|| ExpansionError::MalformedFrame("receiver has no value".to_string()))?
            .class_ref
            .as_ref()
            .ok_or_else(|| ExpansionError::MalformedFrame("receiver has no class".to_string()))?;

        Ok(Tail::Fetch(ClassRequest {
            key: frame.key().clone(),
            isolate_id: frame.isolate_id().to_string(),
            class_id: class.id.clone(),
        }))
    }

    fn complete(
        &self,
        frame: &StackFrame,
        outcome: InspectOutcome<ClassObj>,
    ) -> Result<ChildList, ExpansionError> {
        match outcome {
            InspectOutcome::Resolved(class) => Ok(self.assemble(frame, Some(class))),
            InspectOutcome::Sentinel(sentinel) => {
                Err(ExpansionError::ObjectUnavailable(sentinel.to_string()))
            }
            InspectOutcome::Failure(err) => Err(ExpansionError::ProtocolFailure(err.to_string())),
        }
    }

    fn assemble(&self, frame: &StackFrame, class: Option<ClassObj>) -> ChildList {
        let mut list = ChildList::new();

        if let Some(class) = class {
            let fields: Vec<_> = class.static_fields().cloned().collect();
            if !fields.is_empty() {
                list.push(ChildGroup::StaticFields(StaticFieldGroup {
                    class_id: class.id,
                    class_name: class.name,
                    fields,
                }));
            }
        }

        let rows: Vec<ValueRow> = frame
            .vars()
            .iter()
            .filter_map(|var| {
                let value = var.value.clone()?;
                let declaration = (var.name != RECEIVER_NAME).then(|| VarLocation {
                    script_id: frame.script().id.clone(),
                    token_pos: var.declaration_token_pos,
                });
                Some(ValueRow {
                    name: var.name.clone(),
                    value,
                    declaration,
                })
            })
            .collect();
        if !rows.is_empty() {
            list.push(ChildGroup::InstanceVariables(rows));
        }

        if self.context.auto_expressions() {
            let watches = self
                .context
                .scanner()
                .candidates(frame, self.context.documents());
            list.push(ChildGroup::AutoWatch(watches));
        }
        list
    }
}

fn exception_marker(frame: &StackFrame) -> ChildList {
    let mut list = ChildList::new();
    if let Some(exception) = frame.exception() {
        list.push(ChildGroup::ExceptionMarker(ValueRow {
            name: EXCEPTION_ROW_NAME.to_string(),
            value: exception.clone(),
            declaration: None,
        }));
    }
    list
}

use std::fmt;

use dartdbg_vmservice::{BoundVariable, CodeRef, FrameDescriptor, InstanceRef, ScriptRef};

use crate::{error::FrameError, source::SourceDocuments};

/// Name the VM gives the receiver binding of an instance method frame.
pub const RECEIVER_NAME: &str = "this";

/// Identity of a paused location, stable across pause events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey(String);

impl FrameKey {
    pub fn new(script_id: &str, code_id: &str) -> Self {
        Self(format!("{script_id}:{code_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePosition {
    pub script_id: String,
    pub file_name: String,
    pub uri: String,
    /// 0-based.
    pub line: u32,
    pub synthetic: bool,
}

/// A resolved paused frame. Immutable once built; share it behind an `Arc`.
#[derive(Clone, Debug)]
pub struct StackFrame {
    isolate_id: String,
    index: u32,
    key: FrameKey,
    code: CodeRef,
    script: ScriptRef,
    token_pos: i64,
    vars: Vec<BoundVariable>,
    exception: Option<InstanceRef>,
    position: Option<SourcePosition>,
    receiver: Option<usize>,
}

impl StackFrame {
    pub fn isolate_id(&self) -> &str {
        &self.isolate_id
    }

    /// Depth in the stack, 0 being the top frame.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn key(&self) -> &FrameKey {
        &self.key
    }

    pub fn code(&self) -> &CodeRef {
        &self.code
    }

    pub fn script(&self) -> &ScriptRef {
        &self.script
    }

    pub fn token_pos(&self) -> i64 {
        self.token_pos
    }

    pub fn vars(&self) -> &[BoundVariable] {
        &self.vars
    }

    pub fn exception(&self) -> Option<&InstanceRef> {
        self.exception.as_ref()
    }

    /// `None` when the token position has no line mapping.
    pub fn source_position(&self) -> Option<&SourcePosition> {
        self.position.as_ref()
    }

    /// First variable named `this`, in declaration order.
    pub fn receiver(&self) -> Option<&BoundVariable> {
        self.receiver.map(|idx| &self.vars[idx])
    }

    pub fn is_in_sdk_patch_file(&self) -> bool {
        self.position.as_ref().is_some_and(|pos| pos.synthetic)
    }
}

/// Build a [`StackFrame`] from a paused-frame descriptor.
///
/// `exception` is the pending exception of the pause event; callers attach it
/// to the top frame only.
pub fn resolve_frame(
    isolate_id: &str,
    descriptor: &FrameDescriptor,
    exception: Option<InstanceRef>,
    docs: &dyn SourceDocuments,
) -> Result<StackFrame, FrameError> {
    let code = descriptor
        .code
        .clone()
        .ok_or(FrameError::Malformed { field: "code" })?;
    let location = descriptor
        .location
        .as_ref()
        .ok_or(FrameError::Malformed { field: "location" })?;
    let script = location
        .script
        .clone()
        .ok_or(FrameError::Malformed { field: "location.script" })?;

    let key = FrameKey::new(&script.id, &code.id);
    let position = resolve_position(&script, location.token_pos, docs);
    if position.is_none() {
        tracing::debug!(
            target: "dartdbg.frame",
            key = %key,
            token_pos = location.token_pos,
            "no line mapping for frame position"
        );
    }
    let receiver = descriptor
        .vars
        .iter()
        .position(|var| var.name == RECEIVER_NAME);

    Ok(StackFrame {
        isolate_id: isolate_id.to_string(),
        index: descriptor.index,
        key,
        code,
        script,
        token_pos: location.token_pos,
        vars: descriptor.vars.clone(),
        exception,
        position,
        receiver,
    })
}

/// Resolve every frame of a `getStack` reply independently.
///
/// The pending exception is attached to the top frame; a malformed descriptor
/// only fails its own entry.
pub fn resolve_stack(
    isolate_id: &str,
    descriptors: &[FrameDescriptor],
    exception: Option<InstanceRef>,
    docs: &dyn SourceDocuments,
) -> Vec<Result<StackFrame, FrameError>> {
    let mut exception = exception;
    descriptors
        .iter()
        .enumerate()
        .map(|(depth, descriptor)| {
            let pending = if depth == 0 { exception.take() } else { None };
            let frame = resolve_frame(isolate_id, descriptor, pending, docs);
            if let Err(err) = &frame {
                tracing::warn!(
                    target: "dartdbg.frame",
                    depth,
                    error = %err,
                    "skipping malformed frame"
                );
            }
            frame
        })
        .collect()
}

fn resolve_position(
    script: &ScriptRef,
    token_pos: i64,
    docs: &dyn SourceDocuments,
) -> Option<SourcePosition> {
    let line = docs.map_token_offset_to_line(&script.id, token_pos)?;
    let file = docs.script_file(&script.id)?;
    Some(SourcePosition {
        script_id: script.id.clone(),
        file_name: file.file_name,
        uri: file.uri,
        line,
        synthetic: file.synthetic,
    })
}

use thiserror::Error;

/// A paused-frame descriptor could not be turned into a [`crate::StackFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: missing {field}")]
    Malformed { field: &'static str },
}

/// Why a frame expansion did not produce children.
///
/// The display text is what the UI shows in place of the children.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpansionError {
    /// The inspection call itself failed; the text is surfaced verbatim.
    #[error("{0}")]
    ProtocolFailure(String),
    /// The receiver's class is no longer inspectable.
    #[error("{0}")]
    ObjectUnavailable(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    /// The frame stopped being active before the result could be delivered.
    #[error("frame is no longer active")]
    Stale,
}

impl From<FrameError> for ExpansionError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Malformed { field } => ExpansionError::MalformedFrame(format!("missing {field}")),
        }
    }
}

//! Paused-frame materialization for the Dart VM debugger.
//!
//! A pause event's frame descriptors are resolved into [`StackFrame`]s with a
//! stable identity and an optional source position. Expanding a frame node
//! produces a [`ChildList`]: the pending exception, the receiver class's
//! static fields, the bound variables and optional watch suggestions. Only
//! frames with a receiver need a round trip to the VM.

mod children;
mod context;
mod error;
mod frame;
mod materialize;
mod pause;
mod presentation;
mod registry;
pub mod scope_scan;
pub mod source;

pub use children::{
    ChildBearing, ChildGroup, ChildList, Evaluable, Labeled, StaticFieldGroup, ValueRow,
    VarLocation, WatchRow,
};
pub use context::{client_config, PausedFrame, SessionContext};
pub use error::{ExpansionError, FrameError};
pub use frame::{resolve_frame, resolve_stack, FrameKey, SourcePosition, StackFrame, RECEIVER_NAME};
pub use materialize::{ChildrenSink, ClassRequest, Materializer, Plan, EXCEPTION_ROW_NAME};
pub use pause::{DeliveryTicket, PauseTracker};
pub use presentation::{render_label, FrameIcon, FrameLabel};
pub use registry::{FrameRegistry, NodeHandle, DEFAULT_MAX_FRAMES};
pub use scope_scan::{
    AutoExpressionScanner, BraceFunctionLocator, EnclosingFunctionLocator, MemberAccessCollector,
    NoCandidates, ReferenceCollector,
};
pub use source::{ScriptSource, ScriptTable, SourceDocuments};

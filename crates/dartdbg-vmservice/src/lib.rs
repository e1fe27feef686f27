//! Dart VM service client façade for dartdbg.
//!
//! `dartdbg-frame` consumes this crate to inspect the receiver of a paused
//! frame. The client only multiplexes requests and replies; encoding messages
//! onto the wire belongs to the transport that drains
//! [`VmServiceClient::new`]'s request channel.

mod client;
pub mod types;

pub use client::{
    decode_class_reply, ObjectInspector, Request, Response, VmServiceClient,
    VmServiceClientConfig,
};
pub use types::{
    BoundVariable, ClassObj, ClassRef, CodeRef, FieldRef, FrameDescriptor, InspectOutcome,
    InstanceRef, IsolateId, RpcError, ScriptRef, Sentinel, SourceLocation, TypeRef,
    VmServiceError,
};

// The in-memory double is only needed for tests and downstream integration suites.
#[cfg(any(test, feature = "test-support"))]
pub mod mock;

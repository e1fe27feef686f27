use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub type IsolateId = String;

/// JSON-RPC `Invalid params`, reported by the VM for unknown object ids.
pub const ERROR_INVALID_PARAMS: i64 = -32602;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRef {
    pub id: String,
    #[serde(default)]
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub id: String,
    /// VM service instance kind (`Int`, `String`, `PlainInstance`, ...).
    #[serde(default)]
    pub kind: String,
    #[serde(rename = "class", default)]
    pub class_ref: Option<ClassRef>,
    #[serde(default)]
    pub value_as_string: Option<String>,
}

impl InstanceRef {
    /// Kinds whose value is fully described by `value_as_string`.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "Null" | "Bool" | "Int" | "Double" | "String"
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    #[serde(default)]
    pub script: Option<ScriptRef>,
    #[serde(default)]
    pub token_pos: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundVariable {
    pub name: String,
    /// `None` when the slot was elided (null on the wire, or reported as a
    /// sentinel such as `OptimizedOut`).
    #[serde(default, deserialize_with = "instance_or_elided")]
    pub value: Option<InstanceRef>,
    #[serde(default)]
    pub declaration_token_pos: i64,
}

fn instance_or_elided<'de, D>(deserializer: D) -> std::result::Result<Option<InstanceRef>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if raw.is_null() || raw.get("type").and_then(|t| t.as_str()) == Some("Sentinel") {
        return Ok(None);
    }
    serde_json::from_value(raw)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// A paused frame as reported in a `getStack` reply or a pause event.
///
/// `code` and `location` are optional here so that an incomplete descriptor
/// is rejected by the frame resolver instead of failing the whole reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDescriptor {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub code: Option<CodeRef>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub vars: Vec<BoundVariable>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub id: String,
    pub name: String,
    #[serde(rename = "static", default)]
    pub is_static: bool,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    #[serde(default)]
    pub declared_type: Option<TypeRef>,
}

/// Class metadata returned by `getObject` for a class id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassObj {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldRef>,
}

impl ClassObj {
    pub fn static_fields(&self) -> impl Iterator<Item = &FieldRef> + '_ {
        self.fields.iter().filter(|field| field.is_static)
    }
}

/// The referenced object is no longer inspectable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentinel {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub value_as_string: String,
}

impl Sentinel {
    pub fn new(kind: impl Into<String>, value_as_string: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value_as_string: value_as_string.into(),
        }
    }
}

impl std::fmt::Display for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value_as_string)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VmServiceError {
    #[error("{0}")]
    Rpc(RpcError),
    #[error("VM service request timed out")]
    Timeout,
    #[error("VM service request cancelled")]
    Cancelled,
    #[error("VM service connection closed")]
    ConnectionClosed,
    #[error("unexpected object type `{0}`")]
    UnexpectedType(String),
    #[error("malformed VM service reply: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, VmServiceError>;

/// Outcome of a single inspection request.
#[derive(Clone, Debug, PartialEq)]
pub enum InspectOutcome<T> {
    Resolved(T),
    Sentinel(Sentinel),
    Failure(VmServiceError),
}

impl<T> InspectOutcome<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

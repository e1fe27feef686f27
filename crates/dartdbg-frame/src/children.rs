//! Rows and groups shown under an expanded frame.

use dartdbg_vmservice::{FieldRef, InstanceRef};

/// Where a local variable was declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarLocation {
    pub script_id: String,
    pub token_pos: i64,
}

/// A named value: a local, the receiver, or the pending exception.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueRow {
    pub name: String,
    pub value: InstanceRef,
    /// `None` for the receiver and the exception.
    pub declaration: Option<VarLocation>,
}

/// Static fields of the receiver's class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticFieldGroup {
    pub class_id: String,
    pub class_name: String,
    pub fields: Vec<FieldRef>,
}

impl StaticFieldGroup {
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// An expression suggested for watching from the code around the pause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchRow {
    pub expression: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildGroup {
    ExceptionMarker(ValueRow),
    StaticFields(StaticFieldGroup),
    InstanceVariables(Vec<ValueRow>),
    AutoWatch(Vec<WatchRow>),
}

impl ChildGroup {
    fn rank(&self) -> u8 {
        match self {
            ChildGroup::ExceptionMarker(_) => 0,
            ChildGroup::StaticFields(_) => 1,
            ChildGroup::InstanceVariables(_) => 2,
            ChildGroup::AutoWatch(_) => 3,
        }
    }
}

/// Children of a frame node, always ordered exception, statics, variables,
/// watches regardless of the order groups were added in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChildList {
    groups: Vec<ChildGroup>,
}

impl ChildList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, group: ChildGroup) {
        let rank = group.rank();
        let at = self.groups.partition_point(|g| g.rank() <= rank);
        self.groups.insert(at, group);
    }

    pub fn extend(&mut self, other: ChildList) {
        for group in other.groups {
            self.push(group);
        }
    }

    pub fn groups(&self) -> &[ChildGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn exception(&self) -> Option<&ValueRow> {
        self.groups.iter().find_map(|g| match g {
            ChildGroup::ExceptionMarker(row) => Some(row),
            _ => None,
        })
    }

    pub fn static_group(&self) -> Option<&StaticFieldGroup> {
        self.groups.iter().find_map(|g| match g {
            ChildGroup::StaticFields(group) => Some(group),
            _ => None,
        })
    }

    pub fn variables(&self) -> &[ValueRow] {
        self.groups
            .iter()
            .find_map(|g| match g {
                ChildGroup::InstanceVariables(rows) => Some(rows.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn variable_names(&self) -> Vec<&str> {
        self.variables().iter().map(|row| row.name.as_str()).collect()
    }

    pub fn watches(&self) -> Option<&[WatchRow]> {
        self.groups.iter().find_map(|g| match g {
            ChildGroup::AutoWatch(rows) => Some(rows.as_slice()),
            _ => None,
        })
    }
}

/// One-line text for a tree node.
pub trait Labeled {
    fn label(&self) -> String;
}

/// Nodes that can be expanded further.
pub trait ChildBearing {
    fn has_children(&self) -> bool;

    /// Object id to inspect when the node is expanded.
    fn expansion_target(&self) -> Option<&str>;
}

/// Nodes that can be re-evaluated in the frame they came from.
pub trait Evaluable {
    fn evaluation_expression(&self) -> Option<String>;
}

fn describe(value: &InstanceRef) -> String {
    if let Some(text) = &value.value_as_string {
        return if value.kind == "String" {
            format!("\"{text}\"")
        } else {
            text.clone()
        };
    }
    match &value.class_ref {
        Some(class) if !class.name.is_empty() => format!("{{{}}}", class.name),
        _ => value.kind.clone(),
    }
}

impl Labeled for ValueRow {
    fn label(&self) -> String {
        format!("{} = {}", self.name, describe(&self.value))
    }
}

impl ChildBearing for ValueRow {
    fn has_children(&self) -> bool {
        !self.value.is_primitive()
    }

    fn expansion_target(&self) -> Option<&str> {
        self.has_children().then_some(self.value.id.as_str())
    }
}

impl Evaluable for ValueRow {
    fn evaluation_expression(&self) -> Option<String> {
        // The exception has no name in the frame's scope.
        (self.declaration.is_some() || self.name == crate::frame::RECEIVER_NAME)
            .then(|| self.name.clone())
    }
}

impl Labeled for StaticFieldGroup {
    fn label(&self) -> String {
        self.class_name.clone()
    }
}

impl ChildBearing for StaticFieldGroup {
    fn has_children(&self) -> bool {
        !self.fields.is_empty()
    }

    fn expansion_target(&self) -> Option<&str> {
        Some(&self.class_id)
    }
}

impl Labeled for WatchRow {
    fn label(&self) -> String {
        self.expression.clone()
    }
}

impl Evaluable for WatchRow {
    fn evaluation_expression(&self) -> Option<String> {
        Some(self.expression.clone())
    }
}

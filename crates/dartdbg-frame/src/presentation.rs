use crate::{children::Labeled, frame::StackFrame};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameIcon {
    StackFrame,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameLabel {
    pub primary: String,
    /// `(file:line)` with a 1-based line; absent when the position is unknown.
    pub secondary: Option<String>,
    pub icon: FrameIcon,
}

impl FrameLabel {
    pub fn to_plain_text(&self) -> String {
        match &self.secondary {
            Some(secondary) => format!("{} {secondary}", self.primary),
            None => self.primary.clone(),
        }
    }
}

/// Render the one-line label of a frame node. Setter names lose their `=`.
pub fn render_label(frame: &StackFrame) -> FrameLabel {
    let name = frame.code().name.as_str();
    let primary = name.strip_suffix('=').unwrap_or(name).to_string();
    let secondary = frame
        .source_position()
        .map(|pos| format!("({}:{})", pos.file_name, pos.line + 1));
    FrameLabel {
        primary,
        secondary,
        icon: FrameIcon::StackFrame,
    }
}

impl Labeled for StackFrame {
    fn label(&self) -> String {
        render_label(self).to_plain_text()
    }
}

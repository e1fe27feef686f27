//! Script text and token-position mapping.

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use text_size::{TextRange, TextSize};

/// Pre-computed line start/end offsets for a script's text.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LineIndex {
    line_starts: Vec<TextSize>,
    line_ends: Vec<TextSize>,
    text_len: TextSize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![TextSize::from(0)];
        let mut line_ends = Vec::new();

        let mut i = 0;
        while i < bytes.len() {
            let terminator = match bytes[i] {
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => 2,
                b'\n' | b'\r' => 1,
                _ => {
                    i += 1;
                    continue;
                }
            };
            line_ends.push(offset(i));
            line_starts.push(offset(i + terminator));
            i += terminator;
        }
        line_ends.push(offset(text.len()));

        Self {
            line_starts,
            line_ends,
            text_len: offset(text.len()),
        }
    }

    #[inline]
    pub fn text_len(&self) -> TextSize {
        self.text_len
    }

    #[inline]
    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    #[inline]
    pub fn line_start(&self, line: u32) -> Option<TextSize> {
        self.line_starts.get(line as usize).copied()
    }

    /// Offset of the line terminator (or end of text) for `line`.
    #[inline]
    pub fn line_end(&self, line: u32) -> Option<TextSize> {
        self.line_ends.get(line as usize).copied()
    }

    pub fn line_range(&self, line: u32) -> Option<TextRange> {
        Some(TextRange::new(self.line_start(line)?, self.line_end(line)?))
    }

    /// 0-based line containing `offset`; offsets past the end clamp to the last line.
    pub fn line_of_offset(&self, offset: TextSize) -> u32 {
        let offset = offset.min(self.text_len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(insert) => insert.saturating_sub(1),
        };
        line as u32
    }
}

fn offset(value: usize) -> TextSize {
    TextSize::try_from(value).unwrap_or(TextSize::from(u32::MAX))
}

/// The VM service `tokenPosTable` of a script.
///
/// Each wire row is `[line, tokenPos, column, tokenPos, column, ...]` with a
/// 1-based line. Lookups return 0-based lines.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TokenPosTable {
    // Sorted by token position.
    entries: Vec<(i64, u32)>,
}

impl TokenPosTable {
    pub fn from_rows(rows: &[Vec<i64>]) -> Self {
        let mut entries = Vec::new();
        for row in rows {
            let Some((&line, positions)) = row.split_first() else {
                continue;
            };
            let Some(line) = u32::try_from(line).ok().and_then(|l| l.checked_sub(1)) else {
                continue;
            };
            entries.extend(positions.chunks(2).map(|pair| (pair[0], line)));
        }
        entries.sort_unstable();
        entries.dedup_by_key(|(token_pos, _)| *token_pos);
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Only exact token positions map; synthetic positions (negative) never do.
    pub fn line_of(&self, token_pos: i64) -> Option<u32> {
        if token_pos < 0 {
            return None;
        }
        self.entries
            .binary_search_by_key(&token_pos, |(pos, _)| *pos)
            .ok()
            .map(|idx| self.entries[idx].1)
    }
}

/// Whether a script URI names a file the user can open.
pub fn is_persisted_uri(uri: &str) -> bool {
    uri.starts_with("file:") || uri.starts_with("package:")
}

/// A loaded script as known to the debugger.
#[derive(Clone, Debug)]
pub struct ScriptSource {
    id: String,
    uri: String,
    text: Option<Arc<str>>,
    line_index: Option<Arc<LineIndex>>,
    token_table: TokenPosTable,
    synthetic: bool,
}

impl ScriptSource {
    pub fn new(id: impl Into<String>, uri: impl Into<String>) -> Self {
        let uri = uri.into();
        let synthetic = !is_persisted_uri(&uri);
        Self {
            id: id.into(),
            uri,
            text: None,
            line_index: None,
            token_table: TokenPosTable::default(),
            synthetic,
        }
    }

    pub fn with_text(mut self, text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        self.line_index = Some(Arc::new(LineIndex::new(&text)));
        self.text = Some(text);
        self
    }

    pub fn with_token_pos_table(mut self, rows: &[Vec<i64>]) -> Self {
        self.token_table = TokenPosTable::from_rows(rows);
        self
    }

    /// Override the URI-derived synthetic flag.
    pub fn with_synthetic(mut self, synthetic: bool) -> Self {
        self.synthetic = synthetic;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn line_index(&self) -> Option<&LineIndex> {
        self.line_index.as_deref()
    }

    pub fn token_table(&self) -> &TokenPosTable {
        &self.token_table
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Last path segment of the URI.
    pub fn file_name(&self) -> &str {
        let path = self.uri.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().unwrap_or(path)
    }
}

/// File facts the frame resolver needs for a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScriptFile {
    pub file_name: String,
    pub uri: String,
    pub synthetic: bool,
}

/// Read access to loaded scripts.
///
/// Only [`SourceDocuments::source`] is required; the rest derive from it.
pub trait SourceDocuments: Send + Sync {
    fn source(&self, script_id: &str) -> Option<Arc<ScriptSource>>;

    fn map_token_offset_to_line(&self, script_id: &str, token_pos: i64) -> Option<u32> {
        self.source(script_id)?.token_table().line_of(token_pos)
    }

    /// Text of `start_line..=end_line`, without the final line terminator.
    fn line_range_text(&self, script_id: &str, start_line: u32, end_line: u32) -> Option<String> {
        if start_line > end_line {
            return None;
        }
        let source = self.source(script_id)?;
        let index = source.line_index()?;
        let text = source.text()?;
        let range = TextRange::new(index.line_start(start_line)?, index.line_end(end_line)?);
        Some(text[range].to_string())
    }

    fn script_file(&self, script_id: &str) -> Option<ScriptFile> {
        let source = self.source(script_id)?;
        Some(ScriptFile {
            file_name: source.file_name().to_string(),
            uri: source.uri().to_string(),
            synthetic: source.is_synthetic(),
        })
    }
}

/// In-memory script store, filled as the VM reports loaded scripts.
#[derive(Debug, Default)]
pub struct ScriptTable {
    scripts: RwLock<HashMap<String, Arc<ScriptSource>>>,
}

impl ScriptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a script; returns the previous version if any.
    pub fn insert(&self, script: ScriptSource) -> Option<Arc<ScriptSource>> {
        let id = script.id().to_string();
        self.scripts.write().insert(id, Arc::new(script))
    }

    pub fn remove(&self, script_id: &str) -> Option<Arc<ScriptSource>> {
        self.scripts.write().remove(script_id)
    }

    pub fn clear(&self) {
        self.scripts.write().clear();
    }

    pub fn len(&self) -> usize {
        self.scripts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.read().is_empty()
    }
}

impl SourceDocuments for ScriptTable {
    fn source(&self, script_id: &str) -> Option<Arc<ScriptSource>> {
        self.scripts.read().get(script_id).cloned()
    }
}

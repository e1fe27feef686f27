//! Suggests watch expressions from the code around a paused line.
//!
//! The scan is best-effort: it works on raw script text with a tiny lexer
//! that only understands comments, string literals, words and punctuation.

use std::{collections::HashSet, sync::Arc};

use dartdbg_config::AutoExpressionStrategy;
use text_size::{TextRange, TextSize};

use crate::{
    children::WatchRow,
    frame::{SourcePosition, StackFrame},
    source::{LineIndex, SourceDocuments},
};

/// Lines scanned above the paused line.
const LINES_BEFORE: u32 = 1;
/// Lines scanned below the paused line.
const LINES_AFTER: u32 = 2;

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "catch"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Word,
    Literal,
    Punct(u8),
}

#[derive(Clone, Copy, Debug)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

impl Token {
    fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }

    fn is_word(&self) -> bool {
        self.kind == TokenKind::Word
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn skip_line_comment(&mut self) {
        while self.peek(0).is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
    }

    // Dart block comments nest.
    fn skip_block_comment(&mut self) {
        self.pos += 2;
        let mut depth = 1usize;
        while let Some(b) = self.peek(0) {
            match (b, self.peek(1)) {
                (b'/', Some(b'*')) => {
                    depth += 1;
                    self.pos += 2;
                }
                (b'*', Some(b'/')) => {
                    depth -= 1;
                    self.pos += 2;
                    if depth == 0 {
                        return;
                    }
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_string(&mut self, raw: bool) {
        let Some(quote) = self.peek(0) else {
            return;
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        while let Some(b) = self.peek(0) {
            if b == quote {
                if !triple {
                    self.pos += 1;
                    return;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    return;
                }
                self.pos += 1;
                continue;
            }
            match b {
                // Unterminated single-line literal.
                b'\n' if !triple => return,
                b'\\' if !raw => self.pos += 2,
                b'$' if !raw && self.peek(1) == Some(b'{') => {
                    self.pos += 2;
                    self.skip_interpolation();
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.pos.min(self.bytes.len());
    }

    fn skip_interpolation(&mut self) {
        let mut depth = 1usize;
        while let Some(token) = self.next() {
            match token.kind {
                TokenKind::Punct(b'{') => depth += 1,
                TokenKind::Punct(b'}') => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        loop {
            let b = self.peek(0)?;
            let start = self.pos;
            let kind = match b {
                b if b.is_ascii_whitespace() => {
                    self.pos += 1;
                    continue;
                }
                b'/' if self.peek(1) == Some(b'/') => {
                    self.skip_line_comment();
                    continue;
                }
                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block_comment();
                    continue;
                }
                b'\'' | b'"' => {
                    self.skip_string(false);
                    TokenKind::Literal
                }
                b'r' if matches!(self.peek(1), Some(b'\'' | b'"')) => {
                    self.pos += 1;
                    self.skip_string(true);
                    TokenKind::Literal
                }
                b if is_word_byte(b) => {
                    while self.peek(0).is_some_and(is_word_byte) {
                        self.pos += 1;
                    }
                    TokenKind::Word
                }
                _ => {
                    self.pos += 1;
                    TokenKind::Punct(b)
                }
            };
            return Some(Token {
                kind,
                start,
                end: self.pos,
            });
        }
    }
}

/// Finds the body of the function enclosing an offset.
pub trait EnclosingFunctionLocator: Send + Sync {
    fn enclosing_function(&self, text: &str, offset: TextSize) -> Option<TextRange>;
}

/// Treats a `{` as a function body when it follows a parameter list (other
/// than a control-flow condition), a getter name, a constructor initializer
/// list, or an `async`, `async*` or `sync*` marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct BraceFunctionLocator;

impl BraceFunctionLocator {
    fn function_bodies(text: &str) -> Vec<TextRange> {
        let mut bodies = Vec::new();
        let mut braces: Vec<(usize, bool)> = Vec::new();
        let mut parens: Vec<Option<Token>> = Vec::new();
        let mut paren_owner: Option<Token> = None;
        let mut last: Option<Token> = None;
        let mut before_last: Option<Token> = None;
        // Inside `Foo(..) : a = 1, super(..)` before the body.
        let mut in_initializers = false;

        for token in Lexer::new(text) {
            match token.kind {
                TokenKind::Punct(b'(') => parens.push(last.filter(Token::is_word)),
                TokenKind::Punct(b')') => paren_owner = parens.pop().flatten(),
                TokenKind::Punct(b':') => {
                    in_initializers = follows_parameter_list(text, last, paren_owner);
                }
                TokenKind::Punct(b';') => in_initializers = false,
                // `case Foo(): if (..) {` is a statement, not an initializer list.
                TokenKind::Word if CONTROL_KEYWORDS.contains(&token.text(text)) => {
                    in_initializers = false;
                }
                TokenKind::Punct(b'{') => {
                    let ends_initializers = in_initializers
                        && !matches!(last, Some(Token { kind: TokenKind::Punct(b':'), .. }));
                    let body = ends_initializers
                        || opens_function_body(text, last, before_last, paren_owner);
                    braces.push((token.start, body));
                    in_initializers = false;
                }
                TokenKind::Punct(b'}') => {
                    in_initializers = false;
                    if let Some((open, true)) = braces.pop() {
                        bodies.push(range(open, token.end));
                    }
                }
                _ => {}
            }
            before_last = last;
            last = Some(token);
        }

        // Unclosed bodies run to the end of the text.
        bodies.extend(
            braces
                .into_iter()
                .filter(|(_, body)| *body)
                .map(|(open, _)| range(open, text.len())),
        );
        bodies
    }
}

fn opens_function_body(
    text: &str,
    last: Option<Token>,
    before_last: Option<Token>,
    paren_owner: Option<Token>,
) -> bool {
    let Some(last) = last else {
        return false;
    };
    match last.kind {
        TokenKind::Punct(b')') => follows_parameter_list(text, Some(last), paren_owner),
        TokenKind::Word => {
            last.text(text) == "async"
                || before_last.is_some_and(|marker| marker.is_word() && marker.text(text) == "get")
        }
        TokenKind::Punct(b'*') => before_last
            .is_some_and(|marker| marker.is_word() && matches!(marker.text(text), "async" | "sync")),
        _ => false,
    }
}

fn follows_parameter_list(text: &str, last: Option<Token>, paren_owner: Option<Token>) -> bool {
    last.is_some_and(|last| last.kind == TokenKind::Punct(b')'))
        && paren_owner.is_none_or(|owner| !CONTROL_KEYWORDS.contains(&owner.text(text)))
}

fn range(start: usize, end: usize) -> TextRange {
    let to_size = |value: usize| TextSize::try_from(value).unwrap_or(TextSize::from(u32::MAX));
    TextRange::new(to_size(start), to_size(end))
}

impl EnclosingFunctionLocator for BraceFunctionLocator {
    fn enclosing_function(&self, text: &str, offset: TextSize) -> Option<TextRange> {
        Self::function_bodies(text)
            .into_iter()
            .filter(|body| body.start() < offset && offset < body.end())
            .max_by_key(|body| body.start())
    }
}

/// Picks watch expressions out of the scanned window.
pub trait ReferenceCollector: Send + Sync {
    /// `visible` holds the names bound in the paused frame.
    fn collect(&self, text: &str, window: TextRange, visible: &[&str]) -> Vec<String>;
}

/// Never suggests anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCandidates;

impl ReferenceCollector for NoCandidates {
    fn collect(&self, _text: &str, _window: TextRange, _visible: &[&str]) -> Vec<String> {
        Vec::new()
    }
}

/// Suggests member-access chains rooted at a visible variable, such as
/// `point.x` or `this.count`, in source order without duplicates.
///
/// A trailing method call is cut off: `list.first.toString()` yields
/// `list.first`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemberAccessCollector;

impl ReferenceCollector for MemberAccessCollector {
    fn collect(&self, text: &str, window: TextRange, visible: &[&str]) -> Vec<String> {
        let span: std::ops::Range<usize> = window.into();
        let Some(source) = text.get(span) else {
            return Vec::new();
        };
        let tokens: Vec<Token> = Lexer::new(source).collect();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        let mut i = 0;
        while i < tokens.len() {
            let token = tokens[i];
            let after_dot = i > 0 && tokens[i - 1].kind == TokenKind::Punct(b'.');
            if !token.is_word() || after_dot || !visible.contains(&token.text(source)) {
                i += 1;
                continue;
            }

            let mut segments = vec![token.text(source)];
            let mut j = i + 1;
            while let (Some(dot), Some(member)) = (tokens.get(j), tokens.get(j + 1)) {
                let is_member = member.is_word()
                    && !member.text(source).starts_with(|c: char| c.is_ascii_digit());
                if dot.kind != TokenKind::Punct(b'.') || !is_member {
                    break;
                }
                segments.push(member.text(source));
                j += 2;
            }
            if tokens.get(j).is_some_and(|t| t.kind == TokenKind::Punct(b'(')) {
                segments.pop();
            }
            if segments.len() >= 2 {
                let expression = segments.join(".");
                if seen.insert(expression.clone()) {
                    found.push(expression);
                }
            }
            i = j;
        }
        found
    }
}

/// Computes the scan window around a paused line and asks a
/// [`ReferenceCollector`] for candidates inside it.
#[derive(Clone)]
pub struct AutoExpressionScanner {
    locator: Arc<dyn EnclosingFunctionLocator>,
    collector: Arc<dyn ReferenceCollector>,
}

impl Default for AutoExpressionScanner {
    fn default() -> Self {
        Self {
            locator: Arc::new(BraceFunctionLocator),
            collector: Arc::new(NoCandidates),
        }
    }
}

impl std::fmt::Debug for AutoExpressionScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoExpressionScanner").finish_non_exhaustive()
    }
}

impl AutoExpressionScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_strategy(strategy: AutoExpressionStrategy) -> Self {
        match strategy {
            AutoExpressionStrategy::None => Self::default(),
            AutoExpressionStrategy::MemberAccess => {
                Self::default().with_collector(Arc::new(MemberAccessCollector))
            }
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn ReferenceCollector>) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_locator(mut self, locator: Arc<dyn EnclosingFunctionLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Byte range of the lines worth scanning around `position`.
    ///
    /// One line above and two below, kept inside the enclosing function and
    /// widened past blank lines. `None` when the script text is unknown or
    /// the line lies outside it.
    pub fn scan_candidate_window(
        &self,
        position: &SourcePosition,
        docs: &dyn SourceDocuments,
    ) -> Option<TextRange> {
        let source = docs.source(&position.script_id)?;
        let text = source.text()?;
        let index = source.line_index()?;
        let line = position.line;
        let last_line = index.line_count().checked_sub(1)?;
        if line > last_line {
            return None;
        }

        let (limit_start, limit_end) = self.limit_lines(text, index, line, last_line);
        let blank = |l: u32| {
            index
                .line_range(l)
                .is_some_and(|r| text[r].trim().is_empty())
        };

        let mut start = line.saturating_sub(LINES_BEFORE).max(limit_start).min(limit_end);
        while start > limit_start && blank(start) {
            start -= 1;
        }
        let mut end = line.saturating_add(LINES_AFTER).min(limit_end);
        while end < limit_end && blank(end) {
            end += 1;
        }
        if end < start {
            return None;
        }

        let window = TextRange::new(index.line_start(start)?, index.line_end(end)?);
        (!window.is_empty()).then_some(window)
    }

    fn limit_lines(&self, text: &str, index: &LineIndex, line: u32, last_line: u32) -> (u32, u32) {
        let body = (line > 0)
            .then(|| index.line_start(line))
            .flatten()
            .and_then(|offset| self.locator.enclosing_function(text, offset));
        match body {
            Some(body) => (
                index.line_of_offset(body.start()),
                index.line_of_offset(body.end()),
            ),
            None => (0, last_line),
        }
    }

    pub fn candidates(&self, frame: &StackFrame, docs: &dyn SourceDocuments) -> Vec<WatchRow> {
        let Some(position) = frame.source_position() else {
            return Vec::new();
        };
        let Some(window) = self.scan_candidate_window(position, docs) else {
            return Vec::new();
        };
        let Some(text) = docs.source(&position.script_id).and_then(|s| s.text().map(str::to_string))
        else {
            return Vec::new();
        };

        let visible: Vec<&str> = frame
            .vars()
            .iter()
            .filter(|var| var.value.is_some())
            .map(|var| var.name.as_str())
            .collect();
        let rows: Vec<WatchRow> = self
            .collector
            .collect(&text, window, &visible)
            .into_iter()
            .map(|expression| WatchRow { expression })
            .collect();
        tracing::debug!(
            target: "dartdbg.frame",
            key = %frame.key(),
            candidates = rows.len(),
            "scanned for watch candidates"
        );
        rows
    }
}

use dartdbg_frame::{
    source::LineIndex, AutoExpressionScanner, MemberAccessCollector, NoCandidates,
    ReferenceCollector, ScriptSource, ScriptTable, SourcePosition,
};
use text_size::TextRange;

use super::support::*;

const MAIN_SRC: &str = "\
void main() {
  var a = 1;
  var b = a;


  print(b);
}
";

fn main_scripts() -> ScriptTable {
    let table = ScriptTable::new();
    table.insert(ScriptSource::new("scripts/main", "file:///app/bin/main.dart").with_text(MAIN_SRC));
    table.insert(ScriptSource::new("scripts/no-text", "file:///app/bin/other.dart"));
    table
}

fn at(script_id: &str, line: u32) -> SourcePosition {
    SourcePosition {
        script_id: script_id.to_string(),
        file_name: "main.dart".to_string(),
        uri: "file:///app/bin/main.dart".to_string(),
        line,
        synthetic: false,
    }
}

fn lines(text: &str, first: u32, last: u32) -> TextRange {
    let index = LineIndex::new(text);
    TextRange::new(index.line_start(first).unwrap(), index.line_end(last).unwrap())
}

#[test]
fn window_extends_downward_over_blank_lines() {
    let docs = main_scripts();
    let window = AutoExpressionScanner::new()
        .scan_candidate_window(&at("scripts/main", 1), &docs)
        .unwrap();
    assert_eq!(window, lines(MAIN_SRC, 0, 5));
}

#[test]
fn window_extends_upward_over_blank_lines_inside_the_function() {
    let docs = scripts();
    let position = SourcePosition {
        script_id: SCRIPT.to_string(),
        file_name: "counter.dart".to_string(),
        uri: "package:app/src/counter.dart".to_string(),
        line: BUMP_LINE,
        synthetic: false,
    };
    let window = AutoExpressionScanner::new()
        .scan_candidate_window(&position, docs.as_ref())
        .unwrap();
    assert_eq!(window, lines(COUNTER_SRC, 6, 10));
}

#[test]
fn first_line_uses_the_whole_document_as_limit() {
    let docs = main_scripts();
    let window = AutoExpressionScanner::new()
        .scan_candidate_window(&at("scripts/main", 0), &docs)
        .unwrap();
    assert_eq!(window, lines(MAIN_SRC, 0, 2));
}

#[test]
fn no_window_outside_the_document_or_without_text() {
    let docs = main_scripts();
    let scanner = AutoExpressionScanner::new();
    assert_eq!(scanner.scan_candidate_window(&at("scripts/main", 99), &docs), None);
    assert_eq!(scanner.scan_candidate_window(&at("scripts/no-text", 0), &docs), None);
    assert_eq!(scanner.scan_candidate_window(&at("scripts/unknown", 0), &docs), None);
}

#[test]
fn default_collector_finds_nothing() {
    let window = lines(MAIN_SRC, 0, 5);
    assert!(NoCandidates.collect(MAIN_SRC, window, &["a", "b"]).is_empty());
}

#[test]
fn member_access_ignores_comments_strings_and_hidden_roots() {
    let text = "// p.hidden\nlog('p.quoted ${p.inner}');\nq.other + p.seen + p.seen;";
    let window = TextRange::up_to(text_size::TextSize::of(text));
    let found = MemberAccessCollector.collect(text, window, &["p"]);
    assert_eq!(found, ["p.seen"]);
}

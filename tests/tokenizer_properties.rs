// Stream invariants checked over a realistic grammar loaded from the fixtures
use scopelex::{tokenize, Event, Grammar, NoLanguages, Tokenized};
use std::fs;
use std::path::PathBuf;

fn javascript() -> Grammar {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("javascript.json");
    let source = fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read fixture: {path:?}"));
    Grammar::from_json(&source).unwrap()
}

const PROGRAM: &str = r#"'use strict';
/** Adds numbers. @param a */
function add(a, b) {
  return a + b; // sum
}
class Point extends Base {}
const p = new Promise(x => x);
let s = `v=${add(1, 0x1F)}`;
console.log(s.length, "done");
"#;

/// Text events must tile the input: contiguous, in order, from 0 to the end.
fn assert_covers(result: &Tokenized, source: &str) {
    let mut expected_start = 0;
    for event in result.stream.events() {
        if let Event::Text { start, end } = event {
            assert_eq!(*start, expected_start, "gap or overlap before {start}");
            assert!(end > start, "empty text event at {start}");
            expected_start = *end;
        }
    }
    assert_eq!(expected_start, source.len());
    assert_eq!(result.stream.text(source), source);
    assert!(result.stream.is_well_nested());
}

#[test]
fn test_program_is_covered_and_nested() {
    let grammar = javascript();
    let result = tokenize(PROGRAM, &grammar, &NoLanguages);
    assert_covers(&result, PROGRAM);
    assert!(result.anomalies.is_empty(), "{:?}", result.anomalies);
    assert!(!result.aborted);
}

#[test]
fn test_program_scopes() {
    let grammar = javascript();
    let result = tokenize(PROGRAM, &grammar, &NoLanguages);
    let spans = result.stream.spans(PROGRAM);
    let scoped = |text: &str| {
        spans
            .iter()
            .find(|span| span.text == text)
            .and_then(|span| span.innermost())
            .map(str::to_string)
    };

    assert_eq!(scoped("'use strict'").as_deref(), Some("meta"));
    assert_eq!(scoped("@param").as_deref(), Some("doctag"));
    assert_eq!(scoped("add").as_deref(), Some("title.function"));
    assert_eq!(scoped("Point").as_deref(), Some("title.class"));
    assert_eq!(scoped("Base").as_deref(), Some("title.class.inherited"));
    assert_eq!(scoped("Promise").as_deref(), Some("title.class"));
    assert_eq!(scoped("0x1F").as_deref(), Some("number"));
    assert_eq!(scoped("length").as_deref(), Some("property"));
    assert_eq!(scoped("console").as_deref(), Some("variable.language"));
    assert_eq!(scoped("\"done\"").as_deref(), Some("string"));
    assert_eq!(scoped("// sum").as_deref(), Some("comment"));
}

#[test]
fn test_edge_inputs_are_covered() {
    let grammar = javascript();
    for source in [
        "",
        "   \n\t",
        "'abc",
        "/* never closed",
        "let é = 'ü'; // ñ",
        "`${`${'deep'}`}`",
        "x = 0b1010n + 1_000",
    ] {
        let result = tokenize(source, &grammar, &NoLanguages);
        assert_covers(&result, source);
        assert!(!result.aborted, "{source:?} aborted");
    }
}

#[test]
fn test_unterminated_string_is_reported_not_fatal() {
    let grammar = javascript();
    let result = tokenize("'abc", &grammar, &NoLanguages);
    assert_eq!(result.anomalies.len(), 1);
    assert!(!result.anomalies[0].kind.is_fatal());
    assert_eq!(result.anomalies[0].offset, 4);
}

#[test]
fn test_illegal_character_aborts_at_position() {
    let grammar = javascript();
    let source = "a # b";
    let result = tokenize(source, &grammar, &NoLanguages);
    assert!(result.aborted);
    assert_eq!(result.anomalies.len(), 1);
    assert_eq!(result.anomalies[0].offset, 2);
    assert_eq!(result.stream.text(source), "a ");
    assert!(result.stream.is_well_nested());
}

#[test]
fn test_nested_braces_depth() {
    let grammar = javascript();
    let source = format!("`${{{}{}}}`", "{".repeat(200), "}".repeat(200));
    let result = tokenize(&source, &grammar, &NoLanguages);
    assert!(result.anomalies.is_empty());
    // template string, substitution, then one level per brace
    assert_eq!(result.max_depth, 202);
    assert_covers(&result, &source);
}

#[test]
fn test_tokenization_is_deterministic() {
    let grammar = javascript();
    let first = tokenize(PROGRAM, &grammar, &NoLanguages);
    let second = tokenize(PROGRAM, &grammar, &NoLanguages);
    assert_eq!(first, second);
}

use miette::Diagnostic;
use scopelex::{load_grammar_file, Grammar, GrammarError, HighlightError, ScopelexError};
use std::io::Write;
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn code(err: &dyn Diagnostic) -> Option<String> {
    err.code().map(|code| code.to_string())
}

#[test]
fn test_load_json_fixture() {
    let grammar = load_grammar_file(fixture("javascript.json")).unwrap();
    assert_eq!(grammar.name(), "JavaScript");
    assert_eq!(grammar.aliases(), &["js", "jsx", "mjs", "cjs"]);
    assert!(!grammar.case_insensitive());
    assert_eq!(grammar.sub_languages().into_iter().collect::<Vec<_>>(), vec!["xml"]);
    assert!(grammar.mode_count() > 10);
}

#[test]
fn test_load_yaml_fixture() {
    let grammar = load_grammar_file(fixture("xml.yaml")).unwrap();
    assert_eq!(grammar.name(), "xml");
    assert!(grammar.case_insensitive());
    assert!(grammar.sub_languages().is_empty());
}

#[test]
fn test_yml_extension_is_case_insensitive() {
    let mut file = tempfile::Builder::new().suffix(".YML").tempfile().unwrap();
    writeln!(file, "name: upper\ncontains: []").unwrap();
    assert_eq!(load_grammar_file(file.path()).unwrap().name(), "upper");
}

#[test]
fn test_missing_file() {
    let err = load_grammar_file(fixture("does-not-exist.json")).unwrap_err();
    assert!(matches!(
        err,
        ScopelexError::Highlight(HighlightError::GrammarFile { ref path, .. })
            if path.ends_with("does-not-exist.json")
    ));
    assert_eq!(code(&err).as_deref(), Some("highlight::grammar_file"));
}

#[test]
fn test_invalid_pattern_names_the_mode() {
    let json = r#"{
        "name": "broken",
        "contains": [ "group" ],
        "modes": { "group": { "label": "open_group", "begin": "(", "end": ")" } }
    }"#;
    let err = Grammar::from_json(json).unwrap_err();
    assert_eq!(code(&err).as_deref(), Some("grammar::invalid_pattern"));
    match err {
        GrammarError::InvalidPattern { mode, .. } => assert_eq!(mode, "open_group"),
        other => panic!("expected InvalidPattern, got {other:?}"),
    }
}

#[test]
fn test_unknown_mode_reference() {
    let yaml = "name: dangling\ncontains:\n  - nowhere\n";
    let err = Grammar::from_yaml(yaml).unwrap_err();
    assert_eq!(code(&err).as_deref(), Some("grammar::unknown_mode"));
    assert!(matches!(err, GrammarError::UnknownMode { ref name, .. } if name == "nowhere"));
}

#[test]
fn test_group_scope_out_of_range() {
    let json = r#"{
        "name": "groups",
        "contains": [ { "begin": ["a", "b"], "begin_scope": { "3": "keyword" } } ]
    }"#;
    assert!(matches!(
        Grammar::from_json(json),
        Err(GrammarError::InvalidScope { index: 3, groups: 2, .. })
    ));
}

#[test]
fn test_unknown_field_is_rejected() {
    let yaml = "name: typo\ncontains:\n  - begin: a\n    ned: b\n";
    assert!(matches!(
        Grammar::from_yaml(yaml),
        Err(GrammarError::Definition { format: "YAML", .. })
    ));
}

#[test]
fn test_bad_keyword_weight() {
    let json = r#"{
        "name": "weights",
        "keywords": { "categories": [ { "name": "keyword", "words": ["yield|x"] } ] }
    }"#;
    assert!(matches!(
        Grammar::from_json(json),
        Err(GrammarError::Definition { format: "keyword table", .. })
    ));
}

#[test]
fn test_begin_and_match_conflict() {
    let json = r#"{
        "name": "both",
        "contains": [ { "begin": "a", "match": "b" } ]
    }"#;
    let err = Grammar::from_json(json).unwrap_err();
    assert_eq!(code(&err).as_deref(), Some("grammar::conflicting_variants"));
}

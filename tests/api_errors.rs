// Error paths of the public API: lookups, aborted runs and their diagnostics

use miette::Diagnostic;
use scopelex::{
    highlight, Grammar, GrammarDef, HighlightError, ModeDef, ModeRef, Registry,
    ScopelexError, TokenizeOptions,
};

fn registry() -> Registry {
    let mut registry = Registry::new();
    registry.register(
        Grammar::load(GrammarDef {
            name: "calc".into(),
            aliases: vec!["calculator".into()],
            illegal: Some("[;!]".into()),
            contains: vec![
                ModeDef::new().scope("number").matching(r"\d+").into(),
                ModeDef::new()
                    .scope("group")
                    .begin(r"\(")
                    .end(r"\)")
                    .contains(vec![ModeRef::self_ref()])
                    .into(),
            ],
            ..GrammarDef::default()
        })
        .unwrap(),
    );
    registry
}

#[test]
fn test_unknown_language() {
    let result = highlight("1", "cobol", &registry(), TokenizeOptions::default());
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "Unknown language `cobol`");
    assert_eq!(
        err.code().map(|code| code.to_string()).as_deref(),
        Some("highlight::unknown_language")
    );
}

#[test]
fn test_empty_language_name() {
    assert!(matches!(
        highlight("1", "", &registry(), TokenizeOptions::default()),
        Err(ScopelexError::Highlight(HighlightError::UnknownLanguage { .. }))
    ));
}

#[test]
fn test_illegal_lexeme_aborts() {
    let source = "1 +\n 2;";
    let err = highlight(source, "calc", &registry(), TokenizeOptions::default()).unwrap_err();
    assert_eq!(
        err.code().map(|code| code.to_string()).as_deref(),
        Some("highlight::aborted")
    );
    match err {
        ScopelexError::Highlight(HighlightError::Aborted { span, language, reason, .. }) => {
            assert_eq!(span.offset(), 6);
            assert_eq!(span.len(), 1);
            assert_eq!(language, "calc");
            assert_eq!(reason, "illegal lexeme \";\"");
        }
        other => panic!("Expected Aborted, got {other:?}"),
    }
}

#[test]
fn test_step_limit_aborts() {
    let options = TokenizeOptions {
        step_limit: Some(3),
        ..TokenizeOptions::default()
    };
    let err = highlight("((((1))))", "calc", &registry(), options).unwrap_err();
    match err {
        ScopelexError::Highlight(HighlightError::Aborted { reason, .. }) => {
            assert_eq!(reason, "step limit of 3 exceeded");
        }
        other => panic!("Expected Aborted, got {other:?}"),
    }
}

#[test]
fn test_oversized_input_is_rejected() {
    let options = TokenizeOptions {
        max_input_len: Some(4),
        ..TokenizeOptions::default()
    };
    let err = highlight("12345678", "calculator", &registry(), options).unwrap_err();
    match err {
        ScopelexError::Highlight(HighlightError::Aborted { span, reason, .. }) => {
            assert_eq!(span.offset(), 0);
            assert_eq!(reason, "input of 8 bytes exceeds the limit of 4");
        }
        other => panic!("Expected Aborted, got {other:?}"),
    }
}

#[test]
fn test_unterminated_input_is_not_an_error() {
    let result = highlight("((1", "calc", &registry(), TokenizeOptions::default()).unwrap();
    assert_eq!(result.anomalies.len(), 1);
    assert_eq!(result.anomalies[0].kind.to_string(), "input ended with 2 unterminated mode(s)");
    assert!(result.events.is_well_nested());
}

#[test]
fn test_diagnostic_renders_with_source() {
    let source = "1!";
    let err = highlight(source, "calc", &registry(), TokenizeOptions::default()).unwrap_err();
    let report = miette::Report::new(err);
    let rendered = format!("{report:?}");
    assert!(rendered.contains("illegal lexeme"));
    assert!(rendered.contains("highlight::aborted"));
}

use scopelex::{
    highlight, load_grammar_file, AnomalyKind, GrammarError, HighlightError, IllegalPolicy,
    Registry, ScopelexError, TokenizeOptions,
};
use std::path::PathBuf;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn registry(files: &[&str]) -> Registry {
    let mut registry = Registry::new();
    for file in files {
        registry.register(load_grammar_file(fixture(file)).unwrap());
    }
    registry
}

fn spans(source: &str, language: &str, registry: &Registry) -> Vec<(Vec<String>, String)> {
    highlight(source, language, registry, TokenizeOptions::default())
        .unwrap()
        .spans(source)
        .into_iter()
        .map(|span| (span.scopes, span.text.to_string()))
        .collect()
}

fn scoped(scopes: &[&str], text: &str) -> (Vec<String>, String) {
    (scopes.iter().map(|s| s.to_string()).collect(), text.to_string())
}

#[test]
fn test_html_template_embeds_xml() {
    let registry = registry(&["javascript.json", "xml.yaml"]);
    let source = "html`<b>${x}</b>`";
    assert_eq!(
        spans(source, "js", &registry),
        vec![
            scoped(&[], "html`"),
            scoped(&["language:xml", "xml:tag"], "<"),
            scoped(&["language:xml", "xml:tag", "xml:name"], "b"),
            scoped(&["language:xml", "xml:tag"], ">"),
            scoped(&["subst"], "${x}"),
            scoped(&["language:xml", "xml:tag"], "</"),
            scoped(&["language:xml", "xml:tag", "xml:name"], "b"),
            scoped(&["language:xml", "xml:tag"], ">"),
            scoped(&[], "`"),
        ]
    );
}

#[test]
fn test_template_embeds_javascript() {
    let registry = registry(&["template.json", "javascript.json"]);
    let source = "a <%= 1 + x %> b";
    assert_eq!(
        spans(source, "ejs", &registry),
        vec![
            scoped(&[], "a "),
            scoped(&["template", "punctuation"], "<%="),
            scoped(&["template", "language:javascript"], " "),
            scoped(&["template", "language:javascript", "javascript:number"], "1"),
            scoped(&["template", "language:javascript"], " + x "),
            scoped(&["template", "punctuation"], "%>"),
            scoped(&[], " b"),
        ]
    );
}

#[test]
fn test_embedded_offsets_point_into_outer_source() {
    let registry = registry(&["template.json", "javascript.json"]);
    let source = "<%= a # b %>";
    // The embedded run never aborts; its anomalies are reported at outer offsets.
    let result = highlight(source, "erb", &registry, TokenizeOptions::default()).unwrap();
    assert_eq!(result.anomalies.len(), 1);
    assert_eq!(result.anomalies[0].offset, 6);
    assert!(matches!(
        result.anomalies[0].kind,
        AnomalyKind::Illegal { ref lexeme } if lexeme == "#"
    ));
    assert!(result.events.is_well_nested());
    assert_eq!(result.events.text(source), source);
}

#[test]
fn test_missing_sub_language_is_plain_text() {
    let registry = registry(&["javascript.json"]);
    let source = "html`<b>${x}</b>`";
    let result = highlight(source, "javascript", &registry, TokenizeOptions::default()).unwrap();

    assert_eq!(result.events.text(source), source);
    assert!(!result.anomalies.is_empty());
    assert!(result.anomalies.iter().all(|anomaly| matches!(
        anomaly.kind,
        AnomalyKind::UnknownSubLanguage { ref language } if language == "xml"
    )));
    assert!(result
        .spans(source)
        .iter()
        .all(|span| !span.scopes.iter().any(|scope| scope.starts_with("language:"))));
}

#[test]
fn test_embedded_relevance_is_absorbed() {
    let source = "html`<b>${x}</b>`";
    let with_xml = highlight(
        source,
        "js",
        &registry(&["javascript.json", "xml.yaml"]),
        TokenizeOptions::default(),
    )
    .unwrap();
    let without_xml = highlight(
        source,
        "js",
        &registry(&["javascript.json"]),
        TokenizeOptions::default(),
    )
    .unwrap();
    assert!(with_xml.relevance > without_xml.relevance);
}

#[test]
fn test_registry_validation() {
    let incomplete = registry(&["template.json"]);
    assert!(matches!(
        incomplete.validate(),
        Err(GrammarError::UnknownSubLanguage { ref grammar, ref language })
            if grammar == "erb" && language == "javascript"
    ));

    let complete = registry(&["template.json", "javascript.json", "xml.yaml"]);
    assert!(complete.validate().is_ok());
}

#[test]
fn test_policy_applies_only_to_outer_run() {
    let registry = registry(&["template.json", "javascript.json"]);
    let options = TokenizeOptions {
        illegal_policy: IllegalPolicy::Abort,
        ..TokenizeOptions::default()
    };
    assert!(highlight("<%= # %>", "erb", &registry, options).is_ok());
}

#[test]
fn test_step_limit_inside_embedded_body_fails_highlight() {
    let registry = registry(&["template.json", "javascript.json"]);
    let options = TokenizeOptions {
        step_limit: Some(4),
        ..TokenizeOptions::default()
    };
    let err = highlight("<%= 1 + 2 + 3 + 4 %> tail", "erb", &registry, options).unwrap_err();
    match err {
        ScopelexError::Highlight(HighlightError::Aborted { reason, .. }) => {
            assert_eq!(reason, "step limit of 4 exceeded");
        }
        other => panic!("Expected Aborted, got {other:?}"),
    }
}

#[test]
fn test_template_delimiters_are_not_embedded() {
    let registry = registry(&["javascript.json", "xml.yaml"]);
    let source = "html`<i></i>`";
    let result = highlight(source, "js", &registry, TokenizeOptions::default()).unwrap();
    let spans = result.spans(source);
    let closing = spans.last().unwrap();
    assert_eq!(closing.text, "`");
    assert!(closing.scopes.is_empty());
    assert_eq!(result.events.text(source), source);
}

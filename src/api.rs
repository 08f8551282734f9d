use crate::emitter::{ScopedSpan, TokenStream};
use crate::error::{Anomaly, AnomalyKind, HighlightError, ScopelexError};
use crate::grammar::Grammar;
use crate::registry::Registry;
use crate::tokenizer::{tokenize_with, TokenizeOptions};
use log::debug;
use serde::Serialize;
use std::path::Path;

/// The result of highlighting a source text with a registered grammar.
/// Serializes to a document holding the language, the event stream, the relevance
/// score and any non-fatal anomalies, so it can be handed to renderers written in
/// other languages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlighted {
    pub language: String,
    pub relevance: u32,
    pub events: TokenStream,
    pub anomalies: Vec<Anomaly>,
    pub max_depth: usize,
}

impl Highlighted {
    /// Text runs with their scope stacks.
    #[must_use]
    pub fn spans<'s>(&self, source: &'s str) -> Vec<ScopedSpan<'s>> {
        self.events.spans(source)
    }

    /// Serializes the result into a pretty-printed JSON string.
    ///
    /// # Errors
    /// Returns a `serde_json::Error` if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self)
    }

    /// Serializes the result into a YAML string.
    ///
    /// # Errors
    /// Returns a `serde_yaml::Error` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self)
    }
}

/// Highlights `source` with the grammar registered as `language`.
///
/// Embedded languages are resolved through the same registry.
///
/// # Errors
///
/// Returns a `ScopelexError` if the language is not registered, or if the run was
/// stopped by an illegal lexeme (under the `Abort` policy) or by a configured limit.
/// Anomalies that do not stop the run are reported on the result instead.
pub fn highlight(
    source: &str,
    language: &str,
    registry: &Registry,
    options: TokenizeOptions,
) -> Result<Highlighted, ScopelexError> {
    let grammar = registry
        .get(language)
        .ok_or_else(|| HighlightError::UnknownLanguage {
            name: language.to_string(),
        })?;

    let result = tokenize_with(source, grammar, registry, options);
    if result.aborted {
        if let Some(cause) = abort_cause(&result.anomalies) {
            debug!("highlighting `{}` aborted at {}", grammar.name(), cause.offset);
            return Err(cause.to_error(source, grammar.name()).into());
        }
    }

    Ok(Highlighted {
        language: grammar.name().to_string(),
        relevance: result.relevance,
        events: result.stream,
        anomalies: result.anomalies,
        max_depth: result.max_depth,
    })
}

/// The anomaly that stopped a run: a limit if one was hit, otherwise the last
/// illegal lexeme.
fn abort_cause(anomalies: &[Anomaly]) -> Option<&Anomaly> {
    anomalies
        .iter()
        .find(|anomaly| anomaly.kind.is_fatal())
        .or_else(|| {
            anomalies
                .iter()
                .rev()
                .find(|anomaly| matches!(anomaly.kind, AnomalyKind::Illegal { .. }))
        })
}

/// Loads a grammar definition from a `.json`, `.yaml` or `.yml` file.
///
/// # Errors
///
/// Returns a `ScopelexError` if the file cannot be read, has an unsupported
/// extension, or does not describe a valid grammar.
pub fn load_grammar_file(path: impl AsRef<Path>) -> Result<Grammar, ScopelexError> {
    let path = path.as_ref();
    let file_error = |message: String| HighlightError::GrammarFile {
        path: path.display().to_string(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let source = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;

    let grammar = match extension.as_deref() {
        Some("json") => Grammar::from_json(&source)?,
        Some("yaml" | "yml") => Grammar::from_yaml(&source)?,
        _ => {
            return Err(file_error("expected a .json, .yaml or .yml extension".to_string()).into());
        }
    };
    debug!("loaded grammar `{}` from {}", grammar.name(), path.display());
    Ok(grammar)
}

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;

use crate::utils::get_line_and_column;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ScopelexError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Highlight(#[from] HighlightError),
}

/// Failures raised while loading a grammar. No partial grammar survives one of these.
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Grammar Error")]
pub enum GrammarError {
    #[error("Invalid pattern in mode `{mode}`: {message}")]
    #[diagnostic(
        code(grammar::invalid_pattern),
        help("The regular expression could not be compiled. Check grouping, escapes and lookaround syntax.")
    )]
    InvalidPattern {
        #[source_code]
        src: NamedSource<String>,
        #[label("rejected here")]
        span: SourceSpan,
        mode: String,
        message: String,
    },

    #[error("Mode `{referrer}` refers to undefined mode `{name}`")]
    #[diagnostic(
        code(grammar::unknown_mode),
        help("Every named reference in `contains` or `starts` must be declared in the grammar's `modes` table.")
    )]
    UnknownMode { name: String, referrer: String },

    #[error("Conflicting variant definition in mode `{mode}`: {reason}")]
    #[diagnostic(code(grammar::conflicting_variants))]
    ConflictingVariants { mode: String, reason: String },

    #[error("Mode `{mode}` assigns a scope to group {index}, but its begin pattern only has {groups} group(s)")]
    #[diagnostic(
        code(grammar::invalid_scope),
        help("Group scopes are 1-based and must refer to an existing group.")
    )]
    InvalidScope {
        mode: String,
        index: usize,
        groups: usize,
    },

    #[error("Grammar `{grammar}` embeds unregistered sub-language `{language}`")]
    #[diagnostic(
        code(grammar::unknown_sub_language),
        help("Register the embedded language before validating the registry.")
    )]
    UnknownSubLanguage { grammar: String, language: String },

    #[error("Malformed {format} grammar definition: {message}")]
    #[diagnostic(code(grammar::definition))]
    Definition {
        format: &'static str,
        message: String,
    },
}

#[derive(Error, Debug, Diagnostic, Clone)]
#[error("Highlight Error")]
pub enum HighlightError {
    #[error("Unknown language `{name}`")]
    #[diagnostic(
        code(highlight::unknown_language),
        help("The language is neither a registered grammar name nor one of its aliases.")
    )]
    UnknownLanguage { name: String },

    #[error("Tokenizing {language} stopped: {reason}")]
    #[diagnostic(
        code(highlight::aborted),
        help("Use the `Opaque` or `Ignore` illegal policy to keep going past anomalies.")
    )]
    Aborted {
        #[source_code]
        src: NamedSource<String>,
        #[label("{reason}")]
        span: SourceSpan,
        language: String,
        reason: String,
    },

    #[error("Could not read grammar file `{path}`: {message}")]
    #[diagnostic(code(highlight::grammar_file))]
    GrammarFile { path: String, message: String },
}

/// A problem detected while scanning. Anomalies never corrupt the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Byte offset into the tokenized input.
    pub offset: usize,
    pub len: usize,
    /// Label of the innermost mode when the anomaly was detected.
    pub mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnomalyKind {
    /// The innermost mode's illegal pattern matched.
    Illegal { lexeme: String },
    /// Input ended while modes were still open above the root.
    Unterminated { open_modes: usize },
    /// The configured step budget ran out.
    StepLimit { steps: usize },
    InputTooLarge { len: usize, limit: usize },
    /// A mode embeds a language the lookup could not provide.
    UnknownSubLanguage { language: String },
}

impl AnomalyKind {
    /// Whether this anomaly ends the run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StepLimit { .. } | Self::InputTooLarge { .. })
    }
}

impl Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnomalyKind::Illegal { lexeme } => write!(f, "illegal lexeme {lexeme:?}"),
            AnomalyKind::Unterminated { open_modes } => {
                write!(f, "input ended with {open_modes} unterminated mode(s)")
            }
            AnomalyKind::StepLimit { steps } => write!(f, "step limit of {steps} exceeded"),
            AnomalyKind::InputTooLarge { len, limit } => {
                write!(f, "input of {len} bytes exceeds the limit of {limit}")
            }
            AnomalyKind::UnknownSubLanguage { language } => {
                write!(f, "unknown sub-language `{language}`")
            }
        }
    }
}

impl Anomaly {
    /// 1-based line and column of the anomaly within `source`.
    #[must_use]
    pub fn line_and_column(&self, source: &str) -> (usize, usize) {
        get_line_and_column(source, self.offset)
    }

    /// Turns the anomaly into a diagnostic pointing into `source`.
    #[must_use]
    pub fn to_error(&self, source: &str, language: &str) -> HighlightError {
        let offset = self.offset.min(source.len());
        let len = self.len.min(source.len() - offset);
        HighlightError::Aborted {
            src: NamedSource::new(language.to_string(), source.to_string()),
            span: (offset, len).into(),
            language: language.to_string(),
            reason: self.kind.to_string(),
        }
    }
}

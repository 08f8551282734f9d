//! Declarative, mode-stack based tokenization for syntax highlighting.
//!
//! A [`Grammar`] is a tree of lexical modes, each with begin/end patterns, an
//! optional keyword table and the modes it may contain. The [`Tokenizer`] runs a
//! grammar over a source text and streams well-nested scope events to an
//! [`EventSink`]; [`highlight`] is the one-call entry point over a [`Registry`].

pub mod api;
pub mod common;
pub mod emitter;
pub mod error;
pub mod grammar;
pub mod keywords;
pub mod mode;
pub mod pattern;
pub mod registry;
pub mod relevance;
pub mod tokenizer;
pub mod utils;

pub use api::{highlight, load_grammar_file, Highlighted};
pub use emitter::{Event, EventSink, ScopedSpan, TokenStream};
pub use error::{Anomaly, AnomalyKind, GrammarError, HighlightError, ScopelexError};
pub use grammar::{Grammar, GrammarDef, ModeId};
pub use keywords::KeywordTableDef;
pub use mode::{Guard, GuardContext, KeywordsDef, ModeDef, ModeRef, PatternDef, ScopeDef};
pub use registry::{LanguageLookup, NoLanguages, Registry};
pub use tokenizer::{tokenize, tokenize_with, IllegalPolicy, Outcome, TokenizeOptions, Tokenized, Tokenizer};

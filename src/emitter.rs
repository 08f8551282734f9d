//! The boundary towards renderers.
//!
//! The tokenizer reports its output as a forward-only sequence of `open`, `text`
//! and `close` calls on an [`EventSink`]. The sequence is well nested and its text
//! spans cover the input exactly once, in order.

use serde::Serialize;
use std::ops::Range;

/// Scope that wraps the output of an embedded grammar.
pub const EMBEDDED_SCOPE_PREFIX: &str = "language:";

#[must_use]
pub fn embedded_scope(language: &str) -> String {
    format!("{EMBEDDED_SCOPE_PREFIX}{language}")
}

/// Receiver of tokenizer output.
pub trait EventSink {
    fn open(&mut self, scope: &str);
    /// `span` is a byte range of the tokenized input; `text` is that slice.
    fn text(&mut self, span: Range<usize>, text: &str);
    fn close(&mut self, scope: &str);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Open { scope: String },
    Text { start: usize, end: usize },
    Close { scope: String },
}

/// A fully collected event sequence. Adjacent text events are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TokenStream {
    events: Vec<Event>,
}

/// A run of text together with the scopes enclosing it, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedSpan<'s> {
    pub scopes: Vec<String>,
    pub text: &'s str,
    pub start: usize,
    pub end: usize,
}

impl ScopedSpan<'_> {
    #[must_use]
    pub fn innermost(&self) -> Option<&str> {
        self.scopes.last().map(String::as_str)
    }
}

impl TokenStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Concatenation of every text span. Equals the input for a complete run.
    #[must_use]
    pub fn text(&self, source: &str) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Text { start, end } => Some(&source[*start..*end]),
                _ => None,
            })
            .collect()
    }

    /// Every open has a later matching close and nothing closes out of order.
    #[must_use]
    pub fn is_well_nested(&self) -> bool {
        let mut open: Vec<&str> = Vec::new();
        for event in &self.events {
            match event {
                Event::Open { scope } => open.push(scope),
                Event::Close { scope } => {
                    if open.pop() != Some(scope.as_str()) {
                        return false;
                    }
                }
                Event::Text { .. } => {}
            }
        }
        open.is_empty()
    }

    /// Flattens the stream into text runs annotated with their scope stacks.
    #[must_use]
    pub fn spans<'s>(&self, source: &'s str) -> Vec<ScopedSpan<'s>> {
        let mut scopes: Vec<String> = Vec::new();
        let mut spans = Vec::new();
        for event in &self.events {
            match event {
                Event::Open { scope } => scopes.push(scope.clone()),
                Event::Close { .. } => {
                    scopes.pop();
                }
                Event::Text { start, end } => spans.push(ScopedSpan {
                    scopes: scopes.clone(),
                    text: &source[*start..*end],
                    start: *start,
                    end: *end,
                }),
            }
        }
        spans
    }

    /// Sends the collected events to another sink.
    pub fn replay(&self, source: &str, sink: &mut dyn EventSink) {
        for event in &self.events {
            match event {
                Event::Open { scope } => sink.open(scope),
                Event::Text { start, end } => sink.text(*start..*end, &source[*start..*end]),
                Event::Close { scope } => sink.close(scope),
            }
        }
    }
}

impl EventSink for TokenStream {
    fn open(&mut self, scope: &str) {
        self.events.push(Event::Open {
            scope: scope.to_string(),
        });
    }

    fn text(&mut self, span: Range<usize>, _text: &str) {
        if span.is_empty() {
            return;
        }
        if let Some(Event::Text { end, .. }) = self.events.last_mut() {
            if *end == span.start {
                *end = span.end;
                return;
            }
        }
        self.events.push(Event::Text {
            start: span.start,
            end: span.end,
        });
    }

    fn close(&mut self, scope: &str) {
        self.events.push(Event::Close {
            scope: scope.to_string(),
        });
    }
}

/// Forwards the events of a nested run: spans are shifted by `base` and every scope
/// gets the embedded language as a prefix (`xml:tag`).
pub(crate) struct EmbeddedSink<'a> {
    inner: &'a mut dyn EventSink,
    prefix: String,
    base: usize,
}

impl<'a> EmbeddedSink<'a> {
    pub(crate) fn new(inner: &'a mut dyn EventSink, language: &str, base: usize) -> Self {
        Self {
            inner,
            prefix: format!("{language}:"),
            base,
        }
    }
}

impl EventSink for EmbeddedSink<'_> {
    fn open(&mut self, scope: &str) {
        self.inner.open(&format!("{}{scope}", self.prefix));
    }

    fn text(&mut self, span: Range<usize>, text: &str) {
        self.inner
            .text(span.start + self.base..span.end + self.base, text);
    }

    fn close(&mut self, scope: &str) {
        self.inner.close(&format!("{}{scope}", self.prefix));
    }
}

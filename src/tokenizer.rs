//! The mode-stack tokenizer.
//!
//! A run keeps a stack of active modes over an immutable [`Grammar`]. Each step
//! looks, from the scan cursor, for the leftmost match among the top mode's end
//! pattern (and those of ancestors it ends with), its illegal pattern, and the begin
//! patterns of the modes it contains. Ties at the same offset go to the end
//! patterns, then the illegal pattern, then `contains` in declaration order.
//!
//! Text between matches is buffered and handed to the buffer's owning mode when
//! the next scope boundary is reached: embedded grammars tokenize it, keyword
//! tables classify it, anything else is emitted as plain text.
//!
//! Termination: the cursor never moves backwards, and a mode can be entered
//! without consuming input at most once per cursor position, so every run ends.

use crate::emitter::{embedded_scope, EmbeddedSink, EventSink, TokenStream};
use crate::error::{Anomaly, AnomalyKind};
use crate::grammar::{Grammar, LexemeScope, ModeId, Terminator};
use crate::keywords::KeywordTable;
use crate::mode::GuardContext;
use crate::pattern::{Found, Matcher};
use crate::registry::LanguageLookup;
use crate::relevance::RelevanceScorer;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Embedded grammars nested deeper than this are left as plain text.
const MAX_EMBED_DEPTH: usize = 16;

/// What to do when a mode's illegal pattern matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IllegalPolicy {
    /// Stop at the illegal lexeme. The stream ends there, with every scope closed.
    #[default]
    Abort,
    /// Treat the rest of the offending mode as plain content; only its end is sought.
    Opaque,
    /// Demote the illegal lexeme to plain content and keep scanning.
    Ignore,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizeOptions {
    pub illegal_policy: IllegalPolicy,
    /// Maximum number of scan steps before the run is abandoned.
    pub step_limit: Option<usize>,
    /// Inputs longer than this many bytes are rejected without scanning.
    pub max_input_len: Option<usize>,
}

/// Summary of a run whose events went to a caller-supplied sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub relevance: u32,
    pub anomalies: Vec<Anomaly>,
    /// Deepest stack reached, not counting the root mode.
    pub max_depth: usize,
    pub steps: usize,
    /// The run stopped before reaching the end of the input.
    pub aborted: bool,
}

/// A run collected into a [`TokenStream`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tokenized {
    pub stream: TokenStream,
    pub relevance: u32,
    pub anomalies: Vec<Anomaly>,
    pub max_depth: usize,
    pub aborted: bool,
}

/// Tokenizes `input` with default options.
#[must_use]
pub fn tokenize(input: &str, grammar: &Grammar, languages: &dyn LanguageLookup) -> Tokenized {
    tokenize_with(input, grammar, languages, TokenizeOptions::default())
}

#[must_use]
pub fn tokenize_with(
    input: &str,
    grammar: &Grammar,
    languages: &dyn LanguageLookup,
    options: TokenizeOptions,
) -> Tokenized {
    let mut stream = TokenStream::new();
    let outcome = Tokenizer::new(grammar, languages)
        .with_options(options)
        .run(input, &mut stream);
    Tokenized {
        stream,
        relevance: outcome.relevance,
        anomalies: outcome.anomalies,
        max_depth: outcome.max_depth,
        aborted: outcome.aborted,
    }
}

/// Runs a grammar over inputs. Holds no per-run state, so one tokenizer can serve
/// any number of runs.
pub struct Tokenizer<'g> {
    grammar: &'g Grammar,
    languages: &'g dyn LanguageLookup,
    options: TokenizeOptions,
}

impl<'g> Tokenizer<'g> {
    pub fn new(grammar: &'g Grammar, languages: &'g dyn LanguageLookup) -> Self {
        Self {
            grammar,
            languages,
            options: TokenizeOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TokenizeOptions) -> Self {
        self.options = options;
        self
    }

    /// Tokenizes `input`, streaming events into `sink`.
    pub fn run(&self, input: &str, sink: &mut dyn EventSink) -> Outcome {
        self.run_nested(input, sink, 0)
    }

    fn run_nested(&self, input: &str, sink: &mut dyn EventSink, embed_depth: usize) -> Outcome {
        if let Some(limit) = self.options.max_input_len {
            if input.len() > limit {
                debug!("refusing {} byte input for `{}`", input.len(), self.grammar.name());
                return Outcome {
                    anomalies: vec![Anomaly {
                        kind: AnomalyKind::InputTooLarge {
                            len: input.len(),
                            limit,
                        },
                        offset: 0,
                        len: 0,
                        mode: self.grammar.name().to_string(),
                    }],
                    aborted: true,
                    ..Outcome::default()
                };
            }
        }

        let mut scan = Scan {
            grammar: self.grammar,
            languages: self.languages,
            options: &self.options,
            input,
            sink,
            embed_depth,
            stack: vec![Frame {
                mode: self.grammar.root(),
                opened: false,
                opaque: false,
            }],
            cursor: 0,
            buffer_start: 0,
            scorer: RelevanceScorer::new(),
            anomalies: Vec::new(),
            cache: HashMap::new(),
            entered_at: 0,
            entered: Vec::new(),
            steps: 0,
            max_depth: 0,
            aborted: false,
            halted: false,
        };
        scan.execute();
        Outcome {
            relevance: scan.scorer.score(),
            anomalies: scan.anomalies,
            max_depth: scan.max_depth,
            steps: scan.steps,
            aborted: scan.aborted,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    mode: ModeId,
    /// An `open` event was emitted for this frame.
    opened: bool,
    /// An illegal match turned the rest of this mode into plain content.
    opaque: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    /// End pattern of the frame `depth` levels below the top.
    End { depth: usize },
    Illegal,
    Begin(ModeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Role {
    Begin,
    End,
    Illegal,
}

/// Result of the last search for one pattern.
struct Cached {
    from: usize,
    found: Option<Found>,
}

struct Scan<'g, 'i, 's> {
    grammar: &'g Grammar,
    languages: &'g dyn LanguageLookup,
    options: &'g TokenizeOptions,
    input: &'i str,
    sink: &'s mut dyn EventSink,
    embed_depth: usize,
    stack: Vec<Frame>,
    cursor: usize,
    /// Start of buffered text; the buffer is `buffer_start..cursor`.
    buffer_start: usize,
    scorer: RelevanceScorer,
    anomalies: Vec<Anomaly>,
    cache: HashMap<(ModeId, Role), Cached>,
    /// Modes entered at `entered_at` without consuming input.
    entered_at: usize,
    entered: Vec<ModeId>,
    steps: usize,
    max_depth: usize,
    aborted: bool,
    /// An embedded run stopped early; nothing past its last text may be emitted.
    halted: bool,
}

impl Scan<'_, '_, '_> {
    fn execute(&mut self) {
        loop {
            self.steps += 1;
            if let Some(limit) = self.options.step_limit {
                if self.steps > limit {
                    self.record(AnomalyKind::StepLimit { steps: limit }, self.cursor, 0);
                    self.abort();
                    return;
                }
            }

            let candidates = self.candidates();
            let Some((candidate, found)) = self.select(&candidates) else {
                self.finish_input();
                return;
            };

            self.cursor = found.start;
            match candidate {
                Candidate::End { depth } => self.end_mode(depth, &found),
                Candidate::Begin(id) => self.begin_mode(id, &found),
                Candidate::Illegal => {
                    if !self.illegal(&found) {
                        return;
                    }
                }
            }
            if self.halted {
                self.abort();
                return;
            }
        }
    }

    fn top(&self) -> Frame {
        self.stack[self.stack.len() - 1]
    }

    fn candidates(&self) -> Vec<Candidate> {
        let grammar = self.grammar;
        let top = self.top();
        let mode = grammar.mode(top.mode);
        let mut candidates = vec![Candidate::End { depth: 0 }];

        // The root never ends, so the chain stops below it.
        let mut depth = 0;
        while depth + 2 < self.stack.len()
            && grammar.mode(self.stack[self.stack.len() - 1 - depth].mode).ends_with_parent
        {
            depth += 1;
            candidates.push(Candidate::End { depth });
        }

        if top.opaque {
            return candidates;
        }
        if mode.illegal.is_some() {
            candidates.push(Candidate::Illegal);
        }
        candidates.extend(mode.contains.iter().map(|id| Candidate::Begin(*id)));
        candidates
    }

    fn search(&mut self, key: (ModeId, Role), matcher: &Matcher, from: usize) -> Option<Found> {
        if let Some(cached) = self.cache.get(&key) {
            if cached.from <= from {
                match &cached.found {
                    None => return None,
                    Some(found) if found.start >= from => return Some(found.clone()),
                    Some(_) => {}
                }
            }
        }
        let found = matcher.find_at(self.input, from);
        self.cache.insert(
            key,
            Cached {
                from,
                found: found.clone(),
            },
        );
        found
    }

    fn attempt(&mut self, candidate: Candidate, from: usize) -> Option<Found> {
        let grammar = self.grammar;
        match candidate {
            Candidate::End { depth } => {
                let id = self.stack[self.stack.len() - 1 - depth].mode;
                match &grammar.mode(id).end {
                    Terminator::Pattern(matcher) => self.search((id, Role::End), matcher, from),
                    Terminator::Immediate if depth == 0 && from <= self.input.len() => Some(Found {
                        start: from,
                        end: from,
                        groups: vec![Some((from, from))],
                    }),
                    Terminator::Immediate | Terminator::Never => None,
                }
            }
            Candidate::Illegal => {
                let id = self.top().mode;
                let matcher = grammar.mode(id).illegal.as_ref()?;
                self.search((id, Role::Illegal), matcher, from)
            }
            Candidate::Begin(id) => {
                let matcher = grammar.mode(id).begin.as_ref()?;
                self.search((id, Role::Begin), matcher, from)
            }
        }
    }

    /// Leftmost match among `candidates`, honouring guards.
    ///
    /// A vetoed begin match hands its position to the next candidate matching at the
    /// same offset. When none does, the position is demoted to plain content and the
    /// search resumes one character further.
    fn select(&mut self, candidates: &[Candidate]) -> Option<(Candidate, Found)> {
        let mut from = self.cursor;
        let mut vetoed: Vec<usize> = Vec::new();
        let mut veto_at: Option<usize> = None;

        loop {
            let mut best: Option<(usize, Found)> = None;
            for (index, candidate) in candidates.iter().enumerate() {
                let Some(found) = self.attempt(*candidate, from) else {
                    continue;
                };
                if veto_at == Some(found.start) && vetoed.contains(&index) {
                    continue;
                }
                if best.as_ref().map_or(true, |(_, current)| found.start < current.start) {
                    best = Some((index, found));
                }
            }

            let rejected = veto_at.filter(|at| best.as_ref().map_or(true, |(_, found)| found.start != *at));
            if let Some(at) = rejected {
                from = next_boundary(self.input, at);
                vetoed.clear();
                veto_at = None;
                continue;
            }
            let (index, found) = best?;

            let candidate = candidates[index];
            if let Candidate::Begin(id) = candidate {
                if !self.accepts(id, &found) {
                    trace!("begin of `{}` vetoed at {}", self.grammar.mode(id).label, found.start);
                    vetoed.push(index);
                    veto_at = Some(found.start);
                    continue;
                }
            }
            return Some((candidate, found));
        }
    }

    fn accepts(&self, id: ModeId, found: &Found) -> bool {
        let mode = self.grammar.mode(id);
        let consumes = !found.is_empty() && !mode.return_begin;
        if !consumes && self.entered_without_progress(id, found.start) {
            return false;
        }
        let ctx = GuardContext {
            input: self.input,
            found,
        };
        mode.guards.iter().all(|guard| guard.allows(&ctx))
    }

    fn entered_without_progress(&self, id: ModeId, at: usize) -> bool {
        self.entered_at == at && self.entered.contains(&id)
    }

    fn note_entry(&mut self, id: ModeId, at: usize) {
        if self.entered_at != at {
            self.entered_at = at;
            self.entered.clear();
        }
        self.entered.push(id);
    }

    fn begin_mode(&mut self, id: ModeId, found: &Found) {
        let grammar = self.grammar;
        let mode = grammar.mode(id);
        trace!("enter `{}` at {}", mode.label, found.start);

        if found.is_empty() || mode.return_begin {
            self.note_entry(id, found.start);
        }

        if mode.skip {
            if !mode.return_begin {
                self.cursor = found.end;
            }
            self.push(id, false);
            return;
        }

        if mode.exclude_begin {
            self.cursor = found.end;
            self.flush();
            let opened = self.open_scope(id);
            self.push(id, opened);
        } else {
            self.flush();
            let opened = self.open_scope(id);
            self.push(id, opened);
            if mode.return_begin {
                // The lexeme is scanned again inside the new mode.
            } else if mode.begin_scope == LexemeScope::Inherit && mode.sub_language.is_none() {
                self.cursor = found.end;
            } else {
                // Delimiters of an embedding mode never reach the embedded grammar.
                self.emit_lexeme(id, &mode.begin_scope, found);
                self.cursor = found.end;
                self.buffer_start = found.end;
            }
        }
        self.scorer.enter_mode(mode.relevance);
    }

    fn open_scope(&mut self, id: ModeId) -> bool {
        match &self.grammar.mode(id).scope {
            Some(scope) => {
                self.sink.open(scope);
                true
            }
            None => false,
        }
    }

    fn push(&mut self, id: ModeId, opened: bool) {
        self.stack.push(Frame {
            mode: id,
            opened,
            opaque: false,
        });
        self.max_depth = self.max_depth.max(self.stack.len() - 1);
    }

    /// Pops the top frame, closing its scope. Buffered text must already be flushed.
    fn pop(&mut self) -> Frame {
        let frame = self.top();
        if frame.opened {
            if let Some(scope) = &self.grammar.mode(frame.mode).scope {
                self.sink.close(scope);
            }
        }
        self.stack.pop();
        trace!("leave `{}` at {}", self.grammar.mode(frame.mode).label, self.cursor);
        frame
    }

    fn end_mode(&mut self, depth: usize, found: &Found) {
        let grammar = self.grammar;

        // Modes ending with an ancestor close first, without a lexeme of their own.
        if depth > 0 {
            self.flush();
            for _ in 0..depth {
                self.pop();
            }
        }

        let id = self.top().mode;
        let mode = grammar.mode(id);

        if mode.skip {
            if !mode.return_end {
                self.cursor = found.end;
            }
            self.stack.pop();
        } else if mode.end_scope != LexemeScope::Inherit {
            self.flush();
            self.emit_lexeme(id, &mode.end_scope, found);
            self.cursor = found.end;
            self.buffer_start = found.end;
            self.pop();
        } else if mode.exclude_end || mode.return_end {
            self.flush();
            self.pop();
        } else if mode.sub_language.is_some() {
            self.flush();
            self.emit_lexeme(id, &LexemeScope::Inherit, found);
            self.cursor = found.end;
            self.buffer_start = found.end;
            self.pop();
        } else {
            self.cursor = found.end;
            self.flush();
            self.pop();
        }

        let mut ended = id;
        while grammar.mode(ended).ends_parent && self.stack.len() > 1 {
            let frame = self.top();
            if !grammar.mode(frame.mode).skip {
                self.flush();
            }
            ended = self.pop().mode;
        }

        if mode.exclude_end && !mode.skip && mode.end_scope == LexemeScope::Inherit {
            // The lexeme becomes content of whatever mode is now on top.
            self.cursor = found.end;
        }

        // `starts` belongs to the outermost mode this match ended.
        if let Some(next) = grammar.mode(ended).starts {
            if !self.entered_without_progress(next, self.cursor) {
                self.note_entry(next, self.cursor);
                trace!("start `{}` at {}", grammar.mode(next).label, self.cursor);
                self.flush();
                let skip = grammar.mode(next).skip;
                let opened = !skip && self.open_scope(next);
                self.push(next, opened);
                if !skip {
                    self.scorer.enter_mode(grammar.mode(next).relevance);
                }
            }
        }
    }

    /// Handles an illegal match. Returns `false` when scanning must stop.
    fn illegal(&mut self, found: &Found) -> bool {
        let label = self.grammar.mode(self.top().mode).label.clone();
        debug!(
            "illegal lexeme at {} in `{}` ({:?})",
            found.start, label, self.options.illegal_policy
        );
        self.record(
            AnomalyKind::Illegal {
                lexeme: self.input[found.start..found.end].to_string(),
            },
            found.start,
            found.end - found.start,
        );

        match self.options.illegal_policy {
            IllegalPolicy::Abort => {
                self.abort();
                false
            }
            IllegalPolicy::Opaque => {
                if let Some(frame) = self.stack.last_mut() {
                    frame.opaque = true;
                }
                true
            }
            IllegalPolicy::Ignore if found.is_empty() && found.start >= self.input.len() => {
                self.finish_input();
                false
            }
            IllegalPolicy::Ignore => {
                self.cursor = if found.is_empty() {
                    next_boundary(self.input, found.start)
                } else {
                    found.end
                };
                true
            }
        }
    }

    fn record(&mut self, kind: AnomalyKind, offset: usize, len: usize) {
        let mode = self.grammar.mode(self.top().mode).label.clone();
        self.anomalies.push(Anomaly {
            kind,
            offset,
            len,
            mode,
        });
    }

    /// Closes every open scope after emitting what was scanned so far.
    fn abort(&mut self) {
        self.aborted = true;
        self.close_all();
    }

    fn close_all(&mut self) {
        while self.stack.len() > 1 {
            if !self.grammar.mode(self.top().mode).skip {
                self.flush();
            }
            self.pop();
        }
        self.flush();
    }

    fn finish_input(&mut self) {
        self.cursor = self.input.len();
        let open_modes = self.unterminated();
        if open_modes > 0 {
            self.record(AnomalyKind::Unterminated { open_modes }, self.input.len(), 0);
        }
        self.close_all();
        if self.halted {
            self.aborted = true;
        }
    }

    /// Open modes that still expected an end of their own. Modes that end with the
    /// root, directly or through a chain of such modes, end cleanly with the input.
    fn unterminated(&self) -> usize {
        let grammar = self.grammar;
        let closes_with_input = self.stack[1..]
            .iter()
            .take_while(|frame| grammar.mode(frame.mode).ends_with_parent)
            .count();
        self.stack.len() - 1 - closes_with_input
    }

    /// The mode that owns buffered text: the innermost frame that is not skipped.
    fn owner(&self) -> ModeId {
        self.stack
            .iter()
            .rev()
            .find(|frame| !self.grammar.mode(frame.mode).skip)
            .map_or(self.grammar.root(), |frame| frame.mode)
    }

    fn flush(&mut self) {
        let (start, end) = (self.buffer_start, self.cursor);
        self.buffer_start = self.cursor;
        if start >= end {
            return;
        }
        let owner = self.owner();
        let grammar = self.grammar;
        match &grammar.mode(owner).sub_language {
            Some(language) => self.embed(owner, language, start, end),
            None => self.emit_content(owner, start, end),
        }
    }

    /// Plain or keyword-classified text of `id`.
    fn emit_content(&mut self, id: ModeId, start: usize, end: usize) {
        let grammar = self.grammar;
        match &grammar.mode(id).keywords {
            Some(table) => self.emit_keywords(table, start, end),
            None => self.text(start, end),
        }
    }

    fn emit_keywords(&mut self, table: &KeywordTable, start: usize, end: usize) {
        let mut pos = start;
        let mut last = start;
        while pos < end {
            let Some(found) = table.lexeme().find_in(self.input, pos, end) else {
                break;
            };
            if found.is_empty() {
                pos = next_boundary(self.input, found.start);
                continue;
            }
            let word = &self.input[found.start..found.end];
            if let Some(class) = table.classify(word) {
                self.scorer.keyword(word, class.relevance);
                if !class.is_silent() {
                    self.text(last, found.start);
                    self.sink.open(class.category);
                    self.text(found.start, found.end);
                    self.sink.close(class.category);
                    last = found.end;
                }
            }
            pos = found.end;
        }
        self.text(last, end);
    }

    /// Emits a begin or end lexeme under its own scope assignment.
    fn emit_lexeme(&mut self, id: ModeId, scope: &LexemeScope, found: &Found) {
        match scope {
            LexemeScope::Inherit => self.emit_content(id, found.start, found.end),
            LexemeScope::Name(name) => {
                self.sink.open(name);
                self.text(found.start, found.end);
                self.sink.close(name);
            }
            LexemeScope::Groups(groups) => {
                let mut pos = found.start;
                for (group, label) in groups {
                    let Some((start, end)) = found.group(*group) else {
                        continue;
                    };
                    if start < pos || start == end || end > found.end {
                        continue;
                    }
                    self.emit_content(id, pos, start);
                    self.sink.open(label);
                    self.text(start, end);
                    self.sink.close(label);
                    pos = end;
                }
                self.emit_content(id, pos, found.end);
            }
        }
    }

    fn text(&mut self, start: usize, end: usize) {
        if start < end && !self.halted {
            self.sink.text(start..end, &self.input[start..end]);
        }
    }

    /// Hands `start..end` to the embedded grammar named `language`.
    fn embed(&mut self, owner: ModeId, language: &str, start: usize, end: usize) {
        if self.halted {
            return;
        }
        if self.embed_depth >= MAX_EMBED_DEPTH {
            self.text(start, end);
            return;
        }
        let languages = self.languages;
        let Some(grammar) = languages.lookup(language) else {
            warn!("sub-language `{language}` is not registered; emitting plain text");
            self.record(
                AnomalyKind::UnknownSubLanguage {
                    language: language.to_string(),
                },
                start,
                end - start,
            );
            self.text(start, end);
            return;
        };

        // Nested runs draw on what is left of this run's step budget.
        let step_limit = self.options.step_limit.map(|limit| limit.saturating_sub(self.steps));
        let nested = Tokenizer::new(grammar, languages).with_options(TokenizeOptions {
            illegal_policy: IllegalPolicy::Ignore,
            step_limit,
            max_input_len: None,
        });
        let wrapper = embedded_scope(language);
        self.sink.open(&wrapper);
        let outcome = {
            let mut embedded = EmbeddedSink::new(&mut *self.sink, language, start);
            nested.run_nested(&self.input[start..end], &mut embedded, self.embed_depth + 1)
        };
        self.sink.close(&wrapper);

        self.steps += outcome.steps;
        let limit = self.options.step_limit.unwrap_or(0);
        self.anomalies
            .extend(outcome.anomalies.into_iter().map(|anomaly| Anomaly {
                kind: match anomaly.kind {
                    AnomalyKind::StepLimit { .. } => AnomalyKind::StepLimit { steps: limit },
                    kind => kind,
                },
                offset: anomaly.offset + start,
                ..anomaly
            }));
        if outcome.aborted {
            debug!("embedded `{language}` run stopped inside {start}..{end}");
            self.halted = true;
        }
        if self.grammar.mode(owner).relevance > 0 {
            self.scorer.absorb(outcome.relevance);
        }
    }
}

/// Byte offset of the character boundary after `at`.
fn next_boundary(input: &str, at: usize) -> usize {
    input[at.min(input.len())..]
        .chars()
        .next()
        .map_or(at + 1, |c| at + c.len_utf8())
}

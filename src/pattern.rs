//! Regular-expression fragments and the combinators used to build grammar patterns.
//!
//! Patterns are kept as Oniguruma (Ruby syntax) source strings until a grammar is
//! loaded; every pattern is compiled exactly once at load time so that a broken
//! composition is reported before any input is scanned.

use crate::error::GrammarError;
use miette::NamedSource;
use onig::{Regex, RegexOptions, Region, SearchOptions, Syntax};
use std::fmt;

pub const IDENT_RE: &str = r"[a-zA-Z]\w*";
pub const UNDERSCORE_IDENT_RE: &str = r"[a-zA-Z_]\w*";
pub const NUMBER_RE: &str = r"\b\d+(\.\d+)?";
pub const C_NUMBER_RE: &str = r"(-?)(\b0[xX][a-fA-F0-9]+|(\b\d+(\.\d*)?|\.\d+)([eE][-+]?\d+)?)";
pub const BINARY_NUMBER_RE: &str = r"\b(0b[01]+)";
/// Tokens after which a `/` starts a regular expression literal rather than a division.
pub const RE_STARTERS_RE: &str = r"!|!=|!==|%|%=|&|&&|&=|\*|\*=|\+|\+=|,|-|-=|/=|/|:|;|<<|<<=|<=|<|===|==|=|>>>=|>>=|>=|>>>|>>|>|\?|\[|\{|\(|\^|\^=|\||\|=|\|\||~";
/// Never matches. Used where a mode must not have a terminator of its own.
pub const MATCH_NOTHING_RE: &str = r"\b\B";

/// Escapes every regex metacharacter in `literal`.
#[must_use]
pub fn escape(literal: &str) -> String {
    let mut out = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(
            c,
            '-' | '/' | '\\' | '^' | '$' | '*' | '+' | '?' | '.' | '(' | ')' | '|' | '[' | ']' | '{'
                | '}'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Plain concatenation. Group numbers of later fragments shift by the groups before them.
#[must_use]
pub fn concat<S: AsRef<str>>(parts: &[S]) -> String {
    parts.iter().map(AsRef::as_ref).collect()
}

/// Non-capturing alternation: `(?:a|b|c)`.
#[must_use]
pub fn either<S: AsRef<str>>(parts: &[S]) -> String {
    let joined: Vec<&str> = parts.iter().map(AsRef::as_ref).collect();
    format!("(?:{})", joined.join("|"))
}

#[must_use]
pub fn lookahead(pattern: &str) -> String {
    format!("(?={pattern})")
}

#[must_use]
pub fn negative_lookahead(pattern: &str) -> String {
    format!("(?!{pattern})")
}

/// Zero-width lookbehind. Oniguruma requires the body to have a bounded length.
#[must_use]
pub fn lookbehind(pattern: &str) -> String {
    format!("(?<={pattern})")
}

#[must_use]
pub fn optional(pattern: &str) -> String {
    format!("(?:{pattern})?")
}

#[must_use]
pub fn any_number_of_times(pattern: &str) -> String {
    format!("(?:{pattern})*")
}

#[must_use]
pub fn named(name: &str, pattern: &str) -> String {
    format!("(?<{name}>{pattern})")
}

/// Walks a pattern source, yielding structural elements that matter for group numbering.
enum Element {
    /// A capturing group opens (`(` or a named group).
    Group,
    /// A backreference `\N` spanning `len` bytes.
    Backref { number: usize, len: usize },
    /// Anything else, `len` bytes long.
    Other { len: usize },
}

fn next_element(rest: &str) -> Option<Element> {
    let mut chars = rest.char_indices();
    let (_, first) = chars.next()?;
    match first {
        '\\' => {
            let digits: String = rest[1..].chars().take_while(char::is_ascii_digit).collect();
            if !digits.is_empty() && !digits.starts_with('0') {
                let number = digits.parse().unwrap_or(0);
                return Some(Element::Backref {
                    number,
                    len: 1 + digits.len(),
                });
            }
            let escaped = rest[1..].chars().next().map_or(0, char::len_utf8);
            Some(Element::Other { len: 1 + escaped })
        }
        '[' => Some(Element::Other {
            len: class_len(rest),
        }),
        '(' => {
            let tail = &rest[1..];
            let captures = !tail.starts_with('?')
                || (tail.starts_with("?<") && !tail.starts_with("?<=") && !tail.starts_with("?<!"))
                || tail.starts_with("?P<")
                || tail.starts_with("?'");
            if captures {
                Some(Element::Group)
            } else {
                Some(Element::Other { len: 1 })
            }
        }
        c => Some(Element::Other { len: c.len_utf8() }),
    }
}

fn element_len(element: &Element) -> usize {
    match element {
        Element::Group => 1,
        Element::Backref { len, .. } | Element::Other { len } => *len,
    }
}

/// Byte length of the character class starting at `rest` (which begins with `[`),
/// including nested classes. An unterminated class runs to the end.
fn class_len(rest: &str) -> usize {
    let mut depth = 0usize;
    let mut iter = rest.char_indices().peekable();
    let mut first_in_class = false;
    while let Some((i, c)) = iter.next() {
        match c {
            '\\' => {
                iter.next();
            }
            '[' => {
                depth += 1;
                first_in_class = true;
                if let Some((_, '^')) = iter.peek() {
                    iter.next();
                }
                continue;
            }
            ']' if !first_in_class => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        first_in_class = false;
    }
    rest.len()
}

/// Number of capturing groups in `pattern`.
#[must_use]
pub fn count_groups(pattern: &str) -> usize {
    let mut count = 0;
    let mut pos = 0;
    while let Some(element) = next_element(&pattern[pos..]) {
        if matches!(element, Element::Group) {
            count += 1;
        }
        pos += element_len(&element);
    }
    count
}

/// Shifts every numeric backreference in `pattern` by `offset`.
#[must_use]
pub fn rewrite_backreferences(pattern: &str, offset: usize) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut pos = 0;
    while let Some(element) = next_element(&pattern[pos..]) {
        let len = element_len(&element);
        match element {
            Element::Backref { number, .. } => out.push_str(&format!("\\{}", number + offset)),
            _ => out.push_str(&pattern[pos..pos + len]),
        }
        pos += len;
    }
    out
}

/// Concatenates `pieces`, wrapping each in its own capturing group.
///
/// Returns the combined source and, for each piece, the number of the group that
/// wraps it. Backreferences inside a piece are renumbered so they keep pointing at
/// the piece's own groups.
#[must_use]
pub fn concat_groups<S: AsRef<str>>(pieces: &[S]) -> (String, Vec<usize>) {
    let mut source = String::new();
    let mut indices = Vec::with_capacity(pieces.len());
    let mut total = 0;
    for piece in pieces {
        let piece = piece.as_ref();
        let outer = total + 1;
        indices.push(outer);
        source.push('(');
        source.push_str(&rewrite_backreferences(piece, outer));
        source.push(')');
        total = outer + count_groups(piece);
    }
    (source, indices)
}

/// A successful search: whole-match bounds plus every group's bounds (index 0 is the match).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub start: usize,
    pub end: usize,
    pub groups: Vec<Option<(usize, usize)>>,
}

impl Found {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    #[must_use]
    pub fn group(&self, index: usize) -> Option<(usize, usize)> {
        self.groups.get(index).copied().flatten()
    }
}

/// A compiled pattern.
pub struct Matcher {
    source: String,
    regex: Regex,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.source).finish()
    }
}

impl Matcher {
    /// Compiles `source`. `^` and `$` are line anchors; `.` does not cross newlines.
    ///
    /// # Errors
    /// Returns the engine's error when the source is not a valid pattern.
    pub fn new(source: &str, case_insensitive: bool) -> Result<Self, onig::Error> {
        let mut options = RegexOptions::REGEX_OPTION_CAPTURE_GROUP;
        if case_insensitive {
            options |= RegexOptions::REGEX_OPTION_IGNORECASE;
        }
        let regex = Regex::with_options(source, options, Syntax::default())?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.regex.captures_len()
    }

    /// Leftmost match starting at or after `from`. Text before `from` stays visible
    /// to lookbehind and `\b`.
    #[must_use]
    pub fn find_at(&self, text: &str, from: usize) -> Option<Found> {
        if from > text.len() {
            return None;
        }
        let mut region = Region::new();
        self.regex.search_with_options(
            text,
            from,
            text.len(),
            SearchOptions::SEARCH_OPTION_NONE,
            Some(&mut region),
        )?;
        let groups: Vec<Option<(usize, usize)>> = (0..region.len()).map(|i| region.pos(i)).collect();
        let (start, end) = groups.first().copied().flatten()?;
        Some(Found { start, end, groups })
    }

    /// Like [`Matcher::find_at`], but the text is cut at `to`: the match can neither
    /// start nor end beyond it, and `$` and `\b` see `to` as the end of input.
    #[must_use]
    pub fn find_in(&self, text: &str, from: usize, to: usize) -> Option<Found> {
        self.find_at(&text[..to.min(text.len())], from)
    }

    /// Whether the pattern matches exactly at `at`.
    #[must_use]
    pub fn matches_at(&self, text: &str, at: usize) -> bool {
        at <= text.len()
            && self
                .regex
                .match_with_options(text, at, SearchOptions::SEARCH_OPTION_NONE, None)
                .is_some()
    }
}

/// Compiles a pattern on behalf of `mode`, reporting failures as load-time errors.
///
/// # Errors
/// Returns [`GrammarError::InvalidPattern`] when the source does not compile.
pub fn compile(source: &str, case_insensitive: bool, mode: &str) -> Result<Matcher, GrammarError> {
    Matcher::new(source, case_insensitive).map_err(|err| GrammarError::InvalidPattern {
        src: NamedSource::new(format!("{mode} pattern"), source.to_string()),
        span: (0, source.len()).into(),
        mode: mode.to_string(),
        message: err.description().to_string(),
    })
}

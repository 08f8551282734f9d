//! Declarative description of lexical modes.
//!
//! A [`ModeDef`] is plain data: it can be written as a Rust struct literal
//! (`ModeDef { scope: ..., ..Default::default() }`), built with the chained
//! helpers below, or deserialized from JSON/YAML. Nothing here is compiled;
//! see [`crate::grammar`] for the loader that turns definitions into an arena.

use crate::keywords::KeywordTableDef;
use crate::pattern::Found;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Reference name that makes a mode contain itself.
pub const SELF_REF: &str = "self";

/// A pattern, or a sequence of patterns matched back to back where each piece
/// becomes its own group for [`ScopeDef::Groups`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternDef {
    Single(String),
    Sequence(Vec<String>),
}

impl PatternDef {
    #[must_use]
    pub fn seq<S: AsRef<str>>(pieces: &[S]) -> Self {
        Self::Sequence(pieces.iter().map(|p| p.as_ref().to_string()).collect())
    }
}

impl From<&str> for PatternDef {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for PatternDef {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

/// A scope label, or 1-based group index → label assignments for compound matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeDef {
    Name(String),
    #[serde(deserialize_with = "group_labels")]
    Groups(BTreeMap<usize, String>),
}

/// Group maps keyed by integers (YAML) or by numeric strings (JSON object keys).
fn group_labels<'de, D>(deserializer: D) -> Result<BTreeMap<usize, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(PartialEq, Eq, PartialOrd, Ord)]
    struct GroupIndex(usize);

    struct IndexVisitor;

    impl Visitor<'_> for IndexVisitor {
        type Value = GroupIndex;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a group number")
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<GroupIndex, E> {
            usize::try_from(value)
                .map(GroupIndex)
                .map_err(|_| E::custom(format!("group number {value} is out of range")))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<GroupIndex, E> {
            usize::try_from(value)
                .map(GroupIndex)
                .map_err(|_| E::custom(format!("group number {value} is out of range")))
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<GroupIndex, E> {
            value
                .parse()
                .map(GroupIndex)
                .map_err(|_| E::custom(format!("`{value}` is not a group number")))
        }
    }

    impl<'de> Deserialize<'de> for GroupIndex {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(IndexVisitor)
        }
    }

    let labels = BTreeMap::<GroupIndex, String>::deserialize(deserializer)?;
    Ok(labels.into_iter().map(|(index, label)| (index.0, label)).collect())
}

impl ScopeDef {
    #[must_use]
    pub fn groups<S: AsRef<str>>(pairs: &[(usize, S)]) -> Self {
        Self::Groups(pairs.iter().map(|(i, s)| (*i, s.as_ref().to_string())).collect())
    }
}

impl From<&str> for ScopeDef {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

/// Where a mode takes its keyword table from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordsDef {
    /// The grammar's default table.
    Inherit,
    /// A space separated list classified as `keyword`.
    Words(String),
    Table(KeywordTableDef),
}

/// A child reference: a named mode from the grammar's table, `"self"`, or an
/// inline definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ModeRef {
    Named(String),
    Inline(Box<ModeDef>),
}

impl ModeRef {
    #[must_use]
    pub fn self_ref() -> Self {
        Self::Named(SELF_REF.to_string())
    }

    #[must_use]
    pub fn named(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<ModeDef> for ModeRef {
    fn from(value: ModeDef) -> Self {
        Self::Inline(Box::new(value))
    }
}

/// What a guard sees: the candidate match and the whole input around it.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub input: &'a str,
    pub found: &'a Found,
}

impl<'a> GuardContext<'a> {
    #[must_use]
    pub fn lexeme(&self) -> &'a str {
        &self.input[self.found.start..self.found.end]
    }

    #[must_use]
    pub fn start(&self) -> usize {
        self.found.start
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.found.end
    }

    #[must_use]
    pub fn before(&self) -> &'a str {
        &self.input[..self.found.start]
    }

    /// Input following the match.
    #[must_use]
    pub fn after(&self) -> &'a str {
        &self.input[self.found.end..]
    }

    #[must_use]
    pub fn group(&self, index: usize) -> Option<&'a str> {
        self.found
            .group(index)
            .map(|(start, end)| &self.input[start..end])
    }
}

type GuardFn = dyn Fn(&GuardContext<'_>) -> bool + Send + Sync;

/// Predicate run on a begin match; returning `false` vetoes it.
#[derive(Clone)]
pub struct Guard(Arc<GuardFn>);

impl Guard {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    #[must_use]
    pub fn allows(&self, ctx: &GuardContext<'_>) -> bool {
        (self.0)(ctx)
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Guard(..)")
    }
}

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// One lexical context.
///
/// A mode without `end` (and without `ends_with_parent`) closes right after its
/// begin match, which makes it a single-token rule. `match` is a synonym for
/// `begin` that documents this intent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModeDef {
    /// Name used in diagnostics.
    pub label: Option<String>,
    pub scope: Option<ScopeDef>,
    pub begin: Option<PatternDef>,
    #[serde(rename = "match")]
    pub match_: Option<PatternDef>,
    pub end: Option<PatternDef>,
    /// Space separated words that begin this mode; they also become its keywords.
    pub begin_keywords: Option<String>,
    pub begin_scope: Option<ScopeDef>,
    pub end_scope: Option<ScopeDef>,
    /// Mutually exclusive alternatives. Each inherits every other field of this mode.
    pub variants: Vec<ModeDef>,
    pub contains: Vec<ModeRef>,
    /// Mode entered, without consuming input, once this mode ends.
    pub starts: Option<Box<ModeRef>>,
    pub keywords: Option<KeywordsDef>,
    pub sub_language: Option<String>,
    /// Added to the relevance score on entry. Defaults to 1.
    pub relevance: Option<u32>,
    pub illegal: Option<String>,
    pub exclude_begin: bool,
    pub exclude_end: bool,
    pub return_begin: bool,
    pub return_end: bool,
    pub ends_with_parent: bool,
    pub ends_parent: bool,
    pub skip: bool,
    #[serde(skip)]
    pub guard: Option<Guard>,
}

impl ModeDef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    #[must_use]
    pub fn scope(mut self, scope: impl Into<ScopeDef>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn begin(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.begin = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn matching(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.match_ = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn end(mut self, pattern: impl Into<PatternDef>) -> Self {
        self.end = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn contains(mut self, children: Vec<ModeRef>) -> Self {
        self.contains = children;
        self
    }

    #[must_use]
    pub fn variants(mut self, variants: Vec<ModeDef>) -> Self {
        self.variants = variants;
        self
    }

    #[must_use]
    pub fn starts(mut self, mode: impl Into<ModeRef>) -> Self {
        self.starts = Some(Box::new(mode.into()));
        self
    }

    #[must_use]
    pub fn keywords(mut self, keywords: KeywordsDef) -> Self {
        self.keywords = Some(keywords);
        self
    }

    #[must_use]
    pub fn sub_language(mut self, language: &str) -> Self {
        self.sub_language = Some(language.to_string());
        self
    }

    #[must_use]
    pub fn relevance(mut self, relevance: u32) -> Self {
        self.relevance = Some(relevance);
        self
    }

    #[must_use]
    pub fn illegal(mut self, pattern: &str) -> Self {
        self.illegal = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Copy of `self` with the non-default fields of `overrides` applied on top.
    #[must_use]
    pub fn inherit(&self, overrides: ModeDef) -> ModeDef {
        let base = self.clone();
        ModeDef {
            label: overrides.label.or(base.label),
            scope: overrides.scope.or(base.scope),
            begin: overrides.begin.or(base.begin),
            match_: overrides.match_.or(base.match_),
            end: overrides.end.or(base.end),
            begin_keywords: overrides.begin_keywords.or(base.begin_keywords),
            begin_scope: overrides.begin_scope.or(base.begin_scope),
            end_scope: overrides.end_scope.or(base.end_scope),
            variants: if overrides.variants.is_empty() {
                base.variants
            } else {
                overrides.variants
            },
            contains: if overrides.contains.is_empty() {
                base.contains
            } else {
                overrides.contains
            },
            starts: overrides.starts.or(base.starts),
            keywords: overrides.keywords.or(base.keywords),
            sub_language: overrides.sub_language.or(base.sub_language),
            relevance: overrides.relevance.or(base.relevance),
            illegal: overrides.illegal.or(base.illegal),
            exclude_begin: overrides.exclude_begin || base.exclude_begin,
            exclude_end: overrides.exclude_end || base.exclude_end,
            return_begin: overrides.return_begin || base.return_begin,
            return_end: overrides.return_end || base.return_end,
            ends_with_parent: overrides.ends_with_parent || base.ends_with_parent,
            ends_parent: overrides.ends_parent || base.ends_parent,
            skip: overrides.skip || base.skip,
            guard: overrides.guard.or(base.guard),
        }
    }

    /// Best human-readable name for diagnostics.
    #[must_use]
    pub fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.scope {
            Some(ScopeDef::Name(name)) => name.clone(),
            _ => "<anonymous>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_mode_from_json() {
        let json = r#"{
            "scope": "string",
            "begin": "\"",
            "end": "\"",
            "contains": [ { "match": "\\\\." }, "self", "subst" ],
            "relevance": 0
        }"#;
        let mode: ModeDef = serde_json::from_str(json).unwrap();
        assert_eq!(mode.scope, Some(ScopeDef::Name("string".into())));
        assert_eq!(mode.relevance, Some(0));
        assert_eq!(mode.contains.len(), 3);
        assert_eq!(mode.contains[1], ModeRef::self_ref());
        assert_eq!(mode.contains[2], ModeRef::named("subst"));
        match &mode.contains[0] {
            ModeRef::Inline(child) => assert_eq!(child.match_, Some(PatternDef::from(r"\\."))),
            other => panic!("expected inline mode, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_group_scopes() {
        let json = r#"{
            "match": ["class", "\\s+", "[A-Z]\\w*"],
            "scope": { "1": "keyword", "3": "title.class" }
        }"#;
        let mode: ModeDef = serde_json::from_str(json).unwrap();
        assert_eq!(
            mode.scope,
            Some(ScopeDef::groups(&[(1, "keyword"), (3, "title.class")]))
        );
        assert!(matches!(mode.match_, Some(PatternDef::Sequence(ref p)) if p.len() == 3));
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let json = r#"{ "begn": "x" }"#;
        assert!(serde_json::from_str::<ModeDef>(json).is_err());
    }

    #[test]
    fn test_keywords_def_forms() {
        let inherit: KeywordsDef = serde_json::from_str(r#""inherit""#).unwrap();
        assert_eq!(inherit, KeywordsDef::Inherit);
        let words: KeywordsDef = serde_json::from_str(r#"{ "words": "return throw" }"#).unwrap();
        assert_eq!(words, KeywordsDef::Words("return throw".into()));
    }

    #[test]
    fn test_inherit_overrides_fields() {
        let base = ModeDef::new().scope("comment").begin("//").end("$").relevance(0);
        let derived = base.inherit(ModeDef::new().begin("#"));
        assert_eq!(derived.begin, Some(PatternDef::from("#")));
        assert_eq!(derived.end, Some(PatternDef::from("$")));
        assert_eq!(derived.relevance, Some(0));
        assert_eq!(derived.display_name(), "comment");
    }

    #[test]
    fn test_guard_context_views() {
        let found = Found {
            start: 2,
            end: 5,
            groups: vec![Some((2, 5)), Some((3, 4))],
        };
        let ctx = GuardContext {
            input: "a <b> c",
            found: &found,
        };
        assert_eq!(ctx.lexeme(), "<b>");
        assert_eq!(ctx.before(), "a ");
        assert_eq!(ctx.after(), " c");
        assert_eq!(ctx.group(1), Some("b"));
        assert_eq!(ctx.group(2), None);

        let guard = Guard::new(|ctx| !ctx.after().starts_with(' '));
        assert!(!guard.allows(&ctx));
    }
}

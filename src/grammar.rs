//! Grammar loading.
//!
//! Loading runs in two phases. First every named mode (and every variant of one)
//! gets a slot in the mode arena, so modes can refer to each other in any order and
//! even cyclically. Then each definition is compiled into its slot, with `contains`
//! and `starts` resolved to arena indices. Every pattern is compiled here; a grammar
//! that loads never fails to compile later.

use crate::error::GrammarError;
use crate::keywords::{KeywordTable, KeywordTableDef};
use crate::mode::{Guard, KeywordsDef, ModeDef, ModeRef, PatternDef, ScopeDef, SELF_REF};
use crate::pattern::{self, Matcher};
use log::debug;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Index of a mode inside its grammar's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModeId(usize);

impl ModeId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Structured description of a grammar.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrammarDef {
    pub name: String,
    pub aliases: Vec<String>,
    pub case_insensitive: bool,
    /// Keyword table of the root mode, and of every mode that inherits keywords.
    pub keywords: Option<KeywordTableDef>,
    pub illegal: Option<String>,
    pub contains: Vec<ModeRef>,
    /// Named modes that `contains` and `starts` may refer to by name.
    pub modes: BTreeMap<String, ModeDef>,
}

impl GrammarDef {
    /// # Errors
    /// Returns [`GrammarError::Definition`] when the JSON does not describe a grammar.
    pub fn from_json(source: &str) -> Result<Self, GrammarError> {
        serde_json::from_str(source).map_err(|err| GrammarError::Definition {
            format: "JSON",
            message: err.to_string(),
        })
    }

    /// # Errors
    /// Returns [`GrammarError::Definition`] when the YAML does not describe a grammar.
    pub fn from_yaml(source: &str) -> Result<Self, GrammarError> {
        serde_yaml::from_str(source).map_err(|err| GrammarError::Definition {
            format: "YAML",
            message: err.to_string(),
        })
    }
}

/// How the text of a begin or end lexeme is labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LexemeScope {
    /// Part of the enclosing content.
    Inherit,
    Name(String),
    /// (group number, label) pairs in group order.
    Groups(Vec<(usize, String)>),
}

/// How a mode finishes.
#[derive(Debug)]
pub(crate) enum Terminator {
    Pattern(Matcher),
    /// Closes right after the begin match.
    Immediate,
    /// Only an ancestor, a child with `ends_parent`, or the end of input closes it.
    Never,
}

/// A compiled mode.
#[derive(Debug)]
pub struct Mode {
    pub(crate) label: String,
    pub(crate) scope: Option<String>,
    pub(crate) begin: Option<Matcher>,
    pub(crate) begin_scope: LexemeScope,
    pub(crate) end: Terminator,
    pub(crate) end_scope: LexemeScope,
    pub(crate) illegal: Option<Matcher>,
    pub(crate) contains: Vec<ModeId>,
    pub(crate) starts: Option<ModeId>,
    pub(crate) keywords: Option<Arc<KeywordTable>>,
    pub(crate) sub_language: Option<String>,
    pub(crate) relevance: u32,
    pub(crate) guards: Vec<Guard>,
    pub(crate) exclude_begin: bool,
    pub(crate) exclude_end: bool,
    pub(crate) return_begin: bool,
    pub(crate) return_end: bool,
    pub(crate) ends_with_parent: bool,
    pub(crate) ends_parent: bool,
    pub(crate) skip: bool,
}

impl Mode {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    #[must_use]
    pub fn contains(&self) -> &[ModeId] {
        &self.contains
    }

    #[must_use]
    pub fn starts(&self) -> Option<ModeId> {
        self.starts
    }

    #[must_use]
    pub fn relevance(&self) -> u32 {
        self.relevance
    }

    #[must_use]
    pub fn sub_language(&self) -> Option<&str> {
        self.sub_language.as_deref()
    }
}

/// An immutable, loaded grammar. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Grammar {
    name: String,
    aliases: Vec<String>,
    case_insensitive: bool,
    modes: Vec<Mode>,
}

impl Grammar {
    /// Validates and compiles `def`.
    ///
    /// # Errors
    /// Any pattern that fails to compile, a dangling mode reference, a conflicting
    /// variant definition or an out-of-range group scope fails the whole load.
    pub fn load(def: GrammarDef) -> Result<Self, GrammarError> {
        let default_keywords = match &def.keywords {
            Some(table) => Some(Arc::new(KeywordTable::build(
                table,
                def.case_insensitive,
                &def.name,
            )?)),
            None => None,
        };

        let mut loader = Loader {
            case_insensitive: def.case_insensitive,
            named: HashMap::new(),
            slots: Vec::new(),
            default_keywords,
        };

        let root = loader.allocate();
        for (name, mode) in &def.modes {
            let count = mode.variants.len().max(1);
            let ids = (0..count).map(|_| loader.allocate()).collect();
            loader.named.insert(name.clone(), ids);
        }

        for (name, mode) in &def.modes {
            let ids = loader.named.get(name).cloned().unwrap_or_default();
            loader.compile_into(&ids, mode)?;
        }

        let root_def = ModeDef {
            label: Some(def.name.clone()),
            contains: def.contains.clone(),
            illegal: def.illegal.clone(),
            keywords: def.keywords.as_ref().map(|_| KeywordsDef::Inherit),
            relevance: Some(0),
            ..ModeDef::default()
        };
        let mut root_mode = loader.compile_mode(root, &root_def)?;
        root_mode.end = Terminator::Never;
        loader.slots[root.0] = Some(root_mode);

        let modes = loader
            .slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| GrammarError::UnknownMode {
                    name: format!("#{index}"),
                    referrer: def.name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("loaded grammar `{}` with {} modes", def.name, modes.len());

        Ok(Self {
            name: def.name,
            aliases: def.aliases,
            case_insensitive: def.case_insensitive,
            modes,
        })
    }

    /// # Errors
    /// Fails on malformed JSON or on any load-time error.
    pub fn from_json(source: &str) -> Result<Self, GrammarError> {
        Self::load(GrammarDef::from_json(source)?)
    }

    /// # Errors
    /// Fails on malformed YAML or on any load-time error.
    pub fn from_yaml(source: &str) -> Result<Self, GrammarError> {
        Self::load(GrammarDef::from_yaml(source)?)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    #[must_use]
    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    #[must_use]
    pub fn root(&self) -> ModeId {
        ModeId(0)
    }

    #[must_use]
    pub fn mode(&self, id: ModeId) -> &Mode {
        &self.modes[id.0]
    }

    #[must_use]
    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    /// Names of every language embedded by one of this grammar's modes.
    #[must_use]
    pub fn sub_languages(&self) -> BTreeSet<&str> {
        self.modes
            .iter()
            .filter_map(|mode| mode.sub_language.as_deref())
            .collect()
    }
}

struct Loader {
    case_insensitive: bool,
    named: HashMap<String, Vec<ModeId>>,
    slots: Vec<Option<Mode>>,
    default_keywords: Option<Arc<KeywordTable>>,
}

impl Loader {
    fn allocate(&mut self) -> ModeId {
        self.slots.push(None);
        ModeId(self.slots.len() - 1)
    }

    /// Compiles `def` into the pre-allocated `ids`, one per variant.
    fn compile_into(&mut self, ids: &[ModeId], def: &ModeDef) -> Result<(), GrammarError> {
        let expanded = expand_variants(def)?;
        for (id, variant) in ids.iter().zip(&expanded) {
            let mode = self.compile_mode(*id, variant)?;
            self.slots[id.0] = Some(mode);
        }
        Ok(())
    }

    fn compile_inline(&mut self, def: &ModeDef) -> Result<Vec<ModeId>, GrammarError> {
        let count = def.variants.len().max(1);
        let ids: Vec<ModeId> = (0..count).map(|_| self.allocate()).collect();
        self.compile_into(&ids, def)?;
        Ok(ids)
    }

    fn resolve(
        &mut self,
        reference: &ModeRef,
        this: ModeId,
        referrer: &str,
    ) -> Result<Vec<ModeId>, GrammarError> {
        match reference {
            ModeRef::Named(name) if name == SELF_REF => Ok(vec![this]),
            ModeRef::Named(name) => {
                self.named
                    .get(name)
                    .cloned()
                    .ok_or_else(|| GrammarError::UnknownMode {
                        name: name.clone(),
                        referrer: referrer.to_string(),
                    })
            }
            ModeRef::Inline(def) => self.compile_inline(def),
        }
    }

    fn compile_mode(&mut self, id: ModeId, def: &ModeDef) -> Result<Mode, GrammarError> {
        let label = def.display_name();
        let ci = self.case_insensitive;

        let has_pattern = def.begin.is_some() || def.match_.is_some();
        if def.begin.is_some() && def.match_.is_some() {
            return Err(conflict(&label, "defines both `begin` and `match`"));
        }
        if has_pattern && def.begin_keywords.is_some() {
            return Err(conflict(&label, "combines `begin_keywords` with a begin pattern"));
        }
        let begin_def = def
            .begin
            .clone()
            .or_else(|| def.match_.clone())
            .or_else(|| {
                def.begin_keywords
                    .as_deref()
                    .map(|words| PatternDef::Single(begin_keywords_pattern(words)))
            });

        let (scope, begin_scope_def) = match (&def.scope, &def.begin_scope) {
            (Some(ScopeDef::Groups(groups)), None) => (None, Some(ScopeDef::Groups(groups.clone()))),
            (Some(ScopeDef::Groups(_)), Some(explicit)) => (None, Some(explicit.clone())),
            (Some(ScopeDef::Name(name)), begin_scope) => (Some(name.clone()), begin_scope.clone()),
            (None, begin_scope) => (None, begin_scope.clone()),
        };

        let (begin, begin_scope) = match &begin_def {
            Some(pattern) => {
                let (matcher, scope) = compile_lexeme(pattern, begin_scope_def.as_ref(), ci, &label)?;
                (Some(matcher), scope)
            }
            None => (None, LexemeScope::Inherit),
        };

        let (end, end_scope) = match &def.end {
            Some(pattern) => {
                let (matcher, scope) = compile_lexeme(pattern, def.end_scope.as_ref(), ci, &label)?;
                (Terminator::Pattern(matcher), scope)
            }
            None if def.ends_with_parent => (Terminator::Never, LexemeScope::Inherit),
            None => (Terminator::Immediate, LexemeScope::Inherit),
        };

        let illegal = def
            .illegal
            .as_deref()
            .map(|source| pattern::compile(source, ci, &label))
            .transpose()?;

        let keywords = match (&def.keywords, &def.begin_keywords) {
            (Some(KeywordsDef::Inherit), _) => self.default_keywords.clone(),
            (Some(KeywordsDef::Words(words)), _) | (None, Some(words)) => Some(Arc::new(
                KeywordTable::build(&KeywordTableDef::keywords(words), ci, &label)?,
            )),
            (Some(KeywordsDef::Table(table)), _) => {
                Some(Arc::new(KeywordTable::build(table, ci, &label)?))
            }
            (None, None) => None,
        };

        let mut contains = Vec::with_capacity(def.contains.len());
        for child in &def.contains {
            contains.extend(self.resolve(child, id, &label)?);
        }

        let starts = match def.starts.as_deref() {
            Some(target) => {
                let ids = self.resolve(target, id, &label)?;
                match ids.as_slice() {
                    [single] => Some(*single),
                    _ => return Err(conflict(&label, "`starts` refers to a mode with variants")),
                }
            }
            None => None,
        };

        let mut guards: Vec<Guard> = def.guard.iter().cloned().collect();
        if def.begin_keywords.is_some() {
            guards.push(Guard::new(|ctx| !ctx.before().ends_with('.')));
        }

        let default_relevance = u32::from(def.begin_keywords.is_none());

        Ok(Mode {
            label,
            scope,
            begin,
            begin_scope,
            end,
            end_scope,
            illegal,
            contains,
            starts,
            keywords,
            sub_language: def.sub_language.clone(),
            relevance: def.relevance.unwrap_or(default_relevance),
            guards,
            exclude_begin: def.exclude_begin,
            exclude_end: def.exclude_end,
            return_begin: def.return_begin,
            return_end: def.return_end,
            ends_with_parent: def.ends_with_parent,
            ends_parent: def.ends_parent,
            skip: def.skip,
        })
    }
}

fn conflict(mode: &str, reason: &str) -> GrammarError {
    GrammarError::ConflictingVariants {
        mode: mode.to_string(),
        reason: reason.to_string(),
    }
}

/// One definition per variant, each inheriting the mode's shared fields.
fn expand_variants(def: &ModeDef) -> Result<Vec<ModeDef>, GrammarError> {
    if def.variants.is_empty() {
        return Ok(vec![def.clone()]);
    }
    let shared = ModeDef {
        variants: Vec::new(),
        ..def.clone()
    };
    def.variants
        .iter()
        .map(|variant| {
            if !variant.variants.is_empty() {
                return Err(conflict(&def.display_name(), "a variant declares variants of its own"));
            }
            Ok(shared.inherit(variant.clone()))
        })
        .collect()
}

fn begin_keywords_pattern(words: &str) -> String {
    let alternatives: Vec<String> = words.split_whitespace().map(pattern::escape).collect();
    format!(r"\b({})(?!\.)(?=\b|\s)", alternatives.join("|"))
}

fn compile_lexeme(
    def: &PatternDef,
    scope: Option<&ScopeDef>,
    case_insensitive: bool,
    mode: &str,
) -> Result<(Matcher, LexemeScope), GrammarError> {
    let (source, pieces) = match def {
        PatternDef::Single(source) => (source.clone(), None),
        PatternDef::Sequence(parts) => {
            let (source, indices) = pattern::concat_groups(parts);
            (source, Some(indices))
        }
    };
    let matcher = pattern::compile(&source, case_insensitive, mode)?;

    let scope = match scope {
        None => LexemeScope::Inherit,
        Some(ScopeDef::Name(name)) => LexemeScope::Name(name.clone()),
        Some(ScopeDef::Groups(groups)) => {
            let available = pieces.as_ref().map_or(matcher.group_count(), Vec::len);
            let mut resolved = Vec::with_capacity(groups.len());
            for (&index, label) in groups {
                if index == 0 || index > available {
                    return Err(GrammarError::InvalidScope {
                        mode: mode.to_string(),
                        index,
                        groups: available,
                    });
                }
                let group = pieces.as_ref().map_or(index, |p| p[index - 1]);
                resolved.push((group, label.clone()));
            }
            resolved.sort_by_key(|(group, _)| *group);
            LexemeScope::Groups(resolved)
        }
    };
    Ok((matcher, scope))
}

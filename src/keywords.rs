use crate::error::GrammarError;
use crate::pattern::{self, Matcher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Lexeme pattern used to cut mode content into candidate keywords when a table
/// does not declare its own.
pub const DEFAULT_KEYWORD_PATTERN: &str = r"\w+";

/// Words too common across languages to count towards relevance unless a weight is
/// given explicitly.
const COMMON_KEYWORDS: &[&str] = &[
    "of", "and", "for", "in", "not", "or", "if", "then", "parent", "list", "value",
];

/// Declarative keyword table: ordered categories of words.
///
/// A word may carry an explicit relevance with a `|N` suffix (`"yield|2"`). When a
/// word is listed in more than one category, the category declared **last** wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordTableDef {
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub categories: Vec<KeywordCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCategory {
    pub name: String,
    pub words: Vec<String>,
}

impl KeywordTableDef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a category. Words may be given one per entry or space separated.
    #[must_use]
    pub fn category<S: AsRef<str>>(mut self, name: &str, words: &[S]) -> Self {
        let words = words
            .iter()
            .flat_map(|w| w.as_ref().split_whitespace())
            .map(str::to_string)
            .collect();
        self.categories.push(KeywordCategory {
            name: name.to_string(),
            words,
        });
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: &str) -> Self {
        self.pattern = Some(pattern.to_string());
        self
    }

    /// A single `keyword` category from a space separated list.
    #[must_use]
    pub fn keywords(words: &str) -> Self {
        Self::new().category("keyword", &[words])
    }
}

/// The result of classifying one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub category: &'a str,
    pub relevance: u32,
}

impl Classification<'_> {
    /// Categories starting with `_` score relevance but emit no scope.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.category.starts_with('_')
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    category: usize,
    relevance: u32,
}

/// Compiled lookup from identifier text to category and relevance.
#[derive(Debug)]
pub struct KeywordTable {
    lexeme: Matcher,
    categories: Vec<String>,
    entries: HashMap<String, Entry>,
    case_insensitive: bool,
}

impl KeywordTable {
    /// Compiles `def`. Lookups fold case when `case_insensitive` is set.
    ///
    /// # Errors
    /// Fails when the lexeme pattern does not compile or a `|N` weight is not a number.
    pub fn build(def: &KeywordTableDef, case_insensitive: bool, mode: &str) -> Result<Self, GrammarError> {
        let lexeme_source = def.pattern.as_deref().unwrap_or(DEFAULT_KEYWORD_PATTERN);
        let lexeme = pattern::compile(lexeme_source, case_insensitive, mode)?;

        let mut categories = Vec::with_capacity(def.categories.len());
        let mut entries = HashMap::new();
        for (category, cat) in def.categories.iter().enumerate() {
            categories.push(cat.name.clone());
            for raw in &cat.words {
                let (word, relevance) = parse_word(raw, mode)?;
                let key = if case_insensitive {
                    word.to_lowercase()
                } else {
                    word.to_string()
                };
                entries.insert(key, Entry { category, relevance });
            }
        }

        Ok(Self {
            lexeme,
            categories,
            entries,
            case_insensitive,
        })
    }

    /// Pattern that extracts candidate words from mode content.
    #[must_use]
    pub fn lexeme(&self) -> &Matcher {
        &self.lexeme
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn classify(&self, word: &str) -> Option<Classification<'_>> {
        let entry = if self.case_insensitive {
            self.entries.get(&word.to_lowercase())
        } else {
            self.entries.get(word)
        }?;
        Some(Classification {
            category: &self.categories[entry.category],
            relevance: entry.relevance,
        })
    }
}

fn parse_word<'w>(raw: &'w str, mode: &str) -> Result<(&'w str, u32), GrammarError> {
    match raw.split_once('|') {
        Some((word, weight)) => {
            let relevance = weight.parse().map_err(|_| GrammarError::Definition {
                format: "keyword table",
                message: format!("keyword `{raw}` in mode `{mode}` has a non-numeric relevance"),
            })?;
            Ok((word, relevance))
        }
        None if COMMON_KEYWORDS.contains(&raw) => Ok((raw, 0)),
        None => Ok((raw, 1)),
    }
}

use crate::error::GrammarError;
use crate::grammar::Grammar;
use std::collections::HashMap;
use std::sync::Arc;

/// Resolves sub-language names to grammars during tokenization.
pub trait LanguageLookup {
    fn lookup(&self, name: &str) -> Option<&Grammar>;
}

/// A lookup that knows no languages. Embedded bodies then stay plain text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLanguages;

impl LanguageLookup for NoLanguages {
    fn lookup(&self, _name: &str) -> Option<&Grammar> {
        None
    }
}

impl LanguageLookup for HashMap<String, Arc<Grammar>> {
    fn lookup(&self, name: &str) -> Option<&Grammar> {
        self.get(name).map(AsRef::as_ref)
    }
}

/// Grammars by name and alias, both matched case-insensitively.
#[derive(Debug, Default)]
pub struct Registry {
    grammars: Vec<Arc<Grammar>>,
    by_name: HashMap<String, usize>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a grammar under its name and aliases. Later registrations override
    /// earlier ones that share a name or alias.
    pub fn register(&mut self, grammar: impl Into<Arc<Grammar>>) -> Arc<Grammar> {
        let grammar: Arc<Grammar> = grammar.into();
        let index = self.grammars.len();
        self.by_name.insert(grammar.name().to_lowercase(), index);
        for alias in grammar.aliases() {
            self.by_name.insert(alias.to_lowercase(), index);
        }
        self.grammars.push(Arc::clone(&grammar));
        grammar
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<Grammar>> {
        let index = self.by_name.get(&name.to_lowercase())?;
        self.grammars.get(*index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    /// Names of the grammars currently reachable by their own name.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .grammars
            .iter()
            .enumerate()
            .filter(|(index, grammar)| self.by_name.get(&grammar.name().to_lowercase()) == Some(index))
            .map(|(_, grammar)| grammar.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Checks that every embedded language of every registered grammar resolves.
    ///
    /// # Errors
    /// Returns the first [`GrammarError::UnknownSubLanguage`] found.
    pub fn validate(&self) -> Result<(), GrammarError> {
        for grammar in &self.grammars {
            for language in grammar.sub_languages() {
                if self.get(language).is_none() {
                    return Err(GrammarError::UnknownSubLanguage {
                        grammar: grammar.name().to_string(),
                        language: language.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl LanguageLookup for Registry {
    fn lookup(&self, name: &str) -> Option<&Grammar> {
        self.get(name).map(AsRef::as_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarDef;
    use crate::mode::ModeDef;

    fn grammar(name: &str, aliases: &[&str]) -> Grammar {
        Grammar::load(GrammarDef {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ..GrammarDef::default()
        })
        .unwrap()
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let mut registry = Registry::new();
        registry.register(grammar("JavaScript", &["js", "jsx"]));
        assert!(registry.get("javascript").is_some());
        assert!(registry.get("JSX").is_some());
        assert!(registry.lookup("js").is_some());
        assert!(registry.get("ts").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_later_registration_overrides() {
        let mut registry = Registry::new();
        registry.register(grammar("xml", &["html"]));
        registry.register(grammar("html", &[]));
        assert_eq!(registry.get("html").map(|g| g.name()), Some("html"));
        assert_eq!(registry.names(), vec!["html", "xml"]);
    }

    #[test]
    fn test_validate_reports_missing_sub_language() {
        let embedding = Grammar::load(GrammarDef {
            name: "outer".into(),
            contains: vec![ModeDef::new().begin("<%").end("%>").sub_language("ruby").into()],
            ..GrammarDef::default()
        })
        .unwrap();

        let mut registry = Registry::new();
        registry.register(embedding);
        match registry.validate() {
            Err(GrammarError::UnknownSubLanguage { grammar, language }) => {
                assert_eq!(grammar, "outer");
                assert_eq!(language, "ruby");
            }
            other => panic!("expected UnknownSubLanguage, got {other:?}"),
        }

        registry.register(grammar("ruby", &[]));
        assert!(registry.validate().is_ok());
    }

    #[test]
    fn test_no_languages() {
        assert!(NoLanguages.lookup("anything").is_none());
    }
}

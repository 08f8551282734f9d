use std::collections::HashMap;

/// A single keyword stops adding relevance after this many hits, so one repeated
/// word cannot dominate the score.
pub const MAX_KEYWORD_HITS: u32 = 7;

/// Running relevance of a tokenization. Purely observational: nothing in the
/// tokenizer reads it back to make decisions.
#[derive(Debug, Clone, Default)]
pub struct RelevanceScorer {
    score: u32,
    keyword_hits: HashMap<String, u32>,
}

impl RelevanceScorer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_mode(&mut self, weight: u32) {
        self.score = self.score.saturating_add(weight);
    }

    pub fn keyword(&mut self, word: &str, weight: u32) {
        let hits = self.keyword_hits.entry(word.to_string()).or_insert(0);
        *hits += 1;
        if *hits <= MAX_KEYWORD_HITS {
            self.score = self.score.saturating_add(weight);
        }
    }

    /// Folds in the score of an embedded run.
    pub fn absorb(&mut self, score: u32) {
        self.score = self.score.saturating_add(score);
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }
}

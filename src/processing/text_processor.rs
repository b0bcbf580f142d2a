//! Text normalization and lexical analysis shared by the deterministic stages

use std::collections::{HashMap, HashSet};
use unicode_segmentation::UnicodeSegmentation;

pub struct TextProcessor {
    stop_words: HashSet<String>,
}

impl Default for TextProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl TextProcessor {
    pub fn new() -> Self {
        Self {
            stop_words: Self::create_stop_words(),
        }
    }

    /// Tokenize text into lowercase content words using Unicode segmentation.
    /// Stop words and one-character fragments are dropped.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        for word in text.unicode_words() {
            let normalized = word.to_lowercase();

            if !self.stop_words.contains(&normalized) && normalized.len() > 1 {
                if normalized.chars().any(|c| c.is_alphabetic()) {
                    tokens.push(normalized);
                }
            }
        }

        tokens
    }

    /// Token set for overlap computations.
    pub fn token_set(&self, text: &str) -> HashSet<String> {
        self.tokenize(text).into_iter().collect()
    }

    /// Jaccard similarity over content-word sets.
    pub fn text_similarity(&self, text1: &str, text2: &str) -> f32 {
        let set1 = self.token_set(text1);
        let set2 = self.token_set(text2);

        let intersection = set1.intersection(&set2).count();
        let union = set1.union(&set2).count();

        if union == 0 {
            0.0
        } else {
            intersection as f32 / union as f32
        }
    }

    /// Overlap coefficient: intersection over the smaller set. Better suited
    /// than Jaccard when one side is a short pain-point phrase.
    pub fn overlap_coefficient(&self, text1: &str, text2: &str) -> f32 {
        let set1 = self.token_set(text1);
        let set2 = self.token_set(text2);

        let smaller = set1.len().min(set2.len());
        if smaller == 0 {
            return 0.0;
        }

        set1.intersection(&set2).count() as f32 / smaller as f32
    }

    /// Extract keywords by content-word frequency. Deterministic: frequency
    /// descending, then first appearance order.
    pub fn extract_keywords(&self, text: &str, max_keywords: usize) -> Vec<String> {
        let tokens = self.tokenize(text);
        let mut word_freq: HashMap<String, usize> = HashMap::new();
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (idx, token) in tokens.iter().enumerate() {
            if token.len() > 2 {
                *word_freq.entry(token.clone()).or_insert(0) += 1;
                first_seen.entry(token.clone()).or_insert(idx);
            }
        }

        let mut keywords: Vec<(String, usize)> = word_freq.into_iter().collect();
        keywords.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| first_seen[&a.0].cmp(&first_seen[&b.0])));

        keywords
            .into_iter()
            .take(max_keywords)
            .map(|(word, _)| word)
            .collect()
    }

    /// Count words the way the length budget does: whitespace-separated.
    pub fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn create_stop_words() -> HashSet<String> {
        let stop_words = [
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in",
            "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "this",
            "but", "they", "have", "had", "what", "which", "she", "do", "how", "their", "if",
            "up", "out", "then", "them", "these", "so", "some", "her", "would", "into", "him",
            "than", "been", "who", "now", "did", "may", "over", "new", "only", "very", "after",
            "our", "just", "also", "about", "more", "most", "such", "each", "between", "through",
            "during", "both", "while", "where", "within", "across", "per", "via", "using", "your",
            "you", "we", "or", "not", "all", "can", "when", "there", "other", "any",
        ];

        stop_words.iter().map(|&s| s.to_string()).collect()
    }
}

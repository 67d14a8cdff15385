//! Tokenization and BM25 lexical scoring.
//!
//! Chunks arrive with a token multiset (or have one derived by
//! [`tokenize`]). [`Bm25Index`] keeps per-chunk term frequencies plus the
//! corpus-wide document frequencies and average length, so a query can be
//! scored against any subset of the corpus with corpus-level IDF.
//!
//! # Scoring
//!
//! ```text
//! idf(t)      = ln(1 + (N - df(t) + 0.5) / (df(t) + 0.5))
//! score(d, q) = Σ_t idf(t) · tf(t,d)·(k1 + 1) / (tf(t,d) + k1·(1 - b + b·|d|/avgdl))
//! ```
//!
//! Query terms are de-duplicated before scoring.

use std::collections::{HashMap, HashSet};

/// Words too common to carry lexical signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "did", "do", "for", "from", "had", "has",
    "have", "i", "in", "is", "it", "its", "me", "my", "of", "on", "or", "so", "that", "the",
    "this", "to", "was", "we", "were", "what", "when", "which", "who", "with", "you",
];

/// Lowercase, split on non-alphanumerics, drop stopwords and 1-char tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Corpus statistics for BM25.
#[derive(Debug, Clone, Default)]
pub struct Bm25Index {
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<u32>,
    doc_freq: HashMap<String, u32>,
    avg_len: f64,
}

impl Bm25Index {
    /// Build from one token multiset per document, in store order.
    pub fn build<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a [String]>,
    {
        let mut term_freqs = Vec::new();
        let mut doc_lens = Vec::new();
        let mut doc_freq: HashMap<String, u32> = HashMap::new();

        for tokens in docs {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for t in tokens {
                *tf.entry(t.to_lowercase()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tokens.len() as u32);
            term_freqs.push(tf);
        }

        let total: u64 = doc_lens.iter().map(|&l| l as u64).sum();
        let avg_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f64 / doc_lens.len() as f64
        };

        Self {
            term_freqs,
            doc_lens,
            doc_freq,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    fn idf(&self, term: &str) -> f64 {
        let n = self.len() as f64;
        let df = self.doc_freq.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// BM25 score of document `doc` for the (already tokenized) query.
    pub fn score(&self, doc: usize, query_terms: &[String], k1: f64, b: f64) -> f64 {
        let Some(tf_map) = self.term_freqs.get(doc) else {
            return 0.0;
        };
        let dl = self.doc_lens[doc] as f64;
        let norm = if self.avg_len > 0.0 {
            1.0 - b + b * dl / self.avg_len
        } else {
            1.0
        };

        let mut seen = HashSet::new();
        let mut score = 0.0;
        for term in query_terms {
            let term = term.to_lowercase();
            if !seen.insert(term.clone()) {
                continue;
            }
            let tf = match tf_map.get(&term) {
                Some(&tf) if tf > 0 => tf as f64,
                _ => continue,
            };
            score += self.idf(&term) * tf * (k1 + 1.0) / (tf + k1 * norm);
        }
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        tokenize(s)
    }

    #[test]
    fn test_tokenize_drops_stopwords_and_punctuation() {
        assert_eq!(
            tokenize("What did I learn in 2020? Rust, mostly!"),
            vec!["learn", "2020", "rust", "mostly"]
        );
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("a I ?").is_empty());
    }

    #[test]
    fn test_score_zero_without_overlap() {
        let docs = vec![toks("rust ownership borrow"), toks("garden tomatoes")];
        let index = Bm25Index::build(docs.iter().map(|d| d.as_slice()));
        assert_eq!(index.score(1, &toks("rust"), 1.5, 0.75), 0.0);
        assert!(index.score(0, &toks("rust"), 1.5, 0.75) > 0.0);
    }

    #[test]
    fn test_rarer_term_scores_higher() {
        let docs = vec![
            toks("rust rust notes"),
            toks("rust notes"),
            toks("notes journal"),
            toks("python notes"),
        ];
        let index = Bm25Index::build(docs.iter().map(|d| d.as_slice()));
        let rare = index.score(3, &toks("python"), 1.5, 0.75);
        let common = index.score(2, &toks("notes"), 1.5, 0.75);
        assert!(rare > common, "rare={} common={}", rare, common);
    }

    #[test]
    fn test_duplicate_query_terms_count_once() {
        let docs = vec![toks("rust notes")];
        let index = Bm25Index::build(docs.iter().map(|d| d.as_slice()));
        let once = index.score(0, &toks("rust"), 1.5, 0.75);
        let twice = index.score(0, &toks("rust rust"), 1.5, 0.75);
        assert!((once - twice).abs() < 1e-12);
    }

    #[test]
    fn test_out_of_range_doc_scores_zero() {
        let index = Bm25Index::build(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.score(3, &toks("rust"), 1.5, 0.75), 0.0);
    }
}

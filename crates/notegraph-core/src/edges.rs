//! Typed relationship discovery between chunk pairs.
//!
//! Every pair whose cosine similarity clears the applicable threshold
//! (same-category or cross-category) is classified into exactly one of
//! seven [`EdgeType`]s. Pairs below the threshold are pruned silently.
//!
//! # Orientation
//!
//! An edge points from the earlier chunk to the later one. Chunks from the
//! same document are ordered by their position in it. Otherwise the order
//! is by year (undated chunks last), then document id, then position, then
//! chunk id. The classifier looks for markers in the *target* text, except
//! for `temporal_sequence`, which looks at the earlier chunk.
//!
//! # Precedence
//!
//! | # | Type | Rule |
//! |---|------|------|
//! | 1 | `elaborates` | same document, target strictly later in document order |
//! | 2 | `contradicts` | contrast marker in target, similarity ≥ `contradiction_min_similarity` |
//! | 3 | `causes` | causal marker in target |
//! | 4 | `supports` | reinforcement marker in target |
//! | 5 | `temporal_sequence` | years differ, earlier chunk has a temporal marker |
//! | 6 | `cross_domain` | categories differ |
//! | 7 | `same_topic` | fallback |
//!
//! The first matching rule wins. Because different-category pairs are only
//! admitted at or above the cross-domain threshold and same-category pairs at
//! or above the same-domain threshold, rules 6 and 7 between them cover every
//! admitted pair: classification is total.
//!
//! Discovery is pure and pairwise, so [`discover_edges`] fans the pair space
//! out over scoped threads and sorts the union for a deterministic result.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::config::GraphConfig;
use crate::embedding::cosine_with_norms;
use crate::error::Error;
use crate::models::Chunk;
use crate::store::ChunkStore;

const CONTRAST_MARKERS: &[&str] = &["however", "but", "although"];
const CAUSAL_MARKERS: &[&str] = &["because", "therefore", "led to"];
const SUPPORT_MARKERS: &[&str] = &["confirms", "agrees", "validates"];
const TEMPORAL_MARKERS: &[&str] = &["later", "since then", "eventually"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Elaborates,
    Contradicts,
    Causes,
    Supports,
    TemporalSequence,
    CrossDomain,
    SameTopic,
}

impl EdgeType {
    pub const ALL: [EdgeType; 7] = [
        EdgeType::Elaborates,
        EdgeType::Contradicts,
        EdgeType::Causes,
        EdgeType::Supports,
        EdgeType::TemporalSequence,
        EdgeType::CrossDomain,
        EdgeType::SameTopic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Elaborates => "elaborates",
            EdgeType::Contradicts => "contradicts",
            EdgeType::Causes => "causes",
            EdgeType::Supports => "supports",
            EdgeType::TemporalSequence => "temporal_sequence",
            EdgeType::CrossDomain => "cross_domain",
            EdgeType::SameTopic => "same_topic",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::validation("edge_type", format!("unknown edge type '{}'", s)))
    }
}

/// A typed, weighted relation between two chunks, by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    /// The pair's cosine similarity, unmodified.
    pub weight: f32,
}

/// Which markers a chunk's text carries. Computed once per chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarkerSignals {
    pub contrast: bool,
    pub causal: bool,
    pub support: bool,
    pub temporal: bool,
}

impl MarkerSignals {
    pub fn of(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Self {
            contrast: has_any(&words, CONTRAST_MARKERS),
            causal: has_any(&words, CAUSAL_MARKERS),
            support: has_any(&words, SUPPORT_MARKERS),
            temporal: has_any(&words, TEMPORAL_MARKERS),
        }
    }
}

/// Whole-word (or whole-phrase) match, so "but" does not fire on "butter".
fn has_any(words: &[&str], markers: &[&str]) -> bool {
    markers.iter().any(|marker| {
        let phrase: Vec<&str> = marker.split(' ').collect();
        words.windows(phrase.len()).any(|w| w == phrase.as_slice())
    })
}

/// Whether `a` precedes `b`, making `a` the edge source.
fn orient(a: &Chunk, b: &Chunk) -> bool {
    let ord = if a.document_id == b.document_id {
        a.doc_order
            .cmp(&b.doc_order)
            .then_with(|| a.id.cmp(&b.id))
    } else {
        let ya = a.year.unwrap_or(i32::MAX);
        let yb = b.year.unwrap_or(i32::MAX);
        ya.cmp(&yb)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.doc_order.cmp(&b.doc_order))
            .then_with(|| a.id.cmp(&b.id))
    };
    ord != Ordering::Greater
}

/// Classifies chunk pairs under a fixed [`GraphConfig`].
#[derive(Debug, Clone)]
pub struct EdgeClassifier {
    config: GraphConfig,
}

impl EdgeClassifier {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    /// Threshold applicable to the pair, by category agreement.
    pub fn threshold(&self, a: &Chunk, b: &Chunk) -> f32 {
        if a.category == b.category {
            self.config.same_domain_threshold
        } else {
            self.config.cross_domain_threshold
        }
    }

    /// Classify a pair. Returns `None` when the pair is pruned.
    pub fn classify(&self, a: &Chunk, b: &Chunk, similarity: f32) -> Option<Edge> {
        self.classify_with_signals(
            a,
            &MarkerSignals::of(&a.text),
            b,
            &MarkerSignals::of(&b.text),
            similarity,
        )
    }

    /// [`classify`](Self::classify) with marker signals supplied by the caller.
    pub fn classify_with_signals(
        &self,
        a: &Chunk,
        sig_a: &MarkerSignals,
        b: &Chunk,
        sig_b: &MarkerSignals,
        similarity: f32,
    ) -> Option<Edge> {
        // NaN compares false and is pruned here too.
        if !(similarity >= self.threshold(a, b)) {
            return None;
        }

        let (src, src_sig, tgt, tgt_sig) = if orient(a, b) {
            (a, sig_a, b, sig_b)
        } else {
            (b, sig_b, a, sig_a)
        };

        let edge_type = self.edge_type(src, src_sig, tgt, tgt_sig, similarity);

        Some(Edge {
            source: src.id.clone(),
            target: tgt.id.clone(),
            edge_type,
            weight: similarity,
        })
    }

    fn edge_type(
        &self,
        src: &Chunk,
        src_sig: &MarkerSignals,
        tgt: &Chunk,
        tgt_sig: &MarkerSignals,
        similarity: f32,
    ) -> EdgeType {
        if src.document_id == tgt.document_id && tgt.doc_order > src.doc_order {
            return EdgeType::Elaborates;
        }
        if tgt_sig.contrast && similarity >= self.config.contradiction_min_similarity {
            return EdgeType::Contradicts;
        }
        if tgt_sig.causal {
            return EdgeType::Causes;
        }
        if tgt_sig.support {
            return EdgeType::Supports;
        }
        if let (Some(ys), Some(yt)) = (src.year, tgt.year) {
            if ys != yt {
                let earlier = if ys < yt { src_sig } else { tgt_sig };
                if earlier.temporal {
                    return EdgeType::TemporalSequence;
                }
            }
        }
        if src.category != tgt.category {
            return EdgeType::CrossDomain;
        }
        EdgeType::SameTopic
    }
}

/// Evaluate every chunk pair in the store and return the emitted edges,
/// sorted by `(source, target)`.
pub fn discover_edges(store: &ChunkStore, config: &GraphConfig) -> Vec<Edge> {
    let n = store.len();
    if n < 2 {
        return Vec::new();
    }

    let classifier = EdgeClassifier::new(config.clone());
    let signals: Vec<MarkerSignals> = store
        .chunks()
        .iter()
        .map(|c| MarkerSignals::of(&c.text))
        .collect();

    let workers = match config.parallelism {
        0 => std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
        p => p,
    }
    .clamp(1, n - 1);

    // Row i owns the pairs (i, j > i); rows are dealt round-robin so the
    // long early rows spread across workers.
    let scan_rows = |worker: usize| -> Vec<Edge> {
        let mut out = Vec::new();
        for i in (worker..n - 1).step_by(workers) {
            let a = store.get(i);
            for j in (i + 1)..n {
                let b = store.get(j);
                let sim = cosine_with_norms(&a.vector, store.norm(i), &b.vector, store.norm(j));
                if let Some(edge) =
                    classifier.classify_with_signals(a, &signals[i], b, &signals[j], sim)
                {
                    out.push(edge);
                }
            }
        }
        out
    };

    let mut edges: Vec<Edge> = if workers == 1 {
        scan_rows(0)
    } else {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let scan_rows = &scan_rows;
                    scope.spawn(move || scan_rows(w))
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    };

    edges.sort_by(|a, b| a.source.cmp(&b.source).then_with(|| a.target.cmp(&b.target)));
    edges
}

//! Core data models: chunks and the fixed category set.
//!
//! A [`Chunk`] is the immutable unit of retrievable text produced by the
//! document-processing stage. A [`ChunkRecord`] is the same thing as it
//! arrives on the wire, before vectors and tokens have been filled in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The enumerated categories a chunk can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Ai,
    Personal,
    Work,
    Learning,
    Health,
    Finance,
    Creative,
    Travel,
    Other,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::Ai,
        Category::Personal,
        Category::Work,
        Category::Learning,
        Category::Health,
        Category::Finance,
        Category::Creative,
        Category::Travel,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ai => "ai",
            Category::Personal => "personal",
            Category::Work => "work",
            Category::Learning => "learning",
            Category::Health => "health",
            Category::Finance => "finance",
            Category::Creative => "creative",
            Category::Travel => "travel",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == needle)
            .ok_or_else(|| {
                Error::validation(
                    "category",
                    format!(
                        "unknown category '{}'. Must be one of: {}",
                        s,
                        Category::ALL.map(|c| c.as_str()).join(", ")
                    ),
                )
            })
    }
}

/// An immutable chunk as held by the [`ChunkStore`](crate::store::ChunkStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Source document the chunk was cut from.
    pub document_id: String,
    /// Position of the chunk within its source document.
    pub doc_order: u32,
    pub text: String,
    pub year: Option<i32>,
    pub category: Category,
    pub vector: Vec<f32>,
    /// Lexical token multiset (duplicates are significant).
    pub tokens: Vec<String>,
    /// Optional source reliability in `[0, 1]`.
    pub trust: Option<f32>,
}

/// A chunk as delivered by document processing (one JSON object per line).
///
/// `vector` and `tokens` may be omitted; the application embeds missing
/// vectors and [`lexical::tokenize`](crate::lexical::tokenize) derives
/// missing tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub doc_order: u32,
    pub text: String,
    #[serde(default)]
    pub year: Option<i32>,
    pub category: Category,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub tokens: Option<Vec<String>>,
    #[serde(default)]
    pub trust: Option<f32>,
}

impl ChunkRecord {
    /// Finish the record with a vector, deriving tokens when absent.
    pub fn into_chunk(self, vector: Vec<f32>) -> Chunk {
        let tokens = self
            .tokens
            .unwrap_or_else(|| crate::lexical::tokenize(&self.text));
        Chunk {
            id: self.id,
            document_id: self.document_id,
            doc_order: self.doc_order,
            text: self.text,
            year: self.year,
            category: self.category,
            vector,
            tokens,
            trust: self.trust.map(|t| t.clamp(0.0, 1.0)),
        }
    }
}

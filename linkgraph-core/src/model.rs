use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A crawled page, keyed by URL with a surrogate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: Uuid,
    pub url: String,
    /// Unix seconds of the latest retrieval ever reported for this URL.
    pub retrieved_at: i64,
}

impl Link {
    pub fn new(url: impl Into<String>, retrieved_at: i64) -> Self {
        Self {
            id: Uuid::nil(),
            url: url.into(),
            retrieved_at,
        }
    }
}

/// A directed hyperlink between two links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: Uuid,
    pub src: Uuid,
    pub dst: Uuid,
    /// Unix seconds of the last time a crawl confirmed this edge.
    pub updated_at: i64,
}

impl Edge {
    pub fn new(src: Uuid, dst: Uuid) -> Self {
        Self {
            id: Uuid::nil(),
            src,
            dst,
            updated_at: 0,
        }
    }
}

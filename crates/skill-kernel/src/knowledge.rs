//! `KnowledgeStore` collaborator (§6): an external, opaque lookup surface
//! the Router consults for the `harvested_insight` domain. Concrete stores
//! (a notes app, a vector DB of past runs, ...) are out of scope for the
//! core; this module only defines the contract plus a deterministic stub
//! for tests.

use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct KnowledgeEntry {
    pub title: String,
    pub content: String,
    pub score: f32,
    pub metadata: std::collections::HashMap<String, String>,
}

/// `lookup(query, domain, k) -> [{ title, content, score, metadata }]` (§6).
/// The core only ever asks for `domain = "harvested_insight"`; the trait
/// stays domain-generic so a single collaborator can back multiple callers.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn lookup(&self, query: &str, domain: &str, k: usize) -> anyhow::Result<Vec<KnowledgeEntry>>;
}

/// The domain the Router consults (§4.J step 1).
pub const HARVESTED_INSIGHT_DOMAIN: &str = "harvested_insight";

/// A `KnowledgeStore` with nothing in it; the correct default when no
/// external collaborator is wired in, since `lookup` returning `[]` is
/// already a valid response the Router's prompt assembly handles.
pub struct EmptyKnowledgeStore;

#[async_trait]
impl KnowledgeStore for EmptyKnowledgeStore {
    async fn lookup(&self, _query: &str, _domain: &str, _k: usize) -> anyhow::Result<Vec<KnowledgeEntry>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_returns_no_entries() {
        let store = EmptyKnowledgeStore;
        let entries = store.lookup("anything", HARVESTED_INSIGHT_DOMAIN, 3).await.unwrap();
        assert!(entries.is_empty());
    }
}

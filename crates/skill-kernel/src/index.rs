//! The Holographic Index (§4.E): a hybrid vector + BM25 retrieval surface
//! over `ToolEntry`s, combined by weighted-sum fusion (α=0.6 dense /
//! 0.4 sparse, per the Open Question decision recorded in DESIGN.md).
//!
//! Grounded on `vector_store::VectorStore` (dense) and `search::BM25Index`
//! (sparse), both carried over from the teacher unchanged; this module is
//! the new composition layer the teacher never had, since its dense and
//! sparse sides were wired together ad hoc inside a larger search pipeline.

use crate::errors::{KernelError, Result};
use crate::inference::Inference;
use crate::search::{weighted_sum_fusion, BM25Config, BM25Index};
use crate::types::ToolEntry;
use crate::vector_store::{DocumentMetadata, EmbeddedDocument, Filter, VectorStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Dense-side weight in the fusion formula; sparse gets `1.0 - ALPHA`.
pub const ALPHA: f32 = 0.6;

#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub skill_name: String,
    pub command_name: String,
    pub score: f32,
}

/// Counts from the startup/periodic reconciliation pass (§4.E: "the index
/// can drift from the registry's live set — entries for unloaded skills,
/// missing entries for loaded ones").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub reindexed: usize,
}

/// Combines a dense [`VectorStore`] and a sparse [`BM25Index`] into one
/// retrieval surface keyed by `ToolEntry::id()` (`"skill.command"`).
///
/// The BM25 side is wrapped in a `Mutex` because `tantivy`'s `IndexWriter`
/// requires `&mut self` for mutation; the vector side is already
/// internally synchronized (`VectorStore: Send + Sync` with `&self`
/// methods).
pub struct HolographicIndex {
    vectors: Arc<dyn VectorStore>,
    bm25: Mutex<BM25Index>,
    inference: Arc<dyn Inference>,
    /// `ToolEntry::id()` -> blake3 hash of the last-indexed `semantic_text`,
    /// so `reconcile` can tell "unchanged, skip" from "content drifted,
    /// re-embed" instead of only tracking presence/absence (§10.6).
    checksums: Mutex<HashMap<String, String>>,
}

impl HolographicIndex {
    pub fn new(vectors: Arc<dyn VectorStore>, inference: Arc<dyn Inference>) -> Result<Self> {
        let bm25 = BM25Index::new(BM25Config::in_memory())
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        Ok(Self { vectors, bm25: Mutex::new(bm25), inference, checksums: Mutex::new(HashMap::new()) })
    }

    pub fn with_bm25_dir(
        vectors: Arc<dyn VectorStore>,
        inference: Arc<dyn Inference>,
        dir: impl Into<std::path::PathBuf>,
    ) -> Result<Self> {
        let bm25 = BM25Index::new(BM25Config::persistent(dir))
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        Ok(Self { vectors, bm25: Mutex::new(bm25), inference, checksums: Mutex::new(HashMap::new()) })
    }

    /// Insert or replace a tool entry in both sides of the index (§4.E
    /// upsert). Embeds `entry.semantic_text` via `Inference.embed`.
    pub async fn upsert(&self, entry: &ToolEntry) -> Result<()> {
        let embedding = self
            .inference
            .embed(&[entry.semantic_text.clone()])
            .await?
            .pop()
            .ok_or_else(|| KernelError::IndexUnavailable("embed returned no vector".into()))?;

        let metadata = DocumentMetadata {
            skill_name: Some(entry.skill_name.clone()),
            tool_name: Some(entry.command_name.clone()),
            ..Default::default()
        };
        let doc = EmbeddedDocument::with_metadata(entry.id(), embedding, metadata)
            .with_content(entry.semantic_text.clone());

        self.vectors
            .upsert(vec![doc])
            .await
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;

        let mut bm25 = self.bm25.lock().await;
        bm25.upsert_document(
            &entry.id(),
            &entry.command_name,
            &entry.skill_name,
            &entry.semantic_text,
            &entry.semantic_text,
        )
        .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        bm25.commit().map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;

        self.checksums.lock().await.insert(entry.id(), content_hash(&entry.semantic_text));

        Ok(())
    }

    /// Remove every command belonging to `skill_name` (§4.C: unload fans
    /// out to an index delete). Idempotent: absent entries are not an error.
    pub async fn delete_skill(&self, skill_name: &str) -> Result<()> {
        let ids = self.ids_for_skill(skill_name).await?;
        self.delete_ids(&ids).await
    }

    async fn delete_ids(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.vectors
            .delete(ids.to_vec())
            .await
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;

        let mut bm25 = self.bm25.lock().await;
        for id in ids {
            bm25.delete_document(id).map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        }
        bm25.commit().map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        drop(bm25);

        let mut checksums = self.checksums.lock().await;
        for id in ids {
            checksums.remove(id);
        }
        Ok(())
    }

    async fn ids_for_skill(&self, skill_name: &str) -> Result<Vec<String>> {
        let filter = Filter::new().skill(skill_name);
        let matches = self
            .vectors
            .count(Some(filter.clone()))
            .await
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        if matches == 0 {
            return Ok(Vec::new());
        }
        // VectorStore has no list-by-filter primitive; a zero-vector probe
        // search with a large top_k recovers matching ids without needing
        // a real query embedding.
        let dims = self.inference.embedding_dimensions().unwrap_or(1).max(1);
        let probe = self
            .vectors
            .search(vec![0.0; dims], Some(filter), matches)
            .await
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?;
        Ok(probe.into_iter().map(|r| r.id).collect())
    }

    /// Hybrid search: embed `query`, run dense + sparse retrieval, fuse by
    /// weighted sum with `ALPHA` dense weight, return the top `top_k`
    /// `(skill, command, score)` triples (§4.E, §4.J step 2).
    pub async fn search_hybrid(&self, query: &str, top_k: usize) -> Result<Vec<HybridSearchResult>> {
        let query_embedding = self
            .inference
            .embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| KernelError::IndexUnavailable("embed returned no vector".into()))?;

        let dense = self
            .vectors
            .search(query_embedding, None, top_k.max(20))
            .await
            .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?
            .into_iter()
            .map(|r| (r.id, r.score))
            .collect::<Vec<_>>();

        let sparse = {
            let bm25 = self.bm25.lock().await;
            bm25.search(query, top_k.max(20))
                .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?
                .into_iter()
                .map(|r| (r.id, r.score))
                .collect::<Vec<_>>()
        };

        let fused = weighted_sum_fusion(
            vec![("dense", ALPHA, dense), ("sparse", 1.0 - ALPHA, sparse)],
            top_k,
        );

        Ok(fused
            .into_iter()
            .filter_map(|f| split_id(&f.id).map(|(skill_name, command_name)| HybridSearchResult {
                skill_name,
                command_name,
                score: f.score,
            }))
            .collect())
    }

    /// Keyword-only fallback (§7 `IndexUnavailable`: "the Router degrades
    /// to keyword-only fusion"): the same BM25 side `search_hybrid` uses,
    /// skipping the embedding call entirely so a down embedding/vector
    /// backend doesn't block retrieval outright.
    pub async fn search_keyword_only(&self, query: &str, top_k: usize) -> Result<Vec<HybridSearchResult>> {
        let sparse = {
            let bm25 = self.bm25.lock().await;
            bm25.search(query, top_k.max(20))
                .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?
                .into_iter()
                .map(|r| (r.id, r.score))
                .collect::<Vec<_>>()
        };

        let fused = weighted_sum_fusion(vec![("sparse", 1.0, sparse)], top_k);

        Ok(fused
            .into_iter()
            .filter_map(|f| split_id(&f.id).map(|(skill_name, command_name)| HybridSearchResult {
                skill_name,
                command_name,
                score: f.score,
            }))
            .collect())
    }

    /// Reconcile the index against the registry's live set of tool ids
    /// (§4.E): delete index entries with no matching live id, re-embed and
    /// upsert live entries that are either missing from the index or whose
    /// `semantic_text` checksum has drifted since it was last indexed
    /// (§10.6). Entries whose content is unchanged are skipped rather than
    /// blindly re-embedded on every reconcile pass. Run at startup and
    /// optionally on a periodic timer.
    pub async fn reconcile(&self, live_entries: &[ToolEntry]) -> Result<ReconcileReport> {
        let live_ids: HashSet<String> = live_entries.iter().map(|e| e.id()).collect();

        let indexed_ids: HashSet<String> = {
            let bm25 = self.bm25.lock().await;
            bm25.list_ids()
                .map_err(|e| KernelError::IndexUnavailable(e.to_string()))?
                .into_iter()
                .collect()
        };

        let stale: Vec<String> = indexed_ids.difference(&live_ids).cloned().collect();
        let removed = stale.len();
        self.delete_ids(&stale).await?;

        let dirty: Vec<&ToolEntry> = {
            let checksums = self.checksums.lock().await;
            live_entries
                .iter()
                .filter(|e| {
                    let id = e.id();
                    if !indexed_ids.contains(&id) {
                        return true;
                    }
                    let current = content_hash(&e.semantic_text);
                    checksums.get(&id) != Some(&current)
                })
                .collect()
        };
        let reindexed = dirty.len();
        for entry in dirty {
            self.upsert(entry).await?;
        }

        Ok(ReconcileReport { removed, reindexed })
    }
}

fn split_id(id: &str) -> Option<(String, String)> {
    id.split_once('.').map(|(s, c)| (s.to_string(), c.to_string()))
}

fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

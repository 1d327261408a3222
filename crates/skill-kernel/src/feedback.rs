//! Feedback & Reinforcement Store (§4.H): per-`(normalized_query, skill_id)`
//! score with multiplicative decay, surviving process restarts in a single
//! atomically-rewritten file.
//!
//! Grounded on the teacher's `credentials.rs` atomic temp-file-then-rename
//! persistence idiom (the same pattern the teacher uses for anything that
//! must never be left half-written on disk), generalized here from a
//! credentials blob to the nested query→skill→score map.

use crate::errors::{KernelError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const SUCCESS_DELTA: f32 = 0.1;
const FAILURE_DELTA: f32 = -0.1;
const DECAY_FACTOR: f32 = 0.99;
const PRUNE_THRESHOLD: f32 = 0.01;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FeedbackFile {
    /// `normalized_query -> skill_id -> score`
    scores: HashMap<String, HashMap<String, f32>>,
}

/// Process-wide feedback state: loaded lazily, written atomically.
pub struct FeedbackStore {
    path: PathBuf,
    state: Mutex<FeedbackFile>,
}

impl FeedbackStore {
    /// Load `path` if present, otherwise start with an empty store (§4.H:
    /// "loaded on first access"). Loading eagerly here rather than on
    /// first `record`/`get_boost` call avoids a lazy-init race between
    /// concurrent first callers.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path).await?;
            serde_json::from_str(&contents)?
        } else {
            FeedbackFile::default()
        };
        Ok(Self { path, state: Mutex::new(state) })
    }

    /// Normalize: lowercase, collapse internal whitespace runs to a single
    /// space, trim ends (§4.H).
    pub fn normalize_query(query: &str) -> String {
        query
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `record(query, skill, success)` — `score <- clamp(score ± 0.1, -1, 1)`,
    /// persisted synchronously before returning (§4.H).
    pub async fn record(&self, query: &str, skill: &str, success: bool) -> Result<()> {
        let normalized = Self::normalize_query(query);
        let delta = if success { SUCCESS_DELTA } else { FAILURE_DELTA };

        let mut state = self.state.lock().await;
        let per_skill = state.scores.entry(normalized).or_default();
        let score = per_skill.entry(skill.to_string()).or_insert(0.0);
        *score = (*score + delta).clamp(-1.0, 1.0);

        self.persist(&state).await
    }

    /// `get_boost(query, skill) -> f32` — applies multiplicative decay on
    /// every read, pruning entries (and empty parent queries) that decay
    /// below `|score| < 0.01` (§4.H invariant: "no entry with `|score| <
    /// 0.01` survives a read").
    pub async fn get_boost(&self, query: &str, skill: &str) -> Result<f32> {
        let normalized = Self::normalize_query(query);
        let mut state = self.state.lock().await;

        let boost = {
            let Some(per_skill) = state.scores.get_mut(&normalized) else {
                return Ok(0.0);
            };
            let Some(score) = per_skill.get_mut(skill) else {
                return Ok(0.0);
            };
            *score *= DECAY_FACTOR;
            let decayed = *score;
            if decayed.abs() < PRUNE_THRESHOLD {
                per_skill.remove(skill);
            }
            decayed
        };

        if let Some(per_skill) = state.scores.get(&normalized) {
            if per_skill.is_empty() {
                state.scores.remove(&normalized);
            }
        }

        self.persist(&state).await?;
        if boost.abs() < PRUNE_THRESHOLD {
            Ok(0.0)
        } else {
            Ok(boost)
        }
    }

    /// Atomic write: temp file adjacent to `self.path`, then rename
    /// (§4.H invariant: "never corrupt on partial write").
    async fn persist(&self, state: &FeedbackFile) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Err(KernelError::Runtime(format!(
                "feedback store path {} has no parent directory",
                self.path.display()
            )));
        };
        tokio::fs::create_dir_all(parent).await?;

        let tmp_path = tmp_path_for(&self.path);
        let serialized = serde_json::to_string_pretty(state)?;
        tokio::fs::write(&tmp_path, serialized).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    path.with_file_name(format!(".{file_name}.tmp"))
}

//! Sparse (BM25) retrieval and rank-fusion primitives backing the
//! Holographic Index's keyword side (§4.E). The dense side lives in
//! `crate::vector_store`; `crate::index` combines both.

mod bm25;
mod fusion;

pub use bm25::{BM25Config, BM25Index, BM25SearchResult};
pub use fusion::{reciprocal_rank_fusion, weighted_sum_fusion, FusedResult, FusionMethod};

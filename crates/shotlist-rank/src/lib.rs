//! # shotlist-rank
//!
//! Hybrid ranking engine scoring assets against semantic shot descriptions
//! under four selectable strategies, plus the per-query candidate cache that
//! serves cheap rank-switching without recomputation.

pub mod cache;
pub mod engine;
pub mod scoring;
pub mod strategy;

pub use cache::{query_fingerprint, CandidateCache};
pub use engine::{RankConfig, RankingEngine};
pub use strategy::RankStrategy;

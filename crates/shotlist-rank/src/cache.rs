//! Per-query candidate cache.
//!
//! Recall results are cached under their query key so that switching the
//! active candidate is a pure pointer move, never a recomputation. Entries
//! expire after a TTL and are invalidated when the query that produced them
//! changes, detected by fingerprint mismatch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::debug;

use shotlist_core::{defaults, CandidateSet, Error, RecallQuery, Result};

use crate::strategy::RankStrategy;

/// Deterministic fingerprint of a recall query plus its strategy.
///
/// Any change to tags, notes, fuzziness, limit, or strategy produces a new
/// fingerprint and therefore invalidates the cached candidate set for the
/// query key.
pub fn query_fingerprint(query: &RecallQuery, strategy: RankStrategy) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.query_key.trim().as_bytes());
    hasher.update(b"|");
    for (category, tag, weight) in query.tags.iter() {
        hasher.update(category.as_str().as_bytes());
        hasher.update(b"=");
        hasher.update(tag.as_bytes());
        hasher.update(format!(":{:.4}", weight).as_bytes());
        hasher.update(b";");
    }
    hasher.update(b"|");
    hasher.update(query.notes.trim().as_bytes());
    hasher.update(format!("|{:.4}", query.clamped_fuzziness()).as_bytes());
    hasher.update(format!("|{}", query.limit).as_bytes());
    hasher.update(b"|");
    hasher.update(strategy.as_str().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

struct CacheEntry {
    set: CandidateSet,
    inserted_at: Instant,
}

/// In-process TTL cache of candidate sets, keyed by query key.
pub struct CandidateCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl Default for CandidateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateCache {
    pub fn new() -> Self {
        Self::with_ttl(Duration::from_secs(defaults::CACHE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// TTL from `CANDIDATE_CACHE_TTL_SECS`, defaulting to 300.
    pub fn from_env() -> Self {
        let secs = std::env::var(defaults::ENV_CACHE_TTL_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::CACHE_TTL_SECS);
        Self::with_ttl(Duration::from_secs(secs))
    }

    /// Store a fresh candidate set under its query key, replacing any
    /// previous entry for that key.
    pub async fn insert(&self, set: CandidateSet) {
        let mut entries = self.entries.write().await;
        entries.insert(
            set.query_key.clone(),
            CacheEntry {
                set,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Retrieve the cached set for a query key. Expired entries are removed
    /// and reported as absent.
    pub async fn get(&self, query_key: &str) -> Result<CandidateSet> {
        let mut entries = self.entries.write().await;
        match entries.get(query_key) {
            Some(entry) if entry.inserted_at.elapsed() <= self.ttl => Ok(entry.set.clone()),
            Some(_) => {
                debug!(query_key, "Candidate cache entry expired");
                entries.remove(query_key);
                Err(Error::QueryKeyNotFound(query_key.to_string()))
            }
            None => Err(Error::QueryKeyNotFound(query_key.to_string())),
        }
    }

    /// Retrieve the cached set only if it is unexpired and was produced by
    /// the same query, by fingerprint. A mismatch drops the stale entry.
    pub async fn fresh(&self, query_key: &str, fingerprint: &str) -> Option<CandidateSet> {
        let mut entries = self.entries.write().await;
        match entries.get(query_key) {
            Some(entry)
                if entry.inserted_at.elapsed() <= self.ttl
                    && entry.set.fingerprint == fingerprint =>
            {
                Some(entry.set.clone())
            }
            Some(_) => {
                debug!(query_key, "Candidate cache entry stale; dropping");
                entries.remove(query_key);
                None
            }
            None => None,
        }
    }

    /// Move the active-candidate pointer for a cached set. Purely a pointer
    /// update: ordering, scores, and membership are untouched and nothing is
    /// recomputed.
    ///
    /// `from_rank` must equal the current active rank, which rejects
    /// concurrent switches operating on a stale view.
    pub async fn switch(
        &self,
        query_key: &str,
        from_rank: usize,
        to_rank: usize,
    ) -> Result<CandidateSet> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(query_key)
            .ok_or_else(|| Error::QueryKeyNotFound(query_key.to_string()))?;
        if entry.inserted_at.elapsed() > self.ttl {
            entries.remove(query_key);
            return Err(Error::QueryKeyNotFound(query_key.to_string()));
        }
        if entry.set.active_rank != from_rank {
            return Err(Error::Validation(format!(
                "active rank is {}, not {}; refresh and retry",
                entry.set.active_rank, from_rank
            )));
        }
        if to_rank == 0 || to_rank > entry.set.candidates.len() {
            return Err(Error::Validation(format!(
                "rank {} out of range 1..={}",
                to_rank,
                entry.set.candidates.len()
            )));
        }
        entry.set.active_rank = to_rank;
        debug!(query_key, from_rank, to_rank, "Switched active candidate");
        Ok(entry.set.clone())
    }

    /// Drop the entry for one query key.
    pub async fn invalidate(&self, query_key: &str) {
        self.entries.write().await.remove(query_key);
    }

    /// Drop every entry. Used when the underlying asset index changes in a
    /// way that could affect any query.
    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

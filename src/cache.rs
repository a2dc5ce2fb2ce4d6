use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use ethers::types::U256;

use crate::{cache_keys, types::LeaderboardRow};

/// A cache entry with expiration time
pub struct CacheEntry<T> {
    pub data: T,
    pub expires_at: Instant,
}

/// A generic time-based cache with TTL support
pub struct TimedCache<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone + Send + Sync> TimedCache<T> {
    /// Create a new cache with the specified TTL in seconds
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Get a value from the cache if it exists and hasn't expired
    pub async fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(key) {
            if Instant::now() < entry.expires_at {
                return Some(entry.data.clone());
            }
        }
        None
    }

    /// Store a value in the cache with the configured TTL
    pub async fn set(&self, key: &str, value: T) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CacheEntry {
                data: value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Remove every key starting with `prefix`
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }
}

impl<T> std::fmt::Debug for TimedCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedCache")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Derived query results, keyed per chain. Every entry can be rebuilt from
/// the event log, so dropping one is always safe.
///
/// Each chain carries a generation bumped by [`QueryCache::invalidate_chain`].
/// Writers read it before fetching and store through [`QueryCache::store`],
/// which drops results fetched across an invalidation.
#[derive(Debug)]
pub struct QueryCache {
    pub positions: TimedCache<Vec<U256>>,
    pub leaderboard: TimedCache<Vec<LeaderboardRow>>,
    pub allowance: TimedCache<U256>,
    generations: RwLock<HashMap<u64, u64>>,
}

impl QueryCache {
    pub fn new(
        positions_ttl: u64,
        leaderboard_ttl: u64,
        allowance_ttl: u64,
    ) -> Self {
        Self {
            positions: TimedCache::new(positions_ttl),
            leaderboard: TimedCache::new(leaderboard_ttl),
            allowance: TimedCache::new(allowance_ttl),
            generations: RwLock::new(HashMap::new()),
        }
    }

    pub async fn generation(&self, chain_id: u64) -> u64 {
        let generations = self.generations.read().await;
        generations.get(&chain_id).copied().unwrap_or(0)
    }

    /// Returns false and skips the write when `chain_id` was invalidated
    /// after `generation` was read.
    pub async fn store<T: Clone + Send + Sync>(
        &self,
        cache: &TimedCache<T>,
        chain_id: u64,
        generation: u64,
        key: &str,
        value: T,
    ) -> bool {
        let generations = self.generations.read().await;
        if generations.get(&chain_id).copied().unwrap_or(0) != generation {
            return false;
        }

        cache.set(key, value).await;
        true
    }

    pub async fn invalidate_chain(&self, chain_id: u64) {
        // held until the entries are gone so no store interleaves
        let mut generations = self.generations.write().await;
        *generations.entry(chain_id).or_insert(0) += 1;

        self.positions
            .invalidate_prefix(&cache_keys::chain_prefix(
                cache_keys::POSITIONS,
                chain_id,
            ))
            .await;
        self.leaderboard
            .invalidate_prefix(&cache_keys::chain_prefix(
                cache_keys::LEADERBOARD,
                chain_id,
            ))
            .await;
        self.allowance
            .invalidate_prefix(&cache_keys::chain_prefix(
                cache_keys::ALLOWANCE,
                chain_id,
            ))
            .await;
    }
}

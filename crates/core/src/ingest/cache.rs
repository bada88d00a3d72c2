use crate::domain::opportunity::Opportunity;
use crate::ingest::OpportunitySource;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
struct CacheEntry {
    opportunities: Vec<Opportunity>,
    fetched_at: Instant,
}

pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// TTL cache in front of another source, keyed by the requested chain set.
///
/// Expired entries are purged on every insert and the map never holds more than
/// `max_entries` keys; the oldest entry is evicted to make room.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl<S> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every entry; returns how many there were.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let n = entries.len();
        entries.clear();
        n
    }

    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.fetched_at.elapsed() < self.ttl);
        before - entries.len()
    }
}

fn cache_key(chains: Option<&[String]>) -> String {
    let mut chains: Vec<String> = chains
        .unwrap_or_default()
        .iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .collect();
    if chains.is_empty() {
        return "*".to_string();
    }
    chains.sort();
    chains.dedup();
    chains.join(",")
}

#[async_trait::async_trait]
impl<S: OpportunitySource> OpportunitySource for CachedSource<S> {
    fn source_name(&self) -> &'static str {
        self.inner.source_name()
    }

    async fn fetch_opportunities(
        &self,
        chains: Option<&[String]>,
    ) -> anyhow::Result<Vec<Opportunity>> {
        let key = cache_key(chains);
        {
            let mut entries = self.entries.lock().await;
            match entries.get(&key) {
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    tracing::debug!(key = %key, count = entry.opportunities.len(), "opportunity cache hit");
                    return Ok(entry.opportunities.clone());
                }
                Some(_) => {
                    entries.remove(&key);
                }
                None => {}
            }
        }

        let opportunities = self.inner.fetch_opportunities(chains).await?;

        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.fetched_at.elapsed() < self.ttl);
        while entries.len() >= self.max_entries {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.fetched_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            tracing::debug!(key = %oldest, "opportunity cache full; evicting oldest entry");
            entries.remove(&oldest);
        }
        entries.insert(
            key,
            CacheEntry {
                opportunities: opportunities.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(opportunities)
    }

    async fn data_age(&self, chains: Option<&[String]>) -> Duration {
        let key = cache_key(chains);
        let entries = self.entries.lock().await;
        match entries.get(&key) {
            Some(entry) => entry.fetched_at.elapsed(),
            None => self.inner.data_age(chains).await,
        }
    }
}

//! Token snapshot store
//!
//! Cached, TTL-bounded per-mint market view. `get` never fails the caller:
//! upstream errors are absorbed into a fallback snapshot and counted.

pub mod providers;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// Security annotations sourced from simulation / authority checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityFlags {
    pub is_honeypot: Option<bool>,
    pub mint_authority_present: Option<bool>,
    pub freeze_authority_present: Option<bool>,
    pub sim_success: Option<bool>,
    pub buy_tax_bps: Option<u32>,
    pub sell_tax_bps: Option<u32>,
}

/// Per-mint, timestamped market view. Fields are `None` when no provider
/// reported them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub mint: String,
    pub ts_snapshot: DateTime<Utc>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub spread_bps: Option<f64>,
    pub top10_holders_pct: Option<f64>,
    pub single_holder_pct: Option<f64>,
    #[serde(default)]
    pub security: SecurityFlags,
    pub volatility_30s: Option<f64>,
    pub price_impulse_5m: Option<f64>,
    pub smart_money_share: Option<f64>,
    /// External event risk in [0, 1].
    pub event_risk: Option<f64>,
    /// Which provider(s) produced this view ("primary", "merged", "fallback").
    pub source: String,
    /// Provider annotations that have no typed field yet.
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenSnapshot {
    /// Empty snapshot for a mint, stamped now.
    pub fn empty(mint: &str) -> Self {
        Self {
            mint: mint.to_string(),
            ts_snapshot: Utc::now(),
            liquidity_usd: None,
            volume_24h_usd: None,
            spread_bps: None,
            top10_holders_pct: None,
            single_holder_pct: None,
            security: SecurityFlags::default(),
            volatility_30s: None,
            price_impulse_5m: None,
            smart_money_share: None,
            event_risk: None,
            source: String::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Snapshot returned when every provider failed.
    pub fn fallback(mint: &str) -> Self {
        let mut snapshot = Self::empty(mint);
        snapshot.source = "fallback".to_string();
        snapshot
    }

    /// Fill this snapshot's `None` fields from a secondary view.
    pub fn merge_missing_from(&mut self, other: &TokenSnapshot) {
        fn fill<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if dst.is_none() {
                *dst = src.clone();
            }
        }
        fill(&mut self.liquidity_usd, &other.liquidity_usd);
        fill(&mut self.volume_24h_usd, &other.volume_24h_usd);
        fill(&mut self.spread_bps, &other.spread_bps);
        fill(&mut self.top10_holders_pct, &other.top10_holders_pct);
        fill(&mut self.single_holder_pct, &other.single_holder_pct);
        fill(&mut self.volatility_30s, &other.volatility_30s);
        fill(&mut self.price_impulse_5m, &other.price_impulse_5m);
        fill(&mut self.smart_money_share, &other.smart_money_share);
        fill(&mut self.event_risk, &other.event_risk);

        fill(&mut self.security.is_honeypot, &other.security.is_honeypot);
        fill(
            &mut self.security.mint_authority_present,
            &other.security.mint_authority_present,
        );
        fill(
            &mut self.security.freeze_authority_present,
            &other.security.freeze_authority_present,
        );
        fill(&mut self.security.sim_success, &other.security.sim_success);
        fill(&mut self.security.buy_tax_bps, &other.security.buy_tax_bps);
        fill(&mut self.security.sell_tax_bps, &other.security.sell_tax_bps);

        for (key, value) in &other.extra {
            self.extra
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }
}

/// Upstream source of token snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, mint: &str) -> Result<TokenSnapshot>;
}

/// Cache entry with TTL
#[derive(Clone)]
struct CachedSnapshot {
    snapshot: TokenSnapshot,
    cached_at: Instant,
}

impl CachedSnapshot {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// TTL-bounded snapshot store with single-flight fetches.
pub struct SnapshotStore {
    primary: Arc<dyn SnapshotProvider>,
    secondary: Option<Arc<dyn SnapshotProvider>>,
    ttl: Duration,
    cache: DashMap<String, CachedSnapshot>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    fetch_failures: AtomicU64,
}

impl SnapshotStore {
    pub fn new(
        primary: Arc<dyn SnapshotProvider>,
        secondary: Option<Arc<dyn SnapshotProvider>>,
        ttl: Duration,
    ) -> Self {
        Self {
            primary,
            secondary,
            ttl,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// Get the snapshot for a mint. Never fails: upstream errors yield a
    /// fallback snapshot. Concurrent calls for the same mint coalesce into
    /// at most one upstream fetch.
    pub async fn get(&self, mint: &str) -> TokenSnapshot {
        if let Some(cached) = self.cache.get(mint) {
            if !cached.is_expired(self.ttl) {
                return cached.snapshot.clone();
            }
        }

        // Per-mint fetch lock: whoever wins does the upstream work, the
        // rest re-read the cache once the lock frees.
        let lock = self
            .inflight
            .entry(mint.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.get(mint) {
            if !cached.is_expired(self.ttl) {
                return cached.snapshot.clone();
            }
        }

        let snapshot = self.fetch_merged(mint).await;
        self.cache.insert(
            mint.to_string(),
            CachedSnapshot {
                snapshot: snapshot.clone(),
                cached_at: Instant::now(),
            },
        );
        drop(_guard);
        self.inflight.remove(mint);

        snapshot
    }

    async fn fetch_merged(&self, mint: &str) -> TokenSnapshot {
        let mut snapshot = match self.primary.fetch(mint).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(mint = %mint, provider = %self.primary.name(), error = %e, "Primary snapshot fetch failed");
                TokenSnapshot::fallback(mint)
            }
        };
        let primary_ok = snapshot.source != "fallback";
        if primary_ok {
            snapshot.source = "primary".to_string();
        }

        if let Some(secondary) = &self.secondary {
            match secondary.fetch(mint).await {
                Ok(extra) => {
                    snapshot.merge_missing_from(&extra);
                    if primary_ok {
                        snapshot.source = "merged".to_string();
                    } else {
                        snapshot.source = "secondary".to_string();
                    }
                }
                Err(e) => {
                    self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(mint = %mint, provider = %secondary.name(), error = %e, "Secondary snapshot fetch failed");
                }
            }
        }

        snapshot.ts_snapshot = Utc::now();
        snapshot
    }

    /// Drop the cached snapshot for a mint.
    pub fn invalidate(&self, mint: &str) {
        self.cache.remove(mint);
    }

    /// Drop every cached snapshot.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Number of upstream fetches that failed since startup.
    pub fn fetch_failure_count(&self) -> u64 {
        self.fetch_failures.load(Ordering::Relaxed)
    }
}

//! Idempotency layer
//!
//! Deduplicates concurrent decisions carrying the same fingerprint and
//! enforces at-most-one in-flight order build per signal. Acquisitions and
//! releases are journaled to an append-only JSONL file.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Side;

/// Deterministic decision fingerprint over `(leader, mint, side, bucketed_ts)`.
pub fn fingerprint(leader: &str, mint: &str, side: Side, ts_ms: i64, bucket_secs: u64) -> String {
    let bucket = if bucket_secs == 0 {
        ts_ms / 1000
    } else {
        (ts_ms / 1000) / bucket_secs as i64
    };
    let mut hasher = Sha256::new();
    hasher.update(leader.as_bytes());
    hasher.update(b"|");
    hasher.update(mint.as_bytes());
    hasher.update(b"|");
    hasher.update(side.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(bucket.to_le_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone)]
struct LockEntry {
    acquired_at: Instant,
    ttl: Duration,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        self.acquired_at.elapsed() > self.ttl
    }
}

/// Journal record, one object per line.
#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord<'a> {
    schema_version: &'a str,
    ts: String,
    action: &'a str,
    key: &'a str,
}

/// In-flight decision locks keyed by fingerprint.
pub struct IdempotencyGuard {
    entries: DashMap<String, LockEntry>,
    default_ttl: Duration,
    journal: Option<Mutex<tokio::fs::File>>,
}

impl IdempotencyGuard {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            journal: None,
        }
    }

    /// Attach the append-only journal file.
    pub async fn with_journal(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.into())
            .await
            .map_err(|e| Error::Journal(e.to_string()))?;
        self.journal = Some(Mutex::new(file));
        Ok(self)
    }

    /// Try to take the in-flight lock for a fingerprint. Returns `false`
    /// when a non-expired lock already exists. `ttl` is raised to the
    /// configured window when shorter.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> bool {
        let ttl = ttl.max(self.default_ttl);

        let acquired = {
            let mut taken = false;
            let entry = self.entries.entry(key.to_string());
            entry
                .and_modify(|existing| {
                    if existing.is_expired() {
                        *existing = LockEntry {
                            acquired_at: Instant::now(),
                            ttl,
                        };
                        taken = true;
                    }
                })
                .or_insert_with(|| {
                    taken = true;
                    LockEntry {
                        acquired_at: Instant::now(),
                        ttl,
                    }
                });
            taken
        };

        if acquired {
            self.journal_append("acquire", key).await;
            debug!(key = %key, "Idempotency lock acquired");
        }
        acquired
    }

    /// Release the lock for a fingerprint.
    pub async fn release(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.journal_append("release", key).await;
            debug!(key = %key, "Idempotency lock released");
        }
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    async fn journal_append(&self, action: &str, key: &str) {
        let Some(journal) = &self.journal else {
            return;
        };
        let record = JournalRecord {
            schema_version: "1.0",
            ts: Utc::now().to_rfc3339(),
            action,
            key,
        };
        let Ok(mut line) = serde_json::to_string(&record) else {
            return;
        };
        line.push('\n');
        let mut file = journal.lock().await;
        if let Err(e) = file.write_all(line.as_bytes()).await {
            tracing::warn!(error = %e, "Idempotency journal append failed");
        }
    }
}

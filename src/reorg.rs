//! Reorg guard
//!
//! Tracks submitted transactions until finality. A tx that vanishes after
//! being seen confirmed was rolled back with its block: the guard emits a
//! rollback event that reverses the local position effects. A tx that never
//! lands inside the grace period is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::chain::{ChainClient, TxState};
use crate::config::ReorgConfig;
use crate::error::Result;

/// Classification of a tracked transaction at poll time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxClassification {
    Pending,
    Confirmed,
    Finalized,
    Dropped,
    Reorged,
}

/// Local bookkeeping for a submitted entry tx.
#[derive(Debug, Clone)]
pub struct TrackedTx {
    pub signal_id: String,
    pub mint: String,
    pub tier: Option<String>,
    pub size_usd: f64,
    pub submitted_at: DateTime<Utc>,
    /// Whether any poll has seen this tx at confirmed-or-better.
    seen_confirmed: bool,
}

impl TrackedTx {
    pub fn new(
        signal_id: String,
        mint: String,
        tier: Option<String>,
        size_usd: f64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signal_id,
            mint,
            tier,
            size_usd,
            submitted_at,
            seen_confirmed: false,
        }
    }
}

/// Event emitted when a tracked tx leaves the happy path.
#[derive(Debug, Clone)]
pub enum ReorgEvent {
    /// Never landed within the grace period.
    Dropped {
        tx_sig: String,
        signal_id: String,
        mint: String,
    },
    /// Landed, then rolled back with its block.
    Reorged {
        tx_sig: String,
        signal_id: String,
        mint: String,
        tier: Option<String>,
        size_usd: f64,
        trace_id: String,
    },
}

/// Watchdog over submitted transactions.
pub struct ReorgGuard {
    config: ReorgConfig,
    tracked: HashMap<String, TrackedTx>,
}

impl ReorgGuard {
    pub fn new(config: ReorgConfig) -> Self {
        Self {
            config,
            tracked: HashMap::new(),
        }
    }

    /// Start watching a submitted tx.
    pub fn track(&mut self, tx_sig: &str, tx: TrackedTx) {
        self.tracked.insert(tx_sig.to_string(), tx);
    }

    /// Stop watching (position closed through the normal path).
    pub fn resolve(&mut self, tx_sig: &str) {
        self.tracked.remove(tx_sig);
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Poll every tracked tx once. Finalized txs leave the watch list;
    /// dropped and reorged txs leave it with an event.
    pub async fn poll(&mut self, client: &dyn ChainClient, now: DateTime<Utc>) -> Result<Vec<ReorgEvent>> {
        if self.tracked.is_empty() {
            return Ok(vec![]);
        }

        let current_slot = client.current_slot().await?;

        // One status fetch per tracked tx, in flight together.
        let tx_sigs: Vec<String> = self.tracked.keys().cloned().collect();
        let states =
            futures::future::join_all(tx_sigs.iter().map(|sig| client.get_tx_state(sig))).await;

        let mut events = vec![];
        let mut remove = vec![];

        for (tx_sig, state) in tx_sigs.iter().zip(states) {
            let Some(tx) = self.tracked.get_mut(tx_sig) else {
                continue;
            };
            let state = match state {
                Ok(state) => state,
                Err(e) => {
                    warn!(tx_sig = %tx_sig, error = %e, "Tx status poll failed");
                    continue;
                }
            };

            if matches!(
                state,
                TxState::Confirmed { .. } | TxState::Finalized { .. }
            ) {
                tx.seen_confirmed = true;
            }

            match Self::classify(&self.config, tx, state, current_slot, now) {
                TxClassification::Finalized => {
                    remove.push(tx_sig.clone());
                }
                TxClassification::Dropped => {
                    info!(tx_sig = %tx_sig, signal_id = %tx.signal_id, "Tx dropped");
                    events.push(ReorgEvent::Dropped {
                        tx_sig: tx_sig.clone(),
                        signal_id: tx.signal_id.clone(),
                        mint: tx.mint.clone(),
                    });
                    remove.push(tx_sig.clone());
                }
                TxClassification::Reorged => {
                    warn!(tx_sig = %tx_sig, signal_id = %tx.signal_id, "Tx reorged, reverting local effects");
                    events.push(ReorgEvent::Reorged {
                        tx_sig: tx_sig.clone(),
                        signal_id: tx.signal_id.clone(),
                        mint: tx.mint.clone(),
                        tier: tx.tier.clone(),
                        size_usd: tx.size_usd,
                        trace_id: Uuid::new_v4().to_string(),
                    });
                    remove.push(tx_sig.clone());
                }
                TxClassification::Pending | TxClassification::Confirmed => {}
            }
        }

        for tx_sig in remove {
            self.tracked.remove(&tx_sig);
        }
        Ok(events)
    }

    fn classify(
        config: &ReorgConfig,
        tx: &TrackedTx,
        state: TxState,
        current_slot: u64,
        now: DateTime<Utc>,
    ) -> TxClassification {
        match state {
            TxState::Finalized { .. } => TxClassification::Finalized,
            TxState::Confirmed { slot } | TxState::Processed { slot } => {
                if current_slot.saturating_sub(slot) >= config.finalized_gap {
                    TxClassification::Finalized
                } else {
                    TxClassification::Confirmed
                }
            }
            TxState::NotFound => {
                if tx.seen_confirmed {
                    TxClassification::Reorged
                } else if now.signed_duration_since(tx.submitted_at).num_seconds()
                    > config.dropped_grace_secs as i64
                {
                    TxClassification::Dropped
                } else {
                    TxClassification::Pending
                }
            }
        }
    }
}

//! Partial-fill handling
//!
//! Tracks expected vs filled entry quantity per signal. A fill that does
//! not complete inside the timeout is forced closed and an adjustment
//! record carrying `(signal_id, tx_sig, trace_id)` is emitted for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Audit record for a forced partial-fill resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillAdjustment {
    pub signal_id: String,
    pub tx_sig: String,
    pub trace_id: String,
    pub expected_qty: f64,
    pub filled_qty: f64,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct PendingFill {
    tx_sig: String,
    expected_qty: f64,
    filled_qty: f64,
    registered_at: DateTime<Utc>,
}

/// Outcome of a fill report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillProgress {
    /// Entry fully filled; tracking dropped.
    Complete,
    /// Still short of the expected quantity.
    Partial,
    /// No pending entry for that signal.
    Unknown,
}

/// Tracks in-flight entry fills and their deadlines.
pub struct PartialFillHandler {
    timeout_secs: u64,
    pending: HashMap<String, PendingFill>,
}

impl PartialFillHandler {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout_secs,
            pending: HashMap::new(),
        }
    }

    /// Start tracking an entry order.
    pub fn register(
        &mut self,
        signal_id: &str,
        tx_sig: &str,
        expected_qty: f64,
        now: DateTime<Utc>,
    ) {
        self.pending.insert(
            signal_id.to_string(),
            PendingFill {
                tx_sig: tx_sig.to_string(),
                expected_qty,
                filled_qty: 0.0,
                registered_at: now,
            },
        );
    }

    /// Record a fill report from the execution adapter.
    pub fn record_fill(&mut self, signal_id: &str, filled_qty: f64) -> FillProgress {
        let Some(pending) = self.pending.get_mut(signal_id) else {
            return FillProgress::Unknown;
        };
        pending.filled_qty = filled_qty.min(pending.expected_qty);
        if pending.filled_qty >= pending.expected_qty {
            self.pending.remove(signal_id);
            FillProgress::Complete
        } else {
            FillProgress::Partial
        }
    }

    /// Drop tracking for a signal (position closed by other means).
    pub fn resolve(&mut self, signal_id: &str) {
        self.pending.remove(signal_id);
    }

    /// Collect entries whose fill deadline passed. Each emitted adjustment
    /// removes its entry; the caller force-closes the position with
    /// `PARTIAL_TIMEOUT`.
    pub fn check_timeouts(&mut self, now: DateTime<Utc>) -> Vec<FillAdjustment> {
        let timeout = self.timeout_secs as i64;
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, pending)| {
                now.signed_duration_since(pending.registered_at).num_seconds() > timeout
            })
            .map(|(signal_id, _)| signal_id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|signal_id| {
                let pending = self.pending.remove(&signal_id)?;
                let adjustment = FillAdjustment {
                    signal_id: signal_id.clone(),
                    tx_sig: pending.tx_sig,
                    trace_id: Uuid::new_v4().to_string(),
                    expected_qty: pending.expected_qty,
                    filled_qty: pending.filled_qty,
                    ts: now,
                };
                warn!(
                    signal_id = %adjustment.signal_id,
                    filled = adjustment.filled_qty,
                    expected = adjustment.expected_qty,
                    "Partial fill timed out"
                );
                Some(adjustment)
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Filled quantity reported so far for a signal, if still pending.
    pub fn filled_qty(&self, signal_id: &str) -> Option<f64> {
        self.pending.get(signal_id).map(|pending| pending.filled_qty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_complete_fill_drops_tracking() {
        let mut handler = PartialFillHandler::new(30);
        let now = Utc::now();
        handler.register("sig1", "tx1", 10.0, now);

        assert_eq!(handler.record_fill("sig1", 10.0), FillProgress::Complete);
        assert_eq!(handler.pending_count(), 0);
    }

    #[test]
    fn test_partial_fill_stays_pending() {
        let mut handler = PartialFillHandler::new(30);
        let now = Utc::now();
        handler.register("sig1", "tx1", 10.0, now);

        assert_eq!(handler.record_fill("sig1", 4.0), FillProgress::Partial);
        assert_eq!(handler.pending_count(), 1);
        assert_eq!(handler.filled_qty("sig1"), Some(4.0));
    }

    #[test]
    fn test_unknown_signal() {
        let mut handler = PartialFillHandler::new(30);
        assert_eq!(handler.record_fill("nope", 1.0), FillProgress::Unknown);
    }

    #[test]
    fn test_timeout_emits_adjustment() {
        let mut handler = PartialFillHandler::new(30);
        let start = Utc::now();
        handler.register("sig1", "tx1", 10.0, start);
        handler.record_fill("sig1", 4.0);

        // Before the deadline nothing fires.
        assert!(handler
            .check_timeouts(start + Duration::seconds(10))
            .is_empty());

        let adjustments = handler.check_timeouts(start + Duration::seconds(31));
        assert_eq!(adjustments.len(), 1);
        let adjustment = &adjustments[0];
        assert_eq!(adjustment.signal_id, "sig1");
        assert_eq!(adjustment.tx_sig, "tx1");
        assert!(!adjustment.trace_id.is_empty());
        assert_eq!(adjustment.filled_qty, 4.0);
        assert_eq!(handler.pending_count(), 0);
    }

    #[test]
    fn test_resolve_cancels_deadline() {
        let mut handler = PartialFillHandler::new(30);
        let start = Utc::now();
        handler.register("sig1", "tx1", 10.0, start);
        handler.resolve("sig1");

        assert!(handler
            .check_timeouts(start + Duration::seconds(60))
            .is_empty());
    }
}

//! State reconciler
//!
//! Watchdog against drift between the local bankroll and the on-chain
//! balance. Small deltas are ignored, larger ones are applied as bounded
//! adjustments with an alert whose severity tracks the drift size. In
//! `dry_run` the drift is recorded but local state stays untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chain::ChainClient;
use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::output::{AdjustmentRecord, AdjustmentType, AuditLog};
use crate::risk::RiskEngine;

/// Alert severity for a reconciliation adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileReport {
    pub chain_lamports: u64,
    pub local_lamports: u64,
    /// chain - local; positive means the chain holds more than we think.
    pub delta_lamports: i64,
    /// `None` when the delta is inside the no-op band.
    pub severity: Option<AlertSeverity>,
    /// Whether local state was mutated (false in dry_run and no-op cases).
    pub adjusted: bool,
}

pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    pub fn interval_seconds(&self) -> u64 {
        self.config.interval_seconds
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    /// Classify a drift without touching any state.
    pub fn classify(&self, chain_lamports: u64, local_lamports: u64) -> ReconcileReport {
        let delta = chain_lamports as i64 - local_lamports as i64;
        let magnitude = delta.unsigned_abs();

        let severity = if magnitude <= self.config.max_delta_without_alert_lamports {
            None
        } else if magnitude <= self.config.warning_threshold_lamports {
            Some(AlertSeverity::Info)
        } else if magnitude <= self.config.critical_threshold_lamports {
            Some(AlertSeverity::Warning)
        } else {
            Some(AlertSeverity::Critical)
        };

        ReconcileReport {
            chain_lamports,
            local_lamports,
            delta_lamports: delta,
            severity,
            adjusted: false,
        }
    }

    /// One reconciliation pass: read the chain balance, compare, adjust.
    pub async fn reconcile_once(
        &self,
        client: &dyn ChainClient,
        risk: &mut RiskEngine,
        audit: &AuditLog,
    ) -> Result<ReconcileReport> {
        let chain_lamports = client.get_balance_lamports().await?;
        let local_lamports = risk.state().bankroll_lamports;
        let mut report = self.classify(chain_lamports, local_lamports);

        let Some(severity) = report.severity else {
            return Ok(report);
        };

        let (before, after) = if self.config.dry_run {
            (local_lamports, local_lamports)
        } else {
            report.adjusted = true;
            risk.apply_bankroll_adjustment(report.delta_lamports)
        };

        match severity {
            AlertSeverity::Info => info!(
                delta = report.delta_lamports,
                chain = chain_lamports,
                local = local_lamports,
                "Bankroll drift reconciled"
            ),
            AlertSeverity::Warning => warn!(
                delta = report.delta_lamports,
                chain = chain_lamports,
                local = local_lamports,
                "Large bankroll drift reconciled"
            ),
            AlertSeverity::Critical => error!(
                delta = report.delta_lamports,
                chain = chain_lamports,
                local = local_lamports,
                "CRITICAL bankroll drift reconciled"
            ),
        }

        audit
            .append(AdjustmentRecord {
                schema_version: "1.0".into(),
                ts: Utc::now(),
                adjustment_type: AdjustmentType::BankrollReconcile,
                signal_id: String::new(),
                tx_sig: None,
                trace_id: Uuid::new_v4().to_string(),
                reason: format!("delta {} lamports ({:?})", report.delta_lamports, severity),
                before_lamports: Some(before),
                after_lamports: Some(after),
            })
            .await;

        Ok(report)
    }
}

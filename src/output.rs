//! Wire-level outputs
//!
//! JSON-lines emitters for the three output streams (`signals.v1`,
//! `daily_metrics.v1`, `execution_metrics.v1`) and the append-only
//! adjustment audit log. One object per line; field order follows struct
//! declaration order and is stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{Error, Result};
use crate::reject::RejectReason;
use crate::types::Side;

/// Terminal decision for a trade event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Enter,
    Skip,
}

/// Per-signal record: exactly one per ingested trade event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub schema_version: String,
    pub ts: DateTime<Utc>,
    pub signal_id: String,
    pub leader: String,
    pub mint: String,
    pub side: Side,
    pub decision: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reject_reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub info: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_raw_bps: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_final_bps: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_regime: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_sig: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sim_exit_reason: Option<String>,
    pub event_ts_ms: i64,
}

impl SignalRecord {
    pub fn schema() -> String {
        "signals.v1".to_string()
    }
}

/// Daily aggregation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetricsRecord {
    pub schema_version: String,
    pub date: String,
    pub signals_total: u64,
    pub entered: u64,
    pub skipped: u64,
    pub wins: u32,
    pub losses: u32,
    pub net_pnl_usd: f64,
    pub win_rate_pct: f64,
}

/// Execution-quality aggregation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionMetricsRecord {
    pub schema_version: String,
    pub ts: DateTime<Utc>,
    pub quotes_requested: u64,
    pub orders_submitted: u64,
    pub snapshot_fetch_failures: u64,
    pub partial_fill_timeouts: u64,
    pub txs_dropped: u64,
    pub txs_reorged: u64,
}

/// Kind of state adjustment recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    ReorgRollback,
    PartialFill,
    BankrollReconcile,
}

/// Append-only audit entry for any local-state adjustment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRecord {
    pub schema_version: String,
    pub ts: DateTime<Utc>,
    pub adjustment_type: AdjustmentType,
    pub signal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_sig: Option<String>,
    pub trace_id: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_lamports: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_lamports: Option<u64>,
}

/// Append-only JSONL stream writer.
pub struct JsonlWriter {
    file: Mutex<tokio::fs::File>,
    path: PathBuf,
}

impl JsonlWriter {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("{}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

/// Bounded in-memory audit log mirrored to an append-only file.
pub struct AuditLog {
    recent: Mutex<VecDeque<AdjustmentRecord>>,
    max_entries: usize,
    writer: Option<JsonlWriter>,
}

impl AuditLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            max_entries,
            writer: None,
        }
    }

    pub async fn with_file(mut self, path: impl Into<PathBuf>) -> Result<Self> {
        self.writer = Some(JsonlWriter::open(path).await?);
        Ok(self)
    }

    pub async fn append(&self, record: AdjustmentRecord) {
        if let Some(writer) = &self.writer {
            if let Err(e) = writer.append(&record).await {
                warn!(error = %e, "Audit log append failed");
            }
        }
        let mut recent = self.recent.lock().await;
        recent.push_back(record);
        while recent.len() > self.max_entries {
            recent.pop_front();
        }
    }

    pub async fn recent(&self) -> Vec<AdjustmentRecord> {
        self.recent.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.recent.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.recent.lock().await.is_empty()
    }
}

/// Daily signal/PnL aggregation, reset at UTC midnight.
#[derive(Debug, Clone, Default)]
pub struct DailyStats {
    pub date: String,
    pub signals_total: u64,
    pub entered: u64,
    pub skipped: u64,
    pub wins: u32,
    pub losses: u32,
    pub net_pnl_usd: f64,
}

impl DailyStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            date: now.format("%Y-%m-%d").to_string(),
            ..Default::default()
        }
    }

    pub fn record_signal(&mut self, decision: Decision) {
        self.signals_total += 1;
        match decision {
            Decision::Enter => self.entered += 1,
            Decision::Skip => self.skipped += 1,
        }
    }

    pub fn record_close(&mut self, pnl_usd: f64) {
        if pnl_usd >= 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.net_pnl_usd += pnl_usd;
    }

    pub fn win_rate_pct(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            return 0.0;
        }
        self.wins as f64 / total as f64 * 100.0
    }

    pub fn to_record(&self) -> DailyMetricsRecord {
        DailyMetricsRecord {
            schema_version: "daily_metrics.v1".to_string(),
            date: self.date.clone(),
            signals_total: self.signals_total,
            entered: self.entered,
            skipped: self.skipped,
            wins: self.wins,
            losses: self.losses,
            net_pnl_usd: self.net_pnl_usd,
            win_rate_pct: self.win_rate_pct(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_writer_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        let writer = JsonlWriter::open(&path).await.unwrap();

        let record = SignalRecord {
            schema_version: SignalRecord::schema(),
            ts: Utc::now(),
            signal_id: "sig1".into(),
            leader: "w1".into(),
            mint: "mintA".into(),
            side: Side::Buy,
            decision: Decision::Skip,
            reject_reason: Some(RejectReason::MinLiquidityFail),
            info: vec![],
            mode: None,
            mode_reason: None,
            edge_raw_bps: None,
            edge_final_bps: None,
            risk_regime: None,
            win_p: None,
            size_usd: None,
            tx_sig: None,
            sim_exit_reason: None,
            event_ts_ms: 0,
        };
        writer.append(&record).await.unwrap();
        writer.append(&record).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: SignalRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.decision, Decision::Skip);
        assert_eq!(parsed.reject_reason, Some(RejectReason::MinLiquidityFail));
        assert!(lines[0].starts_with("{\"schema_version\":\"signals.v1\""));
    }

    #[tokio::test]
    async fn test_audit_log_bounded() {
        let audit = AuditLog::new(3);
        for i in 0..5 {
            audit
                .append(AdjustmentRecord {
                    schema_version: "1.0".into(),
                    ts: Utc::now(),
                    adjustment_type: AdjustmentType::BankrollReconcile,
                    signal_id: format!("sig{}", i),
                    tx_sig: None,
                    trace_id: format!("trace{}", i),
                    reason: "test".into(),
                    before_lamports: Some(0),
                    after_lamports: Some(1),
                })
                .await;
        }

        let recent = audit.recent().await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].signal_id, "sig2");
        assert_eq!(recent[2].signal_id, "sig4");
    }

    #[test]
    fn test_daily_stats() {
        let mut stats = DailyStats::new(Utc::now());
        stats.record_signal(Decision::Enter);
        stats.record_signal(Decision::Skip);
        stats.record_close(10.0);
        stats.record_close(-4.0);
        stats.record_close(6.0);

        assert_eq!(stats.signals_total, 2);
        assert_eq!(stats.entered, 1);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 1);
        assert!((stats.net_pnl_usd - 12.0).abs() < 1e-9);
        assert!((stats.win_rate_pct() - 66.666).abs() < 0.01);

        let record = stats.to_record();
        assert_eq!(record.schema_version, "daily_metrics.v1");
    }
}

//! Trade-event ingest
//!
//! Reads normalized leader trades as JSON lines (file or stdin), validates
//! the schema stamp, and feeds the decision task through a bounded channel.
//! Malformed lines and unsupported major versions are counted and skipped;
//! they never stop the stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::TradeEvent;

/// Counters for one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub lines: u64,
    pub accepted: u64,
    pub malformed: u64,
    pub version_rejected: u64,
}

/// Drain a JSONL reader into the event channel.
pub async fn read_events<R: AsyncBufRead + Unpin>(
    reader: R,
    events: async_channel::Sender<TradeEvent>,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        summary.lines += 1;

        let event: TradeEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                summary.malformed += 1;
                warn!(error = %e, "Skipping malformed trade event");
                continue;
            }
        };

        if let Err(e) = event.check_schema() {
            summary.version_rejected += 1;
            warn!(error = %e, tx_hash = %event.tx_hash, "Skipping trade event");
            continue;
        }

        summary.accepted += 1;
        if events.send(event).await.is_err() {
            // Decision task is gone; nothing left to feed.
            break;
        }
    }

    info!(
        lines = summary.lines,
        accepted = summary.accepted,
        malformed = summary.malformed,
        version_rejected = summary.version_rejected,
        "Ingest stream ended"
    );
    Ok(summary)
}

/// Ingest task entry point. `"-"` reads stdin, anything else is a file
/// path.
pub async fn run_ingest(
    path: &str,
    events: async_channel::Sender<TradeEvent>,
) -> Result<IngestSummary> {
    if path == "-" {
        let reader = BufReader::new(tokio::io::stdin());
        read_events(reader, events).await
    } else {
        let file = tokio::fs::File::open(path).await?;
        let reader = BufReader::new(file);
        read_events(reader, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_LINE: &str = r#"{"schema_version":"1.0","ts_ms":1700000000000,"leader":"w1","mint":"mintA","side":"BUY","price":0.002,"notional_usd":350.0,"tx_hash":"sig1"}"#;

    #[tokio::test]
    async fn test_reads_good_lines() {
        let input = format!("{}\n{}\n", GOOD_LINE, GOOD_LINE);
        let (tx, rx) = async_channel::bounded(16);

        let summary = read_events(BufReader::new(input.as_bytes()), tx)
            .await
            .unwrap();

        assert_eq!(summary.accepted, 2);
        assert_eq!(rx.len(), 2);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.mint, "mintA");
    }

    #[tokio::test]
    async fn test_skips_malformed_and_bad_versions() {
        let input = format!(
            "{}\nnot json\n{}\n",
            GOOD_LINE,
            GOOD_LINE.replace("\"1.0\"", "\"9.0\"")
        );
        let (tx, rx) = async_channel::bounded(16);

        let summary = read_events(BufReader::new(input.as_bytes()), tx)
            .await
            .unwrap();

        assert_eq!(summary.lines, 3);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(summary.version_rejected, 1);
        assert_eq!(rx.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_lines_ignored() {
        let input = format!("\n\n{}\n\n", GOOD_LINE);
        let (tx, _rx) = async_channel::bounded(16);

        let summary = read_events(BufReader::new(input.as_bytes()), tx)
            .await
            .unwrap();
        assert_eq!(summary.lines, 1);
        assert_eq!(summary.accepted, 1);
    }
}

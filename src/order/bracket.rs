//! Bracket position state machine
//!
//! One position per accepted signal. Transitions are driven by price ticks,
//! fill reports, and forced closes; terminal states absorb every further
//! event (idempotent close).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Side;

/// Why a position closed. Exactly one per position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    TpHit,
    SlHit,
    TtlExpired,
    ManualClose,
    PartialTimeout,
    ReorgRollback,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TpHit => "TP_HIT",
            CloseReason::SlHit => "SL_HIT",
            CloseReason::TtlExpired => "TTL_EXPIRED",
            CloseReason::ManualClose => "MANUAL_CLOSE",
            CloseReason::PartialTimeout => "PARTIAL_TIMEOUT",
            CloseReason::ReorgRollback => "REORG_ROLLBACK",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionStatus {
    Active,
    Partial,
    Closed,
}

/// Bracket parameters resolved from the selected mode.
#[derive(Debug, Clone, Copy)]
pub struct BracketParams {
    pub tp_pct: f64,
    pub sl_pct: f64,
    pub ttl_sec: u64,
}

/// Emitted exactly once when a position reaches CLOSED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseEvent {
    pub signal_id: String,
    pub mint: String,
    pub reason: CloseReason,
    pub close_price: f64,
    pub pnl_usd: f64,
    pub ts: DateTime<Utc>,
}

/// An open bracket position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Stable decision fingerprint this position was built from.
    pub signal_id: String,
    pub mint: String,
    pub side: Side,
    pub entry_price: f64,
    /// Notional in quote currency (USD).
    pub size_quote: f64,
    pub entry_ts: DateTime<Utc>,
    pub ttl_sec: u64,
    pub tp_price: f64,
    pub sl_price: f64,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    /// Expected base quantity for the entry fill.
    pub expected_qty: f64,
    /// Base quantity filled so far.
    pub filled_qty: f64,
    /// Unfilled remainder of the entry order.
    pub remaining_qty: f64,
    /// Leader tier label carried for risk bookkeeping.
    pub tier: Option<String>,
}

impl Position {
    /// Open a position; TP/SL prices are committed here from side and mode
    /// parameters and never move afterwards.
    pub fn open(
        signal_id: String,
        mint: String,
        side: Side,
        entry_price: f64,
        size_quote: f64,
        expected_qty: f64,
        params: BracketParams,
        entry_ts: DateTime<Utc>,
        tier: Option<String>,
    ) -> Self {
        let (tp_price, sl_price) = match side {
            Side::Buy => (
                entry_price * (1.0 + params.tp_pct),
                entry_price * (1.0 + params.sl_pct),
            ),
            // Short mirror: profit when price falls, stopped when it rises.
            Side::Sell => (
                entry_price * (1.0 - params.tp_pct),
                entry_price * (1.0 - params.sl_pct),
            ),
        };

        Self {
            signal_id,
            mint,
            side,
            entry_price,
            size_quote,
            entry_ts,
            ttl_sec: params.ttl_sec,
            tp_price,
            sl_price,
            status: PositionStatus::Active,
            close_reason: None,
            expected_qty,
            filled_qty: expected_qty,
            remaining_qty: 0.0,
            tier,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == PositionStatus::Closed
    }

    pub fn is_tp_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Buy => price >= self.tp_price,
            Side::Sell => price <= self.tp_price,
        }
    }

    pub fn is_sl_hit(&self, price: f64) -> bool {
        match self.side {
            Side::Buy => price <= self.sl_price,
            Side::Sell => price >= self.sl_price,
        }
    }

    /// Realized PnL at a close price.
    pub fn pnl_at(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        let move_pct = (price - self.entry_price) / self.entry_price;
        match self.side {
            Side::Buy => move_pct * self.size_quote,
            Side::Sell => -move_pct * self.size_quote,
        }
    }

    /// Price tick. SL beats TP when a gap satisfies both in one tick; TTL
    /// is consulted only when neither bracket leg triggers.
    pub fn tick(&mut self, price: f64, now: DateTime<Utc>) -> Option<CloseEvent> {
        if self.is_closed() {
            return None;
        }

        if self.is_sl_hit(price) {
            return self.close(CloseReason::SlHit, price, now);
        }
        if self.is_tp_hit(price) {
            return self.close(CloseReason::TpHit, price, now);
        }

        let age = now.signed_duration_since(self.entry_ts);
        if age.num_seconds() > self.ttl_sec as i64 {
            return self.close(CloseReason::TtlExpired, price, now);
        }

        None
    }

    /// Record an entry fill report. A short fill moves the position to
    /// PARTIAL until the remainder arrives or the partial-fill handler
    /// forces it closed.
    pub fn record_fill(&mut self, filled_qty: f64) {
        if self.is_closed() {
            return;
        }
        self.filled_qty = filled_qty.min(self.expected_qty);
        self.remaining_qty = (self.expected_qty - self.filled_qty).max(0.0);
        self.status = if self.remaining_qty > 0.0 {
            PositionStatus::Partial
        } else {
            PositionStatus::Active
        };
    }

    /// Force a close with the given reason. No-op from a terminal state.
    pub fn force_close(
        &mut self,
        reason: CloseReason,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<CloseEvent> {
        if self.is_closed() {
            return None;
        }
        self.close(reason, price, now)
    }

    fn close(
        &mut self,
        reason: CloseReason,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<CloseEvent> {
        self.status = PositionStatus::Closed;
        self.close_reason = Some(reason);

        // PnL accrues only on the filled share of the entry.
        let filled_share = if self.expected_qty > 0.0 {
            self.filled_qty / self.expected_qty
        } else {
            1.0
        };
        let pnl_usd = self.pnl_at(price) * filled_share;

        debug!(
            signal_id = %self.signal_id,
            mint = %self.mint,
            reason = reason.as_str(),
            pnl_usd,
            "Position closed"
        );

        Some(CloseEvent {
            signal_id: self.signal_id.clone(),
            mint: self.mint.clone(),
            reason,
            close_price: price,
            pnl_usd,
            ts: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn buy_position() -> Position {
        Position::open(
            "sig1".into(),
            "mintA".into(),
            Side::Buy,
            100.0,
            1_000.0,
            10.0,
            BracketParams {
                tp_pct: 0.05,
                sl_pct: -0.03,
                ttl_sec: 60,
            },
            Utc::now(),
            Some("tier1".into()),
        )
    }

    fn sell_position() -> Position {
        Position::open(
            "sig2".into(),
            "mintA".into(),
            Side::Sell,
            100.0,
            1_000.0,
            10.0,
            BracketParams {
                tp_pct: 0.05,
                sl_pct: -0.03,
                ttl_sec: 60,
            },
            Utc::now(),
            None,
        )
    }

    #[test]
    fn test_bracket_prices_committed_at_open() {
        let buy = buy_position();
        assert!((buy.tp_price - 105.0).abs() < 1e-9);
        assert!((buy.sl_price - 97.0).abs() < 1e-9);

        let sell = sell_position();
        assert!((sell.tp_price - 95.0).abs() < 1e-9);
        assert!((sell.sl_price - 103.0).abs() < 1e-9);
    }

    #[test]
    fn test_buy_tp_hit() {
        let mut position = buy_position();
        let event = position.tick(105.5, Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::TpHit);
        assert!(event.pnl_usd > 0.0);
        assert_eq!(position.status, PositionStatus::Closed);
    }

    #[test]
    fn test_buy_sl_hit() {
        let mut position = buy_position();
        let event = position.tick(96.0, Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::SlHit);
        assert!(event.pnl_usd < 0.0);
    }

    #[test]
    fn test_sell_mirrors_brackets() {
        let mut position = sell_position();
        // Price fell: short take-profit.
        let event = position.tick(94.0, Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::TpHit);
        assert!(event.pnl_usd > 0.0);

        let mut position = sell_position();
        // Price rose: short stop.
        let event = position.tick(104.0, Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::SlHit);
        assert!(event.pnl_usd < 0.0);
    }

    #[test]
    fn test_gap_tick_sl_wins() {
        // Degenerate bracket where one print satisfies both legs: a BUY
        // with sl above tp cannot happen from open(), so simulate a gap by
        // widening the position manually.
        let mut position = buy_position();
        position.tp_price = 100.5;
        position.sl_price = 101.0;

        let event = position.tick(100.8, Utc::now()).unwrap();
        assert_eq!(event.reason, CloseReason::SlHit);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut position = buy_position();
        // Within brackets but 120s after a 60s TTL.
        let later = position.entry_ts + Duration::seconds(120);
        let event = position.tick(101.0, later).unwrap();
        assert_eq!(event.reason, CloseReason::TtlExpired);
    }

    #[test]
    fn test_ttl_not_checked_when_bracket_hits() {
        let mut position = buy_position();
        let later = position.entry_ts + Duration::seconds(120);
        let event = position.tick(106.0, later).unwrap();
        assert_eq!(event.reason, CloseReason::TpHit);
    }

    #[test]
    fn test_terminal_state_is_idempotent() {
        let mut position = buy_position();
        position.tick(106.0, Utc::now()).unwrap();

        assert!(position.tick(90.0, Utc::now()).is_none());
        assert!(position
            .force_close(CloseReason::ManualClose, 90.0, Utc::now())
            .is_none());
        assert_eq!(position.close_reason, Some(CloseReason::TpHit));
    }

    #[test]
    fn test_partial_fill_tracking() {
        let mut position = buy_position();
        position.record_fill(4.0);
        assert_eq!(position.status, PositionStatus::Partial);
        assert!((position.remaining_qty - 6.0).abs() < 1e-9);

        position.record_fill(10.0);
        assert_eq!(position.status, PositionStatus::Active);
        assert_eq!(position.remaining_qty, 0.0);
    }

    #[test]
    fn test_partial_close_scales_pnl() {
        let mut position = buy_position();
        position.record_fill(5.0);
        let event = position
            .force_close(CloseReason::PartialTimeout, 102.0, Utc::now())
            .unwrap();
        // 2% move on 1000 USD at half fill = 10 USD.
        assert!((event.pnl_usd - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_force_close_reasons_stick() {
        let mut position = buy_position();
        let event = position
            .force_close(CloseReason::ReorgRollback, 100.0, Utc::now())
            .unwrap();
        assert_eq!(event.reason, CloseReason::ReorgRollback);
        assert_eq!(position.close_reason, Some(CloseReason::ReorgRollback));
    }

    #[test]
    fn test_close_reason_serializes_screaming_snake() {
        let json = serde_json::to_string(&CloseReason::TtlExpired).unwrap();
        assert_eq!(json, "\"TTL_EXPIRED\"");
    }
}

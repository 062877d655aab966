//! Order-manager actor
//!
//! Owns the open-position map. All transitions for a given position happen
//! on this actor's task, which serializes them; other components talk to it
//! over a bounded command channel.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::bracket::{CloseEvent, CloseReason, Position};
use super::partial::{FillAdjustment, PartialFillHandler};

/// Commands accepted by the order-manager actor.
#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Register a freshly submitted position.
    Open {
        position: Position,
        tx_sig: String,
    },
    /// Price observation for a mint; drives TP/SL/TTL for its positions.
    Tick { mint: String, price: f64 },
    /// Fill report from the execution adapter.
    Fill { signal_id: String, filled_qty: f64 },
    /// Operator or watchdog close.
    ForceClose {
        signal_id: String,
        reason: CloseReason,
        price: f64,
    },
    /// Periodic partial-fill deadline sweep.
    CheckTimeouts,
}

/// Events the actor publishes.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Closed(CloseEvent),
    PartialAdjustment(FillAdjustment),
}

/// Open-position bookkeeping plus the partial-fill watchdog.
pub struct OrderManager {
    positions: HashMap<String, Position>,
    last_price: HashMap<String, f64>,
    partial: PartialFillHandler,
}

impl OrderManager {
    pub fn new(partial_fill_timeout_secs: u64) -> Self {
        Self {
            positions: HashMap::new(),
            last_price: HashMap::new(),
            partial: PartialFillHandler::new(partial_fill_timeout_secs),
        }
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn get(&self, signal_id: &str) -> Option<&Position> {
        self.positions.get(signal_id)
    }

    /// Register a new position and start its fill deadline.
    pub fn open(&mut self, position: Position, tx_sig: &str, now: DateTime<Utc>) {
        info!(
            signal_id = %position.signal_id,
            mint = %position.mint,
            side = %position.side,
            size_usd = position.size_quote,
            "Position opened"
        );
        self.partial
            .register(&position.signal_id, tx_sig, position.expected_qty, now);
        self.positions
            .insert(position.signal_id.clone(), position);
    }

    /// Apply a price tick to every open position in the mint.
    pub fn tick(&mut self, mint: &str, price: f64, now: DateTime<Utc>) -> Vec<CloseEvent> {
        self.last_price.insert(mint.to_string(), price);

        let mut closes = vec![];
        for position in self.positions.values_mut() {
            if position.mint != mint {
                continue;
            }
            if let Some(event) = position.tick(price, now) {
                closes.push(event);
            }
        }
        self.reap_closed(&closes);
        closes
    }

    /// Record a fill report.
    pub fn record_fill(&mut self, signal_id: &str, filled_qty: f64) {
        self.partial.record_fill(signal_id, filled_qty);
        if let Some(position) = self.positions.get_mut(signal_id) {
            position.record_fill(filled_qty);
        } else {
            debug!(signal_id = %signal_id, "Fill for unknown position");
        }
    }

    /// Force-close one position. Idempotent from terminal states.
    pub fn force_close(
        &mut self,
        signal_id: &str,
        reason: CloseReason,
        price: f64,
        now: DateTime<Utc>,
    ) -> Option<CloseEvent> {
        let position = self.positions.get_mut(signal_id)?;
        let event = position.force_close(reason, price, now)?;
        self.partial.resolve(signal_id);
        self.positions.remove(signal_id);
        Some(event)
    }

    /// Sweep partial-fill deadlines, force-closing the losers at the last
    /// observed price.
    pub fn check_partial_timeouts(&mut self, now: DateTime<Utc>) -> Vec<OrderEvent> {
        let mut events = vec![];
        for adjustment in self.partial.check_timeouts(now) {
            let close_price = self
                .positions
                .get(&adjustment.signal_id)
                .map(|position| {
                    self.last_price
                        .get(&position.mint)
                        .copied()
                        .unwrap_or(position.entry_price)
                })
                .unwrap_or(0.0);

            if let Some(position) = self.positions.get_mut(&adjustment.signal_id) {
                if let Some(event) = position.force_close(CloseReason::PartialTimeout, close_price, now)
                {
                    events.push(OrderEvent::Closed(event));
                }
                let signal_id = adjustment.signal_id.clone();
                self.positions.remove(&signal_id);
            }
            events.push(OrderEvent::PartialAdjustment(adjustment));
        }
        events
    }

    fn reap_closed(&mut self, closes: &[CloseEvent]) {
        for event in closes {
            self.partial.resolve(&event.signal_id);
            self.positions.remove(&event.signal_id);
        }
    }

    /// Actor loop: drain commands, publish close/adjustment events. Exits
    /// when the command channel closes.
    pub async fn run(
        mut self,
        commands: async_channel::Receiver<OrderCommand>,
        events: async_channel::Sender<OrderEvent>,
    ) {
        while let Ok(command) = commands.recv().await {
            let now = Utc::now();
            let outcomes: Vec<OrderEvent> = match command {
                OrderCommand::Open { position, tx_sig } => {
                    self.open(position, &tx_sig, now);
                    vec![]
                }
                OrderCommand::Tick { mint, price } => self
                    .tick(&mint, price, now)
                    .into_iter()
                    .map(OrderEvent::Closed)
                    .collect(),
                OrderCommand::Fill {
                    signal_id,
                    filled_qty,
                } => {
                    self.record_fill(&signal_id, filled_qty);
                    vec![]
                }
                OrderCommand::ForceClose {
                    signal_id,
                    reason,
                    price,
                } => self
                    .force_close(&signal_id, reason, price, now)
                    .map(OrderEvent::Closed)
                    .into_iter()
                    .collect(),
                OrderCommand::CheckTimeouts => self.check_partial_timeouts(now),
            };

            for outcome in outcomes {
                if events.send(outcome).await.is_err() {
                    warn!("Order event channel closed, stopping order manager");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::bracket::BracketParams;
    use crate::types::Side;
    use chrono::Duration;

    fn position(signal_id: &str, mint: &str) -> Position {
        Position::open(
            signal_id.into(),
            mint.into(),
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

    #[test]
    fn test_tick_closes_only_matching_mint() {
        let mut manager = OrderManager::new(30);
        let now = Utc::now();
        manager.open(position("sig1", "mintA"), "tx1", now);
        manager.open(position("sig2", "mintB"), "tx2", now);
        manager.record_fill("sig1", 10.0);
        manager.record_fill("sig2", 10.0);

        let closes = manager.tick("mintA", 106.0, now);
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].signal_id, "sig1");
        assert_eq!(manager.open_count(), 1);
    }

    #[test]
    fn test_exactly_one_close_per_position() {
        let mut manager = OrderManager::new(30);
        let now = Utc::now();
        manager.open(position("sig1", "mintA"), "tx1", now);
        manager.record_fill("sig1", 10.0);

        let closes = manager.tick("mintA", 96.0, now);
        assert_eq!(closes.len(), 1);
        assert_eq!(closes[0].reason, CloseReason::SlHit);

        // The position is gone; later ticks and closes are no-ops.
        assert!(manager.tick("mintA", 96.0, now).is_empty());
        assert!(manager
            .force_close("sig1", CloseReason::ManualClose, 96.0, now)
            .is_none());
    }

    #[test]
    fn test_partial_timeout_forces_close() {
        let mut manager = OrderManager::new(30);
        let start = Utc::now();
        manager.open(position("sig1", "mintA"), "tx1", start);
        manager.record_fill("sig1", 4.0);
        manager.tick("mintA", 101.0, start);

        let events = manager.check_partial_timeouts(start + Duration::seconds(31));
        assert_eq!(events.len(), 2);

        let close = events
            .iter()
            .find_map(|event| match event {
                OrderEvent::Closed(close) => Some(close),
                _ => None,
            })
            .unwrap();
        assert_eq!(close.reason, CloseReason::PartialTimeout);
        assert!((close.close_price - 101.0).abs() < 1e-9);

        let adjustment = events
            .iter()
            .find_map(|event| match event {
                OrderEvent::PartialAdjustment(adjustment) => Some(adjustment),
                _ => None,
            })
            .unwrap();
        assert_eq!(adjustment.signal_id, "sig1");
        assert_eq!(adjustment.filled_qty, 4.0);
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn test_complete_fill_cancels_deadline() {
        let mut manager = OrderManager::new(30);
        let start = Utc::now();
        manager.open(position("sig1", "mintA"), "tx1", start);
        manager.record_fill("sig1", 10.0);

        let events = manager.check_partial_timeouts(start + Duration::seconds(31));
        assert!(events.is_empty());
        assert_eq!(manager.open_count(), 1);
    }

    #[tokio::test]
    async fn test_actor_loop_round_trip() {
        let (command_tx, command_rx) = async_channel::bounded(16);
        let (event_tx, event_rx) = async_channel::bounded(16);

        let manager = OrderManager::new(30);
        let handle = tokio::spawn(manager.run(command_rx, event_tx));

        command_tx
            .send(OrderCommand::Open {
                position: position("sig1", "mintA"),
                tx_sig: "tx1".into(),
            })
            .await
            .unwrap();
        command_tx
            .send(OrderCommand::Fill {
                signal_id: "sig1".into(),
                filled_qty: 10.0,
            })
            .await
            .unwrap();
        command_tx
            .send(OrderCommand::Tick {
                mint: "mintA".into(),
                price: 106.0,
            })
            .await
            .unwrap();

        let event = event_rx.recv().await.unwrap();
        match event {
            OrderEvent::Closed(close) => assert_eq!(close.reason, CloseReason::TpHit),
            other => panic!("unexpected event: {:?}", other),
        }

        drop(command_tx);
        handle.await.unwrap();
    }
}

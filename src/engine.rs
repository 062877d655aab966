//! Decision pipeline
//!
//! One decision task owns everything mutable here: gates, mode, edge, risk,
//! idempotency, open positions. Each incoming leader trade terminates in
//! exactly one signals record; each opened position terminates in exactly
//! one close record.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::chain::{ChainClient, QuoteRequest, QuoteRouter};
use crate::config::Config;
use crate::edge::{round_bps, EdgeCalculator, RegimeAdjuster};
use crate::error::{Error, Result};
use crate::gates::GateChain;
use crate::idempotency::{fingerprint, IdempotencyGuard};
use crate::mode::{ModeSelection, ModeSelector};
use crate::order::{
    BracketParams, CloseEvent, CloseReason, OrderEvent, OrderManager, Position,
};
use crate::output::{
    AdjustmentRecord, AdjustmentType, AuditLog, DailyStats, Decision, ExecutionMetricsRecord,
    JsonlWriter, SignalRecord,
};
use crate::panic::PanicSentinel;
use crate::profile::{WalletProfile, WalletProfileStore};
use crate::reject::RejectReason;
use crate::reorg::{ReorgEvent, ReorgGuard, TrackedTx};
use crate::risk::RiskEngine;
use crate::snapshot::{SnapshotStore, TokenSnapshot};
use crate::types::TradeEvent;

/// Optional external win-probability scorer.
pub trait WinScorer: Send + Sync {
    fn score(
        &self,
        event: &TradeEvent,
        snapshot: &TokenSnapshot,
        profile: Option<&WalletProfile>,
    ) -> Option<f64>;
}

/// Close record emitted once per position on the signals stream.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CloseRecord {
    pub schema_version: String,
    pub ts: DateTime<Utc>,
    pub signal_id: String,
    pub mint: String,
    pub close_reason: CloseReason,
    pub close_price: f64,
    pub pnl_usd: f64,
}

/// Execution counters surfaced in `execution_metrics.v1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecCounters {
    pub quotes_requested: u64,
    pub orders_submitted: u64,
    pub partial_fill_timeouts: u64,
    pub txs_dropped: u64,
    pub txs_reorged: u64,
}

/// Everything the engine remembers about a live entry.
#[derive(Debug, Clone)]
struct OpenEntry {
    leader: String,
    mint: String,
    side: crate::types::Side,
    tier: Option<String>,
    size_usd: f64,
    tx_sig: String,
    probe_candidate: bool,
}

/// The copy-trading decision engine.
pub struct Engine {
    config: Config,
    snapshots: Arc<SnapshotStore>,
    profiles: Arc<WalletProfileStore>,
    gates: GateChain,
    mode_selector: ModeSelector,
    edge: EdgeCalculator,
    regime: RegimeAdjuster,
    risk: RiskEngine,
    idempotency: IdempotencyGuard,
    orders: OrderManager,
    reorg: ReorgGuard,
    router: Arc<dyn QuoteRouter>,
    sentinel: Arc<PanicSentinel>,
    scorer: Option<Arc<dyn WinScorer>>,
    signals_out: Option<JsonlWriter>,
    audit: Arc<AuditLog>,
    open_entries: HashMap<String, OpenEntry>,
    daily: DailyStats,
    counters: ExecCounters,
    /// Latest value from the external regime timeline.
    risk_regime: f64,
    /// Dry-run execution: assume entry orders fill immediately in full.
    assume_immediate_fill: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        snapshots: Arc<SnapshotStore>,
        profiles: Arc<WalletProfileStore>,
        router: Arc<dyn QuoteRouter>,
        sentinel: Arc<PanicSentinel>,
        audit: Arc<AuditLog>,
        assume_immediate_fill: bool,
    ) -> Result<Self> {
        let gates = GateChain::new(
            &config.wallets,
            config.token_profile.gates.clone(),
            config.token_profile.security.clone(),
            config.token_profile.probe.clone(),
        );
        let mode_selector = ModeSelector::new(config.mode_selector.clone());
        let edge = EdgeCalculator::new(config.signals.min_edge_bps);
        let regime = RegimeAdjuster::new(config.regime.enabled, config.regime.alpha)?;
        let risk = RiskEngine::new(
            config.risk.clone(),
            config.portfolio.initial_equity_usd,
            config.portfolio.initial_bankroll_lamports,
        );
        let idempotency =
            IdempotencyGuard::new(Duration::from_secs(config.idempotency.window_secs));
        let orders = OrderManager::new(config.orders.partial_fill_timeout_secs);
        let reorg = ReorgGuard::new(config.reorg.clone());

        Ok(Self {
            config,
            snapshots,
            profiles,
            gates,
            mode_selector,
            edge,
            regime,
            risk,
            idempotency,
            orders,
            reorg,
            router,
            sentinel,
            scorer: None,
            signals_out: None,
            audit,
            open_entries: HashMap::new(),
            daily: DailyStats::new(Utc::now()),
            counters: ExecCounters::default(),
            risk_regime: 0.0,
            assume_immediate_fill,
        })
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn WinScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub async fn with_signals_file(mut self) -> Result<Self> {
        self.signals_out = Some(JsonlWriter::open(&self.config.output.signals_path).await?);
        Ok(self)
    }

    pub async fn attach_idempotency_journal(mut self) -> Result<Self> {
        self.idempotency = self
            .idempotency
            .with_journal(&self.config.idempotency.journal_path)
            .await?;
        Ok(self)
    }

    /// Latest regime timeline value, clamped on use.
    pub fn set_risk_regime(&mut self, value: f64) {
        self.risk_regime = value.clamp(-1.0, 1.0);
    }

    pub fn counters(&self) -> ExecCounters {
        self.counters
    }

    pub fn risk_state(&self) -> &crate::risk::PortfolioState {
        self.risk.state()
    }

    pub fn open_position_count(&self) -> usize {
        self.orders.open_count()
    }

    pub fn daily_stats(&self) -> &DailyStats {
        &self.daily
    }

    /// Process one leader trade end to end. Always returns the signals
    /// record that was emitted.
    pub async fn process_event(&mut self, event: TradeEvent) -> SignalRecord {
        let now = Utc::now();
        self.risk.check_daily_reset(now);

        let signal_id = fingerprint(
            &event.leader,
            &event.mint,
            event.side,
            event.ts_ms,
            self.config.idempotency.bucket_secs,
        );

        let snapshot = self.snapshots.get(&event.mint).await;
        let profile = self.profiles.get(&event.leader).await;

        let record = self
            .decide_and_execute(&event, &signal_id, &snapshot, profile.as_ref(), now)
            .await;

        self.daily.record_signal(record.decision);
        self.emit_signal(&record).await;
        record
    }

    async fn decide_and_execute(
        &mut self,
        event: &TradeEvent,
        signal_id: &str,
        snapshot: &TokenSnapshot,
        profile: Option<&WalletProfile>,
        now: DateTime<Utc>,
    ) -> SignalRecord {
        let mut record = self.skeleton_record(event, signal_id, now);

        // C4: gate chain.
        let gate = self.gates.evaluate(event, profile, snapshot, &self.sentinel);
        record.info = gate.info.iter().map(|tag| tag.to_string()).collect();
        if !gate.passed {
            record.reject_reason = gate.reject;
            return record;
        }

        // C5: mode.
        let selection = self.mode_selector.select(profile, Some(snapshot), event);
        record.mode = Some(selection.mode_id.clone());
        record.mode_reason = Some(selection.reason.as_str().to_string());
        if selection.reason == crate::mode::ModeReason::NoProfile {
            record.info.push(RejectReason::NoProfile.to_string());
        }
        let Some(mode_params) = self.config.mode_params(&selection.mode_id).cloned() else {
            // Validation guarantees this; demote to a reject in release.
            debug_assert!(false, "mode {} missing from config", selection.mode_id);
            record.reject_reason = Some(RejectReason::EvBelowThreshold);
            return record;
        };

        // C6 + C7: edge, regime adjustment, threshold.
        let p_model = self
            .scorer
            .as_ref()
            .and_then(|scorer| scorer.score(event, snapshot, profile));
        let evaluation = self.edge.evaluate(
            &mode_params,
            p_model,
            profile.map(|p| p.winrate_30d),
            self.config.risk.sizing.proxy_edge.win_p,
            snapshot.spread_bps.unwrap_or(0.0),
        );
        let edge_final = self.regime.adjust(evaluation.edge_raw, self.risk_regime);

        record.win_p = Some(evaluation.win_p);
        record.edge_raw_bps = Some(round_bps(evaluation.edge_raw));
        record.edge_final_bps = Some(round_bps(edge_final));
        record.risk_regime = Some(self.risk_regime);

        if !self.edge.meets_threshold(edge_final) {
            record.reject_reason = Some(RejectReason::EvBelowThreshold);
            return record;
        }

        // C8: risk checks and sizing.
        let tier = profile.map(|p| p.tier.as_str().to_string());
        if let Err(reason) = self.risk.check_entry(
            &event.mint,
            tier.as_deref(),
            selection.is_aggressive(),
            snapshot,
            profile,
            self.sentinel.is_panic_active(),
            now,
        ) {
            record.reject_reason = Some(reason);
            return record;
        }

        let mut size_usd = self.risk.size_position(
            &event.mint,
            evaluation.win_p,
            mode_params.tp_pct,
            mode_params.sl_pct,
        );
        let probe_candidate = gate.probe_cap_usd.is_some();
        if let Some(cap) = gate.probe_cap_usd {
            size_usd = size_usd.min(cap);
        }
        record.size_usd = Some(size_usd);

        // C9: idempotency lock around the build.
        let lock_ttl = Duration::from_secs(mode_params.ttl_sec);
        if !self.idempotency.acquire(signal_id, lock_ttl).await {
            record.reject_reason = Some(RejectReason::DuplicateExecution);
            return record;
        }

        match self
            .build_and_submit(event, signal_id, snapshot, &selection, &mode_params, size_usd, tier, probe_candidate, now)
            .await
        {
            Ok(tx_sig) => {
                record.decision = Decision::Enter;
                record.tx_sig = Some(tx_sig);
                // The lock outlives the build: it expires with the order
                // TTL, so a same-fingerprint event keeps deduplicating
                // while the position is in flight.
            }
            Err(reason) => {
                record.reject_reason = Some(reason);
                self.idempotency.release(signal_id).await;
            }
        }
        record
    }

    /// Quote, submit, and register the position. Any failure maps to a
    /// single reject tag.
    #[allow(clippy::too_many_arguments)]
    async fn build_and_submit(
        &mut self,
        event: &TradeEvent,
        signal_id: &str,
        snapshot: &TokenSnapshot,
        selection: &ModeSelection,
        mode_params: &crate::config::ModeConfig,
        size_usd: f64,
        tier: Option<String>,
        probe_candidate: bool,
        now: DateTime<Utc>,
    ) -> std::result::Result<String, RejectReason> {
        let volatility = snapshot.volatility_30s.unwrap_or(0.0);
        let (order_ttl_ms, slippage_bps) = self.execution_params(mode_params.ttl_sec, volatility);

        self.counters.quotes_requested += 1;
        let quote = self
            .router
            .quote(&QuoteRequest {
                mint: event.mint.clone(),
                side: event.side,
                notional_usd: size_usd,
                reference_price: event.price,
                slippage_bps,
            })
            .await
            .map_err(|e| {
                debug!(error = %e, "Quote failed");
                RejectReason::QuoteUnavailable
            })?;

        let receipt = self
            .router
            .submit(&quote, order_ttl_ms)
            .await
            .map_err(|e| match e {
                Error::BundleRejected(_) => RejectReason::JitoBundleRejected,
                _ => RejectReason::TxDropped,
            })?;
        self.counters.orders_submitted += 1;

        let position = Position::open(
            signal_id.to_string(),
            event.mint.clone(),
            event.side,
            quote.price,
            size_usd,
            quote.expected_qty,
            BracketParams {
                tp_pct: mode_params.tp_pct,
                sl_pct: mode_params.sl_pct,
                ttl_sec: mode_params.ttl_sec,
            },
            now,
            tier.clone(),
        );

        self.orders.open(position, &receipt.tx_sig, now);
        if self.assume_immediate_fill {
            self.orders.record_fill(signal_id, quote.expected_qty);
        }
        self.risk.on_position_opened(
            &event.mint,
            tier.as_deref(),
            size_usd,
            selection.is_aggressive(),
        );
        self.reorg.track(
            &receipt.tx_sig,
            TrackedTx::new(
                signal_id.to_string(),
                event.mint.clone(),
                tier.clone(),
                size_usd,
                now,
            ),
        );
        self.open_entries.insert(
            signal_id.to_string(),
            OpenEntry {
                leader: event.leader.clone(),
                mint: event.mint.clone(),
                side: event.side,
                tier,
                size_usd,
                tx_sig: receipt.tx_sig.clone(),
                probe_candidate,
            },
        );

        info!(
            signal_id = %signal_id,
            mint = %event.mint,
            mode = %selection.mode_id,
            size_usd,
            tx_sig = %receipt.tx_sig,
            "Entered position"
        );
        Ok(receipt.tx_sig)
    }

    /// Dynamic execution parameters from short-horizon volatility.
    fn execution_params(&self, base_ttl_sec: u64, volatility: f64) -> (u64, u32) {
        let dynamic = &self.config.dynamic_execution;
        let base_ttl_ms = base_ttl_sec * 1000;
        if !dynamic.enabled {
            return (base_ttl_ms, self.config.dynamic_execution.slippage_slope as u32);
        }

        let shrink = 1.0 / (1.0 + dynamic.ttl_vol_factor * volatility.max(0.0));
        let ttl_ms = ((base_ttl_ms as f64) * shrink).max(dynamic.min_ttl_ms as f64) as u64;
        let slippage =
            (dynamic.slippage_slope + dynamic.slippage_vol_mult * volatility.max(0.0)) as u32;
        (ttl_ms, slippage)
    }

    /// Drive TP/SL/TTL for one mint from a price observation.
    pub async fn process_tick(&mut self, mint: &str, price: f64, now: DateTime<Utc>) {
        let closes = self.orders.tick(mint, price, now);
        for close in closes {
            self.handle_close(close).await;
        }
    }

    /// Sweep partial-fill deadlines.
    pub async fn process_partial_timeouts(&mut self, now: DateTime<Utc>) {
        let events = self.orders.check_partial_timeouts(now);
        for event in events {
            match event {
                OrderEvent::Closed(close) => self.handle_close(close).await,
                OrderEvent::PartialAdjustment(adjustment) => {
                    self.counters.partial_fill_timeouts += 1;
                    self.audit
                        .append(AdjustmentRecord {
                            schema_version: "1.0".into(),
                            ts: adjustment.ts,
                            adjustment_type: AdjustmentType::PartialFill,
                            signal_id: adjustment.signal_id.clone(),
                            tx_sig: Some(adjustment.tx_sig.clone()),
                            trace_id: adjustment.trace_id.clone(),
                            reason: RejectReason::PartialFillTimeout.to_string(),
                            before_lamports: None,
                            after_lamports: None,
                        })
                        .await;
                }
            }
        }
    }

    /// Record a fill report from the execution adapter.
    pub fn process_fill(&mut self, signal_id: &str, filled_qty: f64) {
        self.orders.record_fill(signal_id, filled_qty);
    }

    /// Operator close.
    pub async fn manual_close(&mut self, signal_id: &str, price: f64, now: DateTime<Utc>) {
        if let Some(close) = self
            .orders
            .force_close(signal_id, CloseReason::ManualClose, price, now)
        {
            self.handle_close(close).await;
        }
    }

    /// Poll tracked transactions; apply rollbacks for reorged entries.
    pub async fn poll_reorgs(&mut self, client: &dyn ChainClient, now: DateTime<Utc>) -> Result<()> {
        let events = self.reorg.poll(client, now).await?;
        for event in events {
            match event {
                ReorgEvent::Dropped {
                    tx_sig,
                    signal_id,
                    mint,
                } => {
                    self.counters.txs_dropped += 1;
                    warn!(tx_sig = %tx_sig, signal_id = %signal_id, "Entry tx dropped, reverting");
                    self.rollback_entry(&signal_id, &mint, RejectReason::TxDropped, None, now)
                        .await;
                }
                ReorgEvent::Reorged {
                    tx_sig,
                    signal_id,
                    mint,
                    trace_id,
                    ..
                } => {
                    self.counters.txs_reorged += 1;
                    self.rollback_entry(
                        &signal_id,
                        &mint,
                        RejectReason::TxReorged,
                        Some((tx_sig, trace_id)),
                        now,
                    )
                    .await;
                }
            }
        }
        Ok(())
    }

    /// Invert the local effects of an entry whose tx never stuck.
    async fn rollback_entry(
        &mut self,
        signal_id: &str,
        mint: &str,
        tag: RejectReason,
        reorg_audit: Option<(String, String)>,
        now: DateTime<Utc>,
    ) {
        let Some(entry) = self.open_entries.remove(signal_id) else {
            return;
        };
        self.idempotency.release(signal_id).await;

        // The close is informational (no chain effects existed); PnL is
        // forced to zero by closing at entry price against zero fill.
        if let Some(position) = self.orders.get(signal_id) {
            let entry_price = position.entry_price;
            self.orders
                .force_close(signal_id, CloseReason::ReorgRollback, entry_price, now);
        }
        self.risk
            .revert_entry(mint, entry.tier.as_deref(), entry.size_usd);

        let (tx_sig, trace_id) = reorg_audit.unwrap_or((entry.tx_sig.clone(), String::new()));
        self.audit
            .append(AdjustmentRecord {
                schema_version: "1.0".into(),
                ts: now,
                adjustment_type: AdjustmentType::ReorgRollback,
                signal_id: signal_id.to_string(),
                tx_sig: Some(tx_sig),
                trace_id: if trace_id.is_empty() {
                    uuid::Uuid::new_v4().to_string()
                } else {
                    trace_id
                },
                reason: tag.to_string(),
                before_lamports: None,
                after_lamports: None,
            })
            .await;

        // Terminal tag on the signals stream for this signal.
        let record = SignalRecord {
            schema_version: SignalRecord::schema(),
            ts: now,
            signal_id: signal_id.to_string(),
            leader: entry.leader.clone(),
            mint: mint.to_string(),
            side: entry.side,
            decision: Decision::Skip,
            reject_reason: Some(tag),
            info: vec![],
            mode: None,
            mode_reason: None,
            edge_raw_bps: None,
            edge_final_bps: None,
            risk_regime: None,
            win_p: None,
            size_usd: Some(entry.size_usd),
            tx_sig: Some(entry.tx_sig),
            sim_exit_reason: None,
            event_ts_ms: now.timestamp_millis(),
        };
        self.emit_signal(&record).await;
    }

    async fn handle_close(&mut self, close: CloseEvent) {
        self.idempotency.release(&close.signal_id).await;
        let entry = self.open_entries.remove(&close.signal_id);
        if let Some(entry) = &entry {
            self.risk.on_position_closed(
                &entry.mint,
                entry.tier.as_deref(),
                entry.size_usd,
                close.pnl_usd,
            );
            self.reorg.resolve(&entry.tx_sig);
            if entry.probe_candidate {
                self.gates
                    .record_probe_result(&entry.mint, close.pnl_usd > 0.0);
            }
        }
        self.daily.record_close(close.pnl_usd);

        let record = CloseRecord {
            schema_version: "position_close.v1".into(),
            ts: close.ts,
            signal_id: close.signal_id.clone(),
            mint: close.mint.clone(),
            close_reason: close.reason,
            close_price: close.close_price,
            pnl_usd: close.pnl_usd,
        };
        if let Some(writer) = &self.signals_out {
            if let Err(e) = writer.append(&record).await {
                warn!(error = %e, "Close record write failed");
            }
        }
        info!(
            signal_id = %close.signal_id,
            reason = close.reason.as_str(),
            pnl_usd = close.pnl_usd,
            "Close recorded"
        );
    }

    /// One reconciliation pass (wired to the reconciler watchdog).
    pub async fn reconcile(
        &mut self,
        reconciler: &crate::reconciler::Reconciler,
        client: &dyn ChainClient,
    ) -> Result<()> {
        reconciler
            .reconcile_once(client, &mut self.risk, &self.audit)
            .await?;
        Ok(())
    }

    /// Prune expired idempotency locks.
    pub fn prune_idempotency(&mut self) -> usize {
        self.idempotency.prune()
    }

    /// Current execution metrics record.
    pub fn execution_metrics(&self, now: DateTime<Utc>) -> ExecutionMetricsRecord {
        ExecutionMetricsRecord {
            schema_version: "execution_metrics.v1".into(),
            ts: now,
            quotes_requested: self.counters.quotes_requested,
            orders_submitted: self.counters.orders_submitted,
            snapshot_fetch_failures: self.snapshots.fetch_failure_count(),
            partial_fill_timeouts: self.counters.partial_fill_timeouts,
            txs_dropped: self.counters.txs_dropped,
            txs_reorged: self.counters.txs_reorged,
        }
    }

    /// Daily metrics record for the current day.
    pub fn daily_metrics(&self) -> crate::output::DailyMetricsRecord {
        self.daily.to_record()
    }

    fn skeleton_record(
        &self,
        event: &TradeEvent,
        signal_id: &str,
        now: DateTime<Utc>,
    ) -> SignalRecord {
        SignalRecord {
            schema_version: SignalRecord::schema(),
            ts: now,
            signal_id: signal_id.to_string(),
            leader: event.leader.clone(),
            mint: event.mint.clone(),
            side: event.side,
            decision: Decision::Skip,
            reject_reason: None,
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
            event_ts_ms: event.ts_ms,
        }
    }

    async fn emit_signal(&self, record: &SignalRecord) {
        if let Some(writer) = &self.signals_out {
            if let Err(e) = writer.append(record).await {
                warn!(error = %e, "Signal record write failed");
            }
        }
    }
}

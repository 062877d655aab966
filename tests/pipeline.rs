//! End-to-end decision pipeline scenarios.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use copytrader::chain::{ChainClient, DryRunRouter, TxState};
use copytrader::config::Config;
use copytrader::engine::Engine;
use copytrader::error::Result;
use copytrader::output::{AdjustmentType, AuditLog, Decision};
use copytrader::panic::PanicSentinel;
use copytrader::profile::{WalletProfile, WalletProfileStore};
use copytrader::reject::RejectReason;
use copytrader::snapshot::{SnapshotProvider, SnapshotStore, TokenSnapshot};
use copytrader::types::{Side, Tier, TradeEvent};

/// Provider serving canned snapshots per mint.
struct StaticProvider {
    snapshots: HashMap<String, TokenSnapshot>,
}

#[async_trait]
impl SnapshotProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self, mint: &str) -> Result<TokenSnapshot> {
        Ok(self
            .snapshots
            .get(mint)
            .cloned()
            .unwrap_or_else(|| TokenSnapshot::empty(mint)))
    }
}

struct MockChain {
    slot: u64,
    states: Mutex<HashMap<String, TxState>>,
    balance: u64,
}

impl MockChain {
    fn set_state(&self, tx_sig: &str, state: TxState) {
        self.states.lock().unwrap().insert(tx_sig.into(), state);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_balance_lamports(&self) -> Result<u64> {
        Ok(self.balance)
    }

    async fn get_tx_state(&self, tx_sig: &str) -> Result<TxState> {
        Ok(self
            .states
            .lock()
            .unwrap()
            .get(tx_sig)
            .copied()
            .unwrap_or(TxState::NotFound))
    }

    async fn current_slot(&self) -> Result<u64> {
        Ok(self.slot)
    }
}

fn healthy_snapshot(mint: &str) -> TokenSnapshot {
    let mut snapshot = TokenSnapshot::empty(mint);
    snapshot.liquidity_usd = Some(50_000.0);
    snapshot.volume_24h_usd = Some(200_000.0);
    snapshot.spread_bps = Some(10.0);
    snapshot.top10_holders_pct = Some(30.0);
    snapshot.single_holder_pct = Some(8.0);
    snapshot.security.is_honeypot = Some(false);
    snapshot.security.mint_authority_present = Some(false);
    snapshot.security.freeze_authority_present = Some(false);
    snapshot.security.sim_success = Some(true);
    snapshot
}

fn leader_profile() -> WalletProfile {
    WalletProfile {
        wallet: "leader1".into(),
        tier: Tier::Tier1,
        roi_30d_pct: 25.0,
        winrate_30d: 0.80,
        trades_30d: 150,
        median_hold_sec: 30,
        avg_trade_size_usd: 500.0,
        consecutive_wins: 2,
        preferred_dex_concentration: 0.7,
        cluster_leader_score: 0.3,
    }
}

fn buy_event(ts_ms: i64) -> TradeEvent {
    TradeEvent {
        schema_version: "1.0".into(),
        ts_ms,
        leader: "leader1".into(),
        mint: "mintA".into(),
        side: Side::Buy,
        price: 0.002,
        notional_usd: 400.0,
        platform: "pumpswap".into(),
        tx_hash: format!("sig-{}", ts_ms),
        impulse_count: 0,
        impulse_max_pct: 0.0,
        extra: serde_json::Map::new(),
    }
}

struct Harness {
    engine: Engine,
    audit: Arc<AuditLog>,
    _sentinel_dir: tempfile::TempDir,
}

async fn harness(config: Config, snapshots: HashMap<String, TokenSnapshot>) -> Harness {
    let provider = Arc::new(StaticProvider { snapshots });
    let store = Arc::new(SnapshotStore::new(
        provider,
        None,
        Duration::from_secs(30),
    ));

    let dir = tempfile::tempdir().unwrap();
    let profiles = Arc::new(WalletProfileStore::new(dir.path().join("profiles.json")));
    profiles.upsert(leader_profile()).await;

    let sentinel = Arc::new(PanicSentinel::new(dir.path().join("PANIC")));
    let audit = Arc::new(AuditLog::new(64));

    let engine = Engine::new(
        config,
        store,
        profiles,
        Arc::new(DryRunRouter),
        sentinel,
        audit.clone(),
        true,
    )
    .unwrap();

    Harness {
        engine,
        audit,
        _sentinel_dir: dir,
    }
}

fn regime_config() -> Config {
    let mut config = Config::default();
    config.regime.enabled = true;
    config.regime.alpha = 0.3;
    config
}

#[tokio::test]
async fn scenario_happy_buy_enters_with_expected_edge() {
    let mut harness = harness(
        regime_config(),
        HashMap::from([("mintA".to_string(), healthy_snapshot("mintA"))]),
    )
    .await;
    harness.engine.set_risk_regime(-0.75);

    let record = harness.engine.process_event(buy_event(1_700_000_000_000)).await;

    assert_eq!(record.decision, Decision::Enter);
    assert_eq!(record.mode.as_deref(), Some("U"));
    assert_eq!(record.edge_raw_bps, Some(690));
    assert_eq!(record.edge_final_bps, Some(535));
    assert!(record.tx_sig.is_some());
    assert_eq!(harness.engine.open_position_count(), 1);
}

#[tokio::test]
async fn scenario_honeypot_skips() {
    let mut snapshot = healthy_snapshot("mintA");
    snapshot.security.is_honeypot = Some(true);

    let mut harness = harness(
        Config::default(),
        HashMap::from([("mintA".to_string(), snapshot)]),
    )
    .await;

    let record = harness.engine.process_event(buy_event(1_700_000_000_000)).await;

    assert_eq!(record.decision, Decision::Skip);
    assert_eq!(record.reject_reason, Some(RejectReason::HoneypotDetected));
    assert_eq!(harness.engine.open_position_count(), 0);
}

#[tokio::test]
async fn scenario_low_liquidity_skips_before_mode() {
    let mut snapshot = healthy_snapshot("mintA");
    snapshot.liquidity_usd = Some(5_000.0);

    let mut harness = harness(
        Config::default(),
        HashMap::from([("mintA".to_string(), snapshot)]),
    )
    .await;

    let record = harness.engine.process_event(buy_event(1_700_000_000_000)).await;

    assert_eq!(record.reject_reason, Some(RejectReason::MinLiquidityFail));
    assert!(record.mode.is_none());
}

#[tokio::test]
async fn scenario_exposure_cap_skips() {
    let mut config = Config::default();
    // Keep the position-count cap out of the way so the exposure cap is
    // what trips.
    config.risk.limits.max_open_positions = 50;
    config
        .risk
        .limits
        .tier_limits
        .get_mut("tier1")
        .unwrap()
        .max_open_positions = 50;

    let mut harness = harness(
        config,
        HashMap::from([("mintA".to_string(), healthy_snapshot("mintA"))]),
    )
    .await;

    // Default sizing yields 2% of 10k = 200 USD per entry; the 10%
    // per-token cap (1000 USD) saturates after five entries.
    let mut last = None;
    for i in 0..6 {
        let record = harness
            .engine
            .process_event(buy_event(1_700_000_000_000 + i * 60_000))
            .await;
        last = Some(record);
    }

    let record = last.unwrap();
    assert_eq!(record.decision, Decision::Skip);
    assert_eq!(record.reject_reason, Some(RejectReason::RiskMaxExposure));
    assert_eq!(harness.engine.open_position_count(), 5);
}

#[tokio::test]
async fn scenario_duplicate_fingerprint_rejected() {
    let mut harness = harness(
        Config::default(),
        HashMap::from([("mintA".to_string(), healthy_snapshot("mintA"))]),
    )
    .await;

    let first = harness.engine.process_event(buy_event(1_700_000_000_000)).await;
    assert_eq!(first.decision, Decision::Enter);

    // Same leader, mint, side, and time bucket: same fingerprint.
    let second = harness.engine.process_event(buy_event(1_700_000_000_001)).await;
    assert_eq!(second.decision, Decision::Skip);
    assert_eq!(
        second.reject_reason,
        Some(RejectReason::DuplicateExecution)
    );
}

#[tokio::test]
async fn scenario_panic_blocks_entries() {
    let mut harness = harness(
        Config::default(),
        HashMap::from([("mintA".to_string(), healthy_snapshot("mintA"))]),
    )
    .await;

    // Arm via the sentinel file the harness engine watches.
    std::fs::write(harness._sentinel_dir.path().join("PANIC"), "stop").unwrap();

    let record = harness.engine.process_event(buy_event(1_700_000_000_000)).await;
    assert_eq!(record.reject_reason, Some(RejectReason::PanicActive));
}

#[tokio::test]
async fn scenario_reorg_rolls_back_local_effects() {
    let mut harness = harness(
        Config::default(),
        HashMap::from([("mintA".to_string(), healthy_snapshot("mintA"))]),
    )
    .await;

    let record = harness.engine.process_event(buy_event(1_700_000_000_000)).await;
    assert_eq!(record.decision, Decision::Enter);
    let tx_sig = record.tx_sig.clone().unwrap();
    assert!(harness.engine.risk_state().exposure_by_token.contains_key("mintA"));

    let chain = MockChain {
        slot: 1_000,
        states: Mutex::new(HashMap::new()),
        balance: 0,
    };

    // Seen confirmed first, then gone: a rollback.
    chain.set_state(&tx_sig, TxState::Confirmed { slot: 995 });
    harness
        .engine
        .poll_reorgs(&chain, Utc::now())
        .await
        .unwrap();
    chain.set_state(&tx_sig, TxState::NotFound);
    harness
        .engine
        .poll_reorgs(&chain, Utc::now())
        .await
        .unwrap();

    assert_eq!(harness.engine.counters().txs_reorged, 1);
    assert_eq!(harness.engine.open_position_count(), 0);
    assert!(!harness
        .engine
        .risk_state()
        .exposure_by_token
        .contains_key("mintA"));

    let recent = harness.audit.recent().await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].adjustment_type, AdjustmentType::ReorgRollback);
    assert_eq!(recent[0].reason, RejectReason::TxReorged.to_string());
}

#[tokio::test]
async fn every_event_gets_exactly_one_tagged_record() {
    let mut bad_snapshot = healthy_snapshot("mintB");
    bad_snapshot.liquidity_usd = Some(1.0);

    let mut harness = harness(
        Config::default(),
        HashMap::from([
            ("mintA".to_string(), healthy_snapshot("mintA")),
            ("mintB".to_string(), bad_snapshot),
        ]),
    )
    .await;

    let mut events = vec![buy_event(1_700_000_000_000)];
    let mut skip_event = buy_event(1_700_000_100_000);
    skip_event.mint = "mintB".into();
    events.push(skip_event);
    let mut unknown_leader = buy_event(1_700_000_200_000);
    unknown_leader.leader = "stranger".into();
    events.push(unknown_leader);

    for event in events {
        let record = harness.engine.process_event(event).await;
        match record.decision {
            Decision::Enter => assert!(record.reject_reason.is_none()),
            Decision::Skip => assert!(record.reject_reason.is_some()),
        }
    }

    let stats = harness.engine.daily_stats();
    assert_eq!(stats.signals_total, 3);
    assert_eq!(stats.entered, 1);
    assert_eq!(stats.skipped, 2);
}

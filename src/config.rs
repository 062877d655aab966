//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Main configuration structure
///
/// Unknown top-level sections fail validation; recognized sections accept
/// forward-compatible keys through their serde defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub token_profile: TokenProfileConfig,
    #[serde(default)]
    pub mode_selector: ModeSelectorConfig,
    #[serde(default = "default_modes")]
    pub modes: HashMap<String, ModeConfig>,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub regime: RegimeConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub dynamic_execution: DynamicExecutionConfig,
    #[serde(default)]
    pub reorg: ReorgConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub panic: PanicConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_rpc_endpoint")]
    pub endpoint: String,
    /// Trading wallet public key (base58); read-only use.
    #[serde(default)]
    pub wallet_pubkey: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: default_rpc_endpoint(),
            wallet_pubkey: String::new(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

/// External DEX router endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_ms: default_provider_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Trade-event JSONL source. "-" reads stdin.
    #[serde(default = "default_ingest_path")]
    pub path: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            path: default_ingest_path(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default)]
    pub primary_url: String,
    #[serde(default)]
    pub secondary_url: String,
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_snapshot_ttl_secs(),
            primary_url: String::new(),
            secondary_url: String::new(),
            provider_timeout_ms: default_provider_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
    /// Wallet profile JSON file, loaded at startup.
    #[serde(default = "default_profiles_path")]
    pub profiles_path: String,
    /// Explicitly enabled leader wallets. Empty = any profiled wallet.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Always-blocked leader wallets.
    #[serde(default)]
    pub blocked: Vec<String>,
    /// Tiers allowed to trigger entries.
    #[serde(default = "default_allowed_tiers")]
    pub allowed_tiers: Vec<String>,
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            profiles_path: default_profiles_path(),
            allowlist: vec![],
            blocked: vec![],
            allowed_tiers: default_allowed_tiers(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenProfileConfig {
    #[serde(default)]
    pub gates: TokenGatesConfig,
    #[serde(default)]
    pub security: TokenSecurityConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenGatesConfig {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_min_volume_24h_usd")]
    pub min_volume_24h_usd: f64,
    #[serde(default = "default_max_spread_bps")]
    pub max_spread_bps: u32,
}

impl Default for TokenGatesConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_min_liquidity_usd(),
            min_volume_24h_usd: default_min_volume_24h_usd(),
            max_spread_bps: default_max_spread_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenSecurityConfig {
    #[serde(default = "default_true")]
    pub require_honeypot_safe: bool,
    #[serde(default = "default_max_top_holders_pct")]
    pub max_top_holders_pct: f64,
    #[serde(default = "default_max_single_holder_pct")]
    pub max_single_holder_pct: f64,
}

impl Default for TokenSecurityConfig {
    fn default() -> Self {
        Self {
            require_honeypot_safe: true,
            max_top_holders_pct: default_max_top_holders_pct(),
            max_single_holder_pct: default_max_single_holder_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_probe_cost_usd")]
    pub max_probe_cost_usd: f64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_probe_cost_usd: default_max_probe_cost_usd(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeSelectorConfig {
    #[serde(default = "default_mode")]
    pub default_mode: String,
    /// Ascending hold-time boundaries bucketing U | S | M | L.
    #[serde(default = "default_hold_thresholds")]
    pub hold_thresholds_sec: Vec<u64>,
    #[serde(default)]
    pub enable_aggressive: bool,
    #[serde(default = "default_aggressive_min_impulse_count")]
    pub aggressive_min_impulse_count: u32,
    #[serde(default = "default_aggressive_min_impulse_pct")]
    pub aggressive_min_impulse_pct: f64,
}

impl Default for ModeSelectorConfig {
    fn default() -> Self {
        Self {
            default_mode: default_mode(),
            hold_thresholds_sec: default_hold_thresholds(),
            enable_aggressive: false,
            aggressive_min_impulse_count: default_aggressive_min_impulse_count(),
            aggressive_min_impulse_pct: default_aggressive_min_impulse_pct(),
        }
    }
}

/// Per-mode bracket parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ModeConfig {
    pub ttl_sec: u64,
    /// Take-profit as a fraction of entry (0.10 = +10%).
    pub tp_pct: f64,
    /// Stop-loss as a negative fraction of entry (-0.05 = -5%).
    pub sl_pct: f64,
    #[serde(default)]
    pub hold_sec_min: u64,
    #[serde(default = "default_hold_sec_max")]
    pub hold_sec_max: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_min_edge_bps")]
    pub min_edge_bps: i64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            min_edge_bps: default_min_edge_bps(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegimeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Sensitivity to the external risk regime, in [0, 0.5].
    #[serde(default = "default_regime_alpha")]
    pub alpha: f64,
    /// Regime timeline source label (adapter-resolved).
    #[serde(default)]
    pub source: String,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            alpha: default_regime_alpha(),
            source: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RiskConfig {
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub limits: RiskLimitsConfig,
    #[serde(default)]
    pub aggressive: AggressiveSafetyConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SizingMethod {
    FractionalKelly,
    FixedPct,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_sizing_method")]
    pub method: SizingMethod,
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    #[serde(default = "default_min_pos_pct")]
    pub min_pos_pct: f64,
    #[serde(default = "default_max_pos_pct")]
    pub max_pos_pct: f64,
    #[serde(default = "default_fixed_pct_of_bankroll")]
    pub fixed_pct_of_bankroll: f64,
    #[serde(default)]
    pub proxy_edge: ProxyEdgeConfig,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            method: default_sizing_method(),
            kelly_fraction: default_kelly_fraction(),
            min_pos_pct: default_min_pos_pct(),
            max_pos_pct: default_max_pos_pct(),
            fixed_pct_of_bankroll: default_fixed_pct_of_bankroll(),
            proxy_edge: ProxyEdgeConfig::default(),
        }
    }
}

/// Fallback win-probability proxy used by Kelly sizing when neither a model
/// score nor a wallet winrate is available.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyEdgeConfig {
    #[serde(default = "default_proxy_win_p")]
    pub win_p: f64,
}

impl Default for ProxyEdgeConfig {
    fn default() -> Self {
        Self {
            win_p: default_proxy_win_p(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimitsConfig {
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    /// Per-tier open-position caps, keyed by tier label.
    #[serde(default = "default_tier_limits")]
    pub tier_limits: HashMap<String, TierLimitConfig>,
    #[serde(default = "default_max_exposure_per_token_pct")]
    pub max_exposure_per_token_pct: f64,
}

impl Default for RiskLimitsConfig {
    fn default() -> Self {
        Self {
            max_open_positions: default_max_open_positions(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            cooldown: CooldownConfig::default(),
            tier_limits: default_tier_limits(),
            max_exposure_per_token_pct: default_max_exposure_per_token_pct(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TierLimitConfig {
    pub max_open_positions: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_cooldown_duration_secs")]
    pub duration_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: default_max_consecutive_losses(),
            duration_secs: default_cooldown_duration_secs(),
        }
    }
}

/// Extra gates applied before any aggressive-mode entry.
#[derive(Debug, Clone, Deserialize)]
pub struct AggressiveSafetyConfig {
    #[serde(default = "default_aggr_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_aggr_min_winrate")]
    pub min_winrate_30d: f64,
    #[serde(default = "default_aggr_min_roi_pct")]
    pub min_roi_30d_pct: f64,
    /// Stricter daily-loss cap while in aggressive modes.
    #[serde(default = "default_aggr_max_daily_loss_pct")]
    pub max_daily_loss_pct: f64,
    #[serde(default = "default_aggr_max_daily_trades")]
    pub max_daily_trades: u32,
}

impl Default for AggressiveSafetyConfig {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_aggr_min_liquidity_usd(),
            min_winrate_30d: default_aggr_min_winrate(),
            min_roi_30d_pct: default_aggr_min_roi_pct(),
            max_daily_loss_pct: default_aggr_max_daily_loss_pct(),
            max_daily_trades: default_aggr_max_daily_trades(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdempotencyConfig {
    /// Timestamp bucket width used in the decision fingerprint.
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
    /// Minimum lock TTL; the effective TTL is max(this, order TTL).
    #[serde(default = "default_idempotency_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_journal_path")]
    pub journal_path: String,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            bucket_secs: default_bucket_secs(),
            window_secs: default_idempotency_window_secs(),
            journal_path: default_journal_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    #[serde(default = "default_price_poll_interval_ms")]
    pub price_poll_interval_ms: u64,
    #[serde(default = "default_partial_fill_timeout_secs")]
    pub partial_fill_timeout_secs: u64,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            price_poll_interval_ms: default_price_poll_interval_ms(),
            partial_fill_timeout_secs: default_partial_fill_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicExecutionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// TTL shrink per unit of 30s volatility.
    #[serde(default = "default_ttl_vol_factor")]
    pub ttl_vol_factor: f64,
    #[serde(default = "default_min_ttl_ms")]
    pub min_ttl_ms: u64,
    /// Base slippage in bps.
    #[serde(default = "default_slippage_slope")]
    pub slippage_slope: f64,
    /// Additional slippage bps per unit of 30s volatility.
    #[serde(default = "default_slippage_vol_mult")]
    pub slippage_vol_mult: f64,
}

impl Default for DynamicExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_vol_factor: default_ttl_vol_factor(),
            min_ttl_ms: default_min_ttl_ms(),
            slippage_slope: default_slippage_slope(),
            slippage_vol_mult: default_slippage_vol_mult(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReorgConfig {
    #[serde(default = "default_reorg_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Age after which an unconfirmed tx counts as dropped.
    #[serde(default = "default_dropped_grace_secs")]
    pub dropped_grace_secs: u64,
    /// Block-height gap above which a confirmed tx counts as finalized.
    #[serde(default = "default_finalized_gap")]
    pub finalized_gap: u64,
}

impl Default for ReorgConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_reorg_poll_interval_secs(),
            dropped_grace_secs: default_dropped_grace_secs(),
            finalized_gap: default_finalized_gap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reconciler_interval_secs")]
    pub interval_seconds: u64,
    #[serde(default = "default_max_delta_lamports")]
    pub max_delta_without_alert_lamports: u64,
    #[serde(default = "default_warning_threshold_lamports")]
    pub warning_threshold_lamports: u64,
    #[serde(default = "default_critical_threshold_lamports")]
    pub critical_threshold_lamports: u64,
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_reconciler_interval_secs(),
            max_delta_without_alert_lamports: default_max_delta_lamports(),
            warning_threshold_lamports: default_warning_threshold_lamports(),
            critical_threshold_lamports: default_critical_threshold_lamports(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PanicConfig {
    #[serde(default = "default_sentinel_path")]
    pub sentinel_path: String,
}

impl Default for PanicConfig {
    fn default() -> Self {
        Self {
            sentinel_path: default_sentinel_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_signals_path")]
    pub signals_path: String,
    #[serde(default = "default_daily_metrics_path")]
    pub daily_metrics_path: String,
    #[serde(default = "default_execution_metrics_path")]
    pub execution_metrics_path: String,
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
    #[serde(default = "default_audit_log_max_entries")]
    pub audit_log_max_entries: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            signals_path: default_signals_path(),
            daily_metrics_path: default_daily_metrics_path(),
            execution_metrics_path: default_execution_metrics_path(),
            audit_log_path: default_audit_log_path(),
            audit_log_max_entries: default_audit_log_max_entries(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_initial_equity_usd")]
    pub initial_equity_usd: f64,
    #[serde(default)]
    pub initial_bankroll_lamports: u64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_equity_usd: default_initial_equity_usd(),
            initial_bankroll_lamports: 0,
        }
    }
}

// Default value functions
fn default_rpc_endpoint() -> String {
    std::env::var("RPC_ENDPOINT").unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_ingest_path() -> String {
    "-".into()
}

fn default_channel_capacity() -> usize {
    10000
}

fn default_snapshot_ttl_secs() -> u64 {
    30
}

fn default_provider_timeout_ms() -> u64 {
    5000
}

fn default_profiles_path() -> String {
    "profiles.json".into()
}

fn default_allowed_tiers() -> Vec<String> {
    vec!["tier1".into(), "tier2".into()]
}

fn default_min_liquidity_usd() -> f64 {
    15_000.0
}

fn default_min_volume_24h_usd() -> f64 {
    50_000.0
}

fn default_max_spread_bps() -> u32 {
    150
}

fn default_max_top_holders_pct() -> f64 {
    60.0
}

fn default_max_single_holder_pct() -> f64 {
    25.0
}

fn default_max_probe_cost_usd() -> f64 {
    25.0
}

fn default_mode() -> String {
    "S".into()
}

fn default_hold_thresholds() -> Vec<u64> {
    vec![120, 900, 3600]
}

fn default_aggressive_min_impulse_count() -> u32 {
    3
}

fn default_aggressive_min_impulse_pct() -> f64 {
    8.0
}

fn default_hold_sec_max() -> u64 {
    86_400
}

fn default_min_edge_bps() -> i64 {
    200
}

fn default_regime_alpha() -> f64 {
    0.3
}

fn default_sizing_method() -> SizingMethod {
    SizingMethod::FractionalKelly
}

fn default_kelly_fraction() -> f64 {
    0.25
}

fn default_min_pos_pct() -> f64 {
    0.25
}

fn default_max_pos_pct() -> f64 {
    2.0
}

fn default_fixed_pct_of_bankroll() -> f64 {
    1.0
}

fn default_proxy_win_p() -> f64 {
    0.55
}

fn default_max_open_positions() -> usize {
    5
}

fn default_max_daily_loss_pct() -> f64 {
    5.0
}

fn default_max_consecutive_losses() -> u32 {
    4
}

fn default_cooldown_duration_secs() -> u64 {
    900
}

fn default_tier_limits() -> HashMap<String, TierLimitConfig> {
    HashMap::from([
        (
            "tier1".to_string(),
            TierLimitConfig {
                max_open_positions: 3,
            },
        ),
        (
            "tier2".to_string(),
            TierLimitConfig {
                max_open_positions: 2,
            },
        ),
        (
            "tier3".to_string(),
            TierLimitConfig {
                max_open_positions: 1,
            },
        ),
    ])
}

fn default_max_exposure_per_token_pct() -> f64 {
    10.0
}

fn default_aggr_min_liquidity_usd() -> f64 {
    50_000.0
}

fn default_aggr_min_winrate() -> f64 {
    0.60
}

fn default_aggr_min_roi_pct() -> f64 {
    15.0
}

fn default_aggr_max_daily_loss_pct() -> f64 {
    2.5
}

fn default_aggr_max_daily_trades() -> u32 {
    10
}

fn default_bucket_secs() -> u64 {
    5
}

fn default_idempotency_window_secs() -> u64 {
    120
}

fn default_journal_path() -> String {
    "idempotency.jsonl".into()
}

fn default_price_poll_interval_ms() -> u64 {
    1000
}

fn default_partial_fill_timeout_secs() -> u64 {
    30
}

fn default_ttl_vol_factor() -> f64 {
    0.5
}

fn default_min_ttl_ms() -> u64 {
    5000
}

fn default_slippage_slope() -> f64 {
    50.0
}

fn default_slippage_vol_mult() -> f64 {
    25.0
}

fn default_reorg_poll_interval_secs() -> u64 {
    5
}

fn default_dropped_grace_secs() -> u64 {
    60
}

fn default_finalized_gap() -> u64 {
    32
}

fn default_reconciler_interval_secs() -> u64 {
    60
}

fn default_max_delta_lamports() -> u64 {
    100_000
}

fn default_warning_threshold_lamports() -> u64 {
    10_000_000
}

fn default_critical_threshold_lamports() -> u64 {
    100_000_000
}

fn default_sentinel_path() -> String {
    "PANIC".into()
}

fn default_signals_path() -> String {
    "signals.jsonl".into()
}

fn default_daily_metrics_path() -> String {
    "daily_metrics.jsonl".into()
}

fn default_execution_metrics_path() -> String {
    "execution_metrics.jsonl".into()
}

fn default_audit_log_path() -> String {
    "adjustments.jsonl".into()
}

fn default_audit_log_max_entries() -> usize {
    10_000
}

fn default_initial_equity_usd() -> f64 {
    10_000.0
}

fn default_true() -> bool {
    true
}

fn default_modes() -> HashMap<String, ModeConfig> {
    HashMap::from([
        (
            "U".to_string(),
            ModeConfig {
                ttl_sec: 60,
                tp_pct: 0.10,
                sl_pct: -0.05,
                hold_sec_min: 0,
                hold_sec_max: 120,
            },
        ),
        (
            "S".to_string(),
            ModeConfig {
                ttl_sec: 180,
                tp_pct: 0.15,
                sl_pct: -0.07,
                hold_sec_min: 60,
                hold_sec_max: 900,
            },
        ),
        (
            "M".to_string(),
            ModeConfig {
                ttl_sec: 900,
                tp_pct: 0.25,
                sl_pct: -0.10,
                hold_sec_min: 300,
                hold_sec_max: 3600,
            },
        ),
        (
            "L".to_string(),
            ModeConfig {
                ttl_sec: 3600,
                tp_pct: 0.40,
                sl_pct: -0.15,
                hold_sec_min: 1800,
                hold_sec_max: 86_400,
            },
        ),
        (
            "U_aggr".to_string(),
            ModeConfig {
                ttl_sec: 45,
                tp_pct: 0.14,
                sl_pct: -0.05,
                hold_sec_min: 0,
                hold_sec_max: 90,
            },
        ),
        (
            "S_aggr".to_string(),
            ModeConfig {
                ttl_sec: 120,
                tp_pct: 0.20,
                sl_pct: -0.07,
                hold_sec_min: 30,
                hold_sec_max: 600,
            },
        ),
        (
            "M_aggr".to_string(),
            ModeConfig {
                ttl_sec: 600,
                tp_pct: 0.32,
                sl_pct: -0.10,
                hold_sec_min: 180,
                hold_sec_max: 2400,
            },
        ),
        (
            "L_aggr".to_string(),
            ModeConfig {
                ttl_sec: 2400,
                tp_pct: 0.50,
                sl_pct: -0.15,
                hold_sec_min: 900,
                hold_sec_max: 43_200,
            },
        ),
    ])
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix COPYTRADER_)
            .add_source(
                config::Environment::with_prefix("COPYTRADER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Mode table must cover the selector's reachable modes
        if !self.modes.contains_key(&self.mode_selector.default_mode) {
            anyhow::bail!(
                "default_mode '{}' has no entry in [modes]",
                self.mode_selector.default_mode
            );
        }
        for base in ["U", "S", "M", "L"] {
            if !self.modes.contains_key(base) {
                anyhow::bail!("missing [modes.{}] entry", base);
            }
            if self.mode_selector.enable_aggressive {
                let aggr = format!("{}_aggr", base);
                if !self.modes.contains_key(&aggr) {
                    anyhow::bail!("aggressive enabled but missing [modes.{}] entry", aggr);
                }
            }
        }

        for (name, mode) in &self.modes {
            if mode.tp_pct <= 0.0 {
                anyhow::bail!("modes.{}.tp_pct must be positive", name);
            }
            if mode.sl_pct >= 0.0 {
                anyhow::bail!("modes.{}.sl_pct must be negative", name);
            }
            if mode.ttl_sec == 0 {
                anyhow::bail!("modes.{}.ttl_sec must be positive", name);
            }
        }

        if self.mode_selector.hold_thresholds_sec.len() != 3 {
            anyhow::bail!("mode_selector.hold_thresholds_sec must have exactly 3 boundaries");
        }
        if !self
            .mode_selector
            .hold_thresholds_sec
            .windows(2)
            .all(|w| w[0] < w[1])
        {
            anyhow::bail!("mode_selector.hold_thresholds_sec must be strictly ascending");
        }

        // Regime sensitivity
        if !(0.0..=0.5).contains(&self.regime.alpha) {
            anyhow::bail!("regime.alpha must be in [0, 0.5], got {}", self.regime.alpha);
        }

        // Sizing bounds
        let sizing = &self.risk.sizing;
        if !(0.0..=1.0).contains(&sizing.kelly_fraction) {
            anyhow::bail!("risk.sizing.kelly_fraction must be in [0, 1]");
        }
        if sizing.min_pos_pct < 0.0 || sizing.max_pos_pct <= 0.0 {
            anyhow::bail!("risk.sizing position bounds must be non-negative");
        }
        if sizing.min_pos_pct > sizing.max_pos_pct {
            anyhow::bail!(
                "risk.sizing.min_pos_pct {} exceeds max_pos_pct {}",
                sizing.min_pos_pct,
                sizing.max_pos_pct
            );
        }
        if !(0.0..=1.0).contains(&sizing.proxy_edge.win_p) {
            anyhow::bail!("risk.sizing.proxy_edge.win_p must be in [0, 1]");
        }

        // Risk limits
        let limits = &self.risk.limits;
        if limits.max_open_positions == 0 {
            anyhow::bail!("risk.limits.max_open_positions must be positive");
        }
        if limits.max_daily_loss_pct <= 0.0 {
            anyhow::bail!("risk.limits.max_daily_loss_pct must be positive");
        }
        if limits.max_exposure_per_token_pct <= 0.0 {
            anyhow::bail!("risk.limits.max_exposure_per_token_pct must be positive");
        }
        for tier in limits.tier_limits.keys() {
            if !matches!(tier.as_str(), "tier1" | "tier2" | "tier3") {
                anyhow::bail!("unknown tier '{}' in risk.limits.tier_limits", tier);
            }
        }

        // Gates
        if self.token_profile.gates.max_spread_bps > 10_000 {
            anyhow::bail!("token_profile.gates.max_spread_bps cannot exceed 10000 (100%)");
        }
        if !(0.0..=100.0).contains(&self.token_profile.security.max_top_holders_pct) {
            anyhow::bail!("token_profile.security.max_top_holders_pct must be in [0, 100]");
        }

        for wallet in self.wallets.allowlist.iter().chain(&self.wallets.blocked) {
            if wallet.len() < 32 || wallet.len() > 44 {
                anyhow::bail!("Invalid wallet address: {}", wallet);
            }
        }
        for tier in &self.wallets.allowed_tiers {
            if !matches!(tier.as_str(), "tier1" | "tier2" | "tier3") {
                anyhow::bail!("unknown tier '{}' in wallets.allowed_tiers", tier);
            }
        }

        // Reconciler thresholds must be ordered
        let rec = &self.reconciler;
        if rec.max_delta_without_alert_lamports > rec.warning_threshold_lamports
            || rec.warning_threshold_lamports > rec.critical_threshold_lamports
        {
            anyhow::bail!(
                "reconciler thresholds must satisfy max_delta <= warning <= critical"
            );
        }

        if self.portfolio.initial_equity_usd <= 0.0 {
            anyhow::bail!("portfolio.initial_equity_usd must be positive");
        }

        Ok(())
    }

    /// Parameters for a mode id, if configured.
    pub fn mode_params(&self, mode: &str) -> Option<&ModeConfig> {
        self.modes.get(mode)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  RPC:
    endpoint: {}
    timeout: {}ms
  Snapshot:
    ttl: {}s
    primary: {}
    secondary: {}
  Gates:
    min_liquidity: ${}
    min_volume_24h: ${}
    max_spread: {}bps
    require_honeypot_safe: {}
  Signals:
    min_edge: {}bps
  Regime:
    enabled: {}
    alpha: {}
  Sizing:
    method: {:?}
    kelly_fraction: {}
    pos_pct: [{}, {}]
  Limits:
    max_open_positions: {}
    max_daily_loss: {}%
    max_exposure_per_token: {}%
  Reconciler:
    enabled: {}
    interval: {}s
  Panic sentinel: {}
"#,
            mask_url(&self.rpc.endpoint),
            self.rpc.timeout_ms,
            self.snapshot.ttl_secs,
            mask_url(&self.snapshot.primary_url),
            mask_url(&self.snapshot.secondary_url),
            self.token_profile.gates.min_liquidity_usd,
            self.token_profile.gates.min_volume_24h_usd,
            self.token_profile.gates.max_spread_bps,
            self.token_profile.security.require_honeypot_safe,
            self.signals.min_edge_bps,
            self.regime.enabled,
            self.regime.alpha,
            self.risk.sizing.method,
            self.risk.sizing.kelly_fraction,
            self.risk.sizing.min_pos_pct,
            self.risk.sizing.max_pos_pct,
            self.risk.limits.max_open_positions,
            self.risk.limits.max_daily_loss_pct,
            self.risk.limits.max_exposure_per_token_pct,
            self.reconciler.enabled,
            self.reconciler.interval_seconds,
            self.panic.sentinel_path,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc: RpcConfig::default(),
            router: RouterConfig::default(),
            ingest: IngestConfig::default(),
            snapshot: SnapshotConfig::default(),
            wallets: WalletsConfig::default(),
            token_profile: TokenProfileConfig::default(),
            mode_selector: ModeSelectorConfig::default(),
            modes: default_modes(),
            signals: SignalsConfig::default(),
            regime: RegimeConfig::default(),
            risk: RiskConfig::default(),
            idempotency: IdempotencyConfig::default(),
            orders: OrdersConfig::default(),
            dynamic_execution: DynamicExecutionConfig::default(),
            reorg: ReorgConfig::default(),
            reconciler: ReconcilerConfig::default(),
            panic: PanicConfig::default(),
            output: OutputConfig::default(),
            portfolio: PortfolioConfig::default(),
        }
    }
}

//! Reject-reason registry
//!
//! Every path that declines to enter a trade tags the outcome with exactly
//! one reason from this closed set. The enum is the registry: an unknown tag
//! cannot be constructed.

use serde::{Deserialize, Serialize};

/// Machine-readable reason a signal did not result in an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    // Gate chain
    PanicActive,
    WalletTierBlocked,
    MinLiquidityFail,
    MinVolumeFail,
    SpreadTooHigh,
    HoneypotDetected,
    FreezeAuthorityPresent,
    MintAuthorityPresent,
    TopHoldersConcentrated,

    // Risk engine
    RiskKillSwitch,
    RiskCooldown,
    RiskMaxPositions,
    RiskWalletTierLimit,
    RiskMaxExposure,
    RiskAggressiveBlocked,

    // Edge / EV
    EvBelowThreshold,

    // Execution
    DuplicateExecution,
    QuoteUnavailable,
    TxDropped,
    TxReorged,
    PartialFillUnresolved,
    PartialFillTimeout,
    JitoBundleRejected,

    // Mode selection fallback (informational on the signals stream)
    NoProfile,
}

impl RejectReason {
    /// Stable wire tag for this reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::PanicActive => "panic_active",
            RejectReason::WalletTierBlocked => "wallet_tier_blocked",
            RejectReason::MinLiquidityFail => "min_liquidity_fail",
            RejectReason::MinVolumeFail => "min_volume_fail",
            RejectReason::SpreadTooHigh => "spread_too_high",
            RejectReason::HoneypotDetected => "honeypot_detected",
            RejectReason::FreezeAuthorityPresent => "freeze_authority_present",
            RejectReason::MintAuthorityPresent => "mint_authority_present",
            RejectReason::TopHoldersConcentrated => "top_holders_concentrated",
            RejectReason::RiskKillSwitch => "risk_kill_switch",
            RejectReason::RiskCooldown => "risk_cooldown",
            RejectReason::RiskMaxPositions => "risk_max_positions",
            RejectReason::RiskWalletTierLimit => "risk_wallet_tier_limit",
            RejectReason::RiskMaxExposure => "risk_max_exposure",
            RejectReason::RiskAggressiveBlocked => "risk_aggressive_blocked",
            RejectReason::EvBelowThreshold => "ev_below_threshold",
            RejectReason::DuplicateExecution => "duplicate_execution",
            RejectReason::QuoteUnavailable => "quote_unavailable",
            RejectReason::TxDropped => "tx_dropped",
            RejectReason::TxReorged => "tx_reorged",
            RejectReason::PartialFillUnresolved => "partial_fill_unresolved",
            RejectReason::PartialFillTimeout => "partial_fill_timeout",
            RejectReason::JitoBundleRejected => "jito_bundle_rejected",
            RejectReason::NoProfile => "no_profile",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational tags that can ride on a *passing* decision.
///
/// These never reject; they annotate the signals record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfoTag {
    HoneypotCheckSkipped,
    ProbeSizeCapped,
}

impl InfoTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            InfoTag::HoneypotCheckSkipped => "honeypot_check_skipped",
            InfoTag::ProbeSizeCapped => "probe_size_capped",
        }
    }
}

impl std::fmt::Display for InfoTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

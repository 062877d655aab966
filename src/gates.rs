//! Entry gate chain
//!
//! Ordered deterministic filter bank in front of the decision pipeline.
//! The first failing gate short-circuits with a single reject tag; a
//! passing decision carries at most informational tags.

use dashmap::DashMap;
use std::collections::HashSet;
use tracing::debug;

use crate::config::{ProbeConfig, TokenGatesConfig, TokenSecurityConfig, WalletsConfig};
use crate::panic::PanicSentinel;
use crate::profile::WalletProfile;
use crate::reject::{InfoTag, RejectReason};
use crate::snapshot::TokenSnapshot;
use crate::types::TradeEvent;

/// Outcome of running the gate chain.
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub passed: bool,
    /// Set iff `!passed`; the first gate that failed.
    pub reject: Option<RejectReason>,
    /// Informational annotations on a passing decision.
    pub info: Vec<InfoTag>,
    /// Size clamp from the probe gate, in USD.
    pub probe_cap_usd: Option<f64>,
}

impl GateDecision {
    fn pass(info: Vec<InfoTag>, probe_cap_usd: Option<f64>) -> Self {
        Self {
            passed: true,
            reject: None,
            info,
            probe_cap_usd,
        }
    }

    fn fail(reason: RejectReason) -> Self {
        Self {
            passed: false,
            reject: Some(reason),
            info: vec![],
            probe_cap_usd: None,
        }
    }
}

/// Deterministic pass/reject filter bank.
pub struct GateChain {
    gates: TokenGatesConfig,
    security: TokenSecurityConfig,
    probe: ProbeConfig,
    allowlist: HashSet<String>,
    blocked: HashSet<String>,
    allowed_tiers: HashSet<String>,
    /// Mints whose probe trade closed profitably; no longer size-capped.
    probe_passed: DashMap<String, ()>,
}

impl GateChain {
    pub fn new(
        wallets: &WalletsConfig,
        gates: TokenGatesConfig,
        security: TokenSecurityConfig,
        probe: ProbeConfig,
    ) -> Self {
        Self {
            gates,
            security,
            probe,
            allowlist: wallets.allowlist.iter().cloned().collect(),
            blocked: wallets.blocked.iter().cloned().collect(),
            allowed_tiers: wallets.allowed_tiers.iter().cloned().collect(),
            probe_passed: DashMap::new(),
        }
    }

    /// Run the chain. Pure: no suspension, no caller-state mutation.
    pub fn evaluate(
        &self,
        event: &TradeEvent,
        profile: Option<&WalletProfile>,
        snapshot: &TokenSnapshot,
        sentinel: &PanicSentinel,
    ) -> GateDecision {
        // 1. Panic sentinel
        if sentinel.is_panic_active() {
            return GateDecision::fail(RejectReason::PanicActive);
        }

        // 2. Wallet allow-list / tier
        if let Some(reason) = self.check_wallet(event, profile) {
            return GateDecision::fail(reason);
        }

        // 3. Liquidity / volume / spread. Unknown values fail closed.
        if snapshot.liquidity_usd.unwrap_or(0.0) < self.gates.min_liquidity_usd {
            return GateDecision::fail(RejectReason::MinLiquidityFail);
        }
        if snapshot.volume_24h_usd.unwrap_or(0.0) < self.gates.min_volume_24h_usd {
            return GateDecision::fail(RejectReason::MinVolumeFail);
        }
        if snapshot.spread_bps.unwrap_or(f64::MAX) > self.gates.max_spread_bps as f64 {
            return GateDecision::fail(RejectReason::SpreadTooHigh);
        }

        // 4. Security
        let mut info = vec![];
        if self.security.require_honeypot_safe {
            // Unverified simulation counts as a honeypot.
            if snapshot.security.is_honeypot.unwrap_or(true) {
                return GateDecision::fail(RejectReason::HoneypotDetected);
            }
        } else {
            info.push(InfoTag::HoneypotCheckSkipped);
        }
        if snapshot.security.freeze_authority_present.unwrap_or(false) {
            return GateDecision::fail(RejectReason::FreezeAuthorityPresent);
        }
        if snapshot.security.mint_authority_present.unwrap_or(false) {
            return GateDecision::fail(RejectReason::MintAuthorityPresent);
        }
        let top10 = snapshot.top10_holders_pct.unwrap_or(0.0);
        let single = snapshot.single_holder_pct.unwrap_or(0.0);
        if top10 > self.security.max_top_holders_pct
            || single > self.security.max_single_holder_pct
        {
            return GateDecision::fail(RejectReason::TopHoldersConcentrated);
        }

        // 5. Probe gate: clamps size, never rejects.
        let probe_cap_usd = if self.probe.enabled && !self.probe_passed.contains_key(&event.mint)
        {
            info.push(InfoTag::ProbeSizeCapped);
            Some(self.probe.max_probe_cost_usd)
        } else {
            None
        };

        debug!(mint = %event.mint, leader = %event.leader, "Gates passed");
        GateDecision::pass(info, probe_cap_usd)
    }

    fn check_wallet(
        &self,
        event: &TradeEvent,
        profile: Option<&WalletProfile>,
    ) -> Option<RejectReason> {
        if self.blocked.contains(&event.leader) {
            return Some(RejectReason::WalletTierBlocked);
        }
        if !self.allowlist.is_empty() && !self.allowlist.contains(&event.leader) {
            return Some(RejectReason::WalletTierBlocked);
        }
        match profile {
            Some(profile) => {
                if !self.allowed_tiers.contains(profile.tier.as_str()) {
                    return Some(RejectReason::WalletTierBlocked);
                }
            }
            // Unprofiled leaders pass the tier gate only when explicitly
            // allow-listed.
            None => {
                if !self.allowlist.contains(&event.leader) {
                    return Some(RejectReason::WalletTierBlocked);
                }
            }
        }
        None
    }

    /// Record the outcome of a probe trade for a mint. A profitable probe
    /// lifts the size cap for subsequent entries.
    pub fn record_probe_result(&self, mint: &str, passed: bool) {
        if passed {
            self.probe_passed.insert(mint.to_string(), ());
        } else {
            self.probe_passed.remove(mint);
        }
    }
}

//! Risk engine
//!
//! Global capital control in front of order construction: kill-switch,
//! cooldown, position and exposure caps, aggressive-mode safety gates, and
//! position sizing. Owns the portfolio counters; single writer by design of
//! the decision actor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::{RiskConfig, SizingMethod};
use crate::profile::WalletProfile;
use crate::reject::RejectReason;
use crate::snapshot::TokenSnapshot;

/// Portfolio counters the risk engine guards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub equity_usd: f64,
    pub peak_equity_usd: f64,
    pub day_pnl_usd: f64,
    pub consecutive_losses: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub open_positions: usize,
    pub open_by_tier: HashMap<String, usize>,
    pub exposure_by_token: HashMap<String, f64>,
    pub aggressive_trades_today: u32,
    /// Authoritative local bankroll the reconciler audits against chain.
    pub bankroll_lamports: u64,
}

impl PortfolioState {
    pub fn new(equity_usd: f64, bankroll_lamports: u64) -> Self {
        Self {
            equity_usd,
            peak_equity_usd: equity_usd,
            day_pnl_usd: 0.0,
            consecutive_losses: 0,
            cooldown_until: None,
            open_positions: 0,
            open_by_tier: HashMap::new(),
            exposure_by_token: HashMap::new(),
            aggressive_trades_today: 0,
            bankroll_lamports,
        }
    }

    pub fn day_pnl_pct(&self) -> f64 {
        if self.equity_usd == 0.0 {
            return 0.0;
        }
        self.day_pnl_usd / self.equity_usd * 100.0
    }

    pub fn exposure(&self, mint: &str) -> f64 {
        self.exposure_by_token.get(mint).copied().unwrap_or(0.0)
    }
}

/// Inputs the aggressive safety gate needs beyond the portfolio.
struct AggressiveContext<'a> {
    snapshot: &'a TokenSnapshot,
    profile: Option<&'a WalletProfile>,
}

/// Risk engine: sequential checks, each tagging its own rejection.
pub struct RiskEngine {
    config: RiskConfig,
    state: PortfolioState,
    day_start: DateTime<Utc>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig, equity_usd: f64, bankroll_lamports: u64) -> Self {
        Self {
            config,
            state: PortfolioState::new(equity_usd, bankroll_lamports),
            day_start: Utc::now()
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .expect("midnight is valid")
                .and_utc(),
        }
    }

    pub fn state(&self) -> &PortfolioState {
        &self.state
    }

    /// Run every entry check. First failure wins.
    pub fn check_entry(
        &self,
        mint: &str,
        tier: Option<&str>,
        aggressive: bool,
        snapshot: &TokenSnapshot,
        profile: Option<&WalletProfile>,
        sentinel_active: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RejectReason> {
        // Kill-switch: operator sentinel or daily loss breach.
        if sentinel_active || self.daily_loss_breached(self.config.limits.max_daily_loss_pct) {
            return Err(RejectReason::RiskKillSwitch);
        }

        // Cooldown armed by consecutive losses.
        if let Some(until) = self.state.cooldown_until {
            if now < until {
                return Err(RejectReason::RiskCooldown);
            }
        }

        if self.state.open_positions >= self.config.limits.max_open_positions {
            return Err(RejectReason::RiskMaxPositions);
        }

        if let Some(tier) = tier {
            if let Some(limit) = self.config.limits.tier_limits.get(tier) {
                let open = self.state.open_by_tier.get(tier).copied().unwrap_or(0);
                if open >= limit.max_open_positions {
                    return Err(RejectReason::RiskWalletTierLimit);
                }
            }
        }

        let exposure_cap =
            self.config.limits.max_exposure_per_token_pct / 100.0 * self.state.equity_usd;
        if self.state.exposure(mint) >= exposure_cap {
            return Err(RejectReason::RiskMaxExposure);
        }

        if aggressive {
            self.check_aggressive(&AggressiveContext { snapshot, profile })?;
        }

        Ok(())
    }

    /// Aggressive entries get stricter, fail-safe gates: any missing datum
    /// rejects.
    fn check_aggressive(&self, ctx: &AggressiveContext<'_>) -> Result<(), RejectReason> {
        let aggr = &self.config.aggressive;

        let liquidity = ctx
            .snapshot
            .liquidity_usd
            .ok_or(RejectReason::RiskAggressiveBlocked)?;
        if liquidity < aggr.min_liquidity_usd {
            return Err(RejectReason::RiskAggressiveBlocked);
        }

        let profile = ctx.profile.ok_or(RejectReason::RiskAggressiveBlocked)?;
        if profile.winrate_30d < aggr.min_winrate_30d
            || profile.roi_30d_pct < aggr.min_roi_30d_pct
        {
            return Err(RejectReason::RiskAggressiveBlocked);
        }

        if self.daily_loss_breached(aggr.max_daily_loss_pct) {
            return Err(RejectReason::RiskAggressiveBlocked);
        }

        if self.state.aggressive_trades_today >= aggr.max_daily_trades {
            return Err(RejectReason::RiskAggressiveBlocked);
        }

        Ok(())
    }

    fn daily_loss_breached(&self, max_loss_pct: f64) -> bool {
        self.state.day_pnl_pct() <= -max_loss_pct
    }

    /// Size a position in USD of notional.
    ///
    /// Fractional Kelly on (win_p, tp, sl), clamped to the configured
    /// percent-of-equity band, then to remaining per-token headroom.
    pub fn size_position(&self, mint: &str, win_p: f64, tp_pct: f64, sl_pct: f64) -> f64 {
        let sizing = &self.config.sizing;

        let pct = match sizing.method {
            SizingMethod::FractionalKelly => {
                let b = tp_pct / sl_pct.abs();
                let f_star = if b > 0.0 {
                    (win_p * (b + 1.0) - 1.0) / b
                } else {
                    0.0
                };
                (sizing.kelly_fraction * f_star).max(0.0) * 100.0
            }
            SizingMethod::FixedPct => sizing.fixed_pct_of_bankroll,
        };

        let pct = pct.clamp(sizing.min_pos_pct, sizing.max_pos_pct);
        let size = pct / 100.0 * self.state.equity_usd;

        let headroom = (self.config.limits.max_exposure_per_token_pct / 100.0
            * self.state.equity_usd
            - self.state.exposure(mint))
        .max(0.0);

        size.min(headroom)
    }

    /// Register an opened position.
    pub fn on_position_opened(&mut self, mint: &str, tier: Option<&str>, size_usd: f64, aggressive: bool) {
        self.state.open_positions += 1;
        if let Some(tier) = tier {
            *self.state.open_by_tier.entry(tier.to_string()).or_insert(0) += 1;
        }
        *self
            .state
            .exposure_by_token
            .entry(mint.to_string())
            .or_insert(0.0) += size_usd;
        if aggressive {
            self.state.aggressive_trades_today += 1;
        }
    }

    /// Register a closed position and its realized PnL.
    pub fn on_position_closed(&mut self, mint: &str, tier: Option<&str>, size_usd: f64, pnl_usd: f64) {
        self.state.open_positions = self.state.open_positions.saturating_sub(1);
        if let Some(tier) = tier {
            if let Some(count) = self.state.open_by_tier.get_mut(tier) {
                *count = count.saturating_sub(1);
            }
        }
        if let Some(exposure) = self.state.exposure_by_token.get_mut(mint) {
            *exposure = (*exposure - size_usd).max(0.0);
            if *exposure == 0.0 {
                self.state.exposure_by_token.remove(mint);
            }
        }

        self.record_pnl(pnl_usd);
    }

    fn record_pnl(&mut self, pnl_usd: f64) {
        self.state.day_pnl_usd += pnl_usd;
        self.state.equity_usd += pnl_usd;
        if self.state.equity_usd > self.state.peak_equity_usd {
            self.state.peak_equity_usd = self.state.equity_usd;
        }

        if pnl_usd < 0.0 {
            self.state.consecutive_losses += 1;
            let cooldown = &self.config.limits.cooldown;
            if self.state.consecutive_losses >= cooldown.max_consecutive_losses {
                let until = Utc::now() + chrono::Duration::seconds(cooldown.duration_secs as i64);
                self.state.cooldown_until = Some(until);
                warn!(
                    losses = self.state.consecutive_losses,
                    until = %until,
                    "Cooldown armed after consecutive losses"
                );
            }
        } else {
            self.state.consecutive_losses = 0;
        }
    }

    /// Reverse the local effects of a rolled-back entry (reorg guard).
    pub fn revert_entry(&mut self, mint: &str, tier: Option<&str>, size_usd: f64) {
        self.state.open_positions = self.state.open_positions.saturating_sub(1);
        if let Some(tier) = tier {
            if let Some(count) = self.state.open_by_tier.get_mut(tier) {
                *count = count.saturating_sub(1);
            }
        }
        if let Some(exposure) = self.state.exposure_by_token.get_mut(mint) {
            *exposure = (*exposure - size_usd).max(0.0);
            if *exposure == 0.0 {
                self.state.exposure_by_token.remove(mint);
            }
        }
    }

    /// Bounded bankroll adjustment from the reconciler.
    pub fn apply_bankroll_adjustment(&mut self, delta_lamports: i64) -> (u64, u64) {
        let before = self.state.bankroll_lamports;
        let after = if delta_lamports >= 0 {
            before.saturating_add(delta_lamports as u64)
        } else {
            before.saturating_sub(delta_lamports.unsigned_abs())
        };
        self.state.bankroll_lamports = after;
        (before, after)
    }

    /// Reset daily counters at UTC midnight.
    pub fn check_daily_reset(&mut self, now: DateTime<Utc>) {
        let today_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
            .and_utc();
        if today_start > self.day_start {
            info!(day_pnl_usd = self.state.day_pnl_usd, "Daily risk reset");
            self.state.day_pnl_usd = 0.0;
            self.state.aggressive_trades_today = 0;
            self.state.consecutive_losses = 0;
            self.day_start = today_start;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RiskLimitsConfig, SizingConfig};
    use crate::types::Tier;

    fn snapshot_with_liquidity(liquidity: f64) -> TokenSnapshot {
        let mut snapshot = TokenSnapshot::empty("mintA");
        snapshot.liquidity_usd = Some(liquidity);
        snapshot
    }

    fn profile(winrate: f64, roi: f64) -> WalletProfile {
        WalletProfile {
            wallet: "w1".into(),
            tier: Tier::Tier1,
            roi_30d_pct: roi,
            winrate_30d: winrate,
            trades_30d: 100,
            median_hold_sec: 60,
            avg_trade_size_usd: 100.0,
            consecutive_wins: 0,
            preferred_dex_concentration: 0.5,
            cluster_leader_score: 0.0,
        }
    }

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default(), 10_000.0, 0)
    }

    #[test]
    fn test_entry_allowed_by_default() {
        let engine = engine();
        let result = engine.check_entry(
            "mintA",
            Some("tier1"),
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_sentinel_trips_kill_switch() {
        let engine = engine();
        let result = engine.check_entry(
            "mintA",
            None,
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            true,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskKillSwitch));
    }

    #[test]
    fn test_daily_loss_trips_kill_switch() {
        let mut engine = engine();
        // Default max_daily_loss_pct is 5% of 10k equity.
        engine.on_position_opened("mintX", None, 600.0, false);
        engine.on_position_closed("mintX", None, 600.0, -600.0);

        let result = engine.check_entry(
            "mintA",
            None,
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskKillSwitch));
    }

    #[test]
    fn test_max_positions() {
        let config = RiskConfig {
            limits: RiskLimitsConfig {
                max_open_positions: 1,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut engine = RiskEngine::new(config, 10_000.0, 0);
        engine.on_position_opened("mintX", None, 100.0, false);

        let result = engine.check_entry(
            "mintA",
            None,
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskMaxPositions));
    }

    #[test]
    fn test_tier_limit() {
        let mut engine = engine();
        // Default tier3 cap is 1.
        engine.on_position_opened("mintX", Some("tier3"), 100.0, false);

        let result = engine.check_entry(
            "mintA",
            Some("tier3"),
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskWalletTierLimit));
    }

    #[test]
    fn test_exposure_cap() {
        let mut engine = engine();
        // equity 10k, max_exposure_per_token_pct 10% => cap 1000.
        engine.on_position_opened("mintA", None, 1_000.0, false);

        let result = engine.check_entry(
            "mintA",
            None,
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskMaxExposure));
    }

    #[test]
    fn test_cooldown_after_consecutive_losses() {
        let mut engine = engine();
        // Default cooldown arms after 4 consecutive losses.
        for i in 0..4 {
            let mint = format!("mint{}", i);
            engine.on_position_opened(&mint, None, 10.0, false);
            engine.on_position_closed(&mint, None, 10.0, -1.0);
        }
        assert!(engine.state().cooldown_until.is_some());

        let result = engine.check_entry(
            "mintA",
            None,
            false,
            &snapshot_with_liquidity(50_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskCooldown));
    }

    #[test]
    fn test_win_resets_loss_streak() {
        let mut engine = engine();
        engine.on_position_opened("m1", None, 10.0, false);
        engine.on_position_closed("m1", None, 10.0, -1.0);
        engine.on_position_opened("m2", None, 10.0, false);
        engine.on_position_closed("m2", None, 10.0, 5.0);
        assert_eq!(engine.state().consecutive_losses, 0);
    }

    #[test]
    fn test_aggressive_requires_data() {
        let engine = engine();
        // No liquidity on the snapshot: fail-safe reject.
        let result = engine.check_entry(
            "mintA",
            None,
            true,
            &TokenSnapshot::empty("mintA"),
            Some(&profile(0.9, 50.0)),
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskAggressiveBlocked));

        // No profile at all: same.
        let result = engine.check_entry(
            "mintA",
            None,
            true,
            &snapshot_with_liquidity(100_000.0),
            None,
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskAggressiveBlocked));
    }

    #[test]
    fn test_aggressive_passes_with_strong_wallet() {
        let engine = engine();
        let result = engine.check_entry(
            "mintA",
            None,
            true,
            &snapshot_with_liquidity(100_000.0),
            Some(&profile(0.9, 50.0)),
            false,
            Utc::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_aggressive_daily_budget() {
        let config = RiskConfig::default();
        let budget = config.aggressive.max_daily_trades;
        let mut engine = RiskEngine::new(config, 10_000.0, 0);
        for i in 0..budget {
            engine.on_position_opened(&format!("m{}", i), None, 1.0, true);
        }

        let result = engine.check_entry(
            "mintA",
            None,
            true,
            &snapshot_with_liquidity(100_000.0),
            Some(&profile(0.9, 50.0)),
            false,
            Utc::now(),
        );
        assert_eq!(result, Err(RejectReason::RiskAggressiveBlocked));
    }

    #[test]
    fn test_kelly_sizing_monotonic_in_win_p() {
        let engine = engine();
        // b = 2.0; break-even p = 1/(b+1) = 1/3.
        let mut last = 0.0;
        for p in [0.40, 0.50, 0.60, 0.70, 0.80, 0.90, 1.0] {
            let size = engine.size_position("mintA", p, 0.10, -0.05);
            assert!(size >= last, "size not monotonic at p={}", p);
            last = size;
        }
    }

    #[test]
    fn test_sizing_clamped_to_band_and_headroom() {
        let engine = engine();
        let equity = engine.state().equity_usd;
        let sizing = SizingConfig::default();

        // Very high win_p: clamped to max_pos_pct of equity, then headroom.
        let size = engine.size_position("mintA", 1.0, 0.10, -0.05);
        let max_band = sizing.max_pos_pct / 100.0 * equity;
        assert!(size <= max_band + 1e-9);

        // Sub-break-even win_p: Kelly negative, clamped up to min band.
        let size = engine.size_position("mintA", 0.2, 0.10, -0.05);
        let min_band = sizing.min_pos_pct / 100.0 * equity;
        assert!((size - min_band).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_respects_headroom() {
        let mut engine = engine();
        // Cap is 10% of 10k = 1000; take 950 of it.
        engine.on_position_opened("mintA", None, 950.0, false);
        let size = engine.size_position("mintA", 1.0, 0.10, -0.05);
        assert!(size <= 50.0 + 1e-9);
    }

    #[test]
    fn test_fixed_pct_sizing() {
        let config = RiskConfig {
            sizing: SizingConfig {
                method: SizingMethod::FixedPct,
                fixed_pct_of_bankroll: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        let engine = RiskEngine::new(config, 10_000.0, 0);
        let size = engine.size_position("mintA", 0.0, 0.10, -0.05);
        assert!((size - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_bankroll_adjustment() {
        let mut engine = RiskEngine::new(RiskConfig::default(), 10_000.0, 1_000_000);
        let (before, after) = engine.apply_bankroll_adjustment(-250_000);
        assert_eq!(before, 1_000_000);
        assert_eq!(after, 750_000);
        assert_eq!(engine.state().bankroll_lamports, 750_000);
    }

    #[test]
    fn test_daily_reset() {
        let mut engine = engine();
        engine.on_position_opened("m1", None, 10.0, true);
        engine.on_position_closed("m1", None, 10.0, -5.0);
        assert!(engine.state().day_pnl_usd < 0.0);

        engine.check_daily_reset(Utc::now() + chrono::Duration::days(1));
        assert_eq!(engine.state().day_pnl_usd, 0.0);
        assert_eq!(engine.state().aggressive_trades_today, 0);
    }
}

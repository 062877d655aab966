//! Trading mode selection
//!
//! Maps (wallet profile, token snapshot, impulse features) to a named mode:
//! `U` ultra-scalp, `S` short, `M` medium, `L` long, plus `_aggr` variants.
//! Total and deterministic; absent inputs have fixed fallbacks.

use serde::{Deserialize, Serialize};

use crate::config::ModeSelectorConfig;
use crate::profile::WalletProfile;
use crate::snapshot::TokenSnapshot;
use crate::types::TradeEvent;

pub const BASE_MODES: [&str; 4] = ["U", "S", "M", "L"];

/// Why a mode was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeReason {
    /// Bucketed by the leader's median hold time.
    HoldBucket,
    /// Leader has no profile; configured default applied.
    NoProfile,
    /// Hold bucket upgraded to its aggressive variant by impulse features.
    AggressiveUpgrade,
}

impl ModeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeReason::HoldBucket => "hold_bucket",
            ModeReason::NoProfile => "no_profile",
            ModeReason::AggressiveUpgrade => "aggressive_upgrade",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSelection {
    pub mode_id: String,
    pub reason: ModeReason,
}

impl ModeSelection {
    pub fn is_aggressive(&self) -> bool {
        self.mode_id.ends_with("_aggr")
    }

    /// Base mode id with any aggressive suffix stripped.
    pub fn base_mode(&self) -> &str {
        self.mode_id.strip_suffix("_aggr").unwrap_or(&self.mode_id)
    }
}

pub struct ModeSelector {
    config: ModeSelectorConfig,
}

impl ModeSelector {
    pub fn new(config: ModeSelectorConfig) -> Self {
        Self { config }
    }

    /// Select the trading mode for a leader trade.
    pub fn select(
        &self,
        profile: Option<&WalletProfile>,
        snapshot: Option<&TokenSnapshot>,
        event: &TradeEvent,
    ) -> ModeSelection {
        let profile = match profile {
            Some(profile) => profile,
            None => {
                return ModeSelection {
                    mode_id: self.config.default_mode.clone(),
                    reason: ModeReason::NoProfile,
                }
            }
        };

        let base = self.hold_bucket(profile.median_hold_sec);

        // Without a snapshot there is no impulse context to trust; never
        // upgrade to aggressive.
        if self.config.enable_aggressive
            && snapshot.is_some()
            && event.impulse_count >= self.config.aggressive_min_impulse_count
            && event.impulse_max_pct >= self.config.aggressive_min_impulse_pct
        {
            return ModeSelection {
                mode_id: format!("{}_aggr", base),
                reason: ModeReason::AggressiveUpgrade,
            };
        }

        ModeSelection {
            mode_id: base.to_string(),
            reason: ModeReason::HoldBucket,
        }
    }

    fn hold_bucket(&self, median_hold_sec: u64) -> &'static str {
        let thresholds = &self.config.hold_thresholds_sec;
        if median_hold_sec < thresholds[0] {
            "U"
        } else if median_hold_sec < thresholds[1] {
            "S"
        } else if median_hold_sec < thresholds[2] {
            "M"
        } else {
            "L"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Side, Tier};

    fn selector(enable_aggressive: bool) -> ModeSelector {
        ModeSelector::new(ModeSelectorConfig {
            enable_aggressive,
            ..Default::default()
        })
    }

    fn profile_with_hold(median_hold_sec: u64) -> WalletProfile {
        WalletProfile {
            wallet: "w1".into(),
            tier: Tier::Tier1,
            roi_30d_pct: 10.0,
            winrate_30d: 0.6,
            trades_30d: 50,
            median_hold_sec,
            avg_trade_size_usd: 100.0,
            consecutive_wins: 0,
            preferred_dex_concentration: 0.5,
            cluster_leader_score: 0.0,
        }
    }

    fn event(impulse_count: u32, impulse_max_pct: f64) -> TradeEvent {
        TradeEvent {
            schema_version: "1.0".into(),
            ts_ms: 0,
            leader: "w1".into(),
            mint: "mintA".into(),
            side: Side::Buy,
            price: 1.0,
            notional_usd: 100.0,
            platform: String::new(),
            tx_hash: "sig".into(),
            impulse_count,
            impulse_max_pct,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_hold_buckets() {
        let selector = selector(false);
        let snapshot = TokenSnapshot::empty("mintA");
        let event = event(0, 0.0);

        for (hold, expected) in [(30, "U"), (120, "S"), (899, "S"), (900, "M"), (3600, "L")] {
            let selection =
                selector.select(Some(&profile_with_hold(hold)), Some(&snapshot), &event);
            assert_eq!(selection.mode_id, expected, "hold={}", hold);
            assert_eq!(selection.reason, ModeReason::HoldBucket);
        }
    }

    #[test]
    fn test_no_profile_uses_default() {
        let selector = selector(true);
        let snapshot = TokenSnapshot::empty("mintA");
        let selection = selector.select(None, Some(&snapshot), &event(10, 50.0));

        assert_eq!(selection.mode_id, "S");
        assert_eq!(selection.reason, ModeReason::NoProfile);
        assert!(!selection.is_aggressive());
    }

    #[test]
    fn test_aggressive_upgrade() {
        let selector = selector(true);
        let snapshot = TokenSnapshot::empty("mintA");
        let selection = selector.select(
            Some(&profile_with_hold(30)),
            Some(&snapshot),
            &event(3, 9.0),
        );

        assert_eq!(selection.mode_id, "U_aggr");
        assert_eq!(selection.reason, ModeReason::AggressiveUpgrade);
        assert!(selection.is_aggressive());
        assert_eq!(selection.base_mode(), "U");
    }

    #[test]
    fn test_no_snapshot_never_upgrades() {
        let selector = selector(true);
        let selection = selector.select(Some(&profile_with_hold(30)), None, &event(10, 50.0));

        assert_eq!(selection.mode_id, "U");
        assert_eq!(selection.reason, ModeReason::HoldBucket);
    }

    #[test]
    fn test_impulse_below_threshold_stays_base() {
        let selector = selector(true);
        let snapshot = TokenSnapshot::empty("mintA");
        let selection = selector.select(
            Some(&profile_with_hold(30)),
            Some(&snapshot),
            &event(2, 50.0),
        );

        assert_eq!(selection.mode_id, "U");
    }

    #[test]
    fn test_disabled_aggressive_stays_base() {
        let selector = selector(false);
        let snapshot = TokenSnapshot::empty("mintA");
        let selection = selector.select(
            Some(&profile_with_hold(30)),
            Some(&snapshot),
            &event(10, 50.0),
        );

        assert_eq!(selection.mode_id, "U");
    }
}

//! Expected-value edge computation and regime adjustment
//!
//! Edge is expressed in basis points per unit notional after spread. All
//! intermediate math stays in f64; integer rounding happens half-to-even at
//! the output boundary only.

use serde::{Deserialize, Serialize};

use crate::config::ModeConfig;
use crate::error::{Error, Result};

/// Round a bps value at the output boundary, ties to even.
pub fn round_bps(value: f64) -> i64 {
    value.round_ties_even() as i64
}

/// Edge computation result. Raw edge is pre-regime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EdgeEvaluation {
    /// Win probability used (model score or wallet winrate).
    pub win_p: f64,
    /// Raw expected edge in bps, unrounded.
    pub edge_raw: f64,
}

/// Expected-value calculator.
pub struct EdgeCalculator {
    min_edge_bps: i64,
}

impl EdgeCalculator {
    pub fn new(min_edge_bps: i64) -> Self {
        Self { min_edge_bps }
    }

    /// Compute the raw edge for a candidate entry.
    ///
    /// `win_p` preference order: external model score, wallet winrate, the
    /// configured proxy. `spread_bps` is the snapshot's current spread.
    pub fn evaluate(
        &self,
        mode: &ModeConfig,
        p_model: Option<f64>,
        wallet_winrate: Option<f64>,
        proxy_win_p: f64,
        spread_bps: f64,
    ) -> EdgeEvaluation {
        let win_p = p_model
            .or(wallet_winrate)
            .unwrap_or(proxy_win_p)
            .clamp(0.0, 1.0);

        let edge_raw =
            (win_p * mode.tp_pct - (1.0 - win_p) * mode.sl_pct.abs()) * 10_000.0 - spread_bps;

        EdgeEvaluation { win_p, edge_raw }
    }

    /// Threshold check against the regime-adjusted edge.
    pub fn meets_threshold(&self, edge_final: f64) -> bool {
        round_bps(edge_final) >= self.min_edge_bps
    }
}

/// Multiplies edge by `1 + alpha * risk_regime`.
///
/// `alpha` is validated at construction; `risk_regime` is clamped to
/// [-1, +1] on every call. For `|alpha * regime| < 1` the sign of the edge
/// is preserved.
pub struct RegimeAdjuster {
    enabled: bool,
    alpha: f64,
}

impl RegimeAdjuster {
    pub fn new(enabled: bool, alpha: f64) -> Result<Self> {
        if !(0.0..=0.5).contains(&alpha) {
            return Err(Error::Config(format!(
                "regime alpha must be in [0, 0.5], got {}",
                alpha
            )));
        }
        Ok(Self { enabled, alpha })
    }

    pub fn adjust(&self, edge_raw: f64, risk_regime: f64) -> f64 {
        if !self.enabled {
            return edge_raw;
        }
        let regime = risk_regime.clamp(-1.0, 1.0);
        edge_raw * (1.0 + self.alpha * regime)
    }
}

/// Regime timeline wire record (external input).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeRecord {
    pub schema_version: String,
    pub ts_ms: i64,
    /// Market-risk appetite in [-1, +1].
    pub risk_regime: f64,
}

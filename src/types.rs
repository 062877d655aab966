//! Core domain types shared across the decision pipeline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality bucket for a leader wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Tier1,
    Tier2,
    Tier3,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Tier1 => "tier1",
            Tier::Tier2 => "tier2",
            Tier::Tier3 => "tier3",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire schema version, `major.minor`.
///
/// Unknown minor versions are accepted (unknown keys ride along); an unknown
/// major version is a hard reject at the ingest boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaVersion {
    pub major: u32,
    pub minor: u32,
}

impl SchemaVersion {
    pub const CURRENT: SchemaVersion = SchemaVersion { major: 1, minor: 0 };

    pub fn parse(s: &str) -> Result<Self> {
        let (major, minor) = s
            .split_once('.')
            .ok_or_else(|| Error::SchemaVersion(s.to_string()))?;
        let major = major
            .parse()
            .map_err(|_| Error::SchemaVersion(s.to_string()))?;
        let minor = minor
            .parse()
            .map_err(|_| Error::SchemaVersion(s.to_string()))?;
        Ok(Self { major, minor })
    }

    /// Whether a record with this version may be processed.
    pub fn is_accepted(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl std::fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A normalized leader trade observed on chain.
///
/// `(leader, tx_hash)` is the natural dedup key; the tx hash uniquely
/// identifies the on-chain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    pub schema_version: String,
    /// Event timestamp in epoch milliseconds.
    pub ts_ms: i64,
    /// Leader wallet the trade was observed from (base58).
    pub leader: String,
    /// Token mint traded (base58).
    pub mint: String,
    pub side: Side,
    /// Execution price in quote currency per token.
    pub price: f64,
    /// Notional size in quote currency (USD).
    pub notional_usd: f64,
    /// Source platform label (e.g. "pumpswap", "raydium").
    #[serde(default)]
    pub platform: String,
    /// On-chain transaction hash.
    pub tx_hash: String,
    /// Impulse burst count over the short window, when the ingest adapter
    /// annotated one.
    #[serde(default)]
    pub impulse_count: u32,
    /// Largest single impulse move in percent over the short window.
    #[serde(default)]
    pub impulse_max_pct: f64,
    /// Unknown minor-version keys ride along untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TradeEvent {
    /// Validate the schema version stamp.
    pub fn check_schema(&self) -> Result<SchemaVersion> {
        let version = SchemaVersion::parse(&self.schema_version)?;
        if !version.is_accepted() {
            return Err(Error::SchemaVersion(format!(
                "unsupported major version {}",
                version
            )));
        }
        Ok(version)
    }
}

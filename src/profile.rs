//! Wallet profile store
//!
//! Per-leader historical performance and behavior, produced by an
//! out-of-band scoring job. Read-mostly: the whole map is swapped on
//! refresh, readers never block on the refresh I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::Tier;

/// Historical profile for a leader wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletProfile {
    pub wallet: String,
    pub tier: Tier,
    pub roi_30d_pct: f64,
    /// Win rate over the trailing 30 days, in [0, 1].
    pub winrate_30d: f64,
    pub trades_30d: u32,
    pub median_hold_sec: u64,
    pub avg_trade_size_usd: f64,
    #[serde(default)]
    pub consecutive_wins: u32,
    /// Share of the wallet's volume on its most-used DEX, in [0, 1].
    #[serde(default)]
    pub preferred_dex_concentration: f64,
    /// Score from the wallet-clustering stage, in [0, 1].
    #[serde(default)]
    pub cluster_leader_score: f64,
}

/// Profile file format: a list of profiles with a schema stamp.
#[derive(Debug, Deserialize)]
struct ProfileFile {
    #[serde(default = "default_schema_version")]
    schema_version: String,
    profiles: Vec<WalletProfile>,
}

fn default_schema_version() -> String {
    "1.0".into()
}

/// Read-mostly store of wallet profiles.
pub struct WalletProfileStore {
    path: PathBuf,
    profiles: Arc<RwLock<HashMap<String, WalletProfile>>>,
}

impl WalletProfileStore {
    /// Create an empty store bound to a profile file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Load profiles from the bound file. Missing file is not an error:
    /// the store stays empty and every lookup returns `None`.
    pub async fn load(&self) -> Result<usize> {
        if !Path::new(&self.path).exists() {
            info!(path = %self.path.display(), "No profile file, starting empty");
            return Ok(0);
        }

        let data = tokio::fs::read_to_string(&self.path).await?;
        let file: ProfileFile = serde_json::from_str(&data)
            .map_err(|e| Error::CorruptState(format!("profile file: {}", e)))?;

        let version = crate::types::SchemaVersion::parse(&file.schema_version)?;
        if !version.is_accepted() {
            return Err(Error::SchemaVersion(format!(
                "profile file version {}",
                version
            )));
        }

        let map: HashMap<String, WalletProfile> = file
            .profiles
            .into_iter()
            .map(|p| (p.wallet.clone(), p))
            .collect();
        let count = map.len();

        // Swap in one write; readers holding the old map are unaffected.
        let mut guard = self.profiles.write().await;
        *guard = map;
        drop(guard);

        info!(count, path = %self.path.display(), "Loaded wallet profiles");
        Ok(count)
    }

    /// Re-read the profile file (out-of-band refresh job hook).
    pub async fn refresh(&self) -> Result<usize> {
        self.load().await
    }

    /// Look up a leader's profile. A missing profile is a first-class
    /// value; gates and the mode selector have explicit rules for it.
    pub async fn get(&self, wallet: &str) -> Option<WalletProfile> {
        self.profiles.read().await.get(wallet).cloned()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    /// Insert or replace a single profile (used by tests and the control
    /// plane).
    pub async fn upsert(&self, profile: WalletProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.wallet.clone(), profile);
    }
}

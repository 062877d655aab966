//! HTTP snapshot providers
//!
//! Two interchangeable upstreams behind [`SnapshotProvider`]: a market-data
//! screener (liquidity, volume, spread, volatility) and a token-security
//! scanner (honeypot simulation, authorities, holder concentration). Both
//! retry transient failures with bounded exponential backoff and surface a
//! single final error to the store.

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{SecurityFlags, TokenSnapshot};
use crate::error::{Error, Result};

/// Wire record returned by the market screener endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerRecord {
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    #[serde(rename = "liquidityUsd")]
    pub liquidity_usd: Option<f64>,
    #[serde(rename = "volume24hUsd")]
    pub volume_24h_usd: Option<f64>,
    #[serde(rename = "spreadBps")]
    pub spread_bps: Option<f64>,
    #[serde(rename = "volatility30s")]
    pub volatility_30s: Option<f64>,
    #[serde(rename = "priceImpulse5m")]
    pub price_impulse_5m: Option<f64>,
    #[serde(rename = "smartMoneyShare")]
    pub smart_money_share: Option<f64>,
    #[serde(rename = "eventRisk")]
    pub event_risk: Option<f64>,
}

/// Wire record returned by the security scanner endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRecord {
    #[serde(rename = "tokenAddress")]
    pub token_address: String,
    #[serde(rename = "isHoneypot")]
    pub is_honeypot: Option<bool>,
    #[serde(rename = "mintAuthority")]
    pub mint_authority: Option<bool>,
    #[serde(rename = "freezeAuthority")]
    pub freeze_authority: Option<bool>,
    #[serde(rename = "simSuccess")]
    pub sim_success: Option<bool>,
    #[serde(rename = "buyTaxBps")]
    pub buy_tax_bps: Option<u32>,
    #[serde(rename = "sellTaxBps")]
    pub sell_tax_bps: Option<u32>,
    #[serde(rename = "top10HoldersPct")]
    pub top10_holders_pct: Option<f64>,
    #[serde(rename = "singleHolderPct")]
    pub single_holder_pct: Option<f64>,
}

fn retry_policy(timeout_ms: u64, max_retries: u32) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(100),
        max_interval: Duration::from_millis(timeout_ms),
        max_elapsed_time: Some(Duration::from_millis(
            timeout_ms * (max_retries as u64 + 1),
        )),
        ..Default::default()
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout_ms: u64,
    max_retries: u32,
) -> Result<T> {
    let record = backoff::future::retry(retry_policy(timeout_ms, max_retries), || async {
        let resp = client
            .get(url)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(Error::Rpc(e.to_string())))?;

        if resp.status().is_server_error() || resp.status().as_u16() == 429 {
            return Err(backoff::Error::transient(Error::Rpc(format!(
                "status {}",
                resp.status()
            ))));
        }
        if !resp.status().is_success() {
            return Err(backoff::Error::permanent(Error::Rpc(format!(
                "status {}",
                resp.status()
            ))));
        }

        resp.json::<T>()
            .await
            .map_err(|e| backoff::Error::permanent(Error::Serialization(e.to_string())))
    })
    .await?;

    Ok(record)
}

/// Market screener provider (liquidity / volume / spread / volatility).
pub struct ScreenerProvider {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    max_retries: u32,
}

impl ScreenerProvider {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            timeout_ms,
            max_retries,
        }
    }
}

#[async_trait::async_trait]
impl super::SnapshotProvider for ScreenerProvider {
    fn name(&self) -> &str {
        "screener"
    }

    async fn fetch(&self, mint: &str) -> Result<TokenSnapshot> {
        let url = format!("{}/tokens/{}", self.base_url, mint);
        let record: ScreenerRecord =
            get_json(&self.client, &url, self.timeout_ms, self.max_retries).await?;

        let mut snapshot = TokenSnapshot::empty(mint);
        snapshot.liquidity_usd = record.liquidity_usd;
        snapshot.volume_24h_usd = record.volume_24h_usd;
        snapshot.spread_bps = record.spread_bps;
        snapshot.volatility_30s = record.volatility_30s;
        snapshot.price_impulse_5m = record.price_impulse_5m;
        snapshot.smart_money_share = record.smart_money_share;
        snapshot.event_risk = record.event_risk.map(|r| r.clamp(0.0, 1.0));
        Ok(snapshot)
    }
}

/// Token-security scanner provider (honeypot / authorities / holders).
pub struct SecurityScanProvider {
    client: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
    max_retries: u32,
}

impl SecurityScanProvider {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64, max_retries: u32) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
            timeout_ms,
            max_retries,
        }
    }
}

#[async_trait::async_trait]
impl super::SnapshotProvider for SecurityScanProvider {
    fn name(&self) -> &str {
        "security-scan"
    }

    async fn fetch(&self, mint: &str) -> Result<TokenSnapshot> {
        let url = format!("{}/scan/{}", self.base_url, mint);
        let record: SecurityRecord =
            get_json(&self.client, &url, self.timeout_ms, self.max_retries).await?;

        let mut snapshot = TokenSnapshot::empty(mint);
        snapshot.top10_holders_pct = record.top10_holders_pct;
        snapshot.single_holder_pct = record.single_holder_pct;
        snapshot.security = SecurityFlags {
            is_honeypot: record.is_honeypot,
            mint_authority_present: record.mint_authority,
            freeze_authority_present: record.freeze_authority,
            sim_success: record.sim_success,
            buy_tax_bps: record.buy_tax_bps,
            sell_tax_bps: record.sell_tax_bps,
        };
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screener_record_parses_partial_payload() {
        let json = r#"{"tokenAddress": "mintA", "liquidityUsd": 50000.0, "spreadBps": 10.0}"#;
        let record: ScreenerRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.liquidity_usd, Some(50_000.0));
        assert_eq!(record.volume_24h_usd, None);
    }

    #[test]
    fn test_security_record_parses() {
        let json = r#"{
            "tokenAddress": "mintA",
            "isHoneypot": false,
            "mintAuthority": false,
            "freezeAuthority": true,
            "top10HoldersPct": 42.5
        }"#;
        let record: SecurityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.freeze_authority, Some(true));
        assert_eq!(record.top10_holders_pct, Some(42.5));
        assert_eq!(record.sim_success, None);
    }
}

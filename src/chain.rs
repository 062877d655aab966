//! Transport traits and chain adapters
//!
//! The core depends on these traits only; concrete RPC and router clients
//! live behind them. Adapters own their retry budgets: transient failures
//! are retried with bounded exponential backoff and surface to the core as
//! a single final error.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::TransactionConfirmationStatus;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Side;

/// Raw on-chain state of a submitted transaction, as the RPC reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Unknown to the cluster (not yet landed, expired, or rolled back).
    NotFound,
    Processed { slot: u64 },
    Confirmed { slot: u64 },
    Finalized { slot: u64 },
}

/// Read-side chain access used by the reorg guard and the reconciler.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_balance_lamports(&self) -> Result<u64>;
    async fn get_tx_state(&self, tx_sig: &str) -> Result<TxState>;
    async fn current_slot(&self) -> Result<u64>;
}

/// Quote request against the external router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub mint: String,
    pub side: Side,
    pub notional_usd: f64,
    /// Price the leader traded at; routers may improve on it.
    pub reference_price: f64,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub mint: String,
    pub side: Side,
    pub price: f64,
    pub expected_qty: f64,
    pub route: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub tx_sig: String,
    pub submitted_at: DateTime<Utc>,
}

/// Quote-and-submit access to the external DEX router.
#[async_trait]
pub trait QuoteRouter: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;
    async fn submit(&self, quote: &Quote, ttl_ms: u64) -> Result<SubmitReceipt>;
}

fn rpc_retry_policy(timeout_ms: u64, max_retries: u32) -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(timeout_ms),
        max_elapsed_time: Some(Duration::from_millis(timeout_ms * (max_retries as u64 + 1))),
        ..Default::default()
    }
}

/// Solana RPC adapter.
pub struct RpcChainClient {
    client: RpcClient,
    wallet: Pubkey,
    timeout_ms: u64,
    max_retries: u32,
}

impl RpcChainClient {
    pub fn new(endpoint: &str, wallet: &str, timeout_ms: u64, max_retries: u32) -> Result<Self> {
        let wallet = Pubkey::from_str(wallet)
            .map_err(|e| Error::Config(format!("invalid wallet pubkey: {}", e)))?;
        Ok(Self {
            client: RpcClient::new_with_timeout_and_commitment(
                endpoint.to_string(),
                Duration::from_millis(timeout_ms),
                CommitmentConfig::confirmed(),
            ),
            wallet,
            timeout_ms,
            max_retries,
        })
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        backoff::future::retry(
            rpc_retry_policy(self.timeout_ms, self.max_retries),
            || async {
                op().await.map_err(|e| {
                    if e.is_retryable() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            },
        )
        .await
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_balance_lamports(&self) -> Result<u64> {
        self.with_retry(|| async {
            self.client
                .get_balance(&self.wallet)
                .await
                .map_err(Error::from)
        })
        .await
    }

    async fn get_tx_state(&self, tx_sig: &str) -> Result<TxState> {
        let signature = Signature::from_str(tx_sig)
            .map_err(|e| Error::Internal(format!("invalid signature: {}", e)))?;

        let statuses = self
            .with_retry(|| async {
                self.client
                    .get_signature_statuses(&[signature])
                    .await
                    .map_err(Error::from)
            })
            .await?;

        let state = match statuses.value.into_iter().next().flatten() {
            None => TxState::NotFound,
            Some(status) => {
                let slot = status.slot;
                match status.confirmation_status {
                    Some(TransactionConfirmationStatus::Finalized) => TxState::Finalized { slot },
                    Some(TransactionConfirmationStatus::Confirmed) => TxState::Confirmed { slot },
                    _ => TxState::Processed { slot },
                }
            }
        };
        Ok(state)
    }

    async fn current_slot(&self) -> Result<u64> {
        self.with_retry(|| async { self.client.get_slot().await.map_err(Error::from) })
            .await
    }
}

/// Dry-run router: echoes the reference price and fabricates signatures.
/// Nothing reaches the chain.
pub struct DryRunRouter;

#[async_trait]
impl QuoteRouter for DryRunRouter {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let price = request.reference_price;
        if price <= 0.0 {
            return Err(Error::Quote("non-positive reference price".into()));
        }
        Ok(Quote {
            mint: request.mint.clone(),
            side: request.side,
            price,
            expected_qty: request.notional_usd / price,
            route: "dry-run".into(),
        })
    }

    async fn submit(&self, _quote: &Quote, _ttl_ms: u64) -> Result<SubmitReceipt> {
        Ok(SubmitReceipt {
            tx_sig: format!("dryrun-{}", Uuid::new_v4()),
            submitted_at: Utc::now(),
        })
    }
}

/// HTTP router adapter (aggregator-style REST API).
pub struct HttpQuoteRouter {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    quote: &'a Quote,
    ttl_ms: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    tx_sig: String,
    #[serde(default)]
    rejected: bool,
    #[serde(default)]
    reason: String,
}

impl HttpQuoteRouter {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(timeout_ms))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl QuoteRouter for HttpQuoteRouter {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Quote(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Quote(format!("status {}", resp.status())));
        }
        resp.json().await.map_err(|e| Error::Quote(e.to_string()))
    }

    async fn submit(&self, quote: &Quote, ttl_ms: u64) -> Result<SubmitReceipt> {
        let url = format!("{}/submit", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&SubmitBody { quote, ttl_ms })
            .send()
            .await
            .map_err(|e| Error::Submit(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(Error::Submit(format!("status {}", resp.status())));
        }
        let body: SubmitResponse = resp.json().await.map_err(|e| Error::Submit(e.to_string()))?;
        if body.rejected {
            return Err(Error::BundleRejected(body.reason));
        }
        Ok(SubmitReceipt {
            tx_sig: body.tx_sig,
            submitted_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_router_round_trip() {
        let router = DryRunRouter;
        let quote = router
            .quote(&QuoteRequest {
                mint: "mintA".into(),
                side: Side::Buy,
                notional_usd: 200.0,
                reference_price: 0.002,
                slippage_bps: 100,
            })
            .await
            .unwrap();

        assert_eq!(quote.price, 0.002);
        assert!((quote.expected_qty - 100_000.0).abs() < 1e-6);

        let receipt = router.submit(&quote, 60_000).await.unwrap();
        assert!(receipt.tx_sig.starts_with("dryrun-"));
    }

    #[tokio::test]
    async fn test_dry_run_rejects_bad_price() {
        let router = DryRunRouter;
        let result = router
            .quote(&QuoteRequest {
                mint: "mintA".into(),
                side: Side::Buy,
                notional_usd: 200.0,
                reference_price: 0.0,
                slippage_bps: 100,
            })
            .await;
        assert!(result.is_err());
    }
}

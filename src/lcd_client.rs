//! # LCD Data Source
//!
//! Defines the remote capability the enrichment pipeline depends on: for a given
//! endpoint and address, fetch bank balances and active staking delegations.
//!
//! ## Overview
//!
//! The `AccountDataSource` trait is the seam between the pipeline and the
//! network. `LcdHttpClient` implements it against the Cosmos SDK REST (LCD)
//! routes:
//!
//! - `GET {endpoint}/cosmos/bank/v1beta1/balances/{address}`
//! - `GET {endpoint}/cosmos/staking/v1beta1/delegations/{address}`
//!
//! Implementations report every failure as a typed [`FetchError`]; turning
//! failures into default values is the job of
//! [`RemoteFetcher`](crate::remote_fetcher::RemoteFetcher).
//!
//! ## Implementing a Data Source
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use xchain_overlap::lcd_client::{
//!     AccountDataSource, BalancesResponse, DelegationsResponse, FetchError,
//! };
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl AccountDataSource for Offline {
//!     async fn balances(&self, _endpoint: &str, _address: &str) -> Result<BalancesResponse, FetchError> {
//!         Ok(BalancesResponse::default())
//!     }
//!
//!     async fn delegations(&self, _endpoint: &str, _address: &str) -> Result<DelegationsResponse, FetchError> {
//!         Ok(DelegationsResponse::default())
//!     }
//! }
//! ```

use async_trait::async_trait;
use log::debug;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// A single coin entry from the bank balances route.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Coin {
    pub denom: String,
    /// Amount in base units, as a decimal integer string
    pub amount: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BalancesResponse {
    #[serde(default)]
    pub balances: Vec<Coin>,
}

impl BalancesResponse {
    pub fn amount_of(&self, denom: &str) -> Option<&str> {
        self.balances
            .iter()
            .find(|coin| coin.denom == denom)
            .map(|coin| coin.amount.as_str())
    }
}

/// Delegation entries are only counted, so their shape is left opaque.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DelegationsResponse {
    #[serde(default)]
    pub delegation_responses: Vec<serde_json::Value>,
}

/// Remote capability: balance and delegation lookups against one endpoint.
#[async_trait]
pub trait AccountDataSource: Send + Sync {
    async fn balances(&self, endpoint: &str, address: &str)
        -> Result<BalancesResponse, FetchError>;

    async fn delegations(
        &self,
        endpoint: &str,
        address: &str,
    ) -> Result<DelegationsResponse, FetchError>;
}

/// Reqwest-backed LCD client.
///
/// Redirects are not followed: a 3xx response surfaces as
/// [`FetchError::Redirect`] instead of being chased to another host.
#[derive(Debug, Clone)]
pub struct LcdHttpClient {
    client: reqwest::Client,
}

impl LcdHttpClient {
    pub fn new(request_timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.is_redirection() {
            return Err(FetchError::Redirect(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await?;
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(FetchError::EmptyBody);
        }

        serde_json::from_slice(&body).map_err(|e| {
            let preview = String::from_utf8_lossy(&body[..body.len().min(100)]).into_owned();
            debug!("[LCD] unparseable body from {}: {}...", url, preview);
            FetchError::Malformed(e.to_string())
        })
    }
}

#[async_trait]
impl AccountDataSource for LcdHttpClient {
    async fn balances(
        &self,
        endpoint: &str,
        address: &str,
    ) -> Result<BalancesResponse, FetchError> {
        let url = format!("{}/cosmos/bank/v1beta1/balances/{}", endpoint, address);
        self.get_json(&url).await
    }

    async fn delegations(
        &self,
        endpoint: &str,
        address: &str,
    ) -> Result<DelegationsResponse, FetchError> {
        let url = format!("{}/cosmos/staking/v1beta1/delegations/{}", endpoint, address);
        self.get_json(&url).await
    }
}

/// Every way a single remote lookup can fail.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected redirect (HTTP {0})")]
    Redirect(u16),
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    #[error("empty response body")]
    EmptyBody,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("invalid amount '{0}'")]
    InvalidAmount(String),
}

impl FetchError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout(_) => "timeout",
            FetchError::Transport(_) => "transport",
            FetchError::Redirect(_) => "redirect",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::EmptyBody => "empty_body",
            FetchError::Malformed(_) => "malformed",
            FetchError::InvalidAmount(_) => "invalid_amount",
        }
    }
}

// src/remote_fetcher.rs

use crate::endpoint_pool::EndpointPool;
use crate::lcd_client::{AccountDataSource, FetchError};
use crate::metrics;
use crate::settings::Fetch;
use crate::types::StakingStatus;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

type DefaultDirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The endpoint answered and the value was read from its response
    Confirmed,
    /// The lookup failed; the value is the conservative default.
    /// Carries the failure kind (see [`FetchError::kind`]).
    Defaulted(&'static str),
}

/// A value that always resolves, tagged with whether it was actually observed.
///
/// The persisted output collapses both cases, but logs and metrics keep them apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    pub value: T,
    pub provenance: Provenance,
}

impl<T> Fetched<T> {
    pub fn confirmed(value: T) -> Self {
        Self {
            value,
            provenance: Provenance::Confirmed,
        }
    }

    pub fn defaulted(value: T, kind: &'static str) -> Self {
        Self {
            value,
            provenance: Provenance::Defaulted(kind),
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self.provenance, Provenance::Defaulted(_))
    }
}

/// Balance and staking lookups with a hard per-request deadline.
///
/// Each call draws exactly one endpoint from the shared [`EndpointPool`],
/// performs one request (no retries) and never fails: any error, including a
/// timeout, resolves to `"0"` / [`StakingStatus::No`]. On timeout the request
/// future is dropped, which aborts the in-flight HTTP exchange.
pub struct RemoteFetcher {
    source: Arc<dyn AccountDataSource>,
    pool: Arc<EndpointPool>,
    denom: String,
    scale: Decimal,
    request_timeout: Duration,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl RemoteFetcher {
    pub fn new(source: Arc<dyn AccountDataSource>, pool: Arc<EndpointPool>, fetch: &Fetch) -> Self {
        let limiter = fetch
            .max_requests_per_second
            .and_then(NonZeroU32::new)
            .map(|qps| Arc::new(RateLimiter::direct(Quota::per_second(qps))));

        Self {
            source,
            pool,
            denom: fetch.denom.clone(),
            scale: Decimal::from(fetch.scale_factor.max(1)),
            request_timeout: fetch.request_timeout(),
            limiter,
        }
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Balance of `address` in display units, `"0"` on any failure.
    pub async fn fetch_balance(&self, address: &str) -> Fetched<String> {
        // Draw before the first await so dispatch order decides the endpoint
        let endpoint = self.pool.next();

        match self.try_fetch_balance(endpoint, address).await {
            Ok(balance) => {
                debug!("[Fetcher] balance {} via {} = {}", address, endpoint, balance);
                metrics::record_fetch("balance", "confirmed");
                Fetched::confirmed(balance.to_string())
            }
            Err(e) => {
                warn!(
                    "[Fetcher] balance lookup for {} via {} failed, assuming zero: {}",
                    address, endpoint, e
                );
                metrics::record_fetch("balance", "defaulted");
                metrics::record_fetch_defaulted("balance", e.kind());
                Fetched::defaulted("0".to_string(), e.kind())
            }
        }
    }

    /// Whether `address` has any active delegation, `No` on any failure.
    pub async fn fetch_staking_status(&self, address: &str) -> Fetched<StakingStatus> {
        let endpoint = self.pool.next();

        match self.try_fetch_staking_status(endpoint, address).await {
            Ok(status) => {
                debug!("[Fetcher] staking {} via {} = {}", address, endpoint, status);
                metrics::record_fetch("staking", "confirmed");
                Fetched::confirmed(status)
            }
            Err(e) => {
                warn!(
                    "[Fetcher] staking lookup for {} via {} failed, assuming not staking: {}",
                    address, endpoint, e
                );
                metrics::record_fetch("staking", "defaulted");
                metrics::record_fetch_defaulted("staking", e.kind());
                Fetched::defaulted(StakingStatus::No, e.kind())
            }
        }
    }

    async fn try_fetch_balance(&self, endpoint: &str, address: &str) -> Result<Decimal, FetchError> {
        self.throttle().await;

        let response = tokio::time::timeout(
            self.request_timeout,
            self.source.balances(endpoint, address),
        )
        .await
        .map_err(|_| FetchError::Timeout(self.request_timeout))??;

        match response.amount_of(&self.denom) {
            Some(amount) => to_display_units(amount, self.scale),
            None => Ok(Decimal::ZERO),
        }
    }

    async fn try_fetch_staking_status(
        &self,
        endpoint: &str,
        address: &str,
    ) -> Result<StakingStatus, FetchError> {
        self.throttle().await;

        let response = tokio::time::timeout(
            self.request_timeout,
            self.source.delegations(endpoint, address),
        )
        .await
        .map_err(|_| FetchError::Timeout(self.request_timeout))??;

        Ok(StakingStatus::from_delegation_count(
            response.delegation_responses.len(),
        ))
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

/// Converts a base-unit integer string into normalized display units,
/// e.g. `"1500000"` with scale 10^6 becomes `1.5`.
pub fn to_display_units(amount: &str, scale: Decimal) -> Result<Decimal, FetchError> {
    let trimmed = amount.trim();
    let base = Decimal::from_str(trimmed).map_err(|_| FetchError::InvalidAmount(amount.to_string()))?;
    if base.is_sign_negative() && !base.is_zero() {
        return Err(FetchError::InvalidAmount(amount.to_string()));
    }
    let display = base
        .checked_div(scale)
        .ok_or_else(|| FetchError::InvalidAmount(amount.to_string()))?;
    Ok(display.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd_client::{BalancesResponse, Coin, DelegationsResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const SCALE: u64 = 1_000_000;

    #[derive(Default)]
    struct Scripted {
        balance: Option<String>,
        delegations: usize,
        fail_with_status: Option<u16>,
        delay: Option<Duration>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccountDataSource for Scripted {
        async fn balances(&self, endpoint: &str, _address: &str) -> Result<BalancesResponse, FetchError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = self.fail_with_status {
                return Err(FetchError::HttpStatus(status));
            }
            Ok(BalancesResponse {
                balances: self
                    .balance
                    .iter()
                    .map(|amount| Coin {
                        denom: "uatom".to_string(),
                        amount: amount.clone(),
                    })
                    .collect(),
            })
        }

        async fn delegations(&self, endpoint: &str, _address: &str) -> Result<DelegationsResponse, FetchError> {
            self.calls.lock().unwrap().push(endpoint.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(status) = self.fail_with_status {
                return Err(FetchError::HttpStatus(status));
            }
            Ok(DelegationsResponse {
                delegation_responses: vec![serde_json::json!({}); self.delegations],
            })
        }
    }

    fn fetcher(source: Arc<Scripted>, endpoints: usize) -> RemoteFetcher {
        let pool = Arc::new(
            EndpointPool::new((0..endpoints).map(|i| format!("https://lcd-{}.example", i)).collect())
                .unwrap(),
        );
        RemoteFetcher::new(source, pool, &Fetch::default())
    }

    #[test]
    fn test_to_display_units() {
        let scale = Decimal::from(SCALE);
        assert_eq!(to_display_units("5000000", scale).unwrap().to_string(), "5");
        assert_eq!(to_display_units("1500000", scale).unwrap().to_string(), "1.5");
        assert_eq!(to_display_units("1", scale).unwrap().to_string(), "0.000001");
        assert_eq!(to_display_units("0", scale).unwrap().to_string(), "0");
        assert!(to_display_units("12abc", scale).is_err());
        assert!(to_display_units("-5", scale).is_err());
    }

    #[tokio::test]
    async fn test_balance_confirmed() {
        let source = Arc::new(Scripted {
            balance: Some("5000000".to_string()),
            ..Default::default()
        });
        let fetched = fetcher(source, 1).fetch_balance("cosmos1a").await;
        assert_eq!(fetched, Fetched::confirmed("5".to_string()));
    }

    #[tokio::test]
    async fn test_absent_denom_is_confirmed_zero() {
        let source = Arc::new(Scripted::default());
        let fetched = fetcher(source, 1).fetch_balance("cosmos1a").await;
        assert_eq!(fetched, Fetched::confirmed("0".to_string()));
    }

    #[tokio::test]
    async fn test_failures_default() {
        let source = Arc::new(Scripted {
            balance: Some("5000000".to_string()),
            delegations: 2,
            fail_with_status: Some(502),
            ..Default::default()
        });
        let f = fetcher(source, 1);
        assert_eq!(f.fetch_balance("cosmos1a").await, Fetched::defaulted("0".to_string(), "http_status"));
        assert_eq!(
            f.fetch_staking_status("cosmos1a").await,
            Fetched::defaulted(StakingStatus::No, "http_status")
        );
    }

    #[tokio::test]
    async fn test_invalid_amount_defaults() {
        let source = Arc::new(Scripted {
            balance: Some("not-a-number".to_string()),
            ..Default::default()
        });
        let fetched = fetcher(source, 1).fetch_balance("cosmos1a").await;
        assert_eq!(fetched.value, "0");
        assert_eq!(fetched.provenance, Provenance::Defaulted("invalid_amount"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_defaults_within_bound() {
        let source = Arc::new(Scripted {
            balance: Some("5000000".to_string()),
            delegations: 1,
            delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let f = fetcher(source, 1);

        let start = tokio::time::Instant::now();
        let (balance, staking) =
            tokio::join!(f.fetch_balance("cosmos1a"), f.fetch_staking_status("cosmos1a"));
        let elapsed = start.elapsed();

        assert_eq!(balance, Fetched::defaulted("0".to_string(), "timeout"));
        assert_eq!(staking, Fetched::defaulted(StakingStatus::No, "timeout"));
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_staking_yes_iff_delegations() {
        let staking = Arc::new(Scripted {
            delegations: 1,
            ..Default::default()
        });
        assert_eq!(
            fetcher(staking, 1).fetch_staking_status("cosmos1a").await,
            Fetched::confirmed(StakingStatus::Yes)
        );

        let idle = Arc::new(Scripted::default());
        assert_eq!(
            fetcher(idle, 1).fetch_staking_status("cosmos1a").await,
            Fetched::confirmed(StakingStatus::No)
        );
    }

    #[tokio::test]
    async fn test_each_call_draws_one_endpoint() {
        let source = Arc::new(Scripted::default());
        let f = fetcher(source.clone(), 2);
        f.fetch_balance("cosmos1a").await;
        f.fetch_staking_status("cosmos1a").await;
        f.fetch_balance("cosmos1b").await;

        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![
                "https://lcd-0.example",
                "https://lcd-1.example",
                "https://lcd-0.example",
            ]
        );
    }
}

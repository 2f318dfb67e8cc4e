// src/endpoint_pool.rs

use log::info;
use std::sync::atomic::{AtomicUsize, Ordering};
use url::Url;

/// Round-robin pool of interchangeable LCD endpoints.
///
/// Every call to [`EndpointPool::next`] advances a shared cursor by one, so
/// across N calls with M endpoints each endpoint is handed out either
/// `floor(N/M)` or `ceil(N/M)` times, in strict cyclic order.
///
/// The cursor is advanced with a single atomic read-modify-write, which keeps
/// the rotation fair when fetches run on a multi-threaded runtime.
///
/// ## Usage
///
/// ```rust
/// use xchain_overlap::endpoint_pool::EndpointPool;
///
/// let pool = EndpointPool::new(vec![
///     "https://lcd-a.example".to_string(),
///     "https://lcd-b.example".to_string(),
/// ]).unwrap();
/// assert_eq!(pool.next(), "https://lcd-a.example");
/// assert_eq!(pool.next(), "https://lcd-b.example");
/// assert_eq!(pool.next(), "https://lcd-a.example");
/// ```
#[derive(Debug)]
pub struct EndpointPool {
    endpoints: Vec<String>,
    current_index: AtomicUsize,
}

impl EndpointPool {
    /// Builds a pool from base URLs. Trailing slashes are trimmed so request
    /// paths can be appended uniformly.
    pub fn new(endpoints: Vec<String>) -> Result<Self, PoolError> {
        if endpoints.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut normalized = Vec::with_capacity(endpoints.len());
        for raw in endpoints {
            let trimmed = raw.trim().trim_end_matches('/').to_string();
            let parsed =
                Url::parse(&trimmed).map_err(|e| PoolError::InvalidEndpoint(raw.clone(), e.to_string()))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(PoolError::InvalidEndpoint(
                    raw,
                    format!("unsupported scheme '{}'", parsed.scheme()),
                ));
            }
            normalized.push(trimmed);
        }

        info!("EndpointPool: {} endpoints in rotation", normalized.len());

        Ok(Self {
            endpoints: normalized,
            current_index: AtomicUsize::new(0),
        })
    }

    /// Returns the endpoint under the cursor and advances the cursor.
    pub fn next(&self) -> &str {
        let len = self.endpoints.len();
        // fetch_update keeps the stored cursor in [0, len) so it never wraps unevenly
        let previous = self
            .current_index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1) % len))
            .unwrap_or_else(|i| i);
        &self.endpoints[previous]
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("endpoint pool must contain at least one endpoint")]
    Empty,
    #[error("invalid endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn pool_of(n: usize) -> EndpointPool {
        EndpointPool::new((0..n).map(|i| format!("https://lcd-{}.example/", i)).collect()).unwrap()
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(matches!(EndpointPool::new(vec![]), Err(PoolError::Empty)));
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let err = EndpointPool::new(vec!["not a url".to_string()]).unwrap_err();
        assert!(matches!(err, PoolError::InvalidEndpoint(_, _)));

        let err = EndpointPool::new(vec!["ftp://lcd.example".to_string()]).unwrap_err();
        assert!(matches!(err, PoolError::InvalidEndpoint(_, _)));
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let pool = pool_of(1);
        assert_eq!(pool.next(), "https://lcd-0.example");
    }

    #[test]
    fn test_strict_cyclic_order() {
        let pool = pool_of(3);
        let drawn: Vec<&str> = (0..7).map(|_| pool.next()).collect();
        assert_eq!(
            drawn,
            vec![
                "https://lcd-0.example",
                "https://lcd-1.example",
                "https://lcd-2.example",
                "https://lcd-0.example",
                "https://lcd-1.example",
                "https://lcd-2.example",
                "https://lcd-0.example",
            ]
        );
    }

    #[test]
    fn test_fairness_floor_ceil() {
        for m in 1..=5 {
            for n in 0..=23 {
                let pool = pool_of(m);
                let mut counts: HashMap<String, usize> = HashMap::new();
                for _ in 0..n {
                    *counts.entry(pool.next().to_string()).or_default() += 1;
                }
                for endpoint in pool.endpoints() {
                    let c = counts.get(endpoint).copied().unwrap_or(0);
                    assert!(c == n / m || c == (n + m - 1) / m, "m={} n={} c={}", m, n, c);
                }
            }
        }
    }

    #[test]
    fn test_fairness_across_threads() {
        let pool = Arc::new(pool_of(4));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    (0..250).map(|_| pool.next().to_string()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for endpoint in handle.join().unwrap() {
                *counts.entry(endpoint).or_default() += 1;
            }
        }
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&c| c == 500));
    }
}

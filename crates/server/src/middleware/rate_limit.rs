//! Complaint submission throttling.
//!
//! A fixed-window counter per client key, kept in a `moka` cache whose TTL
//! equals the window so idle clients are evicted on their own. Each check is a
//! single atomic upsert on the client's entry.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use moka::future::Cache;

use crate::config::RateLimitConfig;

/// Upper bound on distinct clients tracked at once.
const MAX_TRACKED_CLIENTS: u64 = 100_000;

// =============================================================================
// Client Key Extraction
// =============================================================================

/// The key a request is throttled under: the first valid client IP from the
/// proxy headers, then the socket peer, else `"unknown"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

impl ClientKey {
    fn from_parts(parts: &Parts) -> Self {
        let from_headers = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip", "fly-client-ip"]
            .into_iter()
            .find_map(|name| header_ip(&parts.headers, name));

        let ip = from_headers.or_else(|| {
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        });

        Self(ip.map_or_else(|| "unknown".to_owned(), |ip| ip.to_string()))
    }
}

impl<S> FromRequestParts<S> for ClientKey
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

// =============================================================================
// Limiter
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// A rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    /// Submissions allowed per window.
    pub limit: u32,
    /// Time until the client's window resets.
    pub retry_after: Duration,
}

/// Per-client submission counter.
#[derive(Clone)]
pub struct SubmissionLimiter {
    windows: Cache<String, Window>,
    config: RateLimitConfig,
}

impl SubmissionLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let windows = Cache::builder()
            .max_capacity(MAX_TRACKED_CLIENTS)
            .time_to_live(config.window)
            .build();

        Self { windows, config }
    }

    #[must_use]
    pub const fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Count one submission for `key`.
    ///
    /// Returns the submissions left in the current window.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] once the client has used up its window.
    pub async fn check(&self, key: &ClientKey) -> Result<u32, RateLimited> {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &ClientKey, now: Instant) -> Result<u32, RateLimited> {
        let window = self.config.window;

        let entry = self
            .windows
            .entry(key.0.clone())
            .and_upsert_with(|existing| {
                let next = match existing.map(|e| e.into_value()) {
                    Some(current) if now.saturating_duration_since(current.started) < window => {
                        Window {
                            started: current.started,
                            count: current.count.saturating_add(1),
                        }
                    }
                    _ => Window {
                        started: now,
                        count: 1,
                    },
                };
                std::future::ready(next)
            })
            .await;

        let current = entry.into_value();
        if current.count > self.config.max_requests {
            let elapsed = now.saturating_duration_since(current.started);
            tracing::warn!(client = %key.0, count = current.count, "Submission rate limit exceeded");
            return Err(RateLimited {
                limit: self.config.max_requests,
                retry_after: window.saturating_sub(elapsed),
            });
        }

        Ok(self.config.max_requests - current.count)
    }
}

//! Token-bucket rate limiting for the webhook endpoint, keyed by source IP.

use axum::http::HeaderMap;
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::time::Duration;

pub struct WebhookRateLimiter {
    limiter: RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>,
}

impl WebhookRateLimiter {
    /// Allows `max_requests` per `window_secs` per source, with the full
    /// window available as burst capacity.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        let burst = NonZeroU32::new(max_requests).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(window_secs.max(1));
        let replenish = (window / burst.get()).max(Duration::from_nanos(1));
        let quota = Quota::with_period(replenish)
            .map(|q| q.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_minute(burst));

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check(&self, source: IpAddr) -> bool {
        self.limiter.check_key(&source).is_ok()
    }
}

/// Client address for rate-limiting purposes. The first `X-Forwarded-For`
/// hop wins over the peer address when present.
pub fn source_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
        .unwrap_or_else(|| peer.ip())
}

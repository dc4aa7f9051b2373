//! Rate limiting using the governor crate.

use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use uuid::Uuid;

/// Limiter keyed by user id.
pub type KeyedRateLimiter = Arc<DefaultKeyedRateLimiter<Uuid>>;

/// Create a per-user limiter allowing `requests_per_minute` (at least one).
pub fn create_rate_limiter_with_quota(requests_per_minute: u32) -> KeyedRateLimiter {
    let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)))
}

/// True when `user_id` still has quota; consumes one cell.
pub fn allow(limiter: &KeyedRateLimiter, user_id: Uuid) -> bool {
    match limiter.check_key(&user_id) {
        Ok(()) => true,
        Err(_) => {
            tracing::warn!("Rate limit exceeded for user {}", user_id);
            false
        }
    }
}

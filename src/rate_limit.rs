/// Rate Limiting System
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ParlorError, ParlorResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Separate quotas for callers with and without a bearer token
#[derive(Clone)]
pub struct RateLimiter {
    enabled: bool,
    authenticated: Arc<DirectLimiter>,
    anonymous: Arc<DirectLimiter>,
}

fn quota(rps: u32, burst: u32) -> Quota {
    let rps = NonZeroU32::new(rps).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rps);
    Quota::per_second(rps).allow_burst(burst)
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            authenticated: Arc::new(GovernorLimiter::direct(quota(
                config.authenticated_rps,
                config.burst_size,
            ))),
            anonymous: Arc::new(GovernorLimiter::direct(quota(
                config.anonymous_rps,
                config.burst_size / 4,
            ))),
        }
    }

    /// Check rate limit for a caller presenting a bearer token
    pub fn check_authenticated(&self) -> ParlorResult<()> {
        self.check(&self.authenticated)
    }

    /// Check rate limit for an anonymous caller
    pub fn check_anonymous(&self) -> ParlorResult<()> {
        self.check(&self.anonymous)
    }

    fn check(&self, limiter: &DirectLimiter) -> ParlorResult<()> {
        if !self.enabled {
            return Ok(());
        }
        limiter.check().map_err(|not_until| ParlorError::RateLimitExceeded {
            retry_after: not_until.wait_time_from(limiter.clock().now()),
        })
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Response {
    let has_auth_header = request.headers().contains_key("authorization");

    let result = if has_auth_header {
        ctx.rate_limiter.check_authenticated()
    } else {
        ctx.rate_limiter.check_anonymous()
    };

    match result {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::warn!(path = %request.uri().path(), authenticated = has_auth_header, "rate limit exceeded");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(&RateLimitConfig::default());

        assert!(limiter.check_authenticated().is_ok());
        assert!(limiter.check_anonymous().is_ok());
    }

    #[test]
    fn test_burst_limit() {
        let config = RateLimitConfig {
            enabled: true,
            authenticated_rps: 1,
            anonymous_rps: 1,
            burst_size: 5,
        };
        let limiter = RateLimiter::new(&config);

        for _ in 0..5 {
            assert!(limiter.check_authenticated().is_ok());
        }
        match limiter.check_authenticated() {
            Err(ParlorError::RateLimitExceeded { retry_after }) => {
                assert!(retry_after <= std::time::Duration::from_secs(1));
            }
            other => panic!("expected rate limit error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejection_carries_retry_after_header() {
        let config = RateLimitConfig {
            enabled: true,
            authenticated_rps: 1,
            anonymous_rps: 1,
            burst_size: 1,
        };
        let limiter = RateLimiter::new(&config);
        assert!(limiter.check_anonymous().is_ok());

        let response = limiter.check_anonymous().unwrap_err().into_response();
        assert_eq!(response.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "1"
        );
    }

    #[test]
    fn test_disabled_limiter_never_rejects() {
        let config = RateLimitConfig {
            enabled: false,
            authenticated_rps: 1,
            anonymous_rps: 1,
            burst_size: 1,
        };
        let limiter = RateLimiter::new(&config);

        for _ in 0..10 {
            assert!(limiter.check_anonymous().is_ok());
        }
    }
}

use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use tracing::{debug, instrument};

/// What to do when a request would exceed a rate limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RateLimitingBehaviour {
    /// Reject the request with [`ExchangeError::RateLimited`]
    Fail,
    /// Wait until the request fits in the limit
    #[default]
    Wait,
}

/// Rate limit gate consulted by the requester before a request is sent
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take `weight` units of capacity
    async fn acquire(
        &self,
        weight: u32,
        behaviour: RateLimitingBehaviour,
    ) -> Result<(), ExchangeError>;
}

/// [`RateLimiter`] backed by a GCRA limiter from `governor`
pub struct GovernorRateLimiter {
    name: String,
    limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for GovernorRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernorRateLimiter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GovernorRateLimiter {
    pub fn new(name: impl Into<String>, quota: Quota) -> Self {
        Self {
            name: name.into(),
            limiter: governor::RateLimiter::direct(quota),
        }
    }

    pub fn per_second(name: impl Into<String>, weight: NonZeroU32) -> Self {
        Self::new(name, Quota::per_second(weight))
    }

    pub fn per_minute(name: impl Into<String>, weight: NonZeroU32) -> Self {
        Self::new(name, Quota::per_minute(weight))
    }
}

#[async_trait]
impl RateLimiter for GovernorRateLimiter {
    #[instrument(skip(self), fields(limiter = %self.name))]
    async fn acquire(
        &self,
        weight: u32,
        behaviour: RateLimitingBehaviour,
    ) -> Result<(), ExchangeError> {
        let Some(cells) = NonZeroU32::new(weight) else {
            return Ok(());
        };

        match behaviour {
            RateLimitingBehaviour::Fail => match self.limiter.check_n(cells) {
                Ok(Ok(())) => Ok(()),
                Ok(Err(_)) => {
                    debug!("Rate limit reached, rejecting request");
                    Err(ExchangeError::RateLimited(format!(
                        "{} limit reached for weight {}",
                        self.name, weight
                    )))
                }
                Err(e) => Err(ExchangeError::RateLimited(format!("{}: {}", self.name, e))),
            },
            RateLimitingBehaviour::Wait => self
                .limiter
                .until_n_ready(cells)
                .await
                .map_err(|e| ExchangeError::RateLimited(format!("{}: {}", self.name, e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero_ext::nonzero;

    #[tokio::test]
    async fn test_fail_behaviour_rejects_over_limit() {
        let limiter = GovernorRateLimiter::per_minute("test", nonzero!(2u32));
        assert!(limiter.acquire(1, RateLimitingBehaviour::Fail).await.is_ok());
        assert!(limiter.acquire(1, RateLimitingBehaviour::Fail).await.is_ok());
        let err = limiter
            .acquire(1, RateLimitingBehaviour::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::RateLimited(_)));
    }

    #[tokio::test]
    async fn test_weight_above_capacity_is_rejected() {
        let limiter = GovernorRateLimiter::per_second("test", nonzero!(5u32));
        assert!(limiter.acquire(6, RateLimitingBehaviour::Wait).await.is_err());
        assert!(limiter.acquire(0, RateLimitingBehaviour::Fail).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_behaviour_waits_for_capacity() {
        let limiter = GovernorRateLimiter::per_second("test", nonzero!(20u32));
        for _ in 0..25 {
            limiter
                .acquire(1, RateLimitingBehaviour::Wait)
                .await
                .unwrap();
        }
    }
}

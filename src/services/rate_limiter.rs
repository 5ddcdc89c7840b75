//! Rate limiter for login attempts
//!
//! Two counters protect the password and second factor checks:
//! - failed attempts per account key, over a sliding window
//! - login requests per client address, over one minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

use crate::config::SecurityConfig;

/// Login rate limiter
pub struct LoginRateLimiter {
    max_failures: usize,
    failure_window: Duration,
    requests_per_minute: usize,
    /// Failed attempts by account key (email, or `totp:{user id}`)
    failures: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    /// Login requests by client address
    requests: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

impl LoginRateLimiter {
    pub fn new(max_failures: usize, failure_window: Duration, requests_per_minute: usize) -> Self {
        Self {
            max_failures,
            failure_window,
            requests_per_minute,
            failures: RwLock::new(HashMap::new()),
            requests: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(security: &SecurityConfig) -> Self {
        Self::new(
            security.login_max_failures,
            Duration::minutes(security.login_failure_window_minutes),
            security.login_requests_per_minute,
        )
    }

    /// Key counting the second factor failures of a user
    pub fn totp_key(user_id: i64) -> String {
        format!("totp:{}", user_id)
    }

    /// Whether `key` reached its failed attempts in the window
    pub async fn is_limited(&self, key: &str) -> bool {
        let cutoff = Utc::now() - self.failure_window;
        let mut failures = self.failures.write().await;
        match failures.get_mut(&key.trim().to_lowercase()) {
            Some(times) => {
                times.retain(|time| *time > cutoff);
                times.len() >= self.max_failures
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, key: &str) {
        let mut failures = self.failures.write().await;
        failures.entry(key.trim().to_lowercase()).or_default().push(Utc::now());
    }

    /// Forget the failures of `key` after a successful attempt
    pub async fn clear(&self, key: &str) {
        self.failures.write().await.remove(&key.trim().to_lowercase());
    }

    /// Count a login request from `ip`; false once the address is over its limit
    pub async fn allow_request(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(1);
        let mut requests = self.requests.write().await;
        let times = requests.entry(ip).or_default();
        times.retain(|time| *time > cutoff);
        if times.len() >= self.requests_per_minute {
            return false;
        }
        times.push(now);
        true
    }

    /// Drop counters that left their window
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let failure_cutoff = now - self.failure_window;
        let request_cutoff = now - Duration::minutes(1);

        {
            let mut failures = self.failures.write().await;
            failures.retain(|_, times| {
                times.retain(|time| *time > failure_cutoff);
                !times.is_empty()
            });
        }

        let mut requests = self.requests.write().await;
        requests.retain(|_, times| {
            times.retain(|time| *time > request_cutoff);
            !times.is_empty()
        });
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::from_config(&SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_account_limit() {
        let limiter = LoginRateLimiter::default();

        for _ in 0..4 {
            assert!(!limiter.is_limited("jane@example.com").await);
            limiter.record_failure("jane@example.com").await;
        }
        limiter.record_failure("jane@example.com").await;
        assert!(limiter.is_limited("jane@example.com").await);
        assert!(!limiter.is_limited("john@example.com").await);

        limiter.clear("jane@example.com").await;
        assert!(!limiter.is_limited("jane@example.com").await);
    }

    #[tokio::test]
    async fn test_keys_ignore_case_and_spaces() {
        let limiter = LoginRateLimiter::new(3, Duration::minutes(15), 10);
        limiter.record_failure("Jane@Example.com").await;
        limiter.record_failure(" jane@example.com").await;
        limiter.record_failure("JANE@EXAMPLE.COM").await;
        assert!(limiter.is_limited("jane@example.com").await);
    }

    #[tokio::test]
    async fn test_failures_expire() {
        let limiter = LoginRateLimiter::new(1, Duration::zero(), 10);
        limiter.record_failure(&LoginRateLimiter::totp_key(1)).await;
        assert!(!limiter.is_limited(&LoginRateLimiter::totp_key(1)).await);

        limiter.cleanup().await;
        assert!(limiter.failures.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_request_limit() {
        let limiter = LoginRateLimiter::default();
        let ip = IpAddr::from_str("127.0.0.1").unwrap();
        let other = IpAddr::from_str("10.0.0.2").unwrap();

        for _ in 0..10 {
            assert!(limiter.allow_request(ip).await);
        }
        assert!(!limiter.allow_request(ip).await);
        assert!(limiter.allow_request(other).await);
    }
}

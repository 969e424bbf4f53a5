//! Sign-in throttling
//!
//! Two sliding windows guard the sign-in endpoints:
//! - failed attempts per email address (5 per 15 minutes)
//! - requests per client IP (10 per minute)

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Timestamps of recent events per key, bounded by a window and a limit.
struct SlidingWindow<K> {
    limit: usize,
    window: Duration,
    events: RwLock<HashMap<K, Vec<DateTime<Utc>>>>,
}

impl<K: Eq + Hash> SlidingWindow<K> {
    fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            events: RwLock::new(HashMap::new()),
        }
    }

    async fn is_limited(&self, key: K) -> bool {
        let cutoff = Utc::now() - self.window;
        let mut events = self.events.write().await;
        match events.get_mut(&key) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= self.limit
            }
            None => false,
        }
    }

    async fn record(&self, key: K) {
        self.events
            .write()
            .await
            .entry(key)
            .or_default()
            .push(Utc::now());
    }

    async fn clear(&self, key: &K) {
        self.events.write().await.remove(key);
    }

    async fn prune(&self) {
        let cutoff = Utc::now() - self.window;
        self.events.write().await.retain(|_, times| {
            times.retain(|t| *t > cutoff);
            !times.is_empty()
        });
    }

    async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

/// Login rate limiter shared by the HTML and JSON sign-in handlers
pub struct LoginRateLimiter {
    emails: SlidingWindow<String>,
    ips: SlidingWindow<IpAddr>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::with_limits(5, Duration::minutes(15), 10, Duration::minutes(1))
    }

    /// Custom limits, mostly for tests
    pub fn with_limits(
        email_limit: usize,
        email_window: Duration,
        ip_limit: usize,
        ip_window: Duration,
    ) -> Self {
        Self {
            emails: SlidingWindow::new(email_limit, email_window),
            ips: SlidingWindow::new(ip_limit, ip_window),
        }
    }

    /// True once the email has used up its failed attempts for the window
    pub async fn is_email_limited(&self, email: &str) -> bool {
        self.emails.is_limited(email_key(email)).await
    }

    /// Record a failed sign-in for an email
    pub async fn record_failed_attempt(&self, email: &str) {
        self.emails.record(email_key(email)).await;
    }

    /// Forget failed attempts after a successful sign-in
    pub async fn clear_email_attempts(&self, email: &str) {
        self.emails.clear(&email_key(email)).await;
    }

    /// True once the IP has made too many requests in the window
    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        self.ips.is_limited(ip).await
    }

    /// Record a sign-in request from an IP
    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ips.record(ip).await;
    }

    /// Drop expired entries. `main` calls this every five minutes.
    pub async fn cleanup(&self) {
        self.emails.prune().await;
        self.ips.prune().await;
        tracing::debug!(
            "Rate limiter tracking {} email(s), {} IP(s)",
            self.emails.len().await,
            self.ips.len().await
        );
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

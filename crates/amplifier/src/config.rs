//! Client configuration.

use std::time::Duration;

use amplifier_session::SessionConfig;
use rand::Rng;
use tracing::warn;

/// Where the audio backend listens unless told otherwise.
pub const DEFAULT_BACKEND_URL: &str = "ws://localhost:9090/ws";

// ---------------------------------------------------------------------------
// ReconnectPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff for re-establishing the backend link.
///
/// The delay before attempt `n` (1-based) is
/// `initial_delay * 2^(n-1)`, capped at `max_delay`, plus a random jitter
/// in `0..jitter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound of the random delay added to every attempt. Zero
    /// disables jitter.
    pub jitter: Duration,
    /// Reconnection attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-based), without
    /// jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Delay before reconnection attempt `attempt` (1-based), jitter
    /// included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..jitter_ms))
    }

    /// Whether another attempt is allowed after `failures` consecutive
    /// failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures <= max)
    }

    fn validated(mut self) -> Self {
        if self.max_delay < self.initial_delay {
            warn!(
                initial_ms = self.initial_delay.as_millis() as u64,
                max_ms = self.max_delay.as_millis() as u64,
                "max_delay below initial_delay, raising it"
            );
            self.max_delay = self.initial_delay;
        }
        if self.max_attempts == Some(0) {
            warn!("max_attempts of 0 would never reconnect, using 1");
            self.max_attempts = Some(1);
        }
        self
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`Client`](crate::Client).
///
/// ```rust
/// use std::time::Duration;
/// use amplifier::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_backend_url("ws://10.0.0.2:9090/ws")
///     .with_connect_timeout(Duration::from_secs(2));
/// assert_eq!(config.backend_url, "ws://10.0.0.2:9090/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend_url: String,
    /// How long a single connection attempt may take.
    pub connect_timeout: Duration,
    /// Capacity of the notification channel. Notifications beyond it are
    /// dropped until the consumer catches up.
    pub notification_capacity: usize,
    /// Maximum entries kept in the activity record.
    pub activity_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout: Duration::from_secs(5),
            notification_capacity: 256,
            activity_capacity: 200,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Minimum notification channel capacity.
    pub const MIN_NOTIFICATION_CAPACITY: usize = 8;

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = url.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity;
        self
    }

    pub fn with_activity_capacity(mut self, capacity: usize) -> Self {
        self.activity_capacity = capacity;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Clamps out-of-range values, logging each adjustment.
    pub fn validated(mut self) -> Self {
        if self.backend_url.trim().is_empty() {
            warn!(default = DEFAULT_BACKEND_URL, "empty backend_url, using default");
            self.backend_url = DEFAULT_BACKEND_URL.to_string();
        }
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout of zero, using 5s");
            self.connect_timeout = Duration::from_secs(5);
        }
        if self.notification_capacity < Self::MIN_NOTIFICATION_CAPACITY {
            warn!(
                capacity = self.notification_capacity,
                min = Self::MIN_NOTIFICATION_CAPACITY,
                "notification_capacity too small — clamping"
            );
            self.notification_capacity = Self::MIN_NOTIFICATION_CAPACITY;
        }
        if self.activity_capacity == 0 {
            warn!("activity_capacity of 0, keeping 1 entry");
            self.activity_capacity = 1;
        }
        self.reconnect = self.reconnect.validated();
        self
    }

    pub(crate) fn session_config(&self) -> SessionConfig {
        SessionConfig {
            activity_capacity: self.activity_capacity,
            ..SessionConfig::default()
        }
    }
}

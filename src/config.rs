//! Session configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::log::{LogSink, TracingSink};

/// Server address used when none is configured.
pub const DEFAULT_URL: &str = "ws://localhost/mopidy/ws";

/// Path of the WebSocket endpoint on a Mopidy server.
pub const WEBSOCKET_PATH: &str = "/mopidy/ws";

/// Default delay before the first reconnection attempt.
pub const DEFAULT_BACKOFF_DELAY_MIN: Duration = Duration::from_millis(1000);

/// Default upper bound on the reconnection delay.
pub const DEFAULT_BACKOFF_DELAY_MAX: Duration = Duration::from_millis(64000);

/// Default timeout for the graceful shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`MopidyClient`](crate::client::MopidyClient).
///
/// # Example
///
/// ```
/// use mopidy_client::config::MopidyConfig;
/// use std::time::Duration;
///
/// let config = MopidyConfig::new("ws://music.local:6680/mopidy/ws")
///     .with_auto_connect(false)
///     .with_backoff_delay_max(Duration::from_secs(30));
/// assert_eq!(config.url, "ws://music.local:6680/mopidy/ws");
/// assert!(!config.auto_connect);
/// ```
#[derive(Debug, Clone)]
pub struct MopidyConfig {
    /// WebSocket URL of the server.
    ///
    /// Defaults to **`ws://localhost/mopidy/ws`**.
    pub url: String,
    /// Connect as soon as the client is constructed.
    ///
    /// Defaults to **true**.
    pub auto_connect: bool,
    /// Delay before the first reconnection attempt after a close. The delay
    /// doubles after every attempt and resets to this value once a
    /// connection opens.
    ///
    /// Defaults to **1000 ms**. Zero falls back to the default.
    pub backoff_delay_min: Duration,
    /// Upper bound on the reconnection delay.
    ///
    /// Defaults to **64000 ms**. Zero falls back to the default; values
    /// below `backoff_delay_min` are raised to it.
    pub backoff_delay_max: Duration,
    /// Destination for protocol diagnostics. `None` uses [`TracingSink`].
    pub log_sink: Option<Arc<dyn LogSink>>,
    /// Timeout for [`MopidyClient::shutdown`](crate::client::MopidyClient::shutdown).
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for MopidyConfig {
    fn default() -> Self {
        Self::new(DEFAULT_URL)
    }
}

impl MopidyConfig {
    /// Create a configuration for the given URL with default values.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_connect: true,
            backoff_delay_min: DEFAULT_BACKOFF_DELAY_MIN,
            backoff_delay_max: DEFAULT_BACKOFF_DELAY_MAX,
            log_sink: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Create a configuration for the Mopidy endpoint on `host`
    /// (`host` or `host:port`), using `wss://` when `secure` is set.
    ///
    /// ```
    /// use mopidy_client::config::MopidyConfig;
    ///
    /// let config = MopidyConfig::for_host("music.local:6680", false);
    /// assert_eq!(config.url, "ws://music.local:6680/mopidy/ws");
    /// ```
    pub fn for_host(host: &str, secure: bool) -> Self {
        let scheme = if secure { "wss" } else { "ws" };
        Self::new(format!("{scheme}://{host}{WEBSOCKET_PATH}"))
    }

    /// Enable or disable connecting on construction.
    #[must_use]
    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn with_backoff_delay_min(mut self, delay: Duration) -> Self {
        self.backoff_delay_min = delay;
        self
    }

    /// Set the maximum reconnection delay.
    #[must_use]
    pub fn with_backoff_delay_max(mut self, delay: Duration) -> Self {
        self.backoff_delay_max = delay;
        self
    }

    /// Route diagnostics to `sink`.
    #[must_use]
    pub fn with_log_sink(mut self, sink: impl LogSink) -> Self {
        self.log_sink = Some(Arc::new(sink));
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The `(min, max)` backoff bounds after applying defaults and clamping.
    pub fn backoff_bounds(&self) -> (Duration, Duration) {
        let min = if self.backoff_delay_min.is_zero() {
            DEFAULT_BACKOFF_DELAY_MIN
        } else {
            self.backoff_delay_min
        };
        let max = if self.backoff_delay_max.is_zero() {
            DEFAULT_BACKOFF_DELAY_MAX
        } else {
            self.backoff_delay_max
        };
        (min, max.max(min))
    }

    pub(crate) fn sink(&self) -> Arc<dyn LogSink> {
        self.log_sink
            .clone()
            .unwrap_or_else(|| Arc::new(TracingSink))
    }
}

//! User-facing log sink.
//!
//! The session reports protocol anomalies (unparseable frames, unexpected
//! responses, server errors, transport errors) through a [`LogSink`]. The
//! default [`TracingSink`] forwards them to `tracing`; supply your own sink
//! through [`MopidyConfig::with_log_sink`](crate::config::MopidyConfig::with_log_sink)
//! to route them elsewhere.

use std::fmt;

/// Destination for session diagnostics.
pub trait LogSink: Send + Sync + 'static {
    /// Informational message.
    fn log(&self, message: &str);
    /// Something unexpected that the session recovered from.
    fn warn(&self, message: &str);
    /// An error.
    fn error(&self, message: &str);
}

/// Forwards to the `tracing` macros under the `mopidy_client` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, message: &str) {
        tracing::info!(target: "mopidy_client", "{message}");
    }

    fn warn(&self, message: &str) {
        tracing::warn!(target: "mopidy_client", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "mopidy_client", "{message}");
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSink;

impl LogSink for SilentSink {
    fn log(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

impl fmt::Debug for dyn LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogSink")
    }
}

//! Error tracking.
//!
//! Command failures are reported here instead of being shown to users.
//! The tracing reporter emits an ERROR event tagged with the `error_report`
//! target, which [`crate::slack_log::SlackLogLayer`] forwards when an
//! error webhook is configured.

use tracing::error;

pub trait ErrorReporter: Send + Sync {
    fn report(&self, command: &str, error: &dyn std::error::Error);
}

/// Reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, command: &str, err: &dyn std::error::Error) {
        error!(target: "error_report", command, "{err}");
    }
}

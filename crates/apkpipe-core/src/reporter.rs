//! Reporter trait for dependency injection
//!
//! Stages report progress through this trait so that the pipeline is not
//! coupled to a particular terminal presentation.

use tracing::{info, warn};

/// Progress sink for a build.
pub trait Reporter: Send + Sync {
    /// A stage started running.
    fn stage_started(&self, stage: &str);

    /// A stage finished successfully.
    fn stage_finished(&self, stage: &str, elapsed_secs: f64);

    /// A stage was skipped for `reason`.
    fn stage_skipped(&self, stage: &str, reason: &str);

    /// A stage failed.
    fn stage_failed(&self, stage: &str, error: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn stage_started(&self, stage: &str) {
        (**self).stage_started(stage);
    }
    fn stage_finished(&self, stage: &str, elapsed_secs: f64) {
        (**self).stage_finished(stage, elapsed_secs);
    }
    fn stage_skipped(&self, stage: &str, reason: &str) {
        (**self).stage_skipped(stage, reason);
    }
    fn stage_failed(&self, stage: &str, error: &str) {
        (**self).stage_failed(stage, error);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn stage_started(&self, _stage: &str) {}
    fn stage_finished(&self, _stage: &str, _elapsed_secs: f64) {}
    fn stage_skipped(&self, _stage: &str, _reason: &str) {}
    fn stage_failed(&self, _stage: &str, _error: &str) {}
    fn info(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
}

/// Forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn stage_started(&self, stage: &str) {
        info!(stage, "started");
    }

    fn stage_finished(&self, stage: &str, elapsed_secs: f64) {
        info!(stage, "finished in {elapsed_secs:.2}s");
    }

    fn stage_skipped(&self, stage: &str, reason: &str) {
        info!(stage, "skipped: {reason}");
    }

    fn stage_failed(&self, stage: &str, error: &str) {
        tracing::error!(stage, "failed: {error}");
    }

    fn info(&self, msg: &str) {
        info!("{msg}");
    }

    fn warning(&self, msg: &str) {
        warn!("{msg}");
    }
}

//! Progress reporting for point loading.
//!
//! The loader reports committed points through [`ProgressCallback`]
//! without knowing how they are rendered (an `indicatif` bar in the CLI,
//! nothing at all in tests).

use std::sync::Arc;

/// Receives load progress.
///
/// Implementations must be `Send + Sync` because load sessions run on
/// spawned tokio tasks.
pub trait ProgressCallback: Send + Sync {
    /// Upper bound of the work (the point ceiling).
    fn set_total(&self, total: u64);

    /// Absolute position, used when a session resumes part-way.
    fn set_position(&self, pos: u64);

    /// Advance by `delta` committed points.
    fn inc(&self, delta: u64);

    /// Mark the current load finished.
    fn finish(&self, msg: String);
}

/// Ignores all progress updates.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

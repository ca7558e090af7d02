#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filter-aware, generation-checked point loading.
//!
//! [`LoadCoordinator`] owns the in-memory [`PointCollection`], the offset
//! cursor into the paginated source and two monotonic counters:
//!
//! * the **load generation**, bumped whenever the point collection is
//!   reset (cold start, or a filter change that alters the server-side
//!   narrowing);
//! * the **stats generation**, bumped on every statistics refresh.
//!
//! Every asynchronous step captures the generation it was started under
//! and re-checks it before committing, so results of superseded work are
//! silently dropped.
//!
//! [`PointCollection`]: signal_map_signal_models::PointCollection

mod coordinator;
mod session;

#[cfg(test)]
mod test_support;

use std::time::Duration;

use serde::Deserialize;

pub use coordinator::{FilterChange, LoadCoordinator, RefreshRoute};

/// Paging and timing settings for [`LoadCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Rows requested per page on the unconstrained path.
    pub chunk_size: usize,
    /// Maximum number of points held for one generation.
    pub ceiling: usize,
    /// Delay between consecutive pages of one session.
    pub pacing_delay_ms: u64,
    /// Delay before retrying a failed page at the same offset.
    pub retry_backoff_ms: u64,
    /// Auto-refresh period; `0` disables the poller.
    pub poll_interval_secs: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25_000,
            ceiling: 500_000,
            pacing_delay_ms: 50,
            retry_backoff_ms: 3000,
            poll_interval_secs: 10,
        }
    }
}

impl LoaderConfig {
    #[must_use]
    pub const fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    #[must_use]
    pub const fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// `None` when polling is disabled.
    #[must_use]
    pub const fn poll_interval(&self) -> Option<Duration> {
        if self.poll_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.poll_interval_secs))
        }
    }
}

/// Where the coordinator is in its load cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing has been loaded yet.
    #[default]
    Idle,
    /// A session was started and has not issued its first request, or a
    /// narrowed single-request load is in flight.
    Loading,
    /// The unconstrained path is paging through the source.
    Streaming,
    /// The last session finished normally.
    Complete,
    /// The last session hit a non-retryable error.
    Failed,
}

impl LoadPhase {
    #[must_use]
    pub const fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::Streaming)
    }
}

/// How one load session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Source exhausted or ceiling reached.
    Complete,
    /// A newer generation took over; nothing was committed after that.
    Superseded,
    /// A non-retryable fetch error ended the session.
    Failed,
}

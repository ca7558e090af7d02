#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Client for the signal analytics backend.
//!
//! Three request/response contracts are exposed as traits so the loader
//! can be driven by test doubles:
//!
//! * [`PaginatedFetcher`]: one offset/limit window of raw points.
//! * [`AggregateStatsClient`]: the summary statistics snapshot.
//! * [`FilterOptionsClient`]: selectable filter values.
//!
//! [`api::SignalApi`] implements all three over `reqwest`.

pub mod api;
pub mod progress;
pub mod retry;

use async_trait::async_trait;
use signal_map_signal_models::{
    AggregateStats, FilterOptions, FilterSet, NarrowingQuery, Point, TimeSeries,
    TimeSeriesInterval,
};

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status code.
    #[error("HTTP {status} from {url}")]
    Status {
        /// Numeric HTTP status.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// The server answered `success: false`.
    #[error("API reported failure: {message}")]
    Api {
        /// Server-provided detail, if any.
        message: String,
    },
}

impl SourceError {
    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Connection failures, timeouts, truncated bodies, HTTP 429, HTTP 5xx,
    /// undecodable bodies and `success: false` answers are transient. Other
    /// 4xx statuses and malformed requests are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                !e.is_builder()
                    && (e.is_timeout()
                        || e.is_connect()
                        || e.is_body()
                        || e.is_decode()
                        || e.is_request())
            }
            Self::Json(_) | Self::Api { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// One page of the paginated point stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Points that passed normalisation, in server order.
    pub items: Vec<Point>,
    /// Number of rows the server returned, including rows dropped during
    /// normalisation. Cursors advance by this count.
    pub returned: usize,
}

/// Fetches one offset/limit window of points.
///
/// Implementations perform exactly one request and have no other side
/// effects. The server may return fewer rows than `limit`; callers must
/// advance by [`Page::returned`].
#[async_trait]
pub trait PaginatedFetcher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, status, or decode failure, or
    /// when the server reports `success: false`.
    async fn fetch_page(
        &self,
        query: &NarrowingQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page, SourceError>;
}

/// Fetches the aggregate statistics snapshot for a filter selection.
#[async_trait]
pub trait AggregateStatsClient: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails after its retries.
    async fn fetch_aggregates(&self, filters: &FilterSet) -> Result<AggregateStats, SourceError>;
}

/// Fetches measurement counts bucketed over time.
#[async_trait]
pub trait TimeSeriesClient: Send + Sync {
    /// `province` narrows the series to one province.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails after its retries.
    async fn fetch_time_series(
        &self,
        interval: TimeSeriesInterval,
        province: Option<&str>,
    ) -> Result<TimeSeries, SourceError>;
}

/// Fetches the selectable filter values.
#[async_trait]
pub trait FilterOptionsClient: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails after its retries.
    async fn fetch_filter_options(&self) -> Result<FilterOptions, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> SourceError {
        SourceError::Status {
            status,
            url: "http://localhost/api/signals".to_owned(),
        }
    }

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        assert!(!status(400).is_transient());
        assert!(!status(404).is_transient());
    }

    #[test]
    fn api_failures_and_bad_bodies_are_transient() {
        assert!(
            SourceError::Api {
                message: "busy".to_owned()
            }
            .is_transient()
        );
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(SourceError::from(json_err).is_transient());
    }
}

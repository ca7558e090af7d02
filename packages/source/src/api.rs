//! `reqwest`-backed client for the signal analytics REST API.
//!
//! Endpoints (relative to [`SignalApiConfig::base_url`]):
//!
//! * `GET /signals?offset&limit[&provincia][&municipio]` → `{success, data}`
//! * `POST /analytics/aggregate` with the active filters → `{success, ...stats}`
//! * `GET /analytics/timeseries?interval[&provincia]` → `{success, interval, data}`
//! * `GET /filters/options` → `{success, provincias, municipios, empresas, tipos_senal}`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use signal_map_signal_models::{
    AggregateStats, FilterOptions, FilterSet, NarrowingQuery, SignalRecord, TimeSeries,
    TimeSeriesInterval,
};

use crate::retry::{send_json, send_json_with_retry};
use crate::{
    AggregateStatsClient, FilterOptionsClient, Page, PaginatedFetcher, SourceError,
    TimeSeriesClient,
};

/// Connection settings for [`SignalApi`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SignalApiConfig {
    /// API root, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Retries for statistics and filter-option requests. Page fetches are
    /// never retried here.
    pub max_retries: u32,
}

impl Default for SignalApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_owned(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

const fn default_success() -> bool {
    true
}

/// `GET /signals` response body.
#[derive(Debug, Deserialize)]
struct SignalsEnvelope {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    data: Vec<serde_json::Value>,
    #[serde(default, alias = "detail")]
    message: Option<String>,
}

/// Response body of endpoints that flatten their payload next to `success`.
#[derive(Debug, Deserialize)]
struct FlatEnvelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default, alias = "detail")]
    message: Option<String>,
    #[serde(flatten)]
    payload: T,
}

impl<T> FlatEnvelope<T> {
    fn into_result(self) -> Result<T, SourceError> {
        if self.success {
            Ok(self.payload)
        } else {
            Err(SourceError::Api {
                message: self.message.unwrap_or_default(),
            })
        }
    }
}

/// Converts a `/signals` body into a [`Page`].
///
/// Rows that fail to decode or lack a position are skipped but still
/// counted in [`Page::returned`].
fn parse_signals_page(envelope: SignalsEnvelope) -> Result<Page, SourceError> {
    if !envelope.success {
        return Err(SourceError::Api {
            message: envelope.message.unwrap_or_default(),
        });
    }

    let returned = envelope.data.len();
    let items: Vec<_> = envelope
        .data
        .into_iter()
        .filter_map(|row| serde_json::from_value::<SignalRecord>(row).ok())
        .filter_map(SignalRecord::into_point)
        .collect();

    if items.len() < returned {
        log::debug!(
            "Skipped {} of {returned} rows without a usable position",
            returned - items.len()
        );
    }

    Ok(Page { items, returned })
}

/// HTTP client for the analytics backend.
#[derive(Debug, Clone)]
pub struct SignalApi {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl SignalApi {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying client cannot be
    /// constructed.
    pub fn new(config: &SignalApiConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            max_retries: config.max_retries,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl PaginatedFetcher for SignalApi {
    async fn fetch_page(
        &self,
        query: &NarrowingQuery,
        offset: usize,
        limit: usize,
    ) -> Result<Page, SourceError> {
        let mut params = query.query_pairs();
        params.push(("offset", offset.to_string()));
        params.push(("limit", limit.to_string()));

        let request = self.client.get(self.url("/signals")).query(&params);
        let envelope: SignalsEnvelope = send_json(request).await?;
        parse_signals_page(envelope)
    }
}

#[async_trait]
impl AggregateStatsClient for SignalApi {
    async fn fetch_aggregates(&self, filters: &FilterSet) -> Result<AggregateStats, SourceError> {
        let url = self.url("/analytics/aggregate");
        let body = filters.to_request_body();
        let envelope: FlatEnvelope<AggregateStats> = send_json_with_retry(
            || self.client.post(&url).json(&body),
            self.max_retries,
        )
        .await?;
        envelope.into_result()
    }
}

fn time_series_params(
    interval: TimeSeriesInterval,
    province: Option<&str>,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("interval", interval.to_string())];
    if let Some(province) = province.filter(|p| !p.trim().is_empty()) {
        params.push(("provincia", province.to_owned()));
    }
    params
}

#[async_trait]
impl TimeSeriesClient for SignalApi {
    async fn fetch_time_series(
        &self,
        interval: TimeSeriesInterval,
        province: Option<&str>,
    ) -> Result<TimeSeries, SourceError> {
        let url = self.url("/analytics/timeseries");
        let params = time_series_params(interval, province);
        let envelope: FlatEnvelope<TimeSeries> = send_json_with_retry(
            || self.client.get(&url).query(&params),
            self.max_retries,
        )
        .await?;
        envelope.into_result()
    }
}

#[async_trait]
impl FilterOptionsClient for SignalApi {
    async fn fetch_filter_options(&self) -> Result<FilterOptions, SourceError> {
        let url = self.url("/filters/options");
        let envelope: FlatEnvelope<FilterOptions> =
            send_json_with_retry(|| self.client.get(&url), self.max_retries).await?;
        envelope.into_result()
    }
}

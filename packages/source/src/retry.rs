//! HTTP send helpers.
//!
//! [`send_json`] performs a single request and maps every failure onto a
//! [`SourceError`] whose [`SourceError::is_transient`] tells the caller
//! whether trying again makes sense. [`send_json_with_retry`] wraps it in a
//! bounded exponential backoff for one-shot calls such as statistics and
//! filter options.
//!
//! The paginated point stream deliberately uses [`send_json`] only: its
//! caller owns retry and keeps retrying the same offset for as long as the
//! load generation is alive.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::SourceError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 500;

/// Sends a request and decodes the response body as JSON.
///
/// Non-2xx statuses become [`SourceError::Status`]. The body is read as
/// text first so a decode failure can log what was actually received.
///
/// # Errors
///
/// Returns [`SourceError`] if the request fails, the status is not a
/// success, or the body cannot be decoded into `T`.
pub async fn send_json<T>(request: reqwest::RequestBuilder) -> Result<T, SourceError>
where
    T: DeserializeOwned,
{
    let response = request.send().await?;

    let url = response.url().to_string();
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url,
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|json_err| {
        log::warn!(
            "JSON parse failed\n  \
             url: {url}\n  \
             status: {status}\n  \
             content-type: {content_type:?}\n  \
             received: {} bytes\n  \
             parse error: {json_err}\n  \
             body preview: {}",
            text.len(),
            preview(&text),
        );
        SourceError::Json(json_err)
    })
}

/// Like [`send_json`], retrying transient failures up to `max_retries`
/// times with exponential backoff (2s, 4s, 8s, ...).
///
/// The `build_request` closure is called on each attempt because
/// [`reqwest::RequestBuilder`] is consumed by `send()`.
///
/// # Errors
///
/// Returns the last [`SourceError`] once retries are exhausted, or the
/// first permanent one.
pub async fn send_json_with_retry<T, F>(build_request: F, max_retries: u32) -> Result<T, SourceError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder + Send + Sync,
{
    let mut attempt = 0;
    loop {
        match send_json(build_request()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = backoff_delay(attempt);
                log::warn!("  transient error: {e}");
                log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

/// Truncates `text` to at most [`BODY_PREVIEW_LEN`] bytes on a char
/// boundary.
fn preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_owned();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(30), Duration::from_secs(64));
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "ñ".repeat(400);
        let out = preview(&body);
        assert!(out.ends_with("..."));
        assert!(out.len() <= BODY_PREVIEW_LEN + 3);
        assert_eq!(preview("short"), "short");
    }
}

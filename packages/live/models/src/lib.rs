#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Push-channel wire messages.
//!
//! Server → client messages are JSON objects tagged by `type`; client →
//! server messages are tagged by `action`. The transport is a WebSocket,
//! but nothing here depends on it.

use serde::{Deserialize, Serialize};
use signal_map_signal_models::{FilterSet, SignalRecord};

/// A message received from the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Server acknowledges the session.
    Connected,
    /// Server announces it is closing the session.
    Disconnected,
    /// Snapshot sent right after connecting. The paginated stream is
    /// authoritative, so clients only note its size.
    Initial {
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Bulk update hint: new data is available upstream.
    Update {
        #[serde(default)]
        data: serde_json::Value,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// A single new measurement.
    NewSignal { data: SignalRecord },
    /// Heartbeat. Must be answered with [`ClientMessage::Pong`].
    Ping {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// Server-side error report (e.g. it could not parse our message).
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Any `type` this client does not know.
    #[serde(other)]
    Unknown,
}

/// A message sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat reply.
    Pong,
    /// Ask the server to push fresh data for `filters`.
    Refresh { filters: serde_json::Value },
}

impl ClientMessage {
    /// Builds a refresh request carrying the active server-side filters.
    #[must_use]
    pub fn refresh(filters: &FilterSet) -> Self {
        Self::Refresh {
            filters: filters.to_request_body(),
        }
    }
}

/// Number of items in an `update` / `initial` payload, when it is a list.
#[must_use]
pub fn payload_len(data: &serde_json::Value) -> Option<usize> {
    data.as_array().map(Vec::len)
}

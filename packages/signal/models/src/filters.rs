//! Dashboard filter selection and the filter options endpoint payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A filter category selectable in the dashboard sidebar.
///
/// Serialized names match the backend's request keys.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum FilterCategory {
    #[serde(rename = "provincias")]
    #[strum(serialize = "provincias")]
    Province,
    #[serde(rename = "municipios")]
    #[strum(serialize = "municipios")]
    Municipality,
    #[serde(rename = "empresas")]
    #[strum(serialize = "empresas")]
    Company,
    #[serde(rename = "tipos_senal")]
    #[strum(serialize = "tipos_senal")]
    SignalType,
    #[serde(rename = "operadoras")]
    #[strum(serialize = "operadoras")]
    Operator,
    /// Map overlay selection. Purely client-side, never sent to the server.
    #[serde(rename = "capas")]
    #[strum(serialize = "capas")]
    OverlayLayer,
}

impl FilterCategory {
    /// Whether the backend understands this category.
    #[must_use]
    pub const fn is_server_side(self) -> bool {
        !matches!(self, Self::OverlayLayer)
    }
}

/// The server-side narrowing a filter selection implies for the point
/// query.
///
/// When either field is set the backend can return the whole bounded
/// result set in a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NarrowingQuery {
    pub province: Option<String>,
    pub municipality: Option<String>,
}

impl NarrowingQuery {
    #[must_use]
    pub const fn is_unconstrained(&self) -> bool {
        self.province.is_none() && self.municipality.is_none()
    }

    /// Query-string pairs for `GET /signals`.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(province) = &self.province {
            pairs.push(("provincia", province.clone()));
        }
        if let Some(municipality) = &self.municipality {
            pairs.push(("municipio", municipality.clone()));
        }
        pairs
    }
}

/// Mapping from filter category to selected values.
///
/// An empty selection means no constraint for that category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    selections: BTreeMap<FilterCategory, Vec<String>>,
}

impl FilterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`FilterSet::set`].
    #[must_use]
    pub fn with<I, S>(mut self, category: FilterCategory, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(category, values);
        self
    }

    /// Replaces the selection for `category`. Blank values are ignored.
    pub fn set<I, S>(&mut self, category: FilterCategory, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values
            .into_iter()
            .map(Into::into)
            .filter(|v| !v.trim().is_empty())
            .collect();
        if values.is_empty() {
            self.selections.remove(&category);
        } else {
            self.selections.insert(category, values);
        }
    }

    pub fn clear(&mut self, category: FilterCategory) {
        self.selections.remove(&category);
    }

    /// Selected values for `category` (empty if unconstrained).
    #[must_use]
    pub fn selected(&self, category: FilterCategory) -> &[String] {
        self.selections
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    /// Iterates over categories with a non-empty selection.
    pub fn active(&self) -> impl Iterator<Item = (FilterCategory, &[String])> {
        self.selections.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// The narrowing projection: first selected province and municipality.
    #[must_use]
    pub fn narrowing(&self) -> NarrowingQuery {
        NarrowingQuery {
            province: self.selected(FilterCategory::Province).first().cloned(),
            municipality: self
                .selected(FilterCategory::Municipality)
                .first()
                .cloned(),
        }
    }

    /// JSON body for `POST /analytics/aggregate` and push-channel refresh
    /// requests: active server-side categories only.
    #[must_use]
    pub fn to_request_body(&self) -> serde_json::Value {
        let body: serde_json::Map<String, serde_json::Value> = self
            .active()
            .filter(|(category, _)| category.is_server_side())
            .map(|(category, values)| {
                (
                    category.as_ref().to_owned(),
                    serde_json::Value::from(values.to_vec()),
                )
            })
            .collect();
        serde_json::Value::Object(body)
    }
}

/// Payload of `GET /filters/options`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub provincias: Vec<String>,
    pub municipios: Vec<String>,
    pub empresas: Vec<String>,
    pub tipos_senal: Vec<String>,
}

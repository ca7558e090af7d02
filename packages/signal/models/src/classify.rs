//! Operator and network-type classification.
//!
//! Raw device strings are free text (`"Tigo Bolivia"`, `"entel 4G"`,
//! `"WIFI"`). Classification maps them onto the small set of values the
//! district breakdowns report, and makes unmatched values an explicit
//! [`Classified::Unknown`] case.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Result of classifying a raw string against a known set of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classified<T> {
    /// The raw value matched a known variant.
    Known(T),
    /// The raw value matched nothing.
    Unknown,
}

impl<T> Classified<T> {
    /// Returns the known value, if any.
    #[must_use]
    pub fn known(self) -> Option<T> {
        match self {
            Self::Known(v) => Some(v),
            Self::Unknown => None,
        }
    }
}

/// Mobile operators broken out in district statistics.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Entel,
    Tigo,
    Viva,
}

impl Operator {
    pub const ALL: &[Self] = &[Self::Entel, Self::Tigo, Self::Viva];

    const fn keyword(self) -> &'static str {
        match self {
            Self::Entel => "entel",
            Self::Tigo => "tigo",
            Self::Viva => "viva",
        }
    }

    /// Case-insensitive substring match; the first operator whose name
    /// appears in `raw` wins.
    #[must_use]
    pub fn classify(raw: &str) -> Classified<Self> {
        let lower = raw.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|op| lower.contains(op.keyword()))
            .map_or(Classified::Unknown, Classified::Known)
    }
}

/// Network types broken out in district statistics.
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
pub enum NetworkType {
    #[serde(rename = "WiFi")]
    #[strum(serialize = "WiFi")]
    Wifi,
    #[serde(rename = "4G")]
    #[strum(serialize = "4G")]
    FourG,
    #[serde(rename = "3G")]
    #[strum(serialize = "3G")]
    ThreeG,
}

impl NetworkType {
    pub const ALL: &[Self] = &[Self::Wifi, Self::FourG, Self::ThreeG];

    const fn keyword(self) -> &'static str {
        match self {
            Self::Wifi => "wifi",
            Self::FourG => "4g",
            Self::ThreeG => "3g",
        }
    }

    /// Case-insensitive substring match, checked in [`NetworkType::ALL`]
    /// order.
    #[must_use]
    pub fn classify(raw: &str) -> Classified<Self> {
        let lower = raw.to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|ty| lower.contains(ty.keyword()))
            .map_or(Classified::Unknown, Classified::Known)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_matching_is_case_insensitive_substring() {
        assert_eq!(Operator::classify("TIGO"), Classified::Known(Operator::Tigo));
        assert_eq!(
            Operator::classify("Entel S.A."),
            Classified::Known(Operator::Entel)
        );
        assert_eq!(
            Operator::classify("nuevatel viva"),
            Classified::Known(Operator::Viva)
        );
    }

    #[test]
    fn unmatched_operator_is_unknown() {
        assert_eq!(Operator::classify("Claro"), Classified::Unknown);
        assert_eq!(Operator::classify(""), Classified::Unknown);
        assert_eq!(Operator::classify("Unknown").known(), None);
    }

    #[test]
    fn network_type_matching() {
        assert_eq!(
            NetworkType::classify("WIFI"),
            Classified::Known(NetworkType::Wifi)
        );
        assert_eq!(
            NetworkType::classify("4G LTE"),
            Classified::Known(NetworkType::FourG)
        );
        assert_eq!(
            NetworkType::classify("3g"),
            Classified::Known(NetworkType::ThreeG)
        );
        assert_eq!(NetworkType::classify("5G"), Classified::Unknown);
    }

    #[test]
    fn display_names_match_wire_names() {
        assert_eq!(Operator::Entel.to_string(), "ENTEL");
        assert_eq!(NetworkType::Wifi.to_string(), "WiFi");
        assert_eq!(
            serde_json::to_string(&NetworkType::FourG).unwrap(),
            "\"4G\""
        );
    }
}

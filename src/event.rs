//! The event data model.
//!
//! Events arrive as JSON (one object per event) and are deserialized into
//! these types. Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

/// An indexed business object: something that happens, possibly several
/// times (see [`Show`]).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    /// Stable key shared by every indexed record of this event.
    pub identity: u64,
    pub created: i64,
    pub modified: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location: Option<Location>,
    pub shows: Vec<Show>,
}

/// One scheduled instance of an event.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Show {
    #[serde(default)]
    pub status: ShowStatus,
    pub start: i64,
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    #[default]
    Scheduled,
    Cancelled,
    Postponed,
    Rescheduled,
}

impl ShowStatus {
    /// The value stored in the show status field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
            Self::Postponed => "postponed",
            Self::Rescheduled => "rescheduled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Location {
    pub name: Option<String>,
    pub postal_address: Option<PostalAddress>,
    pub geo: Option<GeoPosition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostalAddress {
    pub name: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub address_locality: Option<String>,
    pub address_country: Option<String>,
}

/// Where an event takes place.
///
/// Only point coordinates are indexed today. Other shapes deserialize into
/// [`GeoPosition::Unsupported`] and are skipped when indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GeoPosition {
    Coordinates { latitude: f64, longitude: f64 },
    #[serde(other)]
    Unsupported,
}

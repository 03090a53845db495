//! Projection of events into indexed records.
//!
//! An event with N shows becomes N records, one per show; an event without
//! shows becomes a single record without show fields. All records of an
//! event share its identity and carry the same verbatim payload.

use tracing::warn;

use crate::event::{Event, GeoPosition, Show, ShowStatus};

/// The field values of one indexed record. Absent values are not indexed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IndexedRecord {
    pub identity: u64,
    /// Serialized event, returned with search results but never parsed.
    pub payload: String,
    pub created: i64,
    pub modified: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub location_name: Option<String>,
    pub address_name: Option<String>,
    pub street_address: Option<String>,
    pub postal_code: Option<String>,
    pub address_locality: Option<String>,
    pub address_country: Option<String>,
    /// (latitude, longitude)
    pub coordinates: Option<(f64, f64)>,
    /// Values of the combined n-gram field: name, description and each tag
    /// as separate values.
    pub combined_text: Vec<String>,
    pub show: Option<ShowRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShowRecord {
    pub status: ShowStatus,
    pub start: i64,
    pub end: Option<i64>,
}

impl From<&Show> for ShowRecord {
    fn from(show: &Show) -> Self {
        Self {
            status: show.status,
            start: show.start,
            end: show.end,
        }
    }
}

/// Project an event into one record per show (or a single record).
pub fn project(event: &Event, payload: &str) -> Vec<IndexedRecord> {
    let base = event_record(event, payload);

    if event.shows.is_empty() {
        return vec![base];
    }

    event
        .shows
        .iter()
        .map(|show| IndexedRecord {
            show: Some(show.into()),
            ..base.clone()
        })
        .collect()
}

fn event_record(event: &Event, payload: &str) -> IndexedRecord {
    let mut record = IndexedRecord {
        identity: event.identity,
        payload: payload.to_string(),
        created: event.created,
        modified: event.modified,
        name: event.name.clone(),
        description: event.description.clone(),
        tags: event.tags.clone(),
        ..IndexedRecord::default()
    };

    if let Some(location) = &event.location {
        record.location_name = location.name.clone();

        if let Some(address) = &location.postal_address {
            record.address_name = address.name.clone();
            record.street_address = address.street_address.clone();
            record.postal_code = address.postal_code.clone();
            record.address_locality = address.address_locality.clone();
            record.address_country = address.address_country.clone();
        }

        match &location.geo {
            Some(GeoPosition::Coordinates {
                latitude,
                longitude,
            }) => record.coordinates = Some((*latitude, *longitude)),
            Some(GeoPosition::Unsupported) => {
                warn!(
                    identity = event.identity,
                    "skipping unsupported geo position"
                );
            }
            None => {}
        }
    }

    record.combined_text = event
        .name
        .iter()
        .chain(&event.description)
        .chain(&event.tags)
        .cloned()
        .collect();

    record
}

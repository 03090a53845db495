//! Bounding-box predicates over stored latitude/longitude fields.
//!
//! Rectangles are plain numeric range conjunctions; there is no handling of
//! boxes that cross the antimeridian. Circles are approximated by their
//! enclosing rectangle on a spherical earth, so points near the box corners
//! can match even though they lie slightly outside the radius.

use std::ops::Bound;

use crate::{
    error::{Error, Result},
    query_tree::{NumericRange, QueryTree},
};

/// Mean earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    /// The rectangle enclosing a circle of `radius_km` around a center.
    ///
    /// The latitude delta is the radius as an arc angle; the longitude delta
    /// is scaled by the cosine of the center latitude. Near the poles the
    /// longitude span is widened to the whole globe.
    pub fn around(latitude: f64, longitude: f64, radius_km: f64) -> Self {
        let lat_delta = (radius_km / EARTH_RADIUS_KM).to_degrees();
        let cos_lat = latitude.to_radians().cos();
        let lon_delta = if cos_lat > f64::EPSILON {
            (lat_delta / cos_lat).min(180.0)
        } else {
            180.0
        };

        Self {
            south: (latitude - lat_delta).max(-90.0),
            west: (longitude - lon_delta).max(-180.0),
            north: (latitude + lat_delta).min(90.0),
            east: (longitude + lon_delta).min(180.0),
        }
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        (self.south..=self.north).contains(&latitude)
            && (self.west..=self.east).contains(&longitude)
    }
}

/// `latitude ∈ [south, north] ∧ longitude ∈ [west, east]`.
pub fn rectangle(
    latitude_field: &str,
    longitude_field: &str,
    bounds: BoundingBox,
) -> QueryTree {
    QueryTree::all_of(vec![
        QueryTree::Range {
            field: latitude_field.to_string(),
            range: NumericRange::F64 {
                lower: Bound::Included(bounds.south),
                upper: Bound::Included(bounds.north),
            },
        },
        QueryTree::Range {
            field: longitude_field.to_string(),
            range: NumericRange::F64 {
                lower: Bound::Included(bounds.west),
                upper: Bound::Included(bounds.east),
            },
        },
    ])
}

/// The enclosing-rectangle predicate for a circle.
///
/// A zero radius degenerates to a point-sized box. Negative or non-finite
/// radii are rejected.
pub fn circle(
    latitude_field: &str,
    longitude_field: &str,
    latitude: f64,
    longitude: f64,
    radius_km: f64,
) -> Result<QueryTree> {
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(Error::invalid_query(
            "coordinate circle envelope",
            format!("radius must be a non-negative number, got {radius_km}"),
        ));
    }
    let bounds = BoundingBox::around(latitude, longitude, radius_km);
    Ok(rectangle(latitude_field, longitude_field, bounds))
}

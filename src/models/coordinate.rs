// SPDX-License-Identifier: MIT

//! WGS84 coordinate value type.
//!
//! A `Coordinate` is always (longitude, latitude) in degrees, and serializes
//! as a GeoJSON-style `[lng, lat]` position. Construction validates ranges;
//! route coordinate lists are parsed through a single explicit function
//! instead of duck-typed fallbacks.

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A WGS84 point, degrees, (longitude, latitude).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lng: f64,
    pub lat: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting out-of-range values.
    pub fn new(lng: f64, lat: f64) -> Result<Self, AppError> {
        if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
            return Err(AppError::InvalidInput(format!(
                "coordinate out of range: [{}, {}]",
                lng, lat
            )));
        }
        Ok(Self { lng, lat })
    }

    /// (0, 0) is treated as "no position" by GPS providers and rejected at
    /// the circuit-generation boundary.
    pub fn is_null_island(&self) -> bool {
        self.lng == 0.0 && self.lat == 0.0
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(c: Coordinate) -> Self {
        geo::Point::new(c.lng, c.lat)
    }
}

impl From<geo::Coord<f64>> for Coordinate {
    fn from(c: geo::Coord<f64>) -> Self {
        Self { lng: c.x, lat: c.y }
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(2)?;
        tup.serialize_element(&self.lng)?;
        tup.serialize_element(&self.lat)?;
        tup.end()
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CoordVisitor;

        impl<'de> Visitor<'de> for CoordVisitor {
            type Value = Coordinate;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [lng, lat] position")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Coordinate, A::Error> {
                let lng: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let lat: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                Ok(Coordinate { lng, lat })
            }
        }

        deserializer.deserialize_seq(CoordVisitor)
    }
}

/// Parse an ordered coordinate list from a JSON value.
///
/// Accepts exactly one shape: an array of `[lng, lat]` arrays. Anything else
/// (a JSON-encoded string, an object wrapping a `coordinates` key, mixed
/// element types) is a hard error rather than a silently-tried branch.
pub fn coordinate_list_from_json(value: &serde_json::Value) -> Result<Vec<Coordinate>, AppError> {
    let positions = value
        .as_array()
        .ok_or_else(|| AppError::InvalidInput("coordinate list must be a JSON array".to_string()))?;

    positions
        .iter()
        .enumerate()
        .map(|(i, pos)| {
            let pair = pos.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                AppError::InvalidInput(format!("position {} is not a [lng, lat] pair", i))
            })?;
            let lng = pair[0].as_f64().ok_or_else(|| {
                AppError::InvalidInput(format!("position {} longitude is not a number", i))
            })?;
            let lat = pair[1].as_f64().ok_or_else(|| {
                AppError::InvalidInput(format!("position {} latitude is not a number", i))
            })?;
            Coordinate::new(lng, lat)
        })
        .collect()
}

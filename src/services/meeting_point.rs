// SPDX-License-Identifier: MIT

//! Meeting point resolution.
//!
//! The fair meeting point between two walkers: the great-circle midpoint of
//! their positions, replaced by a nearby dog-friendly place when one exists,
//! then snapped onto the nearest walkable path. Both the place search and
//! the snap are cosmetic refinements: either may fail without failing the
//! resolution, which always yields a coordinate.

use crate::error::AppError;
use crate::geo_math;
use crate::models::Coordinate;
use crate::services::mapbox::MapboxClient;

/// Search radius for a dog-friendly place around the midpoint.
const POI_SEARCH_RADIUS_METERS: u32 = 200;

/// Snap tolerance for map matching.
const SNAP_RADIUS_METERS: u32 = 50;

const POI_QUERY: &str = "dog park";

/// A resolved meeting point.
#[derive(Debug, Clone)]
pub struct MeetingPoint {
    pub coordinate: Coordinate,
    /// Name of the place chosen as meeting point, when the POI search hit.
    pub place_name: Option<String>,
}

/// Resolves a fair meeting point between two positions.
#[derive(Clone)]
pub struct MeetingPointResolver {
    mapbox: MapboxClient,
}

impl MeetingPointResolver {
    pub fn new(mapbox: MapboxClient) -> Self {
        Self { mapbox }
    }

    /// Resolve the meeting point for two positions. Infallible past input
    /// validation: upstream misses degrade to the raw midpoint.
    pub async fn resolve(
        &self,
        position_a: Coordinate,
        position_b: Coordinate,
    ) -> Result<MeetingPoint, AppError> {
        let midpoint = geo_math::spherical_midpoint(position_a, position_b);

        let poi = match self
            .mapbox
            .search_poi(POI_QUERY, midpoint, POI_SEARCH_RADIUS_METERS)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "POI search failed, using raw midpoint");
                None
            }
        };

        let (candidate, place_name) = match poi {
            Some(place) => (place.coordinate, Some(place.name)),
            None => (midpoint, None),
        };

        let coordinate = match self.mapbox.map_match(candidate, SNAP_RADIUS_METERS).await {
            Ok(Some(snapped)) => snapped,
            Ok(None) => candidate,
            Err(e) => {
                tracing::warn!(error = %e, "Map matching failed, using unsnapped point");
                candidate
            }
        };

        tracing::info!(
            lng = coordinate.lng,
            lat = coordinate.lat,
            place = place_name.as_deref().unwrap_or("midpoint"),
            "Meeting point resolved"
        );

        Ok(MeetingPoint {
            coordinate,
            place_name,
        })
    }
}

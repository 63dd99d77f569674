//! Geodesic helpers and the grid lattice generator
//!
//! Angles are degrees at the API boundary and radians inside. Distances are
//! kilometres on a sphere of radius [`EARTH_RADIUS_KM`].

use crate::{Error, Result};
use serde::Serialize;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One lattice node before positions are attached
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatticePoint {
    pub coord: Coordinate,
    pub row: u32,
    pub col: u32,
    /// `row * grid_size + col`
    pub index: usize,
}

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

/// Fixed 6-decimal rendering used in marker popups
pub fn format_coordinate(value: f64) -> String {
    format!("{:.6}", value)
}

/// Point reached by travelling `distance_km` from `origin` on the initial
/// bearing `bearing_deg` (0 = north, 90 = east)
pub fn destination(origin: Coordinate, distance_km: f64, bearing_deg: f64) -> Coordinate {
    if distance_km == 0.0 {
        return origin;
    }

    let lat = origin.lat.to_radians();
    let lng = origin.lng.to_radians();
    let bearing = bearing_deg.to_radians();
    let angular = distance_km / EARTH_RADIUS_KM;

    let new_lat = (lat.sin() * angular.cos() + lat.cos() * angular.sin() * bearing.cos()).asin();
    let new_lng = lng
        + (bearing.sin() * angular.sin() * lat.cos()).atan2(angular.cos() - lat.sin() * new_lat.sin());

    Coordinate::new(new_lat.to_degrees(), new_lng.to_degrees())
}

/// Great-circle distance (haversine)
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Distance between neighbouring lattice nodes
pub fn lattice_spacing_km(grid_size: u32, radius_km: f64) -> f64 {
    (radius_km * 2.0) / f64::from(grid_size - 1)
}

/// `grid_size²` points in row-major order, spanning `2 * radius_km` on each
/// axis, with the node at `(grid_size / 2, grid_size / 2)` on the center.
///
/// # Errors
///
/// A grid smaller than 2x2 has no spacing and is rejected as an internal error.
pub fn lattice(center: Coordinate, grid_size: u32, radius_km: f64) -> Result<Vec<LatticePoint>> {
    if grid_size < 2 {
        return Err(Error::Internal(format!("grid size {} cannot form a lattice", grid_size)));
    }
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(Error::Internal(format!("radius {} km cannot form a lattice", radius_km)));
    }

    let spacing = lattice_spacing_km(grid_size, radius_km);
    let half = i64::from(grid_size / 2);
    let mut points = Vec::with_capacity((grid_size as usize).pow(2));

    for row in 0..grid_size {
        for col in 0..grid_size {
            let offset_y = (half - i64::from(row)) as f64 * spacing;
            let offset_x = (i64::from(col) - half) as f64 * spacing;

            let bearing = offset_x.atan2(offset_y).to_degrees();
            let distance = (offset_x * offset_x + offset_y * offset_y).sqrt();

            points.push(LatticePoint {
                coord: destination(center, distance, bearing),
                row,
                col,
                index: (row * grid_size + col) as usize,
            });
        }
    }

    Ok(points)
}

//! Grid assembly: lattice coordinates joined with positions and styles

use crate::geo::{self, Coordinate};
use crate::metrics::{self, Metrics};
use crate::model::{GridConfig, Position};
use crate::palette;
use crate::{Error, Result};
use log::debug;
use serde::Serialize;

/// A lattice node with its observed rank and marker styling
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPoint {
    pub lat: f64,
    pub lng: f64,
    pub index: usize,
    pub row: u32,
    pub col: u32,
    pub position: Position,
    pub color: &'static str,
    pub text_color: &'static str,
    pub display_text: String,
}

impl GridPoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

/// Bounding box of all grid points
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    /// `None` for an empty slice
    pub fn of(points: &[GridPoint]) -> Option<Self> {
        let first = points.first()?;
        let init = Bounds { north: first.lat, south: first.lat, east: first.lng, west: first.lng };
        Some(points.iter().fold(init, |b, p| Bounds {
            north: b.north.max(p.lat),
            south: b.south.min(p.lat),
            east: b.east.max(p.lng),
            west: b.west.min(p.lng),
        }))
    }
}

/// Everything the report needs about one grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridData {
    pub points: Vec<GridPoint>,
    pub metrics: Metrics,
    pub center: Coordinate,
    pub bounds: Bounds,
    pub grid_size: u32,
    pub radius_km: f64,
}

/// Headline numbers for a grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSummary {
    pub total_points: usize,
    pub grid_size: u32,
    pub radius_km: f64,
    pub center: Coordinate,
    pub bounds: Bounds,
    pub geo_rank: f64,
    pub avg_position: Option<f64>,
    pub local_pack_pct: f64,
    pub coverage: f64,
}

impl GridData {
    /// The lattice node sitting on the business location
    pub fn center_point(&self) -> Option<&GridPoint> {
        let half = self.grid_size / 2;
        self.points.get((half * self.grid_size + half) as usize)
    }

    pub fn summary(&self) -> GridSummary {
        GridSummary {
            total_points: self.points.len(),
            grid_size: self.grid_size,
            radius_km: self.radius_km,
            center: self.center,
            bounds: self.bounds,
            geo_rank: self.metrics.geo_rank,
            avg_position: self.metrics.avg_position,
            local_pack_pct: self.metrics.local_pack_pct,
            coverage: self.metrics.coverage.percentage,
        }
    }
}

/// Build points, bounds and metrics for a grid
///
/// # Errors
///
/// The config is expected to be validated; a positions/grid mismatch or a
/// degenerate lattice surfaces as [`Error::Internal`].
pub fn build(config: &GridConfig) -> Result<GridData> {
    debug!(
        "Generating grid data (size={}, radius={}km, positions={})",
        config.grid_size,
        config.radius_km,
        config.positions.len()
    );

    let lattice = geo::lattice(config.center(), config.grid_size, config.radius_km)?;
    if lattice.len() != config.positions.len() {
        return Err(Error::Internal(format!(
            "{} positions supplied for a {}x{} grid",
            config.positions.len(),
            config.grid_size,
            config.grid_size
        )));
    }

    let points: Vec<GridPoint> = lattice
        .into_iter()
        .zip(config.positions.iter().copied())
        .map(|(node, position)| {
            let style = palette::style_for(position);
            GridPoint {
                lat: node.coord.lat,
                lng: node.coord.lng,
                index: node.index,
                row: node.row,
                col: node.col,
                position,
                color: style.color,
                text_color: style.text_color,
                display_text: palette::marker_label(position),
            }
        })
        .collect();

    let bounds = Bounds::of(&points).ok_or_else(|| Error::Internal("grid produced no points".into()))?;
    let metrics = metrics::calculate(&config.positions);

    debug!(
        "Grid data generated (points={}, geoRank={}, coverage={}%)",
        points.len(),
        metrics.geo_rank,
        metrics.coverage.percentage
    );

    Ok(GridData {
        points,
        metrics,
        center: config.center(),
        bounds,
        grid_size: config.grid_size,
        radius_km: config.radius_km,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(positions: Vec<Position>) -> GridConfig {
        GridConfig {
            keyword: "coffee".into(),
            business: "Cafe".into(),
            center_lat: 51.5074,
            center_lng: -0.1278,
            grid_size: 3,
            radius_km: 1.5,
            positions,
        }
    }

    #[test]
    fn points_carry_bucket_styles() {
        let data = build(&config(vec![Some(1), Some(2), Some(5), Some(9), Some(15), Some(30), None, Some(3), Some(7)])).unwrap();
        assert_eq!(data.points.len(), 9);
        assert_eq!(data.points[0].color, "#27ae60");
        assert_eq!(data.points[5].display_text, "21+");
        assert_eq!(data.points[6].display_text, "X");
        assert_eq!(data.points[6].color, "#95a5a6");
        assert_eq!(data.points[8].text_color, "#2c3e50");
    }

    #[test]
    fn bounds_enclose_every_point() {
        let data = build(&config(vec![None; 9])).unwrap();
        for p in &data.points {
            assert!(p.lat <= data.bounds.north && p.lat >= data.bounds.south);
            assert!(p.lng <= data.bounds.east && p.lng >= data.bounds.west);
        }
        assert!(data.bounds.north > data.center.lat);
        assert!(data.bounds.west < data.center.lng);
    }

    #[test]
    fn center_point_sits_on_business() {
        let mut positions = vec![None; 9];
        positions[4] = Some(2);
        let data = build(&config(positions)).unwrap();
        let c = data.center_point().unwrap();
        assert_eq!(c.coordinate(), data.center);
        assert_eq!(c.position, Some(2));
    }

    #[test]
    fn mismatched_positions_are_internal() {
        let err = build(&config(vec![Some(1); 4])).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }

    #[test]
    fn summary_mirrors_metrics() {
        let data = build(&config(vec![Some(2); 9])).unwrap();
        let s = data.summary();
        assert_eq!(s.total_points, 9);
        assert_eq!(s.geo_rank, 0.5);
        assert_eq!(s.coverage, 100.0);
        assert_eq!(s.local_pack_pct, 100.0);
    }
}

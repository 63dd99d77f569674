//! Built-in sample grids for previews and smoke tests

use crate::error::ValidationIssue;
use crate::model::{GridConfig, Position};
use crate::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Seed for the `large` preset so its positions are reproducible
pub const LARGE_SEED: u64 = 0x6e0_6a1d;

pub const NAMES: [&str; 3] = ["demo", "small", "large"];

/// Listing entry for one preset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetInfo {
    pub id: &'static str,
    pub keyword: String,
    pub business: String,
    pub grid_size: u32,
    pub radius_km: f64,
}

fn ranks(raw: &[u32]) -> Vec<Position> {
    raw.iter().map(|&r| if r == 0 { None } else { Some(r) }).collect()
}

fn demo() -> GridConfig {
    // 0 marks "not found"
    const RAW: [u32; 81] = [
        10, 6, 4, 3, 5, 9, 10, 6, 9, 1, 6, 5, 2, 2, 3, 5, 6, 10, 9, 5, 2, 2, 2, 2, 1, 3, 0, 6, 4, 2, 1, 1, 1, 3, 5, 0,
        0, 2, 1, 2, 1, 1, 2, 2, 0, 7, 5, 2, 1, 1, 1, 1, 2, 5, 21, 2, 2, 2, 3, 2, 1, 3, 7, 21, 2, 3, 1, 2, 2, 5, 21, 0,
        2, 9, 3, 10, 21, 5, 0, 5, 10,
    ];
    GridConfig {
        keyword: "takeaway food".into(),
        business: "El Buen Sabor Restaurant".into(),
        center_lat: 43.5596,
        center_lng: -5.9739,
        grid_size: 9,
        radius_km: 4.0,
        positions: ranks(&RAW),
    }
}

fn small() -> GridConfig {
    const RAW: [u32; 25] = [1, 2, 3, 0, 5, 2, 1, 2, 3, 4, 3, 2, 1, 2, 3, 0, 3, 2, 1, 2, 5, 4, 3, 2, 1];
    GridConfig {
        keyword: "pizza delivery".into(),
        business: "Pizza Express".into(),
        center_lat: 40.4168,
        center_lng: -3.7038,
        grid_size: 5,
        radius_km: 2.0,
        positions: ranks(&RAW),
    }
}

/// 10% not found, 20% local pack, 30% ranks 4-10, the rest 11-20
fn large() -> GridConfig {
    let mut rng = StdRng::seed_from_u64(LARGE_SEED);
    let positions = (0..121)
        .map(|_| {
            let roll: f64 = rng.random();
            if roll < 0.1 {
                None
            } else if roll < 0.3 {
                Some(rng.random_range(1..=3))
            } else if roll < 0.6 {
                Some(rng.random_range(4..=10))
            } else {
                Some(rng.random_range(11..=20))
            }
        })
        .collect();

    GridConfig {
        keyword: "coffee shop".into(),
        business: "Central Coffee".into(),
        center_lat: 51.5074,
        center_lng: -0.1278,
        grid_size: 11,
        radius_km: 6.0,
        positions,
    }
}

/// Look up a preset by name
///
/// # Errors
///
/// [`Error::Validation`] naming the available presets when `name` is unknown.
pub fn preset(name: &str) -> Result<GridConfig> {
    match name {
        "demo" => Ok(demo()),
        "small" => Ok(small()),
        "large" => Ok(large()),
        other => Err(Error::Validation(vec![ValidationIssue::new(
            "preset",
            format!("Preset '{}' not found (available: {})", other, NAMES.join(", ")),
        )])),
    }
}

pub fn list() -> Vec<PresetInfo> {
    NAMES
        .iter()
        .filter_map(|&id| preset(id).ok().map(|g| (id, g)))
        .map(|(id, g)| PresetInfo {
            id,
            keyword: g.keyword,
            business: g.business,
            grid_size: g.grid_size,
            radius_km: g.radius_km,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_is_valid() {
        for name in NAMES {
            let g = preset(name).unwrap();
            g.validate().unwrap_or_else(|e| panic!("preset {} invalid: {}", name, e));
        }
    }

    #[test]
    fn large_is_reproducible() {
        assert_eq!(preset("large").unwrap().positions, preset("large").unwrap().positions);
        let g = preset("large").unwrap();
        assert!(g.positions.iter().flatten().all(|r| (1..=20).contains(r)));
    }

    #[test]
    fn unknown_preset_lists_alternatives() {
        let err = preset("huge").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(err.to_string().contains("demo, small, large"));
    }

    #[test]
    fn listing() {
        let items = list();
        assert_eq!(items.len(), 3);
        assert_eq!(items[1].id, "small");
        assert_eq!(items[1].grid_size, 5);
    }
}

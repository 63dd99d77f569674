//! Local ranking metrics computed from the position array

use crate::model::Position;
use crate::palette::{classify, Bucket};
use serde::Serialize;

/// Points where the business was found
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coverage {
    pub found: usize,
    pub total: usize,
    /// 0-100, two decimals
    pub percentage: f64,
}

/// Count of positions per bucket; the seven counts always sum to the total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub position1: usize,
    pub local_pack: usize,
    pub top7: usize,
    pub top10: usize,
    pub page1: usize,
    pub page2_plus: usize,
    pub not_found: usize,
}

impl Distribution {
    pub fn record(&mut self, bucket: Bucket) {
        *self.slot(bucket) += 1;
    }

    pub fn count(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::First => self.position1,
            Bucket::LocalPack => self.local_pack,
            Bucket::Top7 => self.top7,
            Bucket::Top10 => self.top10,
            Bucket::Page1 => self.page1,
            Bucket::Page2Plus => self.page2_plus,
            Bucket::NotFound => self.not_found,
        }
    }

    pub fn total(&self) -> usize {
        self.position1 + self.local_pack + self.top7 + self.top10 + self.page1 + self.page2_plus + self.not_found
    }

    fn slot(&mut self, bucket: Bucket) -> &mut usize {
        match bucket {
            Bucket::First => &mut self.position1,
            Bucket::LocalPack => &mut self.local_pack,
            Bucket::Top7 => &mut self.top7,
            Bucket::Top10 => &mut self.top10,
            Bucket::Page1 => &mut self.page1,
            Bucket::Page2Plus => &mut self.page2_plus,
            Bucket::NotFound => &mut self.not_found,
        }
    }
}

/// Summary statistics for one grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    /// `min(1 / mean(found ranks), 1)`, four decimals; 0 when never found
    pub geo_rank: f64,
    /// Mean found rank, two decimals; `None` when never found
    pub avg_position: Option<f64>,
    /// Share of all points ranked 1-3, 0-100
    pub local_pack_pct: f64,
    pub coverage: Coverage,
    pub total_points: usize,
    /// Points where the business ranked at all
    pub found_in: usize,
    pub distribution: Distribution,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(part as f64 * 100.0 / total as f64, 2)
}

fn found_ranks(positions: &[Position]) -> impl Iterator<Item = u32> + '_ {
    positions.iter().filter_map(|p| *p)
}

fn mean_rank(positions: &[Position]) -> Option<f64> {
    let (sum, count) = found_ranks(positions).fold((0u64, 0usize), |(s, c), r| (s + u64::from(r), c + 1));
    (count > 0).then(|| sum as f64 / count as f64)
}

pub fn geo_rank(positions: &[Position]) -> f64 {
    match mean_rank(positions) {
        Some(mean) if mean > 0.0 => round_to(1.0 / mean, 4).min(1.0),
        _ => 0.0,
    }
}

pub fn avg_position(positions: &[Position]) -> Option<f64> {
    mean_rank(positions).map(|m| round_to(m, 2))
}

pub fn local_pack_pct(positions: &[Position]) -> f64 {
    let in_pack = found_ranks(positions).filter(|r| (1..=3).contains(r)).count();
    percentage(in_pack, positions.len())
}

pub fn coverage(positions: &[Position]) -> Coverage {
    let found = found_ranks(positions).count();
    Coverage {
        found,
        total: positions.len(),
        percentage: percentage(found, positions.len()),
    }
}

pub fn distribution(positions: &[Position]) -> Distribution {
    positions.iter().fold(Distribution::default(), |mut d, p| {
        d.record(classify(*p));
        d
    })
}

pub fn calculate(positions: &[Position]) -> Metrics {
    let coverage = coverage(positions);
    Metrics {
        geo_rank: geo_rank(positions),
        avg_position: avg_position(positions),
        local_pack_pct: local_pack_pct(positions),
        found_in: coverage.found,
        coverage,
        total_points: positions.len(),
        distribution: distribution(positions),
    }
}

impl Metrics {
    pub fn formatted_geo_rank(&self) -> String {
        format!("{:.2}", self.geo_rank)
    }

    pub fn formatted_avg_position(&self) -> String {
        self.avg_position
            .map(|a| format!("{:.1}", a))
            .unwrap_or_else(|| "N/A".to_string())
    }

    pub fn formatted_local_pack(&self) -> String {
        format!("{:.0}%", self.local_pack_pct)
    }

    pub fn formatted_coverage(&self) -> String {
        format!("{:.0}%", self.coverage.percentage)
    }
}

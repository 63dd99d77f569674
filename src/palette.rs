//! Rank buckets and their marker styling
//!
//! The table below is the only place bucket boundaries are defined; both the
//! metrics distribution and marker coloring classify through [`classify`].

use serde::Serialize;

/// Disjoint rank buckets, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Bucket {
    /// Rank 1
    First,
    /// Ranks 2-3
    LocalPack,
    /// Ranks 4-7
    Top7,
    /// Ranks 8-10
    Top10,
    /// Ranks 11-20
    Page1,
    /// Ranks 21 and beyond
    Page2Plus,
    NotFound,
}

/// One row of the bucket table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStyle {
    pub bucket: Bucket,
    /// Inclusive lower rank
    pub lower: u32,
    /// Inclusive upper rank, `None` for open-ended
    pub upper: Option<u32>,
    pub color: &'static str,
    pub text_color: &'static str,
    /// Fixed marker label; `None` shows the rank itself
    pub label: Option<&'static str>,
    pub legend: &'static str,
}

impl BucketStyle {
    pub fn contains(&self, rank: u32) -> bool {
        rank >= self.lower && self.upper.map_or(true, |u| rank <= u)
    }
}

const WHITE: &str = "#ffffff";

/// Ranked buckets in scan order
pub static RANKED: [BucketStyle; 6] = [
    BucketStyle { bucket: Bucket::First, lower: 1, upper: Some(1), color: "#27ae60", text_color: WHITE, label: None, legend: "Position #1" },
    BucketStyle { bucket: Bucket::LocalPack, lower: 2, upper: Some(3), color: "#2ecc71", text_color: WHITE, label: None, legend: "Local Pack (2-3)" },
    BucketStyle { bucket: Bucket::Top7, lower: 4, upper: Some(7), color: "#f1c40f", text_color: "#2c3e50", label: None, legend: "Top 7 (4-7)" },
    BucketStyle { bucket: Bucket::Top10, lower: 8, upper: Some(10), color: "#e67e22", text_color: WHITE, label: None, legend: "Top 10 (8-10)" },
    BucketStyle { bucket: Bucket::Page1, lower: 11, upper: Some(20), color: "#e74c3c", text_color: WHITE, label: None, legend: "Page 1 (11-20)" },
    BucketStyle { bucket: Bucket::Page2Plus, lower: 21, upper: None, color: "#c0392b", text_color: WHITE, label: Some("21+"), legend: "Page 2+ (21+)" },
];

pub static NOT_FOUND: BucketStyle = BucketStyle {
    bucket: Bucket::NotFound,
    lower: 0,
    upper: Some(0),
    color: "#95a5a6",
    text_color: WHITE,
    label: Some("X"),
    legend: "Not found",
};

/// First matching row for a rank; missing ranks and rank 0 are not found
pub fn style_for(position: Option<u32>) -> &'static BucketStyle {
    position
        .and_then(|rank| RANKED.iter().find(|s| s.contains(rank)))
        .unwrap_or(&NOT_FOUND)
}

pub fn classify(position: Option<u32>) -> Bucket {
    style_for(position).bucket
}

/// Text drawn inside a marker
pub fn marker_label(position: Option<u32>) -> String {
    let style = style_for(position);
    match (style.label, position) {
        (Some(fixed), _) => fixed.to_string(),
        (None, Some(rank)) => rank.to_string(),
        (None, None) => NOT_FOUND.label.unwrap_or("X").to_string(),
    }
}

/// Legend entry shown under the map
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegendItem {
    pub bucket: Bucket,
    pub color: &'static str,
    pub label: &'static str,
}

/// All seven buckets, ranked first, not-found last
pub fn legend_items() -> Vec<LegendItem> {
    RANKED
        .iter()
        .chain(std::iter::once(&NOT_FOUND))
        .map(|s| LegendItem { bucket: s.bucket, color: s.color, label: s.legend })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranked_table_is_disjoint_and_exhaustive() {
        for rank in 1..=5000u32 {
            let hits = RANKED.iter().filter(|s| s.contains(rank)).count();
            assert_eq!(hits, 1, "rank {} matched {} buckets", rank, hits);
        }
        assert_eq!(RANKED.iter().filter(|s| s.contains(u32::MAX)).count(), 1);
        assert!(RANKED.iter().all(|s| !s.contains(0)));
    }

    #[test]
    fn boundaries() {
        assert_eq!(classify(Some(1)), Bucket::First);
        assert_eq!(classify(Some(2)), Bucket::LocalPack);
        assert_eq!(classify(Some(3)), Bucket::LocalPack);
        assert_eq!(classify(Some(4)), Bucket::Top7);
        assert_eq!(classify(Some(7)), Bucket::Top7);
        assert_eq!(classify(Some(8)), Bucket::Top10);
        assert_eq!(classify(Some(10)), Bucket::Top10);
        assert_eq!(classify(Some(11)), Bucket::Page1);
        assert_eq!(classify(Some(20)), Bucket::Page1);
        assert_eq!(classify(Some(21)), Bucket::Page2Plus);
        assert_eq!(classify(None), Bucket::NotFound);
        assert_eq!(classify(Some(0)), Bucket::NotFound);
    }

    #[test]
    fn labels_and_colors() {
        assert_eq!(marker_label(Some(7)), "7");
        assert_eq!(marker_label(Some(20)), "20");
        assert_eq!(marker_label(Some(21)), "21+");
        assert_eq!(marker_label(Some(99)), "21+");
        assert_eq!(marker_label(None), "X");

        assert_eq!(style_for(Some(5)).text_color, "#2c3e50");
        assert_eq!(style_for(None).color, "#95a5a6");
        assert_eq!(style_for(Some(1)).color, "#27ae60");
    }

    #[test]
    fn legend_covers_every_bucket_once() {
        let items = legend_items();
        assert_eq!(items.len(), 7);
        assert_eq!(items.last().unwrap().bucket, Bucket::NotFound);
        let mut seen = std::collections::HashSet::new();
        assert!(items.iter().all(|i| seen.insert(i.bucket)));
    }
}

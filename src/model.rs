//! Request models: the grid to render and how to render it
//!
//! Both types deserialize from the camelCase JSON the service accepts and
//! fill in defaults for omitted fields. `validate` collects every problem at
//! once instead of stopping at the first one.

use crate::config::parse_number;
use crate::error::ValidationIssue;
use crate::geo::Coordinate;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Observed rank at one grid point; `None` means the business was not found
pub type Position = Option<u32>;

fn default_grid_size() -> u32 {
    9
}

fn default_radius_km() -> f64 {
    4.0
}

/// A ranking grid around a business location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    pub keyword: String,
    pub business: String,
    pub center_lat: f64,
    pub center_lng: f64,
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_radius_km")]
    pub radius_km: f64,
    /// Row-major, `grid_size * grid_size` entries
    pub positions: Vec<Position>,
}

impl GridConfig {
    pub fn center(&self) -> Coordinate {
        Coordinate::new(self.center_lat, self.center_lng)
    }

    pub fn total_points(&self) -> usize {
        (self.grid_size as usize) * (self.grid_size as usize)
    }

    /// Check every field and the positions/grid-size invariant
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing every rejected field.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        check_text(&mut issues, "keyword", "Keyword", &self.keyword);
        check_text(&mut issues, "business", "Business name", &self.business);

        if !self.center_lat.is_finite() || !(-90.0..=90.0).contains(&self.center_lat) {
            issues.push(ValidationIssue::new("centerLat", "Center latitude must be between -90 and 90"));
        }
        if !self.center_lng.is_finite() || !(-180.0..=180.0).contains(&self.center_lng) {
            issues.push(ValidationIssue::new("centerLng", "Center longitude must be between -180 and 180"));
        }

        let grid_ok = (3..=15).contains(&self.grid_size);
        if !grid_ok {
            issues.push(ValidationIssue::new("gridSize", "Grid size must be between 3 and 15"));
        }
        if !self.radius_km.is_finite() || !(0.5..=20.0).contains(&self.radius_km) {
            issues.push(ValidationIssue::new("radiusKm", "Radius must be between 0.5 and 20 km"));
        }

        if let Some(idx) = self.positions.iter().position(|p| *p == Some(0)) {
            issues.push(ValidationIssue::new(
                "positions",
                format!("Position at index {} must be a positive integer or null", idx),
            ));
        }
        if grid_ok && self.positions.len() != self.total_points() {
            issues.push(ValidationIssue::new(
                "positions",
                format!(
                    "Positions array length ({}) does not match grid size ({}x{} = {})",
                    self.positions.len(),
                    self.grid_size,
                    self.grid_size,
                    self.total_points()
                ),
            ));
        }

        finish(issues)
    }
}

fn check_text(issues: &mut Vec<ValidationIssue>, field: &str, label: &str, value: &str) {
    let len = value.trim().chars().count();
    if len == 0 {
        issues.push(ValidationIssue::new(field, format!("{} is required", label)));
    } else if value.chars().count() > 200 {
        issues.push(ValidationIssue::new(field, format!("{} must not exceed 200 characters", label)));
    }
}

fn finish(issues: Vec<ValidationIssue>) -> Result<()> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(issues))
    }
}

/// Raster format of the captured image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    /// Whether the quality setting has any effect
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::Webp)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(Error::Validation(vec![ValidationIssue::new(
                "format",
                format!("Format must be one of: png, jpeg, webp (got '{}')", other),
            )])),
        }
    }
}

/// Document chrome palette; never affects marker colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Default,
    Dark,
    Light,
}

impl std::str::FromStr for Theme {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Theme::Default),
            "dark" => Ok(Theme::Dark),
            "light" => Ok(Theme::Light),
            other => Err(Error::Validation(vec![ValidationIssue::new(
                "theme",
                format!("Theme must be one of: default, dark, light (got '{}')", other),
            )])),
        }
    }
}

/// How the report should be drawn and captured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    pub marker_size: u32,
    pub brand_text: String,
    pub show_legend: bool,
    pub format: ImageFormat,
    /// Applies to jpeg and webp only
    pub quality: u8,
    pub theme: Theme,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 1100,
            marker_size: 28,
            brand_text: "EquipoSEO".to_string(),
            show_legend: true,
            format: ImageFormat::Png,
            quality: 90,
            theme: Theme::Default,
        }
    }
}

impl RenderOptions {
    /// # Errors
    ///
    /// Returns [`Error::Validation`] listing every rejected field.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if !(400..=1920).contains(&self.width) {
            issues.push(ValidationIssue::new("width", "Width must be between 400 and 1920 pixels"));
        }
        if !(400..=1920).contains(&self.height) {
            issues.push(ValidationIssue::new("height", "Height must be between 400 and 1920 pixels"));
        }
        if !(16..=48).contains(&self.marker_size) {
            issues.push(ValidationIssue::new("markerSize", "Marker size must be between 16 and 48 pixels"));
        }
        if self.brand_text.chars().count() > 50 {
            issues.push(ValidationIssue::new("brandText", "Brand text must not exceed 50 characters"));
        }
        if !(1..=100).contains(&self.quality) {
            issues.push(ValidationIssue::new("quality", "Quality must be between 1 and 100"));
        }

        finish(issues)
    }

    /// Quality to pass to the encoder, `None` for lossless formats
    pub fn effective_quality(&self) -> Option<u8> {
        self.format.is_lossy().then_some(self.quality)
    }

    /// Defaults overlaid with environment variables
    ///
    /// Recognized: `DEFAULT_WIDTH`, `DEFAULT_HEIGHT`, `DEFAULT_FORMAT`,
    /// `DEFAULT_QUALITY`, `DEFAULT_MARKER_SIZE`, `DEFAULT_BRAND_TEXT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RenderOptions::from_env`] but reads from an arbitrary source
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for unparsable values or defaults that would fail
    /// validation.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Self::default();

        if let Some(w) = parse_number::<u32>(&lookup, "DEFAULT_WIDTH")? {
            opts.width = w;
        }
        if let Some(h) = parse_number::<u32>(&lookup, "DEFAULT_HEIGHT")? {
            opts.height = h;
        }
        if let Some(q) = parse_number::<u8>(&lookup, "DEFAULT_QUALITY")? {
            opts.quality = q;
        }
        if let Some(size) = parse_number::<u32>(&lookup, "DEFAULT_MARKER_SIZE")? {
            opts.marker_size = size;
        }
        if let Some(format) = lookup("DEFAULT_FORMAT").filter(|f| !f.trim().is_empty()) {
            opts.format = format
                .trim()
                .parse()
                .map_err(|e: Error| Error::Config(format!("DEFAULT_FORMAT: {}", e)))?;
        }
        if let Some(brand) = lookup("DEFAULT_BRAND_TEXT") {
            opts.brand_text = brand;
        }

        opts.validate()
            .map_err(|e| Error::Config(format!("Invalid render defaults: {}", e)))?;
        Ok(opts)
    }

    /// These options with the fields of a partial JSON object applied on top
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] when `partial` is not an object or a field has
    /// the wrong type.
    pub fn overlay(&self, partial: serde_json::Value) -> Result<Self> {
        let mut merged = serde_json::to_value(self)
            .map_err(|e| Error::Internal(format!("Failed to serialize render options: {}", e)))?;
        match (merged.as_object_mut(), partial) {
            (Some(fields), serde_json::Value::Object(overrides)) => fields.extend(overrides),
            (_, other) => {
                return Err(Error::Validation(vec![ValidationIssue::new(
                    "options",
                    format!("Render options must be a JSON object (got {})", other),
                )]))
            }
        }
        serde_json::from_value(merged).map_err(|e| Error::Validation(vec![ValidationIssue::new("options", e.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridConfig {
        GridConfig {
            keyword: "pizza delivery".into(),
            business: "Pizza Express".into(),
            center_lat: 40.4168,
            center_lng: -3.7038,
            grid_size: 3,
            radius_km: 2.0,
            positions: vec![Some(1), None, Some(3), Some(2), Some(1), Some(25), None, Some(8), Some(4)],
        }
    }

    #[test]
    fn valid_grid_passes() {
        assert!(grid().validate().is_ok());
    }

    #[test]
    fn length_mismatch_is_reported() {
        let mut g = grid();
        g.positions.pop();
        let err = g.validate().unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].field, "positions");
        assert!(err.issues()[0].message.contains("(8)"));
        assert!(err.issues()[0].message.contains("3x3 = 9"));
    }

    #[test]
    fn every_bad_field_is_collected() {
        let g = GridConfig {
            keyword: "".into(),
            center_lat: 91.0,
            center_lng: f64::NAN,
            grid_size: 2,
            radius_km: 0.1,
            ..grid()
        };
        let err = g.validate().unwrap_err();
        let fields: Vec<&str> = err.issues().iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["keyword", "centerLat", "centerLng", "gridSize", "radiusKm"]);
    }

    #[test]
    fn zero_rank_is_rejected() {
        let mut g = grid();
        g.positions[4] = Some(0);
        let err = g.validate().unwrap_err();
        assert!(err.issues()[0].message.contains("index 4"));
    }

    #[test]
    fn grid_defaults_apply_when_omitted() {
        let json = r#"{"keyword":"k","business":"b","centerLat":1.0,"centerLng":2.0,"positions":[]}"#;
        let g: GridConfig = serde_json::from_str(json).unwrap();
        assert_eq!(g.grid_size, 9);
        assert_eq!(g.radius_km, 4.0);
    }

    #[test]
    fn render_options_defaults_and_partial_json() {
        let o: RenderOptions = serde_json::from_str(r#"{"format":"webp","theme":"dark"}"#).unwrap();
        assert_eq!(o.width, 800);
        assert_eq!(o.height, 1100);
        assert_eq!(o.format, ImageFormat::Webp);
        assert_eq!(o.theme, Theme::Dark);
        assert!(o.validate().is_ok());
        assert_eq!(o.effective_quality(), Some(90));

        assert!(serde_json::from_str::<RenderOptions>(r#"{"format":"gif"}"#).is_err());
    }

    #[test]
    fn render_options_bounds() {
        let o = RenderOptions {
            width: 399,
            height: 1921,
            marker_size: 50,
            brand_text: "x".repeat(51),
            quality: 0,
            ..Default::default()
        };
        assert_eq!(o.validate().unwrap_err().issues().len(), 5);
    }

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn render_defaults_from_env() {
        let o = RenderOptions::from_lookup(lookup_from(&[
            ("DEFAULT_WIDTH", "1024"),
            ("DEFAULT_HEIGHT", " 768 "),
            ("DEFAULT_FORMAT", "jpg"),
            ("DEFAULT_QUALITY", "75"),
            ("DEFAULT_MARKER_SIZE", "32"),
            ("DEFAULT_BRAND_TEXT", "Acme Maps"),
        ]))
        .unwrap();
        assert_eq!((o.width, o.height), (1024, 768));
        assert_eq!(o.format, ImageFormat::Jpeg);
        assert_eq!(o.quality, 75);
        assert_eq!(o.marker_size, 32);
        assert_eq!(o.brand_text, "Acme Maps");
        assert!(o.show_legend);

        assert_eq!(RenderOptions::from_lookup(lookup_from(&[])).unwrap(), RenderOptions::default());
    }

    #[test]
    fn bad_render_defaults_are_config_errors() {
        for pairs in [
            [("DEFAULT_WIDTH", "wide")],
            [("DEFAULT_FORMAT", "gif")],
            [("DEFAULT_QUALITY", "0")],
            [("DEFAULT_HEIGHT", "5000")],
        ] {
            let err = RenderOptions::from_lookup(lookup_from(&pairs)).unwrap_err();
            assert_eq!(err.code(), "CONFIG_ERROR", "{:?}", pairs);
        }
    }

    #[test]
    fn overlay_keeps_unset_fields() {
        let base = RenderOptions { width: 1024, quality: 60, ..Default::default() };
        let o = base.overlay(serde_json::json!({ "format": "webp", "showLegend": false })).unwrap();
        assert_eq!(o.width, 1024);
        assert_eq!(o.quality, 60);
        assert_eq!(o.format, ImageFormat::Webp);
        assert!(!o.show_legend);

        assert_eq!(base.overlay(serde_json::json!([1, 2])).unwrap_err().code(), "VALIDATION_ERROR");
        assert!(base.overlay(serde_json::json!({ "width": "wide" })).is_err());
    }

    #[test]
    fn png_ignores_quality() {
        let o = RenderOptions { quality: 10, ..Default::default() };
        assert_eq!(o.effective_quality(), None);
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::Jpeg.content_type(), "image/jpeg");
    }
}

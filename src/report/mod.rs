//! Report document generation
//!
//! A report is one self-contained HTML document: header, metric cards, the
//! map container, an optional legend, a footer and the embedded map script.
//! Once loaded, the document raises exactly one of two global flags:
//! [`READY_FLAG`] when the map has settled, or [`ERROR_FLAG`] carrying a
//! message. Those flags are the only channel the capture stage reads.

pub mod script;
pub mod styles;

use crate::grid::{self, GridData};
use crate::model::{GridConfig, RenderOptions};
use crate::palette;
use crate::{Error, Result};
use chrono::{Local, NaiveDate};
use html_escape::encode_safe;
use log::debug;
use serde_json::Value;

/// Boolean global set once every tile has loaded
pub const READY_FLAG: &str = "GEOGRID_READY";
/// String global set when map initialization fails
pub const ERROR_FLAG: &str = "GEOGRID_ERROR";

pub const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
pub const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";

/// Expression returning the flag state as a JSON string
///
/// Evaluates to `{"error": msg}`, `{"ready": true}` or `{"pending": true}`.
pub const SIGNAL_PROBE: &str = r#"(function () {
  if (window.GEOGRID_ERROR) { return JSON.stringify({ error: String(window.GEOGRID_ERROR) }); }
  if (window.GEOGRID_READY === true) { return JSON.stringify({ ready: true }); }
  return JSON.stringify({ pending: true });
})()"#;

/// Expression returning the rendered content height in CSS pixels
pub const CONTENT_HEIGHT_PROBE: &str = r#"(function () {
  var el = document.querySelector('.container');
  return el ? el.scrollHeight : document.body.scrollHeight;
})()"#;

/// Completion state read from a loaded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSignal {
    Pending,
    Ready,
    Failed(String),
}

impl DocumentSignal {
    /// Decode the value returned by [`SIGNAL_PROBE`]
    ///
    /// Accepts the JSON string the probe produces or an already-parsed object.
    /// Anything unrecognised reads as pending.
    pub fn from_probe(value: &Value) -> Self {
        let parsed;
        let obj = match value {
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(_) => return DocumentSignal::Pending,
            },
            other => other,
        };

        if let Some(err) = obj.get("error") {
            let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
            return DocumentSignal::Failed(msg);
        }
        if obj.get("ready").and_then(Value::as_bool) == Some(true) {
            return DocumentSignal::Ready;
        }
        DocumentSignal::Pending
    }
}

/// A generated report and the grid it was built from
#[derive(Debug, Clone)]
pub struct Document {
    pub html: String,
    pub grid: GridData,
    pub generated_on: NaiveDate,
}

/// Generate the report dated today (local time)
///
/// # Errors
///
/// Expects validated input; any failure is [`Error::Internal`].
pub fn generate(config: &GridConfig, options: &RenderOptions) -> Result<Document> {
    generate_on(config, options, Local::now().date_naive())
}

/// Generate the report with a fixed date
pub fn generate_on(config: &GridConfig, options: &RenderOptions, date: NaiveDate) -> Result<Document> {
    let grid = grid::build(config)?;
    let html = render_html(config, &grid, options, date)?;
    debug!("Generated report markup ({} bytes, {} points)", html.len(), grid.points.len());
    Ok(Document { html, grid, generated_on: date })
}

pub fn format_report_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn metric_cards(grid: &GridData) -> String {
    let m = &grid.metrics;
    [
        ("georank", "GeoRank", m.formatted_geo_rank()),
        ("position", "Average Position", m.formatted_avg_position()),
        ("localpack", "Local Pack", m.formatted_local_pack()),
        ("coverage", "Coverage", m.formatted_coverage()),
    ]
    .iter()
    .map(|(class, label, value)| {
        format!(
            "\n      <div class=\"metric-card {}\">\n        <div class=\"label\">{}</div>\n        <div class=\"value\">{}</div>\n      </div>",
            class, label, value
        )
    })
    .collect()
}

fn legend() -> String {
    let items: String = palette::legend_items()
        .iter()
        .map(|item| {
            format!(
                "\n          <div class=\"legend-item\">\n            <div class=\"legend-color\" style=\"background-color: {};\"></div>\n            <span>{}</span>\n          </div>",
                item.color,
                encode_safe(item.label)
            )
        })
        .collect();
    format!(
        "\n      <div class=\"legend\">\n        <h3>Position Legend</h3>\n        <div class=\"legend-items\">{}\n        </div>\n      </div>",
        items
    )
}

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>GeoGrid Report - {{BUSINESS}}</title>
  <link rel="stylesheet" href="{{LEAFLET_CSS}}" />
  <style>{{STYLES}}</style>
</head>
<body>
  <div class="container">
    <div class="header">
      <h1>{{BUSINESS}}</h1>
      <div class="subtitle">Local ranking report: "{{KEYWORD}}"</div>
      <div class="metadata">Grid {{GRID_SIZE}}x{{GRID_SIZE}} | Radius: {{RADIUS}} km | {{DATE}}</div>
    </div>

    <div class="metrics">{{METRICS}}
    </div>

    <div class="map-container">
      <div id="map"></div>{{LEGEND}}
    </div>

    <div class="footer">
      <span class="brand">Powered by {{BRAND}}</span> |
      <span>Generated on {{DATE}}</span>
    </div>
  </div>

  <script src="{{LEAFLET_JS}}"></script>
  <script>{{SCRIPT}}</script>
</body>
</html>
"#;

fn render_html(config: &GridConfig, grid: &GridData, options: &RenderOptions, date: NaiveDate) -> Result<String> {
    if grid.points.is_empty() {
        return Err(Error::Internal("cannot render a report without grid points".into()));
    }

    let script = script::map_script(grid, options)?;
    let legend = if options.show_legend { legend() } else { String::new() };

    // user text goes in last, with braces encoded so it can never form a token
    Ok(TEMPLATE
        .replace("{{LEAFLET_CSS}}", LEAFLET_CSS)
        .replace("{{LEAFLET_JS}}", LEAFLET_JS)
        .replace("{{STYLES}}", &styles::stylesheet(options.theme))
        .replace("{{GRID_SIZE}}", &grid.grid_size.to_string())
        .replace("{{RADIUS}}", &grid.radius_km.to_string())
        .replace("{{DATE}}", &format_report_date(date))
        .replace("{{METRICS}}", &metric_cards(grid))
        .replace("{{LEGEND}}", &legend)
        .replace("{{SCRIPT}}", &script)
        .replace("{{BUSINESS}}", &escape_text(&config.business))
        .replace("{{KEYWORD}}", &escape_text(&config.keyword))
        .replace("{{BRAND}}", &escape_text(&options.brand_text)))
}

fn escape_text(text: &str) -> String {
    encode_safe(text).replace('{', "&#123;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> GridConfig {
        GridConfig {
            keyword: "dentist".into(),
            business: "Smile Clinic".into(),
            center_lat: 48.8566,
            center_lng: 2.3522,
            grid_size: 3,
            radius_km: 1.0,
            positions: vec![Some(1), Some(4), None, Some(2), Some(3), Some(12), Some(30), None, Some(9)],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    #[test]
    fn probe_decoding() {
        assert_eq!(DocumentSignal::from_probe(&json!(r#"{"pending":true}"#)), DocumentSignal::Pending);
        assert_eq!(DocumentSignal::from_probe(&json!(r#"{"ready":true}"#)), DocumentSignal::Ready);
        assert_eq!(
            DocumentSignal::from_probe(&json!(r#"{"error":"Map library failed to load"}"#)),
            DocumentSignal::Failed("Map library failed to load".into())
        );
        assert_eq!(DocumentSignal::from_probe(&json!({"ready": true})), DocumentSignal::Ready);
        assert_eq!(DocumentSignal::from_probe(&Value::Null), DocumentSignal::Pending);
        assert_eq!(DocumentSignal::from_probe(&json!("not json")), DocumentSignal::Pending);
    }

    #[test]
    fn error_wins_over_ready() {
        let v = json!({"error": "boom", "ready": true});
        assert_eq!(DocumentSignal::from_probe(&v), DocumentSignal::Failed("boom".into()));
    }

    #[test]
    fn no_tokens_left_behind() {
        let doc = generate_on(&config(), &RenderOptions::default(), date()).unwrap();
        assert!(!doc.html.contains("{{"), "unfilled token in markup");
        assert!(doc.html.contains("March 5, 2024"));
        assert!(doc.html.contains("Grid 3x3 | Radius: 1 km"));
        assert!(doc.html.contains(READY_FLAG));
        assert!(doc.html.contains(ERROR_FLAG));
    }

    #[test]
    fn legend_toggle() {
        let with = generate_on(&config(), &RenderOptions::default(), date()).unwrap();
        let without = generate_on(
            &config(),
            &RenderOptions { show_legend: false, ..Default::default() },
            date(),
        )
        .unwrap();
        assert!(with.html.contains("class=\"legend\""));
        assert!(!without.html.contains("class=\"legend\""));
    }

    #[test]
    fn user_text_is_escaped() {
        let mut cfg = config();
        cfg.business = "<script>alert(1)</script>".into();
        cfg.keyword = "a \"quoted\" & {{SCRIPT}}".into();
        let opts = RenderOptions { brand_text: "<b>Brand</b>".into(), ..Default::default() };
        let doc = generate_on(&cfg, &opts, date()).unwrap();
        assert!(!doc.html.contains("<script>alert(1)</script>"));
        assert!(doc.html.contains("&lt;script&gt;alert(1)&lt;"));
        assert!(doc.html.contains("Powered by &lt;b&gt;Brand&lt;"));
        assert!(doc.html.contains("a &quot;quoted&quot; &amp; &#123;&#123;SCRIPT}}"));
    }

    #[test]
    fn date_formatting() {
        assert_eq!(format_report_date(NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()), "December 31, 2025");
    }
}

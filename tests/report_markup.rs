//! Structure and golden checks for the generated report document

use chrono::NaiveDate;
use geogrid_render::model::Theme;
use geogrid_render::report::{self, ERROR_FLAG, READY_FLAG};
use geogrid_render::{presets, RenderOptions};
use scraper::{Html, Selector};
use std::fs;
use std::path::PathBuf;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn select<'a>(doc: &'a Html, css: &str) -> Vec<scraper::ElementRef<'a>> {
    let sel = Selector::parse(css).unwrap();
    doc.select(&sel).collect()
}

fn text(el: &scraper::ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[test]
fn header_metrics_and_footer() {
    let grid = presets::preset("small").unwrap();
    let doc = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    let html = Html::parse_document(&doc.html);

    let h1 = select(&html, ".header h1");
    assert_eq!(text(&h1[0]), "Pizza Express");
    assert!(text(&select(&html, ".header .subtitle")[0]).contains("\"pizza delivery\""));
    assert!(text(&select(&html, ".header .metadata")[0]).contains("Grid 5x5 | Radius: 2 km | June 1, 2024"));

    let values: Vec<String> = select(&html, ".metric-card .value").iter().map(text).collect();
    assert_eq!(values, vec!["0.40", "2.5", "76%", "92%"]);
    let labels: Vec<String> = select(&html, ".metric-card .label").iter().map(text).collect();
    assert_eq!(labels, vec!["GeoRank", "Average Position", "Local Pack", "Coverage"]);

    assert_eq!(text(&select(&html, ".footer .brand")[0]), "Powered by EquipoSEO");
    assert_eq!(select(&html, "#map").len(), 1);
}

#[test]
fn leaflet_and_script_are_embedded() {
    let grid = presets::preset("small").unwrap();
    let doc = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    let html = Html::parse_document(&doc.html);

    let css = select(&html, "link[rel=stylesheet]");
    assert_eq!(css[0].value().attr("href"), Some(report::LEAFLET_CSS));

    let scripts = select(&html, "script");
    assert_eq!(scripts.len(), 2);
    assert_eq!(scripts[0].value().attr("src"), Some(report::LEAFLET_JS));

    let init = scripts[1].inner_html();
    assert!(init.contains(READY_FLAG));
    assert!(init.contains(ERROR_FLAG));
    assert!(init.contains("typeof L === 'undefined'"));
    assert!(init.contains("tile.openstreetmap.org"));
    assert!(init.contains("padding: [50, 50]"));
    assert!(init.contains("], 12);"));
    // marker size 28 plus 8 for the business marker
    assert!(init.contains("iconSize: [36, 36]"));
    assert!(init.contains("iconSize: [28, 28]"));
}

#[test]
fn legend_lists_every_bucket() {
    let grid = presets::preset("demo").unwrap();
    let doc = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    let html = Html::parse_document(&doc.html);

    let items: Vec<String> = select(&html, ".legend-item span").iter().map(text).collect();
    assert_eq!(
        items,
        vec![
            "Position #1",
            "Local Pack (2-3)",
            "Top 7 (4-7)",
            "Top 10 (8-10)",
            "Page 1 (11-20)",
            "Page 2+ (21+)",
            "Not found"
        ]
    );
    let swatches = select(&html, ".legend-color");
    assert!(swatches[0].value().attr("style").unwrap().contains("#27ae60"));
    assert!(swatches[6].value().attr("style").unwrap().contains("#95a5a6"));
}

#[test]
fn injected_markup_stays_text() {
    let mut grid = presets::preset("small").unwrap();
    grid.business = "<img src=x onerror=alert(1)>".into();
    grid.keyword = "</script><script>alert(2)</script>".into();
    let opts = RenderOptions { brand_text: "<i>evil</i>".into(), ..Default::default() };

    let doc = report::generate_on(&grid, &opts, date()).unwrap();
    let html = Html::parse_document(&doc.html);

    assert!(select(&html, "img").is_empty());
    assert!(select(&html, "i").is_empty());
    assert_eq!(select(&html, "script").len(), 2);
    assert_eq!(text(&select(&html, ".header h1")[0]), "<img src=x onerror=alert(1)>");
    assert_eq!(text(&select(&html, ".footer .brand")[0]), "Powered by <i>evil</i>");
}

#[test]
fn theme_changes_chrome_only() {
    let grid = presets::preset("small").unwrap();
    let dark = report::generate_on(&grid, &RenderOptions { theme: Theme::Dark, ..Default::default() }, date()).unwrap();
    let light = report::generate_on(&grid, &RenderOptions { theme: Theme::Light, ..Default::default() }, date()).unwrap();

    assert_ne!(dark.html, light.html);
    let marker_json = |html: &str| {
        let start = html.find("var points = ").unwrap();
        let end = html[start..].find(";\n").unwrap();
        html[start..start + end].to_string()
    };
    assert_eq!(marker_json(&dark.html), marker_json(&light.html));
}

#[test]
fn markup_is_deterministic_for_a_fixed_date() {
    let grid = presets::preset("demo").unwrap();
    let a = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    let b = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    assert_eq!(a.html, b.html);
}

fn golden_path(name: &str) -> PathBuf {
    let mut p = PathBuf::from("tests/goldens/expected");
    p.push(name);
    p
}

/// Everything between `<body>` and the script tags: header, cards, legend, footer
fn body_markup(html: &str) -> &str {
    let start = html.find("<body>").expect("body tag");
    let end = html.find("  <script src=").expect("leaflet script tag");
    &html[start..end]
}

#[test]
fn golden_report_body() {
    let grid = presets::preset("small").unwrap();
    let doc = report::generate_on(&grid, &RenderOptions::default(), date()).unwrap();
    let body = body_markup(&doc.html);

    let expected_path = golden_path("small_report_body.html");
    if std::env::var("UPDATE_GOLDENS").is_ok() {
        fs::create_dir_all("tests/goldens/expected").ok();
        fs::write(&expected_path, body).expect("write golden");
        println!("Updated golden: {:?}", expected_path);
        return;
    }

    let expected = fs::read_to_string(&expected_path)
        .unwrap_or_else(|e| panic!("unable to read golden {:?}: {}", expected_path, e));
    assert_eq!(body.trim_end(), expected.replace("\r\n", "\n").trim_end());
}

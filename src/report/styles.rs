//! Stylesheet for the report chrome; marker colors come from the palette

use crate::model::Theme;

/// Chrome colors for one theme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeColors {
    pub background: &'static str,
    pub text: &'static str,
    pub header_bg: &'static str,
    pub header_text: &'static str,
    pub border: &'static str,
    pub metric_bg: &'static str,
}

pub fn theme_colors(theme: Theme) -> ThemeColors {
    match theme {
        Theme::Default => ThemeColors {
            background: "#ffffff",
            text: "#2c3e50",
            header_bg: "#34495e",
            header_text: "#ffffff",
            border: "#bdc3c7",
            metric_bg: "#ecf0f1",
        },
        Theme::Dark => ThemeColors {
            background: "#1a1a1a",
            text: "#ecf0f1",
            header_bg: "#2c3e50",
            header_text: "#ffffff",
            border: "#34495e",
            metric_bg: "#2c3e50",
        },
        Theme::Light => ThemeColors {
            background: "#f8f9fa",
            text: "#2c3e50",
            header_bg: "#3498db",
            header_text: "#ffffff",
            border: "#dee2e6",
            metric_bg: "#ffffff",
        },
    }
}

const STYLESHEET: &str = r#"
    * { margin: 0; padding: 0; box-sizing: border-box; }

    body {
      font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, 'Helvetica Neue', Arial, sans-serif;
      background-color: {{BACKGROUND}};
      color: {{TEXT}};
      line-height: 1.6;
    }

    .container { width: 100%; max-width: 100%; }

    .header {
      background: {{HEADER_BG}};
      color: {{HEADER_TEXT}};
      padding: 20px;
      text-align: center;
    }
    .header h1 { font-size: 24px; font-weight: 600; margin-bottom: 8px; }
    .header .subtitle { font-size: 16px; opacity: 0.9; margin-bottom: 8px; }
    .header .metadata { font-size: 13px; opacity: 0.8; }

    .metrics {
      display: grid;
      grid-template-columns: repeat(4, 1fr);
      gap: 16px;
      padding: 20px;
      background: {{METRIC_BG}};
    }
    .metric-card {
      text-align: center;
      padding: 16px;
      border-radius: 8px;
      border: 1px solid {{BORDER}};
      background: {{BACKGROUND}};
    }
    .metric-card .label {
      font-size: 13px;
      color: #7f8c8d;
      margin-bottom: 8px;
      text-transform: uppercase;
      font-weight: 500;
      letter-spacing: 0.5px;
    }
    .metric-card .value { font-size: 28px; font-weight: 700; color: #2c3e50; }
    .metric-card.georank .value { color: #3498db; }
    .metric-card.position .value { color: #e67e22; }
    .metric-card.localpack .value { color: #27ae60; }
    .metric-card.coverage .value { color: #9b59b6; }

    .map-container { position: relative; padding: 20px; }
    #map {
      width: 100%;
      height: 500px;
      border-radius: 8px;
      border: 2px solid {{BORDER}};
      box-shadow: 0 2px 8px rgba(0,0,0,0.1);
    }

    .legend {
      margin-top: 20px;
      padding: 16px;
      background: {{BACKGROUND}};
      border: 1px solid {{BORDER}};
      border-radius: 8px;
    }
    .legend h3 { font-size: 16px; margin-bottom: 12px; color: {{TEXT}}; }
    .legend-items {
      display: grid;
      grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
      gap: 8px;
    }
    .legend-item { display: flex; align-items: center; gap: 8px; font-size: 13px; }
    .legend-color { width: 24px; height: 24px; border-radius: 4px; border: 1px solid rgba(0,0,0,0.1); }

    .footer {
      padding: 16px 20px;
      text-align: center;
      border-top: 1px solid {{BORDER}};
      font-size: 12px;
      color: #7f8c8d;
    }
    .footer .brand { font-weight: 600; color: {{TEXT}}; }

    .custom-marker {
      background-color: #fff;
      border-radius: 50%;
      border: 2px solid #fff;
      box-shadow: 0 2px 8px rgba(0,0,0,0.3);
      display: flex;
      align-items: center;
      justify-content: center;
      font-weight: 700;
      font-size: 14px;
    }
    .business-marker { font-size: 24px; }
"#;

pub fn stylesheet(theme: Theme) -> String {
    let c = theme_colors(theme);
    STYLESHEET
        .replace("{{BACKGROUND}}", c.background)
        .replace("{{TEXT}}", c.text)
        .replace("{{HEADER_BG}}", c.header_bg)
        .replace("{{HEADER_TEXT}}", c.header_text)
        .replace("{{BORDER}}", c.border)
        .replace("{{METRIC_BG}}", c.metric_bg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_token_is_filled() {
        for theme in [Theme::Default, Theme::Dark, Theme::Light] {
            let css = stylesheet(theme);
            assert!(!css.contains("{{"), "unfilled token for {:?}", theme);
            assert!(css.contains(theme_colors(theme).background));
        }
    }

    #[test]
    fn themes_differ_only_in_chrome() {
        let dark = stylesheet(Theme::Dark);
        let light = stylesheet(Theme::Light);
        assert_ne!(dark, light);
        assert!(dark.contains("#1a1a1a"));
        assert!(light.contains("background: #3498db;"));
        assert!(!stylesheet(Theme::Default).contains("background: #3498db;"));
    }
}

//! GeoGrid Render
//!
//! Turns a local-search ranking grid (a business, a keyword, a center
//! coordinate and the rank observed at every grid point) into a map report
//! image captured from a headless browser.
//!
//! # Pipeline
//!
//! - [`geo`] lays out the grid coordinates
//! - [`metrics`] and [`palette`] summarise and classify the ranks
//! - [`report`] generates the self-contained HTML document
//! - [`pool`] owns the browser and its pages
//! - [`capture`] loads the document, waits for it to settle and takes the screenshot
//!
//! The browser is reached through the [`engine`] traits; the `cdp` feature
//! (default) provides a Chrome DevTools implementation.
//!
//! # Example
//!
//! ```no_run
//! use geogrid_render::{presets, EngineConfig, RenderOptions, Renderer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let renderer = Renderer::chrome(EngineConfig::from_env()?);
//! let grid = presets::preset("small")?;
//! let image = renderer.render_image(&grid, &RenderOptions::default()).await?;
//! std::fs::write("grid.png", &image.bytes)?;
//! renderer.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod grid;
pub mod metrics;
pub mod model;
pub mod palette;
pub mod pool;
pub mod presets;
pub mod report;

pub use capture::{Capture, CaptureState, Capturer};
pub use config::{CaptureTimings, EngineConfig, Viewport};
pub use error::{Error, Result, ValidationIssue};
pub use metrics::Metrics;
pub use model::{GridConfig, ImageFormat, Position, RenderOptions, Theme};
pub use pool::{BrowserPool, PageLease, PoolStats};

use base64::Engine as Base64Engine;
use engine::Driver;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

/// Captured image plus the headers a front end should send with it
#[derive(Debug, Clone)]
pub struct ImageResponse {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub headers: Vec<(&'static str, String)>,
    pub metrics: Metrics,
    pub capture: CaptureInfo,
}

impl ImageResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Capture details without the bytes
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureInfo {
    /// Milliseconds
    pub render_time: u64,
    pub size: usize,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Metadata block of an [`EncodedResponse`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedMetadata {
    /// Milliseconds
    pub render_time: u64,
    pub size: usize,
    pub format: ImageFormat,
    pub grid_points: usize,
}

/// Base64 image with metadata and the full metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedResponse {
    pub success: bool,
    pub data: String,
    pub metadata: EncodedMetadata,
    pub metrics: Metrics,
}

/// Check a grid and its render options together
///
/// # Errors
///
/// [`Error::Validation`] carrying the issues of both inputs.
pub fn validate(grid: &GridConfig, options: &RenderOptions) -> Result<()> {
    let mut issues = Vec::new();
    for outcome in [grid.validate(), options.validate()] {
        if let Err(e) = outcome {
            issues.extend_from_slice(e.issues());
        }
    }
    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(issues))
    }
}

fn internal(e: Error) -> Error {
    match e {
        Error::Internal(_) => e,
        other => Error::Internal(format!("Report generation failed: {}", other)),
    }
}

/// The rendering pipeline: validation, markup, capture
#[derive(Clone)]
pub struct Renderer {
    pool: BrowserPool,
    capturer: Capturer,
}

impl Renderer {
    /// Build a renderer over any driver and start the pool sweep
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        let pool = BrowserPool::new(driver, config);
        pool.start_sweeper();
        let capturer = Capturer::new(pool.clone());
        Self { pool, capturer }
    }

    /// Renderer backed by headless Chrome
    #[cfg(feature = "cdp")]
    pub fn chrome(config: EngineConfig) -> Self {
        let driver = engine::cdp::ChromeDriver::new(config.clone());
        Self::new(Arc::new(driver), config)
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    async fn capture(&self, grid: &GridConfig, options: &RenderOptions) -> Result<(Capture, Metrics)> {
        validate(grid, options)?;
        debug!(
            "Rendering '{}' for '{}' ({}x{} grid, {})",
            grid.keyword, grid.business, grid.grid_size, grid.grid_size, options.format
        );
        let document = report::generate(grid, options).map_err(internal)?;
        let capture = self.capturer.capture(&document.html, options).await?;
        Ok((capture, document.grid.metrics))
    }

    /// Render to raw image bytes
    ///
    /// # Errors
    ///
    /// Validation errors come first; capture errors keep their kind.
    pub async fn render_image(&self, grid: &GridConfig, options: &RenderOptions) -> Result<ImageResponse> {
        let (capture, metrics) = self.capture(grid, options).await?;
        let info = capture_info(&capture);

        let headers = vec![
            ("Content-Type", capture.format.content_type().to_string()),
            ("X-Render-Time", format!("{}ms", info.render_time)),
            ("X-Grid-Points", metrics.total_points.to_string()),
            ("X-GeoRank", metrics.formatted_geo_rank()),
        ];
        info!("Rendered image for '{}' ({} bytes)", grid.business, capture.size);

        Ok(ImageResponse {
            content_type: capture.format.content_type(),
            bytes: capture.bytes,
            headers,
            metrics,
            capture: info,
        })
    }

    /// Render to a base64 payload with metadata
    pub async fn render_encoded(&self, grid: &GridConfig, options: &RenderOptions) -> Result<EncodedResponse> {
        let (capture, metrics) = self.capture(grid, options).await?;
        let info = capture_info(&capture);
        let data = base64::engine::general_purpose::STANDARD.encode(&capture.bytes);
        info!("Rendered encoded image for '{}' ({} bytes)", grid.business, capture.size);

        Ok(EncodedResponse {
            success: true,
            data,
            metadata: EncodedMetadata {
                render_time: info.render_time,
                size: info.size,
                format: info.format,
                grid_points: metrics.total_points,
            },
            metrics,
        })
    }

    /// The report HTML without capturing it
    pub fn preview(&self, grid: &GridConfig, options: &RenderOptions) -> Result<String> {
        preview(grid, options)
    }

    pub async fn health(&self) -> PoolStats {
        self.pool.stats().await
    }

    /// Launch the engine if needed and report the pool once it answers
    ///
    /// # Errors
    ///
    /// [`Error::EngineUnavailable`] when no engine can be launched.
    pub async fn ready(&self) -> Result<PoolStats> {
        self.pool.acquire().await?;
        Ok(self.pool.stats().await)
    }

    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Validate and generate the report HTML; no browser involved
pub fn preview(grid: &GridConfig, options: &RenderOptions) -> Result<String> {
    validate(grid, options)?;
    report::generate(grid, options).map(|d| d.html).map_err(internal)
}

fn capture_info(capture: &Capture) -> CaptureInfo {
    CaptureInfo {
        render_time: capture.render_time.as_millis() as u64,
        size: capture.size,
        format: capture.format,
        width: capture.width,
        height: capture.height,
    }
}

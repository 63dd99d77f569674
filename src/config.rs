//! Engine, pool and capture configuration
//!
//! Every knob has a default; [`EngineConfig::from_env`] overlays environment
//! variables on top of those defaults.

use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Bounds applied by the capture orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTimings {
    /// Upper bound for loading the document into a page
    pub navigation_timeout: Duration,
    /// Upper bound for the document to raise its ready or error flag
    pub ready_timeout: Duration,
    /// Pause after the ready flag so tile compositing can finish
    pub settle_delay: Duration,
    /// Interval between flag probes
    pub poll_interval: Duration,
}

impl Default for CaptureTimings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(30000),
            ready_timeout: Duration::from_millis(15000),
            settle_delay: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Configuration for the rendering engine and its page pool
///
/// # Examples
///
/// ```
/// let cfg = geogrid_render::EngineConfig::default();
/// assert_eq!(cfg.max_pages, 10);
/// assert!(cfg.headless);
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Chrome/Chromium binary; autodetected when `None`
    pub executable_path: Option<PathBuf>,
    /// Run without a visible window
    pub headless: bool,
    /// Keep Chrome's sandbox enabled
    pub sandbox: bool,
    /// Initial browser window size
    pub window: Viewport,
    /// Extra command-line switches passed to the browser
    pub launch_args: Vec<String>,
    /// How long an idle DevTools connection is kept before the browser is dropped
    pub idle_browser_timeout: Duration,
    /// Tracked pages allowed before the sweep evicts the oldest
    pub max_pages: usize,
    /// Period of the overflow sweep
    pub sweep_interval: Duration,
    /// Capture bounds (navigation timeout is also the page default timeout)
    pub timings: CaptureTimings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: false,
            window: Viewport::default(),
            launch_args: [
                "--disable-dev-shm-usage",
                "--disable-accelerated-2d-canvas",
                "--disable-gpu",
                "--disable-web-security",
                "--disable-features=IsolateOrigins,site-per-process",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            idle_browser_timeout: Duration::from_secs(600),
            max_pages: 10,
            sweep_interval: Duration::from_millis(300000),
            timings: CaptureTimings::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with environment variables
    ///
    /// Recognized: `CHROME_EXECUTABLE_PATH`, `BROWSER_HEADLESS`,
    /// `BROWSER_SANDBOX`, `NAVIGATION_TIMEOUT_MS`, `BROWSER_MAX_PAGES`,
    /// `BROWSER_SWEEP_INTERVAL_MS`, `BROWSER_IDLE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`] but reads from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(path) = lookup("CHROME_EXECUTABLE_PATH").filter(|p| !p.trim().is_empty()) {
            cfg.executable_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(v) = lookup("BROWSER_HEADLESS") {
            // Only an explicit "false" turns headless off
            cfg.headless = v.trim() != "false";
        }
        if let Some(v) = lookup("BROWSER_SANDBOX") {
            cfg.sandbox = v.trim() == "true";
        }
        if let Some(ms) = parse_number::<u64>(&lookup, "NAVIGATION_TIMEOUT_MS")? {
            if ms == 0 {
                return Err(Error::Config("NAVIGATION_TIMEOUT_MS must be greater than 0".into()));
            }
            cfg.timings.navigation_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_number::<usize>(&lookup, "BROWSER_MAX_PAGES")? {
            if n == 0 {
                return Err(Error::Config("BROWSER_MAX_PAGES must be at least 1".into()));
            }
            cfg.max_pages = n;
        }
        if let Some(ms) = parse_number::<u64>(&lookup, "BROWSER_SWEEP_INTERVAL_MS")? {
            if ms == 0 {
                return Err(Error::Config("BROWSER_SWEEP_INTERVAL_MS must be greater than 0".into()));
            }
            cfg.sweep_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_number::<u64>(&lookup, "BROWSER_IDLE_TIMEOUT_MS")? {
            cfg.idle_browser_timeout = Duration::from_millis(ms);
        }

        Ok(cfg)
    }
}

pub(crate) fn parse_number<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} must be a number ({}): {}", key, raw, e))),
    }
}

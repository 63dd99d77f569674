//! Rendering engine seam
//!
//! The pool and the capture orchestrator only talk to the external engine
//! through these traits. Implementations:
//!
//! - [`cdp::ChromeDriver`] drives a real Chrome/Chromium over the DevTools
//!   protocol (feature `cdp`)
//! - [`scripted::ScriptedDriver`] is an in-memory engine with scripted
//!   document behavior, used by the tests and for dry runs
//!
//! Every method is blocking. Async callers go through [`run_blocking`].

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod scripted;

use crate::config::Viewport;
use crate::model::ImageFormat;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;

/// Resource classes a page may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Document,
    Script,
    Stylesheet,
    Xhr,
    Fetch,
    Image,
    Font,
    Media,
    WebSocket,
    Other,
}

impl ResourceClass {
    /// Map a DevTools `Network.ResourceType` name
    pub fn from_protocol(name: &str) -> Self {
        match name {
            "Document" => ResourceClass::Document,
            "Script" => ResourceClass::Script,
            "Stylesheet" => ResourceClass::Stylesheet,
            "XHR" => ResourceClass::Xhr,
            "Fetch" => ResourceClass::Fetch,
            "Image" => ResourceClass::Image,
            "Font" => ResourceClass::Font,
            "Media" => ResourceClass::Media,
            "WebSocket" => ResourceClass::WebSocket,
            _ => ResourceClass::Other,
        }
    }
}

/// Which resource classes a page is allowed to load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFilter {
    allowed: Vec<ResourceClass>,
}

impl ResourceFilter {
    pub fn allowing(allowed: &[ResourceClass]) -> Self {
        Self { allowed: allowed.to_vec() }
    }

    pub fn allows(&self, class: ResourceClass) -> bool {
        self.allowed.contains(&class)
    }
}

impl Default for ResourceFilter {
    /// Documents, scripts, stylesheets, XHR, fetch and images (map tiles)
    fn default() -> Self {
        Self::allowing(&[
            ResourceClass::Document,
            ResourceClass::Script,
            ResourceClass::Stylesheet,
            ResourceClass::Xhr,
            ResourceClass::Fetch,
            ResourceClass::Image,
        ])
    }
}

/// Settings applied to every new page
#[derive(Debug, Clone, PartialEq)]
pub struct PageSetup {
    /// Default timeout for navigation and protocol waits
    pub navigation_timeout: Duration,
    pub filter: ResourceFilter,
}

/// Rectangle to capture, in CSS pixels from the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clip {
    pub width: u32,
    pub height: u32,
}

/// One raster extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub format: ImageFormat,
    /// Only meaningful for lossy formats
    pub quality: Option<u8>,
    pub clip: Clip,
}

/// Launches engine instances
pub trait Driver: Send + Sync {
    /// Start a new engine
    ///
    /// # Errors
    ///
    /// [`Error::EngineUnavailable`] when the engine cannot be started.
    fn launch(&self) -> Result<Arc<dyn BrowserHandle>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// A running engine instance
pub trait BrowserHandle: Send + Sync {
    /// Whether the engine still answers
    fn is_connected(&self) -> bool;

    /// Create an isolated page
    fn open_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageHandle>>;

    /// Tear the engine down; later calls are no-ops
    fn close(&self) -> Result<()>;
}

/// An isolated rendering context
pub trait PageHandle: Send + Sync {
    fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    /// Load a complete HTML document and wait for it to finish loading
    fn load_document(&self, html: &str) -> Result<()>;

    /// Evaluate an expression in the page and return its value
    fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Extract raster bytes
    fn capture(&self, request: &CaptureRequest) -> Result<Vec<u8>>;

    fn close(&self) -> Result<()>;
}

/// Run a blocking engine call on tokio's blocking pool
///
/// # Errors
///
/// Returns the call's own error, or [`Error::Internal`] if the blocking task
/// panicked or was cancelled.
pub async fn run_blocking<T, F>(what: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("Blocking task for {} failed: {}", what, e)))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_admits_map_resources_only() {
        let filter = ResourceFilter::default();
        for class in ["Document", "Script", "Stylesheet", "XHR", "Fetch", "Image"] {
            assert!(filter.allows(ResourceClass::from_protocol(class)), "{} should load", class);
        }
        for class in ["Font", "Media", "WebSocket", "Manifest", "Ping"] {
            assert!(!filter.allows(ResourceClass::from_protocol(class)), "{} should be blocked", class);
        }
    }

    #[tokio::test]
    async fn blocking_panics_become_internal() {
        let err = run_blocking::<(), _>("test", || panic!("boom")).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(run_blocking("test", || Ok(7)).await.unwrap(), 7);
    }
}

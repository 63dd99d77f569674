//! Chrome DevTools Protocol driver (uses the `headless_chrome` crate)

use super::{BrowserHandle, CaptureRequest, Driver, PageHandle, PageSetup, ResourceClass, ResourceFilter};
use crate::config::{EngineConfig, Viewport};
use crate::model::ImageFormat;
use crate::{Error, Result};
use base64::Engine as Base64Engine;
use headless_chrome::browser::tab::{EventListener, RequestInterceptor, RequestPausedDecision, Tab};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::protocol::cdp::Fetch::FailRequest;
use headless_chrome::protocol::cdp::{Emulation, Network, Page};
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info, warn};
use serde_json::json;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const READY_STATE_POLL: Duration = Duration::from_millis(50);

/// Launches headless Chrome instances
pub struct ChromeDriver {
    config: EngineConfig,
}

impl ChromeDriver {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn launch_options(&self) -> Result<LaunchOptions<'_>> {
        let args: Vec<&OsStr> = self.config.launch_args.iter().map(OsStr::new).collect();

        LaunchOptions::default_builder()
            .headless(self.config.headless)
            .sandbox(self.config.sandbox)
            .window_size(Some((self.config.window.width, self.config.window.height)))
            .path(self.config.executable_path.clone())
            .idle_browser_timeout(self.config.idle_browser_timeout)
            .args(args)
            .build()
            .map_err(|e| Error::EngineUnavailable(format!("Failed to build launch options: {}", e)))
    }
}

impl Driver for ChromeDriver {
    fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        let options = self.launch_options()?;
        let browser =
            Browser::new(options).map_err(|e| Error::EngineUnavailable(format!("Failed to launch browser: {}", e)))?;

        match browser.get_version() {
            Ok(v) => info!("Browser launched ({})", v.product),
            Err(e) => warn!("Browser launched but version query failed: {}", e),
        }

        Ok(Arc::new(ChromeBrowser { browser: Mutex::new(Some(browser)) }))
    }

    fn name(&self) -> &'static str {
        "chrome"
    }
}

/// A running Chrome; `None` once closed
struct ChromeBrowser {
    browser: Mutex<Option<Browser>>,
}

impl ChromeBrowser {
    fn with_browser<T>(&self, f: impl FnOnce(&Browser) -> Result<T>) -> Result<T> {
        let guard = self
            .browser
            .lock()
            .map_err(|_| Error::Internal("browser lock poisoned".into()))?;
        match guard.as_ref() {
            Some(browser) => f(browser),
            None => Err(Error::Browser("Browser has been closed".into())),
        }
    }
}

impl BrowserHandle for ChromeBrowser {
    fn is_connected(&self) -> bool {
        self.with_browser(|b| {
            b.get_version()
                .map(|_| ())
                .map_err(|e| Error::Browser(format!("Version query failed: {}", e)))
        })
        .is_ok()
    }

    fn open_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageHandle>> {
        let tab = self.with_browser(|b| {
            b.new_tab()
                .map_err(|e| Error::Browser(format!("Failed to create tab: {}", e)))
        })?;

        tab.set_default_timeout(setup.navigation_timeout);
        install_filter(&tab, setup.filter.clone())?;
        let network_idle = watch_lifecycle(&tab)?;

        Ok(Arc::new(ChromePage {
            tab,
            navigation_timeout: setup.navigation_timeout,
            network_idle,
        }))
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| Error::Internal("browser lock poisoned".into()))?;
        // dropping the Browser kills the process
        if guard.take().is_some() {
            info!("Browser closed");
        }
        Ok(())
    }
}

fn resource_class(event: &RequestPausedEvent) -> ResourceClass {
    match serde_json::to_value(&event.params.resource_Type) {
        Ok(serde_json::Value::String(name)) => ResourceClass::from_protocol(&name),
        _ => ResourceClass::Other,
    }
}

fn install_filter(tab: &Arc<Tab>, filter: ResourceFilter) -> Result<()> {
    tab.enable_fetch(None, Some(false))
        .map_err(|e| Error::Browser(format!("Failed to enable fetch domain: {}", e)))?;

    let interceptor: Arc<dyn RequestInterceptor + Send + Sync> = Arc::new(
        move |_transport, _session_id, event: RequestPausedEvent| {
            let class = resource_class(&event);
            if filter.allows(class) {
                RequestPausedDecision::Continue(None)
            } else {
                debug!("Blocked {:?} request to {}", class, event.params.request.url);
                RequestPausedDecision::Fail(FailRequest {
                    request_id: event.params.request_id.clone(),
                    error_reason: Network::ErrorReason::BlockedByClient,
                })
            }
        },
    );

    tab.enable_request_interception(interceptor)
        .map_err(|e| Error::Browser(format!("Failed to enable request interception: {}", e)))?;
    Ok(())
}

/// Track the main document's lifecycle: `init` starts a new document,
/// `networkIdle` fires once no request has been in flight for 500ms
fn apply_lifecycle(name: &str, idle: &AtomicBool) {
    match name {
        "init" => idle.store(false, Ordering::SeqCst),
        "networkIdle" => idle.store(true, Ordering::SeqCst),
        _ => {}
    }
}

fn watch_lifecycle(tab: &Arc<Tab>) -> Result<Arc<AtomicBool>> {
    tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })
        .map_err(|e| Error::Browser(format!("Failed to enable lifecycle events: {}", e)))?;

    let idle = Arc::new(AtomicBool::new(false));
    let flag = idle.clone();
    let listener: Arc<dyn EventListener<Event> + Send + Sync> = Arc::new(move |event: &Event| {
        if let Event::PageLifecycleEvent(lifecycle) = event {
            apply_lifecycle(&lifecycle.params.name, &flag);
        }
    });
    tab.add_event_listener(listener)
        .map_err(|e| Error::Browser(format!("Failed to listen for lifecycle events: {}", e)))?;
    Ok(idle)
}

struct ChromePage {
    tab: Arc<Tab>,
    navigation_timeout: Duration,
    /// Set by the lifecycle listener; reset before each navigation
    network_idle: Arc<AtomicBool>,
}

impl ChromePage {
    fn ready_state(&self) -> Result<String> {
        let value = self.evaluate("document.readyState")?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

impl PageHandle for ChromePage {
    fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let params: Emulation::SetDeviceMetricsOverride = serde_json::from_value(json!({
            "width": viewport.width,
            "height": viewport.height,
            "deviceScaleFactor": 1,
            "mobile": false,
        }))
        .map_err(|e| Error::Internal(format!("Failed to build viewport parameters: {}", e)))?;

        self.tab
            .call_method(params)
            .map_err(|e| Error::Browser(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    fn load_document(&self, html: &str) -> Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(html.as_bytes());
        let url = format!("data:text/html;charset=utf-8;base64,{}", encoded);

        self.network_idle.store(false, Ordering::SeqCst);
        self.tab
            .navigate_to(&url)
            .map_err(|e| Error::Browser(format!("Navigation failed: {}", e)))?;
        self.tab
            .wait_until_navigated()
            .map_err(|e| Error::Browser(format!("Wait for navigation failed: {}", e)))?;

        // scripts, tiles and fetches started by the page finish after the navigation event
        let deadline = Instant::now() + self.navigation_timeout;
        loop {
            if self.network_idle.load(Ordering::SeqCst) && self.ready_state()? == "complete" {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout {
                    stage: "loading the document",
                    ms: self.navigation_timeout.as_millis() as u64,
                });
            }
            std::thread::sleep(READY_STATE_POLL);
        }
    }

    fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| Error::Browser(format!("Evaluation failed: {}", e)))?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn capture(&self, request: &CaptureRequest) -> Result<Vec<u8>> {
        let format = match request.format {
            ImageFormat::Png => Page::CaptureScreenshotFormatOption::Png,
            ImageFormat::Jpeg => Page::CaptureScreenshotFormatOption::Jpeg,
            ImageFormat::Webp => Page::CaptureScreenshotFormatOption::Webp,
        };
        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(request.clip.width),
            height: f64::from(request.clip.height),
            scale: 1.0,
        };

        self.tab
            .capture_screenshot(format, request.quality.map(u32::from), Some(clip), true)
            .map_err(|e| Error::Browser(format!("Screenshot failed: {}", e)))
    }

    fn close(&self) -> Result<()> {
        self.tab
            .close(false)
            .map(|_| ())
            .map_err(|e| Error::Browser(format!("Failed to close tab: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_tracks_network_idle() {
        let idle = AtomicBool::new(false);
        apply_lifecycle("DOMContentLoaded", &idle);
        apply_lifecycle("load", &idle);
        assert!(!idle.load(Ordering::SeqCst));

        apply_lifecycle("networkIdle", &idle);
        assert!(idle.load(Ordering::SeqCst));

        // a new document starts busy again
        apply_lifecycle("init", &idle);
        assert!(!idle.load(Ordering::SeqCst));
    }
}

//! Capture orchestration
//!
//! One capture walks a fixed sequence of states:
//!
//! ```text
//! Acquiring -> ContentLoading -> AwaitingReady -> Measuring -> Capturing -> Released
//!      \              \                 \               \            \
//!       +--------------+-----------------+---------------+------------+--> TimedOut | Failed
//! ```
//!
//! Every engine call is bounded by a timeout. The page is released exactly
//! once whichever state the capture ends in.

use crate::config::{CaptureTimings, Viewport};
use crate::engine::{run_blocking, CaptureRequest, Clip, PageHandle};
use crate::model::{ImageFormat, RenderOptions};
use crate::pool::{BrowserPool, PageLease};
use crate::report::{DocumentSignal, CONTENT_HEIGHT_PROBE, SIGNAL_PROBE};
use crate::{Error, Result};
use log::{debug, error, info};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a capture currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Acquiring,
    ContentLoading,
    AwaitingReady,
    Measuring,
    Capturing,
    Released,
    TimedOut,
    Failed,
}

impl CaptureState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureState::Released | CaptureState::TimedOut | CaptureState::Failed)
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Acquiring => "acquiring",
            CaptureState::ContentLoading => "content-loading",
            CaptureState::AwaitingReady => "awaiting-ready",
            CaptureState::Measuring => "measuring",
            CaptureState::Capturing => "capturing",
            CaptureState::Released => "released",
            CaptureState::TimedOut => "timed-out",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A successful capture
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub bytes: Vec<u8>,
    /// Wall time from acquiring the page to having the bytes
    pub render_time: Duration,
    pub size: usize,
    pub format: ImageFormat,
    pub width: u32,
    /// Final height, larger than requested when the content overflowed
    pub height: u32,
}

/// Runs captures against a pool
#[derive(Clone)]
pub struct Capturer {
    pool: BrowserPool,
    timings: CaptureTimings,
}

struct Tracker {
    page: u64,
    state: CaptureState,
}

impl Tracker {
    fn enter(&mut self, next: CaptureState) {
        debug!("Capture on page {}: {} -> {}", self.page, self.state, next);
        self.state = next;
    }
}

impl Capturer {
    /// Use the pool's configured timings
    pub fn new(pool: BrowserPool) -> Self {
        let timings = pool.config().timings;
        Self { pool, timings }
    }

    pub fn with_timings(pool: BrowserPool, timings: CaptureTimings) -> Self {
        Self { pool, timings }
    }

    pub fn timings(&self) -> &CaptureTimings {
        &self.timings
    }

    /// Load `html` into a fresh page and capture it
    ///
    /// # Errors
    ///
    /// - [`Error::EngineUnavailable`] if no page could be acquired
    /// - [`Error::Timeout`] if a stage exceeded its bound
    /// - [`Error::Render`] if the document raised its error flag or the capture was empty
    /// - [`Error::Browser`] if the engine failed or disconnected mid-capture
    pub async fn capture(&self, html: &str, options: &RenderOptions) -> Result<Capture> {
        let started = Instant::now();
        debug!("Capture: {}", CaptureState::Acquiring);

        let lease = match self.pool.new_page().await {
            Ok(lease) => lease,
            Err(e) => {
                error!("Capture failed while {}: {}", CaptureState::Acquiring, e);
                return Err(match e {
                    Error::EngineUnavailable(_) => e,
                    other => Error::EngineUnavailable(format!("Failed to acquire a page: {}", other)),
                });
            }
        };

        let mut tracker = Tracker { page: lease.id(), state: CaptureState::Acquiring };
        let outcome = self.drive(&lease, html, options, &mut tracker).await;
        lease.release().await;

        match outcome {
            Ok((bytes, height)) => {
                tracker.enter(CaptureState::Released);
                let render_time = started.elapsed();
                info!(
                    "Captured {}x{} {} ({} bytes) in {}ms",
                    options.width,
                    height,
                    options.format,
                    bytes.len(),
                    render_time.as_millis()
                );
                Ok(Capture {
                    size: bytes.len(),
                    bytes,
                    render_time,
                    format: options.format,
                    width: options.width,
                    height,
                })
            }
            Err(e) => {
                let failed_in = tracker.state;
                let e = self.classify(e).await;
                tracker.enter(if e.is_timeout() { CaptureState::TimedOut } else { CaptureState::Failed });
                error!("Capture failed while {}: {}", failed_in, e);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        lease: &PageLease,
        html: &str,
        options: &RenderOptions,
        tracker: &mut Tracker,
    ) -> Result<(Vec<u8>, u32)> {
        let page = lease.page();
        let bound = self.timings.navigation_timeout;

        tracker.enter(CaptureState::ContentLoading);
        let viewport = Viewport { width: options.width, height: options.height };
        let p = page.clone();
        bounded("setting the viewport", bound, move || p.set_viewport(viewport)).await?;
        let p = page.clone();
        let document = html.to_string();
        bounded("loading the document", bound, move || p.load_document(&document)).await?;

        tracker.enter(CaptureState::AwaitingReady);
        self.wait_for_signal(&page).await?;
        if !self.timings.settle_delay.is_zero() {
            tokio::time::sleep(self.timings.settle_delay).await;
        }

        tracker.enter(CaptureState::Measuring);
        let p = page.clone();
        let measured = bounded("measuring the content", bound, move || p.evaluate(CONTENT_HEIGHT_PROBE)).await?;
        let content_height = measured.as_f64().map(|h| h.ceil().max(0.0) as u32).unwrap_or(0);
        let height = if content_height > options.height {
            debug!("Content is {}px tall; growing viewport from {}px", content_height, options.height);
            let p = page.clone();
            let grown = Viewport { width: options.width, height: content_height };
            bounded("resizing the viewport", bound, move || p.set_viewport(grown)).await?;
            content_height
        } else {
            options.height
        };

        tracker.enter(CaptureState::Capturing);
        let request = CaptureRequest {
            format: options.format,
            quality: options.effective_quality(),
            clip: Clip { width: options.width, height },
        };
        let p = page.clone();
        let bytes = bounded("capturing the screenshot", bound, move || p.capture(&request)).await?;
        if bytes.is_empty() {
            return Err(Error::Render("Screenshot produced no data".into()));
        }
        Ok((bytes, height))
    }

    /// Wait until the document raises its ready or error flag
    ///
    /// # Errors
    ///
    /// [`Error::Render`] carrying the document's message, or
    /// [`Error::Timeout`] once the ready bound has elapsed.
    pub async fn wait_for_signal(&self, page: &Arc<dyn PageHandle>) -> Result<()> {
        let bound = self.timings.ready_timeout;
        match tokio::time::timeout(bound, self.poll_signal(page)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                stage: "waiting for the ready flag",
                ms: bound.as_millis() as u64,
            }),
        }
    }

    async fn poll_signal(&self, page: &Arc<dyn PageHandle>) -> Result<()> {
        loop {
            let p = page.clone();
            let value = run_blocking("reading the ready flag", move || p.evaluate(SIGNAL_PROBE)).await?;
            match DocumentSignal::from_probe(&value) {
                DocumentSignal::Ready => return Ok(()),
                DocumentSignal::Failed(msg) => return Err(Error::Render(msg)),
                DocumentSignal::Pending => tokio::time::sleep(self.timings.poll_interval).await,
            }
        }
    }

    /// Unclassified failures while the engine is gone are reported as browser errors
    async fn classify(&self, e: Error) -> Error {
        match e {
            Error::Internal(msg) if !self.pool.is_connected().await => {
                Error::Browser(format!("Browser disconnected during capture: {}", msg))
            }
            other => other,
        }
    }
}

async fn bounded<T, F>(stage: &'static str, bound: Duration, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::time::timeout(bound, run_blocking(stage, f)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { stage, ms: bound.as_millis() as u64 }),
    }
}

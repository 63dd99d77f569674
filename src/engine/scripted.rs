//! Deterministic in-memory engine
//!
//! [`ScriptedDriver`] never touches a real browser. Each page follows a
//! [`PageScript`] that decides how the document signals completion, how tall
//! its content is, and where (if anywhere) it fails. A [`Probe`] shared with
//! the driver records what happened so tests can assert on page lifecycles.

use super::{BrowserHandle, CaptureRequest, Driver, PageHandle, PageSetup};
use crate::config::Viewport;
use crate::model::ImageFormat;
use crate::report::{CONTENT_HEIGHT_PROBE, SIGNAL_PROBE};
use crate::{Error, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How the loaded document reports completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Ready on the first probe
    Ready,
    /// Ready after this many pending probes
    ReadyAfter(u32),
    /// Error flag carrying a message
    Error(String),
    /// Neither flag is ever raised
    Never,
}

/// Page operation at which a scripted failure is injected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    OpenPage,
    SetViewport,
    LoadDocument,
    Evaluate,
    Capture,
}

/// Behavior of every page the driver opens
#[derive(Debug, Clone)]
pub struct PageScript {
    pub signal: Signal,
    /// Value reported for the content height probe
    pub content_height: u32,
    /// Operation that returns a browser error
    pub fail_at: Option<FailPoint>,
    /// Operation that disconnects the whole engine, then errors
    pub disconnect_on: Option<FailPoint>,
    /// Time spent inside `load_document`
    pub load_delay: Duration,
    /// Return an empty buffer from `capture`
    pub empty_capture: bool,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            signal: Signal::Ready,
            content_height: 900,
            fail_at: None,
            disconnect_on: None,
            load_delay: Duration::ZERO,
            empty_capture: false,
        }
    }
}

/// A capture the scripted engine served
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub page: u64,
    pub request: CaptureRequest,
}

#[derive(Default)]
struct ProbeState {
    script: PageScript,
    /// Close count per opened page id
    closes: BTreeMap<u64, usize>,
    viewports: Vec<(u64, Viewport)>,
    setups: Vec<(u64, PageSetup)>,
    captures: Vec<CaptureRecord>,
    documents: Vec<String>,
}

/// Observation and control shared between a test and the driver
#[derive(Clone, Default)]
pub struct Probe {
    state: Arc<Mutex<ProbeState>>,
    launches: Arc<AtomicUsize>,
    fail_launch: Arc<AtomicBool>,
    next_page: Arc<AtomicU64>,
    /// Connection flag of the most recently launched engine
    current: Arc<Mutex<Option<Arc<AtomicBool>>>>,
}

impl Probe {
    fn state(&self) -> MutexGuard<'_, ProbeState> {
        // a test that panicked while holding the lock already failed
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Replace the script used by pages opened from now on
    pub fn set_script(&self, script: PageScript) {
        self.state().script = script;
    }

    pub fn script(&self) -> PageScript {
        self.state().script.clone()
    }

    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// Number of pages ever opened
    pub fn pages_opened(&self) -> usize {
        self.state().closes.len()
    }

    /// How many times each opened page was closed, by page id
    pub fn close_counts(&self) -> BTreeMap<u64, usize> {
        self.state().closes.clone()
    }

    /// Pages opened but never closed
    pub fn open_pages(&self) -> usize {
        self.state().closes.values().filter(|c| **c == 0).count()
    }

    pub fn viewports(&self) -> Vec<(u64, Viewport)> {
        self.state().viewports.clone()
    }

    /// Setup each opened page was created with, by page id
    pub fn setups(&self) -> Vec<(u64, PageSetup)> {
        self.state().setups.clone()
    }

    pub fn captures(&self) -> Vec<CaptureRecord> {
        self.state().captures.clone()
    }

    pub fn documents(&self) -> Vec<String> {
        self.state().documents.clone()
    }

    /// Drop the connection of the current engine, as if the process died
    pub fn disconnect(&self) {
        let current = match self.current.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(connected) = current {
            connected.store(false, Ordering::SeqCst);
        }
    }
}

/// Driver producing scripted engines
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    probe: Probe,
}

impl ScriptedDriver {
    pub fn new(script: PageScript) -> Self {
        let driver = Self::default();
        driver.probe.set_script(script);
        driver
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl Driver for ScriptedDriver {
    fn launch(&self) -> Result<Arc<dyn BrowserHandle>> {
        if self.probe.fail_launch.load(Ordering::SeqCst) {
            return Err(Error::EngineUnavailable("Scripted launch failure".into()));
        }
        self.probe.launches.fetch_add(1, Ordering::SeqCst);

        let browser = Arc::new(ScriptedBrowser {
            probe: self.probe.clone(),
            connected: Arc::new(AtomicBool::new(true)),
        });
        if let Ok(mut current) = self.probe.current.lock() {
            *current = Some(browser.connected.clone());
        }
        Ok(browser)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedBrowser {
    probe: Probe,
    connected: Arc<AtomicBool>,
}

impl ScriptedBrowser {
    fn check(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Browser("Target closed: browser disconnected".into()))
        }
    }
}

impl BrowserHandle for ScriptedBrowser {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn open_page(&self, setup: &PageSetup) -> Result<Arc<dyn PageHandle>> {
        self.check()?;
        let script = self.probe.script();
        if script.disconnect_on == Some(FailPoint::OpenPage) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::Browser("Target closed: browser disconnected".into()));
        }
        if script.fail_at == Some(FailPoint::OpenPage) {
            return Err(Error::Browser("Scripted failure opening page".into()));
        }

        let id = self.probe.next_page.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.probe.state();
            state.closes.insert(id, 0);
            state.setups.push((id, setup.clone()));
        }

        Ok(Arc::new(ScriptedPage {
            id,
            script,
            probe: self.probe.clone(),
            connected: self.connected.clone(),
            probes_seen: AtomicU64::new(0),
        }))
    }

    fn close(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedPage {
    id: u64,
    script: PageScript,
    probe: Probe,
    connected: Arc<AtomicBool>,
    probes_seen: AtomicU64,
}

impl ScriptedPage {
    fn step(&self, point: FailPoint) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::Browser("Target closed: browser disconnected".into()));
        }
        if self.script.disconnect_on == Some(point) {
            self.connected.store(false, Ordering::SeqCst);
            return Err(Error::Browser("Target closed: browser disconnected".into()));
        }
        if self.script.fail_at == Some(point) {
            return Err(Error::Browser(format!("Scripted failure at {:?}", point)));
        }
        Ok(())
    }

    fn signal(&self) -> Value {
        let seen = self.probes_seen.fetch_add(1, Ordering::SeqCst);
        let payload = match &self.script.signal {
            Signal::Ready => json!({ "ready": true }),
            Signal::ReadyAfter(n) if seen >= u64::from(*n) => json!({ "ready": true }),
            Signal::ReadyAfter(_) | Signal::Never => json!({ "pending": true }),
            Signal::Error(msg) => json!({ "error": msg }),
        };
        Value::String(payload.to_string())
    }
}

fn fake_image(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let mut bytes = match format {
        ImageFormat::Png => b"\x89PNG\r\n\x1a\n".to_vec(),
        ImageFormat::Jpeg => vec![0xFF, 0xD8, 0xFF, 0xE0],
        ImageFormat::Webp => b"RIFF\0\0\0\0WEBPVP8 ".to_vec(),
    };
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes
}

impl PageHandle for ScriptedPage {
    fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.step(FailPoint::SetViewport)?;
        self.probe.state().viewports.push((self.id, viewport));
        Ok(())
    }

    fn load_document(&self, html: &str) -> Result<()> {
        self.step(FailPoint::LoadDocument)?;
        if !self.script.load_delay.is_zero() {
            std::thread::sleep(self.script.load_delay);
        }
        self.probe.state().documents.push(html.to_string());
        Ok(())
    }

    fn evaluate(&self, expression: &str) -> Result<Value> {
        self.step(FailPoint::Evaluate)?;
        if expression == SIGNAL_PROBE {
            Ok(self.signal())
        } else if expression == CONTENT_HEIGHT_PROBE {
            Ok(json!(self.script.content_height))
        } else {
            Ok(Value::Null)
        }
    }

    fn capture(&self, request: &CaptureRequest) -> Result<Vec<u8>> {
        self.step(FailPoint::Capture)?;
        self.probe.state().captures.push(CaptureRecord { page: self.id, request: *request });
        if self.script.empty_capture {
            return Ok(Vec::new());
        }
        Ok(fake_image(request.format, request.clip.width, request.clip.height))
    }

    fn close(&self) -> Result<()> {
        if let Some(count) = self.probe.state().closes.get_mut(&self.id) {
            *count += 1;
        }
        Ok(())
    }
}

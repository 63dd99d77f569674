//! Browser pool: one engine handle plus the set of pages it has open
//!
//! The engine is launched lazily on the first [`BrowserPool::acquire`] and
//! relaunched transparently when a disconnect is noticed (on acquire or by
//! the periodic sweep). Pages are handed out as [`PageLease`]s. Every tracked
//! page is removed from the set under a single lock before it is closed, so
//! whichever path removes it (release, lease drop, sweep or shutdown) is the
//! only one that closes it.

use crate::config::EngineConfig;
use crate::engine::{run_blocking, BrowserHandle, Driver, PageHandle, PageSetup, ResourceFilter};
use crate::Result;
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;

type TrackedPages = BTreeMap<u64, Arc<dyn PageHandle>>;

/// Point-in-time view of the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub connected: bool,
    pub pages: usize,
    pub max_pages: usize,
    /// Seconds since the current engine was launched, 0 when none is running
    pub uptime_secs: u64,
    pub launches: usize,
}

struct PoolInner {
    driver: Arc<dyn Driver>,
    config: EngineConfig,
    browser: tokio::sync::Mutex<Option<Arc<dyn BrowserHandle>>>,
    launched_at: Mutex<Option<Instant>>,
    // ids grow monotonically, so the first entries are the oldest pages
    pages: Mutex<TrackedPages>,
    next_id: AtomicU64,
    launches: AtomicUsize,
    shutting_down: AtomicBool,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    // set once a sweep has been started; a relaunch after shutdown resumes it
    sweep_requested: AtomicBool,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.sweeper).take() {
            task.abort();
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared handle to the engine and its pages; clones share one pool
#[derive(Clone)]
pub struct BrowserPool {
    inner: Arc<PoolInner>,
}

impl BrowserPool {
    /// Create an idle pool; nothing is launched until first use
    pub fn new(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                driver,
                config,
                browser: tokio::sync::Mutex::new(None),
                launched_at: Mutex::new(None),
                pages: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
                launches: AtomicUsize::new(0),
                shutting_down: AtomicBool::new(false),
                sweeper: Mutex::new(None),
                sweep_requested: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Return the running engine, launching one if there is none or the
    /// current one has disconnected
    ///
    /// Concurrent callers queue on the slot lock, so at most one launch is in
    /// progress at any time.
    ///
    /// # Errors
    ///
    /// [`crate::Error::EngineUnavailable`] when the launch fails; the next
    /// caller tries again.
    pub async fn acquire(&self) -> Result<Arc<dyn BrowserHandle>> {
        let mut slot = self.inner.browser.lock().await;

        if let Some(current) = slot.clone() {
            let handle = current.clone();
            if run_blocking("checking the browser connection", move || Ok(handle.is_connected())).await? {
                return Ok(current);
            }
            warn!("Browser disconnected; launching a new instance");
            *slot = None;
            *lock(&self.inner.launched_at) = None;
        }

        let driver = self.inner.driver.clone();
        debug!("Launching {} browser", driver.name());
        let handle = match run_blocking("launching the browser", move || driver.launch()).await {
            Ok(h) => h,
            Err(e) => {
                error!("Browser launch failed: {}", e);
                return Err(e);
            }
        };

        let n = self.inner.launches.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.inner.launched_at) = Some(Instant::now());
        info!("Browser ready (launch #{})", n);
        *slot = Some(handle.clone());
        if self.inner.sweep_requested.load(Ordering::SeqCst) {
            self.ensure_sweeper();
        }
        Ok(handle)
    }

    /// Open a tracked page with the default timeout and resource filter
    pub async fn new_page(&self) -> Result<PageLease> {
        let browser = self.acquire().await?;
        let setup = PageSetup {
            navigation_timeout: self.inner.config.timings.navigation_timeout,
            filter: ResourceFilter::default(),
        };
        let page = run_blocking("opening a page", move || browser.open_page(&setup)).await?;

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let tracked = {
            let mut pages = lock(&self.inner.pages);
            pages.insert(id, page.clone());
            pages.len()
        };
        debug!("Page {} opened ({} tracked)", id, tracked);

        Ok(PageLease {
            id,
            page,
            pool: self.clone(),
            released: false,
        })
    }

    /// Release a leased page; same as [`PageLease::release`]
    pub async fn release(&self, lease: PageLease) {
        lease.release().await;
    }

    fn untrack(&self, id: u64) -> Option<Arc<dyn PageHandle>> {
        lock(&self.inner.pages).remove(&id)
    }

    async fn release_id(&self, id: u64) {
        match self.untrack(id) {
            Some(page) => {
                close_page(id, page).await;
                debug!("Page {} released ({} tracked)", id, self.tracked_pages());
            }
            None => debug!("Page {} was already closed by the pool", id),
        }
    }

    pub fn tracked_pages(&self) -> usize {
        lock(&self.inner.pages).len()
    }

    /// Launches performed since the pool was created
    pub fn launches(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Clear a disconnected engine and evict the oldest pages above the limit
    ///
    /// Returns the number of evicted pages.
    pub async fn sweep(&self) -> usize {
        if let Ok(mut slot) = self.inner.browser.try_lock() {
            if let Some(current) = slot.clone() {
                let connected = run_blocking("checking the browser connection", move || Ok(current.is_connected()))
                    .await
                    .unwrap_or(false);
                if !connected {
                    warn!("Sweep found a disconnected browser; it will be relaunched on next use");
                    *slot = None;
                    *lock(&self.inner.launched_at) = None;
                }
            }
        }

        let max = self.inner.config.max_pages;
        let evicted: Vec<(u64, Arc<dyn PageHandle>)> = {
            let mut pages = lock(&self.inner.pages);
            let mut out = Vec::new();
            while pages.len() > max {
                match pages.pop_first() {
                    Some(entry) => out.push(entry),
                    None => break,
                }
            }
            out
        };

        if !evicted.is_empty() {
            warn!("Evicting {} pages over the limit of {}", evicted.len(), max);
        }
        let count = evicted.len();
        join_all(evicted.into_iter().map(|(id, page)| close_page(id, page))).await;
        count
    }

    /// Start the periodic sweep; replaces a running one
    ///
    /// Must be called from within a tokio runtime. The task only holds a weak
    /// reference and stops once the last pool handle is dropped.
    pub fn start_sweeper(&self) {
        self.inner.sweep_requested.store(true, Ordering::SeqCst);
        let weak: Weak<PoolInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                BrowserPool { inner }.sweep().await;
            }
        });

        if let Some(old) = lock(&self.inner.sweeper).replace(task) {
            old.abort();
        }
        debug!("Sweep scheduled every {}ms", period.as_millis());
    }

    fn ensure_sweeper(&self) {
        let running = lock(&self.inner.sweeper).as_ref().is_some_and(|task| !task.is_finished());
        if !running {
            self.start_sweeper();
        }
    }

    /// Stop the sweep, close every tracked page and the engine
    ///
    /// Idempotent and safe to call while captures are in flight; their pages
    /// are closed underneath them and their own release becomes a no-op.
    /// A pool used again after shutdown relaunches the engine and, if a sweep
    /// had been started, resumes it.
    pub async fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
            return;
        }
        info!("Shutting down browser pool");

        if let Some(task) = lock(&self.inner.sweeper).take() {
            task.abort();
        }

        let pages: Vec<(u64, Arc<dyn PageHandle>)> = std::mem::take(&mut *lock(&self.inner.pages)).into_iter().collect();
        if !pages.is_empty() {
            debug!("Closing {} tracked pages", pages.len());
        }
        join_all(pages.into_iter().map(|(id, page)| close_page(id, page))).await;

        let browser = self.inner.browser.lock().await.take();
        if let Some(browser) = browser {
            if let Err(e) = run_blocking("closing the browser", move || browser.close()).await {
                error!("Failed to close browser: {}", e);
            }
        }
        *lock(&self.inner.launched_at) = None;

        self.inner.shutting_down.store(false, Ordering::SeqCst);
        info!("Browser pool shut down");
    }

    /// Shut down, launch a fresh engine and resume the sweep
    pub async fn restart(&self) -> Result<()> {
        info!("Restarting browser pool");
        self.shutdown().await;
        self.acquire().await?;
        self.ensure_sweeper();
        Ok(())
    }

    /// Whether an engine is running and answering
    pub async fn is_connected(&self) -> bool {
        let current = self.inner.browser.lock().await.clone();
        match current {
            Some(handle) => run_blocking("checking the browser connection", move || Ok(handle.is_connected()))
                .await
                .unwrap_or(false),
            None => false,
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let connected = self.is_connected().await;
        let launched_at = *lock(&self.inner.launched_at);
        let uptime_secs = launched_at.map(|t| t.elapsed().as_secs()).unwrap_or(0);
        PoolStats {
            connected,
            pages: self.tracked_pages(),
            max_pages: self.inner.config.max_pages,
            uptime_secs,
            launches: self.launches(),
        }
    }
}

async fn close_page(id: u64, page: Arc<dyn PageHandle>) {
    if let Err(e) = run_blocking("closing a page", move || page.close()).await {
        error!("Failed to close page {}: {}", id, e);
    }
}

/// Exclusive use of one tracked page
///
/// Call [`PageLease::release`] when done. A lease dropped without release
/// (for example a cancelled capture) still closes its page.
pub struct PageLease {
    id: u64,
    page: Arc<dyn PageHandle>,
    pool: BrowserPool,
    released: bool,
}

impl PageLease {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn page(&self) -> Arc<dyn PageHandle> {
        self.page.clone()
    }

    /// Untrack and close the page
    pub async fn release(mut self) {
        self.released = true;
        self.pool.release_id(self.id).await;
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Some(page) = self.pool.untrack(self.id) else { return };
        let id = self.id;
        warn!("Page {} dropped without release; closing it", id);

        let close = move || {
            if let Err(e) = page.close() {
                error!("Failed to close page {}: {}", id, e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

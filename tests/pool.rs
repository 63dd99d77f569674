//! Browser pool lifecycle tests

use geogrid_render::engine::scripted::{Probe, ScriptedDriver};
use geogrid_render::engine::ResourceClass;
use geogrid_render::{BrowserPool, CaptureTimings, EngineConfig};
use std::sync::Arc;
use std::time::Duration;

fn pool(max_pages: usize, sweep_ms: u64) -> (BrowserPool, Probe) {
    let driver = ScriptedDriver::default();
    let probe = driver.probe();
    let config = EngineConfig {
        max_pages,
        sweep_interval: Duration::from_millis(sweep_ms),
        ..Default::default()
    };
    (BrowserPool::new(Arc::new(driver), config), probe)
}

#[tokio::test]
async fn periodic_sweep_bounds_tracked_pages() {
    let (pool, probe) = pool(3, 20);
    pool.start_sweeper();

    let mut leases = Vec::new();
    for _ in 0..8 {
        leases.push(pool.new_page().await.unwrap());
    }
    assert_eq!(pool.tracked_pages(), 8);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(pool.tracked_pages() <= 3, "tracked {}", pool.tracked_pages());
    assert_eq!(probe.open_pages(), 3);

    for lease in leases {
        lease.release().await;
    }
    assert_eq!(pool.tracked_pages(), 0);
    assert!(probe.close_counts().values().all(|c| *c == 1));
    pool.shutdown().await;
}

#[tokio::test]
async fn sweep_clears_a_disconnected_browser() {
    let (pool, probe) = pool(10, 60_000);
    pool.acquire().await.unwrap();
    probe.disconnect();

    pool.sweep().await;
    let stats = pool.stats().await;
    assert!(!stats.connected);
    assert_eq!(stats.uptime_secs, 0);

    pool.acquire().await.unwrap();
    assert_eq!(probe.launches(), 2);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_closes_everything() {
    let (pool, probe) = pool(10, 60_000);
    pool.start_sweeper();
    let a = pool.new_page().await.unwrap();
    let _b = pool.new_page().await.unwrap();

    tokio::join!(pool.shutdown(), pool.shutdown());
    pool.shutdown().await;

    assert_eq!(pool.tracked_pages(), 0);
    assert_eq!(probe.open_pages(), 0);
    assert!(!pool.is_connected().await);

    // releasing after shutdown does not close the page again
    a.release().await;
    assert!(probe.close_counts().values().all(|c| *c == 1));
}

#[tokio::test]
async fn restart_relaunches() {
    let (pool, probe) = pool(10, 60_000);
    pool.acquire().await.unwrap();
    pool.restart().await.unwrap();
    assert_eq!(probe.launches(), 2);

    let stats = pool.stats().await;
    assert!(stats.connected);
    assert_eq!(stats.launches, 2);
    assert_eq!(stats.max_pages, 10);
    pool.shutdown().await;
}

#[tokio::test]
async fn concurrent_first_use_launches_once() {
    let (pool, probe) = pool(32, 60_000);
    let tasks = (0..16).map(|_| {
        let pool = pool.clone();
        tokio::spawn(async move { pool.new_page().await.map(|lease| lease.id()) })
    });

    let mut ids = Vec::new();
    for joined in futures::future::join_all(tasks).await {
        ids.push(joined.unwrap().unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 16);
    assert_eq!(probe.launches(), 1);
}

#[tokio::test]
async fn stats_on_idle_pool() {
    let (pool, _) = pool(5, 60_000);
    let stats = pool.stats().await;
    assert!(!stats.connected);
    assert_eq!(stats.pages, 0);
    assert_eq!(stats.launches, 0);
    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["maxPages"], 5);
    assert_eq!(json["uptimeSecs"], 0);
}

#[tokio::test]
async fn new_pages_get_navigation_timeout_and_default_filter() {
    let driver = ScriptedDriver::default();
    let probe = driver.probe();
    let config = EngineConfig {
        timings: CaptureTimings { navigation_timeout: Duration::from_millis(4_500), ..Default::default() },
        ..Default::default()
    };
    let pool = BrowserPool::new(Arc::new(driver), config.clone());

    let lease = pool.new_page().await.unwrap();
    let setups = probe.setups();
    assert_eq!(setups.len(), 1);
    let (page, setup) = &setups[0];
    assert_eq!(*page, *probe.close_counts().keys().next().unwrap());
    assert_eq!(setup.navigation_timeout, config.timings.navigation_timeout);

    for allowed in [
        ResourceClass::Document,
        ResourceClass::Script,
        ResourceClass::Stylesheet,
        ResourceClass::Xhr,
        ResourceClass::Fetch,
        ResourceClass::Image,
    ] {
        assert!(setup.filter.allows(allowed), "{:?} should load", allowed);
    }
    for blocked in [ResourceClass::Font, ResourceClass::Media, ResourceClass::WebSocket, ResourceClass::Other] {
        assert!(!setup.filter.allows(blocked), "{:?} should be blocked", blocked);
    }

    lease.release().await;
}

#[tokio::test]
async fn sweep_resumes_when_used_after_shutdown() {
    let (pool, probe) = pool(1, 20);
    pool.start_sweeper();
    pool.new_page().await.unwrap().release().await;
    pool.shutdown().await;

    // no restart: the next page relaunches the engine
    let mut leases = Vec::new();
    for _ in 0..4 {
        leases.push(pool.new_page().await.unwrap());
    }
    assert_eq!(probe.launches(), 2);
    assert_eq!(pool.tracked_pages(), 4);

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(pool.tracked_pages() <= 1, "tracked {}", pool.tracked_pages());

    for lease in leases {
        lease.release().await;
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn pool_without_sweep_stays_unswept_after_relaunch() {
    let (pool, _) = pool(1, 20);
    pool.acquire().await.unwrap();
    pool.shutdown().await;

    let a = pool.new_page().await.unwrap();
    let b = pool.new_page().await.unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(pool.tracked_pages(), 2);

    a.release().await;
    b.release().await;
}

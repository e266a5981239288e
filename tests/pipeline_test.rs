mod common;

use std::sync::Arc;

use common::{file, file_at, module, RecordingEvents, ScriptedTransport, TestDevice};
use module_courier::{Courier, CourierConfig, CourierError, FileStore, ModuleInfo};

fn courier_with(
    device: &TestDevice,
    transport: Arc<ScriptedTransport>,
    events: Arc<RecordingEvents>,
) -> Arc<Courier> {
    Arc::new(Courier::with_events(
        transport,
        device.store.clone(),
        device.layout.clone(),
        CourierConfig::default(),
        events,
    ))
}

async fn read_marker(device: &TestDevice, module_id: &str) -> ModuleInfo {
    let body = tokio::fs::read(device.layout.installed_marker_path(module_id))
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn fully_cached_module_installs_without_any_transfer() {
    let device = TestDevice::new();
    device.seed_cache("aa", b"front page").await;
    device.seed_cache("bb", b"logo").await;
    let transport = Arc::new(ScriptedTransport::new());
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport.clone(), events.clone());

    let handbook = module(
        "handbook",
        "1.4.0",
        vec![
            file("http://origin/front", "aa", 10, "index.html"),
            file_at("http://origin/logo", "bb", 4, "img", "logo.png"),
        ],
    );
    courier.download_and_verify(&handbook).await.unwrap();

    assert_eq!(transport.total_hits(), 0);
    assert_eq!(read_marker(&device, "handbook").await.version, "1.4.0");
    let installed = device
        .layout
        .module_dir(module_courier::Location::Installed, "handbook");
    assert_eq!(
        tokio::fs::read(installed.join("index.html")).await.unwrap(),
        b"front page"
    );
    assert_eq!(
        tokio::fs::read(installed.join("img/logo.png")).await.unwrap(),
        b"logo"
    );
    assert_eq!(events.verified.lock().len(), 2);
    assert_eq!(
        events.installed.lock().as_slice(),
        &[("handbook".to_string(), "1.4.0".to_string())]
    );
}

#[tokio::test]
async fn stale_cache_entry_is_refetched_and_nothing_else() {
    let device = TestDevice::new();
    device.seed_cache("aa", b"good page!").await;
    // Wrong length for the declared size, so it must be replaced.
    device.seed_cache("bb", b"truncated").await;
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve("http://origin/logo", b"fresh logo bytes");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport.clone(), events);

    let handbook = module(
        "handbook",
        "1.5.0",
        vec![
            file("http://origin/front", "aa", 10, "index.html"),
            file("http://origin/logo", "bb", 16, "logo.png"),
        ],
    );
    courier.download_and_verify(&handbook).await.unwrap();

    assert_eq!(transport.hits("http://origin/front"), 0);
    assert_eq!(transport.hits("http://origin/logo"), 1);
    assert_eq!(read_marker(&device, "handbook").await.version, "1.5.0");
    let installed = device
        .layout
        .module_dir(module_courier::Location::Installed, "handbook");
    assert_eq!(
        tokio::fs::read(installed.join("logo.png")).await.unwrap(),
        b"fresh logo bytes"
    );
}

#[tokio::test]
async fn transient_failures_exhaust_the_retry_budget() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail("http://origin/flaky");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport.clone(), events.clone());

    let atlas = module(
        "atlas",
        "2.0.0",
        vec![file("http://origin/flaky", "aa", 8, "map.bin")],
    );
    let err = courier.download_and_verify(&atlas).await.unwrap_err();

    assert!(matches!(err, CourierError::MaxFailures { attempts: 3 }));
    assert_eq!(transport.hits("http://origin/flaky"), 3);
    assert!(!device.layout.installed_marker_path("atlas").exists());
    assert!(events.installed.lock().is_empty());
}

#[tokio::test]
async fn good_files_land_once_while_the_flaky_one_retries() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve("http://origin/solid", b"ok");
    transport.fail("http://origin/flaky");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport.clone(), events);

    let atlas = module(
        "atlas",
        "2.0.0",
        vec![
            file("http://origin/solid", "aa", 2, "solid.bin"),
            file("http://origin/flaky", "bb", 8, "map.bin"),
        ],
    );
    let err = courier.download_and_verify(&atlas).await.unwrap_err();

    assert!(matches!(err, CourierError::MaxFailures { attempts: 3 }));
    // The good file is fetched once, then satisfied from cache on retries.
    assert_eq!(transport.hits("http://origin/solid"), 1);
    assert_eq!(transport.hits("http://origin/flaky"), 3);
    assert_eq!(
        device
            .store
            .stat_size(&device.layout.cache_entry("aa"))
            .await
            .unwrap(),
        Some(2)
    );
}

#[tokio::test]
async fn cancel_mid_transfer_aborts_without_install() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    transport.hang("http://origin/big");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport.clone(), events.clone());

    let atlas = module(
        "atlas",
        "2.0.0",
        vec![file("http://origin/big", "aa", 1024, "big.bin")],
    );
    let task = tokio::spawn({
        let courier = courier.clone();
        async move { courier.download_and_verify(&atlas).await }
    });

    transport.started.notified().await;
    courier.cancel_download();

    let result = task.await.unwrap();
    assert!(result.unwrap_err().is_aborted());
    assert_eq!(courier.active_downloads(), 0);
    assert!(!device.layout.installed_marker_path("atlas").exists());
    assert_eq!(*events.aborts.lock(), 1);
    assert!(events.installed.lock().is_empty());

    // Cancellation does not leak into later calls.
    transport.serve("http://origin/big", &[0u8; 1024]);
    let atlas = module(
        "atlas",
        "2.0.0",
        vec![file("http://origin/big", "aa", 1024, "big.bin")],
    );
    courier.download_and_verify(&atlas).await.unwrap();
    assert_eq!(read_marker(&device, "atlas").await.version, "2.0.0");
}

#[tokio::test]
async fn cancel_with_nothing_in_flight_is_harmless() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport, events.clone());

    courier.cancel_download();
    courier.cancel_download();
    assert_eq!(*events.aborts.lock(), 2);
}

#[tokio::test]
async fn progress_is_reported_and_caps_at_the_total() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve("http://origin/a", b"12345");
    transport.serve("http://origin/b", b"123");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport, events.clone());

    let notes = module(
        "notes",
        "0.3.0",
        vec![
            file("http://origin/a", "aa", 5, "a.txt"),
            file("http://origin/b", "bb", 3, "b.txt"),
        ],
    );
    courier.download_and_verify(&notes).await.unwrap();

    let snapshots = events.snapshots.lock();
    assert!(!snapshots.is_empty());
    for (id, snapshot) in snapshots.iter() {
        assert_eq!(id, "notes");
        assert!(snapshot.loaded_bytes <= snapshot.total_bytes);
    }
    let last = snapshots.last().unwrap().1;
    assert_eq!(last.loaded_bytes, 8);
    assert_eq!(last.files_done, 2);
}

#[tokio::test]
async fn remove_module_tolerates_missing_and_deletes_installed() {
    let device = TestDevice::new();
    let transport = Arc::new(ScriptedTransport::new());
    transport.serve("http://origin/page", b"hi");
    let events = Arc::new(RecordingEvents::default());
    let courier = courier_with(&device, transport, events.clone());

    assert!(!courier.remove_module("ghost").await.unwrap());
    assert!(events.removed.lock().is_empty());

    let notes = module(
        "notes",
        "0.1.0",
        vec![file("http://origin/page", "aa", 2, "page.txt")],
    );
    courier.download_and_verify(&notes).await.unwrap();
    assert!(courier.remove_module("notes").await.unwrap());
    assert!(!device
        .layout
        .module_dir(module_courier::Location::Installed, "notes")
        .exists());
    assert_eq!(events.removed.lock().as_slice(), &["notes".to_string()]);
}

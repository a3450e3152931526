//! Topology service integration tests
//!
//! Several clients share one service thread; hardware changes reported from
//! a foreign thread interleave with apply requests.

use std::time::Duration;

use lamco_display_manager::backend::SyntheticBackend;
use lamco_display_manager::config::{Config, SyntheticConfig};
use lamco_display_manager::configuration::ApplyRequest;
use lamco_display_manager::manager::{DisplayManager, TopologyError, TopologyService};
use lamco_display_manager::topology::{CrtcId, ModeId, OutputId, PowerSaveMode, Resources};

#[tokio::test]
async fn test_racing_clients_one_wins() {
    let backend = SyntheticBackend::new(SyntheticConfig::default());
    let manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 8);
    let (handle, thread) = TopologyService::spawn(manager, 8).unwrap();

    let serial = handle.serial();
    let first = handle.clone();
    let second = handle.clone();

    let a = tokio::spawn(async move {
        first
            .apply(
                serial,
                ApplyRequest::new().enable(CrtcId(0), ModeId(0), 0, 0, &[OutputId(0)]),
            )
            .await
    });
    let b = tokio::spawn(async move {
        second
            .apply(
                serial,
                ApplyRequest::new().enable(CrtcId(1), ModeId(1), 0, 0, &[OutputId(1)]),
            )
            .await
    });

    let results = [a.await.unwrap(), b.await.unwrap()];
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let stale = results
        .iter()
        .filter(|r| matches!(r, Err(TopologyError::StaleRequest { .. })))
        .count();
    assert_eq!((accepted, stale), (1, 1));
    assert_eq!(handle.serial(), serial + 1);

    handle.shutdown().await;
    thread.join().unwrap();
}

#[tokio::test]
async fn test_hardware_change_from_foreign_thread() {
    let backend = SyntheticBackend::new(SyntheticConfig::default());
    let hardware = backend.handle();
    let manager = DisplayManager::new(Box::new(backend), SyntheticConfig::default(), 8);
    let (handle, thread) = TopologyService::spawn(manager, 8).unwrap();
    let mut events = handle.subscribe();

    let reporter = handle.clone();
    std::thread::spawn(move || {
        hardware.replace(Resources::default());
        assert!(reporter.hardware_changed());
    })
    .join()
    .unwrap();

    let changed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(changed.serial, 2);
    assert!(handle.current().is_fallback());

    handle.shutdown().await;
    thread.join().unwrap();
}

#[tokio::test]
async fn test_power_save_through_handle() {
    let mut config = Config::default();
    config.backend.kind = "synthetic".to_string();
    let manager = DisplayManager::from_config(&config);
    let (handle, thread) = TopologyService::spawn(manager, 4).unwrap();

    handle.set_power_save_mode(PowerSaveMode::Standby).await.unwrap();
    assert_eq!(handle.current().power_save_mode(), PowerSaveMode::Standby);

    handle.shutdown().await;
    thread.join().unwrap();
}

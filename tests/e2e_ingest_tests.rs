//! End-to-end tests for the ingest engine
//!
//! Drives processes through `IngestCapability` against the scripted backend
//! and against a real on-disk archive.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use common::{
    create_test_archive, finish_channel, ScriptedDevice, StepScript, TEST_HOST, TEST_TIMEOUT,
};
use take_ingest::archive::{ArchiveDevice, ArchiveSettings, RetryPolicy};
use take_ingest::connection::{connect_and_wait, ConnectionCapability, ConnectionStatus};
use take_ingest::ingest::{IngestErrorCode, IngestOptions, ProcessConfiguration, ProcessStep};
use take_ingest::takes::{TakeMetadata, TakeRegistry};
use tempfile::TempDir;

const TAKE_7: u32 = 7;

// ============================================================================
// Scripted Backend Scenarios
// ============================================================================

#[tokio::test]
async fn test_take_7_ingest_runs_both_steps_and_finishes_once() {
    let (device, capability) = ScriptedDevice::with_takes(8).await;
    let handle = capability
        .create_process(TAKE_7, ProcessConfiguration::INGEST)
        .unwrap();

    let finishes = Arc::new(AtomicUsize::new(0));
    let counter = finishes.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();
    handle.on_finished(move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(result);
    });

    capability.run_process(&handle, IngestOptions::default());
    let result = tokio::time::timeout(TEST_TIMEOUT, rx).await.unwrap().unwrap();
    tokio::task::yield_now().await;

    assert!(result.is_ok());
    assert_eq!(finishes.load(Ordering::SeqCst), 1);
    assert!(handle.is_done());
    assert!(handle.remaining().is_empty());
    assert_eq!(
        device.calls(),
        vec![
            (ProcessStep::Download, TAKE_7),
            (ProcessStep::ConvertAndUpload, TAKE_7)
        ]
    );
}

#[tokio::test]
async fn test_take_7_conversion_error_is_terminal() {
    let (device, capability) = ScriptedDevice::with_takes(8).await;
    device.script(
        ProcessStep::ConvertAndUpload,
        StepScript::Fail(IngestErrorCode::ConversionError),
    );
    let handle = capability
        .create_process(TAKE_7, ProcessConfiguration::INGEST)
        .unwrap();
    let (on_finished, rx) = finish_channel();
    handle.on_finished(on_finished);

    capability.run_process(&handle, IngestOptions::default());
    let err = tokio::time::timeout(TEST_TIMEOUT, rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert_eq!(err.code, IngestErrorCode::ConversionError);
    assert!(!handle.is_done());
    assert!(handle.is_errored());
    assert!(handle.is_terminal());
    assert_eq!(handle.error().map(|e| e.code), Some(IngestErrorCode::ConversionError));
    assert_eq!(device.calls().len(), 2);
}

#[tokio::test]
async fn test_download_only_never_converts() {
    let (device, capability) = ScriptedDevice::with_takes(3).await;

    capability
        .ingest_take(
            1,
            ProcessConfiguration::DOWNLOAD,
            IngestOptions::default(),
            |_| {},
            Some(TEST_TIMEOUT),
        )
        .await
        .unwrap();

    assert_eq!(device.calls(), vec![(ProcessStep::Download, 1)]);
}

#[tokio::test]
async fn test_download_failure_skips_conversion() {
    let (device, capability) = ScriptedDevice::with_takes(3).await;
    device.script(
        ProcessStep::Download,
        StepScript::Fail(IngestErrorCode::DownloaderError),
    );

    let err = capability
        .ingest_take(
            2,
            ProcessConfiguration::INGEST,
            IngestOptions::default(),
            |_| {},
            Some(TEST_TIMEOUT),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, IngestErrorCode::DownloaderError);
    assert_eq!(device.calls(), vec![(ProcessStep::Download, 2)]);
}

#[tokio::test]
async fn test_progress_stays_in_bounds_and_reaches_one() {
    let (_device, capability) = ScriptedDevice::with_takes(1).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    capability
        .ingest_take(
            0,
            ProcessConfiguration::INGEST,
            IngestOptions::default(),
            move |p| sink.lock().unwrap().push(p),
            Some(TEST_TIMEOUT),
        )
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|p| (0.0..=1.0).contains(p)));
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.last(), Some(&1.0));
}

#[tokio::test]
async fn test_cancel_stops_further_steps() {
    let (device, capability) = ScriptedDevice::with_takes(2).await;
    device.script(ProcessStep::Download, StepScript::Hang);
    let handle = capability
        .create_process(0, ProcessConfiguration::INGEST)
        .unwrap();
    let (on_finished, rx) = finish_channel();
    handle.on_finished(on_finished);

    capability.run_process(&handle, IngestOptions::default());
    capability.cancel_process(&handle);
    let err = tokio::time::timeout(TEST_TIMEOUT, rx)
        .await
        .unwrap()
        .unwrap()
        .unwrap_err();

    assert!(err.is_aborted());
    assert_eq!(device.calls(), vec![(ProcessStep::Download, 0)]);
    assert_eq!(device.cancels(), vec![handle.id()]);
    assert!(handle.is_terminal());
}

#[tokio::test]
async fn test_ingest_take_timeout_cancels() {
    let (device, capability) = ScriptedDevice::with_takes(1).await;
    device.script(ProcessStep::Download, StepScript::Hang);

    let err = capability
        .ingest_take(
            0,
            ProcessConfiguration::DOWNLOAD,
            IngestOptions::default(),
            |_| {},
            Some(std::time::Duration::from_millis(20)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.code, IngestErrorCode::AbortedByUser);
    assert_eq!(device.cancels().len(), 1);
}

#[tokio::test]
async fn test_failed_take_can_be_retried_with_fresh_handle() {
    let (device, capability) = ScriptedDevice::with_takes(1).await;
    device.script(
        ProcessStep::Download,
        StepScript::Fail(IngestErrorCode::DownloaderError),
    );
    let first = capability
        .ingest_take(0, ProcessConfiguration::DOWNLOAD, IngestOptions::default(), |_| {}, None)
        .await;
    assert!(first.is_err());

    device.script(ProcessStep::Download, StepScript::Succeed);
    let second = capability
        .ingest_take(0, ProcessConfiguration::DOWNLOAD, IngestOptions::default(), |_| {}, None)
        .await;

    assert!(second.is_ok());
    assert_eq!(device.calls().len(), 2);
}

#[tokio::test]
async fn test_options_reach_backend() {
    let (device, capability) = ScriptedDevice::with_takes(1).await;
    let options = IngestOptions {
        upload_host_name: TEST_HOST.to_string(),
        ..Default::default()
    };

    capability
        .ingest_take(0, ProcessConfiguration::INGEST, options.clone(), |_| {}, None)
        .await
        .unwrap();

    assert_eq!(device.last_options(), Some(options));
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn test_concurrent_registry_adds_yield_distinct_ids() {
    let registry = Arc::new(TakeRegistry::new());
    let threads: Vec<_> = (0..16u32)
        .map(|n| {
            let registry = registry.clone();
            thread::spawn(move || registry.add(TakeMetadata::new("slate", n)))
        })
        .collect();

    let ids: HashSet<u32> = threads.into_iter().map(|t| t.join().unwrap()).collect();

    assert_eq!(ids.len(), 16);
    assert_eq!(registry.len(), 16);
    for id in ids {
        assert!(registry.get(id).is_some());
    }
}

// ============================================================================
// Archive Backend
// ============================================================================

fn archive_device(archive_dir: std::path::PathBuf) -> Arc<ArchiveDevice> {
    ArchiveDevice::new(ArchiveSettings {
        archive_dir,
        identifier: "card-a".to_string(),
        retry_policy: RetryPolicy::none(),
    })
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_notifications_arrive_in_order() {
    let dir = TempDir::new().unwrap();
    let device = archive_device(create_test_archive(dir.path(), "intro_1"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    device
        .connection_state()
        .subscribe(move |status| sink.lock().unwrap().push(*status));

    connect_and_wait(device.as_ref(), TEST_TIMEOUT).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_archive_ingest_end_to_end() {
    let dir = TempDir::new().unwrap();
    let device = archive_device(create_test_archive(dir.path(), "intro_4"));
    connect_and_wait(device.as_ref(), TEST_TIMEOUT).await.unwrap();
    let capability = device.capability();
    let ids = capability.refresh_takes().await.unwrap();
    assert_eq!(ids.len(), 1);

    let info = capability.get_take_info(ids[0]).unwrap();
    assert_eq!(info.slate_name, "intro");
    assert_eq!(info.take_number, 4);

    let options = IngestOptions {
        working_directory: dir.path().join("work"),
        download_directory: dir.path().join("downloads"),
        upload_host_name: TEST_HOST.to_string(),
        ..Default::default()
    };
    capability
        .ingest_take(
            ids[0],
            ProcessConfiguration::INGEST,
            options,
            |_| {},
            Some(TEST_TIMEOUT),
        )
        .await
        .unwrap();

    let uploaded = dir.path().join("work").join(TEST_HOST).join("intro_4");
    assert!(uploaded.join("video_1.mov").is_file());
    assert!(uploaded.join("audio_1.wav").is_file());
}

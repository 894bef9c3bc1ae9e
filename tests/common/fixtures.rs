//! Test fixtures: take metadata and on-disk archives.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{TimeZone, Utc};
use take_ingest::ingest::IngestResult;
use take_ingest::takes::TakeMetadata;
use tokio::sync::oneshot;

use super::constants::TEST_SLATE;

/// `count` takes named `scene_1` .. `scene_<count>`.
pub fn take_fixtures(count: u32) -> Vec<TakeMetadata> {
    (1..=count)
        .map(|n| {
            let mut take = TakeMetadata::new(TEST_SLATE, n).with_date(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, n % 60, 0)
                    .single()
                    .expect("valid fixture date"),
            );
            take.video_files = vec![PathBuf::from(format!("/card/{}_{}/A.mov", TEST_SLATE, n))];
            take
        })
        .collect()
}

/// Archive under `root` with one take holding a video and an audio file.
/// Returns the archive directory.
pub fn create_test_archive(root: &Path, take_name: &str) -> PathBuf {
    let archive = root.join("archive");
    let take = archive.join(take_name);
    fs::create_dir_all(&take).unwrap();
    fs::write(take.join("A001C003.mov"), vec![1u8; 300_000]).unwrap();
    fs::write(take.join("A001C003.wav"), vec![2u8; 40_000]).unwrap();
    archive
}

/// A finish callback that forwards the result into a channel.
pub fn finish_channel() -> (
    impl FnOnce(IngestResult) + Send + 'static,
    oneshot::Receiver<IngestResult>,
) {
    let (tx, rx) = oneshot::channel();
    (
        move |result| {
            let _ = tx.send(result);
        },
        rx,
    )
}

//! Chunked, cancellable file copies with byte-level progress.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::ArchiveError;
use super::retry_policy::RetryPolicy;

const CHUNK_SIZE: usize = 64 * 1024;
const BACKOFF_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Copies a batch of files, reporting overall byte progress in `[0, 1]`.
pub struct Transfer<'a> {
    policy: &'a RetryPolicy,
    cancellation: &'a CancellationToken,
}

impl<'a> Transfer<'a> {
    pub fn new(policy: &'a RetryPolicy, cancellation: &'a CancellationToken) -> Self {
        Self {
            policy,
            cancellation,
        }
    }

    /// Copy every file in `jobs`, in order. Returns the number of bytes copied.
    pub fn run<F>(&self, jobs: &[FileCopy], mut on_progress: F) -> Result<u64, ArchiveError>
    where
        F: FnMut(f32),
    {
        let mut total = 0u64;
        for job in jobs {
            let len = fs::metadata(&job.source)
                .map_err(|e| ArchiveError::io(&job.source, e))?
                .len();
            total += len;
        }

        let mut done = 0u64;
        for job in jobs {
            let copied = self.copy_with_retry(job, |written| {
                on_progress(fraction(done + written, total));
            })?;
            done += copied;
            debug!("Copied {:?} -> {:?}", job.source, job.destination);
        }

        on_progress(1.0);
        Ok(done)
    }

    fn copy_with_retry<F>(&self, job: &FileCopy, mut on_written: F) -> Result<u64, ArchiveError>
    where
        F: FnMut(u64),
    {
        let mut retry_count = 0;
        loop {
            match self.copy_once(job, &mut on_written) {
                Ok(copied) => return Ok(copied),
                Err(e) if self.policy.should_retry(&e, retry_count) => {
                    let backoff = self.policy.backoff(retry_count);
                    warn!(
                        "Copy of {:?} failed ({}), retry {} in {:?}",
                        job.source,
                        e,
                        retry_count + 1,
                        backoff
                    );
                    self.sleep(backoff)?;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn copy_once<F>(&self, job: &FileCopy, on_written: &mut F) -> Result<u64, ArchiveError>
    where
        F: FnMut(u64),
    {
        if let Some(parent) = job.destination.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        let mut reader = File::open(&job.source).map_err(|e| ArchiveError::io(&job.source, e))?;
        let mut writer =
            File::create(&job.destination).map_err(|e| ArchiveError::io(&job.destination, e))?;

        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            if self.cancellation.is_cancelled() {
                drop(writer);
                let _ = fs::remove_file(&job.destination);
                return Err(ArchiveError::Cancelled);
            }
            let n = reader
                .read(&mut buf)
                .map_err(|e| ArchiveError::io(&job.source, e))?;
            if n == 0 {
                break;
            }
            writer
                .write_all(&buf[..n])
                .map_err(|e| ArchiveError::io(&job.destination, e))?;
            written += n as u64;
            on_written(written);
        }
        writer
            .flush()
            .map_err(|e| ArchiveError::io(&job.destination, e))?;
        Ok(written)
    }

    /// Sleep for `duration`, waking early on cancellation.
    fn sleep(&self, duration: Duration) -> Result<(), ArchiveError> {
        let mut left = duration;
        while !left.is_zero() {
            if self.cancellation.is_cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            let slice = left.min(BACKOFF_SLICE);
            thread::sleep(slice);
            left -= slice;
        }
        Ok(())
    }
}

fn fraction(done: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64) as f32
    }
}

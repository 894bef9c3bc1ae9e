//! Reads takes out of an archive directory.
//!
//! Layout: one subdirectory per take, named `<slate>_<number>`. Media files
//! anywhere below it are classified by extension. A `take.toml` manifest
//! may override metadata; `thumbnail.*` is the thumbnail.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::ArchiveError;
use crate::takes::TakeMetadata;

pub const MANIFEST_FILE_NAME: &str = "take.toml";

const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "mxf", "avi", "mkv", "m4v", "braw", "r3d"];
const AUDIO_EXTENSIONS: &[&str] = &["wav", "aif", "aiff", "flac", "mp3", "m4a"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    pub fn of(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// Optional per-take overrides read from `take.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TakeManifest {
    slate_name: Option<String>,
    take_number: Option<u32>,
    date: Option<DateTime<Utc>>,
    num_frames: Option<u32>,
    frame_rate: Option<f32>,
    resolution: Option<(u32, u32)>,
    device_model: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl TakeManifest {
    fn load(path: &Path) -> Result<Self, ArchiveError> {
        let content = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;
        toml::from_str(&content).map_err(|source| ArchiveError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, metadata: &mut TakeMetadata) {
        if let Some(slate_name) = self.slate_name {
            metadata.slate_name = slate_name;
        }
        if let Some(take_number) = self.take_number {
            metadata.take_number = take_number;
        }
        if self.date.is_some() {
            metadata.date = self.date;
        }
        metadata.num_frames = self.num_frames.or(metadata.num_frames);
        metadata.frame_rate = self.frame_rate.or(metadata.frame_rate);
        metadata.resolution = self.resolution.or(metadata.resolution);
        metadata.device_model = self.device_model.or(metadata.device_model.take());
        metadata.attributes.extend(self.attributes);
    }
}

/// Split `<slate>_<number>`. The slate may itself contain underscores.
pub fn parse_take_dir_name(name: &str) -> Option<(String, u32)> {
    let (slate, number) = name.rsplit_once('_')?;
    if slate.is_empty() {
        return None;
    }
    let number = number.parse().ok()?;
    Some((slate.to_string(), number))
}

/// Scan every take directory under `root`, sorted by directory name.
pub fn scan_archive(root: &Path) -> Result<Vec<TakeMetadata>, ArchiveError> {
    if !root.is_dir() {
        return Err(ArchiveError::ArchiveNotFound(root.to_path_buf()));
    }

    let mut takes = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable archive entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let Some((slate_name, take_number)) = parse_take_dir_name(&name) else {
            debug!("Ignoring directory {:?}, not a take", entry.path());
            continue;
        };

        let mut metadata = TakeMetadata::new(slate_name, take_number);
        metadata.source_dir = Some(entry.path().to_path_buf());
        if let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) {
            metadata.date = Some(DateTime::<Utc>::from(modified));
        }
        collect_files(entry.path(), &mut metadata);

        let manifest_path = entry.path().join(MANIFEST_FILE_NAME);
        if manifest_path.is_file() {
            match TakeManifest::load(&manifest_path) {
                Ok(manifest) => manifest.apply(&mut metadata),
                Err(e) => warn!("Ignoring manifest: {}", e),
            }
        }

        takes.push(metadata);
    }

    debug!("Scanned {} takes under {:?}", takes.len(), root);
    Ok(takes)
}

fn collect_files(take_dir: &Path, metadata: &mut TakeMetadata) {
    let files = WalkDir::new(take_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path());

    for path in files {
        let is_thumbnail = path
            .file_stem()
            .is_some_and(|stem| stem.eq_ignore_ascii_case("thumbnail"));
        if is_thumbnail {
            if metadata.thumbnail.is_none() {
                metadata.thumbnail = Some(path);
            }
            continue;
        }
        match MediaKind::of(&path) {
            Some(MediaKind::Video) => metadata.video_files.push(path),
            Some(MediaKind::Audio) => metadata.audio_files.push(path),
            None => {}
        }
    }
}

/// Regular files anywhere below `dir`, sorted by path.
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

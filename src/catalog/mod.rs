//! Media discovery, fingerprints, and savings-ratio arithmetic.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::warn;

use crate::domain::{Item, Ratio, ServerConfig, default_target_mb_per_min};

mod probe;
pub use probe::{discover_ffprobe, probe_media, resolve_in_path};


/// Lowercase extensions treated as media. Everything else under an entry is
/// ignored by scans.
pub const VIDEO_EXTS: [&str; 10] = [
    "mkv", "mp4", "mov", "m4v", "avi", "mpg", "mpeg", "ts", "wmv", "webm",
];

pub fn is_media_file(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    VIDEO_EXTS.iter().any(|known| *known == ext)
}

/// All regular media files beneath `root`, depth-first, in sorted order so
/// scan progress and claim order are stable across runs.
pub fn list_media_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if !root.exists() {
        return files;
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), %err, "failed to read directory during scan");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.is_file() && is_media_file(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

/// `"{size}:{mtime_seconds}"` — the cheap content-state identity used to
/// decide whether an item needs re-probing.
pub fn fingerprint(size_bytes: u64, mtime: i64) -> String {
    format!("{size_bytes}:{mtime}")
}

/// Size and whole-second mtime of a file on disk.
pub fn file_identity(path: &Path) -> std::io::Result<(u64, i64)> {
    let meta = fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok((meta.len(), mtime))
}

/// Predict the encode gain for an item against the per-height target map.
///
/// Returns zeros when duration, size, or height are unknown, or when no
/// usable target bucket exists. The bucket is the smallest configured height
/// at or above the item's height, falling back to the largest.
pub fn compute_ratio(item: &Item, config: &ServerConfig) -> Ratio {
    ratio_for(
        item.duration_sec,
        item.height,
        item.size_bytes,
        &config.target_mb_per_min_by_height,
    )
}

pub fn ratio_for(
    duration_sec: f64,
    height: u32,
    size_bytes: u64,
    targets: &BTreeMap<String, f64>,
) -> Ratio {
    if duration_sec <= 0.0 || size_bytes == 0 || height == 0 || targets.is_empty() {
        return Ratio::default();
    }

    let mut heights: Vec<u32> = targets.keys().filter_map(|k| k.parse().ok()).collect();
    heights.sort_unstable();
    let Some(&max_height) = heights.last() else {
        return Ratio::default();
    };
    let bucket = heights
        .iter()
        .copied()
        .find(|&h| height <= h)
        .unwrap_or(max_height);

    let mb_per_min = targets.get(&bucket.to_string()).copied().unwrap_or(0.0);
    if mb_per_min <= 0.0 {
        return Ratio::default();
    }

    let target = (duration_sec / 60.0) * mb_per_min * 1024.0 * 1024.0;
    let savings = size_bytes as f64 - target;
    let pct = savings / size_bytes as f64;

    Ratio {
        target_bytes: target as i64,
        savings_bytes: savings as i64,
        savings_pct: (pct * 10_000.0).round() / 10_000.0,
    }
}

/// Outcome of ingesting one `(height, mbPerMin)` calibration sample.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TargetSampleSummary {
    pub height: u32,
    pub count: usize,
    pub avg: f64,
}

/// Append a sample for `height` and recompute that height's target as the
/// mean of its samples rounded to one decimal.
pub fn record_target_sample(config: &mut ServerConfig, height: u32, mb_per_min: f64) -> TargetSampleSummary {
    let key = height.to_string();
    let bucket = config.target_samples_by_height.entry(key.clone()).or_default();
    bucket.push(mb_per_min);

    let avg = bucket.iter().sum::<f64>() / bucket.len() as f64;
    let avg = (avg * 10.0).round() / 10.0;
    let count = bucket.len();
    config.target_mb_per_min_by_height.insert(key, avg);

    TargetSampleSummary { height, count, avg }
}

/// Drop all samples and restore the default target map.
pub fn clear_target_samples(config: &mut ServerConfig) {
    config.target_samples_by_height.clear();
    config.target_mb_per_min_by_height = default_target_mb_per_min();
}

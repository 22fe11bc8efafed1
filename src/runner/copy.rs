//! Staged stream-copy with cancellation polling and progress banding.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use tracing::warn;

use super::client::CancelProbe;

const COPY_CHUNK_BYTES: usize = 8 * 1024 * 1024;
const COPY_PROGRESS_INTERVAL_SECS: f64 = 0.5;

/// Progress sink: `(overall_pct, message, eta_sec)`. Percent is only present
/// when the copy was given a band to map onto.
pub(super) type ProgressSink<'a> = &'a mut dyn FnMut(Option<f64>, &str, Option<i64>);

/// Copy `src` onto `dst` in chunks, polling the cancel flag at every chunk
/// boundary and reporting progress roughly twice a second. The copy's own
/// 0-100% is mapped onto `band = (start, span)` when given.
pub(super) fn copy_with_cancel(
    src: &Path,
    dst: &Path,
    label: &str,
    band: Option<(f64, f64)>,
    cancel: &mut CancelProbe<'_>,
    progress: ProgressSink<'_>,
) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let total = fs::metadata(src).map(|m| m.len()).unwrap_or(0);
    let mut reader =
        File::open(src).with_context(|| format!("failed to open {}", src.display()))?;
    let mut writer =
        File::create(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut copied: u64 = 0;
    let started = Instant::now();
    let mut last_report = f64::NEG_INFINITY;

    loop {
        let read = reader
            .read(&mut buf)
            .with_context(|| format!("failed to read {}", src.display()))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buf[..read])
            .with_context(|| format!("failed to write {}", dst.display()))?;
        copied += read as u64;

        let elapsed = started.elapsed().as_secs_f64();
        if total > 0 && elapsed - last_report > COPY_PROGRESS_INTERVAL_SECS {
            last_report = elapsed;
            let pct = (copied as f64 / total as f64) * 100.0;
            let rate = copied as f64 / elapsed.max(0.001);
            let eta_sec = if rate > 0.0 {
                Some(((total - copied) as f64 / rate) as i64)
            } else {
                None
            };
            let message = format!("{label} {pct:.1}%");
            let overall = band.map(|(start, span)| {
                let overall = start + (pct / 100.0) * span;
                (overall * 10.0).round() / 10.0
            });
            progress(overall, &message, eta_sec);
        }

        if cancel.check() {
            bail!("Cancelled by user");
        }
    }

    writer
        .sync_all()
        .with_context(|| format!("failed to flush {}", dst.display()))?;

    if total > 0 && copied < total {
        bail!("Copy incomplete ({label})");
    }
    Ok(())
}

/// Each job runs in a clean cache: drop whatever the previous job left.
pub(super) fn clean_cache_dir(cache_dir: &Path) {
    let Ok(entries) = fs::read_dir(cache_dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "failed to clear cache artifact");
        }
    }
}

pub(super) fn remove_file_best_effort(path: &Path) {
    if path.exists()
        && let Err(err) = fs::remove_file(path)
    {
        warn!(path = %path.display(), %err, "failed to remove file");
    }
}

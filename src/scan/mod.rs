//! Progress-reported scan pipeline feeding the catalog.
//!
//! Probing happens outside the store lock; every observed fact lands through
//! its own small `mutate` call so concurrent requests see live scan progress
//! in the `scanStatus` singleton.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{compute_ratio, file_identity, fingerprint, list_media_files, probe_media};
use crate::domain::{Item, MediaMetadata, new_id, now_utc};
use crate::scheduler::OpError;
use crate::store::{StateStore, StoreError};

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Op(#[from] OpError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub found: usize,
    pub entry_id: String,
}

/// Walk one entry's root, fingerprint every media file, and re-probe the
/// ones whose fingerprint changed or that were never probed. `ready` flags
/// and item statuses are left untouched.
pub fn scan_entry(store: &StateStore, entry_id: &str) -> Result<ScanSummary, ScanError> {
    let (entry, config) = store.read(|doc| {
        (
            doc.find_entry(entry_id).cloned(),
            doc.config.clone(),
        )
    });
    let entry = entry.ok_or(OpError::NotFound("Entry"))?;

    // Fingerprints are compared against a snapshot taken up front; the scan
    // itself is the only writer of these fields while it runs.
    let known: HashMap<String, (String, bool)> = store.read(|doc| {
        doc.items
            .iter()
            .map(|i| (i.path.clone(), (i.source_fingerprint.clone(), i.scan_at.is_some())))
            .collect()
    });

    let files = list_media_files(Path::new(&entry.path));
    let total = files.len() as u64;
    let started_at = now_utc();
    info!(entry_id, entry_path = %entry.path, total, "scan started");

    store.mutate(|doc| {
        let status = &mut doc.scan_status;
        status.active = true;
        status.entry_id = Some(entry.id.clone());
        status.entry_name = Some(entry.name.clone());
        status.total = total;
        status.done = 0;
        status.current_path = None;
        status.started_at = Some(started_at);
        status.updated_at = Some(started_at);
        status.finished_at = None;
    })?;

    let mut found = 0usize;
    let mut done = 0u64;
    let walk_result = (|| -> Result<(), StoreError> {
        for path in &files {
            let path_str = path.to_string_lossy().into_owned();
            found += 1;
            done += 1;

            let identity = match file_identity(path) {
                Ok(identity) => identity,
                Err(err) => {
                    warn!(path = %path_str, %err, "failed to stat media file");
                    store.mutate(|doc| {
                        advance_scan_status(doc, total, done, Some(path_str.clone()));
                    })?;
                    continue;
                }
            };

            let (size_bytes, mtime) = identity;
            let fp = fingerprint(size_bytes, mtime);
            let needs_probe = known
                .get(&path_str)
                .is_none_or(|(old_fp, probed)| *old_fp != fp || !probed);
            let metadata = if needs_probe {
                probe_media(path, &config.ffprobe_path)
            } else {
                None
            };

            store.mutate(|doc| {
                upsert_scanned_item(doc, &entry.id, &path_str, size_bytes, mtime, &fp, metadata);
                advance_scan_status(doc, total, done, Some(path_str.clone()));
            })?;
        }
        Ok(())
    })();

    // Always close out the scan status, even when the walk aborted.
    let finish = store.mutate(|doc| {
        let now = now_utc();
        if let Some(entry) = doc.find_entry_mut(entry_id) {
            entry.last_scan_at = Some(now);
            entry.updated_at = now;
        }
        let status = &mut doc.scan_status;
        status.active = false;
        status.done = done;
        status.current_path = None;
        status.finished_at = Some(now);
    });

    walk_result?;
    finish?;
    info!(entry_id, found, "scan finished");

    Ok(ScanSummary {
        found,
        entry_id: entry.id,
    })
}

fn advance_scan_status(
    doc: &mut crate::store::StateDocument,
    total: u64,
    done: u64,
    current_path: Option<String>,
) {
    let status = &mut doc.scan_status;
    status.active = true;
    status.total = total;
    status.done = done;
    status.current_path = current_path;
    status.updated_at = Some(now_utc());
}

fn upsert_scanned_item(
    doc: &mut crate::store::StateDocument,
    entry_id: &str,
    path: &str,
    size_bytes: u64,
    mtime: i64,
    fp: &str,
    metadata: Option<MediaMetadata>,
) {
    let config = doc.config.clone();
    let item = match doc.items.iter_mut().find(|i| i.path == path) {
        Some(item) => item,
        None => {
            let item = Item::discovered(
                new_id("itm"),
                entry_id.to_string(),
                path.to_string(),
                size_bytes,
                mtime,
                fp.to_string(),
            );
            doc.items.push(item);
            doc.items.last_mut().expect("item just pushed")
        }
    };

    if item.source_fingerprint != fp || item.scan_at.is_none() {
        if let Some(metadata) = &metadata {
            item.apply_metadata(metadata);
        }
        item.scan_at = Some(now_utc());
        item.size_bytes = size_bytes;
        item.mtime = mtime;
        item.source_fingerprint = fp.to_string();
        item.ratio = compute_ratio(item, &config);
    }
}

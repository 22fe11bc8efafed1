//! External prober integration: `probe(path) -> MediaMetadata | null`.
//!
//! The prober is ffprobe invoked with JSON output; everything here is
//! best-effort and collapses to `None` so a broken or missing prober never
//! fails a scan, it just leaves metadata empty.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tracing::debug;

use crate::domain::MediaMetadata;

/// Best-effort resolution of a bare program name to an absolute path using
/// the current PATH. Values that already look like explicit paths are left
/// alone so callers can fall back to the original string.
pub fn resolve_in_path(program: &str) -> Option<PathBuf> {
    if program.contains('/') || program.contains('\\') {
        return None;
    }

    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{program}.exe"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        let candidate = dir.join(program);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Locate ffprobe: explicit configured path first, then the `FFPROBE_PATH`
/// environment override, then PATH.
pub fn discover_ffprobe(explicit: &str) -> Option<PathBuf> {
    let explicit = if explicit.is_empty() {
        env::var("FFPROBE_PATH").unwrap_or_default()
    } else {
        explicit.to_string()
    };
    if !explicit.is_empty() {
        let candidate = PathBuf::from(&explicit);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    resolve_in_path("ffprobe")
}

/// Probe a media file, returning `None` when the prober is unavailable,
/// exits non-zero, or produces unparsable output.
pub fn probe_media(path: &Path, explicit_ffprobe: &str) -> Option<MediaMetadata> {
    let ffprobe = discover_ffprobe(explicit_ffprobe)?;

    let output = Command::new(&ffprobe)
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(path.as_os_str())
        .output()
        .ok()?;

    if !output.status.success() {
        debug!(
            path = %path.display(),
            stderr = %String::from_utf8_lossy(&output.stderr),
            "ffprobe failed"
        );
        return None;
    }

    let data: Value = serde_json::from_slice(&output.stdout).ok()?;
    Some(metadata_from_probe_json(&data))
}

/// Extract the metadata fields from ffprobe's `-show_format -show_streams`
/// JSON document.
pub(super) fn metadata_from_probe_json(data: &Value) -> MediaMetadata {
    let empty = Vec::new();
    let streams = data
        .get("streams")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    let format = data.get("format").cloned().unwrap_or_default();

    let video = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(Value::as_str) == Some("video"));
    let audio_streams: Vec<&Value> = streams
        .iter()
        .filter(|s| s.get("codec_type").and_then(Value::as_str) == Some("audio"))
        .collect();
    let subtitle_streams: Vec<&Value> = streams
        .iter()
        .filter(|s| s.get("codec_type").and_then(Value::as_str) == Some("subtitle"))
        .collect();

    let duration_sec = format
        .get("duration")
        .or_else(|| video.and_then(|v| v.get("duration")))
        .and_then(parse_loose_f64)
        .unwrap_or(0.0);

    let width = video
        .and_then(|v| v.get("width"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let height = video
        .and_then(|v| v.get("height"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;

    let fps = video
        .and_then(|v| {
            v.get("avg_frame_rate")
                .and_then(Value::as_str)
                .filter(|raw| !raw.is_empty() && *raw != "0/0")
                .or_else(|| v.get("r_frame_rate").and_then(Value::as_str))
        })
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    let audio_codecs = audio_streams
        .iter()
        .filter_map(|s| s.get("codec_name").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    let subtitle_langs = subtitle_streams
        .iter()
        .filter_map(|s| {
            s.get("tags")
                .and_then(|t| t.get("language"))
                .and_then(Value::as_str)
        })
        .map(str::to_string)
        .collect();

    // Container tags carry the "already processed by us" markers written by
    // the worker's metadata remux step.
    let tags = format.get("tags").cloned().unwrap_or_default();
    let tag_lower = |wanted: &str| -> Option<String> {
        tags.as_object()?.iter().find_map(|(k, v)| {
            (k.to_ascii_lowercase() == wanted)
                .then(|| v.as_str().map(str::to_string))
                .flatten()
        })
    };

    let encoded_by = tag_lower("encoded_by")
        .or_else(|| tag_lower("encodedby"))
        .or_else(|| tag_lower("encoder"))
        .unwrap_or_default();
    let comment = tag_lower("comment").unwrap_or_default();

    let encoded_by_spacesaver = encoded_by.to_ascii_lowercase().contains("mediaspacesaver")
        || comment.to_ascii_lowercase().contains("spacesaver=1");

    MediaMetadata {
        duration_sec,
        width,
        height,
        fps,
        video_codec: video
            .and_then(|v| v.get("codec_name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        audio_codecs,
        subtitle_langs,
        encoded_by,
        encoded_by_spacesaver,
    }
}

// ffprobe reports numbers as JSON strings ("3600.000000").
fn parse_loose_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    let (num, den) = raw.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 { None } else { Some(num / den) }
}

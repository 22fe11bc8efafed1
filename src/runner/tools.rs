//! External tool discovery for the worker: the encoder (HandBrakeCLI) and
//! the remuxer (ffmpeg). Explicit config beats environment override beats
//! PATH beats well-known install locations.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use super::config::WorkerConfig;
use crate::catalog::resolve_in_path;

const HANDBRAKE_CANDIDATES: [&str; 5] = [
    r"C:\Program Files\HandBrake\HandBrakeCLI.exe",
    r"C:\Program Files (x86)\HandBrake\HandBrakeCLI.exe",
    "/usr/local/bin/HandBrakeCLI",
    "/usr/bin/HandBrakeCLI",
    "/Applications/HandBrakeCLI",
];

const FFMPEG_CANDIDATES: [&str; 5] = [
    r"C:\ffmpeg\bin\ffmpeg.exe",
    r"C:\Program Files\ffmpeg\bin\ffmpeg.exe",
    r"C:\Program Files (x86)\ffmpeg\bin\ffmpeg.exe",
    "/usr/local/bin/ffmpeg",
    "/usr/bin/ffmpeg",
];

fn existing_env_path(var: &str) -> Option<PathBuf> {
    let value = env::var(var).ok()?;
    let path = PathBuf::from(value);
    path.exists().then_some(path)
}

fn first_existing(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

pub(super) fn find_handbrake() -> Option<PathBuf> {
    existing_env_path("HANDBRAKECLI_PATH")
        .or_else(|| resolve_in_path("HandBrakeCLI"))
        .or_else(|| first_existing(&HANDBRAKE_CANDIDATES))
}

pub(super) fn find_ffmpeg() -> Option<PathBuf> {
    existing_env_path("FFMPEG_PATH")
        .or_else(|| resolve_in_path("ffmpeg"))
        .or_else(|| first_existing(&FFMPEG_CANDIDATES))
}

/// Resolve the encoder binary or fail with an actionable message.
pub fn handbrake_path(config: &WorkerConfig) -> Result<PathBuf> {
    if !config.handbrake_path.is_empty() {
        let explicit = Path::new(&config.handbrake_path);
        if explicit.exists() {
            return Ok(explicit.to_path_buf());
        }
    }
    match find_handbrake() {
        Some(path) => Ok(path),
        None => bail!(
            "HandBrakeCLI not found on PATH. Set handbrakePath in the worker config or HANDBRAKECLI_PATH."
        ),
    }
}

/// Resolve ffmpeg for the metadata remux step.
pub fn ffmpeg_path(config: &WorkerConfig) -> Result<PathBuf> {
    if !config.ffmpeg_path.is_empty() {
        let explicit = Path::new(&config.ffmpeg_path);
        if explicit.exists() {
            return Ok(explicit.to_path_buf());
        }
    }
    match find_ffmpeg() {
        Some(path) => Ok(path),
        None => bail!("ffmpeg not found on PATH. Set ffmpegPath in the worker config or FFMPEG_PATH."),
    }
}

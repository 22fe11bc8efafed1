//! One job from claim to installed result: stage the source into the cache,
//! supervise the encoder, install the artifact atomically, remux metadata
//! tags, and clean up on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow, bail};
use tracing::info;

use super::client::{CancelProbe, CoordinatorClient};
use super::config::WorkerConfig;
use super::copy::{clean_cache_dir, copy_with_cancel, remove_file_best_effort};
use super::encoder::run_encoder;
use super::status::StatusFile;
use super::tools;
use crate::scheduler::ClaimGrant;

/// Container tags stamped onto every finished encode so later scans can
/// recognize already-processed files.
const METADATA_TAGS: [(&str, &str); 2] = [
    ("encoded_by", "MediaSpacesaver"),
    ("comment", "spacesaver=1"),
];

/// Split an argument string on whitespace, honoring double-quoted spans.
pub(super) fn split_args(raw: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in raw.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Derive the encoder's output extension from `-f`/`--format`, defaulting to
/// the input's own suffix.
pub(super) fn detect_extension(args: &[String], default_ext: &str) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "-f" || arg == "--format")
            && let Some(value) = args.get(i + 1)
        {
            let value = value.to_ascii_lowercase();
            if value.contains("mkv") {
                return ".mkv".to_string();
            }
            if value.contains("mp4") {
                return ".mp4".to_string();
            }
        }
    }
    default_ext.to_string()
}

/// Installed destinations standardize on `.mkv`.
pub(super) fn ensure_mkv_extension(path: &Path) -> PathBuf {
    let is_mkv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mkv"));
    if is_mkv {
        path.to_path_buf()
    } else {
        path.with_extension("mkv")
    }
}

fn dotted_suffix(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// Copy all streams into a sibling temp file while adding the given tags,
/// then atomically rename over `target`.
pub(super) fn remux_with_metadata(
    target: &Path,
    ffmpeg: &Path,
    tags: &[(&str, &str)],
) -> Result<()> {
    let temp = PathBuf::from(format!("{}.meta.mkv", target.display()));
    let mut cmd = Command::new(ffmpeg);
    cmd.arg("-y")
        .arg("-i")
        .arg(target)
        .arg("-map")
        .arg("0")
        .arg("-c")
        .arg("copy");
    for (key, value) in tags {
        cmd.arg("-metadata").arg(format!("{key}={value}"));
    }
    cmd.arg(&temp);

    let output = cmd
        .output()
        .with_context(|| format!("failed to run ffmpeg remux on {}", target.display()))?;
    if !output.status.success() {
        remove_file_best_effort(&temp);
        let detail = String::from_utf8_lossy(&output.stderr);
        let detail = detail.trim();
        if detail.is_empty() {
            bail!("ffmpeg remux failed with {}", output.status);
        }
        bail!("{detail}");
    }

    fs::rename(&temp, target).with_context(|| {
        format!(
            "failed to rename {} -> {}",
            temp.display(),
            target.display()
        )
    })
}

/// Execute one claimed job end to end. Returns the installed file's size.
/// Every failure path (including cancellation) leaves the cache clean and
/// the original file untouched unless the result was already installed.
pub(super) fn process_job(
    grant: &ClaimGrant,
    config: &WorkerConfig,
    client: &CoordinatorClient,
    status: &StatusFile,
) -> Result<Option<u64>> {
    let job_id = grant.job.id.clone();
    let args_list = split_args(&grant.args);

    let input_path = PathBuf::from(&grant.item.path);
    if !input_path.exists() {
        bail!("Input missing: {}", input_path.display());
    }

    let cache_dir = PathBuf::from(&config.cache_dir);
    fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir {}", cache_dir.display()))?;
    clean_cache_dir(&cache_dir);

    let input_suffix = dotted_suffix(&input_path);
    let output_ext = detect_extension(&args_list, &input_suffix);
    let local_in = cache_dir.join(format!("{job_id}_src{input_suffix}"));
    let mut local_out = cache_dir.join(format!("{job_id}_out{output_ext}"));

    let mut cancel = CancelProbe::new(client, &job_id);
    let mut report = |pct: Option<f64>, message: &str, eta_sec: Option<i64>| {
        client.progress(&job_id, pct, eta_sec, Some(message));
        status.write_working(&job_id, pct, message, eta_sec);
    };

    report(Some(5.0), "Copying source to cache", None);
    if cancel.check() {
        bail!("Cancelled by user");
    }

    // Stage the source into the cache under the [2%, 12%] band.
    copy_with_cancel(
        &input_path,
        &local_in,
        "Copying source",
        Some((2.0, 10.0)),
        &mut cancel,
        &mut report,
    )
    .inspect_err(|_| remove_file_best_effort(&local_in))?;

    let encoder = tools::handbrake_path(config)?;
    let mut encoder_args: Vec<String> = vec![
        "-i".to_string(),
        local_in.to_string_lossy().into_owned(),
        "-o".to_string(),
        local_out.to_string_lossy().into_owned(),
    ];
    encoder_args.extend(args_list);

    report(Some(15.0), "Encoding", None);
    let tail = run_encoder(
        &encoder,
        &encoder_args,
        client,
        &job_id,
        &mut cancel,
        &mut report,
    )?;

    if cancel.check() {
        bail!("Cancelled by user");
    }

    // Some encoder builds adjust the container extension on their own; a
    // single `{jobId}_out*` sibling is accepted as the artifact.
    if !local_out.exists() {
        let prefix = format!("{job_id}_out");
        let mut matches: Vec<PathBuf> = fs::read_dir(&cache_dir)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with(&prefix))
                    })
                    .collect()
            })
            .unwrap_or_default();
        if matches.len() == 1 {
            local_out = matches.remove(0);
        } else if tail.is_empty() {
            bail!("Output missing after encode: {}", local_out.display());
        } else {
            bail!("Output missing after encode: {} | {tail}", local_out.display());
        }
    }

    let dest_path = ensure_mkv_extension(&input_path);
    report(Some(85.0), "Copying output to source", None);

    let dest_tmp = PathBuf::from(format!("{}.tmp", dest_path.display()));
    remove_file_best_effort(&dest_tmp);
    copy_with_cancel(
        &local_out,
        &dest_tmp,
        "Copying output",
        Some((85.0, 10.0)),
        &mut cancel,
        &mut report,
    )
    .inspect_err(|_| remove_file_best_effort(&dest_tmp))?;

    // Last chance to abort before the point of no return.
    if cancel.check() {
        remove_file_best_effort(&dest_tmp);
        bail!("Cancelled by user");
    }
    fs::rename(&dest_tmp, &dest_path).with_context(|| {
        format!(
            "Replace failed: {} -> {}",
            dest_tmp.display(),
            dest_path.display()
        )
    })?;

    report(Some(96.0), "Tagging metadata", None);
    let ffmpeg = tools::ffmpeg_path(config)?;
    remux_with_metadata(&dest_path, &ffmpeg, &METADATA_TAGS)
        .map_err(|err| anyhow!("Metadata tagging failed: {err:#}"))?;

    // The encode changed the container extension: drop the original and let
    // the coordinator follow the item to its new path.
    if dest_path != input_path {
        remove_file_best_effort(&input_path);
        client.update_item_path(&grant.item.id, &dest_path.to_string_lossy());
        info!(from = %input_path.display(), to = %dest_path.display(), "item extension changed");
    }

    let output_size = fs::metadata(&dest_path).map(|m| m.len()).ok();

    remove_file_best_effort(&local_in);
    remove_file_best_effort(&local_out);

    report(Some(100.0), "Done", None);
    Ok(output_size)
}

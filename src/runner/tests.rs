//! End-to-end runner tests against a real coordinator instance and a mock
//! encoder binary. Unix-only: the mock tools are shell scripts.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::client::CoordinatorClient;
use super::config::WorkerConfig;
use super::executor;
use super::status::StatusFile;
use crate::api::{AppState, build_router};
use crate::domain::{ItemStatus, JobStatus, now_utc};
use crate::store::StateStore;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    let mut perms = fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Mock HandBrakeCLI: emits one progress line, then "encodes" by copying
/// the input (`-i $2`) to the output (`-o $4`).
fn mock_encoder(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "HandBrakeCLI",
        "#!/bin/sh\n\
         echo \"Encoding: task 1 of 1, 50.00 % (112 fps, ETA 00h00m05s)\"\n\
         cp \"$2\" \"$4\"\n\
         echo \"Encoding: task 1 of 1, 100.00 %\"\n",
    )
}

/// Mock HandBrakeCLI that hangs long enough for a cancel to land.
fn mock_slow_encoder(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "HandBrakeCLI",
        "#!/bin/sh\n\
         echo \"Encoding: task 1 of 1, 10.00 %\"\n\
         sleep 30\n\
         cp \"$2\" \"$4\"\n",
    )
}

/// Mock ffmpeg remuxer: copies the `-i` input to the final (last) argument.
fn mock_ffmpeg(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "ffmpeg",
        "#!/bin/sh\n\
         in=\"\"\n\
         prev=\"\"\n\
         for a in \"$@\"; do\n\
           if [ \"$prev\" = \"-i\" ]; then in=\"$a\"; fi\n\
           prev=\"$a\"\n\
         done\n\
         cp \"$in\" \"$prev\"\n",
    )
}

struct Harness {
    base_url: String,
    store: StateStore,
    _state_dir: tempfile::TempDir,
}

async fn start_coordinator() -> Harness {
    let state_dir = tempfile::tempdir().expect("state dir");
    let store = StateStore::open(state_dir.path().join("state.json")).expect("open store");
    let app = build_router(AppState::new(store.clone()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Harness {
        base_url: format!("http://{addr}"),
        store,
        _state_dir: state_dir,
    }
}

fn seed_queued_item(store: &StateStore, media_path: &Path) -> String {
    store
        .mutate(|doc| {
            let entry = crate::domain::Entry {
                id: "ent_test".to_string(),
                name: "test".to_string(),
                path: media_path
                    .parent()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned(),
                args: String::new(),
                notes: String::new(),
                created_at: now_utc(),
                updated_at: now_utc(),
                last_scan_at: None,
                extras: serde_json::Map::new(),
            };
            doc.entries.push(entry);

            let size = fs::metadata(media_path).unwrap().len();
            let mut item = crate::domain::Item::discovered(
                "itm_test".to_string(),
                "ent_test".to_string(),
                media_path.to_string_lossy().into_owned(),
                size,
                1_700_000_000,
                format!("{size}:1700000000"),
            );
            item.ready = true;
            item.status = ItemStatus::Queued;
            let id = item.id.clone();
            doc.items.push(item);
            id
        })
        .expect("seed item")
}

fn worker_config(cache_dir: &Path, encoder: &Path, ffmpeg: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.worker_id = "wrk_test".to_string();
    config.cache_dir = cache_dir.to_string_lossy().into_owned();
    config.handbrake_path = encoder.to_string_lossy().into_owned();
    config.ffmpeg_path = ffmpeg.to_string_lossy().into_owned();
    config
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_job_lifecycle_with_extension_change() {
    let harness = start_coordinator().await;
    let media_dir = tempfile::tempdir().expect("media dir");
    let tools_dir = tempfile::tempdir().expect("tools dir");
    let cache_dir = tempfile::tempdir().expect("cache dir");

    let source = media_dir.path().join("movie.mp4");
    fs::write(&source, vec![7u8; 64 * 1024]).unwrap();
    let item_id = seed_queued_item(&harness.store, &source);

    // The baseline args request an mkv container, so the install step will
    // change the extension and report the new path.
    harness
        .store
        .mutate(|doc| doc.config.baseline_args = "-f av_mkv -q 20".to_string())
        .unwrap();

    let encoder = mock_encoder(tools_dir.path());
    let ffmpeg = mock_ffmpeg(tools_dir.path());
    let config = worker_config(cache_dir.path(), &encoder, &ffmpeg);
    let status_dir = tempfile::tempdir().expect("status dir");
    let status = StatusFile::new(status_dir.path().join("status.json"));

    let base_url = harness.base_url.clone();
    let job_id = tokio::task::spawn_blocking(move || {
        let client = CoordinatorClient::new(&base_url).unwrap();
        let grant = client
            .claim("wrk_test", "wrk_test")
            .expect("claim")
            .expect("grant");
        assert_eq!(grant.args, "-f av_mkv -q 20");
        client.start(&grant.job.id).expect("start");

        let output_size =
            executor::process_job(&grant, &config, &client, &status).expect("process job");
        assert!(output_size.is_some());
        client.complete(&grant.job.id, output_size).expect("complete");
        grant.job.id
    })
    .await
    .expect("worker task");

    // The original .mp4 was replaced by an installed .mkv.
    assert!(!source.exists());
    let installed = media_dir.path().join("movie.mkv");
    assert!(installed.exists());

    let doc = harness.store.snapshot();
    let job = doc.find_job(&job_id).expect("job kept");
    assert_eq!(job.status, JobStatus::Done);
    let item = doc.find_item(&item_id).expect("item kept");
    assert_eq!(item.status, ItemStatus::Done);
    assert!(!item.ready);
    assert_eq!(item.transcode_count, 1);
    assert!(item.path.ends_with("movie.mkv"));
    // Post-transcode refresh restatted the installed file.
    assert_eq!(item.size_bytes, fs::metadata(&installed).unwrap().len());

    // Cache was cleaned on the way out.
    let leftovers: Vec<_> = fs::read_dir(cache_dir.path())
        .unwrap()
        .flatten()
        .collect();
    assert!(leftovers.is_empty(), "cache should be empty, found {leftovers:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_kills_the_encoder_and_fails_the_job() {
    let harness = start_coordinator().await;
    let media_dir = tempfile::tempdir().expect("media dir");
    let tools_dir = tempfile::tempdir().expect("tools dir");
    let cache_dir = tempfile::tempdir().expect("cache dir");

    let source = media_dir.path().join("movie.mkv");
    fs::write(&source, vec![7u8; 16 * 1024]).unwrap();
    let item_id = seed_queued_item(&harness.store, &source);

    let encoder = mock_slow_encoder(tools_dir.path());
    let ffmpeg = mock_ffmpeg(tools_dir.path());
    let config = worker_config(cache_dir.path(), &encoder, &ffmpeg);
    let status_dir = tempfile::tempdir().expect("status dir");
    let status = StatusFile::new(status_dir.path().join("status.json"));

    let base_url = harness.base_url.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let client = CoordinatorClient::new(&base_url).unwrap();
        let grant = client
            .claim("wrk_test", "wrk_test")
            .expect("claim")
            .expect("grant");
        client.start(&grant.job.id).expect("start");

        let err = executor::process_job(&grant, &config, &client, &status)
            .expect_err("job should be cancelled");
        let message = format!("{err:#}");
        client.fail(&grant.job.id, &message).expect("report failure");
        (grant.job.id, message)
    });

    // Give the worker a moment to reach the encoder, then request cancel the
    // way the UI does: DELETE on the active job.
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let job_id = harness
        .store
        .read(|doc| doc.jobs.first().map(|j| j.id.clone()))
        .expect("job exists");
    let resp = reqwest::Client::new()
        .delete(format!("{}/jobs/{job_id}", harness.base_url))
        .send()
        .await
        .expect("delete job");
    let body: serde_json::Value = resp.json().await.expect("delete body");
    assert_eq!(body, serde_json::json!({"ok": false, "cancelRequested": true}));

    let (worker_job_id, message) = worker.await.expect("worker task");
    assert_eq!(worker_job_id, job_id);
    assert_eq!(message, "Cancelled by user");

    let doc = harness.store.snapshot();
    assert_eq!(doc.find_job(&job_id).unwrap().status, JobStatus::Failed);
    let item = doc.find_item(&item_id).unwrap();
    assert_eq!(item.status, ItemStatus::Failed);
    assert_eq!(item.last_error, "Cancelled by user");
    // The original source is untouched.
    assert!(source.exists());
}

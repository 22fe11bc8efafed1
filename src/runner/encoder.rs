//! Encoder subprocess supervision: line-pumped output, progress extraction,
//! cadenced reporting, cancellation, and the polite-then-forceful kill.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use super::client::{CancelProbe, CoordinatorClient};
use super::progress::{RollingTail, parse_encode_percent, parse_eta_seconds};

const PUMP_POLL: Duration = Duration::from_millis(200);
const CANCEL_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const KILL_GRACE: Duration = Duration::from_secs(2);
/// Post a percent when it moved at least this much...
const PERCENT_DELTA: f64 = 0.5;
/// ...or when this long has passed since the last percent post.
const PERCENT_INTERVAL: Duration = Duration::from_secs(2);
/// Log-tail-only updates for non-percent lines are capped to this cadence.
const LOG_ONLY_INTERVAL: Duration = Duration::from_secs(5);

/// Reader threads feeding a single bounded-by-drain channel with the child's
/// combined stdout/stderr, decoded as UTF-8 with replacement. This decouples
/// stall detection in the supervision loop from line arrival.
struct LinePump {
    rx: Option<Receiver<String>>,
}

impl LinePump {
    fn spawn(child: &mut Child) -> Self {
        let (tx, rx) = std::sync::mpsc::channel::<String>();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, tx);
        }
        Self { rx: Some(rx) }
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Option<String> {
        let rx = self.rx.as_ref()?;
        match rx.recv_timeout(timeout) {
            Ok(line) => Some(line),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                self.rx = None;
                None
            }
        }
    }

    fn drain_available(&mut self, mut on_line: impl FnMut(String)) {
        let Some(rx) = self.rx.as_ref() else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(line) => on_line(line),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.rx = None;
                    break;
                }
            }
        }
    }
}

fn spawn_reader(stream: impl Read + Send + 'static, tx: Sender<String>) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&raw);
                    if tx.send(line.trim_end_matches(['\r', '\n']).to_string()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

/// Run the encoder to completion, streaming progress to the coordinator and
/// the local status sink. Returns the bounded output tail on success; fails
/// with the tail as the message on a non-zero exit, and with
/// `"Cancelled by user"` when the cancel flag fires.
pub(super) fn run_encoder(
    program: &Path,
    args: &[String],
    client: &CoordinatorClient,
    job_id: &str,
    cancel: &mut CancelProbe<'_>,
    local_progress: super::copy::ProgressSink<'_>,
) -> Result<String> {
    debug!(program = %program.display(), ?args, "spawning encoder");
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn encoder {}", program.display()))?;

    let mut pump = LinePump::spawn(&mut child);
    let mut tail = RollingTail::default();
    let mut last_pct: Option<f64> = None;
    let mut last_post = Instant::now() - PERCENT_INTERVAL;
    let mut last_cancel_check = Instant::now();

    let status = loop {
        if let Some(line) = pump.recv_timeout(PUMP_POLL) {
            handle_line(
                &line,
                client,
                job_id,
                &mut tail,
                &mut last_pct,
                &mut last_post,
                local_progress,
            );
        }

        if last_cancel_check.elapsed() >= CANCEL_CHECK_INTERVAL {
            last_cancel_check = Instant::now();
            if cancel.check() {
                terminate_child(&mut child);
                bail!("Cancelled by user");
            }
        }

        if let Some(status) = child.try_wait().context("failed to wait on encoder")? {
            // The pump threads may still hold buffered lines.
            pump.drain_available(|line| {
                handle_line(
                    &line,
                    client,
                    job_id,
                    &mut tail,
                    &mut last_pct,
                    &mut last_post,
                    local_progress,
                );
            });
            break status;
        }
    };

    let tail_text = tail.text();
    if !status.success() {
        if tail_text.is_empty() {
            bail!("Encoder failed with {status}");
        }
        bail!("{tail_text}");
    }
    Ok(tail_text)
}

fn handle_line(
    line: &str,
    client: &CoordinatorClient,
    job_id: &str,
    tail: &mut RollingTail,
    last_pct: &mut Option<f64>,
    last_post: &mut Instant,
    local_progress: super::copy::ProgressSink<'_>,
) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    tail.push(line);

    if let Some(pct) = parse_encode_percent(line) {
        let eta_sec = parse_eta_seconds(line);
        let moved = last_pct.is_none_or(|prev| (pct - prev).abs() >= PERCENT_DELTA);
        if moved || last_post.elapsed() > PERCENT_INTERVAL {
            let pct = (pct * 10.0).round() / 10.0;
            let message = format!("Encoding {pct:.1}%");
            client.progress(job_id, Some(pct), eta_sec, Some(&message));
            local_progress(Some(pct), &message, eta_sec);
            *last_pct = Some(pct);
            *last_post = Instant::now();
        }
    } else if last_post.elapsed() > LOG_ONLY_INTERVAL {
        client.progress(job_id, None, None, Some(line));
        local_progress(None, line, None);
        *last_post = Instant::now();
    }
}

/// Polite termination first, then a forceful kill after a short grace.
///
/// Unix: SIGTERM, wait up to 2s, SIGKILL. Windows: `taskkill /T /F` takes the
/// whole process tree down, since the encoder may have children of its own.
pub(super) fn terminate_child(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = Pid::from_raw(child.id() as i32);
        if kill(pid, Signal::SIGTERM).is_ok() {
            let deadline = Instant::now() + KILL_GRACE;
            while Instant::now() < deadline {
                match child.try_wait() {
                    Ok(Some(_)) => return,
                    Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                    Err(_) => break,
                }
            }
        }
        if let Err(err) = child.kill() {
            warn!(%err, "failed to kill encoder");
        }
        let _ = child.wait();
    }

    #[cfg(windows)]
    {
        let killed = Command::new("taskkill")
            .args(["/PID", &child.id().to_string(), "/T", "/F"])
            .output()
            .is_ok();
        let deadline = Instant::now() + KILL_GRACE;
        while killed && Instant::now() < deadline {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(_) => break,
            }
        }
        if let Err(err) = child.kill() {
            warn!(%err, "failed to kill encoder");
        }
        let _ = child.wait();
    }
}

//! Lifecycle management for the external sentiment analyzer process.
//!
//! The analyzer is an opaque child process (a webcam frame classifier)
//! that prints exactly one integer per line on stdout and arbitrary
//! diagnostics on stderr. This module owns:
//!
//! - [`SentimentService`]: spawn/stop with a SIGTERM → SIGKILL grace
//!   window, a single-instance running guard, and query accessors over
//!   the bounded history.
//! - The stdout reader task: line-oriented, tolerant parsing that accepts
//!   only -1/0/1 and discards everything else without failing.
//! - [`SentimentEvent`] fan-out over a `tokio::sync::broadcast` channel.

use crate::config::SentimentConfig;
use crate::error::{AssistError, Result};
use crate::sentiment::{SentimentHistory, SentimentSample, SentimentTrend};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Broadcast capacity for sentiment events; slow subscribers are lagged,
/// not blocked.
const EVENT_CHANNEL_SIZE: usize = 256;

/// Events emitted by the sentiment service.
#[derive(Debug, Clone)]
pub enum SentimentEvent {
    /// A validated sample was read from the analyzer.
    Sample(SentimentSample),
    /// The analyzer process was spawned.
    Started,
    /// The analyzer process exited (graceful or crash).
    Stopped {
        /// Process exit code, if one was reported.
        code: Option<i32>,
    },
    /// The analyzer failed to spawn.
    Error(String),
}

struct Inner {
    running: bool,
    pid: Option<u32>,
    history: SentimentHistory,
}

/// Wraps the external sentiment analyzer as a managed service.
///
/// Exactly one analyzer process may run per service instance; `start` is a
/// no-op while running and `stop` is a no-op while stopped.
pub struct SentimentService {
    config: SentimentConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SentimentEvent>,
}

impl SentimentService {
    /// Create a stopped service with an empty history.
    pub fn new(config: SentimentConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let history = SentimentHistory::new(config.history_capacity);
        Self {
            config,
            inner: Mutex::new(Inner {
                running: false,
                pid: None,
                history,
            }),
            events,
        }
    }

    /// Subscribe to sentiment/lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SentimentEvent> {
        self.events.subscribe()
    }

    /// Whether the analyzer process is currently running.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Camera index used when a start request does not specify one.
    pub fn default_camera_index(&self) -> u32 {
        self.config.default_camera_index
    }

    /// Most recent accepted sample, if any.
    pub fn current(&self) -> Option<SentimentSample> {
        self.lock().history.latest()
    }

    /// The most recent `limit` samples, oldest-first.
    pub fn history(&self, limit: usize) -> Vec<SentimentSample> {
        self.lock().history.recent(limit)
    }

    /// Mean sample value within `window_ms` of now; 0.0 if none.
    pub fn average(&self, window_ms: i64) -> f64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.lock().history.average(window_ms, now)
    }

    /// Trend within `window_ms` of now.
    pub fn trend(&self, window_ms: i64) -> SentimentTrend {
        let now = chrono::Utc::now().timestamp_millis();
        self.lock().history.trend(window_ms, now)
    }

    /// Spawn the analyzer process.
    ///
    /// No-op (logged) if already running. On success, reader and exit
    /// watcher tasks are spawned and a [`SentimentEvent::Started`] event is
    /// emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned; the service stays
    /// stopped and a [`SentimentEvent::Error`] event is emitted. There is no
    /// automatic retry.
    pub fn start(self: &Arc<Self>, camera_index: u32) -> Result<()> {
        {
            let inner = self.lock();
            if inner.running {
                info!("sentiment analyzer already running");
                return Ok(());
            }
        }

        info!(camera_index, command = %self.config.command, "starting sentiment analyzer");

        let mut command = tokio::process::Command::new(&self.config.command);
        command
            .args(&self.config.args)
            .env("CAMERA_INDEX", camera_index.to_string())
            .env("HEADLESS", "true")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to spawn sentiment analyzer: {e}");
                warn!("{message}");
                let _ = self.events.send(SentimentEvent::Error(message.clone()));
                return Err(AssistError::Sentiment(message));
            }
        };

        let pid = child.id();
        {
            let mut inner = self.lock();
            inner.running = true;
            inner.pid = pid;
        }

        let reader = child.stdout.take().map(|stdout| {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    service.ingest_line(&line);
                }
            })
        });

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    // The analyzer logs diagnostics on stderr; never fatal.
                    debug!(target: "tcare::sentiment::analyzer", "{line}");
                }
            });
        }

        // Exit watcher: any exit (graceful or crash) returns the service to
        // the stopped state. No auto-restart.
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let status = child.wait().await;
            // Drain remaining buffered stdout before reporting the stop so
            // subscribers never see samples after the Stopped event.
            if let Some(reader) = reader {
                let _ = reader.await;
            }
            let code = status.as_ref().ok().and_then(|s| s.code());
            info!(?code, "sentiment analyzer exited");
            {
                let mut inner = service.lock();
                inner.running = false;
                inner.pid = None;
            }
            let _ = service.events.send(SentimentEvent::Stopped { code });
        });

        let _ = self.events.send(SentimentEvent::Started);
        Ok(())
    }

    /// Stop the analyzer process.
    ///
    /// Sends a graceful termination signal; if the process has not exited
    /// within the configured grace period a forceful kill follows. No-op if
    /// not running.
    pub fn stop(self: &Arc<Self>) {
        let pid = {
            let inner = self.lock();
            if !inner.running {
                info!("sentiment analyzer not running");
                return;
            }
            inner.pid
        };

        let Some(pid) = pid else {
            return;
        };

        info!(pid, "stopping sentiment analyzer");
        send_signal(pid, Signal::Term);

        let service = Arc::clone(self);
        let grace = Duration::from_millis(self.config.stop_grace_ms);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let still_running = {
                let inner = service.lock();
                inner.running && inner.pid == Some(pid)
            };
            if still_running {
                warn!(pid, "sentiment analyzer did not exit in time, force killing");
                send_signal(pid, Signal::Kill);
            }
        });
    }

    /// Parse one stdout line; accepted values become samples and events.
    ///
    /// Exposed so the ingestion contract can be tested without a child
    /// process.
    pub fn ingest_line(&self, line: &str) {
        let Some(value) = parse_sentiment_line(line) else {
            debug!(line, "discarding non-sentiment analyzer output");
            return;
        };

        let sample = SentimentSample::now(value);
        {
            let mut inner = self.lock();
            inner.history.push(sample);
        }
        debug!(value, label = sample.label(), "sentiment sample");
        let _ = self.events.send(SentimentEvent::Sample(sample));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Lock poisoning would require a panic while holding the guard;
        // recover with the inner state rather than propagating.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Parse a single analyzer stdout line into a sentiment value.
///
/// Only the exact integers -1, 0, and 1 are accepted; anything else
/// (non-numeric text, out-of-range integers, embedded whitespace noise)
/// is rejected.
pub fn parse_sentiment_line(line: &str) -> Option<i8> {
    let trimmed = line.trim();
    let value: i64 = trimmed.parse().ok()?;
    if (-1..=1).contains(&value) {
        Some(value as i8)
    } else {
        None
    }
}

enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: Signal) {
    let sig = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) with a valid pid/signal pair has no memory-safety
    // concerns; a stale pid results in ESRCH which we ignore.
    unsafe {
        libc::kill(pid as i32, sig);
    }
}

#[cfg(not(unix))]
fn send_signal(pid: u32, _signal: Signal) {
    // No graceful-signal distinction off unix; rely on the exit watcher.
    warn!(pid, "process signals unsupported on this platform");
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn service() -> Arc<SentimentService> {
        Arc::new(SentimentService::new(SentimentConfig::default()))
    }

    #[test]
    fn parse_accepts_only_discrete_levels() {
        assert_eq!(parse_sentiment_line("1"), Some(1));
        assert_eq!(parse_sentiment_line(" 0 "), Some(0));
        assert_eq!(parse_sentiment_line("-1"), Some(-1));
        assert_eq!(parse_sentiment_line("-7"), None);
        assert_eq!(parse_sentiment_line("2"), None);
        assert_eq!(parse_sentiment_line("x"), None);
        assert_eq!(parse_sentiment_line(""), None);
        assert_eq!(parse_sentiment_line("0.5"), None);
    }

    #[tokio::test]
    async fn malformed_lines_are_discarded_without_samples() {
        let service = service();
        for line in ["1", "0", "-7", "x", "-1"] {
            service.ingest_line(line);
        }
        let values: Vec<i8> = service.history(20).iter().map(|s| s.value).collect();
        assert_eq!(values, vec![1, 0, -1]);
        assert_eq!(service.current().map(|s| s.value), Some(-1));
    }

    #[tokio::test]
    async fn samples_are_broadcast_in_order() {
        let service = service();
        let mut rx = service.subscribe();
        service.ingest_line("1");
        service.ingest_line("-1");

        match rx.recv().await.unwrap() {
            SentimentEvent::Sample(s) => assert_eq!(s.value, 1),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await.unwrap() {
            SentimentEvent::Sample(s) => assert_eq!(s.value, -1),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn stop_when_not_running_is_a_no_op() {
        let service = service();
        service.stop();
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn spawn_failure_reports_error_and_stays_stopped() {
        let config = SentimentConfig {
            command: "/nonexistent/analyzer-binary".to_owned(),
            args: Vec::new(),
            ..SentimentConfig::default()
        };
        let service = Arc::new(SentimentService::new(config));
        let mut rx = service.subscribe();

        assert!(service.start(0).is_err());
        assert!(!service.is_running());
        assert!(matches!(rx.recv().await.unwrap(), SentimentEvent::Error(_)));
    }

    #[tokio::test]
    async fn start_reads_lines_from_real_process() {
        let config = SentimentConfig {
            command: "sh".to_owned(),
            args: vec!["-c".to_owned(), "printf '1\\n0\\n-7\\nx\\n-1\\n'".to_owned()],
            ..SentimentConfig::default()
        };
        let service = Arc::new(SentimentService::new(config));
        let mut rx = service.subscribe();
        service.start(0).unwrap();

        // Started, then three samples, then Stopped once the script exits.
        assert!(matches!(rx.recv().await.unwrap(), SentimentEvent::Started));
        let mut values = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                SentimentEvent::Sample(s) => values.push(s.value),
                SentimentEvent::Stopped { .. } => break,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(values, vec![1, 0, -1]);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn double_start_does_not_respawn() {
        let config = SentimentConfig {
            command: "sh".to_owned(),
            args: vec!["-c".to_owned(), "sleep 5".to_owned()],
            stop_grace_ms: 100,
            ..SentimentConfig::default()
        };
        let service = Arc::new(SentimentService::new(config));
        let mut rx = service.subscribe();

        service.start(0).unwrap();
        assert!(matches!(rx.recv().await.unwrap(), SentimentEvent::Started));
        assert!(service.is_running());

        // Second start is a no-op: no second Started event arrives.
        service.start(0).unwrap();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        service.stop();
        loop {
            if matches!(rx.recv().await.unwrap(), SentimentEvent::Stopped { .. }) {
                break;
            }
        }
        assert!(!service.is_running());
    }
}

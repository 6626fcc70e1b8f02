//! Processing run orchestration: capture, analyze, verdict, hardware
//! notification, reset.
//!
//! At most one run is in flight at a time; the station can only do one thing.
//! Start requests only flip the state token and return, the run body executes
//! on a blocking worker. The four hardware commands of a run are issued in
//! the fixed order Start, Defect or Normal, Reset; Reset is a finalizer and
//! reaches the board on every exit path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{error, info, warn};

use crate::analyzer::{self, Thresholds};
use crate::capture::{CameraDevice, CaptureCoordinator};
use crate::hardware::{CommandChannel, SerialLink};
use crate::history::{ProcessingRun, RunHistory, Verdict};

/// Session state token. `Cooldown` still rejects start requests: the
/// hardware needs its physical reset time before the next run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StationState {
    Idle = 0,
    Running = 1,
    Cooldown = 2,
}

impl StationState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => StationState::Running,
            2 => StationState::Cooldown,
            _ => StationState::Idle,
        }
    }
}

/// Synchronous answer to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A run was already active; nothing was sent and no worker spawned.
    Rejected,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { verdict: Verdict, frames_analyzed: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub frames_per_run: usize,
    pub cooldown: Duration,
    pub thresholds: Thresholds,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            frames_per_run: 4,
            cooldown: Duration::from_secs(5),
            thresholds: Thresholds::default(),
        }
    }
}

/// The state machine root. Cheap to clone across tasks via the inner `Arc`.
pub struct Orchestrator<C: CameraDevice + 'static, L: SerialLink + 'static> {
    inner: Arc<Inner<C, L>>,
}

impl<C: CameraDevice + 'static, L: SerialLink + 'static> Clone for Orchestrator<C, L> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

struct Inner<C: CameraDevice, L: SerialLink> {
    state: AtomicU8,
    cancel: AtomicBool,
    coordinator: Mutex<CaptureCoordinator<C>>,
    channel: Mutex<CommandChannel<L>>,
    history: Arc<RunHistory>,
    settings: RunSettings,
}

impl<C: CameraDevice + 'static, L: SerialLink + 'static> Orchestrator<C, L> {
    pub fn new(
        coordinator: CaptureCoordinator<C>,
        channel: CommandChannel<L>,
        history: Arc<RunHistory>,
        settings: RunSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicU8::new(StationState::Idle as u8),
                cancel: AtomicBool::new(false),
                coordinator: Mutex::new(coordinator),
                channel: Mutex::new(channel),
                history,
                settings,
            }),
        }
    }

    pub fn state(&self) -> StationState {
        StationState::from_u8(self.inner.state.load(Ordering::SeqCst))
    }

    /// Request a run. Returns synchronously; the run body executes on a
    /// spawned worker. Rejected without side effects when a run is already
    /// active or cooling down.
    pub fn start(&self) -> StartOutcome {
        if !self.inner.try_begin() {
            warn!("Start request rejected: a run is already active");
            return StartOutcome::Rejected;
        }
        let inner = self.inner.clone();
        tokio::spawn(async move {
            drive(inner).await;
        });
        StartOutcome::Started
    }

    /// Run one full pass and wait for it, including the cooldown.
    /// `None` when the start request was rejected.
    pub async fn run_once(&self) -> Option<RunOutcome> {
        if !self.inner.try_begin() {
            warn!("Start request rejected: a run is already active");
            return None;
        }
        Some(drive(self.inner.clone()).await)
    }

    /// Operator escape hatch, valid in any state: cancel whatever is in
    /// flight, put the hardware back in its reset state, and force the
    /// session back to idle after the cooldown.
    pub async fn reset(&self) {
        info!("Operator reset requested");
        self.inner.cancel.store(true, Ordering::SeqCst);

        // Shares the channel mutex with the run finalizer, so the two can
        // never interleave conflicting commands on the wire.
        let inner = self.inner.clone();
        let sent = tokio::task::spawn_blocking(move || {
            inner.lock_channel().reset_all_devices()
        })
        .await;
        match sent {
            Ok(Err(e)) => error!("Reset command failed: {}", e),
            Err(e) => error!("Reset worker panicked: {}", e),
            Ok(Ok(())) => {}
        }

        self.inner.state.store(StationState::Cooldown as u8, Ordering::SeqCst);
        tokio::time::sleep(self.inner.settings.cooldown).await;
        self.inner.state.store(StationState::Idle as u8, Ordering::SeqCst);
        info!("Station reset; start requests re-armed");
    }
}

/// Worker wrapper: run body on the blocking pool, then cooldown, then re-arm.
async fn drive<C: CameraDevice + 'static, L: SerialLink + 'static>(
    inner: Arc<Inner<C, L>>,
) -> RunOutcome {
    let worker = {
        let inner = inner.clone();
        tokio::task::spawn_blocking(move || inner.execute())
    };
    let outcome = match worker.await {
        Ok(outcome) => outcome,
        // The reset guard already ran during unwind; the board is safe.
        Err(e) => {
            error!("Run worker panicked: {}", e);
            RunOutcome::Failed { reason: "run worker panicked".to_string() }
        }
    };

    match &outcome {
        RunOutcome::Completed { verdict, frames_analyzed } => {
            info!("Run completed: verdict {}, {} frames analyzed", verdict, frames_analyzed);
        }
        RunOutcome::Failed { reason } => warn!("Run failed: {}", reason),
    }

    inner.state.store(StationState::Cooldown as u8, Ordering::SeqCst);
    tokio::time::sleep(inner.settings.cooldown).await;
    inner.state.store(StationState::Idle as u8, Ordering::SeqCst);
    outcome
}

impl<C: CameraDevice, L: SerialLink> Inner<C, L> {
    /// Atomically claim the idle station. Losing the race is a no-op.
    fn try_begin(&self) -> bool {
        let claimed = self
            .state
            .compare_exchange(
                StationState::Idle as u8,
                StationState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if claimed {
            self.cancel.store(false, Ordering::SeqCst);
        }
        claimed
    }

    fn lock_channel(&self) -> MutexGuard<'_, CommandChannel<L>> {
        // The finalizer must still reach the board after a poisoning panic.
        self.channel.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The run body. Blocking; executes entirely on the worker.
    fn execute(&self) -> RunOutcome {
        let started_at = Local::now();
        let start_instant = Instant::now();
        info!("Processing run started");

        if let Err(e) = self.lock_channel().start_process() {
            warn!("Start command not delivered: {}", e);
        }
        let reset_guard = ResetGuard { inner: self };

        let batch = self
            .coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .capture_batch(self.settings.frames_per_run, &self.cancel);
        let frames = match batch {
            Ok(frames) if !frames.is_empty() => frames,
            Ok(_) => {
                error!("Capture produced no usable frames");
                return RunOutcome::Failed { reason: "capture failure".to_string() };
            }
            Err(e) => {
                error!("{}", e);
                return RunOutcome::Failed { reason: format!("capture failure: {}", e) };
            }
        };

        let mut defects_found = false;
        let mut frames_analyzed = 0;
        for frame in &frames {
            if self.cancel.load(Ordering::SeqCst) {
                warn!("Run cancelled; reporting results so far");
                break;
            }
            // Per-frame failures are contained: analyze_file reports the
            // fail-safe defective verdict and the run continues.
            let analysis = analyzer::analyze_file(&frame.path, self.settings.thresholds);
            if let Some(annotated) = &analysis.annotated {
                let path = annotated_path(&frame.path);
                if let Err(e) = annotated.save(&path) {
                    warn!("Failed to save annotated image {:?}: {}", path, e);
                }
            }
            defects_found |= analysis.is_defective;
            frames_analyzed += 1;
        }

        let verdict = if defects_found { Verdict::Defective } else { Verdict::Normal };
        let sent = match verdict {
            Verdict::Defective => self.lock_channel().handle_defect(),
            Verdict::Normal => self.lock_channel().handle_normal(),
        };
        if let Err(e) = sent {
            warn!("Verdict command not delivered: {}", e);
        }

        // Reset goes out now, after the verdict and before the record.
        drop(reset_guard);

        let run = ProcessingRun::new(started_at, verdict, start_instant.elapsed(), frames.len());
        if let Err(e) = self.history.append(&run) {
            error!("Failed to record run: {}", e);
        }

        RunOutcome::Completed { verdict, frames_analyzed }
    }
}

/// Guarantees `RESET` on every exit path of the run body, panics included.
struct ResetGuard<'a, C: CameraDevice, L: SerialLink> {
    inner: &'a Inner<C, L>,
}

impl<C: CameraDevice, L: SerialLink> Drop for ResetGuard<'_, C, L> {
    fn drop(&mut self) {
        if let Err(e) = self.inner.lock_channel().reset_all_devices() {
            error!("Reset command failed: {}", e);
        }
    }
}

fn annotated_path(frame_path: &Path) -> PathBuf {
    let stem = frame_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame");
    frame_path.with_file_name(format!("{}_annotated.png", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QcError;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex as StdMutex;

    struct SlowCamera {
        delay: Duration,
    }

    impl CameraDevice for SlowCamera {
        fn read_frame(&mut self) -> Result<RgbImage, QcError> {
            std::thread::sleep(self.delay);
            Ok(RgbImage::from_pixel(32, 32, Rgb([255, 255, 255])))
        }
    }

    #[derive(Clone, Default)]
    struct SharedLink {
        lines: Arc<StdMutex<Vec<String>>>,
    }

    impl SharedLink {
        fn commands(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl SerialLink for SharedLink {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), QcError> {
            let line = String::from_utf8_lossy(bytes).trim_end().to_string();
            self.lines.lock().unwrap().push(line);
            Ok(())
        }
    }

    fn orchestrator(
        read_delay: Duration,
        dir: &std::path::Path,
    ) -> (Orchestrator<SlowCamera, SharedLink>, SharedLink, Arc<RunHistory>) {
        let link = SharedLink::default();
        let history = Arc::new(RunHistory::new(&dir.join("history.db")).unwrap());
        let coordinator = CaptureCoordinator::new(
            SlowCamera { delay: read_delay },
            dir.join("captures"),
            Duration::ZERO,
        );
        let channel = CommandChannel::new(link.clone(), Duration::ZERO);
        let settings = RunSettings {
            frames_per_run: 2,
            cooldown: Duration::from_millis(10),
            thresholds: Thresholds::default(),
        };
        (
            Orchestrator::new(coordinator, channel, history.clone(), settings),
            link,
            history,
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_rejected_while_running() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, link, _history) =
            orchestrator(Duration::from_millis(100), dir.path());

        assert_eq!(orchestrator.start(), StartOutcome::Started);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(orchestrator.state(), StationState::Running);
        assert_eq!(orchestrator.start(), StartOutcome::Rejected);

        // Wait out the run plus cooldown.
        for _ in 0..100 {
            if orchestrator.state() == StationState::Idle {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(orchestrator.state(), StationState::Idle);

        // The rejected request issued no second START.
        let starts = link.commands().iter().filter(|c| *c == "START").count();
        assert_eq!(starts, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_transitions_back_to_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, _link, _history) = orchestrator(Duration::ZERO, dir.path());

        let outcome = orchestrator.run_once().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(orchestrator.state(), StationState::Idle);

        // Re-armed: a second run is accepted.
        assert!(orchestrator.run_once().await.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reset_sends_reset_and_forces_idle() {
        let dir = tempfile::tempdir().unwrap();
        let (orchestrator, link, _history) = orchestrator(Duration::ZERO, dir.path());

        orchestrator.reset().await;
        assert_eq!(orchestrator.state(), StationState::Idle);
        assert_eq!(link.commands(), vec!["RESET".to_string()]);
    }

    #[test]
    fn test_annotated_path_derivation() {
        let path = annotated_path(Path::new("/captures/image_20260825_101530_1.png"));
        assert_eq!(
            path,
            Path::new("/captures/image_20260825_101530_1_annotated.png")
        );
    }
}

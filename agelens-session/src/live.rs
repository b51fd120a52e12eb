//! Periodic automatic analysis over a stream of camera frames.

use std::{sync::Arc, time::Duration};

use agelens_core::{
    AnalysisError, AnalysisResult, DetectionFallbackChain, FaceAnalyzer, ImageFrame,
    RemoteEstimator,
};
use log::{debug, info, warn};
use tokio::{
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

use crate::session::{AnalysisSession, SessionStatus};

/// Producer of the most recent camera frame.
pub trait FrameSource: Send + 'static {
    /// `Ok(None)` while no frame has arrived yet; `Err` once the camera is gone.
    fn latest(&mut self) -> Result<Option<ImageFrame>, SourceClosed>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("frame source closed")]
pub struct SourceClosed;

impl FrameSource for watch::Receiver<Option<ImageFrame>> {
    fn latest(&mut self) -> Result<Option<ImageFrame>, SourceClosed> {
        if self.has_changed().is_err() {
            return Err(SourceClosed);
        }
        Ok(self.borrow_and_update().clone())
    }
}

/// What one live tick produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub token: u64,
    /// `false` when the session moved on before this result arrived.
    pub applied: bool,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// Handle to a running live-detection task.
///
/// Dropping the handle aborts the task.
pub struct LiveDetectionHandle {
    stop: watch::Sender<bool>,
    reports: mpsc::UnboundedReceiver<CycleReport>,
    task: Option<JoinHandle<usize>>,
}

impl LiveDetectionHandle {
    /// Next cycle report, or `None` once the task has ended.
    pub async fn next_report(&mut self) -> Option<CycleReport> {
        self.reports.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop ticking and wait for the task. Returns the number of cycles run.
    pub async fn stop(mut self) -> usize {
        let _ = self.stop.send(true);
        match self.task.take() {
            Some(task) => task.await.unwrap_or_else(|err| {
                warn!("live detection task ended abnormally: {err}");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for LiveDetectionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Run automatic analysis on the latest frame every `period`.
///
/// The first tick fires immediately. Ticks that land while a cycle is still
/// loading are skipped. The task ends when the source closes or the handle
/// is stopped; a cycle already in flight finishes, but no new one starts.
pub fn spawn_live_detection<A, R, F>(
    session: Arc<Mutex<AnalysisSession>>,
    chain: Arc<DetectionFallbackChain<A, R>>,
    mut source: F,
    period: Duration,
) -> LiveDetectionHandle
where
    A: FaceAnalyzer + 'static,
    R: RemoteEstimator + 'static,
    F: FrameSource,
{
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let (report_tx, report_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles = 0usize;
        info!("live detection started (every {period:?})");

        loop {
            // Stop wins over a tick that became due during the last cycle.
            tokio::select! {
                biased;
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
                _ = interval.tick() => {}
            }
            if *stop_rx.borrow() {
                break;
            }

            let frame = match source.latest() {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(SourceClosed) => {
                    info!("camera stopped; ending live detection");
                    break;
                }
            };

            let ticket = {
                let mut session = session.lock().await;
                if session.status() == SessionStatus::Loading {
                    debug!("previous cycle still loading; skipping tick");
                    continue;
                }
                session.load_frame(frame);
                match session.begin_analysis() {
                    Ok(ticket) => ticket,
                    Err(err) => {
                        debug!("live tick skipped: {err}");
                        continue;
                    }
                }
            };

            let outcome = ticket.execute(&chain).await;
            let report = CycleReport {
                token: outcome.token,
                applied: false,
                result: outcome.result.clone(),
            };
            let applied = session.lock().await.complete(outcome);
            cycles += 1;
            if report_tx.send(CycleReport { applied, ..report }).is_err() {
                debug!("no listener for live reports");
            }
        }
        cycles
    });

    LiveDetectionHandle {
        stop: stop_tx,
        reports: report_rx,
        task: Some(task),
    }
}

//! Live webcam mode: capture on a dedicated thread, analyze periodically,
//! print one JSON line per cycle.

use std::{
    io::Write,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use agelens_core::{DetectionRecord, ImageFrame, Size};
use agelens_session::{AnalysisSession, CycleReport, SessionConfig, spawn_live_detection};
use agelens_utils::{WebcamCapture, config::AppSettings, config::LiveSettings, list_webcam_devices};
use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::{Mutex, oneshot, watch};

use crate::Chain;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LiveLine<'a> {
    cycle: usize,
    token: u64,
    applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    records: Option<&'a [DetectionRecord]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Camera thread plus the flag that stops it.
struct CaptureThread {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl CaptureThread {
    /// Open the camera on its own thread and publish frames into `frames`.
    /// Resolves once the camera is streaming, or with the open error.
    async fn start(
        live: LiveSettings,
        frames: watch::Sender<Option<ImageFrame>>,
    ) -> Result<(Self, (u32, u32))> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();
        let flag = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("agelens-webcam".into())
            .spawn(move || capture_loop(live, frames, flag, ready_tx))
            .context("failed to spawn capture thread")?;

        let resolution = ready_rx
            .await
            .map_err(|_| anyhow!("capture thread exited before opening the camera"))??;
        Ok((
            Self {
                stop,
                handle: Some(handle),
            },
            resolution,
        ))
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("capture thread panicked");
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn capture_loop(
    live: LiveSettings,
    frames: watch::Sender<Option<ImageFrame>>,
    stop: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<(u32, u32)>>,
) {
    let mut camera = match WebcamCapture::open(&live) {
        Ok(camera) => {
            let _ = ready.send(Ok(camera.resolution()));
            camera
        }
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };

    let mut captured = 0u64;
    while !stop.load(Ordering::Relaxed) {
        match camera.capture_frame() {
            Ok(image) => {
                captured += 1;
                if frames.send(Some(ImageFrame::new(image))).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!("Failed to capture frame: {err:#}");
                thread::sleep(Duration::from_millis(100));
            }
        }
    }
    debug!("capture thread exiting after {captured} frame(s)");
    // Dropping `frames` tells the live loop the camera has stopped.
}

/// Run live detection until `cycles` complete, the camera stops, or Ctrl+C.
pub async fn run_webcam_mode(
    settings: &AppSettings,
    chain: Arc<Chain>,
    cycles: Option<usize>,
) -> Result<()> {
    let live = settings.live.clone();
    match list_webcam_devices() {
        Ok(devices) => {
            info!("Available webcam devices:");
            for (idx, name) in devices {
                info!("  [{idx}] {name}");
            }
        }
        Err(err) => warn!("Could not enumerate webcam devices: {err}"),
    }

    let (frames_tx, frames_rx) = watch::channel(None);
    let (mut capture, (width, height)) = CaptureThread::start(live.clone(), frames_tx)
        .await
        .context("Failed to open webcam")?;
    info!("Webcam opened: {width}x{height}");

    let mut session = AnalysisSession::new(SessionConfig::from(settings));
    session.set_display_size(Size::new(width as f32, height as f32));
    let session = Arc::new(Mutex::new(session));

    let mut handle = spawn_live_detection(session, chain, frames_rx, live.period());
    match cycles {
        Some(n) => info!("Running {n} live cycle(s) every {:?}", live.period()),
        None => info!("Running live detection every {:?} (Ctrl+C to stop)", live.period()),
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut completed = 0usize;
    let mut stdout = std::io::stdout().lock();
    loop {
        tokio::select! {
            report = handle.next_report() => {
                let Some(report) = report else {
                    info!("Live detection ended");
                    break;
                };
                completed += 1;
                write_line(&mut stdout, completed, &report)?;
                if cycles.is_some_and(|n| completed >= n) {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted; stopping live detection");
                break;
            }
        }
    }

    let ran = handle.stop().await;
    capture.shutdown();
    info!("Live detection complete: {ran} cycle(s) analyzed");
    Ok(())
}

fn write_line(out: &mut impl Write, cycle: usize, report: &CycleReport) -> Result<()> {
    let (records, error) = match &report.result {
        Ok(result) => (Some(result.records.as_slice()), None),
        Err(err) => (None, Some(err.to_string())),
    };
    let line = LiveLine {
        cycle,
        token: report.token,
        applied: report.applied,
        records,
        error,
    };
    serde_json::to_writer(&mut *out, &line).context("failed to serialize live result")?;
    writeln!(out).context("failed to write live result")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

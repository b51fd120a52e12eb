use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use agelens_core::{
    AgeGender, AnalysisError, ChainSettings, DetectOptions, DetectionFallbackChain,
    DetectionSource, FaceAnalyzer, FaceBox, Gender, HttpRemoteEstimator, ImageFrame, Point, Rect,
    Size,
};
use agelens_session::{
    AnalysisSession, CycleOutcome, GestureEvent, MouseInput, SessionStatus, spawn_live_detection,
};
use image::{Rgb, RgbImage};
use tokio::sync::{Mutex, Notify, watch};

/// Finds one face at a fixed spot, or nothing once `blind` is set.
#[derive(Default)]
struct Scripted {
    blind: AtomicBool,
    calls: AtomicUsize,
}

impl FaceAnalyzer for Scripted {
    fn detect(&self, _: &RgbImage, _: &DetectOptions) -> anyhow::Result<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.blind.load(Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(vec![FaceBox {
            rect: Rect::new(200.0, 100.0, 160.0, 200.0),
            score: 0.92,
        }])
    }

    fn age_gender(&self, _: &RgbImage) -> anyhow::Result<Option<AgeGender>> {
        Ok(Some(AgeGender::new(41.0, Gender::Male, 0.88)))
    }
}

/// Blocks inside `detect` until released, so a stop can land mid-cycle.
struct Gated {
    entered: Arc<Notify>,
    release: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
    calls: AtomicUsize,
}

impl FaceAnalyzer for Gated {
    fn detect(&self, _: &RgbImage, _: &DetectOptions) -> anyhow::Result<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        let _ = self.release.lock().unwrap().recv();
        Ok(vec![FaceBox {
            rect: Rect::new(200.0, 100.0, 160.0, 200.0),
            score: 0.9,
        }])
    }

    fn age_gender(&self, _: &RgbImage) -> anyhow::Result<Option<AgeGender>> {
        Ok(Some(AgeGender::new(29.0, Gender::Female, 0.8)))
    }
}

type Chain = DetectionFallbackChain<Scripted, Option<HttpRemoteEstimator>>;

fn chain(analyzer: Scripted) -> Chain {
    DetectionFallbackChain::new(Arc::new(analyzer), None, ChainSettings::default())
}

fn frame() -> ImageFrame {
    ImageFrame::new(RgbImage::from_pixel(800, 600, Rgb([90, 110, 130])))
}

fn session() -> AnalysisSession {
    let mut session = AnalysisSession::default();
    session.load_frame(frame());
    session.set_display_size(Size::new(400.0, 300.0));
    session
}

#[tokio::test]
async fn automatic_analysis_projects_overlay() {
    let chain = chain(Scripted::default());
    let mut session = session();

    let result = session.run_analysis(&chain).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result.records[0].source, DetectionSource::Model);
    assert!(!result.is_estimate());

    assert_eq!(session.status(), SessionStatus::Ready);
    let shape = &session.overlay()[0];
    assert_eq!(shape.rect, Rect::new(100.0, 50.0, 80.0, 100.0));
    assert_eq!(shape.label, "Age: 41 Gender: Male");
}

#[tokio::test]
async fn no_faces_puts_session_in_error() {
    let analyzer = Scripted::default();
    analyzer.blind.store(true, Ordering::SeqCst);
    let chain = chain(analyzer);
    let mut session = session();

    let err = session.run_analysis(&chain).await.unwrap_err();
    assert_eq!(err, AnalysisError::NoFacesDetected);
    assert_eq!(session.status(), SessionStatus::Error);
    assert_eq!(session.error().map(ToString::to_string).as_deref(), Some("No faces detected"));
    assert!(session.overlay().is_empty());
}

#[tokio::test]
async fn manual_selection_with_blind_detector_synthesizes_record() {
    let analyzer = Scripted::default();
    analyzer.blind.store(true, Ordering::SeqCst);
    let chain = chain(analyzer);
    let mut session = session();
    session.set_selection_mode(true);

    session.handle_mouse(MouseInput::Down(Point::new(20.0, 20.0)));
    session.handle_mouse(MouseInput::Move(Point::new(120.0, 140.0)));
    session.handle_mouse(MouseInput::Up);

    let result = session.run_analysis(&chain).await.unwrap().clone();
    let record = &result.records[0];
    assert_eq!(record.source, DetectionSource::ManualFallback);
    assert!(record.is_estimate);
    assert_eq!(record.age, 30.0);
    assert_eq!(record.bbox, Rect::new(40.0, 40.0, 200.0, 240.0));

    // Drawn where the user dragged, even though nothing was detected.
    assert_eq!(session.overlay()[0].rect, Rect::new(20.0, 20.0, 100.0, 120.0));
    assert!(session.selection_mode());
    assert_eq!(session.selection_rect(), None);
}

#[tokio::test]
async fn superseded_cycle_does_not_overwrite_newer_result() {
    let chain = chain(Scripted::default());
    let mut session = session();

    let stale = session.begin_analysis().unwrap();
    let fresh = session.begin_analysis().unwrap();

    let fresh_outcome = fresh.execute(&chain).await;
    let stale_outcome = stale.execute(&chain).await;
    assert!(session.complete(fresh_outcome));
    assert!(!session.complete(stale_outcome));
    assert_eq!(session.status(), SessionStatus::Ready);
}

#[tokio::test]
async fn gesture_before_frame_is_ignored() {
    let mut session = AnalysisSession::default();
    session.set_selection_mode(true);
    session.handle_gesture(GestureEvent::Start(Point::new(0.0, 0.0)));
    assert_eq!(session.selection_rect(), None);
    assert_eq!(session.begin_analysis().unwrap_err(), AnalysisError::NoFrame);
}

#[tokio::test(start_paused = true)]
async fn live_loop_runs_until_camera_stops() {
    let chain = Arc::new(chain(Scripted::default()));
    let session = Arc::new(Mutex::new(session()));
    let (tx, rx) = watch::channel(Some(frame()));

    let mut handle =
        spawn_live_detection(session.clone(), chain.clone(), rx, Duration::from_secs(1));

    let first = handle.next_report().await.unwrap();
    assert!(first.applied);
    assert_eq!(first.result.as_ref().unwrap().len(), 1);

    let second = handle.next_report().await.unwrap();
    assert!(second.token > first.token);
    assert_eq!(session.lock().await.status(), SessionStatus::Ready);

    drop(tx);
    while handle.next_report().await.is_some() {}
    assert!(handle.stop().await >= 2);
}

#[tokio::test(start_paused = true)]
async fn live_ticks_wait_for_frames_and_skip_while_loading() {
    let chain = Arc::new(chain(Scripted::default()));
    let session = Arc::new(Mutex::new(session()));
    let (tx, rx) = watch::channel(None);

    // Another caller holds the session in Loading.
    let ticket = session.lock().await.begin_analysis().unwrap();

    let mut handle =
        spawn_live_detection(session.clone(), chain.clone(), rx, Duration::from_millis(500));
    tx.send(Some(frame())).unwrap();

    let idle = tokio::time::timeout(Duration::from_secs(3), handle.next_report()).await;
    assert!(idle.is_err());
    assert_eq!(chain.analyzer().calls.load(Ordering::SeqCst), 0);

    session.lock().await.complete(CycleOutcome {
        token: ticket.token(),
        manual: false,
        result: Err(AnalysisError::NoFacesDetected),
    });

    let report = handle.next_report().await.unwrap();
    assert!(report.applied);
    assert!(report.result.is_ok());
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stopping_ends_the_loop() {
    let chain = Arc::new(chain(Scripted::default()));
    let session = Arc::new(Mutex::new(session()));
    let (_tx, rx) = watch::channel(Some(frame()));

    let mut handle = spawn_live_detection(session, chain, rx, Duration::from_secs(1));
    handle.next_report().await.unwrap();
    let cycles = handle.stop().await;
    assert!(cycles >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_during_a_cycle_starts_no_further_detection() {
    for _ in 0..20 {
        let entered = Arc::new(Notify::new());
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let analyzer = Gated {
            entered: entered.clone(),
            release: std::sync::Mutex::new(release_rx),
            calls: AtomicUsize::new(0),
        };
        let chain: Arc<DetectionFallbackChain<Gated, Option<HttpRemoteEstimator>>> = Arc::new(
            DetectionFallbackChain::new(Arc::new(analyzer), None, ChainSettings::default()),
        );
        let session = Arc::new(Mutex::new(session()));
        let (_tx, rx) = watch::channel(Some(frame()));

        let handle = spawn_live_detection(session, chain.clone(), rx, Duration::from_millis(5));
        entered.notified().await;

        // Several ticks come due while the detector is held.
        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let _ = release_tx.send(());
        });
        let cycles = handle.stop().await;
        releaser.join().unwrap();

        assert_eq!(cycles, 1);
        assert_eq!(chain.analyzer().calls.load(Ordering::SeqCst), 1);
    }
}

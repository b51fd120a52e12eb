//! Session state for one image surface: current frame, selection, results,
//! status, and the cycle token that keeps stale analyses from landing.

use std::time::{Duration, Instant};

use agelens_core::{
    AnalysisError, AnalysisResult, CoordinateMapper, DetectionFallbackChain, DisplaySpace,
    FaceAnalyzer, ImageFrame, NaturalSpace, Point, Rect, RemoteEstimator, Size,
};
use agelens_utils::config::AppSettings;
use log::{debug, warn};
use serde::Serialize;

use crate::{
    interaction::{GestureEvent, MouseInput, SelectionState, SelectionTracker, TouchPhase},
    rendering::{OverlayShape, ResizeDebouncer, ResultRenderer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub min_selection: f32,
    pub resize_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&AppSettings::default())
    }
}

impl From<&AppSettings> for SessionConfig {
    fn from(settings: &AppSettings) -> Self {
        Self {
            min_selection: settings.selection.min_size,
            resize_debounce: settings.overlay.resize_debounce(),
        }
    }
}

/// Everything one analysis cycle needs, detached from the session.
#[derive(Debug, Clone)]
pub struct AnalysisTicket {
    token: u64,
    frame: ImageFrame,
    selection: Option<Rect<NaturalSpace>>,
}

impl AnalysisTicket {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Natural-space selection for manual analysis, `None` for automatic.
    pub fn selection(&self) -> Option<Rect<NaturalSpace>> {
        self.selection
    }

    pub async fn execute<A, R>(self, chain: &DetectionFallbackChain<A, R>) -> CycleOutcome
    where
        A: FaceAnalyzer + 'static,
        R: RemoteEstimator,
    {
        let result = chain.analyze(&self.frame, self.selection).await;
        CycleOutcome {
            token: self.token,
            manual: self.selection.is_some(),
            result,
        }
    }
}

/// The finished work of one cycle, waiting to be applied.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub token: u64,
    pub manual: bool,
    pub result: Result<AnalysisResult, AnalysisError>,
}

/// Owner of all mutable state for one image surface.
#[derive(Debug)]
pub struct AnalysisSession {
    frame: Option<ImageFrame>,
    tracker: SelectionTracker,
    selection_mode: bool,
    status: SessionStatus,
    last_result: Option<AnalysisResult>,
    error: Option<AnalysisError>,
    hint: Option<String>,
    token: u64,
    display: Option<Size<DisplaySpace>>,
    debouncer: ResizeDebouncer,
    overlay: Vec<OverlayShape>,
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl AnalysisSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            frame: None,
            tracker: SelectionTracker::new(config.min_selection),
            selection_mode: false,
            status: SessionStatus::Idle,
            last_result: None,
            error: None,
            hint: None,
            token: 0,
            display: None,
            debouncer: ResizeDebouncer::new(config.resize_debounce),
            overlay: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn frame(&self) -> Option<&ImageFrame> {
        self.frame.as_ref()
    }

    pub fn last_result(&self) -> Option<&AnalysisResult> {
        self.last_result.as_ref()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    /// Guidance shown while manual mode waits for a selection.
    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn current_token(&self) -> u64 {
        self.token
    }

    pub fn selection_mode(&self) -> bool {
        self.selection_mode
    }

    pub fn selection_state(&self) -> SelectionState {
        self.tracker.state()
    }

    /// The rectangle to draw for the current gesture or confirmed selection.
    pub fn selection_rect(&self) -> Option<Rect<DisplaySpace>> {
        self.tracker.state().rect()
    }

    pub fn display_size(&self) -> Option<Size<DisplaySpace>> {
        self.display
    }

    /// Shapes for the last result in the current layout.
    ///
    /// While a new cycle is loading, the previous shapes remain until it completes.
    pub fn overlay(&self) -> &[OverlayShape] {
        &self.overlay
    }

    /// Replace the image. Clears selection, results and errors, and
    /// supersedes any in-flight cycle.
    pub fn load_frame(&mut self, frame: ImageFrame) {
        debug!(
            "loading {}x{} frame",
            frame.natural_width(),
            frame.natural_height()
        );
        self.frame = Some(frame);
        self.clear_cycle_state();
        if self.selection_mode {
            self.hint = Some(AnalysisError::SelectionRequired.to_string());
        }
    }

    /// Drop the image and leave manual mode.
    pub fn reset(&mut self) {
        self.frame = None;
        self.selection_mode = false;
        self.hint = None;
        self.clear_cycle_state();
    }

    fn clear_cycle_state(&mut self) {
        self.tracker.reset();
        self.last_result = None;
        self.error = None;
        self.overlay.clear();
        self.status = SessionStatus::Idle;
        self.token += 1;
    }

    pub fn set_selection_mode(&mut self, enabled: bool) {
        self.tracker.reset();
        self.selection_mode = enabled;
        self.hint = enabled.then(|| AnalysisError::SelectionRequired.to_string());
    }

    /// Feed a gesture step. Ignored outside manual mode or without an image.
    pub fn handle_gesture(&mut self, event: GestureEvent) -> SelectionState {
        if !self.selection_mode || self.frame.is_none() {
            return self.tracker.state();
        }
        let state = self.tracker.handle(event);
        match state {
            SelectionState::Confirmed(_) => self.hint = None,
            SelectionState::Idle => {
                self.hint = Some(AnalysisError::SelectionRequired.to_string());
            }
            SelectionState::Dragging { .. } => {}
        }
        state
    }

    pub fn handle_mouse(&mut self, input: MouseInput) -> SelectionState {
        self.handle_gesture(input.into())
    }

    pub fn handle_touch(
        &mut self,
        phase: TouchPhase,
        touches: &[Point<DisplaySpace>],
    ) -> SelectionState {
        match crate::interaction::touch_gesture(phase, touches) {
            Some(event) => self.handle_gesture(event),
            None => self.tracker.state(),
        }
    }

    /// Apply a new display size immediately and re-project the overlay.
    pub fn set_display_size(&mut self, size: Size<DisplaySpace>) {
        self.debouncer.cancel();
        self.display = Some(size);
        self.reproject();
    }

    /// Queue a display size from a resize event; see [`Self::poll_layout`].
    pub fn resize_display(&mut self, size: Size<DisplaySpace>, now: Instant) {
        self.debouncer.resize(size, now);
    }

    /// Apply a queued resize once it has settled. Returns `true` when the
    /// layout changed.
    pub fn poll_layout(&mut self, now: Instant) -> bool {
        match self.debouncer.poll(now) {
            Some(size) => {
                self.display = Some(size);
                self.reproject();
                true
            }
            None => false,
        }
    }

    fn reproject(&mut self) {
        let (Some(result), Some(display), Some(frame)) =
            (&self.last_result, self.display, &self.frame)
        else {
            return;
        };
        match ResultRenderer::project(result, display, frame.natural_size()) {
            Ok(shapes) => self.overlay = shapes,
            Err(err) => {
                // Keep the old shapes; the next layout event retries.
                warn!("overlay projection skipped: {err}");
            }
        }
    }

    /// Start a cycle: validate preconditions, advance the token, and hand
    /// back what the detector needs.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, AnalysisError> {
        let frame = self.frame.clone().ok_or(AnalysisError::NoFrame)?;

        let selection = if self.selection_mode {
            let Some(rect) = self.tracker.confirmed() else {
                self.hint = Some(AnalysisError::SelectionRequired.to_string());
                return Err(AnalysisError::SelectionRequired);
            };
            let display = self.display.unwrap_or_default();
            let mapper = CoordinateMapper::new(display, frame.natural_size())?;
            Some(mapper.to_natural(&rect))
        } else {
            None
        };

        self.token += 1;
        self.status = SessionStatus::Loading;
        self.last_result = None;
        self.error = None;
        debug!(
            "analysis cycle {} started ({})",
            self.token,
            if selection.is_some() { "manual" } else { "automatic" }
        );
        Ok(AnalysisTicket {
            token: self.token,
            frame,
            selection,
        })
    }

    /// Apply a finished cycle. Returns `false` when a newer cycle or frame
    /// has superseded it and the outcome was discarded.
    pub fn complete(&mut self, outcome: CycleOutcome) -> bool {
        if outcome.token != self.token {
            debug!(
                "discarding stale cycle {} (current {})",
                outcome.token, self.token
            );
            return false;
        }
        match outcome.result {
            Ok(result) => {
                self.status = SessionStatus::Ready;
                self.error = None;
                self.last_result = Some(result);
                self.overlay.clear();
                self.reproject();
            }
            Err(err) => {
                debug!("analysis cycle {} failed: {err}", outcome.token);
                self.status = SessionStatus::Error;
                self.error = Some(err);
                self.last_result = None;
                self.overlay.clear();
            }
        }
        if outcome.manual {
            self.tracker.reset();
        }
        true
    }

    /// Begin, execute and complete one cycle.
    pub async fn run_analysis<A, R>(
        &mut self,
        chain: &DetectionFallbackChain<A, R>,
    ) -> Result<&AnalysisResult, AnalysisError>
    where
        A: FaceAnalyzer + 'static,
        R: RemoteEstimator,
    {
        let ticket = self.begin_analysis()?;
        let outcome = ticket.execute(chain).await;
        self.complete(outcome);
        match (&self.last_result, &self.error) {
            (Some(result), _) => Ok(result),
            (None, Some(err)) => Err(err.clone()),
            (None, None) => Err(AnalysisError::NoFrame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agelens_core::{AgeGender, DetectionRecord, DetectionSource, Gender};
    use agelens_utils::config::FallbackSettings;
    use image::RgbImage;

    fn frame() -> ImageFrame {
        ImageFrame::new(RgbImage::new(800, 600))
    }

    fn result(age: f32) -> AnalysisResult {
        AnalysisResult::new(vec![DetectionRecord::new(
            AgeGender::new(age, Gender::Female, 0.8),
            0.9,
            Rect::new(100.0, 100.0, 200.0, 200.0),
            DetectionSource::Model,
            &FallbackSettings::default(),
        )])
    }

    fn outcome(
        ticket: &AnalysisTicket,
        result: Result<AnalysisResult, AnalysisError>,
    ) -> CycleOutcome {
        CycleOutcome {
            token: ticket.token(),
            manual: ticket.selection().is_some(),
            result,
        }
    }

    fn drag(session: &mut AnalysisSession, from: (f32, f32), to: (f32, f32)) {
        session.handle_gesture(GestureEvent::Start(Point::new(from.0, from.1)));
        session.handle_gesture(GestureEvent::Move(Point::new(to.0, to.1)));
        session.handle_gesture(GestureEvent::End);
    }

    #[test]
    fn analysis_without_frame_is_rejected() {
        let mut session = AnalysisSession::default();
        assert_eq!(session.begin_analysis().unwrap_err(), AnalysisError::NoFrame);
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn manual_mode_without_selection_sets_hint_only() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_selection_mode(true);
        let token = session.current_token();

        let err = session.begin_analysis().unwrap_err();
        assert_eq!(err, AnalysisError::SelectionRequired);
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(session.error().is_none());
        assert_eq!(session.hint(), Some("Click and drag to select a face in the image"));
        assert_eq!(session.current_token(), token);
    }

    #[test]
    fn stale_outcome_is_discarded() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_display_size(Size::new(400.0, 300.0));

        let first = session.begin_analysis().unwrap();
        let second = session.begin_analysis().unwrap();
        assert!(second.token() > first.token());

        assert!(!session.complete(outcome(&first, Ok(result(60.0)))));
        assert_eq!(session.status(), SessionStatus::Loading);
        assert!(session.last_result().is_none());

        assert!(session.complete(outcome(&second, Ok(result(25.0)))));
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.last_result().unwrap().records[0].age, 25.0);
        assert_eq!(session.overlay()[0].rect, Rect::new(50.0, 50.0, 100.0, 100.0));
    }

    #[test]
    fn loading_a_new_frame_supersedes_in_flight_cycle() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        let ticket = session.begin_analysis().unwrap();
        session.load_frame(frame());
        assert!(!session.complete(outcome(&ticket, Ok(result(40.0)))));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn failed_cycle_sets_error_status() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        let ticket = session.begin_analysis().unwrap();
        session.complete(outcome(&ticket, Err(AnalysisError::NoFacesDetected)));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(session.error(), Some(&AnalysisError::NoFacesDetected));
        assert!(session.overlay().is_empty());
    }

    #[test]
    fn manual_selection_maps_to_natural_space() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_display_size(Size::new(400.0, 300.0));
        session.set_selection_mode(true);
        drag(&mut session, (150.0, 120.0), (50.0, 20.0));
        assert_eq!(session.hint(), None);

        let ticket = session.begin_analysis().unwrap();
        assert_eq!(ticket.selection(), Some(Rect::new(100.0, 40.0, 200.0, 200.0)));

        assert!(session.complete(outcome(&ticket, Ok(result(33.0)))));
        // Mode stays on but the tracker is back to idle.
        assert!(session.selection_mode());
        assert_eq!(session.selection_state(), SelectionState::Idle);
        assert_eq!(
            session.begin_analysis().unwrap_err(),
            AnalysisError::SelectionRequired
        );
    }

    #[test]
    fn manual_selection_needs_a_display_size() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_selection_mode(true);
        drag(&mut session, (0.0, 0.0), (50.0, 50.0));
        assert!(matches!(
            session.begin_analysis(),
            Err(AnalysisError::InvalidGeometry { .. })
        ));
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[test]
    fn gestures_are_ignored_outside_manual_mode() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        drag(&mut session, (0.0, 0.0), (100.0, 100.0));
        assert_eq!(session.selection_rect(), None);
    }

    #[test]
    fn toggling_mode_and_reset_clear_selection() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_selection_mode(true);
        drag(&mut session, (0.0, 0.0), (100.0, 100.0));
        assert!(session.selection_rect().is_some());

        session.set_selection_mode(false);
        assert_eq!(session.selection_rect(), None);
        assert_eq!(session.hint(), None);

        session.set_selection_mode(true);
        session.handle_gesture(GestureEvent::Start(Point::new(1.0, 1.0)));
        session.reset();
        assert_eq!(session.selection_state(), SelectionState::Idle);
        assert!(session.frame().is_none());
        assert!(!session.selection_mode());
    }

    #[test]
    fn resize_reprojects_after_quiet_period() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_display_size(Size::new(400.0, 300.0));
        let ticket = session.begin_analysis().unwrap();
        session.complete(outcome(&ticket, Ok(result(30.0))));
        let token = session.current_token();

        let start = Instant::now();
        session.resize_display(Size::new(1600.0, 1200.0), start);
        assert!(!session.poll_layout(start + Duration::from_millis(50)));
        assert_eq!(session.overlay()[0].rect, Rect::new(50.0, 50.0, 100.0, 100.0));

        assert!(session.poll_layout(start + Duration::from_millis(100)));
        assert_eq!(session.overlay()[0].rect, Rect::new(200.0, 200.0, 400.0, 400.0));
        // Re-projection never starts a new cycle.
        assert_eq!(session.current_token(), token);
        assert_eq!(session.status(), SessionStatus::Ready);
    }

    #[test]
    fn previous_overlay_stays_while_loading() {
        let mut session = AnalysisSession::default();
        session.load_frame(frame());
        session.set_display_size(Size::new(400.0, 300.0));
        let ticket = session.begin_analysis().unwrap();
        session.complete(outcome(&ticket, Ok(result(30.0))));

        let _next = session.begin_analysis().unwrap();
        assert_eq!(session.status(), SessionStatus::Loading);
        assert!(session.last_result().is_none());
        assert_eq!(session.overlay().len(), 1);
    }
}

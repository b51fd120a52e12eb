//! Interactive analysis state for agelens.
//!
//! Tracks manual face selections, owns the per-image analysis session with
//! its cycle tokens, projects results onto the current display layout, and
//! runs periodic live detection over camera frames.

/// Pointer and touch selection gestures.
pub mod interaction;
/// Periodic detection over a frame source.
pub mod live;
/// Overlay projection and resize debouncing.
pub mod rendering;
pub mod session;

pub use interaction::{
    GestureEvent, MouseInput, SelectionState, SelectionTracker, TouchPhase, touch_gesture,
};
pub use live::{CycleReport, FrameSource, LiveDetectionHandle, SourceClosed, spawn_live_detection};
pub use rendering::{OverlayShape, OverlayStyle, ResizeDebouncer, ResultRenderer};
pub use session::{AnalysisSession, AnalysisTicket, CycleOutcome, SessionConfig, SessionStatus};

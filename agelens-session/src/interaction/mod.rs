//! Pointer and touch handling for manual face selection.

pub mod selection;

pub use selection::{
    DEFAULT_MIN_SELECTION, GestureEvent, MouseInput, SelectionState, SelectionTracker, TouchPhase,
    touch_gesture, transition,
};

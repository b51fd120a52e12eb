//! Click-drag-release selection in display space.
//!
//! [`transition`] is a pure function over [`SelectionState`]; the
//! [`SelectionTracker`] wrapper just stores the current state. Mouse and
//! touch input are both reduced to [`GestureEvent`]s before reaching it.

use agelens_core::{DisplaySpace, Point, Rect};

pub const DEFAULT_MIN_SELECTION: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionState {
    #[default]
    Idle,
    Dragging {
        anchor: Point<DisplaySpace>,
        rect: Rect<DisplaySpace>,
    },
    Confirmed(Rect<DisplaySpace>),
}

impl SelectionState {
    /// The rectangle currently drawn, in progress or confirmed.
    pub fn rect(&self) -> Option<Rect<DisplaySpace>> {
        match self {
            SelectionState::Idle => None,
            SelectionState::Dragging { rect, .. } | SelectionState::Confirmed(rect) => Some(*rect),
        }
    }

    pub fn confirmed(&self) -> Option<Rect<DisplaySpace>> {
        match self {
            SelectionState::Confirmed(rect) => Some(*rect),
            _ => None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, SelectionState::Dragging { .. })
    }
}

/// Pointer input reduced to the three gesture steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    Start(Point<DisplaySpace>),
    Move(Point<DisplaySpace>),
    End,
}

/// Raw mouse input on the image surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MouseInput {
    Down(Point<DisplaySpace>),
    Move(Point<DisplaySpace>),
    Up,
    /// Pointer left the image surface.
    Leave,
}

impl From<MouseInput> for GestureEvent {
    fn from(input: MouseInput) -> Self {
        match input {
            MouseInput::Down(point) => GestureEvent::Start(point),
            MouseInput::Move(point) => GestureEvent::Move(point),
            MouseInput::Up | MouseInput::Leave => GestureEvent::End,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// Map a touch event to a gesture step.
///
/// `touches` are the points currently on the surface. Start and move only
/// count with exactly one finger down; lifting or cancelling always ends.
pub fn touch_gesture(phase: TouchPhase, touches: &[Point<DisplaySpace>]) -> Option<GestureEvent> {
    match (phase, touches) {
        (TouchPhase::Start, [only]) => Some(GestureEvent::Start(*only)),
        (TouchPhase::Move, [only]) => Some(GestureEvent::Move(*only)),
        (TouchPhase::Start | TouchPhase::Move, _) => None,
        (TouchPhase::End | TouchPhase::Cancel, _) => Some(GestureEvent::End),
    }
}

/// Next state after `event`.
///
/// A start from `Idle` or `Confirmed` begins a fresh drag. An end keeps the
/// rectangle only when both sides exceed `min_size`.
pub fn transition(state: SelectionState, event: GestureEvent, min_size: f32) -> SelectionState {
    match (state, event) {
        (SelectionState::Dragging { .. }, GestureEvent::Start(_)) => state,
        (_, GestureEvent::Start(anchor)) => SelectionState::Dragging {
            anchor,
            rect: Rect::from_corners(anchor, anchor),
        },
        (SelectionState::Dragging { anchor, .. }, GestureEvent::Move(current)) => {
            SelectionState::Dragging {
                anchor,
                rect: Rect::from_corners(anchor, current),
            }
        }
        (SelectionState::Dragging { rect, .. }, GestureEvent::End) => {
            if rect.meets_min_size(min_size) {
                SelectionState::Confirmed(rect)
            } else {
                SelectionState::Idle
            }
        }
        (state, GestureEvent::Move(_) | GestureEvent::End) => state,
    }
}

#[derive(Debug, Clone)]
pub struct SelectionTracker {
    state: SelectionState,
    min_size: f32,
}

impl Default for SelectionTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SELECTION)
    }
}

impl SelectionTracker {
    pub fn new(min_size: f32) -> Self {
        Self {
            state: SelectionState::Idle,
            min_size,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn handle(&mut self, event: GestureEvent) -> SelectionState {
        self.state = transition(self.state, event, self.min_size);
        self.state
    }

    pub fn handle_mouse(&mut self, input: MouseInput) -> SelectionState {
        self.handle(input.into())
    }

    pub fn handle_touch(
        &mut self,
        phase: TouchPhase,
        touches: &[Point<DisplaySpace>],
    ) -> SelectionState {
        match touch_gesture(phase, touches) {
            Some(event) => self.handle(event),
            None => self.state,
        }
    }

    /// Drop any drag or confirmed selection.
    pub fn reset(&mut self) {
        self.state = SelectionState::Idle;
    }

    pub fn confirmed(&self) -> Option<Rect<DisplaySpace>> {
        self.state.confirmed()
    }
}

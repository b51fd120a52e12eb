//! Overlay projection and resize handling.

pub mod debounce;
pub mod overlay;

pub use debounce::ResizeDebouncer;
pub use overlay::{LABEL_BAND_HEIGHT, LABEL_INSET, OverlayShape, OverlayStyle, ResultRenderer};

//! Platform capture primitive.
//!
//! The service layers ownership (which client a capture belongs to) on top of
//! whatever the platform considers the capture window.

use crate::ids::WindowId;

pub trait PlatformCaptureController {
    /// Moves capture to `window`, or releases it.
    fn set_capture(&mut self, window: Option<WindowId>);
    fn capture_window(&self) -> Option<WindowId>;
}

impl<T: PlatformCaptureController + ?Sized> PlatformCaptureController for Box<T> {
    fn set_capture(&mut self, window: Option<WindowId>) {
        (**self).set_capture(window)
    }

    fn capture_window(&self) -> Option<WindowId> {
        (**self).capture_window()
    }
}

/// Capture tracked in memory, for hosts without a native capture concept.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryCapture {
    window: Option<WindowId>,
}

impl PlatformCaptureController for InMemoryCapture {
    fn set_capture(&mut self, window: Option<WindowId>) {
        self.window = window;
    }

    fn capture_window(&self) -> Option<WindowId> {
        self.window
    }
}

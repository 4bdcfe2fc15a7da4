//! Capabilities the service consumes from its host.

use crate::events::{Event, KeyEvent};
use crate::geometry::{Point, Rect};
use crate::ids::{ClientId, FrameSinkId, WindowId};
use crate::properties::{CONTAINER_ID, Properties, WindowType};
use crate::window::WindowHierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveLoopSource {
    Mouse,
    Touch,
}

/// A client's request for a new top-level.
#[derive(Debug, Clone, Copy)]
pub struct TopLevelRequest<'a> {
    pub client: ClientId,
    pub window: WindowId,
    pub window_type: WindowType,
    pub properties: &'a Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopLevelPlacement {
    pub parent: WindowId,
    pub bounds: Rect,
}

pub trait WindowServiceDelegate {
    /// Chooses the container and initial bounds for a new top-level, or
    /// declines the request.
    fn new_top_level(
        &mut self,
        request: &TopLevelRequest<'_>,
        hierarchy: &WindowHierarchy,
    ) -> Option<TopLevelPlacement>;

    /// Starts an interactive move. The host reports the outcome later through
    /// `WindowService::complete_window_move`.
    fn run_window_move_loop(&mut self, window: WindowId, source: MoveLoopSource, start: Point);

    fn cancel_window_move_loop(&mut self, window: WindowId);

    /// A key a client saw and reported as unhandled.
    fn on_unhandled_key_event(&mut self, _event: &KeyEvent) {}
}

impl<T: WindowServiceDelegate + ?Sized> WindowServiceDelegate for Box<T> {
    fn new_top_level(
        &mut self,
        request: &TopLevelRequest<'_>,
        hierarchy: &WindowHierarchy,
    ) -> Option<TopLevelPlacement> {
        (**self).new_top_level(request, hierarchy)
    }

    fn run_window_move_loop(&mut self, window: WindowId, source: MoveLoopSource, start: Point) {
        (**self).run_window_move_loop(window, source, start)
    }

    fn cancel_window_move_loop(&mut self, window: WindowId) {
        (**self).cancel_window_move_loop(window)
    }

    fn on_unhandled_key_event(&mut self, event: &KeyEvent) {
        (**self).on_unhandled_key_event(event)
    }
}

/// Placement policy used when the host has nothing more specific: honor a
/// container named in the request's properties, else the first display.
/// Move loops finish immediately with nothing to do, so the host must call
/// `complete_window_move` itself.
#[derive(Debug, Clone, Copy)]
pub struct PolicyDelegate {
    default_bounds: Rect,
}

impl PolicyDelegate {
    pub fn new(default_bounds: Rect) -> Self {
        Self { default_bounds }
    }

    pub fn placement(
        &self,
        request: &TopLevelRequest<'_>,
        hierarchy: &WindowHierarchy,
    ) -> Option<TopLevelPlacement> {
        let parent = match request.properties.get_window_id(CONTAINER_ID) {
            Some(container) if hierarchy.contains(container) => container,
            Some(container) => {
                tracing::debug!(container = ?container, "requested container does not exist");
                return None;
            }
            None => hierarchy.roots().first().copied()?,
        };
        Some(TopLevelPlacement {
            parent,
            bounds: self.default_bounds,
        })
    }
}

impl WindowServiceDelegate for PolicyDelegate {
    fn new_top_level(
        &mut self,
        request: &TopLevelRequest<'_>,
        hierarchy: &WindowHierarchy,
    ) -> Option<TopLevelPlacement> {
        self.placement(request, hierarchy)
    }

    fn run_window_move_loop(&mut self, window: WindowId, source: MoveLoopSource, start: Point) {
        tracing::debug!(window_id = ?window, ?source, ?start, "window move requested");
    }

    fn cancel_window_move_loop(&mut self, window: WindowId) {
        tracing::debug!(window_id = ?window, "window move cancelled");
    }

    fn on_unhandled_key_event(&mut self, event: &KeyEvent) {
        tracing::debug!(code = ?event.code, modifiers = ?event.modifiers, "unhandled key");
    }
}

/// Compositor-side registration of surfaces.
pub trait FrameSinkRegistrar {
    fn register_frame_sink(&mut self, id: FrameSinkId);
    fn invalidate_frame_sink(&mut self, id: FrameSinkId);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFrameSinks;

impl FrameSinkRegistrar for TracingFrameSinks {
    fn register_frame_sink(&mut self, id: FrameSinkId) {
        tracing::trace!(frame_sink = %id, "register frame sink");
    }

    fn invalidate_frame_sink(&mut self, id: FrameSinkId) {
        tracing::trace!(frame_sink = %id, "invalidate frame sink");
    }
}

/// Receives events the router keeps local: chrome interactions on
/// top-levels, gestures, and anything no client claims.
pub trait LocalEventSink {
    fn on_local_event(&mut self, window: WindowId, event: &Event);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl LocalEventSink for TracingEventSink {
    fn on_local_event(&mut self, window: WindowId, event: &Event) {
        tracing::debug!(window_id = ?window, event = %event.describe(), "local event");
    }
}

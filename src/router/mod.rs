//! Decides who handles an input event once its target window is known.
//!
//! The pipeline runs in a fixed order: synthetic events and gestures stay
//! local, an intercepting embedder anywhere above the target takes the event,
//! then either the top-level rules (chrome versus client area, tracked per
//! pointer) or the ordinary rules (focus, capture, embedded, owner) apply.

pub mod targeting;

use std::collections::BTreeMap;

use crate::events::{Event, PointerId};
use crate::ids::{ClientId, WindowId};
use crate::record::WindowRecord;
use crate::window::WindowHierarchy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Only the server's local handlers see the event.
    Local,
    /// Forwarded to `client` at `window`; local handlers never see it.
    Remote { client: ClientId, window: WindowId },
    /// Forwarded to `client` at `window` and also handled locally.
    Shared { client: ClientId, window: WindowId },
}

impl RouteDecision {
    fn remote(client: Option<ClientId>, window: WindowId) -> Self {
        client.map_or(RouteDecision::Local, |client| RouteDecision::Remote { client, window })
    }

    /// The client the event is forwarded to, with the window it is expressed
    /// against.
    pub fn forwarded_to(&self) -> Option<(ClientId, WindowId)> {
        match *self {
            RouteDecision::Local => None,
            RouteDecision::Remote { client, window } | RouteDecision::Shared { client, window } => {
                Some((client, window))
            }
        }
    }

    pub fn handled_locally(&self) -> bool {
        matches!(self, RouteDecision::Local | RouteDecision::Shared { .. })
    }
}

/// Read-only state the router consults.
#[derive(Clone, Copy)]
pub struct RoutingView<'a> {
    pub hierarchy: &'a WindowHierarchy,
    pub records: &'a BTreeMap<WindowId, WindowRecord>,
    pub capture_window: Option<WindowId>,
}

/// Where the press that started a pointer sequence on a top-level landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureState {
    pub in_non_client_area: bool,
}

#[derive(Debug, Default)]
pub struct EventRouter {
    gestures: BTreeMap<(WindowId, PointerId), GestureState>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `event`, already expressed in `target`'s coordinate space.
    pub fn route(&mut self, view: &RoutingView<'_>, target: WindowId, event: &Event) -> RouteDecision {
        if event.is_synthetic() || event.is_gesture() {
            return RouteDecision::Local;
        }
        if let Some(decision) = Self::route_intercepted(view, target) {
            return decision;
        }
        let Some(record) = view.records.get(&target) else {
            return RouteDecision::Local;
        };
        if record.is_top_level() {
            self.route_top_level(view, record, event)
        } else {
            Self::route_ordinary(record, event)
        }
    }

    /// The outermost window at or above `target` whose embedder intercepts
    /// events claims it for the embedder.
    fn route_intercepted(view: &RoutingView<'_>, target: WindowId) -> Option<RouteDecision> {
        let mut chain = view.hierarchy.ancestors(target);
        chain.reverse();
        chain.push(target);
        chain.into_iter().find_map(|window| {
            let embedding = view.records.get(&window)?.embedding()?;
            embedding.intercepts_events().then(|| RouteDecision::Remote {
                client: embedding.embedding_tree(),
                window,
            })
        })
    }

    fn route_ordinary(record: &WindowRecord, event: &Event) -> RouteDecision {
        let client = if event.is_key() {
            record.focus_owner()
        } else {
            record
                .capture_owner()
                .or_else(|| record.embedded_tree())
                .or_else(|| record.owning_tree())
        };
        RouteDecision::remote(client, record.window())
    }

    fn route_top_level(
        &mut self,
        view: &RoutingView<'_>,
        record: &WindowRecord,
        event: &Event,
    ) -> RouteDecision {
        let window = record.window();
        if !event.is_located() {
            return Self::route_ordinary(record, event);
        }
        if view.capture_window.is_some() {
            return RouteDecision::remote(record.capture_owner(), window);
        }
        let Some(owner) = record.owning_tree() else {
            return RouteDecision::Local;
        };
        if record.has_non_client_area()
            && let Some(pointer_id) = event.pointer_id()
        {
            let key = (window, pointer_id);
            match self.gestures.get(&key).copied() {
                Some(state) => {
                    if event.is_pointer_release() {
                        self.gestures.remove(&key);
                    }
                    return Self::continue_gesture(state, owner, window);
                }
                None if event.is_pointer_press() => {
                    let (Some(location), Some(bounds)) = (event.location(), view.hierarchy.bounds(window))
                    else {
                        return RouteDecision::Local;
                    };
                    let state = GestureState {
                        in_non_client_area: record.is_location_in_non_client_area(bounds, location),
                    };
                    tracing::trace!(
                        window_id = ?window,
                        pointer_id,
                        non_client = state.in_non_client_area,
                        "pointer press on top-level"
                    );
                    self.gestures.insert(key, state);
                    return Self::continue_gesture(state, owner, window);
                }
                None => {}
            }
        }
        RouteDecision::Shared {
            client: owner,
            window,
        }
    }

    fn continue_gesture(state: GestureState, owner: ClientId, window: WindowId) -> RouteDecision {
        if state.in_non_client_area {
            RouteDecision::Local
        } else {
            RouteDecision::Remote {
                client: owner,
                window,
            }
        }
    }

    /// Capture moved to `gained`. Sequences on any other window are over.
    pub fn on_capture_changed(&mut self, gained: Option<WindowId>) {
        self.gestures.retain(|(window, _), _| Some(*window) == gained);
    }

    pub fn on_capture_owner_changed(&mut self, window: WindowId) {
        self.forget_window(window);
    }

    /// Drops sequences on windows that are no longer drawn on a display.
    pub fn on_windows_hidden(&mut self, hierarchy: &WindowHierarchy) {
        self.gestures
            .retain(|(window, _), _| hierarchy.is_drawn(*window) && hierarchy.is_attached(*window));
    }

    pub fn forget_window(&mut self, window: WindowId) {
        self.gestures.retain(|(w, _), _| *w != window);
    }

    pub fn is_handling_pointer_press(&self, window: WindowId, pointer_id: PointerId) -> bool {
        self.gestures.contains_key(&(window, pointer_id))
    }

    pub fn gesture_count(&self) -> usize {
        self.gestures.len()
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyModifiers};

    use super::*;
    use crate::constants::MOUSE_POINTER_ID;
    use crate::embedding::{EmbedFlags, EmbeddedTreeOwnership, Embedding};
    use crate::events::{KeyEvent, MouseButtons, MouseEvent, MouseEventKind, TouchEvent, TouchEventKind};
    use crate::geometry::{Insets, Point, Rect};
    use crate::ids::FrameSinkId;

    const ROOT: WindowId = WindowId::new(ClientId::SERVER, 1);
    const OWNER: ClientId = ClientId(1);
    const TOP: WindowId = WindowId::new(OWNER, 1);
    const CHILD: WindowId = WindowId::new(OWNER, 2);

    struct Scene {
        hierarchy: WindowHierarchy,
        records: BTreeMap<WindowId, WindowRecord>,
        capture: Option<WindowId>,
        router: EventRouter,
    }

    impl Scene {
        fn new() -> Self {
            let mut hierarchy = WindowHierarchy::new();
            hierarchy.add_root(ROOT, Rect::new(0, 0, 200, 200));
            for (parent, window) in [(ROOT, TOP), (TOP, CHILD)] {
                hierarchy.create(window);
                hierarchy.add_child(parent, window);
                hierarchy.set_visible(window, true);
            }
            hierarchy.set_bounds(TOP, Rect::new(10, 10, 100, 100));
            hierarchy.set_bounds(CHILD, Rect::new(0, 0, 100, 100));
            let mut records = BTreeMap::new();
            let mut top = record(TOP, true);
            top.set_client_area(Insets::top(10), Vec::new());
            records.insert(TOP, top);
            records.insert(CHILD, record(CHILD, false));
            Self {
                hierarchy,
                records,
                capture: None,
                router: EventRouter::new(),
            }
        }

        fn route(&mut self, target: WindowId, event: Event) -> RouteDecision {
            let view = RoutingView {
                hierarchy: &self.hierarchy,
                records: &self.records,
                capture_window: self.capture,
            };
            self.router.route(&view, target, &event)
        }
    }

    fn record(window: WindowId, top_level: bool) -> WindowRecord {
        WindowRecord::new(
            window,
            Some(OWNER),
            FrameSinkId {
                client_id: OWNER,
                sink_id: window.local_id,
            },
            top_level,
        )
    }

    fn press(x: i32, y: i32) -> Event {
        Event::Mouse(MouseEvent::press(Point::new(x, y), MouseButtons::LEFT))
    }

    fn drag(x: i32, y: i32) -> Event {
        Event::Mouse(MouseEvent::drag(Point::new(x, y), MouseButtons::LEFT))
    }

    fn release(x: i32, y: i32) -> Event {
        Event::Mouse(MouseEvent::release(Point::new(x, y), MouseButtons::LEFT))
    }

    fn remote(window: WindowId) -> RouteDecision {
        RouteDecision::Remote {
            client: OWNER,
            window,
        }
    }

    #[test]
    fn non_client_press_stays_local_for_whole_sequence() {
        let mut scene = Scene::new();
        assert_eq!(scene.route(TOP, press(5, 5)), RouteDecision::Local);
        assert!(scene.router.is_handling_pointer_press(TOP, MOUSE_POINTER_ID));
        // Dragging into the client area does not change the decision.
        assert_eq!(scene.route(TOP, drag(50, 50)), RouteDecision::Local);
        assert_eq!(scene.route(TOP, release(50, 50)), RouteDecision::Local);
        assert!(!scene.router.is_handling_pointer_press(TOP, MOUSE_POINTER_ID));
        // Without a press in flight, plain moves are shared.
        assert_eq!(
            scene.route(TOP, Event::Mouse(MouseEvent::moved(Point::new(5, 5)))),
            RouteDecision::Shared {
                client: OWNER,
                window: TOP
            }
        );
    }

    #[test]
    fn client_area_press_goes_remote_only() {
        let mut scene = Scene::new();
        assert_eq!(scene.route(TOP, press(50, 50)), remote(TOP));
        assert_eq!(scene.route(TOP, drag(5, 5)), remote(TOP));
        assert_eq!(scene.route(TOP, release(5, 5)), remote(TOP));
        assert_eq!(scene.router.gesture_count(), 0);
    }

    #[test]
    fn touch_points_are_tracked_independently() {
        let mut scene = Scene::new();
        let touch = |kind, x, y, pointer_id| {
            Event::Touch(TouchEvent {
                kind,
                location: Point::new(x, y),
                pointer_id,
            })
        };
        assert_eq!(scene.route(TOP, touch(TouchEventKind::Pressed, 5, 5, 1)), RouteDecision::Local);
        assert_eq!(scene.route(TOP, touch(TouchEventKind::Pressed, 50, 50, 2)), remote(TOP));
        assert_eq!(scene.route(TOP, touch(TouchEventKind::Moved, 50, 50, 1)), RouteDecision::Local);
        assert_eq!(scene.route(TOP, touch(TouchEventKind::Cancelled, 5, 5, 2)), remote(TOP));
        assert_eq!(scene.router.gesture_count(), 1);
    }

    #[test]
    fn ordinary_windows_prefer_capture_then_embedded_then_owner() {
        let mut scene = Scene::new();
        assert_eq!(scene.route(CHILD, press(1, 1)), remote(CHILD));

        if let Some(child) = scene.records.get_mut(&CHILD) {
            child.set_embedding(Some(Embedding::new(
                OWNER,
                ClientId(2),
                EmbeddedTreeOwnership::Owned,
                EmbedFlags::empty(),
            )));
        }
        assert_eq!(
            scene.route(CHILD, press(1, 1)),
            RouteDecision::Remote {
                client: ClientId(2),
                window: CHILD
            }
        );

        if let Some(child) = scene.records.get_mut(&CHILD) {
            child.set_capture_owner(Some(ClientId(3)));
        }
        assert_eq!(
            scene.route(CHILD, press(1, 1)),
            RouteDecision::Remote {
                client: ClientId(3),
                window: CHILD
            }
        );
    }

    #[test]
    fn keys_follow_focus_owner() {
        let mut scene = Scene::new();
        let key = Event::Key(KeyEvent::press(KeyCode::Char('x'), KeyModifiers::NONE));
        assert_eq!(scene.route(CHILD, key), RouteDecision::Local);
        if let Some(child) = scene.records.get_mut(&CHILD) {
            child.set_focus_owner(Some(OWNER));
        }
        assert_eq!(scene.route(CHILD, key), remote(CHILD));
        // Top-levels treat keys the ordinary way.
        assert_eq!(scene.route(TOP, key), RouteDecision::Local);
    }

    #[test]
    fn intercepting_ancestor_claims_descendants() {
        let mut scene = Scene::new();
        if let Some(top) = scene.records.get_mut(&TOP) {
            top.set_embedding(Some(Embedding::new(
                ClientId(7),
                OWNER,
                EmbeddedTreeOwnership::Owned,
                EmbedFlags::INTERCEPT_EVENTS,
            )));
        }
        assert_eq!(
            scene.route(CHILD, press(1, 1)),
            RouteDecision::Remote {
                client: ClientId(7),
                window: TOP
            }
        );
    }

    #[test]
    fn synthetic_and_gesture_events_stay_local() {
        let mut scene = Scene::new();
        let entered = Event::Mouse(MouseEvent::new(MouseEventKind::Entered, Point::new(50, 50)));
        assert_eq!(scene.route(CHILD, entered), RouteDecision::Local);
        let gesture = Event::Gesture(crate::events::GestureEvent {
            kind: crate::events::GestureKind::Tap,
            location: Point::new(50, 50),
        });
        assert_eq!(scene.route(CHILD, gesture), RouteDecision::Local);
    }

    #[test]
    fn capture_on_top_level_uses_capture_owner_only() {
        let mut scene = Scene::new();
        scene.capture = Some(TOP);
        assert_eq!(scene.route(TOP, press(5, 5)), RouteDecision::Local);
        if let Some(top) = scene.records.get_mut(&TOP) {
            top.set_capture_owner(Some(OWNER));
        }
        assert_eq!(scene.route(TOP, press(5, 5)), remote(TOP));
        assert_eq!(scene.router.gesture_count(), 0);
    }

    #[test]
    fn capture_and_visibility_changes_clear_sequences() {
        let mut scene = Scene::new();
        scene.route(TOP, press(5, 5));
        scene.router.on_capture_changed(Some(TOP));
        assert_eq!(scene.router.gesture_count(), 1);
        scene.router.on_capture_changed(Some(CHILD));
        assert_eq!(scene.router.gesture_count(), 0);

        scene.route(TOP, press(5, 5));
        scene.hierarchy.set_visible(TOP, false);
        scene.router.on_windows_hidden(&scene.hierarchy);
        assert_eq!(scene.router.gesture_count(), 0);
    }
}

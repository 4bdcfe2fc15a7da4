//! Recording doubles for driving a [`WindowService`] in tests.
//!
//! Everything here records into shared `Rc<RefCell<..>>` logs so a test can
//! keep a handle after boxing the double into the service.

use std::cell::RefCell;
use std::rc::Rc;

use crossterm::event::{KeyCode, KeyModifiers};

use crate::client::{ClientConnection, ClientMessage, ClientTreeMut};
use crate::config::ServiceConfig;
use crate::delegate::{
    LocalEventSink, MoveLoopSource, PolicyDelegate, TopLevelPlacement, TopLevelRequest,
    WindowServiceDelegate,
};
use crate::embedding::EmbedFlags;
use crate::events::{
    Event, KeyEvent, MouseButtons, MouseEvent, MouseEventKind, PointerId, TouchEvent, TouchEventKind,
};
use crate::geometry::{Point, Rect};
use crate::ids::{ChangeId, ClientId, EventId, WindowId};
use crate::properties::{Properties, WINDOW_TYPE, WindowType};
use crate::service::{DispatchReport, WindowService};
use crate::window::{LayoutManager, WindowHierarchy};

/// Shared transcript of everything sent to one client.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Rc<RefCell<Vec<ClientMessage>>>,
}

impl MessageLog {
    pub fn messages(&self) -> Vec<ClientMessage> {
        self.messages.borrow().clone()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.messages.borrow().iter().map(ClientMessage::describe).collect()
    }

    /// Descriptions of everything except input.
    pub fn changes(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|m| !m.is_input())
            .map(ClientMessage::describe)
            .collect()
    }

    pub fn input_events(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|m| matches!(m, ClientMessage::InputEvent { .. }))
            .map(ClientMessage::describe)
            .collect()
    }

    pub fn observed_events(&self) -> Vec<String> {
        self.messages
            .borrow()
            .iter()
            .filter(|m| matches!(m, ClientMessage::ObservedPointerEvent { .. }))
            .map(ClientMessage::describe)
            .collect()
    }

    /// Drains the log, returning the descriptions.
    pub fn take(&self) -> Vec<String> {
        self.messages
            .borrow_mut()
            .drain(..)
            .map(|m| m.describe())
            .collect()
    }

    pub fn clear(&self) {
        self.messages.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.borrow().is_empty()
    }

    pub fn last_event_id(&self) -> Option<EventId> {
        self.messages.borrow().iter().rev().find_map(|m| match m {
            ClientMessage::InputEvent { event_id, .. } => Some(*event_id),
            _ => None,
        })
    }

    fn push(&self, message: ClientMessage) {
        self.messages.borrow_mut().push(message);
    }
}

#[derive(Debug)]
pub struct RecordingConnection {
    log: MessageLog,
}

impl RecordingConnection {
    pub fn new() -> (Self, MessageLog) {
        let log = MessageLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl ClientConnection for RecordingConnection {
    fn send(&mut self, message: ClientMessage) {
        self.log.push(message);
    }
}

#[derive(Debug, Default)]
pub struct DelegateLog {
    pub move_loops: Vec<(WindowId, MoveLoopSource, Point)>,
    pub cancelled_moves: Vec<WindowId>,
    pub unhandled_keys: Vec<KeyEvent>,
    pub decline_top_levels: bool,
}

/// Places top-levels like [`PolicyDelegate`] and records everything else.
#[derive(Debug, Clone)]
pub struct TestDelegate {
    state: Rc<RefCell<DelegateLog>>,
    policy: PolicyDelegate,
}

impl TestDelegate {
    pub fn new(default_bounds: Rect) -> Self {
        Self {
            state: Rc::default(),
            policy: PolicyDelegate::new(default_bounds),
        }
    }

    pub fn set_decline_top_levels(&self, decline: bool) {
        self.state.borrow_mut().decline_top_levels = decline;
    }

    pub fn move_loops(&self) -> Vec<(WindowId, MoveLoopSource, Point)> {
        self.state.borrow().move_loops.clone()
    }

    pub fn cancelled_moves(&self) -> Vec<WindowId> {
        self.state.borrow().cancelled_moves.clone()
    }

    pub fn unhandled_keys(&self) -> Vec<KeyEvent> {
        self.state.borrow().unhandled_keys.clone()
    }
}

impl WindowServiceDelegate for TestDelegate {
    fn new_top_level(
        &mut self,
        request: &TopLevelRequest<'_>,
        hierarchy: &WindowHierarchy,
    ) -> Option<TopLevelPlacement> {
        if self.state.borrow().decline_top_levels {
            return None;
        }
        self.policy.placement(request, hierarchy)
    }

    fn run_window_move_loop(&mut self, window: WindowId, source: MoveLoopSource, start: Point) {
        self.state.borrow_mut().move_loops.push((window, source, start));
    }

    fn cancel_window_move_loop(&mut self, window: WindowId) {
        self.state.borrow_mut().cancelled_moves.push(window);
    }

    fn on_unhandled_key_event(&mut self, event: &KeyEvent) {
        self.state.borrow_mut().unhandled_keys.push(*event);
    }
}

/// Transcript of events the router kept local.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Rc<RefCell<Vec<(WindowId, Event)>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(WindowId, Event)> {
        self.events.borrow().clone()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.events.borrow().iter().map(|(_, e)| e.describe()).collect()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl LocalEventSink for RecordingEventSink {
    fn on_local_event(&mut self, window: WindowId, event: &Event) {
        self.events.borrow_mut().push((window, *event));
    }
}

/// Layout manager that ignores requests and applies fixed bounds.
#[derive(Debug, Clone, Copy)]
pub struct OverrideLayout(pub Rect);

impl LayoutManager for OverrideLayout {
    fn set_child_bounds(&mut self, _child: WindowId, _requested: Rect) -> Rect {
        self.0
    }
}

/// Synthesizes platform input, tracking the mouse location and buttons the
/// way a real device would.
#[derive(Debug, Default)]
pub struct EventGenerator {
    location: Point,
    buttons: MouseButtons,
}

impl EventGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(&self) -> Point {
        self.location
    }

    /// Moves the mouse; drags while a button is held.
    pub fn move_mouse_to(&mut self, service: &mut WindowService, location: Point) -> DispatchReport {
        self.location = location;
        let event = if self.buttons.is_empty() {
            MouseEvent::moved(location)
        } else {
            MouseEvent::drag(location, self.buttons)
        };
        service.dispatch_event(Event::Mouse(event))
    }

    pub fn press_left(&mut self, service: &mut WindowService) -> DispatchReport {
        self.buttons |= MouseButtons::LEFT;
        service.dispatch_event(Event::Mouse(MouseEvent {
            kind: MouseEventKind::Pressed,
            location: self.location,
            buttons: self.buttons,
            changed: MouseButtons::LEFT,
        }))
    }

    pub fn release_left(&mut self, service: &mut WindowService) -> DispatchReport {
        let event = MouseEvent {
            kind: MouseEventKind::Released,
            location: self.location,
            buttons: self.buttons,
            changed: MouseButtons::LEFT,
        };
        self.buttons -= MouseButtons::LEFT;
        service.dispatch_event(Event::Mouse(event))
    }

    pub fn click_at(&mut self, service: &mut WindowService, location: Point) {
        self.move_mouse_to(service, location);
        self.press_left(service);
        self.release_left(service);
    }

    pub fn wheel(&mut self, service: &mut WindowService, delta_y: i32) -> DispatchReport {
        service.dispatch_event(Event::Mouse(MouseEvent::new(
            MouseEventKind::Wheel { delta_x: 0, delta_y },
            self.location,
        )))
    }

    pub fn touch(
        &mut self,
        service: &mut WindowService,
        kind: TouchEventKind,
        pointer_id: PointerId,
        location: Point,
    ) -> DispatchReport {
        service.dispatch_event(Event::Touch(TouchEvent {
            kind,
            location,
            pointer_id,
        }))
    }

    pub fn press_key(&mut self, service: &mut WindowService, code: KeyCode) -> DispatchReport {
        service.dispatch_event(Event::Key(KeyEvent::press(code, KeyModifiers::NONE)))
    }
}

pub fn top_level_properties() -> Properties {
    [(WINDOW_TYPE, WindowType::Normal.to_property())]
        .into_iter()
        .collect()
}

/// A service with one connected client, recording doubles installed, and
/// helpers for the usual setup steps. Helpers clear the client logs they
/// touch so tests start from a clean transcript.
pub struct TestSetup {
    pub service: WindowService,
    pub client_id: ClientId,
    pub log: MessageLog,
    pub delegate: TestDelegate,
    pub local_events: RecordingEventSink,
    pub events: EventGenerator,
    next_change_id: ChangeId,
}

impl TestSetup {
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let delegate = TestDelegate::new(config.default_top_level_bounds);
        let local_events = RecordingEventSink::new();
        let mut service = WindowService::new(config, Box::new(delegate.clone()))
            .with_local_event_sink(Box::new(local_events.clone()));
        let (connection, log) = RecordingConnection::new();
        let client_id = service
            .create_client_tree(Box::new(connection))
            .unwrap_or_default();
        Self {
            service,
            client_id,
            log,
            delegate,
            local_events,
            events: EventGenerator::new(),
            next_change_id: 1,
        }
    }

    pub fn root(&self) -> WindowId {
        self.service.roots().first().copied().unwrap_or(WindowId::new(ClientId::SERVER, 1))
    }

    pub fn change_id(&mut self) -> ChangeId {
        let id = self.next_change_id;
        self.next_change_id += 1;
        id
    }

    pub fn client(&mut self) -> ClientTreeMut<'_> {
        self.service.client(self.client_id)
    }

    /// Connects another client.
    pub fn add_client(&mut self) -> Option<(ClientId, MessageLog)> {
        let (connection, log) = RecordingConnection::new();
        let id = self.service.create_client_tree(Box::new(connection)).ok()?;
        Some((id, log))
    }

    /// Creates a visible top-level for `client` at `bounds`.
    pub fn new_top_level_for(
        &mut self,
        client: ClientId,
        log: &MessageLog,
        local_id: u32,
        bounds: Rect,
    ) -> Option<WindowId> {
        let id = WindowId::new(client, local_id);
        let change = self.change_id();
        let mut tree = self.service.client(client);
        if !tree.new_top_level_window(change, id, top_level_properties()) {
            return None;
        }
        let change = self.change_id();
        self.service.client(client).set_window_bounds(change, id, bounds, None);
        let change = self.change_id();
        self.service.client(client).set_window_visibility(change, id, true);
        log.clear();
        Some(id)
    }

    pub fn new_top_level(&mut self, local_id: u32, bounds: Rect) -> Option<WindowId> {
        let (client, log) = (self.client_id, self.log.clone());
        self.new_top_level_for(client, &log, local_id, bounds)
    }

    /// Creates a visible child of `parent` for `client`.
    pub fn new_window_for(
        &mut self,
        client: ClientId,
        log: &MessageLog,
        parent: WindowId,
        local_id: u32,
        bounds: Rect,
    ) -> Option<WindowId> {
        let id = WindowId::new(client, local_id);
        let steps = [
            self.change_id(),
            self.change_id(),
            self.change_id(),
            self.change_id(),
        ];
        let mut tree = self.service.client(client);
        let ok = tree.new_window(steps[0], id, Properties::new())
            && tree.add_child(steps[1], parent, id)
            && tree.set_window_bounds(steps[2], id, bounds, None)
            && tree.set_window_visibility(steps[3], id, true);
        log.clear();
        ok.then_some(id)
    }

    pub fn new_window(&mut self, parent: WindowId, local_id: u32, bounds: Rect) -> Option<WindowId> {
        let (client, log) = (self.client_id, self.log.clone());
        self.new_window_for(client, &log, parent, local_id, bounds)
    }

    /// Embeds a freshly connected client in `window` on behalf of `embedder`.
    pub fn embed_new_client(
        &mut self,
        embedder: ClientId,
        window: WindowId,
        flags: EmbedFlags,
    ) -> Option<(ClientId, MessageLog)> {
        let (connection, log) = RecordingConnection::new();
        if !self.service.client(embedder).embed(window, Some(Box::new(connection)), flags) {
            return None;
        }
        let embedded = self.service.record(window)?.embedded_tree()?;
        Some((embedded, log))
    }
}

impl Default for TestSetup {
    fn default() -> Self {
        Self::new()
    }
}

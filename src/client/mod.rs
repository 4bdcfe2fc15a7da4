//! Per-client protocol state.
//!
//! A `ClientTree` is the unit of authorization: it remembers which windows a
//! client created, which windows it was embedded into, and how it names them.
//! The request handlers live in [`requests`] and operate on the service
//! through a [`ClientTreeMut`] handle.

mod connection;
mod requests;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub use connection::{ClientConnection, ClientMessage, TracingConnection, WindowData};
pub use requests::ClientTreeMut;

use crate::events::{Event, MouseEventKind, TouchEventKind};
use crate::ids::{ChangeId, ClientId, EventId, FrameSinkId, WindowId};

/// Frame sinks allocated for embed roots start here so they never collide
/// with the per-window sinks derived from local ids.
const EMBED_FRAME_SINK_BASE: u32 = 1 << 31;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub change_id: ChangeId,
    pub window: WindowId,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerWatcher {
    pub want_moves: bool,
}

impl PointerWatcher {
    /// Presses and releases are always observed; movement only on request.
    pub fn observes(&self, event: &Event) -> bool {
        if !event.is_pointer() || event.is_synthetic() {
            return false;
        }
        let press_or_release = match event {
            Event::Mouse(m) => matches!(m.kind, MouseEventKind::Pressed | MouseEventKind::Released),
            Event::Touch(t) => t.kind != TouchEventKind::Moved,
            _ => false,
        };
        press_or_release || self.want_moves
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlightEvent {
    id: EventId,
    event: Event,
}

pub struct ClientTree {
    id: ClientId,
    connection: Box<dyn ClientConnection>,
    created: BTreeSet<WindowId>,
    top_levels: BTreeSet<WindowId>,
    /// Windows this client was embedded into.
    roots: BTreeSet<WindowId>,
    /// Aliases for roots reached through an existing-client token.
    client_to_server: BTreeMap<WindowId, WindowId>,
    server_to_client: BTreeMap<WindowId, WindowId>,
    pending_move: Option<PendingMove>,
    in_flight: VecDeque<InFlightEvent>,
    next_event_id: u32,
    pointer_watcher: Option<PointerWatcher>,
    next_sink_id: u32,
}

impl ClientTree {
    pub fn new(id: ClientId, connection: Box<dyn ClientConnection>) -> Self {
        Self {
            id,
            connection,
            created: BTreeSet::new(),
            top_levels: BTreeSet::new(),
            roots: BTreeSet::new(),
            client_to_server: BTreeMap::new(),
            server_to_client: BTreeMap::new(),
            pending_move: None,
            in_flight: VecDeque::new(),
            next_event_id: 1,
            pointer_watcher: None,
            next_sink_id: EMBED_FRAME_SINK_BASE,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn send(&mut self, message: ClientMessage) {
        tracing::trace!(client_id = ?self.id, message = %message.describe(), "send");
        self.connection.send(message);
    }

    pub fn connection_mut(&mut self) -> &mut dyn ClientConnection {
        &mut *self.connection
    }

    pub fn owns(&self, window: WindowId) -> bool {
        self.created.contains(&window)
    }

    pub fn is_top_level(&self, window: WindowId) -> bool {
        self.top_levels.contains(&window)
    }

    pub fn is_root(&self, window: WindowId) -> bool {
        self.roots.contains(&window)
    }

    /// Created by this client or one of its embed roots.
    pub fn controls(&self, window: WindowId) -> bool {
        self.owns(window) || self.is_root(window)
    }

    pub fn created_windows(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.created.iter().copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.roots.iter().copied()
    }

    /// How this client names `window`.
    pub fn transport_id(&self, window: WindowId) -> WindowId {
        self.server_to_client
            .get(&window)
            .copied()
            .unwrap_or(window)
    }

    /// Resolves an id supplied by this client.
    pub fn server_window_id(&self, client_window: WindowId) -> WindowId {
        self.client_to_server
            .get(&client_window)
            .copied()
            .unwrap_or(client_window)
    }

    /// True if `id` names something this client already uses.
    pub fn is_id_in_use(&self, id: WindowId) -> bool {
        self.created.contains(&id) || self.client_to_server.contains_key(&id)
    }

    pub(crate) fn add_window(&mut self, window: WindowId, top_level: bool) {
        self.created.insert(window);
        if top_level {
            self.top_levels.insert(window);
        }
    }

    pub(crate) fn remove_window(&mut self, window: WindowId) -> bool {
        self.top_levels.remove(&window);
        self.created.remove(&window)
    }

    pub(crate) fn add_root(&mut self, window: WindowId, alias: Option<WindowId>) {
        self.roots.insert(window);
        if let Some(alias) = alias {
            self.client_to_server.insert(alias, window);
            self.server_to_client.insert(window, alias);
        }
    }

    pub(crate) fn remove_root(&mut self, window: WindowId) -> bool {
        if let Some(alias) = self.server_to_client.remove(&window) {
            self.client_to_server.remove(&alias);
        }
        self.roots.remove(&window)
    }

    pub(crate) fn allocate_frame_sink_id(&mut self) -> FrameSinkId {
        let sink_id = self.next_sink_id;
        self.next_sink_id = self.next_sink_id.wrapping_add(1).max(EMBED_FRAME_SINK_BASE);
        FrameSinkId {
            client_id: self.id,
            sink_id,
        }
    }

    pub fn pending_move(&self) -> Option<PendingMove> {
        self.pending_move
    }

    pub(crate) fn set_pending_move(&mut self, pending: Option<PendingMove>) {
        self.pending_move = pending;
    }

    pub(crate) fn cancel_pending_move(&mut self, window: WindowId) -> bool {
        match &mut self.pending_move {
            Some(pending) if pending.window == window => {
                pending.cancelled = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn take_pending_move(&mut self, window: WindowId) -> Option<PendingMove> {
        if self.pending_move.is_some_and(|p| p.window == window) {
            self.pending_move.take()
        } else {
            None
        }
    }

    /// Records an event awaiting the client's ack and returns its id.
    pub(crate) fn queue_event(&mut self, event: Event) -> EventId {
        let id = EventId(self.next_event_id);
        self.next_event_id = self.next_event_id.wrapping_add(1).max(1);
        self.in_flight.push_back(InFlightEvent { id, event });
        id
    }

    /// Acks must arrive in delivery order. Anything else is ignored.
    pub(crate) fn ack_event(&mut self, id: EventId) -> Option<Event> {
        match self.in_flight.front() {
            Some(front) if front.id == id => self.in_flight.pop_front().map(|e| e.event),
            _ => None,
        }
    }

    pub fn in_flight_event_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pointer_watcher(&self) -> Option<PointerWatcher> {
        self.pointer_watcher
    }

    pub(crate) fn set_pointer_watcher(&mut self, watcher: Option<PointerWatcher>) {
        self.pointer_watcher = watcher;
    }
}

impl std::fmt::Debug for ClientTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTree")
            .field("id", &self.id)
            .field("created", &self.created)
            .field("top_levels", &self.top_levels)
            .field("roots", &self.roots)
            .field("pending_move", &self.pending_move)
            .field("pointer_watcher", &self.pointer_watcher)
            .finish_non_exhaustive()
    }
}

//! The window registry: every client tree, every window record, and the
//! shared focus, capture and routing state they compose into.
//!
//! Client requests enter through [`WindowService::client`], which hands out a
//! [`ClientTreeMut`] scoped to one client. Everything in this file is either
//! the privileged (server-side) surface or bookkeeping shared by the request
//! handlers.

use std::collections::{BTreeMap, BTreeSet};

use crossterm::event::KeyModifiers;

use crate::capture::{InMemoryCapture, PlatformCaptureController};
use crate::client::{ClientConnection, ClientMessage, ClientTree, ClientTreeMut, WindowData};
use crate::config::ServiceConfig;
use crate::constants::FIRST_LOCAL_WINDOW_ID;
use crate::delegate::{
    FrameSinkRegistrar, LocalEventSink, MoveLoopSource, PolicyDelegate, TracingEventSink,
    TracingFrameSinks, WindowServiceDelegate,
};
use crate::drag_drop::{DragDropDelegate, DragOperation, ExchangeData};
use crate::embedding::{EmbedFlags, EmbeddedTreeOwnership, Embedding, ScheduledEmbeds};
use crate::error::ServiceError;
use crate::events::{Event, MouseButtons, MouseEventKind, PointerId, TouchEventKind};
use crate::focus::FocusArbiter;
use crate::geometry::{Point, Rect};
use crate::ids::{ClientId, LocalSurfaceId, WindowId};
use crate::record::{WindowRecord, default_frame_sink_id};
use crate::router::targeting;
use crate::router::{EventRouter, RouteDecision, RoutingView};
use crate::window::{LayoutManager, WindowHierarchy};

/// What happened to one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub target: Option<WindowId>,
    pub decision: RouteDecision,
}

/// Which input devices currently have something pressed.
#[derive(Debug, Default)]
struct PointerState {
    mouse_buttons: MouseButtons,
    touches: BTreeSet<PointerId>,
}

impl PointerState {
    fn update(&mut self, event: &Event) {
        match event {
            Event::Mouse(m) => match m.kind {
                MouseEventKind::Pressed => self.mouse_buttons = m.buttons | m.changed,
                MouseEventKind::Released => self.mouse_buttons = m.buttons - m.changed,
                _ => {}
            },
            Event::Touch(t) => match t.kind {
                TouchEventKind::Pressed => {
                    self.touches.insert(t.pointer_id);
                }
                TouchEventKind::Released | TouchEventKind::Cancelled => {
                    self.touches.remove(&t.pointer_id);
                }
                TouchEventKind::Moved => {}
            },
            _ => {}
        }
    }

    fn is_pressed(&self, source: MoveLoopSource) -> bool {
        match source {
            MoveLoopSource::Mouse => !self.mouse_buttons.is_empty(),
            MoveLoopSource::Touch => !self.touches.is_empty(),
        }
    }
}

#[derive(Debug)]
struct DragSession {
    data: ExchangeData,
    target: Option<WindowId>,
}

pub struct WindowService {
    pub(crate) config: ServiceConfig,
    pub(crate) hierarchy: WindowHierarchy,
    pub(crate) records: BTreeMap<WindowId, WindowRecord>,
    pub(crate) trees: BTreeMap<ClientId, ClientTree>,
    next_client_id: u64,
    next_local_id: u32,
    next_local_surface_id: u64,
    pub(crate) scheduled_embeds: ScheduledEmbeds,
    pub(crate) focus: FocusArbiter,
    pub(crate) capture: Box<dyn PlatformCaptureController>,
    router: EventRouter,
    pub(crate) delegate: Box<dyn WindowServiceDelegate>,
    pub(crate) frame_sinks: Box<dyn FrameSinkRegistrar>,
    local_events: Box<dyn LocalEventSink>,
    pointers: PointerState,
    /// Window each pressed pointer is implicitly grabbed by until release.
    grabs: BTreeMap<PointerId, WindowId>,
    drag: Option<DragSession>,
}

impl WindowService {
    pub fn new(config: ServiceConfig, delegate: Box<dyn WindowServiceDelegate>) -> Self {
        let mut hierarchy = WindowHierarchy::new();
        for (index, bounds) in config.displays.iter().enumerate() {
            let local_id = u32::try_from(index + 1).unwrap_or(FIRST_LOCAL_WINDOW_ID - 1);
            hierarchy.add_root(WindowId::new(ClientId::SERVER, local_id), *bounds);
        }
        let scheduled_embeds = ScheduledEmbeds::new(config.embed_token_ttl);
        Self {
            config,
            hierarchy,
            records: BTreeMap::new(),
            trees: BTreeMap::new(),
            next_client_id: 1,
            next_local_id: FIRST_LOCAL_WINDOW_ID,
            next_local_surface_id: 1,
            scheduled_embeds,
            focus: FocusArbiter::new(),
            capture: Box::new(InMemoryCapture::default()),
            router: EventRouter::new(),
            delegate,
            frame_sinks: Box::new(TracingFrameSinks),
            local_events: Box::new(TracingEventSink),
            pointers: PointerState::default(),
            grabs: BTreeMap::new(),
            drag: None,
        }
    }

    /// A service placing top-levels with [`PolicyDelegate`].
    pub fn with_default_policy(config: ServiceConfig) -> Self {
        let delegate = PolicyDelegate::new(config.default_top_level_bounds);
        Self::new(config, Box::new(delegate))
    }

    pub fn with_capture_controller(mut self, capture: Box<dyn PlatformCaptureController>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_frame_sink_registrar(mut self, frame_sinks: Box<dyn FrameSinkRegistrar>) -> Self {
        self.frame_sinks = frame_sinks;
        self
    }

    pub fn with_local_event_sink(mut self, sink: Box<dyn LocalEventSink>) -> Self {
        self.local_events = sink;
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn hierarchy(&self) -> &WindowHierarchy {
        &self.hierarchy
    }

    pub fn roots(&self) -> &[WindowId] {
        self.hierarchy.roots()
    }

    pub fn record(&self, window: WindowId) -> Option<&WindowRecord> {
        self.records.get(&window)
    }

    pub fn tree(&self, client: ClientId) -> Option<&ClientTree> {
        self.trees.get(&client)
    }

    pub fn client_ids(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.trees.keys().copied()
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.focus.focused()
    }

    pub fn capture_window(&self) -> Option<WindowId> {
        self.capture.capture_window()
    }

    pub fn pending_embed_tokens(&self) -> usize {
        self.scheduled_embeds.len()
    }

    pub fn is_handling_pointer_press(&self, window: WindowId, pointer_id: PointerId) -> bool {
        self.router.is_handling_pointer_press(window, pointer_id)
    }

    // ---- registry -------------------------------------------------------

    /// Registers a new client tree around `connection`.
    pub fn create_client_tree(
        &mut self,
        connection: Box<dyn ClientConnection>,
    ) -> Result<ClientId, ServiceError> {
        let max = self.config.max_client_id;
        if self.next_client_id > u64::from(max) {
            tracing::error!(max_client_id = max, "client id space exhausted");
            return Err(ServiceError::ClientIdsExhausted(max));
        }
        let id = ClientId(u32::try_from(self.next_client_id).map_err(|_| ServiceError::ClientIdsExhausted(max))?);
        self.next_client_id += 1;
        self.trees.insert(id, ClientTree::new(id, connection));
        tracing::info!(client_id = ?id, "client tree created");
        Ok(id)
    }

    /// Handle for issuing requests on behalf of `client`. Requests from an
    /// unknown client fail without side effects.
    pub fn client(&mut self, client: ClientId) -> ClientTreeMut<'_> {
        ClientTreeMut::new(self, client)
    }

    /// Protocol state for `window`, created on demand for windows the server
    /// made itself.
    pub fn window_record_for(
        &mut self,
        window: WindowId,
        create_if_absent: bool,
    ) -> Option<&mut WindowRecord> {
        if !self.hierarchy.contains(window) {
            return None;
        }
        if create_if_absent && !self.records.contains_key(&window) {
            let sink = default_frame_sink_id(window);
            self.frame_sinks.register_frame_sink(sink);
            self.records
                .insert(window, WindowRecord::new(window, None, sink, false));
            tracing::debug!(window_id = ?window, "created record for local window");
        }
        self.records.get_mut(&window)
    }

    pub fn has_remote_client(&self, window: WindowId) -> bool {
        self.records.contains_key(&window)
    }

    /// The client's connection is gone; everything it owned goes with it.
    pub fn on_connection_lost(&mut self, client: ClientId) -> Result<(), ServiceError> {
        if !self.trees.contains_key(&client) {
            return Err(ServiceError::UnknownClient(client));
        }
        tracing::info!(client_id = ?client, "connection lost");
        self.destroy_client_tree(client);
        Ok(())
    }

    pub(crate) fn destroy_client_tree(&mut self, client: ClientId) {
        // Out of the map first so nothing below sends to it.
        let Some(tree) = self.trees.remove(&client) else {
            return;
        };
        tracing::info!(client_id = ?client, "destroying client tree");
        self.scheduled_embeds.purge_client(client);
        if let Some(pending) = tree.pending_move() {
            self.delegate.cancel_window_move_loop(pending.window);
        }

        let roots: Vec<WindowId> = tree.roots().collect();
        for root in roots {
            let Some(record) = self.records.get_mut(&root) else {
                continue;
            };
            if record.embedded_tree() != Some(client) {
                continue;
            }
            let Some(embedding) = record.take_embedding() else {
                continue;
            };
            self.restore_frame_sink(root);
            let embedder = embedding.embedding_tree();
            if let Some(embedder_tree) = self.trees.get_mut(&embedder) {
                let window = embedder_tree.transport_id(root);
                embedder_tree.send(ClientMessage::EmbeddedAppDisconnected { window });
            }
        }

        if let Some(capture) = self.capture.capture_window()
            && self.records.get(&capture).and_then(WindowRecord::capture_owner) == Some(client)
        {
            self.change_capture(None, None, Some(client));
        }
        for record in self.records.values_mut() {
            record.forget_tree(client);
        }

        let created: Vec<WindowId> = tree.created_windows().collect();
        for window in created {
            if self.hierarchy.contains(window) {
                self.destroy_window(window, Some(client));
            }
        }
        tracing::debug!(client_id = ?client, remaining = self.trees.len(), "client tree destroyed");
    }

    // ---- notifications --------------------------------------------------

    pub(crate) fn send_to(&mut self, client: ClientId, message: ClientMessage) {
        if let Some(tree) = self.trees.get_mut(&client) {
            tree.send(message);
        }
    }

    pub(crate) fn transport_for(&self, client: ClientId, window: WindowId) -> WindowId {
        self.trees
            .get(&client)
            .map_or(window, |tree| tree.transport_id(window))
    }

    fn interested_trees(&self, window: WindowId, skip: Option<ClientId>) -> Vec<ClientId> {
        self.records
            .get(&window)
            .map(WindowRecord::interested_trees)
            .unwrap_or_default()
            .into_iter()
            .filter(|client| Some(*client) != skip)
            .collect()
    }

    pub(crate) fn notify_bounds_changed(
        &mut self,
        window: WindowId,
        old_bounds: Rect,
        new_bounds: Rect,
        skip: Option<ClientId>,
    ) {
        if old_bounds == new_bounds {
            return;
        }
        if (old_bounds.width, old_bounds.height) != (new_bounds.width, new_bounds.height) {
            self.allocate_local_surface_id(window);
        }
        let local_surface_id = self.records.get(&window).and_then(WindowRecord::local_surface_id);
        for client in self.interested_trees(window, skip) {
            let transport = self.transport_for(client, window);
            self.send_to(
                client,
                ClientMessage::WindowBoundsChanged {
                    window: transport,
                    old_bounds,
                    new_bounds,
                    local_surface_id,
                },
            );
        }
    }

    /// Gives a top-level a fresh surface id. Only the server assigns surface
    /// ids to top-levels; other windows keep whatever their client sent.
    pub(crate) fn allocate_local_surface_id(&mut self, window: WindowId) -> Option<LocalSurfaceId> {
        let record = self
            .records
            .get_mut(&window)
            .filter(|record| record.is_top_level())?;
        let id = LocalSurfaceId(self.next_local_surface_id);
        self.next_local_surface_id += 1;
        record.set_local_surface_id(Some(id));
        tracing::trace!(window_id = ?window, local_surface_id = id.0, "surface id allocated");
        Some(id)
    }

    pub(crate) fn notify_property_changed(
        &mut self,
        window: WindowId,
        key: &str,
        value: Option<Vec<u8>>,
        skip: Option<ClientId>,
    ) {
        for client in self.interested_trees(window, skip) {
            let transport = self.transport_for(client, window);
            self.send_to(
                client,
                ClientMessage::WindowPropertyChanged {
                    window: transport,
                    key: key.to_string(),
                    value: value.clone(),
                },
            );
        }
    }

    /// Serializes `window` the way `client` sees it.
    pub fn window_data(&self, client: ClientId, window: WindowId) -> Option<WindowData> {
        let tree = self.trees.get(&client)?;
        let node = self.hierarchy.get(window)?;
        let parent_id = node
            .parent()
            .filter(|parent| tree.controls(*parent))
            .map(|parent| tree.transport_id(parent));
        let frame_sink_id = self
            .records
            .get(&window)
            .map_or_else(|| default_frame_sink_id(window), WindowRecord::frame_sink_id);
        Some(WindowData {
            parent_id,
            window_id: tree.transport_id(window),
            bounds: node.bounds(),
            visible: node.visible(),
            properties: node.properties().clone(),
            frame_sink_id,
        })
    }

    // ---- server-local surface -------------------------------------------

    /// Creates a hidden window owned by the server itself.
    pub fn create_local_window(&mut self, parent: Option<WindowId>, bounds: Rect) -> Option<WindowId> {
        if parent.is_some_and(|p| !self.hierarchy.contains(p)) {
            return None;
        }
        let id = WindowId::new(ClientId::SERVER, self.next_local_id);
        if !self.hierarchy.create(id) {
            return None;
        }
        self.next_local_id = self.next_local_id.saturating_add(1);
        if let Some(parent) = parent {
            self.hierarchy.add_child(parent, id);
        }
        self.hierarchy.set_bounds(id, bounds);
        tracing::debug!(window_id = ?id, parent = ?parent, "local window created");
        Some(id)
    }

    pub fn set_layout_manager(&mut self, window: WindowId, manager: Option<Box<dyn LayoutManager>>) -> bool {
        self.hierarchy.set_layout_manager(window, manager)
    }

    /// Applies bounds on the server's authority and tells every interested
    /// client. Returns the bounds actually applied.
    pub fn set_local_bounds(&mut self, window: WindowId, bounds: Rect) -> Option<Rect> {
        let old = self.hierarchy.bounds(window)?;
        let actual = self.hierarchy.set_bounds(window, bounds)?;
        self.notify_bounds_changed(window, old, actual, None);
        Some(actual)
    }

    pub fn set_local_visibility(&mut self, window: WindowId, visible: bool) -> bool {
        self.set_visibility(window, visible, None)
    }

    pub fn set_local_property(&mut self, window: WindowId, key: &str, value: Option<Vec<u8>>) -> bool {
        let Some(properties) = self.hierarchy.properties_mut(window) else {
            return false;
        };
        if properties.set(key, value.clone()) {
            self.notify_property_changed(window, key, value, None);
        }
        true
    }

    /// Focus changed outside any client request. Every affected client hears
    /// about it.
    pub fn set_local_focus(&mut self, window: Option<WindowId>) -> bool {
        if let Some(window) = window
            && !self.hierarchy.is_drawn(window)
        {
            return false;
        }
        self.change_focus(window, None);
        true
    }

    /// Platform-level capture change not initiated by any client.
    pub fn set_local_capture(&mut self, window: Option<WindowId>) -> bool {
        if window.is_some_and(|w| !self.hierarchy.contains(w)) {
            return false;
        }
        self.change_capture(window, None, None);
        true
    }

    pub fn destroy_local_window(&mut self, window: WindowId) -> bool {
        let is_root = self.hierarchy.get(window).is_some_and(|w| w.is_root());
        if is_root || !self.hierarchy.contains(window) {
            return false;
        }
        self.destroy_window(window, None);
        true
    }

    // ---- visibility, capture, focus --------------------------------------

    /// Returns true if the visibility flag changed.
    pub(crate) fn set_visibility(
        &mut self,
        window: WindowId,
        visible: bool,
        initiator: Option<ClientId>,
    ) -> bool {
        if !self.hierarchy.set_visible(window, visible) {
            return false;
        }
        tracing::debug!(window_id = ?window, visible, "visibility changed");
        for client in self.interested_trees(window, initiator) {
            let transport = self.transport_for(client, window);
            self.send_to(
                client,
                ClientMessage::WindowVisibilityChanged {
                    window: transport,
                    visible,
                },
            );
        }
        if !visible {
            self.on_subtree_undrawn(window, initiator);
        }
        true
    }

    /// `window` and its descendants stopped being drawn, either hidden or
    /// detached from the display.
    pub(crate) fn on_subtree_undrawn(&mut self, window: WindowId, initiator: Option<ClientId>) {
        self.router.on_windows_hidden(&self.hierarchy);
        let hierarchy = &self.hierarchy;
        self.grabs
            .retain(|_, grabbed| !hierarchy.contains_window(window, *grabbed));
        if let Some(capture) = self.capture.capture_window()
            && self.hierarchy.contains_window(window, capture)
        {
            self.change_capture(None, None, initiator);
        }
        if let Some(focused) = self.focus.focused()
            && self.hierarchy.contains_window(window, focused)
        {
            self.change_focus(None, initiator);
        }
    }

    /// Moves platform capture and its attribution. `initiator` never hears
    /// about a change it caused.
    pub(crate) fn change_capture(
        &mut self,
        window: Option<WindowId>,
        owner: Option<ClientId>,
        initiator: Option<ClientId>,
    ) {
        let old = self.capture.capture_window();
        if old == window {
            if let Some(window) = window {
                self.set_capture_owner(window, owner, initiator);
            }
            return;
        }
        self.capture.set_capture(window);
        tracing::debug!(old = ?old, new = ?window, owner = ?owner, "capture changed");
        self.router.on_capture_changed(window);
        self.grabs.clear();
        if let Some(old) = old {
            self.set_capture_owner(old, None, initiator);
        }
        if let Some(window) = window {
            self.set_capture_owner(window, owner, initiator);
        }
    }

    fn set_capture_owner(&mut self, window: WindowId, owner: Option<ClientId>, initiator: Option<ClientId>) {
        let Some(record) = self.records.get_mut(&window) else {
            return;
        };
        let previous = record.set_capture_owner(owner);
        if previous == owner {
            return;
        }
        self.router.on_capture_owner_changed(window);
        if let Some(previous) = previous
            && Some(previous) != initiator
        {
            let old_window = self.transport_for(previous, window);
            self.send_to(
                previous,
                ClientMessage::CaptureChanged {
                    new_window: None,
                    old_window: Some(old_window),
                },
            );
        }
    }

    /// Moves focus and its attribution. `requester` is the client whose
    /// request caused the change, if any; it is never notified.
    pub(crate) fn change_focus(&mut self, window: Option<WindowId>, requester: Option<ClientId>) {
        let old = self.focus.focused();
        if old == window {
            return;
        }
        self.focus.set_focused(window);
        tracing::debug!(old = ?old, new = ?window, requester = ?requester, "focus changed");

        if let Some(old) = old
            && let Some(record) = self.records.get_mut(&old)
            && let Some(previous) = record.set_focus_owner(None)
            && Some(previous) != requester
        {
            self.send_to(previous, ClientMessage::WindowFocused { window: None });
        }

        let Some(window) = window else {
            return;
        };
        let requester_controls =
            requester.filter(|client| self.trees.get(client).is_some_and(|t| t.controls(window)));
        let Some(record) = self.records.get_mut(&window) else {
            return;
        };
        let owner = FocusArbiter::attribution(record, requester_controls);
        record.set_focus_owner(owner);
        if let Some(owner) = owner
            && Some(owner) != requester
        {
            let transport = self.transport_for(owner, window);
            self.send_to(
                owner,
                ClientMessage::WindowFocused {
                    window: Some(transport),
                },
            );
        }
    }

    /// The focused window stays put but `client` takes the credit for it.
    pub(crate) fn reattribute_focus(&mut self, window: WindowId, client: ClientId) {
        let Some(record) = self.records.get_mut(&window) else {
            return;
        };
        let previous = record.set_focus_owner(Some(client));
        if let Some(previous) = previous
            && previous != client
        {
            tracing::debug!(window_id = ?window, from = ?previous, to = ?client, "focus attribution corrected");
            self.send_to(previous, ClientMessage::WindowFocused { window: None });
        }
    }

    // ---- destruction and embedding ---------------------------------------

    /// Destroys `window` and everything beneath it. `initiator` is not told
    /// about windows it deleted itself.
    pub(crate) fn destroy_window(&mut self, window: WindowId, initiator: Option<ClientId>) {
        for id in self.hierarchy.subtree_post_order(window) {
            // Tearing down an embedding can already have taken this one.
            if !self.hierarchy.contains(id) {
                continue;
            }
            self.on_window_destroying(id, initiator);
            self.hierarchy.remove(id);
        }
    }

    fn on_window_destroying(&mut self, window: WindowId, initiator: Option<ClientId>) {
        self.router.forget_window(window);
        self.grabs.retain(|_, grabbed| *grabbed != window);
        if self.capture.capture_window() == Some(window) {
            self.change_capture(None, None, initiator);
        }
        if self.focus.focused() == Some(window) {
            self.change_focus(None, initiator);
        }
        if self.drag.as_ref().and_then(|d| d.target) == Some(window) {
            self.leave_drag_target(window);
            if let Some(session) = self.drag.as_mut() {
                session.target = None;
            }
        }

        let Some(mut record) = self.records.remove(&window) else {
            return;
        };
        if let Some(delegate) = record.drag_drop_delegate_mut()
            && let Some(tree) = self.trees.get_mut(&delegate.client())
        {
            delegate.end_session(tree.connection_mut());
        }
        if let Some(embedding) = record.take_embedding() {
            self.tear_down_embedding(window, embedding, true);
        }
        if let Some(owner) = record.owning_tree()
            && let Some(tree) = self.trees.get_mut(&owner)
        {
            let transport = tree.transport_id(window);
            tree.remove_window(window);
            if Some(owner) != initiator {
                tree.send(ClientMessage::WindowDeleted { window: transport });
            }
        }
        self.frame_sinks.invalidate_frame_sink(record.frame_sink_id());
        tracing::debug!(window_id = ?window, "window destroyed");
    }

    /// Ends the embedded side of an embedding that was already detached from
    /// its window. An owned tree dies with it; an external tree only loses
    /// the root.
    fn tear_down_embedding(&mut self, window: WindowId, embedding: Embedding, window_destroyed: bool) {
        let embedded = embedding.embedded_tree();
        tracing::debug!(window_id = ?window, embedded = ?embedded, window_destroyed, "embedding removed");
        let Some(tree) = self.trees.get_mut(&embedded) else {
            return;
        };
        let transport = tree.transport_id(window);
        tree.remove_root(window);
        match embedding.ownership() {
            EmbeddedTreeOwnership::Owned => self.destroy_client_tree(embedded),
            EmbeddedTreeOwnership::External if window_destroyed => {
                tree.send(ClientMessage::WindowDeleted { window: transport })
            }
            EmbeddedTreeOwnership::External => tree.send(ClientMessage::Unembed { window: transport }),
        }
    }

    /// Removes the embedding on `window` while the window lives on. Returns
    /// false if there was none.
    pub(crate) fn remove_embedding(&mut self, window: WindowId) -> bool {
        let Some(record) = self.records.get_mut(&window) else {
            return false;
        };
        let Some(embedding) = record.take_embedding() else {
            return false;
        };
        let embedded = embedding.embedded_tree();
        let held_capture = record.capture_owner() == Some(embedded);
        record.forget_tree(embedded);
        if held_capture {
            self.router.on_capture_owner_changed(window);
        }
        self.restore_frame_sink(window);
        self.tear_down_embedding(window, embedding, false);
        true
    }

    fn restore_frame_sink(&mut self, window: WindowId) {
        let Some(record) = self.records.get_mut(&window) else {
            return;
        };
        let sink = default_frame_sink_id(window);
        let old = record.set_frame_sink_id(sink);
        if old != sink {
            self.frame_sinks.invalidate_frame_sink(old);
            self.frame_sinks.register_frame_sink(sink);
        }
    }

    /// Hosts `embedded` in `window` for `embedder`. `alias` is how an external
    /// tree will name the root.
    pub(crate) fn install_embedding(
        &mut self,
        window: WindowId,
        embedder: ClientId,
        embedded: ClientId,
        ownership: EmbeddedTreeOwnership,
        flags: EmbedFlags,
        alias: Option<WindowId>,
    ) {
        let Some(record) = self.records.get_mut(&window) else {
            return;
        };
        let Some(tree) = self.trees.get_mut(&embedded) else {
            return;
        };
        record.set_embedding(Some(Embedding::new(embedder, embedded, ownership, flags)));
        tree.add_root(window, alias);
        let sink = tree.allocate_frame_sink_id();
        let old_sink = record.set_frame_sink_id(sink);
        self.frame_sinks.invalidate_frame_sink(old_sink);
        self.frame_sinks.register_frame_sink(sink);
        tracing::info!(
            window_id = ?window,
            embedder = ?embedder,
            embedded = ?embedded,
            ?ownership,
            intercepts = flags.contains(EmbedFlags::INTERCEPT_EVENTS),
            "embedding installed"
        );

        let embedder_window = self.transport_for(embedder, window);
        self.send_to(
            embedder,
            ClientMessage::FrameSinkIdAllocated {
                window: embedder_window,
                frame_sink_id: sink,
            },
        );

        let Some(root) = self.window_data(embedded, window) else {
            return;
        };
        let drawn = self.hierarchy.is_drawn(window);
        let message = match ownership {
            EmbeddedTreeOwnership::Owned => {
                let focused = self
                    .focus
                    .focused()
                    .filter(|f| self.trees.get(&embedded).is_some_and(|t| t.controls(*f)))
                    .map(|f| self.transport_for(embedded, f));
                ClientMessage::Embed {
                    root,
                    focused,
                    drawn,
                }
            }
            EmbeddedTreeOwnership::External => ClientMessage::EmbedFromToken { root, drawn },
        };
        self.send_to(embedded, message);
    }

    // ---- window moves ----------------------------------------------------

    pub(crate) fn is_pressed(&self, source: MoveLoopSource) -> bool {
        self.pointers.is_pressed(source)
    }

    /// The move loop for `window` finished. Cancellation requested before
    /// this point wins over `success`.
    pub fn complete_window_move(&mut self, window: WindowId, success: bool) -> bool {
        let found = self
            .trees
            .values_mut()
            .find_map(|tree| tree.take_pending_move(window).map(|pending| (tree.id(), pending)));
        let Some((client, pending)) = found else {
            tracing::debug!(window_id = ?window, "no pending move to complete");
            return false;
        };
        let success = success && !pending.cancelled;
        tracing::debug!(window_id = ?window, client_id = ?client, success, "window move completed");
        self.send_to(
            client,
            ClientMessage::ChangeCompleted {
                change_id: pending.change_id,
                success,
            },
        );
        true
    }

    // ---- input -----------------------------------------------------------

    /// Routes one platform input event. Locations are in screen coordinates.
    pub fn dispatch_event(&mut self, event: Event) -> DispatchReport {
        self.pointers.update(&event);
        let Some((target, location)) = self.find_event_target(&event) else {
            tracing::trace!(event = %event.describe(), "event has no target");
            self.track_implicit_grab(&event, None);
            return DispatchReport {
                target: None,
                decision: RouteDecision::Local,
            };
        };
        let localized = location.map_or(event, |p| event.with_location(p));
        let view = RoutingView {
            hierarchy: &self.hierarchy,
            records: &self.records,
            capture_window: self.capture.capture_window(),
        };
        let decision = self.router.route(&view, target, &localized);
        tracing::trace!(
            window_id = ?target,
            event = %localized.describe(),
            ?decision,
            "routed event"
        );

        let forwarded_to = decision.forwarded_to();
        if let Some((client, window)) = forwarded_to {
            self.send_input_event(client, window, &event);
        }
        if decision.handled_locally() {
            self.local_events.on_local_event(target, &localized);
        }
        self.notify_pointer_watchers(&event, target, forwarded_to.map(|(client, _)| client));
        self.track_implicit_grab(&event, Some(target));
        DispatchReport {
            target: Some(target),
            decision,
        }
    }

    fn find_event_target(&self, event: &Event) -> Option<(WindowId, Option<Point>)> {
        if event.is_key() {
            return self.focus.focused().map(|window| (window, None));
        }
        let screen = event.location()?;
        let fixed = self
            .capture
            .capture_window()
            .or_else(|| event.pointer_id().and_then(|p| self.grabs.get(&p).copied()))
            .filter(|window| self.hierarchy.contains(*window));
        if let Some(window) = fixed {
            let local = targeting::screen_to_window(&self.hierarchy, window, screen);
            return Some((window, Some(local)));
        }
        let (root, in_root) = targeting::root_at(&self.hierarchy, screen)?;
        let view = RoutingView {
            hierarchy: &self.hierarchy,
            records: &self.records,
            capture_window: None,
        };
        let (window, local) = targeting::hit_test(&view, root, in_root)?;
        Some((window, Some(local)))
    }

    fn send_input_event(&mut self, client: ClientId, window: WindowId, screen_event: &Event) {
        let event = match screen_event.location() {
            Some(screen) => {
                screen_event.with_location(targeting::screen_to_window(&self.hierarchy, window, screen))
            }
            None => *screen_event,
        };
        let Some(tree) = self.trees.get_mut(&client) else {
            return;
        };
        let matches_pointer_watcher = tree
            .pointer_watcher()
            .is_some_and(|watcher| watcher.observes(screen_event));
        let event_id = tree.queue_event(event);
        let window = tree.transport_id(window);
        tree.send(ClientMessage::InputEvent {
            event_id,
            window,
            event,
            matches_pointer_watcher,
        });
    }

    fn notify_pointer_watchers(&mut self, event: &Event, target: WindowId, delivered_to: Option<ClientId>) {
        let watchers: Vec<ClientId> = self
            .trees
            .iter()
            .filter(|(id, tree)| {
                Some(**id) != delivered_to && tree.pointer_watcher().is_some_and(|w| w.observes(event))
            })
            .map(|(id, _)| *id)
            .collect();
        for client in watchers {
            let Some(tree) = self.trees.get_mut(&client) else {
                continue;
            };
            let window = tree.controls(target).then(|| tree.transport_id(target));
            tree.send(ClientMessage::ObservedPointerEvent { window, event: *event });
        }
    }

    fn track_implicit_grab(&mut self, event: &Event, target: Option<WindowId>) {
        let Some(pointer_id) = event.pointer_id() else {
            return;
        };
        if event.is_pointer_release() {
            self.grabs.remove(&pointer_id);
        } else if event.is_pointer_press()
            && let Some(target) = target
        {
            self.grabs.entry(pointer_id).or_insert(target);
        }
    }

    pub(crate) fn on_input_event_ack(&mut self, client: ClientId, event: Event, handled: bool) {
        if handled {
            return;
        }
        if let Event::Key(key) = event {
            tracing::debug!(client_id = ?client, code = ?key.code, "client left key unhandled");
            self.delegate.on_unhandled_key_event(&key);
        }
    }

    // ---- drag and drop ---------------------------------------------------

    /// A platform drag entered the screen at `location`.
    pub fn drag_entered(
        &mut self,
        location: Point,
        data: ExchangeData,
        modifiers: KeyModifiers,
        operations: DragOperation,
    ) -> DragOperation {
        if let Some(previous) = self.drag.take()
            && let Some(target) = previous.target
        {
            self.leave_drag_target(target);
        }
        self.drag = Some(DragSession { data, target: None });
        self.drag_updated(location, modifiers, operations)
    }

    /// Returns the operations last accepted by the client under the cursor.
    pub fn drag_updated(
        &mut self,
        location: Point,
        modifiers: KeyModifiers,
        operations: DragOperation,
    ) -> DragOperation {
        let Some(current) = self.drag.as_ref().map(|d| d.target) else {
            return DragOperation::empty();
        };
        let hit = self.drop_target_at(location);
        let hit_window = hit.map(|(window, _)| window);
        if current != hit_window {
            if let Some(old) = current {
                self.leave_drag_target(old);
            }
            if let Some(session) = self.drag.as_mut() {
                session.target = hit_window;
            }
            let Some((window, local)) = hit else {
                return DragOperation::empty();
            };
            let Some(session) = self.drag.take() else {
                return DragOperation::empty();
            };
            let accepted = self
                .with_drag_delegate(window, |delegate, connection, transport| {
                    delegate.on_drag_entered(connection, transport, &session.data, modifiers, local, operations)
                })
                .unwrap_or_else(DragOperation::empty);
            self.drag = Some(session);
            return accepted;
        }
        let Some((window, local)) = hit else {
            return DragOperation::empty();
        };
        self.with_drag_delegate(window, |delegate, connection, transport| {
            delegate.on_drag_updated(connection, transport, modifiers, local, operations)
        })
        .unwrap_or_else(DragOperation::empty)
    }

    pub fn drag_exited(&mut self) {
        if let Some(session) = self.drag.take()
            && let Some(target) = session.target
        {
            self.leave_drag_target(target);
        }
    }

    /// Completes the drag over the current target. Returns the operation the
    /// client last accepted.
    pub fn drag_dropped(&mut self, location: Point, modifiers: KeyModifiers) -> DragOperation {
        let Some(session) = self.drag.take() else {
            return DragOperation::empty();
        };
        let Some(target) = session.target else {
            return DragOperation::empty();
        };
        let local = targeting::screen_to_window(&self.hierarchy, target, location);
        self.with_drag_delegate(target, |delegate, connection, transport| {
            delegate.on_drop(connection, transport, modifiers, local)
        })
        .unwrap_or_else(DragOperation::empty)
    }

    fn leave_drag_target(&mut self, window: WindowId) {
        self.with_drag_delegate(window, |delegate, connection, transport| {
            delegate.on_drag_exited(connection, transport)
        });
    }

    /// Nearest window at or above the hit window that accepts drops, with the
    /// location in its space.
    fn drop_target_at(&self, screen: Point) -> Option<(WindowId, Point)> {
        let (root, in_root) = targeting::root_at(&self.hierarchy, screen)?;
        let view = RoutingView {
            hierarchy: &self.hierarchy,
            records: &self.records,
            capture_window: None,
        };
        let (hit, _) = targeting::hit_test(&view, root, in_root)?;
        let mut candidates = vec![hit];
        candidates.extend(self.hierarchy.ancestors(hit));
        let window = candidates.into_iter().find(|w| {
            self.records
                .get(w)
                .is_some_and(|r| r.drag_drop_delegate().is_some())
        })?;
        Some((window, targeting::screen_to_window(&self.hierarchy, window, screen)))
    }

    fn with_drag_delegate<R>(
        &mut self,
        window: WindowId,
        f: impl FnOnce(&mut DragDropDelegate, &mut dyn ClientConnection, WindowId) -> R,
    ) -> Option<R> {
        let delegate = self.records.get_mut(&window)?.drag_drop_delegate_mut()?;
        let tree = self.trees.get_mut(&delegate.client())?;
        let transport = tree.transport_id(window);
        Some(f(delegate, tree.connection_mut(), transport))
    }
}

impl std::fmt::Debug for WindowService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowService")
            .field("windows", &self.hierarchy.len())
            .field("records", &self.records.len())
            .field("clients", &self.trees.len())
            .field("focused", &self.focus.focused())
            .field("capture", &self.capture.capture_window())
            .finish()
    }
}

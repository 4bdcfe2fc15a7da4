//! Request handlers: one method per request a client can issue.
//!
//! Requests carrying a `ChangeId` always answer with exactly one
//! `ChangeCompleted` (or `TopLevelCreated`), even when they fail. The
//! `*_impl` halves return a [`RequestResult`] and never send completions.

use crate::client::{ClientMessage, ClientTree, PendingMove, PointerWatcher, WindowData};
use crate::delegate::{MoveLoopSource, TopLevelRequest};
use crate::drag_drop::{DragDropDelegate, DragOperation};
use crate::embedding::{EmbedFlags, EmbedToken, EmbeddedTreeOwnership, ScheduledEmbedKind};
use crate::error::{RequestError, RequestResult, ServiceError};
use crate::events::Event;
use crate::focus::FocusArbiter;
use crate::geometry::{Insets, Point, Rect};
use crate::ids::{ChangeId, ClientId, EventId, LocalSurfaceId, WindowId};
use crate::properties::{Properties, WINDOW_TYPE, WindowType};
use crate::record::{WindowRecord, default_frame_sink_id};
use crate::service::WindowService;
use crate::window::OrderDirection;

use super::ClientConnection;

/// A client's view of the service. Every method acts with that client's
/// authority.
pub struct ClientTreeMut<'a> {
    service: &'a mut WindowService,
    id: ClientId,
}

impl<'a> ClientTreeMut<'a> {
    pub(crate) fn new(service: &'a mut WindowService, id: ClientId) -> Self {
        Self { service, id }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    fn tree(&self) -> RequestResult<&ClientTree> {
        self.service
            .trees
            .get(&self.id)
            .ok_or(RequestError::Service(ServiceError::UnknownClient(self.id)))
    }

    fn tree_mut(&mut self) -> RequestResult<&mut ClientTree> {
        self.service
            .trees
            .get_mut(&self.id)
            .ok_or(RequestError::Service(ServiceError::UnknownClient(self.id)))
    }

    /// Maps a client-supplied id to the server window it names.
    fn resolve(&self, window: WindowId) -> RequestResult<WindowId> {
        let server = self.tree()?.server_window_id(window);
        if self.service.hierarchy.contains(server) {
            Ok(server)
        } else {
            Err(RequestError::UnknownWindow(window))
        }
    }

    fn resolve_owned(&self, window: WindowId) -> RequestResult<WindowId> {
        let server = self.resolve(window)?;
        if self.tree()?.owns(server) {
            Ok(server)
        } else {
            Err(self.not_authorized(window))
        }
    }

    fn resolve_controlled(&self, window: WindowId) -> RequestResult<WindowId> {
        let server = self.resolve(window)?;
        if self.tree()?.controls(server) {
            Ok(server)
        } else {
            Err(self.not_authorized(window))
        }
    }

    fn not_authorized(&self, window: WindowId) -> RequestError {
        RequestError::NotAuthorized {
            client: self.id,
            window,
        }
    }

    fn record_mut(&mut self, window: WindowId) -> RequestResult<&mut WindowRecord> {
        self.service
            .records
            .get_mut(&window)
            .ok_or(RequestError::UnknownWindow(window))
    }

    fn log_failure(&self, request: &'static str, err: &RequestError) {
        tracing::debug!(client_id = ?self.id, request, error = %err, "request failed");
    }

    /// Logs a failure, answers `change_id` and returns whether it succeeded.
    fn complete(&mut self, change_id: ChangeId, request: &'static str, result: RequestResult) -> bool {
        let success = match result {
            Ok(()) => true,
            Err(err) => {
                self.log_failure(request, &err);
                false
            }
        };
        self.service.send_to(
            self.id,
            ClientMessage::ChangeCompleted { change_id, success },
        );
        success
    }

    /// For requests without a `ChangeId`: log and flatten.
    fn finish(&self, request: &'static str, result: RequestResult) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.log_failure(request, &err);
                false
            }
        }
    }

    /// How this client names the server window `window`.
    pub fn transport_id(&self, window: WindowId) -> Option<WindowId> {
        self.tree().ok().map(|tree| tree.transport_id(window))
    }

    /// Wire snapshot of a window this client can name.
    pub fn window_data(&self, window: WindowId) -> Option<WindowData> {
        let server = self.resolve(window).ok()?;
        self.service.window_data(self.id, server)
    }

    // ---- creation -------------------------------------------------------

    fn validate_new_id(&self, id: WindowId) -> RequestResult {
        if id.client_id != self.id {
            return Err(RequestError::InvalidArgument(
                "window ids must carry the creating client's id",
            ));
        }
        if self.tree()?.is_id_in_use(id) || self.service.hierarchy.contains(id) {
            return Err(RequestError::IdInUse(id));
        }
        Ok(())
    }

    fn create_window(&mut self, id: WindowId, properties: &Properties, top_level: bool) -> RequestResult {
        self.tree()?;
        if !self.service.hierarchy.create(id) {
            return Err(RequestError::IdInUse(id));
        }
        if let Some(props) = self.service.hierarchy.properties_mut(id) {
            props.merge(properties);
        }
        let sink = default_frame_sink_id(id);
        self.service
            .records
            .insert(id, WindowRecord::new(id, Some(self.id), sink, top_level));
        self.service.frame_sinks.register_frame_sink(sink);
        self.tree_mut()?.add_window(id, top_level);
        tracing::debug!(client_id = ?self.id, window_id = ?id, top_level, "window created");
        Ok(())
    }

    /// Creates a hidden, unparented window.
    pub fn new_window(&mut self, change_id: ChangeId, id: WindowId, properties: Properties) -> bool {
        let result = self
            .validate_new_id(id)
            .and_then(|()| self.create_window(id, &properties, false));
        self.complete(change_id, "new_window", result)
    }

    /// Asks the delegate to place a new top-level. Success is answered with
    /// `TopLevelCreated` rather than `ChangeCompleted`.
    pub fn new_top_level_window(&mut self, change_id: ChangeId, id: WindowId, properties: Properties) -> bool {
        if let Err(err) = self.new_top_level_window_impl(id, &properties) {
            return self.complete(change_id, "new_top_level_window", Err(err));
        }
        let drawn = self.service.hierarchy.is_drawn(id);
        let local_surface_id = self
            .service
            .records
            .get(&id)
            .and_then(WindowRecord::local_surface_id);
        if let Some(window) = self.service.window_data(self.id, id) {
            self.service.send_to(
                self.id,
                ClientMessage::TopLevelCreated {
                    change_id,
                    window,
                    drawn,
                    local_surface_id,
                },
            );
        }
        true
    }

    fn new_top_level_window_impl(&mut self, id: WindowId, properties: &Properties) -> RequestResult {
        self.validate_new_id(id)?;
        let raw_type = properties
            .get(WINDOW_TYPE)
            .ok_or(RequestError::InvalidArgument("top-level window type missing"))?;
        let window_type = WindowType::from_property(raw_type)
            .ok_or(RequestError::InvalidArgument("unknown top-level window type"))?;
        let request = TopLevelRequest {
            client: self.id,
            window: id,
            window_type,
            properties,
        };
        let service = &mut *self.service;
        let placement = service
            .delegate
            .new_top_level(&request, &service.hierarchy)
            .filter(|p| service.hierarchy.contains(p.parent))
            .ok_or(RequestError::DelegateDeclined)?;
        self.create_window(id, properties, true)?;
        self.service.hierarchy.add_child(placement.parent, id);
        self.service.hierarchy.set_bounds(id, placement.bounds);
        self.service.allocate_local_surface_id(id);
        tracing::info!(
            client_id = ?self.id,
            window_id = ?id,
            parent = ?placement.parent,
            window_type = window_type.as_str(),
            "top-level created"
        );
        Ok(())
    }

    // ---- structure ------------------------------------------------------

    pub fn add_child(&mut self, change_id: ChangeId, parent: WindowId, child: WindowId) -> bool {
        let result = self.add_child_impl(parent, child);
        self.complete(change_id, "add_child", result)
    }

    fn add_child_impl(&mut self, parent: WindowId, child: WindowId) -> RequestResult {
        let parent = self.resolve_controlled(parent)?;
        let child_id = child;
        let child = self.resolve_owned(child)?;
        if self.tree()?.is_top_level(child) {
            return Err(RequestError::InvalidArgument("top-levels are parented by the server"));
        }
        if !self.service.hierarchy.add_child(parent, child) {
            return Err(RequestError::InvalidArgument("parenting would create a cycle"));
        }
        if !self.service.hierarchy.is_attached(child) || !self.service.hierarchy.is_drawn(child) {
            self.service.on_subtree_undrawn(child, Some(self.id));
        }
        tracing::debug!(client_id = ?self.id, parent = ?parent, child = ?child_id, "child added");
        Ok(())
    }

    pub fn remove_window_from_parent(&mut self, change_id: ChangeId, window: WindowId) -> bool {
        let result = self.remove_window_from_parent_impl(window);
        self.complete(change_id, "remove_window_from_parent", result)
    }

    fn remove_window_from_parent_impl(&mut self, window: WindowId) -> RequestResult {
        let server = self.resolve_owned(window)?;
        if self.tree()?.is_top_level(server) {
            return Err(RequestError::InvalidArgument("top-levels are parented by the server"));
        }
        if !self.service.hierarchy.remove_from_parent(server) {
            return Err(RequestError::InvalidArgument("window has no parent"));
        }
        self.service.on_subtree_undrawn(server, Some(self.id));
        Ok(())
    }

    pub fn delete_window(&mut self, change_id: ChangeId, window: WindowId) -> bool {
        let result = self.resolve_owned(window).map(|server| {
            self.service.destroy_window(server, Some(self.id));
        });
        self.complete(change_id, "delete_window", result)
    }

    pub fn reorder_window(
        &mut self,
        change_id: ChangeId,
        window: WindowId,
        relative: WindowId,
        direction: OrderDirection,
    ) -> bool {
        let result = self.reorder_window_impl(window, relative, direction);
        self.complete(change_id, "reorder_window", result)
    }

    fn reorder_window_impl(
        &mut self,
        window: WindowId,
        relative: WindowId,
        direction: OrderDirection,
    ) -> RequestResult {
        let server = self.resolve_controlled(window)?;
        let server_relative = self.resolve_controlled(relative)?;
        if !self.service.hierarchy.stack_relative(server, server_relative, direction) {
            return Err(RequestError::NotSiblings(window, relative));
        }
        Ok(())
    }

    fn resolve_owned_top_level(&self, window: WindowId) -> RequestResult<WindowId> {
        let server = self.resolve_owned(window)?;
        if self.tree()?.is_top_level(server) {
            Ok(server)
        } else {
            Err(RequestError::NotTopLevel(window))
        }
    }

    /// Stacks one owned top-level directly above another.
    pub fn stack_above(&mut self, change_id: ChangeId, above: WindowId, below: WindowId) -> bool {
        let result = self.stack_above_impl(above, below);
        self.complete(change_id, "stack_above", result)
    }

    fn stack_above_impl(&mut self, above: WindowId, below: WindowId) -> RequestResult {
        let server_above = self.resolve_owned_top_level(above)?;
        let server_below = self.resolve_owned_top_level(below)?;
        if !self
            .service
            .hierarchy
            .stack_relative(server_above, server_below, OrderDirection::Above)
        {
            return Err(RequestError::NotSiblings(above, below));
        }
        Ok(())
    }

    pub fn stack_at_top(&mut self, change_id: ChangeId, window: WindowId) -> bool {
        let result = self.resolve_owned_top_level(window).and_then(|server| {
            if self.service.hierarchy.stack_at_top(server) {
                Ok(())
            } else {
                Err(RequestError::InvalidArgument("window has no parent"))
            }
        });
        self.complete(change_id, "stack_at_top", result)
    }

    // ---- state ----------------------------------------------------------

    /// Only the owner may move or resize a window. A layout manager that
    /// overrides the request fails it, after telling the client the real
    /// bounds.
    ///
    /// Top-levels take the bounds but report failure unless the client
    /// already named the server-assigned surface id, which it cannot after a
    /// resize. The new id reaches it in the bounds notification.
    pub fn set_window_bounds(
        &mut self,
        change_id: ChangeId,
        window: WindowId,
        bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    ) -> bool {
        let result = self.set_window_bounds_impl(window, bounds, local_surface_id);
        self.complete(change_id, "set_window_bounds", result)
    }

    fn set_window_bounds_impl(
        &mut self,
        window: WindowId,
        bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    ) -> RequestResult {
        let server = self.resolve_owned(window)?;
        if self.tree()?.is_top_level(server) {
            return self.set_top_level_bounds(window, server, bounds, local_surface_id);
        }
        let old = self
            .service
            .hierarchy
            .bounds(server)
            .ok_or(RequestError::UnknownWindow(window))?;
        let actual = self
            .service
            .hierarchy
            .set_bounds(server, bounds)
            .ok_or(RequestError::UnknownWindow(window))?;
        if local_surface_id.is_some() {
            self.record_mut(server)?.set_local_surface_id(local_surface_id);
        }
        self.service
            .notify_bounds_changed(server, old, actual, Some(self.id));
        if actual != bounds {
            let local_surface_id = self
                .service
                .records
                .get(&server)
                .and_then(WindowRecord::local_surface_id);
            self.service.send_to(
                self.id,
                ClientMessage::WindowBoundsChanged {
                    window,
                    old_bounds: old,
                    new_bounds: actual,
                    local_surface_id,
                },
            );
            return Err(RequestError::BoundsOverridden {
                requested: bounds,
                actual,
            });
        }
        Ok(())
    }

    fn set_top_level_bounds(
        &mut self,
        window: WindowId,
        server: WindowId,
        bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    ) -> RequestResult {
        let old = self
            .service
            .hierarchy
            .bounds(server)
            .ok_or(RequestError::UnknownWindow(window))?;
        let actual = self
            .service
            .hierarchy
            .set_bounds(server, bounds)
            .ok_or(RequestError::UnknownWindow(window))?;
        // Allocates the new surface id when the size changed.
        self.service
            .notify_bounds_changed(server, old, actual, Some(self.id));
        let current = self
            .service
            .records
            .get(&server)
            .and_then(WindowRecord::local_surface_id);
        if actual != old {
            self.service.send_to(
                self.id,
                ClientMessage::WindowBoundsChanged {
                    window,
                    old_bounds: old,
                    new_bounds: actual,
                    local_surface_id: current,
                },
            );
        }
        if actual != bounds {
            return Err(RequestError::BoundsOverridden {
                requested: bounds,
                actual,
            });
        }
        if local_surface_id != current {
            return Err(RequestError::StaleSurfaceId(window));
        }
        Ok(())
    }

    pub fn set_window_visibility(&mut self, change_id: ChangeId, window: WindowId, visible: bool) -> bool {
        let result = self.resolve_owned(window).map(|server| {
            self.service.set_visibility(server, visible, Some(self.id));
        });
        self.complete(change_id, "set_window_visibility", result)
    }

    pub fn set_window_property(
        &mut self,
        change_id: ChangeId,
        window: WindowId,
        key: &str,
        value: Option<Vec<u8>>,
    ) -> bool {
        let result = self.set_window_property_impl(window, key, value);
        self.complete(change_id, "set_window_property", result)
    }

    fn set_window_property_impl(&mut self, window: WindowId, key: &str, value: Option<Vec<u8>>) -> RequestResult {
        if key.is_empty() {
            return Err(RequestError::InvalidArgument("property key is empty"));
        }
        let server = self.resolve_controlled(window)?;
        let properties = self
            .service
            .hierarchy
            .properties_mut(server)
            .ok_or(RequestError::UnknownWindow(window))?;
        if properties.set(key, value.clone()) {
            self.service
                .notify_property_changed(server, key, value, Some(self.id));
        }
        Ok(())
    }

    /// Declares which part of a top-level is client content. Everything else
    /// is chrome the server handles itself.
    pub fn set_client_area(&mut self, window: WindowId, insets: Insets, additional: Vec<Rect>) -> bool {
        let result = self.set_client_area_impl(window, insets, additional);
        self.finish("set_client_area", result)
    }

    fn set_client_area_impl(&mut self, window: WindowId, insets: Insets, additional: Vec<Rect>) -> RequestResult {
        if insets.top < 0 || insets.left < 0 || insets.bottom < 0 || insets.right < 0 {
            return Err(RequestError::InvalidArgument("client area insets must not be negative"));
        }
        let server = self.resolve_controlled(window)?;
        self.record_mut(server)?.set_client_area(insets, additional);
        Ok(())
    }

    pub fn set_can_focus(&mut self, window: WindowId, can_focus: bool) -> bool {
        let result = self.resolve_controlled(window).and_then(|server| {
            self.record_mut(server)?.set_focusable(can_focus);
            Ok(())
        });
        self.finish("set_can_focus", result)
    }

    /// Installs or removes the window's drop target.
    pub fn set_can_accept_drops(&mut self, window: WindowId, accepts: bool) -> bool {
        let result = self.set_can_accept_drops_impl(window, accepts);
        self.finish("set_can_accept_drops", result)
    }

    fn set_can_accept_drops_impl(&mut self, window: WindowId, accepts: bool) -> RequestResult {
        let server = self.resolve_controlled(window)?;
        let client = self.id;
        let service = &mut *self.service;
        let record = service
            .records
            .get_mut(&server)
            .ok_or(RequestError::UnknownWindow(window))?;
        let delegate = accepts.then(|| DragDropDelegate::new(client));
        if let Some(mut old) = record.set_drag_drop_delegate(delegate)
            && let Some(tree) = service.trees.get_mut(&old.client())
        {
            old.end_session(tree.connection_mut());
        }
        Ok(())
    }

    // ---- capture and focus ----------------------------------------------

    pub fn set_capture(&mut self, change_id: ChangeId, window: WindowId) -> bool {
        let result = self.set_capture_impl(window);
        self.complete(change_id, "set_capture", result)
    }

    fn set_capture_impl(&mut self, window: WindowId) -> RequestResult {
        let server = self.resolve_controlled(window)?;
        if !self.service.hierarchy.is_drawn(server) {
            return Err(RequestError::NotVisible(window));
        }
        self.service
            .change_capture(Some(server), Some(self.id), Some(self.id));
        Ok(())
    }

    /// Fails without side effects unless this client holds capture on
    /// `window`.
    pub fn release_capture(&mut self, change_id: ChangeId, window: WindowId) -> bool {
        let result = self.release_capture_impl(window);
        self.complete(change_id, "release_capture", result)
    }

    fn release_capture_impl(&mut self, window: WindowId) -> RequestResult {
        let server = self.resolve_controlled(window)?;
        let held = self.service.capture.capture_window() == Some(server)
            && self
                .service
                .records
                .get(&server)
                .and_then(WindowRecord::capture_owner)
                == Some(self.id);
        if !held {
            return Err(RequestError::InvalidArgument(
                "window does not hold capture for this client",
            ));
        }
        self.service.change_capture(None, None, Some(self.id));
        Ok(())
    }

    /// Focuses `window`, or clears focus with `None`.
    pub fn set_focus(&mut self, change_id: ChangeId, window: Option<WindowId>) -> bool {
        let result = self.set_focus_impl(window);
        self.complete(change_id, "set_focus", result)
    }

    fn set_focus_impl(&mut self, window: Option<WindowId>) -> RequestResult {
        let Some(window) = window else {
            if let Some(focused) = self.service.focus.focused() {
                let attributed = self
                    .service
                    .records
                    .get(&focused)
                    .and_then(WindowRecord::focus_owner)
                    == Some(self.id);
                if !attributed && !self.tree()?.controls(focused) {
                    return Err(self.not_authorized(focused));
                }
            }
            self.service.change_focus(None, Some(self.id));
            return Ok(());
        };
        let server = self.resolve_controlled(window)?;
        if !FocusArbiter::can_focus(&self.service.hierarchy, &self.service.records, server) {
            return Err(RequestError::InvalidArgument("window cannot take focus"));
        }
        if self.service.focus.focused() == Some(server) {
            self.service.reattribute_focus(server, self.id);
        } else {
            self.service.change_focus(Some(server), Some(self.id));
        }
        Ok(())
    }

    // ---- embedding ------------------------------------------------------

    /// Hosts a new client on `connection` inside `window`, or with `None`
    /// removes whatever is embedded there. There is no completion message;
    /// the embedder learns the new surface through `FrameSinkIdAllocated`.
    pub fn embed(
        &mut self,
        window: WindowId,
        connection: Option<Box<dyn ClientConnection>>,
        flags: EmbedFlags,
    ) -> bool {
        let result = self.embed_impl(window, connection, flags);
        self.finish("embed", result)
    }

    fn embed_impl(
        &mut self,
        window: WindowId,
        connection: Option<Box<dyn ClientConnection>>,
        flags: EmbedFlags,
    ) -> RequestResult {
        let server = self.resolve_owned(window)?;
        let Some(connection) = connection else {
            return if self.service.remove_embedding(server) {
                Ok(())
            } else {
                Err(RequestError::InvalidArgument("window has no embedding"))
            };
        };
        self.prepare_embed_root(window, server, flags)?;
        let embedded = self.service.create_client_tree(connection)?;
        self.service.install_embedding(
            server,
            self.id,
            embedded,
            EmbeddedTreeOwnership::Owned,
            flags,
            None,
        );
        Ok(())
    }

    /// Clears the way for a new embedding on `server`.
    fn prepare_embed_root(&mut self, window: WindowId, server: WindowId, flags: EmbedFlags) -> RequestResult {
        let has_embedding = self
            .service
            .records
            .get(&server)
            .is_some_and(|r| r.embedding().is_some());
        if !has_embedding {
            return Ok(());
        }
        if !flags.contains(EmbedFlags::REPLACE_EXISTING) {
            return Err(RequestError::EmbedExists(window));
        }
        self.service.remove_embedding(server);
        Ok(())
    }

    /// Parks `connection` behind a single-use token another party can redeem
    /// with [`embed_using_token`](Self::embed_using_token).
    pub fn schedule_embed(&mut self, connection: Box<dyn ClientConnection>) -> Option<EmbedToken> {
        self.tree().ok()?;
        let token = self
            .service
            .scheduled_embeds
            .schedule(self.id, ScheduledEmbedKind::NewClient(connection));
        tracing::debug!(client_id = ?self.id, %token, "embed scheduled");
        Some(token)
    }

    /// Offers this client itself for embedding. It will know the root it is
    /// eventually embedded in as `(own id, root_local_id)`, so that id must
    /// be free.
    pub fn schedule_embed_for_existing_client(&mut self, root_local_id: u32) -> Option<EmbedToken> {
        let alias = WindowId::new(self.id, root_local_id);
        let in_use = self.tree().ok()?.is_id_in_use(alias)
            || self.service.hierarchy.contains(alias)
            || self.service.scheduled_embeds.reserves(self.id, root_local_id);
        if in_use {
            tracing::debug!(client_id = ?self.id, root_local_id, "embed root id already in use");
            return None;
        }
        let token = self.service.scheduled_embeds.schedule(
            self.id,
            ScheduledEmbedKind::ExistingClient {
                client: self.id,
                root_local_id,
            },
        );
        tracing::debug!(client_id = ?self.id, %token, root_local_id, "existing-client embed scheduled");
        Some(token)
    }

    /// Redeems `token` to embed in `window`. The token is consumed whether or
    /// not the embed succeeds.
    pub fn embed_using_token(&mut self, window: WindowId, token: EmbedToken, flags: EmbedFlags) -> bool {
        let result = self.embed_using_token_impl(window, token, flags);
        self.finish("embed_using_token", result)
    }

    fn embed_using_token_impl(&mut self, window: WindowId, token: EmbedToken, flags: EmbedFlags) -> RequestResult {
        self.tree()?;
        let scheduled = self.service.scheduled_embeds.redeem(token)?;
        let server = self.resolve_owned(window)?;
        match scheduled.kind {
            ScheduledEmbedKind::NewClient(connection) => {
                self.prepare_embed_root(window, server, flags)?;
                let embedded = self.service.create_client_tree(connection)?;
                self.service.install_embedding(
                    server,
                    self.id,
                    embedded,
                    EmbeddedTreeOwnership::Owned,
                    flags,
                    None,
                );
            }
            ScheduledEmbedKind::ExistingClient {
                client,
                root_local_id,
            } => {
                if client == self.id {
                    return Err(RequestError::InvalidArgument("a client cannot embed itself"));
                }
                let alias = WindowId::new(client, root_local_id);
                let embedded_tree = self
                    .service
                    .trees
                    .get(&client)
                    .ok_or(ServiceError::UnknownClient(client))?;
                if embedded_tree.is_id_in_use(alias) {
                    return Err(RequestError::IdInUse(alias));
                }
                self.prepare_embed_root(window, server, flags)?;
                self.service.install_embedding(
                    server,
                    self.id,
                    client,
                    EmbeddedTreeOwnership::External,
                    flags,
                    Some(alias),
                );
            }
        }
        Ok(())
    }

    // ---- moves ----------------------------------------------------------

    /// Starts an interactive move of an owned, drawn top-level. Completion is
    /// reported once the host calls `WindowService::complete_window_move`.
    pub fn perform_window_move(
        &mut self,
        change_id: ChangeId,
        window: WindowId,
        source: MoveLoopSource,
        start: Point,
    ) -> bool {
        match self.perform_window_move_impl(change_id, window, source, start) {
            Ok(()) => true,
            Err(err) => self.complete(change_id, "perform_window_move", Err(err)),
        }
    }

    fn perform_window_move_impl(
        &mut self,
        change_id: ChangeId,
        window: WindowId,
        source: MoveLoopSource,
        start: Point,
    ) -> RequestResult {
        let server = self.resolve_owned_top_level(window)?;
        if !self.service.hierarchy.is_drawn(server) {
            return Err(RequestError::NotVisible(window));
        }
        if self.tree()?.pending_move().is_some() {
            return Err(RequestError::MoveInProgress);
        }
        if !self.service.is_pressed(source) {
            return Err(RequestError::NoActivePress);
        }
        self.tree_mut()?.set_pending_move(Some(PendingMove {
            change_id,
            window: server,
            cancelled: false,
        }));
        tracing::debug!(client_id = ?self.id, window_id = ?server, ?source, "window move started");
        self.service
            .delegate
            .run_window_move_loop(server, source, start);
        Ok(())
    }

    /// Cancels this client's pending move of `window`, if there is one.
    pub fn cancel_window_move(&mut self, window: WindowId) -> bool {
        let Ok(server) = self.resolve(window) else {
            return false;
        };
        let cancelled = self
            .tree_mut()
            .is_ok_and(|tree| tree.cancel_pending_move(server));
        if cancelled {
            tracing::debug!(client_id = ?self.id, window_id = ?server, "window move cancelled");
            self.service.delegate.cancel_window_move_loop(server);
        }
        cancelled
    }

    // ---- input ----------------------------------------------------------

    pub fn start_pointer_watcher(&mut self, want_moves: bool) -> bool {
        let Ok(tree) = self.tree_mut() else {
            return false;
        };
        tree.set_pointer_watcher(Some(PointerWatcher { want_moves }));
        true
    }

    pub fn stop_pointer_watcher(&mut self) -> bool {
        let Ok(tree) = self.tree_mut() else {
            return false;
        };
        tree.set_pointer_watcher(None);
        true
    }

    /// Acks the oldest outstanding input event. Out-of-order acks are
    /// ignored.
    pub fn on_window_input_event_ack(&mut self, event_id: EventId, handled: bool) -> bool {
        let event: Option<Event> = self
            .tree_mut()
            .ok()
            .and_then(|tree| tree.ack_event(event_id));
        let Some(event) = event else {
            tracing::debug!(client_id = ?self.id, ?event_id, "unexpected input event ack");
            return false;
        };
        self.service.on_input_event_ack(self.id, event, handled);
        true
    }

    /// The client's answer to the latest drag enter/over on `window`.
    pub fn respond_to_drag(&mut self, window: WindowId, operations: DragOperation) -> bool {
        let result = self.resolve_controlled(window).and_then(|server| {
            let client = self.id;
            let delegate = self
                .record_mut(server)?
                .drag_drop_delegate_mut()
                .filter(|d| d.client() == client)
                .ok_or(RequestError::InvalidArgument("window does not accept drops"))?;
            delegate.update_operations(operations);
            Ok(())
        });
        self.finish("respond_to_drag", result)
    }
}

#[cfg(test)]
mod tests {
    use crate::embedding::EmbedFlags;
    use crate::geometry::Rect;
    use crate::record::WindowRecord;
    use crate::testing::{RecordingConnection, TestSetup};

    #[test]
    fn replacing_an_embedding_destroys_the_owned_tree() {
        let mut t = TestSetup::new();
        let a = t.client_id;
        let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
        let host = t.new_window(top, 2, Rect::new(10, 10, 50, 50)).unwrap();
        let (b, b_log) = t.embed_new_client(a, host, EmbedFlags::empty()).unwrap();
        let inner = t
            .new_window_for(b, &b_log, host, 1, Rect::new(0, 0, 10, 10))
            .unwrap();
        t.log.clear();

        let (connection, c_log) = RecordingConnection::new();
        assert!(t.client().embed(host, Some(Box::new(connection)), EmbedFlags::REPLACE_EXISTING));

        assert!(t.service.tree(b).is_none());
        assert!(!t.service.hierarchy().contains(inner));
        assert!(b_log.is_empty());
        let c = t.service.record(host).and_then(WindowRecord::embedded_tree).unwrap();
        assert_ne!(c, b);
        assert_eq!(c_log.descriptions(), vec!["OnEmbed"]);
        let embedder = t.log.take();
        assert_eq!(embedder.len(), 1);
        assert!(embedder[0].starts_with("OnFrameSinkIdAllocated window=1,2"));
    }

    #[test]
    fn embedding_over_an_embedding_needs_replace_existing() {
        let mut t = TestSetup::new();
        let a = t.client_id;
        let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
        let host = t.new_window(top, 2, Rect::new(10, 10, 50, 50)).unwrap();
        let (b, _b_log) = t.embed_new_client(a, host, EmbedFlags::empty()).unwrap();
        let clients = t.service.client_ids().count();

        let (connection, c_log) = RecordingConnection::new();
        assert!(!t.client().embed(host, Some(Box::new(connection)), EmbedFlags::empty()));
        assert!(c_log.is_empty());
        assert_eq!(t.service.client_ids().count(), clients);
        assert_eq!(t.service.record(host).and_then(WindowRecord::embedded_tree), Some(b));
    }

    #[test]
    fn embedding_nothing_removes_the_embedding() {
        let mut t = TestSetup::new();
        let a = t.client_id;
        let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
        let host = t.new_window(top, 2, Rect::new(10, 10, 50, 50)).unwrap();
        assert!(!t.client().embed(host, None, EmbedFlags::empty()));

        let (b, _b_log) = t.embed_new_client(a, host, EmbedFlags::empty()).unwrap();
        assert!(t.client().embed(host, None, EmbedFlags::empty()));
        assert!(t.service.tree(b).is_none());
        assert_eq!(t.service.record(host).and_then(WindowRecord::embedded_tree), None);
    }

    #[test]
    fn top_levels_cannot_be_reparented_by_clients() {
        let mut t = TestSetup::new();
        let top = t.new_top_level(1, Rect::new(0, 0, 100, 100)).unwrap();
        let other = t.new_top_level(2, Rect::new(100, 0, 100, 100)).unwrap();
        let change = t.change_id();
        assert!(!t.client().add_child(change, other, top));
        assert_eq!(t.service.hierarchy().parent(top), Some(t.root()));
    }

    #[test]
    fn embedded_clients_may_not_resize_their_root() {
        let mut t = TestSetup::new();
        let a = t.client_id;
        let top = t.new_top_level(1, Rect::new(0, 0, 200, 200)).unwrap();
        let host = t.new_window(top, 2, Rect::new(10, 10, 50, 50)).unwrap();
        let (b, b_log) = t.embed_new_client(a, host, EmbedFlags::empty()).unwrap();
        b_log.clear();
        let change = t.change_id();
        assert!(!t.service.client(b).set_window_bounds(change, host, Rect::new(0, 0, 5, 5), None));
        assert_eq!(b_log.take(), vec![format!("ChangeCompleted id={change} success=false")]);
        assert_eq!(t.service.hierarchy().bounds(host), Some(Rect::new(10, 10, 50, 50)));
    }
}

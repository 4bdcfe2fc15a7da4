//! Per-window protocol state, stored beside the window arena.

use crate::drag_drop::DragDropDelegate;
use crate::embedding::Embedding;
use crate::geometry::{Insets, Point, Rect};
use crate::ids::{ClientId, FrameSinkId, LocalSurfaceId, WindowId};

/// Server-side metadata for a window that takes part in the protocol.
///
/// Created the first time anything needs protocol state for a window and
/// dropped together with the window. It never outlives it.
#[derive(Debug)]
pub struct WindowRecord {
    window: WindowId,
    owning_tree: Option<ClientId>,
    is_top_level: bool,
    embedding: Option<Embedding>,
    client_area: Insets,
    additional_client_areas: Vec<Rect>,
    capture_owner: Option<ClientId>,
    focus_owner: Option<ClientId>,
    frame_sink_id: FrameSinkId,
    local_surface_id: Option<LocalSurfaceId>,
    drag_drop_delegate: Option<DragDropDelegate>,
    focusable: bool,
}

/// The surface a window has before anything is embedded in it.
pub fn default_frame_sink_id(window: WindowId) -> FrameSinkId {
    FrameSinkId {
        client_id: window.client_id,
        sink_id: window.local_id,
    }
}

impl WindowRecord {
    pub fn new(
        window: WindowId,
        owning_tree: Option<ClientId>,
        frame_sink_id: FrameSinkId,
        is_top_level: bool,
    ) -> Self {
        Self {
            window,
            owning_tree,
            is_top_level: is_top_level && owning_tree.is_some(),
            embedding: None,
            client_area: Insets::default(),
            additional_client_areas: Vec::new(),
            capture_owner: None,
            focus_owner: None,
            frame_sink_id,
            local_surface_id: None,
            drag_drop_delegate: None,
            focusable: true,
        }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn owning_tree(&self) -> Option<ClientId> {
        self.owning_tree
    }

    /// Top-levels always have an owning tree.
    pub fn is_top_level(&self) -> bool {
        self.is_top_level
    }

    pub fn embedding(&self) -> Option<&Embedding> {
        self.embedding.as_ref()
    }

    pub fn set_embedding(&mut self, embedding: Option<Embedding>) -> Option<Embedding> {
        std::mem::replace(&mut self.embedding, embedding)
    }

    pub fn take_embedding(&mut self) -> Option<Embedding> {
        self.embedding.take()
    }

    pub fn embedded_tree(&self) -> Option<ClientId> {
        self.embedding.as_ref().map(Embedding::embedded_tree)
    }

    /// The tree that installed the embedding wants every event for it.
    pub fn does_owner_intercept_events(&self) -> bool {
        self.embedding
            .as_ref()
            .is_some_and(Embedding::intercepts_events)
    }

    /// Trees that see this window: the owner and, if any, the embedded tree.
    pub fn interested_trees(&self) -> Vec<ClientId> {
        let mut out = Vec::with_capacity(2);
        out.extend(self.owning_tree);
        if let Some(embedded) = self.embedded_tree()
            && !out.contains(&embedded)
        {
            out.push(embedded);
        }
        out
    }

    pub fn client_area(&self) -> Insets {
        self.client_area
    }

    pub fn additional_client_areas(&self) -> &[Rect] {
        &self.additional_client_areas
    }

    /// Returns true if anything changed.
    pub fn set_client_area(&mut self, insets: Insets, additional: Vec<Rect>) -> bool {
        if self.client_area == insets && self.additional_client_areas == additional {
            return false;
        }
        self.client_area = insets;
        self.additional_client_areas = additional;
        true
    }

    pub fn has_non_client_area(&self) -> bool {
        self.is_top_level
            && (!self.client_area.is_empty() || !self.additional_client_areas.is_empty())
    }

    /// Whether `location` (in the window's own space) falls outside the client
    /// area. Locations outside `bounds` count as non-client, which covers
    /// resize handles drawn beyond the edge. Only top-levels have a non-client
    /// area.
    pub fn is_location_in_non_client_area(&self, bounds: Rect, location: Point) -> bool {
        if !self.is_top_level {
            return false;
        }
        let local = bounds.local();
        if !local.contains(location) {
            return true;
        }
        if local.inset(self.client_area).contains(location) {
            return false;
        }
        !self
            .additional_client_areas
            .iter()
            .any(|area| area.contains(location))
    }

    pub fn capture_owner(&self) -> Option<ClientId> {
        self.capture_owner
    }

    /// Returns the previous owner.
    pub fn set_capture_owner(&mut self, owner: Option<ClientId>) -> Option<ClientId> {
        std::mem::replace(&mut self.capture_owner, owner)
    }

    pub fn focus_owner(&self) -> Option<ClientId> {
        self.focus_owner
    }

    /// Returns the previous owner.
    pub fn set_focus_owner(&mut self, owner: Option<ClientId>) -> Option<ClientId> {
        std::mem::replace(&mut self.focus_owner, owner)
    }

    pub fn frame_sink_id(&self) -> FrameSinkId {
        self.frame_sink_id
    }

    pub fn set_frame_sink_id(&mut self, id: FrameSinkId) -> FrameSinkId {
        std::mem::replace(&mut self.frame_sink_id, id)
    }

    pub fn local_surface_id(&self) -> Option<LocalSurfaceId> {
        self.local_surface_id
    }

    pub fn set_local_surface_id(&mut self, id: Option<LocalSurfaceId>) {
        self.local_surface_id = id;
    }

    pub fn drag_drop_delegate(&self) -> Option<&DragDropDelegate> {
        self.drag_drop_delegate.as_ref()
    }

    pub fn drag_drop_delegate_mut(&mut self) -> Option<&mut DragDropDelegate> {
        self.drag_drop_delegate.as_mut()
    }

    pub fn set_drag_drop_delegate(
        &mut self,
        delegate: Option<DragDropDelegate>,
    ) -> Option<DragDropDelegate> {
        std::mem::replace(&mut self.drag_drop_delegate, delegate)
    }

    pub fn focusable(&self) -> bool {
        self.focusable
    }

    pub fn set_focusable(&mut self, focusable: bool) {
        self.focusable = focusable;
    }

    /// Drops capture/focus attribution pointing at `client`. Returns true if
    /// either was cleared.
    pub fn forget_tree(&mut self, client: ClientId) -> bool {
        let mut cleared = false;
        if self.capture_owner == Some(client) {
            self.capture_owner = None;
            cleared = true;
        }
        if self.focus_owner == Some(client) {
            self.focus_owner = None;
            cleared = true;
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbedFlags, EmbeddedTreeOwnership};

    fn top_level() -> WindowRecord {
        let id = WindowId::new(ClientId(1), 1);
        WindowRecord::new(
            id,
            Some(ClientId(1)),
            FrameSinkId {
                client_id: ClientId(1),
                sink_id: 1,
            },
            true,
        )
    }

    #[test]
    fn non_client_area_follows_insets() {
        let mut record = top_level();
        let bounds = Rect::new(10, 10, 100, 100);
        assert!(!record.has_non_client_area());
        record.set_client_area(Insets::top(10), Vec::new());
        assert!(record.has_non_client_area());
        assert!(record.is_location_in_non_client_area(bounds, Point::new(5, 6)));
        assert!(!record.is_location_in_non_client_area(bounds, Point::new(5, 40)));
        // Outside the bounds counts as non-client.
        assert!(record.is_location_in_non_client_area(bounds, Point::new(-1, 40)));
    }

    #[test]
    fn additional_client_areas_are_client() {
        let mut record = top_level();
        let bounds = Rect::new(0, 0, 100, 100);
        record.set_client_area(Insets::top(10), vec![Rect::new(80, 0, 20, 10)]);
        assert!(!record.is_location_in_non_client_area(bounds, Point::new(85, 5)));
        assert!(record.is_location_in_non_client_area(bounds, Point::new(50, 5)));
    }

    #[test]
    fn ordinary_windows_have_no_non_client_area() {
        let record = WindowRecord::new(
            WindowId::new(ClientId(1), 2),
            Some(ClientId(1)),
            FrameSinkId {
                client_id: ClientId(1),
                sink_id: 2,
            },
            false,
        );
        assert!(!record.is_location_in_non_client_area(Rect::new(0, 0, 5, 5), Point::new(50, 50)));
    }

    #[test]
    fn interested_trees_lists_owner_then_embedded() {
        let mut record = top_level();
        assert_eq!(record.interested_trees(), vec![ClientId(1)]);
        record.set_embedding(Some(Embedding::new(
            ClientId(1),
            ClientId(2),
            EmbeddedTreeOwnership::Owned,
            EmbedFlags::INTERCEPT_EVENTS,
        )));
        assert_eq!(record.interested_trees(), vec![ClientId(1), ClientId(2)]);
        assert!(record.does_owner_intercept_events());
    }

    #[test]
    fn forget_tree_clears_both_roles() {
        let mut record = top_level();
        record.set_capture_owner(Some(ClientId(3)));
        record.set_focus_owner(Some(ClientId(3)));
        assert!(record.forget_tree(ClientId(3)));
        assert_eq!(record.capture_owner(), None);
        assert_eq!(record.focus_owner(), None);
        assert!(!record.forget_tree(ClientId(3)));
    }
}

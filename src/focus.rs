//! The single process-wide focus pointer and the rules for attributing it to
//! a client.

use std::collections::BTreeMap;

use crate::ids::{ClientId, WindowId};
use crate::record::WindowRecord;
use crate::window::WindowHierarchy;

#[derive(Debug, Clone, Copy, Default)]
pub struct FocusArbiter {
    focused: Option<WindowId>,
}

impl FocusArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    /// Returns the previously focused window.
    pub fn set_focused(&mut self, window: Option<WindowId>) -> Option<WindowId> {
        std::mem::replace(&mut self.focused, window)
    }

    /// Whether a tracked window may take focus: it must belong to a client,
    /// be drawn and attached, and not have opted out.
    pub fn can_focus(
        hierarchy: &WindowHierarchy,
        records: &BTreeMap<WindowId, WindowRecord>,
        window: WindowId,
    ) -> bool {
        let Some(record) = records.get(&window) else {
            return false;
        };
        if record.owning_tree().is_none() && record.embedded_tree().is_none() {
            return false;
        }
        hierarchy.is_drawn(window) && hierarchy.is_attached(window) && record.focusable()
    }

    /// The client credited with focus on `window`. A requester that controls
    /// the window keeps the credit; otherwise the embedded client wins over the
    /// owner.
    pub fn attribution(record: &WindowRecord, requester_controls: Option<ClientId>) -> Option<ClientId> {
        requester_controls
            .or_else(|| record.embedded_tree())
            .or_else(|| record.owning_tree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbedFlags, EmbeddedTreeOwnership, Embedding};
    use crate::geometry::Rect;
    use crate::ids::FrameSinkId;

    fn record(window: WindowId, owner: Option<ClientId>) -> WindowRecord {
        WindowRecord::new(
            window,
            owner,
            FrameSinkId {
                client_id: window.client_id,
                sink_id: window.local_id,
            },
            false,
        )
    }

    #[test]
    fn embedded_beats_owner() {
        let window = WindowId::new(ClientId(1), 1);
        let mut rec = record(window, Some(ClientId(1)));
        assert_eq!(FocusArbiter::attribution(&rec, None), Some(ClientId(1)));
        rec.set_embedding(Some(Embedding::new(
            ClientId(1),
            ClientId(2),
            EmbeddedTreeOwnership::Owned,
            EmbedFlags::empty(),
        )));
        assert_eq!(FocusArbiter::attribution(&rec, None), Some(ClientId(2)));
        assert_eq!(
            FocusArbiter::attribution(&rec, Some(ClientId(1))),
            Some(ClientId(1))
        );
    }

    #[test]
    fn can_focus_requires_drawn_tracked_window() {
        let root = WindowId::new(ClientId::SERVER, 1);
        let window = WindowId::new(ClientId(1), 1);
        let mut hierarchy = WindowHierarchy::new();
        hierarchy.add_root(root, Rect::new(0, 0, 10, 10));
        hierarchy.create(window);
        let mut records = BTreeMap::new();
        records.insert(window, record(window, Some(ClientId(1))));

        assert!(!FocusArbiter::can_focus(&hierarchy, &records, window));
        hierarchy.add_child(root, window);
        hierarchy.set_visible(window, true);
        assert!(FocusArbiter::can_focus(&hierarchy, &records, window));

        if let Some(rec) = records.get_mut(&window) {
            rec.set_focusable(false);
        }
        assert!(!FocusArbiter::can_focus(&hierarchy, &records, window));

        // Server windows without a client are never focusable through here.
        let local = WindowId::new(ClientId::SERVER, 2000);
        hierarchy.create(local);
        hierarchy.add_child(root, local);
        hierarchy.set_visible(local, true);
        records.insert(local, record(local, None));
        assert!(!FocusArbiter::can_focus(&hierarchy, &records, local));
    }
}

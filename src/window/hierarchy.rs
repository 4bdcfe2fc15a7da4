use std::collections::BTreeMap;

use super::{LayoutManager, OrderDirection, Window};
use crate::geometry::{Point, Rect};
use crate::ids::WindowId;
use crate::properties::Properties;

/// Arena of every window in the process, keyed by id.
///
/// The hierarchy knows nothing about clients. It only enforces structural
/// rules (no cycles, stacking among siblings); the service decides who may
/// ask for what.
#[derive(Debug, Default)]
pub struct WindowHierarchy {
    windows: BTreeMap<WindowId, Window>,
    roots: Vec<WindowId>,
    next_seq: usize,
}

impl WindowHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_order(&mut self) -> usize {
        let order = self.next_seq;
        self.next_seq = order.saturating_add(1);
        order
    }

    /// Adds a display root. Roots are always visible and never parented.
    pub fn add_root(&mut self, id: WindowId, bounds: Rect) -> bool {
        if self.windows.contains_key(&id) {
            return false;
        }
        let order = self.next_order();
        let mut window = Window::new(id, order);
        window.bounds = bounds;
        window.visible = true;
        window.is_root = true;
        self.windows.insert(id, window);
        self.roots.push(id);
        tracing::debug!(window_id = ?id, ?bounds, "added display root");
        true
    }

    pub fn roots(&self) -> &[WindowId] {
        &self.roots
    }

    /// Creates a hidden, unparented window. Fails if `id` is taken.
    pub fn create(&mut self, id: WindowId) -> bool {
        if self.windows.contains_key(&id) {
            return false;
        }
        let order = self.next_order();
        self.windows.insert(id, Window::new(id, order));
        true
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn get(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn parent(&self, id: WindowId) -> Option<WindowId> {
        self.get(id).and_then(Window::parent)
    }

    pub fn children(&self, id: WindowId) -> &[WindowId] {
        self.get(id).map(Window::children).unwrap_or(&[])
    }

    pub fn bounds(&self, id: WindowId) -> Option<Rect> {
        self.get(id).map(Window::bounds)
    }

    pub fn properties(&self, id: WindowId) -> Option<&Properties> {
        self.get(id).map(Window::properties)
    }

    pub fn properties_mut(&mut self, id: WindowId) -> Option<&mut Properties> {
        self.windows.get_mut(&id).map(|w| &mut w.properties)
    }

    /// Ancestors of `id`, nearest first, excluding `id` itself.
    pub fn ancestors(&self, id: WindowId) -> Vec<WindowId> {
        let mut out = Vec::new();
        let mut current = self.parent(id);
        while let Some(parent) = current {
            out.push(parent);
            current = self.parent(parent);
        }
        out
    }

    /// True if `window` is `ancestor` or lies beneath it.
    pub fn contains_window(&self, ancestor: WindowId, window: WindowId) -> bool {
        window == ancestor || self.ancestors(window).contains(&ancestor)
    }

    /// The display root `id` hangs off, if it is attached to one.
    pub fn root_of(&self, id: WindowId) -> Option<WindowId> {
        let top = self.ancestors(id).last().copied().unwrap_or(id);
        self.get(top).filter(|w| w.is_root).map(Window::id)
    }

    pub fn is_attached(&self, id: WindowId) -> bool {
        self.root_of(id).is_some()
    }

    /// Visible itself and through every ancestor.
    pub fn is_drawn(&self, id: WindowId) -> bool {
        let Some(window) = self.get(id) else {
            return false;
        };
        window.visible
            && self
                .ancestors(id)
                .iter()
                .all(|a| self.get(*a).is_some_and(Window::visible))
    }

    pub fn add_child(&mut self, parent: WindowId, child: WindowId) -> bool {
        if parent == child || !self.contains(parent) || !self.contains(child) {
            return false;
        }
        if self.get(child).is_some_and(|w| w.is_root) {
            return false;
        }
        // Refuse cycles.
        if self.contains_window(child, parent) {
            return false;
        }
        self.remove_from_parent(child);
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.push(child);
        }
        if let Some(c) = self.windows.get_mut(&child) {
            c.parent = Some(parent);
        }
        true
    }

    pub fn remove_from_parent(&mut self, child: WindowId) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        if let Some(p) = self.windows.get_mut(&parent) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = self.windows.get_mut(&child) {
            c.parent = None;
        }
        true
    }

    /// `id` and all descendants, children before parents.
    pub fn subtree_post_order(&self, id: WindowId) -> Vec<WindowId> {
        let mut out = Vec::new();
        self.collect_post_order(id, &mut out);
        out
    }

    fn collect_post_order(&self, id: WindowId, out: &mut Vec<WindowId>) {
        if !self.contains(id) {
            return;
        }
        for child in self.children(id) {
            self.collect_post_order(*child, out);
        }
        out.push(id);
    }

    /// Removes a single node. Remaining children are left unparented.
    pub fn remove(&mut self, id: WindowId) -> Option<Window> {
        self.remove_from_parent(id);
        let window = self.windows.remove(&id)?;
        for child in &window.children {
            if let Some(c) = self.windows.get_mut(child) {
                c.parent = None;
            }
        }
        self.roots.retain(|r| *r != id);
        Some(window)
    }

    /// Applies a bounds request, letting the parent's layout manager have the
    /// final say. Returns the bounds actually applied.
    pub fn set_bounds(&mut self, id: WindowId, requested: Rect) -> Option<Rect> {
        if !self.contains(id) {
            return None;
        }
        let parent = self.parent(id);
        let manager = parent
            .and_then(|p| self.windows.get_mut(&p))
            .and_then(|p| p.layout_manager.take());
        let actual = match manager {
            Some(mut manager) => {
                let actual = manager.set_child_bounds(id, requested);
                if let Some(p) = parent.and_then(|p| self.windows.get_mut(&p)) {
                    p.layout_manager = Some(manager);
                }
                actual
            }
            None => requested,
        };
        if let Some(window) = self.windows.get_mut(&id) {
            window.bounds = actual;
        }
        Some(actual)
    }

    /// Returns true if the visibility flag changed.
    pub fn set_visible(&mut self, id: WindowId, visible: bool) -> bool {
        match self.windows.get_mut(&id) {
            Some(window) if !window.is_root && window.visible != visible => {
                window.visible = visible;
                true
            }
            _ => false,
        }
    }

    pub fn set_layout_manager(
        &mut self,
        id: WindowId,
        manager: Option<Box<dyn LayoutManager>>,
    ) -> bool {
        match self.windows.get_mut(&id) {
            Some(window) => {
                window.layout_manager = manager;
                true
            }
            None => false,
        }
    }

    pub fn are_siblings(&self, a: WindowId, b: WindowId) -> bool {
        a != b && self.parent(a).is_some() && self.parent(a) == self.parent(b)
    }

    /// Moves `child` directly above or below `target` among their siblings.
    pub fn stack_relative(
        &mut self,
        child: WindowId,
        target: WindowId,
        direction: OrderDirection,
    ) -> bool {
        if !self.are_siblings(child, target) {
            return false;
        }
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let Some(p) = self.windows.get_mut(&parent) else {
            return false;
        };
        p.children.retain(|c| *c != child);
        let Some(target_index) = p.children.iter().position(|c| *c == target) else {
            return false;
        };
        let index = match direction {
            OrderDirection::Above => target_index + 1,
            OrderDirection::Below => target_index,
        };
        p.children.insert(index, child);
        true
    }

    pub fn stack_at_top(&mut self, child: WindowId) -> bool {
        let Some(parent) = self.parent(child) else {
            return false;
        };
        let Some(p) = self.windows.get_mut(&parent) else {
            return false;
        };
        p.children.retain(|c| *c != child);
        p.children.push(child);
        true
    }

    /// Offset of `id`'s origin from its display root's origin.
    pub fn origin_in_root(&self, id: WindowId) -> Option<Point> {
        let window = self.get(id)?;
        if window.is_root {
            return Some(Point::default());
        }
        let mut origin = window.bounds.origin();
        for ancestor in self.ancestors(id) {
            let a = self.get(ancestor)?;
            if a.is_root {
                break;
            }
            origin = origin.offset(a.bounds.x, a.bounds.y);
        }
        Some(origin)
    }

    /// Converts a root-space location into `id`'s coordinate space.
    pub fn location_in_window(&self, id: WindowId, root_location: Point) -> Option<Point> {
        let origin = self.origin_in_root(id)?;
        Some(root_location.offset(-origin.x, -origin.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ClientId;

    fn id(local: u32) -> WindowId {
        WindowId::new(ClientId(1), local)
    }

    fn root() -> WindowId {
        WindowId::new(ClientId::SERVER, 1)
    }

    struct Clamp(Rect);

    impl LayoutManager for Clamp {
        fn set_child_bounds(&mut self, _child: WindowId, _requested: Rect) -> Rect {
            self.0
        }
    }

    #[test]
    fn refuses_cycles_and_self_parenting() {
        let mut h = WindowHierarchy::new();
        h.create(id(1));
        h.create(id(2));
        assert!(h.add_child(id(1), id(2)));
        assert!(!h.add_child(id(2), id(1)));
        assert!(!h.add_child(id(1), id(1)));
        assert_eq!(h.parent(id(2)), Some(id(1)));
    }

    #[test]
    fn drawn_requires_visible_ancestors() {
        let mut h = WindowHierarchy::new();
        h.add_root(root(), Rect::new(0, 0, 100, 100));
        h.create(id(1));
        h.create(id(2));
        h.add_child(root(), id(1));
        h.add_child(id(1), id(2));
        h.set_visible(id(2), true);
        assert!(!h.is_drawn(id(2)));
        h.set_visible(id(1), true);
        assert!(h.is_drawn(id(2)));
        assert!(h.is_attached(id(2)));
    }

    #[test]
    fn layout_manager_overrides_requested_bounds() {
        let mut h = WindowHierarchy::new();
        h.add_root(root(), Rect::new(0, 0, 100, 100));
        h.create(id(1));
        h.add_child(root(), id(1));
        h.set_layout_manager(root(), Some(Box::new(Clamp(Rect::new(1, 1, 5, 5)))));
        assert_eq!(
            h.set_bounds(id(1), Rect::new(0, 0, 50, 50)),
            Some(Rect::new(1, 1, 5, 5))
        );
        assert_eq!(h.bounds(id(1)), Some(Rect::new(1, 1, 5, 5)));
    }

    #[test]
    fn stacking_among_siblings() {
        let mut h = WindowHierarchy::new();
        h.create(id(1));
        h.create(id(2));
        h.create(id(3));
        h.add_child(id(1), id(2));
        h.add_child(id(1), id(3));
        assert!(h.stack_relative(id(2), id(3), OrderDirection::Above));
        assert_eq!(h.children(id(1)), &[id(3), id(2)]);
        assert!(h.stack_relative(id(2), id(3), OrderDirection::Below));
        assert_eq!(h.children(id(1)), &[id(2), id(3)]);
        assert!(!h.stack_relative(id(1), id(3), OrderDirection::Above));
        assert!(h.stack_at_top(id(2)));
        assert_eq!(h.children(id(1)), &[id(3), id(2)]);
    }

    #[test]
    fn locations_convert_through_ancestors() {
        let mut h = WindowHierarchy::new();
        h.add_root(root(), Rect::new(0, 0, 200, 200));
        h.create(id(1));
        h.create(id(2));
        h.add_child(root(), id(1));
        h.add_child(id(1), id(2));
        h.set_bounds(id(1), Rect::new(10, 10, 100, 100));
        h.set_bounds(id(2), Rect::new(5, 5, 10, 10));
        assert_eq!(
            h.location_in_window(id(2), Point::new(20, 20)),
            Some(Point::new(5, 5))
        );
        assert_eq!(
            h.location_in_window(id(1), Point::new(0, 0)),
            Some(Point::new(-10, -10))
        );
    }

    #[test]
    fn post_order_lists_children_first() {
        let mut h = WindowHierarchy::new();
        h.create(id(1));
        h.create(id(2));
        h.create(id(3));
        h.add_child(id(1), id(2));
        h.add_child(id(2), id(3));
        assert_eq!(h.subtree_post_order(id(1)), vec![id(3), id(2), id(1)]);
    }
}

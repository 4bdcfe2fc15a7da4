//! Finding the window an event is aimed at.

use super::RoutingView;
use crate::geometry::Point;
use crate::ids::WindowId;
use crate::window::WindowHierarchy;

/// The display root under a screen location, with the location converted into
/// that root's space.
pub fn root_at(hierarchy: &WindowHierarchy, screen: Point) -> Option<(WindowId, Point)> {
    hierarchy.roots().iter().find_map(|root| {
        let bounds = hierarchy.bounds(*root)?;
        bounds
            .contains(screen)
            .then(|| (*root, screen.offset(-bounds.x, -bounds.y)))
    })
}

/// Converts a screen location into `window`'s space. Windows not attached to
/// a display treat the screen as their topmost ancestor's space.
pub fn screen_to_window(hierarchy: &WindowHierarchy, window: WindowId, screen: Point) -> Point {
    let root_origin = hierarchy
        .root_of(window)
        .and_then(|root| hierarchy.bounds(root))
        .map(|bounds| bounds.origin())
        .unwrap_or_default();
    let in_root = screen.offset(-root_origin.x, -root_origin.y);
    hierarchy
        .location_in_window(window, in_root)
        .unwrap_or(in_root)
}

/// Whether hit testing must stop at `window` instead of considering its
/// children: the embedder intercepts everything, or the location is chrome
/// that belongs to the top-level itself.
fn stops_descent(view: &RoutingView<'_>, window: WindowId, location: Point) -> bool {
    let Some(record) = view.records.get(&window) else {
        return false;
    };
    if record.does_owner_intercept_events() {
        return true;
    }
    let bounds = view.hierarchy.bounds(window).unwrap_or_default();
    record.is_location_in_non_client_area(bounds, location)
}

/// Deepest drawn window under `location`, given in `root`'s space. Children
/// are considered topmost first. Returns the window and the location in its
/// space.
pub fn hit_test(view: &RoutingView<'_>, root: WindowId, location: Point) -> Option<(WindowId, Point)> {
    let hierarchy = view.hierarchy;
    let root_bounds = hierarchy.bounds(root)?;
    if !hierarchy.is_drawn(root) || !root_bounds.local().contains(location) {
        return None;
    }
    let mut current = root;
    let mut local = location;
    loop {
        if stops_descent(view, current, local) {
            break;
        }
        let next = hierarchy.children(current).iter().rev().find_map(|child| {
            let window = hierarchy.get(*child)?;
            let bounds = window.bounds();
            (window.visible() && bounds.contains(local))
                .then(|| (*child, local.offset(-bounds.x, -bounds.y)))
        });
        match next {
            Some((child, child_local)) => {
                current = child;
                local = child_local;
            }
            None => break,
        }
    }
    Some((current, local))
}

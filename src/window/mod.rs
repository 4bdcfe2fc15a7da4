mod hierarchy;

pub use hierarchy::WindowHierarchy;

use crate::geometry::Rect;
use crate::ids::WindowId;
use crate::properties::Properties;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Above,
    Below,
}

/// Policy a container applies to bounds requested for its children.
///
/// Installed per parent window. Returning something other than `requested`
/// overrides the caller; the service reports that back to the requesting
/// client as a failed change.
pub trait LayoutManager {
    fn set_child_bounds(&mut self, child: WindowId, requested: Rect) -> Rect;
}

/// A node in the shared window hierarchy.
///
/// Nodes carry only generic windowing state. Everything protocol-specific
/// lives in the service's side-tables keyed by the same id.
pub struct Window {
    id: WindowId,
    parent: Option<WindowId>,
    /// Back-to-front.
    children: Vec<WindowId>,
    bounds: Rect,
    visible: bool,
    properties: Properties,
    layout_manager: Option<Box<dyn LayoutManager>>,
    is_root: bool,
    creation_order: usize,
}

impl Window {
    fn new(id: WindowId, creation_order: usize) -> Self {
        Self {
            id,
            parent: None,
            children: Vec::new(),
            bounds: Rect::default(),
            visible: false,
            properties: Properties::new(),
            layout_manager: None,
            is_root: false,
            creation_order,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn children(&self) -> &[WindowId] {
        &self.children
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// The window's own visibility flag, ignoring ancestors.
    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn creation_order(&self) -> usize {
        self.creation_order
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("bounds", &self.bounds)
            .field("visible", &self.visible)
            .field("is_root", &self.is_root)
            .finish_non_exhaustive()
    }
}

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crossterm::event::KeyModifiers;

use crate::drag_drop::DragOperation;
use crate::events::Event;
use crate::geometry::{Point, Rect};
use crate::ids::{ChangeId, EventId, FrameSinkId, LocalSurfaceId, WindowId};
use crate::properties::Properties;

/// Outbound half of a client's channel. Delivery is ordered and reliable; how
/// the bytes travel is the transport's business.
pub trait ClientConnection {
    fn send(&mut self, message: ClientMessage);
}

impl<T: ClientConnection + ?Sized> ClientConnection for Box<T> {
    fn send(&mut self, message: ClientMessage) {
        (**self).send(message)
    }
}

impl<T: ClientConnection + ?Sized> ClientConnection for &mut T {
    fn send(&mut self, message: ClientMessage) {
        (**self).send(message)
    }
}

/// Wire snapshot of a window as a particular client sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowData {
    /// `None` when the client does not know the parent.
    pub parent_id: Option<WindowId>,
    pub window_id: WindowId,
    pub bounds: Rect,
    pub visible: bool,
    pub properties: Properties,
    pub frame_sink_id: FrameSinkId,
}

/// Everything the server sends to a client. Window ids are always expressed
/// the way the receiving client knows the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    ChangeCompleted {
        change_id: ChangeId,
        success: bool,
    },
    TopLevelCreated {
        change_id: ChangeId,
        window: WindowData,
        drawn: bool,
        local_surface_id: Option<LocalSurfaceId>,
    },
    Embed {
        root: WindowData,
        focused: Option<WindowId>,
        drawn: bool,
    },
    EmbedFromToken {
        root: WindowData,
        drawn: bool,
    },
    Unembed {
        window: WindowId,
    },
    EmbeddedAppDisconnected {
        window: WindowId,
    },
    FrameSinkIdAllocated {
        window: WindowId,
        frame_sink_id: FrameSinkId,
    },
    WindowBoundsChanged {
        window: WindowId,
        old_bounds: Rect,
        new_bounds: Rect,
        local_surface_id: Option<LocalSurfaceId>,
    },
    WindowVisibilityChanged {
        window: WindowId,
        visible: bool,
    },
    WindowPropertyChanged {
        window: WindowId,
        key: String,
        value: Option<Vec<u8>>,
    },
    WindowDeleted {
        window: WindowId,
    },
    CaptureChanged {
        new_window: Option<WindowId>,
        old_window: Option<WindowId>,
    },
    WindowFocused {
        window: Option<WindowId>,
    },
    InputEvent {
        event_id: EventId,
        window: WindowId,
        event: Event,
        matches_pointer_watcher: bool,
    },
    ObservedPointerEvent {
        window: Option<WindowId>,
        event: Event,
    },
    DragDropStart {
        data: BTreeMap<String, Vec<u8>>,
    },
    DragEnter {
        window: WindowId,
        modifiers: KeyModifiers,
        location: Point,
        operations: DragOperation,
    },
    DragOver {
        window: WindowId,
        modifiers: KeyModifiers,
        location: Point,
        operations: DragOperation,
    },
    DragLeave {
        window: WindowId,
    },
    CompleteDrop {
        window: WindowId,
        modifiers: KeyModifiers,
        location: Point,
        operations: DragOperation,
    },
    DragDropDone,
}

fn id_or_null(id: Option<WindowId>) -> String {
    id.map_or_else(|| "null".to_string(), |id| id.to_string())
}

fn bounds_text(r: Rect) -> String {
    format!("{},{} {}x{}", r.x, r.y, r.width, r.height)
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

impl ClientMessage {
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            ClientMessage::InputEvent { .. } | ClientMessage::ObservedPointerEvent { .. }
        )
    }

    /// One-line transcript form, e.g. `ChangeCompleted id=1 success=true`.
    pub fn describe(&self) -> String {
        match self {
            ClientMessage::ChangeCompleted { change_id, success } => {
                format!("ChangeCompleted id={change_id} success={success}")
            }
            ClientMessage::TopLevelCreated {
                change_id,
                window,
                drawn,
                ..
            } => format!(
                "TopLevelCreated id={change_id} window_id={} drawn={drawn}",
                window.window_id
            ),
            ClientMessage::Embed { .. } => "OnEmbed".to_string(),
            ClientMessage::EmbedFromToken { .. } => "OnEmbedFromToken".to_string(),
            ClientMessage::Unembed { window } => format!("OnUnembed window={window}"),
            ClientMessage::EmbeddedAppDisconnected { window } => {
                format!("OnEmbeddedAppDisconnected window={window}")
            }
            ClientMessage::FrameSinkIdAllocated {
                window,
                frame_sink_id,
            } => format!("OnFrameSinkIdAllocated window={window} {frame_sink_id}"),
            ClientMessage::WindowBoundsChanged {
                window, new_bounds, ..
            } => format!(
                "BoundsChanged window={window} bounds={}",
                bounds_text(*new_bounds)
            ),
            ClientMessage::WindowVisibilityChanged { window, visible } => {
                format!("VisibilityChanged window={window} visible={visible}")
            }
            ClientMessage::WindowPropertyChanged { window, key, value } => format!(
                "PropertyChanged window={window} key={key} value={}",
                value.as_deref().map_or_else(|| "NULL".to_string(), hex)
            ),
            ClientMessage::WindowDeleted { window } => format!("WindowDeleted window={window}"),
            ClientMessage::CaptureChanged {
                new_window,
                old_window,
            } => format!(
                "OnCaptureChanged new_window={} old_window={}",
                id_or_null(*new_window),
                id_or_null(*old_window)
            ),
            ClientMessage::WindowFocused { window } => {
                format!("Focused id={}", id_or_null(*window))
            }
            ClientMessage::InputEvent {
                window,
                event,
                matches_pointer_watcher,
                ..
            } => {
                let mut text = format!("InputEvent window={window} {}", event.describe());
                if *matches_pointer_watcher {
                    text.push_str(" watched");
                }
                text
            }
            ClientMessage::ObservedPointerEvent { window, event } => format!(
                "PointerWatcherEvent window={} {}",
                id_or_null(*window),
                event.describe()
            ),
            ClientMessage::DragDropStart { .. } => "DragDropStart".to_string(),
            ClientMessage::DragEnter { window, .. } => format!("DragEnter window={window}"),
            ClientMessage::DragOver { window, .. } => format!("DragOver window={window}"),
            ClientMessage::DragLeave { window } => format!("DragLeave window={window}"),
            ClientMessage::CompleteDrop { window, .. } => format!("CompleteDrop window={window}"),
            ClientMessage::DragDropDone => "DragDropDone".to_string(),
        }
    }
}

/// Connection that only logs what it would send. Used by the terminal demo
/// where clients live in-process.
#[derive(Debug, Clone, Default)]
pub struct TracingConnection {
    name: String,
}

impl TracingConnection {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl ClientConnection for TracingConnection {
    fn send(&mut self, message: ClientMessage) {
        tracing::info!(client = %self.name, message = %message.describe(), "client message");
    }
}

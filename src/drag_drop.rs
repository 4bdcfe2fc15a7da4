//! Bridges a platform drag session to the client owning the window under the
//! cursor.
//!
//! The platform asks synchronously which operations a drop would perform while
//! the client answers asynchronously, so the delegate hands back the last
//! answer it received.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crossterm::event::KeyModifiers;

use crate::client::{ClientConnection, ClientMessage};
use crate::geometry::Point;
use crate::ids::{ClientId, WindowId};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct DragOperation: u32 {
        const COPY = 1;
        const LINK = 1 << 1;
        const MOVE = 1 << 2;
    }
}

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_URI_LIST: &str = "text/uri-list";

/// Platform drag payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeData {
    pub text: Option<String>,
    pub url: Option<String>,
    pub filenames: Vec<PathBuf>,
    pub custom: BTreeMap<String, Vec<u8>>,
}

impl ExchangeData {
    /// Flattens the payload into mime-type keyed bytes for the wire.
    pub fn to_mime_map(&self) -> BTreeMap<String, Vec<u8>> {
        let mut out = self.custom.clone();
        if let Some(text) = &self.text {
            out.insert(MIME_TEXT.to_string(), text.as_bytes().to_vec());
        }
        let mut uris: Vec<String> = Vec::new();
        if let Some(url) = &self.url {
            uris.push(url.clone());
        }
        uris.extend(
            self.filenames
                .iter()
                .map(|path| format!("file://{}", path.display())),
        );
        if !uris.is_empty() {
            out.insert(MIME_URI_LIST.to_string(), uris.join("\r\n").into_bytes());
        }
        out
    }
}

/// Installed on a window while its client accepts drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragDropDelegate {
    client: ClientId,
    in_session: bool,
    last_operations: DragOperation,
}

impl DragDropDelegate {
    pub fn new(client: ClientId) -> Self {
        Self {
            client,
            in_session: false,
            last_operations: DragOperation::empty(),
        }
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn in_session(&self) -> bool {
        self.in_session
    }

    pub fn last_operations(&self) -> DragOperation {
        self.last_operations
    }

    fn start_session(&mut self, connection: &mut dyn ClientConnection, data: &ExchangeData) {
        if self.in_session {
            return;
        }
        self.in_session = true;
        self.last_operations = DragOperation::empty();
        connection.send(ClientMessage::DragDropStart {
            data: data.to_mime_map(),
        });
    }

    /// Ends the session if one is running. Safe to call at any time.
    pub fn end_session(&mut self, connection: &mut dyn ClientConnection) {
        if !self.in_session {
            return;
        }
        self.in_session = false;
        self.last_operations = DragOperation::empty();
        connection.send(ClientMessage::DragDropDone);
    }

    pub fn on_drag_entered(
        &mut self,
        connection: &mut dyn ClientConnection,
        window: WindowId,
        data: &ExchangeData,
        modifiers: KeyModifiers,
        location: Point,
        operations: DragOperation,
    ) -> DragOperation {
        self.start_session(connection, data);
        connection.send(ClientMessage::DragEnter {
            window,
            modifiers,
            location,
            operations,
        });
        self.last_operations
    }

    pub fn on_drag_updated(
        &mut self,
        connection: &mut dyn ClientConnection,
        window: WindowId,
        modifiers: KeyModifiers,
        location: Point,
        operations: DragOperation,
    ) -> DragOperation {
        if !self.in_session {
            return DragOperation::empty();
        }
        connection.send(ClientMessage::DragOver {
            window,
            modifiers,
            location,
            operations,
        });
        self.last_operations
    }

    pub fn on_drag_exited(&mut self, connection: &mut dyn ClientConnection, window: WindowId) {
        if !self.in_session {
            return;
        }
        connection.send(ClientMessage::DragLeave { window });
        self.end_session(connection);
    }

    /// Forwards the drop and ends the session without waiting for the client.
    pub fn on_drop(
        &mut self,
        connection: &mut dyn ClientConnection,
        window: WindowId,
        modifiers: KeyModifiers,
        location: Point,
    ) -> DragOperation {
        if !self.in_session {
            return DragOperation::empty();
        }
        let operations = self.last_operations;
        connection.send(ClientMessage::CompleteDrop {
            window,
            modifiers,
            location,
            operations,
        });
        self.end_session(connection);
        operations
    }

    /// Records the client's latest answer to an enter/over.
    pub fn update_operations(&mut self, operations: DragOperation) {
        if self.in_session {
            self.last_operations = operations;
        }
    }
}

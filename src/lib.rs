//! A window-tree server shared by several clients.
//!
//! The privileged process owns one hierarchy of windows; clients connect,
//! create windows they own, embed other clients into windows, and receive
//! input according to ownership, embedding, capture and focus.

pub mod capture;
pub mod client;
pub mod config;
pub mod constants;
pub mod delegate;
pub mod drag_drop;
pub mod drivers;
pub mod embedding;
pub mod error;
pub mod event_loop;
pub mod events;
pub mod focus;
pub mod geometry;
pub mod ids;
pub mod properties;
pub mod record;
pub mod router;
pub mod service;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tracing_sub;
pub mod view;
pub mod window;

pub use client::{ClientConnection, ClientMessage, ClientTreeMut, WindowData};
pub use config::ServiceConfig;
pub use error::{RequestError, ServiceError};
pub use events::Event;
pub use geometry::{Insets, Point, Rect};
pub use ids::{ClientId, EventId, WindowId};
pub use router::RouteDecision;
pub use service::{DispatchReport, WindowService};

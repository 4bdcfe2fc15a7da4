//! Error taxonomy.
//!
//! `ServiceError` is reserved for conditions that leave the registry unable to
//! continue. Everything a client can provoke is a `RequestError`, which is only
//! ever surfaced to the client as a failed `ChangeCompleted`.

use thiserror::Error;

use crate::geometry::Rect;
use crate::ids::{ClientId, WindowId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("client id space exhausted after {0} clients")]
    ClientIdsExhausted(u32),
    #[error("unknown client {0}")]
    UnknownClient(ClientId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("window {0} is not known to the client")]
    UnknownWindow(WindowId),
    #[error("client {client} may not modify window {window}")]
    NotAuthorized { client: ClientId, window: WindowId },
    #[error("window id {0} is already in use")]
    IdInUse(WindowId),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("window {0} is not visible")]
    NotVisible(WindowId),
    #[error("windows {0} and {1} are not siblings")]
    NotSiblings(WindowId, WindowId),
    #[error("window {0} is not a top-level")]
    NotTopLevel(WindowId),
    #[error("requested bounds {requested:?} were overridden to {actual:?}")]
    BoundsOverridden { requested: Rect, actual: Rect },
    #[error("surface id for top-level {0} is assigned by the server")]
    StaleSurfaceId(WindowId),
    #[error("the delegate declined the request")]
    DelegateDeclined,
    #[error("window {0} already hosts an embedding")]
    EmbedExists(WindowId),
    #[error("embed token rejected: {0}")]
    TokenRejected(#[from] TokenError),
    #[error("a window move is already in progress")]
    MoveInProgress,
    #[error("the input device has no active press")]
    NoActivePress,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("unknown or already redeemed token")]
    Unknown,
    #[error("token expired")]
    Expired,
}

pub type RequestResult<T = ()> = Result<T, RequestError>;

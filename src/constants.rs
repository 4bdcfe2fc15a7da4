//! Shared crate-wide constants.

use std::time::Duration;

use crate::events::PointerId;

/// Pointer id used for all mouse events. Touch points carry their own ids,
/// which are always below this value.
pub const MOUSE_POINTER_ID: PointerId = i32::MAX;

/// How long a token handed out by `schedule_embed` stays redeemable.
///
/// Tokens are single-use; this bounds how long an unredeemed token can sit in
/// the table when the party it was meant for never shows up.
pub const DEFAULT_EMBED_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Width of the display root created when no display is configured.
pub const DEFAULT_DISPLAY_WIDTH: i32 = 1280;

/// Height of the display root created when no display is configured.
pub const DEFAULT_DISPLAY_HEIGHT: i32 = 800;

/// Initial size of a top-level when the placement policy has nothing better.
pub const DEFAULT_TOP_LEVEL_WIDTH: i32 = 400;
pub const DEFAULT_TOP_LEVEL_HEIGHT: i32 = 300;

/// First local id handed to windows the server creates for itself. Display
/// roots take the ids below it.
pub const FIRST_LOCAL_WINDOW_ID: u32 = 1024;

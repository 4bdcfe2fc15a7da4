use std::time::Duration;

use crate::constants::{
    DEFAULT_DISPLAY_HEIGHT, DEFAULT_DISPLAY_WIDTH, DEFAULT_EMBED_TOKEN_TTL,
    DEFAULT_TOP_LEVEL_HEIGHT, DEFAULT_TOP_LEVEL_WIDTH,
};
use crate::geometry::Rect;

/// Knobs for a [`WindowService`](crate::service::WindowService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Bounds of each display root, in screen coordinates.
    pub displays: Vec<Rect>,
    /// Where the default placement policy puts new top-levels.
    pub default_top_level_bounds: Rect,
    pub embed_token_ttl: Duration,
    /// Highest client id handed out before the registry reports exhaustion.
    pub max_client_id: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            displays: vec![Rect::new(
                0,
                0,
                DEFAULT_DISPLAY_WIDTH,
                DEFAULT_DISPLAY_HEIGHT,
            )],
            default_top_level_bounds: Rect::new(
                0,
                0,
                DEFAULT_TOP_LEVEL_WIDTH,
                DEFAULT_TOP_LEVEL_HEIGHT,
            ),
            embed_token_ttl: DEFAULT_EMBED_TOKEN_TTL,
            max_client_id: u32::MAX,
        }
    }
}

impl ServiceConfig {
    pub fn with_display(mut self, bounds: Rect) -> Self {
        self.displays = vec![bounds];
        self
    }

    pub fn with_max_client_id(mut self, max_client_id: u32) -> Self {
        self.max_client_id = max_client_id;
        self
    }

    pub fn with_embed_token_ttl(mut self, ttl: Duration) -> Self {
        self.embed_token_ttl = ttl;
        self
    }
}

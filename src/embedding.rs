//! One client hosting another client's tree inside one of its windows, and
//! the token table backing the two-phase embed handshake.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::client::ClientConnection;
use crate::error::TokenError;
use crate::ids::ClientId;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct EmbedFlags: u32 {
        /// Every event that would reach the embedded tree goes to the embedder.
        const INTERCEPT_EVENTS = 1;
        /// Tear down an embedding already installed on the window.
        const REPLACE_EXISTING = 1 << 1;
    }
}

/// Whether destroying the embedding also destroys the embedded tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddedTreeOwnership {
    /// The embedding created the tree and holds its connection.
    Owned,
    /// The tree existed before and attached through a token.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embedding {
    embedding_tree: ClientId,
    embedded_tree: ClientId,
    ownership: EmbeddedTreeOwnership,
    intercepts_events: bool,
}

impl Embedding {
    pub fn new(
        embedding_tree: ClientId,
        embedded_tree: ClientId,
        ownership: EmbeddedTreeOwnership,
        flags: EmbedFlags,
    ) -> Self {
        Self {
            embedding_tree,
            embedded_tree,
            ownership,
            intercepts_events: flags.contains(EmbedFlags::INTERCEPT_EVENTS),
        }
    }

    pub fn embedding_tree(&self) -> ClientId {
        self.embedding_tree
    }

    pub fn embedded_tree(&self) -> ClientId {
        self.embedded_tree
    }

    pub fn ownership(&self) -> EmbeddedTreeOwnership {
        self.ownership
    }

    pub fn owns_embedded_tree(&self) -> bool {
        self.ownership == EmbeddedTreeOwnership::Owned
    }

    pub fn intercepts_events(&self) -> bool {
        self.intercepts_events
    }
}

/// Unguessable handle returned by `schedule_embed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmbedToken(Uuid);

impl EmbedToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for EmbedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub enum ScheduledEmbedKind {
    /// Redeeming creates a new tree for this connection.
    NewClient(Box<dyn ClientConnection>),
    /// Redeeming attaches an existing tree, which will know the embed root as
    /// `(client, root_local_id)`.
    ExistingClient { client: ClientId, root_local_id: u32 },
}

impl fmt::Debug for ScheduledEmbedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduledEmbedKind::NewClient(_) => f.write_str("NewClient"),
            ScheduledEmbedKind::ExistingClient {
                client,
                root_local_id,
            } => f
                .debug_struct("ExistingClient")
                .field("client", client)
                .field("root_local_id", root_local_id)
                .finish(),
        }
    }
}

#[derive(Debug)]
pub struct ScheduledEmbed {
    pub scheduled_by: ClientId,
    pub kind: ScheduledEmbedKind,
    created_at: Instant,
}

/// Outstanding embed tokens. Tokens are single-use, expire after `ttl` and
/// die with the client that scheduled them.
#[derive(Debug)]
pub struct ScheduledEmbeds {
    entries: BTreeMap<EmbedToken, ScheduledEmbed>,
    ttl: Duration,
}

impl ScheduledEmbeds {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: BTreeMap::new(),
            ttl,
        }
    }

    pub fn schedule(&mut self, scheduled_by: ClientId, kind: ScheduledEmbedKind) -> EmbedToken {
        self.schedule_at(scheduled_by, kind, Instant::now())
    }

    fn schedule_at(
        &mut self,
        scheduled_by: ClientId,
        kind: ScheduledEmbedKind,
        now: Instant,
    ) -> EmbedToken {
        self.purge_expired(now);
        let token = EmbedToken::generate();
        self.entries.insert(
            token,
            ScheduledEmbed {
                scheduled_by,
                kind,
                created_at: now,
            },
        );
        token
    }

    /// Removes and returns the entry for `token`. The token is gone after this
    /// call whatever the outcome.
    pub fn redeem(&mut self, token: EmbedToken) -> Result<ScheduledEmbed, TokenError> {
        self.redeem_at(token, Instant::now())
    }

    fn redeem_at(&mut self, token: EmbedToken, now: Instant) -> Result<ScheduledEmbed, TokenError> {
        let entry = self.entries.remove(&token).ok_or(TokenError::Unknown)?;
        if now.saturating_duration_since(entry.created_at) >= self.ttl {
            return Err(TokenError::Expired);
        }
        Ok(entry)
    }

    /// Drops tokens scheduled by, or binding, `client`.
    pub fn purge_client(&mut self, client: ClientId) {
        self.entries.retain(|_, entry| {
            entry.scheduled_by != client
                && !matches!(entry.kind, ScheduledEmbedKind::ExistingClient { client: c, .. } if c == client)
        });
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `client` already reserved `root_local_id` through a pending
    /// token.
    pub fn reserves(&self, client: ClientId, root_local_id: u32) -> bool {
        self.entries.values().any(|entry| {
            matches!(
                entry.kind,
                ScheduledEmbedKind::ExistingClient { client: c, root_local_id: r }
                    if c == client && r == root_local_id
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing(client: u32) -> ScheduledEmbedKind {
        ScheduledEmbedKind::ExistingClient {
            client: ClientId(client),
            root_local_id: 11,
        }
    }

    #[test]
    fn tokens_are_single_use() {
        let mut table = ScheduledEmbeds::new(Duration::from_secs(60));
        let token = table.schedule(ClientId(1), existing(1));
        assert!(!token.is_nil());
        assert!(table.redeem(token).is_ok());
        assert_eq!(table.redeem(token).unwrap_err(), TokenError::Unknown);
    }

    #[test]
    fn expired_tokens_are_rejected_and_consumed() {
        let mut table = ScheduledEmbeds::new(Duration::from_secs(5));
        let start = Instant::now();
        let token = table.schedule_at(ClientId(1), existing(1), start);
        let later = start + Duration::from_secs(5);
        assert_eq!(
            table.redeem_at(token, later).unwrap_err(),
            TokenError::Expired
        );
        assert!(table.is_empty());
    }

    #[test]
    fn purge_drops_tokens_for_departed_clients() {
        let mut table = ScheduledEmbeds::new(Duration::from_secs(60));
        table.schedule(ClientId(1), existing(1));
        table.schedule(ClientId(2), existing(3));
        table.schedule(ClientId(4), existing(4));
        assert!(table.reserves(ClientId(3), 11));
        table.purge_client(ClientId(3));
        table.purge_client(ClientId(1));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn interception_comes_from_flags() {
        let e = Embedding::new(
            ClientId(1),
            ClientId(2),
            EmbeddedTreeOwnership::Owned,
            EmbedFlags::INTERCEPT_EVENTS | EmbedFlags::REPLACE_EXISTING,
        );
        assert!(e.intercepts_events());
        assert!(e.owns_embedded_tree());
        let e = Embedding::new(
            ClientId(1),
            ClientId(2),
            EmbeddedTreeOwnership::External,
            EmbedFlags::empty(),
        );
        assert!(!e.intercepts_events());
    }
}

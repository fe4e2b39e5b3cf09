//! Handlers that see every event, not only commands.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use parley_core::{ChatIo, InferredEvent, Platform, Role};

use crate::usernames::UsernameCache;

/// Context handed to an [`EventHandler`].
#[derive(Clone)]
pub struct EventContext {
    /// Facade over the event.
    pub io: ChatIo,
    /// Role of the sender for message-like events, `Everyone` otherwise.
    pub role: Role,
    pub(crate) usernames: Arc<UsernameCache>,
}

impl EventContext {
    pub fn event(&self) -> &InferredEvent {
        self.io.event()
    }

    /// Returns the display name of `user_id`, cached per platform.
    pub async fn username(&self, user_id: &str) -> String {
        self.usernames.get(self.io.adapter(), user_id).await
    }
}

/// Runs on every event before command routing.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The only platform the handler runs on, if restricted.
    fn platform(&self) -> Option<Platform> {
        None
    }

    /// Role the sender must hold.
    fn role(&self) -> Role {
        Role::Everyone
    }

    async fn handle(&self, ctx: EventContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(EventContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: EventContext) -> anyhow::Result<()> {
        self(ctx).await
    }
}

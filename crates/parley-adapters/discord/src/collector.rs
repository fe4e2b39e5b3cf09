//! Native message and reaction collectors.
//!
//! Discord threads replies natively: every reply carries a reference to the
//! message it answers. Listening on a sent message therefore needs no shared
//! correlation map. Each listening handle gets its own [`Collector`] that
//! watches the adapter's broadcast of inbound traffic and keeps what
//! references the sent message.
//!
//! Collectors started by [`DiscordListenHooks`] carry no deadline of their
//! own. The handle's listen timer is the only one; it restarts on every
//! re-listen and stops the collector through the unlisten hook.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use parley_core::{
    AdapterError, AdapterResult, ChatIo, DispatchedHandle, InferredEvent, ListenHooks,
    PlatformAdapter, ReactionNotification, ReplyNotification, WeakDispatchedHandle,
};

use crate::adapter::DiscordAdapter;
use crate::model::{Message, ReactionAdd};

/// A `MESSAGE_CREATE` as the gateway sent it, with its normalized form.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw message.
    pub raw: Message,
    /// Normalized event.
    pub event: InferredEvent,
}

/// A `MESSAGE_REACTION_ADD` as the gateway sent it, with its normalized form.
#[derive(Debug, Clone)]
pub struct InboundReaction {
    /// Raw reaction.
    pub raw: ReactionAdd,
    /// Normalized event.
    pub event: InferredEvent,
}

/// A running collector. Dropping it stops collection.
pub struct Collector {
    token: CancellationToken,
    collected: Arc<AtomicUsize>,
}

impl Collector {
    /// Collects items of `rx` accepted by `filter` until stopped, the
    /// broadcast closes, or `timeout` elapses.
    pub fn spawn<T, P, F, Fut>(
        mut rx: broadcast::Receiver<T>,
        timeout: Option<Duration>,
        filter: P,
        on_collect: F,
    ) -> Self
    where
        T: Clone + Send + 'static,
        P: Fn(&T) -> bool + Send + 'static,
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let collected = Arc::new(AtomicUsize::new(0));
        let stop = token.clone();
        let count = collected.clone();

        tokio::spawn(async move {
            let deadline = async {
                match timeout {
                    Some(duration) => tokio::time::sleep(duration).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = &mut deadline => {
                        debug!("collector timed out");
                        break;
                    }
                    item = rx.recv() => match item {
                        Ok(item) if filter(&item) => {
                            count.fetch_add(1, Ordering::SeqCst);
                            on_collect(item).await;
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "collector lagged behind the gateway");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            stop.cancel();
        });

        Self { token, collected }
    }

    /// Stops collecting.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once the collector has ended for any reason.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns how many items passed the filter.
    pub fn collected(&self) -> usize {
        self.collected.load(Ordering::SeqCst)
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Listen hooks backed by one collector per handle and axis.
pub struct DiscordListenHooks {
    adapter: Weak<DiscordAdapter>,
    messages: broadcast::Sender<Arc<InboundMessage>>,
    reactions: broadcast::Sender<Arc<InboundReaction>>,
    replies: Mutex<HashMap<String, Collector>>,
    reaction_collectors: Mutex<HashMap<String, Collector>>,
}

impl DiscordListenHooks {
    pub(crate) fn new(
        adapter: Weak<DiscordAdapter>,
        messages: broadcast::Sender<Arc<InboundMessage>>,
        reactions: broadcast::Sender<Arc<InboundReaction>>,
    ) -> Self {
        Self {
            adapter,
            messages,
            reactions,
            replies: Mutex::new(HashMap::new()),
            reaction_collectors: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of running reply collectors.
    pub fn reply_collectors(&self) -> usize {
        self.replies.lock().values().filter(|c| !c.is_stopped()).count()
    }

    /// Returns the number of running reaction collectors.
    pub fn reaction_collectors(&self) -> usize {
        self.reaction_collectors
            .lock()
            .values()
            .filter(|c| !c.is_stopped())
            .count()
    }
}

fn sent_id(handle: &DispatchedHandle) -> AdapterResult<String> {
    handle
        .message_id()
        .ok_or_else(|| AdapterError::internal("listening on a message that was never sent"))
}

fn io_for(adapter: &Weak<DiscordAdapter>, event: &InferredEvent) -> Option<ChatIo> {
    let adapter: Arc<dyn PlatformAdapter> = adapter.upgrade()?;
    Some(ChatIo::new(event.clone(), adapter))
}

impl ListenHooks for DiscordListenHooks {
    fn on_listen_replies(
        &self,
        handle: &DispatchedHandle,
        timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        let sent = sent_id(handle)?;
        let adapter = self.adapter.clone();
        let target: WeakDispatchedHandle = handle.downgrade();
        let filter_id = sent.clone();

        let collector = Collector::spawn(
            self.messages.subscribe(),
            None,
            move |inbound: &Arc<InboundMessage>| inbound.raw.reply_target() == Some(filter_id.as_str()),
            move |inbound: Arc<InboundMessage>| {
                let adapter = adapter.clone();
                let target = target.clone();
                async move {
                    // A reply whose target could not be loaded is not a reply.
                    if inbound.event.replied_message().is_none() {
                        return;
                    }
                    let (Some(handle), Some(io)) = (target.upgrade(), io_for(&adapter, &inbound.event)) else {
                        return;
                    };
                    handle.emit_reply(ReplyNotification {
                        io,
                        event: inbound.event.clone(),
                    });
                }
            },
        );
        debug!(handle_id = %handle.id(), message_id = %sent, ?timeout, "reply collector started");
        let mut replies = self.replies.lock();
        replies.retain(|_, running| !running.is_stopped());
        replies.insert(handle.id().to_string(), collector);
        Ok(())
    }

    fn on_unlisten_replies(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        if let Some(collector) = self.replies.lock().remove(&handle.id().to_string()) {
            collector.stop();
        }
        Ok(())
    }

    fn on_listen_reactions(
        &self,
        handle: &DispatchedHandle,
        timeout: Option<Duration>,
    ) -> AdapterResult<()> {
        let sent = sent_id(handle)?;
        let adapter = self.adapter.clone();
        let target = handle.downgrade();
        let filter_id = sent.clone();

        let collector = Collector::spawn(
            self.reactions.subscribe(),
            None,
            move |inbound: &Arc<InboundReaction>| inbound.raw.message_id == filter_id,
            move |inbound: Arc<InboundReaction>| {
                let adapter = adapter.clone();
                let target = target.clone();
                async move {
                    let Some(event) = inbound.event.as_reaction() else {
                        return;
                    };
                    let (Some(handle), Some(io)) = (target.upgrade(), io_for(&adapter, &inbound.event)) else {
                        return;
                    };
                    handle.emit_reaction(ReactionNotification {
                        io,
                        event: event.clone(),
                    });
                }
            },
        );
        debug!(handle_id = %handle.id(), message_id = %sent, ?timeout, "reaction collector started");
        let mut reactions = self.reaction_collectors.lock();
        reactions.retain(|_, running| !running.is_stopped());
        reactions.insert(handle.id().to_string(), collector);
        Ok(())
    }

    fn on_unlisten_reactions(&self, handle: &DispatchedHandle) -> AdapterResult<()> {
        if let Some(collector) = self
            .reaction_collectors
            .lock()
            .remove(&handle.id().to_string())
        {
            collector.stop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (
        Arc<Mutex<Vec<u32>>>,
        impl Fn(u32) -> std::future::Ready<()> + Send + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |item| {
            sink.lock().push(item);
            std::future::ready(())
        })
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_collects_matching_items_until_stopped() {
        let (tx, _) = broadcast::channel(16);
        let (seen, sink) = recording();
        let collector = Collector::spawn(tx.subscribe(), None, |n: &u32| n % 2 == 0, sink);

        for n in 1..=4 {
            tx.send(n).unwrap();
        }
        settle().await;
        assert_eq!(*seen.lock(), vec![2, 4]);
        assert_eq!(collector.collected(), 2);

        collector.stop();
        settle().await;
        let _ = tx.send(6);
        settle().await;
        assert_eq!(*seen.lock(), vec![2, 4]);
        assert!(collector.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_collection() {
        let (tx, _) = broadcast::channel(16);
        let (seen, sink) = recording();
        let collector = Collector::spawn(
            tx.subscribe(),
            Some(Duration::from_secs(5)),
            |_: &u32| true,
            sink,
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert!(collector.is_stopped());
        let _ = tx.send(1);
        settle().await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let (tx, _) = broadcast::channel::<u32>(4);
        let (_, sink) = recording();
        let collector = Collector::spawn(tx.subscribe(), None, |_: &u32| true, sink);
        let token = collector.token.clone();
        drop(collector);
        assert!(token.is_cancelled());
    }
}

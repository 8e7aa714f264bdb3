use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    domain::{ContactId, IncomingMessage, PresenceEvent},
    presence::PresenceTracker,
    router::MessageRouter,
};

/// Everything the transport can hand to the core.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    Presence(PresenceEvent),
    Message(IncomingMessage),
}

struct Mailbox {
    id: u64,
    tx: mpsc::UnboundedSender<IncomingMessage>,
}

#[derive(Default)]
struct Mailboxes {
    next_id: AtomicU64,
    inner: Mutex<HashMap<ContactId, Mailbox>>,
}

impl Mailboxes {
    fn lock(&self) -> MutexGuard<'_, HashMap<ContactId, Mailbox>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single entry point for inbound events.
///
/// Presence updates are applied inline. Messages go to a per-sender mailbox
/// drained by one worker task per sender, so a sender's messages are routed in
/// arrival order while different senders proceed independently.
pub struct Engine {
    presence: Arc<PresenceTracker>,
    router: Arc<MessageRouter>,
    mailboxes: Arc<Mailboxes>,
    idle_timeout: Duration,
}

impl Engine {
    pub fn new(
        presence: Arc<PresenceTracker>,
        router: Arc<MessageRouter>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            presence,
            router,
            mailboxes: Arc::new(Mailboxes::default()),
            idle_timeout,
        }
    }

    /// Must be called from within a tokio runtime.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Presence(p) => self.presence.observe(&p).await,
            InboundEvent::Message(m) => self.enqueue(m),
        }
    }

    /// Senders with a live worker. Logged at shutdown.
    pub fn active_senders(&self) -> usize {
        self.mailboxes.lock().len()
    }

    /// Stop accepting work for current workers. Each one routes what is
    /// already queued for its sender and then exits.
    pub fn close(&self) {
        let closed = std::mem::take(&mut *self.mailboxes.lock());
        debug!(workers = closed.len(), "closing sender mailboxes");
    }

    fn enqueue(&self, msg: IncomingMessage) {
        let sender = msg.sender.clone();
        let mut map = self.mailboxes.lock();

        let msg = match map.get(&sender) {
            Some(mb) => match mb.tx.send(msg) {
                Ok(()) => return,
                // Worker died (panicked while routing); start a fresh one.
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.mailboxes.next_id.fetch_add(1, Ordering::Relaxed);
        // Cannot fail: `rx` is alive.
        let _ = tx.send(msg);
        map.insert(sender.clone(), Mailbox { id, tx });
        let active = map.len();
        drop(map);

        debug!(%sender, active, "starting sender worker");
        tokio::spawn(drain_mailbox(
            sender,
            id,
            rx,
            self.router.clone(),
            self.mailboxes.clone(),
            self.idle_timeout,
        ));
    }
}

async fn drain_mailbox(
    sender: ContactId,
    id: u64,
    mut rx: mpsc::UnboundedReceiver<IncomingMessage>,
    router: Arc<MessageRouter>,
    mailboxes: Arc<Mailboxes>,
    idle_timeout: Duration,
) {
    loop {
        let next = match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(msg)) => Some(msg),
            Ok(None) => None,
            Err(_) => {
                // Enqueue holds the same lock, so nothing can slip in between
                // the emptiness check and the removal.
                let mut map = mailboxes.lock();
                match rx.try_recv() {
                    Ok(msg) => Some(msg),
                    Err(_) => {
                        if map.get(&sender).map(|mb| mb.id) == Some(id) {
                            map.remove(&sender);
                        }
                        None
                    }
                }
            }
        };

        let Some(msg) = next else {
            debug!(%sender, "sender worker idle, exiting");
            return;
        };
        router.route(&msg).await;
    }
}

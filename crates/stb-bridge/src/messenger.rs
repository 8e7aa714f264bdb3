use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info};

use stb_core::{
    domain::{ChatId, ContactId, OutgoingReply},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

use crate::wire::BridgeOutbound;

type AckResult = std::result::Result<(), String>;

/// MessagingPort over the stdio bridge.
///
/// Each send is written as a `send` frame and resolves when the transport
/// answers with the matching `ack`.
pub struct BridgeMessenger {
    out: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<u64, oneshot::Sender<AckResult>>>,
    next_id: AtomicU64,
    own_id: RwLock<Option<ContactId>>,
    ack_timeout: Duration,
}

impl BridgeMessenger {
    /// Returns the messenger and the stream of encoded frames to write out.
    pub fn new(
        ack_timeout: Duration,
        own_id: Option<ContactId>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (out, rx) = mpsc::unbounded_channel();
        let messenger = Self {
            out,
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            own_id: RwLock::new(own_id),
            ack_timeout,
        };
        (messenger, rx)
    }

    pub async fn set_own_id(&self, id: ContactId) {
        info!(own_id = %id, "transport ready");
        *self.own_id.write().await = Some(id);
    }

    /// Resolve the send waiting on `id`. Unknown ids (late acks) are ignored.
    pub fn complete(&self, id: u64, result: AckResult) {
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => debug!(id, "ack for unknown or expired send"),
        }
    }

    /// Fail every in-flight send, e.g. when the transport went away.
    pub fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        if !drained.is_empty() {
            info!(count = drained.len(), reason, "failing in-flight sends");
        }
        for (_, tx) in drained {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn forget(&self, id: u64) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

#[async_trait]
impl MessagingPort for BridgeMessenger {
    async fn own_id(&self) -> Option<ContactId> {
        self.own_id.read().await.clone()
    }

    async fn send(&self, chat: &ChatId, reply: &OutgoingReply) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&BridgeOutbound::Send {
            id,
            chat: chat.as_str(),
            content: reply.into(),
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);

        if self.out.send(line).is_err() {
            self.forget(id);
            return Err(Error::Send("bridge output closed".to_string()));
        }

        match tokio::time::timeout(self.ack_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(reason))) => Err(Error::Send(reason)),
            Ok(Err(_)) => Err(Error::Send("bridge closed before ack".to_string())),
            Err(_) => {
                self.forget(id);
                Err(Error::Send(format!(
                    "no ack within {}ms",
                    self.ack_timeout.as_millis()
                )))
            }
        }
    }
}

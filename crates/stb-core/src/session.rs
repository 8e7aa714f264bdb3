use std::collections::HashMap;

use tokio::sync::Mutex;

use crate::domain::ContactId;

/// Per-sender conversation state.
///
/// `Idle` is an explicit value: a sender missing from the store *is* `Idle`,
/// and storing `Idle` removes the entry, so both spellings agree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingMenuChoice,
    AwaitingImage,
}

/// Sender -> state map. Last writer wins.
#[derive(Debug, Default)]
pub struct SessionStore {
    states: Mutex<HashMap<ContactId, SessionState>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, sender: &ContactId) -> SessionState {
        self.states
            .lock()
            .await
            .get(sender)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set(&self, sender: &ContactId, state: SessionState) {
        let mut map = self.states.lock().await;
        if state == SessionState::Idle {
            map.remove(sender);
        } else {
            map.insert(sender.clone(), state);
        }
    }

    pub async fn clear(&self, sender: &ContactId) {
        self.states.lock().await.remove(sender);
    }

    /// Number of senders currently past `Idle`.
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.states.lock().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

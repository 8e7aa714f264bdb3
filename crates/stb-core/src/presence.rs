use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::domain::{ContactId, PresenceEvent};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OwnerStatus {
    Online,
    Offline,
}

/// Snapshot of the owner's availability.
///
/// `last_online_at` is never cleared: it always holds the most recent instant
/// the owner was seen online, or `None` if that never happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerPresence {
    pub status: OwnerStatus,
    pub last_online_at: Option<DateTime<Utc>>,
}

impl Default for OwnerPresence {
    fn default() -> Self {
        Self {
            status: OwnerStatus::Offline,
            last_online_at: None,
        }
    }
}

/// How long the owner has been away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfflineDuration {
    Known(Duration),
    /// Owner never observed online during this process lifetime.
    Unbounded,
}

impl OfflineDuration {
    /// Strictly longer than `threshold`. `Unbounded` exceeds everything.
    pub fn exceeds(&self, threshold: Duration) -> bool {
        match self {
            Self::Known(d) => *d > threshold,
            Self::Unbounded => true,
        }
    }
}

/// Tracks presence of the single configured owner contact.
pub struct PresenceTracker {
    owner: ContactId,
    state: Mutex<OwnerPresence>,
}

impl PresenceTracker {
    pub fn new(owner: ContactId) -> Self {
        Self {
            owner,
            state: Mutex::new(OwnerPresence::default()),
        }
    }

    pub async fn observe(&self, event: &PresenceEvent) {
        self.observe_at(event, Utc::now()).await;
    }

    pub async fn observe_at(&self, event: &PresenceEvent, now: DateTime<Utc>) {
        if event.source != self.owner {
            debug!(source = %event.source, "ignoring presence of non-owner contact");
            return;
        }

        let mut st = self.state.lock().await;
        if event.unavailable {
            st.status = OwnerStatus::Offline;
        } else {
            st.status = OwnerStatus::Online;
            st.last_online_at = Some(now);
        }
        info!(status = ?st.status, "owner presence updated");
    }

    pub async fn current_status(&self) -> OwnerPresence {
        *self.state.lock().await
    }

    pub async fn offline_duration(&self, now: DateTime<Utc>) -> OfflineDuration {
        let st = self.state.lock().await;
        offline_duration_of(&st, now)
    }
}

/// `now - last_online_at`, clamped at zero if the clock went backwards.
pub fn offline_duration_of(presence: &OwnerPresence, now: DateTime<Utc>) -> OfflineDuration {
    match presence.last_online_at {
        Some(t) => OfflineDuration::Known((now - t).to_std().unwrap_or(Duration::ZERO)),
        None => OfflineDuration::Unbounded,
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
    config::GreetingPolicy,
    domain::{ChatId, IncomingMessage, OutgoingReply},
    messaging::port::MessagingPort,
    presence::{offline_duration_of, PresenceTracker},
    replies,
    session::{SessionState, SessionStore},
    sticker::StickerWorkflow,
};

/// Decides, per inbound message, what to answer and how the sender's session
/// advances.
///
/// Callers must not route two messages of the same sender concurrently; the
/// engine guarantees this with per-sender mailboxes.
pub struct MessageRouter {
    presence: Arc<PresenceTracker>,
    sessions: Arc<SessionStore>,
    messenger: Arc<dyn MessagingPort>,
    sticker: StickerWorkflow,
    greeting_policy: GreetingPolicy,
}

impl MessageRouter {
    pub fn new(
        presence: Arc<PresenceTracker>,
        sessions: Arc<SessionStore>,
        messenger: Arc<dyn MessagingPort>,
        sticker: StickerWorkflow,
        greeting_policy: GreetingPolicy,
    ) -> Self {
        Self {
            presence,
            sessions,
            messenger,
            sticker,
            greeting_policy,
        }
    }

    pub async fn route(&self, msg: &IncomingMessage) -> Vec<OutgoingReply> {
        self.route_at(msg, Utc::now()).await
    }

    /// Route one message. Returns every reply handed to the transport, in order.
    pub async fn route_at(&self, msg: &IncomingMessage, now: DateTime<Utc>) -> Vec<OutgoingReply> {
        if !self.is_addressed_to_bot(msg).await {
            debug!(chat = %msg.chat, sender = %msg.sender, "group message without mention, ignoring");
            return Vec::new();
        }

        let sender = &msg.sender;
        let state = self.sessions.get(sender).await;
        let mut sent = Vec::new();

        if self.greeting_policy == GreetingPolicy::Every || state == SessionState::Idle {
            let presence = self.presence.current_status().await;
            let text = replies::greeting(presence.status, offline_duration_of(&presence, now));
            self.send(&msg.chat, OutgoingReply::Text(text), &mut sent)
                .await;
        }

        match state {
            SessionState::Idle => {
                self.sessions
                    .set(sender, SessionState::AwaitingMenuChoice)
                    .await;
            }
            SessionState::AwaitingMenuChoice => {
                if msg.text_body.as_deref() == Some(replies::MENU_STICKER) {
                    self.send(&msg.chat, OutgoingReply::text(replies::SEND_PHOTO), &mut sent)
                        .await;
                    self.sessions.set(sender, SessionState::AwaitingImage).await;
                }
            }
            SessionState::AwaitingImage => match &msg.image_payload {
                Some(image) => {
                    let out = self.sticker.run(sender, &msg.chat, image).await;
                    sent.extend(out);
                }
                None => debug!(%sender, "awaiting image but message has none"),
            },
        }

        debug!(%sender, from = ?state, replies = sent.len(), "routed message");
        sent
    }

    /// Direct chats always qualify; group chats only when the bot is mentioned.
    async fn is_addressed_to_bot(&self, msg: &IncomingMessage) -> bool {
        if !msg.is_group_chat {
            return true;
        }
        match self.messenger.own_id().await {
            Some(me) => msg.mentions(&me),
            None => false,
        }
    }

    async fn send(&self, chat: &ChatId, reply: OutgoingReply, sent: &mut Vec<OutgoingReply>) {
        if let Err(e) = self.messenger.send(chat, &reply).await {
            warn!(%chat, error = %e, "failed to send reply");
        }
        sent.push(reply);
    }
}

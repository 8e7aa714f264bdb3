use async_trait::async_trait;

use crate::{
    domain::{ChatId, ContactId, OutgoingReply},
    Result,
};

/// Transport port.
///
/// The transport adapter owns connection lifecycle and pairing; the core only
/// needs to know who it is and how to send.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Identity of the bot account, `None` until the transport announced it.
    async fn own_id(&self) -> Option<ContactId>;

    async fn send(&self, chat: &ChatId, reply: &OutgoingReply) -> Result<()>;
}

//! Messaging client abstraction.
//!
//! The gateway never touches WhatsApp Web directly; everything goes through
//! [`MessagingClient`]. The production implementation ([`webdriver`]) steers
//! the real web app in a browser, tests substitute a recording fake. Login
//! lifecycle flows one way: the client emits [`ClientEvent`]s over an mpsc
//! channel, the session tracker folds them into state, and handlers only
//! ever read that state.

pub mod webdriver;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Lifecycle notifications emitted by a messaging client.
///
/// These mirror the callbacks WhatsApp Web surfaces during login: a pairing
/// QR (re-issued every ~30 seconds until scanned), credential acceptance,
/// full readiness, and the two ways a session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A fresh QR payload is available for pairing.
    Qr(String),
    /// Stored or scanned credentials were accepted; sync may still be running.
    Authenticated,
    /// The session is fully usable.
    Ready,
    /// Login was rejected, e.g. a corrupt or revoked stored session.
    AuthFailure(String),
    /// The session dropped; the event pump tears the client down and back up.
    Disconnected(String),
}

/// A messaging backend the gateway can drive.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Bring the underlying session up. Called once at startup and again
    /// after [`destroy`](Self::destroy) when a disconnect is handled.
    async fn initialize(&self) -> Result<()>;

    /// Tear the underlying session down, releasing the browser.
    async fn destroy(&self) -> Result<()>;

    /// Deliver `body` to `chat_id` (JID form, see [`chat_jid`]).
    async fn send_message(&self, chat_id: &str, body: &str) -> Result<()>;

    /// End the WhatsApp session on the phone side as well.
    async fn logout(&self) -> Result<()>;

    /// Emit lifecycle events until `tx` closes or the client shuts down.
    async fn listen(&self, tx: mpsc::Sender<ClientEvent>) -> Result<()>;
}

/// Append the individual-chat JID suffix to a phone number.
///
/// WhatsApp addresses individual chats as `<digits>@c.us`. The number is
/// passed through otherwise untouched; callers own any validation.
pub fn chat_jid(number: &str) -> String {
    format!("{}@c.us", number.trim())
}

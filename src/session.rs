//! Process-wide login session state.
//!
//! WhatsApp Web reports its lifecycle as [`ClientEvent`]s; this module folds
//! them into a single [`LoginState`] the HTTP handlers read.
//!
//! ## Design
//!
//! The tracker is deliberately dumb: one value behind one lock, mutated only
//! by named transitions. The side effect of an event (tearing the browser
//! session down after a disconnect) lives in [`drive`], the pump that feeds
//! the tracker from the client's event channel. Handlers never see events,
//! only `qr()` and `is_authenticated()`.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::client::{ClientEvent, MessagingClient};

/// Login lifecycle of the single WhatsApp session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginState {
    /// Client is starting up; no QR issued yet.
    Starting,
    /// A QR payload is waiting to be scanned.
    QrPending(String),
    /// Session is linked and usable.
    Authenticated,
    /// Session ended: logout, auth failure, or connection drop.
    Disconnected,
}

impl LoginState {
    /// Short name for logs. Never includes the QR payload.
    pub fn label(&self) -> &'static str {
        match self {
            LoginState::Starting => "starting",
            LoginState::QrPending(_) => "qr-pending",
            LoginState::Authenticated => "authenticated",
            LoginState::Disconnected => "disconnected",
        }
    }
}

/// Shared tracker for the process-wide [`LoginState`].
///
/// The QR payload exists only inside `QrPending`; every transition into
/// `Authenticated` or `Disconnected` discards it.
pub struct SessionTracker {
    state: RwLock<LoginState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LoginState::Starting),
        }
    }

    /// Apply one client event to the state machine.
    pub fn apply(&self, event: &ClientEvent) {
        let next = match event {
            ClientEvent::Qr(payload) => LoginState::QrPending(payload.clone()),
            ClientEvent::Authenticated | ClientEvent::Ready => LoginState::Authenticated,
            ClientEvent::AuthFailure(_) | ClientEvent::Disconnected(_) => LoginState::Disconnected,
        };
        let mut state = self.state.write();
        if state.label() != next.label() {
            info!("login state: {} -> {}", state.label(), next.label());
        }
        *state = next;
    }

    /// QR payload, present only while a scan is pending.
    pub fn qr(&self) -> Option<String> {
        match &*self.state.read() {
            LoginState::QrPending(payload) => Some(payload.clone()),
            _ => None,
        }
    }

    /// Whether the session is currently linked.
    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.read(), LoginState::Authenticated)
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> LoginState {
        self.state.read().clone()
    }

    /// Force the disconnected state, discarding any pending QR.
    ///
    /// Used by the logout handler once the client confirms the logout; the
    /// client's own `disconnected` event may lag behind or never fire after
    /// an explicit logout.
    pub fn force_logged_out(&self) {
        let mut state = self.state.write();
        if state.label() != LoginState::Disconnected.label() {
            info!("login state: {} -> disconnected (logout)", state.label());
        }
        *state = LoginState::Disconnected;
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume client lifecycle events until the channel closes.
///
/// Applies each event to the tracker, then performs the single event side
/// effect: a dropped session gets exactly one teardown and restart so the
/// client can issue a fresh QR. No retry loop; a failed re-initialize stays
/// down until the process restarts.
pub async fn drive(
    tracker: Arc<SessionTracker>,
    client: Arc<dyn MessagingClient>,
    mut events: mpsc::Receiver<ClientEvent>,
    print_qr: bool,
) {
    while let Some(event) = events.recv().await {
        match &event {
            ClientEvent::Qr(payload) => {
                info!("qr received; scan it from WhatsApp > Linked Devices");
                if print_qr {
                    match crate::qr::to_terminal_string(payload) {
                        Ok(art) => println!("{art}"),
                        Err(err) => warn!("terminal QR render failed: {err}"),
                    }
                }
            }
            ClientEvent::Authenticated => info!("{} authenticated", client.name()),
            ClientEvent::Ready => info!("{} ready", client.name()),
            ClientEvent::AuthFailure(reason) => warn!("authentication failed: {reason}"),
            ClientEvent::Disconnected(reason) => warn!("{} disconnected: {reason}", client.name()),
        }
        tracker.apply(&event);
        if matches!(event, ClientEvent::Disconnected(_)) {
            if let Err(err) = client.destroy().await {
                error!("client teardown after disconnect failed: {err}");
            }
            if let Err(err) = client.initialize().await {
                error!("client re-initialization failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn starts_without_qr_or_auth() {
        let tracker = SessionTracker::new();
        assert_eq!(tracker.state(), LoginState::Starting);
        assert!(tracker.qr().is_none());
        assert!(!tracker.is_authenticated());
    }

    #[test]
    fn qr_event_stores_the_payload_from_any_state() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Ready);
        tracker.apply(&ClientEvent::Qr("abc".to_string()));
        assert_eq!(tracker.qr().as_deref(), Some("abc"));
        assert!(!tracker.is_authenticated());
    }

    #[test]
    fn fresh_qr_replaces_the_pending_one() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Qr("first".to_string()));
        tracker.apply(&ClientEvent::Qr("second".to_string()));
        assert_eq!(tracker.qr().as_deref(), Some("second"));
    }

    #[test]
    fn ready_clears_a_pending_qr() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Qr("abc".to_string()));
        tracker.apply(&ClientEvent::Ready);
        assert!(tracker.qr().is_none());
        assert!(tracker.is_authenticated());
    }

    #[test]
    fn authenticated_event_counts_as_logged_in() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Authenticated);
        assert!(tracker.is_authenticated());
    }

    #[test]
    fn auth_failure_disconnects_and_discards_the_qr() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Qr("abc".to_string()));
        tracker.apply(&ClientEvent::AuthFailure("bad stored session".to_string()));
        assert_eq!(tracker.state(), LoginState::Disconnected);
        assert!(tracker.qr().is_none());
        assert!(!tracker.is_authenticated());
    }

    #[test]
    fn disconnect_reports_not_logged_in() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Ready);
        tracker.apply(&ClientEvent::Disconnected("navigation".to_string()));
        assert_eq!(tracker.state(), LoginState::Disconnected);
        assert!(!tracker.is_authenticated());
    }

    #[test]
    fn forced_logout_discards_the_qr() {
        let tracker = SessionTracker::new();
        tracker.apply(&ClientEvent::Qr("abc".to_string()));
        tracker.force_logged_out();
        assert_eq!(tracker.state(), LoginState::Disconnected);
        assert!(tracker.qr().is_none());
    }

    #[derive(Default)]
    struct CountingClient {
        initialized: AtomicUsize,
        destroyed: AtomicUsize,
    }

    #[async_trait]
    impl MessagingClient for CountingClient {
        fn name(&self) -> &str {
            "counting"
        }
        async fn initialize(&self) -> anyhow::Result<()> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn destroy(&self) -> anyhow::Result<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn send_message(&self, _chat_id: &str, _body: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn logout(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn listen(&self, _tx: mpsc::Sender<ClientEvent>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn disconnect_event_tears_down_and_restarts_the_client() {
        let client = Arc::new(CountingClient::default());
        let tracker = Arc::new(SessionTracker::new());
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(drive(tracker.clone(), client.clone(), rx, false));

        tx.send(ClientEvent::Qr("abc".to_string())).await.unwrap();
        tx.send(ClientEvent::Disconnected("navigation".to_string()))
            .await
            .unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(client.destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(client.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.state(), LoginState::Disconnected);
    }

    #[tokio::test]
    async fn non_disconnect_events_leave_the_client_alone() {
        let client = Arc::new(CountingClient::default());
        let tracker = Arc::new(SessionTracker::new());
        let (tx, rx) = mpsc::channel(8);
        let pump = tokio::spawn(drive(tracker.clone(), client.clone(), rx, false));

        tx.send(ClientEvent::Qr("abc".to_string())).await.unwrap();
        tx.send(ClientEvent::Authenticated).await.unwrap();
        tx.send(ClientEvent::Ready).await.unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(client.destroyed.load(Ordering::SeqCst), 0);
        assert_eq!(client.initialized.load(Ordering::SeqCst), 0);
        assert!(tracker.is_authenticated());
    }
}

//! Per-tenant connection supervisor.
//!
//! Owns the lifecycle state machine for one tenant's provider connection:
//! `Initializing → AwaitingPairing → Connected → Disconnected → (retry |
//! LoggedOut)`. The supervisor is the sole producer of that tenant's
//! normalized event stream; every state transition is published before any
//! other side effect of the transition.

use std::{
    sync::{
        Arc, Mutex as StdMutex, RwLock as StdRwLock,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    serde::{Deserialize, Serialize},
    tokio::{sync::mpsc, task::JoinHandle, time::timeout},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use {
    courier_common::{SessionStatus, backoff::backoff_delay_jittered, now_ms},
    courier_events::{EventPayload, EventPipeline, NormalizedEvent},
};

use crate::{
    client::{ClientEvent, ProtocolClient},
    credentials::CredentialStore,
    error::SendError,
};

/// Reconnect and send-path tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// First reconnect delay; doubles per consecutive failure.
    pub base_delay: Duration,
    /// Reconnect delay ceiling.
    pub max_delay: Duration,
    /// Per-call budget for outbound sends.
    pub send_timeout: Duration,
    /// Budget for establishing a connection.
    pub connect_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot of a tenant session's identity and runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSession {
    pub tenant: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub status: SessionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_artifact: Option<String>,
    pub reconnect_attempts: u32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Why the connect-and-consume cycle ended.
enum Outcome {
    Recoverable(String),
    Terminal,
    Cancelled,
}

/// Supervises one tenant's connection. Created only through
/// [`crate::registry::SessionRegistry::acquire`], which enforces the
/// at-most-one-per-tenant invariant.
pub struct ConnectionSupervisor {
    tenant: String,
    config: SupervisorConfig,
    client: Arc<dyn ProtocolClient>,
    credentials: Arc<dyn CredentialStore>,
    pipeline: Arc<EventPipeline>,
    session: StdRwLock<TenantSession>,
    sequence: AtomicU64,
    attempts: AtomicU32,
    cancel: CancellationToken,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    pub(crate) fn spawn(
        tenant: &str,
        owner: &str,
        display_name: Option<String>,
        config: SupervisorConfig,
        client: Arc<dyn ProtocolClient>,
        credentials: Arc<dyn CredentialStore>,
        pipeline: Arc<EventPipeline>,
    ) -> Arc<Self> {
        let now = now_ms();
        let supervisor = Arc::new(Self {
            tenant: tenant.to_string(),
            config,
            client,
            credentials,
            pipeline,
            session: StdRwLock::new(TenantSession {
                tenant: tenant.to_string(),
                owner: owner.to_string(),
                display_name,
                status: SessionStatus::Initializing,
                pairing_artifact: None,
                reconnect_attempts: 0,
                created_at_ms: now,
                updated_at_ms: now,
            }),
            sequence: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            cancel: CancellationToken::new(),
            task: StdMutex::new(None),
        });

        let runner = Arc::clone(&supervisor);
        let handle = tokio::spawn(async move { runner.run().await });
        *supervisor
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);

        supervisor
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .status
    }

    /// Current pairing artifact, when waiting for pairing.
    pub fn pairing_artifact(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .pairing_artifact
            .clone()
    }

    pub fn snapshot(&self) -> TenantSession {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Send a text message on this tenant's connection.
    ///
    /// Accepted only in `Connected`. Transport errors and timeouts are
    /// surfaced as retryable and do not force a state transition; the
    /// provider signals real connection loss through its event stream.
    pub async fn send(&self, recipient: &str, body: &str) -> Result<String, SendError> {
        if recipient.trim().is_empty() {
            return Err(SendError::InvalidRecipient);
        }
        if body.trim().is_empty() {
            return Err(SendError::EmptyBody);
        }
        let status = self.status();
        if status != SessionStatus::Connected {
            return Err(SendError::NotConnected { status });
        }

        let send = self.client.send_text(&self.tenant, recipient, body);
        match timeout(self.config.send_timeout, send).await {
            Err(_) => Err(SendError::Timeout),
            Ok(Err(e)) => Err(SendError::Transport {
                reason: e.to_string(),
            }),
            Ok(Ok(message_id)) => {
                debug!(tenant = %self.tenant, message_id, "send accepted");
                Ok(message_id)
            },
        }
    }

    /// Cancel the state machine, close the connection, and wait for the
    /// supervisor task to exit. Safe to call while a backoff timer is
    /// pending; the connection is never resurrected afterwards.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Err(e) = self.client.close(&self.tenant).await {
            debug!(tenant = %self.tenant, error = %e, "close failed during shutdown");
        }
        let handle = self
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(tenant = %self.tenant, error = %e, "supervisor task ended abnormally");
            }
        }
        info!(tenant = %self.tenant, "supervisor shut down");
    }

    // ── State machine ───────────────────────────────────────────────────

    async fn run(self: Arc<Self>) {
        // Announce the initial state; re-entries into Initializing go
        // through transition() below.
        self.publish(EventPayload::ConnectionState {
            status: SessionStatus::Initializing,
            reason: None,
        })
        .await;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.transition(SessionStatus::Initializing, None).await;

            match self.connect_and_consume().await {
                Outcome::Terminal | Outcome::Cancelled => break,
                Outcome::Recoverable(reason) => {
                    self.transition(SessionStatus::Disconnected, Some(reason))
                        .await;
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
                    let delay = backoff_delay_jittered(
                        self.config.base_delay,
                        self.config.max_delay,
                        attempt,
                    );
                    info!(
                        tenant = %self.tenant,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {},
                    }
                },
            }
        }
        debug!(tenant = %self.tenant, "supervisor loop exited");
    }

    async fn connect_and_consume(&self) -> Outcome {
        let credentials = match self.credentials.load(&self.tenant).await {
            Ok(c) => c,
            Err(e) => return Outcome::Recoverable(format!("credential load failed: {e}")),
        };

        let connect = self.client.connect(&self.tenant, credentials);
        let rx = tokio::select! {
            () = self.cancel.cancelled() => return Outcome::Cancelled,
            res = timeout(self.config.connect_timeout, connect) => match res {
                Err(_) => return Outcome::Recoverable("connect timed out".into()),
                Ok(Err(e)) => return Outcome::Recoverable(format!("connect failed: {e}")),
                Ok(Ok(rx)) => rx,
            },
        };

        self.consume(rx).await
    }

    async fn consume(&self, mut rx: mpsc::Receiver<ClientEvent>) -> Outcome {
        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return Outcome::Cancelled,
                event = rx.recv() => event,
            };
            let Some(event) = event else {
                return Outcome::Recoverable("event stream closed".into());
            };

            match event {
                ClientEvent::PairingCode { code } => {
                    self.transition(SessionStatus::AwaitingPairing, None).await;
                    {
                        let mut session =
                            self.session.write().unwrap_or_else(|e| e.into_inner());
                        session.pairing_artifact = Some(code.clone());
                        session.updated_at_ms = now_ms();
                    }
                    self.publish(EventPayload::PairingUpdated { artifact: code })
                        .await;
                },
                ClientEvent::Connected { device } => {
                    self.transition(SessionStatus::Connected, None).await;
                    self.attempts.store(0, Ordering::SeqCst);
                    {
                        let mut session =
                            self.session.write().unwrap_or_else(|e| e.into_inner());
                        session.pairing_artifact = None;
                        session.reconnect_attempts = 0;
                    }
                    info!(tenant = %self.tenant, ?device, "provider connection live");
                },
                ClientEvent::CredentialsRotated(credentials) => {
                    if let Err(e) = self.credentials.save(&self.tenant, &credentials).await {
                        warn!(tenant = %self.tenant, error = %e, "failed to persist rotated credentials");
                    }
                },
                ClientEvent::Disconnected {
                    reason,
                    terminal: false,
                } => {
                    return Outcome::Recoverable(reason);
                },
                ClientEvent::Disconnected {
                    reason,
                    terminal: true,
                } => {
                    self.finalize_logout(Some(reason)).await;
                    return Outcome::Terminal;
                },
                ClientEvent::LoggedOut => {
                    self.finalize_logout(Some("logged out".into())).await;
                    return Outcome::Terminal;
                },
                ClientEvent::Message(message) => {
                    self.publish(EventPayload::MessageReceived(message)).await;
                },
                ClientEvent::Ack(ack) => {
                    self.publish(EventPayload::MessageAck(ack)).await;
                },
                ClientEvent::GroupUpdate(update) => {
                    self.publish(EventPayload::GroupUpdated(update)).await;
                },
                ClientEvent::Presence(presence) => {
                    self.publish(EventPayload::PresenceUpdated(presence)).await;
                },
            }
        }
    }

    /// Terminal auth failure: park in `LoggedOut` and drop the stored
    /// credentials so a later re-provision starts a fresh pairing.
    async fn finalize_logout(&self, reason: Option<String>) {
        self.transition(SessionStatus::LoggedOut, reason).await;
        if let Err(e) = self.credentials.invalidate(&self.tenant).await {
            warn!(tenant = %self.tenant, error = %e, "failed to invalidate credentials");
        }
    }

    /// Apply a state change and, when it actually changes the state,
    /// publish `ConnectionState` before anything else observes the new
    /// state's side effects.
    async fn transition(&self, status: SessionStatus, reason: Option<String>) {
        let changed = {
            let mut session = self.session.write().unwrap_or_else(|e| e.into_inner());
            if session.status == status {
                false
            } else {
                session.status = status;
                session.updated_at_ms = now_ms();
                session.reconnect_attempts = self.attempts.load(Ordering::SeqCst);
                true
            }
        };
        if changed {
            info!(tenant = %self.tenant, %status, "session state changed");
            self.publish(EventPayload::ConnectionState { status, reason })
                .await;
        }
    }

    async fn publish(&self, payload: EventPayload) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.pipeline
            .publish(NormalizedEvent::new(&self.tenant, sequence, payload))
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use {
        super::*,
        crate::{
            client::Credentials,
            credentials::MemoryCredentialStore,
            testutil::{Behavior, CaptureSink, FakeClient, wait_until},
        },
        courier_events::EventKind,
    };

    fn quick_config() -> SupervisorConfig {
        SupervisorConfig {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(200),
            send_timeout: Duration::from_millis(200),
            connect_timeout: Duration::from_millis(200),
        }
    }

    fn spawn_supervisor(
        client: Arc<FakeClient>,
        store: Arc<MemoryCredentialStore>,
        sink: Arc<CaptureSink>,
    ) -> Arc<ConnectionSupervisor> {
        let pipeline = EventPipeline::new(vec![sink as Arc<dyn courier_events::EventSink>]);
        ConnectionSupervisor::spawn(
            "t1",
            "owner-1",
            None,
            quick_config(),
            client,
            store,
            pipeline,
        )
    }

    #[tokio::test]
    async fn pairing_then_connected_emits_states_in_order() {
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::PairingCode { code: "QR-1".into() },
            ClientEvent::Connected { device: None },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, store, Arc::clone(&sink));

        wait_until(|| supervisor.status() == SessionStatus::Connected).await;
        wait_until(|| sink.len() >= 4).await;

        let events = sink.events();
        let kinds: Vec<EventKind> = events.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, vec![
            EventKind::ConnectionState, // initializing
            EventKind::ConnectionState, // awaitingPairing
            EventKind::PairingUpdated,  // state change always precedes the artifact
            EventKind::ConnectionState, // connected
        ]);

        // Sequence numbers are strictly increasing.
        for pair in events.windows(2) {
            assert!(pair[1].sequence > pair[0].sequence);
        }

        // The artifact is cleared once connected.
        assert!(supervisor.pairing_artifact().is_none());

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn pairing_artifact_refresh_overwrites() {
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::PairingCode { code: "QR-1".into() },
            ClientEvent::PairingCode { code: "QR-2".into() },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, store, Arc::clone(&sink));

        wait_until(|| supervisor.pairing_artifact() == Some("QR-2".into())).await;
        assert_eq!(supervisor.status(), SessionStatus::AwaitingPairing);

        // Only one AwaitingPairing state event despite two artifacts.
        let state_events = sink
            .events()
            .iter()
            .filter(|e| e.kind() == EventKind::ConnectionState)
            .count();
        assert_eq!(state_events, 2); // initializing + awaitingPairing

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn reconnect_backoff_grows_then_resets_on_success() {
        let client = FakeClient::with_behaviors(vec![
            Behavior::Fail("blip".into()),
            Behavior::Fail("blip".into()),
            Behavior::Fail("blip".into()),
            Behavior::Open(vec![ClientEvent::Connected { device: None }]),
        ]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(Arc::clone(&client), store, sink);

        wait_until(|| supervisor.status() == SessionStatus::Connected).await;
        assert_eq!(client.connects(), 4);

        // Gaps between connect attempts follow base * 2^n (plus jitter):
        // at least ~20ms, ~40ms, ~80ms.
        let times = client.connect_times();
        let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps[0] >= Duration::from_millis(15), "gap 0: {gaps:?}");
        assert!(gaps[1] >= Duration::from_millis(35), "gap 1: {gaps:?}");
        assert!(gaps[2] >= Duration::from_millis(70), "gap 2: {gaps:?}");

        // Counter resets after a successful Connected transition.
        assert_eq!(supervisor.snapshot().reconnect_attempts, 0);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn terminal_disconnect_parks_logged_out_and_invalidates_credentials() {
        let client = FakeClient::with_behaviors(vec![Behavior::Events(vec![
            ClientEvent::Connected { device: None },
            ClientEvent::Disconnected {
                reason: "credentials revoked".into(),
                terminal: true,
            },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        store
            .save("t1", &Credentials::new(json!({"k": 1})))
            .await
            .unwrap();
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(Arc::clone(&client), Arc::clone(&store), sink);

        wait_until(|| supervisor.status() == SessionStatus::LoggedOut).await;

        // No retry after a terminal failure.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.connects(), 1);
        assert!(store.load("t1").await.unwrap().is_none());

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn stream_close_is_a_recoverable_disconnect() {
        let client = FakeClient::with_behaviors(vec![
            Behavior::Events(vec![ClientEvent::Connected { device: None }]),
            Behavior::Open(vec![ClientEvent::Connected { device: None }]),
        ]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(Arc::clone(&client), store, sink);

        wait_until(|| client.connects() == 2 && supervisor.status() == SessionStatus::Connected)
            .await;
        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn rotated_credentials_are_persisted() {
        let rotated = Credentials::new(json!({"device": "new"}));
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::CredentialsRotated(rotated.clone()),
            ClientEvent::Connected { device: None },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, Arc::clone(&store), sink);

        wait_until(|| supervisor.status() == SessionStatus::Connected).await;
        assert_eq!(store.load("t1").await.unwrap(), Some(rotated));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn send_requires_connected_state() {
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::PairingCode { code: "QR".into() },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, store, sink);

        wait_until(|| supervisor.status() == SessionStatus::AwaitingPairing).await;
        let err = supervisor.send("peer", "hello").await.unwrap_err();
        assert!(matches!(err, SendError::NotConnected { .. }));
        assert!(err.is_retryable());

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn send_validates_input_and_returns_message_id() {
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::Connected { device: None },
        ])]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, store, sink);

        wait_until(|| supervisor.status() == SessionStatus::Connected).await;

        let err = supervisor.send("  ", "hello").await.unwrap_err();
        assert!(matches!(err, SendError::InvalidRecipient));
        assert!(!err.is_retryable());

        let err = supervisor.send("peer", "").await.unwrap_err();
        assert!(matches!(err, SendError::EmptyBody));

        let id = supervisor.send("peer", "hello").await.unwrap();
        assert!(id.starts_with("msg-"));

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn transport_send_error_does_not_change_state() {
        let client = FakeClient::with_behaviors(vec![Behavior::Open(vec![
            ClientEvent::Connected { device: None },
        ])]);
        client.fail_sends();
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(Arc::clone(&client), store, sink);

        wait_until(|| supervisor.status() == SessionStatus::Connected).await;
        let err = supervisor.send("peer", "hello").await.unwrap_err();
        assert!(matches!(err, SendError::Transport { .. }));
        assert_eq!(supervisor.status(), SessionStatus::Connected);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn inbound_messages_are_published_in_order() {
        let messages: Vec<ClientEvent> = (1..=5)
            .map(|i| {
                ClientEvent::Message(courier_events::IncomingMessage {
                    message_id: format!("m{i}"),
                    chat: "chat".into(),
                    sender: "peer".into(),
                    sender_name: None,
                    body: format!("hello {i}"),
                    from_me: false,
                    timestamp_ms: i,
                })
            })
            .collect();
        let mut events = vec![ClientEvent::Connected { device: None }];
        events.extend(messages);
        let client = FakeClient::with_behaviors(vec![Behavior::Open(events)]);
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(client, store, Arc::clone(&sink));

        wait_until(|| {
            sink.events()
                .iter()
                .filter(|e| e.kind() == EventKind::MessageReceived)
                .count()
                == 5
        })
        .await;

        let bodies: Vec<String> = sink
            .events()
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::MessageReceived(m) => Some(m.body.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec![
            "hello 1", "hello 2", "hello 3", "hello 4", "hello 5"
        ]);

        supervisor.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_during_backoff_does_not_resurrect() {
        let client = FakeClient::always_failing();
        let store = Arc::new(MemoryCredentialStore::new());
        let sink = CaptureSink::new();
        let supervisor = spawn_supervisor(Arc::clone(&client), store, sink);

        wait_until(|| client.connects() >= 1).await;
        supervisor.shutdown().await;

        let after = client.connects();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(client.connects(), after, "reconnect fired after shutdown");
        assert!(supervisor.is_cancelled());
    }
}

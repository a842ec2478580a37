//! Sidecar WebSocket client.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    async_trait::async_trait,
    futures::{
        SinkExt, StreamExt,
        stream::{SplitSink, SplitStream},
    },
    tokio::{
        net::TcpStream,
        sync::{Mutex, mpsc, oneshot},
        time::timeout,
    },
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message as WsMessage,
    },
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {
    courier_session::{ClientEvent, Credentials, ProtocolClient},
    crate::frames::{CommandFrame, EventFrame},
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type SendOutcome = Result<String, String>;

pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:3001";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub url: String,
    /// Budget for a command round trip (send → sendResult).
    pub command_timeout: Duration,
    /// Per-tenant event channel depth.
    pub channel_depth: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BRIDGE_URL.to_string(),
            command_timeout: Duration::from_secs(15),
            channel_depth: 256,
        }
    }
}

struct Shared {
    /// Write half of the sidecar socket; `None` until dialed (and again
    /// after the connection drops).
    writer: Mutex<Option<WsSink>>,
    /// Live per-tenant event channels.
    tenants: StdMutex<HashMap<String, mpsc::Sender<ClientEvent>>>,
    /// In-flight send commands awaiting their `sendResult`.
    pending: StdMutex<HashMap<String, oneshot::Sender<SendOutcome>>>,
}

/// [`ProtocolClient`] backed by the provider sidecar.
///
/// One socket serves every tenant. The socket is dialed lazily on first
/// use and re-dialed transparently after a drop; supervisors observe a
/// drop as a recoverable disconnect on their event stream.
pub struct BridgeClient {
    config: BridgeConfig,
    shared: Arc<Shared>,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                writer: Mutex::new(None),
                tenants: StdMutex::new(HashMap::new()),
                pending: StdMutex::new(HashMap::new()),
            }),
        }
    }

    async fn ensure_connected(&self) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        if writer.is_some() {
            return Ok(());
        }
        let (stream, _response) = connect_async(&self.config.url)
            .await
            .with_context(|| format!("dialing sidecar at {}", self.config.url))?;
        info!(url = %self.config.url, "bridge connected");
        let (sink, source) = stream.split();
        *writer = Some(sink);
        tokio::spawn(read_loop(Arc::clone(&self.shared), source));
        Ok(())
    }

    async fn send_frame(&self, frame: &CommandFrame) -> Result<()> {
        self.ensure_connected().await?;
        let json = serde_json::to_string(frame)?;
        let mut writer = self.shared.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            bail!("bridge connection lost");
        };
        if let Err(e) = sink.send(WsMessage::Text(json.into())).await {
            writer.take();
            return Err(e).context("writing to sidecar socket");
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolClient for BridgeClient {
    async fn connect(
        &self,
        tenant: &str,
        credentials: Option<Credentials>,
    ) -> Result<mpsc::Receiver<ClientEvent>> {
        let (tx, rx) = mpsc::channel(self.config.channel_depth);
        {
            let mut tenants = self
                .shared
                .tenants
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            tenants.insert(tenant.to_string(), tx);
        }
        self.send_frame(&CommandFrame::Connect {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_string(),
            credentials: credentials.map(|c| c.blob),
        })
        .await?;
        Ok(rx)
    }

    async fn send_text(&self, tenant: &str, recipient: &str, body: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            pending.insert(id.clone(), tx);
        }

        let frame = CommandFrame::Send {
            id: id.clone(),
            tenant: tenant.to_string(),
            recipient: recipient.to_string(),
            body: body.to_string(),
        };
        if let Err(e) = self.send_frame(&frame).await {
            self.shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            return Err(e);
        }

        match timeout(self.config.command_timeout, rx).await {
            Err(_) => {
                self.shared
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&id);
                bail!("send result timed out");
            },
            // Sender dropped: the socket died mid-flight.
            Ok(Err(_)) => bail!("bridge connection lost"),
            Ok(Ok(Ok(message_id))) => Ok(message_id),
            Ok(Ok(Err(reason))) => bail!("sidecar rejected send: {reason}"),
        }
    }

    async fn close(&self, tenant: &str) -> Result<()> {
        {
            let mut tenants = self
                .shared
                .tenants
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            tenants.remove(tenant);
        }
        self.send_frame(&CommandFrame::Close {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_string(),
        })
        .await
    }
}

async fn read_loop(shared: Arc<Shared>, mut source: WsSource) {
    while let Some(message) = source.next().await {
        match message {
            Ok(WsMessage::Text(text)) => match serde_json::from_str::<EventFrame>(&text) {
                Ok(frame) => route_frame(&shared, frame).await,
                Err(e) => warn!(error = %e, "unparseable sidecar frame"),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {},
            Err(e) => {
                warn!(error = %e, "bridge read error");
                break;
            },
        }
    }
    warn!("bridge connection closed");
    shared.writer.lock().await.take();

    // Fail in-flight sends and tell every supervisor its connection is
    // gone so they re-enter the reconnect path.
    let pending: Vec<_> = {
        let mut pending = shared.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.drain().collect()
    };
    drop(pending);
    let tenants: Vec<_> = {
        let mut tenants = shared.tenants.lock().unwrap_or_else(|e| e.into_inner());
        tenants.drain().collect()
    };
    for (_, tx) in tenants {
        let _ = tx
            .send(ClientEvent::Disconnected {
                reason: "bridge connection lost".into(),
                terminal: false,
            })
            .await;
    }
}

async fn route_frame(shared: &Arc<Shared>, frame: EventFrame) {
    let event = match frame {
        EventFrame::SendResult {
            id,
            tenant,
            message_id,
            error,
        } => {
            let waiter = shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&id);
            let Some(waiter) = waiter else {
                debug!(tenant, id, "send result with no waiter");
                return;
            };
            let outcome = match message_id {
                Some(message_id) => Ok(message_id),
                None => Err(error.unwrap_or_else(|| "send failed".into())),
            };
            let _ = waiter.send(outcome);
            return;
        },
        EventFrame::Pairing { tenant, code } => (tenant, ClientEvent::PairingCode { code }),
        EventFrame::Connected { tenant, device } => (tenant, ClientEvent::Connected { device }),
        EventFrame::Credentials { tenant, blob } => {
            (tenant, ClientEvent::CredentialsRotated(Credentials::new(blob)))
        },
        EventFrame::Disconnected {
            tenant,
            reason,
            terminal,
        } => (tenant, ClientEvent::Disconnected { reason, terminal }),
        EventFrame::LoggedOut { tenant } => (tenant, ClientEvent::LoggedOut),
        EventFrame::Message { tenant, message } => (tenant, ClientEvent::Message(message)),
        EventFrame::Ack { tenant, ack } => (tenant, ClientEvent::Ack(ack)),
        EventFrame::GroupUpdate { tenant, update } => (tenant, ClientEvent::GroupUpdate(update)),
        EventFrame::Presence { tenant, presence } => (tenant, ClientEvent::Presence(presence)),
    };

    let (tenant, event) = event;
    let tx = {
        let tenants = shared.tenants.lock().unwrap_or_else(|e| e.into_inner());
        tenants.get(&tenant).cloned()
    };
    match tx {
        Some(tx) => {
            let _ = tx.send(event).await;
        },
        None => debug!(tenant, "event for tenant with no live channel"),
    }
}

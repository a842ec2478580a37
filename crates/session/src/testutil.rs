//! Shared fakes for supervisor and registry tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant},
};

use {async_trait::async_trait, tokio::sync::mpsc};

use {
    courier_events::{EventSink, NormalizedEvent},
    crate::client::{ClientEvent, Credentials, ProtocolClient},
};

/// What the next `connect` call should do.
pub(crate) enum Behavior {
    /// Refuse the connection.
    Fail(String),
    /// Emit these events, then close the stream.
    Events(Vec<ClientEvent>),
    /// Emit these events and keep the stream open.
    Open(Vec<ClientEvent>),
}

/// Scriptable [`ProtocolClient`]: each `connect` pops the next behavior;
/// once the script runs out it connects and stays open.
pub(crate) struct FakeClient {
    behaviors: Mutex<VecDeque<Behavior>>,
    always_fail: bool,
    fail_sends: AtomicBool,
    connects: AtomicU32,
    sends: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
    held: Mutex<Vec<mpsc::Sender<ClientEvent>>>,
}

impl FakeClient {
    pub(crate) fn with_behaviors(behaviors: Vec<Behavior>) -> Arc<Self> {
        Arc::new(Self {
            behaviors: Mutex::new(behaviors.into()),
            always_fail: false,
            fail_sends: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            sends: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    /// Every connect attempt is refused.
    pub(crate) fn always_failing() -> Arc<Self> {
        let mut client = Self::with_behaviors(Vec::new());
        Arc::get_mut(&mut client).unwrap().always_fail = true;
        client
    }

    /// Make subsequent `send_text` calls fail at the transport level.
    pub(crate) fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    pub(crate) fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn connect_times(&self) -> Vec<Instant> {
        self.connect_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl ProtocolClient for FakeClient {
    async fn connect(
        &self,
        _tenant: &str,
        _credentials: Option<Credentials>,
    ) -> anyhow::Result<mpsc::Receiver<ClientEvent>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.connect_times
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Instant::now());

        if self.always_fail {
            anyhow::bail!("connect refused");
        }

        let behavior = self
            .behaviors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Behavior::Open(vec![ClientEvent::Connected { device: None }]));

        match behavior {
            Behavior::Fail(reason) => anyhow::bail!(reason),
            Behavior::Events(events) => {
                let (tx, rx) = mpsc::channel(64);
                for event in events {
                    let _ = tx.send(event).await;
                }
                Ok(rx)
            },
            Behavior::Open(events) => {
                let (tx, rx) = mpsc::channel(64);
                for event in events {
                    let _ = tx.send(event).await;
                }
                self.held.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
                Ok(rx)
            },
        }
    }

    async fn send_text(
        &self,
        _tenant: &str,
        _recipient: &str,
        _body: &str,
    ) -> anyhow::Result<String> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("socket reset");
        }
        let n = self.sends.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("msg-{n}"))
    }

    async fn close(&self, _tenant: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Sink that records everything it is handed.
pub(crate) struct CaptureSink {
    events: Mutex<Vec<NormalizedEvent>>,
}

impl CaptureSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn events(&self) -> Vec<NormalizedEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl EventSink for CaptureSink {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn deliver(&self, event: &NormalizedEvent) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Poll `predicate` until it holds or a 2s deadline passes.
pub(crate) async fn wait_until(predicate: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !predicate() {
        assert!(Instant::now() < deadline, "condition not reached within 2s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

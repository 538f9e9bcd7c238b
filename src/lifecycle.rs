//! Connection lifecycle manager and the bridge event loop.
//!
//! All transport activity funnels into one mpsc channel of [`BridgeEvent`]s
//! consumed by a single task, so routing, session mutation, and queue
//! flushing never run concurrently with each other.

use crate::config::Config;
use crate::queue::{OutboundTask, SendQueue};
use crate::router::{texts, Router};
use crate::session::MemorySessionStore;
use crate::transport::{
    BrokerEvent, BrokerPublisher, ChatEvent, ChatTransport, InboundMessage,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Snapshot of transport readiness, consumed by the `status` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionReadiness {
    pub chat: bool,
    pub broker: bool,
}

/// Everything the bridge task reacts to.
#[derive(Debug)]
pub enum BridgeEvent {
    Inbound(InboundMessage),
    Chat(ChatEvent),
    Broker(BrokerEvent),
    /// The reconnect delay elapsed; attempt to reopen the chat session.
    ReconnectDue,
}

/// Tracks transport readiness and drives reconnects and queue flushes.
pub struct Lifecycle {
    config: Arc<Config>,
    chat_ready: bool,
    broker_ready: bool,
    own_id: Option<String>,
    introduced: bool,
    reconnect_timer: Option<JoinHandle<()>>,
    events_tx: mpsc::Sender<BridgeEvent>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(config: Arc<Config>, events_tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            config,
            chat_ready: false,
            broker_ready: false,
            own_id: None,
            introduced: false,
            reconnect_timer: None,
            events_tx,
        }
    }

    #[must_use]
    pub fn readiness(&self) -> ConnectionReadiness {
        ConnectionReadiness {
            chat: self.chat_ready,
            broker: self.broker_ready,
        }
    }

    #[must_use]
    pub fn own_id(&self) -> Option<&str> {
        self.own_id.as_deref()
    }

    pub async fn on_chat_event(
        &mut self,
        event: ChatEvent,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        match event {
            ChatEvent::QrAvailable => {
                tracing::info!("pairing code available; scan it from the gateway");
            }
            ChatEvent::Open { own_id } => {
                tracing::info!("chat session open as {own_id}");
                self.own_id = Some(own_id);
                self.chat_ready = true;
                if let Some(timer) = self.reconnect_timer.take() {
                    timer.abort();
                }
                queue.set_ready(true);
                queue.flush(chat).await;
                if !self.introduced {
                    self.introduced = true;
                    if let Some(own) = self.own_id.clone() {
                        // Best effort; a failure here is just logged.
                        queue
                            .enqueue(
                                chat,
                                OutboundTask {
                                    to: own,
                                    text: texts::main_menu(
                                        "Pengguna",
                                        &self.config.passphrase,
                                    ),
                                },
                            )
                            .await;
                    }
                }
            }
            ChatEvent::Close { reason } => {
                self.chat_ready = false;
                queue.set_ready(false);
                if reason.is_terminal() {
                    tracing::error!(
                        "chat session logged out; re-authentication required, not reconnecting"
                    );
                } else {
                    tracing::warn!(
                        "chat session closed ({reason:?}); reconnecting in {:?}",
                        self.config.reconnect_delay
                    );
                    self.schedule_reconnect();
                }
            }
        }
    }

    pub fn on_broker_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => {
                tracing::info!("broker connected");
                self.broker_ready = true;
            }
            BrokerEvent::Disconnected => {
                tracing::warn!("broker disconnected; client retries in the background");
                self.broker_ready = false;
            }
        }
    }

    pub async fn on_reconnect_due(&mut self, chat: &dyn ChatTransport) {
        self.reconnect_timer = None;
        if self.chat_ready {
            // The session came back on its own while the timer ran.
            return;
        }
        tracing::info!("attempting chat reconnect");
        if let Err(err) = chat.connect().await {
            tracing::warn!("reconnect attempt failed: {err}");
            self.schedule_reconnect();
        }
    }

    /// Arm (or re-arm) the single reconnect timer. The previous handle is
    /// aborted first, so at most one `ReconnectDue` is ever outstanding.
    fn schedule_reconnect(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        let tx = self.events_tx.clone();
        let delay = self.config.reconnect_delay;
        self.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(BridgeEvent::ReconnectDue).await;
        }));
    }

    /// Abort the pending reconnect timer, if any. Called on shutdown so no
    /// timer task outlives the bridge.
    pub fn shutdown(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// The bridge: owns the router, queue, and lifecycle state, and consumes the
/// event channel until shutdown.
pub struct Bridge {
    router: Router<MemorySessionStore>,
    queue: SendQueue,
    lifecycle: Lifecycle,
    chat: Arc<dyn ChatTransport>,
    broker: Arc<dyn BrokerPublisher>,
    events_rx: mpsc::Receiver<BridgeEvent>,
}

impl Bridge {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        chat: Arc<dyn ChatTransport>,
        broker: Arc<dyn BrokerPublisher>,
        events_tx: mpsc::Sender<BridgeEvent>,
        events_rx: mpsc::Receiver<BridgeEvent>,
    ) -> Self {
        Self {
            router: Router::new(Arc::clone(&config), MemorySessionStore::new()),
            queue: SendQueue::new(),
            lifecycle: Lifecycle::new(config, events_tx),
            chat,
            broker,
            events_rx,
        }
    }

    /// Run the event loop. Returns only when every sender half of the event
    /// channel has been dropped.
    pub async fn run(&mut self) {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                BridgeEvent::Inbound(message) => {
                    let readiness = ConnectionReadiness {
                        chat: self.lifecycle.readiness().chat,
                        // Live client state, not the last event we saw.
                        broker: self.broker.is_connected(),
                    };
                    self.router
                        .handle_message(
                            &message,
                            self.lifecycle.own_id(),
                            readiness,
                            self.broker.as_ref(),
                            self.chat.as_ref(),
                            &mut self.queue,
                        )
                        .await;
                }
                BridgeEvent::Chat(event) => {
                    self.lifecycle
                        .on_chat_event(event, self.chat.as_ref(), &mut self.queue)
                        .await;
                }
                BridgeEvent::Broker(event) => self.lifecycle.on_broker_event(event),
                BridgeEvent::ReconnectDue => {
                    self.lifecycle.on_reconnect_due(self.chat.as_ref()).await;
                }
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.lifecycle.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::transport::CloseReason;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeChat {
        sent: Mutex<Vec<(String, String)>>,
        connects: AtomicUsize,
        fail_connects: usize,
    }

    #[async_trait]
    impl ChatTransport for FakeChat {
        async fn send_text(&self, to: &str, text: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_owned(), text.to_owned()));
            Ok(())
        }

        async fn connect(&self) -> anyhow::Result<()> {
            let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_connects {
                anyhow::bail!("simulated connect failure");
            }
            Ok(())
        }
    }

    fn config() -> Arc<Config> {
        let vars: HashMap<&str, &str> = HashMap::from([("MQTT_URL", "mqtt://broker:1883")]);
        Arc::new(Config::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned())).unwrap())
    }

    fn lifecycle(capacity: usize) -> (Lifecycle, mpsc::Receiver<BridgeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Lifecycle::new(config(), tx), rx)
    }

    async fn expect_reconnect_due(rx: &mut mpsc::Receiver<BridgeEvent>) {
        let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("timer should fire within the reconnect delay")
            .expect("channel open");
        assert!(matches!(event, BridgeEvent::ReconnectDue));
    }

    #[tokio::test(start_paused = true)]
    async fn non_terminal_close_schedules_exactly_one_reconnect() {
        let (mut lifecycle, mut rx) = lifecycle(8);
        let chat = FakeChat::default();
        let mut queue = SendQueue::new();

        lifecycle
            .on_chat_event(
                ChatEvent::Close {
                    reason: CloseReason::Other("stream errored".to_owned()),
                },
                &chat,
                &mut queue,
            )
            .await;

        expect_reconnect_due(&mut rx).await;
        // No second event from the same close.
        let extra = tokio::time::timeout(Duration::from_secs(60), rx.recv()).await;
        assert!(extra.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn logged_out_close_never_reconnects() {
        let (mut lifecycle, mut rx) = lifecycle(8);
        let chat = FakeChat::default();
        let mut queue = SendQueue::new();

        lifecycle
            .on_chat_event(
                ChatEvent::Close {
                    reason: CloseReason::LoggedOut,
                },
                &chat,
                &mut queue,
            )
            .await;

        let got = tokio::time::timeout(Duration::from_secs(120), rx.recv()).await;
        assert!(got.is_err(), "no reconnect may be scheduled after logout");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnect_attempt_rearms_the_timer() {
        let (mut lifecycle, mut rx) = lifecycle(8);
        let chat = FakeChat {
            fail_connects: 1,
            ..Default::default()
        };
        let mut queue = SendQueue::new();

        lifecycle
            .on_chat_event(
                ChatEvent::Close {
                    reason: CloseReason::Other("timed out".to_owned()),
                },
                &chat,
                &mut queue,
            )
            .await;

        expect_reconnect_due(&mut rx).await;
        lifecycle.on_reconnect_due(&chat).await;
        assert_eq!(chat.connects.load(Ordering::SeqCst), 1);

        // First attempt failed, so a second timer must be armed.
        expect_reconnect_due(&mut rx).await;
        lifecycle.on_reconnect_due(&chat).await;
        assert_eq!(chat.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn open_flushes_queue_and_introduces_once() {
        let (mut lifecycle, _rx) = lifecycle(8);
        let chat = FakeChat::default();
        let mut queue = SendQueue::new();

        queue
            .enqueue(
                &chat,
                OutboundTask {
                    to: "62811@s.whatsapp.net".to_owned(),
                    text: "buffered".to_owned(),
                },
            )
            .await;
        assert_eq!(queue.pending_len(), 1);

        lifecycle
            .on_chat_event(
                ChatEvent::Open {
                    own_id: "62899@s.whatsapp.net".to_owned(),
                },
                &chat,
                &mut queue,
            )
            .await;

        {
            let sent = chat.sent.lock().unwrap();
            assert_eq!(sent.len(), 2);
            assert_eq!(sent[0].1, "buffered");
            assert_eq!(sent[1].0, "62899@s.whatsapp.net");
            assert!(sent[1].1.contains("Pilih mode interaksi"));
        }

        // A later reopen must not repeat the introduction.
        lifecycle
            .on_chat_event(
                ChatEvent::Close {
                    reason: CloseReason::Other("restart".to_owned()),
                },
                &chat,
                &mut queue,
            )
            .await;
        lifecycle
            .on_chat_event(
                ChatEvent::Open {
                    own_id: "62899@s.whatsapp.net".to_owned(),
                },
                &chat,
                &mut queue,
            )
            .await;
        assert_eq!(chat.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_before_timer_fires_cancels_the_reconnect() {
        let (mut lifecycle, mut rx) = lifecycle(8);
        let chat = FakeChat::default();
        let mut queue = SendQueue::new();

        lifecycle
            .on_chat_event(
                ChatEvent::Close {
                    reason: CloseReason::Other("blip".to_owned()),
                },
                &chat,
                &mut queue,
            )
            .await;
        lifecycle
            .on_chat_event(
                ChatEvent::Open {
                    own_id: "62899@s.whatsapp.net".to_owned(),
                },
                &chat,
                &mut queue,
            )
            .await;

        let got = tokio::time::timeout(Duration::from_secs(120), rx.recv()).await;
        assert!(got.is_err(), "aborted timer must not deliver an event");
    }

    #[tokio::test(start_paused = true)]
    async fn broker_events_drive_the_readiness_flag() {
        let (mut lifecycle, _rx) = lifecycle(8);

        assert!(!lifecycle.readiness().broker);
        lifecycle.on_broker_event(BrokerEvent::Connected);
        assert!(lifecycle.readiness().broker);
        lifecycle.on_broker_event(BrokerEvent::Disconnected);
        assert!(!lifecycle.readiness().broker);
    }
}

//! Slack Socket Mode session.
//!
//! Holds the WebSocket open, acknowledges every envelope, and hands
//! classified messages to the router on their own tasks. Reconnects when
//! Slack asks for it or the socket drops.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::bot::events::{Ack, Envelope, classify, parse_event};
use crate::bot::format::Reply;
use crate::bot::router::Router;
use crate::bot::sessions::SessionRegistry;
use crate::bot::slack::{Destination, Messenger, SlackClient, SlackError};

/// Sent to the installing user the first time a session comes up.
pub const WELCOME_LINES: &[&str] = &[
    "Hello, i am devRant bot, thanks for allowing me to be apart of your slack channel.",
    "To get started, `/invite` me to a channel.",
    "If you are unsure of anything, type `help` for a list of commands.",
];

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Result of asking a session to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// Ran until shutdown or a permanent disconnect.
    Finished,
    /// Another session with the same token is already connected.
    AlreadyRunning,
}

/// How one WebSocket connection ended.
enum Closed {
    Shutdown,
    Reconnect,
    Permanent(String),
}

pub struct SocketSession {
    app_token: String,
    slack: Arc<SlackClient>,
    router: Arc<Router>,
    registry: Arc<SessionRegistry>,
    options: SessionOptions,
    installer: Option<String>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SocketSession {
    pub fn new(
        app_token: String,
        slack: Arc<SlackClient>,
        router: Arc<Router>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            app_token,
            slack,
            router,
            registry,
            options: SessionOptions::default(),
            installer: None,
            shutdown_tx,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Greet this user once the session is connected. The registry is not
    /// persisted, so the greeting goes out on every process start.
    pub fn with_installer(mut self, user: Option<String>) -> Self {
        self.installer = user;
        self
    }

    /// Handle for stopping [`run`](Self::run) from elsewhere.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Connect and process events until shutdown. The session is listed in
    /// the registry for exactly as long as this runs.
    pub async fn run(&self) -> Result<Started, SlackError> {
        if !self.registry.try_register(&self.app_token) {
            warn!("Session already running, not starting another");
            return Ok(Started::AlreadyRunning);
        }

        let result = self.run_registered().await;
        if let Some(session) = self.registry.remove(&self.app_token) {
            let uptime = chrono::Utc::now() - session.started_at;
            info!(
                "Session for team {} ended after {}s ({} still running)",
                session.team_id.as_deref().unwrap_or("unknown"),
                uptime.num_seconds(),
                self.registry.len()
            );
        }
        result.map(|()| Started::Finished)
    }

    async fn run_registered(&self) -> Result<(), SlackError> {
        let identity = self.slack.auth_test().await?;
        self.registry.set_team(&self.app_token, identity.team_id.clone());

        if let Some(ref user) = self.installer {
            self.welcome(user).await;
        }

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let url = match self.slack.open_connection(&self.app_token).await {
                Ok(url) => url,
                Err(e) if e.is_auth_failure() => {
                    error!("Slack rejected the app token, giving up: {e}");
                    return Err(e);
                }
                Err(e) => {
                    error!("Failed to open Socket Mode connection: {e}");
                    tokio::time::sleep(self.options.reconnect_delay).await;
                    if shutdown_rx.try_recv().is_ok() {
                        return Ok(());
                    }
                    continue;
                }
            };

            info!("Connecting to Socket Mode...");
            match self.connect_and_run(&url, &identity.user_id, &mut shutdown_rx).await {
                Ok(Closed::Shutdown) => return Ok(()),
                Ok(Closed::Permanent(reason)) => {
                    warn!("Slack closed the session for good: {reason}");
                    return Ok(());
                }
                Ok(Closed::Reconnect) => info!("Reconnecting..."),
                Err(e) => {
                    error!("Socket Mode connection error: {e}");
                    info!("Reconnecting in {:?}...", self.options.reconnect_delay);
                    tokio::time::sleep(self.options.reconnect_delay).await;
                }
            }

            if shutdown_rx.try_recv().is_ok() {
                return Ok(());
            }
        }
    }

    async fn welcome(&self, user: &str) {
        let sent = match self.slack.open_direct(user).await {
            Ok(channel) => {
                let reply = Reply::text(WELCOME_LINES.join("\n"));
                self.slack.send_reply(&Destination::channel(channel), &reply).await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = sent {
            warn!("Unable to welcome {user}: {e}");
        }
    }

    async fn connect_and_run(
        &self,
        url: &str,
        bot_user_id: &str,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<Closed, SlackError> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<WsMessage>(100);

        let write_task = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    error!("Failed to send WebSocket message: {e}");
                    break;
                }
            }
        });

        let ping_tx = out_tx.clone();
        let ping_interval = self.options.ping_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            loop {
                interval.tick().await;
                if ping_tx.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        let result = loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break Ok(Closed::Shutdown);
                }
                msg = read.next() => match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(closed) = self.handle_frame(&text, bot_user_id, &out_tx).await {
                            break Ok(closed);
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        let _ = out_tx.send(WsMessage::Pong(data)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("WebSocket closed by server");
                        break Ok(Closed::Reconnect);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(SlackError::from(e)),
                },
            }
        };

        ping_task.abort();
        write_task.abort();
        result
    }

    /// Handle one text frame. Returns `Some` when the connection should end.
    async fn handle_frame(
        &self,
        text: &str,
        bot_user_id: &str,
        out_tx: &mpsc::Sender<WsMessage>,
    ) -> Option<Closed> {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Failed to parse Socket Mode envelope: {e}");
                return None;
            }
        };

        if let Some(ref envelope_id) = envelope.envelope_id {
            let ack = Ack { envelope_id: envelope_id.clone() };
            match serde_json::to_string(&ack) {
                Ok(json) => {
                    let _ = out_tx.send(WsMessage::Text(json)).await;
                }
                Err(e) => warn!("Failed to encode ack: {e}"),
            }
        }

        match envelope.envelope_type.as_str() {
            "hello" => {
                info!("🚀 Socket Mode connection established");
                None
            }
            "disconnect" => {
                let reason = envelope.reason.unwrap_or_default();
                if reason == "link_disabled" {
                    Some(Closed::Permanent(reason))
                } else {
                    info!("Slack requested reconnect ({reason})");
                    Some(Closed::Reconnect)
                }
            }
            "events_api" => {
                let inbound = envelope
                    .payload
                    .as_ref()
                    .and_then(parse_event)
                    .and_then(|event| classify(&event, bot_user_id));

                if let Some(msg) = inbound {
                    let router = self.router.clone();
                    tokio::spawn(async move {
                        let dispatch = router.handle(&msg).await;
                        debug!("Dispatched {:?}", dispatch);
                    });
                }
                None
            }
            other => {
                debug!("Ignoring envelope type {other}");
                None
            }
        }
    }
}

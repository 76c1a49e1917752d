use crate::{
    config::ClientConfig,
    connection_state::ConnectionState,
    logic::{ClientLogic, ConnectError},
};
use arena_shared::stomp::{self, Command, Frame, HeartBeat, Inbound};
use async_channel::Receiver;
use async_handle::Handle;
use async_rwlock::RwLock;
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    time::{Instant, Interval},
};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

mod data;
mod waiter;

pub use data::MessageCallback;
use data::{ClientData, NetworkState, Registration, Settings};
pub use waiter::PendingConnection;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DISCONNECT_FLUSH: Duration = Duration::from_millis(500);

/// A single STOMP-over-WebSocket connection shared by the whole session.
///
/// Clones share the connection. The socket is opened lazily by the first
/// [`connect`](Client::connect) (or [`subscribe`](Client::subscribe)) and is then
/// kept alive by a background task that reconnects after a fixed delay and
/// replays every registered subscription once the broker accepts it again.
#[derive(Clone)]
pub struct Client {
    data: Handle<ClientData>,
}

impl Client {
    pub fn new<L: ClientLogic + 'static>(logic: L, config: &ClientConfig) -> Self {
        Self {
            data: Handle::new(ClientData {
                logic: Box::new(logic),
                settings: Settings {
                    reconnect_delay: config.reconnect_delay,
                    heart_beat: config.heart_beat(),
                    connect_timeout: config.connect_timeout,
                },
                state: RwLock::new(NetworkState::default()),
            }),
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        let data = self.data.read().await;
        let state = data.state.read().await;
        state.connection_state
    }

    pub async fn subscribed_topics(&self) -> Vec<String> {
        let data = self.data.read().await;
        let state = data.state.read().await;
        state.subscriptions.keys().cloned().collect()
    }

    /// Resolves once a STOMP session is established. Concurrent callers share
    /// the outcome of the same attempt; no second socket is opened while one is
    /// pending or open.
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let pending = {
            let data = self.data.read().await;
            let mut state = data.state.write().await;
            if state.connection_state == ConnectionState::Connected {
                return Ok(());
            }

            let (sender, receiver) = async_channel::bounded(1);
            state.waiters.push(sender);
            if state.task.is_none() {
                let generation = state.generation;
                state.task = Some(tokio::spawn(self.clone().run(generation)));
            }
            PendingConnection::new(receiver)
        };

        pending.wait().await
    }

    /// Registers `callback` for `topic`, connecting first if needed. A topic is
    /// registered at most once: later calls keep the original callback and just
    /// return the topic.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> Result<String, ConnectError>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.connect().await?;

        let data = self.data.read().await;
        let mut state = data.state.write().await;
        if state.subscriptions.contains_key(topic) {
            debug!("already subscribed to {}", topic);
            return Ok(topic.to_owned());
        }

        let id = state.next_subscription_id();
        if let Some(outbound) = &state.outbound {
            let _ = outbound.try_send(Frame::subscribe(&id, topic));
        }
        state.subscriptions.insert(
            topic.to_owned(),
            Registration {
                id,
                callback: Arc::new(callback),
            },
        );
        Ok(topic.to_owned())
    }

    /// No-op for topics that are not registered.
    pub async fn unsubscribe(&self, topic: &str) {
        let data = self.data.read().await;
        let mut state = data.state.write().await;
        if let Some(registration) = state.subscriptions.remove(topic) {
            if let Some(outbound) = &state.outbound {
                let _ = outbound.try_send(Frame::unsubscribe(&registration.id));
            }
        }
    }

    /// Publishes `body` as JSON. Nothing is queued: while the client is not
    /// connected the message is dropped and `false` is returned.
    pub async fn send<T: serde::Serialize + ?Sized>(&self, destination: &str, body: &T) -> bool {
        let json = match serde_json::to_string(body) {
            Ok(json) => json,
            Err(err) => {
                warn!("could not serialize message for {}: {}", destination, err);
                return false;
            }
        };

        let data = self.data.read().await;
        let state = data.state.read().await;
        match &state.outbound {
            Some(outbound) if state.connection_state == ConnectionState::Connected => {
                outbound.try_send(Frame::send(destination, json)).is_ok()
            }
            _ => {
                warn!("not connected, dropping message for {}", destination);
                false
            }
        }
    }

    /// Releases every subscription, closes the connection and stops
    /// reconnecting. The client can be connected again afterwards.
    pub async fn disconnect(&self) {
        let (task, outbound) = {
            let data = self.data.read().await;
            let mut state = data.state.write().await;
            state.generation += 1;
            state.connection_state = ConnectionState::Disconnected;
            state.resolve_waiters(Err(ConnectError::Disconnected));

            let outbound = state.outbound.take();
            if let Some(outbound) = &outbound {
                for registration in state.subscriptions.values() {
                    let _ = outbound.try_send(Frame::unsubscribe(&registration.id));
                }
                let _ = outbound.try_send(Frame::disconnect());
            }
            state.subscriptions.clear();
            (state.task.take(), outbound)
        };

        if let Some(mut task) = task {
            if let Some(outbound) = outbound {
                // The pump drains what is queued and exits once the channel closes.
                outbound.close();
                let _ = tokio::time::timeout(DISCONNECT_FLUSH, &mut task).await;
            }
            task.abort();
        }

        info!("disconnected");
        self.notify_state(ConnectionState::Disconnected).await;
    }

    async fn notify_state(&self, state: ConnectionState) {
        let data = self.data.read().await;
        if let Err(err) = data.logic.state_changed(state).await {
            error!("state_changed callback failed: {:?}", err);
        }
    }

    async fn handle_error(&self, error: &ConnectError) {
        let data = self.data.read().await;
        if let Err(err) = data.logic.handle_error(error).await {
            error!("handle_error callback failed: {:?}", err);
        }
    }

    async fn settings(&self) -> Settings {
        let data = self.data.read().await;
        data.settings
    }

    /// Updates the connection state unless `disconnect` has ended this task's
    /// session. Returns false when the task should stop.
    async fn set_state_if_current(&self, generation: u64, connection_state: ConnectionState) -> bool {
        {
            let data = self.data.read().await;
            let mut state = data.state.write().await;
            if state.generation != generation {
                return false;
            }
            state.connection_state = connection_state;
        }
        self.notify_state(connection_state).await;
        true
    }

    async fn run(self, generation: u64) {
        let settings = self.settings().await;
        if !self
            .set_state_if_current(generation, ConnectionState::Connecting)
            .await
        {
            return;
        }

        loop {
            match self.establish(settings).await {
                Ok((socket, heart_beat)) => {
                    let (sender, receiver) = async_channel::unbounded();
                    {
                        let data = self.data.read().await;
                        let mut state = data.state.write().await;
                        if state.generation != generation {
                            return;
                        }
                        for (topic, registration) in &state.subscriptions {
                            let _ = sender.try_send(Frame::subscribe(&registration.id, topic));
                        }
                        state.outbound = Some(sender);
                        state.connection_state = ConnectionState::Connected;
                        state.resolve_waiters(Ok(()));
                    }
                    info!("connected");
                    self.notify_state(ConnectionState::Connected).await;

                    match self.pump(socket, heart_beat, receiver).await {
                        Ok(()) => return,
                        Err(err) => warn!("connection lost: {}", err),
                    }

                    {
                        let data = self.data.read().await;
                        let mut state = data.state.write().await;
                        if state.generation != generation {
                            return;
                        }
                        state.outbound = None;
                        state.connection_state = ConnectionState::Connecting;
                    }
                    self.notify_state(ConnectionState::Connecting).await;
                }
                Err(err) => {
                    {
                        let data = self.data.read().await;
                        let mut state = data.state.write().await;
                        if state.generation != generation {
                            return;
                        }
                        state.resolve_waiters(Err(err.clone()));
                    }
                    self.handle_error(&err).await;
                }
            }

            tokio::time::sleep(settings.reconnect_delay).await;
        }
    }

    async fn establish(&self, settings: Settings) -> Result<(Socket, HeartBeat), ConnectError> {
        let (url, headers) = {
            let data = self.data.read().await;
            (data.logic.broker_url()?, data.logic.connect_headers())
        };
        debug!(
            "connecting to {}://{}{}",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path()
        );

        tokio::time::timeout(
            settings.connect_timeout,
            handshake(url, headers, settings.heart_beat),
        )
        .await
        .map_err(|_| ConnectError::Timeout(settings.connect_timeout))?
    }

    /// Moves frames in both directions until the link drops (`Err`) or
    /// `disconnect` closes the outbound channel (`Ok`).
    async fn pump(
        &self,
        socket: Socket,
        heart_beat: HeartBeat,
        outbound: Receiver<Frame>,
    ) -> anyhow::Result<()> {
        let (mut tx, mut rx) = socket.split();
        let mut heart_beats = (!heart_beat.outgoing.is_zero()).then(|| {
            tokio::time::interval_at(Instant::now() + heart_beat.outgoing, heart_beat.outgoing)
        });
        let silence_limit = (!heart_beat.incoming.is_zero()).then(|| heart_beat.incoming * 2);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Ok(frame) => {
                        trace!(">>> {:?}", frame);
                        tx.send(Message::text(frame.encode())).await?;
                    }
                    Err(_) => {
                        let _ = tx.close().await;
                        return Ok(());
                    }
                },
                message = rx.next() => {
                    last_seen = Instant::now();
                    match message {
                        Some(Ok(Message::Text(text))) => self.receive_text(&text).await?,
                        Some(Ok(Message::Close(_))) | None => anyhow::bail!("closed by broker"),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                },
                _ = tick(&mut heart_beats) => {
                    tx.send(Message::text("\n")).await?;
                },
                _ = silence(last_seen, silence_limit) => {
                    anyhow::bail!("no frames received for {:?}", silence_limit.unwrap_or_default());
                },
            }
        }
    }

    async fn receive_text(&self, text: &str) -> anyhow::Result<()> {
        match stomp::decode(text) {
            Ok(Inbound::HeartBeat) => trace!("<<< heart-beat"),
            Ok(Inbound::Frame(frame)) => match frame.command {
                Command::Message => self.deliver(frame).await,
                Command::Error => {
                    let message = frame.get("message").unwrap_or(frame.body.as_str()).to_owned();
                    error!("broker error: {}", message);
                    anyhow::bail!("broker error: {}", message);
                }
                _ => trace!("<<< {:?}", frame),
            },
            Err(err) => warn!("dropping malformed frame: {}", err),
        }
        Ok(())
    }

    async fn deliver(&self, frame: Frame) {
        let Some(subscription) = frame.get("subscription") else {
            warn!("MESSAGE frame without a subscription header");
            return;
        };
        let callback = {
            let data = self.data.read().await;
            let state = data.state.read().await;
            state.callback_for(subscription)
        };
        let Some(callback) = callback else {
            debug!("message for released subscription {}", subscription);
            return;
        };

        match serde_json::from_str::<Value>(&frame.body) {
            Ok(body) => callback(body),
            Err(err) => warn!(
                "dropping unparseable message on {}: {}",
                frame.get("destination").unwrap_or(subscription),
                err
            ),
        }
    }
}

/// Opens the socket and performs the STOMP `CONNECT` / `CONNECTED` exchange,
/// returning the negotiated heart-beat intervals.
async fn handshake(
    url: Url,
    headers: Vec<(String, String)>,
    heart_beat: HeartBeat,
) -> Result<(Socket, HeartBeat), ConnectError> {
    let host = url.host_str().unwrap_or("localhost").to_owned();
    let (mut socket, _) = connect_async(url.as_str())
        .await
        .map_err(|err| ConnectError::Socket(err.to_string()))?;
    socket
        .send(Message::text(Frame::connect(&host, heart_beat, &headers).encode()))
        .await
        .map_err(|err| ConnectError::Socket(err.to_string()))?;

    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => match stomp::decode(&text) {
                Ok(Inbound::Frame(frame)) if frame.command == Command::Connected => {
                    let server = frame
                        .get("heart-beat")
                        .and_then(|value| HeartBeat::parse(value).ok())
                        .unwrap_or_default();
                    return Ok((socket, heart_beat.negotiate(&server)));
                }
                Ok(Inbound::Frame(frame)) if frame.command == Command::Error => {
                    let message = frame.get("message").unwrap_or(frame.body.as_str()).to_owned();
                    error!("broker rejected CONNECT: {}", message);
                    return Err(ConnectError::Rejected(message));
                }
                Ok(_) => {}
                Err(err) => warn!("ignoring malformed frame during handshake: {}", err),
            },
            Some(Ok(Message::Close(_))) | None => return Err(ConnectError::Closed),
            Some(Ok(_)) => {}
            Some(Err(err)) => return Err(ConnectError::Socket(err.to_string())),
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}

async fn silence(last_seen: Instant, limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep_until(last_seen + limit).await,
        None => futures::future::pending().await,
    }
}

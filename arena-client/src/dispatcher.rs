use crate::{
    client::Client,
    logic::ConnectError,
    stores::{ChatStore, GameStore, RoomStore},
};
use arena_shared::{
    models::{ChannelType, GLOBAL_CHANNEL},
    protocol::{
        ChatSend, Command, CommandEnvelope, EventEnvelope, ItemUse, RoomKickedEvent, ServerError,
        ServerEvent, SpellUse, TypingUpdate,
    },
    timing::ServerClock,
    topics::{self, Route},
};
use async_channel::{Receiver, Sender};
use async_handle::Handle;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

mod scope;

use scope::{ActiveScope, ScopeKind};
pub use scope::{GameScope, RoomScope};

const NOTICE_BACKLOG: usize = 64;

/// Something the UI layer should react to beyond a store change.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ServerError(ServerError),
    Kicked(RoomKickedEvent),
    /// A lobby delta that was applied to the current room.
    Lobby(ServerEvent),
}

#[derive(Default)]
struct DispatchState {
    worker: Option<JoinHandle<()>>,
    global: bool,
    next_token: u64,
    room: Option<ActiveScope>,
    game: Option<ActiveScope>,
}

/// The single way in for pushed events and the single way out for commands.
///
/// Subscription callbacks only enqueue `(route, body)` pairs; one worker task
/// drains the queue, so handlers never run concurrently.
#[derive(Clone)]
pub struct Dispatcher {
    client: Client,
    clock: ServerClock,
    rooms: Handle<RoomStore>,
    games: Handle<GameStore>,
    chat: Handle<ChatStore>,
    inbound: Sender<(Route, Value)>,
    inbound_rx: Receiver<(Route, Value)>,
    notices: Sender<Notice>,
    notices_rx: Receiver<Notice>,
    state: Handle<DispatchState>,
}

impl Dispatcher {
    pub fn new(
        client: Client,
        clock: ServerClock,
        rooms: Handle<RoomStore>,
        games: Handle<GameStore>,
        chat: Handle<ChatStore>,
    ) -> Self {
        let (inbound, inbound_rx) = async_channel::unbounded();
        let (notices, notices_rx) = async_channel::bounded(NOTICE_BACKLOG);
        Self {
            client,
            clock,
            rooms,
            games,
            chat,
            inbound,
            inbound_rx,
            notices,
            notices_rx,
            state: Handle::new(DispatchState::default()),
        }
    }

    pub fn notices(&self) -> Receiver<Notice> {
        self.notices_rx.clone()
    }

    /// Starts the worker and subscribes the per-session topics. Later calls are
    /// no-ops.
    pub async fn init(&self) -> Result<(), ConnectError> {
        {
            let mut state = self.state.write().await;
            if state.worker.is_none() {
                state.worker = Some(tokio::spawn(self.clone().process()));
            }
            if state.global {
                return Ok(());
            }
            state.global = true;
        }

        for route in Route::global() {
            if let Err(err) = self.subscribe_route(route).await {
                self.state.write().await.global = false;
                return Err(err);
            }
        }
        info!("session topics subscribed");
        Ok(())
    }

    /// Stops the worker and forgets every scope. Queued events are discarded.
    /// Subscriptions themselves go away with the transport's `disconnect`.
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.state.write().await;
            state.global = false;
            state.room = None;
            state.game = None;
            state.worker.take()
        };
        if let Some(worker) = worker {
            worker.abort();
        }
        while self.inbound_rx.try_recv().is_ok() {}
    }

    /// Subscribes the room's chat and lobby topics, releasing any room entered
    /// before.
    pub async fn enter_room(&self, room_id: &str) -> Result<RoomScope, ConnectError> {
        let routes = vec![
            Route::RoomChat(room_id.to_owned()),
            Route::RoomLobby(room_id.to_owned()),
        ];
        let token = self.enter(ScopeKind::Room, room_id, routes).await?;
        Ok(RoomScope::new(self.clone(), token, room_id))
    }

    /// Subscribes the game topic and, with `typing_room`, that room's typing
    /// indicator. Releases any game entered before.
    pub async fn enter_game(
        &self,
        game_id: &str,
        typing_room: Option<&str>,
    ) -> Result<GameScope, ConnectError> {
        let mut routes = vec![Route::Game(game_id.to_owned())];
        if let Some(room_id) = typing_room {
            routes.push(Route::RoomTyping(room_id.to_owned()));
        }
        let token = self.enter(ScopeKind::Game, game_id, routes).await?;
        Ok(GameScope::new(self.clone(), token, game_id))
    }

    pub async fn current_room(&self) -> Option<String> {
        let state = self.state.read().await;
        state.room.as_ref().map(|scope| scope.key.clone())
    }

    pub async fn current_game(&self) -> Option<String> {
        let state = self.state.read().await;
        state.game.as_ref().map(|scope| scope.key.clone())
    }

    pub async fn send_chat_message(&self, channel: &str, text: &str) -> bool {
        let (channel_type, room_id) = if channel == GLOBAL_CHANNEL {
            (ChannelType::Global, None)
        } else {
            let room_id = channel.strip_prefix("room-").unwrap_or(channel);
            (ChannelType::Ingame, Some(room_id.to_owned()))
        };
        self.send_command(
            topics::CHAT_SEND,
            ChatSend {
                channel_type,
                room_id,
                message: text.to_owned(),
                client_message_id: Uuid::new_v4().to_string(),
            },
        )
        .await
    }

    pub async fn send_typing(&self, room_id: &str, is_typing: bool) -> bool {
        self.send_command(
            topics::CHAT_TYPING,
            TypingUpdate {
                room_id: room_id.to_owned(),
                is_typing,
            },
        )
        .await
    }

    pub async fn use_item(&self, game_id: &str, item_id: &str, target_user_id: Option<&str>) -> bool {
        self.send_command(
            topics::ITEM_USE,
            ItemUse {
                game_id: game_id.to_owned(),
                item_id: item_id.to_owned(),
                target_user_id: target_user_id.map(str::to_owned),
            },
        )
        .await
    }

    pub async fn use_spell(&self, game_id: &str, spell_id: &str) -> bool {
        self.send_command(
            topics::SPELL_USE,
            SpellUse {
                game_id: game_id.to_owned(),
                spell_id: spell_id.to_owned(),
            },
        )
        .await
    }

    async fn send_command<T: Command>(&self, destination: &str, command: T) -> bool {
        self.client
            .send(destination, &CommandEnvelope::new(command))
            .await
    }

    async fn process(self) {
        while let Ok((route, body)) = self.inbound_rx.recv().await {
            self.dispatch(&route, body).await;
        }
    }

    /// Handles one message body received on `route`.
    pub async fn dispatch(&self, route: &Route, body: Value) {
        let envelope = match EventEnvelope::from_value(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("dropping message on {}: {}", route, err);
                return;
            }
        };
        let decoded = envelope.decode();
        let server_time = envelope.meta.server_time.or(match &decoded {
            Ok(Some(ServerEvent::TimeSync(sync))) => Some(sync.server_time),
            _ => None,
        });
        if let Some(server_time) = server_time {
            self.clock.feed_sample(server_time);
        }

        let event = match decoded {
            Ok(Some(event)) => event,
            Ok(None) => {
                debug!("ignoring {} on {}", envelope.kind, route);
                return;
            }
            Err(err) => {
                warn!("dropping message on {}: {}", route, err);
                return;
            }
        };
        self.route_event(route, event, envelope.event_id()).await;
    }

    async fn route_event(&self, route: &Route, event: ServerEvent, event_id: Option<&str>) {
        match event {
            // Already sampled above.
            ServerEvent::TimeSync(_) => {}
            ServerEvent::Error(err) => {
                error!("server error {}: {}", err.code, err.message);
                self.notify(Notice::ServerError(err));
            }
            ServerEvent::ChatMessage(message) => {
                let channel = route
                    .chat_channel()
                    .map(str::to_owned)
                    .or_else(|| message.room_id.clone())
                    .unwrap_or_else(|| GLOBAL_CHANNEL.to_owned());
                self.chat
                    .write()
                    .await
                    .receive_message(&channel, message, event_id);
            }
            ServerEvent::TypingStatusChanged(typing) => {
                self.chat
                    .write()
                    .await
                    .handle_typing_status(typing, event_id);
            }
            ServerEvent::RoomListUpsert(upsert) => {
                self.rooms.write().await.handle_room_upsert(upsert, event_id);
            }
            ServerEvent::RoomListRemoved(removed) => {
                self.rooms.write().await.handle_room_removed(removed, event_id);
            }
            ServerEvent::RoomKicked(kicked) => {
                if self.rooms.write().await.handle_kicked(&kicked, event_id) {
                    self.release_room(&kicked.room_id).await;
                    self.notify(Notice::Kicked(kicked));
                }
            }
            ServerEvent::RoomPlayerJoined(joined) => {
                self.chat
                    .write()
                    .await
                    .register_nickname(&joined.player.user.user_id, &joined.player.user.nickname);
                let notice = ServerEvent::RoomPlayerJoined(joined.clone());
                if self.rooms.write().await.handle_player_joined(joined, event_id) {
                    self.notify(Notice::Lobby(notice));
                }
            }
            ServerEvent::RoomPlayerLeft(left) => {
                let notice = ServerEvent::RoomPlayerLeft(left.clone());
                if self.rooms.write().await.handle_player_left(left, event_id) {
                    self.notify(Notice::Lobby(notice));
                }
            }
            ServerEvent::RoomPlayerStateChanged(changed) => {
                let notice = ServerEvent::RoomPlayerStateChanged(changed.clone());
                if self
                    .rooms
                    .write()
                    .await
                    .handle_player_state_changed(changed, event_id)
                {
                    self.notify(Notice::Lobby(notice));
                }
            }
            ServerEvent::RoomHostChanged(changed) => {
                let notice = ServerEvent::RoomHostChanged(changed.clone());
                if self.rooms.write().await.handle_host_changed(changed, event_id) {
                    self.notify(Notice::Lobby(notice));
                }
            }
            ServerEvent::RoomGameStarted(started) => {
                let notice = ServerEvent::RoomGameStarted(started.clone());
                if self.rooms.write().await.handle_game_started(started, event_id) {
                    self.notify(Notice::Lobby(notice));
                }
            }
            ServerEvent::InventorySync(inventory) => {
                self.games
                    .write()
                    .await
                    .handle_inventory_sync(inventory, event_id);
            }
            ServerEvent::GameStageChanged(changed) => {
                self.games.write().await.handle_stage_changed(changed, event_id);
            }
            ServerEvent::GameBanSubmitted(submitted) => {
                self.games.write().await.handle_ban_submitted(submitted, event_id);
            }
            ServerEvent::GamePickSubmitted(submitted) => {
                self.games
                    .write()
                    .await
                    .handle_pick_submitted(submitted, event_id);
            }
            ServerEvent::GameItemPurchased(purchased) => {
                self.games
                    .write()
                    .await
                    .handle_item_purchased(&purchased, event_id);
            }
            ServerEvent::GameSpellPurchased(purchased) => {
                self.games
                    .write()
                    .await
                    .handle_spell_purchased(&purchased, event_id);
            }
            ServerEvent::GameFinished(finished) => {
                self.games.write().await.handle_finished(finished, event_id);
            }
            ServerEvent::ItemEffectApplied(applied) => {
                self.games
                    .write()
                    .await
                    .handle_item_effect_applied(applied, event_id);
            }
            ServerEvent::SpellEffectApplied(applied) => {
                self.games
                    .write()
                    .await
                    .handle_spell_effect_applied(applied, event_id);
            }
            ServerEvent::ItemEffectBlocked(blocked) => {
                self.games
                    .write()
                    .await
                    .handle_item_effect_blocked(&blocked, event_id);
            }
            ServerEvent::EffectRemoved(removed) => {
                self.games
                    .write()
                    .await
                    .handle_effect_removed(&removed, event_id);
            }
        }
    }

    fn notify(&self, notice: Notice) {
        if self.notices.try_send(notice).is_err() {
            debug!("notice backlog full, dropping");
        }
    }

    async fn subscribe_route(&self, route: Route) -> Result<String, ConnectError> {
        let topic = route.topic();
        let inbound = self.inbound.clone();
        self.client
            .subscribe(&topic, move |body| {
                let _ = inbound.try_send((route.clone(), body));
            })
            .await
    }

    async fn enter(
        &self,
        kind: ScopeKind,
        key: &str,
        routes: Vec<Route>,
    ) -> Result<u64, ConnectError> {
        let (token, previous) = {
            let mut state = self.state.write().await;
            state.next_token += 1;
            let token = state.next_token;
            let previous = kind.slot(&mut state).replace(ActiveScope {
                token,
                key: key.to_owned(),
                routes: routes.clone(),
            });
            (token, previous)
        };

        if let Some(previous) = previous {
            for route in previous.routes.iter().filter(|route| !routes.contains(route)) {
                self.client.unsubscribe(&route.topic()).await;
            }
        }
        for route in routes {
            if let Err(err) = self.subscribe_route(route).await {
                self.release(kind, token).await;
                return Err(err);
            }
        }
        Ok(token)
    }

    /// Unsubscribes the scope identified by `token` if it is still the active
    /// one for `kind`. Guards from earlier scopes release nothing.
    async fn release(&self, kind: ScopeKind, token: u64) {
        let released = {
            let mut state = self.state.write().await;
            let slot = kind.slot(&mut state);
            if slot.as_ref().map(|active| active.token) == Some(token) {
                slot.take()
            } else {
                None
            }
        };
        if let Some(scope) = released {
            debug!("leaving {:?} {}", kind, scope.key);
            for route in scope.routes {
                self.client.unsubscribe(&route.topic()).await;
            }
        }
    }

    async fn release_room(&self, room_id: &str) {
        let token = {
            let state = self.state.read().await;
            state
                .room
                .as_ref()
                .filter(|scope| scope.key == room_id)
                .map(|scope| scope.token)
        };
        if let Some(token) = token {
            self.release(ScopeKind::Room, token).await;
        }
    }
}

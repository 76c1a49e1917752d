use crate::{
    client::Client,
    config::ClientConfig,
    connection_state::ConnectionState,
    dispatcher::Dispatcher,
    logic::{BearerLogic, ClientLogic, ConnectError},
    rest::{ForcedLogout, RestClient},
    stores::{ChatStore, GameActions, GameStore, RoomActions, RoomStore},
    tokens::TokenStore,
};
use arena_shared::{models::UserIdentity, timing::ServerClock};
use async_channel::Receiver;
use async_handle::Handle;
use log::{error, info};
use std::sync::Arc;

const FORCED_LOGOUT_BACKLOG: usize = 8;

/// Everything one signed-in user needs, wired together explicitly: transport,
/// clock, REST client, stores and dispatcher.
pub struct Session {
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
    client: Client,
    clock: ServerClock,
    rest: RestClient,
    rooms: RoomActions,
    games: GameActions,
    chat: Handle<ChatStore>,
    dispatcher: Dispatcher,
    forced_logouts: Receiver<ForcedLogout>,
}

impl Session {
    /// A session that authenticates the broker connection with the stored
    /// access token.
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let logic = BearerLogic::new(config.clone(), tokens.clone());
        Self::with_logic(logic, config, tokens)
    }

    pub fn with_logic<L: ClientLogic + 'static>(
        logic: L,
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let (forced_logout, forced_logouts) = async_channel::bounded(FORCED_LOGOUT_BACKLOG);
        let client = Client::new(logic, &config);
        let clock = ServerClock::new();
        let rest = RestClient::new(config.clone(), tokens.clone(), forced_logout);

        let room_store = Handle::new(RoomStore::default());
        let game_store = Handle::new(GameStore::default());
        let chat = Handle::new(ChatStore::default());
        let dispatcher = Dispatcher::new(
            client.clone(),
            clock.clone(),
            room_store.clone(),
            game_store.clone(),
            chat.clone(),
        );

        Self {
            rooms: RoomActions::new(rest.clone(), room_store),
            games: GameActions::new(rest.clone(), game_store, clock.clone()),
            config,
            tokens,
            client,
            clock,
            rest,
            chat,
            dispatcher,
            forced_logouts,
        }
    }

    /// Records who is signed in and subscribes the session topics.
    pub async fn start(&self, identity: UserIdentity) -> Result<(), ConnectError> {
        info!("starting session for {}", identity.nickname);
        self.chat.write().await.set_identity(Some(identity));
        self.dispatcher.init().await
    }

    /// Signs out locally: forgets the tokens, closes the connection and
    /// returns every store to its initial state.
    pub async fn logout(&self) {
        if let Err(err) = self.tokens.clear_tokens() {
            error!("could not clear tokens: {}", err);
        }
        self.dispatcher.shutdown().await;
        self.client.disconnect().await;
        self.clock.dispose();

        self.rooms.store().write().await.reset();
        self.games.store().write().await.reset();
        self.chat.write().await.reset();
        info!("signed out");
    }

    /// Fires whenever a REST call was rejected with 401. Tokens are already
    /// cleared by then; the listener should call [`logout`](Self::logout).
    pub fn forced_logouts(&self) -> Receiver<ForcedLogout> {
        self.forced_logouts.clone()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.client.connection_state().await
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn clock(&self) -> &ServerClock {
        &self.clock
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn rooms(&self) -> &RoomActions {
        &self.rooms
    }

    pub fn games(&self) -> &GameActions {
        &self.games
    }

    pub fn chat(&self) -> &Handle<ChatStore> {
        &self.chat
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

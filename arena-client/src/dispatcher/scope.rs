use super::{DispatchState, Dispatcher};
use arena_shared::topics::Route;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(super) enum ScopeKind {
    Room,
    Game,
}

impl ScopeKind {
    pub(super) fn slot(self, state: &mut DispatchState) -> &mut Option<ActiveScope> {
        match self {
            ScopeKind::Room => &mut state.room,
            ScopeKind::Game => &mut state.game,
        }
    }
}

pub(super) struct ActiveScope {
    pub(super) token: u64,
    pub(super) key: String,
    pub(super) routes: Vec<Route>,
}

/// Keeps a scope's subscriptions alive until released.
struct Guard {
    dispatcher: Option<Dispatcher>,
    kind: ScopeKind,
    token: u64,
}

impl Guard {
    async fn release(mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.release(self.kind, self.token).await;
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        let Some(dispatcher) = self.dispatcher.take() else {
            return;
        };
        let (kind, token) = (self.kind, self.token);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { dispatcher.release(kind, token).await });
            }
            Err(_) => log::warn!("{:?} scope dropped outside a runtime, not released", kind),
        }
    }
}

/// The chat and lobby subscriptions of one room. Released by [`leave`](Self::leave),
/// by dropping the guard, or by entering another room.
pub struct RoomScope {
    guard: Guard,
    room_id: String,
}

impl RoomScope {
    pub(super) fn new(dispatcher: Dispatcher, token: u64, room_id: &str) -> Self {
        Self {
            guard: Guard {
                dispatcher: Some(dispatcher),
                kind: ScopeKind::Room,
                token,
            },
            room_id: room_id.to_owned(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn leave(self) {
        self.guard.release().await
    }
}

/// The subscriptions of one game, optionally including a room's typing topic.
pub struct GameScope {
    guard: Guard,
    game_id: String,
}

impl GameScope {
    pub(super) fn new(dispatcher: Dispatcher, token: u64, game_id: &str) -> Self {
        Self {
            guard: Guard {
                dispatcher: Some(dispatcher),
                kind: ScopeKind::Game,
                token,
            },
            game_id: game_id.to_owned(),
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub async fn leave(self) {
        self.guard.release().await
    }
}

//! STOMP topic and destination names.

use crate::models::GLOBAL_CHANNEL;
use std::fmt;

pub const USER_ERRORS: &str = "/user/queue/errors";
pub const USER_TIME: &str = "/user/queue/time";
pub const USER_ROOM: &str = "/user/queue/room";
pub const USER_INVENTORY: &str = "/user/queue/inventory";
pub const GLOBAL_CHAT: &str = "/topic/chat/global";
pub const ROOM_LIST: &str = "/topic/rooms/list";

pub const CHAT_SEND: &str = "/app/chat.send";
pub const CHAT_TYPING: &str = "/app/chat.typing";
pub const ITEM_USE: &str = "/app/game.item.use";
pub const SPELL_USE: &str = "/app/game.spell.use";

/// Where an inbound message came from. Each route maps to exactly one topic.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Route {
    UserErrors,
    UserTime,
    UserRoom,
    UserInventory,
    GlobalChat,
    RoomList,
    RoomChat(String),
    RoomLobby(String),
    RoomTyping(String),
    Game(String),
}

impl Route {
    /// Subscribed once per session, right after login.
    pub fn global() -> [Route; 6] {
        [
            Route::UserErrors,
            Route::UserTime,
            Route::UserRoom,
            Route::UserInventory,
            Route::GlobalChat,
            Route::RoomList,
        ]
    }

    pub fn topic(&self) -> String {
        match self {
            Route::UserErrors => USER_ERRORS.to_owned(),
            Route::UserTime => USER_TIME.to_owned(),
            Route::UserRoom => USER_ROOM.to_owned(),
            Route::UserInventory => USER_INVENTORY.to_owned(),
            Route::GlobalChat => GLOBAL_CHAT.to_owned(),
            Route::RoomList => ROOM_LIST.to_owned(),
            Route::RoomChat(room_id) => format!("/topic/rooms/{}/chat", room_id),
            Route::RoomLobby(room_id) => format!("/topic/rooms/{}/lobby", room_id),
            Route::RoomTyping(room_id) => format!("/topic/rooms/{}/typing", room_id),
            Route::Game(game_id) => format!("/topic/games/{}", game_id),
        }
    }

    /// The chat channel a message on this route belongs to.
    pub fn chat_channel(&self) -> Option<&str> {
        match self {
            Route::GlobalChat => Some(GLOBAL_CHANNEL),
            Route::RoomChat(room_id) => Some(room_id),
            _ => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashset;
    use std::collections::HashSet;

    #[test]
    fn scoped_topics() {
        assert_eq!(Route::RoomChat("42".into()).topic(), "/topic/rooms/42/chat");
        assert_eq!(Route::RoomLobby("42".into()).topic(), "/topic/rooms/42/lobby");
        assert_eq!(Route::RoomTyping("42".into()).topic(), "/topic/rooms/42/typing");
        assert_eq!(Route::Game("g-7".into()).topic(), "/topic/games/g-7");
    }

    #[test]
    fn chat_channels() {
        assert_eq!(Route::GlobalChat.chat_channel(), Some("global"));
        assert_eq!(Route::RoomChat("r-1".into()).chat_channel(), Some("r-1"));
        assert_eq!(Route::RoomLobby("r-1".into()).chat_channel(), None);
    }

    #[test]
    fn global_routes_are_the_user_queues_and_shared_topics() {
        let topics: HashSet<String> = Route::global().iter().map(Route::topic).collect();
        let expected: HashSet<String> = hashset! {
            USER_ERRORS.to_owned(),
            USER_TIME.to_owned(),
            USER_ROOM.to_owned(),
            USER_INVENTORY.to_owned(),
            GLOBAL_CHAT.to_owned(),
            ROOM_LIST.to_owned(),
        };
        assert_eq!(topics, expected);
    }
}

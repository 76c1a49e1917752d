use super::UserSummary;
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameType {
    Normal,
    Ranked,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    Java,
    Python,
    Cpp,
    Javascript,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlayerState {
    Ready,
    Unready,
    Disconnected,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStage {
    Lobby,
    Ban,
    Pick,
    Shop,
    Play,
    Finished,
    /// Any stage name this client does not recognise.
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    InGame,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageRoute {
    WaitingRoom,
    BanPickShop,
    InGame,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub room_name: String,
    pub game_type: GameType,
    pub language: Language,
    pub max_players: u32,
    pub current_players: u32,
    pub room_status: RoomStatus,
    pub joinable: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub limit: u32,
    pub next_cursor: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PagedRoomList {
    pub items: Vec<RoomSummary>,
    pub page: PageCursor,
    pub list_version: u64,
}

/// Query parameters for the room list. Unset fields are left out of the query.
#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_type: Option<GameType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_status: Option<RoomStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub room_name: String,
    pub game_type: GameType,
    pub language: Language,
    pub max_players: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KickRequest {
    pub target_user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayer {
    pub user: UserSummary,
    pub state: PlayerState,
    pub is_host: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub room_id: String,
    pub room_name: String,
    pub game_type: GameType,
    pub language: Language,
    pub max_players: u32,
    pub players: Vec<RoomPlayer>,
    pub stage: GameStage,
    pub page_route: PageRoute,
}

impl RoomDetail {
    pub fn player_mut(&mut self, user_id: &str) -> Option<&mut RoomPlayer> {
        self.players
            .iter_mut()
            .find(|player| player.user.user_id == user_id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveGame {
    pub game_id: String,
    pub room_id: String,
    pub stage: GameStage,
    pub page_route: PageRoute,
    pub game_type: GameType,
    pub remaining_ms: Option<u64>,
}

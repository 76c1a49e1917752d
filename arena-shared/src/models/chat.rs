use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

pub const GLOBAL_CHANNEL: &str = "global";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Global,
    Ingame,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSender {
    pub user_id: String,
    pub nickname: String,
}

/// A chat line as the UI shows it.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub sender: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_me: bool,
}

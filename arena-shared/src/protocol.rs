use crate::models::{
    ChannelType, ChatSender, GameResult, GameStage, GameType, Inventory, PageRoute, PlayerState,
    RoomPlayer, RoomSummary,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_derive::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub server_time: Option<DateTime<Utc>>,
}

/// Every server push arrives in this envelope. The payload stays untyped until
/// [`EventEnvelope::decode`] matches the tag.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub meta: EventMeta,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed event envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl EventEnvelope {
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        serde_json::from_value(value).map_err(EnvelopeError::Envelope)
    }

    pub fn event_id(&self) -> Option<&str> {
        self.meta.event_id.as_deref()
    }

    /// `Ok(None)` for tags this client does not know yet.
    pub fn decode(&self) -> Result<Option<ServerEvent>, EnvelopeError> {
        ServerEvent::from_parts(&self.kind, self.data.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ChatMessage(ChatMessageEvent),
    RoomListUpsert(RoomListUpsertEvent),
    RoomListRemoved(RoomListRemovedEvent),
    RoomKicked(RoomKickedEvent),
    RoomPlayerJoined(RoomPlayerJoinedEvent),
    RoomPlayerLeft(RoomPlayerLeftEvent),
    RoomPlayerStateChanged(RoomPlayerStateChangedEvent),
    RoomHostChanged(RoomHostChangedEvent),
    RoomGameStarted(RoomGameStartedEvent),
    InventorySync(Inventory),
    GameStageChanged(GameStageChangedEvent),
    GameBanSubmitted(BanPickSubmittedEvent),
    GamePickSubmitted(BanPickSubmittedEvent),
    GameItemPurchased(ItemPurchasedEvent),
    GameSpellPurchased(SpellPurchasedEvent),
    GameFinished(GameFinishedEvent),
    ItemEffectApplied(ItemEffectAppliedEvent),
    SpellEffectApplied(SpellEffectAppliedEvent),
    ItemEffectBlocked(ItemEffectBlockedEvent),
    EffectRemoved(EffectRemovedEvent),
    TypingStatusChanged(TypingStatusChangedEvent),
    Error(ServerError),
    TimeSync(TimeSyncEvent),
}

impl ServerEvent {
    pub fn from_parts(kind: &str, data: Value) -> Result<Option<Self>, EnvelopeError> {
        fn parse<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, EnvelopeError> {
            serde_json::from_value(data).map_err(|source| EnvelopeError::Payload {
                kind: kind.to_owned(),
                source,
            })
        }

        let event = match kind {
            "CHAT_MESSAGE" => ServerEvent::ChatMessage(parse(kind, data)?),
            "ROOM_LIST_UPSERT" => ServerEvent::RoomListUpsert(parse(kind, data)?),
            "ROOM_LIST_REMOVED" => ServerEvent::RoomListRemoved(parse(kind, data)?),
            "ROOM_KICKED" => ServerEvent::RoomKicked(parse(kind, data)?),
            "ROOM_PLAYER_JOINED" => ServerEvent::RoomPlayerJoined(parse(kind, data)?),
            "ROOM_PLAYER_LEFT" => ServerEvent::RoomPlayerLeft(parse(kind, data)?),
            "ROOM_PLAYER_STATE_CHANGED" => ServerEvent::RoomPlayerStateChanged(parse(kind, data)?),
            "ROOM_HOST_CHANGED" => ServerEvent::RoomHostChanged(parse(kind, data)?),
            "ROOM_GAME_STARTED" => ServerEvent::RoomGameStarted(parse(kind, data)?),
            "INVENTORY_SYNC" => ServerEvent::InventorySync(parse(kind, data)?),
            "GAME_STAGE_CHANGED" => ServerEvent::GameStageChanged(parse(kind, data)?),
            "GAME_BAN_SUBMITTED" => ServerEvent::GameBanSubmitted(parse(kind, data)?),
            "GAME_PICK_SUBMITTED" => ServerEvent::GamePickSubmitted(parse(kind, data)?),
            "GAME_ITEM_PURCHASED" => ServerEvent::GameItemPurchased(parse(kind, data)?),
            "GAME_SPELL_PURCHASED" => ServerEvent::GameSpellPurchased(parse(kind, data)?),
            "GAME_FINISHED" => ServerEvent::GameFinished(parse(kind, data)?),
            "ITEM_EFFECT_APPLIED" => ServerEvent::ItemEffectApplied(parse(kind, data)?),
            "SPELL_EFFECT_APPLIED" => ServerEvent::SpellEffectApplied(parse(kind, data)?),
            "ITEM_EFFECT_BLOCKED" => ServerEvent::ItemEffectBlocked(parse(kind, data)?),
            "EFFECT_REMOVED" => ServerEvent::EffectRemoved(parse(kind, data)?),
            "TYPING_STATUS_CHANGED" => ServerEvent::TypingStatusChanged(parse(kind, data)?),
            "ERROR" => ServerEvent::Error(parse(kind, data)?),
            "TIME_SYNC" => ServerEvent::TimeSync(parse(kind, data)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageEvent {
    pub message_id: String,
    pub message: String,
    pub sender: ChatSender,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomListUpsertEvent {
    pub room: RoomSummary,
    #[serde(default)]
    pub list_version: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomListRemovedEvent {
    pub room_id: String,
    #[serde(default)]
    pub list_version: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomKickedEvent {
    pub room_id: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayerJoinedEvent {
    pub room_id: String,
    pub player: RoomPlayer,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayerLeftEvent {
    pub room_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayerStateChangedEvent {
    pub room_id: String,
    pub user_id: String,
    pub state: PlayerState,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomHostChangedEvent {
    pub room_id: String,
    pub host_user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomGameStartedEvent {
    pub room_id: String,
    pub game_id: String,
    pub game_type: GameType,
    pub stage: GameStage,
    pub page_route: PageRoute,
    pub stage_started_at: DateTime<Utc>,
    pub stage_deadline_at: DateTime<Utc>,
    pub remaining_ms: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameStageChangedEvent {
    pub game_id: String,
    pub room_id: String,
    pub game_type: GameType,
    pub stage: GameStage,
    pub stage_started_at: DateTime<Utc>,
    pub stage_deadline_at: DateTime<Utc>,
    pub remaining_ms: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanPickSubmittedEvent {
    pub game_id: String,
    pub room_id: String,
    pub user_id: String,
    pub algorithm_id: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemPurchasedEvent {
    pub game_id: String,
    pub room_id: String,
    pub user_id: String,
    pub item_id: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpellPurchasedEvent {
    pub game_id: String,
    pub room_id: String,
    pub user_id: String,
    pub spell_id: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameFinishedEvent {
    pub game_id: String,
    pub room_id: String,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<GameResult>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemEffectAppliedEvent {
    pub game_id: String,
    pub effect_id: String,
    pub item_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpellEffectAppliedEvent {
    pub game_id: String,
    pub effect_id: String,
    pub spell_id: String,
    pub user_id: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemEffectBlockedEvent {
    pub game_id: String,
    pub item_id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    #[serde(default)]
    pub blocked_by_spell_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EffectRemovedEvent {
    pub game_id: String,
    pub effect_id: String,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatusChangedEvent {
    pub room_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerError {
    pub code: String,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeSyncEvent {
    pub server_time: DateTime<Utc>,
}

/// A client → server command payload.
pub trait Command: serde::Serialize {
    const KIND: &'static str;
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommandMeta {
    pub command_id: Uuid,
    pub client_time: DateTime<Utc>,
}

impl CommandMeta {
    pub fn now() -> Self {
        Self {
            command_id: Uuid::new_v4(),
            client_time: crate::timing::current_timestamp(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct CommandEnvelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: T,
    pub meta: CommandMeta,
}

impl<T: Command> CommandEnvelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            kind: T::KIND.to_owned(),
            data,
            meta: CommandMeta::now(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSend {
    pub channel_type: ChannelType,
    pub room_id: Option<String>,
    pub message: String,
    pub client_message_id: String,
}

impl Command for ChatSend {
    const KIND: &'static str = "CHAT_SEND";
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub room_id: String,
    pub is_typing: bool,
}

impl Command for TypingUpdate {
    const KIND: &'static str = "TYPING_UPDATE";
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemUse {
    pub game_id: String,
    pub item_id: String,
    pub target_user_id: Option<String>,
}

impl Command for ItemUse {
    const KIND: &'static str = "ITEM_USE";
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpellUse {
    pub game_id: String,
    pub spell_id: String,
}

impl Command for SpellUse {
    const KIND: &'static str = "SPELL_USE";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_typed_event() {
        let envelope = EventEnvelope::from_value(json!({
            "type": "GAME_BAN_SUBMITTED",
            "data": {
                "gameId": "g-1",
                "roomId": "r-1",
                "userId": "u-1",
                "algorithmId": "dp",
                "submittedAt": "2024-05-01T10:00:00Z"
            },
            "meta": { "eventId": "e-1", "serverTime": "2024-05-01T10:00:00.250Z" }
        }))
        .unwrap();

        assert_eq!(envelope.event_id(), Some("e-1"));
        assert!(envelope.meta.server_time.is_some());
        match envelope.decode().unwrap() {
            Some(ServerEvent::GameBanSubmitted(event)) => {
                assert_eq!(event.algorithm_id, "dp");
                assert_eq!(event.user_id, "u-1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_tags_are_not_errors() {
        let envelope = EventEnvelope::from_value(json!({
            "type": "GAME_EMOTE_SENT",
            "data": { "emote": "gg" }
        }))
        .unwrap();
        assert_eq!(envelope.meta, EventMeta::default());
        assert!(envelope.decode().unwrap().is_none());
    }

    #[test]
    fn unrecognised_enum_values_still_decode() {
        let envelope = EventEnvelope::from_value(json!({
            "type": "GAME_STAGE_CHANGED",
            "data": {
                "gameId": "g-1",
                "roomId": "r-1",
                "gameType": "TOURNAMENT",
                "stage": "OVERTIME",
                "stageStartedAt": "2024-05-01T10:00:00Z",
                "stageDeadlineAt": "2024-05-01T10:00:30Z",
                "remainingMs": 30000
            }
        }))
        .unwrap();
        match envelope.decode().unwrap() {
            Some(ServerEvent::GameStageChanged(event)) => {
                assert_eq!(event.stage, GameStage::Unknown);
                assert_eq!(event.game_type, GameType::Unknown);
                assert_eq!(event.remaining_ms, 30_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn malformed_payloads_name_their_tag() {
        let envelope = EventEnvelope::from_value(json!({
            "type": "TYPING_STATUS_CHANGED",
            "data": { "roomId": "r-1" }
        }))
        .unwrap();
        match envelope.decode() {
            Err(EnvelopeError::Payload { kind, .. }) => assert_eq!(kind, "TYPING_STATUS_CHANGED"),
            other => panic!("unexpected {:?}", other),
        }

        assert!(EventEnvelope::from_value(json!(["not", "an", "envelope"])).is_err());
    }

    #[test]
    fn command_envelope_wire_shape() {
        let envelope = CommandEnvelope::new(TypingUpdate {
            room_id: "r-9".to_owned(),
            is_typing: true,
        });
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["type"], "TYPING_UPDATE");
        assert_eq!(value["data"], json!({ "roomId": "r-9", "isTyping": true }));
        assert!(value["meta"]["commandId"].is_string());
        assert!(value["meta"]["clientTime"].is_string());

        let other = CommandEnvelope::new(SpellUse {
            game_id: "g".to_owned(),
            spell_id: "shield".to_owned(),
        });
        assert_ne!(envelope.meta.command_id, other.meta.command_id);
    }
}

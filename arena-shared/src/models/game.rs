use super::{GameStage, GameType, Language};
use chrono::{DateTime, Utc};
use serde_derive::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GamePlayer {
    pub user_id: String,
    pub nickname: String,
    pub score: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InventorySpell {
    pub spell_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub items: Vec<InventoryItem>,
    #[serde(default)]
    pub spells: Vec<InventorySpell>,
}

/// Authoritative game snapshot returned by every game REST endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub room_id: String,
    pub game_type: GameType,
    pub stage: GameStage,
    pub remaining_ms: i64,
    pub players: Vec<GamePlayer>,
    pub coin: i64,
    pub inventory: Inventory,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanPickRequest {
    pub algorithm_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopItemRequest {
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopSpellRequest {
    pub spell_id: String,
    pub quantity: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    pub language: Language,
    pub source_code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BanPickEntry {
    pub user_id: String,
    pub algorithm_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchResult {
    Win,
    Lose,
    Draw,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameResult {
    pub user_id: String,
    pub nickname: String,
    pub result: MatchResult,
    pub rank_in_game: u32,
    pub score_delta: i64,
    pub coin_delta: i64,
    pub exp_delta: i64,
    pub final_score_value: i64,
    pub solved: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EffectSource {
    Item,
    Spell,
    #[serde(other)]
    Unknown,
}

/// An item or spell effect currently applied to a player.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEffect {
    pub effect_id: String,
    pub source: EffectSource,
    /// The item or spell that produced the effect.
    pub source_id: String,
    pub target_user_id: String,
    pub expires_at: Option<DateTime<Utc>>,
}

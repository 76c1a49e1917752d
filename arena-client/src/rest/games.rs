use super::{ApiError, RestClient};
use arena_shared::models::{
    BanPickRequest, GameState, ShopItemRequest, ShopSpellRequest, SubmissionRequest,
};

// Every game endpoint answers with the full authoritative snapshot.
impl RestClient {
    pub async fn game_state(&self, game_id: &str) -> Result<GameState, ApiError> {
        self.get(&format!("/games/{}/state", game_id)).await
    }

    pub async fn submit_ban(
        &self,
        game_id: &str,
        request: &BanPickRequest,
    ) -> Result<GameState, ApiError> {
        self.post(&format!("/games/{}/ban", game_id), request).await
    }

    pub async fn submit_pick(
        &self,
        game_id: &str,
        request: &BanPickRequest,
    ) -> Result<GameState, ApiError> {
        self.post(&format!("/games/{}/pick", game_id), request).await
    }

    pub async fn purchase_item(
        &self,
        game_id: &str,
        request: &ShopItemRequest,
    ) -> Result<GameState, ApiError> {
        self.post(&format!("/games/{}/shop/items", game_id), request)
            .await
    }

    pub async fn purchase_spell(
        &self,
        game_id: &str,
        request: &ShopSpellRequest,
    ) -> Result<GameState, ApiError> {
        self.post(&format!("/games/{}/shop/spells", game_id), request)
            .await
    }

    pub async fn submit_code(
        &self,
        game_id: &str,
        request: &SubmissionRequest,
    ) -> Result<GameState, ApiError> {
        self.post(&format!("/games/{}/submissions", game_id), request)
            .await
    }
}

use super::{ApiError, RestClient};
use arena_shared::models::{
    ActiveGame, CreateRoomRequest, KickRequest, PagedRoomList, RoomDetail, RoomFilter,
};
use serde::de::IgnoredAny;

impl RestClient {
    pub async fn list_rooms(&self, filter: &RoomFilter) -> Result<PagedRoomList, ApiError> {
        self.get_with_query("/rooms", filter).await
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomDetail, ApiError> {
        self.post("/rooms", request).await
    }

    pub async fn room_detail(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        self.get(&format!("/rooms/{}", room_id)).await
    }

    pub async fn join_room(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        self.post_empty(&format!("/rooms/{}/join", room_id)).await
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), ApiError> {
        self.post_empty::<IgnoredAny>(&format!("/rooms/{}/leave", room_id))
            .await
            .map(|_| ())
    }

    pub async fn ready(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        self.post_empty(&format!("/rooms/{}/ready", room_id)).await
    }

    pub async fn unready(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        self.post_empty(&format!("/rooms/{}/unready", room_id)).await
    }

    pub async fn start_game(&self, room_id: &str) -> Result<ActiveGame, ApiError> {
        self.post_empty(&format!("/rooms/{}/start", room_id)).await
    }

    pub async fn kick_player(&self, room_id: &str, target_user_id: &str) -> Result<(), ApiError> {
        let request = KickRequest {
            target_user_id: target_user_id.to_owned(),
        };
        self.post::<IgnoredAny, _>(&format!("/rooms/{}/kick", room_id), &request)
            .await
            .map(|_| ())
    }
}

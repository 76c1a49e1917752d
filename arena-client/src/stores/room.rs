use super::dedup::RecentEventIds;
use crate::rest::{ApiError, RestClient};
use arena_shared::{
    models::{ActiveGame, CreateRoomRequest, PagedRoomList, RoomDetail, RoomFilter, RoomSummary},
    protocol::{
        RoomGameStartedEvent, RoomHostChangedEvent, RoomKickedEvent, RoomListRemovedEvent,
        RoomListUpsertEvent, RoomPlayerJoinedEvent, RoomPlayerLeftEvent,
        RoomPlayerStateChangedEvent,
    },
};
use async_handle::Handle;
use log::debug;

/// The lobby list plus the room the user is currently in.
///
/// The focused room id is the context for the stale-response guard: room
/// detail or active-game responses for any other room are dropped. Joins
/// only move the focus once the server accepts them, and a join answered
/// after a later navigation is dropped.
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: Vec<RoomSummary>,
    list_version: u64,
    navigation: u64,
    focused_room: Option<String>,
    current_room: Option<RoomDetail>,
    active_game: Option<ActiveGame>,
    seen: RecentEventIds,
}

impl RoomStore {
    pub fn rooms(&self) -> &[RoomSummary] {
        &self.rooms
    }

    pub fn room(&self, room_id: &str) -> Option<&RoomSummary> {
        self.rooms.iter().find(|room| room.room_id == room_id)
    }

    pub fn list_version(&self) -> u64 {
        self.list_version
    }

    pub fn focused_room_id(&self) -> Option<&str> {
        self.focused_room.as_deref()
    }

    pub fn current_room(&self) -> Option<&RoomDetail> {
        self.current_room.as_ref()
    }

    pub fn active_game(&self) -> Option<&ActiveGame> {
        self.active_game.as_ref()
    }

    pub fn apply_room_list(&mut self, list: PagedRoomList) {
        self.rooms = list.items;
        self.list_version = list.list_version;
    }

    pub fn focus_room(&mut self, room_id: &str) {
        self.navigation += 1;
        self.set_focus(room_id);
    }

    /// Starts a navigation whose outcome is not known yet. The focus stays
    /// where it is; pass the ticket to [`complete_navigation`](Self::complete_navigation).
    pub fn begin_navigation(&mut self) -> u64 {
        self.navigation += 1;
        self.navigation
    }

    /// Focuses the room in `detail` unless another navigation started after
    /// `ticket` was issued.
    pub fn complete_navigation(&mut self, ticket: u64, detail: RoomDetail) -> bool {
        if ticket != self.navigation {
            debug!("dropping superseded detail for room {}", detail.room_id);
            return false;
        }
        self.set_focus(&detail.room_id);
        self.current_room = Some(detail);
        true
    }

    /// Clears the room context if it still points at `room_id`.
    pub fn unfocus_room(&mut self, room_id: &str) -> bool {
        if self.focused_room.as_deref() != Some(room_id) {
            return false;
        }
        self.navigation += 1;
        self.focused_room = None;
        self.current_room = None;
        self.active_game = None;
        true
    }

    pub fn apply_room_detail(&mut self, detail: RoomDetail) -> bool {
        if self.focused_room.as_deref() != Some(detail.room_id.as_str()) {
            debug!("dropping stale detail for room {}", detail.room_id);
            return false;
        }
        self.current_room = Some(detail);
        true
    }

    pub fn apply_active_game(&mut self, game: ActiveGame) -> bool {
        if self.focused_room.as_deref() != Some(game.room_id.as_str()) {
            debug!("dropping stale game start for room {}", game.room_id);
            return false;
        }
        self.active_game = Some(game);
        true
    }

    pub fn handle_room_upsert(&mut self, event: RoomListUpsertEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.accept_list_version(event.list_version) {
            return false;
        }

        let room = event.room;
        match self.rooms.iter_mut().find(|existing| existing.room_id == room.room_id) {
            Some(existing) => *existing = room,
            None => self.rooms.insert(0, room),
        }
        true
    }

    pub fn handle_room_removed(&mut self, event: RoomListRemovedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.accept_list_version(event.list_version) {
            return false;
        }
        self.rooms.retain(|room| room.room_id != event.room_id);
        true
    }

    pub fn handle_player_joined(&mut self, event: RoomPlayerJoinedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        let Some(room) = self.current_room_for(&event.room_id) else {
            return false;
        };
        match room.player_mut(&event.player.user.user_id) {
            Some(player) => *player = event.player,
            None => room.players.push(event.player),
        }
        true
    }

    pub fn handle_player_left(&mut self, event: RoomPlayerLeftEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        let Some(room) = self.current_room_for(&event.room_id) else {
            return false;
        };
        room.players.retain(|player| player.user.user_id != event.user_id);
        true
    }

    pub fn handle_player_state_changed(
        &mut self,
        event: RoomPlayerStateChangedEvent,
        event_id: Option<&str>,
    ) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        let Some(player) = self
            .current_room_for(&event.room_id)
            .and_then(|room| room.player_mut(&event.user_id))
        else {
            return false;
        };
        player.state = event.state;
        true
    }

    pub fn handle_host_changed(&mut self, event: RoomHostChangedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        let Some(room) = self.current_room_for(&event.room_id) else {
            return false;
        };
        for player in &mut room.players {
            player.is_host = player.user.user_id == event.host_user_id;
        }
        true
    }

    pub fn handle_game_started(&mut self, event: RoomGameStartedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        if let Some(room) = self.current_room_for(&event.room_id) {
            room.stage = event.stage;
            room.page_route = event.page_route;
        }
        self.apply_active_game(ActiveGame {
            game_id: event.game_id,
            room_id: event.room_id,
            stage: event.stage,
            page_route: event.page_route,
            game_type: event.game_type,
            remaining_ms: Some(event.remaining_ms.max(0) as u64),
        })
    }

    pub fn handle_kicked(&mut self, event: &RoomKickedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        self.unfocus_room(&event.room_id)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn set_focus(&mut self, room_id: &str) {
        if self.focused_room.as_deref() != Some(room_id) {
            self.focused_room = Some(room_id.to_owned());
            self.current_room = None;
            self.active_game = None;
        }
    }

    fn current_room_for(&mut self, room_id: &str) -> Option<&mut RoomDetail> {
        self.current_room
            .as_mut()
            .filter(|room| room.room_id == room_id)
    }

    fn accept_list_version(&mut self, version: Option<u64>) -> bool {
        match version {
            Some(version) if version < self.list_version => {
                debug!(
                    "dropping list event at version {} (holding {})",
                    version, self.list_version
                );
                false
            }
            Some(version) => {
                self.list_version = version;
                true
            }
            None => true,
        }
    }
}

/// REST-driven room actions. Each applies the authoritative response to the
/// store and hands it back; failures leave the store untouched.
#[derive(Clone)]
pub struct RoomActions {
    rest: RestClient,
    store: Handle<RoomStore>,
}

impl RoomActions {
    pub fn new(rest: RestClient, store: Handle<RoomStore>) -> Self {
        Self { rest, store }
    }

    pub fn store(&self) -> &Handle<RoomStore> {
        &self.store
    }

    pub async fn fetch_rooms(&self, filter: &RoomFilter) -> Result<(), ApiError> {
        let list = self.rest.list_rooms(filter).await?;
        self.store.write().await.apply_room_list(list);
        Ok(())
    }

    pub async fn create_room(&self, request: &CreateRoomRequest) -> Result<RoomDetail, ApiError> {
        let ticket = self.store.write().await.begin_navigation();
        let detail = self.rest.create_room(request).await?;
        self.store
            .write()
            .await
            .complete_navigation(ticket, detail.clone());
        Ok(detail)
    }

    pub async fn get_room_detail(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        let ticket = self.store.write().await.begin_navigation();
        let detail = self.rest.room_detail(room_id).await?;
        self.store
            .write()
            .await
            .complete_navigation(ticket, detail.clone());
        Ok(detail)
    }

    pub async fn join_room(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        let ticket = self.store.write().await.begin_navigation();
        let detail = self.rest.join_room(room_id).await?;
        self.store
            .write()
            .await
            .complete_navigation(ticket, detail.clone());
        Ok(detail)
    }

    pub async fn leave_room(&self, room_id: &str) -> Result<(), ApiError> {
        self.rest.leave_room(room_id).await?;
        self.store.write().await.unfocus_room(room_id);
        Ok(())
    }

    pub async fn ready(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        let detail = self.rest.ready(room_id).await?;
        self.store.write().await.apply_room_detail(detail.clone());
        Ok(detail)
    }

    pub async fn unready(&self, room_id: &str) -> Result<RoomDetail, ApiError> {
        let detail = self.rest.unready(room_id).await?;
        self.store.write().await.apply_room_detail(detail.clone());
        Ok(detail)
    }

    pub async fn start_game(&self, room_id: &str) -> Result<ActiveGame, ApiError> {
        let game = self.rest.start_game(room_id).await?;
        self.store.write().await.apply_active_game(game.clone());
        Ok(game)
    }

    pub async fn kick_player(&self, room_id: &str, target_user_id: &str) -> Result<(), ApiError> {
        self.rest.kick_player(room_id, target_user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rest::tests::*, tokens::MemoryTokenStore};
    use arena_shared::models::{
        GameStage, GameType, Language, PageCursor, PageRoute, PlayerState, RoomPlayer,
        RoomStatus, UserSummary,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn summary(room_id: &str, name: &str, players: u32) -> RoomSummary {
        RoomSummary {
            room_id: room_id.to_owned(),
            room_name: name.to_owned(),
            game_type: GameType::Normal,
            language: Language::Python,
            max_players: 4,
            current_players: players,
            room_status: RoomStatus::Waiting,
            joinable: true,
            updated_at: "2024-05-01T10:00:00Z".parse().unwrap(),
        }
    }

    fn player(user_id: &str, is_host: bool) -> RoomPlayer {
        RoomPlayer {
            user: UserSummary {
                user_id: user_id.to_owned(),
                nickname: format!("nick-{}", user_id),
                tier: "GOLD".to_owned(),
                score: 1200,
            },
            state: PlayerState::Unready,
            is_host,
        }
    }

    fn detail(room_id: &str) -> RoomDetail {
        RoomDetail {
            room_id: room_id.to_owned(),
            room_name: "algo night".to_owned(),
            game_type: GameType::Normal,
            language: Language::Python,
            max_players: 4,
            players: vec![player("u-1", true)],
            stage: GameStage::Lobby,
            page_route: PageRoute::WaitingRoom,
        }
    }

    fn upsert(room: RoomSummary, list_version: Option<u64>) -> RoomListUpsertEvent {
        RoomListUpsertEvent { room, list_version }
    }

    #[test]
    fn upsert_prepends_then_replaces_in_place() {
        let mut store = RoomStore::default();
        store.apply_room_list(PagedRoomList {
            items: vec![summary("r-1", "first", 1)],
            page: PageCursor {
                limit: 20,
                next_cursor: None,
            },
            list_version: 3,
        });

        assert!(store.handle_room_upsert(upsert(summary("r-2", "second", 1), None), Some("e-1")));
        let ids: Vec<_> = store.rooms().iter().map(|room| room.room_id.as_str()).collect();
        assert_eq!(ids, ["r-2", "r-1"]);

        assert!(store.handle_room_upsert(upsert(summary("r-1", "renamed", 3), None), Some("e-2")));
        let ids: Vec<_> = store.rooms().iter().map(|room| room.room_id.as_str()).collect();
        assert_eq!(ids, ["r-2", "r-1"]);
        assert_eq!(store.room("r-1").unwrap().room_name, "renamed");
        assert_eq!(store.room("r-1").unwrap().current_players, 3);
    }

    #[test]
    fn duplicate_events_are_ignored() {
        let mut store = RoomStore::default();
        assert!(store.handle_room_upsert(upsert(summary("r-1", "a", 1), None), Some("e-1")));
        assert!(store.handle_room_removed(
            RoomListRemovedEvent {
                room_id: "r-1".to_owned(),
                list_version: None,
            },
            Some("e-2"),
        ));
        assert!(store.rooms().is_empty());

        // Redelivery of the upsert after the removal must not resurrect the room.
        assert!(!store.handle_room_upsert(upsert(summary("r-1", "a", 1), None), Some("e-1")));
        assert!(store.rooms().is_empty());
    }

    #[test]
    fn older_list_versions_are_rejected() {
        let mut store = RoomStore::default();
        assert!(store.handle_room_upsert(upsert(summary("r-1", "new", 2), Some(10)), Some("e-1")));
        assert!(!store.handle_room_upsert(upsert(summary("r-1", "old", 1), Some(9)), Some("e-2")));
        assert_eq!(store.room("r-1").unwrap().room_name, "new");
        assert_eq!(store.list_version(), 10);

        assert!(!store.handle_room_removed(
            RoomListRemovedEvent {
                room_id: "r-1".to_owned(),
                list_version: Some(8),
            },
            Some("e-3"),
        ));
        assert_eq!(store.rooms().len(), 1);

        assert!(store.handle_room_upsert(upsert(summary("r-1", "newer", 2), Some(10)), Some("e-4")));
        assert_eq!(store.room("r-1").unwrap().room_name, "newer");
    }

    #[test]
    fn detail_for_another_room_is_stale() {
        let mut store = RoomStore::default();
        store.focus_room("r-2");
        assert!(!store.apply_room_detail(detail("r-1")));
        assert!(store.current_room().is_none());

        assert!(store.apply_room_detail(detail("r-2")));
        assert_eq!(store.current_room().unwrap().room_id, "r-2");

        store.focus_room("r-3");
        assert!(store.current_room().is_none());
    }

    #[test]
    fn lobby_events_patch_the_current_room() {
        let mut store = RoomStore::default();
        store.focus_room("r-1");
        store.apply_room_detail(detail("r-1"));

        assert!(store.handle_player_joined(
            RoomPlayerJoinedEvent {
                room_id: "r-1".to_owned(),
                player: player("u-2", false),
            },
            Some("e-1"),
        ));
        assert!(store.handle_player_state_changed(
            RoomPlayerStateChangedEvent {
                room_id: "r-1".to_owned(),
                user_id: "u-2".to_owned(),
                state: PlayerState::Ready,
            },
            Some("e-2"),
        ));
        assert!(store.handle_host_changed(
            RoomHostChangedEvent {
                room_id: "r-1".to_owned(),
                host_user_id: "u-2".to_owned(),
            },
            Some("e-3"),
        ));
        assert!(store.handle_player_left(
            RoomPlayerLeftEvent {
                room_id: "r-1".to_owned(),
                user_id: "u-1".to_owned(),
            },
            Some("e-4"),
        ));
        // Events for other rooms never touch the current one.
        assert!(!store.handle_player_left(
            RoomPlayerLeftEvent {
                room_id: "r-9".to_owned(),
                user_id: "u-2".to_owned(),
            },
            Some("e-5"),
        ));

        let room = store.current_room().unwrap();
        assert_eq!(room.players.len(), 1);
        assert_eq!(room.players[0].user.user_id, "u-2");
        assert_eq!(room.players[0].state, PlayerState::Ready);
        assert!(room.players[0].is_host);
    }

    #[test]
    fn game_start_and_kick() {
        let mut store = RoomStore::default();
        store.focus_room("r-1");
        store.apply_room_detail(detail("r-1"));

        let started = RoomGameStartedEvent {
            room_id: "r-1".to_owned(),
            game_id: "g-1".to_owned(),
            game_type: GameType::Ranked,
            stage: GameStage::Ban,
            page_route: PageRoute::BanPickShop,
            stage_started_at: "2024-05-01T10:00:00Z".parse().unwrap(),
            stage_deadline_at: "2024-05-01T10:00:30Z".parse().unwrap(),
            remaining_ms: 30_000,
        };
        assert!(store.handle_game_started(started, Some("e-1")));
        let game = store.active_game().unwrap();
        assert_eq!(game.game_id, "g-1");
        assert_eq!(game.remaining_ms, Some(30_000));
        assert_eq!(store.current_room().unwrap().page_route, PageRoute::BanPickShop);

        let kicked = RoomKickedEvent {
            room_id: "r-1".to_owned(),
            reason: None,
        };
        assert!(store.handle_kicked(&kicked, Some("e-2")));
        assert!(store.focused_room_id().is_none());
        assert!(store.current_room().is_none());
        assert!(store.active_game().is_none());
    }

    fn detail_json(room_id: &str) -> String {
        json!({
            "data": {
                "roomId": room_id,
                "roomName": "algo night",
                "gameType": "NORMAL",
                "language": "PYTHON",
                "maxPlayers": 4,
                "players": [{
                    "user": { "userId": "u-1", "nickname": "ada", "tier": "GOLD", "score": 1200 },
                    "state": "READY",
                    "isHost": true
                }],
                "stage": "LOBBY",
                "pageRoute": "WAITING_ROOM"
            },
            "meta": {}
        })
        .to_string()
    }

    #[tokio::test]
    async fn join_then_ready_applies_authoritative_detail() {
        let (addr, requests) =
            canned_server(vec![(200, detail_json("r-1")), (200, detail_json("r-1"))]).await;
        let (rest, _logouts) = rest_client_for(addr, Arc::new(MemoryTokenStore::new()));
        let actions = RoomActions::new(rest, Handle::new(RoomStore::default()));

        actions.join_room("r-1").await.unwrap();
        assert!(requests.recv().await.unwrap().starts_with("POST /api/v1/rooms/r-1/join "));
        assert_eq!(actions.store().read().await.focused_room_id(), Some("r-1"));

        actions.ready("r-1").await.unwrap();
        let store = actions.store().read().await;
        assert_eq!(store.current_room().unwrap().players[0].state, PlayerState::Ready);
    }

    #[tokio::test]
    async fn response_after_navigating_away_is_dropped() {
        let (addr, _requests) = canned_server(vec![(200, detail_json("r-1"))]).await;
        let (rest, _logouts) = rest_client_for(addr, Arc::new(MemoryTokenStore::new()));
        let store = Handle::new(RoomStore::default());
        store.write().await.focus_room("r-2");
        let actions = RoomActions::new(rest, store);

        // The caller still gets the response; the store ignores it.
        let detail = actions.ready("r-1").await.unwrap();
        assert_eq!(detail.room_id, "r-1");
        assert!(actions.store().read().await.current_room().is_none());
    }

    #[tokio::test]
    async fn failed_actions_leave_the_store_alone() {
        let body = json!({ "error": { "code": "ROOM_FULL", "message": "full" } }).to_string();
        let (addr, _requests) = canned_server(vec![(409, body)]).await;
        let (rest, _logouts) = rest_client_for(addr, Arc::new(MemoryTokenStore::new()));
        let actions = RoomActions::new(rest, Handle::new(RoomStore::default()));

        let err = actions.join_room("r-1").await.unwrap_err();
        assert_eq!(err.code(), Some("ROOM_FULL"));
        assert!(actions.store().read().await.current_room().is_none());
    }

    #[tokio::test]
    async fn failed_join_keeps_the_room_we_are_in() {
        let body = json!({ "error": { "code": "ROOM_FULL", "message": "full" } }).to_string();
        let (addr, _requests) =
            canned_server(vec![(200, detail_json("r-1")), (409, body.clone()), (409, body)]).await;
        let (rest, _logouts) = rest_client_for(addr, Arc::new(MemoryTokenStore::new()));
        let actions = RoomActions::new(rest, Handle::new(RoomStore::default()));
        actions.join_room("r-1").await.unwrap();

        actions.join_room("r-2").await.unwrap_err();
        actions.get_room_detail("r-2").await.unwrap_err();

        let store = actions.store().read().await;
        assert_eq!(store.focused_room_id(), Some("r-1"));
        assert_eq!(store.current_room().unwrap().room_id, "r-1");
    }

    #[test]
    fn superseded_join_is_dropped() {
        let mut store = RoomStore::default();
        let first = store.begin_navigation();
        let second = store.begin_navigation();

        assert!(!store.complete_navigation(first, detail("r-1")));
        assert!(store.focused_room_id().is_none());

        assert!(store.complete_navigation(second, detail("r-2")));
        assert_eq!(store.current_room().unwrap().room_id, "r-2");

        let pending = store.begin_navigation();
        store.focus_room("r-3");
        assert!(!store.complete_navigation(pending, detail("r-4")));
        assert_eq!(store.focused_room_id(), Some("r-3"));
    }
}

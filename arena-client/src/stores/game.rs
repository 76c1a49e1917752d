use super::dedup::RecentEventIds;
use crate::rest::{ApiError, RestClient};
use arena_shared::{
    chrono::{DateTime, Duration, Utc},
    models::{
        ActiveEffect, BanPickEntry, BanPickRequest, EffectSource, GameStage, GameState,
        Inventory, ShopItemRequest, ShopSpellRequest, SubmissionRequest,
    },
    protocol::{
        BanPickSubmittedEvent, EffectRemovedEvent, GameFinishedEvent, GameStageChangedEvent,
        ItemEffectAppliedEvent, ItemEffectBlockedEvent, ItemPurchasedEvent,
        SpellEffectAppliedEvent, SpellPurchasedEvent,
    },
    timing::ServerClock,
};
use async_handle::Handle;
use log::{debug, info, warn};

/// Everything the ban/pick/shop and in-game screens read.
///
/// Coin and inventory only move through authoritative REST snapshots and
/// `INVENTORY_SYNC`; purchase broadcasts are informational.
#[derive(Debug, Default)]
pub struct GameStore {
    state: Option<GameState>,
    navigation: u64,
    focused_game: Option<String>,
    stage_deadline_at: Option<DateTime<Utc>>,
    bans: Vec<BanPickEntry>,
    picks: Vec<BanPickEntry>,
    result: Option<GameFinishedEvent>,
    effects: Vec<ActiveEffect>,
    seen: RecentEventIds,
}

impl GameStore {
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn game_id(&self) -> Option<&str> {
        self.focused_game.as_deref()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.state.as_ref().map(|state| state.room_id.as_str())
    }

    pub fn stage(&self) -> Option<GameStage> {
        self.state.as_ref().map(|state| state.stage)
    }

    pub fn coin(&self) -> Option<i64> {
        self.state.as_ref().map(|state| state.coin)
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.state.as_ref().map(|state| &state.inventory)
    }

    pub fn stage_deadline_at(&self) -> Option<DateTime<Utc>> {
        self.stage_deadline_at
    }

    /// Milliseconds left in the current stage according to the server clock.
    pub fn remaining_ms(&self, clock: &ServerClock) -> Option<u64> {
        self.stage_deadline_at
            .map(|deadline| clock.estimate_remaining_ms(deadline))
    }

    pub fn bans(&self) -> &[BanPickEntry] {
        &self.bans
    }

    pub fn picks(&self) -> &[BanPickEntry] {
        &self.picks
    }

    pub fn result(&self) -> Option<&GameFinishedEvent> {
        self.result.as_ref()
    }

    pub fn effects(&self) -> &[ActiveEffect] {
        &self.effects
    }

    pub fn effects_on(&self, user_id: &str) -> impl Iterator<Item = &ActiveEffect> + '_ {
        let user_id = user_id.to_owned();
        self.effects
            .iter()
            .filter(move |effect| effect.target_user_id == user_id)
    }

    /// Switches the game context. Everything scoped to the previous game is
    /// dropped.
    pub fn focus_game(&mut self, game_id: &str) {
        self.navigation += 1;
        self.set_focus(game_id);
    }

    /// Starts loading a game without leaving the current one.
    pub fn begin_navigation(&mut self) -> u64 {
        self.navigation += 1;
        self.navigation
    }

    /// Focuses the snapshot's game and applies it, unless another navigation
    /// started after `ticket` was issued.
    pub fn complete_navigation(
        &mut self,
        ticket: u64,
        state: GameState,
        server_now: DateTime<Utc>,
    ) -> bool {
        if ticket != self.navigation {
            debug!("dropping superseded state for game {}", state.game_id);
            return false;
        }
        self.set_focus(&state.game_id);
        self.apply_state(state, server_now)
    }

    /// Applies an authoritative snapshot taken at `server_now`. Snapshots for a
    /// game other than the focused one are dropped.
    pub fn apply_state(&mut self, state: GameState, server_now: DateTime<Utc>) -> bool {
        if self.focused_game.as_deref() != Some(state.game_id.as_str()) {
            debug!("dropping stale state for game {}", state.game_id);
            return false;
        }
        if state.remaining_ms > 0 {
            match server_now.checked_add_signed(Duration::milliseconds(state.remaining_ms)) {
                Some(deadline) => self.stage_deadline_at = Some(deadline),
                None => warn!(
                    "ignoring out of range remainingMs {} for game {}",
                    state.remaining_ms, state.game_id
                ),
            }
        }
        self.state = Some(state);
        true
    }

    pub fn handle_stage_changed(&mut self, event: GameStageChangedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }

        self.stage_deadline_at = Some(event.stage_deadline_at);
        match event.stage {
            GameStage::Ban => self.bans.clear(),
            GameStage::Pick => self.picks.clear(),
            _ => {}
        }
        if let Some(state) = &mut self.state {
            state.stage = event.stage;
            state.game_type = event.game_type;
            state.remaining_ms = event.remaining_ms;
        }
        true
    }

    pub fn handle_ban_submitted(&mut self, event: BanPickSubmittedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        self.bans.push(BanPickEntry {
            user_id: event.user_id,
            algorithm_id: event.algorithm_id,
        });
        true
    }

    pub fn handle_pick_submitted(&mut self, event: BanPickSubmittedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        self.picks.push(BanPickEntry {
            user_id: event.user_id,
            algorithm_id: event.algorithm_id,
        });
        true
    }

    pub fn handle_item_purchased(&mut self, event: &ItemPurchasedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        debug!(
            "{} bought {}x {} in game {}",
            event.user_id, event.quantity, event.item_id, event.game_id
        );
        false
    }

    pub fn handle_spell_purchased(&mut self, event: &SpellPurchasedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        debug!(
            "{} bought {}x {} in game {}",
            event.user_id, event.quantity, event.spell_id, event.game_id
        );
        false
    }

    /// Inventory pushes arrive on the user queue and carry no game id.
    pub fn handle_inventory_sync(&mut self, inventory: Inventory, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        match &mut self.state {
            Some(state) => {
                state.inventory = inventory;
                true
            }
            None => false,
        }
    }

    pub fn handle_finished(&mut self, event: GameFinishedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        if let Some(state) = &mut self.state {
            state.stage = GameStage::Finished;
            state.remaining_ms = 0;
        }
        self.stage_deadline_at = None;
        self.result = Some(event);
        true
    }

    pub fn handle_item_effect_applied(
        &mut self,
        event: ItemEffectAppliedEvent,
        event_id: Option<&str>,
    ) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        self.add_effect(ActiveEffect {
            effect_id: event.effect_id,
            source: EffectSource::Item,
            source_id: event.item_id,
            target_user_id: event.to_user_id,
            expires_at: event.expires_at,
        });
        true
    }

    pub fn handle_spell_effect_applied(
        &mut self,
        event: SpellEffectAppliedEvent,
        event_id: Option<&str>,
    ) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        self.add_effect(ActiveEffect {
            effect_id: event.effect_id,
            source: EffectSource::Spell,
            source_id: event.spell_id,
            target_user_id: event.user_id,
            expires_at: event.expires_at,
        });
        true
    }

    pub fn handle_item_effect_blocked(
        &mut self,
        event: &ItemEffectBlockedEvent,
        event_id: Option<&str>,
    ) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        info!(
            "{} from {} was blocked by {}",
            event.item_id,
            event.from_user_id,
            event.blocked_by_spell_id.as_deref().unwrap_or("a spell")
        );
        false
    }

    pub fn handle_effect_removed(&mut self, event: &EffectRemovedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) || !self.is_focused(&event.game_id) {
            return false;
        }
        let before = self.effects.len();
        self.effects.retain(|effect| effect.effect_id != event.effect_id);
        self.effects.len() != before
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn is_focused(&self, game_id: &str) -> bool {
        self.focused_game.as_deref() == Some(game_id)
    }

    fn set_focus(&mut self, game_id: &str) {
        if self.focused_game.as_deref() == Some(game_id) {
            return;
        }
        let seen = std::mem::take(&mut self.seen);
        *self = Self {
            focused_game: Some(game_id.to_owned()),
            navigation: self.navigation,
            seen,
            ..Self::default()
        };
    }

    fn add_effect(&mut self, effect: ActiveEffect) {
        self.effects
            .retain(|existing| existing.effect_id != effect.effect_id);
        self.effects.push(effect);
    }
}

/// REST-driven game actions. Every endpoint answers with the full snapshot,
/// which replaces the store's copy if the game is still in focus.
#[derive(Clone)]
pub struct GameActions {
    rest: RestClient,
    store: Handle<GameStore>,
    clock: ServerClock,
}

impl GameActions {
    pub fn new(rest: RestClient, store: Handle<GameStore>, clock: ServerClock) -> Self {
        Self { rest, store, clock }
    }

    pub fn store(&self) -> &Handle<GameStore> {
        &self.store
    }

    /// Loads the snapshot of `game_id` and focuses it once the server answers.
    pub async fn fetch_game_state(&self, game_id: &str) -> Result<GameState, ApiError> {
        let ticket = self.store.write().await.begin_navigation();
        let state = self.rest.game_state(game_id).await?;
        let server_now = self.clock.server_now();
        self.store
            .write()
            .await
            .complete_navigation(ticket, state.clone(), server_now);
        Ok(state)
    }

    pub async fn submit_ban(&self, game_id: &str, algorithm_id: &str) -> Result<GameState, ApiError> {
        let request = BanPickRequest {
            algorithm_id: algorithm_id.to_owned(),
        };
        let state = self.rest.submit_ban(game_id, &request).await?;
        self.apply(&state).await;
        Ok(state)
    }

    pub async fn submit_pick(&self, game_id: &str, algorithm_id: &str) -> Result<GameState, ApiError> {
        let request = BanPickRequest {
            algorithm_id: algorithm_id.to_owned(),
        };
        let state = self.rest.submit_pick(game_id, &request).await?;
        self.apply(&state).await;
        Ok(state)
    }

    pub async fn purchase_item(
        &self,
        game_id: &str,
        item_id: &str,
        quantity: u32,
    ) -> Result<GameState, ApiError> {
        let request = ShopItemRequest {
            item_id: item_id.to_owned(),
            quantity,
        };
        let state = self.rest.purchase_item(game_id, &request).await?;
        self.apply(&state).await;
        Ok(state)
    }

    pub async fn purchase_spell(
        &self,
        game_id: &str,
        spell_id: &str,
        quantity: u32,
    ) -> Result<GameState, ApiError> {
        let request = ShopSpellRequest {
            spell_id: spell_id.to_owned(),
            quantity,
        };
        let state = self.rest.purchase_spell(game_id, &request).await?;
        self.apply(&state).await;
        Ok(state)
    }

    pub async fn submit_code(
        &self,
        game_id: &str,
        request: &SubmissionRequest,
    ) -> Result<GameState, ApiError> {
        let state = self.rest.submit_code(game_id, request).await?;
        self.apply(&state).await;
        Ok(state)
    }

    async fn apply(&self, state: &GameState) {
        let server_now = self.clock.server_now();
        self.store.write().await.apply_state(state.clone(), server_now);
    }
}

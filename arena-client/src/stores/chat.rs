use super::dedup::RecentEventIds;
use arena_shared::{
    models::{ChatMessage, UserIdentity},
    protocol::{ChatMessageEvent, TypingStatusChangedEvent},
};
use std::collections::{BTreeSet, HashMap};

pub const MAX_MESSAGES_PER_CHANNEL: usize = 50;

/// Chat history per channel (`"global"` or a room id) plus who is typing.
#[derive(Debug, Default)]
pub struct ChatStore {
    identity: Option<UserIdentity>,
    messages: HashMap<String, Vec<ChatMessage>>,
    typing: HashMap<String, BTreeSet<String>>,
    nicknames: HashMap<String, String>,
    seen: RecentEventIds,
}

impl ChatStore {
    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn set_identity(&mut self, identity: Option<UserIdentity>) {
        if let Some(identity) = &identity {
            self.register_nickname(&identity.user_id, &identity.nickname);
        }
        self.identity = identity;
    }

    pub fn messages(&self, channel: &str) -> &[ChatMessage] {
        self.messages
            .get(channel)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn receive_message(
        &mut self,
        channel: &str,
        event: ChatMessageEvent,
        event_id: Option<&str>,
    ) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }

        self.register_nickname(&event.sender.user_id, &event.sender.nickname);
        let is_me = self
            .identity
            .as_ref()
            .map(|identity| identity.nickname == event.sender.nickname)
            .unwrap_or(false);
        let messages = self.messages.entry(channel.to_owned()).or_default();
        messages.push(ChatMessage {
            id: event.message_id,
            sender: event.sender.nickname,
            content: event.message,
            created_at: event.created_at,
            is_me,
        });
        if messages.len() > MAX_MESSAGES_PER_CHANNEL {
            let overflow = messages.len() - MAX_MESSAGES_PER_CHANNEL;
            messages.drain(..overflow);
        }
        true
    }

    pub fn clear_messages(&mut self, channel: &str) {
        self.messages.remove(channel);
    }

    pub fn register_nickname(&mut self, user_id: &str, nickname: &str) {
        self.nicknames
            .insert(user_id.to_owned(), nickname.to_owned());
    }

    pub fn nickname(&self, user_id: &str) -> Option<&str> {
        self.nicknames.get(user_id).map(String::as_str)
    }

    pub fn handle_typing_status(&mut self, event: TypingStatusChangedEvent, event_id: Option<&str>) -> bool {
        if !self.seen.first_sighting(event_id) {
            return false;
        }
        let is_local = self
            .identity
            .as_ref()
            .map(|identity| identity.user_id == event.user_id)
            .unwrap_or(false);
        if is_local {
            return false;
        }

        let typing = self.typing.entry(event.room_id).or_default();
        if event.is_typing {
            typing.insert(event.user_id)
        } else {
            typing.remove(&event.user_id)
        }
    }

    /// Display names of everyone typing in `room_id`, falling back to the user
    /// id for players we have no nickname for.
    pub fn typing_users(&self, room_id: &str) -> Vec<String> {
        self.typing
            .get(room_id)
            .into_iter()
            .flatten()
            .map(|user_id| self.nickname(user_id).unwrap_or(user_id).to_owned())
            .collect()
    }

    pub fn typing_user_ids(&self, room_id: &str) -> impl Iterator<Item = &str> + '_ {
        self.typing
            .get(room_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn clear_typing_status(&mut self, room_id: &str) {
        self.typing.remove(room_id);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

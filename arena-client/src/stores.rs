//! UI-facing state. Each store owns its slice of server state, applies REST
//! snapshots and pushed deltas, and drops redelivered events by id.

mod chat;
mod dedup;
mod game;
mod room;

pub use self::{
    chat::{ChatStore, MAX_MESSAGES_PER_CHANNEL},
    dedup::{RecentEventIds, MAX_EVENT_IDS},
    game::{GameActions, GameStore},
    room::{RoomActions, RoomStore},
};

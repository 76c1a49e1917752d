//! Payload shapes shared by the REST API and the real-time events.

mod chat;
mod game;
mod room;
mod user;

pub use self::{chat::*, game::*, room::*, user::*};

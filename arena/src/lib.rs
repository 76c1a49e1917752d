//! Headless client for the arena ban/pick/shop coding game.
//!
//! Most applications only need [`client::Session`]; the shared wire types are
//! re-exported as [`shared`].

pub use arena_client as client;
pub use arena_shared as shared;

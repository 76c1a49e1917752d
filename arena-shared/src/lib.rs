pub mod models;
pub mod protocol;
pub mod stomp;
pub mod timing;
pub mod topics;
pub use chrono;
pub use uuid::Uuid;

pub mod prelude {
    pub use crate::models::*;
    pub use crate::protocol::{CommandEnvelope, EventEnvelope, ServerError, ServerEvent};
    pub use crate::timing::ServerClock;
    pub use crate::topics::Route;
    pub use uuid::Uuid;
}

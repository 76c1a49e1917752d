use crate::{
    connection_state::ConnectionState,
    logic::{ClientLogic, ConnectError},
};
use arena_shared::stomp::{Frame, HeartBeat};
use async_channel::Sender;
use async_rwlock::RwLock;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::task::JoinHandle;

/// Receives the parsed JSON body of every message on one topic.
pub type MessageCallback = Arc<dyn Fn(Value) + Send + Sync>;

pub(crate) struct ClientData {
    pub(crate) logic: Box<dyn ClientLogic>,
    pub(crate) settings: Settings,
    pub(crate) state: RwLock<NetworkState>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Settings {
    pub(crate) reconnect_delay: Duration,
    pub(crate) heart_beat: HeartBeat,
    pub(crate) connect_timeout: Duration,
}

pub(crate) struct Registration {
    pub(crate) id: String,
    pub(crate) callback: MessageCallback,
}

#[derive(Default)]
pub(crate) struct NetworkState {
    pub(crate) connection_state: ConnectionState,
    /// Keyed by topic. Survives reconnects; cleared only by `disconnect`.
    pub(crate) subscriptions: HashMap<String, Registration>,
    /// Present only while a STOMP session is established.
    pub(crate) outbound: Option<Sender<Frame>>,
    pub(crate) waiters: Vec<Sender<Result<(), ConnectError>>>,
    pub(crate) task: Option<JoinHandle<()>>,
    /// Bumped by `disconnect` so a connection task that outlives it cannot
    /// write state for a session that no longer exists.
    pub(crate) generation: u64,
    next_subscription: u64,
}

impl NetworkState {
    pub(crate) fn next_subscription_id(&mut self) -> String {
        let id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        id
    }

    pub(crate) fn resolve_waiters(&mut self, result: Result<(), ConnectError>) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.try_send(result.clone());
        }
    }

    pub(crate) fn callback_for(&self, subscription_id: &str) -> Option<MessageCallback> {
        self.subscriptions
            .values()
            .find(|registration| registration.id == subscription_id)
            .map(|registration| registration.callback.clone())
    }
}

use crate::logic::ConnectError;
use async_channel::Receiver;

/// One caller's interest in the outcome of the current connection attempt.
pub struct PendingConnection {
    receiver: Receiver<Result<(), ConnectError>>,
}

impl PendingConnection {
    pub(crate) fn new(receiver: Receiver<Result<(), ConnectError>>) -> Self {
        Self { receiver }
    }

    pub async fn wait(self) -> Result<(), ConnectError> {
        self.receiver
            .recv()
            .await
            .unwrap_or(Err(ConnectError::Disconnected))
    }
}

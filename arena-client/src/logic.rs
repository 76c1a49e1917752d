use crate::{config::ClientConfig, connection_state::ConnectionState, tokens::TokenStore};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use url::Url;

/// Why a connection attempt failed. Cloneable so that one attempt's outcome can
/// be handed to every caller waiting on it.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ConnectError {
    #[error("invalid broker url: {0}")]
    InvalidUrl(String),
    #[error("websocket error: {0}")]
    Socket(String),
    #[error("broker rejected the connection: {0}")]
    Rejected(String),
    #[error("no CONNECTED frame within {0:?}")]
    Timeout(Duration),
    #[error("connection closed during handshake")]
    Closed,
    #[error("client was disconnected")]
    Disconnected,
}

/// Hooks the transport calls into. `broker_url` and `connect_headers` are read
/// on every attempt so a refreshed token is picked up by the next reconnect.
#[async_trait]
pub trait ClientLogic: Send + Sync {
    fn broker_url(&self) -> Result<Url, ConnectError>;

    fn connect_headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    async fn state_changed(&self, _state: ConnectionState) -> anyhow::Result<()> {
        Ok(())
    }

    async fn handle_error(&self, error: &ConnectError) -> anyhow::Result<()> {
        log::warn!("connection attempt failed: {}", error);
        Ok(())
    }
}

/// Authenticates with the stored access token, both in the query string and as
/// an `Authorization` connect header.
pub struct BearerLogic {
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
}

impl BearerLogic {
    pub fn new(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self { config, tokens }
    }
}

#[async_trait]
impl ClientLogic for BearerLogic {
    fn broker_url(&self) -> Result<Url, ConnectError> {
        let token = self.tokens.access_token();
        self.config
            .broker_url(token.as_deref())
            .map_err(|err| ConnectError::InvalidUrl(err.to_string()))
    }

    fn connect_headers(&self) -> Vec<(String, String)> {
        match self.tokens.access_token() {
            Some(token) => vec![("Authorization".to_owned(), format!("Bearer {}", token))],
            None => Vec::new(),
        }
    }

    async fn state_changed(&self, state: ConnectionState) -> anyhow::Result<()> {
        log::debug!("connection state: {:?}", state);
        Ok(())
    }
}

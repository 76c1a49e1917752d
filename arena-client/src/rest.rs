use crate::{config::ClientConfig, tokens::TokenStore};
use async_channel::Sender;
use log::{debug, error, warn};
use reqwest::{RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_derive::Deserialize;
use serde_json::Value;
use std::sync::Arc;

mod games;
mod rooms;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered with an error envelope. Callers branch on `code`.
    #[error("{code}: {message} (HTTP {status})")]
    Server {
        status: u16,
        code: String,
        message: String,
    },
    /// HTTP 401. Tokens were already cleared and a [`ForcedLogout`] was emitted.
    #[error("session expired")]
    Unauthorized,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Server { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Unauthorized => Some(401),
            ApiError::Http(err) => err.status().map(|status| status.as_u16()),
            ApiError::Decode(_) => None,
        }
    }
}

/// Emitted whenever the server rejects the bearer token.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ForcedLogout {
    pub path: String,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

/// Thin JSON client for the REST API: injects the bearer token, unwraps the
/// `{data, meta}` envelope and turns `{error: {code, message}}` into
/// [`ApiError::Server`].
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: Arc<dyn TokenStore>,
    forced_logout: Sender<ForcedLogout>,
}

impl RestClient {
    pub fn new(
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
        forced_logout: Sender<ForcedLogout>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|err| {
                warn!(
                    "could not build http client with a {:?} timeout, using defaults: {}",
                    config.request_timeout, err
                );
                reqwest::Client::new()
            });
        Self {
            http,
            config,
            tokens,
            forced_logout,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.http.get(self.config.api_url(path));
        self.execute(path, request).await
    }

    pub async fn get_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.http.get(self.config.api_url(path)).query(query);
        self.execute(path, request).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.http.post(self.config.api_url(path)).json(body);
        self.execute(path, request).await
    }

    /// POST without a request body.
    pub async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let request = self.http.post(self.config.api_url(path));
        self.execute(path, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        path: &str,
        mut request: RequestBuilder,
    ) -> Result<T, ApiError> {
        if let Some(token) = self.tokens.access_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        debug!("{} -> {}", path, status);

        let result = decode_response(status, &body);
        if let Err(ApiError::Unauthorized) = &result {
            self.force_logout(path);
        }
        result
    }

    fn force_logout(&self, path: &str) {
        warn!("{} rejected our token, signing out", path);
        if let Err(err) = self.tokens.clear_tokens() {
            error!("could not clear tokens: {}", err);
        }
        let _ = self.forced_logout.try_send(ForcedLogout {
            path: path.to_owned(),
        });
    }
}

/// Maps a raw HTTP response onto the API's envelope conventions.
pub(crate) fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T, ApiError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }

    if !status.is_success() {
        let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.code, envelope.error.message),
            Err(_) => (
                format!("HTTP_{}", status.as_u16()),
                status.canonical_reason().unwrap_or_default().to_owned(),
            ),
        };
        if status.is_server_error() {
            error!("server error {}: {} {}", status, code, message);
        }
        return Err(ApiError::Server {
            status: status.as_u16(),
            code,
            message,
        });
    }

    let value: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body)?
    };
    let value = match value {
        Value::Object(mut object) => match object.remove("data") {
            Some(data) if !data.is_null() => data,
            Some(_) => Value::Null,
            None => Value::Object(object),
        },
        other => other,
    };
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::tokens::MemoryTokenStore;
    use arena_shared::models::PagedRoomList;
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };
    use url::Url;

    /// Serves one canned response per accepted connection and reports each
    /// request it received, head and body.
    pub(crate) async fn canned_server(
        responses: Vec<(u16, String)>,
    ) -> (SocketAddr, async_channel::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (requests_tx, requests) = async_channel::unbounded();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buffer = [0u8; 4096];
                let head_end = loop {
                    if let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                        break end + 4;
                    }
                    let read = stream.read(&mut buffer).await.unwrap();
                    assert!(read > 0, "client hung up mid-request");
                    request.extend_from_slice(&buffer[..read]);
                };
                let head = String::from_utf8_lossy(&request[..head_end]).to_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .map(|value| value.trim().parse::<usize>().unwrap())
                    .unwrap_or(0);
                while request.len() < head_end + body_len {
                    let read = stream.read(&mut buffer).await.unwrap();
                    assert!(read > 0, "client hung up mid-body");
                    request.extend_from_slice(&buffer[..read]);
                }
                let _ = requests_tx
                    .send(String::from_utf8_lossy(&request).into_owned())
                    .await;
                let response = format!(
                    "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                let _ = stream.shutdown().await;
            }
        });
        (addr, requests)
    }

    pub(crate) fn rest_client_for(
        addr: SocketAddr,
        tokens: Arc<MemoryTokenStore>,
    ) -> (RestClient, async_channel::Receiver<ForcedLogout>) {
        let config = ClientConfig::new(Url::parse(&format!("http://{}", addr)).unwrap());
        let (sender, receiver) = async_channel::unbounded();
        (RestClient::new(config, tokens, sender), receiver)
    }

    #[test]
    fn unwraps_data_envelopes() {
        let body = json!({ "data": { "n": 3 }, "meta": { "requestId": "x" } }).to_string();
        let value: Value = decode_response(StatusCode::OK, body.as_bytes()).unwrap();
        assert_eq!(value, json!({ "n": 3 }));

        // Bodies without a data field are used as-is.
        let value: Value = decode_response(StatusCode::OK, br#"{"n":4}"#).unwrap();
        assert_eq!(value, json!({ "n": 4 }));

        decode_response::<()>(StatusCode::NO_CONTENT, b"").unwrap();
        decode_response::<()>(StatusCode::OK, br#"{"data":null,"meta":{}}"#).unwrap();
    }

    #[test]
    fn surfaces_error_codes() {
        let body = json!({ "error": { "code": "ROOM_FULL", "message": "room is full" }, "meta": {} });
        let err = decode_response::<Value>(StatusCode::CONFLICT, body.to_string().as_bytes())
            .unwrap_err();
        assert_eq!(err.code(), Some("ROOM_FULL"));
        assert_eq!(err.status(), Some(409));

        let err = decode_response::<Value>(StatusCode::FORBIDDEN, b"<html>").unwrap_err();
        assert_eq!(err.code(), Some("HTTP_403"));

        let err = decode_response::<Value>(StatusCode::BAD_GATEWAY, b"").unwrap_err();
        assert!(matches!(err, ApiError::Server { status: 502, .. }));

        assert!(matches!(
            decode_response::<Value>(StatusCode::UNAUTHORIZED, b""),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn shape_mismatches_are_decode_errors() {
        let err = decode_response::<PagedRoomList>(StatusCode::OK, br#"{"data":{"items":3}}"#)
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn sends_the_bearer_token() {
        let (addr, requests) =
            canned_server(vec![(200, json!({ "data": { "ok": true } }).to_string())]).await;
        let tokens = Arc::new(MemoryTokenStore::with_tokens("tok-1", "ref-1"));
        let (rest, _logouts) = rest_client_for(addr, tokens);

        let value: Value = rest.get("/ping").await.unwrap();
        assert_eq!(value, json!({ "ok": true }));

        let head = requests.recv().await.unwrap().to_lowercase();
        assert!(head.starts_with("get /api/v1/ping "));
        assert!(head.contains("authorization: bearer tok-1"));
    }

    #[tokio::test]
    async fn unauthorized_clears_tokens_and_signals_logout() {
        let (addr, _requests) = canned_server(vec![(401, String::new())]).await;
        let tokens = Arc::new(MemoryTokenStore::with_tokens("expired", "refresh"));
        let (rest, logouts) = rest_client_for(addr, tokens.clone());

        let result: Result<Value, _> = rest.post_empty("/rooms/r-1/join").await;
        assert!(matches!(result, Err(ApiError::Unauthorized)));
        assert_eq!(tokens.access_token(), None);
        assert_eq!(tokens.refresh_token(), None);
        assert_eq!(
            logouts.try_recv().unwrap(),
            ForcedLogout {
                path: "/rooms/r-1/join".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn forbidden_is_left_to_the_caller() {
        let body = json!({ "error": { "code": "NOT_HOST", "message": "only the host can start" } });
        let (addr, _requests) = canned_server(vec![(403, body.to_string())]).await;
        let tokens = Arc::new(MemoryTokenStore::with_tokens("tok", "ref"));
        let (rest, logouts) = rest_client_for(addr, tokens.clone());

        let err = rest.post_empty::<Value>("/rooms/r-1/start").await.unwrap_err();
        assert_eq!(err.code(), Some("NOT_HOST"));
        assert_eq!(tokens.access_token().as_deref(), Some("tok"));
        assert!(logouts.is_empty());
    }

    #[tokio::test]
    async fn requests_give_up_after_the_configured_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold the connection without ever answering.
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        });

        let mut config = ClientConfig::new(Url::parse(&format!("http://{}", addr)).unwrap());
        config.request_timeout = std::time::Duration::from_millis(100);
        let (sender, _receiver) = async_channel::unbounded();
        let rest = RestClient::new(config, Arc::new(MemoryTokenStore::new()), sender);

        let err = rest.get::<Value>("/rooms").await.unwrap_err();
        assert!(matches!(&err, ApiError::Http(http) if http.is_timeout()));
    }
}

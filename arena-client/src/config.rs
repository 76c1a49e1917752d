use arena_shared::stomp::HeartBeat;
use std::{env, time::Duration};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid {name}: {value:?} is not a number of milliseconds")]
    InvalidDuration { name: &'static str, value: String },
    #[error("unsupported scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
}

/// Endpoints and timings for one client session.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin of both the REST API and the STOMP broker, e.g. `https://arena.example`.
    pub base_url: Url,
    pub api_prefix: String,
    pub broker_path: String,
    pub reconnect_delay: Duration,
    pub heartbeat_outgoing: Duration,
    pub heartbeat_incoming: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_prefix: "/api/v1".to_owned(),
            broker_path: "/ws".to_owned(),
            reconnect_delay: Duration::from_millis(5000),
            heartbeat_outgoing: Duration::from_millis(4000),
            heartbeat_incoming: Duration::from_millis(4000),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Reads `ARENA_*` variables, falling back to the defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("ARENA_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let base_url = Url::parse(&base_url).map_err(|source| ConfigError::InvalidUrl {
            name: "ARENA_BASE_URL",
            source,
        })?;

        let mut config = Self::new(base_url);
        if let Some(prefix) = lookup("ARENA_API_PREFIX") {
            config.api_prefix = prefix;
        }
        if let Some(path) = lookup("ARENA_BROKER_PATH") {
            config.broker_path = path;
        }

        let duration = |name: &'static str, default: Duration| match lookup(name) {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| ConfigError::InvalidDuration { name, value }),
            None => Ok(default),
        };
        config.reconnect_delay = duration("ARENA_RECONNECT_DELAY_MS", config.reconnect_delay)?;
        let heartbeat = duration("ARENA_HEARTBEAT_MS", config.heartbeat_outgoing)?;
        config.heartbeat_outgoing = heartbeat;
        config.heartbeat_incoming = heartbeat;
        config.request_timeout = duration("ARENA_REQUEST_TIMEOUT_MS", config.request_timeout)?;

        Ok(config)
    }

    pub fn api_url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&format!("{}{}", self.api_prefix.trim_end_matches('/'), path));
        url.set_query(None);
        url
    }

    /// The broker endpoint. The token travels in the query string as well as in
    /// the STOMP `CONNECT` headers because browsers cannot set upgrade headers.
    pub fn broker_url(&self, access_token: Option<&str>) -> Result<Url, ConfigError> {
        let mut url = self.base_url.clone();
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ConfigError::UnsupportedScheme(scheme.to_owned()))?;
        url.set_path(&self.broker_path);
        url.set_query(None);
        if let Some(token) = access_token {
            url.query_pairs_mut().append_pair("access_token", token);
        }
        Ok(url)
    }

    pub fn heart_beat(&self) -> HeartBeat {
        HeartBeat::new(self.heartbeat_outgoing, self.heartbeat_incoming)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;

    #[test]
    fn derives_broker_url_from_base() {
        let config = ClientConfig::new(Url::parse("https://arena.example").unwrap());
        let url = config.broker_url(Some("t0k3n")).unwrap();
        assert_eq!(url.as_str(), "wss://arena.example/ws?access_token=t0k3n");

        let config = ClientConfig::new(Url::parse("http://localhost:8080").unwrap());
        assert_eq!(
            config.broker_url(None).unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn api_urls_carry_the_prefix() {
        let config = ClientConfig::new(Url::parse("http://localhost:8080/").unwrap());
        assert_eq!(
            config.api_url("/rooms/r-1/join").as_str(),
            "http://localhost:8080/api/v1/rooms/r-1/join"
        );
    }

    #[test]
    fn reads_overrides() {
        let vars = hashmap! {
            "ARENA_BASE_URL" => "https://play.example",
            "ARENA_RECONNECT_DELAY_MS" => "250",
            "ARENA_HEARTBEAT_MS" => "0",
        };
        let config = ClientConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url.as_str(), "https://play.example/");
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.heart_beat(), HeartBeat::default());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_bad_values() {
        let bad_delay = ClientConfig::from_lookup(|name| {
            (name == "ARENA_RECONNECT_DELAY_MS").then(|| "soon".to_owned())
        });
        assert!(matches!(
            bad_delay,
            Err(ConfigError::InvalidDuration { name: "ARENA_RECONNECT_DELAY_MS", .. })
        ));

        let config = ClientConfig::new(Url::parse("ftp://files.example").unwrap());
        assert!(matches!(
            config.broker_url(None),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}

//! STOMP 1.2 framing over WebSocket text messages.
//!
//! Only the client side of the protocol is covered: the frames a browser-style
//! client sends (`CONNECT`, `SUBSCRIBE`, `UNSUBSCRIBE`, `SEND`, `DISCONNECT`) and
//! the frames a broker sends back (`CONNECTED`, `MESSAGE`, `RECEIPT`, `ERROR`).

use std::{fmt, str::FromStr, time::Duration};

pub const ACCEPT_VERSION: &str = "1.2";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Send => "SEND",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
            Command::Disconnect => "DISCONNECT",
        }
    }

    // CONNECT and CONNECTED headers are sent verbatim for 1.0 compatibility.
    fn escapes_headers(self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" | "STOMP" => Command::Connect,
            "CONNECTED" => Command::Connected,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "SEND" => Command::Send,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            "DISCONNECT" => Command::Disconnect,
            other => return Err(FrameError::UnknownCommand(other.to_owned())),
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("invalid escape sequence in {0:?}")]
    InvalidEscape(String),
    #[error("frame has no header terminator")]
    MissingHeaderTerminator,
    #[error("frame body is not NUL terminated")]
    MissingNull,
    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),
    #[error("invalid heart-beat header {0:?}")]
    InvalidHeartBeat(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// A decoded WebSocket text message: either a bare EOL heart-beat or a frame.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Inbound {
    HeartBeat,
    Frame(Frame),
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Repeated headers keep the first value, as STOMP 1.2 requires.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn connect(host: &str, heart_beat: HeartBeat, extra: &[(String, String)]) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.to_header());
        for (name, value) in extra {
            frame = frame.header(name.clone(), value.clone());
        }
        frame
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, json: String) -> Self {
        Frame::new(Command::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .with_body(json)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if self.command.escapes_headers() {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

pub fn decode(text: &str) -> Result<Inbound, FrameError> {
    let text = text.trim_start_matches(['\r', '\n']);
    if text.is_empty() {
        return Ok(Inbound::HeartBeat);
    }

    let mut lines = text.split_inclusive('\n');
    let command_line = lines.next().ok_or(FrameError::Empty)?;
    let mut offset = command_line.len();
    let command: Command = trim_eol(command_line).parse()?;

    let mut headers = Vec::new();
    let mut terminated = false;
    for line in lines {
        offset += line.len();
        let line = trim_eol(line);
        if line.is_empty() {
            terminated = true;
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_owned()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_owned(), value.to_owned()));
        }
    }
    if !terminated {
        return Err(FrameError::MissingHeaderTerminator);
    }

    let rest = &text[offset..];
    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .map(|(_, value)| {
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| FrameError::InvalidContentLength(value.clone()))
        })
        .transpose()?;
    let body = match content_length {
        Some(len) => rest.get(..len).ok_or(FrameError::MissingNull)?,
        None => {
            let end = rest.find('\0').ok_or(FrameError::MissingNull)?;
            &rest[..end]
        }
    };

    Ok(Inbound::Frame(Frame {
        command,
        headers,
        body: body.to_owned(),
    }))
}

fn trim_eol(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_owned())),
        }
    }
    Ok(out)
}

/// Heart-beat intervals. A zero duration means "none" in that direction.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    pub fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    pub fn to_header(&self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    pub fn parse(value: &str) -> Result<Self, FrameError> {
        let invalid = || FrameError::InvalidHeartBeat(value.to_owned());
        let (outgoing, incoming) = value.split_once(',').ok_or_else(invalid)?;
        let outgoing = outgoing.trim().parse::<u64>().map_err(|_| invalid())?;
        let incoming = incoming.trim().parse::<u64>().map_err(|_| invalid())?;
        Ok(Self::new(
            Duration::from_millis(outgoing),
            Duration::from_millis(incoming),
        ))
    }

    /// Combines what this client offered with what the broker announced in
    /// `CONNECTED`, yielding the intervals both sides will honour.
    pub fn negotiate(&self, server: &HeartBeat) -> HeartBeat {
        fn pick(ours: Duration, theirs: Duration) -> Duration {
            if ours.is_zero() || theirs.is_zero() {
                Duration::ZERO
            } else {
                ours.max(theirs)
            }
        }

        HeartBeat {
            outgoing: pick(self.outgoing, server.incoming),
            incoming: pick(self.incoming, server.outgoing),
        }
    }
}

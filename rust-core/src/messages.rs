use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

pub const KEY_IDENTITY: &str = "id";
pub const KEY_REQUEST_POSITION: &str = "yik";
pub const KEY_REPORT_POSITION: &str = "yak";
pub const KEY_STOP: &str = "stop";
pub const KEY_SEEK: &str = "seek";
pub const KEY_TOGGLE: &str = "toggle";

/// A single unit of coordination traffic, carried as `{ "key": .., "value": .. }`.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Coordinator tells a freshly connected client its session id.
    Identity(String),
    /// "yik": ask every client for its playback position.
    RequestPosition,
    /// "yak": a client's position as a fraction of the duration, `None` when
    /// the client is not part of the synchronized group.
    ReportPosition(Option<f64>),
    Stop,
    /// Jump to a fraction (0-1) of the duration and resume playback.
    Seek(f64),
    TogglePlayPause,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unexpected value for `{key}`: {value}")]
    BadValue { key: String, value: String },
    #[error("unknown command key `{0}`")]
    UnknownKey(String),
}

#[derive(Deserialize, Debug)]
struct Envelope {
    key: String,
    #[serde(default)]
    value: Option<Value>,
}

impl Command {
    pub fn key(&self) -> &'static str {
        match self {
            Command::Identity(_) => KEY_IDENTITY,
            Command::RequestPosition => KEY_REQUEST_POSITION,
            Command::ReportPosition(_) => KEY_REPORT_POSITION,
            Command::Stop => KEY_STOP,
            Command::Seek(_) => KEY_SEEK,
            Command::TogglePlayPause => KEY_TOGGLE,
        }
    }

    /// Serializes the command into a text frame.
    pub fn encode(&self) -> String {
        let frame = match self {
            Command::Identity(id) => json!({ "key": self.key(), "value": id }),
            // A report always carries its value so that `null` stays explicit.
            Command::ReportPosition(value) => json!({ "key": self.key(), "value": value }),
            Command::Seek(value) => json!({ "key": self.key(), "value": value }),
            Command::RequestPosition | Command::Stop | Command::TogglePlayPause => {
                json!({ "key": self.key() })
            }
        };
        frame.to_string()
    }

    /// Parses a text frame. Both the short wire keys and their descriptive
    /// names are accepted.
    pub fn decode(frame: &str) -> Result<Command, ProtocolError> {
        let Envelope { key, value } = serde_json::from_str(frame)?;
        let value = value.unwrap_or(Value::Null);

        match key.as_str() {
            KEY_IDENTITY | "identity-assign" => match value {
                Value::String(id) => Ok(Command::Identity(id)),
                other => Err(bad_value(&key, &other)),
            },
            KEY_REQUEST_POSITION | "request-position" => Ok(Command::RequestPosition),
            KEY_REPORT_POSITION | "report-position" => match value {
                Value::Null => Ok(Command::ReportPosition(None)),
                Value::Number(n) => Ok(Command::ReportPosition(n.as_f64())),
                other => Err(bad_value(&key, &other)),
            },
            KEY_STOP => Ok(Command::Stop),
            KEY_SEEK => match value.as_f64() {
                Some(fraction) => Ok(Command::Seek(fraction)),
                None => Err(bad_value(&key, &value)),
            },
            KEY_TOGGLE | "toggle-play-pause" => Ok(Command::TogglePlayPause),
            _ => Err(ProtocolError::UnknownKey(key.clone())),
        }
    }
}

fn bad_value(key: &str, value: &Value) -> ProtocolError {
    ProtocolError::BadValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

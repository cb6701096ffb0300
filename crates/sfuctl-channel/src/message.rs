//! Classification of inbound payloads by their first byte.

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ClassifyError;
use crate::wire::WireMessage;

/// `{`: JSON control message.
pub const TAG_JSON: u8 = b'{';
/// `D`: worker debug log line.
pub const TAG_DEBUG: u8 = b'D';
/// `W`: worker warning log line.
pub const TAG_WARN: u8 = b'W';
/// `E`: worker error log line.
pub const TAG_ERROR: u8 = b'E';
/// `X`: raw dump text.
pub const TAG_DUMP: u8 = b'X';

/// Severity of a worker log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLogLevel {
    Debug,
    Warn,
    Error,
}

/// A JSON control message: either a response or a notification.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JsonMessage {
    #[serde(default)]
    pub id: Option<u32>,
    #[serde(default)]
    pub accepted: Option<bool>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, rename = "targetId")]
    pub target_id: Option<Value>,
    #[serde(default)]
    pub event: Option<String>,
}

impl JsonMessage {
    /// Non-zero id: a response.
    pub fn response_id(&self) -> Option<u32> {
        self.id.filter(|id| *id != 0)
    }

    /// Target id and event of a notification. Numeric target ids are
    /// rendered as text.
    pub fn notification_target(&self) -> Option<(String, &str)> {
        let target = match self.target_id.as_ref()? {
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let event = self.event.as_deref().filter(|e| !e.is_empty())?;
        Some((target, event))
    }
}

/// A classified inbound payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Json(JsonMessage),
    Log { level: WorkerLogLevel, text: String },
    Dump(String),
    Binary(WireMessage),
}

/// Classify one complete payload by its first byte.
pub fn classify(payload: &Bytes) -> Result<Message, ClassifyError> {
    let Some(&tag) = payload.first() else {
        return Err(ClassifyError::Empty);
    };

    let level = match tag {
        TAG_JSON => return Ok(Message::Json(serde_json::from_slice(payload)?)),
        TAG_DUMP => return Ok(Message::Dump(text(&payload[1..])?)),
        TAG_DEBUG => WorkerLogLevel::Debug,
        TAG_WARN => WorkerLogLevel::Warn,
        TAG_ERROR => WorkerLogLevel::Error,
        _ => return Ok(Message::Binary(WireMessage::decode(payload)?)),
    };

    Ok(Message::Log {
        level,
        text: text(&payload[1..])?,
    })
}

fn text(bytes: &[u8]) -> Result<String, ClassifyError> {
    Ok(std::str::from_utf8(bytes)?.to_owned())
}

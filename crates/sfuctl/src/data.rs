//! Plain data types shared by the entities.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sfuctl_channel::{NotificationData, RequestError, ResponseBody};

use crate::error::Result;

pub use sfuctl_channel::{ConsumerLayers, ConsumerScore, MediaKind, ProducerScore};

/// Application data attached to an entity.
pub type AppData = Map<String, Value>;

/// Flavour of transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebRtc,
    Plain,
    Pipe,
    Direct,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WebRtc => "webrtc",
            Self::Plain => "plain",
            Self::Pipe => "pipe",
            Self::Direct => "direct",
        }
    }
}

/// How a producer's RTP stream is structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProducerType {
    #[default]
    Simple,
    Simulcast,
    Svc,
}

/// How a consumer's RTP stream is structured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerType {
    Simple,
    Simulcast,
    Svc,
    Pipe,
}

impl ConsumerType {
    pub(crate) fn for_producer(producer_type: ProducerType, pipe: bool) -> Self {
        if pipe {
            return Self::Pipe;
        }
        match producer_type {
            ProducerType::Simple => Self::Simple,
            ProducerType::Simulcast => Self::Simulcast,
            ProducerType::Svc => Self::Svc,
        }
    }
}

/// Whether a data producer or consumer runs over SCTP or a direct transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Sctp,
    Direct,
}

/// SCTP association parameters reported by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SctpParameters {
    #[serde(default)]
    pub port: u16,
    /// Initially requested outgoing streams.
    #[serde(rename = "OS")]
    pub os: u16,
    /// Maximum incoming streams.
    #[serde(rename = "MIS")]
    pub mis: u16,
    #[serde(default, rename = "maxMessageSize")]
    pub max_message_size: u32,
}

/// Per data channel SCTP stream settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SctpStreamParameters {
    pub stream_id: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordered: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_packet_life_time: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retransmits: Option<u16>,
}

impl SctpStreamParameters {
    /// Reliable, ordered stream.
    pub fn reliable(stream_id: u16) -> Self {
        Self {
            stream_id,
            ordered: Some(true),
            ..Self::default()
        }
    }
}

/// Camera orientation reported for video producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoOrientation {
    pub camera: bool,
    pub flip: bool,
    pub rotation: u16,
}

/// Message sent through a direct data producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl DataMessage {
    /// WebRTC PPID for this message: 51 text, 53 binary, 56/57 when empty.
    pub fn default_ppid(&self) -> u32 {
        match self {
            Self::Text(s) if s.is_empty() => 56,
            Self::Text(_) => 51,
            Self::Binary(b) if b.is_empty() => 57,
            Self::Binary(_) => 53,
        }
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(s) => s.into_bytes(),
            Self::Binary(b) => b,
        }
    }
}

impl From<&str> for DataMessage {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for DataMessage {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<u8>> for DataMessage {
    fn from(b: Vec<u8>) -> Self {
        Self::Binary(b)
    }
}

impl From<&[u8]> for DataMessage {
    fn from(b: &[u8]) -> Self {
        Self::Binary(b.to_vec())
    }
}

/// Parse the JSON text carried by a binary dump response.
pub(crate) fn dump_json(body: ResponseBody) -> Result<Value> {
    match body {
        ResponseBody::Dump(text) => Ok(serde_json::from_slice(&text)?),
        ResponseBody::None => Ok(Value::Null),
        _ => Err(RequestError::UnexpectedResponse.into()),
    }
}

/// Parse the JSON data of a notification.
pub(crate) fn json_data<T: DeserializeOwned>(data: &NotificationData) -> Option<T> {
    match data {
        NotificationData::Json(value) => serde_json::from_value(value.clone()).ok(),
        NotificationData::Binary(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sctp_parameters_use_worker_field_names() {
        let params: SctpParameters =
            serde_json::from_value(json!({ "port": 5000, "OS": 1024, "MIS": 1024, "maxMessageSize": 262144 }))
                .unwrap();
        assert_eq!(params.mis, 1024);
        assert_eq!(params.max_message_size, 262_144);
    }

    #[test]
    fn stream_parameters_skip_unset_fields() {
        let json = serde_json::to_value(SctpStreamParameters::reliable(3)).unwrap();
        assert_eq!(json, json!({ "streamId": 3, "ordered": true }));
    }

    #[test]
    fn default_ppids() {
        assert_eq!(DataMessage::from("hi").default_ppid(), 51);
        assert_eq!(DataMessage::from("").default_ppid(), 56);
        assert_eq!(DataMessage::from(vec![1u8]).default_ppid(), 53);
        assert_eq!(DataMessage::from(Vec::new()).default_ppid(), 57);
    }

    #[test]
    fn consumer_type_follows_producer() {
        assert_eq!(
            ConsumerType::for_producer(ProducerType::Simulcast, false),
            ConsumerType::Simulcast
        );
        assert_eq!(
            ConsumerType::for_producer(ProducerType::Simulcast, true),
            ConsumerType::Pipe
        );
    }

    #[test]
    fn dump_responses_carry_json_text() {
        let value = dump_json(ResponseBody::Dump(br#"{"id":"d1"}"#.to_vec())).unwrap();
        assert_eq!(value["id"], "d1");
        assert_eq!(dump_json(ResponseBody::None).unwrap(), Value::Null);
        assert!(dump_json(ResponseBody::BufferedAmount(1)).is_err());
    }
}

//! Wire records for both protocol variants.
//!
//! Binary messages are [`WireMessage`] values encoded with bincode's standard
//! configuration. The enum discriminant is the first payload byte (`0x00`,
//! `0x01` or `0x02`), so a binary message never starts with one of the text
//! discriminators (`{`, `D`, `W`, `E`, `X`).

use bincode::error::{DecodeError, EncodeError};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::method::{Event, Method};

fn config() -> bincode::config::Configuration {
    bincode::config::standard()
}

/// One binary protocol message.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum WireMessage {
    Request(WireRequest),
    Response(WireResponse),
    Notification(WireNotification),
}

impl WireMessage {
    /// Encode into a frame payload.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        bincode::encode_to_vec(self, config())
    }

    /// Decode a frame payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let (message, _) = bincode::decode_from_slice(payload, config())?;
        Ok(message)
    }
}

/// Binary request. `handler_id` names the entity that handles it.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct WireRequest {
    pub id: u32,
    pub method: Method,
    pub handler_id: Option<String>,
    pub body: RequestBody,
}

/// Binary response. `error`/`reason` are set when `accepted` is false.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct WireResponse {
    pub id: u32,
    pub accepted: bool,
    pub error: Option<String>,
    pub reason: Option<String>,
    pub body: ResponseBody,
}

impl WireResponse {
    /// Accepted response carrying `body`.
    pub fn accepted(id: u32, body: ResponseBody) -> Self {
        Self {
            id,
            accepted: true,
            error: None,
            reason: None,
            body,
        }
    }

    /// Rejected response.
    pub fn rejected(id: u32, error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            accepted: false,
            error: Some(error.into()),
            reason: Some(reason.into()),
            body: ResponseBody::None,
        }
    }
}

/// Binary notification, in either direction.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct WireNotification {
    pub handler_id: Option<String>,
    pub event: Event,
    pub body: NotificationBody,
}

/// Request bodies.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum RequestBody {
    None,
    CloseRouter { router_id: String },
    CloseTransport { transport_id: String },
    CloseProducer { producer_id: String },
    CloseConsumer { consumer_id: String },
    CloseDataProducer { data_producer_id: String },
    CloseDataConsumer { data_consumer_id: String },
    Consume(ConsumeRequest),
    /// Payload kinds this crate does not model.
    Opaque(Vec<u8>),
}

/// Response bodies.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum ResponseBody {
    None,
    Consume(ConsumeResponse),
    BufferedAmount(u32),
    /// JSON text of a dump.
    Dump(Vec<u8>),
    Opaque(Vec<u8>),
}

/// Notification bodies.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum NotificationBody {
    None,
    ProducerScores(Vec<ProducerScore>),
    ConsumerScore(ConsumerScore),
    ConsumerLayers(Option<ConsumerLayers>),
    BufferedAmountLow(u32),
    Message { ppid: u32, data: Vec<u8> },
    Opaque(Vec<u8>),
}

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Body of `transport.consume`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct ConsumeRequest {
    pub consumer_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    /// JSON text of the consumer RTP parameters.
    pub rtp_parameters: Vec<u8>,
    pub paused: bool,
    pub preferred_layers: Option<ConsumerLayers>,
    pub ignore_dtx: bool,
    pub pipe: bool,
}

/// Result of `transport.consume`.
#[derive(Debug, Clone, PartialEq, Default, Encode, Decode)]
pub struct ConsumeResponse {
    pub paused: bool,
    pub producer_paused: bool,
    pub score: Option<ConsumerScore>,
    pub preferred_layers: Option<ConsumerLayers>,
}

/// Score of one producer encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ProducerScore {
    pub encoding_idx: u32,
    pub ssrc: u32,
    pub rid: Option<String>,
    pub score: u8,
}

/// Consumer score, including the scores of the producer it follows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerScore {
    pub score: u8,
    pub producer_score: u8,
    pub producer_scores: Vec<u8>,
}

/// Spatial/temporal layer selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerLayers {
    pub spatial_layer: u8,
    pub temporal_layer: Option<u8>,
}

/// Build a JSON-path request: `r<id>:<method>:<handlerId>:<json>`.
///
/// The handler id segment is empty when absent.
pub fn encode_json_request(id: u32, method: Method, handler_id: Option<&str>, json: &str) -> String {
    format!("r{id}:{method}:{}:{json}", handler_id.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminant_is_first_byte() {
        let request = WireMessage::Request(WireRequest {
            id: 1,
            method: Method::WorkerDump,
            handler_id: None,
            body: RequestBody::None,
        });
        let response = WireMessage::Response(WireResponse::accepted(1, ResponseBody::None));
        let notification = WireMessage::Notification(WireNotification {
            handler_id: Some("p1".into()),
            event: Event::Score,
            body: NotificationBody::None,
        });

        assert_eq!(request.encode().unwrap()[0], 0x00);
        assert_eq!(response.encode().unwrap()[0], 0x01);
        assert_eq!(notification.encode().unwrap()[0], 0x02);
    }

    #[test]
    fn consume_request_survives_encoding() {
        let message = WireMessage::Request(WireRequest {
            id: 4_294_967_295,
            method: Method::TransportConsume,
            handler_id: Some("transport-1".into()),
            body: RequestBody::Consume(ConsumeRequest {
                consumer_id: "c1".into(),
                producer_id: "p1".into(),
                kind: MediaKind::Video,
                rtp_parameters: br#"{"codecs":[]}"#.to_vec(),
                paused: true,
                preferred_layers: Some(ConsumerLayers {
                    spatial_layer: 2,
                    temporal_layer: None,
                }),
                ignore_dtx: false,
                pipe: false,
            }),
        });

        let bytes = message.encode().unwrap();
        assert_eq!(WireMessage::decode(&bytes).unwrap(), message);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(WireMessage::decode(&[0x07, 0xff, 0xff]).is_err());
        assert!(WireMessage::decode(&[]).is_err());
    }

    #[test]
    fn json_request_text() {
        assert_eq!(
            encode_json_request(7, Method::TransportProduce, Some("t1"), r#"{"kind":"audio"}"#),
            r#"r7:transport.produce:t1:{"kind":"audio"}"#
        );
        assert_eq!(
            encode_json_request(1, Method::WorkerDump, None, "null"),
            "r1:worker.dump::null"
        );
    }

    #[test]
    fn score_serializes_camel_case() {
        let score = ConsumerScore {
            score: 10,
            producer_score: 9,
            producer_scores: vec![9, 8],
        };
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["producerScore"], 9);
        assert_eq!(json["producerScores"][1], 8);
    }
}

//! RTP/SCTP capability negotiation seam.
//!
//! Entities call a [`CapabilityNegotiator`] to validate and transform
//! parameters before issuing requests. [`BasicNegotiator`] performs
//! structural checks only and passes parameters through unchanged.

use serde_json::{json, Value};

use crate::data::{MediaKind, SctpStreamParameters};
use crate::error::{Error, Result};

pub trait CapabilityNegotiator: Send + Sync {
    /// Router RTP capabilities for the given media codecs.
    fn router_rtp_capabilities(&self, media_codecs: &[Value]) -> Result<Value>;

    fn validate_rtp_parameters(&self, params: &Value) -> Result<()>;

    fn validate_rtp_capabilities(&self, caps: &Value) -> Result<()>;

    fn validate_sctp_stream_parameters(&self, params: &SctpStreamParameters) -> Result<()>;

    /// Mapping between producer and router payload types and SSRCs.
    fn producer_rtp_mapping(&self, params: &Value, router_caps: &Value) -> Result<Value>;

    /// RTP parameters consumers of a producer are derived from.
    fn consumable_rtp_parameters(
        &self,
        kind: MediaKind,
        params: &Value,
        router_caps: &Value,
        mapping: &Value,
    ) -> Result<Value>;

    /// RTP parameters for a new consumer.
    fn consumer_rtp_parameters(
        &self,
        consumable: &Value,
        caps: &Value,
        pipe: bool,
    ) -> Result<Value>;
}

/// Structural validation and identity transforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicNegotiator;

fn require_object(value: &Value, what: &str) -> Result<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("{what} must be an object")))
    }
}

impl CapabilityNegotiator for BasicNegotiator {
    fn router_rtp_capabilities(&self, media_codecs: &[Value]) -> Result<Value> {
        for codec in media_codecs {
            require_object(codec, "media codec")?;
        }
        Ok(json!({ "codecs": media_codecs, "headerExtensions": [] }))
    }

    fn validate_rtp_parameters(&self, params: &Value) -> Result<()> {
        require_object(params, "rtpParameters")?;
        match params.get("codecs") {
            None | Some(Value::Array(_)) => Ok(()),
            Some(_) => Err(Error::invalid_argument("rtpParameters.codecs must be an array")),
        }
    }

    fn validate_rtp_capabilities(&self, caps: &Value) -> Result<()> {
        require_object(caps, "rtpCapabilities")
    }

    fn validate_sctp_stream_parameters(&self, params: &SctpStreamParameters) -> Result<()> {
        let partial = params.max_packet_life_time.is_some() || params.max_retransmits.is_some();

        if params.max_packet_life_time.is_some() && params.max_retransmits.is_some() {
            return Err(Error::invalid_argument(
                "cannot provide both maxPacketLifeTime and maxRetransmits",
            ));
        }
        if partial && params.ordered == Some(true) {
            return Err(Error::invalid_argument(
                "cannot be ordered with maxPacketLifeTime or maxRetransmits",
            ));
        }
        Ok(())
    }

    fn producer_rtp_mapping(&self, _params: &Value, _router_caps: &Value) -> Result<Value> {
        Ok(json!({ "codecs": [], "encodings": [] }))
    }

    fn consumable_rtp_parameters(
        &self,
        _kind: MediaKind,
        params: &Value,
        _router_caps: &Value,
        _mapping: &Value,
    ) -> Result<Value> {
        Ok(params.clone())
    }

    fn consumer_rtp_parameters(
        &self,
        consumable: &Value,
        caps: &Value,
        _pipe: bool,
    ) -> Result<Value> {
        require_object(caps, "rtpCapabilities")?;
        Ok(consumable.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtp_parameters_must_be_objects() {
        let n = BasicNegotiator;
        assert!(n.validate_rtp_parameters(&json!({ "codecs": [] })).is_ok());
        assert!(n.validate_rtp_parameters(&json!([])).unwrap_err().is_invalid_argument());
        assert!(n.validate_rtp_parameters(&json!({ "codecs": 1 })).is_err());
        assert!(n.validate_rtp_capabilities(&Value::Null).is_err());
    }

    #[test]
    fn sctp_reliability_options_are_exclusive() {
        let n = BasicNegotiator;
        let mut params = SctpStreamParameters::reliable(0);
        assert!(n.validate_sctp_stream_parameters(&params).is_ok());

        params.max_retransmits = Some(3);
        assert!(n.validate_sctp_stream_parameters(&params).is_err());

        params.ordered = Some(false);
        assert!(n.validate_sctp_stream_parameters(&params).is_ok());

        params.max_packet_life_time = Some(100);
        assert!(n.validate_sctp_stream_parameters(&params).is_err());
    }

    #[test]
    fn router_capabilities_list_codecs() {
        let caps = BasicNegotiator
            .router_rtp_capabilities(&[json!({ "kind": "audio", "mimeType": "audio/opus" })])
            .unwrap();
        assert_eq!(caps["codecs"][0]["mimeType"], "audio/opus");
    }
}

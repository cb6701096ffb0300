use std::fmt;

use bincode::{Decode, Encode};

macro_rules! tags {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $tag:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Encode, Decode)]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
        }

        impl $name {
            /// Every tag, in declaration order.
            pub const ALL: &'static [$name] = &[$( $name::$variant, )+];

            /// Text form used on the JSON path and in logs.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $tag, )+
                }
            }

            /// Parse the text form. Unknown tags yield `None`.
            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $( $tag => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

tags! {
    /// Request method tags understood by the worker.
    pub enum Method {
        WorkerDump => "worker.dump",
        WorkerCreateRouter => "worker.createRouter",
        WorkerCloseRouter => "worker.closeRouter",
        RouterCreateWebRtcTransport => "router.createWebRtcTransport",
        RouterCreatePlainTransport => "router.createPlainTransport",
        RouterCreatePipeTransport => "router.createPipeTransport",
        RouterCreateDirectTransport => "router.createDirectTransport",
        RouterCloseTransport => "router.closeTransport",
        RouterDump => "router.dump",
        TransportDump => "transport.dump",
        TransportGetStats => "transport.getStats",
        TransportSetMaxIncomingBitrate => "transport.setMaxIncomingBitrate",
        TransportSetMaxOutgoingBitrate => "transport.setMaxOutgoingBitrate",
        TransportEnableTraceEvent => "transport.enableTraceEvent",
        TransportProduce => "transport.produce",
        TransportConsume => "transport.consume",
        TransportProduceData => "transport.produceData",
        TransportConsumeData => "transport.consumeData",
        TransportCloseProducer => "transport.closeProducer",
        TransportCloseConsumer => "transport.closeConsumer",
        TransportCloseDataProducer => "transport.closeDataProducer",
        TransportCloseDataConsumer => "transport.closeDataConsumer",
        ProducerDump => "producer.dump",
        ProducerGetStats => "producer.getStats",
        ProducerPause => "producer.pause",
        ProducerResume => "producer.resume",
        ConsumerDump => "consumer.dump",
        ConsumerGetStats => "consumer.getStats",
        ConsumerPause => "consumer.pause",
        ConsumerResume => "consumer.resume",
        ConsumerRequestKeyFrame => "consumer.requestKeyFrame",
        DataProducerDump => "dataProducer.dump",
        DataProducerGetStats => "dataProducer.getStats",
        DataConsumerDump => "dataConsumer.dump",
        DataConsumerGetStats => "dataConsumer.getStats",
        DataConsumerGetBufferedAmount => "dataConsumer.getBufferedAmount",
    }
}

tags! {
    /// Notification event tags, in both directions.
    pub enum Event {
        Score => "score",
        Trace => "trace",
        ProducerClose => "producerclose",
        ProducerPause => "producerpause",
        ProducerResume => "producerresume",
        LayersChange => "layerschange",
        VideoOrientationChange => "videoorientationchange",
        DataProducerClose => "dataproducerclose",
        SctpSendBufferFull => "sctpsendbufferfull",
        BufferedAmountLow => "bufferedamountlow",
        Message => "message",
        SctpStateChange => "sctpstatechange",
        /// Outbound: payload for a direct data producer.
        DataProducerSend => "dataProducer.send",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tags_parse_back() {
        for method in Method::ALL {
            assert_eq!(Method::from_tag(method.as_str()), Some(*method));
        }
        assert_eq!(Method::TransportConsume.to_string(), "transport.consume");
        assert_eq!(Method::from_tag("transport.bogus"), None);
    }

    #[test]
    fn unknown_event_is_none() {
        assert_eq!(Event::from_tag("producerclose"), Some(Event::ProducerClose));
        assert_eq!(Event::from_tag("icestatechange"), None);
    }
}

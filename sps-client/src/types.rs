use std::string::FromUtf8Error;

use sps_types::{
    payload::{Payload, PayloadError},
    topic::{state_host_topic, MessageKind, MessageTopic, NodeIdentifier, QoS, ScopeId},
    StatePayload,
};
use thiserror::Error;

/// Error types for inbound message processing.
///
/// Raised when a topic is not a valid Sparkplug topic or when a payload cannot be decoded.
#[derive(Error, Debug, PartialEq)]
pub enum MessageError {
    #[error("The topic was invalid")]
    InvalidSparkplugTopic,
    #[error("Topic parts utf8 decode error: {0}")]
    TopicUtf8Error(#[from] FromUtf8Error),
    #[error("There was an error decoding the payload: {0}")]
    InvalidPayload(PayloadError),
    #[error("Unable to decode state message: {0}")]
    InvalidStatePayload(PayloadError),
}

/// Error returned by [Client](crate::Client) operations.
#[derive(Error, Debug, PartialEq)]
pub enum ClientError {
    #[error("The client could not accept the request")]
    Unavailable,
    #[error("The payload could not be encoded: {0}")]
    Encode(PayloadError),
}

/// A node or device message, classified once at the transport boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: ScopeId,
    pub kind: MessageKind,
    pub payload: Payload,
}

/// An enum that represents the different types of events an [EventLoop](crate::EventLoop) implementation can produce.
#[derive(Debug, PartialEq)]
pub enum Event {
    Offline,
    Online,
    Message(Message),
    State {
        host_id: String,
        payload: StatePayload,
    },
    InvalidPublish {
        reason: MessageError,
        topic: Vec<u8>,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WillPayload {
    Node(Payload),
    State(StatePayload),
}

/// Structure representing the last will of a Node or Application
#[derive(Debug, Clone, PartialEq)]
pub struct LastWill {
    pub topic: String,
    pub retain: bool,
    pub qos: QoS,
    pub payload: WillPayload,
}

impl LastWill {
    /// The NDEATH certificate of an edge node
    pub fn new_node(id: &NodeIdentifier, payload: Payload) -> Self {
        let topic = MessageTopic::node(id, MessageKind::NDeath);
        let (qos, retain) = topic.get_publish_quality_retain();
        Self {
            topic: topic.topic,
            retain,
            qos,
            payload: WillPayload::Node(payload),
        }
    }

    /// The STATE offline message of a host application
    pub fn new_app(host_id: &str, timestamp: u64) -> Self {
        let payload = StatePayload::Offline { timestamp };
        let (qos, retain) = payload.get_publish_quality_retain();
        Self {
            topic: state_host_topic(host_id),
            retain,
            qos,
            payload: WillPayload::State(payload),
        }
    }
}

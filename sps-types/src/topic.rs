use std::fmt;

use crate::constants::{DBIRTH, DCMD, DDATA, DDEATH, NBIRTH, NCMD, NDATA, NDEATH, SPBV01, STATE};
use crate::utils::validate_name;

/// Used to uniquely identify an edge node
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct NodeIdentifier {
    pub group: String,
    pub node: String,
}

impl NodeIdentifier {
    pub fn new<S: Into<String>, S1: Into<String>>(group: S, node: S1) -> Self {
        Self {
            group: group.into(),
            node: node.into(),
        }
    }

    /// Validate both parts of the identifier can be used as topic segments
    pub fn validate(&self) -> Result<(), String> {
        validate_name(&self.group)?;
        validate_name(&self.node)
    }

    /// Create the identifier of a device belonging to this node
    pub fn device<S: Into<String>>(&self, device: S) -> DeviceIdentifier {
        DeviceIdentifier {
            node: self.clone(),
            device: device.into(),
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.node)
    }
}

/// Used to uniquely identify a device of an edge node
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct DeviceIdentifier {
    pub node: NodeIdentifier,
    pub device: String,
}

impl fmt::Display for DeviceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.device)
    }
}

/// The originator of a message: an edge node or one of its devices
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ScopeId {
    Node(NodeIdentifier),
    Device(DeviceIdentifier),
}

impl ScopeId {
    /// The edge node that owns this scope
    pub fn node(&self) -> &NodeIdentifier {
        match self {
            ScopeId::Node(id) => id,
            ScopeId::Device(id) => &id.node,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        match self {
            ScopeId::Node(_) => None,
            ScopeId::Device(id) => Some(&id.device),
        }
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeId::Node(id) => id.fmt(f),
            ScopeId::Device(id) => id.fmt(f),
        }
    }
}

/// The closed set of Sparkplug message kinds.
///
/// Decoded once from the topic at the transport boundary and matched exhaustively from there on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NBirth,
    NDeath,
    NData,
    NCmd,
    DBirth,
    DDeath,
    DData,
    DCmd,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NBirth => NBIRTH,
            MessageKind::NDeath => NDEATH,
            MessageKind::NData => NDATA,
            MessageKind::NCmd => NCMD,
            MessageKind::DBirth => DBIRTH,
            MessageKind::DDeath => DDEATH,
            MessageKind::DData => DDATA,
            MessageKind::DCmd => DCMD,
        }
    }

    /// Parse a topic message type token e.g `NBIRTH`
    pub fn from_token(token: &[u8]) -> Option<Self> {
        let kind = match token {
            b"NBIRTH" => MessageKind::NBirth,
            b"NDEATH" => MessageKind::NDeath,
            b"NDATA" => MessageKind::NData,
            b"NCMD" => MessageKind::NCmd,
            b"DBIRTH" => MessageKind::DBirth,
            b"DDEATH" => MessageKind::DDeath,
            b"DDATA" => MessageKind::DData,
            b"DCMD" => MessageKind::DCmd,
            _ => return None,
        };
        Some(kind)
    }

    /// True if the message is published on a device topic
    pub fn is_device(&self) -> bool {
        matches!(
            self,
            MessageKind::DBirth | MessageKind::DDeath | MessageKind::DData | MessageKind::DCmd
        )
    }

    /// True if messages of this kind carry an edge node sequence number
    pub fn is_sequenced(&self) -> bool {
        matches!(
            self,
            MessageKind::NBirth
                | MessageKind::NData
                | MessageKind::DBirth
                | MessageKind::DDeath
                | MessageKind::DData
        )
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        match self {
            MessageKind::NBirth => (QoS::AtMostOnce, false),
            MessageKind::NDeath => (QoS::AtLeastOnce, false),
            MessageKind::NData => (QoS::AtMostOnce, false),
            MessageKind::NCmd => (QoS::AtMostOnce, false),
            MessageKind::DBirth => (QoS::AtMostOnce, false),
            MessageKind::DDeath => (QoS::AtMostOnce, false),
            MessageKind::DData => (QoS::AtMostOnce, false),
            MessageKind::DCmd => (QoS::AtMostOnce, false),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A topic a node or device message is published on
#[derive(Clone, Debug, PartialEq)]
pub struct MessageTopic {
    pub topic: String,
    pub kind: MessageKind,
}

impl MessageTopic {
    pub fn node(id: &NodeIdentifier, kind: MessageKind) -> Self {
        Self {
            topic: format!("{}/{}/{}/{}", SPBV01, id.group, kind.as_str(), id.node),
            kind,
        }
    }

    pub fn device(id: &DeviceIdentifier, kind: MessageKind) -> Self {
        Self {
            topic: format!(
                "{}/{}/{}/{}/{}",
                SPBV01,
                id.node.group,
                kind.as_str(),
                id.node.node,
                id.device
            ),
            kind,
        }
    }

    /// Topic for a scope, picking the node or device form
    pub fn for_scope(id: &ScopeId, kind: MessageKind) -> Self {
        match id {
            ScopeId::Node(id) => Self::node(id, kind),
            ScopeId::Device(id) => Self::device(id, kind),
        }
    }

    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        self.kind.get_publish_quality_retain()
    }
}

/// A host application liveness topic
#[derive(Clone, Debug, PartialEq)]
pub struct StateTopic {
    pub topic: String,
}

impl StateTopic {
    /// Matches the liveness topic of every host
    pub fn new() -> Self {
        Self {
            topic: state_host_topic("+"),
        }
    }

    pub fn new_host(host_id: &str) -> Self {
        Self {
            topic: state_host_topic(host_id),
        }
    }
}

impl Default for StateTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Topic {
    Message(MessageTopic),
    State(StateTopic),
    Node { group_id: String, node_id: String },
    Group { id: String },
    Namespace,
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        match value {
            Topic::Message(topic) => topic.topic,
            Topic::State(topic) => topic.topic,
            Topic::Node { group_id, node_id } => format!("{SPBV01}/{group_id}/+/{node_id}/#"),
            Topic::Group { id } => format!("{SPBV01}/{id}/#"),
            Topic::Namespace => format!("{SPBV01}/#"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TopicFilter {
    pub topic: Topic,
    pub qos: QoS,
}

impl TopicFilter {
    pub fn new(topic: Topic) -> Self {
        Self::new_with_qos(topic, QoS::AtMostOnce)
    }

    pub fn new_with_qos(topic: Topic, qos: QoS) -> Self {
        Self { topic, qos }
    }
}

pub fn state_host_topic(host_id: &str) -> String {
    format!("{SPBV01}/{STATE}/{host_id}")
}

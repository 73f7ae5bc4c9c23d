use sps_core::error::{LifecycleError, SessionError};
use sps_types::{
    payload::Metric,
    topic::{DeviceIdentifier, MessageKind, NodeIdentifier, ScopeId},
    BdSeq,
};

/// Represents a situation where the application has requested a node rebirth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebirthReason {
    /// A message arrived for a node with no current birth
    UnknownNode,
    /// A message arrived for a device with no current birth
    UnknownDevice,
    /// A sequence gap did not fill within the rebirth timeout
    SeqOutOfOrder,
    MalformedPayload,
    /// A birth certificate assigned one alias to two metrics
    AliasConflict,
}

/// Details surrounding a rebirth request issued by the application
#[derive(Debug, Clone, PartialEq)]
pub struct RebirthReasonDetails {
    pub node_id: NodeIdentifier,
    pub device: Option<String>,
    pub reason: RebirthReason,
}

impl RebirthReasonDetails {
    pub(crate) fn new(node_id: NodeIdentifier, reason: RebirthReason) -> Self {
        Self {
            node_id,
            device: None,
            reason,
        }
    }

    pub(crate) fn with_device(mut self, device: String) -> Self {
        self.device = Some(device);
        self
    }
}

/// Events produced by [HostApplication::poll](crate::HostApplication::poll).
///
/// Data events for a node are produced in sequence order. Metrics are delivered with their names
/// resolved from aliases.
#[derive(Debug, PartialEq)]
pub enum HostEvent {
    Online,
    Offline,
    NBirth {
        id: NodeIdentifier,
        bdseq: BdSeq,
        timestamp: u64,
        metrics: Vec<Metric>,
    },
    NDeath {
        id: NodeIdentifier,
        bdseq: BdSeq,
    },
    NData {
        id: NodeIdentifier,
        timestamp: Option<u64>,
        metrics: Vec<Metric>,
    },
    DBirth {
        id: DeviceIdentifier,
        timestamp: Option<u64>,
        metrics: Vec<Metric>,
    },
    DDeath {
        id: DeviceIdentifier,
    },
    DData {
        id: DeviceIdentifier,
        timestamp: Option<u64>,
        metrics: Vec<Metric>,
    },
    /// A birth that does not supersede the current one was ignored
    StaleBirth {
        id: NodeIdentifier,
        error: LifecycleError,
    },
    /// A death belonging to a superseded session was ignored
    StaleDeath {
        id: NodeIdentifier,
        bdseq: BdSeq,
    },
    /// A single message could not be interpreted. The session is otherwise unaffected.
    InvalidMessage {
        id: ScopeId,
        kind: MessageKind,
        error: SessionError,
    },
    RebirthRequested(RebirthReasonDetails),
    /// The application was cancelled through [HostClient::cancel](crate::HostClient::cancel)
    Stopped,
}

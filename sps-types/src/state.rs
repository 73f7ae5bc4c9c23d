use serde::{Deserialize, Serialize};

use crate::{payload::PayloadError, topic::QoS};

#[derive(Serialize, Deserialize)]
struct StateCertificate {
    online: bool,
    timestamp: u64,
}

/// A message published on a host application STATE topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatePayload {
    Online { timestamp: u64 },
    Offline { timestamp: u64 },
}

impl StatePayload {
    pub fn timestamp(&self) -> u64 {
        match self {
            StatePayload::Online { timestamp } | StatePayload::Offline { timestamp } => *timestamp,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, StatePayload::Online { .. })
    }

    /// Get the [QoS] and retain settings that the State message should be published with
    pub fn get_publish_quality_retain(&self) -> (QoS, bool) {
        (QoS::AtLeastOnce, true)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, PayloadError> {
        let cert = StateCertificate {
            online: self.is_online(),
            timestamp: self.timestamp(),
        };
        serde_json::to_vec(&cert).map_err(|e| PayloadError::Codec(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        let cert: StateCertificate =
            serde_json::from_slice(bytes).map_err(|e| PayloadError::Codec(e.to_string()))?;
        Ok(if cert.online {
            StatePayload::Online {
                timestamp: cert.timestamp,
            }
        } else {
            StatePayload::Offline {
                timestamp: cert.timestamp,
            }
        })
    }
}

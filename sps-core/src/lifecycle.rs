use sps_types::BdSeq;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Offline,
    Online,
}

/// One birth generation of an edge node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BirthRecord {
    pub bdseq: BdSeq,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathOutcome {
    Accepted,
    /// The death belongs to a superseded session
    StaleIgnored,
}

/// Tracks the online state and birth generation of one edge node.
#[derive(Debug, Default, Clone)]
pub struct BirthDeathLifecycle {
    state: LifecycleState,
    birth: Option<BirthRecord>,
}

impl BirthDeathLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == LifecycleState::Online
    }

    /// The most recently accepted birth, kept after the node goes offline
    pub fn birth(&self) -> Option<&BirthRecord> {
        self.birth.as_ref()
    }

    /// Accept a birth, moving the node online.
    ///
    /// While online, a birth must either carry a newer bdSeq or repeat the current bdSeq with a
    /// newer timestamp (a rebirth within the same session). Anything else is stale.
    pub fn accept_birth(&mut self, bdseq: BdSeq, timestamp: u64) -> Result<(), LifecycleError> {
        if let (LifecycleState::Online, Some(current)) = (self.state, &self.birth) {
            let fresh = bdseq.is_newer_than(current.bdseq)
                || (bdseq == current.bdseq && timestamp > current.timestamp);
            if !fresh {
                return Err(LifecycleError::StaleBirth {
                    received: bdseq,
                    timestamp,
                    current: current.bdseq,
                    current_timestamp: current.timestamp,
                });
            }
        }
        self.birth = Some(BirthRecord { bdseq, timestamp });
        self.state = LifecycleState::Online;
        Ok(())
    }

    /// Accept a death only if its bdSeq matches the most recent birth.
    pub fn accept_death(&mut self, bdseq: BdSeq) -> DeathOutcome {
        match &self.birth {
            Some(birth) if self.state == LifecycleState::Online && birth.bdseq == bdseq => {
                self.state = LifecycleState::Offline;
                DeathOutcome::Accepted
            }
            _ => DeathOutcome::StaleIgnored,
        }
    }

    /// Transition offline without a death certificate
    pub fn force_offline(&mut self) {
        self.state = LifecycleState::Offline;
    }
}

/// Online state of a device under an online edge node.
#[derive(Debug, Default, Clone)]
pub struct DeviceLifecycle {
    state: LifecycleState,
    birth_timestamp: Option<u64>,
}

impl DeviceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_online(&self) -> bool {
        self.state == LifecycleState::Online
    }

    pub fn birth_timestamp(&self) -> Option<u64> {
        self.birth_timestamp
    }

    pub fn accept_birth(&mut self, timestamp: u64) {
        self.birth_timestamp = Some(timestamp);
        self.state = LifecycleState::Online;
    }

    /// Returns false if the device was already offline
    pub fn accept_death(&mut self) -> bool {
        let was_online = self.is_online();
        self.state = LifecycleState::Offline;
        was_online
    }

    pub fn force_offline(&mut self) {
        self.state = LifecycleState::Offline;
    }
}

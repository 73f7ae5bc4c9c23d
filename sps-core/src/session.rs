use std::{collections::HashMap, time::Duration};

use log::debug;
use sps_types::BdSeq;
use tokio::time::Instant;

use crate::{
    alias::AliasRegistry,
    error::LifecycleError,
    lifecycle::{BirthDeathLifecycle, DeathOutcome, DeviceLifecycle},
    reorder::ReorderBuffer,
};

/// Session state of one device under an edge node
#[derive(Debug, Default)]
pub struct DeviceSession {
    lifecycle: DeviceLifecycle,
    aliases: AliasRegistry,
}

impl DeviceSession {
    pub fn lifecycle(&self) -> &DeviceLifecycle {
        &self.lifecycle
    }

    pub fn is_online(&self) -> bool {
        self.lifecycle.is_online()
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasRegistry {
        &mut self.aliases
    }

    /// Moves the device online and clears aliases from any previous birth
    pub fn accept_birth(&mut self, timestamp: u64) {
        self.aliases.reset();
        self.lifecycle.accept_birth(timestamp);
    }

    pub fn accept_death(&mut self) -> bool {
        self.lifecycle.accept_death()
    }

    pub fn force_offline(&mut self) {
        self.lifecycle.force_offline();
    }
}

/// Everything a host tracks for one edge node session.
///
/// The node lifecycle, the sequence cursor, the reorder buffer and the alias registries of the
/// node and its devices live together so a birth can reset all of them in one step while the
/// owning lock is held.
pub struct NodeSession<T> {
    lifecycle: BirthDeathLifecycle,
    reorder: ReorderBuffer<T>,
    aliases: AliasRegistry,
    devices: HashMap<String, DeviceSession>,
    last_rebirth_request: Option<Instant>,
}

impl<T> NodeSession<T> {
    pub fn new(now: Instant) -> Self {
        Self {
            lifecycle: BirthDeathLifecycle::new(),
            reorder: ReorderBuffer::new(now),
            aliases: AliasRegistry::new(),
            devices: HashMap::new(),
            last_rebirth_request: None,
        }
    }

    pub fn lifecycle(&self) -> &BirthDeathLifecycle {
        &self.lifecycle
    }

    pub fn is_online(&self) -> bool {
        self.lifecycle.is_online()
    }

    pub fn birth_timestamp(&self) -> Option<u64> {
        self.lifecycle.birth().map(|birth| birth.timestamp)
    }

    pub fn reorder(&self) -> &ReorderBuffer<T> {
        &self.reorder
    }

    pub fn reorder_mut(&mut self) -> &mut ReorderBuffer<T> {
        &mut self.reorder
    }

    pub fn aliases(&self) -> &AliasRegistry {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasRegistry {
        &mut self.aliases
    }

    pub fn device(&self, name: &str) -> Option<&DeviceSession> {
        self.devices.get(name)
    }

    pub fn device_mut(&mut self, name: &str) -> Option<&mut DeviceSession> {
        self.devices.get_mut(name)
    }

    /// Get a device, creating an offline one if it has not been seen before
    pub fn device_entry(&mut self, name: &str) -> &mut DeviceSession {
        self.devices.entry(name.to_string()).or_default()
    }

    pub fn online_devices(&self) -> impl Iterator<Item = &str> {
        self.devices
            .iter()
            .filter(|(_, device)| device.is_online())
            .map(|(name, _)| name.as_str())
    }

    fn devices_offline(&mut self) {
        for device in self.devices.values_mut() {
            device.force_offline();
        }
    }

    /// Start a new birth generation.
    ///
    /// On success the sequence expectation restarts at 0, held messages from before the birth are
    /// dropped, the node's aliases are cleared and every device goes offline until it births again.
    pub fn accept_birth(
        &mut self,
        bdseq: BdSeq,
        timestamp: u64,
        now: Instant,
    ) -> Result<(), LifecycleError> {
        self.lifecycle.accept_birth(bdseq, timestamp)?;
        self.reorder.restart(timestamp, now);
        self.aliases.reset();
        self.devices_offline();
        Ok(())
    }

    pub fn accept_death(&mut self, bdseq: BdSeq, now: Instant) -> DeathOutcome {
        let outcome = self.lifecycle.accept_death(bdseq);
        if outcome == DeathOutcome::Accepted {
            self.reorder.reset(now);
            self.devices_offline();
        }
        outcome
    }

    /// Transition offline without a death certificate, e.g. after the host loses its transport
    pub fn force_offline(&mut self, now: Instant) {
        self.lifecycle.force_offline();
        self.reorder.reset(now);
        self.devices_offline();
    }

    /// Returns true, and records the request, if no rebirth was requested within `cooldown`
    pub fn rebirth_request_allowed(&mut self, now: Instant, cooldown: Duration) -> bool {
        if let Some(last) = self.last_rebirth_request {
            if now.saturating_duration_since(last) < cooldown {
                debug!("Rebirth request suppressed by cooldown");
                return false;
            }
        }
        self.last_rebirth_request = Some(now);
        true
    }
}

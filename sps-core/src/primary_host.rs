use std::time::Duration;

use log::{debug, info};
use sps_types::{topic::MessageKind, StatePayload};
use tokio::{sync::mpsc, time::Instant};

use crate::timer::TimerSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    AwaitingHost,
    Bound,
}

/// Result of feeding a liveness message to [PrimaryHostMonitor::on_state]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTransition {
    /// The message was for a different host, or no primary host is configured
    Ignored,
    /// The message is older than the last one seen
    Stale,
    /// The host came online, data may be published
    Bound,
    /// The host went offline, data is suppressed
    Lost,
    Unchanged,
}

/// Edge side watcher of the primary host's liveness.
///
/// Gates data publication while the host is not known to be online and debounces rebirth requests.
#[derive(Debug)]
pub struct PrimaryHostMonitor {
    host_id: Option<String>,
    state: HostState,
    last_state: Option<StatePayload>,
    response_timer: TimerSlot,
    response_timeout: Duration,
    debounce: Duration,
    rebirth_blocked_until: Option<Instant>,
}

impl PrimaryHostMonitor {
    pub fn new(host_id: Option<String>, response_timeout: Duration, debounce: Duration) -> Self {
        Self {
            host_id,
            state: HostState::AwaitingHost,
            last_state: None,
            response_timer: TimerSlot::new(),
            response_timeout,
            debounce,
            rebirth_blocked_until: None,
        }
    }

    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    /// True if data messages can be published
    pub fn may_publish_data(&self) -> bool {
        self.host_id.is_none() || self.state == HostState::Bound
    }

    /// Only data messages are gated. Births, deaths and commands always pass.
    pub fn may_publish(&self, kind: MessageKind) -> bool {
        match kind {
            MessageKind::NData | MessageKind::DData => self.may_publish_data(),
            _ => true,
        }
    }

    /// Called once subscribed to the host's liveness topic.
    ///
    /// Starts the response timer, which sends `make(generation)` on `tx` if the host is not seen
    /// online in time. Returns false when no primary host is configured and there is nothing to wait for.
    pub fn await_host<T, F>(&mut self, tx: mpsc::Sender<T>, make: F) -> bool
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        if self.host_id.is_none() {
            return false;
        }
        if self.state == HostState::Bound {
            return true;
        }
        self.response_timer.arm(self.response_timeout, tx, make);
        true
    }

    pub fn on_state(&mut self, host_id: &str, payload: StatePayload) -> HostTransition {
        match &self.host_id {
            Some(id) if id == host_id => (),
            _ => return HostTransition::Ignored,
        }

        if let Some(last) = &self.last_state {
            if payload.timestamp() < last.timestamp() {
                debug!(
                    "Ignoring stale primary host state. host = {host_id}, timestamp = {}, last = {}",
                    payload.timestamp(),
                    last.timestamp()
                );
                return HostTransition::Stale;
            }
        }
        self.last_state = Some(payload);

        match (self.state, payload.is_online()) {
            (HostState::AwaitingHost, true) => {
                info!("Primary host online. host = {host_id}");
                self.response_timer.cancel();
                self.state = HostState::Bound;
                HostTransition::Bound
            }
            (HostState::Bound, false) => {
                info!("Primary host offline. host = {host_id}");
                self.state = HostState::AwaitingHost;
                HostTransition::Lost
            }
            _ => HostTransition::Unchanged,
        }
    }

    /// Consume a response timer message. Returns true if the host failed to respond in time.
    pub fn on_response_timeout(&mut self, generation: u64) -> bool {
        self.response_timer.fired(generation) && self.state == HostState::AwaitingHost
    }

    /// Decide whether a rebirth request should be honoured.
    ///
    /// Requests arriving within the debounce window of the last published rebirth are ignored.
    pub fn on_rebirth_requested(&self, now: Instant) -> bool {
        if let Some(until) = self.rebirth_blocked_until {
            if now < until {
                debug!("Ignoring rebirth request inside debounce window");
                return false;
            }
        }
        true
    }

    /// Record that a birth has just been published. Rebinds to the host if its last known state was online.
    pub fn birth_published(&mut self) {
        if self.last_state.is_some_and(|s| s.is_online()) {
            self.state = HostState::Bound;
        }
    }

    /// Record that a requested rebirth has been published.
    ///
    /// The host binding is re-evaluated from its last known state and further rebirth requests are
    /// ignored until the debounce delay plus `jitter` has passed.
    pub fn rebirth_published(&mut self, now: Instant, jitter: Duration) {
        if self.host_id.is_some() {
            self.state = HostState::AwaitingHost;
        }
        self.birth_published();
        self.rebirth_blocked_until = Some(now + self.debounce + jitter);
    }

    /// Reset on transport disconnect. The last state timestamp is kept for staleness checks.
    pub fn reset(&mut self) {
        self.response_timer.cancel();
        self.state = HostState::AwaitingHost;
        self.rebirth_blocked_until = None;
        if let Some(last) = &self.last_state {
            self.last_state = Some(StatePayload::Offline {
                timestamp: last.timestamp(),
            });
        }
    }
}

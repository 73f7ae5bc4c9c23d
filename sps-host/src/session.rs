use std::{sync::Arc, time::Duration};

use log::{debug, info, trace, warn};
use sps_client::{DynClient, Message, PoolError, PublishJob, PublishPool};
use sps_core::{
    config::SessionConfig,
    error::{LifecycleError, SessionError},
    Arrival, DeathOutcome, LifecycleState, NodeSession, ScopeRegistry,
};
use sps_types::{
    constants::NODE_CONTROL_REBIRTH,
    payload::{DataType, Metric, Payload, Value},
    topic::{DeviceIdentifier, MessageKind, MessageTopic, NodeIdentifier, ScopeId},
    utils::timestamp,
    BdSeq,
};
use tokio::time::Instant;

use crate::events::{HostEvent, RebirthReason, RebirthReasonDetails};

const PUBLISH_WORKERS: usize = 4;
const PUBLISH_QUEUE_CAPACITY: usize = 64;

type Session = NodeSession<Message>;

/// The NCMD payload asking an edge node to republish its births
pub fn rebirth_command() -> Payload {
    let mut metric = Metric::new();
    metric
        .set_name(NODE_CONTROL_REBIRTH.to_string())
        .set_datatype(DataType::Boolean)
        .set_value(Value::BooleanValue(true));
    Payload {
        timestamp: Some(timestamp()),
        metrics: vec![metric],
        seq: None,
        uuid: None,
        body: None,
    }
}

fn birth_fields(payload: &Payload) -> Result<(BdSeq, u64), SessionError> {
    let seq = payload.seq_number()?;
    if seq != 0 {
        return Err(SessionError::SequenceViolation {
            expected: 0,
            received: seq,
        });
    }
    Ok((payload.bdseq()?, payload.timestamp()?))
}

/// Host side processing of inbound node and device messages.
///
/// Keeps one [NodeSession] per edge node in a [ScopeRegistry]. Each message is validated and
/// sequenced under its node's lock, so processing for one node never waits on another. Rebirth
/// requests are queued on a [PublishPool] and never block ingestion.
pub struct SessionManager {
    sessions: ScopeRegistry<NodeIdentifier, Session>,
    pool: PublishPool,
    rebirth_timeout: Duration,
    rebirth_debounce: Duration,
}

impl SessionManager {
    /// Must be called from within a tokio runtime.
    pub fn new(client: Arc<DynClient>, config: &SessionConfig) -> Self {
        Self {
            sessions: ScopeRegistry::new(),
            pool: PublishPool::new(client, PUBLISH_WORKERS, PUBLISH_QUEUE_CAPACITY),
            rebirth_timeout: config.rebirth_timeout,
            rebirth_debounce: config.rebirth_debounce,
        }
    }

    pub fn node_state(&self, id: &NodeIdentifier) -> Option<LifecycleState> {
        self.sessions
            .get(id)
            .map(|session| session.lock().unwrap().lifecycle().state())
    }

    pub fn device_online(&self, id: &DeviceIdentifier) -> bool {
        self.sessions.get(&id.node).is_some_and(|session| {
            session
                .lock()
                .unwrap()
                .device(&id.device)
                .is_some_and(|device| device.is_online())
        })
    }

    /// The sequence number the node's next message must carry
    pub fn expected_seq(&self, id: &NodeIdentifier) -> Option<u8> {
        self.sessions
            .get(id)
            .map(|session| session.lock().unwrap().reorder().expected())
    }

    pub(crate) fn submit(&self, key: &str, job: PublishJob) -> Result<(), PoolError> {
        self.pool.submit(key, job)
    }

    /// Process one inbound message, returning the events it produced in order
    pub fn process(&self, message: Message, now: Instant) -> Vec<HostEvent> {
        let id = message.id.node().clone();
        let mut events = Vec::new();
        match message.kind {
            MessageKind::NBirth => self.on_node_birth(id, message, now, &mut events),
            MessageKind::NDeath => self.on_node_death(id, message, now, &mut events),
            MessageKind::NCmd | MessageKind::DCmd => {
                trace!("Ignoring command. scope = {}, kind = {}", message.id, message.kind)
            }
            _ => self.on_sequenced(id, message, now, &mut events),
        }
        events
    }

    /// Request a rebirth from every node whose sequence gap has outlived the rebirth timeout
    pub fn check_expired(&self, now: Instant) -> Vec<HostEvent> {
        let mut events = Vec::new();
        for (id, session) in self.sessions.snapshot() {
            let mut session = session.lock().unwrap();
            let expired = match session
                .reorder_mut()
                .take_expired(now, self.rebirth_timeout)
            {
                Some(expired) => expired,
                None => continue,
            };
            warn!(
                "Sequence gap not resolved in time. node = {id}, held = {} {}",
                expired.kind,
                expired.payload.seq.unwrap_or_default()
            );
            self.request_rebirth(
                &mut session,
                RebirthReasonDetails::new(id, RebirthReason::SeqOutOfOrder),
                now,
                &mut events,
            );
        }
        events
    }

    /// Mark every node offline after the transport disconnected
    pub fn force_offline_all(&self, now: Instant) {
        for (_, session) in self.sessions.snapshot() {
            session.lock().unwrap().force_offline(now);
        }
    }

    fn request_rebirth(
        &self,
        session: &mut Session,
        details: RebirthReasonDetails,
        now: Instant,
        events: &mut Vec<HostEvent>,
    ) {
        if !session.rebirth_request_allowed(now, self.rebirth_debounce) {
            debug!(
                "Rebirth request suppressed by cooldown. node = {}",
                details.node_id
            );
            return;
        }
        let topic = MessageTopic::node(&details.node_id, MessageKind::NCmd);
        let job = PublishJob::Message {
            topic,
            payload: rebirth_command(),
        };
        match self.pool.submit(&details.node_id, job) {
            Ok(()) => {
                info!(
                    "Requesting rebirth. node = {}, reason = {:?}",
                    details.node_id, details.reason
                );
                events.push(HostEvent::RebirthRequested(details));
            }
            Err(e) => warn!(
                "Unable to queue rebirth request. node = {}, error = {e}",
                details.node_id
            ),
        }
    }

    fn on_node_birth(
        &self,
        id: NodeIdentifier,
        message: Message,
        now: Instant,
        events: &mut Vec<HostEvent>,
    ) {
        let (session, _) = self.sessions.get_or_create(&id, || NodeSession::new(now));
        let mut session = session.lock().unwrap();

        let (bdseq, timestamp) = match birth_fields(&message.payload) {
            Ok(fields) => fields,
            Err(error) => {
                warn!("Invalid birth certificate - discarding. node = {id}, error = {error}");
                events.push(HostEvent::InvalidMessage {
                    id: message.id,
                    kind: message.kind,
                    error,
                });
                let details = RebirthReasonDetails::new(id, RebirthReason::MalformedPayload);
                self.request_rebirth(&mut session, details, now, events);
                return;
            }
        };

        if let Some(current) = session.lifecycle().birth() {
            if !session.is_online() && timestamp <= current.timestamp {
                debug!("Ignoring birth older than the last known birth. node = {id}");
                events.push(HostEvent::StaleBirth {
                    id,
                    error: LifecycleError::StaleBirth {
                        received: bdseq,
                        timestamp,
                        current: current.bdseq,
                        current_timestamp: current.timestamp,
                    },
                });
                return;
            }
        }

        if let Err(error) = session.accept_birth(bdseq, timestamp, now) {
            debug!("Ignoring stale birth. node = {id}, error = {error}");
            events.push(HostEvent::StaleBirth { id, error });
            return;
        }
        info!("Node birth accepted. node = {id}, bdSeq = {bdseq}");

        if let Arrival::Accepted(messages) =
            session
                .reorder_mut()
                .process(0, Some(timestamp), message, now)
        {
            for message in messages {
                self.on_accepted(&id, &mut session, message, now, events);
            }
        }
    }

    fn on_node_death(
        &self,
        id: NodeIdentifier,
        message: Message,
        now: Instant,
        events: &mut Vec<HostEvent>,
    ) {
        let bdseq = match message.payload.bdseq() {
            Ok(bdseq) => bdseq,
            Err(e) => {
                warn!("Invalid death certificate - discarding. node = {id}, error = {e}");
                events.push(HostEvent::InvalidMessage {
                    id: message.id,
                    kind: message.kind,
                    error: e.into(),
                });
                return;
            }
        };

        let (session, created) = self.sessions.get_or_create(&id, || NodeSession::new(now));
        let mut session = session.lock().unwrap();
        if created || session.lifecycle().birth().is_none() {
            debug!("Death certificate for unknown node. node = {id}, bdSeq = {bdseq}");
            let details = RebirthReasonDetails::new(id, RebirthReason::UnknownNode);
            self.request_rebirth(&mut session, details, now, events);
            return;
        }

        match session.accept_death(bdseq, now) {
            DeathOutcome::Accepted => {
                info!("Node death accepted. node = {id}, bdSeq = {bdseq}");
                events.push(HostEvent::NDeath { id, bdseq });
            }
            DeathOutcome::StaleIgnored => {
                debug!("Ignoring death of a superseded session. node = {id}, bdSeq = {bdseq}");
                events.push(HostEvent::StaleDeath { id, bdseq });
            }
        }
    }

    fn on_sequenced(
        &self,
        id: NodeIdentifier,
        message: Message,
        now: Instant,
        events: &mut Vec<HostEvent>,
    ) {
        let (session, created) = self.sessions.get_or_create(&id, || NodeSession::new(now));
        let mut session = session.lock().unwrap();

        if created || !session.is_online() {
            debug!(
                "Message for node without a current birth. node = {id}, kind = {}",
                message.kind
            );
            let details = RebirthReasonDetails::new(id, RebirthReason::UnknownNode);
            self.request_rebirth(&mut session, details, now, events);
            return;
        }

        let seq = match message.payload.seq_number() {
            Ok(seq) => seq,
            Err(e) => {
                warn!("Message has an invalid sequence number - discarding. node = {id}, error = {e}");
                events.push(HostEvent::InvalidMessage {
                    id: message.id,
                    kind: message.kind,
                    error: e.into(),
                });
                let details = RebirthReasonDetails::new(id, RebirthReason::MalformedPayload);
                self.request_rebirth(&mut session, details, now, events);
                return;
            }
        };

        if let (Some(birth), Some(ts)) = (session.birth_timestamp(), message.payload.timestamp) {
            if ts < birth {
                debug!("Dropping message from before the current birth. node = {id}, seq = {seq}");
                return;
            }
        }

        let expected = session.reorder().expected();
        let timestamp = message.payload.timestamp;
        match session.reorder_mut().process(seq, timestamp, message, now) {
            Arrival::Accepted(messages) => {
                for message in messages {
                    self.on_accepted(&id, &mut session, message, now, events);
                }
            }
            Arrival::Buffered => debug!(
                "Holding message. node = {id}, {}",
                SessionError::SequenceViolation {
                    expected,
                    received: seq
                }
            ),
            Arrival::Duplicate => (),
        }
    }

    /// Handle a message released in sequence order
    fn on_accepted(
        &self,
        id: &NodeIdentifier,
        session: &mut Session,
        message: Message,
        now: Instant,
        events: &mut Vec<HostEvent>,
    ) {
        let Message {
            id: scope,
            kind,
            mut payload,
        } = message;
        let timestamp = payload.timestamp;

        match (kind, scope) {
            (MessageKind::NBirth, scope) => {
                if let Err(e) = session.aliases_mut().record_birth_metrics(&payload.metrics) {
                    warn!("Birth certificate has conflicting aliases. node = {id}, error = {e}");
                    events.push(HostEvent::InvalidMessage {
                        id: scope,
                        kind,
                        error: e.into(),
                    });
                    let details = RebirthReasonDetails::new(id.clone(), RebirthReason::AliasConflict);
                    self.request_rebirth(session, details, now, events);
                    return;
                }
                let bdseq = session
                    .lifecycle()
                    .birth()
                    .map(|birth| birth.bdseq)
                    .unwrap_or_default();
                events.push(HostEvent::NBirth {
                    id: id.clone(),
                    bdseq,
                    timestamp: timestamp.unwrap_or_default(),
                    metrics: payload.metrics,
                });
            }
            (MessageKind::NData, scope) => {
                match session.aliases().resolve_metrics(&mut payload.metrics) {
                    Ok(()) => events.push(HostEvent::NData {
                        id: id.clone(),
                        timestamp,
                        metrics: payload.metrics,
                    }),
                    Err(e) => {
                        warn!("Unable to resolve metric aliases. node = {id}, error = {e}");
                        events.push(HostEvent::InvalidMessage {
                            id: scope,
                            kind,
                            error: e.into(),
                        })
                    }
                }
            }
            (MessageKind::DBirth, ScopeId::Device(device_id)) => {
                let device = session.device_entry(&device_id.device);
                device.accept_birth(timestamp.unwrap_or_default());
                let recorded = device.aliases_mut().record_birth_metrics(&payload.metrics);
                if let Err(e) = recorded {
                    warn!("Device birth has conflicting aliases. device = {device_id}, error = {e}");
                    let details = RebirthReasonDetails::new(id.clone(), RebirthReason::AliasConflict)
                        .with_device(device_id.device.clone());
                    events.push(HostEvent::InvalidMessage {
                        id: ScopeId::Device(device_id),
                        kind,
                        error: e.into(),
                    });
                    self.request_rebirth(session, details, now, events);
                    return;
                }
                info!("Device birth accepted. device = {device_id}");
                events.push(HostEvent::DBirth {
                    id: device_id,
                    timestamp,
                    metrics: payload.metrics,
                });
            }
            (MessageKind::DData, ScopeId::Device(device_id)) => {
                let resolved = match session.device(&device_id.device) {
                    Some(device) if device.is_online() => {
                        Some(device.aliases().resolve_metrics(&mut payload.metrics))
                    }
                    _ => None,
                };
                match resolved {
                    Some(Ok(())) => events.push(HostEvent::DData {
                        id: device_id,
                        timestamp,
                        metrics: payload.metrics,
                    }),
                    Some(Err(e)) => {
                        warn!("Unable to resolve metric aliases. device = {device_id}, error = {e}");
                        events.push(HostEvent::InvalidMessage {
                            id: ScopeId::Device(device_id),
                            kind,
                            error: e.into(),
                        })
                    }
                    None => {
                        debug!("Data for device without a current birth. device = {device_id}");
                        let details = RebirthReasonDetails::new(id.clone(), RebirthReason::UnknownDevice)
                            .with_device(device_id.device);
                        self.request_rebirth(session, details, now, events);
                    }
                }
            }
            (MessageKind::DDeath, ScopeId::Device(device_id)) => {
                let was_online = session
                    .device_mut(&device_id.device)
                    .is_some_and(|device| device.accept_death());
                if was_online {
                    info!("Device death accepted. device = {device_id}");
                    events.push(HostEvent::DDeath { id: device_id });
                } else {
                    debug!("Ignoring death of offline device. device = {device_id}");
                }
            }
            (kind, scope) => debug!("Ignoring unexpected message. scope = {scope}, kind = {kind}"),
        }
    }
}

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use log::{debug, error, info, warn};
use sps_client::{DynClient, DynEventLoop, Event, LastWill, Message};
use sps_core::{
    config::SessionConfig, error::AliasError, AliasRegistry, HostState, HostTransition,
    PrimaryHostMonitor, SequenceCounter,
};
use sps_types::{
    constants::NODE_CONTROL_REBIRTH,
    payload::{DataType, Metric, Payload, Value},
    topic::{MessageKind, MessageTopic, NodeIdentifier, QoS, ScopeId, StateTopic, Topic, TopicFilter},
    utils::timestamp,
    BdSeq, EndpointRing, StatePayload,
};
use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::{timeout, Instant},
};

use crate::{
    bdseq_store::DynBdSeqStore,
    device::{birth_devices, Device, DeviceMap},
    error::{BuildError, DeviceRegistrationError},
    metric_manager::DynNodeMetricManager,
    BirthType, DeviceHandle, DeviceMetricManager, EoNBuilder, MetricPublisher, PublishError,
};

struct EoNStateInner {
    seq: SequenceCounter,
    online: bool,
    birthed: bool,
    host: PrimaryHostMonitor,
    aliases: AliasRegistry,
    /// next free alias after the node and device births of the current generation
    alias_cursor: u64,
    /// incremented by every NBIRTH, devices may only publish data stamped with the current value
    generation: u64,
}

pub(crate) struct EoNState {
    running: AtomicBool,
    bdseq: AtomicU8,
    inner: Mutex<EoNStateInner>,
    use_aliases: bool,
    pub id: NodeIdentifier,
    pub ndata_topic: MessageTopic,
}

impl EoNState {
    fn bdseq(&self) -> BdSeq {
        BdSeq::new(self.bdseq.load(Ordering::SeqCst))
    }

    fn online_swap(&self, online: bool) -> bool {
        let mut state = self.inner.lock().unwrap();
        let old_online_state = state.online;
        state.online = online;
        old_online_state
    }

    pub(crate) fn is_online(&self) -> bool {
        self.inner.lock().unwrap().online
    }

    fn birthed(&self) -> bool {
        self.inner.lock().unwrap().birthed
    }

    fn set_dead(&self) {
        self.inner.lock().unwrap().birthed = false;
    }

    /// Ends the current session, returning the bdSeq of the next one
    fn end_session(&self) -> BdSeq {
        let mut state = self.inner.lock().unwrap();
        state.birthed = false;
        state.host.reset();
        let next = self.bdseq().next();
        self.bdseq.store(next.value(), Ordering::SeqCst);
        next
    }

    /// Restart the sequence and build the NBIRTH payload, assigning fresh aliases if enabled.
    fn begin_birth(&self, mut metrics: Vec<Metric>) -> Result<Payload, AliasError> {
        let mut state = self.inner.lock().unwrap();
        state.birthed = false;
        state.generation += 1;
        state.seq.reset();
        if self.use_aliases {
            state.aliases.reset();
            state.aliases.assign_birth_metrics(&mut metrics)?;
            state.alias_cursor = state.aliases.next_alias();
        }

        let mut rebirth = Metric::new();
        rebirth
            .set_name(NODE_CONTROL_REBIRTH.to_string())
            .set_datatype(DataType::Boolean)
            .set_value(Value::BooleanValue(false));

        let mut birth_metrics = Vec::with_capacity(metrics.len() + 2);
        birth_metrics.push(self.bdseq().to_metric());
        birth_metrics.push(rebirth);
        birth_metrics.extend(metrics);

        Ok(Payload {
            seq: Some(state.seq.next() as u64),
            timestamp: Some(timestamp()),
            metrics: birth_metrics,
            uuid: None,
            body: None,
        })
    }

    fn birth_completed(&self) {
        let mut state = self.inner.lock().unwrap();
        state.birthed = true;
        state.host.birth_published();
    }

    /// Build a DBIRTH payload and stamp the device with the current birth generation.
    /// Device aliases continue from where the node's allocation ended.
    pub(crate) fn device_birth_payload(
        &self,
        device: &Device,
        mut metrics: Vec<Metric>,
    ) -> Result<Payload, PublishError> {
        let mut state = self.inner.lock().unwrap();
        if !state.online {
            return Err(PublishError::Offline);
        }
        if !state.birthed {
            return Err(PublishError::UnBirthed);
        }
        if self.use_aliases {
            let mut aliases = device.aliases().lock().unwrap();
            aliases.reset_with_base(state.alias_cursor);
            aliases.assign_birth_metrics(&mut metrics)?;
            state.alias_cursor = aliases.next_alias();
        }
        device.generation.store(state.generation, Ordering::SeqCst);
        Ok(Payload {
            seq: Some(state.seq.next() as u64),
            timestamp: Some(timestamp()),
            metrics,
            uuid: None,
            body: None,
        })
    }

    /// Next sequence number for an ungated message such as a DDEATH
    pub(crate) fn next_seq(&self) -> Result<u64, PublishError> {
        let mut state = self.inner.lock().unwrap();
        if !state.online {
            return Err(PublishError::Offline);
        }
        if !state.birthed {
            return Err(PublishError::UnBirthed);
        }
        Ok(state.seq.next() as u64)
    }

    /// Check a data message may be sent, compress metric names if aliasing is enabled and take the next sequence number.
    pub(crate) fn prepare_publish(
        &self,
        kind: MessageKind,
        device: Option<&Device>,
        metrics: &mut [Metric],
    ) -> Result<u64, PublishError> {
        let mut state = self.inner.lock().unwrap();
        if !state.online {
            return Err(PublishError::Offline);
        }
        if !state.birthed {
            return Err(PublishError::UnBirthed);
        }
        /* a device keeps the previous generation until its DBIRTH for the current one is built */
        if device.is_some_and(|d| d.generation.load(Ordering::SeqCst) != state.generation) {
            return Err(PublishError::UnBirthed);
        }
        if !state.host.may_publish(kind) {
            return Err(PublishError::Suppressed);
        }
        if self.use_aliases {
            match device {
                Some(device) => device.aliases().lock().unwrap().compress(metrics),
                None => state.aliases.compress(metrics),
            }
        }
        Ok(state.seq.next() as u64)
    }

    /// Fill in the names of command metrics addressed by alias
    pub(crate) fn resolve_command(
        &self,
        device_aliases: Option<&Mutex<AliasRegistry>>,
        metrics: &mut [Metric],
    ) -> Result<(), AliasError> {
        match device_aliases {
            Some(aliases) => aliases.lock().unwrap().resolve_metrics(metrics),
            None => self.inner.lock().unwrap().aliases.resolve_metrics(metrics),
        }
    }

    /// Start waiting for the primary host. Returns true if the birth must wait for it.
    fn await_host(&self, tx: mpsc::Sender<NodeTimer>) -> bool {
        let mut state = self.inner.lock().unwrap();
        state.host.await_host(tx, NodeTimer::HostResponse) && state.host.state() != HostState::Bound
    }

    fn on_host_state(&self, host_id: &str, payload: StatePayload) -> HostTransition {
        self.inner.lock().unwrap().host.on_state(host_id, payload)
    }

    fn host_response_timed_out(&self, generation: u64) -> bool {
        self.inner
            .lock()
            .unwrap()
            .host
            .on_response_timeout(generation)
    }

    fn rebirth_requested(&self, now: Instant) -> bool {
        self.inner.lock().unwrap().host.on_rebirth_requested(now)
    }

    fn rebirth_published(&self, now: Instant, jitter: Duration) {
        self.inner
            .lock()
            .unwrap()
            .host
            .rebirth_published(now, jitter)
    }

    fn generate_death_payload(&self) -> Payload {
        Payload {
            seq: None,
            metrics: vec![self.bdseq().to_metric()],
            uuid: None,
            timestamp: Some(timestamp()),
            body: None,
        }
    }

    fn create_last_will(&self) -> LastWill {
        LastWill::new_node(&self.id, self.generate_death_payload())
    }

    fn sub_topics(&self) -> Vec<TopicFilter> {
        let mut topics = vec![
            TopicFilter::new_with_qos(
                Topic::Message(MessageTopic::node(&self.id, MessageKind::NCmd)),
                QoS::AtLeastOnce,
            ),
            TopicFilter::new_with_qos(
                Topic::Message(MessageTopic::device(&self.id.device("+"), MessageKind::DCmd)),
                QoS::AtLeastOnce,
            ),
            TopicFilter::new_with_qos(
                Topic::Message(MessageTopic::node(&self.id, MessageKind::NDeath)),
                QoS::AtLeastOnce,
            ),
        ];
        if let Some(host_id) = self.inner.lock().unwrap().host.host_id() {
            topics.push(TopicFilter::new_with_qos(
                Topic::State(StateTopic::new_host(host_id)),
                QoS::AtLeastOnce,
            ));
        }
        topics
    }
}

pub(crate) fn data_payload(seq: u64, metrics: Vec<Metric>) -> Payload {
    Payload {
        timestamp: Some(timestamp()),
        metrics,
        seq: Some(seq),
        uuid: None,
        body: None,
    }
}

#[derive(Debug)]
struct EoNShutdown;

/// A handle for interacting with the Edge Node.
///
/// `NodeHandle` provides an interface for interacting with an edge node,
/// including device management, node lifecycle operations, and metric publishing.
#[derive(Clone)]
pub struct NodeHandle {
    state: Arc<EoNState>,
    client: Arc<DynClient>,
    devices: Arc<Mutex<DeviceMap>>,
    stop_tx: mpsc::Sender<EoNShutdown>,
    rebirth_tx: mpsc::Sender<()>,
}

impl NodeHandle {
    /// Stop all operations, sending a death certificate and disconnect from the broker.
    ///
    /// This will cancel [EoN::run()]
    pub async fn cancel(&self) {
        if !self.state.running.load(Ordering::SeqCst) {
            return;
        }
        info!("Edge node stopping. node = {}", self.state.id);
        self.state.set_dead();
        let topic = MessageTopic::node(&self.state.id, MessageKind::NDeath);
        let payload = self.state.generate_death_payload();
        if self.client.try_publish_message(topic, payload).await.is_err() {
            debug!("Unable to publish node death certificate on exit");
        }
        _ = self.stop_tx.send(EoNShutdown).await;
        _ = self.client.disconnect().await;
    }

    /// Manually trigger a rebirth for the node. Subject to the rebirth debounce.
    pub fn rebirth(&self) {
        //try send, if the channel (size 1) is full then a rebirth will be executed anyways
        _ = self.rebirth_tx.try_send(());
    }

    pub fn id(&self) -> &NodeIdentifier {
        &self.state.id
    }

    /// The bdSeq of the current session
    pub fn bdseq(&self) -> BdSeq {
        self.state.bdseq()
    }

    /// Registers a new device with the node. If the node is birthed the device is birthed immediately.
    ///
    /// Returns an error if:
    ///   - A device with the same name is already registered
    ///   - The device name is invalid
    pub async fn register_device<S, M>(
        &self,
        name: S,
        dev_impl: M,
    ) -> Result<DeviceHandle, DeviceRegistrationError>
    where
        S: Into<String>,
        M: DeviceMetricManager + Send + Sync + 'static,
    {
        let name = name.into();
        if let Err(e) = sps_types::utils::validate_name(&name) {
            return Err(DeviceRegistrationError::InvalidName(e));
        }
        let handle = self.devices.lock().unwrap().add_device(
            self.state.id.device(name),
            Arc::new(dev_impl),
            self.state.clone(),
            self.client.clone(),
        )?;
        handle.device.birth(&BirthType::Birth).await;
        Ok(handle)
    }

    /// Unregister a device using it's handle, publishing its death certificate.
    pub async fn unregister_device(&self, handle: DeviceHandle) {
        self.unregister_device_named(handle.name()).await;
    }

    /// Unregister a device using it's name.
    pub async fn unregister_device_named(&self, name: &str) {
        let device = self.devices.lock().unwrap().remove_device(name);
        if let Some(device) = device {
            device.death(true).await
        }
    }

    async fn publish_data(
        &self,
        mut metrics: Vec<Metric>,
        try_publish: bool,
    ) -> Result<(), PublishError> {
        if metrics.is_empty() {
            return Err(PublishError::NoMetrics);
        }
        let seq = self
            .state
            .prepare_publish(MessageKind::NData, None, &mut metrics)?;
        let topic = self.state.ndata_topic.clone();
        let payload = data_payload(seq, metrics);
        if try_publish {
            self.client.try_publish_message(topic, payload).await?;
        } else {
            self.client.publish_message(topic, payload).await?;
        }
        Ok(())
    }
}

impl MetricPublisher for NodeHandle {
    async fn try_publish_metrics_unsorted(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.publish_data(metrics, true).await
    }

    async fn publish_metrics_unsorted(&self, metrics: Vec<Metric>) -> Result<(), PublishError> {
        self.publish_data(metrics, false).await
    }
}

enum NodeInput {
    Message(Message),
    State {
        host_id: String,
        payload: StatePayload,
    },
}

enum NodeTimer {
    HostResponse(u64),
}

struct Node {
    metric_manager: Box<DynNodeMetricManager>,
    client: Arc<DynClient>,
    devices: Arc<Mutex<DeviceMap>>,
    state: Arc<EoNState>,
    config: Arc<SessionConfig>,
    bdseq_store: Arc<DynBdSeqStore>,
    stop_tx: mpsc::Sender<EoNShutdown>,

    rebirth_request_tx: mpsc::Sender<()>,
    timer_tx: mpsc::Sender<NodeTimer>,

    node_message_rx: mpsc::UnboundedReceiver<NodeInput>,
    client_state_rx: mpsc::Receiver<ClientStateMessage>,
    rebirth_request_rx: mpsc::Receiver<()>,
    timer_rx: mpsc::Receiver<NodeTimer>,
}

impl Node {
    async fn node_birth(&mut self) -> Result<(), ()> {
        let metrics = self.metric_manager.birth_metrics();
        let payload = match self.state.begin_birth(metrics) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    "Unable to assign birth aliases. node = {}, error = {e}",
                    self.state.id
                );
                return Err(());
            }
        };
        let topic = MessageTopic::node(&self.state.id, MessageKind::NBirth);
        match self.client.publish_message(topic, payload).await {
            Ok(_) => {
                self.state.birth_completed();
                Ok(())
            }
            Err(e) => {
                error!(
                    "Publishing node birth message failed. node = {}, error = {e}",
                    self.state.id
                );
                Err(())
            }
        }
    }

    async fn birth(&mut self, birth_type: BirthType) -> Result<(), ()> {
        info!(
            "Birthing node. node = {}, type = {birth_type:?}",
            self.state.id
        );
        self.node_birth().await?;
        let devices = self.devices.lock().unwrap().devices();
        birth_devices(devices, birth_type).await;
        Ok(())
    }

    async fn rebirth(&mut self) {
        if !self.state.birthed() {
            debug!("Ignoring rebirth request, node not birthed. node = {}", self.state.id);
            return;
        }
        if !self.state.rebirth_requested(Instant::now()) {
            info!(
                "Rebirth request ignored, debounce window open. node = {}",
                self.state.id
            );
            return;
        }
        if self.birth(BirthType::Rebirth).await.is_err() {
            return;
        }
        self.state
            .rebirth_published(Instant::now(), self.config.sample_startup_delay());
    }

    fn death(&self) {
        let next = self.state.end_session();
        if let Err(e) = self.bdseq_store.store(next) {
            warn!("Unable to store bdSeq. node = {}, error = {e}", self.state.id);
        }
        self.devices.lock().unwrap().on_death();
    }

    async fn on_online(&mut self) {
        if self.state.online_swap(true) {
            return;
        }

        info!("Edge node online. node = {}", self.state.id);
        let sub_topics = self.state.sub_topics();
        if let Err(e) = self.client.subscribe_many(sub_topics).await {
            error!("Subscribing failed. node = {}, error = {e}", self.state.id);
            return;
        }

        if self.state.await_host(self.timer_tx.clone()) {
            info!("Waiting for primary host. node = {}", self.state.id);
            return;
        }
        _ = self.birth(BirthType::Birth).await;
    }

    fn on_offline(&self, will_sender: oneshot::Sender<LastWill>) {
        if !self.state.online_swap(false) {
            return;
        }

        info!("Edge node offline. node = {}", self.state.id);
        self.death();
        let new_lastwill = self.state.create_last_will();
        _ = will_sender.send(new_lastwill);
    }

    async fn on_state(&mut self, host_id: String, payload: StatePayload) {
        match self.state.on_host_state(&host_id, payload) {
            HostTransition::Bound => {
                if !self.state.is_online() {
                    return;
                }
                let birth_type = match self.state.birthed() {
                    true => BirthType::Rebirth,
                    false => BirthType::Birth,
                };
                _ = self.birth(birth_type).await;
            }
            HostTransition::Lost => warn!(
                "Primary host offline, data publishing suspended. node = {}",
                self.state.id
            ),
            _ => (),
        }
    }

    async fn on_timer(&mut self, timer: NodeTimer) {
        match timer {
            NodeTimer::HostResponse(generation) => {
                if !self.state.host_response_timed_out(generation) {
                    return;
                }
                error!(
                    "Primary host did not come online in time - disconnecting. node = {}",
                    self.state.id
                );
                _ = self.client.disconnect().await;
            }
        }
    }

    async fn on_ncmd(&mut self, payload: Payload) {
        let mut rebirth = false;
        let mut metrics = Vec::with_capacity(payload.metrics.len());
        for metric in payload.metrics {
            if metric.name.as_deref() != Some(NODE_CONTROL_REBIRTH) {
                metrics.push(metric);
                continue;
            }
            rebirth = matches!(metric.value, Some(Value::BooleanValue(true)));
            if !rebirth {
                warn!("Received invalid CMD Rebirth metric - ignoring request")
            }
        }

        if !metrics.is_empty() {
            match self.state.resolve_command(None, &mut metrics) {
                Ok(()) => {
                    self.metric_manager
                        .on_ncmd(self.create_node_handle(), metrics)
                        .await
                }
                Err(e) => warn!("Received NCMD that could not be resolved - ignoring. error = {e}"),
            }
        }

        if rebirth {
            info!("Got Rebirth CMD - Rebirthing Node. node = {}", self.state.id);
            self.rebirth().await;
        }
    }

    async fn on_dcmd(&mut self, device_name: &str, payload: Payload) {
        let device = self.devices.lock().unwrap().get(device_name);
        let device = match device {
            Some(device) => device,
            None => {
                warn!("Received DCMD for unknown device. device = {device_name}");
                return;
            }
        };
        let mut metrics = payload.metrics;
        if let Err(e) = self
            .state
            .resolve_command(Some(device.aliases()), &mut metrics)
        {
            warn!("Received DCMD that could not be resolved - ignoring. device = {device_name}, error = {e}");
            return;
        }
        device
            .dev_impl
            .on_dcmd(DeviceHandle { device: device.clone() }, metrics)
            .await
    }

    async fn on_own_death(&mut self, payload: Payload) {
        let bdseq = match payload.bdseq() {
            Ok(bdseq) => bdseq,
            Err(e) => {
                debug!("Ignoring NDEATH without a valid bdSeq. error = {e}");
                return;
            }
        };
        if !self.state.birthed() || bdseq != self.state.bdseq() {
            debug!("Ignoring death certificate of a previous session. bdSeq = {bdseq}");
            return;
        }
        warn!(
            "Observed own death certificate while online - rebirthing. node = {}, bdSeq = {bdseq}",
            self.state.id
        );
        self.rebirth().await;
    }

    async fn on_sparkplug_message(&mut self, message: Message) {
        match (message.kind, &message.id) {
            (MessageKind::NCmd, _) => self.on_ncmd(message.payload).await,
            (MessageKind::DCmd, ScopeId::Device(id)) => {
                let name = id.device.clone();
                self.on_dcmd(&name, message.payload).await
            }
            (MessageKind::NDeath, _) => self.on_own_death(message.payload).await,
            (kind, id) => debug!("Ignoring unexpected message. scope = {id}, kind = {kind}"),
        }
    }

    fn create_node_handle(&self) -> NodeHandle {
        NodeHandle {
            state: self.state.clone(),
            client: self.client.clone(),
            devices: self.devices.clone(),
            stop_tx: self.stop_tx.clone(),
            rebirth_tx: self.rebirth_request_tx.clone(),
        }
    }

    async fn run(mut self) {
        loop {
            select! {
                biased;
                maybe_state_update = self.client_state_rx.recv() => match maybe_state_update {
                    Some (state_update) => match state_update {
                        ClientStateMessage::Online => self.on_online().await,
                        ClientStateMessage::Offline(sender) => self.on_offline(sender),
                        ClientStateMessage::Stopped => break
                    },
                    None => break, //EoN has been dropped
                },
                Some(timer) = self.timer_rx.recv() => self.on_timer(timer).await,
                Some(_) = self.rebirth_request_rx.recv() => self.rebirth().await,
                maybe_input = self.node_message_rx.recv() => match maybe_input {
                    Some(NodeInput::Message(message)) => self.on_sparkplug_message(message).await,
                    Some(NodeInput::State { host_id, payload }) => self.on_state(host_id, payload).await,
                    None => break, //EoN has been dropped
                },
            }
        }
    }
}

enum ClientStateMessage {
    Stopped,
    Online,
    Offline(oneshot::Sender<LastWill>),
}

/// Structure that represents a Sparkplug Edge Node instance.
///
/// See [EoNBuilder] on how to create an [EoN] instance.
pub struct EoN {
    eventloop: Box<DynEventLoop>,
    endpoints: EndpointRing,
    config: Arc<SessionConfig>,
    stop_rx: mpsc::Receiver<EoNShutdown>,
    node_message_tx: mpsc::UnboundedSender<NodeInput>,
    client_state_tx: mpsc::Sender<ClientStateMessage>,
    state: Arc<EoNState>,
}

impl EoN {
    pub(crate) fn new_from_builder(builder: EoNBuilder) -> Result<(Self, NodeHandle), BuildError> {
        let group_id = builder.group_id.ok_or(BuildError::MissingGroupId)?;
        let node_id = builder.node_id.ok_or(BuildError::MissingNodeId)?;
        let id = NodeIdentifier::new(group_id, node_id);
        id.validate().map_err(BuildError::InvalidName)?;
        builder.config.validate()?;
        let bdseq = builder.bdseq_store.load()?;

        let config = Arc::new(builder.config);
        let metric_manager = builder.metric_manager;
        let (eventloop, client) = builder.eventloop_client;
        let (stop_tx, stop_rx) = mpsc::channel(1);

        let host = PrimaryHostMonitor::new(
            config.primary_host_id.clone(),
            config.host_response_timeout,
            config.rebirth_debounce,
        );

        let state = Arc::new(EoNState {
            running: AtomicBool::new(false),
            bdseq: AtomicU8::new(bdseq.value()),
            inner: Mutex::new(EoNStateInner {
                seq: SequenceCounter::new(),
                online: false,
                birthed: false,
                host,
                aliases: AliasRegistry::new(),
                alias_cursor: 0,
                generation: 0,
            }),
            use_aliases: config.use_aliases,
            ndata_topic: MessageTopic::node(&id, MessageKind::NData),
            id,
        });

        let devices = Arc::new(Mutex::new(DeviceMap::new()));

        let (node_message_tx, node_message_rx) = mpsc::unbounded_channel();
        let (rebirth_request_tx, rebirth_request_rx) = mpsc::channel(1);
        let (client_state_tx, client_state_rx) = mpsc::channel(1);
        let (timer_tx, timer_rx) = mpsc::channel(4);

        let node = Node {
            metric_manager,
            client: client.clone(),
            state: state.clone(),
            devices: devices.clone(),
            config: config.clone(),
            bdseq_store: builder.bdseq_store,
            stop_tx,
            node_message_rx,
            rebirth_request_rx,
            rebirth_request_tx,
            client_state_rx,
            timer_tx,
            timer_rx,
        };

        let eon = Self {
            eventloop,
            endpoints: EndpointRing::new(config.endpoints.clone()),
            config,
            stop_rx,
            node_message_tx,
            client_state_tx,
            state,
        };

        let handle = node.create_node_handle();

        node.metric_manager.init(&handle);

        tokio::spawn(async move { node.run().await });

        Ok((eon, handle))
    }

    fn update_last_will(&mut self, lastwill: LastWill) {
        self.eventloop.set_last_will(lastwill);
    }

    /// Point the event loop at the next endpoint. Does nothing with fewer than two endpoints.
    fn next_endpoint(&mut self) {
        if self.endpoints.len() < 2 {
            return;
        }
        if let Some(endpoint) = self.endpoints.advance() {
            info!(
                "Switching endpoint. node = {}, endpoint = {endpoint}",
                self.state.id
            );
            self.eventloop.set_endpoint(endpoint);
        }
    }

    async fn on_online(&mut self) {
        _ = self.client_state_tx.send(ClientStateMessage::Online).await;
    }

    async fn on_offline(&mut self) {
        let (lastwill_tx, lastwill_rx) = oneshot::channel();
        _ = self
            .client_state_tx
            .send(ClientStateMessage::Offline(lastwill_tx))
            .await;
        if let Ok(will) = lastwill_rx.await {
            self.update_last_will(will)
        }
    }

    fn on_message(&mut self, message: Message) {
        if message.id.node() != &self.state.id {
            debug!("Ignoring message for another node. scope = {}", message.id);
            return;
        }
        _ = self.node_message_tx.send(NodeInput::Message(message))
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => self.on_online().await,
            Event::Offline => {
                self.on_offline().await;
                self.next_endpoint();
            }
            Event::Message(message) => self.on_message(message),
            Event::State { host_id, payload } => {
                _ = self
                    .node_message_tx
                    .send(NodeInput::State { host_id, payload })
            }
            Event::InvalidPublish {
                reason,
                topic,
                payload: _,
            } => debug!(
                "Ignoring invalid publish. topic = {}, reason = {reason}",
                String::from_utf8_lossy(&topic)
            ),
        }
    }

    async fn poll_until_offline(&mut self) -> bool {
        while self.state.is_online() {
            if Event::Offline == self.eventloop.poll().await {
                self.on_offline().await;
                break;
            }
        }
        true
    }

    /// Wait out the configured startup delay. Returns false if the node was cancelled meanwhile.
    async fn startup_delay(&mut self) -> bool {
        let delay = self.config.sample_startup_delay();
        if delay.is_zero() {
            return true;
        }
        info!(
            "Delaying startup. node = {}, delay = {delay:?}",
            self.state.id
        );
        select! {
            _ = tokio::time::sleep(delay) => true,
            Some(_) = self.stop_rx.recv() => false,
        }
    }

    /// Run the Edge Node
    ///
    /// Runs the Edge Node until [NodeHandle::cancel()] is called
    pub async fn run(mut self) {
        info!("Edge node running. node = {}", self.state.id);
        self.state.running.store(true, Ordering::SeqCst);

        self.update_last_will(self.state.create_last_will());
        if let Some(endpoint) = self.endpoints.current() {
            self.eventloop.set_endpoint(endpoint);
        }

        if self.startup_delay().await {
            let connect_timeout = self.config.connect_timeout();
            let connect_deadline = tokio::time::sleep(connect_timeout);
            tokio::pin!(connect_deadline);

            loop {
                select! {
                  event = self.eventloop.poll() => {
                    let offline = event == Event::Offline;
                    self.handle_event(event).await;
                    if offline {
                        connect_deadline.as_mut().reset(Instant::now() + connect_timeout);
                    }
                  },
                  Some(_) = self.stop_rx.recv() => break,
                  _ = &mut connect_deadline, if !self.state.is_online() => {
                    warn!("No connection established in time. node = {}", self.state.id);
                    self.next_endpoint();
                    connect_deadline.as_mut().reset(Instant::now() + connect_timeout);
                  }
                }
            }

            if timeout(Duration::from_secs(1), self.poll_until_offline())
                .await
                .is_err()
            {
                self.on_offline().await;
            }
        }

        _ = self.client_state_tx.send(ClientStateMessage::Stopped).await;
        info!("Edge node stopped. node = {}", self.state.id);
        self.state.running.store(false, Ordering::SeqCst);
    }
}

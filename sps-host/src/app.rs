use std::{collections::VecDeque, pin::Pin, sync::Arc, time::Duration};

use log::{debug, info, trace, warn};
use sps_client::{
    Client, ClientError, DynClient, DynEventLoop, Event, EventLoop, LastWill, PublishJob,
};
use sps_core::config::SessionConfig;
use sps_types::{
    payload::{Metric, Payload},
    topic::{MessageKind, MessageTopic, NodeIdentifier, QoS, ScopeId, StateTopic, Topic, TopicFilter},
    utils::{self, timestamp},
    EndpointRing, StatePayload,
};
use tokio::{
    select,
    sync::mpsc::{self, Receiver},
    task,
    time::{interval, sleep, Instant, Interval, MissedTickBehavior, Sleep},
};

use crate::{config::SubscriptionConfig, error::HostError, session::rebirth_command, HostEvent, SessionManager};

const RECOVERY_SCAN_INTERVAL: Duration = Duration::from_secs(1);

struct Shutdown;

struct AppState {
    host_id: String,
}

/// The client used to interact with a running [HostApplication] and the Sparkplug namespace.
#[derive(Clone)]
pub struct HostClient {
    client: Arc<DynClient>,
    shutdown_tx: mpsc::Sender<Shutdown>,
    state: Arc<AppState>,
}

impl HostClient {
    pub fn host_id(&self) -> &str {
        &self.state.host_id
    }

    /// Stop all operations, publishing the application's offline STATE and disconnecting from the broker.
    ///
    /// After this [HostApplication::poll()] returns [HostEvent::Stopped].
    pub async fn cancel(&self) {
        info!("Host application stopping. host = {}", self.state.host_id);
        let topic = StateTopic::new_host(&self.state.host_id);
        let payload = StatePayload::Offline {
            timestamp: timestamp(),
        };
        if self
            .client
            .try_publish_state_message(topic, payload)
            .await
            .is_err()
        {
            debug!("Unable to publish state offline on exit");
        }
        _ = self.shutdown_tx.send(Shutdown).await;
        _ = self.client.disconnect().await;
    }

    /// Issue a node rebirth CMD request
    pub async fn publish_node_rebirth(&self, id: &NodeIdentifier) -> Result<(), ClientError> {
        let topic = MessageTopic::node(id, MessageKind::NCmd);
        self.client.publish_message(topic, rebirth_command()).await
    }

    fn command(id: &ScopeId, metrics: Vec<Metric>) -> (MessageTopic, Payload) {
        let kind = match id {
            ScopeId::Node(_) => MessageKind::NCmd,
            ScopeId::Device(_) => MessageKind::DCmd,
        };
        let payload = Payload {
            timestamp: Some(timestamp()),
            metrics,
            seq: None,
            uuid: None,
            body: None,
        };
        (MessageTopic::for_scope(id, kind), payload)
    }

    /// Publish a command to a node or device. Uses [Client::publish_message].
    pub async fn publish_command(
        &self,
        id: &ScopeId,
        metrics: Vec<Metric>,
    ) -> Result<(), ClientError> {
        let (topic, payload) = Self::command(id, metrics);
        self.client.publish_message(topic, payload).await
    }

    /// Attempt to publish a command to a node or device. Uses [Client::try_publish_message].
    pub async fn try_publish_command(
        &self,
        id: &ScopeId,
        metrics: Vec<Metric>,
    ) -> Result<(), ClientError> {
        let (topic, payload) = Self::command(id, metrics);
        self.client.try_publish_message(topic, payload).await
    }
}

/// A Sparkplug host application.
///
/// Tracks the birth and death of every edge node and device it is subscribed to, delivers their
/// data in sequence order with aliases resolved, and requests rebirths when a session cannot be
/// interpreted. Progress is driven by calling [HostApplication::poll].
pub struct HostApplication {
    online: bool,
    state: Arc<AppState>,
    will_timestamp: u64,
    subscription_config: SubscriptionConfig,
    client: Arc<DynClient>,
    eventloop: Box<DynEventLoop>,
    endpoints: EndpointRing,
    connect_timeout: Duration,
    connect_deadline: Pin<Box<Sleep>>,
    recovery_interval: Interval,
    shutdown_rx: Receiver<Shutdown>,
    sessions: SessionManager,
    pending: VecDeque<HostEvent>,
    stopped: bool,
}

impl HostApplication {
    /// Creates a new instance along with an associated client.
    ///
    /// Fails if the host id is not a valid Sparkplug name or the configuration does not validate.
    /// Must be called from within a tokio runtime.
    pub fn new<S: Into<String>, E: EventLoop + Send + 'static, C: Client + Send + Sync + 'static>(
        host_id: S,
        subscription_config: SubscriptionConfig,
        config: SessionConfig,
        eventloop: E,
        client: C,
    ) -> Result<(Self, HostClient), HostError> {
        let host_id: String = host_id.into();
        utils::validate_name(&host_id).map_err(HostError::InvalidHostId)?;
        config.validate()?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let client: Arc<DynClient> = Arc::new(client);
        let state = Arc::new(AppState { host_id });

        let mut recovery_interval = interval(RECOVERY_SCAN_INTERVAL);
        recovery_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let connect_timeout = config.connect_timeout();

        let mut app = Self {
            online: false,
            state: state.clone(),
            will_timestamp: 0,
            subscription_config,
            client: client.clone(),
            eventloop: Box::new(eventloop),
            endpoints: EndpointRing::new(config.endpoints.clone()),
            connect_timeout,
            connect_deadline: Box::pin(sleep(connect_timeout)),
            recovery_interval,
            shutdown_rx,
            sessions: SessionManager::new(client.clone(), &config),
            pending: VecDeque::new(),
            stopped: false,
        };
        app.update_last_will();
        if let Some(endpoint) = app.endpoints.current() {
            app.eventloop.set_endpoint(endpoint);
        }

        let host_client = HostClient {
            client,
            shutdown_tx,
            state,
        };
        Ok((app, host_client))
    }

    /// Query access to the tracked node and device sessions
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    fn update_last_will(&mut self) {
        self.will_timestamp = timestamp();
        self.eventloop
            .set_last_will(LastWill::new_app(&self.state.host_id, self.will_timestamp));
    }

    fn next_endpoint(&mut self) {
        if self.endpoints.len() < 2 {
            return;
        }
        if let Some(endpoint) = self.endpoints.advance() {
            info!(
                "Switching endpoint. host = {}, endpoint = {endpoint}",
                self.state.host_id
            );
            self.eventloop.set_endpoint(endpoint);
        }
    }

    fn reset_connect_deadline(&mut self) {
        self.connect_deadline
            .as_mut()
            .reset(Instant::now() + self.connect_timeout);
    }

    fn on_online(&mut self) {
        if self.online {
            return;
        }
        info!("Host application online. host = {}", self.state.host_id);
        self.online = true;

        let client = self.client.clone();
        let state_topic = StateTopic::new_host(&self.state.host_id);
        let mut topics: Vec<TopicFilter> = self.subscription_config.clone().into();
        if !matches!(self.subscription_config, SubscriptionConfig::AllGroups) {
            //the namespace wildcard already covers STATE
            topics.push(TopicFilter::new_with_qos(
                Topic::State(state_topic.clone()),
                QoS::AtMostOnce,
            ));
        }
        let timestamp = self.will_timestamp;
        task::spawn(async move {
            if let Err(e) = client.subscribe_many(topics).await {
                warn!("Subscribing failed. error = {e}");
            }
            if let Err(e) = client
                .publish_state_message(state_topic, StatePayload::Online { timestamp })
                .await
            {
                warn!("Publishing online state failed. error = {e}");
            }
        });
        self.pending.push_back(HostEvent::Online);
    }

    fn on_offline(&mut self) {
        if self.online {
            info!("Host application offline. host = {}", self.state.host_id);
            self.online = false;
            self.sessions.force_offline_all(Instant::now());
            self.update_last_will();
            self.pending.push_back(HostEvent::Offline);
        }
        self.next_endpoint();
        self.reset_connect_deadline();
    }

    fn on_state(&mut self, host_id: String, payload: StatePayload) {
        if host_id != self.state.host_id || payload.is_online() || !self.online {
            return;
        }
        info!(
            "Observed own offline state while online - republishing. host = {}",
            self.state.host_id
        );
        let job = PublishJob::State {
            topic: StateTopic::new_host(&self.state.host_id),
            payload: StatePayload::Online {
                timestamp: self.will_timestamp,
            },
        };
        if let Err(e) = self.sessions.submit(&self.state.host_id, job) {
            warn!("Unable to queue online state. error = {e}");
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Online => self.on_online(),
            Event::Offline => self.on_offline(),
            Event::Message(message) => {
                trace!("Message received. scope = {}, kind = {}", message.id, message.kind);
                let events = self.sessions.process(message, Instant::now());
                self.pending.extend(events);
            }
            Event::State { host_id, payload } => self.on_state(host_id, payload),
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

    /// Progress the application and return the next event.
    ///
    /// Returns [HostEvent::Stopped] once the application has been cancelled.
    pub async fn poll(&mut self) -> HostEvent {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return event;
            }
            if self.stopped {
                return HostEvent::Stopped;
            }

            select! {
                biased;
                Some(_) = self.shutdown_rx.recv() => {
                    info!("Host application stopped. host = {}", self.state.host_id);
                    self.stopped = true;
                }
                _ = self.recovery_interval.tick() => {
                    let events = self.sessions.check_expired(Instant::now());
                    self.pending.extend(events);
                }
                event = self.eventloop.poll() => self.handle_event(event),
                _ = &mut self.connect_deadline, if !self.online => {
                    warn!("No connection established in time. host = {}", self.state.host_id);
                    self.next_endpoint();
                    self.reset_connect_deadline();
                }
            }
        }
    }
}

use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, trace, warn};
use rumqttc::{
    v5::{
        mqttbytes::{
            v5::{ConnectProperties, Filter, LastWill as RuLastWill, Packet},
            QoS,
        },
        AsyncClient as RuClient, Event as RuEvent, EventLoop as RuEventLoop,
        MqttOptions as RuMqttOptions,
    },
    Outgoing,
};
use sps_client::{topic_and_payload_to_event, ClientError, Event, LastWill, WillPayload};
use sps_types::{
    payload::Payload,
    topic::{MessageTopic, StateTopic, TopicFilter},
    Endpoint, StatePayload,
};

fn qos_to_mqtt_qos(qos: sps_types::topic::QoS) -> QoS {
    match qos {
        sps_types::topic::QoS::AtMostOnce => QoS::AtMostOnce,
        sps_types::topic::QoS::AtLeastOnce => QoS::AtLeastOnce,
        sps_types::topic::QoS::ExactlyOnce => QoS::ExactlyOnce,
    }
}

fn topic_filter_to_mqtt_filter(topic_filter: TopicFilter) -> Filter {
    Filter::new(topic_filter.topic, qos_to_mqtt_qos(topic_filter.qos))
}

/// A [sps_client::Client] implementation using [rumqttc]
#[derive(Clone)]
pub struct Client {
    client: RuClient,
}

impl Client {
    async fn publish(
        &self,
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.client
            .publish(topic, qos, retain, payload)
            .await
            .map_err(|_| ClientError::Unavailable)
    }

    fn try_publish(
        &self,
        topic: String,
        qos: QoS,
        retain: bool,
        payload: Vec<u8>,
    ) -> Result<(), ClientError> {
        self.client
            .try_publish(topic, qos, retain, payload)
            .map_err(|_| ClientError::Unavailable)
    }
}

#[async_trait]
impl sps_client::Client for Client {
    async fn disconnect(&self) -> Result<(), ClientError> {
        self.client
            .disconnect()
            .await
            .map_err(|_| ClientError::Unavailable)
    }

    async fn publish_state_message(
        &self,
        topic: StateTopic,
        payload: StatePayload,
    ) -> Result<(), ClientError> {
        let (qos, retain) = payload.get_publish_quality_retain();
        let bytes = payload.to_vec().map_err(ClientError::Encode)?;
        self.publish(topic.topic, qos_to_mqtt_qos(qos), retain, bytes)
            .await
    }

    async fn try_publish_state_message(
        &self,
        topic: StateTopic,
        payload: StatePayload,
    ) -> Result<(), ClientError> {
        let (qos, retain) = payload.get_publish_quality_retain();
        let bytes = payload.to_vec().map_err(ClientError::Encode)?;
        self.try_publish(topic.topic, qos_to_mqtt_qos(qos), retain, bytes)
    }

    async fn publish_message(
        &self,
        topic: MessageTopic,
        payload: Payload,
    ) -> Result<(), ClientError> {
        let (qos, retain) = topic.get_publish_quality_retain();
        let bytes = payload.to_vec().map_err(ClientError::Encode)?;
        self.publish(topic.topic, qos_to_mqtt_qos(qos), retain, bytes)
            .await
    }

    async fn try_publish_message(
        &self,
        topic: MessageTopic,
        payload: Payload,
    ) -> Result<(), ClientError> {
        let (qos, retain) = topic.get_publish_quality_retain();
        let bytes = payload.to_vec().map_err(ClientError::Encode)?;
        self.try_publish(topic.topic, qos_to_mqtt_qos(qos), retain, bytes)
    }

    async fn subscribe_many(&self, topics: Vec<TopicFilter>) -> Result<(), ClientError> {
        let filters: Vec<Filter> = topics
            .into_iter()
            .map(topic_filter_to_mqtt_filter)
            .collect();
        self.client
            .subscribe_many(filters)
            .await
            .map_err(|_| ClientError::Unavailable)
    }
}

/// MQTT v5 connection properties the client connects with
#[derive(Debug, Clone, Default)]
pub struct ConnectionProperties {
    pub receive_maximum: Option<u16>,
    pub max_packet_size: Option<u32>,
}

/// Options used to create the MQTT connection.
///
/// The broker address can later be changed through [sps_client::EventLoop::set_endpoint], the rest
/// of the options are kept across endpoint switches.
#[derive(Debug, Clone)]
pub struct MqttOptions {
    pub client_id: String,
    pub broker_addr: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub connect_properties: Option<ConnectionProperties>,
}

impl MqttOptions {
    pub fn new<S: Into<String>, S1: Into<String>>(client_id: S, addr: S1, port: u16) -> Self {
        Self {
            client_id: client_id.into(),
            broker_addr: addr.into(),
            port,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connect_properties: None,
        }
    }

    /// Options for connecting to `endpoint`
    pub fn from_endpoint<S: Into<String>>(client_id: S, endpoint: &Endpoint) -> Self {
        let mut options = Self::new(client_id, endpoint.host.clone(), endpoint.port);
        options.credentials = endpoint
            .credentials
            .as_ref()
            .map(|c| (c.username.clone(), c.password.clone()));
        options
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_credentials<S: Into<String>, S1: Into<String>>(
        mut self,
        username: S,
        password: S1,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Build the rumqttc options. Some options are overwritten to ensure Sparkplug compliance.
    fn to_rumqtt(&self) -> RuMqttOptions {
        let mut options = RuMqttOptions::new(&self.client_id, &self.broker_addr, self.port);
        let mut properties = ConnectProperties::new();
        if let Some(p) = &self.connect_properties {
            properties.receive_maximum = p.receive_maximum;
            properties.max_packet_size = p.max_packet_size;
        }
        /* Sparkplug requires session expiry interval to be 0 */
        properties.session_expiry_interval = Some(0);

        options
            .set_keep_alive(self.keep_alive)
            .set_clean_start(true)
            .set_connect_properties(properties);
        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }
        options
    }
}

enum ConnectionState {
    Disconnected,
    ManualDisconnected,
    Connected,
}

/// An [sps_client::EventLoop] implementation using [rumqttc]
pub struct EventLoop {
    state: ConnectionState,
    options: MqttOptions,
    will: Option<RuLastWill>,
    el: RuEventLoop,
}

impl EventLoop {
    /// Create a new `EventLoop`.
    ///
    /// `cap` specifies the capacity of the bounded async channel for the client handle.
    pub fn new(options: MqttOptions, cap: usize) -> (Self, Client) {
        let (client, eventloop) = RuClient::new(options.to_rumqtt(), cap);
        (
            EventLoop {
                state: ConnectionState::Disconnected,
                options,
                will: None,
                el: eventloop,
            },
            Client { client },
        )
    }

    fn publish_event(topic: &[u8], payload: &[u8]) -> Event {
        match topic_and_payload_to_event(topic, payload) {
            Ok(event) => event,
            Err(reason) => Event::InvalidPublish {
                reason,
                topic: topic.to_vec(),
                payload: payload.to_vec(),
            },
        }
    }

    async fn poll_rumqtt(&mut self) -> Option<Event> {
        match self.el.poll().await {
            Ok(event) => {
                trace!("{event:?}");
                match event {
                    RuEvent::Incoming(Packet::ConnAck(_)) => {
                        info!(
                            "Connected. broker = {}:{}",
                            self.options.broker_addr, self.options.port
                        );
                        self.state = ConnectionState::Connected;
                        Some(Event::Online)
                    }
                    RuEvent::Incoming(Packet::Disconnect(_)) => {
                        self.state = ConnectionState::Disconnected;
                        Some(Event::Offline)
                    }
                    RuEvent::Incoming(Packet::Publish(publish)) => {
                        Some(Self::publish_event(&publish.topic, &publish.payload))
                    }
                    RuEvent::Outgoing(Outgoing::Disconnect) => {
                        self.state = ConnectionState::ManualDisconnected;
                        Some(Event::Offline)
                    }
                    _ => None,
                }
            }
            Err(e) => match self.state {
                ConnectionState::Connected => {
                    error!("Client error: {e}");
                    self.state = ConnectionState::Disconnected;
                    Some(Event::Offline)
                }
                ConnectionState::Disconnected => {
                    warn!("Client error on connection attempt: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    /* report the failed attempt so the caller can move to another endpoint */
                    Some(Event::Offline)
                }
                ConnectionState::ManualDisconnected => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    None
                }
            },
        }
    }
}

#[async_trait]
impl sps_client::EventLoop for EventLoop {
    async fn poll(&mut self) -> Event {
        loop {
            if let Some(event) = self.poll_rumqtt().await {
                return event;
            }
        }
    }

    fn set_last_will(&mut self, will: LastWill) {
        let payload = match &will.payload {
            WillPayload::Node(payload) => payload.to_vec(),
            WillPayload::State(payload) => payload.to_vec(),
        };
        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                error!("Unable to encode last will. topic = {}, error = {e}", will.topic);
                return;
            }
        };
        let mqtt_will = RuLastWill::new(
            will.topic,
            payload,
            qos_to_mqtt_qos(will.qos),
            will.retain,
            None,
        );
        self.will = Some(mqtt_will.clone());
        self.el.options.set_last_will(mqtt_will);
    }

    fn set_endpoint(&mut self, endpoint: &Endpoint) {
        self.options.broker_addr = endpoint.host.clone();
        self.options.port = endpoint.port;
        if let Some(credentials) = &endpoint.credentials {
            self.options.credentials =
                Some((credentials.username.clone(), credentials.password.clone()));
        }
        let mut options = self.options.to_rumqtt();
        if let Some(will) = &self.will {
            options.set_last_will(will.clone());
        }
        self.el.options = options;
    }
}

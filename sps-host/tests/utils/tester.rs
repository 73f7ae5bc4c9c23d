#![allow(dead_code)]

use std::time::Duration;

use sps_client::{
    channel::{ChannelBroker, ChannelEventLoop, OutboundMessage},
    Event, Message, WillPayload,
};
use sps_core::config::SessionConfig;
use sps_host::{HostApplication, HostClient, HostEvent, RebirthReason, SubscriptionConfig};
use sps_types::{
    constants::NODE_CONTROL_REBIRTH,
    payload::{DataType, Metric, Payload, Value},
    topic::{MessageKind, NodeIdentifier, ScopeId},
    BdSeq, StatePayload,
};
use tokio::{
    sync::mpsc::{self, UnboundedReceiver},
    time::timeout,
};

pub const HOST_ID: &str = "host";
pub const GROUP_ID: &str = "foo";
pub const NODE_ID: &str = "bar";

pub struct TestHost {
    pub broker: ChannelBroker,
    pub client: HostClient,
    pub events: UnboundedReceiver<HostEvent>,
}

/// Run a host application on its own task, forwarding its events until it stops
pub fn start_host(subscription: SubscriptionConfig, config: SessionConfig) -> TestHost {
    _ = env_logger::builder().is_test(true).try_init();
    let (eventloop, client, broker) = ChannelEventLoop::new();
    let (mut app, client) =
        HostApplication::new(HOST_ID, subscription, config, eventloop, client).unwrap();
    let (tx, events) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            let event = app.poll().await;
            let stopped = event == HostEvent::Stopped;
            if tx.send(event).is_err() || stopped {
                break;
            }
        }
    });
    TestHost {
        broker,
        client,
        events,
    }
}

impl TestHost {
    pub async fn next_event_within(&mut self, duration: Duration) -> HostEvent {
        timeout(duration, self.events.recv())
            .await
            .expect("timed out waiting for a host event")
            .unwrap()
    }

    pub async fn next_event(&mut self) -> HostEvent {
        self.next_event_within(Duration::from_secs(1)).await
    }

    pub async fn assert_no_event(&mut self) {
        let result = timeout(Duration::from_millis(200), self.events.recv()).await;
        assert!(result.is_err(), "unexpected host event {result:?}");
    }

    pub async fn recv(&mut self) -> OutboundMessage {
        timeout(Duration::from_secs(1), self.broker.rx_outbound.recv())
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn assert_silent(&mut self) {
        let result = timeout(Duration::from_millis(200), self.broker.rx_outbound.recv()).await;
        assert!(result.is_err(), "unexpected outbound message {result:?}");
    }

    pub fn send(&self, event: Event) {
        self.broker.tx_event.send(event).unwrap();
    }

    /// The timestamp of the offline STATE registered as the will
    pub fn will_timestamp(&self) -> u64 {
        match self.broker.last_will().unwrap().payload {
            WillPayload::State(StatePayload::Offline { timestamp }) => timestamp,
            payload => panic!("unexpected will payload {payload:?}"),
        }
    }

    /// Connect the host and check it subscribes then announces itself online
    pub async fn bring_online(&mut self) {
        self.send(Event::Online);
        assert_eq!(self.next_event().await, HostEvent::Online);
        match self.recv().await {
            OutboundMessage::Subscribe(_) => (),
            message => panic!("expected subscription, got {message:?}"),
        }
        let will_timestamp = self.will_timestamp();
        match self.recv().await {
            OutboundMessage::StateMessage { topic, payload } => {
                assert_eq!(topic.topic, format!("spBv1.0/STATE/{HOST_ID}"));
                assert_eq!(
                    payload,
                    StatePayload::Online {
                        timestamp: will_timestamp
                    }
                );
            }
            message => panic!("expected online state, got {message:?}"),
        }
    }

    /// Expect a rebirth request event for the node and the NCMD that goes with it
    pub async fn expect_rebirth(&mut self, node: &NodeIdentifier, reason: RebirthReason) {
        match self.next_event().await {
            HostEvent::RebirthRequested(details) => {
                assert_eq!(&details.node_id, node);
                assert_eq!(details.reason, reason);
            }
            event => panic!("expected rebirth request, got {event:?}"),
        }
        match self.recv().await {
            OutboundMessage::Message { topic, payload } => {
                assert_eq!(topic.kind, MessageKind::NCmd);
                assert_eq!(topic.topic, format!("spBv1.0/{}/NCMD/{}", node.group, node.node));
                let metric = &payload.metrics[0];
                assert_eq!(metric.name.as_deref(), Some(NODE_CONTROL_REBIRTH));
                assert_eq!(metric.value, Some(Value::BooleanValue(true)));
            }
            message => panic!("expected rebirth command, got {message:?}"),
        }
    }
}

pub fn node() -> NodeIdentifier {
    NodeIdentifier::new(GROUP_ID, NODE_ID)
}

pub fn metric(name: &str, alias: Option<u64>, value: u64) -> Metric {
    let mut metric = Metric::new();
    metric
        .set_name(name.to_string())
        .set_datatype(DataType::UInt64)
        .set_value(Value::LongValue(value));
    metric.alias = alias;
    metric
}

pub fn aliased(alias: u64, value: u64) -> Metric {
    let mut metric = Metric::new();
    metric
        .set_alias(alias)
        .set_datatype(DataType::UInt64)
        .set_value(Value::LongValue(value));
    metric
}

fn message(id: ScopeId, kind: MessageKind, payload: Payload) -> Event {
    Event::Message(Message { id, kind, payload })
}

pub fn nbirth(bdseq: u8, timestamp: u64, mut metrics: Vec<Metric>) -> Event {
    metrics.insert(0, BdSeq::new(bdseq).to_metric());
    let payload = Payload {
        timestamp: Some(timestamp),
        metrics,
        seq: Some(0),
        ..Default::default()
    };
    message(ScopeId::Node(node()), MessageKind::NBirth, payload)
}

pub fn ndeath(bdseq: u8) -> Event {
    let payload = Payload {
        metrics: vec![BdSeq::new(bdseq).to_metric()],
        ..Default::default()
    };
    message(ScopeId::Node(node()), MessageKind::NDeath, payload)
}

pub fn ndata(seq: u64, timestamp: u64, metrics: Vec<Metric>) -> Event {
    let payload = Payload {
        timestamp: Some(timestamp),
        metrics,
        seq: Some(seq),
        ..Default::default()
    };
    message(ScopeId::Node(node()), MessageKind::NData, payload)
}

pub fn device_message(
    kind: MessageKind,
    device: &str,
    seq: u64,
    timestamp: u64,
    metrics: Vec<Metric>,
) -> Event {
    let payload = Payload {
        timestamp: Some(timestamp),
        metrics,
        seq: Some(seq),
        ..Default::default()
    };
    message(ScopeId::Device(node().device(device)), kind, payload)
}

/// The sequence numbers carried by a run of NDATA events
pub fn data_sequence(events: &[HostEvent]) -> Vec<u64> {
    events
        .iter()
        .map(|event| match event {
            HostEvent::NData { metrics, .. } => match metrics[0].value {
                Some(Value::LongValue(value)) => value,
                ref value => panic!("unexpected value {value:?}"),
            },
            event => panic!("expected data, got {event:?}"),
        })
        .collect()
}

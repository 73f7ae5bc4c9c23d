#![allow(dead_code)]

use std::time::Duration;

use sps_client::{
    channel::{ChannelBroker, OutboundMessage},
    Event, Message,
};
use sps_edge::NodeHandle;
use sps_types::{
    constants::{BDSEQ, NODE_CONTROL_REBIRTH},
    payload::{DataType, Metric, Payload, Value},
    topic::{
        MessageKind, MessageTopic, NodeIdentifier, QoS, ScopeId, StateTopic, Topic, TopicFilter,
    },
    BdSeq,
};
use tokio::time::timeout;

pub async fn recv(broker: &mut ChannelBroker) -> OutboundMessage {
    timeout(Duration::from_secs(1), broker.rx_outbound.recv())
        .await
        .unwrap()
        .unwrap()
}

pub async fn assert_silent(broker: &mut ChannelBroker) {
    let result = timeout(Duration::from_millis(200), broker.rx_outbound.recv()).await;
    assert!(result.is_err(), "unexpected outbound message {result:?}");
}

/// Give the node task a chance to finish processing
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub async fn recv_message(broker: &mut ChannelBroker) -> (MessageTopic, Payload) {
    match recv(broker).await {
        OutboundMessage::Message { topic, payload } => (topic, payload),
        message => panic!("expected a sparkplug message, got {message:?}"),
    }
}

pub async fn expect_message(
    broker: &mut ChannelBroker,
    kind: MessageKind,
    expected_seq: Option<u64>,
) -> Payload {
    let (topic, payload) = recv_message(broker).await;
    assert_eq!(topic.kind, kind, "unexpected message on {}", topic.topic);
    if expected_seq.is_some() {
        assert_eq!(payload.seq, expected_seq);
    }
    payload
}

pub fn node_scope(group_id: &str, node_id: &str) -> ScopeId {
    ScopeId::Node(NodeIdentifier::new(group_id, node_id))
}

pub fn device_scope(group_id: &str, node_id: &str, device: &str) -> ScopeId {
    ScopeId::Device(NodeIdentifier::new(group_id, node_id).device(device))
}

pub fn rebirth_metric(value: bool) -> Metric {
    let mut metric = Metric::new();
    metric
        .set_name(NODE_CONTROL_REBIRTH.to_string())
        .set_datatype(DataType::Boolean)
        .set_value(Value::BooleanValue(value));
    metric
}

pub fn send_command(broker: &ChannelBroker, id: ScopeId, metrics: Vec<Metric>) {
    let kind = match id {
        ScopeId::Node(_) => MessageKind::NCmd,
        ScopeId::Device(_) => MessageKind::DCmd,
    };
    let payload = Payload {
        timestamp: Some(0),
        metrics,
        ..Default::default()
    };
    broker
        .tx_event
        .send(Event::Message(Message { id, kind, payload }))
        .unwrap();
}

pub fn send_ndeath(broker: &ChannelBroker, group_id: &str, node_id: &str, bdseq: u8) {
    let payload = Payload {
        timestamp: Some(0),
        metrics: vec![BdSeq::new(bdseq).to_metric()],
        ..Default::default()
    };
    broker
        .tx_event
        .send(Event::Message(Message {
            id: node_scope(group_id, node_id),
            kind: MessageKind::NDeath,
            payload,
        }))
        .unwrap();
}

pub fn verify_nbirth_payload(payload: &Payload, expected_bdseq: u8) {
    assert_eq!(payload.seq, Some(0));
    assert_ne!(payload.timestamp, None);

    let mut contains_node_control = false;
    let mut contains_bdseq = false;
    for metric in &payload.metrics {
        assert_ne!(metric.datatype, None);
        let metric_name = match &metric.name {
            Some(name) => name,
            None => panic!("Metric name is required in birth payload"),
        };

        if metric_name.eq(NODE_CONTROL_REBIRTH) {
            contains_node_control = true;
            assert_eq!(metric.alias, None);
            assert_eq!(metric.datatype, Some(DataType::Boolean as u32));
            assert_eq!(metric.value, Some(Value::BooleanValue(false)));
        }

        if metric_name.eq(BDSEQ) {
            contains_bdseq = true;
            assert_eq!(metric.alias, None);
            assert_eq!(metric.datatype, Some(DataType::Int64 as u32));
        }
    }
    assert!(contains_node_control);
    assert!(contains_bdseq);
    assert_eq!(payload.bdseq(), Ok(BdSeq::new(expected_bdseq)));
}

pub fn expected_filters(group_id: &str, node_id: &str, host: Option<&str>) -> Vec<TopicFilter> {
    let id = NodeIdentifier::new(group_id, node_id);
    let mut filters = vec![
        TopicFilter::new_with_qos(
            Topic::Message(MessageTopic::node(&id, MessageKind::NCmd)),
            QoS::AtLeastOnce,
        ),
        TopicFilter::new_with_qos(
            Topic::Message(MessageTopic::device(&id.device("+"), MessageKind::DCmd)),
            QoS::AtLeastOnce,
        ),
        TopicFilter::new_with_qos(
            Topic::Message(MessageTopic::node(&id, MessageKind::NDeath)),
            QoS::AtLeastOnce,
        ),
    ];
    if let Some(host) = host {
        filters.push(TopicFilter::new_with_qos(
            Topic::State(StateTopic::new_host(host)),
            QoS::AtLeastOnce,
        ));
    }
    filters
}

pub async fn verify_subscription(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    host: Option<&str>,
) {
    let filters = match recv(broker).await {
        OutboundMessage::Subscribe(filters) => filters,
        message => panic!("got {message:?}"),
    };
    let expected = expected_filters(group_id, node_id, host);
    assert_eq!(filters.len(), expected.len());
    for x in expected {
        assert!(
            filters.contains(&x),
            "Sub filters did not contain expected filter: {x:?}"
        )
    }
}

/// Bring the node online and check its subscriptions and birth certificate
pub async fn test_node_online(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    expected_bdseq: u8,
) -> Payload {
    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(broker, group_id, node_id, None).await;
    let (topic, payload) = recv_message(broker).await;
    assert_eq!(
        topic,
        MessageTopic::node(&NodeIdentifier::new(group_id, node_id), MessageKind::NBirth)
    );
    verify_nbirth_payload(&payload, expected_bdseq);
    payload
}

pub async fn verify_device_birth(
    broker: &mut ChannelBroker,
    group_id: &str,
    node_id: &str,
    device_name: &str,
    expected_seq: u64,
) -> Payload {
    let (topic, payload) = recv_message(broker).await;
    assert_eq!(
        topic,
        MessageTopic::device(
            &NodeIdentifier::new(group_id, node_id).device(device_name),
            MessageKind::DBirth
        )
    );
    assert_eq!(payload.seq, Some(expected_seq));
    assert_ne!(payload.timestamp, None);
    payload
}

// Test graceful shutdown using handle.cancel()
pub async fn test_graceful_shutdown(
    broker: &mut ChannelBroker,
    handle: &NodeHandle,
    expected_bdseq: u8,
) {
    handle.cancel().await;
    let payload = expect_message(broker, MessageKind::NDeath, None).await;
    assert_eq!(payload.seq, None);
    assert_eq!(payload.bdseq(), Ok(BdSeq::new(expected_bdseq)));
    assert_eq!(recv(broker).await, OutboundMessage::Disconnect);
}

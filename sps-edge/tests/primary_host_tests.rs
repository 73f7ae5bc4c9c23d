mod utils;

use std::time::Duration;

use sps_client::{
    channel::{ChannelBroker, ChannelEventLoop, OutboundMessage},
    Event,
};
use sps_core::config::{SessionConfig, StartupDelay};
use sps_edge::{EoNBuilder, MetricPublisher, NodeHandle, PublishError};
use sps_types::{
    payload::{DataType, Metric, Value},
    topic::MessageKind,
    BdSeq, StatePayload,
};
use utils::tester::{
    assert_silent, expect_message, recv, settle, verify_nbirth_payload, verify_subscription,
};

const GROUP_ID: &str = "foo";
const NODE_ID: &str = "bar";
const HOST_ID: &str = "scada";

fn channel_node(config: SessionConfig) -> (NodeHandle, ChannelBroker) {
    let (eventloop, client, broker) = ChannelEventLoop::new();
    let (eon, handle) = EoNBuilder::new(eventloop, client)
        .with_group_id(GROUP_ID)
        .with_node_id(NODE_ID)
        .with_config(config)
        .build()
        .unwrap();
    tokio::spawn(async move { eon.run().await });
    (handle, broker)
}

fn host_state(broker: &ChannelBroker, host_id: &str, payload: StatePayload) {
    broker
        .tx_event
        .send(Event::State {
            host_id: host_id.to_string(),
            payload,
        })
        .unwrap();
}

fn metric() -> Metric {
    let mut metric = Metric::new();
    metric
        .set_name("a".to_string())
        .set_datatype(DataType::Boolean)
        .set_value(Value::BooleanValue(true));
    metric
}

#[tokio::test]
async fn birth_waits_for_primary_host() {
    let (handle, mut broker) = channel_node(SessionConfig::default().with_primary_host(HOST_ID));

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    assert_silent(&mut broker).await;
    assert_eq!(
        handle.publish_metric(metric()).await,
        Err(PublishError::UnBirthed)
    );

    /* another host coming online changes nothing */
    host_state(&broker, "other", StatePayload::Online { timestamp: 10 });
    assert_silent(&mut broker).await;

    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 10 });
    let birth = expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;
    verify_nbirth_payload(&birth, 0);
    settle().await;

    handle.publish_metric(metric()).await.unwrap();
    expect_message(&mut broker, MessageKind::NData, Some(1)).await;
}

#[tokio::test]
async fn data_suppressed_while_host_offline() {
    let (handle, mut broker) = channel_node(SessionConfig::default().with_primary_host(HOST_ID));

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 10 });
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;

    host_state(&broker, HOST_ID, StatePayload::Offline { timestamp: 11 });
    settle().await;
    assert_eq!(
        handle.publish_metric(metric()).await,
        Err(PublishError::Suppressed)
    );

    /* stale liveness messages are ignored */
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 9 });
    assert_silent(&mut broker).await;

    /* the host returning triggers a rebirth with the same bdSeq */
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 12 });
    let birth = expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;
    assert_eq!(birth.bdseq(), Ok(BdSeq::new(0)));
    settle().await;
    handle.publish_metric(metric()).await.unwrap();
    expect_message(&mut broker, MessageKind::NData, Some(1)).await;
}

#[tokio::test]
async fn host_seen_while_disconnected_births_on_connect() {
    let (_handle, mut broker) = channel_node(SessionConfig::default().with_primary_host(HOST_ID));

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 10 });
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;

    /* after reconnecting the node waits for the host again */
    broker.tx_event.send(Event::Offline).unwrap();
    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    assert_silent(&mut broker).await;

    /* the retained liveness message is redelivered with the same timestamp */
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 10 });
    let birth = expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;
    assert_eq!(birth.bdseq(), Ok(BdSeq::new(1)));
}

#[tokio::test(start_paused = true)]
async fn disconnect_when_host_does_not_respond() {
    let config = SessionConfig::default()
        .with_primary_host(HOST_ID)
        .with_host_response_timeout(Duration::from_millis(500));
    let (_handle, mut broker) = channel_node(config);

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    assert_eq!(recv(&mut broker).await, OutboundMessage::Disconnect);
}

#[tokio::test(start_paused = true)]
async fn host_response_cancels_disconnect() {
    let config = SessionConfig::default()
        .with_primary_host(HOST_ID)
        .with_host_response_timeout(Duration::from_millis(500));
    let (_handle, mut broker) = channel_node(config);

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, Some(HOST_ID)).await;
    host_state(&broker, HOST_ID, StatePayload::Online { timestamp: 10 });
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(broker.rx_outbound.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn startup_delay_defers_connection_handling() {
    let config = SessionConfig::default().with_startup_delay(StartupDelay::new(800, 800).unwrap());
    let (_handle, mut broker) = channel_node(config);

    broker.tx_event.send(Event::Online).unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(broker.rx_outbound.try_recv().is_err());

    assert!(matches!(
        recv(&mut broker).await,
        OutboundMessage::Subscribe(_)
    ));
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;
}

#[tokio::test(start_paused = true)]
async fn rebirth_debounce_expires() {
    let config = SessionConfig::default().with_rebirth_debounce(Duration::from_secs(2));
    let (handle, mut broker) = channel_node(config);

    broker.tx_event.send(Event::Online).unwrap();
    verify_subscription(&mut broker, GROUP_ID, NODE_ID, None).await;
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;

    handle.rebirth();
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;

    handle.rebirth();
    settle().await;
    assert!(broker.rx_outbound.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    handle.rebirth();
    expect_message(&mut broker, MessageKind::NBirth, Some(0)).await;
}

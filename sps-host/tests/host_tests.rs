mod utils;

use std::time::Duration;

use sps_client::{channel::OutboundMessage, Event};
use sps_core::{
    config::SessionConfig,
    error::{AliasError, SessionError},
};
use sps_host::{HostEvent, RebirthReason, SubscriptionConfig};
use sps_types::{
    payload::Value,
    topic::{MessageKind, ScopeId},
    BdSeq, StatePayload,
};
use utils::tester::{
    aliased, data_sequence, device_message, metric, nbirth, ndata, ndeath, node, start_host,
    TestHost, HOST_ID,
};

async fn online_host(config: SessionConfig) -> TestHost {
    let mut host = start_host(SubscriptionConfig::AllGroups, config);
    host.bring_online().await;
    host
}

async fn birthed_host(config: SessionConfig) -> TestHost {
    let mut host = online_host(config).await;
    host.send(nbirth(0, 1000, vec![metric("temp", Some(0), 1)]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));
    host
}

#[tokio::test]
async fn online_subscribes_and_publishes_state() {
    let mut host = start_host(
        SubscriptionConfig::SingleGroup {
            group_id: "foo".into(),
        },
        SessionConfig::default(),
    );
    host.send(Event::Online);
    assert_eq!(host.next_event().await, HostEvent::Online);
    match host.recv().await {
        OutboundMessage::Subscribe(filters) => {
            let topics: Vec<String> = filters.into_iter().map(|f| f.topic.into()).collect();
            assert_eq!(
                topics,
                vec!["spBv1.0/foo/#".to_string(), format!("spBv1.0/STATE/{HOST_ID}")]
            );
        }
        message => panic!("expected subscription, got {message:?}"),
    }
    let will_timestamp = host.will_timestamp();
    assert_eq!(
        host.recv().await,
        OutboundMessage::StateMessage {
            topic: sps_types::topic::StateTopic::new_host(HOST_ID),
            payload: StatePayload::Online {
                timestamp: will_timestamp
            },
        }
    );
}

#[tokio::test]
async fn birth_and_ordered_data() {
    let mut host = online_host(SessionConfig::default()).await;
    host.send(nbirth(0, 1000, vec![metric("v", None, 0)]));
    match host.next_event().await {
        HostEvent::NBirth {
            id,
            bdseq,
            timestamp,
            metrics,
        } => {
            assert_eq!(id, node());
            assert_eq!(bdseq, BdSeq::new(0));
            assert_eq!(timestamp, 1000);
            assert_eq!(metrics.len(), 2);
        }
        event => panic!("expected birth, got {event:?}"),
    }

    host.send(ndata(1, 1001, vec![metric("v", None, 1)]));
    host.send(ndata(3, 1003, vec![metric("v", None, 3)]));
    host.send(ndata(2, 1002, vec![metric("v", None, 2)]));
    let mut events = Vec::new();
    for _ in 0..3 {
        events.push(host.next_event().await);
    }
    assert_eq!(data_sequence(&events), vec![1, 2, 3]);

    /* redelivery of an accepted message */
    host.send(ndata(2, 1002, vec![metric("v", None, 2)]));
    host.assert_no_event().await;
}

#[tokio::test]
async fn unknown_node_requests_rebirth_once() {
    let mut host = online_host(SessionConfig::default()).await;
    host.send(ndata(5, 1000, vec![metric("v", None, 5)]));
    host.expect_rebirth(&node(), RebirthReason::UnknownNode).await;

    host.send(ndata(6, 1001, vec![metric("v", None, 6)]));
    host.assert_no_event().await;
    host.assert_silent().await;

    /* a birth answers the request */
    host.send(nbirth(0, 2000, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));
}

#[tokio::test]
async fn death_must_match_birth() {
    let mut host = online_host(SessionConfig::default()).await;
    host.send(nbirth(3, 1000, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));

    host.send(ndeath(2));
    assert_eq!(
        host.next_event().await,
        HostEvent::StaleDeath {
            id: node(),
            bdseq: BdSeq::new(2)
        }
    );

    host.send(ndeath(3));
    assert_eq!(
        host.next_event().await,
        HostEvent::NDeath {
            id: node(),
            bdseq: BdSeq::new(3)
        }
    );

    host.send(ndata(1, 1001, vec![metric("v", None, 1)]));
    host.expect_rebirth(&node(), RebirthReason::UnknownNode).await;
}

#[tokio::test]
async fn stale_births_ignored() {
    let mut host = online_host(SessionConfig::default()).await;
    host.send(nbirth(1, 1000, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));

    /* same session, no newer timestamp */
    host.send(nbirth(1, 1000, vec![]));
    assert!(matches!(
        host.next_event().await,
        HostEvent::StaleBirth { .. }
    ));

    /* a rebirth within the session */
    host.send(nbirth(1, 1500, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));

    host.send(ndeath(1));
    assert!(matches!(host.next_event().await, HostEvent::NDeath { .. }));

    /* a delayed birth from before the last one */
    host.send(nbirth(0, 900, vec![]));
    assert!(matches!(
        host.next_event().await,
        HostEvent::StaleBirth { .. }
    ));
    assert_eq!(host.client.host_id(), HOST_ID);
}

#[tokio::test]
async fn aliases_resolved_on_data() {
    let mut host = birthed_host(SessionConfig::default()).await;

    host.send(ndata(1, 1001, vec![aliased(0, 42)]));
    match host.next_event().await {
        HostEvent::NData { metrics, .. } => {
            assert_eq!(metrics[0].name.as_deref(), Some("temp"));
            assert_eq!(metrics[0].value, Some(Value::LongValue(42)));
        }
        event => panic!("expected data, got {event:?}"),
    }

    host.send(ndata(2, 1002, vec![aliased(9, 1)]));
    assert_eq!(
        host.next_event().await,
        HostEvent::InvalidMessage {
            id: ScopeId::Node(node()),
            kind: MessageKind::NData,
            error: SessionError::Alias(AliasError::UnknownAlias(9)),
        }
    );

    /* the session continues after a message that could not be interpreted */
    host.send(ndata(3, 1003, vec![aliased(0, 43)]));
    assert!(matches!(host.next_event().await, HostEvent::NData { .. }));
}

#[tokio::test]
async fn alias_conflict_requests_rebirth() {
    let mut host = online_host(SessionConfig::default()).await;
    host.send(nbirth(
        0,
        1000,
        vec![metric("a", Some(0), 0), metric("b", Some(0), 0)],
    ));
    assert!(matches!(
        host.next_event().await,
        HostEvent::InvalidMessage {
            kind: MessageKind::NBirth,
            error: SessionError::Alias(AliasError::AliasConflict { .. }),
            ..
        }
    ));
    host.expect_rebirth(&node(), RebirthReason::AliasConflict).await;
}

#[tokio::test]
async fn device_lifecycle() {
    let mut host = birthed_host(SessionConfig::default()).await;
    let device = node().device("dev");

    host.send(device_message(
        MessageKind::DBirth,
        "dev",
        1,
        1001,
        vec![metric("d", Some(0), 0)],
    ));
    match host.next_event().await {
        HostEvent::DBirth { id, .. } => assert_eq!(id, device),
        event => panic!("expected device birth, got {event:?}"),
    }

    host.send(device_message(MessageKind::DData, "dev", 2, 1002, vec![aliased(0, 7)]));
    match host.next_event().await {
        HostEvent::DData { id, metrics, .. } => {
            assert_eq!(id, device);
            assert_eq!(metrics[0].name.as_deref(), Some("d"));
        }
        event => panic!("expected device data, got {event:?}"),
    }

    host.send(device_message(MessageKind::DDeath, "dev", 3, 1003, vec![]));
    assert_eq!(
        host.next_event().await,
        HostEvent::DDeath { id: device.clone() }
    );

    host.send(device_message(MessageKind::DData, "dev", 4, 1004, vec![aliased(0, 8)]));
    match host.next_event().await {
        HostEvent::RebirthRequested(details) => {
            assert_eq!(details.reason, RebirthReason::UnknownDevice);
            assert_eq!(details.device.as_deref(), Some("dev"));
        }
        event => panic!("expected rebirth request, got {event:?}"),
    }
}

#[tokio::test]
async fn node_death_takes_devices_offline() {
    let mut host = birthed_host(SessionConfig::default()).await;
    host.send(device_message(MessageKind::DBirth, "dev", 1, 1001, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::DBirth { .. }));

    host.send(ndeath(0));
    assert!(matches!(host.next_event().await, HostEvent::NDeath { .. }));

    host.send(nbirth(1, 2000, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));
    host.send(device_message(MessageKind::DData, "dev", 1, 2001, vec![]));
    match host.next_event().await {
        HostEvent::RebirthRequested(details) => {
            assert_eq!(details.reason, RebirthReason::UnknownDevice)
        }
        event => panic!("expected rebirth request, got {event:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn unresolved_gap_requests_rebirth() {
    let config = SessionConfig::default().with_rebirth_timeout(Duration::from_secs(2));
    let mut host = birthed_host(config).await;

    host.send(ndata(2, 1002, vec![metric("v", None, 2)]));
    host.assert_no_event().await;

    match host.next_event_within(Duration::from_secs(5)).await {
        HostEvent::RebirthRequested(details) => {
            assert_eq!(details.node_id, node());
            assert_eq!(details.reason, RebirthReason::SeqOutOfOrder);
        }
        event => panic!("expected rebirth request, got {event:?}"),
    }

    host.send(nbirth(0, 2000, vec![]));
    assert!(matches!(host.next_event().await, HostEvent::NBirth { .. }));
    host.send(ndata(1, 2001, vec![metric("v", None, 1)]));
    assert_eq!(data_sequence(&[host.next_event().await]), vec![1]);
}

#[tokio::test]
async fn data_from_before_birth_dropped() {
    let mut host = birthed_host(SessionConfig::default()).await;
    host.send(ndata(1, 999, vec![metric("v", None, 1)]));
    host.assert_no_event().await;
    host.send(ndata(1, 1001, vec![metric("v", None, 1)]));
    assert_eq!(data_sequence(&[host.next_event().await]), vec![1]);
}

#[tokio::test]
async fn own_offline_state_republished() {
    let mut host = online_host(SessionConfig::default()).await;
    let will_timestamp = host.will_timestamp();
    host.send(Event::State {
        host_id: HOST_ID.into(),
        payload: StatePayload::Offline {
            timestamp: will_timestamp,
        },
    });
    match host.recv().await {
        OutboundMessage::StateMessage { payload, .. } => assert_eq!(
            payload,
            StatePayload::Online {
                timestamp: will_timestamp
            }
        ),
        message => panic!("expected online state, got {message:?}"),
    }

    /* other hosts going offline are not our concern */
    host.send(Event::State {
        host_id: "other".into(),
        payload: StatePayload::Offline { timestamp: 0 },
    });
    host.assert_silent().await;
}

#[tokio::test]
async fn transport_loss_forces_nodes_offline() {
    let mut host = birthed_host(SessionConfig::default()).await;
    host.send(Event::Offline);
    assert_eq!(host.next_event().await, HostEvent::Offline);

    host.bring_online().await;
    host.send(ndata(1, 1001, vec![metric("v", None, 1)]));
    host.expect_rebirth(&node(), RebirthReason::UnknownNode).await;
}

#[tokio::test]
async fn cancel() {
    let mut host = online_host(SessionConfig::default()).await;
    host.client.cancel().await;
    match host.recv().await {
        OutboundMessage::StateMessage { payload, .. } => assert!(!payload.is_online()),
        message => panic!("expected offline state, got {message:?}"),
    }
    assert_eq!(host.recv().await, OutboundMessage::Disconnect);
    assert_eq!(host.next_event().await, HostEvent::Stopped);
}

#[tokio::test]
async fn invalid_host_id_rejected() {
    let (eventloop, client, _broker) = sps_client::channel::ChannelEventLoop::new();
    let result = sps_host::HostApplication::new(
        "bad/host",
        SubscriptionConfig::AllGroups,
        SessionConfig::default(),
        eventloop,
        client,
    );
    assert!(matches!(result, Err(sps_host::HostError::InvalidHostId(_))));
}

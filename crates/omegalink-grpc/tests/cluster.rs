//! End-to-end connector tests over the public API.
//!
//! No coordinator is running in these tests: channels are lazy, so
//! construction and selection work offline, and calls against an
//! unreachable loopback port exercise the delivery-error path.

use std::sync::Arc;
use std::time::Duration;

use omegalink_core::saga::{SagaStartedEvent, SubTxEndedEvent};
use omegalink_core::tcc::ParticipationEndedEvent;
use omegalink_core::{ProtocolError, ServiceConfig, TransactionStatus, TransactionType};
use omegalink_grpc::{
    connect, saga_cluster, tcc_cluster, AlphaClusterConfig, ConfigError, ConnectorOptions,
    ManagedSender, SendError, TransactionCluster,
};

fn quick_options() -> ConnectorOptions {
    ConnectorOptions {
        connect_timeout: Duration::from_millis(500),
        call_timeout: Duration::from_millis(500),
        ..ConnectorOptions::default()
    }
}

fn saga_config(addresses: &[&str]) -> AlphaClusterConfig {
    AlphaClusterConfig::builder(TransactionType::Saga)
        .addresses(addresses.iter().copied())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_one_sender_per_configured_address() {
    let cluster = saga_config(&["127.0.0.1:18081", "127.0.0.1:18082", "127.0.0.1:18083"]);
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    assert_eq!(context.pool().senders().len(), 3);
    let targets: Vec<_> = context
        .pool()
        .senders()
        .iter()
        .map(|s| s.target().to_string())
        .collect();
    assert_eq!(
        targets,
        ["127.0.0.1:18081", "127.0.0.1:18082", "127.0.0.1:18083"]
    );
    context.shutdown().await;
}

#[test]
fn test_empty_cluster_fails_construction() {
    let err = AlphaClusterConfig::builder(TransactionType::Saga)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::EmptyCluster));
}

#[tokio::test]
async fn test_type_dispatch_follows_configuration() {
    let saga = saga_config(&["127.0.0.1:18084"]);
    match connect(&saga, &ServiceConfig::new("svc"), &quick_options()).unwrap() {
        TransactionCluster::Saga(ctx) => ctx.shutdown().await,
        TransactionCluster::Tcc(_) => panic!("saga config produced a tcc cluster"),
    }

    let err = tcc_cluster(&saga, &ServiceConfig::new("svc"), &quick_options()).unwrap_err();
    assert!(matches!(err, ConfigError::TransactionTypeMismatch { .. }));
}

#[tokio::test]
async fn test_unreadable_tls_material_fails_construction() {
    let cluster = AlphaClusterConfig::builder(TransactionType::Saga)
        .address("127.0.0.1:18085")
        .ssl("/nonexistent/ca.crt")
        .build()
        .unwrap();
    let err = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap_err();
    assert!(matches!(err, ConfigError::TlsMaterial { .. }));
}

#[tokio::test]
async fn test_delivery_error_marks_sender_unhealthy() {
    // discard-port address nothing listens on
    let cluster = saga_config(&["127.0.0.1:9"]);
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    let sender = context.select_sender();

    let err = sender
        .begin_transaction(SagaStartedEvent::new("g1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Delivery(_)));
    assert_eq!(sender.health().consecutive_failures(), 1);
    assert!(!sender.health().is_connected());
    assert!(sender.health().last_failure_at().is_some());

    context.shutdown().await;
}

#[tokio::test]
async fn test_failover_prefers_the_other_address() {
    let cluster = saga_config(&["127.0.0.1:9", "127.0.0.1:18086"]);
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();

    let first = context.pool().senders()[0].clone();
    let _ = first.begin_transaction(SagaStartedEvent::new("g1")).await;
    assert_eq!(first.health().consecutive_failures(), 1);
    assert_eq!(context.select_sender().target(), "127.0.0.1:18086");

    context.shutdown().await;
}

#[tokio::test]
async fn test_protocol_errors_do_not_touch_health() {
    let cluster = saga_config(&["127.0.0.1:18087"]);
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    let sender = context.select_sender();

    let err = sender
        .end_sub_transaction(SubTxEndedEvent::new("never-started", "l1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SendError::Protocol(ProtocolError::UnknownTransaction(_))
    ));
    assert_eq!(sender.health().consecutive_failures(), 0);

    context.shutdown().await;
}

#[tokio::test]
async fn test_tcc_cluster_validates_before_any_io() {
    let cluster = AlphaClusterConfig::builder(TransactionType::Tcc)
        .address("127.0.0.1:18088")
        .build()
        .unwrap();
    let context = tcc_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    let sender = context.select_sender();

    sender.flow().begin("g2").unwrap();
    let err = sender
        .participation_end(ParticipationEndedEvent::new(
            "g2",
            "p1",
            TransactionStatus::Succeeded,
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SendError::Protocol(ProtocolError::NotStarted { .. })
    ));

    context.shutdown().await;
}

#[tokio::test]
async fn test_closed_cluster_refuses_further_calls() {
    let cluster = saga_config(&["127.0.0.1:18089"]);
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    let sender = context.select_sender();
    context.shutdown().await;

    let err = sender
        .begin_transaction(SagaStartedEvent::new("g1"))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Delivery(_)));
}

#[tokio::test]
async fn test_custom_payload_codec_is_used() {
    use bytes::Bytes;
    use omegalink_core::{PayloadCodec, ProtocolResult};
    use serde_json::Value;

    // a codec that rejects everything makes the seam observable
    #[derive(Debug)]
    struct RejectAll;
    impl PayloadCodec for RejectAll {
        fn encode(&self, _payload: &Value) -> ProtocolResult<Bytes> {
            Err(ProtocolError::Codec("rejected".into()))
        }
        fn decode(&self, _bytes: &[u8]) -> ProtocolResult<Value> {
            Err(ProtocolError::Codec("rejected".into()))
        }
    }

    let cluster = AlphaClusterConfig::builder(TransactionType::Saga)
        .address("127.0.0.1:18090")
        .payload_codec(Arc::new(RejectAll))
        .build()
        .unwrap();
    let context = saga_cluster(&cluster, &ServiceConfig::new("svc"), &quick_options()).unwrap();
    let sender = context.select_sender();

    sender.flow().begin("g1").unwrap();
    let err = sender
        .begin_sub_transaction(omegalink_core::saga::SubTxStartedEvent::new(
            "g1",
            "l1",
            "compensate",
            serde_json::json!({"n": 1}),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, SendError::Protocol(ProtocolError::Codec(_))));

    context.shutdown().await;
}

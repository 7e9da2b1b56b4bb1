//! Tunnel registry routing and cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeFactory, eventually, init_tracing};
use media_relay::RelayError;
use media_relay::relay::{RelayConfig, SessionSignal, TunnelRegistry, TunnelState};

fn registry() -> (Arc<FakeFactory>, TunnelRegistry) {
    init_tracing();
    let factory = FakeFactory::new();
    let registry = TunnelRegistry::new(factory.clone(), RelayConfig::default());
    (factory, registry)
}

#[tokio::test]
async fn test_offers_routed_by_kind() {
    let (factory, registry) = registry();

    let answer = registry
        .handle(&SessionSignal::caller_offer("call-1", "a"))
        .await
        .unwrap();
    assert_eq!(answer.sdp, "answer-to:a");
    assert_eq!(registry.len().await, 1);

    let answer = registry
        .handle(&SessionSignal::callee_offer("call-1", "b"))
        .await
        .unwrap();
    assert_eq!(answer.sdp, "answer-to:b");
    assert_eq!(registry.len().await, 1);
    assert_eq!(factory.created(), 2);
}

#[tokio::test]
async fn test_duplicate_and_unknown_ids() {
    let (_factory, registry) = registry();
    registry
        .handle(&SessionSignal::caller_offer("dup", "a"))
        .await
        .unwrap();

    assert!(matches!(
        registry.handle(&SessionSignal::caller_offer("dup", "a")).await,
        Err(RelayError::TunnelExists(id)) if id == "dup"
    ));
    assert!(matches!(
        registry.handle(&SessionSignal::callee_offer("nobody", "b")).await,
        Err(RelayError::UnknownTunnel(id)) if id == "nobody"
    ));
    assert!(matches!(
        registry.hangup("nobody").await,
        Err(RelayError::UnknownTunnel(_))
    ));
}

#[tokio::test]
async fn test_hangup_closes_tunnel() {
    let (factory, registry) = registry();
    registry
        .handle(&SessionSignal::caller_offer("bye", "a"))
        .await
        .unwrap();
    let tunnel = registry.get("bye").await.unwrap();

    registry.hangup("bye").await.unwrap();

    assert!(registry.is_empty().await);
    assert_eq!(tunnel.state(), TunnelState::Closed);
    assert!(factory.session(0).is_closed());
}

#[tokio::test]
async fn test_failed_tunnel_removed_by_cleanup() {
    let (factory, registry) = registry();
    registry
        .handle(&SessionSignal::caller_offer("flaky", "a"))
        .await
        .unwrap();

    let caller_audio = factory.session(0).add_track("audio/PCMU");
    caller_audio.fail("connection lost").await;

    assert!(eventually_empty(&registry).await);
    assert!(eventually(|| factory.session(0).is_closed()).await);

    // the id is free again
    registry
        .handle(&SessionSignal::caller_offer("flaky", "again"))
        .await
        .unwrap();
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let (factory, registry) = registry();
    for sid in ["one", "two"] {
        registry
            .handle(&SessionSignal::caller_offer(sid, "a"))
            .await
            .unwrap();
    }

    registry.shutdown().await;

    assert!(registry.is_empty().await);
    assert!(factory.session(0).is_closed());
    assert!(factory.session(1).is_closed());
    assert!(matches!(
        registry.handle(&SessionSignal::caller_offer("three", "a")).await,
        Err(RelayError::TunnelClosed)
    ));
}

#[tokio::test]
async fn test_zero_capacity_config_does_not_panic() {
    init_tracing();
    let factory = FakeFactory::new();
    let config = RelayConfig {
        error_capacity: 0,
        registry_capacity: 0,
        ..RelayConfig::default()
    };
    let registry = TunnelRegistry::new(factory.clone(), config);

    registry
        .handle(&SessionSignal::caller_offer("tiny", "a"))
        .await
        .unwrap();
    let caller_audio = factory.session(0).add_track("audio/PCMU");
    caller_audio.fail("gone").await;

    assert!(eventually_empty(&registry).await);
}

async fn eventually_empty(registry: &TunnelRegistry) -> bool {
    for _ in 0..1000 {
        if registry.is_empty().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

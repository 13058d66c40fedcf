use crate::utils::mock_relay::MockRelayConnector;
use crate::utils::mock_transport::MockConnector;
use crate::utils::{build_client, init_tracing, settle};
use std::time::Duration;
use tincan_client::SessionStatus;
use tokio::time::{Instant, timeout};

#[tokio::test(start_paused = true)]
async fn backoff_is_linear_until_the_budget_is_spent() {
    init_tracing();
    let (relay, _handles) = MockRelayConnector::new();
    let (transport, _links) = MockConnector::new();
    relay.fail_next(u32::MAX);
    let client = build_client(relay.clone(), transport);
    let mut events = client.subscribe();

    let started = Instant::now();
    client.initialize("Alice", "ROOM42").await;

    events
        .status
        .wait_for(|s| *s == SessionStatus::Failed)
        .await
        .unwrap();

    // max_reconnect_attempts = 3, base = 2s: waits of 2s, 4s and 6s.
    assert_eq!(started.elapsed(), Duration::from_secs(12));
    assert_eq!(relay.connect_count(), 4);

    // Terminal: nothing keeps dialing afterwards.
    settle().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(relay.connect_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn reconnect_counter_is_announced_while_retrying() {
    init_tracing();
    let (relay, _handles) = MockRelayConnector::new();
    let (transport, _links) = MockConnector::new();
    relay.fail_next(u32::MAX);
    let client = build_client(relay, transport);
    let mut events = client.subscribe();

    client.initialize("Alice", "ROOM42").await;

    let status = events
        .status
        .wait_for(|s| matches!(s, SessionStatus::Reconnecting { .. }))
        .await
        .unwrap()
        .clone();
    assert_eq!(status, SessionStatus::Reconnecting { attempt: 1, max: 3 });
    assert_eq!(status.to_string(), "Reconnecting… (1/3)");
}

#[tokio::test(start_paused = true)]
async fn relay_loss_after_connecting_resets_the_budget() {
    init_tracing();
    let (relay, mut handles) = MockRelayConnector::new();
    let (transport, _links) = MockConnector::new();
    let client = build_client(relay.clone(), transport);
    let mut events = client.subscribe();

    client.initialize("Alice", "ROOM42").await;
    let first = handles.recv().await.unwrap();
    first.identify("me-1", vec![]).await;
    events
        .status
        .wait_for(|s| *s == SessionStatus::Connected)
        .await
        .unwrap();

    first.close().await;
    let status = events
        .status
        .wait_for(|s| matches!(s, SessionStatus::Reconnecting { .. }))
        .await
        .unwrap()
        .clone();
    // The session reached the relay, so counting starts over at 1.
    assert_eq!(status, SessionStatus::Reconnecting { attempt: 1, max: 3 });

    // The redial succeeds and the session comes back up.
    let second = handles.recv().await.unwrap();
    second.identify("me-1b", vec![]).await;
    events
        .status
        .wait_for(|s| *s == SessionStatus::Connected)
        .await
        .unwrap();
    assert_eq!(relay.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_cancels_a_pending_retry() {
    init_tracing();
    let (relay, mut handles) = MockRelayConnector::new();
    let (transport, _links) = MockConnector::new();
    relay.fail_next(u32::MAX);
    let client = build_client(relay.clone(), transport);
    let mut events = client.subscribe();

    client.initialize("Alice", "ROOM42").await;
    events
        .status
        .wait_for(|s| matches!(s, SessionStatus::Reconnecting { .. }))
        .await
        .unwrap();
    client.dispose().await;

    // Subscribers see a final Disconnected, not a stale Reconnecting.
    events
        .status
        .wait_for(|s| *s == SessionStatus::Disconnected)
        .await
        .unwrap();

    // The backoff timer never fires into another dial.
    assert!(
        timeout(Duration::from_secs(60), handles.recv())
            .await
            .is_err()
    );
    assert_eq!(relay.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_redial_drops_the_peer_from_the_roster() {
    init_tracing();
    let (relay, mut handles) = MockRelayConnector::new();
    let (transport, mut links) = MockConnector::new();
    let client = build_client(relay, transport.clone());

    client.initialize("Alice", "ROOM42").await;
    let handle = handles.recv().await.unwrap();
    handle.identify("me-1", vec![]).await;
    handle.peer_joined("peer-1", "Bob").await;
    settle().await;
    let first = links.recv().await.unwrap();
    first.open_data_path().await;
    settle().await;

    transport.fail_next_opens(1);
    first.lose().await;
    settle().await;

    // The redial was attempted but produced no link; the peer is gone
    // rather than lingering in the roster with no session behind it.
    assert_eq!(transport.open_count(), 2);
    assert_eq!(first.close_count(), 1);
    assert!(client.subscribe().roster.borrow().is_empty());
}

#[tokio::test(start_paused = true)]
async fn messages_echo_locally_while_disconnected() {
    init_tracing();
    let (relay, _handles) = MockRelayConnector::new();
    let (transport, _links) = MockConnector::new();
    relay.fail_next(u32::MAX);
    let client = build_client(relay, transport);
    let mut events = client.subscribe();

    client.initialize("Alice", "ROOM42").await;
    events
        .status
        .wait_for(|s| matches!(s, SessionStatus::Reconnecting { .. }))
        .await
        .unwrap();

    client.send_message("still here").await;
    settle().await;
    let echo = events.messages.recv().await.unwrap();
    assert!(echo.is_own);
    assert_eq!(echo.text, "still here");
}

#[tokio::test(start_paused = true)]
async fn lost_initiator_link_is_redialed_within_budget() {
    init_tracing();
    let (relay, mut handles) = MockRelayConnector::new();
    let (transport, mut links) = MockConnector::new();
    let client = build_client(relay, transport.clone());

    client.initialize("Alice", "ROOM42").await;
    let handle = handles.recv().await.unwrap();
    handle.identify("me-1", vec![]).await;
    handle.peer_joined("peer-1", "Bob").await;
    settle().await;
    let first = links.recv().await.unwrap();
    first.open_data_path().await;
    settle().await;

    // max_dial_attempts = 2: one redial is allowed.
    first.lose().await;
    settle().await;
    let second = links.recv().await.unwrap();
    assert_eq!(first.close_count(), 1);
    assert_eq!(transport.open_count(), 2);

    // A fresh offer goes out for the replacement link.
    use tincan_core::SignalKind;
    assert_eq!(handle.sent_signals(SignalKind::Offer).len(), 2);

    // The second loss exhausts the budget; the peer is dropped.
    second.lose().await;
    settle().await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(second.close_count(), 1);
    assert!(client.subscribe().roster.borrow().is_empty());
}

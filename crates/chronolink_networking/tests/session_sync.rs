//! End-to-end session synchronization over in-memory transports.

use std::time::{Duration, Instant};

use chronolink_core::{Action, Speed, TeamSnapshot, TeamState};
use chronolink_networking::transport::{channel_link, ChannelTransport};
use chronolink_networking::{
    ClientConfig, ClientEvent, HostConfig, SessionClient, SessionHost, Stage,
};
use crossbeam_channel::Receiver;

const SESSION: &str = "match-night";
const ADMIN_TOKEN: &str = "top-secret";

fn new_host() -> SessionHost {
    SessionHost::new(
        HostConfig::new(SESSION, ADMIN_TOKEN),
        &[
            TeamSnapshot::config("Red", 90),
            TeamSnapshot::config("Blue", 120),
        ],
    )
}

fn new_client(credential: &str) -> (SessionClient, Receiver<ChannelTransport>) {
    let (connector, endpoints) = channel_link();
    let mut config = ClientConfig::with_credential(credential);
    config.reconnect_initial = Duration::ZERO;
    let client = SessionClient::new(Box::new(connector), config);
    (client, endpoints)
}

/// Pumps host and clients until traffic settles.
fn settle(
    host: &mut SessionHost,
    clients: &mut [(&mut SessionClient, &Receiver<ChannelTransport>)],
    now: Instant,
) {
    for _ in 0..10 {
        for (_, endpoints) in clients.iter() {
            while let Ok(far) = endpoints.try_recv() {
                host.accept(Box::new(far));
            }
        }
        host.pump(now);
        for (client, _) in clients.iter_mut() {
            client.pump(now);
        }
    }
}

#[test]
fn test_handshake_reaches_in_session() {
    let mut host = new_host();
    let (mut client, endpoints) = new_client(ADMIN_TOKEN);
    client.join(SESSION, |_| {}).unwrap();
    settle(&mut host, &mut [(&mut client, &endpoints)], Instant::now());

    assert_eq!(client.stage(), Stage::InSession);
    assert!(client.is_admin());
    assert_eq!(client.user_count(), 1);
    assert_eq!(client.roster().len(), 2);
    assert_eq!(client.roster().teams()[0].name, "Red");
    assert_eq!(client.roster().teams()[0].state, TeamState::Ready);
}

#[test]
fn test_viewer_join_is_read_only() {
    let mut host = new_host();
    let (mut viewer, endpoints) = new_client("just-watching");
    viewer.join(SESSION, |_| {}).unwrap();
    settle(&mut host, &mut [(&mut viewer, &endpoints)], Instant::now());

    assert_eq!(viewer.stage(), Stage::InSession);
    assert!(!viewer.is_admin());

    viewer.send_action(&Action::Start, &[0]);
    settle(&mut host, &mut [(&mut viewer, &endpoints)], Instant::now());
    // The authority refuses it and nothing starts anywhere.
    assert_eq!(host.roster().teams()[0].state, TeamState::Ready);
    assert_eq!(viewer.roster().teams()[0].state, TeamState::Ready);
    let events = viewer.subscribe();
    let mut refused = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ClientEvent::ServerError(_)) {
            refused = true;
        }
    }
    assert!(refused);
}

#[test]
fn test_unknown_session_reports_reason() {
    let mut host = new_host();
    let (mut client, endpoints) = new_client("anyone");
    let reasons = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = std::sync::Arc::clone(&reasons);
    client
        .join("wrong-session", move |reason| sink.lock().push(reason))
        .unwrap();
    settle(&mut host, &mut [(&mut client, &endpoints)], Instant::now());

    assert_eq!(client.stage(), Stage::JoinFailed);
    assert_eq!(reasons.lock().as_slice(), ["no such session"]);
}

#[test]
fn test_admin_action_converges_all_replicas() {
    let mut host = new_host();
    let (mut admin, admin_eps) = new_client(ADMIN_TOKEN);
    let (mut viewer, viewer_eps) = new_client("watcher");
    admin.join(SESSION, |_| {}).unwrap();
    viewer.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(
        &mut host,
        &mut [(&mut admin, &admin_eps), (&mut viewer, &viewer_eps)],
        now,
    );
    assert_eq!(admin.user_count(), 2);

    admin.send_action(&Action::Start, &[0, 1]);
    // Non-idempotent adjustment: must land exactly once everywhere.
    admin.send_action(&Action::Add(30), &[0]);
    settle(
        &mut host,
        &mut [(&mut admin, &admin_eps), (&mut viewer, &viewer_eps)],
        now,
    );

    for roster in [host.roster(), admin.roster(), viewer.roster()] {
        assert_eq!(roster.teams()[0].state, TeamState::Running);
        assert_eq!(roster.teams()[1].state, TeamState::Running);
        assert_eq!(roster.teams()[0].time_left, 120);
        assert_eq!(roster.teams()[0].time_added, 30);
    }
}

#[test]
fn test_viewer_sees_action_broadcasts() {
    let mut host = new_host();
    let (mut admin, admin_eps) = new_client(ADMIN_TOKEN);
    let (mut viewer, viewer_eps) = new_client("watcher");
    admin.join(SESSION, |_| {}).unwrap();
    viewer.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(
        &mut host,
        &mut [(&mut admin, &admin_eps), (&mut viewer, &viewer_eps)],
        now,
    );
    let events = viewer.subscribe();
    while events.try_recv().is_ok() {}

    admin.send_action(&Action::SetSpeed(Speed::Two), &[1]);
    settle(
        &mut host,
        &mut [(&mut admin, &admin_eps), (&mut viewer, &viewer_eps)],
        now,
    );

    let mut saw_broadcast = false;
    while let Ok(event) = events.try_recv() {
        if let ClientEvent::ActionBroadcast { action, indices } = event {
            assert_eq!(action, Action::SetSpeed(Speed::Two));
            assert_eq!(indices, vec![1]);
            saw_broadcast = true;
        }
    }
    assert!(saw_broadcast);
    assert_eq!(viewer.roster().teams()[1].speed, Speed::Two);
}

#[test]
fn test_heartbeat_measures_latency() {
    let mut host = new_host();
    let (mut client, endpoints) = new_client("watcher");
    client.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(&mut host, &mut [(&mut client, &endpoints)], now);
    assert!(client.latency_ms().is_none());

    let later = now + Duration::from_secs(2);
    settle(&mut host, &mut [(&mut client, &endpoints)], later);
    assert!(client.latency_ms().is_some());
}

#[test]
fn test_client_reconnects_after_authority_restart() {
    let mut host = new_host();
    let (mut client, endpoints) = new_client("watcher");
    client.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(&mut host, &mut [(&mut client, &endpoints)], now);
    assert_eq!(client.stage(), Stage::InSession);

    // The authority dies without a goodbye.
    drop(host);
    client.pump(now);
    assert_eq!(client.stage(), Stage::Connecting);

    let mut replacement = new_host();
    let later = now + Duration::from_secs(1);
    settle(&mut replacement, &mut [(&mut client, &endpoints)], later);
    assert_eq!(client.stage(), Stage::InSession);
    assert_eq!(client.user_count(), 1);
    assert_eq!(client.roster().len(), 2);
}

#[test]
fn test_session_end_stops_reconnecting() {
    let mut host = new_host();
    let (mut client, endpoints) = new_client("watcher");
    client.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(&mut host, &mut [(&mut client, &endpoints)], now);

    host.shutdown();
    settle(&mut host, &mut [(&mut client, &endpoints)], now);
    assert_eq!(client.stage(), Stage::SessionEnded);

    // No redial, even long after every backoff rung.
    client.pump(now + Duration::from_secs(60));
    assert!(endpoints.try_recv().is_err());
}

#[test]
fn test_leave_detaches_quietly() {
    let mut host = new_host();
    let (mut admin, admin_eps) = new_client(ADMIN_TOKEN);
    let (mut viewer, viewer_eps) = new_client("watcher");
    admin.join(SESSION, |_| {}).unwrap();
    viewer.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(
        &mut host,
        &mut [(&mut admin, &admin_eps), (&mut viewer, &viewer_eps)],
        now,
    );

    viewer.leave();
    settle(&mut host, &mut [(&mut admin, &admin_eps)], now);
    assert_eq!(host.user_count(), 1);
    assert_eq!(admin.user_count(), 1);

    // Traffic after leaving never reaches the departed client.
    admin.send_action(&Action::Start, &[0]);
    settle(&mut host, &mut [(&mut admin, &admin_eps)], now);
    viewer.pump(now);
    assert_eq!(viewer.stage(), Stage::Disconnected);
    assert_eq!(viewer.roster().teams()[0].state, TeamState::Ready);
}

#[test]
fn test_late_join_gets_live_state() {
    let mut host = new_host();
    let (mut admin, admin_eps) = new_client(ADMIN_TOKEN);
    admin.join(SESSION, |_| {}).unwrap();
    let now = Instant::now();
    settle(&mut host, &mut [(&mut admin, &admin_eps)], now);
    admin.send_action(&Action::Start, &[1]);
    settle(&mut host, &mut [(&mut admin, &admin_eps)], now);

    let (mut viewer, viewer_eps) = new_client("late-arrival");
    viewer.join(SESSION, |_| {}).unwrap();
    settle(&mut host, &mut [(&mut viewer, &viewer_eps)], now);

    // The join result carries live state, not just configuration.
    assert_eq!(viewer.roster().teams()[1].state, TeamState::Running);
}

//! Two-device sync over loopback
//!
//! Real host and client peers discover each other over UDP, handshake over
//! TCP and run the full sync sequence, each with its own temporary SD
//! directory. Misbehaving peers are played by hand-written socket code.
//!
//! Run with:
//!   cargo test --test peer_sync

use std::net::SocketAddr;
use std::time::Duration;

use pldsync::merge::MergeError;
use pldsync::network::{exchange, send_frame, Beacon, NetError, PeerState, Role, SyncPeer, MAGIC};
use pldsync::record::{Session, SessionLog, Summary, TitleNames, MAX_PLAY_SECS};
use pldsync::storage::{DeviceState, Workspace};
use pldsync::sync::{run_sync, SyncError, SyncPhase, SyncWorker};
use pldsync::NetConfig;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Ports that were free a moment ago.
fn free_ports() -> (u16, u16) {
    let tcp = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let udp = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    (
        tcp.local_addr().unwrap().port(),
        udp.local_addr().unwrap().port(),
    )
}

fn loopback_config() -> NetConfig {
    let (tcp_port, udp_port) = free_ports();
    NetConfig {
        tcp_port,
        udp_port,
        discovery_target: SocketAddr::from(([127, 0, 0, 1], udp_port)),
        tick_interval_ms: 10,
        broadcast_every_ticks: 2,
    }
}

/// `count` hourly sessions of 60 s for one title, plus its summary.
fn seeded_state(title_id: u64, count: u32) -> DeviceState {
    let sessions: Vec<Session> = (0..count)
        .map(|i| Session::new(title_id, i * 3600, 60))
        .collect();
    let mut state = DeviceState::default();
    state.store.sessions = SessionLog::from_entries(sessions).unwrap();
    state
        .store
        .summaries
        .insert(Summary::new(title_id, count * 60, count as u16, 0, 10));
    state
}

fn names(entries: &[(u64, &str)]) -> TitleNames {
    let mut names = TitleNames::new();
    for (id, name) in entries {
        names.insert(*id, name);
    }
    names
}

/// Beacon to `config.discovery_target` until aborted.
fn spawn_beacon(config: &NetConfig) -> JoinHandle<()> {
    let target = config.discovery_target;
    tokio::spawn(async move {
        let beacon = Beacon::bind(target).await.unwrap();
        loop {
            let _ = beacon.announce().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

/// Accept one client and answer its handshake.
async fn accept_client(listener: TcpListener) -> tokio::net::TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();
    stream.write_all(&MAGIC.to_le_bytes()).await.unwrap();
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).await.unwrap();
    assert_eq!(u32::from_le_bytes(magic), MAGIC);
    stream
}

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(20), fut)
        .await
        .expect("test timed out")
}

// ---------------------------------------------------------------------------
// Full syncs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disjoint_sessions_sync_both_ways() {
    let config = loopback_config();
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let host_ws = Workspace::new(host_dir.path(), 10);
    let client_ws = Workspace::new(client_dir.path(), 10);

    let mut host_state = seeded_state(0x1111, 100);
    host_state.names = names(&[(0x1111, "Host Game")]);
    let mut client_state = seeded_state(0x2222, 50);
    client_state.names = names(&[(0x2222, "Client Game")]);

    let host = SyncWorker::spawn(host_state, Role::Host, config.clone(), host_ws.clone());
    let client = SyncWorker::spawn(client_state, Role::Client, config, client_ws.clone());

    let (host_state, host_result) = within(host.join()).await.unwrap();
    let (client_state, client_result) = within(client.join()).await.unwrap();
    let host_report = host_result.unwrap();
    let client_report = client_result.unwrap();

    assert_eq!(host_report.new_sessions, 50);
    assert_eq!(client_report.new_sessions, 100);
    assert_eq!(host_report.new_titles, 1);
    assert_eq!(client_report.new_titles, 1);
    assert_eq!(host_report.new_names, Some(1));
    assert_eq!(client_report.new_names, Some(1));

    for (state, ws) in [(&host_state, &host_ws), (&client_state, &client_ws)] {
        assert_eq!(state.store.sessions.len(), 150);
        assert_eq!(state.store.summaries.get(0x1111).unwrap().total_secs, 6000);
        assert_eq!(state.store.summaries.get(0x2222).unwrap().total_secs, 3000);
        assert_eq!(state.names.lookup(0x1111), Some("Host Game"));
        assert_eq!(state.names.lookup(0x2222), Some("Client Game"));
        assert_eq!(state.sync_count, 1);

        assert_eq!(ws.read_merged().await.unwrap().as_ref(), Some(&state.store));
        assert_eq!(ws.load_sync_count().await.unwrap(), 1);
        assert_eq!(ws.load_names().await.unwrap(), state.names);
    }
    assert_eq!(host_report.status_line(), "Synced: +50 sess +1 apps");
}

#[tokio::test]
async fn test_overlapping_sessions_are_capped_and_totals_recomputed() {
    let config = loopback_config();
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();

    let mut host_state = DeviceState::default();
    host_state.store.sessions =
        SessionLog::from_entries(vec![Session::new(7, 0, 2000), Session::new(7, 3600, 100)])
            .unwrap();
    host_state.store.summaries.insert(Summary::new(7, 2100, 3, 5, 9));

    let mut client_state = DeviceState::default();
    client_state.store.sessions = SessionLog::from_entries(vec![Session::new(7, 0, 2000)]).unwrap();
    client_state.store.summaries.insert(Summary::new(7, 2000, 2, 4, 8));

    let host = SyncWorker::spawn(
        host_state,
        Role::Host,
        config.clone(),
        Workspace::new(host_dir.path(), 10),
    );
    let client = SyncWorker::spawn(
        client_state,
        Role::Client,
        config,
        Workspace::new(client_dir.path(), 10),
    );

    let (host_state, host_result) = within(host.join()).await.unwrap();
    let (client_state, client_result) = within(client.join()).await.unwrap();
    assert_eq!(host_result.unwrap().new_sessions, 0);
    assert_eq!(client_result.unwrap().new_sessions, 1);

    for state in [&host_state, &client_state] {
        let sessions = &state.store.sessions;
        let i = sessions.find(7, 0).unwrap();
        assert_eq!(sessions.as_slice()[i].play_secs, MAX_PLAY_SECS);

        let summary = state.store.summaries.get(7).unwrap();
        assert_eq!(summary.total_secs, MAX_PLAY_SECS + 100);
        assert_eq!(summary.launch_count, 5);
        assert_eq!(summary.first_played_days, 4);
        assert_eq!(summary.last_played_days, 9);
    }
}

#[tokio::test]
async fn test_second_sync_backs_up_previous_merge() {
    let config = loopback_config();
    let host_dir = tempfile::tempdir().unwrap();
    let client_dir = tempfile::tempdir().unwrap();
    let host_ws = Workspace::new(host_dir.path(), 10);
    host_ws.write_merged(&seeded_state(1, 1).store).await.unwrap();

    let host = SyncWorker::spawn(seeded_state(1, 3), Role::Host, config.clone(), host_ws.clone());
    let client = SyncWorker::spawn(
        seeded_state(2, 3),
        Role::Client,
        config,
        Workspace::new(client_dir.path(), 10),
    );

    let (_, host_result) = within(host.join()).await.unwrap();
    let (_, client_result) = within(client.join()).await.unwrap();
    let host_report = host_result.unwrap();
    assert!(client_result.unwrap().backup.is_none());

    let backup = host_report.backup.unwrap();
    let previous = host_ws.backups().restore(&backup).await.unwrap();
    assert_eq!(previous, seeded_state(1, 1).store);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_client_rejects_host_with_wrong_magic() {
    let config = loopback_config();
    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await.unwrap();
    let beacon = spawn_beacon(&config);

    let impostor = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&0x0BAD_F00Du32.to_le_bytes()).await.unwrap();
        // Hold the connection until the client hangs up.
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
        rest
    });

    let (_cancel_tx, mut cancel) = watch::channel(false);
    let mut peer = SyncPeer::new(Role::Client, config);
    let err = within(peer.connect(&mut cancel)).await.unwrap_err();
    assert!(matches!(err, NetError::Protocol(_)));
    assert_eq!(peer.state(), PeerState::Error);

    peer.shutdown();
    let answered = within(impostor).await.unwrap();
    assert!(answered.is_empty(), "client must not answer a bad magic");
    beacon.abort();
}

#[tokio::test]
async fn test_oversized_count_fails_sync_without_persisting() {
    let config = loopback_config();
    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await.unwrap();
    let beacon = spawn_beacon(&config);

    let rogue_host = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(&MAGIC.to_le_bytes()).await.unwrap();
        let mut magic = [0u8; 4];
        stream.read_exact(&mut magic).await.unwrap();
        assert_eq!(u32::from_le_bytes(magic), MAGIC);
        stream.write_all(&50_001u32.to_le_bytes()).await.unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path(), 10);
    let before = seeded_state(3, 5);
    let mut state = before.clone();
    let (_cancel_tx, mut cancel) = watch::channel(false);
    let (phase_tx, phase_rx) = watch::channel(SyncPhase::Connecting);
    let mut peer = SyncPeer::new(Role::Client, config);

    let result = within(run_sync(
        &mut state,
        &mut peer,
        &ws,
        &mut cancel,
        Some(&phase_tx),
    ))
    .await;

    assert!(matches!(
        result,
        Err(SyncError::Net(NetError::Protocol(_)))
    ));
    assert_eq!(state, before);
    assert_eq!(*phase_rx.borrow(), SyncPhase::Failed);
    assert!(ws.read_merged().await.unwrap().is_none());
    assert_eq!(ws.load_sync_count().await.unwrap(), 0);

    within(rogue_host).await.unwrap();
    beacon.abort();
}

#[tokio::test]
async fn test_lost_name_exchange_still_completes_sync() {
    let config = loopback_config();
    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await.unwrap();
    let beacon = spawn_beacon(&config);

    let host = tokio::spawn(async move {
        let mut stream = accept_client(listener).await;
        let sessions: Vec<Session> =
            exchange(&mut stream, Role::Host, &[Session::new(0x5555, 0, 120)][..])
                .await
                .unwrap();
        let summaries: Vec<Summary> = exchange(
            &mut stream,
            Role::Host,
            &[Summary::new(0x5555, 120, 1, 3, 3)][..],
        )
        .await
        .unwrap();
        // Hang up before the title-name frame.
        (sessions.len(), summaries.len())
    });

    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path(), 10);
    let local_names = names(&[(0x6666, "Local Game")]);
    ws.save_names(&local_names).await.unwrap();
    let mut state = seeded_state(0x6666, 2);
    state.names = local_names.clone();
    let (_cancel_tx, mut cancel) = watch::channel(false);
    let (phase_tx, phase_rx) = watch::channel(SyncPhase::Connecting);
    let mut peer = SyncPeer::new(Role::Client, config);

    let report = within(run_sync(
        &mut state,
        &mut peer,
        &ws,
        &mut cancel,
        Some(&phase_tx),
    ))
    .await
    .unwrap();

    assert_eq!(report.new_names, None);
    assert_eq!(report.new_sessions, 1);
    assert_eq!(report.new_titles, 1);
    assert_eq!(report.sync_count, 1);
    assert_eq!(*phase_rx.borrow(), SyncPhase::Done);

    assert_eq!(state.sync_count, 1);
    assert_eq!(state.store.sessions.len(), 3);
    assert_eq!(state.names, local_names);
    assert_eq!(ws.read_merged().await.unwrap().as_ref(), Some(&state.store));
    assert_eq!(ws.load_sync_count().await.unwrap(), 1);
    assert_eq!(ws.load_names().await.unwrap(), local_names);

    assert_eq!(within(host).await.unwrap(), (2, 1));
    beacon.abort();
}

#[tokio::test]
async fn test_full_summary_table_fails_sync_after_sessions_merge() {
    let config = loopback_config();
    let listener = TcpListener::bind(("0.0.0.0", config.tcp_port)).await.unwrap();
    let beacon = spawn_beacon(&config);

    let host = tokio::spawn(async move {
        let mut stream = accept_client(listener).await;
        let _: Vec<Session> =
            exchange(&mut stream, Role::Host, &[Session::new(0x7777, 0, 60)][..])
                .await
                .unwrap();
        send_frame(&mut stream, &[Summary::new(0x7777, 60, 1, 0, 0)][..])
            .await
            .unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest).await;
    });

    let dir = tempfile::tempdir().unwrap();
    let ws = Workspace::new(dir.path(), 10);
    let mut before = seeded_state(1, 3);
    for id in 2..=256u64 {
        before.store.summaries.insert(Summary::new(id, 60, 1, 0, 0));
    }
    assert_eq!(before.store.summaries.free_slots(), 0);
    let mut state = before.clone();
    let (_cancel_tx, mut cancel) = watch::channel(false);
    let mut peer = SyncPeer::new(Role::Client, config);

    let result = within(run_sync(&mut state, &mut peer, &ws, &mut cancel, None)).await;

    assert!(matches!(
        result,
        Err(SyncError::Merge(MergeError::Capacity { .. }))
    ));
    assert_eq!(state, before);
    assert!(ws.read_merged().await.unwrap().is_none());
    assert_eq!(ws.load_sync_count().await.unwrap(), 0);
    assert!(ws.backups().list().await.unwrap().is_empty());

    within(host).await.unwrap();
    beacon.abort();
}

#[tokio::test]
async fn test_cancel_while_waiting_returns_state() {
    let config = loopback_config();
    let dir = tempfile::tempdir().unwrap();
    let original = seeded_state(4, 10);

    let worker = SyncWorker::spawn(
        original.clone(),
        Role::Host,
        config,
        Workspace::new(dir.path(), 10),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(worker.phase(), SyncPhase::Connecting);
    worker.cancel();

    let (state, result) = within(worker.join()).await.unwrap();
    let err = result.unwrap_err();
    assert!(matches!(err, SyncError::Net(NetError::Cancelled)));
    assert_eq!(err.status_line(), "Sync cancelled");
    assert_eq!(state, original);
    assert!(!dir.path().join("merged.dat").exists());
}

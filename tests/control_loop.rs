//! End-to-end runs of `ControlSession` against a scripted headset and a fake
//! drone listening on loopback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use epoc_pilot::error::{ConnectionFailure, ControlError, LinkError, TransportError};
use epoc_pilot::prelude::*;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

// ── Fake drone ────────────────────────────────────────────────────────────────

/// Records every command and answers each one with `ok`.
struct FakeDrone {
    addr: String,
    task: JoinHandle<Vec<String>>,
    stop: watch::Sender<bool>,
}

impl FakeDrone {
    async fn start() -> Self {
        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = sock.local_addr().unwrap().to_string();
        let (stop, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut buf = [0u8; 128];
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    res = sock.recv_from(&mut buf) => {
                        let (n, from) = res.unwrap();
                        seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                        let _ = sock.send_to(b"ok", from).await;
                    }
                }
            }
            seen
        });
        Self { addr, task, stop }
    }

    /// Stop listening (after letting in-flight datagrams arrive) and return
    /// the commands received, in order.
    async fn finish(self) -> Vec<String> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.stop.send(true).unwrap();
        self.task.await.unwrap()
    }
}

fn config(drone: &str) -> ControllerConfig {
    let mut c = ControllerConfig::default();
    c.actuator.remote_addr = drone.into();
    c.actuator.local_addr = "127.0.0.1:0".into();
    c.actuator.takeoff_settle = Duration::from_millis(5);
    c.actuator.shutdown_timeout = Duration::from_millis(500);
    c.tick_interval = Duration::from_millis(5);
    c
}

fn pose(gyro_x: i16, gyro_y: i16) -> SimFrame {
    SimFrame::Pose { gyro_x, gyro_y }
}

fn count(cmds: &[String], what: &str) -> usize {
    cmds.iter().filter(|c| c.as_str() == what).count()
}

/// Run `session` until `ticks` ticks have elapsed (roughly), then cancel.
async fn fly_for<S: FrameSource + 'static>(
    mut session: ControlSession<S>,
    ticks: u64,
) -> (ControlSession<S>, Result<RunSummary, ControlError>) {
    let (tx, rx) = watch::channel(false);
    let interval = session.config().tick_interval;
    let run = tokio::spawn(async move {
        let res = session.run(rx).await;
        (session, res)
    });
    // Takeoff settle plus the requested number of ticks.
    tokio::time::sleep(Duration::from_millis(20) + interval * ticks as u32).await;
    tx.send(true).unwrap();
    run.await.unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancellation_lands_exactly_once() {
    for ticks in [0u64, 3, 20] {
        let drone = FakeDrone::start().await;
        let source = SimulatedHeadset::new(&CipherKey::default());
        let session = ControlSession::new(config(&drone.addr), source);

        let (session, res) = fly_for(session, ticks).await;
        let summary = res.unwrap();
        assert!(summary.landed);
        assert_eq!(session.state(), FlightState::Terminated);

        let cmds = drone.finish().await;
        assert_eq!(count(&cmds, "land"), 1, "ticks={ticks}: {cmds:?}");
        assert_eq!(cmds.last().map(String::as_str), Some("land"));
        assert_eq!(&cmds[..2], ["command", "takeoff"]);
    }
}

#[tokio::test]
async fn head_movements_become_drone_commands() {
    let drone = FakeDrone::start().await;
    let source = SimulatedHeadset::scripted(
        &CipherKey::default(),
        [
            pose(0, 20),
            pose(0, -20),
            pose(20, 0),
            pose(-20, 0),
            pose(5, 5),
            pose(20, 20),
        ],
    );
    let session = ControlSession::new(config(&drone.addr), source);

    let (_, res) = fly_for(session, 30).await;
    let summary = res.unwrap();
    assert_eq!(summary.readings, 6);
    assert_eq!(summary.commands, 5);

    let cmds = drone.finish().await;
    assert_eq!(
        cmds,
        [
            "command",
            "takeoff",
            "forward 50",
            "back 50",
            "cw 30",
            "ccw 30",
            "forward 50",
            "land"
        ]
    );
}

#[tokio::test]
async fn custom_distances_and_threshold() {
    let drone = FakeDrone::start().await;
    let mut cfg = config(&drone.addr);
    cfg.threshold = 30;
    cfg.actuator.move_distance = 20;
    cfg.actuator.turn_degrees = 90;
    let source = SimulatedHeadset::scripted(
        &CipherKey::default(),
        [pose(0, 25), pose(0, 35), pose(-35, 0)],
    );

    let (_, res) = fly_for(ControlSession::new(cfg, source), 20).await;
    assert_eq!(res.unwrap().commands, 2);

    let cmds = drone.finish().await;
    assert_eq!(cmds, ["command", "takeoff", "forward 20", "ccw 90", "land"]);
}

#[tokio::test]
async fn kalman_filter_damps_single_frame_spikes() {
    let drone = FakeDrone::start().await;
    let mut cfg = config(&drone.addr);
    cfg.filter = FilterKind::Kalman { q: 1e-2, r: 1.0 };
    let mut script: Vec<SimFrame> = (0..20).map(|_| pose(0, 0)).collect();
    script.push(pose(0, 60));
    script.extend((0..5).map(|_| pose(0, 0)));
    let source = SimulatedHeadset::scripted(&CipherKey::default(), script);

    let (_, res) = fly_for(ControlSession::new(cfg, source), 60).await;
    let summary = res.unwrap();
    assert_eq!(summary.readings, 26);
    assert_eq!(summary.commands, 0);

    let cmds = drone.finish().await;
    assert_eq!(cmds, ["command", "takeoff", "land"]);
}

#[tokio::test]
async fn wrong_key_frames_decode_but_read_as_noise() {
    // Frames encrypted under another key still have the right length, so
    // they decode; the gyro values are just garbage.  The loop must survive.
    let drone = FakeDrone::start().await;
    let other = CipherKey::new([0x42; 16]);
    let source = SimulatedHeadset::scripted(&other, (0..10).map(|_| pose(0, 0)));

    let (_, res) = fly_for(ControlSession::new(config(&drone.addr), source), 20).await;
    let summary = res.unwrap();
    assert_eq!(summary.readings, 10);
    assert_eq!(summary.decode_failures, 0);

    let cmds = drone.finish().await;
    assert_eq!(count(&cmds, "land"), 1);
}

// ── Failure paths ─────────────────────────────────────────────────────────────

/// Delivers `good` frames, then panics inside `read`.
struct PanickingSource {
    inner: SimulatedHeadset,
    reads: Arc<AtomicUsize>,
    good: usize,
}

impl FrameSource for PanickingSource {
    fn open(&mut self) -> Result<(), TransportError> {
        self.inner.open()
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if self.reads.fetch_add(1, Ordering::SeqCst) >= self.good {
            panic!("headset driver exploded");
        }
        self.inner.read(buf)
    }
}

#[tokio::test]
async fn panic_in_tick_still_lands_once() {
    let drone = FakeDrone::start().await;
    let reads = Arc::new(AtomicUsize::new(0));
    let source = PanickingSource {
        inner: SimulatedHeadset::scripted(&CipherKey::default(), [pose(0, 40), pose(0, 40)]),
        reads: Arc::clone(&reads),
        good: 2,
    };
    let mut session = ControlSession::new(config(&drone.addr), source);
    let (_tx, rx) = watch::channel(false);

    // No cancellation: the panic alone must end the flight.
    let summary = tokio::time::timeout(Duration::from_secs(5), session.run(rx))
        .await
        .expect("run should end after the panic")
        .unwrap();
    assert!(summary.landed);
    assert_eq!(summary.commands, 2);
    assert_eq!(reads.load(Ordering::SeqCst), 3);
    assert_eq!(session.state(), FlightState::Terminated);

    let cmds = drone.finish().await;
    assert_eq!(
        cmds,
        ["command", "takeoff", "forward 50", "forward 50", "land"]
    );
}

/// Always fails to read.
struct BrokenSource;

impl FrameSource for BrokenSource {
    fn open(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
        Err(TransportError::Read("device unplugged".into()))
    }
}

#[tokio::test]
async fn read_errors_are_not_fatal() {
    let drone = FakeDrone::start().await;
    let (_, res) = fly_for(ControlSession::new(config(&drone.addr), BrokenSource), 10).await;
    let summary = res.unwrap();
    assert!(summary.ticks > 0);
    assert_eq!(summary.frames_read, 0);

    let cmds = drone.finish().await;
    assert_eq!(cmds, ["command", "takeoff", "land"]);
}

#[tokio::test]
async fn dropped_shutdown_sender_lands() {
    let drone = FakeDrone::start().await;
    let source = SimulatedHeadset::scripted(&CipherKey::default(), []);
    let mut session = ControlSession::new(config(&drone.addr), source);
    let (tx, rx) = watch::channel(false);
    drop(tx);

    let summary = tokio::time::timeout(Duration::from_secs(5), session.run(rx))
        .await
        .unwrap()
        .unwrap();
    assert!(summary.landed);
    assert_eq!(drone.finish().await, ["command", "takeoff", "land"]);
}

#[tokio::test]
async fn bind_failure_is_a_connection_failure() {
    let drone = FakeDrone::start().await;
    let taken = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let mut cfg = config(&drone.addr);
    cfg.actuator.local_addr = taken.local_addr().unwrap().to_string();

    let source = SimulatedHeadset::new(&CipherKey::default());
    let mut session = ControlSession::new(cfg, source);
    let (_tx, rx) = watch::channel(false);

    let err = session.run(rx).await.unwrap_err();
    assert!(matches!(
        err,
        ControlError::ConnectionFailure(ConnectionFailure::Link(LinkError::Bind { .. }))
    ));
    assert_eq!(session.state(), FlightState::Disconnected);
    assert!(drone.finish().await.is_empty());
}

#[tokio::test]
async fn unreachable_drone_still_completes_the_run() {
    // Every send fails (IPv4 socket, IPv6 destination); the loop keeps going
    // and the run still ends normally.
    let mut cfg = config("[::1]:8889");
    cfg.actuator.local_addr = "127.0.0.1:0".into();
    let source = SimulatedHeadset::scripted(&CipherKey::default(), [pose(0, 40), pose(40, 0)]);

    let (session, res) = fly_for(ControlSession::new(cfg, source), 10).await;
    let summary = res.unwrap();
    assert!(summary.landed);
    assert_eq!(summary.commands, 2);
    assert_eq!(session.state(), FlightState::Terminated);
}

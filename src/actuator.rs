//! Fire-and-forget command link to the drone, plus a background listener that
//! logs whatever the drone sends back.
//!
//! ```text
//!  ControlSession ──send()──▶ UdpSocket ──datagram──▶ drone :8889
//!                                 ▲
//!  ack task ◀──recv_from()────────┘◀──────"ok"/"error"── drone
//! ```
//!
//! The socket is shared between the send path and the acknowledgement task.
//! The only other shared state is the `closed` flag, which flips once from
//! `false` to `true` in [`ActuatorLink::close`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use socket2::{SockAddr, SockRef};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::LinkError;
use crate::protocol::{
    decode_ack, Command, ACK_BUFFER_LEN, DEFAULT_ACTUATOR_ADDR, DEFAULT_LOCAL_ADDR,
    DEFAULT_MOVE_DISTANCE, DEFAULT_TURN_DEGREES,
};
use crate::types::{LinkStats, MovementIntent};

/// Pause after a failed receive before trying again.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(10);

// ── ActuatorConfig ────────────────────────────────────────────────────────────

/// Addresses and motion defaults for [`ActuatorLink`].
#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    /// Drone command endpoint. Default: `192.168.10.1:8889`.
    pub remote_addr: String,
    /// Local endpoint to bind; acknowledgements arrive here. Default: `0.0.0.0:9000`.
    pub local_addr: String,
    /// Distance for `forward` / `back` in cm. Default: `50`.
    pub move_distance: u32,
    /// Rotation for `cw` / `ccw` in degrees. Default: `30`.
    pub turn_degrees: u32,
    /// Gap between `command` and `takeoff`. Default: 1 s.
    pub takeoff_settle: Duration,
    /// How long [`ActuatorLink::close`] waits for the acknowledgement task
    /// before aborting it. Default: 1 s.
    pub shutdown_timeout: Duration,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            remote_addr: DEFAULT_ACTUATOR_ADDR.into(),
            local_addr: DEFAULT_LOCAL_ADDR.into(),
            move_distance: DEFAULT_MOVE_DISTANCE,
            turn_degrees: DEFAULT_TURN_DEGREES,
            takeoff_settle: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

/// Linear motion along the drone's nose axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Forward,
    Back,
}

/// Yaw rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnDirection {
    /// Counter-clockwise.
    Left,
    /// Clockwise.
    Right,
}

#[derive(Default)]
struct LinkCounters {
    sent: AtomicU64,
    send_failures: AtomicU64,
    acks: AtomicU64,
}

// ── ActuatorLink ──────────────────────────────────────────────────────────────

/// An open UDP session with the drone.
///
/// Created by [`ActuatorLink::open`], torn down by [`ActuatorLink::close`].
/// Sends never fail from the caller's point of view: errors are logged,
/// counted in [`LinkStats::send_failures`], and dropped.
pub struct ActuatorLink {
    config: ActuatorConfig,
    remote: SocketAddr,
    local: SocketAddr,
    /// `None` once the link is closed and the endpoint released.
    socket: Mutex<Option<Arc<UdpSocket>>>,
    closed: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    ack_task: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<LinkCounters>,
    takeoff_lock: tokio::sync::Mutex<()>,
}

impl ActuatorLink {
    /// Bind the local endpoint and start the acknowledgement task.
    ///
    /// The task is running before this returns, so no reply to the first
    /// command can be missed.  A bind failure is the only way this fails
    /// besides an unresolvable drone address.
    pub async fn open(config: ActuatorConfig) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(&config.local_addr)
            .await
            .map_err(|source| LinkError::Bind {
                addr: config.local_addr.clone(),
                source,
            })?;
        let local = socket.local_addr().map_err(|source| LinkError::Bind {
            addr: config.local_addr.clone(),
            source,
        })?;
        let remote = resolve(&config.remote_addr).await?;
        let socket = Arc::new(socket);

        let closed = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(LinkCounters::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ack_task = tokio::spawn(receive_acks(
            Arc::clone(&socket),
            Arc::clone(&closed),
            shutdown_rx,
            Arc::clone(&counters),
        ));

        info!("Actuator link open: {local} → {remote}");

        Ok(Self {
            config,
            remote,
            local,
            socket: Mutex::new(Some(socket)),
            closed,
            shutdown_tx,
            ack_task: Mutex::new(Some(ack_task)),
            counters,
            takeoff_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Address commands are sent to.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// The bound local endpoint (useful when binding port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            sent: self.counters.sent.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
            acks: self.counters.acks.load(Ordering::Relaxed),
        }
    }

    // ── Sending ───────────────────────────────────────────────────────────────

    /// Send one command and report the outcome.
    ///
    /// Most callers want [`send`](Self::send), which logs and swallows errors.
    pub async fn try_send(&self, command: Command) -> Result<(), LinkError> {
        let socket = self.socket().ok_or(LinkError::Closed)?;
        info!("Sending command: {command}");
        match socket.send_to(&command.encode(), self.remote).await {
            Ok(_) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(source) => {
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                Err(LinkError::Send {
                    addr: self.remote,
                    source,
                })
            }
        }
    }

    /// Send one command without waiting for, or requiring, an acknowledgement.
    ///
    /// Never fails: a lost command is recovered by the next one.
    pub async fn send(&self, command: Command) {
        match self.try_send(command).await {
            Ok(()) => {}
            Err(LinkError::Closed) => warn!("Dropping '{command}': link is closed"),
            Err(e) => warn!("Error sending command '{command}': {e}"),
        }
    }

    /// Send the movement command for `intent`, if there is one.
    ///
    /// Returns `true` when a command was issued.  `MovementIntent::None`
    /// issues nothing; the drone is not told to stop.
    pub async fn execute(&self, intent: MovementIntent) -> bool {
        match Command::for_intent(intent, self.config.move_distance, self.config.turn_degrees) {
            Some(command) => {
                self.send(command).await;
                true
            }
            None => false,
        }
    }

    // ── High-level commands ───────────────────────────────────────────────────

    /// `command`, wait [`ActuatorConfig::takeoff_settle`], `takeoff`.
    ///
    /// Concurrent callers are serialised so two sequences never interleave.
    pub async fn takeoff(&self) {
        let _guard = self.takeoff_lock.lock().await;
        self.send(Command::Enable).await;
        tokio::time::sleep(self.config.takeoff_settle).await;
        self.send(Command::Takeoff).await;
    }

    pub async fn land(&self) {
        self.send(Command::Land).await;
    }

    /// Best-effort synchronous `land` for paths that cannot await (drop guards).
    ///
    /// Goes straight to `sendto(2)` on the raw socket, bypassing tokio's
    /// readiness tracking; a fresh socket is not yet marked writable there.
    /// If the kernel buffer is full the command is lost.
    pub fn land_now(&self) -> Result<(), LinkError> {
        let socket = self.socket().ok_or(LinkError::Closed)?;
        info!("Sending command: {}", Command::Land);
        let remote = SockAddr::from(self.remote);
        match SockRef::from(&*socket).send_to(&Command::Land.encode(), &remote) {
            Ok(_) => {
                self.counters.sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(source) => {
                self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                Err(LinkError::Send {
                    addr: self.remote,
                    source,
                })
            }
        }
    }

    pub async fn move_by(&self, direction: MoveDirection, distance: u32) {
        let command = match direction {
            MoveDirection::Forward => Command::Forward(distance),
            MoveDirection::Back => Command::Back(distance),
        };
        self.send(command).await;
    }

    pub async fn turn(&self, direction: TurnDirection, degrees: u32) {
        let command = match direction {
            TurnDirection::Left => Command::Ccw(degrees),
            TurnDirection::Right => Command::Cw(degrees),
        };
        self.send(command).await;
    }

    pub async fn move_forward(&self) {
        self.move_by(MoveDirection::Forward, self.config.move_distance).await;
    }

    pub async fn move_backward(&self) {
        self.move_by(MoveDirection::Back, self.config.move_distance).await;
    }

    pub async fn turn_left(&self) {
        self.turn(TurnDirection::Left, self.config.turn_degrees).await;
    }

    pub async fn turn_right(&self) {
        self.turn(TurnDirection::Right, self.config.turn_degrees).await;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────

    /// Stop the acknowledgement task and release the local endpoint.
    ///
    /// Idempotent: the second and later calls return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Actuator link already closed");
            return;
        }
        let _ = self.shutdown_tx.send(true);

        let task = lock(&self.ack_task).take();
        if let Some(mut task) = task {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Acknowledgement task ended abnormally: {e}"),
                Err(_) => {
                    warn!(
                        "Acknowledgement task did not stop within {:?}; aborting it",
                        self.config.shutdown_timeout
                    );
                    task.abort();
                }
            }
        }

        lock(&self.socket).take();
        let stats = self.stats();
        info!(
            "Actuator link closed (sent={} failed={} acks={})",
            stats.sent, stats.send_failures, stats.acks
        );
    }

    fn socket(&self) -> Option<Arc<UdpSocket>> {
        if self.is_closed() {
            return None;
        }
        lock(&self.socket).clone()
    }
}

impl Drop for ActuatorLink {
    fn drop(&mut self) {
        // Never leave the listener running past the link.
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.shutdown_tx.send(true);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn resolve(addr: &str) -> Result<SocketAddr, LinkError> {
    let resolve_err = |reason: String| LinkError::Resolve {
        addr: addr.to_owned(),
        reason,
    };
    tokio::net::lookup_host(addr)
        .await
        .map_err(|e| resolve_err(e.to_string()))?
        .next()
        .ok_or_else(|| resolve_err("no addresses".into()))
}

/// Log every acknowledgement until the link is closed.
///
/// Receive errors are logged and the loop continues; only the shutdown signal
/// (or a receive failure observed after `closed` is set) ends it.
async fn receive_acks(
    socket: Arc<UdpSocket>,
    closed: Arc<AtomicBool>,
    mut shutdown: watch::Receiver<bool>,
    counters: Arc<LinkCounters>,
) {
    let mut buf = [0u8; ACK_BUFFER_LEN];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((n, from)) => {
                    counters.acks.fetch_add(1, Ordering::Relaxed);
                    info!("Drone response from {from}: {}", decode_ack(&buf[..n]));
                }
                Err(e) => {
                    if closed.load(Ordering::Acquire) {
                        break;
                    }
                    warn!("{}", LinkError::Receive(e));
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                }
            },
        }
    }
    debug!("Acknowledgement task stopped");
}

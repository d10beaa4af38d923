//! Per-session state: status machine, replay buffer, live relay channel,
//! done signal, and the guarded close/kill sequence.

pub mod pty;
pub(crate) mod pump;
pub mod registry;
pub mod replay;

pub use pty::{PtyProcess, SpawnedProgram, DEFAULT_COLS, DEFAULT_ROWS};
pub use registry::SessionRegistry;
pub use replay::{ReplayBuffer, REPLAY_CAPACITY};

use crate::error::{DeckError, DeckResult};
use crate::messages::{SessionStatus, SessionSummary};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Live relay channel capacity, in chunks. When the subscriber lags behind
/// by more than this, new chunks are dropped rather than stalling the pump.
pub const LIVE_CHANNEL_CAPACITY: usize = 100;

/// One running (or recently stopped) instance of a launched program.
///
/// The PTY and child handles are fixed at creation. Status moves from
/// `Running` to `Stopped` exactly once; the atomic `closing` flag designates
/// a single owner for the close/kill sequence when the explicit-stop and
/// natural-exit paths race.
pub struct Session {
    pub id: String,
    pub program: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    stopped: AtomicBool,
    closing: AtomicBool,
    pty: PtyProcess,
    replay: StdMutex<ReplayBuffer>,
    live_tx: mpsc::Sender<Bytes>,
    live_rx: Arc<AsyncMutex<mpsc::Receiver<Bytes>>>,
    done: CancellationToken,
}

impl Session {
    pub fn new(id: String, program: String, display_name: String, pty: PtyProcess) -> Self {
        let (live_tx, live_rx) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            id,
            program,
            display_name,
            created_at: Utc::now(),
            stopped: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            pty,
            replay: StdMutex::new(ReplayBuffer::default()),
            live_tx,
            live_rx: Arc::new(AsyncMutex::new(live_rx)),
            done: CancellationToken::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        if self.stopped.load(Ordering::Acquire) {
            SessionStatus::Stopped
        } else {
            SessionStatus::Running
        }
    }

    /// Transition to `Stopped`. Returns `false` if the session was already
    /// stopped; the transition happens at most once.
    pub fn mark_stopped(&self) -> bool {
        !self.stopped.swap(true, Ordering::AcqRel)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            program: self.program.clone(),
            display_name: self.display_name.clone(),
            created_at: self.created_at,
            status: self.status(),
        }
    }

    /// One-shot signal that fires when the child has exited and the session
    /// reached its terminal state. Observable after firing.
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Fire the done signal. Called by the exit watcher only.
    pub(crate) fn signal_done(&self) {
        self.done.cancel();
    }

    /// Claim ownership of the close/kill sequence. Only the first caller
    /// gets `true`; the losing path must not touch the PTY or the process.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn close_pty(&self) {
        self.pty.close();
    }

    /// Record a chunk of output: replay buffer first, then a non-blocking
    /// push to the live channel. A full channel drops the chunk so the pump
    /// never stalls on a slow or absent subscriber.
    pub(crate) fn push_output(&self, chunk: Bytes) {
        if let Ok(mut replay) = self.replay.lock() {
            replay.push(chunk.clone());
        }
        if self.live_tx.try_send(chunk).is_err() {
            debug!(session_id = %self.id, "live channel full, dropping chunk");
        }
    }

    /// Best-effort diagnostic delivery on a read error. Live channel only;
    /// the replay buffer keeps actual terminal output.
    pub(crate) fn push_diagnostic(&self, text: &str) {
        let _ = self.live_tx.try_send(Bytes::copy_from_slice(text.as_bytes()));
    }

    /// Write raw bytes to the terminal's input side (blocking).
    pub(crate) fn write_input(&self, data: &[u8]) -> DeckResult<()> {
        self.pty.write_all(data)
    }

    /// Run the graceful-then-forced termination sequence.
    ///
    /// Marks the session stopped immediately so concurrent readers see it,
    /// then, if this caller wins the close guard: closes the PTY, sends
    /// SIGTERM, waits up to `grace` for the exit watcher's done signal, and
    /// escalates to SIGKILL on timeout. Signal failures are logged inside
    /// [`PtyProcess::signal`] and never retried.
    pub async fn terminate(&self, grace: Duration) {
        self.mark_stopped();
        if !self.begin_close() {
            return;
        }
        self.close_pty();
        if self.done.is_cancelled() {
            return;
        }
        self.pty.signal(libc::SIGTERM);
        if tokio::time::timeout(grace, self.done.cancelled())
            .await
            .is_err()
        {
            warn!(session_id = %self.id, "child ignored SIGTERM, killing");
            self.pty.signal(libc::SIGKILL);
        }
    }

    /// Immediate teardown for a session that never made it into the
    /// registry. No grace period.
    pub(crate) fn force_kill(&self) {
        self.mark_stopped();
        if self.begin_close() {
            self.close_pty();
            self.pty.signal(libc::SIGKILL);
        }
    }

    /// Attach the (single) subscriber: replay history first, then live tail.
    ///
    /// The same bytes sit in both the replay buffer and the live queue, so
    /// whatever is already queued live at attach time is drained and
    /// discarded after the replay snapshot is taken. Skipping that drain
    /// would deliver those chunks twice.
    pub fn subscribe(&self) -> DeckResult<Subscription> {
        let mut live = self
            .live_rx
            .clone()
            .try_lock_owned()
            .map_err(|_| DeckError::Busy(self.id.clone()))?;

        let catchup: VecDeque<Bytes> = self
            .replay
            .lock()
            .map_err(|_| DeckError::Other("replay buffer lock poisoned".into()))?
            .snapshot()
            .into();

        let mut discarded = 0usize;
        while live.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(
                session_id = %self.id,
                discarded,
                "discarded queued chunks already covered by replay"
            );
        }

        Ok(Subscription {
            catchup,
            live,
            done: self.done.clone(),
            ended: false,
        })
    }
}

/// One delivery from a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A chunk of session output.
    Output(Bytes),
    /// The session ended; the stream is exhausted after this.
    Ended,
}

/// Exclusive consumer of a session's output stream.
///
/// Holding the subscription owns the live receiver, so a second subscriber
/// gets `Busy` until this one is dropped. Events arrive strictly ordered:
/// every replayed chunk, then live chunks, then `Ended` once.
#[derive(Debug)]
pub struct Subscription {
    catchup: VecDeque<Bytes>,
    live: OwnedMutexGuard<mpsc::Receiver<Bytes>>,
    done: CancellationToken,
    ended: bool,
}

impl Subscription {
    /// Next event, or `None` once the end marker has been delivered.
    pub async fn next(&mut self) -> Option<RelayEvent> {
        if let Some(chunk) = self.catchup.pop_front() {
            return Some(RelayEvent::Output(chunk));
        }
        if self.ended {
            return None;
        }
        tokio::select! {
            received = self.live.recv() => match received {
                Some(chunk) => Some(RelayEvent::Output(chunk)),
                None => {
                    self.ended = true;
                    Some(RelayEvent::Ended)
                }
            },
            _ = self.done.cancelled() => {
                self.ended = true;
                Some(RelayEvent::Ended)
            }
        }
    }
}

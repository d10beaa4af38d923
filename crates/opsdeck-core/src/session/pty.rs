//! Pseudo-terminal process handling via portable-pty.
//!
//! Spawns a tool script attached to a fresh PTY and hands the pieces to
//! their single owners: the reader goes to the output pump, the child handle
//! to the exit watcher, and the master/writer pair stays here for input,
//! geometry, and the close sequence.

use crate::error::{DeckError, DeckResult};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Fixed terminal geometry given to every session.
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 40;

/// The master side of a session's PTY plus the child's PID.
///
/// The master and writer handles are set once at spawn and only ever taken
/// away by [`PtyProcess::close`].
pub struct PtyProcess {
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    pid: Option<u32>,
}

/// Everything produced by a successful spawn, before ownership is split up.
pub struct SpawnedProgram {
    pub pty: PtyProcess,
    pub reader: Box<dyn Read + Send>,
    pub child: Box<dyn Child + Send + Sync>,
}

impl PtyProcess {
    /// Spawn `bash <script>` under `stdbuf` on a new PTY.
    ///
    /// `stdbuf -i0 -o0 -e0` disables stdio buffering so interactive menus
    /// reach the observer promptly. The child inherits the parent
    /// environment; `env` entries are overlaid on top of it.
    pub fn spawn(
        script: &Path,
        working_dir: &Path,
        env: &[(String, String)],
        cols: u16,
        rows: u16,
    ) -> DeckResult<SpawnedProgram> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| DeckError::LaunchFailed(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new("stdbuf");
        cmd.args(["-i0", "-o0", "-e0", "bash"]);
        cmd.arg(script);
        cmd.cwd(working_dir);
        for (key, value) in env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| DeckError::LaunchFailed(format!("failed to spawn {}: {e}", script.display())))?;

        let pid = child.process_id();
        debug!(script = %script.display(), pid, "PTY child spawned");

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| DeckError::LaunchFailed(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| DeckError::LaunchFailed(format!("failed to take PTY writer: {e}")))?;

        Ok(SpawnedProgram {
            pty: Self {
                master: Mutex::new(Some(pair.master)),
                writer: Mutex::new(Some(writer)),
                pid,
            },
            reader,
            child,
        })
    }

    /// Resize the terminal. Callers treat failure as non-fatal.
    pub fn set_geometry(&self, cols: u16, rows: u16) -> DeckResult<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| DeckError::Other("PTY master lock poisoned".into()))?;
        let Some(master) = master.as_ref() else {
            return Err(DeckError::Other("PTY already closed".into()));
        };
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| DeckError::Other(format!("PTY resize failed: {e}")))
    }

    /// Write and flush input to the terminal (blocking; call from a
    /// `spawn_blocking` context).
    pub fn write_all(&self, data: &[u8]) -> DeckResult<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| DeckError::WriteFailed("PTY writer lock poisoned".into()))?;
        let Some(writer) = writer.as_mut() else {
            return Err(DeckError::WriteFailed("session terminal is closed".into()));
        };
        writer
            .write_all(data)
            .map_err(|e| DeckError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| DeckError::WriteFailed(e.to_string()))
    }

    /// Drop the master and writer handles, closing our side of the PTY.
    ///
    /// Callers serialize this through the session's close guard; the handles
    /// are gone afterwards and every later write fails with `WriteFailed`.
    pub fn close(&self) {
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        debug!(pid = self.pid, "PTY handles closed");
    }

    /// Send a signal to the child process. Failures are logged, not returned;
    /// termination proceeds regardless.
    pub fn signal(&self, sig: libc::c_int) {
        let Some(pid) = self.pid else {
            return;
        };
        if pid == 0 || pid > i32::MAX as u32 {
            warn!(pid, "PID out of range, cannot signal");
            return;
        }
        #[cfg(unix)]
        {
            let rc = unsafe { libc::kill(pid as i32, sig) };
            if rc != 0 {
                warn!(
                    pid,
                    sig,
                    errno = std::io::Error::last_os_error().raw_os_error(),
                    "failed to signal child"
                );
            }
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

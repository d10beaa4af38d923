//! Output pump: drains a session's PTY into the replay buffer and the live
//! relay channel.
//!
//! One pump per session, started at launch, running on the blocking pool
//! because PTY reads are synchronous. Exits on end of stream.

use super::Session;
use bytes::Bytes;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bytes per PTY read.
const READ_CHUNK: usize = 1024;

/// Start the pump task for a freshly launched session.
pub(crate) fn start(session: Arc<Session>, reader: Box<dyn Read + Send>) {
    tokio::task::spawn_blocking(move || run(session, reader));
}

fn run(session: Arc<Session>, mut reader: Box<dyn Read + Send>) {
    debug!(session_id = %session.id, "output pump started");
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!(session_id = %session.id, "PTY reached end of stream");
                break;
            }
            Ok(n) => session.push_output(Bytes::copy_from_slice(&buf[..n])),
            Err(e) => {
                // Linux reports EIO on the master side once the child is
                // gone; that is the normal end of stream for a PTY.
                if e.raw_os_error() == Some(libc::EIO) {
                    debug!(session_id = %session.id, "PTY closed by child exit");
                } else {
                    warn!(session_id = %session.id, error = %e, "PTY read error");
                    session.push_diagnostic(&format!("Error reading terminal: {e}"));
                }
                break;
            }
        }
    }
    debug!(session_id = %session.id, "output pump finished");
}

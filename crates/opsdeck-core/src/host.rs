//! Session operations facade.
//!
//! Owns the registry, the program catalog handle, and the root directory,
//! and exposes the operations an outer transport layer drives: launch,
//! stop, input, subscribe, listing, and whole-server shutdown.

use crate::catalog::ProgramCatalog;
use crate::error::{DeckError, DeckResult};
use crate::messages::SessionSummary;
use crate::session::{
    pump, PtyProcess, Session, SessionRegistry, Subscription, DEFAULT_COLS, DEFAULT_ROWS,
};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Grace window between SIGTERM and SIGKILL.
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How long a stopped session stays listed so observers can see the
/// terminal status before the entry disappears.
pub const REMOVE_DELAY: Duration = Duration::from_secs(1);

/// Input payload ceiling, in bytes, enforced before any lookup or write.
pub const MAX_INPUT_BYTES: usize = 4096;

const SUPPORTED_LANGUAGES: &[&str] = &["en", "de"];
const DEFAULT_LANGUAGE: &str = "en";

/// Result of a shutdown request.
#[derive(Debug)]
pub enum ShutdownOutcome {
    /// Sessions are still active and `force` was not set; nothing was
    /// stopped. The caller decides whether to re-invoke with force.
    Active(Vec<SessionSummary>),
    /// Every session was stopped and the registry drained.
    Terminated,
}

/// The session core. One per process in production; tests construct their
/// own isolated instances.
pub struct SessionHost {
    registry: Arc<SessionRegistry>,
    catalog: Arc<dyn ProgramCatalog>,
    root_dir: PathBuf,
}

impl SessionHost {
    pub fn new(catalog: Arc<dyn ProgramCatalog>, root_dir: PathBuf) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            catalog,
            root_dir,
        }
    }

    pub fn catalog(&self) -> &Arc<dyn ProgramCatalog> {
        &self.catalog
    }

    /// Launch a catalog program in a new PTY-backed session.
    ///
    /// On success the session is registered as running, the output pump and
    /// exit watcher are started, and the fresh session id is returned. A PTY
    /// or spawn failure leaves no registry entry.
    pub async fn launch(&self, program_id: &str, language: Option<&str>) -> DeckResult<String> {
        let program = self
            .catalog
            .resolve(program_id)
            .ok_or_else(|| DeckError::UnknownProgram(program_id.to_string()))?;
        let language = validate_language(language);

        let session_id = format!("{}_{}", program.id, Utc::now().timestamp());
        let script = self.root_dir.join(&program.script);
        let env = self.child_env(language);

        let spawned = PtyProcess::spawn(&script, &self.root_dir, &env, DEFAULT_COLS, DEFAULT_ROWS)?;
        if let Err(e) = spawned.pty.set_geometry(DEFAULT_COLS, DEFAULT_ROWS) {
            warn!(session_id = %session_id, error = %e, "failed to set PTY geometry");
        }

        let session = Arc::new(Session::new(
            session_id.clone(),
            program.id.clone(),
            program.display_name.clone(),
            spawned.pty,
        ));

        if !self.registry.create(session.clone()).await {
            session.force_kill();
            return Err(DeckError::LaunchFailed(format!(
                "session id already in use: {session_id}"
            )));
        }

        pump::start(session.clone(), spawned.reader);
        self.watch_exit(session, spawned.child);

        Ok(session_id)
    }

    /// Environment overlaid on the inherited parent environment.
    fn child_env(&self, language: &str) -> Vec<(String, String)> {
        vec![
            (
                "OPSDECK_ROOT_DIR".into(),
                self.root_dir.display().to_string(),
            ),
            ("OPSDECK_GUI_MODE".into(), "true".into()),
            ("OPSDECK_LANG".into(), language.into()),
            ("TERM".into(), "xterm-256color".into()),
            ("FORCE_COLOR".into(), "1".into()),
            ("COLUMNS".into(), DEFAULT_COLS.to_string()),
            ("LINES".into(), DEFAULT_ROWS.to_string()),
            ("PS1".into(), "$ ".into()),
        ]
    }

    /// Supervise the child: wait for exit, run the guarded close, flip the
    /// status, fire the done signal, and reclaim the registry entry after
    /// the observation delay.
    fn watch_exit(
        &self,
        session: Arc<Session>,
        child: Box<dyn portable_pty::Child + Send + Sync>,
    ) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let waited = tokio::task::spawn_blocking(move || {
                let mut child = child;
                child.wait()
            })
            .await;
            match waited {
                Ok(Ok(status)) => {
                    info!(session_id = %session.id, code = status.exit_code(), "session child exited")
                }
                Ok(Err(e)) => {
                    warn!(session_id = %session.id, error = %e, "failed to wait for session child")
                }
                Err(e) => warn!(session_id = %session.id, error = %e, "exit watcher join error"),
            }

            if session.begin_close() {
                session.close_pty();
            }
            session.mark_stopped();
            session.signal_done();

            tokio::time::sleep(REMOVE_DELAY).await;
            registry.remove(&session.id).await;
        });
    }

    /// Stop a session: status flips immediately, then the graceful-then-
    /// forced sequence runs, then removal is scheduled in the background so
    /// the call returns promptly after at most the grace window.
    pub async fn stop(&self, id: &str) -> DeckResult<()> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| DeckError::NotFound(id.to_string()))?;

        info!(session_id = %id, "stopping session");
        session.terminate(TERMINATE_GRACE).await;

        let registry = self.registry.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(REMOVE_DELAY).await;
            registry.remove(&id).await;
        });

        Ok(())
    }

    /// Write one line of input to a session's terminal. The payload gets
    /// exactly one trailing newline, menu picks and full lines alike.
    pub async fn send_input(&self, id: &str, data: &str) -> DeckResult<()> {
        if data.len() > MAX_INPUT_BYTES {
            return Err(DeckError::TooLarge {
                size: data.len(),
                max: MAX_INPUT_BYTES,
            });
        }

        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| DeckError::NotFound(id.to_string()))?;

        let line = format!("{data}\n");
        let writer = session.clone();
        tokio::task::spawn_blocking(move || writer.write_input(line.as_bytes()))
            .await
            .map_err(|e| DeckError::Other(format!("input writer join error: {e}")))??;

        debug!(session_id = %id, bytes = data.len(), "input delivered");
        Ok(())
    }

    /// Attach to a session's output: full replay first, then the live tail,
    /// then a single end marker.
    pub async fn subscribe(&self, id: &str) -> DeckResult<Subscription> {
        let session = self
            .registry
            .get(id)
            .await
            .ok_or_else(|| DeckError::NotFound(id.to_string()))?;
        session.subscribe()
    }

    /// Snapshot of all registered sessions.
    pub async fn list_active(&self) -> Vec<SessionSummary> {
        self.registry.list_active().await
    }

    /// Stop everything, or report what is still running.
    ///
    /// Without `force`, live sessions are enumerated and left untouched so
    /// the caller can confirm. With `force`, each one goes through the same
    /// graceful-then-forced sequence as an explicit stop, synchronously,
    /// and the registry is drained.
    pub async fn shutdown_all(&self, force: bool) -> ShutdownOutcome {
        let running = self.registry.running().await;
        if !running.is_empty() && !force {
            return ShutdownOutcome::Active(running.iter().map(|s| s.summary()).collect());
        }

        for session in running {
            info!(session_id = %session.id, name = %session.display_name, "stopping session for shutdown");
            session.terminate(TERMINATE_GRACE).await;
        }
        self.registry.clear().await;
        info!("all sessions stopped");
        ShutdownOutcome::Terminated
    }
}

/// Clamp a requested language to the supported set.
fn validate_language(requested: Option<&str>) -> &str {
    match requested {
        Some(lang) if SUPPORTED_LANGUAGES.contains(&lang) => lang,
        _ => DEFAULT_LANGUAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Program;
    use crate::messages::SessionStatus;
    use crate::session::RelayEvent;
    use std::io::Write as _;
    use std::path::Path;

    struct TestCatalog;

    impl ProgramCatalog for TestCatalog {
        fn resolve(&self, id: &str) -> Option<Program> {
            ["disk", "logs"].contains(&id).then(|| Program {
                id: id.to_string(),
                display_name: format!("{id} tool"),
                description: String::new(),
                category: "Test".into(),
                script: PathBuf::from(format!("modules/mod_{id}.sh")),
            })
        }

        fn all(&self) -> Vec<Program> {
            ["disk", "logs"]
                .iter()
                .filter_map(|id| self.resolve(id))
                .collect()
        }
    }

    fn write_script(root: &Path, name: &str, body: &str) {
        let dir = root.join("modules");
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        writeln!(f, "{body}").unwrap();
    }

    fn host_with_script(body: &str) -> (tempfile::TempDir, SessionHost) {
        let dir = tempfile::tempdir().unwrap();
        write_script(dir.path(), "mod_disk.sh", body);
        write_script(dir.path(), "mod_logs.sh", body);
        let host = SessionHost::new(Arc::new(TestCatalog), dir.path().to_path_buf());
        (dir, host)
    }

    /// Collect subscription output until `pred` matches or the deadline
    /// passes; returns everything gathered as lossy UTF-8.
    async fn collect_until(
        sub: &mut Subscription,
        deadline: Duration,
        pred: impl Fn(&str) -> bool,
    ) -> String {
        let mut text = String::new();
        let end = tokio::time::Instant::now() + deadline;
        loop {
            if pred(&text) {
                return text;
            }
            match tokio::time::timeout_at(end, sub.next()).await {
                Ok(Some(RelayEvent::Output(chunk))) => {
                    text.push_str(&String::from_utf8_lossy(&chunk));
                }
                Ok(Some(RelayEvent::Ended)) | Ok(None) | Err(_) => return text,
            }
        }
    }

    #[tokio::test]
    async fn launch_unknown_program_leaves_no_entry() {
        let (_dir, host) = host_with_script("exit 0");
        let err = host.launch("not_a_real_module", None).await.unwrap_err();
        assert!(matches!(err, DeckError::UnknownProgram(_)));
        assert!(host.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn launch_assigns_timestamped_id() {
        let (_dir, host) = host_with_script("echo ready\nsleep 30");
        let id = host.launch("disk", None).await.unwrap();

        let suffix = id.strip_prefix("disk_").expect("id has program prefix");
        suffix.parse::<i64>().expect("id suffix is a unix timestamp");

        let listed = host.list_active().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].program, "disk");
        assert_eq!(listed[0].display_name, "disk tool");
        assert_eq!(listed[0].status, SessionStatus::Running);

        host.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn input_gets_exactly_one_newline() {
        let (_dir, host) = host_with_script(
            "IFS= read -r a\nIFS= read -r b\necho \"a=[$a]b=[$b]\"\nsleep 30",
        );
        let id = host.launch("disk", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        host.send_input(&id, "3").await.unwrap();
        host.send_input(&id, "x").await.unwrap();

        let mut sub = host.subscribe(&id).await.unwrap();
        let text = collect_until(&mut sub, Duration::from_secs(5), |t| {
            t.contains("a=[") && t.contains("]b=[")
        })
        .await;
        // A doubled newline would leave `b` empty before "x" ever arrived.
        assert!(text.contains("a=[3]b=[x]"), "got: {text}");

        drop(sub);
        host.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn oversized_input_rejected_before_lookup() {
        let (_dir, host) = host_with_script("sleep 30");
        let id = host.launch("disk", None).await.unwrap();

        let payload = "x".repeat(MAX_INPUT_BYTES + 1);
        let err = host.send_input(&id, &payload).await.unwrap_err();
        assert!(matches!(err, DeckError::TooLarge { size: 4097, max: 4096 }));

        // Session is untouched.
        assert_eq!(host.list_active().await[0].status, SessionStatus::Running);

        // The ceiling applies even to unknown sessions, before the lookup.
        let err = host.send_input("ghost_0", &payload).await.unwrap_err();
        assert!(matches!(err, DeckError::TooLarge { .. }));

        host.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn input_to_unknown_session_is_not_found() {
        let (_dir, host) = host_with_script("exit 0");
        let err = host.send_input("ghost_0", "1").await.unwrap_err();
        assert!(matches!(err, DeckError::NotFound(_)));
    }

    #[tokio::test]
    async fn stop_flips_status_then_removes_after_delay() {
        let (_dir, host) = host_with_script("sleep 30");
        let id = host.launch("disk", None).await.unwrap();

        host.stop(&id).await.unwrap();

        let listed = host.list_active().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, SessionStatus::Stopped);

        tokio::time::sleep(REMOVE_DELAY + Duration::from_millis(500)).await;
        assert!(host.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn stop_escalates_to_kill_when_sigterm_ignored() {
        let (_dir, host) = host_with_script("trap '' TERM\nwhile true; do sleep 1; done");
        let id = host.launch("disk", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = tokio::time::Instant::now();
        host.stop(&id).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= TERMINATE_GRACE, "grace window was not honored");
        assert!(
            elapsed < TERMINATE_GRACE + Duration::from_secs(2),
            "stop took too long: {elapsed:?}"
        );
        assert_eq!(host.list_active().await[0].status, SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn stop_unknown_session_is_not_found() {
        let (_dir, host) = host_with_script("exit 0");
        let err = host.stop("ghost_0").await.unwrap_err();
        assert!(matches!(err, DeckError::NotFound(_)));
    }

    #[tokio::test]
    async fn racing_stop_and_natural_exit_do_not_double_close() {
        let (_dir, host) = host_with_script("exit 0");
        let id = host.launch("disk", None).await.unwrap();

        // The child exits on its own immediately; race two explicit stops
        // against the natural-exit path.
        let (a, b) = tokio::join!(host.stop(&id), host.stop(&id));
        assert!(a.is_ok());
        assert!(b.is_ok());

        tokio::time::sleep(REMOVE_DELAY + Duration::from_millis(500)).await;
        assert!(host.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn subscribe_replays_history_without_duplicates() {
        let (_dir, host) =
            host_with_script("for i in 1 2 3 4 5; do echo \"line-$i\"; done\nsleep 30");
        let id = host.launch("disk", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut sub = host.subscribe(&id).await.unwrap();
        let text = collect_until(&mut sub, Duration::from_secs(2), |t| {
            t.contains("line-5")
        })
        .await;

        for i in 1..=5 {
            let marker = format!("line-{i}");
            assert_eq!(
                text.matches(&marker).count(),
                1,
                "{marker} delivered wrong number of times in: {text}"
            );
        }

        drop(sub);
        host.stop(&id).await.unwrap();
    }

    #[tokio::test]
    async fn subscribe_after_exit_replays_then_ends() {
        let (_dir, host) = host_with_script("echo farewell");
        let id = host.launch("disk", None).await.unwrap();

        // Wait for the natural-exit path to fire done, but subscribe before
        // the delayed removal reclaims the entry.
        let session = host.registry.get(&id).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), session.done().cancelled())
            .await
            .expect("session should end on its own");
        // Let the pump finish draining the final chunk into the replay buffer.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let mut sub = host.subscribe(&id).await.unwrap();
        let mut text = String::new();
        let mut ended = false;
        while let Some(event) = sub.next().await {
            match event {
                RelayEvent::Output(chunk) => text.push_str(&String::from_utf8_lossy(&chunk)),
                RelayEvent::Ended => {
                    ended = true;
                    break;
                }
            }
        }
        assert!(text.contains("farewell"), "got: {text}");
        assert!(ended, "subscription must end with the terminal marker");
    }

    #[tokio::test]
    async fn shutdown_warns_then_forces() {
        let (_dir, host) = host_with_script("sleep 30");
        let disk = host.launch("disk", None).await.unwrap();
        let logs = host.launch("logs", None).await.unwrap();

        match host.shutdown_all(false).await {
            ShutdownOutcome::Active(active) => {
                let mut ids: Vec<&str> = active.iter().map(|s| s.id.as_str()).collect();
                ids.sort_unstable();
                let mut expected = [disk.as_str(), logs.as_str()];
                expected.sort_unstable();
                assert_eq!(ids, expected);
            }
            ShutdownOutcome::Terminated => panic!("must warn instead of terminating"),
        }

        // Nothing was stopped by the warning pass.
        assert!(host
            .list_active()
            .await
            .iter()
            .all(|s| s.status == SessionStatus::Running));

        match host.shutdown_all(true).await {
            ShutdownOutcome::Terminated => {}
            ShutdownOutcome::Active(_) => panic!("forced shutdown must terminate"),
        }
        assert!(host.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn shutdown_with_no_sessions_terminates_directly() {
        let (_dir, host) = host_with_script("exit 0");
        assert!(matches!(
            host.shutdown_all(false).await,
            ShutdownOutcome::Terminated
        ));
    }

    #[test]
    fn language_falls_back_to_default() {
        assert_eq!(validate_language(None), "en");
        assert_eq!(validate_language(Some("")), "en");
        assert_eq!(validate_language(Some("fr")), "en");
        assert_eq!(validate_language(Some("de")), "de");
        assert_eq!(validate_language(Some("en")), "en");
    }
}

//! Wire message types for the duplex relay channel.
//!
//! Everything crossing the WebSocket is a JSON envelope of the form
//! `{"type": ..., "content": ...}`. Output is delivered as text so embedded
//! escape sequences survive the trip to a browser terminal untouched.

use crate::catalog::Program;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Stopped => f.write_str("stopped"),
        }
    }
}

/// Point-in-time copy of a session's observable fields.
///
/// Returned by listing operations instead of live references so callers
/// never race a state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub program: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Messages a client sends over the duplex channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Attach to a session's output stream.
    Subscribe(String),
    /// Start a new session for a catalog program.
    Launch {
        program: String,
        #[serde(default)]
        language: Option<String>,
    },
    /// Send a line of input to a session's terminal.
    Input { session: String, data: String },
    /// Stop a running session.
    Stop(String),
    /// List sessions currently in the registry.
    ListSessions,
    /// List the programs the catalog offers.
    ListPrograms,
    /// Shut the server down, stopping every session first.
    Shutdown {
        #[serde(default)]
        force: bool,
    },
}

/// Messages the server sends over the duplex channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A chunk of raw session output.
    Output(String),
    /// The subscribed session has ended; no more output follows.
    SessionEnded(String),
    /// A launch request succeeded.
    Launched { session: String },
    /// Registry snapshot in response to `ListSessions`.
    Sessions(Vec<SessionSummary>),
    /// Catalog listing in response to `ListPrograms`.
    Programs(Vec<Program>),
    /// Input was written to the session's terminal.
    InputAck { session: String },
    /// A stop request completed.
    Stopped { session: String },
    /// Shutdown was requested without force while sessions are active.
    ShutdownPending { active: Vec<SessionSummary> },
    /// The server is stopping all sessions and will exit.
    ShuttingDown,
    /// A request failed.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_envelope_shape() {
        let msg = ServerMessage::Output("menu:\r\n 1) status\r\n".into());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "output");
        assert_eq!(value["content"], "menu:\r\n 1) status\r\n");
    }

    #[test]
    fn session_ended_envelope_shape() {
        let msg = ServerMessage::SessionEnded("disk_1700000000".into());
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "session_ended");
        assert_eq!(value["content"], "disk_1700000000");
    }

    #[test]
    fn subscribe_parses_from_envelope() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","content":"disk_1700000000"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Subscribe(ref id) if id == "disk_1700000000"));
    }

    #[test]
    fn launch_language_defaults_to_none() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"launch","content":{"program":"disk"}}"#).unwrap();
        match msg {
            ClientMessage::Launch { program, language } => {
                assert_eq!(program, "disk");
                assert!(language.is_none());
            }
            other => panic!("expected Launch, got: {other:?}"),
        }
    }

    #[test]
    fn unit_variant_needs_no_content() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"list_sessions"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::ListSessions));
    }

    #[test]
    fn summary_round_trip() {
        let summary = SessionSummary {
            id: "logs_1700000000".into(),
            program: "logs".into(),
            display_name: "Log Analysis Tools".into(),
            created_at: Utc::now(),
            status: SessionStatus::Running,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains(r#""status":"running""#));
        let back: SessionSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, summary.id);
        assert_eq!(back.status, SessionStatus::Running);
    }
}

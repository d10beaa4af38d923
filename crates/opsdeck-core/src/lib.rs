//! opsdeck-core: the session core for PTY-backed tool runs.
//!
//! Launches interactive command-line tools on pseudo-terminals, tracks each
//! run as a session in a shared registry, retains a bounded replay window of
//! recent output, and relays the live byte stream to a single subscriber.
//! Transport and catalog concerns live in the server crate; everything here
//! is constructible per test case.

pub mod catalog;
pub mod error;
pub mod host;
pub mod messages;
pub mod session;

pub use catalog::{Program, ProgramCatalog};
pub use error::{DeckError, DeckResult};
pub use host::{SessionHost, ShutdownOutcome, MAX_INPUT_BYTES, REMOVE_DELAY, TERMINATE_GRACE};
pub use messages::{ClientMessage, ServerMessage, SessionStatus, SessionSummary};
pub use session::{RelayEvent, Session, SessionRegistry, Subscription};

//! Program catalog interface.
//!
//! The core launches whatever the catalog resolves; it knows nothing about
//! which tools exist or how they are described. The server binary supplies
//! the concrete catalog.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A launchable tool known to the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Stable identifier used in session ids and launch requests.
    pub id: String,
    /// Human-readable name shown to observers.
    pub display_name: String,
    /// Short description for catalog listings.
    pub description: String,
    /// Grouping label for catalog listings.
    pub category: String,
    /// Script path relative to the root directory.
    pub script: PathBuf,
}

/// Maps program identifiers to executable scripts and display metadata.
pub trait ProgramCatalog: Send + Sync {
    /// Resolve a program identifier, or `None` if unknown.
    fn resolve(&self, id: &str) -> Option<Program>;

    /// All programs the catalog offers, in listing order.
    fn all(&self) -> Vec<Program>;
}

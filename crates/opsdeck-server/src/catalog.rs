//! Built-in tool catalog.
//!
//! The toolkit ships a fixed set of interactive helper scripts under
//! `modules/`; this catalog maps their identifiers to script paths and
//! display metadata. Submodules (the BTRFS pair) are launchable directly,
//! same as their parent.

use opsdeck_core::{Program, ProgramCatalog};
use std::path::PathBuf;

/// id, display name, description, category, script path.
const TOOLS: &[(&str, &str, &str, &str, &str)] = &[
    (
        "restarts",
        "Services & Desktop Restart Options",
        "Restart system services, desktop environment, and power management",
        "Recovery & Restarts",
        "modules/mod_restarts.sh",
    ),
    (
        "system_info",
        "Display System Information",
        "Show comprehensive system information and hardware details",
        "System Diagnosis & Analysis",
        "modules/mod_system_info.sh",
    ),
    (
        "disk",
        "Disk Tools",
        "Disk utilities and storage analysis tools",
        "System Diagnosis & Analysis",
        "modules/mod_disk.sh",
    ),
    (
        "logs",
        "Log Analysis Tools",
        "Analyze system logs and troubleshoot issues",
        "System Diagnosis & Analysis",
        "modules/mod_logs.sh",
    ),
    (
        "packages",
        "Package Management & Updates",
        "Manage packages and system updates",
        "Maintenance & Security",
        "modules/mod_packages.sh",
    ),
    (
        "security",
        "Security Checks",
        "Perform security audits and checks",
        "Maintenance & Security",
        "modules/mod_security.sh",
    ),
    (
        "energy",
        "Energy Management",
        "Power management and energy optimization",
        "Maintenance & Security",
        "modules/mod_energy.sh",
    ),
    (
        "docker",
        "Docker Functions",
        "Docker management and security tools",
        "Docker & Containers",
        "modules/mod_docker.sh",
    ),
    (
        "backup",
        "Backup & Recovery",
        "Backup and restore operations",
        "Backup & Recovery",
        "modules/backup/mod_backup.sh",
    ),
    (
        "btrfs_backup",
        "BTRFS Backup",
        "Advanced BTRFS snapshot-based backup system with maintenance tools",
        "Backup & Recovery",
        "modules/backup/mod_btrfs_backup.sh",
    ),
    (
        "btrfs_restore",
        "BTRFS Restore",
        "BTRFS snapshot restoration with dry-run support",
        "Backup & Recovery",
        "modules/backup/mod_btrfs_restore.sh",
    ),
];

/// Catalog backed by the compiled-in tool table.
#[derive(Debug, Default)]
pub struct BuiltinCatalog;

impl BuiltinCatalog {
    pub fn new() -> Self {
        Self
    }
}

impl ProgramCatalog for BuiltinCatalog {
    fn resolve(&self, id: &str) -> Option<Program> {
        TOOLS
            .iter()
            .find(|(tool_id, ..)| *tool_id == id)
            .map(|(tool_id, name, description, category, script)| Program {
                id: (*tool_id).to_string(),
                display_name: (*name).to_string(),
                description: (*description).to_string(),
                category: (*category).to_string(),
                script: PathBuf::from(script),
            })
    }

    fn all(&self) -> Vec<Program> {
        TOOLS
            .iter()
            .map(|(tool_id, ..)| tool_id)
            .filter_map(|id| self.resolve(id))
            .collect()
    }
}

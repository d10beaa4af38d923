//! Root directory resolution.
//!
//! The root directory holds the `modules/` script tree and becomes both the
//! working directory and the `OPSDECK_ROOT_DIR` pointer of every launched
//! session. Resolution order: explicit flag, environment variable, the
//! executable's directory (release layout keeps `modules/` beside the
//! binary, development keeps it one level up), current directory.

use std::path::PathBuf;

pub fn resolve_root(cli_root: Option<PathBuf>) -> PathBuf {
    let env_root = std::env::var("OPSDECK_ROOT_DIR").ok();
    let exe = std::env::current_exe().ok();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    resolve_root_from(cli_root, env_root, exe, cwd)
}

fn resolve_root_from(
    cli_root: Option<PathBuf>,
    env_root: Option<String>,
    exe: Option<PathBuf>,
    cwd: PathBuf,
) -> PathBuf {
    if let Some(root) = cli_root {
        return root;
    }
    if let Some(root) = env_root.filter(|r| !r.is_empty()) {
        return PathBuf::from(root);
    }
    if let Some(exe) = exe {
        if let Some(dir) = exe.parent() {
            if dir.join("modules").is_dir() {
                return dir.to_path_buf();
            }
            if let Some(parent) = dir.parent() {
                if parent.join("modules").is_dir() {
                    return parent.to_path_buf();
                }
            }
        }
    }
    cwd
}

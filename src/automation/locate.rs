//! Binary resolution against the user's login-shell environment.
//!
//! GUI-launched processes inherit a minimal PATH that usually misses
//! version managers and user-local bins, so the primary lookup asks the
//! login shell, with a plain PATH scan as fallback.

use std::path::PathBuf;
use std::process::Command;

use tracing::debug;

/// Find a CLI binary the way the user's interactive shell would.
pub fn locate(binary: &str) -> Option<PathBuf> {
    if let Some(path) = login_shell_lookup(binary) {
        return Some(path);
    }
    path_scan(binary)
}

fn login_shell_lookup(binary: &str) -> Option<PathBuf> {
    // Only plain names go through the shell; anything else could be
    // interpreted
    if !binary
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return None;
    }

    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string());
    let output = Command::new(&shell)
        .arg("-lc")
        .arg(format!("command -v {binary}"))
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    if path.is_absolute() && path.exists() {
        debug!(binary, path = %path.display(), "resolved via login shell");
        Some(path)
    } else {
        None
    }
}

fn path_scan(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(binary);
        if is_executable(&candidate) {
            debug!(binary, path = %candidate.display(), "resolved via PATH scan");
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &std::path::Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &std::path::Path) -> bool {
    path.is_file()
}

//! Small shared helpers: operator identity, host name, executable probing.

use std::env;
use std::path::Path;

/// Name of the operator running the tool, taken from the environment.
pub fn current_user() -> String {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Host name, taken from the environment with a portable fallback.
pub fn current_host() -> String {
    if let Ok(host) = env::var("HOSTNAME") {
        if !host.is_empty() {
            return host;
        }
    }
    // Linux keeps the kernel hostname readable even in minimal environments.
    if let Ok(host) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let host = host.trim().to_string();
        if !host.is_empty() {
            return host;
        }
    }
    "localhost".to_string()
}

/// True when any execute bit is set on the file. Always false on non-unix
/// platforms, where the extension conventions carry the information instead.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(_path: &Path) -> bool {
    false
}

/// Render a path with forward slashes regardless of platform. Load manifests
/// and upload headers always use `/` separators.
pub fn slash_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

//! Connection configuration from a netrc-style file.
//!
//! The file is a flat list of `key value` lines. `machine`, `port`,
//! `secure`, `login`, and `password` are mandatory; `timeout`, `verbose`,
//! and `nodelete` are optional tuning knobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while reading the netrc configuration
#[derive(Debug, Error)]
pub enum NetrcError {
    #[error("netrc configuration file \"{0}\" does not exist")]
    Missing(PathBuf),

    #[error("impossible to find the netrc configuration in this file: \"{0}\"")]
    Empty(PathBuf),

    #[error("\"{field}\" field is not defined in the netrc configuration file \"{file}\"")]
    MissingField { field: &'static str, file: PathBuf },

    #[error("invalid port '{0}' in netrc configuration")]
    BadPort(String),

    #[error("failed to read netrc configuration")]
    Io(#[from] std::io::Error),
}

/// Parameters for one remote server connection.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub machine: String,
    pub port: u16,
    pub secure: bool,
    pub login: String,
    pub password: String,
    /// Socket read timeout for the command channel
    pub timeout: Option<Duration>,
    pub verbose: bool,
    /// Skip the best-effort remote directory cleanup after a command
    pub nodelete: bool,
}

impl RemoteConfig {
    /// Parse `path`, failing with a per-field diagnostic when a mandatory
    /// key is absent.
    pub fn from_netrc(path: &Path) -> Result<Self, NetrcError> {
        if !path.exists() {
            return Err(NetrcError::Missing(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;

        let mut machine = None;
        let mut port = None;
        let mut secure = None;
        let mut login = None;
        let mut password = None;
        let mut timeout = None;
        let mut verbose = false;
        let mut nodelete = false;

        for line in text.lines() {
            let line = line.trim();
            if let Some(v) = line.strip_prefix("machine ") {
                machine = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("port ") {
                port = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("secure ") {
                secure = Some(v.trim() == "yes");
            } else if let Some(v) = line.strip_prefix("login ") {
                login = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("password ") {
                password = Some(v.trim().to_string());
            } else if let Some(v) = line.strip_prefix("timeout ") {
                timeout = v.trim().parse::<u64>().ok().map(Duration::from_secs);
            } else if let Some(v) = line.strip_prefix("verbose ") {
                verbose = v.trim() == "yes";
            } else if let Some(v) = line.strip_prefix("nodelete ") {
                nodelete = v.trim() == "yes";
            }
        }

        if machine.is_none() && port.is_none() && secure.is_none() {
            return Err(NetrcError::Empty(path.to_path_buf()));
        }
        let missing = |field| NetrcError::MissingField {
            field,
            file: path.to_path_buf(),
        };
        let machine = machine.ok_or_else(|| missing("machine"))?;
        let port_str = port.ok_or_else(|| missing("port"))?;
        let secure = secure.ok_or_else(|| missing("secure"))?;
        let login = login.ok_or_else(|| missing("login"))?;
        let password = password.ok_or_else(|| missing("password"))?;
        let port = port_str
            .parse::<u16>()
            .map_err(|_| NetrcError::BadPort(port_str))?;

        Ok(Self {
            machine,
            port,
            secure,
            login,
            password,
            timeout,
            verbose,
            nodelete,
        })
    }

    /// `ws(s)://host:port/` base for the command channel.
    pub fn ws_base(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/", scheme, self.machine, self.port)
    }

    /// `http(s)://host:port/` base for token retrieval and raw uploads.
    pub fn http_base(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}/", scheme, self.machine, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_netrc(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.netrc");
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_netrc(
            "machine qorus.example.com\nport 8011\nsecure yes\nlogin admin\npassword secret\ntimeout 60\nnodelete yes\n",
        );
        let config = RemoteConfig::from_netrc(&path).unwrap();
        assert_eq!(config.machine, "qorus.example.com");
        assert_eq!(config.port, 8011);
        assert!(config.secure);
        assert!(config.nodelete);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.ws_base(), "wss://qorus.example.com:8011/");
        assert_eq!(config.http_base(), "https://qorus.example.com:8011/");
    }

    #[test]
    fn test_missing_field_named() {
        let (_dir, path) =
            write_netrc("machine h\nport 8011\nsecure no\nlogin admin\n");
        let err = RemoteConfig::from_netrc(&path).unwrap_err();
        assert!(matches!(
            err,
            NetrcError::MissingField {
                field: "password",
                ..
            }
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = RemoteConfig::from_netrc(Path::new("/nonexistent.netrc")).unwrap_err();
        assert!(matches!(err, NetrcError::Missing(_)));
    }

    #[test]
    fn test_insecure_scheme() {
        let (_dir, path) =
            write_netrc("machine h\nport 80\nsecure no\nlogin a\npassword b\n");
        let config = RemoteConfig::from_netrc(&path).unwrap();
        assert_eq!(config.ws_base(), "ws://h:80/");
        assert_eq!(config.http_base(), "http://h:80/");
    }
}

//! File upload to the server's raw endpoint.
//!
//! The transport is abstracted behind [`RemoteStore`] so the upload policy
//! (allocate the holding directory once, reuse it, best-effort cleanup) can
//! be tested without a server. [`HttpRemoteStore`] is the production
//! implementation.

use super::netrc::RemoteConfig;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Upload endpoint, relative to the HTTP base.
const UPLOAD_PATH: &str = "raw/remote-file";

/// A response body opening like this is the server's out-of-band error page
/// and aborts the run.
const HTML_ERROR_PREFIX: &str = "<html><head><title>";

/// Errors raised while talking to the raw upload endpoint
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server answered with its HTML error page instead of a directory name
    #[error("server returned an error page:\n{0}")]
    ErrorPage(String),

    /// Non-2xx status from the upload endpoint
    #[error("error status code {status}: {body}")]
    Status { status: u16, body: String },

    /// HTTP client failure
    #[error("upload transport failure")]
    Http(#[from] reqwest::Error),

    /// Local file could not be read
    #[error("failed to read '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Minimal interface to the server's file store: put one file, delete one
/// holding directory. `put` returns the response body; on the first call of
/// a run (no `dir` yet) that body is the allocated directory name.
pub trait RemoteStore {
    fn put(&mut self, target: &str, body: Vec<u8>, dir: Option<&str>)
        -> Result<String, TransportError>;
    fn delete(&mut self, dir: &str) -> Result<(), TransportError>;
}

/// Production [`RemoteStore`] over HTTP. Mirrors the server contract:
/// `POST` with `application/octet-stream`, `filepath` header carrying the
/// target name, `dir` header after allocation; `DELETE` with `dir`.
pub struct HttpRemoteStore {
    client: reqwest::blocking::Client,
    url: String,
    login: String,
    password: String,
}

impl HttpRemoteStore {
    pub fn new(config: &RemoteConfig) -> Result<Self, TransportError> {
        // operator installations routinely run on self-signed certificates
        let client = reqwest::blocking::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}{}", config.http_base(), UPLOAD_PATH),
            login: config.login.clone(),
            password: config.password.clone(),
        })
    }
}

impl RemoteStore for HttpRemoteStore {
    fn put(
        &mut self,
        target: &str,
        body: Vec<u8>,
        dir: Option<&str>,
    ) -> Result<String, TransportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header("filepath", target)
            .basic_auth(&self.login, Some(&self.password))
            .body(body);
        if let Some(dir) = dir {
            request = request.header("dir", dir);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        if text.starts_with(HTML_ERROR_PREFIX) {
            return Err(TransportError::ErrorPage(text));
        }
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    fn delete(&mut self, dir: &str) -> Result<(), TransportError> {
        self.client
            .delete(&self.url)
            .header("dir", dir)
            .basic_auth(&self.login, Some(&self.password))
            .send()?;
        Ok(())
    }
}

/// Streams a resolved file set to the server, allocating the remote holding
/// directory on the first upload and reusing it for the rest of the run.
pub struct Uploader<S: RemoteStore> {
    store: S,
    dir: Option<String>,
}

impl<S: RemoteStore> Uploader<S> {
    pub fn new(store: S) -> Self {
        Self { store, dir: None }
    }

    /// The allocated remote directory, once known.
    pub fn dir(&self) -> Option<&str> {
        self.dir.as_deref()
    }

    /// Upload every file, mapping local paths to their manifest-relative
    /// target names. The first upload's response body names the allocated
    /// directory. An HTML error page aborts immediately; files after the
    /// failure are not uploaded.
    pub fn upload(&mut self, root: &Path, files: &[PathBuf]) -> Result<(), TransportError> {
        for file in files {
            let body = fs::read(root.join(file)).map_err(|source| TransportError::Io {
                path: file.clone(),
                source,
            })?;

            match &self.dir {
                None => {
                    // the first request carries only the base name; the
                    // server answers with the holding directory it created
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let dir = self.store.put(&name, body, None)?;
                    debug!(%dir, "uploading into remote directory");
                    self.dir = Some(dir);
                }
                Some(dir) => {
                    let target = crate::util::slash_path(file);
                    self.store.put(&target, body, Some(dir))?;
                }
            }

            print!(".");
            std::io::stdout().flush().ok();
            debug!(file = %file.display(), "uploaded");
        }
        println!();
        Ok(())
    }

    /// Best-effort removal of the allocated holding directory. Failure is
    /// logged, never propagated: it must not mask the command's result.
    pub fn cleanup(&mut self, nodelete: bool) {
        if nodelete {
            return;
        }
        let Some(dir) = self.dir.clone() else {
            return;
        };
        debug!(%dir, "deleting remote directory");
        if let Err(e) = self.store.delete(&dir) {
            warn!(%dir, error = %e, "failed to delete remote directory");
        }
    }
}

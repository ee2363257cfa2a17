//! The persistent remote command channel.
//!
//! Protocol: a bearer token is fetched from the token endpoint with basic
//! auth, a websocket connection is opened carrying it in the `Qorus-Token`
//! header, one YAML command document is sent, and the server streams back
//! `text-output` frames until the command completes or the connection
//! closes.

use super::netrc::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::net::TcpStream;
use thiserror::Error;
use tracing::{debug, warn};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::client::Request;
use tungstenite::handshake::HandshakeError;
use tungstenite::{Connector, Message};

/// Token endpoint, relative to the HTTP base.
const TOKEN_PATH: &str = "api/latest/system/wstoken?err=1";

/// Command channel endpoint, relative to the websocket base.
const COMMAND_PATH: &str = "remote-command";

/// The one server frame type carrying command output.
const MSG_TEXT_OUTPUT: &str = "text-output";

/// Errors raised on the command channel
#[derive(Debug, Error)]
pub enum RemoteCommandError {
    /// The server reported a structured error from the token endpoint
    #[error("server error at {file}:{line}: {err}: {desc}")]
    ServerReported {
        file: String,
        line: u64,
        err: String,
        desc: String,
    },

    /// Token endpoint answered with an unexpected status
    #[error("error status code {status}: {body}")]
    TokenStatus { status: u16, body: String },

    #[error("token transport failure")]
    Http(#[from] reqwest::Error),

    #[error("cannot connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS setup failure")]
    Tls(#[from] native_tls::Error),

    #[error("websocket failure")]
    WebSocket(#[from] tungstenite::Error),

    #[error("token is not a valid header value")]
    BadToken(#[from] tungstenite::http::header::InvalidHeaderValue),

    #[error("cannot encode command message")]
    Encode(#[from] serde_yaml::Error),
}

/// The single structured command document sent per connection. The
/// `files`/`opts`/`dir` fields are only populated for `oload`.
#[derive(Debug, Clone, Serialize)]
pub struct CommandMessage {
    pub cmd: String,
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

impl CommandMessage {
    pub fn new(cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args,
            files: None,
            opts: None,
            dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    msgtype: String,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    file: String,
    line: u64,
    offset: u64,
    err: String,
    desc: String,
}

/// Fetch the bearer token for the command channel.
fn fetch_token(config: &RemoteConfig) -> Result<String, RemoteCommandError> {
    let url = format!("{}{}", config.http_base(), TOKEN_PATH);
    let client = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()?;
    let response = client
        .get(&url)
        .basic_auth(&config.login, Some(&config.password))
        .send()?;

    let status = response.status();
    if !status.is_success() {
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));
        let body = response.text()?;
        if status.as_u16() == 409 && is_json {
            if let Ok(parsed) = serde_json::from_str::<TokenErrorBody>(&body) {
                return Err(RemoteCommandError::ServerReported {
                    file: parsed.file,
                    line: parsed.line + parsed.offset,
                    err: parsed.err,
                    desc: parsed.desc,
                });
            }
        }
        return Err(RemoteCommandError::TokenStatus {
            status: status.as_u16(),
            body,
        });
    }

    let token = response.text()?.trim().trim_matches('"').to_string();
    debug!("obtained command channel token");
    Ok(token)
}

/// Build the websocket upgrade request carrying the channel token.
fn channel_request(url: &str, token: &str) -> Result<Request, RemoteCommandError> {
    let mut request = url.into_client_request()?;
    request.headers_mut().insert("Qorus-Token", token.parse()?);
    Ok(request)
}

/// Open the channel, send one command, and stream its text output to
/// stdout until the server closes the connection.
pub fn run(config: &RemoteConfig, message: &CommandMessage) -> Result<(), RemoteCommandError> {
    let token = fetch_token(config)?;

    let url = format!("{}{}", config.ws_base(), COMMAND_PATH);
    let request = channel_request(&url, &token)?;

    let addr = format!("{}:{}", config.machine, config.port);
    let stream = TcpStream::connect(&addr).map_err(|source| RemoteCommandError::Connect {
        addr: addr.clone(),
        source,
    })?;
    if let Some(timeout) = config.timeout {
        stream
            .set_read_timeout(Some(timeout))
            .map_err(|source| RemoteCommandError::Connect { addr, source })?;
    }

    let connector = if config.secure {
        // operator installations routinely run on self-signed certificates
        Connector::NativeTls(
            native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()?,
        )
    } else {
        Connector::Plain
    };

    let (mut socket, _response) =
        tungstenite::client_tls_with_config(request, stream, None, Some(connector)).map_err(
            |e| match e {
                HandshakeError::Failure(e) => RemoteCommandError::WebSocket(e),
                // the stream is blocking, so an interrupted handshake only
                // means the socket reported WouldBlock
                HandshakeError::Interrupted(_) => RemoteCommandError::WebSocket(
                    tungstenite::Error::Io(std::io::ErrorKind::WouldBlock.into()),
                ),
            },
        )?;
    debug!(url = %url, cmd = %message.cmd, "command channel open");

    socket.send(Message::Text(serde_yaml::to_string(message)?))?;

    loop {
        match socket.read() {
            Ok(Message::Text(text)) => handle_frame(&text),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                break
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn handle_frame(text: &str) {
    match serde_yaml::from_str::<ServerMessage>(text) {
        Ok(msg) if msg.msgtype == MSG_TEXT_OUTPUT => {
            if let Some(data) = msg.data {
                print!("{}", data);
                std::io::stdout().flush().ok();
            }
        }
        Ok(msg) => warn!(msgtype = %msg.msgtype, "unknown command from server"),
        Err(e) => warn!(error = %e, "undecodable frame from server"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_message_yaml_shape() {
        let mut message = CommandMessage::new("oload", vec![]);
        message.files = Some(vec!["svc.qsd.yaml".to_string()]);
        message.opts = Some(vec!["-v".to_string()]);
        message.dir = Some("/tmp/remote-42".to_string());

        let yaml = serde_yaml::to_string(&message).unwrap();
        assert!(yaml.contains("cmd: oload"));
        assert!(yaml.contains("files:"));
        assert!(yaml.contains("dir: /tmp/remote-42"));
    }

    #[test]
    fn test_plain_command_omits_oload_fields() {
        let message = CommandMessage::new("ostatus", vec!["-S".to_string()]);
        let yaml = serde_yaml::to_string(&message).unwrap();
        assert!(!yaml.contains("files:"));
        assert!(!yaml.contains("opts:"));
        assert!(!yaml.contains("dir:"));
    }

    #[test]
    fn test_channel_request_carries_token() {
        let request = channel_request("wss://h:8011/remote-command", "tok-1").unwrap();
        assert_eq!(request.uri().path(), "/remote-command");
        assert_eq!(request.headers().get("Qorus-Token").unwrap(), "tok-1");
    }

    #[test]
    fn test_text_output_frame_parses() {
        let msg: ServerMessage =
            serde_yaml::from_str("msgtype: text-output\ndata: \"line one\\n\"\n").unwrap();
        assert_eq!(msg.msgtype, "text-output");
        assert_eq!(msg.data.as_deref(), Some("line one\n"));
    }
}

//! Remote deployment: file upload over HTTP and the persistent command
//! channel.
//!
//! Connection parameters come from a netrc-style file ([`netrc`]). Files
//! are streamed to the server's raw upload endpoint ([`upload`]); a single
//! operator command is then dispatched over a websocket connection and its
//! text output streamed back ([`command`]). The `oload` command gets the
//! full dependency-resolution treatment before upload ([`oload`]).

pub mod command;
pub mod netrc;
pub mod oload;
pub mod upload;

pub use command::{CommandMessage, RemoteCommandError};
pub use netrc::{NetrcError, RemoteConfig};
pub use upload::{HttpRemoteStore, RemoteStore, TransportError, Uploader};

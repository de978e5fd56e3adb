use thiserror::Error;

use crate::events::TrackKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("media acquisition failed: {0}")]
    MediaAcquisition(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("platform error: {0}")]
    Platform(String),
    #[error("not connected")]
    NotConnected,
    #[error("no local {0:?} track")]
    NoLocalTrack(TrackKind),
    #[error("connect attempt cancelled")]
    Cancelled,
    #[error("a session is already active")]
    SessionActive,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("teardown incomplete: {}", .0.join("; "))]
    Teardown(Vec<String>),
}

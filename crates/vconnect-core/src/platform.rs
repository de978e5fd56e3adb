//! Capability interface to the external video platform.
//!
//! The session controller only needs a handful of operations from the
//! platform SDK: acquire local capture tracks, connect with a grant,
//! enable/disable/stop/attach tracks and a stream of room events. Anything
//! else the SDK offers stays behind the adapter.

use std::future::Future;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::errors::SessionError;
use crate::events::{TrackKind, TrackSource};

/// Opaque identifier of a host rendering surface (video element, texture, audio sink).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub String);

impl SurfaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// A platform media track, local or remote.
///
/// Handles are cheap clones referring to the same underlying track.
pub trait MediaTrack: Clone + Send + Sync + 'static {
    fn sid(&self) -> String;

    fn kind(&self) -> TrackKind;

    /// Mute semantics: the track keeps running but stops sending/rendering.
    fn set_enabled(&self, enabled: bool) -> Result<(), SessionError>;

    /// Release the capture device behind a local track.
    fn stop(&self) -> Result<(), SessionError>;

    /// Bind the track to a surface, replacing any previous binding.
    fn attach(&self, surface: &SurfaceId);

    fn detach(&self, surface: &SurfaceId);
}

/// A track slot on a participant.
#[derive(Debug, Clone)]
pub struct TrackPublication<T> {
    pub sid: String,
    pub kind: TrackKind,
    pub source: TrackSource,
    /// `None` until the platform reports an explicit state.
    pub enabled: Option<bool>,
    pub track: Option<T>,
}

/// Point-in-time view of a participant as reported by the platform.
#[derive(Debug, Clone)]
pub struct ParticipantSnapshot<T> {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    pub publications: Vec<TrackPublication<T>>,
}

/// What to capture before joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaRequest {
    pub audio: bool,
    pub video: bool,
    pub video_width: u32,
}

impl Default for MediaRequest {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
            video_width: 640,
        }
    }
}

/// Everything needed to join one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGrant {
    /// Platform WebSocket URL.
    pub url: String,
    pub token: String,
    pub room_name: String,
}

/// Room events delivered by the platform after connect.
#[derive(Debug, Clone)]
pub enum PlatformEvent<T> {
    ParticipantConnected(ParticipantSnapshot<T>),
    ParticipantDisconnected { sid: String },
    TrackSubscribed { participant_sid: String, publication: TrackPublication<T>, track: T },
    TrackUnsubscribed { participant_sid: String, track_sid: String, kind: TrackKind },
    TrackEnabled { participant_sid: String, track_sid: String, kind: TrackKind },
    TrackDisabled { participant_sid: String, track_sid: String, kind: TrackKind },
    Disconnected { reason: String },
}

/// A live platform connection.
pub trait Connection: Send + Sync + 'static {
    type Track: MediaTrack;

    fn local_participant(&self) -> ParticipantSnapshot<Self::Track>;

    fn remote_participants(&self) -> Vec<ParticipantSnapshot<Self::Track>>;

    fn disconnect(&self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Entry point into the platform SDK.
pub trait MediaPlatform: Send + Sync + 'static {
    type Track: MediaTrack;
    type Connection: Connection<Track = Self::Track>;

    /// Must return either all requested tracks or an error; partially
    /// acquired tracks are the implementation's to release on failure.
    fn acquire_media(
        &self,
        request: MediaRequest,
    ) -> impl Future<Output = Result<Vec<Self::Track>, SessionError>> + Send;

    /// Connect and publish `tracks` as the local participant's media.
    fn connect(
        &self,
        grant: &JoinGrant,
        tracks: &[Self::Track],
    ) -> impl Future<
        Output = Result<
            (Self::Connection, UnboundedReceiver<PlatformEvent<Self::Track>>),
            SessionError,
        >,
    > + Send;
}

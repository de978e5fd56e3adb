//! vconnect core client logic.
//!
//! Session lifecycle, participant rendering state and call controls for a
//! video-conference front-end. The media platform is reached through the
//! traits in [`platform`]; enable the `livekit` feature for the LiveKit
//! implementation.

pub mod auth;
pub mod controls;
pub mod errors;
pub mod events;
#[cfg(feature = "livekit")]
pub mod livekit_platform;
pub mod participant_view;
pub mod participants;
pub mod platform;
pub mod room_page;
pub mod session;

#[cfg(test)]
mod testing;

pub use auth::{TokenClient, TokenInfo};
pub use controls::{ControlAction, ControlButton, Controls};
pub use errors::SessionError;
pub use events::{
    EventEmitter, ParticipantInfo, SessionEvent, SessionEventListener, SessionPhase, TrackKind,
};
pub use participant_view::ParticipantView;
pub use platform::{JoinGrant, MediaPlatform, MediaRequest, MediaTrack, SurfaceId};
pub use room_page::{PageState, RoomPage};
pub use session::{MediaState, SessionController};

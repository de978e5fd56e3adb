use crate::errors::SessionError;
use crate::platform::MediaPlatform;
use crate::session::{MediaState, SessionController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    ToggleAudio,
    ToggleVideo,
    Leave,
}

impl ControlAction {
    /// Forward the action to the session controller.
    pub async fn apply<P: MediaPlatform>(
        self,
        session: &SessionController<P>,
    ) -> Result<(), SessionError> {
        match self {
            ControlAction::ToggleAudio => session.toggle_audio().await.map(|_| ()),
            ControlAction::ToggleVideo => session.toggle_video().await.map(|_| ()),
            ControlAction::Leave => session.leave().await,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlButton {
    pub action: ControlAction,
    pub title: &'static str,
    /// Rendered in the "off" style when false.
    pub active: bool,
}

/// Call controls: microphone, camera and hang-up.
///
/// Holds nothing but the two flags mirrored from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

impl From<MediaState> for Controls {
    fn from(state: MediaState) -> Self {
        Self {
            audio_enabled: state.audio_enabled,
            video_enabled: state.video_enabled,
        }
    }
}

impl Controls {
    pub fn buttons(&self) -> [ControlButton; 3] {
        [
            ControlButton {
                action: ControlAction::ToggleAudio,
                title: if self.audio_enabled {
                    "Turn off microphone"
                } else {
                    "Turn on microphone"
                },
                active: self.audio_enabled,
            },
            ControlButton {
                action: ControlAction::ToggleVideo,
                title: if self.video_enabled {
                    "Turn off camera"
                } else {
                    "Turn on camera"
                },
                active: self.video_enabled,
            },
            ControlButton {
                action: ControlAction::Leave,
                title: "Leave call",
                active: true,
            },
        ]
    }
}

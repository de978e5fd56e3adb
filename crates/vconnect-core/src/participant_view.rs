use std::sync::{Arc, Mutex, MutexGuard};

use crate::events::{EventEmitter, ListenerId, SessionEvent, TrackKind};
use crate::platform::{MediaTrack, ParticipantSnapshot, SurfaceId};

struct ViewState<T> {
    video_tracks: Vec<T>,
    audio_tracks: Vec<T>,
    video_surface: SurfaceId,
    audio_surface: SurfaceId,
    attached_video: Option<T>,
    attached_audio: Option<T>,
    /// Local audio is never played back to its own participant.
    render_audio: bool,
    primary_audio_sid: Option<String>,
    primary_audio_enabled: Option<bool>,
}

impl<T: MediaTrack> ViewState<T> {
    fn tracks_mut(&mut self, kind: TrackKind) -> &mut Vec<T> {
        match kind {
            TrackKind::Audio => &mut self.audio_tracks,
            TrackKind::Video => &mut self.video_tracks,
        }
    }

    fn add_track(&mut self, track: T) {
        let kind = track.kind();
        let sid = track.sid();
        if kind == TrackKind::Audio && self.primary_audio_sid.is_none() {
            self.primary_audio_sid = Some(sid.clone());
        }
        let tracks = self.tracks_mut(kind);
        if tracks.iter().any(|t| t.sid() == sid) {
            return;
        }
        tracks.push(track);
        self.sync_attachment(kind);
    }

    fn remove_track(&mut self, track_sid: &str, kind: TrackKind) {
        self.tracks_mut(kind).retain(|t| t.sid() != track_sid);
        self.sync_attachment(kind);
    }

    /// Keep the first track of `kind` attached to that kind's surface.
    fn sync_attachment(&mut self, kind: TrackKind) {
        let render_audio = self.render_audio;
        let (first, attached, surface) = match kind {
            TrackKind::Video => (
                self.video_tracks.first().cloned(),
                &mut self.attached_video,
                &self.video_surface,
            ),
            TrackKind::Audio => (
                self.audio_tracks.first().cloned().filter(|_| render_audio),
                &mut self.attached_audio,
                &self.audio_surface,
            ),
        };

        let current = attached.as_ref().map(|t| t.sid());
        let wanted = first.as_ref().map(|t| t.sid());
        if current == wanted {
            return;
        }
        if let Some(old) = attached.take() {
            old.detach(surface);
        }
        if let Some(track) = first {
            track.attach(surface);
            *attached = Some(track);
        }
    }

    fn enabled_changed(&mut self, track_sid: &str, kind: TrackKind, enabled: bool) {
        if kind != TrackKind::Audio {
            return;
        }
        if self.primary_audio_sid.is_none() {
            self.primary_audio_sid = Some(track_sid.to_string());
        }
        if self.primary_audio_sid.as_deref() == Some(track_sid) {
            self.primary_audio_enabled = Some(enabled);
        }
    }

    fn detach_all(&mut self) {
        if let Some(track) = self.attached_video.take() {
            track.detach(&self.video_surface);
        }
        if let Some(track) = self.attached_audio.take() {
            track.detach(&self.audio_surface);
        }
        self.video_tracks.clear();
        self.audio_tracks.clear();
    }
}

/// Renders one participant: keeps the first video and audio track of the
/// participant attached to the view's surfaces and tracks the mute state
/// of its primary audio publication.
///
/// The view listens on the session emitter until [`close`](Self::close) or
/// drop, whichever comes first.
pub struct ParticipantView<T: MediaTrack> {
    participant_sid: String,
    identity: String,
    is_local: bool,
    state: Arc<Mutex<ViewState<T>>>,
    emitter: EventEmitter<T>,
    listener: Option<ListenerId>,
}

impl<T: MediaTrack> ParticipantView<T> {
    pub fn new(
        participant: &ParticipantSnapshot<T>,
        is_local: bool,
        emitter: EventEmitter<T>,
        video_surface: SurfaceId,
        audio_surface: SurfaceId,
    ) -> Self {
        let mut state = ViewState {
            video_tracks: Vec::new(),
            audio_tracks: Vec::new(),
            video_surface,
            audio_surface,
            attached_video: None,
            attached_audio: None,
            render_audio: !is_local,
            primary_audio_sid: None,
            primary_audio_enabled: None,
        };

        if let Some(primary) = participant
            .publications
            .iter()
            .find(|p| p.kind == TrackKind::Audio)
        {
            state.primary_audio_sid = Some(primary.sid.clone());
            state.primary_audio_enabled = primary.enabled;
        }
        for track in participant.publications.iter().filter_map(|p| p.track.clone()) {
            state.add_track(track);
        }

        let state = Arc::new(Mutex::new(state));
        let sid = participant.sid.clone();
        let listener_state = state.clone();
        let listener = emitter.add_listener(Arc::new(move |event: &SessionEvent<T>| {
            let mut state = lock(&listener_state);
            match event {
                SessionEvent::TrackSubscribed { participant_sid, track } if *participant_sid == sid => {
                    state.add_track(track.clone());
                }
                SessionEvent::TrackUnsubscribed { participant_sid, track_sid, kind }
                    if *participant_sid == sid =>
                {
                    state.remove_track(track_sid, *kind);
                }
                SessionEvent::TrackEnabledChanged { participant_sid, track_sid, kind, enabled }
                    if *participant_sid == sid =>
                {
                    state.enabled_changed(track_sid, *kind, *enabled);
                }
                SessionEvent::ParticipantLeft(left) if *left == sid => {
                    state.detach_all();
                }
                _ => {}
            }
        }));

        tracing::debug!("participant view opened for {}", participant.sid);
        Self {
            participant_sid: participant.sid.clone(),
            identity: participant.identity.clone(),
            is_local,
            state,
            emitter,
            listener: Some(listener),
        }
    }

    pub fn participant_sid(&self) -> &str {
        &self.participant_sid
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_local(&self) -> bool {
        self.is_local
    }

    /// Name tag shown on the tile.
    pub fn label(&self) -> String {
        if self.is_local {
            format!("{} (You)", self.identity)
        } else {
            self.identity.clone()
        }
    }

    /// Unmuted unless the platform reported the primary audio publication
    /// as disabled. A local view never shows itself muted.
    pub fn is_muted(&self) -> bool {
        !self.is_local && lock(&self.state).primary_audio_enabled == Some(false)
    }

    pub fn video_track_sids(&self) -> Vec<String> {
        lock(&self.state).video_tracks.iter().map(|t| t.sid()).collect()
    }

    pub fn audio_track_sids(&self) -> Vec<String> {
        lock(&self.state).audio_tracks.iter().map(|t| t.sid()).collect()
    }

    pub fn attached_video(&self) -> Option<String> {
        lock(&self.state).attached_video.as_ref().map(|t| t.sid())
    }

    pub fn attached_audio(&self) -> Option<String> {
        lock(&self.state).attached_audio.as_ref().map(|t| t.sid())
    }

    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }

    /// Detach every track and stop listening. Idempotent.
    pub fn close(&mut self) {
        if let Some(id) = self.listener.take() {
            self.emitter.remove_listener(id);
            lock(&self.state).detach_all();
            tracing::debug!("participant view closed for {}", self.participant_sid);
        }
    }
}

impl<T: MediaTrack> Drop for ParticipantView<T> {
    fn drop(&mut self) {
        self.close();
    }
}

fn lock<T>(state: &Mutex<ViewState<T>>) -> MutexGuard<'_, ViewState<T>> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::errors::SessionError;
use crate::events::{
    EventEmitter, ListenerId, ParticipantInfo, SessionEvent, SessionEventListener, SessionPhase,
    TrackKind,
};
use crate::participant_view::ParticipantView;
use crate::participants::ParticipantRoster;
use crate::platform::{
    Connection, JoinGrant, MediaPlatform, MediaRequest, MediaTrack, ParticipantSnapshot,
    PlatformEvent, SurfaceId,
};

/// Local media flags mirrored to the controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaState {
    pub audio_enabled: bool,
    pub video_enabled: bool,
}

/// Callback invoked once `leave()` has torn the session down.
pub type LeaveHandler = Arc<dyn Fn() + Send + Sync>;

/// Tracks returned by acquisition that no session owns yet.
///
/// Stops every track on drop unless handed over with `into_tracks`, so a
/// start attempt that is cancelled or dropped mid-connect never keeps the
/// capture device.
struct AcquiredMedia<T: MediaTrack> {
    tracks: Vec<T>,
}

impl<T: MediaTrack> AcquiredMedia<T> {
    fn new(tracks: Vec<T>) -> Self {
        Self { tracks }
    }

    fn tracks(&self) -> &[T] {
        &self.tracks
    }

    fn into_tracks(mut self) -> Vec<T> {
        std::mem::take(&mut self.tracks)
    }
}

impl<T: MediaTrack> Drop for AcquiredMedia<T> {
    fn drop(&mut self) {
        for track in self.tracks.drain(..) {
            tracing::info!("releasing unclaimed local {:?} track {}", track.kind(), track.sid());
            if let Err(e) = track.stop() {
                tracing::warn!("failed to stop unclaimed track {}: {e}", track.sid());
            }
        }
    }
}

struct SessionInner<P: MediaPlatform> {
    phase: SessionPhase,
    /// Incremented on every start and every teardown; a pending start only
    /// applies its result while its attempt number is still current.
    attempt: u64,
    connection: Option<Arc<P::Connection>>,
    local_tracks: Vec<P::Track>,
    roster: ParticipantRoster<P::Track>,
    media: MediaState,
    event_task: Option<JoinHandle<()>>,
    emitter: EventEmitter<P::Track>,
}

impl<P: MediaPlatform> SessionInner<P> {
    fn set_phase(&mut self, phase: SessionPhase) {
        if self.phase == phase {
            return;
        }
        tracing::info!("session phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase.clone();
        self.emitter.emit(SessionEvent::PhaseChanged(phase));
    }

    fn media_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.media.audio_enabled,
            TrackKind::Video => self.media.video_enabled,
        }
    }

    fn set_media_enabled(&mut self, kind: TrackKind, enabled: bool) {
        match kind {
            TrackKind::Audio => self.media.audio_enabled = enabled,
            TrackKind::Video => self.media.video_enabled = enabled,
        }
        self.emitter.emit(SessionEvent::LocalMediaChanged {
            audio_enabled: self.media.audio_enabled,
            video_enabled: self.media.video_enabled,
        });
    }

    fn track_enabled_changed(
        &mut self,
        participant_sid: String,
        track_sid: String,
        kind: TrackKind,
        enabled: bool,
    ) {
        self.roster.set_track_enabled(&participant_sid, &track_sid, enabled);
        self.emitter.emit(SessionEvent::TrackEnabledChanged {
            participant_sid,
            track_sid,
            kind,
            enabled,
        });
    }

    /// Announce every rostered participant as gone so open views detach,
    /// then forget them.
    fn close_roster(&mut self) {
        let sids: Vec<String> = self.roster.infos().into_iter().map(|p| p.sid).collect();
        for sid in sids {
            self.emitter.emit(SessionEvent::ParticipantLeft(sid));
        }
        self.roster.clear();
    }

    /// Enter a terminal phase and drop every subscription on the emitter.
    fn finish(&mut self, phase: SessionPhase) {
        self.set_phase(phase);
        self.emitter.clear();
    }

    /// Release everything the session holds. Every step runs even when an
    /// earlier one fails; failures are collected.
    async fn release(&mut self) -> Vec<String> {
        let mut errors = Vec::new();

        for track in std::mem::take(&mut self.local_tracks) {
            stop_local_track(&track, &mut errors);
        }

        if let Some(connection) = self.connection.take() {
            match connection.disconnect().await {
                Ok(()) => tracing::info!("disconnected from room"),
                Err(e) => {
                    tracing::warn!("error disconnecting: {e}");
                    errors.push(e.to_string());
                }
            }
        }

        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        self.close_roster();
        errors
    }
}

fn stop_local_track<T: MediaTrack>(track: &T, errors: &mut Vec<String>) {
    let sid = track.sid();
    if let Err(e) = track.set_enabled(false) {
        tracing::warn!("failed to disable local track {sid}: {e}");
        errors.push(format!("disable {sid}: {e}"));
    }
    match track.stop() {
        Ok(()) => tracing::info!("stopped local {:?} track {sid}", track.kind()),
        Err(e) => {
            tracing::warn!("failed to stop local track {sid}: {e}");
            errors.push(format!("stop {sid}: {e}"));
        }
    }
}

/// Owns the lifecycle of one room connection: local media acquisition,
/// connect, membership tracking, mute toggles and teardown.
pub struct SessionController<P: MediaPlatform> {
    platform: P,
    grant: JoinGrant,
    media_request: MediaRequest,
    inner: Arc<Mutex<SessionInner<P>>>,
    emitter: EventEmitter<P::Track>,
    on_leave: Option<LeaveHandler>,
    /// Set when the controller is dropped while the event task held the
    /// state lock; the task then releases the session itself.
    dropped: Arc<AtomicBool>,
}

impl<P: MediaPlatform> SessionController<P> {
    pub fn new(platform: P, grant: JoinGrant) -> Self {
        let emitter = EventEmitter::new();
        Self {
            platform,
            grant,
            media_request: MediaRequest::default(),
            inner: Arc::new(Mutex::new(SessionInner {
                phase: SessionPhase::Idle,
                attempt: 0,
                connection: None,
                local_tracks: Vec::new(),
                roster: ParticipantRoster::new(),
                media: MediaState {
                    audio_enabled: false,
                    video_enabled: false,
                },
                event_task: None,
                emitter: emitter.clone(),
            })),
            emitter,
            on_leave: None,
            dropped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_media_request(mut self, request: MediaRequest) -> Self {
        self.media_request = request;
        self
    }

    /// Navigation hook run after `leave()` finished releasing local media.
    pub fn on_leave(mut self, handler: LeaveHandler) -> Self {
        self.on_leave = Some(handler);
        self
    }

    pub fn room_name(&self) -> &str {
        &self.grant.room_name
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener<P::Track>>) -> ListenerId {
        self.emitter.add_listener(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.emitter.remove_listener(id)
    }

    pub fn emitter(&self) -> &EventEmitter<P::Track> {
        &self.emitter
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.lock().await.phase.clone()
    }

    pub async fn media_state(&self) -> MediaState {
        self.inner.lock().await.media
    }

    /// Local participant first, then remotes.
    pub async fn participants(&self) -> Vec<ParticipantInfo> {
        self.inner.lock().await.roster.infos()
    }

    pub async fn participant(&self, sid: &str) -> Option<ParticipantSnapshot<P::Track>> {
        self.inner.lock().await.roster.get(sid).map(|e| e.snapshot())
    }

    /// Build a view bound to one participant. Snapshot and subscription
    /// happen under the session lock so no event falls in between.
    pub async fn participant_view(
        &self,
        sid: &str,
        video_surface: SurfaceId,
        audio_surface: SurfaceId,
    ) -> Option<ParticipantView<P::Track>> {
        let inner = self.inner.lock().await;
        let entry = inner.roster.get(sid)?;
        Some(ParticipantView::new(
            &entry.snapshot(),
            entry.info.is_local,
            self.emitter.clone(),
            video_surface,
            audio_surface,
        ))
    }

    /// Acquire local media, connect and start tracking room events.
    ///
    /// Returns `Cancelled` if the session was torn down while acquisition
    /// or connect was pending; anything acquired by then is released.
    pub async fn start(&self) -> Result<(), SessionError> {
        let attempt = {
            let mut inner = self.inner.lock().await;
            if inner.phase != SessionPhase::Idle {
                return Err(SessionError::SessionActive);
            }
            inner.attempt += 1;
            inner.set_phase(SessionPhase::Acquiring);
            inner.attempt
        };

        tracing::info!("acquiring local media for room {}", self.grant.room_name);
        let media = match self.platform.acquire_media(self.media_request).await {
            Ok(tracks) => AcquiredMedia::new(tracks),
            Err(e) => return self.fail_attempt(attempt, e).await,
        };

        if !self.is_current(attempt).await {
            tracing::info!("session torn down during media acquisition");
            drop(media);
            return Err(SessionError::Cancelled);
        }

        tracing::info!("connecting to room {}", self.grant.room_name);
        let connected = self.platform.connect(&self.grant, media.tracks()).await;
        let (connection, events) = match connected {
            Ok(c) => c,
            Err(e) => {
                drop(media);
                return self.fail_attempt(attempt, e).await;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt || inner.phase != SessionPhase::Acquiring {
            drop(inner);
            tracing::info!("session torn down during connect");
            drop(media);
            if let Err(e) = connection.disconnect().await {
                tracing::warn!("error disconnecting stale connection: {e}");
            }
            return Err(SessionError::Cancelled);
        }

        let tracks = media.into_tracks();
        inner.media = MediaState {
            audio_enabled: tracks.iter().any(|t| t.kind() == TrackKind::Audio),
            video_enabled: tracks.iter().any(|t| t.kind() == TrackKind::Video),
        };
        inner.local_tracks = tracks;

        let local = connection.local_participant();
        tracing::info!("connected as {} ({})", local.identity, local.sid);
        inner.roster.set_local(local);

        // Seed participants already in the room before any event is read.
        for participant in connection.remote_participants() {
            let sid = participant.sid.clone();
            if inner.roster.add_remote(participant) {
                if let Some(entry) = inner.roster.get(&sid) {
                    self.emitter
                        .emit(SessionEvent::ParticipantJoined(entry.info.clone()));
                }
            }
        }

        inner.connection = Some(Arc::new(connection));
        inner.event_task = Some(tokio::spawn(Self::event_loop(
            events,
            self.inner.clone(),
            attempt,
            self.dropped.clone(),
        )));
        inner.set_phase(SessionPhase::Connected);
        Ok(())
    }

    async fn is_current(&self, attempt: u64) -> bool {
        let inner = self.inner.lock().await;
        inner.attempt == attempt && inner.phase == SessionPhase::Acquiring
    }

    async fn fail_attempt(&self, attempt: u64, err: SessionError) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.attempt != attempt || inner.phase != SessionPhase::Acquiring {
            tracing::info!("discarding result of cancelled attempt: {err}");
            return Err(SessionError::Cancelled);
        }
        tracing::error!("failed to join room {}: {err}", self.grant.room_name);
        inner.set_phase(SessionPhase::Failed(err.clone()));
        Err(err)
    }

    pub async fn toggle_audio(&self) -> Result<bool, SessionError> {
        self.toggle(TrackKind::Audio).await
    }

    pub async fn toggle_video(&self) -> Result<bool, SessionError> {
        self.toggle(TrackKind::Video).await
    }

    /// Flip the enabled state of every local track of `kind`. Tracks keep
    /// running; the mirrored flag only changes once the platform accepted
    /// every call.
    async fn toggle(&self, kind: TrackKind) -> Result<bool, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.phase != SessionPhase::Connected {
            return Err(SessionError::NotConnected);
        }
        if !inner.local_tracks.iter().any(|t| t.kind() == kind) {
            return Err(SessionError::NoLocalTrack(kind));
        }
        let target = !inner.media_enabled(kind);

        let mut applied: Vec<P::Track> = Vec::new();
        for track in inner.local_tracks.iter().filter(|t| t.kind() == kind) {
            if let Err(e) = track.set_enabled(target) {
                tracing::warn!("failed to set {kind:?} track {} enabled={target}: {e}", track.sid());
                for done in &applied {
                    if let Err(e) = done.set_enabled(!target) {
                        tracing::warn!("failed to revert track {}: {e}", done.sid());
                    }
                }
                return Err(e);
            }
            applied.push(track.clone());
        }

        if let Some(local_sid) = inner.roster.local().map(|l| l.info.sid.clone()) {
            for track in &applied {
                inner.roster.set_track_enabled(&local_sid, &track.sid(), target);
            }
        }
        inner.set_media_enabled(kind, target);
        tracing::info!("{kind:?} enabled: {target}");
        Ok(target)
    }

    /// User-initiated leave: tear down, then run the navigation hook.
    ///
    /// Navigation happens after every local track was stopped, even if
    /// some teardown step failed.
    pub async fn leave(&self) -> Result<(), SessionError> {
        tracing::info!("leaving room and stopping all tracks");
        let result = self.shutdown().await;
        if let Some(on_leave) = &self.on_leave {
            on_leave();
        }
        result
    }

    /// Teardown without navigation, for when the host view goes away.
    pub async fn unmount(&self) -> Result<(), SessionError> {
        self.shutdown().await
    }

    async fn shutdown(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        match inner.phase {
            SessionPhase::Leaving | SessionPhase::Terminated => return Ok(()),
            SessionPhase::Idle | SessionPhase::Acquiring | SessionPhase::Failed(_) => {
                // A pending start sees the bumped attempt and releases its own media.
                inner.attempt += 1;
                inner.finish(SessionPhase::Terminated);
                return Ok(());
            }
            SessionPhase::Connected => {}
        }

        inner.set_phase(SessionPhase::Leaving);
        let errors = inner.release().await;
        inner.finish(SessionPhase::Terminated);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SessionError::Teardown(errors))
        }
    }

    async fn event_loop(
        mut events: UnboundedReceiver<PlatformEvent<P::Track>>,
        inner: Arc<Mutex<SessionInner<P>>>,
        attempt: u64,
        dropped: Arc<AtomicBool>,
    ) {
        while let Some(event) = events.recv().await {
            let mut guard = inner.lock().await;
            if guard.attempt != attempt || guard.phase != SessionPhase::Connected {
                tracing::debug!("session no longer connected, dropping pending room events");
                break;
            }
            let state = &mut *guard;

            match event {
                PlatformEvent::ParticipantConnected(participant) => {
                    let sid = participant.sid.clone();
                    if state.roster.add_remote(participant) {
                        if let Some(entry) = state.roster.get(&sid) {
                            tracing::info!("participant joined: {} ({sid})", entry.info.identity);
                            state
                                .emitter
                                .emit(SessionEvent::ParticipantJoined(entry.info.clone()));
                        }
                    } else {
                        tracing::debug!("duplicate join for {sid} ignored");
                    }
                }

                PlatformEvent::ParticipantDisconnected { sid } => {
                    if let Some(entry) = state.roster.remove_remote(&sid) {
                        tracing::info!("participant left: {} ({sid})", entry.info.identity);
                        state.emitter.emit(SessionEvent::ParticipantLeft(sid));
                    }
                }

                PlatformEvent::TrackSubscribed { participant_sid, mut publication, track } => {
                    if state.roster.contains(&participant_sid) {
                        publication.track = Some(track.clone());
                        state.roster.track_subscribed(&participant_sid, publication);
                        state
                            .emitter
                            .emit(SessionEvent::TrackSubscribed { participant_sid, track });
                    } else {
                        tracing::debug!("track for unknown participant {participant_sid} ignored");
                    }
                }

                PlatformEvent::TrackUnsubscribed { participant_sid, track_sid, kind } => {
                    state.roster.track_unsubscribed(&participant_sid, &track_sid);
                    state.emitter.emit(SessionEvent::TrackUnsubscribed {
                        participant_sid,
                        track_sid,
                        kind,
                    });
                }

                PlatformEvent::TrackEnabled { participant_sid, track_sid, kind } => {
                    state.track_enabled_changed(participant_sid, track_sid, kind, true);
                }

                PlatformEvent::TrackDisabled { participant_sid, track_sid, kind } => {
                    state.track_enabled_changed(participant_sid, track_sid, kind, false);
                }

                PlatformEvent::Disconnected { reason } => {
                    tracing::warn!("room disconnected by platform: {reason}");
                    // The connection is already gone; only local media is ours to release.
                    state.connection = None;
                    let mut errors = Vec::new();
                    for track in std::mem::take(&mut state.local_tracks) {
                        stop_local_track(&track, &mut errors);
                    }
                    state.close_roster();
                    state.event_task = None;
                    state.finish(SessionPhase::Failed(SessionError::Connect(format!(
                        "disconnected: {reason}"
                    ))));
                    break;
                }
            }

            if dropped.load(Ordering::SeqCst) {
                tracing::warn!("session controller dropped while connected; releasing local media");
                // Detach our own handle so release does not abort this task.
                state.event_task = None;
                let errors = state.release().await;
                if !errors.is_empty() {
                    tracing::warn!("teardown of dropped session incomplete: {}", errors.join("; "));
                }
                state.finish(SessionPhase::Terminated);
                break;
            }
        }

        tracing::info!("room event loop ended");
    }
}

impl<P: MediaPlatform> Drop for SessionController<P> {
    fn drop(&mut self) {
        // Last-resort release when the controller goes away without leave/unmount.
        let Ok(mut inner) = self.inner.try_lock() else {
            tracing::warn!("session dropped while its event task is busy; deferring release to it");
            self.dropped.store(true, Ordering::SeqCst);
            return;
        };
        if inner.local_tracks.is_empty() && inner.connection.is_none() {
            return;
        }
        tracing::warn!("session dropped while connected; releasing local media");
        let mut errors = Vec::new();
        for track in std::mem::take(&mut inner.local_tracks) {
            stop_local_track(&track, &mut errors);
        }
        if let Some(task) = inner.event_task.take() {
            task.abort();
        }
        if let Some(connection) = inner.connection.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = connection.disconnect().await {
                        tracing::warn!("error disconnecting dropped session: {e}");
                    }
                });
            }
        }
        inner.close_roster();
        inner.finish(SessionPhase::Terminated);
    }
}

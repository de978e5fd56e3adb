//! In-memory platform used by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::errors::SessionError;
use crate::events::{TrackKind, TrackSource};
use crate::platform::{
    Connection, JoinGrant, MediaPlatform, MediaRequest, ParticipantSnapshot, PlatformEvent,
    SurfaceId, TrackPublication,
};

#[derive(Debug)]
struct TrackState {
    sid: String,
    kind: TrackKind,
    enabled: AtomicBool,
    set_enabled_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    attached: Mutex<Option<SurfaceId>>,
    fail_set_enabled: AtomicBool,
    fail_stop: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct FakeTrack(Arc<TrackState>);

impl FakeTrack {
    pub fn new(sid: &str, kind: TrackKind) -> Self {
        Self(Arc::new(TrackState {
            sid: sid.to_string(),
            kind,
            enabled: AtomicBool::new(true),
            set_enabled_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            attached: Mutex::new(None),
            fail_set_enabled: AtomicBool::new(false),
            fail_stop: AtomicBool::new(false),
        }))
    }

    pub fn is_enabled(&self) -> bool {
        self.0.enabled.load(Ordering::SeqCst)
    }

    pub fn is_live(&self) -> bool {
        self.stop_calls() == 0
    }

    pub fn stop_calls(&self) -> usize {
        self.0.stop_calls.load(Ordering::SeqCst)
    }

    pub fn set_enabled_calls(&self) -> usize {
        self.0.set_enabled_calls.load(Ordering::SeqCst)
    }

    pub fn attached_to(&self) -> Option<SurfaceId> {
        self.0.attached.lock().unwrap().clone()
    }

    pub fn fail_set_enabled(&self) {
        self.0.fail_set_enabled.store(true, Ordering::SeqCst);
    }

    pub fn fail_stop(&self) {
        self.0.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn publication(&self) -> TrackPublication<FakeTrack> {
        TrackPublication {
            sid: self.0.sid.clone(),
            kind: self.0.kind,
            source: match self.0.kind {
                TrackKind::Audio => TrackSource::Microphone,
                TrackKind::Video => TrackSource::Camera,
            },
            enabled: None,
            track: Some(self.clone()),
        }
    }
}

impl crate::platform::MediaTrack for FakeTrack {
    fn sid(&self) -> String {
        self.0.sid.clone()
    }

    fn kind(&self) -> TrackKind {
        self.0.kind
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.0.set_enabled_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_set_enabled.load(Ordering::SeqCst) {
            return Err(SessionError::Platform(format!("{} refused", self.0.sid)));
        }
        self.0.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), SessionError> {
        self.0.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_stop.load(Ordering::SeqCst) {
            return Err(SessionError::Platform(format!("{} stuck", self.0.sid)));
        }
        Ok(())
    }

    fn attach(&self, surface: &SurfaceId) {
        *self.0.attached.lock().unwrap() = Some(surface.clone());
    }

    fn detach(&self, surface: &SurfaceId) {
        let mut attached = self.0.attached.lock().unwrap();
        if attached.as_ref() == Some(surface) {
            *attached = None;
        }
    }
}

pub fn remote(sid: &str, identity: &str, tracks: &[FakeTrack]) -> ParticipantSnapshot<FakeTrack> {
    ParticipantSnapshot {
        sid: sid.to_string(),
        identity: identity.to_string(),
        name: None,
        publications: tracks.iter().map(FakeTrack::publication).collect(),
    }
}

#[derive(Default)]
struct PlatformState {
    acquired: Mutex<Vec<FakeTrack>>,
    acquire_gate: Mutex<Option<oneshot::Receiver<()>>>,
    connect_gate: Mutex<Option<oneshot::Receiver<()>>>,
    acquire_error: Mutex<Option<SessionError>>,
    connect_error: Mutex<Option<SessionError>>,
    disconnect_error: Mutex<Option<SessionError>>,
    remotes: Mutex<Vec<ParticipantSnapshot<FakeTrack>>>,
    events: Mutex<Option<UnboundedSender<PlatformEvent<FakeTrack>>>>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    acquisitions: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<PlatformState>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next acquisition wait until the returned sender fires.
    pub fn hold_acquire(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.state.acquire_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn hold_connect(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.state.connect_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn fail_acquire(&self, err: SessionError) {
        *self.state.acquire_error.lock().unwrap() = Some(err);
    }

    pub fn fail_connect(&self, err: SessionError) {
        *self.state.connect_error.lock().unwrap() = Some(err);
    }

    pub fn fail_disconnect(&self, err: SessionError) {
        *self.state.disconnect_error.lock().unwrap() = Some(err);
    }

    pub fn add_remote(&self, participant: ParticipantSnapshot<FakeTrack>) {
        self.state.remotes.lock().unwrap().push(participant);
    }

    pub fn acquired(&self) -> Vec<FakeTrack> {
        self.state.acquired.lock().unwrap().clone()
    }

    pub fn local_track(&self, kind: TrackKind) -> FakeTrack {
        self.acquired()
            .into_iter()
            .find(|t| crate::platform::MediaTrack::kind(t) == kind)
            .expect("no local track of that kind")
    }

    pub fn connect_calls(&self) -> usize {
        self.state.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn send(&self, event: PlatformEvent<FakeTrack>) {
        let events = self.state.events.lock().unwrap();
        events
            .as_ref()
            .expect("not connected")
            .send(event)
            .expect("event loop gone");
    }

    /// Like `send`, but tolerates a session that already stopped listening.
    pub fn try_send(&self, event: PlatformEvent<FakeTrack>) -> bool {
        let events = self.state.events.lock().unwrap();
        events.as_ref().is_some_and(|tx| tx.send(event).is_ok())
    }
}

pub struct FakeConnection {
    state: Arc<PlatformState>,
    local: ParticipantSnapshot<FakeTrack>,
}

impl Connection for FakeConnection {
    type Track = FakeTrack;

    fn local_participant(&self) -> ParticipantSnapshot<FakeTrack> {
        self.local.clone()
    }

    fn remote_participants(&self) -> Vec<ParticipantSnapshot<FakeTrack>> {
        self.state.remotes.lock().unwrap().clone()
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.state.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        match self.state.disconnect_error.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl MediaPlatform for FakePlatform {
    type Track = FakeTrack;
    type Connection = FakeConnection;

    async fn acquire_media(&self, request: MediaRequest) -> Result<Vec<FakeTrack>, SessionError> {
        let gate = self.state.acquire_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let err = self.state.acquire_error.lock().unwrap().take();
        if let Some(err) = err {
            return Err(err);
        }
        let n = self.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        let mut tracks = Vec::new();
        if request.audio {
            tracks.push(FakeTrack::new(&format!("TR_mic_{n}"), TrackKind::Audio));
        }
        if request.video {
            tracks.push(FakeTrack::new(&format!("TR_cam_{n}"), TrackKind::Video));
        }
        self.state.acquired.lock().unwrap().extend(tracks.iter().cloned());
        Ok(tracks)
    }

    async fn connect(
        &self,
        _grant: &JoinGrant,
        tracks: &[FakeTrack],
    ) -> Result<(FakeConnection, UnboundedReceiver<PlatformEvent<FakeTrack>>), SessionError> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.state.connect_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let err = self.state.connect_error.lock().unwrap().take();
        if let Some(err) = err {
            return Err(err);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.events.lock().unwrap() = Some(tx);
        let local = ParticipantSnapshot {
            sid: "PA_local".to_string(),
            identity: "alice".to_string(),
            name: None,
            publications: tracks.iter().map(FakeTrack::publication).collect(),
        };
        Ok((
            FakeConnection {
                state: self.state.clone(),
                local,
            },
            rx,
        ))
    }
}

pub fn grant() -> JoinGrant {
    JoinGrant {
        url: "wss://video.example.test".to_string(),
        token: "test-token".to_string(),
        room_name: "8f3c1a9d".to_string(),
    }
}

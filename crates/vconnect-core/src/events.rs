use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::errors::SessionError;

/// Events emitted by the session controller to UI listeners.
///
/// Generic over the platform track handle so views can attach the
/// delivered track directly.
#[derive(Debug, Clone)]
pub enum SessionEvent<T> {
    PhaseChanged(SessionPhase),
    ParticipantJoined(ParticipantInfo),
    ParticipantLeft(String), // participant SID
    TrackSubscribed { participant_sid: String, track: T },
    TrackUnsubscribed { participant_sid: String, track_sid: String, kind: TrackKind },
    TrackEnabledChanged {
        participant_sid: String,
        track_sid: String,
        kind: TrackKind,
        enabled: bool,
    },
    LocalMediaChanged { audio_enabled: bool, video_enabled: bool },
}

/// Lifecycle phase of one room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Acquiring,
    Connected,
    Leaving,
    Terminated,
    Failed(SessionError),
}

impl SessionPhase {
    /// True while the UI should show a loading state.
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionPhase::Idle | SessionPhase::Acquiring)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SessionPhase::Terminated | SessionPhase::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
    pub name: Option<String>,
    pub is_local: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSource {
    Microphone,
    Camera,
    ScreenShare,
    Unknown,
}

/// Receives events from a session.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait SessionEventListener<T>: Send + Sync {
    fn on_event(&self, event: &SessionEvent<T>);
}

impl<T, F> SessionEventListener<T> for F
where
    F: Fn(&SessionEvent<T>) + Send + Sync,
{
    fn on_event(&self, event: &SessionEvent<T>) {
        self(event)
    }
}

/// Handle returned by [`EventEmitter::add_listener`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Dispatches session events to registered listeners.
pub struct EventEmitter<T> {
    listeners: Arc<RwLock<Vec<(ListenerId, Arc<dyn SessionEventListener<T>>)>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventEmitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener<T>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.write().push((id, listener));
        id
    }

    /// Returns false if the listener was already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.read().len()
    }

    pub fn emit(&self, event: SessionEvent<T>) {
        // Snapshot first so a listener may unregister itself while handling.
        let listeners: Vec<_> = self.read().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener.on_event(&event);
        }
    }

    fn read(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, Vec<(ListenerId, Arc<dyn SessionEventListener<T>>)>> {
        self.listeners.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, Vec<(ListenerId, Arc<dyn SessionEventListener<T>>)>> {
        self.listeners.write().unwrap_or_else(|e| e.into_inner())
    }
}

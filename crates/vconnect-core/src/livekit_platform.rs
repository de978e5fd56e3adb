//! LiveKit implementation of the media platform interface.
//!
//! Local capture is exposed as native sources: the host shell feeds PCM and
//! video frames into [`LiveKitPlatform::audio_source`] and
//! [`LiveKitPlatform::video_source`]. Rendering goes through a
//! [`SurfaceRegistry`] the shell polls for the track bound to each surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use livekit::options::TrackPublishOptions;
use livekit::prelude::*;
use livekit::track::{TrackKind as LkTrackKind, TrackSource as LkTrackSource};
use livekit::webrtc::audio_source::native::NativeAudioSource;
use livekit::webrtc::prelude::*;
use livekit::webrtc::video_source::native::NativeVideoSource;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::errors::SessionError;
use crate::events::{TrackKind, TrackSource};
use crate::platform::{
    Connection, JoinGrant, MediaPlatform, MediaRequest, MediaTrack, ParticipantSnapshot,
    PlatformEvent, SurfaceId, TrackPublication,
};

const AUDIO_SAMPLE_RATE: u32 = 48_000;
const AUDIO_CHANNELS: u32 = 1;
const AUDIO_QUEUE_SIZE_MS: u32 = 100;

/// Which track is bound to which host surface.
#[derive(Clone, Default)]
pub struct SurfaceRegistry {
    bindings: Arc<Mutex<HashMap<SurfaceId, LiveKitTrack>>>,
}

impl SurfaceRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SurfaceId, LiveKitTrack>> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track_for(&self, surface: &SurfaceId) -> Option<LiveKitTrack> {
        self.lock().get(surface).cloned()
    }

    fn bind(&self, surface: &SurfaceId, track: LiveKitTrack) {
        self.lock().insert(surface.clone(), track);
    }

    fn unbind(&self, surface: &SurfaceId, track_sid: &str) {
        let mut bindings = self.lock();
        if bindings.get(surface).is_some_and(|t| t.sid() == track_sid) {
            bindings.remove(surface);
        }
    }

    fn unbind_all(&self, track_sid: &str) {
        self.lock().retain(|_, t| t.sid() != track_sid);
    }
}

#[derive(Clone)]
pub enum TrackHandle {
    LocalAudio(LocalAudioTrack),
    LocalVideo(LocalVideoTrack),
    Remote(RemoteTrack),
}

/// A LiveKit track plus the registry its surfaces live in.
#[derive(Clone)]
pub struct LiveKitTrack {
    handle: TrackHandle,
    registry: SurfaceRegistry,
    stopped: Arc<AtomicBool>,
}

impl LiveKitTrack {
    fn new(handle: TrackHandle, registry: SurfaceRegistry) -> Self {
        Self {
            handle,
            registry,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> &TrackHandle {
        &self.handle
    }

    fn local_track(&self) -> Option<LocalTrack> {
        match &self.handle {
            TrackHandle::LocalAudio(t) => Some(LocalTrack::Audio(t.clone())),
            TrackHandle::LocalVideo(t) => Some(LocalTrack::Video(t.clone())),
            TrackHandle::Remote(_) => None,
        }
    }
}

impl MediaTrack for LiveKitTrack {
    fn sid(&self) -> String {
        let (sid, name) = match &self.handle {
            TrackHandle::LocalAudio(t) => (t.sid().to_string(), t.name()),
            TrackHandle::LocalVideo(t) => (t.sid().to_string(), t.name()),
            TrackHandle::Remote(t) => (t.sid().to_string(), t.name()),
        };
        // Local tracks only get a sid once published.
        if sid.is_empty() { name } else { sid }
    }

    fn kind(&self) -> TrackKind {
        match &self.handle {
            TrackHandle::LocalAudio(_) => TrackKind::Audio,
            TrackHandle::LocalVideo(_) => TrackKind::Video,
            TrackHandle::Remote(RemoteTrack::Audio(_)) => TrackKind::Audio,
            TrackHandle::Remote(RemoteTrack::Video(_)) => TrackKind::Video,
        }
    }

    fn set_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        if self.stopped.load(Ordering::SeqCst) && enabled {
            return Err(SessionError::Platform(format!("track {} is stopped", self.sid())));
        }
        match &self.handle {
            TrackHandle::LocalAudio(t) if enabled => t.unmute(),
            TrackHandle::LocalAudio(t) => t.mute(),
            TrackHandle::LocalVideo(t) if enabled => t.unmute(),
            TrackHandle::LocalVideo(t) => t.mute(),
            TrackHandle::Remote(t) if enabled => t.enable(),
            TrackHandle::Remote(t) => t.disable(),
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), SessionError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        match &self.handle {
            TrackHandle::LocalAudio(t) => t.rtc_track().set_enabled(false),
            TrackHandle::LocalVideo(t) => t.rtc_track().set_enabled(false),
            TrackHandle::Remote(t) => t.disable(),
        }
        self.registry.unbind_all(&self.sid());
        tracing::info!("track {} stopped", self.sid());
        Ok(())
    }

    fn attach(&self, surface: &SurfaceId) {
        self.registry.bind(surface, self.clone());
    }

    fn detach(&self, surface: &SurfaceId) {
        self.registry.unbind(surface, &self.sid());
    }
}

fn lk_kind(kind: LkTrackKind) -> TrackKind {
    match kind {
        LkTrackKind::Audio => TrackKind::Audio,
        LkTrackKind::Video => TrackKind::Video,
    }
}

fn lk_source(source: LkTrackSource) -> TrackSource {
    match source {
        LkTrackSource::Microphone => TrackSource::Microphone,
        LkTrackSource::Camera => TrackSource::Camera,
        LkTrackSource::Screenshare => TrackSource::ScreenShare,
        _ => TrackSource::Unknown,
    }
}

fn non_empty(name: String) -> Option<String> {
    if name.is_empty() { None } else { Some(name) }
}

fn remote_publication(
    publication: &RemoteTrackPublication,
    registry: &SurfaceRegistry,
) -> TrackPublication<LiveKitTrack> {
    TrackPublication {
        sid: publication.sid().to_string(),
        kind: lk_kind(publication.kind()),
        source: lk_source(publication.source()),
        enabled: Some(!publication.is_muted()),
        track: publication
            .track()
            .map(|t| LiveKitTrack::new(TrackHandle::Remote(t), registry.clone())),
    }
}

fn remote_snapshot(
    participant: &RemoteParticipant,
    registry: &SurfaceRegistry,
) -> ParticipantSnapshot<LiveKitTrack> {
    ParticipantSnapshot {
        sid: participant.sid().to_string(),
        identity: participant.identity().to_string(),
        name: non_empty(participant.name().to_string()),
        publications: participant
            .track_publications()
            .values()
            .map(|p| remote_publication(p, registry))
            .collect(),
    }
}

/// LiveKit-backed [`MediaPlatform`].
#[derive(Clone, Default)]
pub struct LiveKitPlatform {
    registry: SurfaceRegistry,
    audio_source: Arc<Mutex<Option<NativeAudioSource>>>,
    video_source: Arc<Mutex<Option<NativeVideoSource>>>,
}

impl LiveKitPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surfaces(&self) -> &SurfaceRegistry {
        &self.registry
    }

    /// Source the host feeds captured PCM frames into.
    pub fn audio_source(&self) -> Option<NativeAudioSource> {
        self.audio_source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Source the host feeds captured camera frames into.
    pub fn video_source(&self) -> Option<NativeVideoSource> {
        self.video_source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn event_loop(
        mut events: UnboundedReceiver<RoomEvent>,
        tx: UnboundedSender<PlatformEvent<LiveKitTrack>>,
        registry: SurfaceRegistry,
    ) {
        while let Some(event) = events.recv().await {
            let translated = match event {
                RoomEvent::ParticipantConnected(participant) => Some(
                    PlatformEvent::ParticipantConnected(remote_snapshot(&participant, &registry)),
                ),

                RoomEvent::ParticipantDisconnected(participant) => {
                    Some(PlatformEvent::ParticipantDisconnected {
                        sid: participant.sid().to_string(),
                    })
                }

                RoomEvent::TrackSubscribed { track, publication, participant } => {
                    Some(PlatformEvent::TrackSubscribed {
                        participant_sid: participant.sid().to_string(),
                        publication: remote_publication(&publication, &registry),
                        track: LiveKitTrack::new(TrackHandle::Remote(track), registry.clone()),
                    })
                }

                RoomEvent::TrackUnsubscribed { track, publication, participant } => {
                    let track_sid = track.sid().to_string();
                    registry.unbind_all(&track_sid);
                    Some(PlatformEvent::TrackUnsubscribed {
                        participant_sid: participant.sid().to_string(),
                        track_sid,
                        kind: lk_kind(publication.kind()),
                    })
                }

                RoomEvent::TrackMuted { participant, publication } => match participant {
                    Participant::Remote(p) => Some(PlatformEvent::TrackDisabled {
                        participant_sid: p.sid().to_string(),
                        track_sid: publication.sid().to_string(),
                        kind: lk_kind(publication.kind()),
                    }),
                    Participant::Local(_) => None,
                },

                RoomEvent::TrackUnmuted { participant, publication } => match participant {
                    Participant::Remote(p) => Some(PlatformEvent::TrackEnabled {
                        participant_sid: p.sid().to_string(),
                        track_sid: publication.sid().to_string(),
                        kind: lk_kind(publication.kind()),
                    }),
                    Participant::Local(_) => None,
                },

                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    Some(PlatformEvent::Disconnected {
                        reason: format!("{reason:?}"),
                    })
                }

                _ => None,
            };

            if let Some(event) = translated {
                if tx.send(event).is_err() {
                    tracing::debug!("session stopped listening, ending room event loop");
                    break;
                }
            }
        }
    }
}

pub struct LiveKitConnection {
    room: Room,
    registry: SurfaceRegistry,
}

impl LiveKitConnection {
    pub fn room(&self) -> &Room {
        &self.room
    }
}

impl Connection for LiveKitConnection {
    type Track = LiveKitTrack;

    fn local_participant(&self) -> ParticipantSnapshot<LiveKitTrack> {
        let local = self.room.local_participant();
        let publications = local
            .track_publications()
            .values()
            .map(|p| TrackPublication {
                sid: p.sid().to_string(),
                kind: lk_kind(p.kind()),
                source: lk_source(p.source()),
                enabled: Some(!p.is_muted()),
                track: p.track().map(|t| {
                    let handle = match t {
                        LocalTrack::Audio(a) => TrackHandle::LocalAudio(a),
                        LocalTrack::Video(v) => TrackHandle::LocalVideo(v),
                    };
                    LiveKitTrack::new(handle, self.registry.clone())
                }),
            })
            .collect();
        ParticipantSnapshot {
            sid: local.sid().to_string(),
            identity: local.identity().to_string(),
            name: non_empty(local.name().to_string()),
            publications,
        }
    }

    fn remote_participants(&self) -> Vec<ParticipantSnapshot<LiveKitTrack>> {
        self.room
            .remote_participants()
            .values()
            .map(|p| remote_snapshot(p, &self.registry))
            .collect()
    }

    async fn disconnect(&self) -> Result<(), SessionError> {
        self.room
            .close()
            .await
            .map_err(|e| SessionError::Platform(format!("close room: {e}")))
    }
}

impl MediaPlatform for LiveKitPlatform {
    type Track = LiveKitTrack;
    type Connection = LiveKitConnection;

    async fn acquire_media(&self, request: MediaRequest) -> Result<Vec<LiveKitTrack>, SessionError> {
        let mut tracks = Vec::new();

        if request.audio {
            let source = NativeAudioSource::new(
                AudioSourceOptions {
                    echo_cancellation: true,
                    noise_suppression: true,
                    auto_gain_control: true,
                },
                AUDIO_SAMPLE_RATE,
                AUDIO_CHANNELS,
                AUDIO_QUEUE_SIZE_MS,
            );
            let track = LocalAudioTrack::create_audio_track(
                "microphone",
                RtcAudioSource::Native(source.clone()),
            );
            *self.audio_source.lock().unwrap_or_else(|e| e.into_inner()) = Some(source);
            tracks.push(LiveKitTrack::new(
                TrackHandle::LocalAudio(track),
                self.registry.clone(),
            ));
        }

        if request.video {
            // 4:3 capture at the requested width.
            let source = NativeVideoSource::new(
                VideoResolution {
                    width: request.video_width,
                    height: request.video_width * 3 / 4,
                },
                false,
            );
            let track = LocalVideoTrack::create_video_track(
                "camera",
                RtcVideoSource::Native(source.clone()),
            );
            *self.video_source.lock().unwrap_or_else(|e| e.into_inner()) = Some(source);
            tracks.push(LiveKitTrack::new(
                TrackHandle::LocalVideo(track),
                self.registry.clone(),
            ));
        }

        tracing::info!("created {} local track(s)", tracks.len());
        Ok(tracks)
    }

    async fn connect(
        &self,
        grant: &JoinGrant,
        tracks: &[LiveKitTrack],
    ) -> Result<(LiveKitConnection, UnboundedReceiver<PlatformEvent<LiveKitTrack>>), SessionError>
    {
        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, events) = Room::connect(&grant.url, &grant.token, options)
            .await
            .map_err(|e| SessionError::Connect(e.to_string()))?;

        for track in tracks {
            let Some(local) = track.local_track() else {
                continue;
            };
            let source = match track.kind() {
                TrackKind::Audio => LkTrackSource::Microphone,
                TrackKind::Video => LkTrackSource::Camera,
            };
            let published = room
                .local_participant()
                .publish_track(
                    local,
                    TrackPublishOptions {
                        source,
                        ..Default::default()
                    },
                )
                .await;
            if let Err(e) = published {
                if let Err(close_err) = room.close().await {
                    tracing::warn!("error closing room after failed publish: {close_err}");
                }
                return Err(SessionError::Connect(format!("publish {:?}: {e}", track.kind())));
            }
            tracing::info!("{:?} track published", track.kind());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::event_loop(events, tx, self.registry.clone()));

        Ok((
            LiveKitConnection {
                room,
                registry: self.registry.clone(),
            },
            rx,
        ))
    }
}

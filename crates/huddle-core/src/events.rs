use std::sync::Arc;

use base64::Engine as _;
use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::DataPayload;
use crate::errors::ErrorDetail;
use crate::participants::{Participant, ParticipantInfo};
use crate::stats::StatsReport;
use crate::tracks::{MediaKind, TrackKind, TrackPublication};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_name: String,
    pub room_sid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSnapshot {
    pub identity: String,
    pub sid: String,
}

impl From<&ParticipantInfo> for ParticipantSnapshot {
    fn from(info: &ParticipantInfo) -> Self {
        Self {
            identity: info.identity.clone(),
            sid: info.sid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    pub track_sid: String,
    pub track_name: String,
    pub enabled: bool,
}

impl From<&TrackPublication> for TrackSnapshot {
    fn from(p: &TrackPublication) -> Self {
        Self {
            track_sid: p.track_sid.clone(),
            track_name: p.track_name.clone(),
            enabled: p.enabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantTracksSnapshot {
    pub identity: String,
    pub sid: String,
    pub audio_tracks: Vec<TrackSnapshot>,
    pub video_tracks: Vec<TrackSnapshot>,
    pub data_tracks: Vec<TrackSnapshot>,
}

impl From<&Participant> for ParticipantTracksSnapshot {
    fn from(p: &Participant) -> Self {
        let tracks = |kind: TrackKind| -> Vec<TrackSnapshot> {
            p.publications_of(kind).map(TrackSnapshot::from).collect()
        };
        Self {
            identity: p.info.identity.clone(),
            sid: p.info.sid.clone(),
            audio_tracks: tracks(TrackKind::Audio),
            video_tracks: tracks(TrackKind::Video),
            data_tracks: tracks(TrackKind::Data),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub sid: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_region: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<String>,
    pub dominant_speaker: Option<ParticipantTracksSnapshot>,
    pub remote_participants: Vec<ParticipantTracksSnapshot>,
    pub local_participant: Option<ParticipantTracksSnapshot>,
}

/// Notifications delivered to the host, in callback order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected {
        room: RoomRef,
        participants: Vec<ParticipantSnapshot>,
        local_participant: ParticipantSnapshot,
    },
    ConnectFailure {
        room: Option<RoomRef>,
        error: ErrorDetail,
    },
    Disconnected {
        room: RoomRef,
        participant: Option<String>,
        error: Option<ErrorDetail>,
    },
    Reconnecting {
        room: RoomRef,
        error: ErrorDetail,
    },
    Reconnected {
        room: RoomRef,
    },
    RecordingStarted {
        room: RoomRef,
    },
    RecordingStopped {
        room: RoomRef,
    },
    ParticipantConnected {
        room: RoomRef,
        participant: ParticipantSnapshot,
    },
    ParticipantDisconnected {
        room: RoomRef,
        participant: ParticipantSnapshot,
    },
    DominantSpeakerChanged {
        room: RoomRef,
        participant: Option<ParticipantSnapshot>,
    },
    TrackAdded {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    TrackRemoved {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    TrackEnabled {
        kind: MediaKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    TrackDisabled {
        kind: MediaKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    LocalTrackPublished {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    LocalTrackPublicationFailed {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        error: ErrorDetail,
    },
    RemoteTrackPublished {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    RemoteTrackUnpublished {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
    },
    RemoteTrackSubscriptionFailed {
        kind: TrackKind,
        participant: ParticipantSnapshot,
        track: TrackSnapshot,
        error: ErrorDetail,
    },
    DataTrackMessageReceived {
        track_sid: String,
        message: DataPayload,
    },
    DataTrackSendFailed {
        error: ErrorDetail,
    },
    StatsReceived(StatsReport),
    NetworkQualityLevelsChanged {
        participant: ParticipantSnapshot,
        is_local_user: bool,
        quality: i32,
    },
    LocalParticipantSupportedCodecs {
        supported_codecs: Vec<String>,
    },
    CameraSwitched {
        is_back_camera: bool,
    },
    CameraDidStart,
    CameraWasInterrupted {
        reason: String,
    },
    CameraInterruptionEnded,
    CameraDidStopRunning {
        error: String,
    },
    VideoChanged {
        video_enabled: bool,
    },
    AudioChanged {
        audio_enabled: bool,
    },
    DataChanged {
        data_enabled: bool,
    },
    ScreenShareChanged {
        screen_share_enabled: bool,
    },
    RoomFetched(Option<RoomSnapshot>),
}

impl SessionEvent {
    /// Host-facing event name.
    pub fn name(&self) -> &'static str {
        use MediaKind as M;
        use TrackKind as K;
        match self {
            Self::Connected { .. } => "onRoomDidConnect",
            Self::ConnectFailure { .. } => "onRoomDidFailToConnect",
            Self::Disconnected { .. } => "onRoomDidDisconnect",
            Self::Reconnecting { .. } => "onRoomIsReconnecting",
            Self::Reconnected { .. } => "onRoomDidReconnect",
            Self::RecordingStarted { .. } => "onRecordingStarted",
            Self::RecordingStopped { .. } => "onRecordingStopped",
            Self::ParticipantConnected { .. } => "onRoomParticipantDidConnect",
            Self::ParticipantDisconnected { .. } => "onRoomParticipantDidDisconnect",
            Self::DominantSpeakerChanged { .. } => "onDominantSpeakerDidChange",
            Self::TrackAdded { kind, .. } => match kind {
                K::Audio => "onParticipantAddedAudioTrack",
                K::Video => "onParticipantAddedVideoTrack",
                K::Data => "onParticipantAddedDataTrack",
            },
            Self::TrackRemoved { kind, .. } => match kind {
                K::Audio => "onParticipantRemovedAudioTrack",
                K::Video => "onParticipantRemovedVideoTrack",
                K::Data => "onParticipantRemovedDataTrack",
            },
            Self::TrackEnabled { kind, .. } => match kind {
                M::Audio => "onParticipantEnabledAudioTrack",
                M::Video => "onParticipantEnabledVideoTrack",
            },
            Self::TrackDisabled { kind, .. } => match kind {
                M::Audio => "onParticipantDisabledAudioTrack",
                M::Video => "onParticipantDisabledVideoTrack",
            },
            Self::LocalTrackPublished { kind, .. } => match kind {
                K::Audio => "onLocalAudioTrackPublished",
                K::Video => "onLocalVideoTrackPublished",
                K::Data => "onLocalDataTrackPublished",
            },
            Self::LocalTrackPublicationFailed { kind, .. } => match kind {
                K::Audio => "onLocalAudioTrackPublicationFailed",
                K::Video => "onLocalVideoTrackPublicationFailed",
                K::Data => "onLocalDataTrackPublicationFailed",
            },
            Self::RemoteTrackPublished { kind, .. } => match kind {
                K::Audio => "onRemoteAudioTrackPublished",
                K::Video => "onRemoteVideoTrackPublished",
                K::Data => "onRemoteDataTrackPublished",
            },
            Self::RemoteTrackUnpublished { kind, .. } => match kind {
                K::Audio => "onRemoteAudioTrackUnpublished",
                K::Video => "onRemoteVideoTrackUnpublished",
                K::Data => "onRemoteDataTrackUnpublished",
            },
            Self::RemoteTrackSubscriptionFailed { kind, .. } => match kind {
                K::Audio => "onRemoteAudioTrackSubscriptionFailed",
                K::Video => "onRemoteVideoTrackSubscriptionFailed",
                K::Data => "onRemoteDataTrackSubscriptionFailed",
            },
            Self::DataTrackMessageReceived { .. } => "onDataTrackMessageReceived",
            Self::DataTrackSendFailed { .. } => "onDataTrackSendFailed",
            Self::StatsReceived(_) => "onStatsReceived",
            Self::NetworkQualityLevelsChanged { .. } => "onNetworkQualityLevelsChanged",
            Self::LocalParticipantSupportedCodecs { .. } => "onLocalParticipantSupportedCodecs",
            Self::CameraSwitched { .. } => "onCameraSwitched",
            Self::CameraDidStart => "onCameraDidStart",
            Self::CameraWasInterrupted { .. } => "onCameraWasInterrupted",
            Self::CameraInterruptionEnded => "onCameraInterruptionEnded",
            Self::CameraDidStopRunning { .. } => "onCameraDidStopRunning",
            Self::VideoChanged { .. } => "onVideoChanged",
            Self::AudioChanged { .. } => "onAudioChanged",
            Self::DataChanged { .. } => "onDataChanged",
            Self::ScreenShareChanged { .. } => "onScreenShareChanged",
            Self::RoomFetched(_) => "onRoomFetched",
        }
    }

    /// Structured payload as the host bridge expects it.
    pub fn payload(&self) -> Value {
        match self {
            Self::Connected { room, participants, local_participant } => json!({
                "roomName": room.room_name,
                "roomSid": room.room_sid,
                "participants": participants,
                "localParticipant": local_participant,
            }),
            Self::ConnectFailure { room, error } => {
                let mut payload = serde_json::to_value(error).unwrap_or_default();
                if let Some(room) = room {
                    merge(&mut payload, room);
                }
                payload
            }
            Self::Disconnected { room, participant, error } => {
                let mut payload = room_payload(room);
                if let Some(identity) = participant {
                    payload["participant"] = json!(identity);
                }
                if let Some(error) = error {
                    payload["error"] = json!(error.error);
                }
                payload
            }
            Self::Reconnecting { room, error } => {
                let mut payload = room_payload(room);
                payload["error"] = json!(error.error);
                payload
            }
            Self::Reconnected { room }
            | Self::RecordingStarted { room }
            | Self::RecordingStopped { room } => room_payload(room),
            Self::ParticipantConnected { room, participant }
            | Self::ParticipantDisconnected { room, participant } => {
                let mut payload = room_payload(room);
                payload["participant"] = json!(participant);
                payload
            }
            Self::DominantSpeakerChanged { room, participant } => {
                let mut payload = room_payload(room);
                payload["participant"] = match participant {
                    Some(p) => json!(p),
                    None => json!(""),
                };
                payload
            }
            Self::TrackAdded { participant, track, .. }
            | Self::TrackRemoved { participant, track, .. }
            | Self::TrackEnabled { participant, track, .. }
            | Self::TrackDisabled { participant, track, .. }
            | Self::LocalTrackPublished { participant, track, .. }
            | Self::RemoteTrackPublished { participant, track, .. }
            | Self::RemoteTrackUnpublished { participant, track, .. } => {
                json!({ "participant": participant, "track": track })
            }
            Self::LocalTrackPublicationFailed { participant, error, .. } => {
                let mut payload = json!({ "participant": participant });
                merge(&mut payload, error);
                payload
            }
            Self::RemoteTrackSubscriptionFailed { participant, track, error, .. } => {
                let mut payload = json!({ "participant": participant, "track": track });
                merge(&mut payload, error);
                payload
            }
            Self::DataTrackMessageReceived { track_sid, message } => match message {
                DataPayload::Text(text) => json!({
                    "trackSid": track_sid,
                    "message": text,
                    "isBinary": false,
                }),
                DataPayload::Binary(bytes) => json!({
                    "trackSid": track_sid,
                    "payloadBase64": base64::engine::general_purpose::STANDARD.encode(bytes),
                    "isBinary": true,
                }),
            },
            Self::DataTrackSendFailed { error } => serde_json::to_value(error).unwrap_or_default(),
            Self::StatsReceived(report) => serde_json::to_value(report).unwrap_or_default(),
            Self::NetworkQualityLevelsChanged { participant, is_local_user, quality } => json!({
                "participant": participant,
                "isLocalUser": is_local_user,
                "quality": quality,
            }),
            Self::LocalParticipantSupportedCodecs { supported_codecs } => {
                json!({ "supportedCodecs": supported_codecs })
            }
            Self::CameraSwitched { is_back_camera } => json!({ "isBackCamera": is_back_camera }),
            Self::CameraDidStart | Self::CameraInterruptionEnded => Value::Null,
            Self::CameraWasInterrupted { reason } => json!({ "reason": reason }),
            Self::CameraDidStopRunning { error } => json!({ "error": error }),
            Self::VideoChanged { video_enabled } => json!({ "videoEnabled": video_enabled }),
            Self::AudioChanged { audio_enabled } => json!({ "audioEnabled": audio_enabled }),
            Self::DataChanged { data_enabled } => json!({ "dataEnabled": data_enabled }),
            Self::ScreenShareChanged { screen_share_enabled } => {
                json!({ "screenShareEnabled": screen_share_enabled })
            }
            Self::RoomFetched(room) => match room {
                Some(room) => serde_json::to_value(room).unwrap_or_default(),
                None => json!({}),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "event": self.name(), "payload": self.payload() })
    }

    /// Track SID this event refers to, if any.
    pub fn track_sid(&self) -> Option<&str> {
        match self {
            Self::TrackAdded { track, .. }
            | Self::TrackRemoved { track, .. }
            | Self::TrackEnabled { track, .. }
            | Self::TrackDisabled { track, .. }
            | Self::LocalTrackPublished { track, .. }
            | Self::RemoteTrackPublished { track, .. }
            | Self::RemoteTrackUnpublished { track, .. }
            | Self::RemoteTrackSubscriptionFailed { track, .. } => Some(&track.track_sid),
            Self::DataTrackMessageReceived { track_sid, .. } => Some(track_sid),
            _ => None,
        }
    }
}

fn room_payload(room: &RoomRef) -> Value {
    json!({ "roomName": room.room_name, "roomSid": room.room_sid })
}

fn merge(target: &mut Value, extra: &impl Serialize) {
    if let (Value::Object(target), Ok(Value::Object(extra))) =
        (target, serde_json::to_value(extra))
    {
        target.extend(extra);
    }
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from the owner task and the
/// data-track worker).
pub trait SessionEventListener: Send + Sync {
    fn on_event(&self, event: SessionEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone)]
pub struct EventEmitter {
    listeners: Arc<std::sync::RwLock<Vec<Arc<dyn SessionEventListener>>>>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(std::sync::RwLock::new(Vec::new())),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn SessionEventListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!("emit {}", event.name());
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Listener that records every event for later inspection.
    #[derive(Clone, Default)]
    pub(crate) struct EventCapture {
        events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl SessionEventListener for EventCapture {
        fn on_event(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl EventCapture {
        pub(crate) fn attach(emitter: &EventEmitter) -> Self {
            let capture = Self::default();
            emitter.add_listener(Arc::new(capture.clone()));
            capture
        }

        pub(crate) fn events(&self) -> Vec<SessionEvent> {
            self.events.lock().unwrap().clone()
        }

        pub(crate) fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(|e| e.name()).collect()
        }

        pub(crate) fn take(&self) -> Vec<SessionEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        pub(crate) fn count(&self, name: &str) -> usize {
            self.names().iter().filter(|n| **n == name).count()
        }
    }
}

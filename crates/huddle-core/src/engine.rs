//! Capability interface to the media engine.
//!
//! The engine owns capture, encoding, transport and statistics. The session
//! controller drives it through [`MediaEngine`]; everything the engine
//! reports back arrives asynchronously as an [`EngineEvent`] pushed into an
//! [`EngineEventSink`], from whatever thread the engine happens to use.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::data_track::DataTrackWorker;
use crate::errors::EngineError;
use crate::participants::ParticipantInfo;
use crate::stats::RawStatsReport;
use crate::tracks::{EngineTrackId, TrackKind, TrackPublication};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Front,
    Back,
}

impl CameraFacing {
    pub fn opposite(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub facing: CameraFacing,
}

/// Hardware H.264 support reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareCodecs {
    pub h264_encoder: bool,
    pub h264_decoder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Vp8,
    H264,
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vp8 => f.write_str("VP8"),
            Self::H264 => f.write_str("H264"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConnectOptions {
    pub access_token: String,
    pub room_name: Option<String>,
    pub audio_tracks: Vec<EngineTrackId>,
    pub video_tracks: Vec<EngineTrackId>,
    pub preferred_video_codecs: Vec<VideoCodec>,
    pub dominant_speaker: bool,
    pub network_quality: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPayload {
    Text(String),
    Binary(Vec<u8>),
}

/// Commands the controller can issue to the media engine.
///
/// Calls are fire-and-forget: completion, failure and any asynchronous
/// answer come back as [`EngineEvent`]s through the sink the engine was
/// built with. Only track creation reports failure synchronously.
pub trait MediaEngine: Send {
    fn hardware_codecs(&self) -> HardwareCodecs;
    fn camera_devices(&self) -> Vec<CameraDevice>;

    fn create_audio_track(&mut self, name: &str, enabled: bool)
    -> Result<EngineTrackId, EngineError>;
    fn create_camera_track(
        &mut self,
        device: &CameraDevice,
        name: &str,
        enabled: bool,
    ) -> Result<EngineTrackId, EngineError>;
    fn create_screen_track(&mut self, name: &str) -> Result<EngineTrackId, EngineError>;
    fn create_data_track(&mut self, name: &str) -> Result<EngineTrackId, EngineError>;
    fn set_track_enabled(&mut self, track: EngineTrackId, enabled: bool);
    fn switch_camera(&mut self, track: EngineTrackId, device: &CameraDevice);
    fn release_track(&mut self, track: EngineTrackId);

    fn connect(&mut self, options: EngineConnectOptions);
    fn disconnect(&mut self);
    fn publish_track(&mut self, track: EngineTrackId);
    fn unpublish_track(&mut self, track: EngineTrackId);

    /// Answered by [`EngineEvent::ScreenCapturePermission`].
    fn request_screen_capture(&mut self);
    fn start_capture_service(&mut self);
    fn stop_screen_capture(&mut self, track: EngineTrackId);
    fn stop_capture_service(&mut self);

    fn set_remote_audio_playback(&mut self, track_sid: &str, enabled: bool);
    fn send_data(&mut self, track: EngineTrackId, payload: DataPayload);

    /// Answered by [`EngineEvent::Stats`].
    fn request_stats(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoomInfo {
    pub sid: String,
    pub name: String,
    pub media_region: Option<String>,
}

/// A remote participant together with the publications it already has.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteParticipantState {
    pub info: ParticipantInfo,
    pub publications: Vec<TrackPublication>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQualityLevel {
    Unknown,
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
}

impl NetworkQualityLevel {
    /// `-1` for unknown, otherwise `0..=5`.
    pub fn score(self) -> i32 {
        match self {
            Self::Unknown => -1,
            Self::Zero => 0,
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomCallback {
    Connected {
        room: RoomInfo,
        local: ParticipantInfo,
        remotes: Vec<RemoteParticipantState>,
    },
    ConnectFailure { room: RoomInfo, error: EngineError },
    Reconnecting(EngineError),
    Reconnected,
    Disconnected(Option<EngineError>),
    ParticipantConnected(RemoteParticipantState),
    ParticipantDisconnected(ParticipantInfo),
    RecordingStarted,
    RecordingStopped,
    DominantSpeakerChanged(Option<ParticipantInfo>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalCallback {
    TrackPublished {
        track: EngineTrackId,
        publication: TrackPublication,
    },
    PublicationFailed {
        track: EngineTrackId,
        kind: TrackKind,
        error: EngineError,
    },
    NetworkQualityLevelChanged(NetworkQualityLevel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCallback {
    TrackPublished(TrackPublication),
    TrackUnpublished(TrackPublication),
    TrackSubscribed(TrackPublication),
    TrackUnsubscribed(TrackPublication),
    SubscriptionFailed {
        publication: TrackPublication,
        error: EngineError,
    },
    TrackEnabled(TrackPublication),
    TrackDisabled(TrackPublication),
    NetworkQualityLevelChanged(NetworkQualityLevel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCallback {
    FirstFrameAvailable,
    Switched { device_id: String },
    Error { code: i32 },
}

/// Everything the engine reports back, grouped by the collaborator that
/// raised it.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Room(RoomCallback),
    Local(LocalCallback),
    Remote {
        participant: ParticipantInfo,
        callback: RemoteCallback,
    },
    Camera(CameraCallback),
    ScreenCapturePermission { granted: bool },
    Stats(Vec<RawStatsReport>),
}

/// Handle the engine uses to report back. Cheap to clone and safe to use
/// from any thread.
///
/// Control callbacks are queued for the session owner task; data-track
/// messages go straight to the data-track worker.
#[derive(Clone)]
pub struct EngineEventSink {
    callbacks: mpsc::UnboundedSender<EngineEvent>,
    data: DataTrackWorker,
}

impl EngineEventSink {
    pub fn send(&self, event: EngineEvent) {
        if self.callbacks.send(event).is_err() {
            tracing::debug!("engine callback dropped: session owner is gone");
        }
    }

    pub fn data_message(&self, track_sid: impl Into<String>, payload: DataPayload) {
        self.data.deliver(track_sid.into(), payload);
    }
}

/// Receiving end of the control callbacks, drained by the owner task.
pub struct EngineInbox {
    rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl EngineInbox {
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }
}

pub fn engine_channel(data: DataTrackWorker) -> (EngineEventSink, EngineInbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EngineEventSink { callbacks: tx, data }, EngineInbox { rx })
}

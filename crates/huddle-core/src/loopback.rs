//! In-memory [`MediaEngine`] that answers every request immediately through
//! its sink and records the calls it received.
//!
//! Used by the unit tests and by the demo host; nothing leaves the process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::engine::{
    CameraDevice, CameraFacing, DataPayload, EngineConnectOptions, EngineEvent, EngineEventSink,
    HardwareCodecs, LocalCallback, MediaEngine, RemoteParticipantState, RoomCallback, RoomInfo,
};
use crate::errors::EngineError;
use crate::participants::ParticipantInfo;
use crate::stats::{
    BaseTrackStats, Dimensions, LocalAudioTrackStats, LocalVideoTrackStats, RawStatsReport,
};
use crate::tracks::{EngineTrackId, TrackKind, TrackPublication};

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub cameras: Vec<CameraDevice>,
    pub hardware_codecs: HardwareCodecs,
    pub grant_screen_capture: bool,
    /// Answer `connect` with `Connected` right away. When false the caller
    /// drives the room callbacks through the sink.
    pub auto_connect: bool,
    pub connect_error: Option<EngineError>,
    pub remote_participants: Vec<RemoteParticipantState>,
    /// Camera devices whose track creation fails.
    pub broken_cameras: Vec<String>,
    pub identity: String,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            cameras: vec![
                CameraDevice {
                    id: "camera-front".into(),
                    facing: CameraFacing::Front,
                },
                CameraDevice {
                    id: "camera-back".into(),
                    facing: CameraFacing::Back,
                },
            ],
            hardware_codecs: HardwareCodecs::default(),
            grant_screen_capture: true,
            auto_connect: true,
            connect_error: None,
            remote_participants: Vec::new(),
            broken_cameras: Vec::new(),
            identity: "loopback".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateAudioTrack(EngineTrackId),
    CreateCameraTrack { track: EngineTrackId, device_id: String },
    CreateScreenTrack(EngineTrackId),
    CreateDataTrack(EngineTrackId),
    SetTrackEnabled { track: EngineTrackId, enabled: bool },
    SwitchCamera { track: EngineTrackId, device_id: String },
    ReleaseTrack(EngineTrackId),
    Connect(EngineConnectOptions),
    Disconnect,
    PublishTrack(EngineTrackId),
    UnpublishTrack(EngineTrackId),
    RequestScreenCapture,
    StartCaptureService,
    StopScreenCapture(EngineTrackId),
    StopCaptureService,
    SetRemoteAudioPlayback { track_sid: String, enabled: bool },
    SendData { track: EngineTrackId, payload: DataPayload },
    RequestStats,
}

/// Shared view of the calls a [`LoopbackEngine`] received.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<EngineCall>>>,
}

impl CallLog {
    fn push(&self, call: EngineCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn all(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn position(&self, call: &EngineCall) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == call)
    }

    pub fn count(&self, matches: impl Fn(&EngineCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }
}

#[derive(Debug, Clone)]
struct LoopbackTrack {
    name: String,
    kind: TrackKind,
    enabled: bool,
}

pub struct LoopbackEngine {
    config: LoopbackConfig,
    sink: EngineEventSink,
    log: CallLog,
    next_id: u64,
    tracks: HashMap<EngineTrackId, LoopbackTrack>,
    connected: bool,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig, sink: EngineEventSink) -> Self {
        Self {
            config,
            sink,
            log: CallLog::default(),
            next_id: 1,
            tracks: HashMap::new(),
            connected: false,
        }
    }

    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    fn allocate(&mut self, name: &str, kind: TrackKind, enabled: bool) -> EngineTrackId {
        let id = EngineTrackId(self.next_id);
        self.next_id += 1;
        self.tracks.insert(
            id,
            LoopbackTrack {
                name: name.to_string(),
                kind,
                enabled,
            },
        );
        id
    }

    fn confirm_publish(&self, track: EngineTrackId) {
        let Some(t) = self.tracks.get(&track) else {
            return;
        };
        let publication = TrackPublication::new(new_sid("MT"), t.name.clone(), t.kind, t.enabled);
        self.sink
            .send(EngineEvent::Local(LocalCallback::TrackPublished { track, publication }));
    }

    fn stats_report(&self) -> RawStatsReport {
        let timestamp = chrono::Utc::now().timestamp_millis() as f64;
        let mut report = RawStatsReport {
            peer_connection_id: "loopback-pc".into(),
            ..Default::default()
        };
        for (id, track) in &self.tracks {
            let base = BaseTrackStats {
                track_sid: format!("local-{}", id.0),
                codec: match track.kind {
                    TrackKind::Audio => "opus".into(),
                    _ => "VP8".into(),
                },
                packets_lost: 0,
                ssrc: id.0.to_string(),
                timestamp,
            };
            match track.kind {
                TrackKind::Audio => report.local_audio.push(LocalAudioTrackStats {
                    base,
                    ..Default::default()
                }),
                TrackKind::Video => report.local_video.push(LocalVideoTrackStats {
                    base,
                    dimensions: Dimensions {
                        width: 352,
                        height: 288,
                    },
                    frame_rate: 15,
                    ..Default::default()
                }),
                TrackKind::Data => {}
            }
        }
        report
    }
}

fn new_sid(prefix: &str) -> String {
    format!("{prefix}{}", uuid::Uuid::new_v4().simple())
}

impl MediaEngine for LoopbackEngine {
    fn hardware_codecs(&self) -> HardwareCodecs {
        self.config.hardware_codecs
    }

    fn camera_devices(&self) -> Vec<CameraDevice> {
        self.config.cameras.clone()
    }

    fn create_audio_track(
        &mut self,
        name: &str,
        enabled: bool,
    ) -> Result<EngineTrackId, EngineError> {
        let id = self.allocate(name, TrackKind::Audio, enabled);
        self.log.push(EngineCall::CreateAudioTrack(id));
        Ok(id)
    }

    fn create_camera_track(
        &mut self,
        device: &CameraDevice,
        name: &str,
        enabled: bool,
    ) -> Result<EngineTrackId, EngineError> {
        if self.config.broken_cameras.contains(&device.id) {
            return Err(EngineError::new(-1, format!("camera {} failed to open", device.id), ""));
        }
        let id = self.allocate(name, TrackKind::Video, enabled);
        self.log.push(EngineCall::CreateCameraTrack {
            track: id,
            device_id: device.id.clone(),
        });
        Ok(id)
    }

    fn create_screen_track(&mut self, name: &str) -> Result<EngineTrackId, EngineError> {
        let id = self.allocate(name, TrackKind::Video, true);
        self.log.push(EngineCall::CreateScreenTrack(id));
        Ok(id)
    }

    fn create_data_track(&mut self, name: &str) -> Result<EngineTrackId, EngineError> {
        let id = self.allocate(name, TrackKind::Data, true);
        self.log.push(EngineCall::CreateDataTrack(id));
        Ok(id)
    }

    fn set_track_enabled(&mut self, track: EngineTrackId, enabled: bool) {
        if let Some(t) = self.tracks.get_mut(&track) {
            t.enabled = enabled;
        }
        self.log.push(EngineCall::SetTrackEnabled { track, enabled });
    }

    fn switch_camera(&mut self, track: EngineTrackId, device: &CameraDevice) {
        self.log.push(EngineCall::SwitchCamera {
            track,
            device_id: device.id.clone(),
        });
        self.sink.send(EngineEvent::Camera(crate::engine::CameraCallback::Switched {
            device_id: device.id.clone(),
        }));
    }

    fn release_track(&mut self, track: EngineTrackId) {
        self.tracks.remove(&track);
        self.log.push(EngineCall::ReleaseTrack(track));
    }

    fn connect(&mut self, options: EngineConnectOptions) {
        self.log.push(EngineCall::Connect(options.clone()));
        let room = RoomInfo {
            sid: new_sid("RM"),
            name: options.room_name.clone().unwrap_or_default(),
            media_region: Some("gll".into()),
        };
        if let Some(error) = self.config.connect_error.clone() {
            self.sink
                .send(EngineEvent::Room(RoomCallback::ConnectFailure { room, error }));
            return;
        }
        if !self.config.auto_connect {
            return;
        }
        self.connected = true;
        self.sink.send(EngineEvent::Room(RoomCallback::Connected {
            room,
            local: ParticipantInfo::new(new_sid("PA"), self.config.identity.clone()),
            remotes: self.config.remote_participants.clone(),
        }));
        for track in options.audio_tracks.iter().chain(options.video_tracks.iter()) {
            self.confirm_publish(*track);
        }
    }

    fn disconnect(&mut self) {
        self.log.push(EngineCall::Disconnect);
        self.connected = false;
        self.sink.send(EngineEvent::Room(RoomCallback::Disconnected(None)));
    }

    fn publish_track(&mut self, track: EngineTrackId) {
        self.log.push(EngineCall::PublishTrack(track));
        if self.connected {
            self.confirm_publish(track);
        }
    }

    fn unpublish_track(&mut self, track: EngineTrackId) {
        self.log.push(EngineCall::UnpublishTrack(track));
    }

    fn request_screen_capture(&mut self) {
        self.log.push(EngineCall::RequestScreenCapture);
        self.sink.send(EngineEvent::ScreenCapturePermission {
            granted: self.config.grant_screen_capture,
        });
    }

    fn start_capture_service(&mut self) {
        self.log.push(EngineCall::StartCaptureService);
    }

    fn stop_screen_capture(&mut self, track: EngineTrackId) {
        self.log.push(EngineCall::StopScreenCapture(track));
    }

    fn stop_capture_service(&mut self) {
        self.log.push(EngineCall::StopCaptureService);
    }

    fn set_remote_audio_playback(&mut self, track_sid: &str, enabled: bool) {
        self.log.push(EngineCall::SetRemoteAudioPlayback {
            track_sid: track_sid.to_string(),
            enabled,
        });
    }

    fn send_data(&mut self, track: EngineTrackId, payload: DataPayload) {
        self.log.push(EngineCall::SendData { track, payload });
    }

    fn request_stats(&mut self) {
        self.log.push(EngineCall::RequestStats);
        self.sink.send(EngineEvent::Stats(vec![self.stats_report()]));
    }
}

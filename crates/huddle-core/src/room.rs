use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_track::DataTrackWorker;
use crate::engine::{
    CameraDevice, CameraFacing, EngineConnectOptions, EngineEvent, LocalCallback, MediaEngine,
    RemoteCallback, RemoteParticipantState, RoomCallback, RoomInfo, VideoCodec,
};
use crate::errors::{EngineError, ErrorDetail, SessionError};
use crate::events::{
    EventEmitter, ParticipantTracksSnapshot, RoomRef, RoomSnapshot, SessionEvent,
    SessionEventListener,
};
use crate::participants::{ParticipantInfo, ParticipantRoster};
use crate::tracks::{
    EngineTrackId, LocalTrack, PublishState, TrackKind, TRACK_NAME_CAMERA, TRACK_NAME_DATA,
    TRACK_NAME_MICROPHONE,
};
use crate::translate::{translate, TranslateContext};

/// Parameters of a connect request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectConfig {
    pub room_name: String,
    pub access_token: String,
    pub enable_audio: bool,
    pub enable_video: bool,
    pub enable_remote_audio: bool,
    pub enable_network_quality_reporting: bool,
    pub dominant_speaker_enabled: bool,
    pub maintain_video_in_background: bool,
    pub camera_type: CameraFacing,
    pub enable_h264: bool,
    pub enable_data_track: bool,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            room_name: String::new(),
            access_token: String::new(),
            enable_audio: true,
            enable_video: false,
            enable_remote_audio: true,
            enable_network_quality_reporting: false,
            dominant_speaker_enabled: false,
            maintain_video_in_background: false,
            camera_type: CameraFacing::Front,
            enable_h264: false,
            enable_data_track: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    /// The engine was told to leave; waiting for its `Disconnected`.
    Disconnecting,
    Disconnected(Option<EngineError>),
}

impl ConnectionState {
    /// `Idle` and `Disconnected` accept a new connect request.
    pub fn is_at_rest(&self) -> bool {
        matches!(self, Self::Idle | Self::Disconnected(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected(_) => "disconnected",
        }
    }
}

/// Owned local track slots. At most one track per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalSlot {
    Microphone,
    Camera,
    Screen,
    Data,
}

#[derive(Debug, Default)]
pub(crate) struct LocalTracks {
    pub(crate) microphone: Option<LocalTrack>,
    pub(crate) camera: Option<LocalTrack>,
    pub(crate) screen: Option<LocalTrack>,
    pub(crate) data: Option<LocalTrack>,
}

impl LocalTracks {
    fn slot(&self, slot: LocalSlot) -> &Option<LocalTrack> {
        match slot {
            LocalSlot::Microphone => &self.microphone,
            LocalSlot::Camera => &self.camera,
            LocalSlot::Screen => &self.screen,
            LocalSlot::Data => &self.data,
        }
    }

    fn slot_mut(&mut self, slot: LocalSlot) -> &mut Option<LocalTrack> {
        match slot {
            LocalSlot::Microphone => &mut self.microphone,
            LocalSlot::Camera => &mut self.camera,
            LocalSlot::Screen => &mut self.screen,
            LocalSlot::Data => &mut self.data,
        }
    }

    pub(crate) fn get(&self, slot: LocalSlot) -> Option<&LocalTrack> {
        self.slot(slot).as_ref()
    }

    pub(crate) fn get_mut(&mut self, slot: LocalSlot) -> Option<&mut LocalTrack> {
        self.slot_mut(slot).as_mut()
    }

    pub(crate) fn set(&mut self, slot: LocalSlot, track: LocalTrack) {
        *self.slot_mut(slot) = Some(track);
    }

    pub(crate) fn take(&mut self, slot: LocalSlot) -> Option<LocalTrack> {
        self.slot_mut(slot).take()
    }

    fn slot_of(&self, id: EngineTrackId) -> Option<LocalSlot> {
        [
            LocalSlot::Microphone,
            LocalSlot::Camera,
            LocalSlot::Screen,
            LocalSlot::Data,
        ]
        .into_iter()
        .find(|slot| self.get(*slot).is_some_and(|t| t.id == id))
    }
}

/// State of the one call a controller may hold.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) room: RoomRef,
    pub(crate) media_region: Option<String>,
    pub(crate) roster: ParticipantRoster,
    pub(crate) connected_at: Option<DateTime<Utc>>,
    /// Callbacks that raced ahead of `Connected`, replayed in order after it.
    pub(crate) deferred: Vec<EngineEvent>,
    pub(crate) disconnect_requested: bool,
}

impl Session {
    fn new(room_name: &str) -> Self {
        Self {
            room: RoomRef {
                room_name: room_name.to_string(),
                room_sid: String::new(),
            },
            media_region: None,
            roster: ParticipantRoster::new(),
            connected_at: None,
            deferred: Vec::new(),
            disconnect_requested: false,
        }
    }
}

/// Owns the connect/disconnect state machine, the local tracks and the
/// participant records of one call.
///
/// Every method runs on the owner task: commands come in through the
/// public methods, engine callbacks through [`SessionController::handle`].
/// Results reach the host only as [`SessionEvent`]s.
pub struct SessionController<E: MediaEngine> {
    pub(crate) engine: E,
    pub(crate) emitter: EventEmitter,
    pub(crate) data: DataTrackWorker,
    pub(crate) state: ConnectionState,
    pub(crate) session: Option<Session>,
    pub(crate) config: ConnectConfig,
    pub(crate) tracks: LocalTracks,
    /// Capture device behind the camera track. Survives a background release
    /// so the track can be recreated on resume.
    pub(crate) camera_device: Option<CameraDevice>,
    pub(crate) camera_enabled: bool,
    pub(crate) camera_interrupted: bool,
    pub(crate) screen_share_requested: bool,
    cameras: Option<Vec<CameraDevice>>,
}

impl<E: MediaEngine> SessionController<E> {
    pub fn new(engine: E, emitter: EventEmitter, data: DataTrackWorker) -> Self {
        Self {
            engine,
            emitter,
            data,
            state: ConnectionState::Idle,
            session: None,
            config: ConnectConfig::default(),
            tracks: LocalTracks::default(),
            camera_device: None,
            camera_enabled: true,
            camera_interrupted: false,
            screen_share_requested: false,
            cameras: None,
        }
    }

    pub fn add_listener(&self, listener: std::sync::Arc<dyn SessionEventListener>) {
        self.emitter.add_listener(listener);
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn room(&self) -> Option<&RoomRef> {
        self.session.as_ref().map(|s| &s.room)
    }

    pub fn roster(&self) -> Option<&ParticipantRoster> {
        self.session.as_ref().map(|s| &s.roster)
    }

    pub fn local_track(&self, slot: LocalSlot) -> Option<&LocalTrack> {
        self.tracks.get(slot)
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Start a connection attempt.
    ///
    /// Validation and local media failures are reported as
    /// `onRoomDidFailToConnect` and leave the engine untouched.
    pub fn connect(&mut self, config: ConnectConfig) {
        if !self.state.is_at_rest() {
            tracing::warn!("connect refused: session is {}", self.state.as_str());
            self.fail(SessionError::SessionActive);
            return;
        }
        if config.access_token.is_empty() {
            self.fail(SessionError::InvalidCredential);
            return;
        }
        self.config = config;

        if let Err(error) = self.prepare_local_tracks() {
            self.teardown_local_tracks(false);
            self.fail(error);
            return;
        }

        let codecs = self.supported_codecs();
        self.emitter.emit(SessionEvent::LocalParticipantSupportedCodecs {
            supported_codecs: codecs.iter().map(ToString::to_string).collect(),
        });
        let preferred = codecs.last().copied().unwrap_or(VideoCodec::Vp8);

        let mut audio_tracks = Vec::new();
        let mut video_tracks = Vec::new();
        for (slot, ids) in [
            (LocalSlot::Microphone, &mut audio_tracks),
            (LocalSlot::Camera, &mut video_tracks),
        ] {
            if let Some(track) = self.tracks.get_mut(slot) {
                track.publish = PublishState::Pending;
                ids.push(track.id);
            }
        }

        let options = EngineConnectOptions {
            access_token: self.config.access_token.clone(),
            room_name: Some(self.config.room_name.clone()).filter(|n| !n.is_empty()),
            audio_tracks,
            video_tracks,
            preferred_video_codecs: vec![preferred],
            dominant_speaker: self.config.dominant_speaker_enabled,
            network_quality: self.config.enable_network_quality_reporting,
        };

        self.session = Some(Session::new(&self.config.room_name));
        self.state = ConnectionState::Connecting;
        tracing::info!("connecting to room {:?}", self.config.room_name);
        self.engine.connect(options);
    }

    /// Leave the current session. Safe to call any number of times; a call
    /// made while connecting takes effect once the attempt settles.
    pub fn disconnect(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("disconnect ignored: no session");
            return;
        };
        if session.disconnect_requested {
            tracing::debug!("disconnect already requested");
            return;
        }
        session.disconnect_requested = true;
        if self.state == ConnectionState::Connecting {
            tracing::info!("disconnect deferred until the connection attempt settles");
            return;
        }
        self.leave();
    }

    pub fn get_stats(&mut self) {
        if self.state != ConnectionState::Connected {
            tracing::debug!("stats request ignored: session is {}", self.state.as_str());
            return;
        }
        self.engine.request_stats();
    }

    pub fn fetch_room(&self) {
        self.emitter.emit(SessionEvent::RoomFetched(self.room_snapshot()));
    }

    pub fn room_snapshot(&self) -> Option<RoomSnapshot> {
        let session = self.session.as_ref()?;
        let roster = &session.roster;
        Some(RoomSnapshot {
            sid: session.room.room_sid.clone(),
            name: session.room.room_name.clone(),
            media_region: session.media_region.clone(),
            state: self.state.as_str().to_string(),
            connected_at: session.connected_at.map(|t| t.to_rfc3339()),
            dominant_speaker: roster.dominant_speaker().map(ParticipantTracksSnapshot::from),
            remote_participants: roster
                .remotes()
                .iter()
                .map(ParticipantTracksSnapshot::from)
                .collect(),
            local_participant: roster.local().map(ParticipantTracksSnapshot::from),
        })
    }

    /// Single entry point for everything the engine reports.
    pub fn handle(&mut self, event: EngineEvent) {
        if self.state == ConnectionState::Connecting && waits_for_connected(&event) {
            if let Some(session) = self.session.as_mut() {
                tracing::debug!("deferring callback until connected: {event:?}");
                session.deferred.push(event);
            }
            return;
        }
        match event {
            EngineEvent::Room(callback) => self.on_room(callback),
            EngineEvent::Local(callback) => self.on_local(callback),
            EngineEvent::Remote { participant, callback } => self.on_remote(participant, callback),
            EngineEvent::ScreenCapturePermission { granted } => {
                self.on_screen_capture_permission(granted)
            }
            EngineEvent::Stats(reports) => {
                if self.session.is_none() {
                    tracing::debug!("stats arrived after the session ended");
                    return;
                }
                self.emit_translated(&EngineEvent::Stats(reports));
            }
            event @ EngineEvent::Camera(_) => self.emit_translated(&event),
        }
    }

    fn on_room(&mut self, callback: RoomCallback) {
        match callback {
            RoomCallback::Connected { room, local, remotes } => {
                self.on_connected(room, local, remotes);
            }
            RoomCallback::ConnectFailure { room, error } => {
                if self.session.is_none() {
                    tracing::debug!("connect failure without a pending session");
                    return;
                }
                tracing::warn!("failed to connect to {}: {error}", room.name);
                let event = self.translated(&EngineEvent::Room(RoomCallback::ConnectFailure {
                    room,
                    error: error.clone(),
                }));
                self.reset(Some(error));
                self.emit_optional(event);
            }
            RoomCallback::Disconnected(error) => {
                if self.session.is_none() {
                    tracing::debug!("disconnect callback without a session");
                    return;
                }
                tracing::info!("room disconnected: {error:?}");
                let event =
                    self.translated(&EngineEvent::Room(RoomCallback::Disconnected(error.clone())));
                self.reset(error);
                self.emit_optional(event);
            }
            RoomCallback::Reconnecting(error) => {
                if self.state != ConnectionState::Connected {
                    tracing::debug!("reconnecting ignored: session is {}", self.state.as_str());
                    return;
                }
                tracing::info!("reconnecting: {error}");
                self.state = ConnectionState::Reconnecting;
                self.emit_translated(&EngineEvent::Room(RoomCallback::Reconnecting(error)));
            }
            RoomCallback::Reconnected => {
                if self.state != ConnectionState::Reconnecting {
                    tracing::debug!("reconnected ignored: session is {}", self.state.as_str());
                    return;
                }
                self.state = ConnectionState::Connected;
                self.emit_translated(&EngineEvent::Room(RoomCallback::Reconnected));
                self.publish_deferred();
            }
            RoomCallback::ParticipantConnected(remote) => {
                if !self.add_remote(&remote) {
                    tracing::debug!("participant {} already known", remote.info.sid);
                    return;
                }
                self.emit_translated(&EngineEvent::Room(RoomCallback::ParticipantConnected(
                    remote,
                )));
            }
            RoomCallback::ParticipantDisconnected(info) => {
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let Some(gone) = session.roster.remove_remote(&info.sid) else {
                    tracing::debug!("unknown participant {} disconnected", info.sid);
                    return;
                };
                for publication in gone.publications_of(TrackKind::Data) {
                    self.data.detach(publication.track_sid.clone());
                }
                self.emit_translated(&EngineEvent::Room(
                    RoomCallback::ParticipantDisconnected(info),
                ));
            }
            RoomCallback::DominantSpeakerChanged(speaker) => {
                if let Some(session) = self.session.as_mut() {
                    session
                        .roster
                        .set_dominant_speaker(speaker.as_ref().map(|s| s.sid.clone()));
                }
                self.emit_translated(&EngineEvent::Room(
                    RoomCallback::DominantSpeakerChanged(speaker),
                ));
            }
            callback @ (RoomCallback::RecordingStarted | RoomCallback::RecordingStopped) => {
                self.emit_translated(&EngineEvent::Room(callback));
            }
        }
    }

    fn on_connected(
        &mut self,
        room: RoomInfo,
        local: ParticipantInfo,
        remotes: Vec<RemoteParticipantState>,
    ) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("connected callback without a pending session");
            return;
        };
        session.room = RoomRef::from(&room);
        session.media_region = room.media_region.clone();
        session.connected_at = Some(Utc::now());
        session.roster.set_local(local.clone());
        let deferred = std::mem::take(&mut session.deferred);
        let leaving = session.disconnect_requested;

        self.state = ConnectionState::Connected;
        tracing::info!("connected to room {} ({})", room.name, room.sid);
        self.emit_translated(&EngineEvent::Room(RoomCallback::Connected {
            room,
            local,
            remotes: remotes.clone(),
        }));

        if leaving {
            self.leave();
            return;
        }

        self.publish_deferred();

        for remote in remotes {
            if self.add_remote(&remote) {
                self.emit_translated(&EngineEvent::Room(RoomCallback::ParticipantConnected(
                    remote,
                )));
            }
        }

        for event in deferred {
            self.handle(event);
        }
    }

    fn on_local(&mut self, callback: LocalCallback) {
        match &callback {
            LocalCallback::TrackPublished { track, publication } => {
                let Some(slot) = self.tracks.slot_of(*track) else {
                    tracing::debug!("publication for a released track {}", publication.track_sid);
                    return;
                };
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let Some(local_track) = self.tracks.get_mut(slot) else {
                    return;
                };
                if local_track.publish != PublishState::Pending {
                    tracing::debug!("publication for {} no longer wanted", local_track.name);
                    return;
                }
                if !session.roster.insert_publication(None, publication.clone()) {
                    return;
                }
                local_track.publish = PublishState::Published {
                    track_sid: publication.track_sid.clone(),
                };
            }
            LocalCallback::PublicationFailed { track, kind, error } => {
                tracing::warn!("local {kind} track publication failed: {error}");
                if let Some(slot) = self.tracks.slot_of(*track) {
                    if let Some(local_track) = self.tracks.get_mut(slot) {
                        local_track.publish = PublishState::Unpublished;
                    }
                }
            }
            LocalCallback::NetworkQualityLevelChanged(_) => {}
        }
        self.emit_translated(&EngineEvent::Local(callback));
    }

    fn on_remote(&mut self, participant: ParticipantInfo, callback: RemoteCallback) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let sid = participant.sid.clone();
        if session.roster.remote(&sid).is_none() {
            tracing::debug!("callback for unknown participant {sid}: {callback:?}");
            return;
        }
        let roster = &mut session.roster;
        let mut held = None;

        match &callback {
            RemoteCallback::TrackPublished(p) => {
                if !roster.insert_publication(Some(&sid), p.clone()) {
                    return;
                }
                held = roster
                    .remote_mut(&sid)
                    .and_then(|r| r.take_held_enablement(&p.track_sid));
            }
            RemoteCallback::TrackUnpublished(p) => {
                if let Some(remote) = roster.remote_mut(&sid) {
                    remote.remove_publication(&p.track_sid);
                }
                if p.kind == TrackKind::Data {
                    self.data.detach(p.track_sid.clone());
                }
            }
            RemoteCallback::TrackSubscribed(p) => {
                let known = roster
                    .remote(&sid)
                    .is_some_and(|r| r.publication(&p.track_sid).is_some());
                if !known && !roster.insert_publication(Some(&sid), p.clone()) {
                    return;
                }
                if let Some(publication) = roster
                    .remote_mut(&sid)
                    .and_then(|r| r.publication_mut(&p.track_sid))
                {
                    publication.subscribed = true;
                }
                match p.kind {
                    TrackKind::Audio => self
                        .engine
                        .set_remote_audio_playback(&p.track_sid, self.config.enable_remote_audio),
                    TrackKind::Data => self.data.attach(p.track_sid.clone(), participant.clone()),
                    TrackKind::Video => {}
                }
            }
            RemoteCallback::TrackUnsubscribed(p) => {
                if let Some(publication) = roster
                    .remote_mut(&sid)
                    .and_then(|r| r.publication_mut(&p.track_sid))
                {
                    publication.subscribed = false;
                }
                if p.kind == TrackKind::Data {
                    self.data.detach(p.track_sid.clone());
                }
            }
            RemoteCallback::TrackEnabled(p) | RemoteCallback::TrackDisabled(p) => {
                let enabled = matches!(callback, RemoteCallback::TrackEnabled(_));
                let Some(remote) = roster.remote_mut(&sid) else {
                    return;
                };
                match remote.publication_mut(&p.track_sid) {
                    Some(publication) => publication.enabled = enabled,
                    None => {
                        tracing::debug!("holding enable={enabled} for unannounced {}", p.track_sid);
                        remote.hold_enablement(&p.track_sid, enabled);
                        return;
                    }
                }
            }
            RemoteCallback::SubscriptionFailed { publication, error } => {
                tracing::warn!("subscription to {} failed: {error}", publication.track_sid);
            }
            RemoteCallback::NetworkQualityLevelChanged(_) => {}
        }

        let published = match &callback {
            RemoteCallback::TrackPublished(p) => Some(p.clone()),
            _ => None,
        };
        self.emit_translated(&EngineEvent::Remote {
            participant: participant.clone(),
            callback,
        });

        if let (Some(mut publication), Some(enabled)) = (published, held) {
            if let Some(p) = self
                .session
                .as_mut()
                .and_then(|s| s.roster.remote_mut(&sid))
                .and_then(|r| r.publication_mut(&publication.track_sid))
            {
                p.enabled = enabled;
            }
            publication.enabled = enabled;
            let callback = if enabled {
                RemoteCallback::TrackEnabled(publication)
            } else {
                RemoteCallback::TrackDisabled(publication)
            };
            self.emit_translated(&EngineEvent::Remote { participant, callback });
        }
    }

    /// Adds a remote participant with the publications it already has.
    /// Returns false for a participant already in the roster.
    fn add_remote(&mut self, remote: &RemoteParticipantState) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if !session.roster.add_remote(remote.info.clone()) {
            return false;
        }
        for publication in &remote.publications {
            let inserted = session
                .roster
                .insert_publication(Some(&remote.info.sid), publication.clone());
            if inserted && publication.kind == TrackKind::Data && publication.subscribed {
                self.data
                    .attach(publication.track_sid.clone(), remote.info.clone());
            }
        }
        true
    }

    pub(crate) fn camera_devices(&mut self) -> Vec<CameraDevice> {
        if self.cameras.is_none() {
            self.cameras = Some(self.engine.camera_devices());
        }
        self.cameras.clone().unwrap_or_default()
    }

    /// Open a camera track on the requested facing, retrying once on the
    /// other facing.
    pub(crate) fn create_camera(
        &mut self,
        facing: CameraFacing,
        enabled: bool,
    ) -> Result<LocalTrack, SessionError> {
        let devices = self.camera_devices();
        let candidates = [facing, facing.opposite()]
            .into_iter()
            .filter_map(|f| devices.iter().find(|d| d.facing == f));
        for device in candidates {
            match self
                .engine
                .create_camera_track(device, TRACK_NAME_CAMERA, enabled)
            {
                Ok(id) => {
                    if device.facing != facing {
                        tracing::info!("no usable {facing:?} camera, using {}", device.id);
                    }
                    self.camera_device = Some(device.clone());
                    self.camera_enabled = enabled;
                    return Ok(LocalTrack::new(id, TRACK_NAME_CAMERA, TrackKind::Video, enabled));
                }
                Err(e) => tracing::warn!("camera {} unavailable: {e}", device.id),
            }
        }
        Err(SessionError::DeviceUnavailable)
    }

    fn prepare_local_tracks(&mut self) -> Result<(), SessionError> {
        if self.config.enable_audio && self.tracks.microphone.is_none() {
            let id = self
                .engine
                .create_audio_track(TRACK_NAME_MICROPHONE, true)
                .map_err(|error| SessionError::PublicationFailure {
                    kind: TrackKind::Audio,
                    error,
                })?;
            self.tracks.microphone =
                Some(LocalTrack::new(id, TRACK_NAME_MICROPHONE, TrackKind::Audio, true));
        }
        if self.config.enable_video && self.tracks.camera.is_none() {
            let track = self.create_camera(self.config.camera_type, true)?;
            self.tracks.camera = Some(track);
        }
        if self.config.enable_data_track && self.tracks.data.is_none() {
            let id = self.engine.create_data_track(TRACK_NAME_DATA).map_err(|error| {
                SessionError::PublicationFailure {
                    kind: TrackKind::Data,
                    error,
                }
            })?;
            self.tracks.data = Some(LocalTrack::new(id, TRACK_NAME_DATA, TrackKind::Data, true));
        }
        for slot in [LocalSlot::Data, LocalSlot::Screen] {
            if let Some(track) = self.tracks.get_mut(slot) {
                if !track.is_published() {
                    track.publish = PublishState::Deferred;
                }
            }
        }
        Ok(())
    }

    /// VP8 always; H.264 only with hardware encode and decode and opt-in.
    /// The last entry is the preferred codec.
    fn supported_codecs(&self) -> Vec<VideoCodec> {
        let hw = self.engine.hardware_codecs();
        let mut codecs = vec![VideoCodec::Vp8];
        if self.config.enable_h264 && hw.h264_encoder && hw.h264_decoder {
            codecs.push(VideoCodec::H264);
        }
        codecs
    }

    /// Publish every track held back while not connected, data first.
    fn publish_deferred(&mut self) {
        for slot in [
            LocalSlot::Data,
            LocalSlot::Microphone,
            LocalSlot::Camera,
            LocalSlot::Screen,
        ] {
            if self
                .tracks
                .get(slot)
                .is_some_and(|t| t.publish == PublishState::Deferred)
            {
                self.publish_slot(slot);
            }
        }
    }

    /// True once the engine has been told to leave the room.
    pub(crate) fn is_leaving(&self) -> bool {
        self.state == ConnectionState::Disconnecting
    }

    /// Publish now when connected, otherwise on `Connected` or `Reconnected`.
    pub(crate) fn publish_slot(&mut self, slot: LocalSlot) {
        if self.is_leaving() {
            tracing::debug!("publish of {slot:?} refused: leaving the room");
            return;
        }
        let connected = self.state == ConnectionState::Connected;
        let Some(track) = self.tracks.get_mut(slot) else {
            return;
        };
        if track.is_published() {
            return;
        }
        if connected {
            self.engine.publish_track(track.id);
            track.publish = PublishState::Pending;
        } else {
            track.publish = PublishState::Deferred;
        }
    }

    pub(crate) fn unpublish_slot(&mut self, slot: LocalSlot) {
        let Some(track) = self.tracks.get_mut(slot) else {
            return;
        };
        match std::mem::replace(&mut track.publish, PublishState::Unpublished) {
            PublishState::Pending => self.engine.unpublish_track(track.id),
            PublishState::Published { track_sid } => {
                self.engine.unpublish_track(track.id);
                if let Some(local) = self.session.as_mut().and_then(|s| s.roster.local_mut()) {
                    local.remove_publication(&track_sid);
                }
            }
            PublishState::Unpublished | PublishState::Deferred => {}
        }
    }

    /// Unpublish (when asked) then release the engine track.
    pub(crate) fn release_slot(&mut self, slot: LocalSlot, unpublish: bool) {
        if unpublish {
            self.unpublish_slot(slot);
        }
        if let Some(track) = self.tracks.take(slot) {
            self.engine.release_track(track.id);
        }
    }

    /// Tear the screen share down: unpublish, stop capture, release, then
    /// stop the capture service. Returns whether a screen track existed.
    pub(crate) fn stop_screen_share(&mut self, unpublish: bool, notify: bool) -> bool {
        let Some(id) = self.tracks.get(LocalSlot::Screen).map(|t| t.id) else {
            self.engine.stop_capture_service();
            return false;
        };
        if unpublish {
            self.unpublish_slot(LocalSlot::Screen);
        }
        self.engine.stop_screen_capture(id);
        self.release_slot(LocalSlot::Screen, false);
        if notify {
            self.emitter.emit(SessionEvent::ScreenShareChanged {
                screen_share_enabled: false,
            });
        }
        self.engine.stop_capture_service();
        true
    }

    pub(crate) fn teardown_local_tracks(&mut self, unpublish: bool) {
        if self.tracks.screen.is_some() {
            self.stop_screen_share(unpublish, false);
        }
        for slot in [LocalSlot::Data, LocalSlot::Camera, LocalSlot::Microphone] {
            self.release_slot(slot, unpublish);
        }
        self.camera_device = None;
        self.camera_interrupted = false;
        self.screen_share_requested = false;
    }

    fn leave(&mut self) {
        tracing::info!("leaving room");
        self.teardown_local_tracks(true);
        self.data.detach_all();
        self.state = ConnectionState::Disconnecting;
        self.engine.disconnect();
    }

    /// Drop the session and return to rest. Runs before the terminal event
    /// is emitted.
    fn reset(&mut self, error: Option<EngineError>) {
        self.teardown_local_tracks(false);
        self.data.detach_all();
        self.session = None;
        self.state = ConnectionState::Disconnected(error);
    }

    /// Report a failure that never reached the engine.
    pub(crate) fn fail(&self, error: SessionError) {
        tracing::warn!("{error}");
        self.emitter.emit(SessionEvent::ConnectFailure {
            room: self.session.as_ref().map(|s| s.room.clone()),
            error: ErrorDetail::from(&error),
        });
    }

    fn translated(&self, event: &EngineEvent) -> Option<SessionEvent> {
        let detached = RoomRef::default();
        let (room, local) = match &self.session {
            Some(s) => (&s.room, s.roster.local().map(|p| &p.info)),
            None => (&detached, None),
        };
        let back_camera_id = self
            .cameras
            .as_deref()
            .and_then(|c| c.iter().find(|d| d.facing == CameraFacing::Back))
            .map(|d| d.id.as_str());
        translate(
            event,
            &TranslateContext {
                room,
                local,
                back_camera_id,
            },
        )
    }

    pub(crate) fn emit_translated(&self, event: &EngineEvent) {
        self.emit_optional(self.translated(event));
    }

    fn emit_optional(&self, event: Option<SessionEvent>) {
        if let Some(event) = event {
            self.emitter.emit(event);
        }
    }
}

/// Callbacks that only make sense once the local participant exists.
fn waits_for_connected(event: &EngineEvent) -> bool {
    match event {
        EngineEvent::Room(
            RoomCallback::Connected { .. }
            | RoomCallback::ConnectFailure { .. }
            | RoomCallback::Disconnected(_),
        ) => false,
        EngineEvent::Room(_) | EngineEvent::Local(_) | EngineEvent::Remote { .. } => true,
        EngineEvent::Camera(_)
        | EngineEvent::ScreenCapturePermission { .. }
        | EngineEvent::Stats(_) => false,
    }
}

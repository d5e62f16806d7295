use base64::Engine as _;

use crate::engine::{CameraFacing, DataPayload, MediaEngine};
use crate::errors::{ErrorDetail, SessionError};
use crate::events::SessionEvent;
use crate::room::{LocalSlot, SessionController};
use crate::tracks::{
    LocalTrack, TrackKind, TRACK_NAME_CAMERA, TRACK_NAME_DATA, TRACK_NAME_MICROPHONE,
    TRACK_NAME_SCREEN,
};

/// Local media controls. Every toggle reports its outcome as an event.
impl<E: MediaEngine> SessionController<E> {
    /// Enable or mute the camera, creating and publishing it on first use.
    pub fn toggle_video(&mut self, enabled: bool) {
        if self.refused_while_leaving("toggleVideo") {
            return;
        }
        self.camera_enabled = enabled;
        let mut created = false;
        if enabled && self.tracks.camera.is_none() {
            match self.create_camera(self.config.camera_type, true) {
                Ok(track) => {
                    self.tracks.set(LocalSlot::Camera, track);
                    created = true;
                }
                Err(error) => {
                    self.fail(error);
                    return;
                }
            }
        }
        let Some(track) = self.tracks.get_mut(LocalSlot::Camera) else {
            return;
        };
        self.engine.set_track_enabled(track.id, enabled);
        track.enabled = enabled;
        if created {
            self.publish_slot(LocalSlot::Camera);
        }
        self.emitter.emit(SessionEvent::VideoChanged {
            video_enabled: enabled,
        });
    }

    pub fn toggle_audio(&mut self, enabled: bool) {
        if self.refused_while_leaving("toggleAudio") {
            return;
        }
        match self.tracks.get_mut(LocalSlot::Microphone) {
            Some(track) => {
                self.engine.set_track_enabled(track.id, enabled);
                track.enabled = enabled;
            }
            None if enabled => {
                match self.engine.create_audio_track(TRACK_NAME_MICROPHONE, true) {
                    Ok(id) => {
                        self.tracks.set(
                            LocalSlot::Microphone,
                            LocalTrack::new(id, TRACK_NAME_MICROPHONE, TrackKind::Audio, true),
                        );
                        self.publish_slot(LocalSlot::Microphone);
                    }
                    Err(e) => {
                        tracing::warn!("failed to create microphone track: {e}");
                        return;
                    }
                }
            }
            None => return,
        }
        self.emitter.emit(SessionEvent::AudioChanged {
            audio_enabled: enabled,
        });
    }

    /// Unlike audio and video, disabling the data track unpublishes and
    /// releases it.
    pub fn toggle_data_track(&mut self, enabled: bool) {
        if self.refused_while_leaving("toggleDataTrack") {
            return;
        }
        if enabled {
            if self.tracks.data.is_none() {
                match self.engine.create_data_track(TRACK_NAME_DATA) {
                    Ok(id) => self.tracks.set(
                        LocalSlot::Data,
                        LocalTrack::new(id, TRACK_NAME_DATA, TrackKind::Data, true),
                    ),
                    Err(e) => {
                        tracing::warn!("failed to create data track: {e}");
                        return;
                    }
                }
            }
            self.publish_slot(LocalSlot::Data);
        } else {
            if self.tracks.data.is_none() {
                return;
            }
            self.release_slot(LocalSlot::Data, true);
        }
        self.config.enable_data_track = enabled;
        self.emitter.emit(SessionEvent::DataChanged {
            data_enabled: enabled,
        });
    }

    pub fn publish_local_video(&mut self, enabled: bool) {
        self.set_published(LocalSlot::Camera, enabled);
    }

    pub fn publish_local_audio(&mut self, enabled: bool) {
        self.set_published(LocalSlot::Microphone, enabled);
    }

    pub fn publish_local_data_track(&mut self, enabled: bool) {
        self.set_published(LocalSlot::Data, enabled);
    }

    fn set_published(&mut self, slot: LocalSlot, enabled: bool) {
        if self.refused_while_leaving("publishLocal") {
            return;
        }
        if enabled {
            self.publish_slot(slot);
        } else {
            self.unpublish_slot(slot);
        }
    }

    /// Swap between front and back capture devices. Front wins when the
    /// current device is the back one or no back device exists.
    pub fn switch_camera(&mut self) {
        let Some(track_id) = self.tracks.get(LocalSlot::Camera).map(|t| t.id) else {
            tracing::debug!("switch camera ignored: no camera track");
            return;
        };
        let devices = self.camera_devices();
        let front = devices.iter().find(|d| d.facing == CameraFacing::Front);
        let back = devices.iter().find(|d| d.facing == CameraFacing::Back);
        let on_back = self
            .camera_device
            .as_ref()
            .is_some_and(|d| d.facing == CameraFacing::Back);

        let target = match (front, back) {
            (Some(front), _) if on_back || back.is_none() => front,
            (_, Some(back)) => back,
            _ => return,
        };
        self.engine.switch_camera(track_id, target);
        self.config.camera_type = target.facing;
        self.camera_device = Some(target.clone());
    }

    /// Enabling asks the engine for a capture grant first; the share starts
    /// when the answer comes back granted.
    pub fn toggle_screen_sharing(&mut self, enabled: bool) {
        if self.refused_while_leaving("toggleScreenSharing") {
            return;
        }
        if !enabled {
            self.screen_share_requested = false;
            self.stop_screen_share(true, true);
            return;
        }
        if self.tracks.screen.is_some() {
            tracing::debug!("screen share already active");
            return;
        }
        if self.screen_share_requested {
            return;
        }
        self.screen_share_requested = true;
        self.engine.request_screen_capture();
    }

    pub(crate) fn on_screen_capture_permission(&mut self, granted: bool) {
        if !std::mem::take(&mut self.screen_share_requested) {
            tracing::debug!("unsolicited screen capture answer");
            return;
        }
        if !granted {
            tracing::info!("screen capture permission denied");
            return;
        }
        if self.tracks.screen.is_some() {
            return;
        }
        self.engine.start_capture_service();
        let id = match self.engine.create_screen_track(TRACK_NAME_SCREEN) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("failed to create screen track: {e}");
                self.engine.stop_capture_service();
                return;
            }
        };
        self.tracks.set(
            LocalSlot::Screen,
            LocalTrack::new(id, TRACK_NAME_SCREEN, TrackKind::Video, true),
        );
        self.publish_slot(LocalSlot::Screen);
        self.emitter.emit(SessionEvent::ScreenShareChanged {
            screen_share_enabled: true,
        });
    }

    /// Playback switch for every subscribed audio track of one participant.
    pub fn set_remote_audio_playback(&mut self, participant_sid: &str, enabled: bool) {
        let Some(remote) = self
            .session
            .as_ref()
            .and_then(|s| s.roster.remote(participant_sid))
        else {
            tracing::debug!("no remote participant {participant_sid}");
            return;
        };
        let sids: Vec<String> = remote
            .publications_of(TrackKind::Audio)
            .filter(|p| p.subscribed)
            .map(|p| p.track_sid.clone())
            .collect();
        for sid in sids {
            self.engine.set_remote_audio_playback(&sid, enabled);
        }
    }

    /// Playback switch for all subscribed remote audio. Tracks subscribed
    /// later still start with the connect-time default.
    pub fn toggle_remote_audio(&mut self, enabled: bool) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let sids: Vec<String> = session
            .roster
            .remotes()
            .iter()
            .flat_map(|r| r.publications_of(TrackKind::Audio))
            .filter(|p| p.subscribed)
            .map(|p| p.track_sid.clone())
            .collect();
        for sid in sids {
            self.engine.set_remote_audio_playback(&sid, enabled);
        }
    }

    pub fn send_string(&mut self, message: &str) {
        if let Some(track) = self.tracks.get(LocalSlot::Data) {
            self.engine
                .send_data(track.id, DataPayload::Text(message.to_string()));
        }
    }

    /// Decode a base64 payload and send it as binary.
    pub fn send_binary(&mut self, payload_base64: &str) {
        let Some(id) = self.tracks.get(LocalSlot::Data).map(|t| t.id) else {
            return;
        };
        match base64::engine::general_purpose::STANDARD.decode(payload_base64) {
            Ok(bytes) => self.engine.send_data(id, DataPayload::Binary(bytes)),
            Err(e) => {
                let error = SessionError::DecodeFailure(e.to_string());
                tracing::warn!("{error}");
                self.emitter.emit(SessionEvent::DataTrackSendFailed {
                    error: ErrorDetail::from(&error),
                });
            }
        }
    }

    fn refused_while_leaving(&self, command: &str) -> bool {
        if self.is_leaving() {
            tracing::warn!("{command} refused: leaving the room");
        }
        self.is_leaving()
    }

    /// Release the camera while the host is in the background, unless the
    /// session asked to keep video running.
    pub fn host_paused(&mut self) {
        if self.tracks.camera.is_none() || self.config.maintain_video_in_background {
            return;
        }
        self.release_slot(LocalSlot::Camera, true);
        self.camera_interrupted = true;
        self.emitter.emit(SessionEvent::CameraWasInterrupted {
            reason: "App backgrounded".into(),
        });
    }

    /// Recreate the camera released by [`Self::host_paused`] and publish it
    /// again.
    pub fn host_resumed(&mut self) {
        let reopen = match self.tracks.camera {
            None => self.camera_device.clone(),
            Some(_) => None,
        };
        if let Some(device) = reopen {
            match self
                .engine
                .create_camera_track(&device, TRACK_NAME_CAMERA, self.camera_enabled)
            {
                Ok(id) => {
                    self.tracks.set(
                        LocalSlot::Camera,
                        LocalTrack::new(
                            id,
                            TRACK_NAME_CAMERA,
                            TrackKind::Video,
                            self.camera_enabled,
                        ),
                    );
                    self.publish_slot(LocalSlot::Camera);
                }
                Err(e) => tracing::warn!("failed to reopen camera {}: {e}", device.id),
            }
        }
        if std::mem::take(&mut self.camera_interrupted) {
            self.emitter.emit(SessionEvent::CameraInterruptionEnded);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::{DataPayload, EngineEvent, RemoteCallback};
    use crate::loopback::{EngineCall, LoopbackConfig};
    use crate::room::testing::*;
    use crate::room::{ConnectConfig, ConnectionState, LocalSlot};
    use crate::tracks::{PublishState, TrackKind, TrackPublication};

    fn connected(loopback: LoopbackConfig, config: ConnectConfig) -> Harness {
        let mut h = Harness::new(loopback);
        h.connect(config);
        h.capture.take();
        h
    }

    fn publish_state(h: &Harness, slot: LocalSlot) -> Option<bool> {
        h.controller.local_track(slot).map(|t| t.is_published())
    }

    #[tokio::test]
    async fn audio_toggle_round_trip_keeps_publication() {
        let mut h = connected(LoopbackConfig::default(), config());
        let before = publish_state(&h, LocalSlot::Microphone);

        h.controller.toggle_audio(true);
        h.controller.toggle_audio(false);
        h.pump();

        assert_eq!(publish_state(&h, LocalSlot::Microphone), before);
        assert_eq!(before, Some(true));
        assert!(!h.controller.local_track(LocalSlot::Microphone).unwrap().enabled);
        assert_eq!(h.capture.count("onAudioChanged"), 2);
    }

    #[tokio::test]
    async fn video_toggle_round_trip_keeps_publication() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_video: true,
                ..config()
            },
        );
        let camera = h.track_id(LocalSlot::Camera);

        h.controller.toggle_video(true);
        h.controller.toggle_video(false);
        h.pump();

        assert_eq!(publish_state(&h, LocalSlot::Camera), Some(true));
        assert_eq!(h.calls.count(|c| *c == EngineCall::UnpublishTrack(camera)), 0);
        assert_eq!(h.capture.count("onVideoChanged"), 2);
    }

    #[tokio::test]
    async fn data_toggle_round_trip_releases_track() {
        let mut h = connected(LoopbackConfig::default(), config());
        assert_eq!(publish_state(&h, LocalSlot::Data), None);

        h.controller.toggle_data_track(true);
        h.pump();
        let id = h.track_id(LocalSlot::Data);
        assert_eq!(h.capture.count("onLocalDataTrackPublished"), 1);

        h.controller.toggle_data_track(false);
        h.pump();

        assert_eq!(publish_state(&h, LocalSlot::Data), None);
        let unpublish = h.calls.position(&EngineCall::UnpublishTrack(id)).unwrap();
        let release = h.calls.position(&EngineCall::ReleaseTrack(id)).unwrap();
        assert!(unpublish < release);
        assert_eq!(
            h.capture.names(),
            ["onDataChanged", "onLocalDataTrackPublished", "onDataChanged"]
        );
    }

    #[tokio::test]
    async fn disabling_missing_tracks_is_silent() {
        let mut h = Harness::new(LoopbackConfig::default());
        h.controller.toggle_audio(false);
        h.controller.toggle_data_track(false);
        h.controller.toggle_video(false);
        assert!(h.capture.events().is_empty());
        assert!(h.calls.is_empty());
    }

    #[tokio::test]
    async fn tracks_toggled_before_connect_publish_on_connected() {
        let mut h = Harness::new(LoopbackConfig::default());
        h.controller.toggle_data_track(true);
        h.controller.toggle_video(true);
        assert_eq!(
            h.controller.local_track(LocalSlot::Data).map(|t| &t.publish),
            Some(&PublishState::Deferred)
        );
        assert_eq!(h.calls.count(|c| matches!(c, EngineCall::PublishTrack(_))), 0);

        h.connect(config());

        assert!(h.controller.local_track(LocalSlot::Data).unwrap().track_sid().is_some());
        assert!(h.controller.local_track(LocalSlot::Camera).unwrap().track_sid().is_some());
        assert_eq!(h.capture.count("onLocalDataTrackPublished"), 1);
        assert_eq!(h.capture.count("onLocalVideoTrackPublished"), 1);
    }

    #[tokio::test]
    async fn toggle_video_without_camera_reports_device_unavailable() {
        let mut h = connected(
            LoopbackConfig {
                cameras: Vec::new(),
                ..LoopbackConfig::default()
            },
            config(),
        );
        h.controller.toggle_video(true);

        let events = h.capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "onRoomDidFailToConnect");
        assert_eq!(events[0].payload()["kind"], "DeviceUnavailable");
        assert_eq!(h.controller.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn publish_local_keeps_track_alive() {
        let mut h = connected(LoopbackConfig::default(), config());
        let mic = h.track_id(LocalSlot::Microphone);

        h.controller.publish_local_audio(false);
        h.pump();
        assert_eq!(publish_state(&h, LocalSlot::Microphone), Some(false));
        assert!(h.calls.position(&EngineCall::ReleaseTrack(mic)).is_none());
        let local = h.controller.roster().unwrap().local().unwrap();
        assert!(local.publications().is_empty());

        h.controller.publish_local_audio(true);
        h.pump();
        assert_eq!(publish_state(&h, LocalSlot::Microphone), Some(true));
        assert_eq!(h.capture.count("onLocalAudioTrackPublished"), 1);
    }

    #[tokio::test]
    async fn switch_camera_alternates_facing() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_video: true,
                ..config()
            },
        );
        let camera = h.track_id(LocalSlot::Camera);

        h.controller.switch_camera();
        h.pump();
        h.controller.switch_camera();
        h.pump();

        let switches: Vec<_> = h
            .calls
            .all()
            .into_iter()
            .filter_map(|c| match c {
                EngineCall::SwitchCamera { track, device_id } if track == camera => Some(device_id),
                _ => None,
            })
            .collect();
        assert_eq!(switches, ["camera-back", "camera-front"]);
        let payloads: Vec<_> = h
            .capture
            .events()
            .iter()
            .filter(|e| e.name() == "onCameraSwitched")
            .map(|e| e.payload()["isBackCamera"].clone())
            .collect();
        assert_eq!(payloads, [true, false]);
    }

    #[tokio::test]
    async fn switch_camera_without_track_is_noop() {
        let mut h = Harness::new(LoopbackConfig::default());
        h.controller.switch_camera();
        assert!(h.calls.is_empty());
    }

    #[tokio::test]
    async fn screen_share_denied_changes_nothing() {
        let mut h = connected(
            LoopbackConfig {
                grant_screen_capture: false,
                ..LoopbackConfig::default()
            },
            config(),
        );
        h.controller.toggle_screen_sharing(true);
        h.pump();

        assert!(h.capture.events().is_empty());
        assert!(h.controller.local_track(LocalSlot::Screen).is_none());
        assert_eq!(h.calls.count(|c| matches!(c, EngineCall::CreateScreenTrack(_))), 0);
        assert_eq!(h.controller.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn screen_share_start_and_stop_order() {
        let mut h = connected(LoopbackConfig::default(), config());
        h.controller.toggle_screen_sharing(true);
        h.pump();

        let screen = h.track_id(LocalSlot::Screen);
        assert_eq!(
            h.capture.names(),
            ["onScreenShareChanged", "onLocalVideoTrackPublished"]
        );
        assert!(
            h.calls.position(&EngineCall::StartCaptureService).unwrap()
                < h.calls.position(&EngineCall::CreateScreenTrack(screen)).unwrap()
        );

        h.capture.take();
        h.controller.toggle_screen_sharing(false);

        let order = [
            EngineCall::UnpublishTrack(screen),
            EngineCall::StopScreenCapture(screen),
            EngineCall::ReleaseTrack(screen),
            EngineCall::StopCaptureService,
        ];
        let positions: Vec<_> = order
            .iter()
            .map(|c| h.calls.position(c).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        let events = h.capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload()["screenShareEnabled"], false);
    }

    #[tokio::test]
    async fn unsolicited_permission_answer_is_ignored() {
        let mut h = connected(LoopbackConfig::default(), config());
        h.sink
            .send(EngineEvent::ScreenCapturePermission { granted: true });
        h.pump();
        assert!(h.controller.local_track(LocalSlot::Screen).is_none());
        assert!(h.capture.events().is_empty());
    }

    #[tokio::test]
    async fn remote_audio_playback_switches() {
        let mut h = connected(
            LoopbackConfig {
                remote_participants: vec![bob_with(Vec::new())],
                ..LoopbackConfig::default()
            },
            config(),
        );
        let audio = TrackPublication::new("MTaud", "microphone", TrackKind::Audio, true);
        h.remote(bob(), RemoteCallback::TrackPublished(audio.clone()));
        h.remote(bob(), RemoteCallback::TrackSubscribed(audio));
        h.pump();
        h.calls.clear();

        h.controller.set_remote_audio_playback("PAbob", false);
        h.controller.set_remote_audio_playback("PAnobody", false);
        h.controller.toggle_remote_audio(true);

        assert_eq!(
            h.calls.all(),
            [
                EngineCall::SetRemoteAudioPlayback {
                    track_sid: "MTaud".into(),
                    enabled: false,
                },
                EngineCall::SetRemoteAudioPlayback {
                    track_sid: "MTaud".into(),
                    enabled: true,
                },
            ]
        );
    }

    #[tokio::test]
    async fn send_over_data_track() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_data_track: true,
                ..config()
            },
        );
        let id = h.track_id(LocalSlot::Data);

        h.controller.send_string("hello");
        h.controller.send_binary("AQID");

        assert!(h
            .calls
            .position(&EngineCall::SendData {
                track: id,
                payload: DataPayload::Text("hello".into()),
            })
            .is_some());
        assert!(h
            .calls
            .position(&EngineCall::SendData {
                track: id,
                payload: DataPayload::Binary(vec![1, 2, 3]),
            })
            .is_some());
    }

    #[tokio::test]
    async fn malformed_base64_reports_decode_failure() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_data_track: true,
                ..config()
            },
        );
        h.controller.send_binary("not base64!");

        let events = h.capture.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name(), "onDataTrackSendFailed");
        assert_eq!(events[0].payload()["kind"], "DecodeFailure");
        assert_eq!(h.calls.count(|c| matches!(c, EngineCall::SendData { .. })), 0);
    }

    #[tokio::test]
    async fn send_without_data_track_is_noop() {
        let mut h = connected(LoopbackConfig::default(), config());
        h.controller.send_string("hello");
        h.controller.send_binary("not base64!");
        assert_eq!(h.calls.count(|c| matches!(c, EngineCall::SendData { .. })), 0);
        assert!(h.capture.events().is_empty());
    }

    #[tokio::test]
    async fn background_releases_and_resume_republishes_camera() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_video: true,
                ..config()
            },
        );
        let camera = h.track_id(LocalSlot::Camera);

        h.controller.host_paused();
        assert!(h.controller.local_track(LocalSlot::Camera).is_none());
        assert!(
            h.calls.position(&EngineCall::UnpublishTrack(camera)).unwrap()
                < h.calls.position(&EngineCall::ReleaseTrack(camera)).unwrap()
        );

        h.controller.host_resumed();
        h.pump();
        let reopened = h.track_id(LocalSlot::Camera);
        assert_ne!(reopened, camera);
        assert!(h.calls.position(&EngineCall::PublishTrack(reopened)).is_some());
        assert_eq!(
            h.capture.names(),
            [
                "onCameraWasInterrupted",
                "onCameraInterruptionEnded",
                "onLocalVideoTrackPublished"
            ]
        );
        assert_eq!(h.capture.events()[0].payload()["reason"], "App backgrounded");
    }

    #[tokio::test]
    async fn background_keeps_camera_when_asked() {
        let mut h = connected(
            LoopbackConfig::default(),
            ConnectConfig {
                enable_video: true,
                maintain_video_in_background: true,
                ..config()
            },
        );
        h.controller.host_paused();
        h.controller.host_resumed();
        assert!(h.controller.local_track(LocalSlot::Camera).is_some());
        assert!(h.capture.events().is_empty());
    }
}

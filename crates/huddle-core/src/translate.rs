//! Engine callback → host notification.
//!
//! Pure reshaping: no buffering, no reordering, at most one notification per
//! callback. Whether a callback is translated at all (and when) is decided
//! by the controller.

use crate::engine::{
    CameraCallback, EngineEvent, LocalCallback, RemoteCallback, RoomCallback, RoomInfo,
};
use crate::errors::{ErrorDetail, SessionError};
use crate::events::{ParticipantSnapshot, RoomRef, SessionEvent, TrackSnapshot};
use crate::participants::ParticipantInfo;
use crate::stats;
use crate::tracks::MediaKind;

/// Session facts the translator needs beyond the callback itself.
#[derive(Debug, Clone, Copy)]
pub struct TranslateContext<'a> {
    pub room: &'a RoomRef,
    pub local: Option<&'a ParticipantInfo>,
    pub back_camera_id: Option<&'a str>,
}

impl From<&RoomInfo> for RoomRef {
    fn from(room: &RoomInfo) -> Self {
        Self {
            room_name: room.name.clone(),
            room_sid: room.sid.clone(),
        }
    }
}

pub fn translate(event: &EngineEvent, ctx: &TranslateContext<'_>) -> Option<SessionEvent> {
    match event {
        EngineEvent::Room(callback) => translate_room(callback, ctx),
        EngineEvent::Local(callback) => translate_local(callback, ctx),
        EngineEvent::Remote { participant, callback } => translate_remote(participant, callback),
        EngineEvent::Camera(callback) => Some(translate_camera(callback, ctx)),
        EngineEvent::ScreenCapturePermission { .. } => None,
        EngineEvent::Stats(reports) => {
            Some(SessionEvent::StatsReceived(stats::collect(reports.clone())))
        }
    }
}

fn translate_room(callback: &RoomCallback, ctx: &TranslateContext<'_>) -> Option<SessionEvent> {
    let room = || ctx.room.clone();
    let event = match callback {
        RoomCallback::Connected { room, local, remotes } => {
            let local_participant = ParticipantSnapshot::from(local);
            let mut participants: Vec<_> = remotes
                .iter()
                .map(|r| ParticipantSnapshot::from(&r.info))
                .collect();
            participants.push(local_participant.clone());
            SessionEvent::Connected {
                room: RoomRef::from(room),
                participants,
                local_participant,
            }
        }
        RoomCallback::ConnectFailure { room, error } => SessionEvent::ConnectFailure {
            room: Some(RoomRef::from(room)),
            error: ErrorDetail::from(&SessionError::EngineConnectFailure(error.clone())),
        },
        RoomCallback::Reconnecting(error) => SessionEvent::Reconnecting {
            room: room(),
            error: ErrorDetail::from(error),
        },
        RoomCallback::Reconnected => SessionEvent::Reconnected { room: room() },
        RoomCallback::Disconnected(error) => SessionEvent::Disconnected {
            room: room(),
            participant: ctx.local.map(|l| l.identity.clone()),
            error: error.as_ref().map(ErrorDetail::from),
        },
        RoomCallback::ParticipantConnected(state) => SessionEvent::ParticipantConnected {
            room: room(),
            participant: ParticipantSnapshot::from(&state.info),
        },
        RoomCallback::ParticipantDisconnected(info) => SessionEvent::ParticipantDisconnected {
            room: room(),
            participant: ParticipantSnapshot::from(info),
        },
        RoomCallback::RecordingStarted => SessionEvent::RecordingStarted { room: room() },
        RoomCallback::RecordingStopped => SessionEvent::RecordingStopped { room: room() },
        RoomCallback::DominantSpeakerChanged(speaker) => SessionEvent::DominantSpeakerChanged {
            room: room(),
            participant: speaker.as_ref().map(ParticipantSnapshot::from),
        },
    };
    Some(event)
}

fn translate_local(callback: &LocalCallback, ctx: &TranslateContext<'_>) -> Option<SessionEvent> {
    let local = ctx.local.map(ParticipantSnapshot::from)?;
    let event = match callback {
        LocalCallback::TrackPublished { publication, .. } => SessionEvent::LocalTrackPublished {
            kind: publication.kind,
            participant: local,
            track: TrackSnapshot::from(publication),
        },
        LocalCallback::PublicationFailed { kind, error, .. } => {
            SessionEvent::LocalTrackPublicationFailed {
                kind: *kind,
                participant: local,
                error: ErrorDetail::from(&SessionError::PublicationFailure {
                    kind: *kind,
                    error: error.clone(),
                }),
            }
        }
        LocalCallback::NetworkQualityLevelChanged(level) => {
            SessionEvent::NetworkQualityLevelsChanged {
                participant: local,
                is_local_user: true,
                quality: level.score(),
            }
        }
    };
    Some(event)
}

fn translate_remote(
    participant: &ParticipantInfo,
    callback: &RemoteCallback,
) -> Option<SessionEvent> {
    let who = ParticipantSnapshot::from(participant);
    let event = match callback {
        RemoteCallback::TrackPublished(p) => SessionEvent::RemoteTrackPublished {
            kind: p.kind,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::TrackUnpublished(p) => SessionEvent::RemoteTrackUnpublished {
            kind: p.kind,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::TrackSubscribed(p) => SessionEvent::TrackAdded {
            kind: p.kind,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::TrackUnsubscribed(p) => SessionEvent::TrackRemoved {
            kind: p.kind,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::SubscriptionFailed { publication, error } => {
            SessionEvent::RemoteTrackSubscriptionFailed {
                kind: publication.kind,
                participant: who,
                track: TrackSnapshot::from(publication),
                error: ErrorDetail::from(&SessionError::SubscriptionFailure {
                    kind: publication.kind,
                    track_sid: publication.track_sid.clone(),
                    error: error.clone(),
                }),
            }
        }
        RemoteCallback::TrackEnabled(p) => SessionEvent::TrackEnabled {
            kind: MediaKind::from_track_kind(p.kind)?,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::TrackDisabled(p) => SessionEvent::TrackDisabled {
            kind: MediaKind::from_track_kind(p.kind)?,
            participant: who,
            track: TrackSnapshot::from(p),
        },
        RemoteCallback::NetworkQualityLevelChanged(level) => {
            SessionEvent::NetworkQualityLevelsChanged {
                participant: who,
                is_local_user: false,
                quality: level.score(),
            }
        }
    };
    Some(event)
}

fn translate_camera(callback: &CameraCallback, ctx: &TranslateContext<'_>) -> SessionEvent {
    match callback {
        CameraCallback::FirstFrameAvailable => SessionEvent::CameraDidStart,
        CameraCallback::Switched { device_id } => SessionEvent::CameraSwitched {
            is_back_camera: ctx.back_camera_id == Some(device_id.as_str()),
        },
        CameraCallback::Error { code } => SessionEvent::CameraDidStopRunning {
            error: format!("Camera error: {code}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NetworkQualityLevel, RemoteParticipantState};
    use crate::errors::EngineError;
    use crate::stats::RawStatsReport;
    use crate::tracks::{EngineTrackId, TrackKind, TrackPublication};

    fn room_ref() -> RoomRef {
        RoomRef {
            room_name: "standup".into(),
            room_sid: "RM1".into(),
        }
    }

    fn local() -> ParticipantInfo {
        ParticipantInfo::new("PAlocal", "me")
    }

    fn remote() -> ParticipantInfo {
        ParticipantInfo::new("PA2", "bob")
    }

    fn run(event: EngineEvent) -> Option<SessionEvent> {
        let room = room_ref();
        let local = local();
        let ctx = TranslateContext {
            room: &room,
            local: Some(&local),
            back_camera_id: Some("cam-back"),
        };
        translate(&event, &ctx)
    }

    #[test]
    fn connected_lists_remotes_then_local() {
        let event = run(EngineEvent::Room(RoomCallback::Connected {
            room: RoomInfo {
                sid: "RM1".into(),
                name: "standup".into(),
                media_region: None,
            },
            local: local(),
            remotes: vec![RemoteParticipantState {
                info: remote(),
                publications: Vec::new(),
            }],
        }))
        .unwrap();
        match event {
            SessionEvent::Connected { participants, local_participant, .. } => {
                let sids: Vec<_> = participants.iter().map(|p| p.sid.as_str()).collect();
                assert_eq!(sids, ["PA2", "PAlocal"]);
                assert_eq!(local_participant.identity, "me");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn disconnected_names_local_identity() {
        let event = run(EngineEvent::Room(RoomCallback::Disconnected(Some(EngineError::new(
            53001, "Signaling disconnected", "",
        )))))
        .unwrap();
        let payload = event.payload();
        assert_eq!(payload["participant"], "me");
        assert_eq!(payload["error"], "Signaling disconnected");
    }

    #[test]
    fn remote_data_enable_is_not_translated() {
        let p = TrackPublication::new("MT1", "data", TrackKind::Data, true);
        assert!(run(EngineEvent::Remote {
            participant: remote(),
            callback: RemoteCallback::TrackEnabled(p),
        })
        .is_none());
    }

    #[test]
    fn remote_video_disable_is_translated() {
        let p = TrackPublication::new("MT1", "camera", TrackKind::Video, false);
        let event = run(EngineEvent::Remote {
            participant: remote(),
            callback: RemoteCallback::TrackDisabled(p),
        })
        .unwrap();
        assert_eq!(event.name(), "onParticipantDisabledVideoTrack");
    }

    #[test]
    fn subscription_failure_carries_engine_triple() {
        let p = TrackPublication::new("MT1", "microphone", TrackKind::Audio, true);
        let event = run(EngineEvent::Remote {
            participant: remote(),
            callback: RemoteCallback::SubscriptionFailed {
                publication: p,
                error: EngineError::new(53204, "Track not found", "gone"),
            },
        })
        .unwrap();
        assert_eq!(event.name(), "onRemoteAudioTrackSubscriptionFailed");
        assert_eq!(event.payload()["code"], "53204");
        assert_eq!(event.payload()["track"]["trackSid"], "MT1");
    }

    #[test]
    fn local_publication_failure() {
        let event = run(EngineEvent::Local(LocalCallback::PublicationFailed {
            track: EngineTrackId(3),
            kind: TrackKind::Data,
            error: EngineError::new(53304, "Track name is duplicated", ""),
        }))
        .unwrap();
        assert_eq!(event.name(), "onLocalDataTrackPublicationFailed");
        assert_eq!(event.payload()["participant"]["identity"], "me");
    }

    #[test]
    fn local_callbacks_need_local_participant() {
        let room = room_ref();
        let ctx = TranslateContext {
            room: &room,
            local: None,
            back_camera_id: None,
        };
        let event = EngineEvent::Local(LocalCallback::NetworkQualityLevelChanged(
            NetworkQualityLevel::Three,
        ));
        assert!(translate(&event, &ctx).is_none());
    }

    #[test]
    fn network_quality_unknown_is_minus_one() {
        let event = run(EngineEvent::Remote {
            participant: remote(),
            callback: RemoteCallback::NetworkQualityLevelChanged(NetworkQualityLevel::Unknown),
        })
        .unwrap();
        assert_eq!(event.payload()["quality"], -1);
        assert_eq!(event.payload()["isLocalUser"], false);
    }

    #[test]
    fn camera_switch_reports_back_facing() {
        let event = run(EngineEvent::Camera(CameraCallback::Switched {
            device_id: "cam-back".into(),
        }))
        .unwrap();
        assert_eq!(event, SessionEvent::CameraSwitched { is_back_camera: true });
        let event = run(EngineEvent::Camera(CameraCallback::Error { code: 2 })).unwrap();
        assert_eq!(event.payload()["error"], "Camera error: 2");
    }

    #[test]
    fn stats_are_reshaped() {
        let event = run(EngineEvent::Stats(vec![RawStatsReport {
            peer_connection_id: "PC1".into(),
            ..Default::default()
        }]))
        .unwrap();
        assert_eq!(event.name(), "onStatsReceived");
        assert!(event.payload()["PC1"].is_object());
    }

    #[test]
    fn permission_answer_is_not_an_event() {
        assert!(run(EngineEvent::ScreenCapturePermission { granted: true }).is_none());
    }
}

use std::fmt;

use serde::Serialize;

pub const TRACK_NAME_CAMERA: &str = "camera";
pub const TRACK_NAME_MICROPHONE: &str = "microphone";
pub const TRACK_NAME_SCREEN: &str = "screen";
pub const TRACK_NAME_DATA: &str = "data";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Video => f.write_str("video"),
            Self::Data => f.write_str("data"),
        }
    }
}

/// Kinds that can be enabled/disabled independently of publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_track_kind(kind: TrackKind) -> Option<Self> {
        match kind {
            TrackKind::Audio => Some(Self::Audio),
            TrackKind::Video => Some(Self::Video),
            TrackKind::Data => None,
        }
    }
}

/// Opaque handle to a track object allocated inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineTrackId(pub u64);

/// Publication record for one track of a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackPublication {
    pub track_sid: String,
    pub track_name: String,
    pub kind: TrackKind,
    pub enabled: bool,
    /// Always false for local publications.
    pub subscribed: bool,
}

impl TrackPublication {
    pub fn new(
        track_sid: impl Into<String>,
        track_name: impl Into<String>,
        kind: TrackKind,
        enabled: bool,
    ) -> Self {
        Self {
            track_sid: track_sid.into(),
            track_name: track_name.into(),
            kind,
            enabled,
            subscribed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    Unpublished,
    /// Waiting for the session to reach `Connected`.
    Deferred,
    /// Engine has been asked to publish; no confirmation yet.
    Pending,
    Published { track_sid: String },
}

/// A local track owned by the controller. The engine object behind `id`
/// lives until the controller calls `release_track`.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    pub id: EngineTrackId,
    pub name: &'static str,
    pub kind: TrackKind,
    pub enabled: bool,
    pub publish: PublishState,
}

impl LocalTrack {
    pub fn new(id: EngineTrackId, name: &'static str, kind: TrackKind, enabled: bool) -> Self {
        Self {
            id,
            name,
            kind,
            enabled,
            publish: PublishState::Unpublished,
        }
    }

    /// True once the engine was asked to publish, confirmed or not.
    pub fn is_published(&self) -> bool {
        matches!(
            self.publish,
            PublishState::Pending | PublishState::Published { .. }
        )
    }

    pub fn track_sid(&self) -> Option<&str> {
        match &self.publish {
            PublishState::Published { track_sid } => Some(track_sid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_local_track_is_unpublished() {
        let track = LocalTrack::new(EngineTrackId(1), TRACK_NAME_CAMERA, TrackKind::Video, true);
        assert!(!track.is_published());
        assert!(track.track_sid().is_none());
    }

    #[test]
    fn pending_counts_as_published() {
        let mut track = LocalTrack::new(EngineTrackId(1), TRACK_NAME_DATA, TrackKind::Data, true);
        track.publish = PublishState::Pending;
        assert!(track.is_published());
        track.publish = PublishState::Deferred;
        assert!(!track.is_published());
    }

    #[test]
    fn data_has_no_media_kind() {
        assert_eq!(MediaKind::from_track_kind(TrackKind::Audio), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_track_kind(TrackKind::Data), None);
    }
}

//! Reshapes raw engine statistics into the uniform per-track report the
//! host receives with `StatsReceived`.
//!
//! Purely representational: one flat record per track, grouped by peer
//! connection id. Nothing is aggregated or interpreted.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BaseTrackStats {
    pub track_sid: String,
    pub codec: String,
    pub packets_lost: i32,
    pub ssrc: String,
    pub timestamp: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalAudioTrackStats {
    pub base: BaseTrackStats,
    pub bytes_sent: u64,
    pub packets_sent: i32,
    pub round_trip_time: i64,
    pub audio_level: i32,
    pub jitter: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LocalVideoTrackStats {
    pub base: BaseTrackStats,
    pub bytes_sent: u64,
    pub packets_sent: i32,
    pub round_trip_time: i64,
    pub dimensions: Dimensions,
    pub frame_rate: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteAudioTrackStats {
    pub base: BaseTrackStats,
    pub bytes_received: u64,
    pub packets_received: i32,
    pub audio_level: i32,
    pub jitter: i32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteVideoTrackStats {
    pub base: BaseTrackStats,
    pub bytes_received: u64,
    pub packets_received: i32,
    pub dimensions: Dimensions,
    pub frame_rate: i32,
}

/// One engine report for a single peer connection.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawStatsReport {
    pub peer_connection_id: String,
    pub local_audio: Vec<LocalAudioTrackStats>,
    pub local_video: Vec<LocalVideoTrackStats>,
    pub remote_audio: Vec<RemoteAudioTrackStats>,
    pub remote_video: Vec<RemoteVideoTrackStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStatsRecord {
    pub track_sid: String,
    pub codec: String,
    pub packets_lost: i32,
    pub ssrc: String,
    pub timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_sent: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_sent: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_trip_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packets_received: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_level: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<i32>,
}

impl TrackStatsRecord {
    fn from_base(base: BaseTrackStats) -> Self {
        Self {
            track_sid: base.track_sid,
            codec: base.codec,
            packets_lost: base.packets_lost,
            ssrc: base.ssrc,
            timestamp: base.timestamp,
            bytes_sent: None,
            packets_sent: None,
            round_trip_time: None,
            bytes_received: None,
            packets_received: None,
            audio_level: None,
            jitter: None,
            dimensions: None,
            frame_rate: None,
        }
    }
}

impl From<LocalAudioTrackStats> for TrackStatsRecord {
    fn from(s: LocalAudioTrackStats) -> Self {
        Self {
            bytes_sent: Some(s.bytes_sent),
            packets_sent: Some(s.packets_sent),
            round_trip_time: Some(s.round_trip_time),
            audio_level: Some(s.audio_level),
            jitter: Some(s.jitter),
            ..Self::from_base(s.base)
        }
    }
}

impl From<LocalVideoTrackStats> for TrackStatsRecord {
    fn from(s: LocalVideoTrackStats) -> Self {
        Self {
            bytes_sent: Some(s.bytes_sent),
            packets_sent: Some(s.packets_sent),
            round_trip_time: Some(s.round_trip_time),
            dimensions: Some(s.dimensions),
            frame_rate: Some(s.frame_rate),
            ..Self::from_base(s.base)
        }
    }
}

impl From<RemoteAudioTrackStats> for TrackStatsRecord {
    fn from(s: RemoteAudioTrackStats) -> Self {
        Self {
            bytes_received: Some(s.bytes_received),
            packets_received: Some(s.packets_received),
            audio_level: Some(s.audio_level),
            jitter: Some(s.jitter),
            ..Self::from_base(s.base)
        }
    }
}

impl From<RemoteVideoTrackStats> for TrackStatsRecord {
    fn from(s: RemoteVideoTrackStats) -> Self {
        Self {
            bytes_received: Some(s.bytes_received),
            packets_received: Some(s.packets_received),
            dimensions: Some(s.dimensions),
            frame_rate: Some(s.frame_rate),
            ..Self::from_base(s.base)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub remote_audio_track_stats: Vec<TrackStatsRecord>,
    pub remote_video_track_stats: Vec<TrackStatsRecord>,
    pub local_audio_track_stats: Vec<TrackStatsRecord>,
    pub local_video_track_stats: Vec<TrackStatsRecord>,
}

/// Stats keyed by peer connection id.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct StatsReport {
    pub connections: BTreeMap<String, ConnectionStats>,
}

impl StatsReport {
    pub fn track_count(&self) -> usize {
        self.connections
            .values()
            .map(|c| {
                c.remote_audio_track_stats.len()
                    + c.remote_video_track_stats.len()
                    + c.local_audio_track_stats.len()
                    + c.local_video_track_stats.len()
            })
            .sum()
    }
}

pub fn collect(reports: Vec<RawStatsReport>) -> StatsReport {
    let mut out = StatsReport::default();
    for report in reports {
        let connection = out.connections.entry(report.peer_connection_id).or_default();
        connection
            .remote_audio_track_stats
            .extend(report.remote_audio.into_iter().map(TrackStatsRecord::from));
        connection
            .remote_video_track_stats
            .extend(report.remote_video.into_iter().map(TrackStatsRecord::from));
        connection
            .local_audio_track_stats
            .extend(report.local_audio.into_iter().map(TrackStatsRecord::from));
        connection
            .local_video_track_stats
            .extend(report.local_video.into_iter().map(TrackStatsRecord::from));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(sid: &str) -> BaseTrackStats {
        BaseTrackStats {
            track_sid: sid.to_string(),
            codec: "opus".to_string(),
            packets_lost: 2,
            ssrc: "1234".to_string(),
            timestamp: 1_700_000_000.5,
        }
    }

    #[test]
    fn groups_by_connection() {
        let reports = vec![
            RawStatsReport {
                peer_connection_id: "PC1".into(),
                local_audio: vec![LocalAudioTrackStats { base: base("MT1"), ..Default::default() }],
                ..Default::default()
            },
            RawStatsReport {
                peer_connection_id: "PC2".into(),
                remote_audio: vec![RemoteAudioTrackStats {
                    base: base("MT2"),
                    ..Default::default()
                }],
                remote_video: vec![RemoteVideoTrackStats {
                    base: base("MT3"),
                    ..Default::default()
                }],
                ..Default::default()
            },
        ];
        let report = collect(reports);
        assert_eq!(report.connections.len(), 2);
        assert_eq!(report.track_count(), 3);
        assert_eq!(report.connections["PC2"].remote_video_track_stats[0].track_sid, "MT3");
    }

    #[test]
    fn local_audio_record_has_sent_fields_only() {
        let record = TrackStatsRecord::from(LocalAudioTrackStats {
            base: base("MT1"),
            bytes_sent: 4096,
            packets_sent: 40,
            round_trip_time: 12,
            audio_level: 300,
            jitter: 4,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["bytesSent"], 4096);
        assert_eq!(json["audioLevel"], 300);
        assert_eq!(json["packetsLost"], 2);
        assert!(json.get("bytesReceived").is_none());
        assert!(json.get("dimensions").is_none());
    }

    #[test]
    fn remote_video_record_flattens_dimensions() {
        let record = TrackStatsRecord::from(RemoteVideoTrackStats {
            base: base("MT9"),
            bytes_received: 10,
            packets_received: 1,
            dimensions: Dimensions { width: 640, height: 480 },
            frame_rate: 24,
        });
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["dimensions"]["width"], 640);
        assert_eq!(json["frameRate"], 24);
        assert!(json.get("bytesSent").is_none());
        assert!(json.get("jitter").is_none());
    }

    #[test]
    fn report_serializes_keyed_by_connection() {
        let report = collect(vec![RawStatsReport {
            peer_connection_id: "PC1".into(),
            ..Default::default()
        }]);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["PC1"]["localVideoTrackStats"].as_array().unwrap().is_empty());
    }

    #[test]
    fn empty_input_gives_empty_report() {
        assert_eq!(collect(Vec::new()).track_count(), 0);
    }
}

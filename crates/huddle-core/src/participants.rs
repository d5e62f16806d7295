use crate::tracks::{TrackKind, TrackPublication};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParticipantInfo {
    pub sid: String,
    pub identity: String,
}

impl ParticipantInfo {
    pub fn new(sid: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            identity: identity.into(),
        }
    }
}

/// One endpoint in the session and its publications, in the order they
/// were first seen.
#[derive(Debug, Clone)]
pub struct Participant {
    pub info: ParticipantInfo,
    publications: Vec<TrackPublication>,
    /// Enable/disable callbacks that arrived before the publication itself.
    held_enablement: Vec<(String, bool)>,
}

impl Participant {
    pub fn new(info: ParticipantInfo) -> Self {
        Self {
            info,
            publications: Vec::new(),
            held_enablement: Vec::new(),
        }
    }

    pub fn sid(&self) -> &str {
        &self.info.sid
    }

    pub fn publications(&self) -> &[TrackPublication] {
        &self.publications
    }

    pub fn publications_of(&self, kind: TrackKind) -> impl Iterator<Item = &TrackPublication> {
        self.publications.iter().filter(move |p| p.kind == kind)
    }

    pub fn publication(&self, track_sid: &str) -> Option<&TrackPublication> {
        self.publications.iter().find(|p| p.track_sid == track_sid)
    }

    pub fn publication_mut(&mut self, track_sid: &str) -> Option<&mut TrackPublication> {
        self.publications.iter_mut().find(|p| p.track_sid == track_sid)
    }

    fn push_publication(&mut self, publication: TrackPublication) {
        self.publications.push(publication);
    }

    pub fn remove_publication(&mut self, track_sid: &str) -> Option<TrackPublication> {
        let idx = self.publications.iter().position(|p| p.track_sid == track_sid)?;
        self.held_enablement.retain(|(sid, _)| sid != track_sid);
        Some(self.publications.remove(idx))
    }

    /// Remember an enable/disable for a track not announced yet. Only the
    /// latest value per track is kept.
    pub fn hold_enablement(&mut self, track_sid: &str, enabled: bool) {
        match self.held_enablement.iter_mut().find(|(sid, _)| sid == track_sid) {
            Some(entry) => entry.1 = enabled,
            None => self.held_enablement.push((track_sid.to_string(), enabled)),
        }
    }

    pub fn take_held_enablement(&mut self, track_sid: &str) -> Option<bool> {
        let idx = self.held_enablement.iter().position(|(sid, _)| sid == track_sid)?;
        Some(self.held_enablement.remove(idx).1)
    }
}

/// Local participant, remote participants and the dominant speaker of one
/// session.
///
/// Updated only by the session controller on its owner task.
#[derive(Debug, Clone, Default)]
pub struct ParticipantRoster {
    local: Option<Participant>,
    remotes: Vec<Participant>,
    dominant_speaker: Option<String>,
}

impl ParticipantRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_local(&mut self, info: ParticipantInfo) {
        self.local = Some(Participant::new(info));
    }

    pub fn local(&self) -> Option<&Participant> {
        self.local.as_ref()
    }

    pub fn local_mut(&mut self) -> Option<&mut Participant> {
        self.local.as_mut()
    }

    /// Returns false if a participant with the same SID is already present.
    pub fn add_remote(&mut self, info: ParticipantInfo) -> bool {
        if self.remotes.iter().any(|p| p.info.sid == info.sid) {
            return false;
        }
        self.remotes.push(Participant::new(info));
        true
    }

    pub fn remove_remote(&mut self, sid: &str) -> Option<Participant> {
        let idx = self.remotes.iter().position(|p| p.info.sid == sid)?;
        if self.dominant_speaker.as_deref() == Some(sid) {
            self.dominant_speaker = None;
        }
        Some(self.remotes.remove(idx))
    }

    pub fn remotes(&self) -> &[Participant] {
        &self.remotes
    }

    pub fn remote(&self, sid: &str) -> Option<&Participant> {
        self.remotes.iter().find(|p| p.info.sid == sid)
    }

    pub fn remote_mut(&mut self, sid: &str) -> Option<&mut Participant> {
        self.remotes.iter_mut().find(|p| p.info.sid == sid)
    }

    pub fn set_dominant_speaker(&mut self, sid: Option<String>) {
        self.dominant_speaker = sid;
    }

    pub fn dominant_speaker(&self) -> Option<&Participant> {
        let sid = self.dominant_speaker.as_deref()?;
        self.remote(sid)
    }

    pub fn contains_track(&self, track_sid: &str) -> bool {
        self.local
            .iter()
            .chain(self.remotes.iter())
            .any(|p| p.publication(track_sid).is_some())
    }

    /// Insert a publication for the local participant (`None`) or a remote
    /// one. Refuses track SIDs already used anywhere in the session.
    pub fn insert_publication(
        &mut self,
        participant_sid: Option<&str>,
        publication: TrackPublication,
    ) -> bool {
        if self.contains_track(&publication.track_sid) {
            tracing::warn!(
                "refusing duplicate track sid {} in session",
                publication.track_sid
            );
            return false;
        }
        let owner = match participant_sid {
            None => self.local.as_mut(),
            Some(sid) => self.remote_mut(sid),
        };
        match owner {
            Some(p) => {
                p.push_publication(publication);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(sid: &str) -> ParticipantInfo {
        ParticipantInfo::new(sid, format!("identity-{sid}"))
    }

    fn publication(sid: &str, kind: TrackKind) -> TrackPublication {
        TrackPublication::new(sid, "t", kind, true)
    }

    #[test]
    fn add_and_retrieve_remote() {
        let mut roster = ParticipantRoster::new();
        assert!(roster.add_remote(info("p1")));
        assert_eq!(roster.remote("p1").unwrap().info.identity, "identity-p1");
        assert_eq!(roster.remotes().len(), 1);
    }

    #[test]
    fn no_duplicate_remotes() {
        let mut roster = ParticipantRoster::new();
        roster.add_remote(info("p1"));
        assert!(!roster.add_remote(info("p1")));
        assert_eq!(roster.remotes().len(), 1);
    }

    #[test]
    fn removing_dominant_speaker_clears_it() {
        let mut roster = ParticipantRoster::new();
        roster.add_remote(info("p1"));
        roster.set_dominant_speaker(Some("p1".into()));
        assert!(roster.dominant_speaker().is_some());
        roster.remove_remote("p1");
        assert!(roster.dominant_speaker().is_none());
    }

    #[test]
    fn publications_keep_insertion_order() {
        let mut roster = ParticipantRoster::new();
        roster.add_remote(info("p1"));
        roster.insert_publication(Some("p1"), publication("MT3", TrackKind::Video));
        roster.insert_publication(Some("p1"), publication("MT1", TrackKind::Audio));
        roster.insert_publication(Some("p1"), publication("MT2", TrackKind::Data));
        let sids: Vec<_> = roster
            .remote("p1")
            .unwrap()
            .publications()
            .iter()
            .map(|p| p.track_sid.as_str())
            .collect();
        assert_eq!(sids, ["MT3", "MT1", "MT2"]);
    }

    #[test]
    fn track_sid_unique_across_session() {
        let mut roster = ParticipantRoster::new();
        roster.set_local(info("local"));
        roster.add_remote(info("p1"));
        assert!(roster.insert_publication(None, publication("MT1", TrackKind::Audio)));
        assert!(!roster.insert_publication(Some("p1"), publication("MT1", TrackKind::Audio)));
        assert!(roster.remote("p1").unwrap().publications().is_empty());
    }

    #[test]
    fn insert_for_unknown_participant_fails() {
        let mut roster = ParticipantRoster::new();
        assert!(!roster.insert_publication(Some("ghost"), publication("MT1", TrackKind::Audio)));
        assert!(!roster.insert_publication(None, publication("MT1", TrackKind::Audio)));
    }

    #[test]
    fn held_enablement_keeps_latest() {
        let mut p = Participant::new(info("p1"));
        p.hold_enablement("MT1", false);
        p.hold_enablement("MT1", true);
        assert_eq!(p.take_held_enablement("MT1"), Some(true));
        assert_eq!(p.take_held_enablement("MT1"), None);
    }
}

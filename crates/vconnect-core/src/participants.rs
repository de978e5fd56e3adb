use crate::events::{ParticipantInfo, TrackKind};
use crate::platform::{ParticipantSnapshot, TrackPublication};

/// One roster entry: identity plus its current publications.
#[derive(Debug, Clone)]
pub struct RosterEntry<T> {
    pub info: ParticipantInfo,
    pub publications: Vec<TrackPublication<T>>,
}

impl<T> RosterEntry<T> {
    fn from_snapshot(snapshot: ParticipantSnapshot<T>, is_local: bool) -> Self {
        Self {
            info: ParticipantInfo {
                sid: snapshot.sid,
                identity: snapshot.identity,
                name: snapshot.name.filter(|n| !n.is_empty()),
                is_local,
            },
            publications: snapshot.publications,
        }
    }

    pub fn snapshot(&self) -> ParticipantSnapshot<T>
    where
        T: Clone,
    {
        ParticipantSnapshot {
            sid: self.info.sid.clone(),
            identity: self.info.identity.clone(),
            name: self.info.name.clone(),
            publications: self.publications.clone(),
        }
    }

    fn publication_mut(&mut self, track_sid: &str) -> Option<&mut TrackPublication<T>> {
        self.publications.iter_mut().find(|p| p.sid == track_sid)
    }
}

/// Manages the participants of one session.
///
/// Entries are keyed by platform SID: identities are not unique across
/// reconnects, so a rejoin under the same identity is a separate entry.
#[derive(Debug, Clone)]
pub struct ParticipantRoster<T> {
    local: Option<RosterEntry<T>>,
    remotes: Vec<RosterEntry<T>>,
}

impl<T> Default for ParticipantRoster<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ParticipantRoster<T> {
    pub fn new() -> Self {
        Self {
            local: None,
            remotes: Vec::new(),
        }
    }

    pub fn set_local(&mut self, snapshot: ParticipantSnapshot<T>) {
        self.local = Some(RosterEntry::from_snapshot(snapshot, true));
    }

    pub fn local(&self) -> Option<&RosterEntry<T>> {
        self.local.as_ref()
    }

    /// Returns false when an entry with the same SID is already present.
    pub fn add_remote(&mut self, snapshot: ParticipantSnapshot<T>) -> bool {
        if self.contains(&snapshot.sid) {
            return false;
        }
        self.remotes.push(RosterEntry::from_snapshot(snapshot, false));
        true
    }

    pub fn remove_remote(&mut self, sid: &str) -> Option<RosterEntry<T>> {
        let idx = self.remotes.iter().position(|p| p.info.sid == sid)?;
        Some(self.remotes.remove(idx))
    }

    pub fn contains(&self, sid: &str) -> bool {
        self.local.as_ref().is_some_and(|l| l.info.sid == sid)
            || self.remotes.iter().any(|p| p.info.sid == sid)
    }

    pub fn get(&self, sid: &str) -> Option<&RosterEntry<T>> {
        self.local
            .as_ref()
            .filter(|l| l.info.sid == sid)
            .or_else(|| self.remotes.iter().find(|p| p.info.sid == sid))
    }

    fn get_mut(&mut self, sid: &str) -> Option<&mut RosterEntry<T>> {
        if self.local.as_ref().is_some_and(|l| l.info.sid == sid) {
            return self.local.as_mut();
        }
        self.remotes.iter_mut().find(|p| p.info.sid == sid)
    }

    pub fn remotes(&self) -> &[RosterEntry<T>] {
        &self.remotes
    }

    /// Local participant first, then remotes in join order.
    pub fn infos(&self) -> Vec<ParticipantInfo> {
        self.local
            .iter()
            .chain(self.remotes.iter())
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.remotes.len() + usize::from(self.local.is_some())
    }

    /// Bind a subscribed track to its publication, creating the slot if the
    /// platform never announced it.
    pub fn track_subscribed(&mut self, participant_sid: &str, publication: TrackPublication<T>) {
        let Some(entry) = self.get_mut(participant_sid) else {
            return;
        };
        match entry.publication_mut(&publication.sid) {
            Some(existing) => {
                existing.track = publication.track;
                if publication.enabled.is_some() {
                    existing.enabled = publication.enabled;
                }
            }
            None => entry.publications.push(publication),
        }
    }

    pub fn track_unsubscribed(&mut self, participant_sid: &str, track_sid: &str) {
        if let Some(pub_) = self
            .get_mut(participant_sid)
            .and_then(|e| e.publication_mut(track_sid))
        {
            pub_.track = None;
        }
    }

    pub fn set_track_enabled(&mut self, participant_sid: &str, track_sid: &str, enabled: bool) {
        if let Some(pub_) = self
            .get_mut(participant_sid)
            .and_then(|e| e.publication_mut(track_sid))
        {
            pub_.enabled = Some(enabled);
        }
    }

    /// Number of publications of `kind` with a bound track.
    pub fn live_track_count(&self, participant_sid: &str, kind: TrackKind) -> usize {
        self.get(participant_sid)
            .map(|e| {
                e.publications
                    .iter()
                    .filter(|p| p.kind == kind && p.track.is_some())
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.local = None;
        self.remotes.clear();
    }
}

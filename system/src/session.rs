use crate::{DisplayName, DrawingElement, ElementLog, ParticipantId, SessionCode, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: DisplayName,
    pub is_owner: bool,
    pub joined_at: Timestamp,
    pub muted: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, name: DisplayName, joined_at: Timestamp) -> Self {
        Self {
            id,
            name,
            is_owner: false,
            joined_at,
            muted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub code: SessionCode,
    pub members: Vec<Participant>,
    pub elements: Vec<DrawingElement>,
}

pub struct Session {
    pub code: SessionCode,
    pub created_at: Timestamp,
    /// Join order.
    pub members: Vec<Participant>,
    pub elements: ElementLog,
    pub capacity: usize,
    /// Set while the session has no members.
    pub emptied_at: Option<Timestamp>,
}

impl Session {
    pub fn new(code: SessionCode, capacity: usize, now: Timestamp) -> Self {
        Self {
            code,
            created_at: now,
            members: Vec::new(),
            elements: ElementLog::new(),
            capacity,
            emptied_at: Some(now),
        }
    }

    pub fn member(&self, id: &ParticipantId) -> Option<&Participant> {
        self.members.iter().find(|m| &m.id == id)
    }

    pub fn member_mut(&mut self, id: &ParticipantId) -> Option<&mut Participant> {
        self.members.iter_mut().find(|m| &m.id == id)
    }

    pub fn is_member(&self, id: &ParticipantId) -> bool {
        self.member(id).is_some()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn owner(&self) -> Option<&Participant> {
        self.members.iter().find(|m| m.is_owner)
    }

    pub fn member_ids(&self) -> Vec<ParticipantId> {
        self.members.iter().map(|m| m.id).collect()
    }

    /// Adds a member; the first member of an empty session becomes owner.
    pub fn add_member(&mut self, mut participant: Participant) -> &Participant {
        participant.is_owner = self.members.is_empty();
        self.emptied_at = None;
        self.members.push(participant);
        &self.members[self.members.len() - 1]
    }

    /// Removes a member and, if it was the owner, hands ownership to the
    /// earliest-joined member left. Returns the removed record and the new
    /// owner, if ownership moved.
    pub fn remove_member(
        &mut self,
        id: &ParticipantId,
        now: Timestamp,
    ) -> Option<(Participant, Option<ParticipantId>)> {
        let position = self.members.iter().position(|m| &m.id == id)?;
        let departed = self.members.remove(position);

        if self.members.is_empty() {
            self.emptied_at = Some(now);
            return Some((departed, None));
        }

        let mut new_owner = None;
        if departed.is_owner {
            // min_by_key keeps the first of equal keys, so join order breaks ties.
            if let Some(heir) = self.members.iter_mut().min_by_key(|m| m.joined_at) {
                heir.is_owner = true;
                new_owner = Some(heir.id);
            }
        }
        Some((departed, new_owner))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            code: self.code.clone(),
            members: self.members.clone(),
            elements: self.elements.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: u32, joined_at: u64) -> Participant {
        Participant::new(
            ParticipantId(id),
            DisplayName::parse(&format!("user{}", id)).expect(""),
            Timestamp(joined_at),
        )
    }

    #[test]
    fn first_member_becomes_owner() {
        let mut session = Session::new(SessionCode::parse("ABCD").expect(""), 10, Timestamp(0));
        session.add_member(participant(5, 0));
        session.add_member(participant(2, 1));
        assert_eq!(session.owner().map(|o| o.id), Some(ParticipantId(5)));
        assert!(session.members.iter().all(|m| m.muted));
    }

    #[test]
    fn ownership_goes_to_earliest_joined_member() {
        let mut session = Session::new(SessionCode::parse("ABCD").expect(""), 10, Timestamp(0));
        session.add_member(participant(1, 0));
        session.add_member(participant(2, 5));
        session.add_member(participant(3, 7));

        let (departed, new_owner) = session
            .remove_member(&ParticipantId(1), Timestamp(9))
            .expect("");

        assert!(departed.is_owner);
        assert_eq!(new_owner, Some(ParticipantId(2)));
        assert_eq!(session.members.iter().filter(|m| m.is_owner).count(), 1);
    }

    #[test]
    fn removing_last_member_marks_session_empty() {
        let mut session = Session::new(SessionCode::parse("ABCD").expect(""), 10, Timestamp(0));
        session.add_member(participant(1, 0));
        session.remove_member(&ParticipantId(1), Timestamp(42)).expect("");
        assert_eq!(session.emptied_at, Some(Timestamp(42)));
    }
}

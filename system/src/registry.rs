//! Authoritative table of live sessions.
//!
//! Every mutation goes through `&mut self`, so whoever owns the registry is
//! the single serialization point for the sessions it holds. Membership reads
//! and element snapshots taken between two mutations are therefore always
//! consistent with each other.

use crate::{
    Clock, DisplayName, DrawingElement, ElementDraft, InvariantViolation, Participant,
    ParticipantId, Phase, Session, SessionCode, SessionError, SessionSnapshot, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CAPACITY: usize = 10;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub capacity: usize,
    /// How long a memberless session may linger before the sweep drops it.
    pub retention: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retention: DEFAULT_RETENTION,
        }
    }
}

/// A change to one session that every member must eventually observe.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionDelta {
    MemberJoined {
        member: Participant,
    },
    MemberLeft {
        id: ParticipantId,
        new_owner: Option<ParticipantId>,
    },
    ElementAdded {
        element: DrawingElement,
    },
    CanvasCleared {
        by: ParticipantId,
    },
    ElementUndone {
        by: ParticipantId,
        removed: DrawingElement,
    },
    VoiceMuted {
        id: ParticipantId,
        muted: bool,
    },
    VoiceLinkChanged {
        id: ParticipantId,
        peer_id: ParticipantId,
        phase: Phase,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub rejoined: bool,
    pub snapshot: SessionSnapshot,
    /// `None` for a rejoin, which changes nothing others need to see.
    pub delta: Option<SessionDelta>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// The session had no members left and is gone.
    SessionDeleted,
    Left {
        departed: Participant,
        delta: SessionDelta,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_sessions: usize,
    pub total_participants: usize,
    pub active_sessions: usize,
}

pub struct SessionRegistry {
    sessions: HashMap<SessionCode, Session>,
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: HashMap::new(),
            config,
            clock,
        }
    }

    pub fn has_session(&self, code: &SessionCode) -> bool {
        self.sessions.contains_key(code)
    }

    pub fn session(&self, code: &SessionCode) -> Option<&Session> {
        self.sessions.get(code)
    }

    pub fn create_session(
        &mut self,
        code: SessionCode,
        owner_id: ParticipantId,
        owner_name: DisplayName,
    ) -> Result<SessionSnapshot, SessionError> {
        if self.sessions.contains_key(&code) {
            return Err(SessionError::AlreadyExists);
        }
        let now = self.clock.now();
        let mut session = Session::new(code.clone(), self.config.capacity, now);
        session.add_member(Participant::new(owner_id, owner_name, now));
        let snapshot = session.snapshot();
        self.sessions.insert(code.clone(), session);
        log::info!("Participant {} created session {}", owner_id, code);
        Ok(snapshot)
    }

    pub fn join_session(
        &mut self,
        code: &SessionCode,
        id: ParticipantId,
        name: DisplayName,
    ) -> Result<JoinOutcome, SessionError> {
        let now = self.clock.now();
        let session = self.sessions.get_mut(code).ok_or(SessionError::NotFound)?;

        if session.is_member(&id) {
            log::info!("Participant {} rejoined session {}", id, code);
            return Ok(JoinOutcome {
                rejoined: true,
                snapshot: session.snapshot(),
                delta: None,
            });
        }
        if session.is_full() {
            return Err(SessionError::Full);
        }

        let member = session.add_member(Participant::new(id, name, now)).clone();
        log::info!("Participant {} joined session {}", id, code);
        Ok(JoinOutcome {
            rejoined: false,
            snapshot: session.snapshot(),
            delta: Some(SessionDelta::MemberJoined { member }),
        })
    }

    pub fn leave_session(
        &mut self,
        code: &SessionCode,
        id: &ParticipantId,
    ) -> Result<LeaveOutcome, SessionError> {
        let now = self.clock.now();
        let session = self.sessions.get_mut(code).ok_or(SessionError::NotInSession)?;
        let (departed, new_owner) = session
            .remove_member(id, now)
            .ok_or(SessionError::NotInSession)?;
        log::info!("Participant {} left session {}", id, code);

        if session.members.is_empty() {
            self.sessions.remove(code);
            log::info!("Session {} deleted, no members left", code);
            return Ok(LeaveOutcome::SessionDeleted);
        }
        if let Some(owner) = new_owner {
            log::info!("Ownership of session {} moved to {}", code, owner);
        }
        Ok(LeaveOutcome::Left {
            departed,
            delta: SessionDelta::MemberLeft { id: *id, new_owner },
        })
    }

    pub fn list_members(&self, code: &SessionCode) -> Result<&[Participant], SessionError> {
        self.sessions
            .get(code)
            .map(|s| s.members.as_slice())
            .ok_or(SessionError::NotFound)
    }

    pub fn elements(&self, code: &SessionCode) -> Result<&[DrawingElement], SessionError> {
        self.sessions
            .get(code)
            .map(|s| s.elements.elements())
            .ok_or(SessionError::NotFound)
    }

    pub fn append_element(
        &mut self,
        code: &SessionCode,
        author: ParticipantId,
        draft: ElementDraft,
    ) -> Result<SessionDelta, SessionError> {
        let now = self.clock.now();
        let session = self.member_session_mut(code, &author)?;
        let element = session.elements.append(draft, author, now).clone();
        Ok(SessionDelta::ElementAdded { element })
    }

    pub fn clear_elements(
        &mut self,
        code: &SessionCode,
        by: ParticipantId,
    ) -> Result<SessionDelta, SessionError> {
        let session = self.member_session_mut(code, &by)?;
        session.elements.clear();
        Ok(SessionDelta::CanvasCleared { by })
    }

    /// `Ok(None)` when the log was already empty.
    pub fn undo_last(
        &mut self,
        code: &SessionCode,
        by: ParticipantId,
    ) -> Result<Option<SessionDelta>, SessionError> {
        let session = self.member_session_mut(code, &by)?;
        Ok(session
            .elements
            .undo_last()
            .map(|removed| SessionDelta::ElementUndone { by, removed }))
    }

    pub fn set_muted(
        &mut self,
        code: &SessionCode,
        id: ParticipantId,
        muted: bool,
    ) -> Result<SessionDelta, SessionError> {
        let session = self.member_session_mut(code, &id)?;
        if let Some(member) = session.member_mut(&id) {
            member.muted = muted;
        }
        Ok(SessionDelta::VoiceMuted { id, muted })
    }

    pub fn report_link(
        &mut self,
        code: &SessionCode,
        id: ParticipantId,
        peer_id: ParticipantId,
        phase: Phase,
    ) -> Result<SessionDelta, SessionError> {
        let session = self.member_session_mut(code, &id)?;
        if !session.is_member(&peer_id) {
            return Err(SessionError::NotInSession);
        }
        Ok(SessionDelta::VoiceLinkChanged { id, peer_id, phase })
    }

    /// Drops sessions that have had no members for longer than the retention
    /// window and returns their codes.
    pub fn sweep_idle(&mut self) -> Vec<SessionCode> {
        let now = self.clock.now();
        let retention = self.config.retention;
        let expired: Vec<SessionCode> = self
            .sessions
            .values()
            .filter(|s| s.members.is_empty())
            .filter(|s| {
                s.emptied_at
                    .map(|at| now - at > retention)
                    .unwrap_or(false)
            })
            .map(|s| s.code.clone())
            .collect();

        for code in &expired {
            self.sessions.remove(code);
            log::info!("Cleaned up inactive session: {}", code);
        }
        expired
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_sessions: self.sessions.len(),
            total_participants: self.sessions.values().map(|s| s.members.len()).sum(),
            active_sessions: self
                .sessions
                .values()
                .filter(|s| !s.members.is_empty())
                .count(),
        }
    }

    /// Checks the table-wide invariants: codes filed under their own key, no
    /// session over capacity, no duplicate members, and exactly one owner in
    /// every non-empty session.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        for (key, session) in &self.sessions {
            let code = session.code.clone();
            if key != &session.code {
                return Err(InvariantViolation::MisfiledSession {
                    code,
                    key: key.clone(),
                });
            }
            if session.members.len() > session.capacity {
                return Err(InvariantViolation::OverCapacity {
                    code,
                    members: session.members.len(),
                    capacity: session.capacity,
                });
            }
            for (i, member) in session.members.iter().enumerate() {
                if session.members[i + 1..].iter().any(|m| m.id == member.id) {
                    return Err(InvariantViolation::DuplicateMember {
                        code,
                        id: member.id,
                    });
                }
            }
            let owners = session.members.iter().filter(|m| m.is_owner).count();
            if !session.members.is_empty() && owners != 1 {
                return Err(InvariantViolation::OwnerCount { code, owners });
            }
        }
        Ok(())
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    fn member_session_mut(
        &mut self,
        code: &SessionCode,
        id: &ParticipantId,
    ) -> Result<&mut Session, SessionError> {
        match self.sessions.get_mut(code) {
            Some(session) if session.is_member(id) => Ok(session),
            Some(_) => Err(SessionError::NotInSession),
            None => Err(SessionError::NotFound),
        }
    }
}

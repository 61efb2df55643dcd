use std::collections::HashMap;
use std::sync::Arc;
use whiteboard_system::{
    Clock, DisplayName, JoinOutcome, LeaveOutcome, ParticipantId, RegistryConfig, SessionCode,
    SessionError, SessionRegistry, SessionSnapshot,
};

/// Everything one session loop owns besides its connections.
pub struct ServerState {
    pub registry: SessionRegistry,
    /// Session each participant of this loop is currently in.
    pub locations: HashMap<ParticipantId, SessionCode>,
    /// Set once the registry failed verification. New sessions and joins are
    /// refused from then on; leaves are still served.
    pub halted: bool,
}

impl ServerState {
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: SessionRegistry::new(config, clock),
            locations: HashMap::new(),
            halted: false,
        }
    }

    pub fn location(&self, id: &ParticipantId) -> Option<&SessionCode> {
        self.locations.get(id)
    }

    /// Refuses a create before anything is touched.
    pub fn admit_create(&self, code: &SessionCode) -> Result<(), SessionError> {
        if self.halted {
            return Err(SessionError::Unavailable);
        }
        if self.registry.has_session(code) {
            return Err(SessionError::AlreadyExists);
        }
        Ok(())
    }

    /// Refuses a join before anything is touched. A member may always rejoin.
    pub fn admit_join(&self, code: &SessionCode, id: &ParticipantId) -> Result<(), SessionError> {
        if self.halted {
            return Err(SessionError::Unavailable);
        }
        let session = self.registry.session(code).ok_or(SessionError::NotFound)?;
        if !session.is_member(id) && session.is_full() {
            return Err(SessionError::Full);
        }
        Ok(())
    }

    pub fn create_session(
        &mut self,
        code: SessionCode,
        id: ParticipantId,
        name: DisplayName,
    ) -> Result<SessionSnapshot, SessionError> {
        if self.halted {
            return Err(SessionError::Unavailable);
        }
        let snapshot = self.registry.create_session(code.clone(), id, name)?;
        self.locations.insert(id, code);
        Ok(snapshot)
    }

    pub fn join_session(
        &mut self,
        code: &SessionCode,
        id: ParticipantId,
        name: DisplayName,
    ) -> Result<JoinOutcome, SessionError> {
        if self.halted {
            return Err(SessionError::Unavailable);
        }
        let outcome = self.registry.join_session(code, id, name)?;
        self.locations.insert(id, code.clone());
        Ok(outcome)
    }

    pub fn leave_session(
        &mut self,
        code: &SessionCode,
        id: &ParticipantId,
    ) -> Result<LeaveOutcome, SessionError> {
        let outcome = self.registry.leave_session(code, id)?;
        if self.locations.get(id) == Some(code) {
            self.locations.remove(id);
        }
        Ok(outcome)
    }

    /// Verifies the registry, halting intake on the first violation.
    pub fn check(&mut self) -> bool {
        if self.halted {
            return false;
        }
        match self.registry.verify() {
            Ok(()) => true,
            Err(violation) => {
                log::error!("Session table is inconsistent, halting intake: {}", violation);
                self.halted = true;
                false
            }
        }
    }
}

//! Membership-checked delivery within one session.

use crate::connection_tx_storage::ConnectionTxStorage;
use thiserror::Error;
use whiteboard_system::{ParticipantId, ServerMessage, SessionCode, SessionRegistry};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("participant {0} cannot be reached in this session")]
pub struct Undeliverable(pub ParticipantId);

pub struct Relay<'a> {
    registry: &'a SessionRegistry,
    connections: &'a ConnectionTxStorage,
}

impl<'a> Relay<'a> {
    pub fn new(registry: &'a SessionRegistry, connections: &'a ConnectionTxStorage) -> Self {
        Self {
            registry,
            connections,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.registry
    }

    /// Delivers only when `target` is a current member of `code`. Nothing
    /// is queued for later.
    pub fn send_to_participant(
        &self,
        code: &SessionCode,
        target: ParticipantId,
        message: ServerMessage,
    ) -> Result<(), Undeliverable> {
        let is_member = self
            .registry
            .session(code)
            .map_or(false, |s| s.is_member(&target));
        if !is_member {
            log::warn!("Dropping message for {}, not a member of {}", target, code);
            return Err(Undeliverable(target));
        }
        if self.connections.send(&target, message) {
            Ok(())
        } else {
            Err(Undeliverable(target))
        }
    }

    /// Delivers to every member but `except`, against one membership read.
    /// Returns how many members were reached.
    pub fn broadcast(
        &self,
        code: &SessionCode,
        except: Option<ParticipantId>,
        message: ServerMessage,
    ) -> usize {
        let members = match self.registry.list_members(code) {
            Ok(members) => members,
            Err(_) => return 0,
        };
        members
            .iter()
            .filter(|m| Some(m.id) != except)
            .filter(|m| self.connections.send(&m.id, message.clone()))
            .count()
    }
}

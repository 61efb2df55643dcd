//! Turns registry deltas into the messages each member has to see.

use crate::relay::Relay;
use whiteboard_system::{ParticipantId, ServerMessage, SessionCode, SessionDelta, SessionRegistry};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Audience {
    Everyone,
    Others(ParticipantId),
}

pub fn translate(
    registry: &SessionRegistry,
    code: &SessionCode,
    delta: SessionDelta,
) -> (Audience, ServerMessage) {
    let members = || {
        registry
            .list_members(code)
            .map(|m| m.to_vec())
            .unwrap_or_default()
    };
    match delta {
        SessionDelta::MemberJoined { member } => (
            Audience::Others(member.id),
            ServerMessage::MemberJoined {
                member,
                members: members(),
            },
        ),
        SessionDelta::MemberLeft { id, .. } => (
            Audience::Everyone,
            ServerMessage::MemberLeft {
                id,
                members: members(),
            },
        ),
        SessionDelta::ElementAdded { element } => {
            (Audience::Everyone, ServerMessage::ElementAdded { element })
        }
        SessionDelta::CanvasCleared { by } => {
            (Audience::Everyone, ServerMessage::CanvasCleared { by })
        }
        SessionDelta::ElementUndone { .. } => (
            Audience::Everyone,
            ServerMessage::CanvasUpdated {
                elements: registry
                    .elements(code)
                    .map(|e| e.to_vec())
                    .unwrap_or_default(),
            },
        ),
        SessionDelta::VoiceMuted { id, muted } => {
            (Audience::Everyone, ServerMessage::VoiceStatus { id, muted })
        }
        SessionDelta::VoiceLinkChanged { id, peer_id, phase } => (
            Audience::Everyone,
            ServerMessage::VoiceLinkStatus { id, peer_id, phase },
        ),
    }
}

/// Publishes one delta to the session. Called right after the mutation that
/// produced it, so members see deltas in the order they were applied.
pub fn dispatch(relay: &Relay<'_>, code: &SessionCode, delta: SessionDelta) {
    let (audience, message) = translate(relay.registry(), code, delta);
    let except = match audience {
        Audience::Everyone => None,
        Audience::Others(id) => Some(id),
    };
    relay.broadcast(code, except, message);
}

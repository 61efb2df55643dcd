use crate::{
    Candidate, DrawingElement, ElementDraft, NegotiationError, Participant, ParticipantId, Phase,
    SessionCode, SessionDescription, SessionError, Signal,
};
use serde::{Deserialize, Serialize};

/// Everything a participant may send to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateSession {
        code: String,
        participant_name: String,
    },
    JoinSession {
        code: String,
        participant_name: String,
    },
    LeaveSession {
        code: String,
    },
    DrawAppend {
        element: ElementDraft,
    },
    /// Unfinished gesture, relayed to the others and never stored.
    DrawProgress {
        preview: ElementDraft,
    },
    DrawClear,
    DrawUndo,
    VoiceRequest,
    VoiceStop,
    VoiceMuteToggle {
        muted: bool,
    },
    VoiceLinkReport {
        peer_id: ParticipantId,
        phase: Phase,
    },
    NegotiationOffer {
        target_id: ParticipantId,
        description: SessionDescription,
    },
    NegotiationAnswer {
        target_id: ParticipantId,
        description: SessionDescription,
    },
    NegotiationCandidate {
        target_id: ParticipantId,
        candidate: Candidate,
    },
    NegotiationResponse {
        target_id: ParticipantId,
        accepted: bool,
    },
}

impl ClientMessage {
    pub fn negotiation(target: ParticipantId, signal: Signal) -> Self {
        match signal {
            Signal::Offer(description) => ClientMessage::NegotiationOffer {
                target_id: target,
                description,
            },
            Signal::Answer(description) => ClientMessage::NegotiationAnswer {
                target_id: target,
                description,
            },
            Signal::Candidate(candidate) => ClientMessage::NegotiationCandidate {
                target_id: target,
                candidate,
            },
        }
    }

    /// The target and payload of a negotiation message.
    pub fn into_signal(self) -> Result<(ParticipantId, Signal), Self> {
        match self {
            ClientMessage::NegotiationOffer {
                target_id,
                description,
            } => Ok((target_id, Signal::Offer(description))),
            ClientMessage::NegotiationAnswer {
                target_id,
                description,
            } => Ok((target_id, Signal::Answer(description))),
            ClientMessage::NegotiationCandidate {
                target_id,
                candidate,
            } => Ok((target_id, Signal::Candidate(candidate))),
            other => Err(other),
        }
    }
}

/// Everything the coordinator may send to a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Connected {
        id: ParticipantId,
    },
    SessionCreated {
        code: SessionCode,
        members: Vec<Participant>,
        elements: Vec<DrawingElement>,
    },
    SessionJoined {
        code: SessionCode,
        members: Vec<Participant>,
        elements: Vec<DrawingElement>,
        rejoined: bool,
    },
    SessionLeft {
        code: SessionCode,
    },
    SessionError {
        reason: SessionError,
    },
    MemberJoined {
        member: Participant,
        members: Vec<Participant>,
    },
    MemberLeft {
        id: ParticipantId,
        members: Vec<Participant>,
    },
    ElementAdded {
        element: DrawingElement,
    },
    CanvasCleared {
        by: ParticipantId,
    },
    CanvasUpdated {
        elements: Vec<DrawingElement>,
    },
    DrawingInProgress {
        from_id: ParticipantId,
        preview: ElementDraft,
    },
    VoiceSessionRequest {
        from_id: ParticipantId,
    },
    VoiceSessionResponse {
        from_id: ParticipantId,
        accepted: bool,
    },
    VoiceSessionStart {
        peer_ids: Vec<ParticipantId>,
    },
    VoiceSessionStop {
        id: ParticipantId,
    },
    VoiceStatus {
        id: ParticipantId,
        muted: bool,
    },
    VoiceLinkStatus {
        id: ParticipantId,
        peer_id: ParticipantId,
        phase: Phase,
    },
    NegotiationOffer {
        from_id: ParticipantId,
        description: SessionDescription,
    },
    NegotiationAnswer {
        from_id: ParticipantId,
        description: SessionDescription,
    },
    NegotiationCandidate {
        from_id: ParticipantId,
        candidate: Candidate,
    },
    NegotiationError {
        reason: NegotiationError,
    },
}

impl ServerMessage {
    pub fn negotiation(from: ParticipantId, signal: Signal) -> Self {
        match signal {
            Signal::Offer(description) => ServerMessage::NegotiationOffer {
                from_id: from,
                description,
            },
            Signal::Answer(description) => ServerMessage::NegotiationAnswer {
                from_id: from,
                description,
            },
            Signal::Candidate(candidate) => ServerMessage::NegotiationCandidate {
                from_id: from,
                candidate,
            },
        }
    }

    /// The sender and payload of a relayed negotiation message.
    pub fn signal(&self) -> Option<(ParticipantId, Signal)> {
        match self {
            ServerMessage::NegotiationOffer {
                from_id,
                description,
            } => Some((*from_id, Signal::Offer(description.clone()))),
            ServerMessage::NegotiationAnswer {
                from_id,
                description,
            } => Some((*from_id, Signal::Answer(description.clone()))),
            ServerMessage::NegotiationCandidate { from_id, candidate } => {
                Some((*from_id, Signal::Candidate(candidate.clone())))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Color, DescriptionKind, Shape};
    use euclid::default::Point2D;

    #[test]
    fn it_uses_kebab_case_tags_and_camel_case_fields_on_json() {
        let json = serde_json::to_value(&ClientMessage::VoiceMuteToggle { muted: false })
            .expect("");
        assert_eq!(json, serde_json::json!({ "voice-mute-toggle": { "muted": false } }));

        let json = serde_json::to_value(&ClientMessage::DrawUndo).expect("");
        assert_eq!(json, serde_json::json!("draw-undo"));

        let json = serde_json::to_value(&ServerMessage::VoiceSessionStart {
            peer_ids: vec![ParticipantId(2)],
        })
        .expect("");
        assert_eq!(json, serde_json::json!({ "voice-session-start": { "peerIds": [2] } }));

        let message: ClientMessage = serde_json::from_str(
            r#"{"join-session":{"code":"ABCD","participantName":"Bob"}}"#,
        )
        .expect("");
        assert_eq!(
            message,
            ClientMessage::JoinSession {
                code: "ABCD".into(),
                participant_name: "Bob".into(),
            }
        );
    }

    #[test]
    fn it_decodes_a_draw_append_from_json() {
        let raw = concat!(
            r#"{"draw-append":{"element":{"id":null,"#,
            r#""shape":{"rectangle":{"from":[1.0,2.0],"to":[3.0,4.0]}},"#,
            r#""color":{"r":1,"g":2,"b":3},"strokeWidth":2.5}}}"#,
        );
        let message: ClientMessage = serde_json::from_str(raw).expect("");
        assert_eq!(
            message,
            ClientMessage::DrawAppend {
                element: ElementDraft {
                    id: None,
                    shape: Shape::Rectangle {
                        from: Point2D::new(1.0, 2.0),
                        to: Point2D::new(3.0, 4.0),
                    },
                    color: Color { r: 1, g: 2, b: 3 },
                    stroke_width: 2.5,
                },
            }
        );
    }

    #[test]
    fn negotiation_messages_survive_bincode() {
        let message = ServerMessage::negotiation(
            ParticipantId(4),
            Signal::Candidate(Candidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.2 5000 typ host".into(),
                sdp_mid: None,
                sdp_m_line_index: Some(0),
            }),
        );
        let bytes = bincode::serialize(&message).expect("");
        let decoded: ServerMessage = bincode::deserialize(&bytes).expect("");
        assert_eq!(decoded, message);
    }

    #[test]
    fn signals_map_between_client_and_server_messages() {
        let offer = Signal::Offer(SessionDescription {
            kind: DescriptionKind::Offer,
            sdp: "v=0".into(),
        });
        let outbound = ClientMessage::negotiation(ParticipantId(2), offer.clone());
        let (target, signal) = outbound.into_signal().expect("");
        assert_eq!(target, ParticipantId(2));

        let relayed = ServerMessage::negotiation(ParticipantId(1), signal);
        assert_eq!(relayed.signal(), Some((ParticipantId(1), offer)));
        assert!(ClientMessage::DrawClear.into_signal().is_err());
    }
}

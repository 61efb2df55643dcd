//! Collaborator seams of the negotiation state machine: the platform media
//! stack below it and the signaling channel beside it.

use crate::ParticipantId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DescriptionKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: DescriptionKind,
    pub sdp: String,
}

/// A network-path candidate.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Connectivity as reported by the media transport.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectivityState {
    Connecting,
    Connected,
    /// Transient loss, may recover by itself.
    Disconnected,
    Failed,
    Closed,
}

/// The three negotiation messages carried by the relay.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(Candidate),
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::Candidate(_) => "candidate",
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{0}")]
pub struct MediaError(pub String);

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("signaling channel closed")]
pub struct TransportClosed;

/// Platform media stack, one peer connection per remote participant.
pub trait MediaLayer {
    fn create_local_description(
        &mut self,
        peer: ParticipantId,
        kind: DescriptionKind,
    ) -> Result<SessionDescription, MediaError>;

    fn accept_remote_description(
        &mut self,
        peer: ParticipantId,
        description: &SessionDescription,
    ) -> Result<(), MediaError>;

    fn add_remote_candidate(
        &mut self,
        peer: ParticipantId,
        candidate: &Candidate,
    ) -> Result<(), MediaError>;

    /// Discards an outstanding local offer.
    fn rollback_local_description(&mut self, peer: ParticipantId);

    /// Releases everything held for `peer`. Must be idempotent.
    fn close(&mut self, peer: ParticipantId);
}

/// Outbound half of the signaling relay as a participant sees it.
pub trait SignalingTransport {
    fn send(&self, target: ParticipantId, signal: Signal) -> Result<(), TransportClosed>;
}

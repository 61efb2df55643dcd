use crate::{
    Candidate, Clock, ConnectivityState, LinkEnv, LinkStatus, MediaLayer, NegotiationConfig,
    NegotiationError, ParticipantId, PeerLink, Phase, ServerMessage, Signal, SignalingTransport,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Participant-side owner of every peer link of one local participant.
///
/// Links are independent of each other; a failure on one never touches
/// another. All entry points take `&mut self`, so messages for the same pair
/// are applied one at a time.
pub struct VoiceNegotiator<M, T> {
    local: ParticipantId,
    media: M,
    transport: T,
    clock: Arc<dyn Clock>,
    config: NegotiationConfig,
    /// Failed links stay until the peer leaves so their status can still be
    /// reported, and a later `start` revives them.
    links: BTreeMap<ParticipantId, PeerLink>,
    changes: Vec<LinkStatus>,
}

impl<M, T> VoiceNegotiator<M, T>
where
    M: MediaLayer,
    T: SignalingTransport,
{
    pub fn new(
        local: ParticipantId,
        media: M,
        transport: T,
        clock: Arc<dyn Clock>,
        config: NegotiationConfig,
    ) -> Self {
        Self {
            local,
            media,
            transport,
            clock,
            config,
            links: BTreeMap::new(),
            changes: Vec::new(),
        }
    }

    pub fn local(&self) -> ParticipantId {
        self.local
    }

    pub fn media(&self) -> &M {
        &self.media
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn link(&self, peer: &ParticipantId) -> Option<&PeerLink> {
        self.links.get(peer)
    }

    pub fn links(&self) -> impl Iterator<Item = &PeerLink> {
        self.links.values()
    }

    pub fn status(&self) -> Vec<LinkStatus> {
        self.links.values().map(|l| l.status()).collect()
    }

    /// Link status changes since the last call, in the order they happened.
    pub fn consume_changes(&mut self) -> Vec<LinkStatus> {
        std::mem::take(&mut self.changes)
    }

    pub fn start(&mut self, peers: &[ParticipantId]) {
        let local = self.local;
        for peer in peers.iter().filter(|p| **p != local) {
            if let Err(e) = self.drive(*peer, true, |link, env| link.start(env)) {
                log::warn!("Could not start negotiation with {}: {}", peer, e);
            }
        }
    }

    pub fn handle_signal(
        &mut self,
        from: ParticipantId,
        signal: Signal,
    ) -> Result<(), NegotiationError> {
        // Offers and candidates may open a pair; an answer never does.
        let create = !matches!(signal, Signal::Answer(_));
        self.drive(from, create, |link, env| link.handle_signal(env, signal))
    }

    pub fn renegotiate(&mut self, peer: ParticipantId) -> Result<(), NegotiationError> {
        self.drive(peer, false, |link, env| link.renegotiate(env))
    }

    pub fn on_connectivity(
        &mut self,
        peer: ParticipantId,
        state: ConnectivityState,
    ) -> Result<(), NegotiationError> {
        self.drive(peer, false, |link, env| link.on_connectivity(env, state))
    }

    /// Forwards a locally gathered candidate to the remote side.
    pub fn on_local_candidate(
        &mut self,
        peer: ParticipantId,
        candidate: Candidate,
    ) -> Result<(), NegotiationError> {
        if !self.links.contains_key(&peer) {
            return Err(NegotiationError::Undeliverable(peer));
        }
        self.transport
            .send(peer, Signal::Candidate(candidate))
            .map_err(|_| NegotiationError::Undeliverable(peer))
    }

    pub fn set_remote_muted(&mut self, peer: ParticipantId, muted: bool) {
        if let Some(link) = self.links.get_mut(&peer) {
            if link.is_remote_muted() != muted {
                link.set_remote_muted(muted);
                self.changes.push(link.status());
            }
        }
    }

    /// Advances every link's timers to the clock's current time.
    pub fn tick(&mut self) {
        let peers: Vec<ParticipantId> = self.links.keys().cloned().collect();
        for peer in peers {
            if let Err(e) = self.drive(peer, false, |link, env| link.tick(env)) {
                log::debug!("Link with {} after tick: {}", peer, e);
            }
        }
    }

    /// Tears down the pair immediately, whatever its phase.
    pub fn remove_peer(&mut self, peer: ParticipantId) {
        if let Some(mut link) = self.links.remove(&peer) {
            let mut env = LinkEnv {
                media: &mut self.media,
                transport: &self.transport,
                config: &self.config,
                now: self.clock.now(),
            };
            link.close(&mut env);
            log::debug!("Closed link with {}", peer);
        }
    }

    /// Stops voice chat: every pair is torn down.
    pub fn stop(&mut self) {
        let peers: Vec<ParticipantId> = self.links.keys().cloned().collect();
        for peer in peers {
            self.remove_peer(peer);
        }
    }

    /// Routes the coordinator messages that concern voice negotiation.
    pub fn handle_server_message(&mut self, message: &ServerMessage) {
        if let Some((from, signal)) = message.signal() {
            if let Err(e) = self.handle_signal(from, signal) {
                log::warn!("Negotiation message from {} not applied: {}", from, e);
            }
            return;
        }
        match message {
            ServerMessage::VoiceSessionStart { peer_ids } => self.start(peer_ids),
            ServerMessage::VoiceStatus { id, muted } => self.set_remote_muted(*id, *muted),
            ServerMessage::VoiceSessionStop { id } => self.remove_peer(*id),
            ServerMessage::MemberLeft { id, .. } if *id == self.local => self.stop(),
            ServerMessage::MemberLeft { id, .. } => self.remove_peer(*id),
            ServerMessage::SessionLeft { .. } => self.stop(),
            _ => {}
        }
    }

    fn drive<F>(
        &mut self,
        peer: ParticipantId,
        create: bool,
        transition: F,
    ) -> Result<(), NegotiationError>
    where
        F: FnOnce(&mut PeerLink, &mut LinkEnv<'_>) -> Result<(), NegotiationError>,
    {
        if peer == self.local {
            return Err(NegotiationError::ProtocolViolation {
                phase: Phase::Idle,
                message: "signal addressed to self".into(),
            });
        }
        let now = self.clock.now();
        let local = self.local;
        let link = match self.links.entry(peer) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) if create => entry.insert(PeerLink::new(local, peer, now)),
            Entry::Vacant(_) => {
                return Err(NegotiationError::ProtocolViolation {
                    phase: Phase::Idle,
                    message: "message for an unknown pair".into(),
                })
            }
        };

        let before = link.status();
        let mut env = LinkEnv {
            media: &mut self.media,
            transport: &self.transport,
            config: &self.config,
            now,
        };
        let result = transition(link, &mut env);
        let after = link.status();
        if before.phase != after.phase {
            log::debug!("Link with {}: {:?} -> {:?}", peer, before.phase, after.phase);
        }
        if before != after {
            self.changes.push(after);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DescriptionKind, ManualClock, MediaError, SessionDescription, Timestamp, TransportClosed,
    };
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct NullMedia {
        closed: Vec<ParticipantId>,
    }

    impl MediaLayer for NullMedia {
        fn create_local_description(
            &mut self,
            _peer: ParticipantId,
            kind: DescriptionKind,
        ) -> Result<SessionDescription, MediaError> {
            Ok(SessionDescription {
                kind,
                sdp: String::new(),
            })
        }

        fn accept_remote_description(
            &mut self,
            _peer: ParticipantId,
            _description: &SessionDescription,
        ) -> Result<(), MediaError> {
            Ok(())
        }

        fn add_remote_candidate(
            &mut self,
            _peer: ParticipantId,
            _candidate: &Candidate,
        ) -> Result<(), MediaError> {
            Ok(())
        }

        fn rollback_local_description(&mut self, _peer: ParticipantId) {}

        fn close(&mut self, peer: ParticipantId) {
            self.closed.push(peer);
        }
    }

    #[derive(Clone, Default)]
    struct Outbox(Rc<RefCell<Vec<(ParticipantId, Signal)>>>);

    impl SignalingTransport for Outbox {
        fn send(&self, target: ParticipantId, signal: Signal) -> Result<(), TransportClosed> {
            self.0.borrow_mut().push((target, signal));
            Ok(())
        }
    }

    fn negotiator(local: u32) -> (VoiceNegotiator<NullMedia, Outbox>, Outbox, ManualClock) {
        let outbox = Outbox::default();
        let clock = ManualClock::new(Timestamp(0));
        let negotiator = VoiceNegotiator::new(
            ParticipantId(local),
            NullMedia::default(),
            outbox.clone(),
            Arc::new(clock.clone()),
            NegotiationConfig::default(),
        );
        (negotiator, outbox, clock)
    }

    #[test]
    fn start_offers_only_where_local_is_smaller() {
        let (mut negotiator, outbox, _) = negotiator(5);

        negotiator.start(&[ParticipantId(2), ParticipantId(5), ParticipantId(9)]);

        let sent = outbox.0.borrow();
        assert_eq!(sent.len(), 1);
        assert!(matches!(&sent[0], (ParticipantId(9), Signal::Offer(_))));
        assert_eq!(negotiator.link(&ParticipantId(2)).map(|l| l.phase()), Some(Phase::Idle));
        assert!(negotiator.link(&ParticipantId(5)).is_none());
    }

    #[test]
    fn offer_from_unknown_peer_opens_a_link() {
        let (mut negotiator, outbox, _) = negotiator(5);

        negotiator
            .handle_signal(
                ParticipantId(1),
                Signal::Offer(SessionDescription {
                    kind: DescriptionKind::Offer,
                    sdp: "v=0".into(),
                }),
            )
            .expect("");

        assert_eq!(
            negotiator.link(&ParticipantId(1)).map(|l| l.phase()),
            Some(Phase::Connected)
        );
        assert!(matches!(outbox.0.borrow()[0], (ParticipantId(1), Signal::Answer(_))));
    }

    #[test]
    fn answer_from_unknown_peer_is_rejected() {
        let (mut negotiator, _, _) = negotiator(5);
        let result = negotiator.handle_signal(
            ParticipantId(1),
            Signal::Answer(SessionDescription {
                kind: DescriptionKind::Answer,
                sdp: "v=0".into(),
            }),
        );
        assert!(matches!(result, Err(NegotiationError::ProtocolViolation { .. })));
        assert!(negotiator.link(&ParticipantId(1)).is_none());
    }

    #[test]
    fn member_leaving_tears_down_its_link() {
        let (mut negotiator, _, _) = negotiator(1);
        negotiator.start(&[ParticipantId(2), ParticipantId(3)]);

        negotiator.handle_server_message(&ServerMessage::MemberLeft {
            id: ParticipantId(2),
            members: Vec::new(),
        });

        assert!(negotiator.link(&ParticipantId(2)).is_none());
        assert!(negotiator.link(&ParticipantId(3)).is_some());
        assert_eq!(negotiator.media().closed, vec![ParticipantId(2)]);
    }

    #[test]
    fn stop_closes_everything() {
        let (mut negotiator, _, _) = negotiator(1);
        negotiator.start(&[ParticipantId(2), ParticipantId(3)]);
        negotiator.stop();
        assert_eq!(negotiator.links().count(), 0);
    }

    #[test]
    fn failure_of_one_pair_leaves_others_alone() {
        let (mut negotiator, _, clock) = negotiator(1);
        negotiator.start(&[ParticipantId(2), ParticipantId(3)]);
        negotiator
            .handle_signal(
                ParticipantId(3),
                Signal::Answer(SessionDescription {
                    kind: DescriptionKind::Answer,
                    sdp: "v=0".into(),
                }),
            )
            .expect("");
        negotiator
            .on_connectivity(ParticipantId(3), ConnectivityState::Connected)
            .expect("");

        for _ in 0..10 {
            clock.advance(std::time::Duration::from_secs(20));
            negotiator.tick();
        }

        assert_eq!(negotiator.link(&ParticipantId(2)).map(|l| l.phase()), Some(Phase::Failed));
        assert_eq!(
            negotiator.link(&ParticipantId(3)).map(|l| l.phase()),
            Some(Phase::Connected)
        );

        // the failed link is still reported and a new start revives it
        assert!(negotiator
            .status()
            .iter()
            .any(|s| s.peer == ParticipantId(2) && s.phase == Phase::Failed));
        negotiator.start(&[ParticipantId(2)]);
        assert_eq!(
            negotiator.link(&ParticipantId(2)).map(|l| l.phase()),
            Some(Phase::AwaitingRemote)
        );
    }

    #[test]
    fn mute_changes_are_reported_once() {
        let (mut negotiator, _, _) = negotiator(1);
        negotiator.start(&[ParticipantId(2)]);
        negotiator.consume_changes();

        negotiator.handle_server_message(&ServerMessage::VoiceStatus {
            id: ParticipantId(2),
            muted: false,
        });
        negotiator.handle_server_message(&ServerMessage::VoiceStatus {
            id: ParticipantId(2),
            muted: false,
        });

        let changes = negotiator.consume_changes();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].muted);
    }
}

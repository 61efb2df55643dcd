//! Negotiation state of one participant's view of one remote participant.
//!
//! ```text
//! Idle ──start (offerer)──▶ Offering ──▶ AwaitingRemote ──answer──▶ Connected
//! Idle ──offer──────────────▶ Answering ───────────────────────────▶ Connected
//! Connected ──failure/timeout──▶ Disconnected ──backoff──▶ Offering | Idle
//!                                       └── budget exhausted ──▶ Failed
//! ```
//!
//! Every method is one atomic transition: it reads the phase, talks to the
//! media layer and transport, and leaves the link in its next phase before
//! returning.

use crate::{
    Candidate, ConnectivityState, DescriptionKind, MediaLayer, NegotiationError, ParticipantId,
    SessionDescription, Signal, SignalingTransport, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Offerer,
    Answerer,
}

impl Role {
    /// The smaller id offers. Both sides compute the same answer.
    pub fn for_pair(local: ParticipantId, remote: ParticipantId) -> Role {
        if local < remote {
            Role::Offerer
        } else {
            Role::Answerer
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    Offering,
    AwaitingRemote,
    Answering,
    Connected,
    Disconnected,
    Failed,
}

impl Phase {
    fn has_local_offer(self) -> bool {
        matches!(self, Phase::Offering | Phase::AwaitingRemote)
    }
}

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Upper bound on any phase that waits for the remote side.
    pub connect_timeout: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl NegotiationConfig {
    /// Delay before retry number `failures`, doubling from `base_backoff`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStatus {
    pub peer: ParticipantId,
    pub role: Role,
    pub phase: Phase,
    pub attempts: u32,
    pub muted: bool,
    pub transport_confirmed: bool,
}

pub struct LinkEnv<'a> {
    pub media: &'a mut dyn MediaLayer,
    pub transport: &'a dyn SignalingTransport,
    pub config: &'a NegotiationConfig,
    pub now: Timestamp,
}

/// One side's view of the link to one peer. A `Failed` link is terminal for
/// negotiation but is kept by its owner so its status can be reported.
pub struct PeerLink {
    remote: ParticipantId,
    role: Role,
    phase: Phase,
    pending_candidates: VecDeque<Candidate>,
    remote_description_set: bool,
    transport_confirmed: bool,
    /// Consecutive failed attempts.
    attempts: u32,
    remote_muted: bool,
    last_activity: Timestamp,
    deadline: Option<Timestamp>,
    retry_at: Option<Timestamp>,
}

impl PeerLink {
    pub fn new(local: ParticipantId, remote: ParticipantId, now: Timestamp) -> Self {
        Self {
            remote,
            role: Role::for_pair(local, remote),
            phase: Phase::Idle,
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            transport_confirmed: false,
            attempts: 0,
            remote_muted: true,
            last_activity: now,
            deadline: None,
            retry_at: None,
        }
    }

    pub fn remote(&self) -> ParticipantId {
        self.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn pending_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.pending_candidates.iter()
    }

    pub fn last_activity(&self) -> Timestamp {
        self.last_activity
    }

    pub fn deadline(&self) -> Option<Timestamp> {
        self.deadline
    }

    pub fn retry_at(&self) -> Option<Timestamp> {
        self.retry_at
    }

    pub fn is_remote_muted(&self) -> bool {
        self.remote_muted
    }

    pub fn set_remote_muted(&mut self, muted: bool) {
        self.remote_muted = muted;
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus {
            peer: self.remote,
            role: self.role,
            phase: self.phase,
            attempts: self.attempts,
            muted: self.remote_muted,
            transport_confirmed: self.transport_confirmed,
        }
    }

    /// Begins negotiating. The offerer sends an offer right away; the
    /// answerer waits for one, bounded by the connect timeout. An explicit
    /// start also revives a `Failed` link with a fresh retry budget.
    pub fn start(&mut self, env: &mut LinkEnv<'_>) -> Result<(), NegotiationError> {
        match self.phase {
            Phase::Idle | Phase::Disconnected | Phase::Failed => {
                if self.phase == Phase::Failed {
                    self.attempts = 0;
                }
                self.retry_at = None;
                self.last_activity = env.now;
                match self.role {
                    Role::Offerer => self.begin_offer(env),
                    Role::Answerer => {
                        self.phase = Phase::Idle;
                        self.deadline = Some(env.now + env.config.connect_timeout);
                        Ok(())
                    }
                }
            }
            _ => Ok(()),
        }
    }

    /// Offers again over an established link. Either side may do this, which
    /// is how two offers can cross.
    pub fn renegotiate(&mut self, env: &mut LinkEnv<'_>) -> Result<(), NegotiationError> {
        if self.phase != Phase::Connected {
            return Err(self.violation("renegotiate"));
        }
        self.begin_offer(env)
    }

    pub fn handle_signal(
        &mut self,
        env: &mut LinkEnv<'_>,
        signal: Signal,
    ) -> Result<(), NegotiationError> {
        self.last_activity = env.now;
        match signal {
            Signal::Offer(description) => self.handle_offer(env, description),
            Signal::Answer(description) => self.handle_answer(env, description),
            Signal::Candidate(candidate) => self.handle_candidate(env, candidate),
        }
    }

    fn handle_offer(
        &mut self,
        env: &mut LinkEnv<'_>,
        offer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if offer.kind != DescriptionKind::Offer {
            return Err(self.violation("offer carrying an answer"));
        }
        match self.phase {
            Phase::Failed => return Err(self.violation("offer")),
            phase if phase.has_local_offer() => {
                if self.role == Role::Offerer {
                    log::debug!(
                        "Offer collision with {}, keeping our own offer",
                        self.remote
                    );
                    return Ok(());
                }
                log::debug!("Offer collision with {}, rolling back", self.remote);
                env.media.rollback_local_description(self.remote);
                self.phase = Phase::Idle;
            }
            Phase::Connected | Phase::Disconnected => {
                log::debug!("Fresh offer from {} replaces the current link", self.remote);
                env.media.close(self.remote);
                self.remote_description_set = false;
                self.transport_confirmed = false;
            }
            Phase::Idle | Phase::Answering | Phase::Offering | Phase::AwaitingRemote => {}
        }
        self.accept_offer(env, offer)
    }

    fn accept_offer(
        &mut self,
        env: &mut LinkEnv<'_>,
        offer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        self.phase = Phase::Answering;
        self.retry_at = None;

        if let Err(e) = env.media.accept_remote_description(self.remote, &offer) {
            return self.fail_attempt(env, NegotiationError::Media(e.0));
        }
        self.remote_description_set = true;
        self.flush_candidates(env);

        let answer = match env
            .media
            .create_local_description(self.remote, DescriptionKind::Answer)
        {
            Ok(answer) => answer,
            Err(e) => return self.fail_attempt(env, NegotiationError::Media(e.0)),
        };
        if env.transport.send(self.remote, Signal::Answer(answer)).is_err() {
            return self.fail_attempt(env, NegotiationError::Undeliverable(self.remote));
        }

        self.phase = Phase::Connected;
        self.transport_confirmed = false;
        self.deadline = Some(env.now + env.config.connect_timeout);
        Ok(())
    }

    fn handle_answer(
        &mut self,
        env: &mut LinkEnv<'_>,
        answer: SessionDescription,
    ) -> Result<(), NegotiationError> {
        if self.phase != Phase::AwaitingRemote || answer.kind != DescriptionKind::Answer {
            let violation = self.violation("answer");
            log::warn!("Ignoring answer from {}: {}", self.remote, violation);
            return Err(violation);
        }
        if let Err(e) = env.media.accept_remote_description(self.remote, &answer) {
            return self.fail_attempt(env, NegotiationError::Media(e.0));
        }
        self.remote_description_set = true;
        self.flush_candidates(env);

        self.phase = Phase::Connected;
        self.transport_confirmed = false;
        self.deadline = Some(env.now + env.config.connect_timeout);
        Ok(())
    }

    fn handle_candidate(
        &mut self,
        env: &mut LinkEnv<'_>,
        candidate: Candidate,
    ) -> Result<(), NegotiationError> {
        if self.phase == Phase::Failed {
            return Err(self.violation("candidate"));
        }
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            if self.phase == Phase::Idle && self.deadline.is_none() {
                self.deadline = Some(env.now + env.config.connect_timeout);
            }
            return Ok(());
        }
        env.media
            .add_remote_candidate(self.remote, &candidate)
            .map_err(|e| NegotiationError::Media(e.0))
    }

    fn flush_candidates(&mut self, env: &mut LinkEnv<'_>) {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = env.media.add_remote_candidate(self.remote, &candidate) {
                log::warn!("Dropping candidate from {}: {}", self.remote, e);
            }
        }
    }

    pub fn on_connectivity(
        &mut self,
        env: &mut LinkEnv<'_>,
        state: ConnectivityState,
    ) -> Result<(), NegotiationError> {
        match state {
            ConnectivityState::Connecting => Ok(()),
            ConnectivityState::Connected => {
                if self.phase == Phase::Connected {
                    self.transport_confirmed = true;
                    self.deadline = None;
                    self.attempts = 0;
                    self.last_activity = env.now;
                }
                Ok(())
            }
            ConnectivityState::Disconnected => {
                if self.phase == Phase::Connected && self.transport_confirmed {
                    self.transport_confirmed = false;
                    self.deadline = Some(env.now + env.config.connect_timeout);
                }
                Ok(())
            }
            ConnectivityState::Failed | ConnectivityState::Closed => match self.phase {
                Phase::Offering | Phase::AwaitingRemote | Phase::Answering | Phase::Connected => {
                    let cause = NegotiationError::Media(format!("connectivity {:?}", state));
                    self.fail_attempt(env, cause)
                }
                _ => Ok(()),
            },
        }
    }

    /// Fires whichever timer is due: the phase deadline or the retry backoff.
    pub fn tick(&mut self, env: &mut LinkEnv<'_>) -> Result<(), NegotiationError> {
        match self.phase {
            Phase::Failed => Ok(()),
            Phase::Disconnected => match self.retry_at {
                Some(at) if at <= env.now => {
                    self.retry_at = None;
                    log::info!(
                        "Retrying negotiation with {} (attempt {})",
                        self.remote,
                        self.attempts + 1
                    );
                    match self.role {
                        Role::Offerer => self.begin_offer(env),
                        Role::Answerer => {
                            self.phase = Phase::Idle;
                            self.deadline = Some(env.now + env.config.connect_timeout);
                            Ok(())
                        }
                    }
                }
                _ => Ok(()),
            },
            _ => match self.deadline {
                Some(at) if at <= env.now => {
                    log::warn!(
                        "Negotiation with {} timed out while {:?}",
                        self.remote,
                        self.phase
                    );
                    self.fail_attempt(env, NegotiationError::NegotiationTimeout)
                }
                _ => Ok(()),
            },
        }
    }

    /// Releases media resources; the link should be dropped afterwards.
    pub fn close(&mut self, env: &mut LinkEnv<'_>) {
        env.media.close(self.remote);
        self.pending_candidates.clear();
        self.remote_description_set = false;
        self.transport_confirmed = false;
        self.deadline = None;
        self.retry_at = None;
    }

    fn begin_offer(&mut self, env: &mut LinkEnv<'_>) -> Result<(), NegotiationError> {
        self.phase = Phase::Offering;
        self.remote_description_set = false;
        self.transport_confirmed = false;

        let offer = match env
            .media
            .create_local_description(self.remote, DescriptionKind::Offer)
        {
            Ok(offer) => offer,
            Err(e) => return self.fail_attempt(env, NegotiationError::Media(e.0)),
        };
        if env.transport.send(self.remote, Signal::Offer(offer)).is_err() {
            return self.fail_attempt(env, NegotiationError::Undeliverable(self.remote));
        }

        self.phase = Phase::AwaitingRemote;
        self.deadline = Some(env.now + env.config.connect_timeout);
        Ok(())
    }

    fn fail_attempt(
        &mut self,
        env: &mut LinkEnv<'_>,
        cause: NegotiationError,
    ) -> Result<(), NegotiationError> {
        env.media.close(self.remote);
        self.pending_candidates.clear();
        self.remote_description_set = false;
        self.transport_confirmed = false;
        self.deadline = None;
        self.attempts += 1;

        if self.attempts >= env.config.max_attempts {
            log::warn!(
                "Giving up on {} after {} attempts: {}",
                self.remote,
                self.attempts,
                cause
            );
            self.phase = Phase::Failed;
            self.retry_at = None;
            return Err(NegotiationError::NegotiationFailed);
        }

        let delay = env.config.backoff(self.attempts);
        log::info!(
            "Negotiation with {} failed ({}), retrying in {:?}",
            self.remote,
            cause,
            delay
        );
        self.phase = Phase::Disconnected;
        self.retry_at = Some(env.now + delay);
        Err(cause)
    }

    fn violation(&self, message: &str) -> NegotiationError {
        NegotiationError::ProtocolViolation {
            phase: self.phase,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaError, TransportClosed};
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(DescriptionKind),
        Accept(DescriptionKind),
        AddCandidate(String),
        Rollback,
        Close,
    }

    #[derive(Default)]
    struct FakeMedia {
        calls: Vec<Call>,
        fail_accept: bool,
    }

    impl MediaLayer for FakeMedia {
        fn create_local_description(
            &mut self,
            _peer: ParticipantId,
            kind: DescriptionKind,
        ) -> Result<SessionDescription, MediaError> {
            self.calls.push(Call::Create(kind));
            Ok(SessionDescription {
                kind,
                sdp: format!("{:?}", kind),
            })
        }

        fn accept_remote_description(
            &mut self,
            _peer: ParticipantId,
            description: &SessionDescription,
        ) -> Result<(), MediaError> {
            if self.fail_accept {
                return Err(MediaError("rejected".into()));
            }
            self.calls.push(Call::Accept(description.kind));
            Ok(())
        }

        fn add_remote_candidate(
            &mut self,
            _peer: ParticipantId,
            candidate: &Candidate,
        ) -> Result<(), MediaError> {
            self.calls.push(Call::AddCandidate(candidate.candidate.clone()));
            Ok(())
        }

        fn rollback_local_description(&mut self, _peer: ParticipantId) {
            self.calls.push(Call::Rollback);
        }

        fn close(&mut self, _peer: ParticipantId) {
            self.calls.push(Call::Close);
        }
    }

    #[derive(Default)]
    struct Outbox {
        sent: RefCell<Vec<(ParticipantId, Signal)>>,
    }

    impl SignalingTransport for Outbox {
        fn send(&self, target: ParticipantId, signal: Signal) -> Result<(), TransportClosed> {
            self.sent.borrow_mut().push((target, signal));
            Ok(())
        }
    }

    impl Outbox {
        fn offers(&self) -> usize {
            self.sent
                .borrow()
                .iter()
                .filter(|(_, s)| matches!(s, Signal::Offer(_)))
                .count()
        }
    }

    const ME: ParticipantId = ParticipantId(1);
    const PEER: ParticipantId = ParticipantId(2);

    fn description(kind: DescriptionKind) -> SessionDescription {
        SessionDescription {
            kind,
            sdp: "remote".into(),
        }
    }

    fn candidate(name: &str) -> Candidate {
        Candidate {
            candidate: name.into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    fn fixture() -> (FakeMedia, Outbox, NegotiationConfig) {
        (
            FakeMedia::default(),
            Outbox::default(),
            NegotiationConfig::default(),
        )
    }

    macro_rules! env {
        ($media:expr, $outbox:expr, $config:expr, $now:expr) => {
            &mut LinkEnv {
                media: &mut $media,
                transport: &$outbox,
                config: &$config,
                now: Timestamp($now),
            }
        };
    }

    #[test]
    fn roles_are_symmetric_and_exclusive() {
        for (a, b) in &[(1, 2), (9, 3), (100, 101)] {
            let (a, b) = (ParticipantId(*a), ParticipantId(*b));
            let ab = Role::for_pair(a, b);
            let ba = Role::for_pair(b, a);
            assert_ne!(ab, ba);
            assert_eq!(ab, Role::for_pair(a, b));
        }
        assert_eq!(Role::for_pair(ParticipantId(1), ParticipantId(2)), Role::Offerer);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = NegotiationConfig::default();
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(2), Duration::from_secs(2));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(5), Duration::from_secs(10));
        assert_eq!(config.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn offerer_sends_offer_on_start() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));

        link.start(env!(media, outbox, config, 0)).expect("");

        assert_eq!(link.phase(), Phase::AwaitingRemote);
        assert_eq!(outbox.offers(), 1);
        assert_eq!(link.deadline(), Some(Timestamp(15_000)));
    }

    #[test]
    fn answerer_waits_on_start() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(PEER, ME, Timestamp(0));

        link.start(env!(media, outbox, config, 0)).expect("");

        assert_eq!(link.role(), Role::Answerer);
        assert_eq!(link.phase(), Phase::Idle);
        assert!(outbox.sent.borrow().is_empty());
    }

    #[test]
    fn early_candidates_are_applied_in_order_after_answer() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));

        link.start(env!(media, outbox, config, 0)).expect("");
        link.handle_signal(env!(media, outbox, config, 1), Signal::Candidate(candidate("c1")))
            .expect("");
        link.handle_signal(env!(media, outbox, config, 2), Signal::Candidate(candidate("c2")))
            .expect("");
        assert_eq!(link.pending_candidates().count(), 2);

        link.handle_signal(
            env!(media, outbox, config, 3),
            Signal::Answer(description(DescriptionKind::Answer)),
        )
        .expect("");

        assert_eq!(link.phase(), Phase::Connected);
        assert_eq!(link.pending_candidates().count(), 0);
        assert_eq!(
            media.calls,
            vec![
                Call::Create(DescriptionKind::Offer),
                Call::Accept(DescriptionKind::Answer),
                Call::AddCandidate("c1".into()),
                Call::AddCandidate("c2".into()),
            ]
        );
    }

    #[test]
    fn answer_outside_awaiting_remote_is_ignored() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(PEER, ME, Timestamp(0));

        let result = link.handle_signal(
            env!(media, outbox, config, 0),
            Signal::Answer(description(DescriptionKind::Answer)),
        );

        assert!(matches!(
            result,
            Err(NegotiationError::ProtocolViolation {
                phase: Phase::Idle,
                ..
            })
        ));
        assert_eq!(link.phase(), Phase::Idle);
        assert!(media.calls.is_empty());
    }

    #[test]
    fn offer_is_answered() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(PEER, ME, Timestamp(0));

        link.handle_signal(
            env!(media, outbox, config, 0),
            Signal::Offer(description(DescriptionKind::Offer)),
        )
        .expect("");

        assert_eq!(link.phase(), Phase::Connected);
        let sent = outbox.sent.borrow();
        assert!(matches!(sent.as_slice(), [(target, Signal::Answer(_))] if *target == ME));
    }

    #[test]
    fn offerer_keeps_its_offer_on_glare() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));
        link.start(env!(media, outbox, config, 0)).expect("");

        link.handle_signal(
            env!(media, outbox, config, 1),
            Signal::Offer(description(DescriptionKind::Offer)),
        )
        .expect("");

        assert_eq!(link.phase(), Phase::AwaitingRemote);
        assert_eq!(outbox.sent.borrow().len(), 1);
    }

    #[test]
    fn answerer_rolls_back_on_glare() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(PEER, ME, Timestamp(0));
        link.handle_signal(
            env!(media, outbox, config, 0),
            Signal::Offer(description(DescriptionKind::Offer)),
        )
        .expect("");
        link.renegotiate(env!(media, outbox, config, 1)).expect("");
        assert_eq!(link.phase(), Phase::AwaitingRemote);

        link.handle_signal(
            env!(media, outbox, config, 2),
            Signal::Offer(description(DescriptionKind::Offer)),
        )
        .expect("");

        assert!(media.calls.contains(&Call::Rollback));
        assert_eq!(link.phase(), Phase::Connected);
        let sent = outbox.sent.borrow();
        assert!(matches!(sent.last(), Some((_, Signal::Answer(_)))));
    }

    #[test]
    fn three_timeouts_end_in_failed() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));
        link.start(env!(media, outbox, config, 0)).expect("");

        let mut now = 0;
        let mut results = Vec::new();
        for _ in 0..10 {
            now += 20_000;
            results.push(link.tick(env!(media, outbox, config, now)));
        }

        assert_eq!(link.phase(), Phase::Failed);
        assert_eq!(link.attempts(), 3);
        assert_eq!(outbox.offers(), 3);
        assert!(results.contains(&Err(NegotiationError::NegotiationFailed)));

        link.tick(env!(media, outbox, config, now + 1_000_000)).expect("");
        assert_eq!(outbox.offers(), 3);
    }

    #[test]
    fn transport_failure_backs_off_before_retrying() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));
        link.start(env!(media, outbox, config, 0)).expect("");
        link.handle_signal(
            env!(media, outbox, config, 10),
            Signal::Answer(description(DescriptionKind::Answer)),
        )
        .expect("");
        link.on_connectivity(env!(media, outbox, config, 20), ConnectivityState::Connected)
            .expect("");

        let result =
            link.on_connectivity(env!(media, outbox, config, 30), ConnectivityState::Failed);

        assert!(matches!(result, Err(NegotiationError::Media(_))));
        assert_eq!(link.phase(), Phase::Disconnected);
        assert_eq!(link.retry_at(), Some(Timestamp(1_030)));

        link.tick(env!(media, outbox, config, 500)).expect("");
        assert_eq!(outbox.offers(), 1);
        link.tick(env!(media, outbox, config, 1_030)).expect("");
        assert_eq!(outbox.offers(), 2);
        assert_eq!(link.phase(), Phase::AwaitingRemote);
    }

    #[test]
    fn confirmed_connection_resets_budget() {
        let (mut media, outbox, config) = fixture();
        let mut link = PeerLink::new(ME, PEER, Timestamp(0));
        link.start(env!(media, outbox, config, 0)).expect("");
        let _ = link.tick(env!(media, outbox, config, 15_000));
        assert_eq!(link.attempts(), 1);

        link.tick(env!(media, outbox, config, 16_000)).expect("");
        link.handle_signal(
            env!(media, outbox, config, 16_100),
            Signal::Answer(description(DescriptionKind::Answer)),
        )
        .expect("");
        link.on_connectivity(env!(media, outbox, config, 16_200), ConnectivityState::Connected)
            .expect("");

        assert_eq!(link.attempts(), 0);
        assert_eq!(link.deadline(), None);
        assert!(link.status().transport_confirmed);
    }

    #[test]
    fn rejected_remote_description_counts_as_failure() {
        let (mut media, outbox, config) = fixture();
        media.fail_accept = true;
        let mut link = PeerLink::new(PEER, ME, Timestamp(0));

        let result = link.handle_signal(
            env!(media, outbox, config, 0),
            Signal::Offer(description(DescriptionKind::Offer)),
        );

        assert!(matches!(result, Err(NegotiationError::Media(_))));
        assert_eq!(link.phase(), Phase::Disconnected);
        assert!(media.calls.contains(&Call::Close));
    }
}

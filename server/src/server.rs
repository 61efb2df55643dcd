use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use whiteboard_system::{
    ClientMessage, Clock, DisplayName, LeaveOutcome, NegotiationError, ParticipantId,
    RegistryConfig, RegistryStats, ServerMessage, SessionCode, SessionDelta, SessionError,
};

use crate::admin::{AdminCommand, ShardStats};
use crate::config::ServerConfig;
use crate::connection::ConnectionCommand;
use crate::connection_tx_storage::{ConnectionTx, ConnectionTxStorage};
use crate::dispatcher::dispatch;
use crate::relay::Relay;
use crate::server_state::ServerState;

#[derive(Debug)]
pub enum ServerCommand {
    Connection(ConnectionCommand),
    Admin(AdminCommand),
}

pub type ServerTx = UnboundedSender<ServerCommand>;

pub type ShardFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Error)]
#[error("session loop has stopped")]
pub struct ServerGone;

/// One session loop. Owns a slice of the sessions and applies every command
/// for them one at a time.
struct Server {
    index: usize,
    server_state: ServerState,
    connections: ConnectionTxStorage,
}

impl Server {
    fn new(index: usize, config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            index,
            server_state: ServerState::new(config, clock),
            connections: ConnectionTxStorage::new(),
        }
    }

    fn handle_server_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connection(command) => self.handle_connection_command(command),
            ServerCommand::Admin(AdminCommand::GetStats { tx }) => {
                let _ = tx.send(ShardStats {
                    registry: self.server_state.registry.stats(),
                    connections: self.connections.len(),
                    halted: self.server_state.halted,
                });
            }
        }
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { from, tx } => {
                self.connections.insert(from, tx);
            }
            ConnectionCommand::Disconnect { from } => {
                self.leave_current(&from);
                self.connections.remove(&from);
            }
            ConnectionCommand::Depart { from } => self.leave_current(&from),
            ConnectionCommand::Enter {
                from,
                message,
                elsewhere,
            } => {
                if self.serve(from, message) {
                    for shard in elsewhere {
                        let depart = ConnectionCommand::Depart { from };
                        let _ = shard.send(ServerCommand::Connection(depart));
                    }
                }
            }
            ConnectionCommand::Inbound { from, message } => {
                self.serve(from, message);
            }
        }
    }

    /// Applies one client message, answering a refusal to the caller.
    fn serve(&mut self, from: ParticipantId, message: ClientMessage) -> bool {
        log::debug!("Ingress from {}: {:?}", from, message);
        match self.handle_client_message(from, message) {
            Ok(()) => true,
            Err(reason) => {
                log::debug!("Request from {} refused: {}", from, reason);
                self.connections
                    .send(&from, ServerMessage::SessionError { reason });
                false
            }
        }
    }

    fn handle_client_message(
        &mut self,
        from: ParticipantId,
        message: ClientMessage,
    ) -> Result<(), SessionError> {
        match message {
            ClientMessage::CreateSession {
                code,
                participant_name,
            } => self.create_session(from, &code, &participant_name),
            ClientMessage::JoinSession {
                code,
                participant_name,
            } => self.join_session(from, &code, &participant_name),
            ClientMessage::LeaveSession { code } => self.leave_session(from, &code),
            ClientMessage::DrawAppend { element } => {
                let code = self.current_code(&from)?;
                let delta = self
                    .server_state
                    .registry
                    .append_element(&code, from, element)?;
                self.publish(&code, delta);
                Ok(())
            }
            ClientMessage::DrawProgress { preview } => {
                let code = self.current_code(&from)?;
                self.relay().broadcast(
                    &code,
                    Some(from),
                    ServerMessage::DrawingInProgress {
                        from_id: from,
                        preview,
                    },
                );
                Ok(())
            }
            ClientMessage::DrawClear => {
                let code = self.current_code(&from)?;
                let delta = self.server_state.registry.clear_elements(&code, from)?;
                self.publish(&code, delta);
                Ok(())
            }
            ClientMessage::DrawUndo => {
                let code = self.current_code(&from)?;
                if let Some(delta) = self.server_state.registry.undo_last(&code, from)? {
                    self.publish(&code, delta);
                }
                Ok(())
            }
            ClientMessage::VoiceRequest => {
                let code = self.current_code(&from)?;
                let peer_ids: Vec<ParticipantId> = self
                    .server_state
                    .registry
                    .list_members(&code)?
                    .iter()
                    .map(|m| m.id)
                    .filter(|id| *id != from)
                    .collect();
                log::info!("Participant {} requested voice chat in {}", from, code);
                self.connections
                    .send(&from, ServerMessage::VoiceSessionStart { peer_ids });
                self.relay().broadcast(
                    &code,
                    Some(from),
                    ServerMessage::VoiceSessionRequest { from_id: from },
                );
                Ok(())
            }
            ClientMessage::VoiceStop => {
                let code = self.current_code(&from)?;
                self.relay()
                    .broadcast(&code, Some(from), ServerMessage::VoiceSessionStop { id: from });
                Ok(())
            }
            ClientMessage::VoiceMuteToggle { muted } => {
                let code = self.current_code(&from)?;
                let delta = self.server_state.registry.set_muted(&code, from, muted)?;
                self.publish(&code, delta);
                Ok(())
            }
            ClientMessage::VoiceLinkReport { peer_id, phase } => {
                let code = self.current_code(&from)?;
                let delta = self
                    .server_state
                    .registry
                    .report_link(&code, from, peer_id, phase)?;
                self.publish(&code, delta);
                Ok(())
            }
            ClientMessage::NegotiationResponse {
                target_id,
                accepted,
            } => {
                let code = self.current_code(&from)?;
                let response = ServerMessage::VoiceSessionResponse {
                    from_id: from,
                    accepted,
                };
                if self
                    .relay()
                    .send_to_participant(&code, target_id, response)
                    .is_err()
                {
                    self.report_undeliverable(from, target_id);
                } else if accepted {
                    self.connections.send(
                        &from,
                        ServerMessage::VoiceSessionStart {
                            peer_ids: vec![target_id],
                        },
                    );
                }
                Ok(())
            }
            negotiation => match negotiation.into_signal() {
                Ok((target, signal)) => {
                    let code = self.current_code(&from)?;
                    log::debug!("Relaying {} from {} to {}", signal.name(), from, target);
                    let relayed = ServerMessage::negotiation(from, signal);
                    if self
                        .relay()
                        .send_to_participant(&code, target, relayed)
                        .is_err()
                    {
                        self.report_undeliverable(from, target);
                    }
                    Ok(())
                }
                Err(other) => {
                    log::warn!("Unhandled message from {}: {:?}", from, other);
                    Ok(())
                }
            },
        }
    }

    fn create_session(
        &mut self,
        from: ParticipantId,
        code: &str,
        participant_name: &str,
    ) -> Result<(), SessionError> {
        let code = SessionCode::parse(code)?;
        let name = DisplayName::parse(participant_name)?;
        self.server_state.admit_create(&code)?;
        self.leave_current(&from);

        let snapshot = self.server_state.create_session(code, from, name)?;
        self.server_state.check();
        self.connections.send(
            &from,
            ServerMessage::SessionCreated {
                code: snapshot.code,
                members: snapshot.members,
                elements: snapshot.elements,
            },
        );
        Ok(())
    }

    fn join_session(
        &mut self,
        from: ParticipantId,
        code: &str,
        participant_name: &str,
    ) -> Result<(), SessionError> {
        let code = SessionCode::parse(code)?;
        let name = DisplayName::parse(participant_name)?;
        self.server_state.admit_join(&code, &from)?;
        if self.server_state.location(&from) != Some(&code) {
            self.leave_current(&from);
        }

        let outcome = self.server_state.join_session(&code, from, name)?;
        self.server_state.check();
        let snapshot = outcome.snapshot;
        self.connections.send(
            &from,
            ServerMessage::SessionJoined {
                code: snapshot.code,
                members: snapshot.members,
                elements: snapshot.elements,
                rejoined: outcome.rejoined,
            },
        );
        if let Some(delta) = outcome.delta {
            self.publish(&code, delta);
        }
        Ok(())
    }

    fn leave_session(&mut self, from: ParticipantId, code: &str) -> Result<(), SessionError> {
        let code = SessionCode::parse(code)?;
        self.leave(&from, &code)?;
        self.connections
            .send(&from, ServerMessage::SessionLeft { code });
        Ok(())
    }

    /// The cascade shared by explicit leaves and dropped connections.
    fn leave(&mut self, from: &ParticipantId, code: &SessionCode) -> Result<(), SessionError> {
        let outcome = self.server_state.leave_session(code, from)?;
        self.server_state.check();
        match outcome {
            LeaveOutcome::SessionDeleted => {}
            LeaveOutcome::Left { delta, .. } => self.publish(code, delta),
        }
        Ok(())
    }

    fn leave_current(&mut self, from: &ParticipantId) {
        if let Some(code) = self.server_state.location(from).cloned() {
            match self.leave(from, &code) {
                Ok(()) => {
                    self.connections
                        .send(from, ServerMessage::SessionLeft { code });
                }
                Err(e) => log::warn!("Participant {} could not leave {}: {}", from, code, e),
            }
        }
    }

    fn current_code(&self, from: &ParticipantId) -> Result<SessionCode, SessionError> {
        self.server_state
            .location(from)
            .cloned()
            .ok_or(SessionError::NotInSession)
    }

    fn publish(&mut self, code: &SessionCode, delta: SessionDelta) {
        self.server_state.check();
        dispatch(&self.relay(), code, delta);
    }

    fn report_undeliverable(&self, from: ParticipantId, target: ParticipantId) {
        self.connections.send(
            &from,
            ServerMessage::NegotiationError {
                reason: NegotiationError::Undeliverable(target),
            },
        );
    }

    fn relay(&self) -> Relay<'_> {
        Relay::new(&self.server_state.registry, &self.connections)
    }

    fn sweep(&mut self) {
        let removed = self.server_state.registry.sweep_idle();
        if !removed.is_empty() {
            log::info!("Shard {} reclaimed {} idle sessions", self.index, removed.len());
            self.server_state.check();
        }
    }
}

/// Builds one session loop. The returned future runs until every sender of
/// the returned channel is dropped.
pub fn spawn_server(
    index: usize,
    config: RegistryConfig,
    sweep_interval: Duration,
    clock: Arc<dyn Clock>,
) -> (ServerTx, ShardFuture) {
    let (srv_tx, srv_rx) = unbounded_channel::<ServerCommand>();
    let server = Server::new(index, config, clock);
    (srv_tx, Box::pin(run(server, srv_rx, sweep_interval)))
}

async fn run(
    mut server: Server,
    mut srv_rx: UnboundedReceiver<ServerCommand>,
    sweep_interval: Duration,
) {
    let start = tokio::time::Instant::now() + sweep_interval;
    let mut sweep = tokio::time::interval_at(start, sweep_interval);
    log::info!("Shard {} started", server.index);

    loop {
        tokio::select! {
            command = srv_rx.recv() => match command {
                Some(command) => server.handle_server_command(command),
                None => break,
            },
            _ = sweep.tick() => server.sweep(),
        }
    }
    log::info!("Shard {} stopped", server.index);
}

pub fn shard_index(code: &SessionCode, shards: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    code.hash(&mut hasher);
    (hasher.finish() % shards.max(1) as u64) as usize
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub uptime: Duration,
    pub registry: RegistryStats,
    pub connections: usize,
    pub halted: bool,
}

/// The session a connection's messages are routed to. It only follows
/// replies, so it never points at a session the participant was refused.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    current: Option<SessionCode>,
}

impl Route {
    pub fn current(&self) -> Option<&SessionCode> {
        self.current.as_ref()
    }

    /// Updates the route from a message on its way to the participant.
    pub fn observe(&mut self, message: &ServerMessage) {
        match message {
            ServerMessage::SessionCreated { code, .. }
            | ServerMessage::SessionJoined { code, .. } => {
                self.current = Some(code.clone());
            }
            ServerMessage::SessionLeft { code } if self.current.as_ref() == Some(code) => {
                self.current = None;
            }
            _ => {}
        }
    }
}

/// Entry point of the connections into the session loops.
pub struct ServerHandle {
    shards: Vec<ServerTx>,
    id_source: AtomicU32,
    started_at: Instant,
}

impl ServerHandle {
    /// Runs every loop on the current tokio runtime.
    pub fn spawn(config: &ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::spawn_with(config, clock, |_, shard| {
            tokio::spawn(shard);
        })
    }

    /// Builds every loop and hands it to `spawner` to be run.
    pub fn spawn_with<F>(config: &ServerConfig, clock: Arc<dyn Clock>, mut spawner: F) -> Self
    where
        F: FnMut(usize, ShardFuture),
    {
        let shards = (0..config.shards.max(1))
            .map(|index| {
                let (srv_tx, shard) = spawn_server(
                    index,
                    config.registry_config(),
                    config.sweep_interval(),
                    clock.clone(),
                );
                spawner(index, shard);
                srv_tx
            })
            .collect();
        Self {
            shards,
            id_source: AtomicU32::new(1),
            started_at: Instant::now(),
        }
    }

    pub fn next_participant_id(&self) -> ParticipantId {
        ParticipantId(self.id_source.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers the outbound channel of a new connection with every loop.
    pub fn connect(&self, id: ParticipantId, tx: ConnectionTx) -> Result<(), ServerGone> {
        for shard in &self.shards {
            let command = ConnectionCommand::Connect {
                from: id,
                tx: tx.clone(),
            };
            shard
                .send(ServerCommand::Connection(command))
                .map_err(|_| ServerGone)?;
        }
        let _ = tx.send(ServerMessage::Connected { id });
        log::info!("Participant {} connected", id);
        Ok(())
    }

    /// Routes one inbound message by the connection's `route`.
    ///
    /// Creating and joining go to the loop owning the code. Only once that
    /// loop accepts does the participant depart from the other loops, so a
    /// refused request leaves its current session untouched.
    pub fn submit(
        &self,
        from: ParticipantId,
        tx: &ConnectionTx,
        route: &Route,
        message: ClientMessage,
    ) -> Result<(), ServerGone> {
        let target = match &message {
            ClientMessage::CreateSession { code, .. }
            | ClientMessage::JoinSession { code, .. }
            | ClientMessage::LeaveSession { code } => match SessionCode::parse(code) {
                Ok(code) => code,
                Err(reason) => {
                    let _ = tx.send(ServerMessage::SessionError { reason });
                    return Ok(());
                }
            },
            _ => match route.current() {
                Some(code) => code.clone(),
                None => {
                    let _ = tx.send(ServerMessage::SessionError {
                        reason: SessionError::NotInSession,
                    });
                    return Ok(());
                }
            },
        };

        let index = self.shard_of(&target);
        let command = match message {
            ClientMessage::CreateSession { .. } | ClientMessage::JoinSession { .. } => {
                ConnectionCommand::Enter {
                    from,
                    message,
                    elsewhere: self
                        .shards
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != index)
                        .map(|(_, shard)| shard.clone())
                        .collect(),
                }
            }
            message => ConnectionCommand::Inbound { from, message },
        };
        self.shards[index]
            .send(ServerCommand::Connection(command))
            .map_err(|_| ServerGone)
    }

    /// Runs the leave cascade wherever the connection is and forgets it.
    pub fn disconnect(&self, from: ParticipantId) -> Result<(), ServerGone> {
        for shard in &self.shards {
            shard
                .send(ServerCommand::Connection(ConnectionCommand::Disconnect {
                    from,
                }))
                .map_err(|_| ServerGone)?;
        }
        log::info!("Participant {} disconnected", from);
        Ok(())
    }

    /// Stats summed over all loops. Completes only after every loop has
    /// processed the commands submitted before the call.
    pub async fn stats(&self) -> Result<ServerStats, ServerGone> {
        let mut receivers = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            let (tx, rx) = oneshot::channel();
            shard
                .send(ServerCommand::Admin(AdminCommand::GetStats { tx }))
                .map_err(|_| ServerGone)?;
            receivers.push(rx);
        }

        let mut stats = ServerStats {
            uptime: self.started_at.elapsed(),
            ..ServerStats::default()
        };
        for rx in receivers {
            let shard = rx.await.map_err(|_| ServerGone)?;
            stats.registry.total_sessions += shard.registry.total_sessions;
            stats.registry.total_participants += shard.registry.total_participants;
            stats.registry.active_sessions += shard.registry.active_sessions;
            stats.connections = stats.connections.max(shard.connections);
            stats.halted |= shard.halted;
        }
        Ok(stats)
    }

    fn shard_of(&self, code: &SessionCode) -> usize {
        shard_index(code, self.shards.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_choice_is_stable_and_in_range() {
        let code = SessionCode::parse("abcd").expect("");
        let same = SessionCode::parse("ABCD").expect("");
        for shards in 1..8 {
            let index = shard_index(&code, shards);
            assert!(index < shards);
            assert_eq!(index, shard_index(&same, shards));
        }
    }

    #[test]
    fn route_follows_replies_only() {
        let room = SessionCode::parse("ROOMA").expect("");
        let other = SessionCode::parse("ROOMB").expect("");
        let mut route = Route::default();

        route.observe(&ServerMessage::SessionError {
            reason: SessionError::NotFound,
        });
        assert_eq!(route.current(), None);

        route.observe(&ServerMessage::SessionCreated {
            code: room.clone(),
            members: vec![],
            elements: vec![],
        });
        assert_eq!(route.current(), Some(&room));

        // a late notice about an earlier room does not clear the new one
        route.observe(&ServerMessage::SessionLeft { code: other });
        assert_eq!(route.current(), Some(&room));
        route.observe(&ServerMessage::SessionLeft { code: room });
        assert_eq!(route.current(), None);
    }

    #[test]
    fn participant_ids_are_unique() {
        let (handle, _shards) = {
            let mut shards = Vec::new();
            let handle = ServerHandle::spawn_with(
                &ServerConfig::default(),
                Arc::new(whiteboard_system::ManualClock::default()),
                |_, shard| shards.push(shard),
            );
            (handle, shards)
        };
        let a = handle.next_participant_id();
        let b = handle.next_participant_id();
        assert_ne!(a, b);
        assert!(a < b);
    }
}

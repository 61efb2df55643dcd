use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use whiteboard_system::{ParticipantId, ServerMessage};

pub type ConnectionTx = UnboundedSender<ServerMessage>;

/// Outbound channels of the connections a session loop knows about.
pub struct ConnectionTxStorage {
    connection_txs: HashMap<ParticipantId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: ParticipantId, tx: ConnectionTx) {
        self.connection_txs.insert(id, tx);
    }

    /// Never blocks. Returns `false` when the connection is unknown or gone.
    pub fn send(&self, to: &ParticipantId, message: ServerMessage) -> bool {
        match self.connection_txs.get(to) {
            Some(tx) => {
                if tx.send(message).is_err() {
                    log::debug!("Connection {} is already closed", to);
                    return false;
                }
                true
            }
            None => {
                log::warn!("No connection for participant {}", to);
                false
            }
        }
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<ConnectionTx> {
        self.connection_txs.remove(id)
    }

    pub fn len(&self) -> usize {
        self.connection_txs.len()
    }
}

use tokio::sync::oneshot::Sender;
use whiteboard_system::RegistryStats;

#[derive(Debug)]
pub enum AdminCommand {
    GetStats { tx: Sender<ShardStats> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub registry: RegistryStats,
    pub connections: usize,
    pub halted: bool,
}

pub extern crate actix_web;

mod admin;
pub mod config;
pub mod connection;
mod connection_tx_storage;
mod dispatcher;
pub mod handlers;
mod relay;
pub mod server;
mod server_state;

pub use admin::ShardStats;
pub use connection_tx_storage::ConnectionTx;
pub use relay::Undeliverable;

mod clock;
mod element;
mod element_log;
mod error;
mod media;
mod message;
mod negotiator;
mod peer_link;
mod registry;
mod session;
mod types;

pub use clock::*;
pub use element::*;
pub use element_log::*;
pub use error::*;
pub use media::*;
pub use message::*;
pub use negotiator::*;
pub use peer_link::*;
pub use registry::*;
pub use session::*;
pub use types::*;

pub extern crate bincode;
pub extern crate euclid;
pub extern crate serde;
pub extern crate serde_json;

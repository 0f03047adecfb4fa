//! relaychat - a minimal TCP chat relay.
//!
//! Every listening port hosts one room. Anything a client sends is
//! broadcast to all members of its room (the sender included), and
//! newcomers first receive a replay of the most recent messages.
//!
//! # Architecture
//!
//! - **Framing** - 4-byte ASCII decimal length header plus body, at most
//!   512 body bytes
//! - **Connection** - one socket with independent read and write pipelines
//!   and a FIFO outbound queue
//! - **Room** - membership plus bounded history; mutated only by the server
//!   event loop
//! - **Server** - accept loops on one or more ports feeding a single event
//!   loop that owns one room per port
//! - **Client** - drives one connection from line input
//!
//! # Modules
//!
//! - [`framing`] - wire codec
//! - [`connection`] - per-socket pipelines
//! - [`room`] - shared chat room
//! - [`server`] - accept and event loops
//! - [`client`] - interactive client driver
//! - [`config`] - configuration loading

pub mod client;
pub mod config;
pub mod connection;
pub mod constants;
pub mod framing;
pub mod message;
pub mod participant;
pub mod room;
pub mod server;

// Re-export commonly used types
pub use client::ChatClient;
pub use config::Config;
pub use connection::{CloseReason, Connection, ConnectionEvent, ConnectionHandle};
pub use framing::FrameError;
pub use message::Message;
pub use participant::{Participant, ParticipantId};
pub use room::ChatRoom;
pub use server::ChatServer;

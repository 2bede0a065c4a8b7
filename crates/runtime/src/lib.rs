//! renvim runtime - control channel and msgpack-rpc connection
//!
//! This crate provides the plumbing between the client and a running Neovim:
//!
//! - **Transport**: dialing the host's Unix socket, named pipe or TCP port
//! - **Connection**: request/response correlation, one request in flight at a
//!   time, notification dispatch on a background listener task
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   renvim    │  Dispatcher, subscriber, registry, session
//! └──────┬──────┘
//!        │ RemoteHost
//! ┌──────▼──────┐
//! │   runtime   │  This crate
//! │  ┌────────┐ │
//! │  │ Conn   │ │  msgpack-rpc correlation
//! │  └────────┘ │
//! │  ┌────────┐ │
//! │  │ Trans  │ │  Socket / pipe / TCP
//! │  └────────┘ │
//! └─────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod transport;

pub use connection::{Connection, NotificationHandler};
pub use error::{Error, Result};
pub use renvim_protocol::Value;
pub use transport::{Address, TransportParts, dial};

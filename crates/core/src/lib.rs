//! Open views in a running Neovim and wait until the user closes them.
//!
//! # Architecture
//!
//! ```text
//! SessionController
//!     |-- NotificationSubscriber  register handler, subscribe, install hooks
//!     |-- CommandDispatcher       tabnew, set lines, exec lua
//!     `-- ViewRegistry            ledger of opened views
//!              ^
//!              |  CompletionSender (posted from the listener task)
//!              |
//! RemoteHost (renvim_runtime::Connection) <== msgpack-rpc ==> nvim
//! ```
//!
//! The controller is the only owner of the registry. Close notifications are
//! parsed on the connection's listener task and posted to the registry over
//! a channel; the controller folds them in while it waits.

pub mod dispatch;
pub mod error;
pub mod host;
pub mod registry;
pub mod session;
pub mod subscriber;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{CommandDispatcher, escape_ex_path};
pub use error::{Error, Result, SetupStage};
pub use host::{HostFuture, RemoteHost};
pub use registry::{CompletionSender, ViewId, ViewRegistry, Wake};
pub use session::{
	DEFAULT_EVENT, DEFAULT_TEARDOWN_TIMEOUT, LineStream, Resource, ResourceFailure, SessionConfig,
	SessionController, SessionReport, SessionState,
};
pub use subscriber::{HookStrategy, NotificationSubscriber};

//! Error types for the session lifecycle.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Setup step that failed before any view was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
	/// Looking up this client's channel id.
	ChannelInfo,
	/// Subscribing to the close event.
	Subscribe,
	/// Installing the broadcast hook.
	GlobalHook,
}

impl fmt::Display for SetupStage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			SetupStage::ChannelInfo => "channel info",
			SetupStage::Subscribe => "subscribe",
			SetupStage::GlobalHook => "close hook",
		})
	}
}

/// Errors raised while driving a session.
#[derive(Debug, Error)]
pub enum Error {
	/// Session setup failed; no view was opened.
	#[error("setup failed at {stage}: {source}")]
	Setup {
		stage: SetupStage,
		#[source]
		source: renvim_runtime::Error,
	},

	/// The host reports this channel is already subscribed to the event.
	#[error("setup failed at {stage}: already subscribed to {0}", stage = SetupStage::Subscribe)]
	AlreadySubscribed(String),

	/// A remote command for one resource failed.
	#[error("{}", remote_command_message(.path.as_deref(), .source))]
	RemoteCommand {
		path: Option<String>,
		#[source]
		source: renvim_runtime::Error,
	},

	/// Reading local input for a resource failed.
	#[error("failed to read input: {0}")]
	Input(#[from] io::Error),

	/// The host sent something this client cannot interpret.
	#[error("protocol error: {0}")]
	Protocol(String),

	/// The control channel is gone.
	#[error("transport error: {0}")]
	Transport(String),

	/// Cleanup after waiting did not complete.
	#[error("teardown: {0}")]
	Teardown(String),
}

fn remote_command_message(path: Option<&str>, source: &renvim_runtime::Error) -> String {
	match path {
		Some(path) => format!("{path}: {source}"),
		None => source.to_string(),
	}
}

impl Error {
	/// Returns true if the session cannot continue after this error.
	pub fn is_fatal(&self) -> bool {
		match self {
			Error::Setup { .. } | Error::AlreadySubscribed(_) => true,
			Error::Protocol(_) | Error::Transport(_) => true,
			Error::RemoteCommand { source, .. } => source.is_fatal(),
			Error::Input(_) | Error::Teardown(_) => false,
		}
	}

	/// Attaches the resource path to a remote command error.
	pub(crate) fn at_path(self, path: impl Into<String>) -> Self {
		match self {
			Error::RemoteCommand { source, .. } => Error::RemoteCommand {
				path: Some(path.into()),
				source,
			},
			other => other,
		}
	}
}

impl From<renvim_runtime::Error> for Error {
	fn from(err: renvim_runtime::Error) -> Self {
		use renvim_runtime::Error as Runtime;

		match err {
			Runtime::Protocol(msg) => Error::Protocol(msg),
			Runtime::Transport(msg) => Error::Transport(msg),
			Runtime::ChannelClosed => Error::Transport("control channel closed".to_string()),
			Runtime::ConnectionFailed { .. } => Error::Transport(err.to_string()),
			other => Error::RemoteCommand {
				path: None,
				source: other,
			},
		}
	}
}

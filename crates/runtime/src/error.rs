//! Error types for the control-channel runtime.

use renvim_protocol::CodecError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the host.
#[derive(Debug, Error)]
pub enum Error {
	/// The control channel could not be dialed.
	#[error("Failed to connect to {address}: {source}")]
	ConnectionFailed {
		address: String,
		#[source]
		source: std::io::Error,
	},

	/// Transport-level error (socket closed or failed).
	#[error("Transport error: {0}")]
	Transport(String),

	/// Malformed envelope; the stream is presumed corrupted.
	#[error("Protocol error: {0}")]
	Protocol(String),

	/// A request could not be serialized.
	#[error("Encoding error: {0}")]
	Encoding(String),

	/// The host answered a request with an error.
	#[error("{method}: {message}")]
	Remote {
		/// Method that failed (e.g. "nvim_command")
		method: String,
		/// Error text reported by the host
		message: String,
	},

	/// The connection shut down while a request was outstanding.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,
}

impl Error {
	/// Returns true if the connection can no longer be used after this error.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::ConnectionFailed { .. }
				| Error::Transport(_)
				| Error::Protocol(_)
				| Error::ChannelClosed
		)
	}

	/// Returns the host's error text if this is a remote error.
	pub fn remote_message(&self) -> Option<&str> {
		match self {
			Error::Remote { message, .. } => Some(message),
			_ => None,
		}
	}
}

impl From<CodecError> for Error {
	fn from(err: CodecError) -> Self {
		match err {
			CodecError::Encoding(msg) => Error::Encoding(msg),
			CodecError::Protocol(msg) => Error::Protocol(msg),
			CodecError::Transport(msg) => Error::Transport(msg),
			CodecError::Io(err) => Error::Transport(err.to_string()),
		}
	}
}

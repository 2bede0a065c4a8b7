//! Control-channel transport.
//!
//! Neovim listens on a Unix domain socket (a named pipe on Windows) or on a
//! TCP `host:port`. Either way the connection is split into a framed reader
//! that yields decoded [`Message`]s and a raw writer that accepts pre-encoded
//! frames.
//!
//! [`Message`]: renvim_protocol::Message


use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use renvim_protocol::MsgpackRpcCodec;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::FramedRead;
use tracing::debug;

use crate::error::{Error, Result};

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Address of a listening host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
	/// Unix socket path, or named pipe on Windows.
	Local(PathBuf),
	/// `host:port`
	Tcp(String),
}

impl Address {
	/// Parses an address the way Neovim interprets `--listen` values.
	///
	/// Anything containing a path separator, or lacking a `:port` suffix, is a
	/// local socket. Returns `None` for an empty string.
	pub fn parse(raw: &str) -> Option<Self> {
		let raw = raw.trim();
		if raw.is_empty() {
			return None;
		}

		let looks_local = raw.contains('/') || raw.contains('\\');
		let tcp_port = raw
			.rsplit_once(':')
			.filter(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());

		match (looks_local, tcp_port) {
			(false, Some(_)) => Some(Address::Tcp(raw.to_string())),
			_ => Some(Address::Local(PathBuf::from(raw))),
		}
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Address::Local(path) => write!(f, "{}", path.display()),
			Address::Tcp(addr) => f.write_str(addr),
		}
	}
}

/// The two halves of a connected control channel.
pub struct TransportParts {
	pub reader: FramedRead<BoxedReader, MsgpackRpcCodec>,
	pub writer: BoxedWriter,
}

impl TransportParts {
	pub fn new<R, W>(reader: R, writer: W) -> Self
	where
		R: AsyncRead + Send + 'static,
		W: AsyncWrite + Send + 'static,
	{
		Self {
			reader: FramedRead::new(Box::pin(reader), MsgpackRpcCodec::default()),
			writer: Box::pin(writer),
		}
	}

	/// Splits a bidirectional stream into transport halves.
	pub fn from_stream<S>(stream: S) -> Self
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		let (reader, writer) = tokio::io::split(stream);
		Self::new(reader, writer)
	}
}

/// Connects to the host at `address`.
pub async fn dial(address: &Address) -> Result<TransportParts> {
	debug!(target = "renvim.transport", %address, "dialing host");
	let failed = |source| Error::ConnectionFailed {
		address: address.to_string(),
		source,
	};

	match address {
		Address::Tcp(addr) => {
			let stream = tokio::net::TcpStream::connect(addr.as_str())
				.await
				.map_err(failed)?;
			stream.set_nodelay(true).map_err(failed)?;
			Ok(TransportParts::from_stream(stream))
		}
		Address::Local(path) => dial_local(path).await.map_err(failed),
	}
}

#[cfg(unix)]
async fn dial_local(path: &std::path::Path) -> std::io::Result<TransportParts> {
	let stream = tokio::net::UnixStream::connect(path).await?;
	Ok(TransportParts::from_stream(stream))
}

#[cfg(windows)]
async fn dial_local(path: &std::path::Path) -> std::io::Result<TransportParts> {
	let pipe = tokio::net::windows::named_pipe::ClientOptions::new().open(path)?;
	Ok(TransportParts::from_stream(pipe))
}

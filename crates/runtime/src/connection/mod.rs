//! msgpack-rpc connection to a Neovim host.
//!
//! Handles:
//! - Assigning request IDs and correlating responses
//! - Keeping a single request in flight on the shared transport
//! - Routing host notifications to registered handlers
//! - Refusing requests the host sends to us
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::call`], which waits for its turn
//! 2. The request is encoded and queued for the writer task
//! 3. The listener task decodes frames as they arrive
//! 4. Responses complete the matching pending call; notifications are handed
//!    to the handler registered for their method name
//! 5. When the transport closes, every pending call fails and all handlers
//!    are dropped

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use futures_util::StreamExt;
use parking_lot::Mutex;
use renvim_protocol::{
	Message, Notification, Request, Response, Value, encode_message, encode_request, error_message,
};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as TokioMutex, OnceCell, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::error::{Error, Result};
use crate::transport::TransportParts;

/// Callback invoked on the listener task with a notification's parameters.
///
/// Handlers must not block or issue requests on the same connection; the
/// listener cannot deliver the response while it is busy running them.
pub type NotificationHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Why the listener stopped.
#[derive(Debug, Clone)]
enum CloseReason {
	Eof,
	Transport(String),
	Protocol(String),
}

impl CloseReason {
	fn to_error(&self) -> Error {
		match self {
			CloseReason::Eof => Error::ChannelClosed,
			CloseReason::Transport(msg) => Error::Transport(msg.clone()),
			CloseReason::Protocol(msg) => Error::Protocol(msg.clone()),
		}
	}
}

/// A request awaiting its response.
struct PendingCall {
	method: String,
	tx: oneshot::Sender<Result<Value>>,
}

#[derive(Default)]
struct PendingState {
	calls: HashMap<u32, PendingCall>,
	closed: Option<CloseReason>,
}

/// Removes the pending entry if the call future is dropped before completion.
struct PendingGuard {
	id: u32,
	pending: Arc<Mutex<PendingState>>,
	completed: bool,
}

impl PendingGuard {
	fn complete(&mut self) {
		self.completed = true;
	}
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		if self.completed {
			return;
		}
		if self.pending.lock().calls.remove(&self.id).is_some() {
			debug!(target = "renvim.rpc", id = self.id, "dropped abandoned call");
		}
	}
}

/// Transport halves and queue ends consumed by [`Connection::run`].
struct RunParts {
	transport: TransportParts,
	outbound_rx: mpsc::UnboundedReceiver<Bytes>,
}

/// msgpack-rpc connection to the host.
pub struct Connection {
	/// Sequential request ID counter
	last_id: AtomicU32,
	/// Pending calls plus the close reason once the listener has stopped
	pending: Arc<Mutex<PendingState>>,
	/// Serializes calls so only one request is on the wire at a time
	turn: TokioMutex<()>,
	/// Encoded frames for the writer task
	outbound_tx: mpsc::UnboundedSender<Bytes>,
	/// Taken once by run()
	run_parts: Mutex<Option<RunParts>>,
	/// Notification handlers keyed by method name
	handlers: DashMap<String, NotificationHandler>,
	/// This client's channel id as reported by the host
	channel_id: OnceCell<i64>,
	/// Cancelled when the listener exits
	closed: CancellationToken,
}

impl Connection {
	/// Creates a connection over `parts`. Call [`run`](Self::run) to start it.
	pub fn new(parts: TransportParts) -> Self {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

		Self {
			last_id: AtomicU32::new(0),
			pending: Arc::new(Mutex::new(PendingState::default())),
			turn: TokioMutex::new(()),
			outbound_tx,
			run_parts: Mutex::new(Some(RunParts {
				transport: parts,
				outbound_rx,
			})),
			handlers: DashMap::new(),
			channel_id: OnceCell::new(),
			closed: CancellationToken::new(),
		}
	}

	/// Creates a connection and spawns its listener on the current runtime.
	pub fn spawn(parts: TransportParts) -> Arc<Self> {
		let connection = Arc::new(Self::new(parts));
		let runner = Arc::clone(&connection);
		tokio::spawn(async move { runner.run().await });
		connection
	}

	/// Sends a request and waits for its response.
	///
	/// Calls are serialized: a second caller waits until the first response
	/// has arrived before its request is written.
	pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
		let _turn = self.turn.lock().await;

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		let mut frame = BytesMut::new();
		encode_request(&mut frame, id, method, &args)?;

		let (tx, rx) = oneshot::channel();
		{
			let mut pending = self.pending.lock();
			if let Some(reason) = &pending.closed {
				return Err(reason.to_error());
			}
			pending.calls.insert(
				id,
				PendingCall {
					method: method.to_string(),
					tx,
				},
			);
		}
		let mut guard = PendingGuard {
			id,
			pending: Arc::clone(&self.pending),
			completed: false,
		};

		debug!(target = "renvim.rpc", id, method, "sending request");
		if self.outbound_tx.send(frame.freeze()).is_err() {
			error!(target = "renvim.rpc", "outbound queue closed");
			return Err(Error::ChannelClosed);
		}

		let result = rx.await.map_err(|_| Error::ChannelClosed);
		guard.complete();
		result?
	}

	/// Like [`call`](Self::call), deserializing the result into `R`.
	pub async fn call_as<R: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<R> {
		let value = self.call(method, args).await?;
		rmpv::ext::from_value(value)
			.map_err(|e| Error::Protocol(format!("unexpected {method} result: {e}")))
	}

	/// Returns this client's channel id, asking the host once.
	pub async fn channel_id(&self) -> Result<i64> {
		self.channel_id
			.get_or_try_init(|| async {
				let (channel, _api): (i64, Value) = self.call_as("nvim_get_api_info", Vec::new()).await?;
				debug!(target = "renvim.rpc", channel, "resolved channel id");
				Ok::<_, Error>(channel)
			})
			.await
			.copied()
	}

	/// Routes notifications named `method` to `handler`, replacing any
	/// handler previously registered under that name.
	pub fn register_handler(&self, method: &str, handler: NotificationHandler) {
		if self.handlers.insert(method.to_string(), handler).is_some() {
			debug!(target = "renvim.rpc", method, "replaced notification handler");
		}
	}

	pub fn unregister_handler(&self, method: &str) {
		self.handlers.remove(method);
	}

	/// True once the listener has stopped.
	pub fn is_closed(&self) -> bool {
		self.closed.is_cancelled()
	}

	/// Resolves when the listener has stopped.
	pub async fn closed(&self) {
		self.closed.cancelled().await;
	}

	/// Runs the listener until the transport closes.
	pub async fn run(self: &Arc<Self>) {
		let Some(RunParts {
			transport,
			mut outbound_rx,
		}) = self.run_parts.lock().take()
		else {
			warn!(target = "renvim.rpc", "connection is already running");
			return;
		};
		let TransportParts { mut reader, mut writer } = transport;

		let this = Arc::clone(self);
		let writer_handle = tokio::spawn(async move {
			while let Some(frame) = outbound_rx.recv().await {
				let written = match writer.write_all(&frame).await {
					Ok(()) => writer.flush().await,
					Err(e) => Err(e),
				};
				if let Err(e) = written {
					error!(target = "renvim.rpc", error = %e, "transport write failed");
					this.shutdown(CloseReason::Transport(e.to_string()));
					break;
				}
			}
		});

		let reason = loop {
			match reader.next().await {
				Some(Ok(message)) => self.dispatch_internal(message),
				Some(Err(e)) => {
					error!(target = "renvim.rpc", error = %e, "transport read failed");
					break match Error::from(e) {
						Error::Protocol(msg) => CloseReason::Protocol(msg),
						other => CloseReason::Transport(other.to_string()),
					};
				}
				None => {
					debug!(target = "renvim.rpc", "host closed the connection");
					break CloseReason::Eof;
				}
			}
		};

		self.shutdown(reason);
		writer_handle.abort();
	}

	/// Fails every pending call, drops all handlers and marks the connection closed.
	fn shutdown(&self, reason: CloseReason) {
		let calls = {
			let mut pending = self.pending.lock();
			if pending.closed.is_none() {
				pending.closed = Some(reason.clone());
			}
			std::mem::take(&mut pending.calls)
		};
		for (id, call) in calls {
			debug!(target = "renvim.rpc", id, method = %call.method, "failing pending call");
			let _ = call.tx.send(Err(reason.to_error()));
		}
		self.handlers.clear();
		self.closed.cancel();
	}

	/// Dispatch an incoming message (test-only public version)
	#[cfg(test)]
	pub(crate) fn dispatch(&self, message: Message) {
		self.dispatch_internal(message)
	}

	fn dispatch_internal(&self, message: Message) {
		match message {
			Message::Response(response) => self.handle_response(response),
			Message::Notification(notification) => self.handle_notification(notification),
			Message::Request(request) => self.refuse_request(request),
		}
	}

	fn handle_response(&self, response: Response) {
		let Some(call) = self.pending.lock().calls.remove(&response.id) else {
			warn!(
				target = "renvim.rpc",
				id = response.id,
				"response for unknown request (ignored)"
			);
			return;
		};

		trace!(target = "renvim.rpc", id = response.id, method = %call.method, "received response");
		let result = response.into_result().map_err(|err| Error::Remote {
			message: error_message(&err),
			method: call.method,
		});
		let _ = call.tx.send(result);
	}

	fn handle_notification(&self, notification: Notification) {
		// Clone out of the map so the handler runs without holding a shard lock.
		let handler = self
			.handlers
			.get(&notification.method)
			.map(|entry| Arc::clone(entry.value()));

		match handler {
			Some(handler) => {
				trace!(target = "renvim.rpc", method = %notification.method, "dispatching notification");
				handler(notification.params);
			}
			None => debug!(
				target = "renvim.rpc",
				method = %notification.method,
				"notification without handler (ignored)"
			),
		}
	}

	/// The host may issue requests over the same channel; this client serves
	/// none, so reply with an error rather than leave the host waiting.
	fn refuse_request(&self, request: Request) {
		debug!(target = "renvim.rpc", id = request.id, method = %request.method, "refusing host request");
		let reply = Response::err(request.id, format!("renvim does not handle {}", request.method));
		let mut frame = BytesMut::new();
		match encode_message(&mut frame, &Message::Response(reply)) {
			Ok(()) => {
				let _ = self.outbound_tx.send(frame.freeze());
			}
			Err(e) => error!(target = "renvim.rpc", error = %e, "failed to encode refusal"),
		}
	}
}

//! Session lifecycle: subscribe, open every resource, wait, clean up.
//!
//! ```text
//! Idle -> Subscribing -> Opening -> Waiting -> Draining -> Done
//!             |             |                     ^
//!             +-------------+---- fatal error ----+
//! ```
//!
//! A failure on one resource is recorded and the next resource is tried.
//! Setup failures and transport or protocol errors end the session, after
//! the hooks installed so far have been removed.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatch::CommandDispatcher;
use crate::error::{Error, Result};
use crate::host::RemoteHost;
use crate::registry::{ViewId, ViewRegistry, Wake};
use crate::subscriber::{HookStrategy, NotificationSubscriber};

/// Notification name the host hooks send.
pub const DEFAULT_EVENT: &str = "renvimExit";

/// Upper bound on cleanup after waiting.
pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lines read from local input, without their terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
	/// Notification name used by the close hooks.
	pub event: String,
	pub strategy: HookStrategy,
	pub teardown_timeout: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			event: DEFAULT_EVENT.to_string(),
			strategy: HookStrategy::default(),
			teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
		}
	}
}

/// Something to open in its own view.
pub enum Resource {
	/// A bare new tab.
	Empty,
	/// A new tab filled with streamed lines, left unnamed.
	Stream(LineStream),
	/// A file on disk.
	Path(PathBuf),
}

impl Resource {
	/// Short name used in diagnostics.
	pub fn label(&self) -> String {
		match self {
			Resource::Empty | Resource::Stream(_) => "-".to_string(),
			Resource::Path(path) => path.display().to_string(),
		}
	}
}

impl fmt::Debug for Resource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Resource::Empty => f.write_str("Empty"),
			Resource::Stream(_) => f.write_str("Stream(..)"),
			Resource::Path(path) => f.debug_tuple("Path").field(path).finish(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Idle,
	Subscribing,
	Opening,
	Waiting,
	Draining,
	Done,
}

/// A resource that could not be opened or filled.
#[derive(Debug)]
pub struct ResourceFailure {
	pub resource: String,
	pub error: Error,
}

/// Outcome of a session that reached [`SessionState::Done`] without a fatal error.
#[derive(Debug)]
pub struct SessionReport {
	/// Views opened and tracked.
	pub opened: usize,
	pub failures: Vec<ResourceFailure>,
	pub wake: Wake,
	/// Views still open when the wait ended.
	pub outstanding: usize,
	/// Cleanup problems; logged, never fatal.
	pub teardown_errors: Vec<Error>,
}

pub struct SessionController {
	host: Arc<dyn RemoteHost>,
	config: SessionConfig,
	state: SessionState,
}

impl SessionController {
	pub fn new(host: Arc<dyn RemoteHost>, config: SessionConfig) -> Self {
		Self {
			host,
			config,
			state: SessionState::Idle,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	/// Opens `resources` and blocks until all resulting views are closed or
	/// `cancel` fires.
	pub async fn run(&mut self, resources: Vec<Resource>, cancel: CancellationToken) -> Result<SessionReport> {
		let (mut registry, sink) = ViewRegistry::new();
		let mut subscriber = NotificationSubscriber::new(
			Arc::clone(&self.host),
			self.config.event.clone(),
			self.config.strategy,
		);
		let dispatcher = CommandDispatcher::new(Arc::clone(&self.host));

		self.transition(SessionState::Subscribing);
		if let Err(e) = subscriber.prepare(sink).await {
			warn!(target = "renvim.session", error = %e, "session setup failed");
			self.abort(&mut subscriber).await;
			return Err(e);
		}

		self.transition(SessionState::Opening);
		let mut opened = 0;
		let mut failures = Vec::new();
		for resource in resources {
			if cancel.is_cancelled() {
				break;
			}
			let label = resource.label();

			let step = tokio::select! {
				biased;
				_ = cancel.cancelled() => None,
				result = open_resource(&dispatcher, &mut subscriber, &mut registry, &mut opened, resource) => Some(result),
			};

			match step {
				None => break,
				Some(Ok(view)) => debug!(target = "renvim.session", %view, resource = %label, "resource open"),
				Some(Err(e)) if e.is_fatal() => {
					warn!(target = "renvim.session", resource = %label, error = %e, "fatal error while opening");
					self.abort(&mut subscriber).await;
					return Err(e);
				}
				Some(Err(e)) => {
					warn!(target = "renvim.session", resource = %label, error = %e, "failed to open resource");
					failures.push(ResourceFailure {
						resource: label,
						error: e,
					});
				}
			}
		}

		let wake = if cancel.is_cancelled() {
			info!(target = "renvim.session", opened, "cancelled while opening");
			Wake::Cancelled
		} else {
			self.transition(SessionState::Waiting);
			registry.await_all_or_cancelled(&cancel).await
		};
		let outstanding = registry.outstanding();
		info!(target = "renvim.session", ?wake, opened, outstanding, "wait finished");

		self.transition(SessionState::Draining);
		let teardown_errors = subscriber.teardown(self.config.teardown_timeout).await;
		self.transition(SessionState::Done);

		if wake == Wake::Disconnected {
			return Err(Error::Transport(format!(
				"control channel closed with {outstanding} view(s) still open"
			)));
		}

		Ok(SessionReport {
			opened,
			failures,
			wake,
			outstanding,
			teardown_errors,
		})
	}

	async fn abort(&mut self, subscriber: &mut NotificationSubscriber) {
		self.transition(SessionState::Draining);
		subscriber.teardown(self.config.teardown_timeout).await;
		self.transition(SessionState::Done);
	}

	fn transition(&mut self, next: SessionState) {
		debug!(target = "renvim.session", from = ?self.state, to = ?next, "state");
		self.state = next;
	}
}

/// Opens one resource, hooks and tracks its view, then fills it.
///
/// A view whose hook could not be installed is not tracked, so the wait
/// cannot hang on it.
async fn open_resource(
	dispatcher: &CommandDispatcher,
	subscriber: &mut NotificationSubscriber,
	registry: &mut ViewRegistry,
	opened: &mut usize,
	resource: Resource,
) -> Result<ViewId> {
	let (path, content) = match resource {
		Resource::Empty => (None, None),
		Resource::Stream(lines) => (None, Some(lines)),
		Resource::Path(path) => (Some(path), None),
	};

	let view = dispatcher.open_view(path.as_deref()).await?;
	if let Err(e) = subscriber.watch(view).await {
		return Err(match &path {
			Some(path) => e.at_path(path.display().to_string()),
			None => e,
		});
	}
	registry.track(view);
	*opened += 1;

	if let Some(lines) = content {
		dispatcher.stream_content(view, lines).await?;
		dispatcher.discard_first_line(view).await;
		dispatcher.set_ephemeral_name(view).await;
	}
	Ok(view)
}

//! Ledger of views opened by this session.
//!
//! The registry has a single owner. Completions reach it as messages: the
//! notification handler (running on the connection's listener task) posts a
//! [`ViewId`] through a [`CompletionSender`], and the owner folds those into
//! the ledger while it waits in [`ViewRegistry::await_all_or_cancelled`].

use std::collections::HashMap;
use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Host-assigned buffer handle of an opened view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub i64);

impl fmt::Display for ViewId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Why [`ViewRegistry::await_all_or_cancelled`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
	/// Every tracked view has been completed.
	Completed,
	/// The cancellation token fired first.
	Cancelled,
	/// Every completion sender was dropped while views were outstanding.
	Disconnected,
}

/// Cloneable handle for reporting closed views.
#[derive(Debug, Clone)]
pub struct CompletionSender {
	tx: mpsc::UnboundedSender<ViewId>,
}

impl CompletionSender {
	/// Posts a completion without blocking. Returns false once the registry
	/// is gone.
	pub fn complete(&self, view: ViewId) -> bool {
		self.tx.send(view).is_ok()
	}
}

pub struct ViewRegistry {
	views: HashMap<ViewId, bool>,
	outstanding: usize,
	rx: mpsc::UnboundedReceiver<ViewId>,
}

impl ViewRegistry {
	/// Creates an empty registry and the sender that feeds it.
	pub fn new() -> (Self, CompletionSender) {
		let (tx, rx) = mpsc::unbounded_channel();
		let registry = Self {
			views: HashMap::new(),
			outstanding: 0,
			rx,
		};
		(registry, CompletionSender { tx })
	}

	/// Starts tracking `view`. Tracking an already known view does nothing.
	pub fn track(&mut self, view: ViewId) {
		if self.views.contains_key(&view) {
			return;
		}
		self.views.insert(view, false);
		self.outstanding += 1;
		debug!(target = "renvim.registry", %view, outstanding = self.outstanding, "tracking view");
	}

	/// Marks `view` completed. Returns true only on the transition.
	///
	/// Unknown views and repeated completions are ignored.
	pub fn complete(&mut self, view: ViewId) -> bool {
		match self.views.get_mut(&view) {
			Some(done @ false) => {
				*done = true;
				self.outstanding -= 1;
				debug!(target = "renvim.registry", %view, outstanding = self.outstanding, "view completed");
				true
			}
			Some(true) => {
				trace!(target = "renvim.registry", %view, "duplicate completion");
				false
			}
			None => {
				trace!(target = "renvim.registry", %view, "completion for untracked view");
				false
			}
		}
	}

	pub fn outstanding(&self) -> usize {
		self.outstanding
	}

	pub fn is_tracked(&self, view: ViewId) -> bool {
		self.views.contains_key(&view)
	}

	/// Number of views ever tracked.
	pub fn len(&self) -> usize {
		self.views.len()
	}

	pub fn is_empty(&self) -> bool {
		self.views.is_empty()
	}

	/// Folds in completions until nothing is outstanding or `cancel` fires.
	///
	/// Returns [`Wake::Completed`] at once when nothing is outstanding.
	/// Cancellation wins over completions that arrive at the same moment.
	pub async fn await_all_or_cancelled(&mut self, cancel: &CancellationToken) -> Wake {
		while self.outstanding > 0 {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					debug!(target = "renvim.registry", outstanding = self.outstanding, "wait cancelled");
					return Wake::Cancelled;
				}
				received = self.rx.recv() => match received {
					Some(view) => {
						self.complete(view);
					}
					None => {
						debug!(target = "renvim.registry", outstanding = self.outstanding, "completion senders gone");
						return Wake::Disconnected;
					}
				},
			}
		}
		Wake::Completed
	}
}

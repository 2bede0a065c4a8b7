//! Close-event subscription and the host-side hooks that fire it.
//!
//! A hook is an autocmd on the host that sends a notification named after the
//! session's event whenever a buffer leaves its last window or is deleted.
//! Two hook shapes are supported:
//!
//! - [`HookStrategy::Global`]: one augroup firing for every buffer,
//!   broadcast to all subscribed channels. The registry drops views it did
//!   not open.
//! - [`HookStrategy::PerView`]: one buffer-local autocmd per opened view,
//!   addressed to this client's channel only.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use renvim_protocol::handle_id;
use renvim_runtime::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result, SetupStage};
use crate::host::RemoteHost;
use crate::registry::{CompletionSender, ViewId};

const GLOBAL_HOOK_LUA: &str = r#"
local group_name, event = ...
local group = vim.api.nvim_create_augroup(group_name, { clear = true })
vim.api.nvim_create_autocmd({ 'BufWinLeave', 'BufDelete' }, {
  group = group,
  callback = function(ev)
    vim.rpcnotify(0, event, ev.buf)
  end,
})
return group
"#;

const PER_VIEW_HOOK_LUA: &str = r#"
local buf, channel, event = ...
return vim.api.nvim_create_autocmd({ 'BufWinLeave', 'BufDelete' }, {
  buffer = buf,
  once = true,
  callback = function()
    vim.rpcnotify(channel, event, buf)
  end,
})
"#;

const DEL_GROUP_LUA: &str = "pcall(vim.api.nvim_del_augroup_by_id, ...)";

const DEL_AUTOCMD_LUA: &str = "pcall(vim.api.nvim_del_autocmd, ...)";

/// Which host-side hook reports closed views.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookStrategy {
	Global,
	#[default]
	PerView,
}

impl FromStr for HookStrategy {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"global" => Ok(HookStrategy::Global),
			"per-view" | "perview" | "per_view" => Ok(HookStrategy::PerView),
			other => Err(format!("unknown hook strategy '{other}' (expected global or per-view)")),
		}
	}
}

impl fmt::Display for HookStrategy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			HookStrategy::Global => "global",
			HookStrategy::PerView => "per-view",
		})
	}
}

/// A hook installed on the host, removed again at teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hook {
	Group(i64),
	Autocmd { id: i64, view: ViewId },
}

pub struct NotificationSubscriber {
	host: Arc<dyn RemoteHost>,
	event: String,
	strategy: HookStrategy,
	handler_registered: bool,
	subscribed: bool,
	hooks: Vec<Hook>,
	channel: Option<i64>,
}

impl NotificationSubscriber {
	pub fn new(host: Arc<dyn RemoteHost>, event: impl Into<String>, strategy: HookStrategy) -> Self {
		Self {
			host,
			event: event.into(),
			strategy,
			handler_registered: false,
			subscribed: false,
			hooks: Vec::new(),
			channel: None,
		}
	}

	pub fn event(&self) -> &str {
		&self.event
	}

	pub fn strategy(&self) -> HookStrategy {
		self.strategy
	}

	pub fn is_subscribed(&self) -> bool {
		self.subscribed
	}

	/// Number of hooks currently installed on the host.
	pub fn installed_hooks(&self) -> usize {
		self.hooks.len()
	}

	/// Routes this session's event to `sink`.
	///
	/// The handler runs on the connection's listener task, so it only parses
	/// the buffer handle and posts it.
	pub fn register_handler(&mut self, sink: CompletionSender) {
		let event = self.event.clone();
		self.host.register_handler(
			&self.event,
			Arc::new(move |params: Vec<Value>| {
				match params.first().and_then(handle_id) {
					Some(view) => {
						trace!(target = "renvim.subscriber", %event, view, "close event");
						sink.complete(ViewId(view));
					}
					None => debug!(target = "renvim.subscriber", %event, ?params, "close event without buffer"),
				}
			}),
		);
		self.handler_registered = true;
	}

	/// Subscribes this channel to the event. Repeated calls are no-ops.
	pub async fn subscribe(&mut self) -> Result<()> {
		if self.subscribed {
			return Ok(());
		}
		match self.host.subscribe(&self.event).await {
			Ok(()) => {
				debug!(target = "renvim.subscriber", event = %self.event, "subscribed");
				self.subscribed = true;
				Ok(())
			}
			Err(source) => {
				let duplicate = source
					.remote_message()
					.is_some_and(|msg| msg.to_ascii_lowercase().contains("already subscribed"));
				if duplicate {
					Err(Error::AlreadySubscribed(self.event.clone()))
				} else {
					Err(Error::Setup {
						stage: SetupStage::Subscribe,
						source,
					})
				}
			}
		}
	}

	/// Installs one augroup that reports every buffer closed on the host.
	pub async fn install_global_hook(&mut self) -> Result<()> {
		let group_name = format!("renvim_{}", std::process::id());
		let args = vec![Value::from(group_name.as_str()), Value::from(self.event.as_str())];
		let result = self
			.host
			.exec_lua(GLOBAL_HOOK_LUA, args)
			.await
			.map_err(|source| Error::Setup {
				stage: SetupStage::GlobalHook,
				source,
			})?;
		let group = result
			.as_i64()
			.ok_or_else(|| Error::Protocol(format!("augroup id is not an integer: {result}")))?;

		debug!(target = "renvim.subscriber", group, name = %group_name, "installed global hook");
		self.hooks.push(Hook::Group(group));
		Ok(())
	}

	/// Installs a buffer-local autocmd reporting `view` to `channel` only.
	pub async fn install_per_view_hook(&mut self, view: ViewId, channel: i64) -> Result<()> {
		let args = vec![
			Value::from(view.0),
			Value::from(channel),
			Value::from(self.event.as_str()),
		];
		let result = self.host.exec_lua(PER_VIEW_HOOK_LUA, args).await?;
		let id = result
			.as_i64()
			.ok_or_else(|| Error::Protocol(format!("autocmd id is not an integer: {result}")))?;

		debug!(target = "renvim.subscriber", %view, autocmd = id, "installed view hook");
		self.hooks.push(Hook::Autocmd { id, view });
		Ok(())
	}

	/// This client's channel id, asked for once.
	pub async fn channel_id(&mut self) -> Result<i64> {
		if let Some(channel) = self.channel {
			return Ok(channel);
		}
		let channel = self.host.channel_id().await.map_err(|source| Error::Setup {
			stage: SetupStage::ChannelInfo,
			source,
		})?;
		self.channel = Some(channel);
		Ok(channel)
	}

	/// Registers the handler, subscribes, and installs whatever the strategy
	/// needs before the first view opens.
	pub async fn prepare(&mut self, sink: CompletionSender) -> Result<()> {
		self.register_handler(sink);
		self.subscribe().await?;
		match self.strategy {
			HookStrategy::Global => self.install_global_hook().await,
			HookStrategy::PerView => self.channel_id().await.map(|_| ()),
		}
	}

	/// Installs the hook for `view` if the strategy is per view.
	pub async fn watch(&mut self, view: ViewId) -> Result<()> {
		match self.strategy {
			HookStrategy::Global => Ok(()),
			HookStrategy::PerView => {
				let channel = self.channel_id().await?;
				self.install_per_view_hook(view, channel).await
			}
		}
	}

	/// Unsubscribes, removes installed hooks and drops the handler.
	///
	/// Bounded by `timeout`. Failures are logged and returned, never raised.
	pub async fn teardown(&mut self, timeout: Duration) -> Vec<Error> {
		let mut errors = Vec::new();

		if tokio::time::timeout(timeout, self.remove_remote_state(&mut errors))
			.await
			.is_err()
		{
			warn!(target = "renvim.subscriber", ?timeout, "teardown timed out");
			errors.push(Error::Teardown(format!("timed out after {timeout:?}")));
		}

		if self.handler_registered {
			self.host.unregister_handler(&self.event);
			self.handler_registered = false;
		}
		errors
	}

	async fn remove_remote_state(&mut self, errors: &mut Vec<Error>) {
		if self.subscribed {
			match self.host.unsubscribe(&self.event).await {
				Ok(()) => {
					debug!(target = "renvim.subscriber", event = %self.event, "unsubscribed");
					self.subscribed = false;
				}
				Err(e) => {
					warn!(target = "renvim.subscriber", event = %self.event, error = %e, "failed to unsubscribe");
					errors.push(Error::Teardown(format!("unsubscribe {}: {e}", self.event)));
				}
			}
		}

		while let Some(hook) = self.hooks.pop() {
			let removed = match hook {
				Hook::Group(id) => self.host.exec_lua(DEL_GROUP_LUA, vec![Value::from(id)]).await,
				Hook::Autocmd { id, .. } => self.host.exec_lua(DEL_AUTOCMD_LUA, vec![Value::from(id)]).await,
			};
			match removed {
				Ok(_) => trace!(target = "renvim.subscriber", ?hook, "removed hook"),
				Err(e) => {
					warn!(target = "renvim.subscriber", ?hook, error = %e, "failed to remove hook");
					errors.push(Error::Teardown(format!("remove {hook:?}: {e}")));
				}
			}
		}
	}
}

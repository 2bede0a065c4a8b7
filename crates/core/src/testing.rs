//! In-memory [`RemoteHost`] for unit tests.
//!
//! Records every call as a short line (`command tabnew /tmp/a`,
//! `lua view_hook 2`, ...), hands out buffer and autocmd ids, and lets a
//! test script failures by call prefix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use renvim_runtime::{Error, NotificationHandler, Result, Value};

use crate::host::{HostFuture, RemoteHost};
use crate::registry::ViewId;

pub(crate) const GROUP_ID: i64 = 100;

#[derive(Clone)]
enum Scripted {
	Remote(String),
	Fatal,
	Stall,
}

#[derive(Default)]
struct State {
	calls: Vec<String>,
	current: i64,
	last_buf: i64,
	last_autocmd: i64,
	channel: i64,
	/// autocmd id -> buffer
	view_hooks: HashMap<i64, i64>,
	group: bool,
	lines: HashMap<i64, Vec<Value>>,
	script: Vec<(String, Scripted)>,
}

#[derive(Default)]
pub(crate) struct FakeHost {
	state: Mutex<State>,
	handlers: Mutex<HashMap<String, NotificationHandler>>,
}

impl FakeHost {
	pub(crate) fn new() -> Arc<Self> {
		let host = Self::default();
		host.state.lock().channel = 3;
		Arc::new(host)
	}

	/// Calls whose line starts with `prefix` fail with a host error.
	pub(crate) fn fail_on(&self, prefix: &str) {
		self.fail_with(prefix, "Vim:E5555: scripted failure");
	}

	/// Like [`fail_on`](Self::fail_on) with a specific error text.
	pub(crate) fn fail_with(&self, prefix: &str, message: &str) {
		self.state
			.lock()
			.script
			.push((prefix.to_string(), Scripted::Remote(message.to_string())));
	}

	/// Calls whose line starts with `prefix` fail as if the channel closed.
	pub(crate) fn close_on(&self, prefix: &str) {
		self.state.lock().script.push((prefix.to_string(), Scripted::Fatal));
	}

	/// Calls whose line starts with `prefix` never complete.
	pub(crate) fn stall_on(&self, prefix: &str) {
		self.state.lock().script.push((prefix.to_string(), Scripted::Stall));
	}

	pub(crate) fn calls(&self) -> Vec<String> {
		self.state.lock().calls.clone()
	}

	pub(crate) fn count(&self, prefix: &str) -> usize {
		self.state.lock().calls.iter().filter(|c| c.starts_with(prefix)).count()
	}

	/// Buffers opened so far, in order.
	pub(crate) fn opened(&self) -> Vec<ViewId> {
		let last = self.state.lock().last_buf;
		(1..=last).map(ViewId).collect()
	}

	pub(crate) fn active_hooks(&self) -> usize {
		let state = self.state.lock();
		state.view_hooks.len() + usize::from(state.group)
	}

	pub(crate) fn lines(&self, view: ViewId) -> Vec<Value> {
		self.state.lock().lines.get(&view.0).cloned().unwrap_or_default()
	}

	pub(crate) fn has_handler(&self, event: &str) -> bool {
		self.handlers.lock().contains_key(event)
	}

	/// Delivers a notification the way the listener task would.
	pub(crate) fn notify(&self, event: &str, params: Vec<Value>) {
		let handler = self.handlers.lock().get(event).cloned();
		if let Some(handler) = handler {
			handler(params);
		}
	}

	/// Closes `view` on the host, firing whichever hook covers it.
	pub(crate) fn close_view(&self, event: &str, view: ViewId) {
		let fires = {
			let mut state = self.state.lock();
			let hook = state
				.view_hooks
				.iter()
				.find(|(_, buf)| **buf == view.0)
				.map(|(id, _)| *id);
			// Per-view hooks are `once`.
			if let Some(id) = hook {
				state.view_hooks.remove(&id);
			}
			hook.is_some() || state.group
		};
		if fires {
			self.notify(event, vec![Value::from(view.0)]);
		}
	}

	fn record(&self, line: String) -> Option<Scripted> {
		let mut state = self.state.lock();
		let scripted = state
			.script
			.iter()
			.find(|(prefix, _)| line.starts_with(prefix.as_str()))
			.map(|(_, s)| s.clone());
		state.calls.push(line);
		scripted
	}

	async fn gate(&self, line: String) -> Result<()> {
		let method = line.split(' ').next().unwrap_or_default().to_string();
		match self.record(line) {
			None => Ok(()),
			Some(Scripted::Remote(message)) => Err(Error::Remote { method, message }),
			Some(Scripted::Fatal) => Err(Error::ChannelClosed),
			Some(Scripted::Stall) => std::future::pending().await,
		}
	}

	fn lua_kind(code: &str) -> &'static str {
		if code.contains("nvim_create_augroup") {
			"global_hook"
		} else if code.contains("buffer = buf") {
			"view_hook"
		} else if code.contains("nvim_del_autocmd") {
			"del_autocmd"
		} else if code.contains("nvim_del_augroup_by_id") {
			"del_group"
		} else if code.contains("0file") {
			"ephemeral"
		} else {
			"snippet"
		}
	}
}

impl RemoteHost for FakeHost {
	fn command<'a>(&'a self, command: &'a str) -> HostFuture<'a, ()> {
		Box::pin(async move {
			self.gate(format!("command {command}")).await?;
			if command.starts_with("tabnew") {
				let mut state = self.state.lock();
				state.last_buf += 1;
				state.current = state.last_buf;
				let buf = state.current;
				state.lines.insert(buf, vec![Value::from("")]);
			}
			Ok(())
		})
	}

	fn current_view(&self) -> HostFuture<'_, ViewId> {
		Box::pin(async move {
			self.gate("current_view".to_string()).await?;
			Ok(ViewId(self.state.lock().current))
		})
	}

	fn set_lines(&self, view: ViewId, start: i64, end: i64, lines: Vec<Value>) -> HostFuture<'_, ()> {
		Box::pin(async move {
			self.gate(format!("set_lines {view} {start} {end}")).await?;
			let mut state = self.state.lock();
			let buffer = state.lines.entry(view.0).or_default();
			match (start, end) {
				(-1, -1) => buffer.extend(lines),
				(0, 1) if !buffer.is_empty() => {
					let tail = buffer.split_off(1);
					*buffer = lines;
					buffer.extend(tail);
				}
				_ => {}
			}
			Ok(())
		})
	}

	fn exec_lua<'a>(&'a self, code: &'a str, args: Vec<Value>) -> HostFuture<'a, Value> {
		Box::pin(async move {
			let kind = Self::lua_kind(code);
			let first = args.first().and_then(Value::as_i64).unwrap_or_default();
			self.gate(format!("lua {kind} {first}")).await?;

			let mut state = self.state.lock();
			Ok(match kind {
				"global_hook" => {
					state.group = true;
					Value::from(GROUP_ID)
				}
				"view_hook" => {
					state.last_autocmd += 1;
					let id = state.last_autocmd;
					state.view_hooks.insert(id, first);
					Value::from(id)
				}
				"del_autocmd" => {
					state.view_hooks.remove(&first);
					Value::Nil
				}
				"del_group" => {
					state.group = false;
					Value::Nil
				}
				_ => Value::Nil,
			})
		})
	}

	fn subscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()> {
		Box::pin(self.gate(format!("subscribe {event}")))
	}

	fn unsubscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()> {
		Box::pin(self.gate(format!("unsubscribe {event}")))
	}

	fn channel_id(&self) -> HostFuture<'_, i64> {
		Box::pin(async move {
			self.gate("channel_id".to_string()).await?;
			Ok(self.state.lock().channel)
		})
	}

	fn register_handler(&self, event: &str, handler: NotificationHandler) {
		self.handlers.lock().insert(event.to_string(), handler);
	}

	fn unregister_handler(&self, event: &str) {
		self.handlers.lock().remove(event);
	}
}

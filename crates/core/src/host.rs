//! The host operations a session needs.
//!
//! [`RemoteHost`] is the seam between the session logic and the wire. The
//! msgpack-rpc [`Connection`] implements it; tests substitute an in-memory
//! fake.

use std::future::Future;
use std::pin::Pin;

use renvim_protocol::handle_id;
use renvim_runtime::{Connection, Error, NotificationHandler, Result, Value};

use crate::registry::ViewId;

/// Boxed future returned by [`RemoteHost`] methods.
pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Remote operations on a running editor host.
pub trait RemoteHost: Send + Sync {
	/// Runs an Ex command.
	fn command<'a>(&'a self, command: &'a str) -> HostFuture<'a, ()>;

	/// Returns the buffer shown in the current window.
	fn current_view(&self) -> HostFuture<'_, ViewId>;

	/// Replaces lines `start..end` of `view`; negative indices count from the end.
	fn set_lines(&self, view: ViewId, start: i64, end: i64, lines: Vec<Value>) -> HostFuture<'_, ()>;

	/// Executes a Lua chunk with `...` bound to `args`.
	fn exec_lua<'a>(&'a self, code: &'a str, args: Vec<Value>) -> HostFuture<'a, Value>;

	fn subscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()>;

	fn unsubscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()>;

	/// This client's channel id on the host.
	fn channel_id(&self) -> HostFuture<'_, i64>;

	/// Routes notifications named `event` to `handler`.
	fn register_handler(&self, event: &str, handler: NotificationHandler);

	fn unregister_handler(&self, event: &str);
}

impl RemoteHost for Connection {
	fn command<'a>(&'a self, command: &'a str) -> HostFuture<'a, ()> {
		Box::pin(async move {
			self.call("nvim_command", vec![Value::from(command)]).await?;
			Ok(())
		})
	}

	fn current_view(&self) -> HostFuture<'_, ViewId> {
		Box::pin(async move {
			let handle = self.call("nvim_get_current_buf", Vec::new()).await?;
			handle_id(&handle)
				.map(ViewId)
				.ok_or_else(|| Error::Protocol(format!("not a buffer handle: {handle}")))
		})
	}

	fn set_lines(&self, view: ViewId, start: i64, end: i64, lines: Vec<Value>) -> HostFuture<'_, ()> {
		Box::pin(async move {
			let args = vec![
				Value::from(view.0),
				Value::from(start),
				Value::from(end),
				Value::Boolean(false),
				Value::Array(lines),
			];
			self.call("nvim_buf_set_lines", args).await?;
			Ok(())
		})
	}

	fn exec_lua<'a>(&'a self, code: &'a str, args: Vec<Value>) -> HostFuture<'a, Value> {
		Box::pin(self.call("nvim_exec_lua", vec![Value::from(code), Value::Array(args)]))
	}

	fn subscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()> {
		Box::pin(async move {
			self.call("nvim_subscribe", vec![Value::from(event)]).await?;
			Ok(())
		})
	}

	fn unsubscribe<'a>(&'a self, event: &'a str) -> HostFuture<'a, ()> {
		Box::pin(async move {
			self.call("nvim_unsubscribe", vec![Value::from(event)]).await?;
			Ok(())
		})
	}

	fn channel_id(&self) -> HostFuture<'_, i64> {
		Box::pin(Connection::channel_id(self))
	}

	fn register_handler(&self, event: &str, handler: NotificationHandler) {
		Connection::register_handler(self, event, handler);
	}

	fn unregister_handler(&self, event: &str) {
		Connection::unregister_handler(self, event);
	}
}

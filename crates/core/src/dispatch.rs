//! Builds and issues the remote operations that open and fill views.

use std::borrow::Cow;
use std::io;
use std::path::Path;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use renvim_runtime::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::host::RemoteHost;
use crate::registry::ViewId;

/// Characters escaped with a backslash on an Ex command line.
const EX_SPECIAL: &[char] = &[
	' ', '\t', '\n', '*', '?', '[', '{', '`', '$', '\\', '%', '#', '\'', '"', '|', '!', '<',
];

/// Clears the buffer name and modified flag without touching any other buffer.
const EPHEMERAL_NAME_LUA: &str = r#"
local buf = ...
vim.api.nvim_buf_call(buf, function()
  vim.cmd('silent! 0file')
end)
vim.bo[buf].modified = false
"#;

/// Escapes `path` for use as a file argument on an Ex command line.
pub fn escape_ex_path(path: &str) -> Cow<'_, str> {
	if path == "-" {
		return Cow::Borrowed("\\-");
	}
	let leading = path.starts_with(['+', '>']);
	if !leading && !path.contains(EX_SPECIAL) {
		return Cow::Borrowed(path);
	}

	let mut escaped = String::with_capacity(path.len() + 8);
	for (i, c) in path.chars().enumerate() {
		if EX_SPECIAL.contains(&c) || (i == 0 && leading) {
			escaped.push('\\');
		}
		escaped.push(c);
	}
	Cow::Owned(escaped)
}

/// Issues view-level commands against a [`RemoteHost`].
#[derive(Clone)]
pub struct CommandDispatcher {
	host: Arc<dyn RemoteHost>,
}

impl CommandDispatcher {
	pub fn new(host: Arc<dyn RemoteHost>) -> Self {
		Self { host }
	}

	/// Opens a new tab, editing `path` when given, and returns its buffer.
	pub async fn open_view(&self, path: Option<&Path>) -> Result<ViewId> {
		let label = path.map(|p| p.display().to_string());
		let command = match path {
			Some(path) => {
				let resolved = match std::path::absolute(path) {
					Ok(abs) => abs,
					Err(e) => {
						warn!(target = "renvim.dispatch", path = %path.display(), error = %e, "failed to resolve path");
						path.to_path_buf()
					}
				};
				let resolved = resolved.to_string_lossy();
				format!("tabnew {}", escape_ex_path(&resolved))
			}
			None => "tabnew".to_string(),
		};

		let opened = async {
			self.host.command(&command).await?;
			self.host.current_view().await
		}
		.await;

		match opened {
			Ok(view) => {
				debug!(target = "renvim.dispatch", %view, %command, "opened view");
				Ok(view)
			}
			Err(source) => Err(Error::RemoteCommand { path: label, source }),
		}
	}

	/// Appends every line from `lines` to the end of `view`, in order.
	///
	/// Lines are sent as raw bytes so input that is not UTF-8 arrives intact.
	/// Returns the number of lines written.
	pub async fn stream_content<S>(&self, view: ViewId, lines: S) -> Result<usize>
	where
		S: Stream<Item = io::Result<Vec<u8>>>,
	{
		let mut lines = std::pin::pin!(lines);
		let mut written = 0;
		while let Some(line) = lines.next().await {
			let line = line?;
			self.host
				.set_lines(view, -1, -1, vec![Value::Binary(line)])
				.await?;
			written += 1;
		}
		debug!(target = "renvim.dispatch", %view, lines = written, "streamed content");
		Ok(written)
	}

	/// Drops the empty line a fresh buffer starts with. Best effort.
	pub async fn discard_first_line(&self, view: ViewId) {
		if let Err(e) = self.host.set_lines(view, 0, 1, Vec::new()).await {
			warn!(target = "renvim.dispatch", %view, error = %e, "failed to discard placeholder line");
		}
	}

	/// Leaves streamed content unnamed and unmodified. Best effort.
	pub async fn set_ephemeral_name(&self, view: ViewId) {
		if let Err(e) = self
			.host
			.exec_lua(EPHEMERAL_NAME_LUA, vec![Value::from(view.0)])
			.await
		{
			warn!(target = "renvim.dispatch", %view, error = %e, "failed to clear buffer name");
		}
	}

	/// Runs a Lua snippet on the host and returns its result.
	pub async fn exec_snippet(&self, code: &str, args: Vec<Value>) -> Result<Value> {
		Ok(self.host.exec_lua(code, args).await?)
	}
}

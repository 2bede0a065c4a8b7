//! Running as `nvim` itself when there is no host to talk to.

use std::convert::Infallible;
use std::process::Command;

use anyhow::{Context, Result};
use renvim_runtime::Address;
use tracing::debug;

/// Whether to replace this process with `nvim` instead of opening views.
///
/// True when no host is configured, or when every argument is a `--`
/// option (`renvim --version` inside a terminal buffer should still behave
/// like `nvim --version`).
pub fn should_exec(address: Option<&Address>, args: &[String]) -> bool {
	address.is_none() || (!args.is_empty() && args.iter().all(|arg| arg.starts_with("--")))
}

pub fn version_requested(args: &[String]) -> bool {
	args.iter().any(|arg| arg == "--version")
}

pub fn version_banner() -> String {
	format!("renvim v{} -- Neovim wrapper.\n", env!("CARGO_PKG_VERSION"))
}

/// Replaces the current process with `nvim args...`.
///
/// Only returns on failure.
pub fn exec_nvim(args: &[String]) -> Result<Infallible> {
	let nvim = which::which("nvim").context("nvim not found in PATH")?;
	debug!(target = "renvim.launch", nvim = %nvim.display(), ?args, "exec");

	let mut command = Command::new(&nvim);
	command.args(args);
	exec(command).with_context(|| format!("failed to exec {}", nvim.display()))
}

#[cfg(unix)]
fn exec(mut command: Command) -> std::io::Result<Infallible> {
	use std::os::unix::process::CommandExt;

	Err(command.exec())
}

#[cfg(not(unix))]
fn exec(mut command: Command) -> std::io::Result<Infallible> {
	let status = command.status()?;
	std::process::exit(status.code().unwrap_or(1));
}

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancel` on SIGINT or SIGTERM.
#[cfg(unix)]
pub fn cancel_on_signal(cancel: CancellationToken) -> Result<()> {
	use tokio::signal::unix::{SignalKind, signal};

	let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
	let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

	tokio::spawn(async move {
		tokio::select! {
			_ = sigterm.recv() => info!(target = "renvim.signal", "received SIGTERM, releasing views"),
			_ = sigint.recv() => info!(target = "renvim.signal", "received SIGINT, releasing views"),
			_ = cancel.cancelled() => return,
		}
		cancel.cancel();
	});
	Ok(())
}

/// Cancels `cancel` on Ctrl+C.
#[cfg(not(unix))]
pub fn cancel_on_signal(cancel: CancellationToken) -> Result<()> {
	tokio::spawn(async move {
		tokio::select! {
			result = tokio::signal::ctrl_c() => {
				if result.is_err() {
					return;
				}
				info!(target = "renvim.signal", "received Ctrl+C, releasing views");
			}
			_ = cancel.cancelled() => return,
		}
		cancel.cancel();
	});
	Ok(())
}

//! `renvim`: open files in the Neovim this shell is running inside.
//!
//! Inside a `:terminal` buffer Neovim exports `$NVIM`. `renvim` connects to
//! that socket, opens each argument in a new tab, and blocks until every tab
//! it opened has been closed, so it works as `$EDITOR` for tools such as
//! `git commit`. Outside Neovim it simply becomes `nvim`.

pub mod cli;
pub mod config;
pub mod launch;
pub mod logging;
pub mod resources;
pub mod signals;

use std::sync::Arc;

use anyhow::Result;
use renvim::{RemoteHost, SessionController, Wake};
use renvim_runtime::{Connection, dial};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::Cli;
use crate::config::Config;

pub async fn run(cli: Cli) -> Result<()> {
	let config = Config::from_env()?;
	let args = cli.args;

	let address = match &config.address {
		Some(address) if !launch::should_exec(Some(address), &args) => address,
		_ => {
			if launch::version_requested(&args) {
				println!("{}", launch::version_banner());
			}
			match launch::exec_nvim(&args)? {}
		}
	};

	let plan = resources::plan(&args);
	for option in &plan.ignored {
		eprintln!("Ignore option {option}");
	}

	let connection = Connection::spawn(dial(address).await?);
	debug!(target = "renvim.cli", %address, "connected");

	let cancel = CancellationToken::new();
	signals::cancel_on_signal(cancel.clone())?;

	let host: Arc<dyn RemoteHost> = connection;
	let mut controller = SessionController::new(host, config.session());
	let report = controller.run(plan.into_resources(), cancel).await?;

	for failure in &report.failures {
		eprintln!("renvim: {}", failure.error);
	}
	if report.wake == Wake::Cancelled {
		info!(target = "renvim.cli", outstanding = report.outstanding, "released by signal");
	}
	Ok(())
}

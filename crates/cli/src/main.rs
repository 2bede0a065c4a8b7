use clap::Parser;
use renvim_cli::{cli::Cli, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging();

	if let Err(err) = renvim_cli::run(cli).await {
		eprintln!("renvim: {err:#}");
		std::process::exit(1);
	}
}

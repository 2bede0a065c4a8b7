use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Variable holding an `EnvFilter` directive, e.g. `RENVIM_LOG=renvim=debug`.
pub const ENV_LOG: &str = "RENVIM_LOG";

pub fn init_logging() {
	// Quiet unless asked: diagnostics for failed resources are printed
	// separately, so only errors are logged by default.
	let env_filter = EnvFilter::try_from_env(ENV_LOG).unwrap_or_else(|_| EnvFilter::new("error"));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}

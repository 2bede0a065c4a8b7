//! Settings read from the environment.

use std::time::Duration;

use anyhow::{Context, Result};
use renvim::{DEFAULT_TEARDOWN_TIMEOUT, HookStrategy, SessionConfig};
use renvim_runtime::Address;

/// Address of the host this shell runs inside.
pub const ENV_NVIM: &str = "NVIM";
/// Legacy spelling of [`ENV_NVIM`].
pub const ENV_LISTEN_ADDRESS: &str = "NVIM_LISTEN_ADDRESS";
/// `global` or `per-view`.
pub const ENV_HOOK: &str = "RENVIM_HOOK";
/// Cleanup bound in milliseconds.
pub const ENV_TEARDOWN_MS: &str = "RENVIM_TEARDOWN_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// `None` when no host is reachable from this shell.
	pub address: Option<Address>,
	pub strategy: HookStrategy,
	pub teardown_timeout: Duration,
}

impl Config {
	pub fn from_env() -> Result<Self> {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Builds the config from an arbitrary variable lookup.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
		let address = [ENV_NVIM, ENV_LISTEN_ADDRESS]
			.into_iter()
			.find_map(|key| lookup(key).as_deref().and_then(Address::parse));

		let strategy = match lookup(ENV_HOOK) {
			Some(raw) if !raw.trim().is_empty() => raw
				.parse()
				.map_err(anyhow::Error::msg)
				.with_context(|| format!("invalid {ENV_HOOK}"))?,
			_ => HookStrategy::default(),
		};

		let teardown_timeout = match lookup(ENV_TEARDOWN_MS) {
			Some(raw) if !raw.trim().is_empty() => {
				let ms: u64 = raw
					.trim()
					.parse()
					.with_context(|| format!("invalid {ENV_TEARDOWN_MS} '{raw}'"))?;
				Duration::from_millis(ms)
			}
			_ => DEFAULT_TEARDOWN_TIMEOUT,
		};

		Ok(Self {
			address,
			strategy,
			teardown_timeout,
		})
	}

	pub fn session(&self) -> SessionConfig {
		SessionConfig {
			strategy: self.strategy,
			teardown_timeout: self.teardown_timeout,
			..SessionConfig::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;
	use std::path::PathBuf;

	use super::*;

	fn config(vars: &[(&str, &str)]) -> Result<Config> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		Config::from_lookup(|key| vars.get(key).cloned())
	}

	#[test]
	fn test_defaults_without_host() {
		let config = config(&[]).unwrap();
		assert_eq!(config.address, None);
		assert_eq!(config.strategy, HookStrategy::PerView);
		assert_eq!(config.teardown_timeout, DEFAULT_TEARDOWN_TIMEOUT);
	}

	#[test]
	fn test_nvim_wins_over_listen_address() {
		let config = config(&[
			(ENV_NVIM, "/run/user/1000/nvim.42.0"),
			(ENV_LISTEN_ADDRESS, "127.0.0.1:6666"),
		])
		.unwrap();
		assert_eq!(
			config.address,
			Some(Address::Local(PathBuf::from("/run/user/1000/nvim.42.0")))
		);
	}

	#[test]
	fn test_empty_nvim_falls_back() {
		let config = config(&[(ENV_NVIM, ""), (ENV_LISTEN_ADDRESS, "127.0.0.1:6666")]).unwrap();
		assert_eq!(config.address, Some(Address::Tcp("127.0.0.1:6666".to_string())));
	}

	#[test]
	fn test_hook_and_timeout_overrides() {
		let config = config(&[(ENV_HOOK, "global"), (ENV_TEARDOWN_MS, "250")]).unwrap();
		assert_eq!(config.strategy, HookStrategy::Global);
		assert_eq!(config.session().teardown_timeout, Duration::from_millis(250));
		assert_eq!(config.session().event, renvim::DEFAULT_EVENT);
	}

	#[test]
	fn test_invalid_values_are_errors() {
		let err = config(&[(ENV_HOOK, "sometimes")]).unwrap_err();
		assert!(format!("{err:#}").contains(ENV_HOOK));

		let err = config(&[(ENV_TEARDOWN_MS, "soon")]).unwrap_err();
		assert!(format!("{err:#}").contains(ENV_TEARDOWN_MS));
	}
}

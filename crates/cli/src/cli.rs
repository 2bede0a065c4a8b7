use clap::Parser;

/// Open files in the Neovim this shell is running inside.
///
/// Every argument is passed through untouched: `renvim` either hands them to
/// `nvim` or opens each one in a new tab of the running host.
#[derive(Parser, Debug)]
#[command(name = "renvim")]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Cli {
	/// Files to open; `-` reads standard input
	#[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
	pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(args: &[&str]) -> Vec<String> {
		Cli::try_parse_from(std::iter::once("renvim").chain(args.iter().copied()))
			.unwrap()
			.args
	}

	#[test]
	fn test_arguments_pass_through() {
		assert!(parse(&[]).is_empty());
		assert_eq!(parse(&["a.txt", "-"]), vec!["a.txt", "-"]);
		assert_eq!(parse(&["--version"]), vec!["--version"]);
		assert_eq!(parse(&["--help"]), vec!["--help"]);
		assert_eq!(parse(&["notes.md", "--clean", "-R"]), vec!["notes.md", "--clean", "-R"]);
	}
}

//! Turns command-line arguments into session resources.

use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use futures_util::{StreamExt, stream};
use renvim::{LineStream, Resource};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// What one argument asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
	Stdin,
	Path(PathBuf),
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Plan {
	pub targets: Vec<Target>,
	/// `--` options, which are not forwarded to the host.
	pub ignored: Vec<String>,
}

/// Sorts `args` into targets and ignored options. No targets at all means
/// standard input.
pub fn plan(args: &[String]) -> Plan {
	let mut plan = Plan::default();
	for arg in args {
		if arg.starts_with("--") {
			plan.ignored.push(arg.clone());
		} else if arg == "-" {
			plan.targets.push(Target::Stdin);
		} else {
			plan.targets.push(Target::Path(PathBuf::from(arg)));
		}
	}
	if args.is_empty() {
		plan.targets.push(Target::Stdin);
	}
	plan
}

impl Plan {
	/// Materializes the targets, reading standard input for `-`.
	pub fn into_resources(self) -> Vec<Resource> {
		let interactive = std::io::stdin().is_terminal();
		self.targets
			.into_iter()
			.map(|target| match target {
				Target::Path(path) => Resource::Path(path),
				Target::Stdin if interactive => Resource::Empty,
				Target::Stdin => Resource::Stream(line_stream(std::io::BufReader::new(std::io::stdin()))),
			})
			.collect()
	}
}

/// Splits `reader` into lines, dropping `\n` and a trailing `\r`.
///
/// Lines are read on a dedicated thread started on first poll, so a read
/// blocked on an open pipe never holds up runtime shutdown. The thread exits
/// at end of input, on a read error, or at the first line read after the
/// stream was dropped.
pub fn line_stream<R>(reader: R) -> LineStream
where
	R: BufRead + Send + 'static,
{
	let lines = stream::once(async move {
		let (tx, rx) = mpsc::unbounded_channel();
		std::thread::spawn(move || read_lines(reader, tx));
		UnboundedReceiverStream::new(rx)
	})
	.flatten();
	Box::pin(lines)
}

fn read_lines<R: BufRead>(reader: R, tx: mpsc::UnboundedSender<std::io::Result<Vec<u8>>>) {
	for line in reader.split(b'\n') {
		let failed = line.is_err();
		let line = line.map(|mut line| {
			if line.last() == Some(&b'\r') {
				line.pop();
			}
			line
		});
		if tx.send(line).is_err() || failed {
			return;
		}
	}
}

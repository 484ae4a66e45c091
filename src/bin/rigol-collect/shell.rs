use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use rigol_collect::save;
use rigol_collect::{plot, Connection, NetworkBackends, WaveformMode};

use crate::{report, Prompt};

const HELP:&str = "\
commands:
  connect                    connect to the scope (searching if none is known)
  disconnect                 close the connection
  status                     show whether the scope is connected
  data <dir> <name>          stop the scope and save displayed channels as CSV
  shot <dir> <name>          stop the scope and save the screen as PNG
  plot <dir> <name> <ch>     preview a channel of a saved CSV
  quit                       disconnect and exit";

#[derive(Debug, PartialEq)]
pub enum ShellCommand {
	Connect,
	Disconnect,
	Status,
	Data { dir: PathBuf, name: String },
	Shot { dir: PathBuf, name: String },
	Plot { dir: PathBuf, name: String, channel: u8 },
	Help,
	Quit,
}

/// Parse one line; blank lines give `None`.
pub fn parse_line(line:&str) -> Result<Option<ShellCommand>, String> {
	let words:Vec<&str> = line.split_whitespace().collect();
	let usage = |u:&str| Err(format!("usage: {}", u));

	let cmd = match words.as_slice() {
		[] => return Ok(None),
		["connect"]    => ShellCommand::Connect,
		["disconnect"] => ShellCommand::Disconnect,
		["status"]     => ShellCommand::Status,
		["help"] | ["?"] => ShellCommand::Help,
		["quit"] | ["exit"] => ShellCommand::Quit,
		["data", dir, name] => ShellCommand::Data{ dir: PathBuf::from(dir), name: name.to_string() },
		["data", ..] => return usage("data <dir> <name>"),
		["shot", dir, name] => ShellCommand::Shot{ dir: PathBuf::from(dir), name: name.to_string() },
		["shot", ..] => return usage("shot <dir> <name>"),
		["plot", dir, name, ch] => {
			let channel = ch.parse::<u8>().map_err(|_| format!("bad channel '{}'", ch))?;
			ShellCommand::Plot{ dir: PathBuf::from(dir), name: name.to_string(), channel }
		},
		["plot", ..] => return usage("plot <dir> <name> <ch>"),
		[other, ..] => return Err(format!("unknown command '{}', try help", other)),
	};

	Ok(Some(cmd))
}

fn warn(msg:impl std::fmt::Display) { eprintln!("warning: {}", msg); }

/// Read commands until `quit` or end of input, then disconnect.
pub fn run(conn:&mut Connection<NetworkBackends>, data_dir:&Path, screenshot_dir:&Path) -> io::Result<()> {
	println!("Data goes to {} and screenshots to {} unless given. Type help for commands.", data_dir.display(), screenshot_dir.display());

	let stdin = io::stdin();
	let mut line = String::new();
	loop {
		print!("{}> ", if conn.is_connected() { "scope" } else { "-" });
		io::stdout().flush()?;

		line.clear();
		if stdin.lock().read_line(&mut line)? == 0 { break; }

		let cmd = match parse_line(&line) {
			Ok(Some(cmd)) => cmd,
			Ok(None)      => continue,
			Err(msg)      => { warn(msg); continue; },
		};

		match cmd {
			ShellCommand::Connect => {
				println!("{}", rigol_collect::ConnectionState::Connecting);
				if let Err(e) = conn.connect() { warn(e); }
				println!("{}", conn.state());
			},
			ShellCommand::Disconnect => {
				conn.disconnect();
				println!("{}", conn.state());
			},
			ShellCommand::Status => {
				conn.probe();
				println!("{}", conn.state());
				if let Some(resource) = conn.resource() { println!("Resource: {}", resource); }
			},
			ShellCommand::Data{ dir, name } => {
				match save::save_data(conn, &dir, &name, WaveformMode::Raw, &mut Prompt) {
					Ok(outcome) => report(&outcome, &name),
					Err(e)      => warn(format!("Couldn't save data! {}", e)),
				}
			},
			ShellCommand::Shot{ dir, name } => {
				match save::save_screenshot(conn, &dir, &name, &mut Prompt) {
					Ok(outcome) => report(&outcome, &name),
					Err(e)      => warn(format!("Couldn't save screenshot! {}", e)),
				}
			},
			ShellCommand::Plot{ dir, name, channel } => {
				let path = PathBuf::from(save::add_extension_if_needed(&dir.join(&name).to_string_lossy(), save::DATA_EXTENSION));
				if let Err(e) = plot::preview(&path, channel, plot::DEFAULT_WIDTH, plot::DEFAULT_HEIGHT) { warn(e); }
			},
			ShellCommand::Help => println!("{}", HELP),
			ShellCommand::Quit => break,
		}
	}

	conn.disconnect();
	Ok(())
}

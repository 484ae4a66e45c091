use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;

use rigol_collect::save::{self, AlwaysOverwrite, ConfirmOverwrite, SaveOutcome};
use rigol_collect::visa::ResourceAddress;
use rigol_collect::{load_settings, plot, Backend, Connection, DeviceFinder, NetworkBackends, ResourceId, Settings, WaveformMode};

mod shell;

#[derive(Parser)]
#[command(name = "rigol-collect", version, about = "Save waveform data and screenshots from a Rigol DS1000Z oscilloscope")]
struct Cli {
	/// Settings file (default: rigol-collect.toml if present)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Instrument host to try in addition to discovery; may be repeated
	#[arg(long = "host", global = true)]
	hosts: Vec<String>,

	/// Don't broadcast for VXI-11 instruments
	#[arg(long, global = true)]
	no_broadcast: bool,

	/// Connect to this resource instead of searching, e.g. TCPIP0::192.168.1.40::inst0::INSTR
	#[arg(long, global = true)]
	resource: Option<String>,

	/// Backend for --resource (@vxi11 or @socket); inferred from the address when omitted
	#[arg(long, global = true)]
	backend: Option<String>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// List every DS1000Z that can be reached
	List {
		#[arg(long)]
		json: bool,
	},
	/// Connect, print the scope's identity and disconnect
	Connect,
	/// Stop acquisition and save the displayed channels as CSV
	SaveData {
		#[arg(long)]
		dir: Option<PathBuf>,
		#[arg(long)]
		name: String,
		#[arg(long, default_value = "raw")]
		mode: WaveformMode,
		/// Overwrite an existing file without asking
		#[arg(long)]
		yes: bool,
	},
	/// Stop acquisition and save the screen as PNG
	Screenshot {
		#[arg(long)]
		dir: Option<PathBuf>,
		#[arg(long)]
		name: String,
		#[arg(long)]
		yes: bool,
	},
	/// Preview one channel of a saved CSV in the terminal
	Plot {
		#[arg(long)]
		dir: Option<PathBuf>,
		#[arg(long)]
		name: String,
		#[arg(long, default_value_t = 1)]
		channel: u8,
	},
	/// Keep a connection open and take commands from stdin
	Shell,
}

/// Asks on the terminal before replacing a file.
pub struct Prompt;

impl ConfirmOverwrite for Prompt {
	fn confirm_overwrite(&mut self, path:&Path) -> bool {
		print!("A file already exists at {}. Overwrite it? [y/N] ", path.display());
		if io::stdout().flush().is_err() { return false; }

		let mut answer = String::new();
		match io::stdin().lock().read_line(&mut answer) {
			Ok(_)  => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
			Err(_) => false,
		}
	}
}

fn resolve_resource(address:&str, backend:Option<&str>) -> rigol_collect::Result<ResourceId> {
	let backend = match backend {
		Some(name) => name.parse::<Backend>()?,
		None       => address.parse::<ResourceAddress>()?.backend(),
	};
	Ok(ResourceId::new(address, backend))
}

fn connection(cli:&Cli, settings:&Settings) -> rigol_collect::Result<Connection<NetworkBackends>> {
	let conn = Connection::new(NetworkBackends::new(settings.clone()));
	match &cli.resource {
		Some(address) => Ok(conn.with_resource(resolve_resource(address, cli.backend.as_deref())?)),
		None          => Ok(conn),
	}
}

pub fn report(outcome:&SaveOutcome, name:&str) {
	if let Some(status) = outcome.status(name) {
		println!("{} ({})", status, outcome.path().display());
	}
}

fn run(cli:Cli) -> rigol_collect::Result<()> {
	let mut settings = load_settings(cli.config.as_deref())?;
	settings.hosts.extend(cli.hosts.iter().cloned());
	if cli.no_broadcast { settings.broadcast = false; }
	log::debug!("Settings: {:?}", settings);

	let data_dir = settings.data_dir.clone().unwrap_or_else(|| PathBuf::from("."));
	let screenshot_dir = settings.screenshot_dir.clone().unwrap_or_else(|| data_dir.clone());

	match &cli.command {
		Command::List{ json } => {
			let found = DeviceFinder::new(NetworkBackends::new(settings.clone())).find();
			if *json {
				println!("{}", serde_json::to_string_pretty(&found).map_err(io::Error::from)?);
			} else if found.is_empty() {
				println!("No DS1000Z found");
			} else {
				for resource in &found { println!("{}", resource); }
			}
		},
		Command::Connect => {
			let mut conn = connection(&cli, &settings)?;
			conn.connect()?;
			let idn = conn.with_scope(|scope| scope.identity())?;
			println!("{} {} (serial {}, firmware {})", idn.manufacturer, idn.model, idn.serial, idn.firmware);
			conn.disconnect();
		},
		Command::SaveData{ dir, name, mode, yes } => {
			let mut conn = connection(&cli, &settings)?;
			conn.connect()?;
			let dir = dir.clone().unwrap_or(data_dir);
			let outcome = if *yes {
				save::save_data(&mut conn, &dir, name, *mode, &mut AlwaysOverwrite)?
			} else {
				save::save_data(&mut conn, &dir, name, *mode, &mut Prompt)?
			};
			report(&outcome, name);
		},
		Command::Screenshot{ dir, name, yes } => {
			let mut conn = connection(&cli, &settings)?;
			conn.connect()?;
			let dir = dir.clone().unwrap_or(screenshot_dir);
			let outcome = if *yes {
				save::save_screenshot(&mut conn, &dir, name, &mut AlwaysOverwrite)?
			} else {
				save::save_screenshot(&mut conn, &dir, name, &mut Prompt)?
			};
			report(&outcome, name);
		},
		Command::Plot{ dir, name, channel } => {
			let dir = dir.clone().unwrap_or(data_dir);
			let path = PathBuf::from(save::add_extension_if_needed(&dir.join(name).to_string_lossy(), save::DATA_EXTENSION));
			plot::preview(&path, *channel, plot::DEFAULT_WIDTH, plot::DEFAULT_HEIGHT)?;
		},
		Command::Shell => {
			let mut conn = connection(&cli, &settings)?;
			shell::run(&mut conn, &data_dir, &screenshot_dir)?;
		},
	}

	Ok(())
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(Env::default().default_filter_or("rigol_collect=info")).init();

	match run(Cli::parse()) {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			eprintln!("warning: {}", e);
			ExitCode::FAILURE
		},
	}
}

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::rpc::port_mapping::PMAP_PORT;

pub const DEFAULT_CONFIG_FILE:&str = "rigol-collect.toml";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
	/// Hosts to try on every backend in addition to whatever discovery finds.
	pub hosts: Vec<String>,
	/// Whether the VXI-11 backend broadcasts a port mapper query to find instruments.
	pub broadcast: bool,
	pub broadcast_address: String,
	pub discovery_timeout_ms: u64,
	pub io_timeout_ms: u64,
	pub socket_port: u16,
	/// Port of the ONC-RPC port mapper that VXI-11 instruments register with.
	pub portmapper_port: u16,
	pub data_dir: Option<PathBuf>,
	pub screenshot_dir: Option<PathBuf>,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			hosts: vec![],
			broadcast: true,
			broadcast_address: "255.255.255.255".to_string(),
			discovery_timeout_ms: 1000,
			io_timeout_ms: 5000,
			socket_port: 5555,
			portmapper_port: PMAP_PORT,
			data_dir: None,
			screenshot_dir: None,
		}
	}
}

impl Settings {
	pub fn discovery_timeout(&self) -> Duration { Duration::from_millis(self.discovery_timeout_ms) }

	pub fn io_timeout(&self) -> Option<Duration> {
		match self.io_timeout_ms {
			0 => None,
			ms => Some(Duration::from_millis(ms)),
		}
	}
}

/// Layer defaults, the config file and `RIGOL_*` environment variables, in that order.
///
/// An explicit `config_path` must exist; otherwise `rigol-collect.toml` in the working directory is
/// used when present.
pub fn load_settings(config_path:Option<&Path>) -> Result<Settings, ConfigError> {
	let mut builder = Config::builder()
		.add_source(Config::try_from(&Settings::default())?);

	match config_path {
		Some(path) if path.exists() => builder = builder.add_source(File::from(path)),
		Some(path) => return Err(ConfigError::Message(format!("Config file not found: {}", path.display()))),
		None => {
			if Path::new(DEFAULT_CONFIG_FILE).exists() {
				builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
			}
		},
	}

	builder = builder.add_source(
		Environment::with_prefix("RIGOL")
			.prefix_separator("_")
			.separator("__")
			.list_separator(",")
			.with_list_parse_key("hosts")
			.try_parsing(true),
	);

	builder.build()?.try_deserialize::<Settings>()
}

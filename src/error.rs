use std::io;
use std::path::PathBuf;

/// Everything that can go wrong above the transport layers. The messages double as the warnings
/// shown to the operator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("IO error: {0}")]
	Io(#[from] io::Error),

	#[error("CSV error: {0}")]
	Csv(#[from] csv::Error),

	#[error("Configuration error: {0}")]
	Config(#[from] config::ConfigError),

	#[error("No Rigol DS1000Z found. Check the instrument connection.")]
	NoDeviceFound,

	#[error("Error connecting to scope at {address}: {source}")]
	Open { address: String, source: io::Error },

	#[error("Scope not connected!")]
	NotConnected,

	#[error("Unknown backend '{0}', expected @vxi11 or @socket")]
	UnknownBackend(String),

	#[error("Unrecognized resource address '{0}'")]
	BadAddress(String),

	#[error("Channel {0} does not exist, expected 1 to 4")]
	InvalidChannel(u8),

	#[error("No channels are displayed on the scope")]
	NoChannels,

	#[error("Unexpected response to {command}: {response:?}")]
	BadResponse { command: String, response: String },

	#[error("Chosen file path is invalid or inaccessible: {0}")]
	InvalidPath(PathBuf),

	#[error("The specified data file doesn't exist: {0}")]
	FileNotFound(PathBuf),

	#[error("Column {0} is missing from the data file")]
	MissingColumn(String),
}

pub type Result<T> = std::result::Result<T, Error>;

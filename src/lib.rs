//! Find a Rigol DS1000Z oscilloscope on the network, connect to it, and save its waveform data
//! and screen to disk.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use rigol_collect::{Connection, NetworkBackends, Settings, WaveformMode};
//! use rigol_collect::save::{save_data, AlwaysOverwrite};
//!
//! let mut conn = Connection::new(NetworkBackends::new(Settings::default()));
//! conn.connect()?;
//! let outcome = save_data(&mut conn, Path::new("captures"), "run1", WaveformMode::Raw, &mut AlwaysOverwrite)?;
//! println!("{}", outcome.path().display());
//! # Ok::<(), rigol_collect::Error>(())
//! ```

// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol built on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// Addressable instrument resources and the two backends that reach them
pub mod visa;

pub mod devices;

pub mod config;
pub mod connection;
pub mod error;
pub mod finder;
pub mod plot;
pub mod save;

pub use config::{load_settings, Settings};
pub use connection::{Connection, ConnectionState};
pub use devices::ds1000z::{Capture, Ds1000z, Identity, WaveformMode};
pub use error::{Error, Result};
pub use finder::{is_ds1000z, BackendLoader, DeviceFinder, NetworkBackends, IDN_PATTERN};
pub use visa::{Backend, ResourceId};

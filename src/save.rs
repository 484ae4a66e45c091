//! Writing scope data and screenshots to disk.
//!
//! A save goes through the same checks in the same order every time: the scope must be connected,
//! acquisition is stopped so the data holds still, an existing file is only replaced if the
//! operator agrees, and the destination must be a usable path.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};

use crate::connection::Connection;
use crate::devices::ds1000z::{Ds1000z, WaveformMode};
use crate::error::{Error, Result};
use crate::finder::BackendLoader;

pub const DATA_EXTENSION:&str = ".csv";
pub const SCREENSHOT_EXTENSION:&str = ".png";

pub const ILLEGAL_CHARS:&[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub const RESERVED_NAMES:&[&str] = &[
	"CON", "PRN", "AUX", "NUL",
	"COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
	"LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// `path` with `extension` (which includes the leading dot) appended unless it already ends with it.
pub fn add_extension_if_needed(path:&str, extension:&str) -> String {
	if path.ends_with(extension) {
		path.to_owned()
	} else {
		format!("{}{}", path, extension)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
	Windows,
	Unix,
}

impl Platform {
	pub fn current() -> Self {
		if cfg!(windows) { Platform::Windows } else { Platform::Unix }
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameProblem {
	#[error("file name is empty")]
	Empty,
	#[error("file name contains the illegal character {0:?}")]
	IllegalChar(char),
	#[error("file name starts or ends with a dot or a space")]
	BadEdge,
	#[error("{0} is a reserved device name")]
	Reserved(String),
}

/// Check one file name (not a path) against the rules for `platform`. Illegal characters and
/// leading or trailing dots and spaces are rejected everywhere; reserved device names only on
/// Windows.
pub fn validate_filename(name:&str, platform:Platform) -> std::result::Result<(), NameProblem> {
	if name.is_empty() {
		return Err(NameProblem::Empty);
	}
	if let Some(c) = name.chars().find(|c| ILLEGAL_CHARS.contains(c) || c.is_control()) {
		return Err(NameProblem::IllegalChar(c));
	}
	let edge = |c:char| c == '.' || c == ' ';
	if name.starts_with(edge) || name.ends_with(edge) {
		return Err(NameProblem::BadEdge);
	}

	if platform == Platform::Windows {
		let stem = name.split('.').next().unwrap_or(name).trim_end().to_ascii_uppercase();
		if RESERVED_NAMES.contains(&stem.as_str()) {
			return Err(NameProblem::Reserved(stem));
		}
	}

	Ok(())
}

pub fn is_valid_filename(name:&str) -> bool {
	validate_filename(name, Platform::current()).is_ok()
}

// `name` may name a subdirectory too, as in `sub/run1`; every part of it must be a valid file name
fn is_valid_name(name:&str) -> bool {
	let mut parts = Path::new(name).components().filter_map(|c| match c {
		Component::Normal(part) => Some(part),
		_ => None,
	}).peekable();

	parts.peek().is_some() && parts.all(|part| part.to_str().map(is_valid_filename).unwrap_or(false))
}

/// Whether every component of `path` is a valid name and the path either exists or could be
/// created under its nearest existing ancestor, which must be a writable directory.
pub fn is_path_exists_or_creatable(path:&Path) -> bool {
	let platform = Platform::current();
	let names_ok = path.components().all(|c| match c {
		Component::Normal(name) => name.to_str().map(|n| validate_filename(n, platform).is_ok()).unwrap_or(false),
		_ => true,
	});
	if !names_ok {
		return false;
	}
	if path.exists() {
		return true;
	}

	match path.ancestors().skip(1).find(|a| a.as_os_str().is_empty() || a.exists()) {
		Some(a) if a.as_os_str().is_empty() => is_writable_dir(Path::new(".")),
		Some(a) => is_writable_dir(a),
		None => false,
	}
}

fn is_writable_dir(dir:&Path) -> bool {
	fs::metadata(dir).map(|m| m.is_dir() && !m.permissions().readonly()).unwrap_or(false)
}

/// Asked before an existing file is replaced.
pub trait ConfirmOverwrite {
	fn confirm_overwrite(&mut self, path:&Path) -> bool;
}

impl<F: FnMut(&Path) -> bool> ConfirmOverwrite for F {
	fn confirm_overwrite(&mut self, path:&Path) -> bool { self(path) }
}

/// Replaces existing files without asking.
pub struct AlwaysOverwrite;

impl ConfirmOverwrite for AlwaysOverwrite {
	fn confirm_overwrite(&mut self, _path:&Path) -> bool { true }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
	Saved { path: PathBuf, at: DateTime<Local> },
	/// The file existed and the operator chose to keep it.
	Declined { path: PathBuf },
}

impl SaveOutcome {
	pub fn path(&self) -> &Path {
		match self {
			SaveOutcome::Saved{ path, .. } | SaveOutcome::Declined{ path } => path,
		}
	}

	/// Status line in the form "<name> saved at HH:MM:SS".
	pub fn status(&self, name:&str) -> Option<String> {
		match self {
			SaveOutcome::Saved{ at, .. } => Some(format!("{} saved at {}", name, at.format("%H:%M:%S"))),
			SaveOutcome::Declined{ .. }  => None,
		}
	}
}

/// Save every displayed channel as CSV to `<dir>/<name>.csv`.
pub fn save_data<L, C>(conn:&mut Connection<L>, dir:&Path, name:&str, mode:WaveformMode, confirm:&mut C) -> Result<SaveOutcome>
	where L: BackendLoader, C: ConfirmOverwrite + ?Sized
{
	save_file(conn, dir, name, DATA_EXTENSION, confirm, |scope| {
		let capture = scope.capture(mode)?;
		let mut out:Vec<u8> = vec![];
		capture.write_csv(&mut out)?;
		log::debug!("Captured {} samples from {} channel(s)", capture.time.len(), capture.channels.len());
		Ok(out)
	})
}

/// Save the scope screen to `<dir>/<name>.png`.
pub fn save_screenshot<L, C>(conn:&mut Connection<L>, dir:&Path, name:&str, confirm:&mut C) -> Result<SaveOutcome>
	where L: BackendLoader, C: ConfirmOverwrite + ?Sized
{
	save_file(conn, dir, name, SCREENSHOT_EXTENSION, confirm, |scope| scope.screenshot())
}

fn save_file<L, C, F>(conn:&mut Connection<L>, dir:&Path, name:&str, extension:&str, confirm:&mut C, fetch:F) -> Result<SaveOutcome>
	where L: BackendLoader, C: ConfirmOverwrite + ?Sized, F: FnOnce(&mut Ds1000z) -> Result<Vec<u8>>
{
	if !conn.is_connected() {
		return Err(Error::NotConnected);
	}
	conn.with_scope(|scope| scope.stop())?;

	let joined = dir.join(name);
	let full_path = PathBuf::from(add_extension_if_needed(&joined.to_string_lossy(), extension));

	if full_path.is_file() && !confirm.confirm_overwrite(&full_path) {
		log::info!("Keeping existing {}", full_path.display());
		return Ok(SaveOutcome::Declined{ path: full_path });
	}
	if !is_valid_name(name) || !is_path_exists_or_creatable(&full_path) {
		return Err(Error::InvalidPath(full_path));
	}

	let bytes = conn.with_scope(fetch)?;

	if let Some(parent) = full_path.parent() {
		if !parent.as_os_str().is_empty() { fs::create_dir_all(parent)?; }
	}
	fs::write(&full_path, &bytes)?;
	log::info!("Wrote {} bytes to {}", bytes.len(), full_path.display());

	Ok(SaveOutcome::Saved{ path: full_path, at: Local::now() })
}

//! Instrument resources in the style of VISA: an address string, the backend that reaches it, and
//! a message-based session for talking SCPI to it.
//!
//! Two backends are provided:
//!
//! - `@vxi11`: the VXI-11 core channel over ONC-RPC, addresses like `TCPIP0::192.168.1.40::inst0::INSTR`.
//!   Instruments are found by broadcasting a port mapper query and from the configured host list.
//! - `@socket`: raw SCPI over TCP, addresses like `TCPIP0::192.168.1.40::5555::SOCKET`. Only the
//!   configured hosts are listed.

use std::fmt;
use std::io::{self, Error, ErrorKind};
use std::str::{self, FromStr};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::Settings;

pub mod socket_backend;
pub mod vxi11_backend;

pub use socket_backend::{SocketManager, SocketSession};
pub use vxi11_backend::{Vxi11Manager, Vxi11Session};

lazy_static! {
	static ref INSTR_RE: Regex  = Regex::new(r"(?i)^TCPIP\d*::([^:\s]+)(?:::([a-z]+\d*))?::INSTR$").unwrap();
	static ref SOCKET_RE: Regex = Regex::new(r"(?i)^TCPIP\d*::([^:\s]+)::(\d+)::SOCKET$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Backend {
	#[serde(rename = "@vxi11")]
	Vxi11,
	#[serde(rename = "@socket")]
	Socket,
}

impl Backend {
	/// Backends in the order the device finder scans them.
	pub const ALL:[Backend; 2] = [Backend::Vxi11, Backend::Socket];

	pub fn name(self) -> &'static str {
		match self {
			Backend::Vxi11  => "@vxi11",
			Backend::Socket => "@socket",
		}
	}
}

impl fmt::Display for Backend {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Backend {
	type Err = crate::Error;

	fn from_str(s:&str) -> Result<Self, Self::Err> {
		match s.trim_start_matches('@').to_ascii_lowercase().as_str() {
			"vxi11"  => Ok(Backend::Vxi11),
			"socket" => Ok(Backend::Socket),
			_        => Err(crate::Error::UnknownBackend(s.to_owned())),
		}
	}
}

/// A resource found by enumeration: where it is and which backend reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceId {
	pub address: String,
	pub backend: Backend,
}

impl ResourceId {
	pub fn new(address:&str, backend:Backend) -> Self {
		Self{ address: address.to_owned(), backend }
	}
}

impl fmt::Display for ResourceId {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result { write!(f, "{} ({})", self.address, self.backend) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceAddress {
	Instr { host: String, device: String },
	Socket { host: String, port: u16 },
}

impl ResourceAddress {
	pub fn instr(host:&str) -> Self {
		ResourceAddress::Instr{ host: host.to_owned(), device: crate::vxi11::DEFAULT_DEVICE.to_owned() }
	}

	pub fn socket(host:&str, port:u16) -> Self {
		ResourceAddress::Socket{ host: host.to_owned(), port }
	}

	/// The backend that speaks this kind of address.
	pub fn backend(&self) -> Backend {
		match self {
			ResourceAddress::Instr{ .. }  => Backend::Vxi11,
			ResourceAddress::Socket{ .. } => Backend::Socket,
		}
	}

	pub fn host(&self) -> &str {
		match self {
			ResourceAddress::Instr{ host, .. } | ResourceAddress::Socket{ host, .. } => host,
		}
	}
}

impl fmt::Display for ResourceAddress {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		match self {
			ResourceAddress::Instr{ host, device } => write!(f, "TCPIP0::{}::{}::INSTR", host, device),
			ResourceAddress::Socket{ host, port }  => write!(f, "TCPIP0::{}::{}::SOCKET", host, port),
		}
	}
}

impl FromStr for ResourceAddress {
	type Err = crate::Error;

	fn from_str(s:&str) -> Result<Self, Self::Err> {
		let bad = || crate::Error::BadAddress(s.to_owned());

		if let Some(caps) = INSTR_RE.captures(s) {
			let device = caps.get(2).map(|m| m.as_str()).unwrap_or(crate::vxi11::DEFAULT_DEVICE);
			Ok(ResourceAddress::Instr{ host: caps[1].to_owned(), device: device.to_owned() })
		} else if let Some(caps) = SOCKET_RE.captures(s) {
			let port = caps[2].parse::<u16>().map_err(|_| bad())?;
			Ok(ResourceAddress::Socket{ host: caps[1].to_owned(), port })
		} else {
			Err(bad())
		}
	}
}

pub(crate) fn parse_address(address:&str) -> io::Result<ResourceAddress> {
	address.parse::<ResourceAddress>().map_err(|e| Error::new(ErrorKind::InvalidInput, e.to_string()))
}

/// A message-based session to one opened resource.
pub trait Session {
	fn address(&self) -> &str;

	/// Send one command. A terminating newline is added if missing.
	fn write(&mut self, data:&[u8]) -> io::Result<()>;

	/// Read one complete response message, terminator included.
	fn read(&mut self) -> io::Result<Vec<u8>>;

	fn close(&mut self) -> io::Result<()>;

	/// Whether the session still holds a live link to the instrument.
	fn is_open(&self) -> bool;

	fn query(&mut self, cmd:&str) -> io::Result<String> {
		self.write(cmd.as_bytes())?;
		let resp = self.read()?;
		str::from_utf8(&resp)
			.map(|s| s.trim_end_matches(|c| c == '\n' || c == '\r').to_owned())
			.map_err(|_| Error::new(ErrorKind::InvalidData, "Unable to parse response as UTF-8"))
	}

	fn query_block(&mut self, cmd:&str) -> io::Result<Vec<u8>> {
		self.write(cmd.as_bytes())?;
		let resp = self.read()?;
		parse_block(&resp).map(|payload| payload.to_vec())
	}
}

/// Enumerates and opens the resources one backend can reach.
pub trait ResourceManager {
	fn backend(&self) -> Backend;

	fn list_resources(&mut self) -> io::Result<Vec<String>>;

	fn open_resource(&mut self, address:&str) -> io::Result<Box<dyn Session>>;
}

/// Load the resource manager for `backend`.
pub fn open_resource_manager(backend:Backend, settings:&Settings) -> io::Result<Box<dyn ResourceManager>> {
	match backend {
		Backend::Vxi11  => Ok(Box::new(Vxi11Manager::new(settings)?)),
		Backend::Socket => Ok(Box::new(SocketManager::new(settings))),
	}
}

pub(crate) fn with_terminator(data:&[u8]) -> Vec<u8> {
	let mut ans = data.to_vec();
	if ans.last() != Some(&b'\n') { ans.push(b'\n'); }
	ans
}

/// Split the `#<n><length>` header of an IEEE 488.2 definite length block off `data` and return the
/// payload. Anything after the payload (normally a newline) is ignored.
pub fn parse_block(data:&[u8]) -> io::Result<&[u8]> {
	let bad = |msg:&str| Error::new(ErrorKind::InvalidData, msg.to_owned());

	if data.first() != Some(&b'#') {
		return Err(bad("Block data does not start with '#'"));
	}
	let n_digits = match data.get(1) {
		Some(d @ b'1'..=b'9') => (d - b'0') as usize,
		_ => return Err(bad("Block header has no length digit count")),
	};
	let len_field = data.get(2..(2 + n_digits)).ok_or_else(|| bad("Block header is truncated"))?;
	let len:usize = str::from_utf8(len_field).ok()
		.and_then(|s| s.parse::<usize>().ok())
		.ok_or_else(|| bad("Block length is not a number"))?;

	let start = 2 + n_digits;
	data.get(start..(start + len)).ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "Block is shorter than its header says"))
}


#[cfg(test)]
pub(crate) mod mock;

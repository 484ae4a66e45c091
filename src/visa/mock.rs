//! In-memory instruments for unit tests.

use std::cell::{Cell, RefCell};
use std::io::{self, Error, ErrorKind};
use std::rc::Rc;

use crate::finder::BackendLoader;
use super::{Backend, ResourceManager, Session};

/// Answers one command; `None` means the command produces no response.
pub type Script = Rc<dyn Fn(&str) -> Option<io::Result<Vec<u8>>>>;

struct MockResource {
	backend: Backend,
	address: String,
	fail_open: bool,
	script: Script,
}

#[derive(Default)]
struct BenchState {
	resources: Vec<MockResource>,
	unavailable: Vec<Backend>,
	unlistable: Vec<Backend>,
	events: Vec<String>,
}

/// A set of fake instruments shared by the loaders, managers and sessions built from it.
#[derive(Clone, Default)]
pub struct Bench {
	inner: Rc<RefCell<BenchState>>,
}

impl Bench {
	pub fn new() -> Self { Self::default() }

	pub fn add(&self, backend:Backend, address:&str, script:Script) {
		self.inner.borrow_mut().resources.push(MockResource{ backend, address: address.to_owned(), fail_open: false, script });
	}

	/// An instrument that only answers `*IDN?`.
	pub fn identified(&self, backend:Backend, address:&str, idn:&str) {
		let idn = format!("{}\n", idn);
		self.add(backend, address, Rc::new(move |cmd:&str| {
			if cmd == "*IDN?" { Some(Ok(idn.clone().into_bytes())) } else { None }
		}));
	}

	pub fn unreachable(&self, backend:Backend, address:&str) {
		self.inner.borrow_mut().resources.push(MockResource{ backend, address: address.to_owned(), fail_open: true, script: Rc::new(|_:&str| None) });
	}

	pub fn make_unavailable(&self, backend:Backend) { self.inner.borrow_mut().unavailable.push(backend); }

	pub fn make_unlistable(&self, backend:Backend) { self.inner.borrow_mut().unlistable.push(backend); }

	pub fn events(&self) -> Vec<String> { self.inner.borrow().events.clone() }

	pub fn count(&self, prefix:&str) -> usize {
		self.inner.borrow().events.iter().filter(|e| e.starts_with(prefix)).count()
	}

	fn log(&self, event:String) { self.inner.borrow_mut().events.push(event); }
}

impl BackendLoader for Bench {
	fn load(&self, backend:Backend) -> io::Result<Box<dyn ResourceManager>> {
		if self.inner.borrow().unavailable.contains(&backend) {
			return Err(Error::new(ErrorKind::Other, "backend library not found"));
		}
		Ok(Box::new(MockManager{ bench: self.clone(), backend }))
	}
}

struct MockManager {
	bench: Bench,
	backend: Backend,
}

impl ResourceManager for MockManager {
	fn backend(&self) -> Backend { self.backend }

	fn list_resources(&mut self) -> io::Result<Vec<String>> {
		let state = self.bench.inner.borrow();
		if state.unlistable.contains(&self.backend) {
			return Err(Error::new(ErrorKind::Other, "listing failed"));
		}
		Ok(state.resources.iter().filter(|r| r.backend == self.backend).map(|r| r.address.clone()).collect())
	}

	fn open_resource(&mut self, address:&str) -> io::Result<Box<dyn Session>> {
		let (fail_open, script) = {
			let state = self.bench.inner.borrow();
			let r = state.resources.iter()
				.find(|r| r.backend == self.backend && r.address == address)
				.ok_or_else(|| Error::new(ErrorKind::NotFound, "no such resource"))?;
			(r.fail_open, r.script.clone())
		};
		if fail_open {
			return Err(Error::new(ErrorKind::ConnectionRefused, "connection refused"));
		}

		self.bench.log(format!("open {}", address));
		Ok(Box::new(MockSession{ bench: self.bench.clone(), address: address.to_owned(), script, pending: None, open: Rc::new(Cell::new(true)) }))
	}
}

pub struct MockSession {
	bench: Bench,
	address: String,
	script: Script,
	pending: Option<io::Result<Vec<u8>>>,
	open: Rc<Cell<bool>>,
}

impl Session for MockSession {
	fn address(&self) -> &str { &self.address }

	fn write(&mut self, data:&[u8]) -> io::Result<()> {
		if !self.open.get() { return Err(Error::new(ErrorKind::NotConnected, "Session is closed")); }
		let cmd = String::from_utf8_lossy(data).trim_end().to_owned();
		self.bench.log(format!("write {}", cmd));
		self.pending = (self.script)(&cmd);
		Ok(())
	}

	fn read(&mut self) -> io::Result<Vec<u8>> {
		self.pending.take().unwrap_or_else(|| Err(Error::new(ErrorKind::TimedOut, "I/O timeout")))
	}

	fn close(&mut self) -> io::Result<()> {
		self.open.set(false);
		self.bench.log(format!("close {}", self.address));
		Ok(())
	}

	fn is_open(&self) -> bool { self.open.get() }
}

/// A DS1104Z with channels 1 and 2 displayed, ten samples per channel and a tiny PNG screen.
pub fn scope_script(idn:&str) -> Script {
	let idn = format!("{}\n", idn);
	let source = Rc::new(Cell::new(1u8));

	Rc::new(move |cmd:&str| {
		let reply = |s:&str| Some(Ok(s.as_bytes().to_vec()));
		let upper = cmd.to_ascii_uppercase();

		if upper == "*IDN?" {
			reply(&idn)
		} else if let Some(n) = upper.strip_prefix(":WAV:SOUR CHAN") {
			source.set(n.parse().unwrap_or(0));
			None
		} else if upper.starts_with(":CHAN") && upper.ends_with(":DISP?") {
			if upper.starts_with(":CHAN1") || upper.starts_with(":CHAN2") { reply("1\n") } else { reply("0\n") }
		} else if upper == ":WAV:PRE?" {
			reply("0,0,10,1,1.000000e-03,-5.000000e-03,0,4.000000e-02,0,128\n")
		} else if upper == ":WAV:DATA?" {
			// Channel n ramps from 128 + n
			let mut block = b"#9000000010".to_vec();
			block.extend((0..10u8).map(|i| 128 + source.get() + i));
			block.push(b'\n');
			Some(Ok(block))
		} else if upper == ":DISP:DATA? ON,OFF,PNG" {
			let mut block = b"#212".to_vec();
			block.extend_from_slice(b"\x89PNG\r\n\x1a\n1234");
			block.push(b'\n');
			Some(Ok(block))
		} else {
			None
		}
	})
}

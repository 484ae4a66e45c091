use std::fmt;

use crate::devices::ds1000z::Ds1000z;
use crate::error::{Error, Result};
use crate::finder::{BackendLoader, DeviceFinder};
use crate::visa::{ResourceId, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
	Disconnected,
	Connecting,
	Connected,
}

impl fmt::Display for ConnectionState {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			ConnectionState::Disconnected => "Scope disconnected.",
			ConnectionState::Connecting   => "Connecting to scope...",
			ConnectionState::Connected    => "Scope connected.",
		})
	}
}

/// The application's one session to a scope.
///
/// The state is tracked explicitly: it changes on connect, on disconnect, and when an I/O error
/// shows the link is gone.
pub struct Connection<L: BackendLoader> {
	finder: DeviceFinder<L>,
	resource: Option<ResourceId>,
	pinned: bool,
	session: Option<Box<dyn Session>>,
	state: ConnectionState,
}

impl<L: BackendLoader> Connection<L> {

	pub fn new(loader:L) -> Self {
		Self{ finder: DeviceFinder::new(loader), resource: None, pinned: false, session: None, state: ConnectionState::Disconnected }
	}

	/// Connect to `resource` instead of searching for a scope. It is kept across disconnects.
	pub fn with_resource(mut self, resource:ResourceId) -> Self {
		self.resource = Some(resource);
		self.pinned = true;
		self
	}

	pub fn finder(&self) -> &DeviceFinder<L> { &self.finder }

	pub fn state(&self) -> ConnectionState { self.state }

	pub fn resource(&self) -> Option<&ResourceId> { self.resource.as_ref() }

	/// Drop the cached resource so the next connect searches again.
	pub fn forget_resource(&mut self) {
		self.resource = None;
		self.pinned = false;
	}

	pub fn is_connected(&self) -> bool { self.state == ConnectionState::Connected }

	/// Check the session itself and downgrade the state if its link is gone.
	pub fn probe(&mut self) -> bool {
		let alive = self.session.as_ref().map(|s| s.is_open()).unwrap_or(false);
		if self.is_connected() && !alive {
			log::warn!("Lost the link to the scope");
			self.drop_session();
		}
		self.is_connected()
	}

	pub fn connect(&mut self) -> Result<()> {
		if self.probe() {
			return Ok(());
		}
		self.state = ConnectionState::Connecting;

		let result = self.open();
		self.state = if result.is_ok() { ConnectionState::Connected } else { ConnectionState::Disconnected };
		result
	}

	fn open(&mut self) -> Result<()> {
		let resource = match self.resource.clone() {
			Some(resource) => resource,
			None => {
				let found = self.finder.find_first().ok_or(Error::NoDeviceFound)?;
				self.resource = Some(found.clone());
				found
			},
		};

		let open_err = |source| Error::Open{ address: resource.address.clone(), source };
		let mut manager = self.finder.loader().load(resource.backend).map_err(open_err)?;
		let session = manager.open_resource(&resource.address).map_err(open_err)?;

		log::info!("Connected to {}", resource);
		self.session = Some(session);
		Ok(())
	}

	/// Close the session if there is one. Safe to call at any time. A discovered resource is
	/// forgotten, so the next connect searches again.
	pub fn disconnect(&mut self) {
		if let Some(mut session) = self.session.take() {
			match session.close() {
				Ok(())  => log::info!("Disconnected from {}", session.address()),
				Err(e)  => log::warn!("Error closing {}: {}", session.address(), e),
			}
		}
		if !self.pinned { self.resource = None; }
		self.state = ConnectionState::Disconnected;
	}

	fn drop_session(&mut self) {
		if let Some(mut session) = self.session.take() {
			let _ = session.close();
		}
		self.state = ConnectionState::Disconnected;
	}

	/// Run `f` against the connected scope. An I/O error inside `f` means the link is unusable and
	/// leaves the connection disconnected.
	pub fn with_scope<T, F>(&mut self, f:F) -> Result<T>
		where F: FnOnce(&mut Ds1000z) -> Result<T>
	{
		let session = match (self.state, self.session.as_deref_mut()) {
			(ConnectionState::Connected, Some(session)) => session,
			_ => return Err(Error::NotConnected),
		};

		let result = f(&mut Ds1000z::new(session));
		if let Err(Error::Io(e)) = &result {
			log::warn!("I/O error talking to the scope, disconnecting: {}", e);
			self.drop_session();
		}
		result
	}

}

impl<L: BackendLoader> Drop for Connection<L> {
	fn drop(&mut self) { self.disconnect(); }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::visa::Backend;
	use crate::visa::mock::{scope_script, Bench};
	use std::io::{self, ErrorKind};
	use std::rc::Rc;

	const IDN:&str = "RIGOL TECHNOLOGIES,DS1054Z,DS1ZA000000009,00.04.04";

	fn bench_with_scope() -> Bench {
		let bench = Bench::new();
		bench.add(Backend::Vxi11, "TCPIP0::10.0.0.9::inst0::INSTR", scope_script(IDN));
		bench
	}

	#[test]
	fn connect_after_a_match_is_connected() {
		let bench = bench_with_scope();
		let mut conn = Connection::new(bench.clone());
		conn.connect().unwrap();

		assert!(conn.is_connected());
		assert_eq!(conn.state(), ConnectionState::Connected);
		assert_eq!(conn.resource(), Some(&ResourceId::new("TCPIP0::10.0.0.9::inst0::INSTR", Backend::Vxi11)));
		assert_eq!(conn.with_scope(|s| s.identity()).unwrap().model, "DS1054Z");
	}

	#[test]
	fn connect_without_a_match_stays_disconnected() {
		let bench = Bench::new();
		bench.identified(Backend::Vxi11, "x", "Siglent Technologies,SDS1202X-E,x,y");
		let mut conn = Connection::new(bench);

		assert!(matches!(conn.connect(), Err(Error::NoDeviceFound)));
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert!(conn.resource().is_none());
	}

	#[test]
	fn open_failure_stays_disconnected_and_keeps_resource() {
		let bench = Bench::new();
		bench.unreachable(Backend::Socket, "TCPIP0::10.0.0.8::5555::SOCKET");
		let resource = ResourceId::new("TCPIP0::10.0.0.8::5555::SOCKET", Backend::Socket);
		let mut conn = Connection::new(bench).with_resource(resource.clone());

		assert!(matches!(conn.connect(), Err(Error::Open{ .. })));
		assert!(!conn.is_connected());
		assert_eq!(conn.resource(), Some(&resource));
	}

	#[test]
	fn disconnect_forgets_discovered_resource() {
		let bench = bench_with_scope();
		let mut conn = Connection::new(bench.clone());
		conn.connect().unwrap();
		conn.disconnect();
		assert!(conn.resource().is_none());
		conn.connect().unwrap();

		// Discovery runs before each of the two sessions
		assert_eq!(bench.count("write *IDN?"), 2);
		assert_eq!(bench.count("open "), 4);
	}

	#[test]
	fn chosen_resource_survives_disconnect() {
		let bench = bench_with_scope();
		let resource = ResourceId::new("TCPIP0::10.0.0.9::inst0::INSTR", Backend::Vxi11);
		let mut conn = Connection::new(bench.clone()).with_resource(resource.clone());
		conn.connect().unwrap();
		conn.disconnect();
		assert_eq!(conn.resource(), Some(&resource));
		conn.connect().unwrap();

		assert_eq!(bench.count("write *IDN?"), 0);
		assert_eq!(bench.count("open "), 2);
	}

	#[test]
	fn connect_twice_keeps_one_session() {
		let bench = bench_with_scope();
		let mut conn = Connection::new(bench.clone());
		conn.connect().unwrap();
		conn.connect().unwrap();
		assert_eq!(bench.count("open "), 2);
	}

	#[test]
	fn disconnect_is_idempotent() {
		let bench = bench_with_scope();
		let mut conn = Connection::new(bench.clone());
		conn.connect().unwrap();

		conn.disconnect();
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		conn.disconnect();
		assert_eq!(conn.state(), ConnectionState::Disconnected);
		assert_eq!(bench.count("close "), 2);

		let mut never = Connection::new(Bench::new());
		never.disconnect();
		assert!(!never.is_connected());
	}

	#[test]
	fn scope_access_requires_connection() {
		let mut conn = Connection::new(bench_with_scope());
		assert!(matches!(conn.with_scope(|s| s.stop()), Err(Error::NotConnected)));
	}

	#[test]
	fn io_errors_disconnect() {
		let bench = Bench::new();
		bench.add(Backend::Socket, "flaky", Rc::new(|cmd:&str| {
			if cmd == "*IDN?" { Some(Err(io::Error::new(ErrorKind::ConnectionReset, "reset"))) } else { None }
		}));
		let mut conn = Connection::new(bench).with_resource(ResourceId::new("flaky", Backend::Socket));
		conn.connect().unwrap();

		assert!(matches!(conn.with_scope(|s| s.identity()), Err(Error::Io(_))));
		assert_eq!(conn.state(), ConnectionState::Disconnected);
	}

	#[test]
	fn protocol_errors_keep_connection() {
		let mut conn = Connection::new(bench_with_scope());
		conn.connect().unwrap();
		assert!(matches!(conn.with_scope(|s| s.channel_displayed(9)), Err(Error::InvalidChannel(9))));
		assert!(conn.is_connected());
	}

	#[test]
	fn drop_disconnects() {
		let bench = bench_with_scope();
		{
			let mut conn = Connection::new(bench.clone());
			conn.connect().unwrap();
		}
		assert_eq!(bench.count("close "), 2);
	}
}

use std::io::{self, BufRead, BufReader, Error, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::config::Settings;
use crate::rpc::connect_stream;
use super::{parse_address, with_terminator, Backend, ResourceAddress, ResourceManager, Session};

/// Raw SCPI over a TCP socket. Needs nothing beyond the standard library, so loading never fails.
pub struct SocketManager {
	hosts: Vec<String>,
	port: u16,
	io_timeout: Option<Duration>,
}

impl SocketManager {
	pub fn new(settings:&Settings) -> Self {
		Self{ hosts: settings.hosts.clone(), port: settings.socket_port, io_timeout: settings.io_timeout() }
	}
}

impl ResourceManager for SocketManager {
	fn backend(&self) -> Backend { Backend::Socket }

	fn list_resources(&mut self) -> io::Result<Vec<String>> {
		Ok(self.hosts.iter().map(|host| ResourceAddress::socket(host, self.port).to_string()).collect())
	}

	fn open_resource(&mut self, address:&str) -> io::Result<Box<dyn Session>> {
		match parse_address(address)? {
			ResourceAddress::Socket{ host, port } => {
				let stream = connect_stream((host.as_str(), port), self.io_timeout)?;
				log::debug!("Opened socket session to {}", address);
				Ok(Box::new(SocketSession::new(address, stream)))
			},
			other => Err(Error::new(ErrorKind::InvalidInput, format!("{} is not a socket resource", other))),
		}
	}
}

pub struct SocketSession {
	address: String,
	stream: Option<BufReader<TcpStream>>,
}

impl SocketSession {
	pub fn new(address:&str, stream:TcpStream) -> Self {
		Self{ address: address.to_owned(), stream: Some(BufReader::new(stream)) }
	}

	fn stream(&mut self) -> io::Result<&mut BufReader<TcpStream>> {
		self.stream.as_mut().ok_or_else(|| Error::new(ErrorKind::NotConnected, "Session is closed"))
	}
}

impl Session for SocketSession {
	fn address(&self) -> &str { &self.address }

	fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let stream = self.stream()?.get_mut();
		stream.write_all(&with_terminator(data))?;
		stream.flush()
	}

	// A response is either a definite length block or a line of text
	fn read(&mut self) -> io::Result<Vec<u8>> {
		let reader = self.stream()?;

		let mut first = [0u8; 1];
		reader.read_exact(&mut first)?;
		let mut ans = vec![first[0]];

		if first[0] != b'#' {
			reader.read_until(b'\n', &mut ans)?;
			if ans.last() != Some(&b'\n') {
				return Err(Error::new(ErrorKind::UnexpectedEof, "Connection closed in the middle of a response"));
			}
			return Ok(ans);
		}

		let mut n_digits = [0u8; 1];
		reader.read_exact(&mut n_digits)?;
		ans.push(n_digits[0]);
		let n = match n_digits[0] {
			d @ b'1'..=b'9' => (d - b'0') as usize,
			_ => return Err(Error::new(ErrorKind::InvalidData, "Block header has no length digit count")),
		};

		let mut len_field = vec![0u8; n];
		reader.read_exact(&mut len_field)?;
		ans.extend_from_slice(&len_field);
		let len = std::str::from_utf8(&len_field).ok()
			.and_then(|s| s.parse::<usize>().ok())
			.ok_or_else(|| Error::new(ErrorKind::InvalidData, "Block length is not a number"))?;

		let start = ans.len();
		ans.resize(start + len, 0);
		reader.read_exact(&mut ans[start..])?;

		// Swallow the newline that follows the block so the next read starts clean
		if reader.fill_buf().map(|buf| buf.first() == Some(&b'\n')).unwrap_or(false) {
			reader.consume(1);
		}

		Ok(ans)
	}

	fn close(&mut self) -> io::Result<()> {
		match self.stream.take() {
			Some(reader) => reader.get_ref().shutdown(Shutdown::Both).or_else(|e| {
				// The peer may have gone already, which is fine for a close
				if e.kind() == ErrorKind::NotConnected { Ok(()) } else { Err(e) }
			}),
			None => Ok(()),
		}
	}

	// A peer that has closed reads as end of stream; an idle live peer would block
	fn is_open(&self) -> bool {
		let stream = match self.stream.as_ref() {
			Some(reader) => reader.get_ref(),
			None => return false,
		};
		if stream.set_nonblocking(true).is_err() {
			return false;
		}

		let mut buf = [0u8; 1];
		let alive = match stream.peek(&mut buf) {
			Ok(0)  => false,
			Ok(_)  => true,
			Err(e) => e.kind() == ErrorKind::WouldBlock,
		};

		stream.set_nonblocking(false).is_ok() && alive
	}
}

impl Drop for SocketSession {
	fn drop(&mut self) { let _ = self.close(); }
}

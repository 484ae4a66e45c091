use std::io::{self, Error, ErrorKind};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub const RPCVERSION:u32 = 2;

pub const CALL:i32  = 0;
pub const REPLY:i32 = 1;

pub const MSG_ACCEPTED:i32 = 0;
pub const MSG_DENIED:i32 = 1;

pub const RPC_MISMATCH:i32 = 0;
pub const AUTH_ERROR:i32 = 1;

pub const SUCCESS:i32 = 0;            // RPC executed successfully
pub const PROG_UNAVAIL:i32  = 1;      // remote hasn't exported program
pub const PROG_MISMATCH:i32 = 2;      // remote can't support version #
pub const PROC_UNAVAIL:i32  = 3;      // program can't support procedure
pub const GARBAGE_ARGS:i32  = 4;      // procedure can't decode params

pub const IPPROTO_TCP:u32 = 6;

pub mod xdr_unpack;
pub mod xdr_pack;

pub mod port_mapping;

pub mod tcp_clients;
pub mod udp_clients;

/// Connect to the first address `addr` resolves to that accepts within `timeout`, and apply the
/// same timeout to reads and writes on the resulting stream.
pub fn connect_stream<A: ToSocketAddrs>(addr:A, timeout:Option<Duration>) -> io::Result<TcpStream> {
	let mut last_err = Error::new(ErrorKind::AddrNotAvailable, "Address did not resolve to anything");

	for sock_addr in addr.to_socket_addrs()? {
		let attempt = match timeout {
			Some(t) => TcpStream::connect_timeout(&sock_addr, t),
			None    => TcpStream::connect(sock_addr),
		};
		match attempt {
			Ok(stream) => {
				stream.set_read_timeout(timeout)?;
				stream.set_write_timeout(timeout)?;
				stream.set_nodelay(true)?;
				return Ok(stream);
			},
			Err(e) => last_err = e,
		}
	}

	Err(last_err)
}

use std::io::{self, Error, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crate::xdr;
use super::{xdr_pack, xdr_unpack};

const RECV_BUFF_LEN:usize = 8192;

/// Sends one RPC call to a broadcast address and gathers every reply that arrives before a deadline.
pub struct BroadcastUdpClient {
	socket: UdpSocket,
	pub prog: u32,
	pub vers: u32,
	pub port: u16,
	lastxid: u32,
	pub packer: xdr::Packer,
	recv_buff: Vec<u8>,
}

impl BroadcastUdpClient {

	pub fn bind(port:u16, prog: u32, vers: u32) -> io::Result<Self> {
		let socket:UdpSocket = UdpSocket::bind("0.0.0.0:0")?;
		socket.set_broadcast(true)?;

		Ok(Self{ socket, prog, vers, port, lastxid: 0, packer: xdr::Packer::new(), recv_buff: vec![0; RECV_BUFF_LEN] })
	}

	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	/// Broadcast the packed call and return the sender and result bytes of every matching reply
	/// received within `wait`. Malformed or rejected replies are ignored.
	pub fn make_call(&mut self, broadcast_addr:&str, wait:Duration) -> io::Result<Vec<(SocketAddr, Vec<u8>)>> {
		let call:&[u8] = self.packer.as_bytes();
		let n = self.socket.send_to(call, (broadcast_addr, self.port))?;
		if n != call.len() {
			return Err(Error::new(ErrorKind::Other, "Sent the wrong number of bytes"));
		}

		let deadline = Instant::now() + wait;
		let mut unpacker = xdr::Unpacker::new();
		let mut replies = vec![];

		loop {
			let now = Instant::now();
			if now >= deadline { break; }
			self.socket.set_read_timeout(Some(deadline - now))?;

			let (n, addr) = match self.socket.recv_from(&mut self.recv_buff) {
				Ok(x) => x,
				Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => break,
				Err(e) => return Err(e),
			};

			unpacker.reset(&self.recv_buff[0..n]);
			match xdr_unpack::unpack_replyheader(&mut unpacker) {
				Ok(xid) if xid == self.lastxid => replies.push((addr, unpacker.remaining_bytes().to_vec())),
				Ok(_)  => { },
				Err(e) => log::debug!("Ignoring bad broadcast reply from {}: {}", addr, e),
			}
		}

		Ok(replies)
	}

}

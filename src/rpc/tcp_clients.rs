use std::io::{self, Read, Write, Error, ErrorKind};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use byteorder::{BigEndian, WriteBytesExt, ReadBytesExt};

use crate::xdr;
use super::{connect_stream, xdr_pack, xdr_unpack};

const LAST_FRAGMENT:u32 = 0x8000_0000;

/// An ONC-RPC client over a record-marked TCP stream. Arguments are packed into `packer` between
/// `start_call` and `do_call`; results are read out of `unpacker` afterwards.
pub struct TcpClient {
	stream: TcpStream,
	pub prog: u32,
	pub vers: u32,
	lastxid: u32,
	pub packer: xdr::Packer,
	pub unpacker: xdr::Unpacker,
}

impl TcpClient {

	pub fn connect<A: ToSocketAddrs>(addr: A, prog: u32, vers: u32, timeout:Option<Duration>) -> io::Result<Self> {
		let stream = connect_stream(addr, timeout)?;
		Ok(Self{ stream, prog, vers, lastxid: 0, packer: xdr::Packer::new(), unpacker: xdr::Unpacker::new() })
	}

	pub fn start_call(&mut self, prc:u32) -> io::Result<()> {
		self.lastxid = self.lastxid.wrapping_add(1);
		self.packer.reset();
		xdr_pack::pack_callheader_no_auth(&mut self.packer, self.lastxid, self.prog, self.vers, prc)
	}

	pub fn do_call(&mut self) -> io::Result<()> {
		let call:&[u8] = self.packer.as_bytes();
		if call.len() as u64 >= LAST_FRAGMENT as u64 {
			return Err(Error::new(ErrorKind::InvalidInput, "Call too large for a single record fragment"));
		}

		let mut send_bytes:Vec<u8> = Vec::with_capacity(call.len() + 4);
		send_bytes.write_u32::<BigEndian>(call.len() as u32 | LAST_FRAGMENT)?;
		send_bytes.extend_from_slice(call);
		self.stream.write_all(&send_bytes)?;

		loop {
			let reply = self.read_record()?;
			self.unpacker.reset(&reply);

			let xid = xdr_unpack::unpack_replyheader(&mut self.unpacker)?;
			if xid == self.lastxid {
				return Ok(());
			} else if xid < self.lastxid {
				// Stale reply to an earlier call that timed out on our side
				log::debug!("Discarding RPC reply with stale xid {} (expected {})", xid, self.lastxid);
				continue;
			} else {
				return Err(Error::new(ErrorKind::InvalidData, "Received a reply to a call that was never made"));
			}
		}
	}

	fn read_record(&mut self) -> io::Result<Vec<u8>> {
		let mut record:Vec<u8> = vec![];

		loop {
			let mark:u32 = self.stream.read_u32::<BigEndian>()?;
			let n = (mark & !LAST_FRAGMENT) as usize;

			let start = record.len();
			record.resize(start + n, 0);
			self.stream.read_exact(&mut record[start..])?;

			if mark & LAST_FRAGMENT != 0 { return Ok(record); }
		}
	}

	pub fn shutdown(&self) -> io::Result<()> { self.stream.shutdown(Shutdown::Both) }

}

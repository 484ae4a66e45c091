use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use crate::rpc::port_mapping::{Mapping, TcpPortMapperClient};
use crate::rpc::tcp_clients::TcpClient;

pub mod xdr_pack;

// Device core
pub const DEVICE_CORE_PROG:u32  = 0x0607af;
pub const DEVICE_CORE_VERS:u32  = 1;
pub const CREATE_LINK:u32       = 10;
pub const DEVICE_WRITE:u32      = 11;
pub const DEVICE_READ:u32       = 12;
pub const DESTROY_LINK:u32      = 23;

pub const CLIENT_ID:i32 = 3333;
pub const DEFAULT_DEVICE:&str = "inst0";
pub const DEFAULT_LOCK_TIMEOUT:u32 = 10000;

pub const OPERATION_FLAGS_END:i32 = 8;

// Reason bits in a device_read reply
pub const REASON_REQCNT:i32 = 1;
pub const REASON_CHR:i32    = 2;
pub const REASON_END:i32    = 4;

// Upper bound for a single device_write when the device advertises nothing smaller
const DEFAULT_MAX_RECV_SIZE:u32 = 1024 * 1024;

fn err(msg:&str) -> io::Error { Error::new(ErrorKind::Other, msg) }

fn device_error(code:i32) -> io::Result<()> {
	match code {
		0  => Ok(()),
		1  => Err(err("Syntax error")),
		3  => Err(err("Device not accessible")),
		4  => Err(Error::new(ErrorKind::NotConnected, "Invalid link identifier")),
		5  => Err(err("Parameter error")),
		6  => Err(err("Channel not established")),
		8  => Err(err("Operation not supported")),
		9  => Err(err("Out of resources")),
		11 => Err(err("Device locked by another link")),
		12 => Err(err("No lock held by this link")),
		15 => Err(Error::new(ErrorKind::TimedOut, "I/O timeout")),
		17 => Err(err("I/O error")),
		21 => Err(err("Invalid address")),
		23 => Err(err("Abort")),
		29 => Err(err("Channel already established")),
		_  => Err(err("Unknown device error")),
	}
}

#[derive(Debug, Clone, Copy)]
pub struct Link {
	pub link_id: i32,
	pub abort_port: u16,
	pub max_recv_size: u32,
}

/// The VXI-11 core channel to one instrument. At most one link is open at a time.
pub struct CoreClient {
	client: TcpClient,
	io_timeout_ms: u32,
	opt_link: Option<Link>,
}

impl CoreClient {

	fn get_link(&self) -> io::Result<Link> {
		self.opt_link.ok_or_else(|| Error::new(ErrorKind::NotConnected, "No link"))
	}

	/// Look up the core channel port with the port mapper at `pmap_port` on `host` and connect to it.
	pub fn new(host:&str, pmap_port:u16, timeout:Option<Duration>) -> io::Result<Self> {
		let port = {
			let mut pmap_client = TcpPortMapperClient::new(host, pmap_port, timeout)?;
			pmap_client.get_port(&Mapping::tcp_query(DEVICE_CORE_PROG, DEVICE_CORE_VERS))?
		};
		log::debug!("VXI-11 core channel for {} is on port {}", host, port);

		let client = TcpClient::connect((host, port), DEVICE_CORE_PROG, DEVICE_CORE_VERS, timeout)?;
		let io_timeout_ms = timeout.map(|t| t.as_millis().min(u32::MAX as u128) as u32).unwrap_or(DEFAULT_LOCK_TIMEOUT);

		Ok(CoreClient{ client, io_timeout_ms, opt_link: None })
	}

	pub fn link(&self) -> Option<Link> { self.opt_link }

	pub fn create_link(&mut self, device:&str) -> io::Result<Link> {
		if self.opt_link.is_some() {
			return Err(err("Already connected to a link"));
		}

		self.client.start_call(CREATE_LINK)?;
		xdr_pack::pack_create_link_parms(&mut self.client.packer, CLIENT_ID, false, DEFAULT_LOCK_TIMEOUT, device)?;
		self.client.do_call()?;

		let error:i32         = self.client.unpacker.unpack_i32()?;
		let link_id:i32       = self.client.unpacker.unpack_i32()?;
		let abort_port:u32    = self.client.unpacker.unpack_u32()?;
		let max_recv_size:u32 = self.client.unpacker.unpack_u32()?;
		device_error(error)?;

		let link = Link{ link_id, abort_port: abort_port as u16, max_recv_size };
		self.opt_link = Some(link);
		Ok(link)
	}

	/// Write `data`, split into chunks no larger than the device accepts. Only the last chunk carries
	/// the END flag.
	pub fn write(&mut self, data:&[u8]) -> io::Result<()> {
		let link = self.get_link()?;
		let chunk_len = match link.max_recv_size { 0 => DEFAULT_MAX_RECV_SIZE, n => n.min(DEFAULT_MAX_RECV_SIZE) } as usize;

		let chunks:Vec<&[u8]> = if data.is_empty() { vec![data] } else { data.chunks(chunk_len).collect() };
		let last_idx = chunks.len() - 1;
		for (idx, chunk) in chunks.into_iter().enumerate() {
			let flags = if idx == last_idx { OPERATION_FLAGS_END } else { 0 };

			self.client.start_call(DEVICE_WRITE)?;
			xdr_pack::pack_device_write_parms(&mut self.client.packer, link.link_id, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, flags, chunk)?;
			self.client.do_call()?;

			let error:i32 = self.client.unpacker.unpack_i32()?;
			let size:u32  = self.client.unpacker.unpack_u32()?;
			device_error(error)?;

			if size as usize != chunk.len() {
				return Err(err("Number of bytes in confirmation doesn't match number of bytes sent"));
			}
		}

		Ok(())
	}

	/// Read one complete response, issuing further device_read calls until the device sets END.
	pub fn read(&mut self) -> io::Result<Vec<u8>> {
		let link = self.get_link()?;
		let mut ans:Vec<u8> = vec![];

		loop {
			self.client.start_call(DEVICE_READ)?;
			xdr_pack::pack_device_read_parms(&mut self.client.packer, link.link_id, u32::MAX, self.io_timeout_ms, DEFAULT_LOCK_TIMEOUT, 0, 0)?;
			self.client.do_call()?;

			let error:i32  = self.client.unpacker.unpack_i32()?;
			let reason:i32 = self.client.unpacker.unpack_i32()?;
			let data       = self.client.unpacker.unpack_variable_len_opaque()?;
			device_error(error)?;

			ans.extend_from_slice(&data);

			if reason & REASON_END != 0 {
				return Ok(ans);
			} else if reason & (REASON_REQCNT | REASON_CHR) == 0 {
				return Err(err("Expected one of three reason bits to be set"));
			}
		}
	}

	pub fn destroy_link(&mut self) -> io::Result<()> {
		let link = match self.opt_link.take() {
			Some(link) => link,
			None       => return Err(Error::new(ErrorKind::NotConnected, "No link to destroy")),
		};

		self.client.start_call(DESTROY_LINK)?;
		xdr_pack::pack_device_link(&mut self.client.packer, link.link_id)?;
		self.client.do_call()?;

		device_error(self.client.unpacker.unpack_i32()?)?;
		self.client.shutdown()
	}

}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn device_errors_map_to_io_kinds() {
		assert!(device_error(0).is_ok());
		assert_eq!(device_error(15).unwrap_err().kind(), ErrorKind::TimedOut);
		assert_eq!(device_error(4).unwrap_err().kind(), ErrorKind::NotConnected);
		assert_eq!(device_error(11).unwrap_err().to_string(), "Device locked by another link");
	}
}

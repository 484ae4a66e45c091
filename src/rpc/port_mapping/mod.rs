use std::io::{self, Error, ErrorKind};
use std::net::IpAddr;
use std::time::Duration;

use crate::xdr::Unpacker;

use super::IPPROTO_TCP;
use super::xdr_pack;
use super::tcp_clients::TcpClient;
use super::udp_clients::BroadcastUdpClient;

pub const PMAP_PROG:u32 = 100000;
pub const PMAP_VERS:u32 = 2;
pub const PMAP_PORT:u16 = 111;

pub const PMAPPROC_GETPORT:u32 = 3;     // (mapping) -> unsigned int

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Protocol {
	TCP,
}

impl Protocol {
	pub fn to_u32(self) -> u32 { match self {
		Protocol::TCP => IPPROTO_TCP,
	}}
}

#[derive(Debug, Clone)]
pub struct Mapping {
	pub program: u32,
	pub version: u32,
	pub protocol: Protocol,
	pub port: u32,				// XDR encodes ports as u32
}

impl Mapping {
	/// A GETPORT query for `program`/`version` over TCP.
	pub fn tcp_query(program:u32, version:u32) -> Self {
		Mapping{ program, version, protocol: Protocol::TCP, port: 0 }
	}
}

fn port_from_u32(port:u32) -> io::Result<u16> {
	if port == 0 || port > u16::MAX as u32 {
		Err(Error::new(ErrorKind::NotFound, "Program is not registered with the port mapper"))
	} else {
		Ok(port as u16)
	}
}

pub struct TcpPortMapperClient {
	pub host: String,
	client: TcpClient,
}

impl TcpPortMapperClient {

	/// Connect to the port mapper on `host`, normally listening on `PMAP_PORT`.
	pub fn new(host:&str, port:u16, timeout:Option<Duration>) -> io::Result<Self> {
		let client = TcpClient::connect((host, port), PMAP_PROG, PMAP_VERS, timeout)?;
		Ok(Self{ host: host.to_owned(), client })
	}

	pub fn get_port(&mut self, m:&Mapping) -> io::Result<u16> {
		self.client.start_call(PMAPPROC_GETPORT)?;
		xdr_pack::pack_mapping(&mut self.client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;
		self.client.do_call()?;

		let ans:u32 = self.client.unpacker.unpack_u32()?;

		if self.client.unpacker.all_data_consumed() { port_from_u32(ans) }
		else { Err(Error::new(ErrorKind::InvalidData, "Data unexpectedly left over in unpacker after unpacking port")) }
	}

}

impl Drop for TcpPortMapperClient {
	fn drop(&mut self) { let _ = self.client.shutdown(); }
}

/// Bind the UDP socket used for broadcast port mapper queries.
pub fn bind_broadcast() -> io::Result<BroadcastUdpClient> {
	BroadcastUdpClient::bind(PMAP_PORT, PMAP_PROG, PMAP_VERS)
}

/// Ask every port mapper reachable at `broadcast_addr` where `m` is registered and return the hosts
/// that have it, with their port, in the order they answered.
pub fn broadcast_get_port(client:&mut BroadcastUdpClient, broadcast_addr:&str, m:&Mapping, wait:Duration) -> io::Result<Vec<(IpAddr, u16)>> {
	client.start_call(PMAPPROC_GETPORT)?;
	xdr_pack::pack_mapping(&mut client.packer, m.program, m.version, m.protocol.to_u32(), m.port)?;

	let mut unpacker = Unpacker::new();
	let mut ans:Vec<(IpAddr, u16)> = vec![];
	for (addr, results) in client.make_call(broadcast_addr, wait)? {
		unpacker.reset(&results);
		if let Ok(port) = unpacker.unpack_u32().and_then(port_from_u32) {
			if !ans.iter().any(|(ip, _)| *ip == addr.ip()) {
				ans.push((addr.ip(), port));
			}
		}
	}

	Ok(ans)
}

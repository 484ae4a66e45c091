use std::io::{self, Error, ErrorKind};
use std::time::Duration;

use crate::config::Settings;
use crate::rpc::port_mapping::{self, Mapping};
use crate::rpc::udp_clients::BroadcastUdpClient;
use crate::vxi11::{CoreClient, DEVICE_CORE_PROG, DEVICE_CORE_VERS};
use super::{parse_address, with_terminator, Backend, ResourceAddress, ResourceManager, Session};

pub struct Vxi11Manager {
	hosts: Vec<String>,
	pmap_port: u16,
	io_timeout: Option<Duration>,
	broadcast: Option<BroadcastUdpClient>,
	broadcast_address: String,
	discovery_timeout: Duration,
}

impl Vxi11Manager {
	/// Fails when broadcasting is enabled and the UDP socket for it can't be set up.
	pub fn new(settings:&Settings) -> io::Result<Self> {
		let broadcast = if settings.broadcast { Some(port_mapping::bind_broadcast()?) } else { None };

		Ok(Self{
			hosts: settings.hosts.clone(),
			pmap_port: settings.portmapper_port,
			io_timeout: settings.io_timeout(),
			broadcast,
			broadcast_address: settings.broadcast_address.clone(),
			discovery_timeout: settings.discovery_timeout(),
		})
	}
}

impl ResourceManager for Vxi11Manager {
	fn backend(&self) -> Backend { Backend::Vxi11 }

	// A failed broadcast only loses the broadcast responders, never the configured hosts
	fn list_resources(&mut self) -> io::Result<Vec<String>> {
		let mut ans:Vec<String> = self.hosts.iter().map(|host| ResourceAddress::instr(host).to_string()).collect();

		if let Some(client) = self.broadcast.as_mut() {
			let query = Mapping::tcp_query(DEVICE_CORE_PROG, DEVICE_CORE_VERS);
			match port_mapping::broadcast_get_port(client, &self.broadcast_address, &query, self.discovery_timeout) {
				Ok(responders) => for (ip, port) in responders {
					log::debug!("VXI-11 instrument answered from {} (core channel port {})", ip, port);
					let address = ResourceAddress::instr(&ip.to_string()).to_string();
					if !ans.contains(&address) { ans.push(address); }
				},
				Err(e) => log::debug!("Broadcast to {} failed: {}", self.broadcast_address, e),
			}
		}

		Ok(ans)
	}

	fn open_resource(&mut self, address:&str) -> io::Result<Box<dyn Session>> {
		match parse_address(address)? {
			ResourceAddress::Instr{ host, device } => {
				let mut core = CoreClient::new(&host, self.pmap_port, self.io_timeout)?;
				let link = core.create_link(&device)?;
				log::debug!("Opened VXI-11 link {} to {}", link.link_id, address);
				Ok(Box::new(Vxi11Session{ address: address.to_owned(), core: Some(core) }))
			},
			other => Err(Error::new(ErrorKind::InvalidInput, format!("{} is not a VXI-11 resource", other))),
		}
	}
}

pub struct Vxi11Session {
	address: String,
	core: Option<CoreClient>,
}

impl Vxi11Session {
	fn core(&mut self) -> io::Result<&mut CoreClient> {
		self.core.as_mut().ok_or_else(|| Error::new(ErrorKind::NotConnected, "Session is closed"))
	}
}

impl Session for Vxi11Session {
	fn address(&self) -> &str { &self.address }

	fn write(&mut self, data:&[u8]) -> io::Result<()> { self.core()?.write(&with_terminator(data)) }

	fn read(&mut self) -> io::Result<Vec<u8>> { self.core()?.read() }

	fn close(&mut self) -> io::Result<()> {
		match self.core.take() {
			Some(mut core) => core.destroy_link(),
			None => Ok(()),
		}
	}

	fn is_open(&self) -> bool {
		self.core.as_ref().map(|core| core.link().is_some()).unwrap_or(false)
	}
}

impl Drop for Vxi11Session {
	fn drop(&mut self) {
		if let Err(e) = self.close() {
			log::debug!("Failed to destroy VXI-11 link to {}: {}", self.address, e);
		}
	}
}

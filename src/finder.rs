use std::io;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Settings;
use crate::visa::{self, Backend, ResourceId, ResourceManager};

/// Identity strings of the DS1000Z family: DS1054Z, DS1074Z, DS1104Z and their `-S` and ` Plus`
/// variants.
pub const IDN_PATTERN:&str = r"^RIGOL TECHNOLOGIES,DS1[01][057]4Z(-S)?( Plus)?,.+$";

lazy_static! {
	static ref IDN_RE: Regex = Regex::new(IDN_PATTERN).unwrap();
}

pub fn is_ds1000z(identity:&str) -> bool {
	IDN_RE.is_match(identity.trim_end())
}

/// Produces the resource manager for a backend. Failing to load means the backend is unavailable.
pub trait BackendLoader {
	fn load(&self, backend:Backend) -> io::Result<Box<dyn ResourceManager>>;
}

/// Loads the real network backends using the given settings.
#[derive(Debug, Clone, Default)]
pub struct NetworkBackends {
	pub settings: Settings,
}

impl NetworkBackends {
	pub fn new(settings:Settings) -> Self { Self{ settings } }
}

impl BackendLoader for NetworkBackends {
	fn load(&self, backend:Backend) -> io::Result<Box<dyn ResourceManager>> {
		visa::open_resource_manager(backend, &self.settings)
	}
}

pub struct DeviceFinder<L> {
	loader: L,
}

impl<L: BackendLoader> DeviceFinder<L> {

	pub fn new(loader:L) -> Self { Self{ loader } }

	pub fn loader(&self) -> &L { &self.loader }

	/// Every reachable resource, on every available backend, whose identity is a DS1000Z. Never
	/// fails: unavailable backends and unresponsive resources are left out.
	pub fn find(&self) -> Vec<ResourceId> {
		let mut found = vec![];

		for backend in Backend::ALL.iter().copied() {
			let mut manager = match self.loader.load(backend) {
				Ok(manager) => manager,
				Err(e) => {
					log::debug!("Skipping backend {}: {}", backend, e);
					continue;
				},
			};

			let addresses = match manager.list_resources() {
				Ok(addresses) => addresses,
				Err(e) => {
					log::debug!("Skipping backend {}, unable to list resources: {}", backend, e);
					continue;
				},
			};

			for address in addresses {
				match check_resource(manager.as_mut(), &address) {
					Ok(true) => {
						log::info!("Found DS1000Z at {} via {}", address, backend);
						found.push(ResourceId::new(&address, backend));
					},
					Ok(false) => log::debug!("{} is not a DS1000Z", address),
					Err(e)    => log::debug!("Skipping {}: {}", address, e),
				}
			}
		}

		found
	}

	pub fn find_first(&self) -> Option<ResourceId> {
		self.find().into_iter().next()
	}

}

// The session is closed whatever the identity turns out to be
fn check_resource(manager:&mut dyn ResourceManager, address:&str) -> io::Result<bool> {
	let mut session = manager.open_resource(address)?;
	let identity = session.query("*IDN?");

	if let Err(e) = session.close() {
		log::debug!("Error closing {} after identity check: {}", address, e);
	}

	Ok(is_ds1000z(&identity?))
}

use std::fmt;
use std::io;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::visa::Session;

pub const CHANNELS:[u8; 4] = [1, 2, 3, 4];

// Largest BYTE-format transfer the scope allows in one :WAV:DATA? query
pub const MAX_POINTS_PER_READ:usize = 250_000;

// Deepest acquisition memory in the family (24 Mpts, single channel)
pub const MAX_MEMORY_DEPTH:usize = 24_000_000;

pub const PNG_SIGNATURE:&[u8] = b"\x89PNG\r\n\x1a\n";

fn chan_ok(n:u8) -> Result<()> {
	if CHANNELS.contains(&n) { Ok(()) } else { Err(Error::InvalidChannel(n)) }
}

fn bad_response(command:&str, response:&str) -> Error {
	Error::BadResponse{ command: command.to_owned(), response: response.to_owned() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaveformMode {
	/// The 1200 points shown on screen.
	Normal,
	/// Screen points while running, memory points when stopped.
	Maximum,
	/// The whole acquisition memory. Only valid while stopped.
	Raw,
}

impl WaveformMode {
	pub fn scpi(self) -> &'static str {
		match self {
			WaveformMode::Normal  => "NORM",
			WaveformMode::Maximum => "MAX",
			WaveformMode::Raw     => "RAW",
		}
	}
}

impl fmt::Display for WaveformMode {
	fn fmt(&self, f:&mut fmt::Formatter) -> fmt::Result {
		f.write_str(match self {
			WaveformMode::Normal  => "normal",
			WaveformMode::Maximum => "max",
			WaveformMode::Raw     => "raw",
		})
	}
}

impl FromStr for WaveformMode {
	type Err = String;

	fn from_str(s:&str) -> std::result::Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"normal" | "norm"   => Ok(WaveformMode::Normal),
			"maximum" | "max"   => Ok(WaveformMode::Maximum),
			"raw"               => Ok(WaveformMode::Raw),
			_ => Err(format!("unknown waveform mode '{}', expected normal, max or raw", s)),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
	pub manufacturer: String,
	pub model: String,
	pub serial: String,
	pub firmware: String,
}

impl FromStr for Identity {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		let fields:Vec<&str> = s.trim().splitn(4, ',').map(str::trim).collect();
		match fields.as_slice() {
			[manufacturer, model, serial, firmware] => Ok(Identity{
				manufacturer: manufacturer.to_string(),
				model: model.to_string(),
				serial: serial.to_string(),
				firmware: firmware.to_string(),
			}),
			_ => Err(bad_response("*IDN?", s)),
		}
	}
}

/// The scaling information `:WAVeform:PREamble?` reports for the current source and mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
	pub format: u8,
	pub kind: u8,
	pub points: usize,
	pub count: u32,
	pub x_increment: f64,
	pub x_origin: f64,
	pub x_reference: f64,
	pub y_increment: f64,
	pub y_origin: f64,
	pub y_reference: f64,
}

impl Preamble {
	pub fn time(&self, idx:usize) -> f64 {
		(idx as f64 - self.x_reference) * self.x_increment + self.x_origin
	}

	pub fn volts(&self, raw:u8) -> f64 {
		(raw as f64 - self.y_origin - self.y_reference) * self.y_increment
	}
}

impl FromStr for Preamble {
	type Err = Error;

	fn from_str(s:&str) -> Result<Self> {
		let bad = || bad_response(":WAV:PRE?", s);
		let fields:Vec<f64> = s.trim().split(',')
			.map(|f| f.trim().parse::<f64>())
			.collect::<std::result::Result<_, _>>()
			.map_err(|_| bad())?;
		if fields.len() != 10 || fields[2] < 0.0 || fields[2] > MAX_MEMORY_DEPTH as f64 {
			return Err(bad());
		}

		Ok(Preamble{
			format: fields[0] as u8,
			kind: fields[1] as u8,
			points: fields[2] as usize,
			count: fields[3] as u32,
			x_increment: fields[4],
			x_origin: fields[5],
			x_reference: fields[6],
			y_increment: fields[7],
			y_origin: fields[8],
			y_reference: fields[9],
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
	pub channel: u8,
	pub preamble: Preamble,
	pub time: Vec<f64>,
	pub volts: Vec<f64>,
}

/// Every displayed channel of one stopped acquisition, on the time axis of the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
	pub time: Vec<f64>,
	pub channels: Vec<(u8, Vec<f64>)>,
}

impl Capture {
	pub fn from_waveforms(waveforms:Vec<Waveform>) -> Result<Self> {
		let time = match waveforms.first() {
			Some(w) => w.time.clone(),
			None    => return Err(Error::NoChannels),
		};
		let channels = waveforms.into_iter().map(|w| (w.channel, w.volts)).collect();
		Ok(Capture{ time, channels })
	}

	pub fn header(&self) -> Vec<String> {
		std::iter::once("Time".to_string())
			.chain(self.channels.iter().map(|(n, _)| format!("CH{}", n)))
			.collect()
	}

	/// Write as CSV: a `Time,CH1,...` header then one row per sample. A channel shorter than the
	/// time axis leaves empty cells.
	pub fn write_csv<W: io::Write>(&self, w:W) -> Result<()> {
		let mut wtr = csv::Writer::from_writer(w);
		wtr.write_record(self.header())?;

		for (idx, t) in self.time.iter().enumerate() {
			let mut row = vec![t.to_string()];
			for (_, volts) in &self.channels {
				row.push(volts.get(idx).map(|v| v.to_string()).unwrap_or_default());
			}
			wtr.write_record(&row)?;
		}

		wtr.flush()?;
		Ok(())
	}
}

/// Driver for the Rigol DS1000Z family over an open session.
pub struct Ds1000z<'a> {
	session: &'a mut dyn Session,
}

impl<'a> Ds1000z<'a> {

	pub fn new(session:&'a mut dyn Session) -> Self { Self{ session } }

	pub fn write(&mut self, cmd:&str) -> Result<()> {
		log::trace!("-> {}", cmd);
		Ok(self.session.write(cmd.as_bytes())?)
	}

	pub fn ask_str(&mut self, cmd:&str) -> Result<String> {
		let resp = self.session.query(cmd)?;
		log::trace!("<- {}", resp);
		Ok(resp)
	}

	pub fn identity(&mut self) -> Result<Identity> { self.ask_str("*IDN?")?.parse() }

	// One-liners
	pub fn run(&mut self)    -> Result<()> { self.write(":RUN")  }
	pub fn stop(&mut self)   -> Result<()> { self.write(":STOP") }
	pub fn single(&mut self) -> Result<()> { self.write(":SING") }

	pub fn channel_displayed(&mut self, chan_num:u8) -> Result<bool> {
		chan_ok(chan_num)?;

		let cmd = format!(":CHAN{}:DISP?", chan_num);
		match self.ask_str(&cmd)?.trim() {
			"1" | "ON"  => Ok(true),
			"0" | "OFF" => Ok(false),
			other       => Err(bad_response(&cmd, other)),
		}
	}

	pub fn displayed_channels(&mut self) -> Result<Vec<u8>> {
		let mut ans = vec![];
		for n in CHANNELS.iter().copied() {
			if self.channel_displayed(n)? { ans.push(n); }
		}
		Ok(ans)
	}

	pub fn preamble(&mut self) -> Result<Preamble> { self.ask_str(":WAV:PRE?")?.parse() }

	/// Transfer one channel in BYTE format, reading memory in chunks the scope can deliver.
	pub fn waveform(&mut self, chan_num:u8, mode:WaveformMode) -> Result<Waveform> {
		chan_ok(chan_num)?;

		self.write(&format!(":WAV:SOUR CHAN{}", chan_num))?;
		self.write(&format!(":WAV:MODE {}", mode.scpi()))?;
		self.write(":WAV:FORM BYTE")?;
		let preamble = self.preamble()?;

		let mut raw:Vec<u8> = Vec::with_capacity(preamble.points.min(MAX_MEMORY_DEPTH));
		let mut start = 1;
		while start <= preamble.points {
			let stop = (start + MAX_POINTS_PER_READ - 1).min(preamble.points);
			self.write(&format!(":WAV:STAR {}", start))?;
			self.write(&format!(":WAV:STOP {}", stop))?;

			let chunk = self.session.query_block(":WAV:DATA?")?;
			if chunk.is_empty() {
				return Err(bad_response(":WAV:DATA?", "empty block"));
			}
			log::debug!("CH{}: read points {}..={} ({} bytes)", chan_num, start, stop, chunk.len());
			start += chunk.len();
			raw.extend_from_slice(&chunk);
		}

		let time  = (0..raw.len()).map(|idx| preamble.time(idx)).collect();
		let volts = raw.iter().map(|b| preamble.volts(*b)).collect();

		Ok(Waveform{ channel: chan_num, preamble, time, volts })
	}

	/// Transfer every displayed channel.
	pub fn capture(&mut self, mode:WaveformMode) -> Result<Capture> {
		let channels = self.displayed_channels()?;
		if channels.is_empty() {
			return Err(Error::NoChannels);
		}

		let mut waveforms = vec![];
		for n in channels {
			waveforms.push(self.waveform(n, mode)?);
		}
		Capture::from_waveforms(waveforms)
	}

	/// The screen as PNG bytes.
	pub fn screenshot(&mut self) -> Result<Vec<u8>> {
		let cmd = ":DISP:DATA? ON,OFF,PNG";
		let png = self.session.query_block(cmd)?;
		if !png.starts_with(PNG_SIGNATURE) {
			return Err(bad_response(cmd, "data is not a PNG image"));
		}
		Ok(png)
	}

}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::finder::BackendLoader;
	use crate::visa::Backend;
	use crate::visa::mock::{scope_script, Bench, Script};
	use std::cell::Cell;
	use std::rc::Rc;

	const IDN:&str = "RIGOL TECHNOLOGIES,DS1104Z,DS1ZA000000001,00.04.04.SP3";

	fn session(bench:&Bench) -> Box<dyn Session> {
		bench.add(Backend::Socket, "scope", scope_script(IDN));
		bench.load(Backend::Socket).unwrap().open_resource("scope").unwrap()
	}

	#[test]
	fn identity_is_split_into_fields() {
		let bench = Bench::new();
		let mut s = session(&bench);
		let idn = Ds1000z::new(s.as_mut()).identity().unwrap();
		assert_eq!(idn.model, "DS1104Z");
		assert_eq!(idn.firmware, "00.04.04.SP3");
		assert!("RIGOL TECHNOLOGIES,DS1104Z".parse::<Identity>().is_err());
	}

	#[test]
	fn preamble_scales_samples() {
		let p:Preamble = "0,2,1200,1,2.000000e-06,-1.200000e-03,0,4.132813e-02,0,122".parse().unwrap();
		assert_eq!(p.points, 1200);
		assert!((p.time(0) + 1.2e-3).abs() < 1e-12);
		assert!((p.time(600) - 0.0).abs() < 1e-9);
		assert_eq!(p.volts(122), 0.0);
		assert!("1,2,3".parse::<Preamble>().is_err());
		assert!("a,b,c,d,e,f,g,h,i,j".parse::<Preamble>().is_err());
		assert!("0,2,1e30,1,2.000000e-06,-1.200000e-03,0,4.132813e-02,0,122".parse::<Preamble>().is_err());
		assert!("0,2,24000001,1,2.000000e-06,-1.200000e-03,0,4.132813e-02,0,122".parse::<Preamble>().is_err());
	}

	#[test]
	fn channels_outside_range_are_rejected() {
		let bench = Bench::new();
		let mut s = session(&bench);
		let mut scope = Ds1000z::new(s.as_mut());
		assert!(matches!(scope.channel_displayed(0), Err(Error::InvalidChannel(0))));
		assert!(matches!(scope.waveform(5, WaveformMode::Raw), Err(Error::InvalidChannel(5))));
	}

	#[test]
	fn capture_reads_displayed_channels_only() {
		let bench = Bench::new();
		let mut s = session(&bench);
		let capture = Ds1000z::new(s.as_mut()).capture(WaveformMode::Raw).unwrap();

		assert_eq!(capture.header(), vec!["Time", "CH1", "CH2"]);
		assert_eq!(capture.time.len(), 10);
		assert!((capture.time[0] + 5e-3).abs() < 1e-12);
		assert!((capture.time[9] - 4e-3).abs() < 1e-12);
		// CH1 starts at raw 129: (129 - 0 - 128) * 0.04
		assert!((capture.channels[0].1[0] - 0.04).abs() < 1e-12);
		assert!((capture.channels[1].1[0] - 0.08).abs() < 1e-12);

		let events = bench.events();
		assert!(events.contains(&"write :WAV:MODE RAW".to_string()));
		assert!(events.contains(&"write :WAV:STAR 1".to_string()));
		assert!(events.contains(&"write :WAV:STOP 10".to_string()));
		assert!(!events.contains(&"write :WAV:SOUR CHAN3".to_string()));
	}

	// Raw memory deeper than one read, serving exactly the STAR..=STOP window asked for
	fn deep_memory_script(points:usize) -> Script {
		let window = Rc::new(Cell::new((1usize, points)));
		Rc::new(move |cmd:&str| {
			let (start, stop) = window.get();
			if let Some(n) = cmd.strip_prefix(":WAV:STAR ") {
				window.set((n.parse().unwrap(), stop));
				None
			} else if let Some(n) = cmd.strip_prefix(":WAV:STOP ") {
				window.set((start, n.parse().unwrap()));
				None
			} else if cmd == ":WAV:PRE?" {
				Some(Ok(format!("0,2,{},1,1.000000e-09,0,0,1.000000e-02,0,128\n", points).into_bytes()))
			} else if cmd == ":WAV:DATA?" {
				let n = stop.min(points) + 1 - start;
				let mut block = format!("#9{:09}", n).into_bytes();
				block.extend((start..start + n).map(|i| (i % 256) as u8));
				block.push(b'\n');
				Some(Ok(block))
			} else {
				None
			}
		})
	}

	#[test]
	fn raw_reads_are_chunked() {
		let bench = Bench::new();
		bench.add(Backend::Socket, "deep", deep_memory_script(MAX_POINTS_PER_READ + 1));
		let mut s = bench.load(Backend::Socket).unwrap().open_resource("deep").unwrap();

		let w = Ds1000z::new(s.as_mut()).waveform(1, WaveformMode::Raw).unwrap();
		assert_eq!(w.volts.len(), MAX_POINTS_PER_READ + 1);
		assert_eq!(w.time.len(), MAX_POINTS_PER_READ + 1);
		// Sample i (1-based) was served as i % 256, so the last one is 250001 % 256 = 145
		assert!((w.volts[MAX_POINTS_PER_READ] - (145.0 - 128.0) * 0.01).abs() < 1e-9);

		let windows:Vec<String> = bench.events().into_iter()
			.filter(|e| e.starts_with("write :WAV:STAR") || e.starts_with("write :WAV:STOP"))
			.collect();
		assert_eq!(windows, vec![
			"write :WAV:STAR 1", "write :WAV:STOP 250000",
			"write :WAV:STAR 250001", "write :WAV:STOP 250001",
		]);
		assert_eq!(bench.count("write :WAV:DATA?"), 2);
	}

	#[test]
	fn csv_has_header_and_rows() {
		let capture = Capture{ time: vec![0.0, 0.5], channels: vec![(1, vec![1.0, 2.0]), (3, vec![-1.5])] };
		let mut out = vec![];
		capture.write_csv(&mut out).unwrap();
		assert_eq!(String::from_utf8(out).unwrap(), "Time,CH1,CH3\n0,1,-1.5\n0.5,2,\n");
	}

	#[test]
	fn no_waveforms_is_no_channels() {
		assert!(matches!(Capture::from_waveforms(vec![]), Err(Error::NoChannels)));
	}

	#[test]
	fn screenshot_is_png() {
		let bench = Bench::new();
		let mut s = session(&bench);
		let png = Ds1000z::new(s.as_mut()).screenshot().unwrap();
		assert!(png.starts_with(PNG_SIGNATURE));
		assert_eq!(png.len(), 12);
	}

	#[test]
	fn modes_parse() {
		assert_eq!("RAW".parse::<WaveformMode>().unwrap(), WaveformMode::Raw);
		assert_eq!("norm".parse::<WaveformMode>().unwrap(), WaveformMode::Normal);
		assert!("fast".parse::<WaveformMode>().is_err());
	}
}

use std::path::Path;

use textplots::{Chart, Plot, Shape};

use crate::error::{Error, Result};

pub const DEFAULT_WIDTH:u32  = 160;
pub const DEFAULT_HEIGHT:u32 = 60;

/// Read the `Time` column and the `CH<channel>` column of a CSV written by `save_data`.
/// Column names are matched after trimming, so `Time, CH1` headers work too. Empty cells are
/// skipped.
pub fn load_channel(path:&Path, channel:u8) -> Result<Vec<(f64, f64)>> {
	if !path.is_file() {
		return Err(Error::FileNotFound(path.to_path_buf()));
	}

	let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
	let headers = rdr.headers()?.clone();
	let column = |name:&str| headers.iter().position(|h| h == name).ok_or_else(|| Error::MissingColumn(name.to_owned()));
	let time_idx = column("Time")?;
	let chan_idx = column(&format!("CH{}", channel))?;

	let mut points = vec![];
	for record in rdr.records() {
		let record = record?;
		let parse = |idx:usize| record.get(idx).and_then(|v| v.parse::<f64>().ok());
		if let (Some(t), Some(v)) = (parse(time_idx), parse(chan_idx)) {
			points.push((t, v));
		}
	}

	Ok(points)
}

/// Draw one channel of a saved capture as a line chart on the terminal.
pub fn preview(path:&Path, channel:u8, width:u32, height:u32) -> Result<()> {
	let points = load_channel(path, channel)?;
	let frame:Vec<(f32, f32)> = points.iter().map(|(t, v)| (*t as f32, *v as f32)).collect();

	let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
	println!("{}: CH{}", name, channel);
	if frame.len() < 2 {
		println!("Not enough samples to plot ({})", frame.len());
		return Ok(());
	}

	let x_min = frame.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
	let x_max = frame.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
	println!("Time [s] {:.6} to {:.6} | CH{} [V]", x_min, x_max, channel);

	Chart::new(width, height, x_min, x_max)
		.lineplot(&Shape::Lines(&frame))
		.nice();

	Ok(())
}

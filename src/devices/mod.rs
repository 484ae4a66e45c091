// Instrument drivers that speak SCPI over a `visa::Session`

pub mod ds1000z;

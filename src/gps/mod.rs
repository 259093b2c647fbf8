// src/gps/mod.rs
//! NMEA decoding and MT3339 control

pub mod clock;
pub mod data;
pub mod fixed;
pub mod link;
pub mod mt3339;
pub mod nmea;
pub mod tokenizer;

pub use data::GpsFix;

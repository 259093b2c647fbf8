// src/lib.rs
//! MT3339 GPS Library
//!
//! Decodes NMEA sentences one byte at a time, commits a fix only when the
//! RMC and GGA sentences of the same instant have both verified, and drives
//! the receiver's PMTK wake/standby/sentence-selection commands.

pub mod config;
pub mod error;
pub mod gps;
pub mod monitor;

// Re-export main types for convenience
pub use error::{GpsError, Result};
pub use gps::data::GpsFix;
pub use gps::mt3339::{LifecycleState, Mt3339};
pub use gps::nmea::{CommitPolicy, NmeaDecoder, SentenceHandler, SentenceKind};
pub use monitor::GpsMonitor;

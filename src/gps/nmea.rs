// src/gps/nmea.rs
//! NMEA sentence decoding
//!
//! `NmeaDecoder` routes the fields of `$GPRMC` and `$GPGGA` into a
//! provisional fix and commits it only after the checksum of the completing
//! sentence verifies. Every field and sentence is also handed to a
//! `SentenceHandler` so outer protocol layers can follow the same stream.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::clock::Clock;
use super::data::{GpsFix, ProvisionalFix};
use super::fixed::{parse_and_scale, parse_hex, parse_integer, parse_position};
use super::tokenizer::{Token, Tokenizer};

/// Implied decimals of the time-of-day field (HHMMSSmmm)
const TIME_PLACES: u8 = 3;

/// Kind of the sentence currently being decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SentenceKind {
    /// No sentence open
    #[default]
    Invalid,
    /// Open, identifier not (yet) known to this layer
    Unrecognized,
    Rmc,
    Gga,
    /// `PMTK001` command acknowledgment
    Ack,
    /// `PMTK705` firmware release report
    Version,
}

/// Which sentences must agree before a fix is committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum CommitPolicy {
    /// Every valid RMC commits date and time; position data is left alone
    TimeOnly,
    /// RMC and GGA must report the same time and enough satellites
    Quorum { min_satellites: u8 },
}

impl Default for CommitPolicy {
    fn default() -> Self {
        CommitPolicy::Quorum { min_satellites: 4 }
    }
}

/// Hooks for protocol layers stacked on top of the decoder
pub trait SentenceHandler {
    /// Called for every field after the decoder has looked at it
    fn field(&mut self, kind: SentenceKind, index: u8, text: &str) {
        let _ = (kind, index, text);
    }

    /// Called when `\r` closes a sentence
    fn sentence(&mut self, kind: SentenceKind, valid: bool) {
        let _ = (kind, valid);
    }
}

impl SentenceHandler for () {}

/// Result of a completed sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentenceOutcome {
    pub kind: SentenceKind,
    /// Checksum matched
    pub valid: bool,
    /// A field marker (RMC validity, GGA fix quality) said "no fix"
    pub rejected: bool,
    /// The committed fix was replaced
    pub committed: bool,
}

pub struct NmeaDecoder {
    tokenizer: Tokenizer,
    kind: SentenceKind,
    rejected: bool,
    policy: CommitPolicy,
    provisional: ProvisionalFix,
    pending: ProvisionalFix,
    fix: GpsFix,
    clock: Arc<dyn Clock>,
}

impl NmeaDecoder {
    pub fn new(policy: CommitPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            tokenizer: Tokenizer::new(),
            kind: SentenceKind::Invalid,
            rejected: false,
            policy,
            provisional: ProvisionalFix::default(),
            pending: ProvisionalFix::default(),
            fix: GpsFix::new(),
            clock,
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    /// Last committed fix
    pub fn fix(&self) -> &GpsFix {
        &self.fix
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Kind of the sentence in progress
    pub fn kind(&self) -> SentenceKind {
        self.kind
    }

    /// Drop the sentence in progress and all provisional values.
    /// The committed fix is kept.
    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.kind = SentenceKind::Invalid;
        self.rejected = false;
        self.provisional = ProvisionalFix::default();
        self.pending = ProvisionalFix::default();
    }

    /// Reset and forget the committed fix as well
    pub fn clear(&mut self) {
        self.reset();
        self.fix = GpsFix::new();
    }

    /// Feed one received byte
    pub fn feed<H>(&mut self, byte: u8, handler: &mut H) -> Option<SentenceOutcome>
    where
        H: SentenceHandler + ?Sized,
    {
        match self.tokenizer.feed(byte)? {
            Token::Start => {
                self.kind = SentenceKind::Unrecognized;
                self.rejected = false;
                None
            }
            Token::Field { index, text } => {
                self.process_field(index, text.as_str());
                handler.field(self.kind, index, text.as_str());
                None
            }
            Token::End {
                checksum,
                parity,
                checksum_seen,
            } => {
                let valid = checksum_seen && parse_hex(checksum.as_str()) == u32::from(parity);
                let outcome = self.process_sentence(valid);
                handler.sentence(outcome.kind, valid);
                Some(outcome)
            }
            Token::Overflow => {
                trace!(target: "mt3339_gps::wire", "field overflow, sentence dropped");
                self.kind = SentenceKind::Invalid;
                None
            }
        }
    }

    /// Feed a run of bytes, returning the outcome of every sentence closed
    pub fn feed_all<H>(&mut self, bytes: &[u8], handler: &mut H) -> Vec<SentenceOutcome>
    where
        H: SentenceHandler + ?Sized,
    {
        bytes
            .iter()
            .filter_map(|&b| self.feed(b, handler))
            .collect()
    }

    fn process_field(&mut self, index: u8, text: &str) {
        if index == 0 {
            self.kind = match text {
                "GPRMC" | "GNRMC" => SentenceKind::Rmc,
                "GPGGA" | "GNGGA" => SentenceKind::Gga,
                _ => SentenceKind::Unrecognized,
            };
            self.pending = self.provisional;
            return;
        }

        if self.rejected {
            return;
        }

        let first = text.as_bytes().first().copied();
        let pending = &mut self.pending;

        match self.kind {
            SentenceKind::Rmc => match index {
                1 => pending.rmc_time = Some(parse_and_scale(text, TIME_PLACES) as u32),
                2 => {
                    if first != Some(b'A') {
                        self.rejected = true;
                    }
                }
                3 => pending.latitude = parse_position(text),
                4 => {
                    if first == Some(b'S') {
                        pending.latitude = -pending.latitude;
                    }
                }
                5 => pending.longitude = parse_position(text),
                6 => {
                    if first == Some(b'W') {
                        pending.longitude = -pending.longitude;
                    }
                }
                7 => pending.speed = parse_and_scale(text, 2) as u32,
                8 => pending.course = parse_and_scale(text, 2) as u32,
                9 => pending.date = parse_integer(text),
                _ => {}
            },
            SentenceKind::Gga => match index {
                1 => pending.gga_time = Some(parse_and_scale(text, TIME_PLACES) as u32),
                2 => pending.latitude = parse_position(text),
                3 => {
                    if first == Some(b'S') {
                        pending.latitude = -pending.latitude;
                    }
                }
                4 => pending.longitude = parse_position(text),
                5 => {
                    if first == Some(b'W') {
                        pending.longitude = -pending.longitude;
                    }
                }
                6 => {
                    if first == Some(b'0') {
                        self.rejected = true;
                    }
                }
                7 => pending.satellites = parse_integer(text).min(u32::from(u8::MAX)) as u8,
                8 => pending.hdop = parse_and_scale(text, 2) as u32,
                9 => pending.altitude = parse_and_scale(text, 2),
                _ => {}
            },
            _ => {}
        }
    }

    fn process_sentence(&mut self, valid: bool) -> SentenceOutcome {
        let kind = std::mem::take(&mut self.kind);
        let rejected = self.rejected;
        self.rejected = false;

        let mut committed = false;

        if valid {
            if rejected {
                // A "no fix" report must not pair with a later sentence
                match kind {
                    SentenceKind::Rmc => self.provisional.rmc_time = None,
                    SentenceKind::Gga => self.provisional.gga_time = None,
                    _ => {}
                }
            } else {
                if matches!(kind, SentenceKind::Rmc | SentenceKind::Gga) {
                    self.provisional = self.pending;
                }
                committed = self.try_commit(kind);
            }
        }

        trace!(
            target: "mt3339_gps::wire",
            ?kind,
            valid,
            rejected,
            committed,
            "sentence complete"
        );

        SentenceOutcome {
            kind,
            valid,
            rejected,
            committed,
        }
    }

    fn try_commit(&mut self, kind: SentenceKind) -> bool {
        match self.policy {
            CommitPolicy::TimeOnly => {
                let Some(time) = self.provisional.rmc_time.filter(|_| kind == SentenceKind::Rmc) else {
                    return false;
                };
                self.fix.commit_time(&self.provisional, time, self.clock.now());
            }
            CommitPolicy::Quorum { min_satellites } => {
                let Some(time) = self.provisional.rmc_time else {
                    return false;
                };
                if self.provisional.gga_time != Some(time) || self.provisional.satellites < min_satellites {
                    return false;
                }
                self.fix.commit_full(&self.provisional, time, self.clock.now());
            }
        }

        self.provisional.rmc_time = None;
        true
    }
}

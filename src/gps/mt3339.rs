// src/gps/mt3339.rs
//! MediaTek MT3339 power and reporting control
//!
//! The controller owns an `NmeaDecoder` and listens to the same field stream
//! for `$PMTK` replies. Commands go out as fixed lines; the receiver answers
//! some of them with `$PMTK001,<command>,<status>`.
//!
//! Lifecycle:
//!
//! ```text
//! Idle --begin--> Active --standby--> EndingGraceful --ack 161--> Idle
//!                    |                      |
//!                    |                      +--grace window elapsed--> Idle
//!                    +--standby while link silent--------------------> Idle
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::data::GpsFix;
use super::fixed::parse_integer;
use super::link::{LineEcho, Transport};
use super::nmea::{NmeaDecoder, SentenceHandler, SentenceKind, SentenceOutcome};
use crate::error::{GpsError, Result};

pub const STANDBY_COMMAND_ID: u16 = 161;

/// Commands understood by the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Empty line; flushes pending output and leaves standby
    Wake,
    Standby,
    FactoryReset,
    /// Emit only RMC and GGA, once per fix
    SelectSentences,
    QueryRelease,
}

impl Command {
    pub fn line(self) -> &'static str {
        match self {
            Command::Wake => "",
            Command::Standby => "$PMTK161,0*28",
            Command::FactoryReset => "$PMTK104*37",
            // GLL, RMC, VTG, GGA, GSA, GSV, 6-17 reserved, MCHN
            Command::SelectSentences => "$PMTK314,0,1,0,1,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0*28",
            Command::QueryRelease => "$PMTK605*31",
        }
    }

    /// Command number echoed in acknowledgments
    pub fn id(self) -> Option<u16> {
        match self {
            Command::Wake => None,
            Command::Standby => Some(STANDBY_COMMAND_ID),
            Command::FactoryReset => Some(104),
            Command::SelectSentences => Some(314),
            Command::QueryRelease => Some(605),
        }
    }
}

/// Status field of `$PMTK001`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AckStatus {
    InvalidCommand,
    Unsupported,
    Failed,
    Succeeded,
    Unknown(u8),
}

impl From<u8> for AckStatus {
    fn from(value: u8) -> Self {
        match value {
            0 => AckStatus::InvalidCommand,
            1 => AckStatus::Unsupported,
            2 => AckStatus::Failed,
            3 => AckStatus::Succeeded,
            other => AckStatus::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LifecycleState {
    Idle,
    Active,
    /// Standby sent, waiting for its acknowledgment
    EndingGraceful,
}

/// How the last session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShutdownReason {
    Acknowledged(AckStatus),
    LinkSilent,
    Ended,
}

/// Firmware identification from `$PMTK705`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FirmwareRelease {
    pub release: String,
    pub build: String,
}

#[derive(Debug)]
enum VendorSentence {
    Ack { command: u16, status: AckStatus },
    Version(FirmwareRelease),
}

/// Recognizes `$PMTK` replies in the decoder's field stream
#[derive(Debug, Default)]
struct PmtkLayer {
    kind: SentenceKind,
    command: u16,
    status: u8,
    firmware: FirmwareRelease,
    completed: Option<VendorSentence>,
}

impl SentenceHandler for PmtkLayer {
    fn field(&mut self, kind: SentenceKind, index: u8, text: &str) {
        if index == 0 {
            self.kind = match (kind, text) {
                (SentenceKind::Unrecognized, "PMTK001") => SentenceKind::Ack,
                (SentenceKind::Unrecognized, "PMTK705") => SentenceKind::Version,
                _ => kind,
            };
            self.command = 0;
            self.status = 0;
            self.firmware = FirmwareRelease::default();
            return;
        }

        match (self.kind, index) {
            (SentenceKind::Ack, 1) => {
                self.command = parse_integer(text).min(u32::from(u16::MAX)) as u16
            }
            (SentenceKind::Ack, 2) => self.status = parse_integer(text).min(u32::from(u8::MAX)) as u8,
            (SentenceKind::Version, 1) => self.firmware.release = text.to_string(),
            (SentenceKind::Version, 2) => self.firmware.build = text.to_string(),
            _ => {}
        }
    }

    fn sentence(&mut self, _kind: SentenceKind, valid: bool) {
        let kind = std::mem::take(&mut self.kind);
        if !valid {
            return;
        }
        self.completed = match kind {
            SentenceKind::Ack => Some(VendorSentence::Ack {
                command: self.command,
                status: AckStatus::from(self.status),
            }),
            SentenceKind::Version => Some(VendorSentence::Version(std::mem::take(&mut self.firmware))),
            _ => None,
        };
    }
}

pub struct Mt3339<T: Transport> {
    decoder: NmeaDecoder,
    pmtk: PmtkLayer,
    echo: LineEcho,
    transport: Option<T>,
    state: LifecycleState,
    grace: Duration,
    first_sentence_received: bool,
    last_command: Option<u16>,
    last_ack: Option<(u16, AckStatus)>,
    standby_requested_at: Option<DateTime<Utc>>,
    firmware: Option<FirmwareRelease>,
    last_shutdown: Option<ShutdownReason>,
}

impl<T: Transport> Mt3339<T> {
    /// `grace` is how long a pending standby waits on a silent link
    pub fn new(decoder: NmeaDecoder, grace: Duration) -> Self {
        Self {
            decoder,
            pmtk: PmtkLayer::default(),
            echo: LineEcho::new(),
            transport: None,
            state: LifecycleState::Idle,
            grace,
            first_sentence_received: false,
            last_command: None,
            last_ack: None,
            standby_requested_at: None,
            firmware: None,
            last_shutdown: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn fix(&self) -> &GpsFix {
        self.decoder.fix()
    }

    pub fn decoder(&self) -> &NmeaDecoder {
        &self.decoder
    }

    pub fn transport(&self) -> Option<&T> {
        self.transport.as_ref()
    }

    /// Id of the last command sent
    pub fn last_command(&self) -> Option<u16> {
        self.last_command
    }

    /// Last acknowledgment received, as (command, status)
    pub fn last_ack(&self) -> Option<(u16, AckStatus)> {
        self.last_ack
    }

    pub fn firmware(&self) -> Option<&FirmwareRelease> {
        self.firmware.as_ref()
    }

    pub fn last_shutdown(&self) -> Option<ShutdownReason> {
        self.last_shutdown
    }

    pub fn shutdown_requested(&self) -> bool {
        self.state == LifecycleState::EndingGraceful
    }

    /// Take over `transport` and wake the receiver
    pub fn begin(&mut self, transport: T) -> Result<()> {
        if self.state != LifecycleState::Idle {
            return Err(GpsError::State(format!("cannot begin while {:?}", self.state)));
        }

        self.transport = Some(transport);
        self.reset();
        self.state = LifecycleState::Active;
        self.last_command = None;
        self.last_ack = None;
        self.firmware = None;
        self.last_shutdown = None;
        info!("MT3339 session started");

        // Clears lingering garbage and leaves standby if the receiver is in it
        self.send(Command::Wake)
    }

    /// Drop decoder and sentence-selection state; the committed fix is kept
    pub fn reset(&mut self) {
        self.decoder.reset();
        self.pmtk = PmtkLayer::default();
        self.echo = LineEcho::new();
        self.first_sentence_received = false;
    }

    pub fn wake(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Idle => Err(GpsError::State("cannot wake an idle receiver".to_string())),
            LifecycleState::EndingGraceful => {
                debug!("wake ignored, standby pending");
                Ok(())
            }
            LifecycleState::Active => self.send(Command::Wake),
        }
    }

    /// Put the receiver in standby and end the session once it acknowledges
    pub fn standby(&mut self) -> Result<()> {
        match self.state {
            LifecycleState::Idle => Err(GpsError::State("no session to put in standby".to_string())),
            LifecycleState::EndingGraceful => {
                debug!("standby already pending");
                Ok(())
            }
            LifecycleState::Active => {
                let now = self.decoder.clock().now();
                let silent = self.link_silent(now);

                self.send(Command::Standby)?;

                if silent {
                    warn!("link silent, ending session without acknowledgment");
                    self.finalize(ShutdownReason::LinkSilent);
                } else {
                    self.standby_requested_at = Some(now);
                    self.state = LifecycleState::EndingGraceful;
                    debug!("standby requested");
                }
                Ok(())
            }
        }
    }

    /// Restore factory defaults. Sentence selection is sent again once the
    /// receiver starts talking.
    pub fn factory_reset(&mut self) -> Result<()> {
        if self.state != LifecycleState::Active {
            return Err(GpsError::State(format!("cannot factory reset while {:?}", self.state)));
        }
        self.reset();
        self.send(Command::FactoryReset)
    }

    /// Ask for the firmware release; the reply lands in `firmware()`
    pub fn query_release(&mut self) -> Result<()> {
        if self.state != LifecycleState::Active {
            return Err(GpsError::State(format!("cannot query release while {:?}", self.state)));
        }
        self.send(Command::QueryRelease)
    }

    /// Tear the session down immediately without telling the receiver
    pub fn end(&mut self) {
        if self.state != LifecycleState::Idle || self.transport.is_some() {
            self.finalize(ShutdownReason::Ended);
        }
    }

    /// Decode everything the transport has buffered. Returns the number of
    /// fixes committed.
    pub fn consume(&mut self) -> Result<usize> {
        let mut commits = 0;

        while self.transport.as_ref().is_some_and(|t| t.available()) {
            let Some(byte) = self.transport.as_mut().and_then(|t| t.read_byte()) else {
                break;
            };

            if let Some(line) = self.echo.push(byte) {
                trace!(target: "mt3339_gps::wire", "<- {}", line);
            }

            if let Some(outcome) = self.decoder.feed(byte, &mut self.pmtk) {
                if outcome.committed {
                    commits += 1;
                }
                self.on_sentence(outcome)?;
            }
        }

        Ok(commits)
    }

    /// Give up on a pending standby once the link has been quiet for the
    /// grace window. Returns true if the session was ended.
    pub fn check_link(&mut self) -> bool {
        if self.state != LifecycleState::EndingGraceful {
            return false;
        }

        let now = self.decoder.clock().now();
        if self.link_silent(now) {
            warn!("no standby acknowledgment within grace window");
            self.finalize(ShutdownReason::LinkSilent);
            return true;
        }
        false
    }

    fn link_silent(&self, now: DateTime<Utc>) -> bool {
        let reference = match (self.decoder.fix().last_update, self.standby_requested_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        reference.is_some_and(|since| now.signed_duration_since(since) > self.grace)
    }

    fn on_sentence(&mut self, outcome: SentenceOutcome) -> Result<()> {
        match self.pmtk.completed.take() {
            Some(VendorSentence::Ack { command, status }) => {
                self.on_ack(command, status);
                return Ok(());
            }
            Some(VendorSentence::Version(firmware)) => {
                info!(release = %firmware.release, build = %firmware.build, "firmware release");
                self.firmware = Some(firmware);
            }
            None => {}
        }

        if outcome.valid && self.state == LifecycleState::Active && !self.first_sentence_received {
            self.first_sentence_received = true;
            self.send(Command::SelectSentences)?;
        }
        Ok(())
    }

    fn on_ack(&mut self, command: u16, status: AckStatus) {
        self.last_ack = Some((command, status));

        if command == STANDBY_COMMAND_ID {
            // A refused standby still ends the session
            if status != AckStatus::Succeeded {
                warn!(?status, "standby not acknowledged as successful");
            }
            self.finalize(ShutdownReason::Acknowledged(status));
        } else if status == AckStatus::Succeeded {
            debug!(command, "command acknowledged");
        } else {
            warn!(command, ?status, "command rejected");
        }
    }

    fn finalize(&mut self, reason: ShutdownReason) {
        self.decoder.clear();
        self.pmtk = PmtkLayer::default();
        self.first_sentence_received = false;
        self.standby_requested_at = None;
        self.state = LifecycleState::Idle;
        self.last_shutdown = Some(reason);
        self.transport = None;
        info!(?reason, "MT3339 session ended");
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| GpsError::State("transport released".to_string()))?;
        transport.write_line(command.line())?;

        if let Some(id) = command.id() {
            self.last_command = Some(id);
        }
        debug!(?command, "command sent");
        Ok(())
    }
}

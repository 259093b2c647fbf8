// src/gps/data.rs
//! Fix data structures and unit conversions

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

pub const FEET_PER_CENTIMETER: f64 = 0.032_808_4;
pub const MILES_PER_HOUR_PER_KNOT: f64 = 1.150_779_45;
pub const METERS_PER_SECOND_PER_KNOT: f64 = 0.514_444_44;
pub const KILOMETERS_PER_HOUR_PER_KNOT: f64 = 1.852;

/// Values decoded from sentences that have not been committed yet.
///
/// RMC and GGA each carry their own time of day; a fix is only committed
/// once both agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProvisionalFix {
    pub date: u32,
    pub rmc_time: Option<u32>,
    pub gga_time: Option<u32>,
    pub latitude: i32,
    pub longitude: i32,
    pub altitude: i32,
    pub course: u32,
    pub speed: u32,
    pub satellites: u8,
    pub hdop: u32,
}

/// Last committed fix
///
/// All values are scaled integers; the `f_*` accessors convert them.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsFix {
    /// When the fix was committed, `None` until the first commit
    pub last_update: Option<DateTime<Utc>>,
    /// DDMMYY
    pub date: u32,
    /// HHMMSSmmm
    pub time: u32,
    /// Millionths of a degree
    pub latitude: i32,
    /// Millionths of a degree
    pub longitude: i32,
    /// Centimeters
    pub altitude: i32,
    /// Hundredths of a degree
    pub course: u32,
    /// Hundredths of a knot
    pub speed: u32,
    pub satellites: u8,
    /// Hundredths
    pub hdop: u32,
}

impl GpsFix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data is not meaningful until the first commit
    pub fn is_valid(&self) -> bool {
        self.last_update.is_some()
    }

    /// Copy date and time only
    pub(crate) fn commit_time(&mut self, provisional: &ProvisionalFix, time: u32, now: DateTime<Utc>) {
        self.date = provisional.date;
        self.time = time;
        self.last_update = Some(now);
    }

    /// Copy every field at once
    pub(crate) fn commit_full(&mut self, provisional: &ProvisionalFix, time: u32, now: DateTime<Utc>) {
        *self = Self {
            last_update: Some(now),
            date: provisional.date,
            time,
            latitude: provisional.latitude,
            longitude: provisional.longitude,
            altitude: provisional.altitude,
            course: provisional.course,
            speed: provisional.speed,
            satellites: provisional.satellites,
            hdop: provisional.hdop,
        };
    }

    /// Seconds since the last commit
    pub fn age_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_update
            .map(|ts| now.signed_duration_since(ts).num_seconds())
    }

    /// Calendar date and time of the fix as reported by the receiver
    pub fn datetime(&self) -> Option<NaiveDateTime> {
        let day = self.date / 10_000;
        let month = (self.date / 100) % 100;
        let year = 2000 + (self.date % 100) as i32;

        let millis = self.time % 1000;
        let seconds = (self.time / 1000) % 100;
        let minutes = (self.time / 100_000) % 100;
        let hours = self.time / 10_000_000;

        NaiveDate::from_ymd_opt(year, month, day)?.and_hms_milli_opt(hours, minutes, seconds, millis)
    }

    pub fn f_latitude(&self) -> f64 {
        f64::from(self.latitude) / 1_000_000.0
    }

    pub fn f_longitude(&self) -> f64 {
        f64::from(self.longitude) / 1_000_000.0
    }

    /// Meters
    pub fn f_altitude(&self) -> f64 {
        f64::from(self.altitude) / 100.0
    }

    pub fn f_altitude_ft(&self) -> f64 {
        f64::from(self.altitude) * FEET_PER_CENTIMETER
    }

    /// Degrees
    pub fn f_course(&self) -> f64 {
        f64::from(self.course) / 100.0
    }

    /// Knots
    pub fn f_speed(&self) -> f64 {
        f64::from(self.speed) / 100.0
    }

    pub fn f_speed_mph(&self) -> f64 {
        self.f_speed() * MILES_PER_HOUR_PER_KNOT
    }

    pub fn f_speed_mps(&self) -> f64 {
        self.f_speed() * METERS_PER_SECOND_PER_KNOT
    }

    pub fn f_speed_kmph(&self) -> f64 {
        self.f_speed() * KILOMETERS_PER_HOUR_PER_KNOT
    }

    pub fn f_hdop(&self) -> f64 {
        f64::from(self.hdop) / 100.0
    }
}

impl fmt::Display for GpsFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GPS::V={},U={},D={:06},T={:09},LA={:.6},LO={:.6},A={:.2},C={:.2},SP={:.2},SA={},H={:.2}",
            if self.is_valid() { "t" } else { "f" },
            self.last_update
                .map(|ts| ts.to_rfc3339())
                .unwrap_or_else(|| "-".to_string()),
            self.date,
            self.time,
            self.f_latitude(),
            self.f_longitude(),
            self.f_altitude(),
            self.f_course(),
            self.f_speed(),
            self.satellites,
            self.f_hdop(),
        )
    }
}

/// NMEA 0183 fix tracker.
///
/// Consumes raw GPS UART bytes in whatever chunks the driver hands over,
/// reassembles sentences, and keeps the latest position and time fix.
///
/// Only two sentence formatters matter:
/// - **GGA**: position and fix quality
/// - **RMC**: UTC time and date, used to set the wall clock
///
/// Every other sentence is counted as GPS activity and otherwise ignored.
/// Nothing here fails loudly: GPS dropouts and torn reads are routine, so a
/// bad sentence simply means "no update".
use core::fmt;

use nmea0183::{ParseResult, Parser, GGA, RMC};

use crate::comm::{trim_trailing_whitespace, LineReader};
use crate::defaults::NMEA_LINE_LEN;

/// UTC calendar timestamp decoded from an RMC sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DateTime {
    /// Build a timestamp, rejecting out-of-range fields.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Option<Self> {
        if !(1..=12).contains(&month) || day == 0 || day > days_in_month(year, month) {
            return None;
        }
        // 60 allows a leap second
        if hour > 23 || minute > 59 || second > 60 {
            return None;
        }
        Some(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    /// Seconds since 1970-01-01T00:00:00Z.
    pub fn unix_timestamp(&self) -> i64 {
        let days = days_from_civil(self.year as i64, self.month as i64, self.day as i64);
        days * 86_400 + self.hour as i64 * 3600 + self.minute as i64 * 60 + self.second as i64
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Days since the Unix epoch for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Latest GPS fix as seen by the tracker.
///
/// `latitude`/`longitude` keep their last good values when the fix drops,
/// so readers must go through [`FixState::position`], which hides them
/// while `valid` is false.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixState {
    pub latitude: f64,
    pub longitude: f64,
    pub valid: bool,
    pub satellites: u8,
    pub time: Option<DateTime>,
    /// Checksum-valid sentences accepted since boot
    pub sentences: u32,
}

impl FixState {
    pub const fn new() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            valid: false,
            satellites: 0,
            time: None,
            sentences: 0,
        }
    }

    /// Current position, or `None` without a valid fix.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.valid.then_some((self.latitude, self.longitude))
    }

    /// Whether the receiver has produced any sentence at all.
    pub fn has_data(&self) -> bool {
        self.sentences > 0
    }
}

impl Default for FixState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a single [`FixTracker::feed`] call changed.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeedSummary {
    /// Sentences accepted (checksum valid)
    pub accepted: u16,
    /// Lines discarded as fragments or corrupt
    pub rejected: u16,
    /// A GGA sentence was processed (fix may have become valid or invalid)
    pub position: bool,
    /// Time decoded from an RMC sentence in this chunk
    pub time: Option<DateTime>,
}

/// Reactive NMEA tracker: no thread, no I/O, just bytes in and fix state out.
///
/// Framing goes through [`LineReader`]; each complete line is then handed to
/// the `nmea0183` parser, which checks the checksum and decodes the fields.
pub struct FixTracker {
    reader: LineReader<NMEA_LINE_LEN>,
    parser: Parser,
    fix: FixState,
}

impl FixTracker {
    pub fn new() -> Self {
        Self {
            reader: LineReader::new(),
            parser: Parser::new(),
            fix: FixState::new(),
        }
    }

    /// Snapshot of the current fix.
    pub fn fix(&self) -> FixState {
        self.fix
    }

    /// Feed a chunk of raw UART bytes. Partial trailing sentences are held
    /// until the rest arrives.
    pub fn feed(&mut self, bytes: &[u8]) -> FeedSummary {
        let mut summary = FeedSummary::default();
        for &byte in bytes {
            // `$` always starts a sentence; whatever was pending is a torn fragment
            if byte == b'$' && self.reader.discard() {
                log::debug!("NMEA fragment dropped on resync");
                summary.rejected = summary.rejected.saturating_add(1);
            }
            if let Some(line) = self.reader.feed(byte) {
                apply_line(&mut self.parser, &mut self.fix, line, &mut summary);
            }
        }
        summary
    }
}

impl Default for FixTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_line(parser: &mut Parser, fix: &mut FixState, line: &[u8], summary: &mut FeedSummary) {
    let line = trim_trailing_whitespace(line);
    // Lines without a checksum delimiter are torn reads and never parsed.
    if !line.starts_with(b"$") || !line.contains(&b'*') {
        log::debug!("NMEA line discarded ({} bytes)", line.len());
        summary.rejected = summary.rejected.saturating_add(1);
        return;
    }
    let is_gga = line.get(3..6) == Some(&b"GGA"[..]);

    let mut parsed = None;
    for &byte in line.iter().chain(b"\r\n") {
        if let Some(result) = parser.parse_from_byte(byte) {
            parsed = Some(result);
        }
    }

    match parsed {
        Some(Ok(result)) => {
            summary.accepted = summary.accepted.saturating_add(1);
            fix.sentences = fix.sentences.saturating_add(1);
            match result {
                ParseResult::GGA(gga) => {
                    apply_gga(fix, gga.as_ref(), has_fix_quality(line));
                    summary.position = true;
                }
                ParseResult::RMC(Some(rmc)) => {
                    if let Some(time) = rmc_time(&rmc) {
                        fix.time = Some(time);
                        summary.time = Some(time);
                    }
                }
                _ => {}
            }
        }
        Some(Err(err)) => {
            log::debug!("NMEA sentence rejected: {:?}", err);
            summary.rejected = summary.rejected.saturating_add(1);
            // A GGA we cannot read is a GGA without a usable fix
            if is_gga {
                fix.valid = false;
                summary.position = true;
            }
        }
        None => summary.rejected = summary.rejected.saturating_add(1),
    }
}

/// GGA field 6 is the fix quality; `0` means no fix even when the receiver
/// still repeats stale coordinates.
fn has_fix_quality(line: &[u8]) -> bool {
    matches!(line.split(|b| *b == b',').nth(6), Some(q) if !q.is_empty() && q != b"0")
}

fn apply_gga(fix: &mut FixState, gga: Option<&GGA>, has_quality: bool) {
    match gga {
        Some(gga) if has_quality => {
            fix.latitude = gga.latitude.as_f64();
            fix.longitude = gga.longitude.as_f64();
            fix.valid = true;
            fix.satellites = gga.sat_in_use;
        }
        // Coordinates stay as they were; `valid` hides them.
        _ => fix.valid = false,
    }
}

/// RMC carries a two-digit year; 80..=99 are 19xx, the rest 20xx.
fn rmc_time(rmc: &RMC) -> Option<DateTime> {
    let date = &rmc.datetime.date;
    let time = &rmc.datetime.time;
    let yy = date.year % 100;
    let year = if yy >= 80 { 1900 + yy } else { 2000 + yy };
    DateTime::new(year, date.month, date.day, time.hours, time.minutes, time.seconds as u8)
}

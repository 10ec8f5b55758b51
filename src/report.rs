/// Ranking and report building.
///
/// Turns the frozen AP records of a cycle plus a GPS snapshot into ordered
/// rows for whatever renders them (console table, NDJSON, a display).
/// Pure: no I/O, no logging.
use core::cmp::Reverse;
use core::fmt;

use heapless::{String, Vec};

use crate::cycle::ApRecord;
use crate::nmea::{DateTime, FixState};
use crate::protocol::MacString;

/// Radio band inferred from the channel number alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Ghz2_4,
    Ghz5,
    Ghz6,
    Unknown,
}

impl Band {
    /// 1–14 is 2.4 GHz, 36–165 is 5 GHz, anything else up to 233 is 6 GHz.
    pub fn from_channel(channel: u8) -> Self {
        match channel {
            1..=14 => Band::Ghz2_4,
            36..=165 => Band::Ghz5,
            1..=233 => Band::Ghz6,
            _ => Band::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Ghz2_4 => "2.4G",
            Band::Ghz5 => "5G",
            Band::Ghz6 => "6G",
            Band::Unknown => "???",
        }
    }
}

/// Security class reported by the active scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    Open,
    Wep,
    Wpa,
    Wpa2,
    WpaWpa2,
    Wpa3,
    Wpa2Wpa3,
    /// Anything the driver reports outside the classes above (WAPI, OWE, …)
    Unknown,
}

impl Security {
    pub fn as_str(&self) -> &'static str {
        match self {
            Security::Open => "OPEN",
            Security::Wep => "WEP",
            Security::Wpa => "WPA",
            Security::Wpa2 => "WPA2",
            Security::WpaWpa2 => "WPA/WPA2",
            Security::Wpa3 => "WPA3",
            Security::Wpa2Wpa3 => "WPA2/WPA3",
            Security::Unknown => "UNKNOWN",
        }
    }
}

/// GPS columns of a report row. Stale coordinates never make it in here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixField {
    Position { lat: f64, lon: f64 },
    /// Receiver is talking but has no position solution
    NoFix,
    /// Nothing heard from the receiver yet
    NoData,
}

impl FixField {
    pub fn from_state(fix: &FixState) -> Self {
        match fix.position() {
            Some((lat, lon)) => FixField::Position { lat, lon },
            None if fix.has_data() => FixField::NoFix,
            None => FixField::NoData,
        }
    }

    /// Wire label used in NDJSON messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FixField::Position { .. } => "fix",
            FixField::NoFix => "no_fix",
            FixField::NoData => "no_data",
        }
    }

    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match *self {
            FixField::Position { lat, lon } => Some((lat, lon)),
            _ => None,
        }
    }
}

impl fmt::Display for FixField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixField::Position { lat, lon } => write!(f, "{lat:.6},{lon:.6}"),
            FixField::NoFix => f.write_str("no fix"),
            FixField::NoData => f.write_str("no data"),
        }
    }
}

/// One access point in a cycle report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub ssid: String<32>,
    pub bssid: [u8; 6],
    pub band: Band,
    pub channel: u8,
    pub rssi: i8,
    pub security: Security,
    pub clients: u8,
    pub fix: FixField,
    pub time: Option<DateTime>,
}

/// Everything a reporter needs to render one discovery cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Report<const N: usize> {
    pub cycle: u32,
    pub rows: Vec<ReportRow, N>,
    pub fix: FixField,
    pub time: Option<DateTime>,
    /// The active scan failed; `rows` is empty
    pub scan_failed: bool,
}

impl<const N: usize> Report<N> {
    /// Report with no rows, e.g. after a failed scan.
    pub fn empty(cycle: u32, fix: &FixState, scan_failed: bool) -> Self {
        Self {
            cycle,
            rows: Vec::new(),
            fix: FixField::from_state(fix),
            time: fix.time,
            scan_failed,
        }
    }

    pub fn total_clients(&self) -> u16 {
        self.rows.iter().map(|r| r.clients as u16).sum()
    }
}

/// Build the report for a cycle.
///
/// With `sort_by_rssi`, rows are ordered strongest first; equal signal
/// strengths keep their scan order.
pub fn build<const N: usize>(
    cycle: u32,
    records: &[ApRecord],
    fix: &FixState,
    sort_by_rssi: bool,
) -> Report<N> {
    let mut order: Vec<&ApRecord, N> = records.iter().take(N).collect();
    if sort_by_rssi {
        order.sort_unstable_by_key(|r| (Reverse(r.rssi), r.scan_order));
    }

    let mut report = Report::empty(cycle, fix, false);
    for record in order {
        let _ = report.rows.push(ReportRow {
            ssid: record.ssid.clone(),
            bssid: record.bssid,
            band: Band::from_channel(record.channel),
            channel: record.channel,
            rssi: record.rssi,
            security: record.security,
            clients: record.clients,
            fix: report.fix,
            time: report.time,
        });
    }
    report
}

/// Format a 6-byte MAC address into "AA:BB:CC:DD:EE:FF" string
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u8, rssi: i8, channel: u8) -> ApRecord {
        ApRecord {
            bssid: [0x10, 0, 0, 0, 0, n],
            ssid: String::try_from("net").unwrap(),
            channel,
            rssi,
            security: Security::Wpa2,
            clients: n,
            scan_order: n,
        }
    }

    fn valid_fix() -> FixState {
        FixState {
            latitude: 48.1173,
            longitude: 11.516_667,
            valid: true,
            satellites: 8,
            time: DateTime::new(2026, 10, 17, 12, 0, 0),
            sentences: 2,
        }
    }

    // ── Ranking ──────────────────────────────────────────────────────

    #[test]
    fn sorted_rows_are_non_increasing_in_rssi() {
        let records = [
            record(0, -70, 1),
            record(1, -40, 6),
            record(2, -90, 11),
            record(3, -55, 36),
        ];
        let report: Report<8> = build(1, &records, &FixState::new(), true);
        let rssi: heapless::Vec<i8, 8> = report.rows.iter().map(|r| r.rssi).collect();
        assert_eq!(rssi.as_slice(), &[-40, -55, -70, -90]);
    }

    #[test]
    fn equal_rssi_keeps_scan_order() {
        let records = [
            record(0, -60, 1),
            record(1, -50, 6),
            record(2, -60, 11),
            record(3, -60, 36),
        ];
        let report: Report<8> = build(1, &records, &FixState::new(), true);
        let order: heapless::Vec<u8, 8> = report.rows.iter().map(|r| r.bssid[5]).collect();
        assert_eq!(order.as_slice(), &[1, 0, 2, 3]);
    }

    #[test]
    fn unsorted_report_keeps_scan_order() {
        let records = [record(0, -90, 1), record(1, -20, 6)];
        let report: Report<8> = build(1, &records, &FixState::new(), false);
        assert_eq!(report.rows[0].bssid[5], 0);
        assert_eq!(report.rows[1].bssid[5], 1);
    }

    #[test]
    fn rows_carry_counts_and_labels() {
        let records = [record(3, -60, 149)];
        let report: Report<4> = build(5, &records, &FixState::new(), true);
        let row = &report.rows[0];
        assert_eq!(report.cycle, 5);
        assert_eq!(row.clients, 3);
        assert_eq!(row.band, Band::Ghz5);
        assert_eq!(row.security.as_str(), "WPA2");
        assert_eq!(report.total_clients(), 3);
    }

    #[test]
    fn rows_beyond_capacity_are_dropped() {
        let records = [record(0, -90, 1), record(1, -20, 6), record(2, -10, 11)];
        let report: Report<2> = build(1, &records, &FixState::new(), true);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].bssid[5], 1);
    }

    // ── Fix columns ──────────────────────────────────────────────────

    #[test]
    fn valid_fix_is_joined_into_every_row() {
        let records = [record(0, -50, 1), record(1, -60, 6)];
        let report: Report<4> = build(1, &records, &valid_fix(), true);
        for row in &report.rows {
            let (lat, lon) = row.fix.coordinates().unwrap();
            assert!((lat - 48.1173).abs() < 1e-9);
            assert!((lon - 11.516_667).abs() < 1e-9);
            assert_eq!(row.time.map(|t| t.year), Some(2026));
        }
    }

    #[test]
    fn invalid_fix_never_exposes_stale_coordinates() {
        let mut fix = valid_fix();
        fix.valid = false;
        let report: Report<4> = build(1, &[record(0, -50, 1)], &fix, true);
        assert_eq!(report.rows[0].fix, FixField::NoFix);
        assert!(report.fix.coordinates().is_none());
    }

    #[test]
    fn silent_receiver_reports_no_data() {
        let report: Report<4> = Report::empty(1, &FixState::new(), true);
        assert_eq!(report.fix, FixField::NoData);
        assert!(report.scan_failed);
        assert!(report.rows.is_empty());
    }

    #[test]
    fn fix_field_display() {
        let mut s: heapless::String<32> = heapless::String::new();
        core::fmt::write(&mut s, format_args!("{}", FixField::Position { lat: -1.5, lon: 2.25 }))
            .unwrap();
        assert_eq!(s.as_str(), "-1.500000,2.250000");

        s.clear();
        core::fmt::write(&mut s, format_args!("{}", FixField::NoFix)).unwrap();
        assert_eq!(s.as_str(), "no fix");
    }

    // ── Labels ───────────────────────────────────────────────────────

    #[test]
    fn band_from_channel() {
        assert_eq!(Band::from_channel(1), Band::Ghz2_4);
        assert_eq!(Band::from_channel(14), Band::Ghz2_4);
        assert_eq!(Band::from_channel(36), Band::Ghz5);
        assert_eq!(Band::from_channel(165), Band::Ghz5);
        assert_eq!(Band::from_channel(20), Band::Ghz6);
        assert_eq!(Band::from_channel(233), Band::Ghz6);
        assert_eq!(Band::from_channel(0), Band::Unknown);
        assert_eq!(Band::from_channel(234), Band::Unknown);
    }

    #[test]
    fn format_mac_uppercase_colon_separated() {
        let mut buf = MacString::new();
        format_mac(&[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01], &mut buf);
        assert_eq!(buf.as_str(), "AA:BB:CC:DD:EE:01");
    }
}

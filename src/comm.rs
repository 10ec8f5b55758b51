/// Communication layer: serial NDJSON transport.
///
/// The device streams cycle reports as newline-delimited JSON over the
/// serial console and accepts one JSON command per line in return.
use core::fmt::Write;
use core::time::Duration;

use crate::cycle::CycleConfig;
use crate::protocol::{DeviceMessage, HostCommand, MacString, RawCommand, TimeString};
use crate::report::{format_mac, Report, ReportRow};

/// Accepted range for the per-AP capture dwell
pub const CAPTURE_MS_RANGE: (u32, u32) = (100, 60_000);

/// Accepted range for the inter-cycle idle wait
pub const IDLE_MS_RANGE: (u32, u32) = (0, 3_600_000);

/// Accepted range for the post-tune settle wait
pub const SETTLE_MS_RANGE: (u32, u32) = (0, 1_000);

// ── Serialization helpers ──────────────────────────────────────────────

/// Serialize a DeviceMessage to JSON bytes and write to the output buffer.
/// Returns the number of bytes written, or None if serialization failed.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    match serde_json_core::to_slice(msg, buf) {
        Ok(len) => {
            // Append newline for NDJSON
            if len < buf.len() {
                buf[len] = b'\n';
                Some(len + 1)
            } else {
                Some(len)
            }
        }
        Err(_) => None,
    }
}

/// Serialize one report row as an `ap` message.
pub fn serialize_row(cycle: u32, row: &ReportRow, buf: &mut [u8]) -> Option<usize> {
    let mut bssid = MacString::new();
    format_mac(&row.bssid, &mut bssid);
    let time = row.time.map(format_time);
    let coords = row.fix.coordinates();

    let msg = DeviceMessage::Ap {
        cycle,
        ssid: row.ssid.as_str(),
        bssid: &bssid,
        band: row.band.as_str(),
        ch: row.channel,
        rssi: row.rssi,
        sec: row.security.as_str(),
        clients: row.clients,
        gps: row.fix.as_str(),
        lat: coords.map(|c| c.0),
        lon: coords.map(|c| c.1),
        time: time.as_ref(),
    };
    serialize_message(&msg, buf)
}

/// Serialize the end-of-cycle `cycle` message.
pub fn serialize_summary<const N: usize>(report: &Report<N>, buf: &mut [u8]) -> Option<usize> {
    let time = report.time.map(format_time);
    let coords = report.fix.coordinates();

    let msg = DeviceMessage::Cycle {
        cycle: report.cycle,
        aps: u8::try_from(report.rows.len()).unwrap_or(u8::MAX),
        clients: report.total_clients(),
        scan_failed: report.scan_failed,
        gps: report.fix.as_str(),
        lat: coords.map(|c| c.0),
        lon: coords.map(|c| c.1),
        time: time.as_ref(),
    };
    serialize_message(&msg, buf)
}

fn format_time(time: crate::nmea::DateTime) -> TimeString {
    let mut s = TimeString::new();
    let _ = write!(s, "{time}");
    s
}

// ── Host commands ──────────────────────────────────────────────────────

/// Deserialize a HostCommand from a JSON byte slice.
pub fn parse_command(data: &[u8]) -> Option<HostCommand> {
    // Strip trailing newline/whitespace
    let trimmed = trim_trailing_whitespace(data);
    if trimmed.is_empty() {
        return None;
    }
    let (raw, _) = serde_json_core::from_slice::<RawCommand>(trimmed).ok()?;
    let cmd = match raw.cmd.as_str() {
        "start" => HostCommand::Start,
        "stop" => HostCommand::Stop,
        "status" => HostCommand::GetStatus,
        "capture" => HostCommand::SetCapture { ms: raw.ms? },
        "idle" => HostCommand::SetIdle { ms: raw.ms? },
        "settle" => HostCommand::SetSettle { ms: raw.ms? },
        "retain" => HostCommand::SetRetain {
            enabled: raw.enabled?,
        },
        "sort" => HostCommand::SetSort {
            enabled: raw.enabled?,
        },
        "clear" => HostCommand::ClearClients,
        _ => return None,
    };
    Some(cmd)
}

/// What the caller still has to do after [`handle_command`] updated the config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    /// Config updated, nothing else to do
    Configured,
    /// Drop retained station sets
    ClearClients,
    /// Emit a status message
    ReportStatus,
}

/// Process a received host command and update config accordingly.
pub fn handle_command(cmd: &HostCommand, config: &mut CycleConfig) -> CommandAction {
    match *cmd {
        HostCommand::Start => {
            config.running = true;
            log::info!("Discovery started by host command");
        }
        HostCommand::Stop => {
            config.running = false;
            log::info!("Discovery paused by host command");
        }
        HostCommand::GetStatus => return CommandAction::ReportStatus,
        HostCommand::SetCapture { ms } => {
            let ms = clamp(ms, CAPTURE_MS_RANGE);
            config.capture = Duration::from_millis(ms as u64);
            log::info!("Capture dwell set to {} ms", ms);
        }
        HostCommand::SetIdle { ms } => {
            let ms = clamp(ms, IDLE_MS_RANGE);
            config.idle = Duration::from_millis(ms as u64);
            log::info!("Idle wait set to {} ms", ms);
        }
        HostCommand::SetSettle { ms } => {
            let ms = clamp(ms, SETTLE_MS_RANGE);
            config.settle = Duration::from_millis(ms as u64);
            log::info!("Settle wait set to {} ms", ms);
        }
        HostCommand::SetRetain { enabled } => {
            config.retain_clients = enabled;
            log::info!("Client retention {}", if enabled { "on" } else { "off" });
        }
        HostCommand::SetSort { enabled } => {
            config.sort_by_rssi = enabled;
            log::info!("RSSI ranking {}", if enabled { "on" } else { "off" });
        }
        HostCommand::ClearClients => return CommandAction::ClearClients,
    }
    CommandAction::Configured
}

fn clamp(value: u32, (min, max): (u32, u32)) -> u32 {
    value.clamp(min, max)
}

// ── Line reader ────────────────────────────────────────────────────────

/// Byte-at-a-time line assembler for serial input.
/// Accumulates bytes until a CR or LF is found, then yields the line.
/// Lines longer than `N` are dropped whole.
pub struct LineReader<const N: usize> {
    buf: [u8; N],
    pos: usize,
    overflowed: bool,
}

impl<const N: usize> LineReader<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            pos: 0,
            overflowed: false,
        }
    }

    /// Feed a byte into the reader. Returns a complete line (without newline)
    /// when one is detected.
    pub fn feed(&mut self, byte: u8) -> Option<&[u8]> {
        if byte == b'\n' || byte == b'\r' {
            let complete = self.pos > 0 && !self.overflowed;
            let len = self.pos;
            self.pos = 0;
            self.overflowed = false;
            if complete {
                Some(&self.buf[..len])
            } else {
                None
            }
        } else if self.overflowed {
            None
        } else if self.pos < N {
            self.buf[self.pos] = byte;
            self.pos += 1;
            None
        } else {
            // Overflow: discard the rest of this line
            self.overflowed = true;
            self.pos = 0;
            None
        }
    }

    /// Drop any partially assembled line. Returns true if bytes were lost.
    pub fn discard(&mut self) -> bool {
        let dropped = self.pos > 0;
        self.pos = 0;
        self.overflowed = false;
        dropped
    }
}

impl<const N: usize> Default for LineReader<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn trim_trailing_whitespace(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    while end > 0 && data[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nmea::{DateTime, FixState};
    use crate::report::{Band, FixField, Security};

    fn row(fix: FixField) -> ReportRow {
        ReportRow {
            ssid: heapless::String::try_from("Lab").unwrap(),
            bssid: [0x11, 0x22, 0x33, 0x44, 0x55, 0x66],
            band: Band::Ghz2_4,
            channel: 11,
            rssi: -48,
            security: Security::Wpa2Wpa3,
            clients: 2,
            fix,
            time: DateTime::new(2026, 10, 17, 8, 30, 0),
        }
    }

    // ── parse_command ───────────────────────────────────────────────

    #[test]
    fn parse_simple_commands() {
        assert_eq!(parse_command(br#"{"cmd":"start"}"#), Some(HostCommand::Start));
        assert_eq!(parse_command(br#"{"cmd":"stop"}"#), Some(HostCommand::Stop));
        assert_eq!(parse_command(br#"{"cmd":"status"}"#), Some(HostCommand::GetStatus));
        assert_eq!(parse_command(br#"{"cmd":"clear"}"#), Some(HostCommand::ClearClients));
    }

    #[test]
    fn parse_commands_with_arguments() {
        assert_eq!(
            parse_command(br#"{"cmd":"capture","ms":1500}"#),
            Some(HostCommand::SetCapture { ms: 1500 })
        );
        assert_eq!(
            parse_command(br#"{"cmd":"retain","enabled":true}"#),
            Some(HostCommand::SetRetain { enabled: true })
        );
        assert_eq!(
            parse_command(b"{\"cmd\":\"sort\",\"enabled\":false}\r\n"),
            Some(HostCommand::SetSort { enabled: false })
        );
    }

    #[test]
    fn parse_rejects_missing_argument_and_unknown() {
        assert_eq!(parse_command(br#"{"cmd":"capture"}"#), None);
        assert_eq!(parse_command(br#"{"cmd":"selfdestruct"}"#), None);
        assert_eq!(parse_command(b"not json"), None);
        assert_eq!(parse_command(b"  \r\n"), None);
    }

    // ── handle_command ──────────────────────────────────────────────

    #[test]
    fn handle_updates_config() {
        let mut config = CycleConfig::new();

        assert_eq!(
            handle_command(&HostCommand::SetCapture { ms: 1500 }, &mut config),
            CommandAction::Configured
        );
        assert_eq!(config.capture, Duration::from_millis(1500));

        handle_command(&HostCommand::Stop, &mut config);
        assert!(!config.running);
        handle_command(&HostCommand::Start, &mut config);
        assert!(config.running);

        handle_command(&HostCommand::SetRetain { enabled: true }, &mut config);
        assert!(config.retain_clients);
    }

    #[test]
    fn handle_clamps_out_of_range_values() {
        let mut config = CycleConfig::new();
        handle_command(&HostCommand::SetCapture { ms: 0 }, &mut config);
        assert_eq!(config.capture, Duration::from_millis(100));
        handle_command(&HostCommand::SetSettle { ms: 99_999 }, &mut config);
        assert_eq!(config.settle, Duration::from_millis(1_000));
    }

    #[test]
    fn handle_reports_side_effects() {
        let mut config = CycleConfig::new();
        assert_eq!(
            handle_command(&HostCommand::GetStatus, &mut config),
            CommandAction::ReportStatus
        );
        assert_eq!(
            handle_command(&HostCommand::ClearClients, &mut config),
            CommandAction::ClearClients
        );
    }

    // ── Report serialization ────────────────────────────────────────

    #[test]
    fn serialize_row_with_position() {
        let mut buf = [0u8; 512];
        let len = serialize_row(4, &row(FixField::Position { lat: 1.5, lon: -2.5 }), &mut buf)
            .unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.ends_with('\n'));
        assert!(json.contains(r#""type":"ap""#));
        assert!(json.contains(r#""cycle":4"#));
        assert!(json.contains(r#""bssid":"11:22:33:44:55:66""#));
        assert!(json.contains(r#""sec":"WPA2/WPA3""#));
        assert!(json.contains(r#""gps":"fix""#));
        assert!(json.contains(r#""lat":1.5"#));
        assert!(json.contains(r#""time":"2026-10-17T08:30:00Z""#));
    }

    #[test]
    fn serialize_row_without_fix() {
        let mut buf = [0u8; 512];
        let len = serialize_row(1, &row(FixField::NoData), &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""gps":"no_data""#));
        assert!(!json.contains("lat"));
    }

    #[test]
    fn serialize_summary_of_failed_scan() {
        let report: Report<4> = Report::empty(9, &FixState::new(), true);
        let mut buf = [0u8; 256];
        let len = serialize_summary(&report, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""type":"cycle""#));
        assert!(json.contains(r#""aps":0"#));
        assert!(json.contains(r#""scan_failed":true"#));
    }

    #[test]
    fn summary_ap_count_saturates_at_u8() {
        let mut report: Report<300> = Report::empty(1, &FixState::new(), false);
        for _ in 0..300 {
            report.rows.push(row(FixField::NoData)).unwrap();
        }
        let mut buf = [0u8; 256];
        let len = serialize_summary(&report, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(json.contains(r#""aps":255"#));
    }

    // ── LineReader ──────────────────────────────────────────────────

    #[test]
    fn line_reader_splits_on_crlf() {
        let mut lr: LineReader<16> = LineReader::new();
        let mut lines = 0;
        for &b in b"ab\r\ncd\n" {
            if let Some(line) = lr.feed(b) {
                lines += 1;
                assert!(line == b"ab" || line == b"cd");
            }
        }
        assert_eq!(lines, 2);
    }

    #[test]
    fn line_reader_drops_overlong_line_whole() {
        let mut lr: LineReader<4> = LineReader::new();
        for &b in b"toolong" {
            assert!(lr.feed(b).is_none());
        }
        assert!(lr.feed(b'\n').is_none());
        for &b in b"ok" {
            lr.feed(b);
        }
        assert_eq!(lr.feed(b'\n'), Some(&b"ok"[..]));
    }

    #[test]
    fn line_reader_discard_restarts_partial_line() {
        let mut lr: LineReader<16> = LineReader::new();
        assert!(!lr.discard());
        for &b in b"torn" {
            lr.feed(b);
        }
        assert!(lr.discard());
        for &b in b"next" {
            lr.feed(b);
        }
        assert_eq!(lr.feed(b'\n'), Some(&b"next"[..]));
    }
}

/// JSON message protocol for the serial console.
///
/// All messages are newline-delimited JSON (NDJSON).
/// Uses `heapless` types for no_std/no-alloc operation.
use heapless::{String, Vec};
use serde::{Deserialize, Serialize};

/// Maximum length for MAC address strings ("AA:BB:CC:DD:EE:FF")
pub type MacString = String<18>;

/// ISO-8601 UTC timestamp ("2026-10-17T12:35:19Z")
pub type TimeString = String<20>;

/// Messages sent from the device to the console / companion
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    /// One access point row of a cycle report
    #[serde(rename = "ap")]
    Ap {
        cycle: u32,
        ssid: &'a str,
        bssid: &'a MacString,
        /// "2.4G", "5G", "6G" or "???"
        band: &'static str,
        ch: u8,
        rssi: i8,
        /// Security label, e.g. "WPA2/WPA3"
        sec: &'static str,
        /// Distinct stations seen transmitting to this AP
        clients: u8,
        /// "fix", "no_fix" or "no_data"
        gps: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<&'a TimeString>,
    },
    /// End-of-cycle summary, sent after the AP rows
    #[serde(rename = "cycle")]
    Cycle {
        cycle: u32,
        aps: u8,
        clients: u16,
        scan_failed: bool,
        gps: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        lat: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        lon: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        time: Option<&'a TimeString>,
    },
    /// Device status report
    #[serde(rename = "status")]
    Status {
        running: bool,
        /// Uptime in seconds
        uptime: u32,
        /// Free heap in bytes
        heap_free: u32,
        /// Cycles started since boot
        cycles: u32,
        /// Whether station sets persist across cycles
        retain: bool,
        capture_ms: u32,
        idle_ms: u32,
        /// Board identifier
        board: &'static str,
        /// Firmware version
        version: &'static str,
    },
}

/// Commands sent from the console to the device.
///
/// Deserialized manually via [`RawCommand`] in `comm::parse_command()` because
/// `serde_json_core` does not support internally tagged enums (`deserialize_any`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostCommand {
    /// Resume discovery cycles
    Start,
    /// Pause discovery cycles (GPS keeps being polled)
    Stop,
    /// Request current status
    GetStatus,
    /// Per-AP capture dwell
    SetCapture { ms: u32 },
    /// Wait between cycles
    SetIdle { ms: u32 },
    /// Channel settle time before each capture
    SetSettle { ms: u32 },
    /// Keep station sets across cycles
    SetRetain { enabled: bool },
    /// Rank report rows by signal strength
    SetSort { enabled: bool },
    /// Forget all retained stations
    ClearClients,
}

/// Wire format for host commands. A flat struct that `serde_json_core` can
/// deserialize without `deserialize_any`. Converted to [`HostCommand`] in
/// `comm::parse_command()`.
#[derive(Deserialize)]
pub(crate) struct RawCommand {
    pub cmd: String<16>,
    #[serde(default)]
    pub ms: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

/// Firmware version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a serialized JSON message
pub const MAX_MSG_LEN: usize = 512;

/// Buffer type for serialized JSON messages
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

#[cfg(test)]
mod tests {
    use super::*;

    fn to_json<'b>(msg: &DeviceMessage, buf: &'b mut [u8]) -> &'b str {
        let len = serde_json_core::to_slice(msg, buf).unwrap();
        core::str::from_utf8(&buf[..len]).unwrap()
    }

    // ── DeviceMessage serialization ─────────────────────────────────

    #[test]
    fn serialize_ap_row_with_fix() {
        let bssid = MacString::try_from("11:22:33:44:55:66").unwrap();
        let time = TimeString::try_from("2026-10-17T12:35:19Z").unwrap();
        let msg = DeviceMessage::Ap {
            cycle: 3,
            ssid: "CoffeeShop",
            bssid: &bssid,
            band: "2.4G",
            ch: 6,
            rssi: -52,
            sec: "WPA2",
            clients: 4,
            gps: "fix",
            lat: Some(48.5),
            lon: Some(-11.25),
            time: Some(&time),
        };
        let mut buf = [0u8; 512];
        let json = to_json(&msg, &mut buf);
        assert!(json.starts_with(r#"{"type":"ap""#));
        assert!(json.contains(r#""ssid":"CoffeeShop""#));
        assert!(json.contains(r#""bssid":"11:22:33:44:55:66""#));
        assert!(json.contains(r#""ch":6"#));
        assert!(json.contains(r#""rssi":-52"#));
        assert!(json.contains(r#""clients":4"#));
        assert!(json.contains(r#""lat":48.5"#));
        assert!(json.contains(r#""lon":-11.25"#));
        assert!(json.contains(r#""time":"2026-10-17T12:35:19Z""#));
    }

    #[test]
    fn serialize_ap_row_without_fix_omits_coordinates() {
        let bssid = MacString::try_from("11:22:33:44:55:66").unwrap();
        let msg = DeviceMessage::Ap {
            cycle: 1,
            ssid: "",
            bssid: &bssid,
            band: "5G",
            ch: 36,
            rssi: -80,
            sec: "OPEN",
            clients: 0,
            gps: "no_fix",
            lat: None,
            lon: None,
            time: None,
        };
        let mut buf = [0u8; 512];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""gps":"no_fix""#));
        assert!(json.contains(r#""ssid":"""#));
        assert!(!json.contains("lat"));
        assert!(!json.contains("lon"));
        assert!(!json.contains("time"));
    }

    #[test]
    fn serialize_cycle_summary() {
        let msg = DeviceMessage::Cycle {
            cycle: 7,
            aps: 0,
            clients: 0,
            scan_failed: true,
            gps: "no_data",
            lat: None,
            lon: None,
            time: None,
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""type":"cycle""#));
        assert!(json.contains(r#""scan_failed":true"#));
        assert!(json.contains(r#""gps":"no_data""#));
    }

    #[test]
    fn serialize_status_message() {
        let msg = DeviceMessage::Status {
            running: true,
            uptime: 120,
            heap_free: 48000,
            cycles: 9,
            retain: false,
            capture_ms: 3000,
            idle_ms: 6000,
            board: "test_board",
            version: "0.1.0",
        };
        let mut buf = [0u8; 256];
        let json = to_json(&msg, &mut buf);
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""running":true"#));
        assert!(json.contains(r#""cycles":9"#));
        assert!(json.contains(r#""board":"test_board""#));
    }

    #[test]
    fn host_command_equality() {
        assert_eq!(HostCommand::SetCapture { ms: 500 }, HostCommand::SetCapture { ms: 500 });
        assert_ne!(HostCommand::Start, HostCommand::Stop);
    }

    // ── Version constant ────────────────────────────────────────────

    #[test]
    fn version_is_semver() {
        let parts: heapless::Vec<&str, 4> = VERSION.split('.').collect();
        assert_eq!(
            parts.len(),
            3,
            "VERSION should be semver (major.minor.patch)"
        );
        for part in &parts {
            assert!(part.parse::<u32>().is_ok(), "'{part}' is not a number");
        }
    }
}

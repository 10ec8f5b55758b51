/// Collaborator contracts the discovery cycle runs against.
///
/// The library never touches hardware. Firmware binaries implement these
/// traits for the real radio, GPS UART, clock and output; tests implement
/// them with scripted mocks.
use core::time::Duration;

use heapless::String;

use crate::frame::Observation;
use crate::nmea::DateTime;
use crate::report::{Report, Security};

/// One access point returned by an active scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub bssid: [u8; 6],
    pub ssid: String<32>,
    pub channel: u8,
    pub rssi: i8,
    pub security: Security,
}

/// The single shared WiFi radio.
///
/// Active scanning and promiscuous capture are mutually exclusive; the
/// controller only calls [`Radio::scan`] with promiscuous mode off and only
/// calls [`Radio::set_channel`] / [`Radio::capture`] with it on.
pub trait Radio {
    type Error: core::fmt::Debug;

    /// Blocking active scan. Each AP found is handed to `on_result` in
    /// driver order.
    fn scan(&mut self, on_result: &mut dyn FnMut(ScanResult)) -> Result<(), Self::Error>;

    fn set_promiscuous(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn set_channel(&mut self, channel: u8) -> Result<(), Self::Error>;

    /// Capture on the tuned channel for `window`, passing every data-frame
    /// observation to `sink`. Returns once the window has closed and no
    /// further observations for it will be delivered.
    fn capture(&mut self, window: Duration, sink: &mut dyn FnMut(Observation));
}

/// Line-oriented GPS byte stream.
pub trait GpsSource {
    /// Read whatever is buffered without waiting. Returning 0 is normal.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize;
}

/// GPS source for boards without a receiver attached.
pub struct NoGps;

impl GpsSource for NoGps {
    fn read_nonblocking(&mut self, _buf: &mut [u8]) -> usize {
        0
    }
}

/// Time services: bounded waits and wall-clock updates.
pub trait Clock {
    fn sleep(&mut self, duration: Duration);

    /// Called with UTC time decoded from the GPS.
    fn set_wall_clock(&mut self, time: &DateTime);

    fn uptime_ms(&self) -> u64;
}

/// Consumer of finished cycle reports (console, display, BLE, …).
pub trait ReportSink<const N: usize> {
    fn publish(&mut self, report: &Report<N>);
}

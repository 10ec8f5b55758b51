//! AirTally library: WiFi access point client census with GPS tagging.
//!
//! Each discovery cycle actively scans for access points, then visits every
//! AP's channel in promiscuous mode and counts the distinct stations seen
//! transmitting to it. Rows are ranked by signal strength and tagged with the
//! latest GPS fix before being handed to a report sink.
//!
//! Everything here is `no_std` and allocation-free, and testable on any host
//! with `cargo test`. Hardware lives behind the traits in [`platform`]; the
//! ESP32 firmware in `firmware-std/` is a thin consumer that provides the
//! radio, GPS UART, clock and console output.
//!
//! - `frame`, `table`, `nmea`, `report`: pure logic (classification,
//!   association bookkeeping, NMEA decoding, ranking)
//! - `cycle`: the scan → visit → report → idle controller
//! - `protocol`, `comm`: NDJSON console messages and host commands
//! - `board`, `defaults`: compile-time pins and tuning constants

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod comm;
pub mod cycle;
pub mod defaults;
pub mod frame;
pub mod nmea;
pub mod platform;
pub mod protocol;
pub mod report;
pub mod table;

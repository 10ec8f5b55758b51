/// Compiled-in capacities and timing defaults.
///
/// Capacities bound worst-case memory and cycle time regardless of how
/// busy the RF environment is. Timings are the starting values of
/// [`CycleConfig`](crate::cycle::CycleConfig) and can be changed at runtime
/// with host commands.

/// Maximum access points tracked per discovery cycle.
pub const MAX_APS: usize = 10;

/// Maximum distinct stations recorded per access point.
pub const MAX_STATIONS: usize = 10;

/// Time to let the radio settle after a channel change before capturing.
pub const SETTLE_MS: u64 = 100;

/// Passive capture dwell per access point.
/// Dominates cycle latency: a cycle takes roughly `aps × CAPTURE_MS`.
pub const CAPTURE_MS: u64 = 3000;

/// Wait between the end of one report and the next active scan.
pub const IDLE_MS: u64 = 60_000;

/// Idle multiplier applied after a failed active scan (60 s × 5 = 5 min).
pub const FAILURE_BACKOFF_FACTOR: u32 = 5;

/// Longest NMEA 0183 sentence is 82 bytes; leave room for noise.
pub const NMEA_LINE_LEN: usize = 96;

/// Bytes pulled from the GPS UART per non-blocking poll.
pub const GPS_READ_CHUNK: usize = 128;

/// Upper bound on bytes drained from the GPS per poll, so a chatty
/// receiver cannot stall the cycle loop.
pub const GPS_MAX_POLL_BYTES: usize = 1024;

/// Depth of the capture-callback → controller observation queue.
pub const OBSERVATION_QUEUE_LEN: usize = 64;

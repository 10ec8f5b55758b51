/// Discovery cycle controller.
///
/// One cycle: active scan → one channel visit per AP with passive capture
/// → report → idle. The radio can either scan or sniff, never both, so the
/// controller owns the mode switch and refuses to tune a channel outside
/// promiscuous mode.
///
/// Captured frames reach the association table through [`Radio::capture`],
/// which drains observations on the controller's own thread. The table is
/// therefore only ever touched here, and only between capture windows or
/// inside the sink of the current one.
use core::time::Duration;

use heapless::{String, Vec};

use crate::comm::{self, CommandAction};
use crate::defaults::{
    CAPTURE_MS, FAILURE_BACKOFF_FACTOR, GPS_MAX_POLL_BYTES, GPS_READ_CHUNK, IDLE_MS, SETTLE_MS,
};
use crate::frame::Observation;
use crate::nmea::{DateTime, FixState, FixTracker};
use crate::platform::{Clock, GpsSource, Radio, ReportSink, ScanResult};
use crate::protocol::HostCommand;
use crate::report::{self, Report, Security};
use crate::table::{AssociationTable, Observed};

/// Runtime cycle configuration. Adjustable from the console without
/// reflashing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleConfig {
    /// Wait after tuning before the capture window opens
    pub settle: Duration,
    /// Capture window per AP
    pub capture: Duration,
    /// Wait between report and next scan
    pub idle: Duration,
    /// Idle multiplier after a failed scan
    pub failure_backoff_factor: u32,
    /// Rank report rows by signal strength
    pub sort_by_rssi: bool,
    /// Keep station sets across cycles until cleared
    pub retain_clients: bool,
    /// Cleared by the `stop` host command
    pub running: bool,
}

impl CycleConfig {
    pub const fn new() -> Self {
        Self {
            settle: Duration::from_millis(SETTLE_MS),
            capture: Duration::from_millis(CAPTURE_MS),
            idle: Duration::from_millis(IDLE_MS),
            failure_backoff_factor: FAILURE_BACKOFF_FACTOR,
            sort_by_rssi: true,
            retain_clients: false,
            running: true,
        }
    }

    pub fn failure_backoff(&self) -> Duration {
        self.idle.saturating_mul(self.failure_backoff_factor)
    }
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// An access point as seen by this cycle's scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ApRecord {
    pub bssid: [u8; 6],
    pub ssid: String<32>,
    pub channel: u8,
    pub rssi: i8,
    pub security: Security,
    /// Association count, frozen when the cycle reports
    pub clients: u8,
    /// Position in the scan result; tie-break for ranking
    pub scan_order: u8,
}

impl ApRecord {
    fn from_scan(result: ScanResult, scan_order: u8) -> Self {
        Self {
            bssid: result.bssid,
            ssid: result.ssid,
            channel: result.channel,
            rssi: result.rssi,
            security: result.security,
            clients: 0,
            scan_order,
        }
    }
}

/// State of the current discovery cycle: the scanned APs and who talks to them.
pub struct DiscoveryCycle<const APS: usize, const STATIONS: usize> {
    number: u32,
    records: Vec<ApRecord, APS>,
    table: AssociationTable<APS, STATIONS>,
    dropped: u16,
}

impl<const APS: usize, const STATIONS: usize> DiscoveryCycle<APS, STATIONS> {
    /// Scan order, visit index and report AP count are all `u8`.
    const FITS_U8: () = assert!(APS <= u8::MAX as usize, "APS must fit in a u8");

    pub const fn new() -> Self {
        let () = Self::FITS_U8;
        Self {
            number: 0,
            records: Vec::new(),
            table: AssociationTable::new(),
            dropped: 0,
        }
    }

    /// Start a new cycle; the previous record set is discarded.
    pub fn begin(&mut self) {
        self.number = self.number.wrapping_add(1);
        self.records.clear();
        self.dropped = 0;
    }

    /// Add a scan result. Once `APS` records exist, later results are dropped.
    pub fn push_record(&mut self, result: ScanResult) -> bool {
        let order = self.records.len() as u8;
        match self.records.push(ApRecord::from_scan(result, order)) {
            Ok(()) => true,
            Err(_) => {
                self.dropped = self.dropped.saturating_add(1);
                false
            }
        }
    }

    /// Open the association table for this cycle's APs.
    pub fn start_capture(&mut self, retain: bool) {
        self.table
            .begin_cycle(self.records.iter().map(|r| r.bssid), retain);
    }

    pub fn observe(&mut self, obs: Observation) -> Observed {
        self.table.observe(&obs.ap, &obs.station)
    }

    /// Copy association counts into the records.
    pub fn freeze_counts(&mut self) {
        for record in self.records.iter_mut() {
            record.clients = self.table.count(&record.bssid).min(u8::MAX as usize) as u8;
        }
    }

    /// Forget retained station sets.
    pub fn clear_retained(&mut self) {
        self.table.clear();
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn records(&self) -> &[ApRecord] {
        &self.records
    }

    pub fn table(&self) -> &AssociationTable<APS, STATIONS> {
        &self.table
    }

    /// Scan results that did not fit this cycle.
    pub fn dropped(&self) -> u16 {
        self.dropped
    }
}

impl<const APS: usize, const STATIONS: usize> Default for DiscoveryCycle<APS, STATIONS> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    ActiveScan,
    /// Visiting the AP at this index of the record set
    ChannelVisit(u8),
    Report,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    Station,
    Promiscuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Reported { aps: u8, clients: u16 },
    ScanFailed,
    Paused,
}

pub struct CycleController<R, G, C, S, const APS: usize, const STATIONS: usize> {
    radio: R,
    gps: G,
    clock: C,
    sink: S,
    config: CycleConfig,
    tracker: FixTracker,
    cycle: DiscoveryCycle<APS, STATIONS>,
    mode: RadioMode,
    state: CycleState,
}

impl<R, G, C, S, const APS: usize, const STATIONS: usize>
    CycleController<R, G, C, S, APS, STATIONS>
where
    R: Radio,
    G: GpsSource,
    C: Clock,
    S: ReportSink<APS>,
{
    pub fn new(radio: R, gps: G, clock: C, sink: S, config: CycleConfig) -> Self {
        Self {
            radio,
            gps,
            clock,
            sink,
            config,
            tracker: FixTracker::new(),
            cycle: DiscoveryCycle::new(),
            mode: RadioMode::Station,
            state: CycleState::Idle,
        }
    }

    /// Run cycles forever. `before_cycle` runs at the top of every cycle,
    /// e.g. to apply queued host commands.
    pub fn run(&mut self, mut before_cycle: impl FnMut(&mut Self)) -> ! {
        loop {
            before_cycle(self);
            self.run_cycle();
        }
    }

    /// One full pass, including the trailing idle wait.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.poll_gps();

        if !self.config.running {
            self.enter(CycleState::Idle);
            self.clock.sleep(self.config.idle);
            return CycleOutcome::Paused;
        }

        let started = self.clock.uptime_ms();
        self.cycle.begin();
        self.enter(CycleState::ActiveScan);

        if let Err(e) = self.active_scan() {
            log::warn!("Cycle {}: active scan failed: {:?}", self.cycle.number(), e);
            self.enter(CycleState::Report);
            let report: Report<APS> = Report::empty(self.cycle.number(), &self.tracker.fix(), true);
            self.sink.publish(&report);

            self.enter(CycleState::Idle);
            self.clock.sleep(self.config.failure_backoff());
            return CycleOutcome::ScanFailed;
        }

        self.visit_channels();
        let (aps, clients) = self.report();
        log::info!(
            "Cycle {}: {} APs, {} clients in {} ms",
            self.cycle.number(),
            aps,
            clients,
            self.clock.uptime_ms().saturating_sub(started)
        );

        self.enter(CycleState::Idle);
        self.clock.sleep(self.config.idle);
        CycleOutcome::Reported { aps, clients }
    }

    /// Apply a host command between cycles.
    pub fn apply(&mut self, cmd: &HostCommand) -> CommandAction {
        let action = comm::handle_command(cmd, &mut self.config);
        if action == CommandAction::ClearClients {
            self.cycle.clear_retained();
            log::info!("Retained clients cleared");
        }
        action
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn fix(&self) -> FixState {
        self.tracker.fix()
    }

    pub fn cycles(&self) -> u32 {
        self.cycle.number()
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn uptime_ms(&self) -> u64 {
        self.clock.uptime_ms()
    }

    // ── Cycle steps ──────────────────────────────────────────────────

    fn active_scan(&mut self) -> Result<(), R::Error> {
        // Scanning needs the radio out of promiscuous mode, whatever the
        // previous cycle left behind.
        self.radio.set_promiscuous(false)?;
        self.mode = RadioMode::Station;

        let cycle = &mut self.cycle;
        self.radio.scan(&mut |result| {
            cycle.push_record(result);
        })?;

        if self.cycle.dropped() > 0 {
            log::debug!(
                "Cycle {}: {} scan results over capacity dropped",
                self.cycle.number(),
                self.cycle.dropped()
            );
        }
        log::info!(
            "Cycle {}: scan found {} APs",
            self.cycle.number(),
            self.cycle.records().len()
        );

        self.cycle.start_capture(self.config.retain_clients);
        Ok(())
    }

    fn visit_channels(&mut self) {
        let count = self.cycle.records().len();
        if count == 0 {
            return;
        }

        if let Err(e) = self.radio.set_promiscuous(true) {
            log::warn!("Promiscuous mode failed, skipping capture: {:?}", e);
            return;
        }
        self.mode = RadioMode::Promiscuous;

        for index in 0..count {
            self.enter(CycleState::ChannelVisit(index as u8));
            self.visit(index);
            self.poll_gps();
        }

        match self.radio.set_promiscuous(false) {
            Ok(()) => self.mode = RadioMode::Station,
            Err(e) => log::warn!("Leaving promiscuous mode failed: {:?}", e),
        }
    }

    fn visit(&mut self, index: usize) {
        let channel = self.cycle.records()[index].channel;
        if let Err(e) = self.tune(channel) {
            log::warn!("Tuning to channel {} failed, AP skipped: {:?}", channel, e);
            return;
        }
        self.clock.sleep(self.config.settle);

        let cycle = &mut self.cycle;
        let mut frames = 0u32;
        let mut added = 0u32;
        self.radio.capture(self.config.capture, &mut |obs| {
            frames += 1;
            if cycle.observe(obs) == Observed::Added {
                added += 1;
            }
        });

        log::debug!(
            "Visit {} (ch {}): {} data frames, {} new stations",
            index,
            channel,
            frames,
            added
        );
    }

    fn tune(&mut self, channel: u8) -> Result<(), R::Error> {
        assert!(
            self.mode == RadioMode::Promiscuous,
            "channel tuning requires promiscuous mode"
        );
        self.radio.set_channel(channel)
    }

    fn report(&mut self) -> (u8, u16) {
        self.enter(CycleState::Report);
        self.poll_gps();
        self.cycle.freeze_counts();

        let fix = self.tracker.fix();
        let report: Report<APS> = report::build(
            self.cycle.number(),
            self.cycle.records(),
            &fix,
            self.config.sort_by_rssi,
        );
        self.sink.publish(&report);
        (report.rows.len() as u8, report.total_clients())
    }

    fn enter(&mut self, state: CycleState) {
        log::trace!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }

    // ── GPS ──────────────────────────────────────────────────────────

    /// Drain whatever the GPS has buffered, without waiting.
    fn poll_gps(&mut self) {
        let mut buf = [0u8; GPS_READ_CHUNK];
        let mut drained = 0;
        let mut latest_time: Option<DateTime> = None;
        let was_valid = self.tracker.fix().valid;

        while drained < GPS_MAX_POLL_BYTES {
            let n = self.gps.read_nonblocking(&mut buf).min(buf.len());
            if n == 0 {
                break;
            }
            drained += n;
            let summary = self.tracker.feed(&buf[..n]);
            if summary.time.is_some() {
                latest_time = summary.time;
            }
        }

        if let Some(time) = latest_time {
            self.clock.set_wall_clock(&time);
        }

        let valid = self.tracker.fix().valid;
        if valid != was_valid {
            log::info!("GPS fix {}", if valid { "acquired" } else { "lost" });
        }
    }
}

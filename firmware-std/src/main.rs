//! AirTally ESP-IDF std firmware
//!
//! The discovery cycle runs on the main thread. The WiFi driver's
//! promiscuous callback classifies frames and hands observations over a
//! bounded std::sync::mpsc channel; the cycle drains it during each capture
//! window. A second thread reads NDJSON commands from the serial console.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use airtally::{board, comm, defaults, frame, nmea, platform, protocol, report};

use comm::{CommandAction, LineReader};
use defaults::{MAX_APS, MAX_STATIONS, OBSERVATION_QUEUE_LEN};
use esp_idf_svc::hal::delay::NON_BLOCK;
use esp_idf_svc::hal::gpio::AnyIOPin;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::uart::{self, UartDriver};
use esp_idf_svc::hal::units::Hertz;
use esp_idf_svc::sys::{
    esp, esp_get_free_heap_size, esp_wifi_set_channel, esp_wifi_set_promiscuous,
    esp_wifi_set_promiscuous_filter, esp_wifi_set_promiscuous_rx_cb, settimeofday, timeval,
    wifi_promiscuous_filter_t, wifi_promiscuous_pkt_t, wifi_promiscuous_pkt_type_t,
    wifi_promiscuous_pkt_type_t_WIFI_PKT_CTRL, wifi_promiscuous_pkt_type_t_WIFI_PKT_DATA,
    wifi_promiscuous_pkt_type_t_WIFI_PKT_MGMT, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE,
    EspError, WIFI_PROMIS_FILTER_MASK_DATA,
};
use esp_idf_svc::wifi::config::ScanConfig;
use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, EspWifi};
use esp_idf_svc::{eventloop::EspSystemEventLoop, nvs::EspDefaultNvsPartition};
use frame::{FrameKind, Observation};
use nmea::DateTime;
use platform::{Clock, GpsSource, NoGps, Radio, ReportSink, ScanResult};
use protocol::{DeviceMessage, HostCommand, MsgBuffer, MAX_MSG_LEN, VERSION};
use report::{Report, Security};

type Controller = airtally::cycle::CycleController<
    EspRadio,
    BoardGps,
    SystemClock,
    SerialReporter,
    MAX_APS,
    MAX_STATIONS,
>;

// ── Promiscuous callback → capture window ────────────────────────────

static SCAN_TX: Mutex<Option<SyncSender<Observation>>> = Mutex::new(None);

/// Set only while a capture window is open. Frames outside a window
/// (e.g. while the channel is still settling) are dropped in the callback.
static CAPTURING: AtomicBool = AtomicBool::new(false);

/// WiFi promiscuous mode callback.
///
/// Runs in the WiFi driver task and must not block: observations are
/// offered with try_send and dropped when the queue is full.
unsafe extern "C" fn promisc_rx_cb(
    buf: *mut std::ffi::c_void,
    pkt_type: wifi_promiscuous_pkt_type_t,
) {
    if !CAPTURING.load(Ordering::Relaxed) {
        return;
    }

    #[allow(non_upper_case_globals)]
    let kind = match pkt_type {
        wifi_promiscuous_pkt_type_t_WIFI_PKT_MGMT => FrameKind::Management,
        wifi_promiscuous_pkt_type_t_WIFI_PKT_CTRL => FrameKind::Control,
        wifi_promiscuous_pkt_type_t_WIFI_PKT_DATA => FrameKind::Data,
        _ => FrameKind::Misc,
    };
    if kind != FrameKind::Data {
        return;
    }

    let pkt = unsafe { &*(buf as *const wifi_promiscuous_pkt_t) };
    let sig_len = pkt.rx_ctrl.sig_len() as usize;
    if sig_len == 0 {
        return;
    }

    // Safety: payload is `sig_len` bytes starting at pkt.payload
    let payload = unsafe { std::slice::from_raw_parts(pkt.payload.as_ptr(), sig_len) };

    if let Some(obs) = frame::classify(payload, kind) {
        if let Ok(guard) = SCAN_TX.lock() {
            if let Some(ref tx) = *guard {
                let _ = tx.try_send(obs);
            }
        }
    }
}

// ── Radio ────────────────────────────────────────────────────────────

struct EspRadio {
    wifi: BlockingWifi<EspWifi<'static>>,
    observations: Receiver<Observation>,
}

impl EspRadio {
    fn new(wifi: BlockingWifi<EspWifi<'static>>) -> Result<Self, EspError> {
        let (tx, rx) = mpsc::sync_channel::<Observation>(OBSERVATION_QUEUE_LEN);
        if let Ok(mut slot) = SCAN_TX.lock() {
            *slot = Some(tx);
        }

        let filter = wifi_promiscuous_filter_t {
            filter_mask: WIFI_PROMIS_FILTER_MASK_DATA,
        };
        unsafe {
            esp!(esp_wifi_set_promiscuous_filter(&filter))?;
            esp!(esp_wifi_set_promiscuous_rx_cb(Some(promisc_rx_cb)))?;
        }

        Ok(Self {
            wifi,
            observations: rx,
        })
    }
}

fn security_of(auth: Option<AuthMethod>) -> Security {
    match auth {
        Some(AuthMethod::None) => Security::Open,
        Some(AuthMethod::WEP) => Security::Wep,
        Some(AuthMethod::WPA) => Security::Wpa,
        Some(AuthMethod::WPA2Personal) | Some(AuthMethod::WPA2Enterprise) => Security::Wpa2,
        Some(AuthMethod::WPAWPA2Personal) => Security::WpaWpa2,
        Some(AuthMethod::WPA3Personal) => Security::Wpa3,
        Some(AuthMethod::WPA2WPA3Personal) => Security::Wpa2Wpa3,
        _ => Security::Unknown,
    }
}

impl Radio for EspRadio {
    type Error = EspError;

    fn scan(&mut self, on_result: &mut dyn FnMut(ScanResult)) -> Result<(), EspError> {
        let config = ScanConfig {
            show_hidden: true,
            ..Default::default()
        };
        self.wifi.wifi_mut().start_scan(&config, true)?;
        for ap in self.wifi.wifi_mut().get_scan_result()? {
            on_result(ScanResult {
                bssid: ap.bssid,
                ssid: heapless::String::try_from(ap.ssid.as_str()).unwrap_or_default(),
                channel: ap.channel,
                rssi: ap.signal_strength,
                security: security_of(ap.auth_method),
            });
        }
        Ok(())
    }

    fn set_promiscuous(&mut self, enabled: bool) -> Result<(), EspError> {
        esp!(unsafe { esp_wifi_set_promiscuous(enabled) })
    }

    fn set_channel(&mut self, channel: u8) -> Result<(), EspError> {
        esp!(unsafe { esp_wifi_set_channel(channel, wifi_second_chan_t_WIFI_SECOND_CHAN_NONE) })
    }

    fn capture(&mut self, window: Duration, sink: &mut dyn FnMut(Observation)) {
        // Anything queued before the window belongs to the previous channel
        while self.observations.try_recv().is_ok() {}

        let deadline = Instant::now() + window;
        CAPTURING.store(true, Ordering::Relaxed);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.observations.recv_timeout(remaining) {
                Ok(obs) => sink(obs),
                Err(mpsc::RecvTimeoutError::Timeout) => break,
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    log::error!("Observation queue disconnected");
                    break;
                }
            }
        }
        CAPTURING.store(false, Ordering::Relaxed);

        // Frames that were already queued when the window closed still count
        while let Ok(obs) = self.observations.try_recv() {
            sink(obs);
        }
    }
}

// ── GPS ──────────────────────────────────────────────────────────────

enum BoardGps {
    Uart(UartDriver<'static>),
    Absent(NoGps),
}

impl GpsSource for BoardGps {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> usize {
        match self {
            BoardGps::Uart(uart) => uart.read(buf, NON_BLOCK).unwrap_or(0),
            BoardGps::Absent(none) => none.read_nonblocking(buf),
        }
    }
}

// ── Clock ────────────────────────────────────────────────────────────

struct SystemClock {
    boot: Instant,
}

impl Clock for SystemClock {
    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    fn set_wall_clock(&mut self, time: &DateTime) {
        let tv = timeval {
            tv_sec: time.unix_timestamp() as _,
            tv_usec: 0,
        };
        if unsafe { settimeofday(&tv, core::ptr::null()) } != 0 {
            log::warn!("settimeofday failed for {}", time);
        }
    }

    fn uptime_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}

// ── Output ───────────────────────────────────────────────────────────

/// Human-readable table through the logger, NDJSON on stdout.
struct SerialReporter;

impl SerialReporter {
    fn emit(&self, write: impl FnOnce(&mut [u8]) -> Option<usize>) {
        let mut buf = MsgBuffer::new();
        buf.resize_default(MAX_MSG_LEN).ok();
        if let Some(len) = write(&mut buf) {
            buf.truncate(len);
            if let Ok(s) = std::str::from_utf8(&buf) {
                println!("{}", s.trim_end());
            }
        }
    }
}

impl ReportSink<MAX_APS> for SerialReporter {
    fn publish(&mut self, report: &Report<MAX_APS>) {
        if report.scan_failed {
            log::warn!("Cycle {}: scan failed, GPS {}", report.cycle, report.fix);
        } else {
            log::info!(
                "Cycle {} | {} APs | {} clients | GPS {}",
                report.cycle,
                report.rows.len(),
                report.total_clients(),
                report.fix
            );
            log::info!(
                "{:<32} {:<17} {:>4} {:>3} {:>4} {:<9} {:>3}",
                "SSID",
                "BSSID",
                "BAND",
                "CH",
                "RSSI",
                "SEC",
                "CLI"
            );
            for row in &report.rows {
                let mut bssid = protocol::MacString::new();
                report::format_mac(&row.bssid, &mut bssid);
                log::info!(
                    "{:<32} {:<17} {:>4} {:>3} {:>4} {:<9} {:>3}",
                    row.ssid.as_str(),
                    bssid.as_str(),
                    row.band.as_str(),
                    row.channel,
                    row.rssi,
                    row.security.as_str(),
                    row.clients
                );
            }
        }

        for row in &report.rows {
            self.emit(|buf| comm::serialize_row(report.cycle, row, buf));
        }
        self.emit(|buf| comm::serialize_summary(report, buf));
    }
}

fn emit_status(controller: &Controller) {
    let config = controller.config();
    let msg = DeviceMessage::Status {
        running: config.running,
        uptime: (controller.uptime_ms() / 1000) as u32,
        heap_free: unsafe { esp_get_free_heap_size() },
        cycles: controller.cycles(),
        retain: config.retain_clients,
        capture_ms: config.capture.as_millis() as u32,
        idle_ms: config.idle.as_millis() as u32,
        board: board::BOARD_NAME,
        version: VERSION,
    };
    SerialReporter.emit(|buf| comm::serialize_message(&msg, buf));
}

// ── Command thread ───────────────────────────────────────────────────

fn command_thread(cmd_tx: SyncSender<HostCommand>) {
    log::info!("Command thread started");

    let mut reader: LineReader<128> = LineReader::new();
    let mut stdin = std::io::stdin();
    let mut chunk = [0u8; 64];

    loop {
        match stdin.read(&mut chunk) {
            Ok(n) if n > 0 => {
                for &byte in &chunk[..n] {
                    if let Some(line) = reader.feed(byte) {
                        match comm::parse_command(line) {
                            Some(cmd) => {
                                let _ = cmd_tx.try_send(cmd);
                            }
                            None => log::warn!("Unrecognized command"),
                        }
                    }
                }
            }
            _ => thread::sleep(Duration::from_millis(50)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Bind the ESP-IDF logger to the `log` facade
    esp_idf_svc::log::EspLogger::initialize_default();

    let boot = Instant::now();
    log::info!("AirTally v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    // ── Peripherals ──────────────────────────────────────────────────

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Hold power on (M5StickC Plus2)
    #[cfg(feature = "m5stickc")]
    let _power_hold = {
        use esp_idf_svc::hal::gpio::PinDriver;
        let mut p = PinDriver::output(peripherals.pins.gpio4)?;
        p.set_high()?;
        p
    };

    // ── GPS UART ─────────────────────────────────────────────────────

    let gps = if board::HAS_GPS_HEADER {
        let config = uart::config::Config::default().baudrate(Hertz(board::GPS_BAUD));
        // Safety: pin numbers come from the board table and are not claimed elsewhere
        let (tx, rx) = unsafe {
            (
                AnyIOPin::new(board::GPS_TX_PIN as i32),
                AnyIOPin::new(board::GPS_RX_PIN as i32),
            )
        };
        let uart = UartDriver::new(
            peripherals.uart1,
            tx,
            rx,
            Option::<AnyIOPin>::None,
            Option::<AnyIOPin>::None,
            &config,
        )?;
        log::info!(
            "GPS UART on rx={} tx={} @ {} baud",
            board::GPS_RX_PIN,
            board::GPS_TX_PIN,
            board::GPS_BAUD
        );
        BoardGps::Uart(uart)
    } else {
        log::info!("No GPS header on this board, reports will carry no_data");
        BoardGps::Absent(NoGps)
    };

    // ── WiFi ─────────────────────────────────────────────────────────

    let mut wifi = BlockingWifi::wrap(
        EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs))?,
        sys_loop,
    )?;
    wifi.set_configuration(&esp_idf_svc::wifi::Configuration::Client(Default::default()))?;
    wifi.start()?;
    let radio = EspRadio::new(wifi)?;
    log::info!("WiFi started in station mode");

    // ── Command thread ───────────────────────────────────────────────

    let (cmd_tx, cmd_rx) = mpsc::sync_channel::<HostCommand>(4);
    thread::Builder::new()
        .name("command".into())
        .stack_size(4096)
        .spawn(move || {
            command_thread(cmd_tx);
        })?;
    log::info!("Command thread spawned");

    // ── Discovery cycle ──────────────────────────────────────────────

    let mut controller = Controller::new(
        radio,
        gps,
        SystemClock { boot },
        SerialReporter,
        airtally::cycle::CycleConfig::new(),
    );

    controller.run(|controller| {
        for cmd in cmd_rx.try_iter() {
            if controller.apply(&cmd) == CommandAction::ReportStatus {
                emit_status(controller);
            }
        }
    });
}

//! Integration Tests für den Bring-Up Ablauf
//!
//! Diese Tests laufen auf dem Host (x86_64) und nutzen Mock-Collaborators
//! für SD-Karte, WiFi und FTP-Server. Alle Mocks schreiben in ein
//! gemeinsames Event-Log, damit die Reihenfolge prüfbar ist.

use core::cell::{Cell, RefCell};
use core::net::Ipv4Addr;
use core::pin::pin;
use core::task::{Context, Poll, Waker};

use embassy_futures::block_on;
use esp_core::{
    BlockStorage, BringUpConfig, BusConfig, BusSpeed, Cadence, CadenceControl, CadenceScheduler,
    CardType, Credentials, FallbackListener, FatType, MountError, NetworkInfo, NetworkOptions,
    NetworkProvisioner, Sequencer, Stage, StatusCadence, TerminalDeviceFault, TransferServer,
    VolumeGeometry,
};
use heapless::String;

const PROVISIONING_SSID: &str = "ESP32C6-a1b2c3";

// ============================================================================
// Event Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Cadence(u32),
    Mount,
    Configure,
    Connect,
    Fallback,
    ServerStart,
    Service,
}

type EventLog = RefCell<Vec<Event>>;

fn cadences(log: &EventLog) -> Vec<u32> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::Cadence(ms) => Some(*ms),
            _ => None,
        })
        .collect()
}

fn count(log: &EventLog, wanted: Event) -> usize {
    log.borrow().iter().filter(|&&event| event == wanted).count()
}

// ============================================================================
// Mock Collaborators
// ============================================================================

/// Echter Scheduler, protokolliert zusätzlich jedes `replace()`
struct RecordingCadence<'a> {
    inner: CadenceScheduler,
    log: &'a EventLog,
}

impl<'a> RecordingCadence<'a> {
    fn new(log: &'a EventLog) -> Self {
        Self {
            inner: CadenceScheduler::new(),
            log,
        }
    }
}

impl CadenceControl for RecordingCadence<'_> {
    fn replace(&self, cadence: Cadence) {
        self.log
            .borrow_mut()
            .push(Event::Cadence(cadence.as_millis()));
        self.inner.replace(cadence);
    }

    fn stop(&self) {
        self.inner.stop();
    }

    fn current(&self) -> Option<Cadence> {
        self.inner.current()
    }
}

struct MockStorage<'a> {
    log: &'a EventLog,
    result: Result<(), MountError>,
    mounted_with: Option<BusConfig>,
}

impl<'a> MockStorage<'a> {
    fn new(log: &'a EventLog) -> Self {
        Self {
            log,
            result: Ok(()),
            mounted_with: None,
        }
    }

    fn failing(log: &'a EventLog, cause: MountError) -> Self {
        Self {
            result: Err(cause),
            ..Self::new(log)
        }
    }
}

impl BlockStorage for MockStorage<'_> {
    fn mount(&mut self, bus: &BusConfig) -> Result<(), MountError> {
        self.log.borrow_mut().push(Event::Mount);
        self.mounted_with = Some(*bus);
        self.result
    }

    fn card_type(&self) -> CardType {
        CardType::Sdhc
    }

    fn geometry(&self) -> VolumeGeometry {
        VolumeGeometry {
            fat_type: FatType::Fat32,
            blocks_per_cluster: 64,
            total_clusters: 242_304,
        }
    }
}

struct MockNetwork<'a> {
    log: &'a EventLog,
    cadence: &'a RecordingCadence<'a>,
    /// Simuliert: gespeichertes WLAN nicht erreichbar → Access Point
    use_fallback: bool,
    /// Cadence die während des blockierten Verbindungsaufbaus aktiv war
    cadence_while_connecting: Option<Cadence>,
    hostname: Option<String<32>>,
}

impl<'a> MockNetwork<'a> {
    fn new(log: &'a EventLog, cadence: &'a RecordingCadence<'a>, use_fallback: bool) -> Self {
        Self {
            log,
            cadence,
            use_fallback,
            cadence_while_connecting: None,
            hostname: None,
        }
    }
}

impl NetworkProvisioner for MockNetwork<'_> {
    fn configure(&mut self, options: &NetworkOptions<'_>) {
        self.log.borrow_mut().push(Event::Configure);
        self.hostname = String::try_from(options.hostname).ok();
    }

    async fn connect_or_provision(
        &mut self,
        provisioning: &Credentials<'_>,
        listener: &dyn FallbackListener,
    ) -> NetworkInfo {
        self.log.borrow_mut().push(Event::Connect);
        if self.use_fallback {
            self.log.borrow_mut().push(Event::Fallback);
            listener.on_fallback(provisioning.name);
        }
        self.cadence_while_connecting = self.cadence.current();

        NetworkInfo {
            ssid: String::try_from("HomeNet").unwrap(),
            address: Ipv4Addr::new(192, 168, 1, 42),
        }
    }
}

/// Access Point aktiv, Station verbindet erst wenn der Test `release` setzt
struct StalledNetwork<'a> {
    log: &'a EventLog,
    release: &'a Cell<bool>,
}

impl NetworkProvisioner for StalledNetwork<'_> {
    fn configure(&mut self, _options: &NetworkOptions<'_>) {
        self.log.borrow_mut().push(Event::Configure);
    }

    async fn connect_or_provision(
        &mut self,
        provisioning: &Credentials<'_>,
        listener: &dyn FallbackListener,
    ) -> NetworkInfo {
        self.log.borrow_mut().push(Event::Connect);
        self.log.borrow_mut().push(Event::Fallback);
        listener.on_fallback(provisioning.name);

        while !self.release.get() {
            embassy_futures::yield_now().await;
        }

        NetworkInfo {
            ssid: String::try_from("HomeNet").unwrap(),
            address: Ipv4Addr::new(192, 168, 1, 42),
        }
    }
}

struct MockServer<'a> {
    log: &'a EventLog,
    login: Option<(String<16>, String<16>)>,
}

impl<'a> MockServer<'a> {
    fn new(log: &'a EventLog) -> Self {
        Self { log, login: None }
    }
}

impl TransferServer for MockServer<'_> {
    fn start(&mut self, credentials: &Credentials<'_>) {
        self.log.borrow_mut().push(Event::ServerStart);
        self.login = String::try_from(credentials.name)
            .ok()
            .zip(String::try_from(credentials.password).ok());
    }

    async fn service_pending(&mut self) {
        self.log.borrow_mut().push(Event::Service);
        // Simuliert Warten auf den nächsten Client
        embassy_futures::yield_now().await;
    }
}

fn config() -> BringUpConfig<'static> {
    BringUpConfig {
        bus: BusConfig {
            chip_select: 18,
            speed: BusSpeed::Quarter,
        },
        network: NetworkOptions {
            hostname: PROVISIONING_SSID,
            debug_output: false,
        },
        provisioning: Credentials::new(PROVISIONING_SSID, "password"),
        server: Credentials::new("esp32", "esp32"),
    }
}

fn poll<F: Future>(fut: core::pin::Pin<&mut F>) -> Poll<F::Output> {
    let mut cx = Context::from_waker(Waker::noop());
    fut.poll(&mut cx)
}

// ============================================================================
// Tests: Szenario A - Normaler Start
// ============================================================================

#[test]
fn test_happy_path_reaches_running() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    let report = block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config()))
        .unwrap();

    assert_eq!(sequencer.stage(), Stage::Running);
    assert_eq!(cadence.current(), Some(StatusCadence::Running.cadence()));
    assert_eq!(report.volume.card_type, CardType::Sdhc);
    assert_eq!(report.network.ssid.as_str(), "HomeNet");
    assert_eq!(report.network.address, Ipv4Addr::new(192, 168, 1, 42));
}

#[test]
fn test_happy_path_cadence_sequence() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    // Keine 100 ms Zwischen-Cadence nach dem Mount
    assert_eq!(cadences(&log), vec![150, 500, 1000]);
}

#[test]
fn test_happy_path_stage_order() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert_eq!(
        sequencer.history(),
        &[
            Stage::Idle,
            Stage::MountingStorage,
            Stage::AcquiringNetwork,
            Stage::StartingServer,
            Stage::Running,
        ]
    );
    assert_eq!(
        *log.borrow(),
        vec![
            Event::Cadence(150),
            Event::Mount,
            Event::Configure,
            Event::Connect,
            Event::Cadence(500),
            Event::ServerStart,
            Event::Cadence(1000),
        ]
    );
}

#[test]
fn test_collaborators_receive_configuration() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert_eq!(
        storage.mounted_with,
        Some(BusConfig {
            chip_select: 18,
            speed: BusSpeed::Quarter,
        })
    );
    assert_eq!(network.hostname.as_deref(), Some(PROVISIONING_SSID));
    let (user, password) = server.login.unwrap();
    assert_eq!((user.as_str(), password.as_str()), ("esp32", "esp32"));
}

#[test]
fn test_startup_cadence_active_while_connecting() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert_eq!(
        network.cadence_while_connecting,
        Some(StatusCadence::Startup.cadence())
    );
}

// ============================================================================
// Tests: Szenario C - Provisioning-Fallback
// ============================================================================

#[test]
fn test_fallback_cadence_sequence() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, true);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert_eq!(cadences(&log), vec![150, 750, 500, 1000]);
    assert_eq!(sequencer.stage(), Stage::Running);
}

#[test]
fn test_fallback_cadence_replaces_startup_while_connecting() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, true);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert_eq!(
        network.cadence_while_connecting,
        Some(StatusCadence::Provisioning.cadence())
    );
    // Die Callback-Cadence wird nach der Verbindung vom Server-Start ersetzt
    let events = log.borrow();
    let fallback = events.iter().position(|e| *e == Event::Fallback).unwrap();
    let provisioning = events.iter().position(|e| *e == Event::Cadence(750)).unwrap();
    let server_start = events.iter().position(|e| *e == Event::ServerStart).unwrap();
    assert!(fallback < provisioning);
    assert!(provisioning < server_start);
}

#[test]
fn test_fallback_is_not_a_recorded_stage() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, true);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config())).unwrap();

    assert!(
        !sequencer
            .history()
            .contains(&Stage::InAccessPointFallback)
    );
}

#[test]
fn test_fallback_does_not_restart_acquisition() {
    let log = EventLog::default();
    let release = Cell::new(false);
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = StalledNetwork {
        log: &log,
        release: &release,
    };
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);
    let config = config();

    {
        let mut bring_up =
            pin!(sequencer.bring_up(&mut storage, &mut network, &mut server, &config));

        for _ in 0..5 {
            assert!(poll(bring_up.as_mut()).is_pending());
            assert_eq!(cadence.current(), Some(StatusCadence::Provisioning.cadence()));
            assert_eq!(count(&log, Event::Connect), 1);
            assert_eq!(count(&log, Event::ServerStart), 0);
        }

        release.set(true);
        let result = loop {
            if let Poll::Ready(result) = poll(bring_up.as_mut()) {
                break result;
            }
        };
        assert!(result.is_ok());
    }

    assert_eq!(count(&log, Event::Connect), 1);
    assert_eq!(count(&log, Event::ServerStart), 1);
    assert_eq!(cadences(&log), vec![150, 750, 500, 1000]);
    assert_eq!(sequencer.stage(), Stage::Running);
}

// ============================================================================
// Tests: Szenario B - SD-Karte fehlt
// ============================================================================

#[test]
fn test_storage_failure_is_terminal() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::failing(&log, MountError::CardNotResponding);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let mut sequencer = Sequencer::new(&cadence);

    let result = block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config()));

    assert_eq!(
        result,
        Err(TerminalDeviceFault {
            cause: MountError::CardNotResponding
        })
    );
    assert_eq!(sequencer.stage(), Stage::StorageFailed);
    assert_eq!(
        sequencer.history(),
        &[Stage::Idle, Stage::MountingStorage, Stage::StorageFailed]
    );
    assert_eq!(cadences(&log), vec![150, 250]);
}

#[test]
fn test_storage_failure_skips_network_and_server() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::failing(&log, MountError::NoFatVolume);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let sequencer = Sequencer::new(&cadence);

    let config = config();
    let mut device = pin!(sequencer.run(&mut storage, &mut network, &mut server, &config));

    // Halt: bleibt für immer pending
    for _ in 0..10 {
        assert!(poll(device.as_mut()).is_pending());
    }
    assert_eq!(count(&log, Event::Configure), 0);
    assert_eq!(count(&log, Event::Connect), 0);
    assert_eq!(count(&log, Event::ServerStart), 0);
    assert_eq!(count(&log, Event::Service), 0);
    assert_eq!(cadence.current(), Some(StatusCadence::StorageFault.cadence()));
}

// ============================================================================
// Tests: Steady-State Pump
// ============================================================================

#[test]
fn test_pump_services_server_forever() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, false);
    let mut server = MockServer::new(&log);
    let sequencer = Sequencer::new(&cadence);

    let config = config();
    let mut device = pin!(sequencer.run(&mut storage, &mut network, &mut server, &config));

    for expected in 1..=5 {
        assert!(poll(device.as_mut()).is_pending());
        assert_eq!(count(&log, Event::Service), expected);
    }
    assert_eq!(count(&log, Event::ServerStart), 1);
}

#[test]
fn test_pump_never_changes_cadence() {
    let log = EventLog::default();
    let cadence = RecordingCadence::new(&log);
    let mut storage = MockStorage::new(&log);
    let mut network = MockNetwork::new(&log, &cadence, true);
    let mut server = MockServer::new(&log);
    let sequencer = Sequencer::new(&cadence);

    let config = config();
    let mut device = pin!(sequencer.run(&mut storage, &mut network, &mut server, &config));

    for _ in 0..20 {
        assert!(poll(device.as_mut()).is_pending());
    }
    assert_eq!(cadences(&log).last(), Some(&1000));
    assert_eq!(cadences(&log).len(), 4);
    assert_eq!(cadence.current(), Some(StatusCadence::Running.cadence()));
}

// ============================================================================
// Tests: Cadence-Tabelle
// ============================================================================

#[test]
fn test_only_table_cadences_are_used() {
    for (use_fallback, fail_mount) in [(false, false), (true, false), (false, true)] {
        let log = EventLog::default();
        let cadence = RecordingCadence::new(&log);
        let mut storage = if fail_mount {
            MockStorage::failing(&log, MountError::ReadFailed)
        } else {
            MockStorage::new(&log)
        };
        let mut network = MockNetwork::new(&log, &cadence, use_fallback);
        let mut server = MockServer::new(&log);
        let mut sequencer = Sequencer::new(&cadence);

        let _ = block_on(sequencer.bring_up(&mut storage, &mut network, &mut server, &config()));

        for ms in cadences(&log) {
            let used = Cadence::from_millis(ms as i64).unwrap();
            assert!(
                StatusCadence::from_cadence(used).is_some(),
                "{} ms is not a status cadence",
                ms
            );
        }
    }
}

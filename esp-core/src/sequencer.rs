//! Stage Sequencer - geordnete Bring-Up Pipeline
//!
//! SD-Mount → Netzwerk → FTP-Server → Normalbetrieb.
//! Jede Stage setzt ihre Blink-Cadence und läuft entweder weiter
//! oder hält an. Ein fehlgeschlagener SD-Mount ist endgültig.

use core::convert::Infallible;

use heapless::Vec;

use crate::pump;
use crate::traits::{
    BlockStorage, CadenceControl, FallbackListener, NetworkProvisioner, TerminalDeviceFault,
    TransferServer,
};
use crate::types::{
    BusConfig, Credentials, NetworkInfo, NetworkOptions, Stage, StatusCadence, VolumeInfo,
};

/// Jede Stage wird höchstens einmal betreten
const STAGE_HISTORY_LEN: usize = 8;

/// Feste Konfiguration aller Stages
#[derive(Debug, Clone, Copy)]
pub struct BringUpConfig<'a> {
    /// SD-Karte: Chip-Select und Bus-Geschwindigkeit
    pub bus: BusConfig,
    pub network: NetworkOptions<'a>,
    /// SSID + Passwort des Provisioning-Access-Points
    pub provisioning: Credentials<'a>,
    /// FTP Login
    pub server: Credentials<'a>,
}

/// Ergebnis eines erfolgreichen Bring-Ups (nur Diagnose)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpReport {
    pub volume: VolumeInfo,
    pub network: NetworkInfo,
}

/// Fallback-Callback: berührt ausschließlich die Cadence
struct FallbackCadence<'a, C: CadenceControl> {
    cadence: &'a C,
}

impl<C: CadenceControl> FallbackListener for FallbackCadence<'_, C> {
    fn on_fallback(&self, provisioning_ssid: &str) {
        warn!("WiFi: SSID not found, switched to AP mode '{}'", provisioning_ssid);
        self.cadence.replace(StatusCadence::Provisioning.cadence());
    }
}

/// Bring-Up State Machine
///
/// Besitzt die aktuelle Stage exklusiv. Die Cadence gehört dem Scheduler,
/// der Sequencer schreibt sie nur über `CadenceControl::replace()`.
pub struct Sequencer<'a, C: CadenceControl> {
    cadence: &'a C,
    stage: Stage,
    history: Vec<Stage, STAGE_HISTORY_LEN>,
}

impl<'a, C: CadenceControl> Sequencer<'a, C> {
    pub fn new(cadence: &'a C) -> Self {
        let mut history = Vec::new();
        let _ = history.push(Stage::Idle);
        Self {
            cadence,
            stage: Stage::Idle,
            history,
        }
    }

    /// Aktuelle Stage
    ///
    /// `InAccessPointFallback` wird nicht gespeichert: er gilt solange die
    /// Netzwerk-Stage läuft und die Provisioning-Cadence aktiv ist.
    pub fn stage(&self) -> Stage {
        let provisioning = Some(StatusCadence::Provisioning.cadence());
        if self.stage == Stage::AcquiringNetwork && self.cadence.current() == provisioning {
            Stage::InAccessPointFallback
        } else {
            self.stage
        }
    }

    /// Alle bisher betretenen Stages in Reihenfolge (beginnt mit `Idle`)
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    fn enter(&mut self, stage: Stage, status: Option<StatusCadence>) {
        debug_assert!(!self.stage.is_terminal(), "no transition out of a terminal stage");
        info!("BringUp: {} -> {}", self.stage.as_str(), stage.as_str());
        self.stage = stage;
        let _ = self.history.push(stage);
        if let Some(status) = status {
            self.cadence.replace(status.cadence());
        }
    }

    /// Führt alle Stages bis `Running` aus
    ///
    /// Darf nur einmal aufgerufen werden. Kehrt mit `Err` zurück wenn die
    /// SD-Karte nicht gemountet werden konnte; Netzwerk und FTP-Server
    /// werden dann nie angefasst.
    pub async fn bring_up<S, N, T>(
        &mut self,
        storage: &mut S,
        network: &mut N,
        server: &mut T,
        config: &BringUpConfig<'_>,
    ) -> Result<BringUpReport, TerminalDeviceFault>
    where
        S: BlockStorage,
        N: NetworkProvisioner,
        T: TransferServer,
    {
        debug_assert_eq!(self.stage, Stage::Idle, "bring-up runs only once");

        let volume = self.mount_storage(storage, &config.bus)?;
        let network = self.acquire_network(network, config).await;
        self.start_server(server, &config.server);

        self.enter(Stage::Running, Some(StatusCadence::Running));
        Ok(BringUpReport { volume, network })
    }

    /// Bring-Up und danach für immer Pumpe (oder Halt bei SD-Fehler)
    pub async fn run<S, N, T>(
        mut self,
        storage: &mut S,
        network: &mut N,
        server: &mut T,
        config: &BringUpConfig<'_>,
    ) -> !
    where
        S: BlockStorage,
        N: NetworkProvisioner,
        T: TransferServer,
    {
        match self.bring_up(storage, network, server, config).await {
            Ok(_) => pump::run(server).await,
            Err(fault) => halt(fault).await,
        }
    }

    fn mount_storage<S: BlockStorage>(
        &mut self,
        storage: &mut S,
        bus: &BusConfig,
    ) -> Result<VolumeInfo, TerminalDeviceFault> {
        self.enter(Stage::MountingStorage, Some(StatusCadence::Startup));
        info!(
            "Storage: Initializing SD card (CS=GPIO{=u8}, {=u32} kHz)...",
            bus.chip_select,
            bus.speed.frequency_khz()
        );

        if let Err(cause) = storage.mount(bus) {
            self.enter(Stage::StorageFailed, Some(StatusCadence::StorageFault));
            error!("Storage: initialization failed: {}", cause);
            error!("Storage: Things to check:");
            error!("Storage: * is a card inserted?");
            error!("Storage: * is your wiring correct?");
            error!("Storage: * does the chip select pin match your module?");
            return Err(TerminalDeviceFault { cause });
        }
        info!("Storage: Wiring is correct and a card is present");

        let volume = VolumeInfo {
            card_type: storage.card_type(),
            geometry: storage.geometry(),
        };
        info!("Storage: Card type:   {}", volume.card_type.as_str());
        info!("Storage: Volume type: FAT{=u8}", volume.geometry.fat_type.bits());
        info!(
            "Storage: Volume size: {=f32} GiB ({=u64} MiB)",
            volume.geometry.capacity_gib(),
            volume.geometry.capacity_mib()
        );
        Ok(volume)
    }

    async fn acquire_network<N: NetworkProvisioner>(
        &mut self,
        network: &mut N,
        config: &BringUpConfig<'_>,
    ) -> NetworkInfo {
        self.enter(Stage::AcquiringNetwork, None);
        info!("WiFi: Startup connection...");

        network.configure(&config.network);
        let listener = FallbackCadence {
            cadence: self.cadence,
        };
        // Kein eigenes Timeout: der Collaborator entscheidet wie lange es dauert
        let info = network
            .connect_or_provision(&config.provisioning, &listener)
            .await;

        let [a, b, c, d] = info.address.octets();
        info!("WiFi: Connected OK");
        info!("WiFi: Connected to SSID: {}", info.ssid.as_str());
        info!("WiFi: IP address: {}.{}.{}.{}", a, b, c, d);
        info
    }

    fn start_server<T: TransferServer>(&mut self, server: &mut T, credentials: &Credentials<'_>) {
        self.enter(Stage::StartingServer, Some(StatusCadence::NetworkReady));
        info!("FTP: Startup server...");
        server.start(credentials);
        info!("FTP: OK");
    }
}

/// Endzustand nach SD-Fehler
///
/// Wartet für immer ohne CPU-Last, die Fault-Cadence blinkt im
/// Indicator-Task weiter.
pub async fn halt(fault: TerminalDeviceFault) -> ! {
    error!("BringUp: halted ({}), power cycle required", fault.cause);
    let never: Infallible = core::future::pending().await;
    match never {}
}

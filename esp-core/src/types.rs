//! Core Types für den Bring-Up Controller
//!
//! Datenstrukturen ohne Hardware-Dependencies

use core::net::Ipv4Addr;
use core::num::NonZeroU32;

use heapless::String;

use crate::traits::ConfigError;

/// Blockgröße von SD-Karten in Bytes (immer 512)
pub const BLOCK_SIZE: u32 = 512;

/// Maximale SSID-Länge laut IEEE 802.11
pub const MAX_SSID_LEN: usize = 32;

/// Blink-Intervall der Status-LED (Zeit zwischen zwei Toggles)
///
/// Kann nur mit einem positiven Intervall erzeugt werden,
/// ein `Cadence`-Wert ist daher immer gültig.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence(NonZeroU32);

impl Cadence {
    /// Erstellt eine Cadence aus Millisekunden
    ///
    /// # Fehlerbehandlung
    /// Gibt `ConfigError::InvalidCadence` zurück bei `interval_ms <= 0`
    /// oder wenn der Wert nicht in `u32` passt.
    pub const fn from_millis(interval_ms: i64) -> Result<Self, ConfigError> {
        if interval_ms <= 0 || interval_ms > u32::MAX as i64 {
            return Err(ConfigError::InvalidCadence(interval_ms));
        }
        match NonZeroU32::new(interval_ms as u32) {
            Some(ms) => Ok(Self(ms)),
            None => Err(ConfigError::InvalidCadence(interval_ms)),
        }
    }

    /// Intervall in Millisekunden
    pub const fn as_millis(self) -> u32 {
        self.0.get()
    }

    const fn from_table(ms: u32) -> Self {
        match NonZeroU32::new(ms) {
            Some(ms) => Self(ms),
            None => panic!("Status-Cadence muss > 0 sein"),
        }
    }
}

/// Status-Blinkmuster und ihre Bedeutung
///
/// Diese Tabelle ist der einzige nach außen sichtbare Vertrag des
/// Controllers und darf nicht verändert werden.
///
/// | Cadence | Bedeutung |
/// |---------|-----------|
/// | 150 ms  | Start / SD-Karte wird gemountet |
/// | 250 ms  | SD-Mount fehlgeschlagen (terminal) |
/// | 500 ms  | Netzwerk verbunden, FTP-Server startet |
/// | 750 ms  | Provisioning-Fallback (Access Point) aktiv |
/// | 1000 ms | Normalbetrieb |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusCadence {
    Startup,
    StorageFault,
    NetworkReady,
    Provisioning,
    Running,
}

impl StatusCadence {
    pub const ALL: [StatusCadence; 5] = [
        StatusCadence::Startup,
        StatusCadence::StorageFault,
        StatusCadence::NetworkReady,
        StatusCadence::Provisioning,
        StatusCadence::Running,
    ];

    /// Intervall in Millisekunden
    pub const fn millis(self) -> u32 {
        match self {
            StatusCadence::Startup => 150,
            StatusCadence::StorageFault => 250,
            StatusCadence::NetworkReady => 500,
            StatusCadence::Provisioning => 750,
            StatusCadence::Running => 1000,
        }
    }

    pub const fn cadence(self) -> Cadence {
        Cadence::from_table(self.millis())
    }

    /// Rückwärts-Zuordnung: welche Bedeutung hat eine aktive Cadence?
    pub fn from_cadence(cadence: Cadence) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.millis() == cadence.as_millis())
    }

    pub const fn meaning(self) -> &'static str {
        match self {
            StatusCadence::Startup => "startup / mounting storage",
            StatusCadence::StorageFault => "storage mount failed",
            StatusCadence::NetworkReady => "network acquired, server starting",
            StatusCadence::Provisioning => "provisioning fallback active",
            StatusCadence::Running => "running",
        }
    }
}

/// Phasen der Bring-Up Pipeline
///
/// Reihenfolge: Idle → MountingStorage → AcquiringNetwork → StartingServer → Running.
/// `StorageFailed` ist der einzige Fehlerzustand und endgültig.
/// `InAccessPointFallback` ist ein Unterzustand von `AcquiringNetwork`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    Idle,
    MountingStorage,
    StorageFailed,
    AcquiringNetwork,
    InAccessPointFallback,
    StartingServer,
    Running,
}

impl Stage {
    /// Kein weiterer Übergang möglich (nur Neustart hilft)
    pub const fn is_terminal(self) -> bool {
        matches!(self, Stage::StorageFailed | Stage::Running)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "Idle",
            Stage::MountingStorage => "MountingStorage",
            Stage::StorageFailed => "StorageFailed",
            Stage::AcquiringNetwork => "AcquiringNetwork",
            Stage::InAccessPointFallback => "InAccessPointFallback",
            Stage::StartingServer => "StartingServer",
            Stage::Running => "Running",
        }
    }
}

/// SD-Kartentyp wie vom Treiber gemeldet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CardType {
    Sd1,
    Sd2,
    Sdhc,
    Unknown,
}

impl CardType {
    pub const fn as_str(self) -> &'static str {
        match self {
            CardType::Sd1 => "SD1",
            CardType::Sd2 => "SD2",
            CardType::Sdhc => "SDHC",
            CardType::Unknown => "Unknown",
        }
    }
}

/// FAT-Variante, bestimmt über die Anzahl der Cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatType {
    Fat12,
    Fat16,
    Fat32,
}

impl FatType {
    /// Typ-Code wie in "FAT16" (12, 16 oder 32)
    pub const fn bits(self) -> u8 {
        match self {
            FatType::Fat12 => 12,
            FatType::Fat16 => 16,
            FatType::Fat32 => 32,
        }
    }
}

/// Geometrie des ersten FAT-Volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeGeometry {
    pub fat_type: FatType,
    pub blocks_per_cluster: u32,
    pub total_clusters: u32,
}

impl VolumeGeometry {
    /// Kapazität = Blöcke pro Cluster × Cluster × 512 Bytes
    pub const fn capacity_bytes(&self) -> u64 {
        self.blocks_per_cluster as u64 * self.total_clusters as u64 * BLOCK_SIZE as u64
    }

    pub const fn capacity_kib(&self) -> u64 {
        self.capacity_bytes() / 1024
    }

    pub const fn capacity_mib(&self) -> u64 {
        self.capacity_kib() / 1024
    }

    pub fn capacity_gib(&self) -> f32 {
        self.capacity_mib() as f32 / 1024.0
    }
}

/// Diagnose-Informationen nach erfolgreichem Mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeInfo {
    pub card_type: CardType,
    pub geometry: VolumeGeometry,
}

/// SPI-Geschwindigkeit für den Betrieb nach der Karten-Initialisierung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusSpeed {
    Full,
    Half,
    Quarter,
}

impl BusSpeed {
    pub const fn frequency_khz(self) -> u32 {
        match self {
            BusSpeed::Full => 20_000,
            BusSpeed::Half => 10_000,
            BusSpeed::Quarter => 5_000,
        }
    }
}

/// Feste Bus-Konfiguration für den SD-Mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// GPIO-Nummer der Chip-Select Leitung
    pub chip_select: u8,
    pub speed: BusSpeed,
}

/// Name + Passwort (Provisioning-AP oder FTP-Login)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials<'a> {
    pub name: &'a str,
    pub password: &'a str,
}

impl<'a> Credentials<'a> {
    pub const fn new(name: &'a str, password: &'a str) -> Self {
        Self { name, password }
    }
}

/// Optionen für den Netzwerk-Collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkOptions<'a> {
    /// Geräte-Kennung (z.B. "ESP32C6-a1b2c3")
    pub hostname: &'a str,
    /// Ausführliche Diagnose im Collaborator (z.B. AP-Scan loggen)
    pub debug_output: bool,
}

/// Ergebnis einer erfolgreichen Netzwerk-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: String<MAX_SSID_LEN>,
    pub address: Ipv4Addr,
}

// ============================================================================
// defmt::Format Implementations (optional feature)
// ============================================================================

#[cfg(feature = "defmt")]
impl defmt::Format for Cadence {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{=u32}ms", self.as_millis())
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VolumeGeometry {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "FAT{=u8} {{ blocks/cluster: {=u32}, clusters: {=u32}, {=u64} MiB }}",
            self.fat_type.bits(),
            self.blocks_per_cluster,
            self.total_clusters,
            self.capacity_mib()
        )
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for VolumeInfo {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{} {}", self.card_type.as_str(), self.geometry)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetworkInfo {
    fn format(&self, fmt: defmt::Formatter) {
        let [a, b, c, d] = self.address.octets();
        defmt::write!(
            fmt,
            "NetworkInfo {{ ssid: {}, ip: {}.{}.{}.{} }}",
            self.ssid.as_str(),
            a,
            b,
            c,
            d
        )
    }
}

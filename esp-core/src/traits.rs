//! Hardware Abstraction Traits
//!
//! Diese Traits definieren Schnittstellen für Hardware-Zugriff und
//! externe Collaborators (SD-Karte, WiFi-Provisioning, FTP-Server)
//! ohne konkrete Implementierung.
//!
//! # Implementierungen
//! - **Production:** esp-firmware (GPIO, embedded-sdmmc, esp-radio, embassy-net)
//! - **Testing:** Mocks in esp-tests

// Async Traits werden nur generisch genutzt (kein dyn), Send-Bounds sind nicht nötig
#![allow(async_fn_in_trait)]

use crate::types::{
    BusConfig, Cadence, CardType, Credentials, NetworkInfo, NetworkOptions, VolumeGeometry,
};

// ============================================================================
// Fehler-Typen
// ============================================================================

/// Konfigurationsfehler (Programmier- oder Deployment-Fehler)
///
/// Wird sofort an der Aufrufstelle gemeldet, niemals zur Laufzeit "repariert".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Blink-Intervall <= 0 (Wert in ms)
    InvalidCadence(i64),
    /// Pin lässt sich nicht als Ausgang konfigurieren
    InvalidPin,
    /// Geräte-Kennung passt nicht in eine SSID (max. 32 Bytes)
    InvalidIdentity,
}

/// Grund für einen fehlgeschlagenen SD-Mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MountError {
    /// Karte antwortet nicht (nicht eingesteckt, Verkabelung, CS-Pin)
    CardNotResponding,
    /// Lesen eines Blocks fehlgeschlagen
    ReadFailed,
    /// Kein FAT-Volume in der Partitionstabelle gefunden
    NoFatVolume,
    /// Sektorgröße ungleich 512 Bytes
    UnsupportedSectorSize,
}

/// Endgültiger Gerätefehler: SD-Karte fehlt oder ist unlesbar
///
/// Nicht behebbar ohne physischen Eingriff und Neustart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TerminalDeviceFault {
    pub cause: MountError,
}

// ============================================================================
// Status-LED
// ============================================================================

/// Trait für den Ausgangs-Pin der Status-LED
pub trait IndicatorPin {
    /// Konfiguriert den Pin als Ausgang
    ///
    /// # Fehlerbehandlung
    /// Gibt `ConfigError::InvalidPin` zurück wenn der Pin nicht nutzbar ist
    fn configure_output(&mut self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Setzt den definierten Ruhepegel (LED aus)
    fn set_inactive(&mut self);

    /// Invertiert den aktuellen Pegel
    fn toggle(&mut self);
}

/// Wartet ein Blink-Intervall ab
///
/// Production: embassy-time Timer, Testing: manuell gesteuerter Mock.
pub trait CadenceTimer {
    async fn after(&mut self, cadence: Cadence);
}

/// Steuerung der aktiven Blink-Cadence
///
/// Es ist immer höchstens eine Cadence aktiv. `replace` ersetzt die alte
/// atomar: nach der Rückkehr feuert kein Toggle der alten Cadence mehr.
pub trait CadenceControl {
    fn replace(&self, cadence: Cadence);

    /// Deaktiviert das Blinken bis zum nächsten `replace`
    fn stop(&self);

    fn current(&self) -> Option<Cadence>;

    /// Setzt eine Cadence aus Millisekunden
    ///
    /// # Fehlerbehandlung
    /// Gibt `ConfigError::InvalidCadence` zurück bei `interval_ms <= 0`,
    /// die bisher aktive Cadence bleibt dann unverändert.
    fn set_cadence(&self, interval_ms: i64) -> Result<Cadence, ConfigError> {
        let cadence = Cadence::from_millis(interval_ms)?;
        self.replace(cadence);
        Ok(cadence)
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// SD-Karten Collaborator (Block-Storage)
///
/// Die Abfragen sind erst nach erfolgreichem `mount` gültig.
pub trait BlockStorage {
    /// Initialisiert die Karte und sucht das erste FAT-Volume
    ///
    /// Darf beliebig lange blockieren (SPI-Init, Block-Reads).
    fn mount(&mut self, bus: &BusConfig) -> Result<(), MountError>;

    fn card_type(&self) -> CardType;

    fn geometry(&self) -> VolumeGeometry;
}

/// Wird vom Netzwerk-Collaborator beim Wechsel in den Access-Point Modus aufgerufen
///
/// Läuft nebenläufig zum blockierten `connect_or_provision` Aufruf.
pub trait FallbackListener {
    fn on_fallback(&self, provisioning_ssid: &str);
}

/// WiFi Collaborator mit Provisioning-Fallback
pub trait NetworkProvisioner {
    fn configure(&mut self, options: &NetworkOptions<'_>);

    /// Kehrt erst zurück wenn eine Verbindung besteht
    ///
    /// Kein Timeout: der Collaborator versucht es (ggf. über den
    /// Provisioning-AP) so lange wie nötig. `listener` ist für die Dauer
    /// dieses Aufrufs registriert.
    async fn connect_or_provision(
        &mut self,
        provisioning: &Credentials<'_>,
        listener: &dyn FallbackListener,
    ) -> NetworkInfo;
}

/// Dateitransfer-Server Collaborator (FTP)
pub trait TransferServer {
    /// Startet den Server, Fehler behandelt der Collaborator selbst
    fn start(&mut self, credentials: &Credentials<'_>);

    /// Erledigt anstehende Arbeit (begrenzte Latenz pro Aufruf)
    async fn service_pending(&mut self);
}

//! ESP Core - Platform-agnostic Bring-Up Logic and Traits
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert die Collaborator-Traits (SD-Karte, WiFi, FTP),
//! den Blink-Cadence Scheduler, die Bring-Up State Machine und die
//! FTP Protokoll-Logik.

#![cfg_attr(not(test), no_std)]

// Logging-Makros müssen vor allen anderen Modulen eingebunden werden
#[macro_use]
mod fmt;

pub mod cadence;
pub mod ftp;
pub mod indicator;
pub mod logic;
pub mod pump;
pub mod sequencer;
pub mod traits;
pub mod types;

// Re-exports für einfachen Zugriff
pub use cadence::CadenceScheduler;
pub use indicator::IndicatorDriver;
pub use logic::{chip_id_from_mac, device_id, locate_fat_volume, parse_boot_sector, truncate_str};
pub use sequencer::{BringUpConfig, BringUpReport, Sequencer};
pub use traits::{
    BlockStorage, CadenceControl, CadenceTimer, ConfigError, FallbackListener, IndicatorPin,
    MountError, NetworkProvisioner, TerminalDeviceFault, TransferServer,
};
pub use types::{
    BusConfig, BusSpeed, Cadence, CardType, Credentials, FatType, NetworkInfo, NetworkOptions,
    Stage, StatusCadence, VolumeGeometry, VolumeInfo,
};

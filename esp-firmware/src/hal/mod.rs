// Hardware Abstraction Layer (HAL) Module
//
// Implementiert die esp-core Traits für echte Hardware:
// GPIO Status-LED, embassy-time Timer und SD-Karte über SPI.

pub mod indicator;
pub mod sd_storage;

pub use indicator::{EmbassyCadenceTimer, GpioIndicatorPin};
pub use sd_storage::{FileEntry, FsError, SdBlockDevice, SdStorage, SdVolume};

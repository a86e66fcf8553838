// SD-Karte: embedded-sdmmc über esp-hal SPI
//
// SdStorage implementiert den BlockStorage-Trait für den Bring-Up.
// Nach dem Mount landet das geöffnete Volume in einer OnceCell,
// die sich SD-Adapter und FTP-Server teilen.
use core::cell::OnceCell;
use core::fmt::Write;

use defmt::{Debug2Format, debug, error, warn};
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::sdcard::CardType as SdCardType;
use embedded_sdmmc::{
    Block, BlockDevice, BlockIdx, DirEntry, Mode, RawDirectory, RawFile, SdCard, SdCardError,
    TimeSource, Timestamp, VolumeIdx, VolumeManager,
};
use esp_core::{
    BlockStorage, BusConfig, CardType, FatType, MountError, VolumeGeometry, locate_fat_volume,
    parse_boot_sector,
};
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use heapless::{String, Vec};

use crate::config::{SD_CS_GPIO_PIN, SD_MAX_LIST_ENTRIES};

/// SPI-Bus + Chip-Select, exklusiv für die SD-Karte
pub type SdSpiDevice = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, Delay>;
pub type SdBlockDevice = SdCard<SdSpiDevice, Delay>;
type SdVolumeManager = VolumeManager<SdBlockDevice, FixedTime>;

pub type FsError = embedded_sdmmc::Error<SdCardError>;

/// Keine RTC: alle Dateien bekommen denselben Zeitstempel (2025-01-01)
pub struct FixedTime;

impl TimeSource for FixedTime {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// Eintrag im Root-Verzeichnis (für LIST/NLST)
pub struct FileEntry {
    /// 8.3 Name, z.B. "README.TXT"
    pub name: String<12>,
    pub size: u32,
    pub is_dir: bool,
}

/// Gemountetes FAT-Volume mit geöffnetem Root-Verzeichnis
pub struct SdVolume {
    manager: SdVolumeManager,
    root: RawDirectory,
}

impl SdVolume {
    /// Root-Verzeichnis (ohne Volume-Label und LFN-Einträge)
    ///
    /// Mehr als `SD_MAX_LIST_ENTRIES` Einträge werden abgeschnitten.
    pub fn entries(&self) -> Result<Vec<FileEntry, SD_MAX_LIST_ENTRIES>, FsError> {
        let mut entries = Vec::new();
        self.manager.iterate_dir(self.root, |entry: &DirEntry| {
            if entry.attributes.is_volume() || entry.attributes.is_lfn() {
                return;
            }
            let mut name = String::new();
            let _ = write!(name, "{}", entry.name);
            let _ = entries.push(FileEntry {
                name,
                size: entry.size,
                is_dir: entry.attributes.is_directory(),
            });
        })?;
        Ok(entries)
    }

    pub fn file_size(&self, name: &str) -> Result<u32, FsError> {
        Ok(self.manager.find_directory_entry(self.root, name)?.size)
    }

    pub fn open(&self, name: &str, mode: Mode) -> Result<RawFile, FsError> {
        self.manager.open_file_in_dir(self.root, name, mode)
    }

    /// Liest bis zu `buffer.len()` Bytes, 0 = Dateiende
    pub fn read(&self, file: RawFile, buffer: &mut [u8]) -> Result<usize, FsError> {
        self.manager.read(file, buffer)
    }

    pub fn write(&self, file: RawFile, data: &[u8]) -> Result<(), FsError> {
        self.manager.write(file, data)
    }

    /// Schließt die Datei und schreibt Verzeichniseintrag + FAT zurück
    pub fn close(&self, file: RawFile) -> Result<(), FsError> {
        self.manager.close_file(file)
    }

    pub fn delete(&self, name: &str) -> Result<(), FsError> {
        self.manager.delete_file_in_dir(self.root, name)
    }
}

/// SD-Karten Collaborator
pub struct SdStorage<'a> {
    /// Bis zum Mount: rohe Karte, danach im VolumeManager
    card: Option<SdBlockDevice>,
    volume: &'a OnceCell<SdVolume>,
    card_type: CardType,
    geometry: VolumeGeometry,
}

impl<'a> SdStorage<'a> {
    /// # Parameter
    /// - `card`: SD-Karte, SPI bereits mit Init-Takt (400 kHz) konfiguriert
    /// - `volume`: Ablage für das gemountete Volume (geteilt mit dem FTP-Server)
    pub fn new(card: SdBlockDevice, volume: &'a OnceCell<SdVolume>) -> Self {
        Self {
            card: Some(card),
            volume,
            card_type: CardType::Unknown,
            geometry: VolumeGeometry {
                fat_type: FatType::Fat32,
                blocks_per_cluster: 0,
                total_clusters: 0,
            },
        }
    }
}

fn read_block(card: &SdBlockDevice, index: u32) -> Result<Block, MountError> {
    let mut blocks = [Block::new()];
    card.read(&mut blocks, BlockIdx(index)).map_err(|e| {
        error!("Storage: Reading block {=u32} failed: {}", index, Debug2Format(&e));
        MountError::ReadFailed
    })?;
    let [block] = blocks;
    Ok(block)
}

impl BlockStorage for SdStorage<'_> {
    fn mount(&mut self, bus: &BusConfig) -> Result<(), MountError> {
        let Some(card) = self.card.take() else {
            warn!("Storage: Card already handed to the volume manager");
            return Err(MountError::CardNotResponding);
        };
        if bus.chip_select != SD_CS_GPIO_PIN {
            warn!(
                "Storage: CS=GPIO{=u8} requested, but CS is wired to GPIO{=u8}",
                bus.chip_select, SD_CS_GPIO_PIN
            );
        }

        // Erster Zugriff initialisiert die Karte
        let size = card.num_bytes().map_err(|e| {
            error!("Storage: Card not responding: {}", Debug2Format(&e));
            MountError::CardNotResponding
        })?;
        debug!("Storage: Card reports {=u64} bytes", size);

        self.card_type = match card.get_card_type() {
            Some(SdCardType::SD1) => CardType::Sd1,
            Some(SdCardType::SD2) => CardType::Sd2,
            Some(SdCardType::SDHC) => CardType::Sdhc,
            None => CardType::Unknown,
        };

        let config = SpiConfig::default().with_frequency(Rate::from_khz(bus.speed.frequency_khz()));
        if let Err(e) = card.spi(|device| device.bus_mut().apply_config(&config)) {
            warn!("Storage: Keeping init clock: {}", Debug2Format(&e));
        }

        let mbr = read_block(&card, 0)?;
        let start = locate_fat_volume(&mbr.contents)?;
        let boot_sector = read_block(&card, start)?;
        self.geometry = parse_boot_sector(&boot_sector.contents)?;

        let manager = VolumeManager::new(card, FixedTime);
        let raw_volume = manager.open_raw_volume(VolumeIdx(0)).map_err(|e| {
            error!("Storage: Opening volume failed: {}", Debug2Format(&e));
            MountError::NoFatVolume
        })?;
        let root = manager.open_root_dir(raw_volume).map_err(|e| {
            error!("Storage: Opening root directory failed: {}", Debug2Format(&e));
            MountError::ReadFailed
        })?;

        if self.volume.set(SdVolume { manager, root }).is_err() {
            warn!("Storage: Volume was already mounted");
        }
        Ok(())
    }

    fn card_type(&self) -> CardType {
        self.card_type
    }

    fn geometry(&self) -> VolumeGeometry {
        self.geometry
    }
}

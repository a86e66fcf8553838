//! Pure Business Logic Functions
//!
//! Funktionen ohne Hardware-Dependencies (testbar!)

use core::fmt::Write;

use heapless::String;

use crate::traits::{ConfigError, MountError};
use crate::types::{BLOCK_SIZE, FatType, MAX_SSID_LEN, VolumeGeometry};

/// Offset der Partitionstabelle im MBR
const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_SIZE: usize = 16;

/// FAT-Partitionstypen: FAT12, FAT16 (<32M), FAT16, FAT32 CHS, FAT32 LBA, FAT16 LBA
const FAT_PARTITION_TYPES: [u8; 6] = [0x01, 0x04, 0x06, 0x0B, 0x0C, 0x0E];

/// Chip-ID aus der Factory-MAC: die unteren 24 Bit
///
/// # Beispiele
///
/// ```
/// # use esp_core::chip_id_from_mac;
/// let id = chip_id_from_mac([0x40, 0x4c, 0xca, 0x12, 0x34, 0x56]);
/// assert_eq!(id, 0x12_34_56);
/// ```
pub fn chip_id_from_mac(mac: [u8; 6]) -> u32 {
    u32::from_be_bytes([0, mac[3], mac[4], mac[5]])
}

/// Geräte-Kennung: Präfix + Chip-ID in Kleinbuchstaben-Hex
///
/// Wird als SSID des Provisioning-Access-Points verwendet.
///
/// # Fehlerbehandlung
/// Gibt `ConfigError::InvalidIdentity` zurück wenn das Ergebnis länger
/// als eine SSID (32 Bytes) wäre.
pub fn device_id(prefix: &str, chip_id: u32) -> Result<String<MAX_SSID_LEN>, ConfigError> {
    let mut id = String::new();
    write!(id, "{}{:x}", prefix, chip_id).map_err(|_| ConfigError::InvalidIdentity)?;
    Ok(id)
}

/// Kopiert `text` in einen String mit höchstens `N` Bytes
///
/// Gekürzt wird an einer Zeichengrenze. Der zweite Wert ist `true`,
/// wenn dabei etwas abgeschnitten wurde.
///
/// ```
/// # use esp_core::truncate_str;
/// let (name, cut) = truncate_str::<4>("esp32");
/// assert_eq!((name.as_str(), cut), ("esp3", true));
/// ```
pub fn truncate_str<const N: usize>(text: &str) -> (String<N>, bool) {
    let mut end = text.len().min(N);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::new();
    // passt immer: end <= N
    let _ = out.push_str(&text[..end]);
    (out, end < text.len())
}

fn read_u16(block: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([block[offset], block[offset + 1]])
}

fn read_u32(block: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        block[offset],
        block[offset + 1],
        block[offset + 2],
        block[offset + 3],
    ])
}

fn has_boot_signature(block: &[u8; 512]) -> bool {
    block[510] == 0x55 && block[511] == 0xAA
}

fn looks_like_boot_sector(block: &[u8; 512]) -> bool {
    // x86 Sprungbefehl am Anfang jedes FAT Boot-Sektors
    matches!(block[0], 0xEB | 0xE9)
}

/// Sucht den Start-Block des ersten FAT-Volumes
///
/// Block 0 ist entweder ein MBR mit Partitionstabelle oder bei
/// "Superfloppy"-Formatierung direkt der Boot-Sektor.
///
/// # Fehlerbehandlung
/// Gibt `MountError::NoFatVolume` zurück wenn keine Signatur oder keine
/// FAT-Partition gefunden wurde.
pub fn locate_fat_volume(block0: &[u8; 512]) -> Result<u32, MountError> {
    if !has_boot_signature(block0) {
        return Err(MountError::NoFatVolume);
    }
    if looks_like_boot_sector(block0) && parse_boot_sector(block0).is_ok() {
        return Ok(0);
    }

    (0..4)
        .map(|index| PARTITION_TABLE_OFFSET + index * PARTITION_ENTRY_SIZE)
        .find(|&entry| FAT_PARTITION_TYPES.contains(&block0[entry + 4]))
        .map(|entry| read_u32(block0, entry + 8))
        .ok_or(MountError::NoFatVolume)
}

/// Liest die Volume-Geometrie aus dem BIOS Parameter Block
///
/// Die FAT-Variante ergibt sich aus der Cluster-Anzahl
/// (< 4085: FAT12, < 65525: FAT16, sonst FAT32).
pub fn parse_boot_sector(block: &[u8; 512]) -> Result<VolumeGeometry, MountError> {
    if !has_boot_signature(block) {
        return Err(MountError::NoFatVolume);
    }

    let bytes_per_sector = read_u16(block, 11) as u32;
    if bytes_per_sector != BLOCK_SIZE {
        return Err(MountError::UnsupportedSectorSize);
    }

    let blocks_per_cluster = block[13] as u32;
    if blocks_per_cluster == 0 || !blocks_per_cluster.is_power_of_two() {
        return Err(MountError::NoFatVolume);
    }

    let reserved = read_u16(block, 14) as u32;
    let fat_count = block[16] as u32;
    let root_entries = read_u16(block, 17) as u32;
    let total_blocks = match read_u16(block, 19) {
        0 => read_u32(block, 32),
        small => small as u32,
    };
    let fat_size = match read_u16(block, 22) {
        0 => read_u32(block, 36),
        small => small as u32,
    };
    if fat_count == 0 || fat_size == 0 {
        return Err(MountError::NoFatVolume);
    }

    let root_dir_blocks = (root_entries * 32).div_ceil(BLOCK_SIZE);
    let data_blocks = fat_count
        .checked_mul(fat_size)
        .and_then(|fats| fats.checked_add(reserved + root_dir_blocks))
        .and_then(|meta| total_blocks.checked_sub(meta))
        .ok_or(MountError::NoFatVolume)?;
    let total_clusters = data_blocks / blocks_per_cluster;

    let fat_type = match total_clusters {
        0..4085 => FatType::Fat12,
        4085..65525 => FatType::Fat16,
        _ => FatType::Fat32,
    };

    Ok(VolumeGeometry {
        fat_type,
        blocks_per_cluster,
        total_clusters,
    })
}

// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen
//
// Die GPIO-Peripherals selbst werden in main.rs ausgewählt (typisierte
// Peripherals), die Nummern hier dienen der Diagnose und müssen dazu passen.

use esp_core::BusSpeed;

// ============================================================================
// Status-LED
// ============================================================================

/// GPIO-Pin der Status-LED (XIAO ESP32-C6: User-LED an GPIO15)
pub const INDICATOR_GPIO_PIN: u8 = 15;

/// LED leuchtet bei High-Pegel?
/// XIAO ESP32-C6 User-LED ist low-aktiv
pub const INDICATOR_ACTIVE_HIGH: bool = false;

// ============================================================================
// SD-Karte (SPI)
// ============================================================================

/// SPI-Verkabelung:
/// ESP32-C6   SD-Karten-Modul
/// GPIO19 <-> SCK/CLK
/// GPIO20 <-> MISO
/// GPIO18 <-> MOSI
/// GPIO21 <-> CS
/// 3V3    <-> Vcc
/// GND    <-> Gnd
pub const SD_CS_GPIO_PIN: u8 = 21;

/// Takt während der Karten-Initialisierung (SD-Standard: max. 400 kHz)
pub const SD_INIT_FREQUENCY_KHZ: u32 = 400;

/// Takt nach erfolgreicher Initialisierung
pub const SD_BUS_SPEED: BusSpeed = BusSpeed::Full;

/// Maximale Anzahl Einträge pro LIST Antwort
pub const SD_MAX_LIST_ENTRIES: usize = 64;

/// Puffer für Datei-Transfers (ein SD-Block)
pub const SD_TRANSFER_CHUNK_SIZE: usize = 512;

// ============================================================================
// WiFi Konfiguration
// ============================================================================

/// WiFi SSID (Netzwerk-Name)
/// Wird zur Build-Zeit aus der Environment Variable WIFI_SSID geladen
/// Setze diese in .env file (siehe .env.example)
pub const WIFI_SSID: &str = env!(
    "WIFI_SSID",
    "WiFi SSID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

// SSID: max. 32 Bytes (802.11)
const _: () = assert!(WIFI_SSID.len() <= 32);

/// WiFi Passwort
/// Wird zur Build-Zeit aus der Environment Variable WIFI_PASSWORD geladen
/// Setze diese in .env file (siehe .env.example)
pub const WIFI_PASSWORD: &str = env!(
    "WIFI_PASSWORD",
    "WiFi Password nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Fehlgeschlagene Verbindungsversuche bis der Provisioning-AP startet
pub const WIFI_CONNECT_ATTEMPTS: u32 = 3;

/// Wartezeit nach Verbindungsfehler vor erneutem Versuch
pub const WIFI_RETRY_DELAY_SECS: u64 = 5;

/// AP-Scan vor jedem Verbindungsversuch loggen
pub const WIFI_DEBUG_OUTPUT: bool = false;

/// Heap-Größe für WiFi (Bytes)
/// WiFi benötigt dynamischen Speicher für Pakete
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

// ============================================================================
// Provisioning Access Point
// ============================================================================

/// SSID-Präfix, danach folgt die Chip-ID in Hex (z.B. "ESP32C6-a1b2c3")
pub const PROVISIONING_SSID_PREFIX: &str = "ESP32C6-";

/// WPA2-Passwort des Access Points (min. 8 Zeichen)
pub const PROVISIONING_PASSWORD: &str = "12345678";

// WPA2: 8..=63 Zeichen
const _: () = assert!(PROVISIONING_PASSWORD.len() >= 8 && PROVISIONING_PASSWORD.len() <= 63);

// ============================================================================
// FTP Server Konfiguration
// ============================================================================

/// FTP Login
/// Kann in .env überschrieben werden (FTP_USER, FTP_PASSWORD)
pub const FTP_USER: &str = match option_env!("FTP_USER") {
    Some(user) => user,
    None => "esp32",
};

pub const FTP_PASSWORD: &str = match option_env!("FTP_PASSWORD") {
    Some(password) => password,
    None => "esp32",
};

// Login muss in die Puffer des FTP-Servers passen
const _: () = assert!(!FTP_USER.is_empty() && FTP_USER.len() <= 32);
const _: () = assert!(!FTP_PASSWORD.is_empty() && FTP_PASSWORD.len() <= 64);

/// Control-Port (Standard: 21)
pub const FTP_CONTROL_PORT: u16 = 21;

/// Passive-Mode Ports: FTP_PASSIVE_PORT_START .. +FTP_PASSIVE_PORT_COUNT
pub const FTP_PASSIVE_PORT_START: u16 = 50_000;
pub const FTP_PASSIVE_PORT_COUNT: u16 = 100;

/// Wartezeit auf die Daten-Verbindung des Clients nach PASV
pub const FTP_DATA_ACCEPT_TIMEOUT_SECS: u64 = 10;

/// Inaktivitäts-Timeout der Control-Verbindung
pub const FTP_IDLE_TIMEOUT_SECS: u64 = 300;

/// TCP Buffer-Größen in Bytes
pub const FTP_CONTROL_BUFFER_SIZE: usize = 512;
pub const FTP_DATA_BUFFER_SIZE: usize = 2048;

/// Sockets im embassy-net Stack: FTP Control + Data + DHCP
pub const NET_SOCKET_COUNT: usize = 4;

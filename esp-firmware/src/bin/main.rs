// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi benötigt dynamischen Speicher)
extern crate alloc;

use core::cell::OnceCell;

// Embassy Async Runtime
use embassy_executor::Spawner;
use embassy_net::{Config as NetConfig, StackResources};
use static_cell::{ConstStaticCell, StaticCell};

// ESP32-C6 HAL
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::efuse::Efuse;
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::interrupt::Priority;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::rng::Rng;
use esp_hal::spi::Mode as SpiMode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::timer::timg::TimerGroup;
use esp_rtos::embassy::InterruptExecutor;

use defmt::info;
use embedded_hal_bus::spi::ExclusiveDevice;
use embedded_sdmmc::SdCard;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

// Projekt-Module und Konfiguration
use esp_core::{BusConfig, Credentials, NetworkOptions, chip_id_from_mac, device_id};
use esp_ftp_nas::config::{
    EXTRA_HEAP_SIZE, FTP_PASSWORD, FTP_USER, INDICATOR_ACTIVE_HIGH, INDICATOR_GPIO_PIN,
    NET_SOCKET_COUNT, PROVISIONING_PASSWORD, PROVISIONING_SSID_PREFIX, SD_BUS_SPEED,
    SD_CS_GPIO_PIN, SD_INIT_FREQUENCY_KHZ, WIFI_DEBUG_OUTPUT, WIFI_HEAP_SIZE,
};
use esp_ftp_nas::ftp::{FtpBuffers, FtpServer};
use esp_ftp_nas::hal::{GpioIndicatorPin, SdStorage};
use esp_ftp_nas::tasks::{WifiProvisioner, connection_task, indicator_task, net_task};
use esp_ftp_nas::{BringUpConfig, CADENCE, Sequencer};

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

/// TCP Buffer des FTP-Servers (zu groß für den Stack von main)
static FTP_BUFFERS: ConstStaticCell<FtpBuffers> = ConstStaticCell::new(FtpBuffers::new());

/// Main Entry Point
///
/// Initialisiert Hardware, startet den Indicator auf dem Interrupt-Executor
/// und führt dann den Bring-Up aus: SD-Karte → WiFi → FTP-Server.
/// Danach bedient main() für immer den FTP-Server.
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // ESP32-C6 Konfiguration: CPU auf maximale Taktfrequenz (160 MHz)
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap Allocator initialisieren (WiFi braucht dynamischen Speicher!)
    // Zwei Bereiche: reclaimed RAM (64 KB) + extra (36 KB) = 100 KB total
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    // Embassy Runtime initialisieren (Timer + Software Interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    // Status-LED zuerst: Startup-Cadence ab dem ersten Bring-Up Schritt.
    // Eigener Executor auf Software-Interrupt 1, main blockiert beim SD-Init.
    let initial = if INDICATOR_ACTIVE_HIGH {
        Level::Low
    } else {
        Level::High
    };
    let led = Output::new(peripherals.GPIO15, initial, OutputConfig::default());
    let pin = GpioIndicatorPin::new(led, INDICATOR_ACTIVE_HIGH);

    static INDICATOR_EXECUTOR: StaticCell<InterruptExecutor<1>> = StaticCell::new();
    let executor =
        INDICATOR_EXECUTOR.init(InterruptExecutor::new(sw_interrupt.software_interrupt1));
    let indicator_spawner = executor.start(Priority::Priority2);
    indicator_spawner.spawn(indicator_task(pin)).unwrap();
    info!("Indicator: Status LED on GPIO{=u8}", INDICATOR_GPIO_PIN);

    // Geräte-ID aus der Factory-MAC: Provisioning-SSID und Hostname
    let chip_id = chip_id_from_mac(Efuse::mac_address());
    let device_name = device_id(PROVISIONING_SSID_PREFIX, chip_id).expect("Invalid device name");
    info!("");
    info!("----===== ESP32-C6 FTP SERVER (ID: {=u32:X}) =====----", chip_id);
    info!("");

    // SD-Karte an SPI2, Init-Takt 400 kHz (Umschalten nach dem Mount)
    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_khz(SD_INIT_FREQUENCY_KHZ))
        .with_mode(SpiMode::_0);
    let spi = Spi::new(peripherals.SPI2, spi_config)
        .expect("Failed to initialize SPI")
        .with_sck(peripherals.GPIO19)
        .with_mosi(peripherals.GPIO18)
        .with_miso(peripherals.GPIO20);
    let chip_select = Output::new(peripherals.GPIO21, Level::High, OutputConfig::default());
    let device = ExclusiveDevice::new(spi, chip_select, Delay::new())
        .expect("Failed to set up SD chip select");
    let card = SdCard::new(device, Delay::new());

    let volume = OnceCell::new();
    let mut storage = SdStorage::new(card, &volume);

    // WiFi Hardware initialisieren
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, wifi_interface) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    // Random seed für TCP/IP Stack (von Hardware RNG)
    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // FTP Control + Daten-Socket, Rest Reserve für DHCP
    static RESOURCES: StaticCell<StackResources<NET_SOCKET_COUNT>> = StaticCell::new();
    let resources = RESOURCES.init(StackResources::new());

    // embassy-net erstellt Stack + Runner (nutzt STA interface für Client-Modus)
    let (stack, runner) = embassy_net::new(
        wifi_interface.sta,
        NetConfig::dhcpv4(Default::default()),
        resources,
        seed,
    );

    // Radio startet erst, wenn der Bring-Up die Verbindung anfordert
    spawner.spawn(connection_task(wifi_controller)).unwrap();
    spawner.spawn(net_task(runner)).unwrap();

    let mut network = WifiProvisioner::new(stack);
    let mut server = FtpServer::new(stack, &volume, FTP_BUFFERS.take());

    let config = BringUpConfig {
        bus: BusConfig {
            chip_select: SD_CS_GPIO_PIN,
            speed: SD_BUS_SPEED,
        },
        network: NetworkOptions {
            hostname: device_name.as_str(),
            debug_output: WIFI_DEBUG_OUTPUT,
        },
        provisioning: Credentials::new(device_name.as_str(), PROVISIONING_PASSWORD),
        server: Credentials::new(FTP_USER, FTP_PASSWORD),
    };

    Sequencer::new(&CADENCE)
        .run(&mut storage, &mut network, &mut server, &config)
        .await
}

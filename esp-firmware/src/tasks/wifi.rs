// WiFi Task - Verbindet mit WLAN, startet bei Bedarf den Provisioning-AP
use defmt::{Debug2Format, error, info, warn};
use embassy_net::{ConfigV4, DhcpConfig, Runner, Stack, StaticConfigV4};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use esp_core::{
    Credentials, FallbackListener, NetworkInfo, NetworkOptions, NetworkProvisioner, truncate_str,
};
use esp_radio::wifi::{
    AccessPointConfig, AuthMethod, ClientConfig, ModeConfig, ScanConfig, WifiController,
    WifiDevice, WifiEvent,
};
use heapless::String;

use crate::config::{WIFI_CONNECT_ATTEMPTS, WIFI_PASSWORD, WIFI_RETRY_DELAY_SECS, WIFI_SSID};

/// SSID + Passwort des Provisioning-Access-Points
#[derive(Clone)]
pub struct AccessPointSettings {
    ssid: String<32>,
    password: String<64>,
}

impl AccessPointSettings {
    fn from_credentials(credentials: &Credentials<'_>) -> Self {
        let (ssid, ssid_cut) = truncate_str(credentials.name);
        let (password, password_cut) = truncate_str(credentials.password);
        if ssid_cut || password_cut {
            warn!("WiFi: Access point SSID or password too long, truncated");
        }
        Self { ssid, password }
    }

    fn config(&self) -> AccessPointConfig {
        AccessPointConfig::default()
            .with_ssid(self.ssid.as_str().into())
            .with_password(self.password.as_str().into())
            .with_auth_method(AuthMethod::Wpa2Personal)
    }
}

/// Startauftrag an den Connection Task
#[derive(Clone)]
pub struct ConnectRequest {
    access_point: AccessPointSettings,
    debug_output: bool,
}

/// Meldungen des Connection Tasks an den Provisioner
#[derive(Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LinkEvent {
    /// Gespeichertes WLAN nicht erreichbar, AP+STA aktiv
    AccessPoint,
    /// Station ist verbunden
    Up,
}

/// Der Connection Task startet das Radio erst nach diesem Signal
static CONNECT_REQUEST: Signal<CriticalSectionRawMutex, ConnectRequest> = Signal::new();

static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, 4> = Channel::new();

fn publish(event: LinkEvent) {
    // Nach dem Bring-Up hört niemand mehr zu, dann wird verworfen
    if LINK_EVENTS.try_send(event).is_err() {
        warn!("WiFi: Dropped link event {}", event);
    }
}

/// WiFi Connection Task
///
/// Managed die WiFi-Verbindung:
/// - Wartet auf den Startauftrag vom Bring-Up
/// - Verbindet mit dem gespeicherten Access Point
/// - Nach `WIFI_CONNECT_ATTEMPTS` Fehlversuchen: AP+STA mit Provisioning-SSID,
///   die Station versucht es weiter
/// - Überwacht Verbindung und reconnected bei Bedarf
#[embassy_executor::task]
pub async fn connection_task(mut controller: WifiController<'static>) {
    let request = CONNECT_REQUEST.wait().await;
    info!("WiFi: Starting connection task");

    let client_config = ClientConfig::default()
        .with_ssid(WIFI_SSID.into())
        .with_password(WIFI_PASSWORD.into());
    let mut mode = ModeConfig::Client(client_config.clone());
    let mut failed_attempts: u32 = 0;
    let mut access_point_active = false;

    loop {
        if matches!(controller.is_started(), Ok(false)) {
            info!("WiFi: Configuring and starting...");

            if let Err(e) = controller.set_config(&mode) {
                error!("WiFi: Failed to set configuration: {}", Debug2Format(&e));
                Timer::after(Duration::from_secs(WIFI_RETRY_DELAY_SECS)).await;
                continue;
            }

            if let Err(e) = controller.start_async().await {
                error!("WiFi: Failed to start: {}", Debug2Format(&e));
                Timer::after(Duration::from_secs(WIFI_RETRY_DELAY_SECS)).await;
                continue;
            }

            info!("WiFi: Started successfully");
        }

        // Scan for networks (nur mit debug_output)
        if request.debug_output {
            match controller
                .scan_with_config_async(ScanConfig::default())
                .await
            {
                Ok(ap_infos) => {
                    info!("WiFi: Found {} access points", ap_infos.len());
                    for ap_info in &ap_infos {
                        if ap_info.ssid.as_str() == WIFI_SSID {
                            info!(
                                "WiFi: Target AP found - SSID: {}, Signal: {} dBm",
                                WIFI_SSID, ap_info.signal_strength
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!("WiFi: Scan failed: {}", Debug2Format(&e));
                }
            }
        }

        info!("WiFi: Connecting to '{}'...", WIFI_SSID);
        match controller.connect_async().await {
            Ok(_) => {
                info!("WiFi: Connected successfully!");
                failed_attempts = 0;
                publish(LinkEvent::Up);
            }
            Err(e) => {
                failed_attempts += 1;
                error!(
                    "WiFi: Connection failed ({=u32}/{=u32}): {}",
                    failed_attempts,
                    WIFI_CONNECT_ATTEMPTS,
                    Debug2Format(&e)
                );

                if !access_point_active && failed_attempts >= WIFI_CONNECT_ATTEMPTS {
                    access_point_active = true;
                    warn!(
                        "WiFi: SSID not found, starting access point '{}'",
                        request.access_point.ssid.as_str()
                    );
                    mode = ModeConfig::ApSta(client_config.clone(), request.access_point.config());
                    publish(LinkEvent::AccessPoint);

                    // Neustart mit AP+STA Konfiguration
                    if let Err(e) = controller.stop_async().await {
                        error!("WiFi: Failed to stop: {}", Debug2Format(&e));
                    }
                }

                Timer::after(Duration::from_secs(WIFI_RETRY_DELAY_SECS)).await;
                continue;
            }
        }

        // Wait for disconnect
        controller.wait_for_event(WifiEvent::StaDisconnected).await;
        warn!("WiFi: Disconnected from AP, will retry...");

        Timer::after(Duration::from_secs(2)).await;
    }
}

/// Network Task
///
/// Überwacht den Netzwerk-Stack:
/// - Prozessiert Netzwerk-Pakete
/// - Managed TCP/IP Stack
#[embassy_executor::task]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// Wartet bis eine IP-Adresse vom DHCP-Server erhalten wurde
async fn wait_for_address(stack: Stack<'static>) -> StaticConfigV4 {
    while !stack.is_link_up() {
        Timer::after(Duration::from_millis(500)).await;
    }
    info!("WiFi: Link is up, waiting for IP address...");

    loop {
        if let Some(config) = stack.config_v4() {
            info!("WiFi: Got IP address!");
            info!("  Gateway: {}", Debug2Format(&config.gateway));
            info!("  DNS:     {}", Debug2Format(&config.dns_servers));
            return config;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// WiFi Collaborator für den Bring-Up
///
/// Steuert den Connection Task über Signal/Channel, der Controller
/// selbst gehört dem Task (Reconnects nach dem Bring-Up).
pub struct WifiProvisioner {
    stack: Stack<'static>,
    debug_output: bool,
}

impl WifiProvisioner {
    pub fn new(stack: Stack<'static>) -> Self {
        Self {
            stack,
            debug_output: false,
        }
    }
}

impl NetworkProvisioner for WifiProvisioner {
    /// Setzt den DHCP-Hostnamen (Option 12) und das Scan-Logging
    ///
    /// Muss vor `connect_or_provision` laufen, danach startet erst das Radio.
    fn configure(&mut self, options: &NetworkOptions<'_>) {
        let mut dhcp = DhcpConfig::default();
        dhcp.hostname = options.hostname.try_into().ok();
        if dhcp.hostname.is_none() {
            warn!("WiFi: Hostname '{}' too long for DHCP", options.hostname);
        }
        self.stack.set_config_v4(ConfigV4::Dhcp(dhcp));
        info!("WiFi: Device name '{}'", options.hostname);
        self.debug_output = options.debug_output;
    }

    async fn connect_or_provision(
        &mut self,
        provisioning: &Credentials<'_>,
        listener: &dyn FallbackListener,
    ) -> NetworkInfo {
        CONNECT_REQUEST.signal(ConnectRequest {
            access_point: AccessPointSettings::from_credentials(provisioning),
            debug_output: self.debug_output,
        });

        loop {
            match LINK_EVENTS.receive().await {
                LinkEvent::AccessPoint => listener.on_fallback(provisioning.name),
                LinkEvent::Up => break,
            }
        }

        let config = wait_for_address(self.stack).await;
        NetworkInfo {
            ssid: truncate_str(WIFI_SSID).0,
            address: config.address.address(),
        }
    }
}

// Indicator Task - Status-LED blinkt mit der aktuellen Cadence
use defmt::{error, info};
use esp_core::IndicatorDriver;

use crate::CADENCE;
use crate::hal::{EmbassyCadenceTimer, GpioIndicatorPin};

/// Indicator Task
///
/// Läuft auf dem Interrupt-Executor mit höherer Priorität als `main`,
/// damit blockierende Collaborator-Aufrufe (SPI-Init der SD-Karte)
/// das Blinken nicht anhalten.
///
/// # Parameter
/// - `pin`: Status-LED (bereits als Ausgang konfiguriert)
#[embassy_executor::task]
pub async fn indicator_task(pin: GpioIndicatorPin<'static>) {
    let mut driver = match IndicatorDriver::initialize(pin) {
        Ok(driver) => driver,
        Err(e) => {
            error!("Indicator: Failed to initialize: {}", e);
            return;
        }
    };
    info!("Indicator: Started");

    CADENCE.run(&mut driver, &mut EmbassyCadenceTimer).await
}

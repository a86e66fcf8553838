// Status-LED: GPIO Ausgang + embassy-time Intervall
use embassy_time::{Duration, Timer};
use esp_core::{Cadence, CadenceTimer, IndicatorPin};
use esp_hal::gpio::Output;

/// Status-LED an einem normalen GPIO
///
/// Der Pin wird in main.rs bereits als Ausgang erzeugt,
/// hier kommt nur die Polarität dazu.
pub struct GpioIndicatorPin<'d> {
    output: Output<'d>,
    active_high: bool,
}

impl<'d> GpioIndicatorPin<'d> {
    pub fn new(output: Output<'d>, active_high: bool) -> Self {
        Self {
            output,
            active_high,
        }
    }
}

impl IndicatorPin for GpioIndicatorPin<'_> {
    fn set_inactive(&mut self) {
        if self.active_high {
            self.output.set_low();
        } else {
            self.output.set_high();
        }
    }

    fn toggle(&mut self) {
        self.output.toggle();
    }
}

/// Intervall-Timer für den Cadence Scheduler
pub struct EmbassyCadenceTimer;

impl CadenceTimer for EmbassyCadenceTimer {
    async fn after(&mut self, cadence: Cadence) {
        Timer::after(Duration::from_millis(cadence.as_millis() as u64)).await;
    }
}

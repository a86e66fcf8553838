//! Indicator Driver - einzelner binärer Ausgang (Status-LED)

use crate::traits::{ConfigError, IndicatorPin};

/// Besitzt den Pin der Status-LED
///
/// Reines Blatt ohne eigenen Zustand: es merkt sich keinen Pegel,
/// `toggle()` invertiert direkt den Pin.
pub struct IndicatorDriver<P: IndicatorPin> {
    pin: P,
}

impl<P: IndicatorPin> IndicatorDriver<P> {
    /// Konfiguriert den Pin als Ausgang und setzt den Ruhepegel
    ///
    /// # Fehlerbehandlung
    /// Gibt `ConfigError::InvalidPin` zurück wenn der Pin nicht als Ausgang taugt
    pub fn initialize(mut pin: P) -> Result<Self, ConfigError> {
        pin.configure_output()?;
        pin.set_inactive();
        Ok(Self { pin })
    }

    /// Invertiert den LED-Pegel (kann nicht fehlschlagen)
    pub fn toggle(&mut self) {
        self.pin.toggle();
    }

    /// LED aus (Ruhepegel)
    pub fn set_inactive(&mut self) {
        self.pin.set_inactive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockPin {
        level: bool,
        toggles: usize,
        reject_output: bool,
    }

    impl IndicatorPin for MockPin {
        fn configure_output(&mut self) -> Result<(), ConfigError> {
            if self.reject_output {
                return Err(ConfigError::InvalidPin);
            }
            Ok(())
        }

        fn set_inactive(&mut self) {
            self.level = false;
        }

        fn toggle(&mut self) {
            self.level = !self.level;
            self.toggles += 1;
        }
    }

    #[test]
    fn test_initialize_sets_inactive_level() {
        let pin = MockPin {
            level: true,
            ..Default::default()
        };
        let driver = IndicatorDriver::initialize(pin).unwrap();
        assert!(!driver.pin.level);
        assert_eq!(driver.pin.toggles, 0);
    }

    #[test]
    fn test_initialize_rejects_invalid_pin() {
        let pin = MockPin {
            reject_output: true,
            ..Default::default()
        };
        assert!(matches!(
            IndicatorDriver::initialize(pin),
            Err(ConfigError::InvalidPin)
        ));
    }

    #[test]
    fn test_toggle_flips_level() {
        let mut driver = IndicatorDriver::initialize(MockPin::default()).unwrap();
        driver.toggle();
        assert!(driver.pin.level);
        driver.toggle();
        assert!(!driver.pin.level);
        assert_eq!(driver.pin.toggles, 2);
    }
}

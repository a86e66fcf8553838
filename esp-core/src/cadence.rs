//! Cadence Scheduler - periodisches Toggeln der Status-LED
//!
//! Der Scheduler wird von zwei Seiten benutzt:
//! - Bring-Up Sequencer (und Fallback-Callback) setzen per `replace()` die Cadence
//! - Die Blink-Schleife `run()` läuft in einem eigenen Task mit höherer
//!   Priorität und toggelt die LED im eingestellten Intervall
//!
//! Der Zustand ist ein einzelnes Schedule-Handle (Cadence + Generation)
//! hinter einem Critical-Section Mutex. Ein `replace()` erhöht die
//! Generation, ein Timer-Ablauf der alten Generation toggelt nicht mehr.

use core::cell::Cell;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use crate::indicator::IndicatorDriver;
use crate::traits::{CadenceControl, CadenceTimer, IndicatorPin};
use crate::types::Cadence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    cadence: Option<Cadence>,
    generation: u32,
}

/// Genau eine aktive Blink-Cadence, atomar ersetzbar
///
/// `const fn new()` erlaubt die Nutzung als `static`.
pub struct CadenceScheduler {
    schedule: Mutex<CriticalSectionRawMutex, Cell<Schedule>>,
    changed: Signal<CriticalSectionRawMutex, ()>,
}

impl CadenceScheduler {
    pub const fn new() -> Self {
        Self {
            schedule: Mutex::new(Cell::new(Schedule {
                cadence: None,
                generation: 0,
            })),
            changed: Signal::new(),
        }
    }

    fn snapshot(&self) -> Schedule {
        self.schedule.lock(|schedule| schedule.get())
    }

    fn swap(&self, cadence: Option<Cadence>) {
        self.schedule.lock(|schedule| {
            let current = schedule.get();
            schedule.set(Schedule {
                cadence,
                generation: current.generation.wrapping_add(1),
            });
        });
        self.changed.signal(());
    }

    /// Toggelt nur wenn das gewartete Schedule noch aktiv ist
    ///
    /// Prüfung und Toggle laufen in derselben Critical Section wie `swap()`.
    fn fire<P: IndicatorPin>(&self, armed: Schedule, driver: &mut IndicatorDriver<P>) -> bool {
        self.schedule.lock(|schedule| {
            if schedule.get() == armed {
                driver.toggle();
                true
            } else {
                false
            }
        })
    }

    /// Blink-Schleife - läuft für immer
    ///
    /// Muss in einem Task laufen, der nicht vom Bring-Up blockiert wird
    /// (Firmware: Interrupt-Executor mit höherer Priorität).
    ///
    /// # Parameter
    /// - `driver`: Indicator Driver (Hardware oder Mock)
    /// - `timer`: Wartet ein Intervall ab (embassy-time oder Mock)
    pub async fn run<P: IndicatorPin, T: CadenceTimer>(
        &self,
        driver: &mut IndicatorDriver<P>,
        timer: &mut T,
    ) -> ! {
        loop {
            let armed = self.snapshot();
            match armed.cadence {
                // Inaktiv: warten bis jemand eine Cadence setzt
                None => self.changed.wait().await,
                Some(cadence) => {
                    match select(timer.after(cadence), self.changed.wait()).await {
                        Either::First(()) => {
                            if !self.fire(armed, driver) {
                                debug!("Indicator: stale tick dropped");
                            }
                        }
                        // Neue Cadence: sofort neu aufziehen
                        Either::Second(()) => {}
                    }
                }
            }
        }
    }
}

impl Default for CadenceScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CadenceControl for CadenceScheduler {
    fn replace(&self, cadence: Cadence) {
        debug!("Indicator: cadence -> {=u32}ms", cadence.as_millis());
        self.swap(Some(cadence));
    }

    fn stop(&self) {
        debug!("Indicator: stopped");
        self.swap(None);
    }

    fn current(&self) -> Option<Cadence> {
        self.snapshot().cadence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ConfigError;
    use crate::types::StatusCadence;

    use core::cell::RefCell;
    use core::pin::pin;
    use core::task::{Context, Poll, Waker};

    struct CountingPin<'a> {
        toggles: &'a Cell<usize>,
    }

    impl IndicatorPin for CountingPin<'_> {
        fn set_inactive(&mut self) {}

        fn toggle(&mut self) {
            self.toggles.set(self.toggles.get() + 1);
        }
    }

    /// Timer-Mock: jedes Intervall läuft nach genau einem Poll ab
    struct StepTimer<'a> {
        armed: &'a RefCell<Vec<u32>>,
    }

    impl CadenceTimer for StepTimer<'_> {
        async fn after(&mut self, cadence: Cadence) {
            self.armed.borrow_mut().push(cadence.as_millis());
            embassy_futures::yield_now().await;
        }
    }

    fn poll<F: Future>(fut: core::pin::Pin<&mut F>) -> Poll<F::Output> {
        let mut cx = Context::from_waker(Waker::noop());
        fut.poll(&mut cx)
    }

    #[test]
    fn test_new_scheduler_is_inactive() {
        let scheduler = CadenceScheduler::new();
        assert_eq!(scheduler.current(), None);
    }

    #[test]
    fn test_replace_keeps_only_last_cadence() {
        let scheduler = CadenceScheduler::new();
        for ms in [150, 500, 750, 1000] {
            scheduler.set_cadence(ms).unwrap();
        }
        assert_eq!(
            scheduler.current(),
            Some(StatusCadence::Running.cadence())
        );
    }

    #[test]
    fn test_invalid_cadence_keeps_previous() {
        let scheduler = CadenceScheduler::new();
        scheduler.set_cadence(500).unwrap();
        assert_eq!(
            scheduler.set_cadence(0),
            Err(ConfigError::InvalidCadence(0))
        );
        assert_eq!(scheduler.current().map(Cadence::as_millis), Some(500));
    }

    #[test]
    fn test_blink_loop_toggles_each_interval() {
        let scheduler = CadenceScheduler::new();
        let toggles = Cell::new(0);
        let armed = RefCell::new(Vec::new());
        let mut driver = IndicatorDriver::initialize(CountingPin { toggles: &toggles }).unwrap();
        let mut timer = StepTimer { armed: &armed };

        scheduler.set_cadence(150).unwrap();
        let mut blink = pin!(scheduler.run(&mut driver, &mut timer));

        assert!(poll(blink.as_mut()).is_pending());
        assert_eq!(toggles.get(), 0);
        for expected in 1..=3 {
            assert!(poll(blink.as_mut()).is_pending());
            assert_eq!(toggles.get(), expected);
        }
        assert!(armed.borrow().iter().all(|&ms| ms == 150));
    }

    #[test]
    fn test_stopped_scheduler_does_not_toggle() {
        let scheduler = CadenceScheduler::new();
        let toggles = Cell::new(0);
        let armed = RefCell::new(Vec::new());
        let mut driver = IndicatorDriver::initialize(CountingPin { toggles: &toggles }).unwrap();
        let mut timer = StepTimer { armed: &armed };

        scheduler.set_cadence(250).unwrap();
        scheduler.stop();
        assert_eq!(scheduler.current(), None);

        let mut blink = pin!(scheduler.run(&mut driver, &mut timer));
        for _ in 0..5 {
            assert!(poll(blink.as_mut()).is_pending());
        }
        assert_eq!(toggles.get(), 0);
        assert!(armed.borrow().is_empty());
    }
}

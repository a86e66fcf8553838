// Library-Root: Hardware-Adapter für die esp-core Collaborator-Traits
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

// Module
pub mod config;
pub mod ftp;
pub mod hal;
pub mod tasks;

use esp_core::CadenceScheduler;

// Re-exports von esp-core
pub use esp_core::{BringUpConfig, Sequencer};

/// Die eine Status-LED Cadence des Geräts
///
/// Geschrieben vom Bring-Up (Task-Kontext), gelesen vom Indicator-Task
/// auf dem Interrupt-Executor.
pub static CADENCE: CadenceScheduler = CadenceScheduler::new();

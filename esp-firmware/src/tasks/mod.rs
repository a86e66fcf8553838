// Task-Modul: Enthält alle Embassy Tasks
//
// Der Bring-Up selbst läuft in main(). Tasks laufen nebenher:
// Status-LED (Interrupt-Executor), WiFi-Verbindung und Netzwerk-Stack.

pub mod indicator;
pub mod wifi;

// Re-export Tasks für einfachen Import
pub use indicator::indicator_task;
pub use wifi::{WifiProvisioner, connection_task, net_task};

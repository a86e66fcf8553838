//! Steady-State Pump - Normalbetrieb nach dem Bring-Up

use crate::traits::TransferServer;

/// Bedient den FTP-Server für immer
///
/// Kein Sleep, kein Yield und keine Fehlerbehandlung: Wartezeiten und
/// Fehler gehören dem Collaborator. Die Cadence wird hier nie mehr geändert.
pub async fn run<T: TransferServer>(server: &mut T) -> ! {
    info!("BringUp: Running, pumping transfer server");
    loop {
        server.service_pending().await;
    }
}

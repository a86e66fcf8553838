// FTP Server - eine Control-Session, Passive-Mode Datenverbindungen
//
// Protokoll-Entscheidungen trifft esp_core::ftp::Session, hier passiert
// nur Socket- und Dateisystem-Arbeit. Dateien liegen im Root-Verzeichnis
// der SD-Karte (8.3 Namen).
use core::cell::OnceCell;
use core::fmt::Write as _;

use defmt::{Debug2Format, debug, info, warn};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::{Duration, with_timeout};
use embedded_io_async::Write;
use embedded_sdmmc::Mode;
use esp_core::ftp::{
    Action, Command, LineBuffer, MAX_LINE_LEN, Reply, Session, list_line, passive_reply,
    size_reply,
};
use esp_core::{Credentials, TransferServer, truncate_str};
use heapless::String;

use crate::config::{
    FTP_CONTROL_BUFFER_SIZE, FTP_CONTROL_PORT, FTP_DATA_ACCEPT_TIMEOUT_SECS, FTP_DATA_BUFFER_SIZE,
    FTP_IDLE_TIMEOUT_SECS, FTP_PASSIVE_PORT_COUNT, FTP_PASSIVE_PORT_START,
    SD_TRANSFER_CHUNK_SIZE,
};
use crate::hal::SdVolume;

/// TCP Buffer für Control- und Daten-Socket
///
/// Liegt in einer `ConstStaticCell`, die Sockets leihen sie für immer.
pub struct FtpBuffers {
    control_rx: [u8; FTP_CONTROL_BUFFER_SIZE],
    control_tx: [u8; FTP_CONTROL_BUFFER_SIZE],
    data_rx: [u8; FTP_DATA_BUFFER_SIZE],
    data_tx: [u8; FTP_DATA_BUFFER_SIZE],
}

impl FtpBuffers {
    pub const fn new() -> Self {
        Self {
            control_rx: [0; FTP_CONTROL_BUFFER_SIZE],
            control_tx: [0; FTP_CONTROL_BUFFER_SIZE],
            data_rx: [0; FTP_DATA_BUFFER_SIZE],
            data_tx: [0; FTP_DATA_BUFFER_SIZE],
        }
    }
}

impl Default for FtpBuffers {
    fn default() -> Self {
        Self::new()
    }
}

/// FTP Collaborator für den Bring-Up
///
/// Bedient genau einen Client gleichzeitig. Jeder `service_pending()`
/// Aufruf erledigt eine Einheit: Client annehmen oder eine Kommandozeile.
pub struct FtpServer<'a> {
    stack: Stack<'static>,
    control: TcpSocket<'static>,
    data: TcpSocket<'static>,
    volume: &'a OnceCell<SdVolume>,
    user: String<32>,
    password: String<64>,
    session: Session,
    lines: LineBuffer,
    connected: bool,
    passive_offset: u16,
}

impl<'a> FtpServer<'a> {
    /// # Parameter
    /// - `stack`: embassy-net Stack (Station-Interface)
    /// - `volume`: wird beim SD-Mount befüllt
    /// - `buffers`: TCP Buffer für beide Sockets
    pub fn new(
        stack: Stack<'static>,
        volume: &'a OnceCell<SdVolume>,
        buffers: &'static mut FtpBuffers,
    ) -> Self {
        let FtpBuffers {
            control_rx,
            control_tx,
            data_rx,
            data_tx,
        } = buffers;

        let mut control = TcpSocket::new(stack, control_rx, control_tx);
        control.set_timeout(Some(Duration::from_secs(FTP_IDLE_TIMEOUT_SECS)));
        let data = TcpSocket::new(stack, data_rx, data_tx);

        Self {
            stack,
            control,
            data,
            volume,
            user: String::new(),
            password: String::new(),
            session: Session::new(),
            lines: LineBuffer::new(),
            connected: false,
            passive_offset: 0,
        }
    }

    async fn accept_client(&mut self) {
        if let Err(e) = self.control.accept(FTP_CONTROL_PORT).await {
            warn!("FTP: Accept failed: {}", Debug2Format(&e));
            self.control.abort();
            return;
        }
        info!(
            "FTP: Client connected from {}",
            Debug2Format(&self.control.remote_endpoint())
        );

        self.connected = true;
        self.session = Session::new();
        self.lines.clear();
        self.reply(Reply::READY).await;
    }

    /// Trennt den Client sofort (Fehlerfall)
    fn drop_client(&mut self) {
        self.control.abort();
        self.data.abort();
        self.lines.clear();
        self.connected = false;
    }

    async fn disconnect(&mut self) {
        self.control.close();
        if let Err(e) = self.control.flush().await {
            debug!("FTP: Flush on close failed: {}", Debug2Format(&e));
        }
        self.drop_client();
        info!("FTP: Client disconnected");
    }

    async fn send(&mut self, bytes: &[u8]) {
        if let Err(e) = self.control.write_all(bytes).await {
            warn!("FTP: Control write failed: {}", Debug2Format(&e));
            self.drop_client();
        }
    }

    async fn reply(&mut self, reply: Reply) {
        self.send(reply.render().as_bytes()).await;
    }

    /// Nächste Kommandozeile, `None` wenn der Client weg ist
    async fn next_line(&mut self) -> Option<String<MAX_LINE_LEN>> {
        let mut chunk = [0u8; 128];
        loop {
            if let Some(line) = self.lines.next_line() {
                return Some(line);
            }
            match self.control.read(&mut chunk).await {
                Ok(0) => return None,
                Ok(n) => {
                    if !self.lines.extend(&chunk[..n]) {
                        self.reply(Reply::LINE_TOO_LONG).await;
                    }
                }
                Err(e) => {
                    warn!("FTP: Control read failed: {}", Debug2Format(&e));
                    return None;
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let command = Command::parse(line);
        if matches!(command, Command::Pass(_)) {
            debug!("FTP: <- PASS ****");
        } else {
            debug!("FTP: <- {}", line);
        }

        let login = Credentials::new(self.user.as_str(), self.password.as_str());
        match self.session.handle(command, &login) {
            Action::Reply(reply) => self.reply(reply).await,
            Action::Passive => self.open_passive().await,
            Action::List { names_only } => self.send_listing(names_only).await,
            Action::Retrieve(name) => self.retrieve(name).await,
            Action::Store(name) => self.store(name).await,
            Action::Delete(name) => self.delete(name).await,
            Action::Size(name) => self.size(name).await,
            Action::Close => {
                self.reply(Reply::GOODBYE).await;
                self.disconnect().await;
            }
        }
    }

    fn next_passive_port(&mut self) -> u16 {
        let port = FTP_PASSIVE_PORT_START + self.passive_offset;
        self.passive_offset = (self.passive_offset + 1) % FTP_PASSIVE_PORT_COUNT;
        port
    }

    /// Antwortet mit 227 und wartet auf die Daten-Verbindung des Clients
    async fn open_passive(&mut self) {
        self.data.abort();
        let Some(config) = self.stack.config_v4() else {
            self.session.passive_failed();
            return self.reply(Reply::DATA_FAILED).await;
        };

        let port = self.next_passive_port();
        self.send(passive_reply(config.address.address(), port).as_bytes())
            .await;

        let timeout = Duration::from_secs(FTP_DATA_ACCEPT_TIMEOUT_SECS);
        match with_timeout(timeout, self.data.accept(port)).await {
            Ok(Ok(())) => debug!("FTP: Data connection on port {=u16}", port),
            Ok(Err(e)) => {
                warn!("FTP: Data accept failed: {}", Debug2Format(&e));
                self.data.abort();
                self.session.passive_failed();
            }
            Err(_) => {
                warn!("FTP: No data connection on port {=u16}", port);
                self.data.abort();
                self.session.passive_failed();
            }
        }
    }

    /// Schließt die Daten-Verbindung und meldet das Ergebnis
    async fn finish_data(&mut self, outcome: Reply) {
        self.data.close();
        if let Err(e) = self.data.flush().await {
            debug!("FTP: Data flush failed: {}", Debug2Format(&e));
        }
        self.data.abort();
        self.reply(outcome).await;
    }

    async fn send_listing(&mut self, names_only: bool) {
        let volume = self.volume;
        let entries = match volume.get().map(SdVolume::entries) {
            Some(Ok(entries)) => entries,
            Some(Err(e)) => {
                warn!("FTP: Listing failed: {}", Debug2Format(&e));
                self.data.abort();
                return self.reply(Reply::FILE_UNAVAILABLE).await;
            }
            None => {
                self.data.abort();
                return self.reply(Reply::FILE_UNAVAILABLE).await;
            }
        };

        self.reply(Reply::OPENING_DATA).await;
        let mut outcome = Reply::TRANSFER_DONE;
        for entry in &entries {
            let line = if names_only {
                let mut line = String::<96>::new();
                let _ = write!(line, "{}\r\n", entry.name);
                line
            } else {
                list_line(&entry.name, entry.size, entry.is_dir)
            };
            if let Err(e) = self.data.write_all(line.as_bytes()).await {
                warn!("FTP: Listing aborted: {}", Debug2Format(&e));
                outcome = Reply::TRANSFER_ABORTED;
                break;
            }
        }
        self.finish_data(outcome).await;
    }

    async fn retrieve(&mut self, name: &str) {
        let volume = self.volume;
        let Some(volume) = volume.get() else {
            self.data.abort();
            return self.reply(Reply::FILE_UNAVAILABLE).await;
        };
        let file = match volume.open(name, Mode::ReadOnly) {
            Ok(file) => file,
            Err(e) => {
                debug!("FTP: RETR {} failed: {}", name, Debug2Format(&e));
                self.data.abort();
                return self.reply(Reply::FILE_UNAVAILABLE).await;
            }
        };

        self.reply(Reply::OPENING_DATA).await;
        let mut chunk = [0u8; SD_TRANSFER_CHUNK_SIZE];
        let outcome = loop {
            let n = match volume.read(file, &mut chunk) {
                Ok(0) => break Reply::TRANSFER_DONE,
                Ok(n) => n,
                Err(e) => {
                    warn!("FTP: Reading {} failed: {}", name, Debug2Format(&e));
                    break Reply::TRANSFER_ABORTED;
                }
            };
            if let Err(e) = self.data.write_all(&chunk[..n]).await {
                warn!("FTP: Sending {} failed: {}", name, Debug2Format(&e));
                break Reply::TRANSFER_ABORTED;
            }
        };

        if let Err(e) = volume.close(file) {
            warn!("FTP: Closing {} failed: {}", name, Debug2Format(&e));
        }
        info!("FTP: Sent {}", name);
        self.finish_data(outcome).await;
    }

    async fn store(&mut self, name: &str) {
        let volume = self.volume;
        let Some(volume) = volume.get() else {
            self.data.abort();
            return self.reply(Reply::FILE_UNAVAILABLE).await;
        };
        let file = match volume.open(name, Mode::ReadWriteCreateOrTruncate) {
            Ok(file) => file,
            Err(e) => {
                warn!("FTP: STOR {} failed: {}", name, Debug2Format(&e));
                self.data.abort();
                return self.reply(Reply::FILE_UNAVAILABLE).await;
            }
        };

        self.reply(Reply::OPENING_DATA).await;
        let mut chunk = [0u8; SD_TRANSFER_CHUNK_SIZE];
        let outcome = loop {
            let n = match self.data.read(&mut chunk).await {
                Ok(0) => break Reply::TRANSFER_DONE,
                Ok(n) => n,
                Err(e) => {
                    warn!("FTP: Receiving {} failed: {}", name, Debug2Format(&e));
                    break Reply::TRANSFER_ABORTED;
                }
            };
            if let Err(e) = volume.write(file, &chunk[..n]) {
                warn!("FTP: Writing {} failed: {}", name, Debug2Format(&e));
                break Reply::TRANSFER_ABORTED;
            }
        };

        if let Err(e) = volume.close(file) {
            warn!("FTP: Closing {} failed: {}", name, Debug2Format(&e));
        }
        info!("FTP: Stored {}", name);
        self.finish_data(outcome).await;
    }

    async fn delete(&mut self, name: &str) {
        let result = self.volume.get().map(|volume| volume.delete(name));
        match result {
            Some(Ok(())) => {
                info!("FTP: Deleted {}", name);
                self.reply(Reply::FILE_DELETED).await;
            }
            Some(Err(e)) => {
                debug!("FTP: DELE {} failed: {}", name, Debug2Format(&e));
                self.reply(Reply::FILE_UNAVAILABLE).await;
            }
            None => self.reply(Reply::FILE_UNAVAILABLE).await,
        }
    }

    async fn size(&mut self, name: &str) {
        match self.volume.get().map(|volume| volume.file_size(name)) {
            Some(Ok(size)) => self.send(size_reply(size).as_bytes()).await,
            _ => self.reply(Reply::FILE_UNAVAILABLE).await,
        }
    }
}

impl TransferServer for FtpServer<'_> {
    fn start(&mut self, credentials: &Credentials<'_>) {
        let (user, user_cut) = truncate_str(credentials.name);
        let (password, password_cut) = truncate_str(credentials.password);
        if user_cut || password_cut {
            warn!("FTP: Login longer than supported, truncated");
        }
        self.user = user;
        self.password = password;
        if self.volume.get().is_none() {
            warn!("FTP: No volume mounted, file commands will fail");
        }
        info!("FTP: Listening on port {=u16}", FTP_CONTROL_PORT);
    }

    async fn service_pending(&mut self) {
        if !self.connected {
            self.accept_client().await;
            return;
        }

        match self.next_line().await {
            Some(line) => self.handle_line(&line).await,
            None => self.disconnect().await,
        }
    }
}

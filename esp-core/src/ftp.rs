//! FTP Protokoll-Logik (ohne Sockets und Dateisystem)
//!
//! Parser für Kommandozeilen, Login-/Session-Zustand und Antwort-Formate.
//! Der Firmware-Server führt die zurückgegebenen `Action`s aus.

use core::fmt::Write;
use core::net::Ipv4Addr;

use heapless::{String, Vec};

use crate::types::Credentials;

/// Maximale Länge einer Kommandozeile (ohne CRLF)
pub const MAX_LINE_LEN: usize = 256;

/// FTP Kommando (Verb ist case-insensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    User(&'a str),
    Pass(&'a str),
    Syst,
    Feat,
    Pwd,
    Cwd(&'a str),
    Cdup,
    Type(&'a str),
    Pasv,
    List,
    Nlst,
    Retr(&'a str),
    Stor(&'a str),
    Dele(&'a str),
    Size(&'a str),
    Noop,
    Quit,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Zerlegt eine Zeile in Verb und Argument
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (line, ""),
        };

        let is = |name: &str| verb.eq_ignore_ascii_case(name);
        if is("USER") {
            Command::User(arg)
        } else if is("PASS") {
            Command::Pass(arg)
        } else if is("SYST") {
            Command::Syst
        } else if is("FEAT") {
            Command::Feat
        } else if is("PWD") || is("XPWD") {
            Command::Pwd
        } else if is("CWD") {
            Command::Cwd(arg)
        } else if is("CDUP") {
            Command::Cdup
        } else if is("TYPE") {
            Command::Type(arg)
        } else if is("PASV") {
            Command::Pasv
        } else if is("LIST") {
            Command::List
        } else if is("NLST") {
            Command::Nlst
        } else if is("RETR") {
            Command::Retr(arg)
        } else if is("STOR") {
            Command::Stor(arg)
        } else if is("DELE") {
            Command::Dele(arg)
        } else if is("SIZE") {
            Command::Size(arg)
        } else if is("NOOP") {
            Command::Noop
        } else if is("QUIT") {
            Command::Quit
        } else {
            Command::Unknown(verb)
        }
    }
}

/// Einzeilige Antwort: Code + Text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: &'static str,
}

impl Reply {
    pub const READY: Reply = Reply::new(220, "Service ready");
    pub const GOODBYE: Reply = Reply::new(221, "Goodbye");
    pub const NEED_PASSWORD: Reply = Reply::new(331, "User name okay, need password");
    pub const LOGGED_IN: Reply = Reply::new(230, "User logged in");
    pub const LOGIN_INCORRECT: Reply = Reply::new(530, "Login incorrect");
    pub const NOT_LOGGED_IN: Reply = Reply::new(530, "Not logged in");
    pub const SYSTEM: Reply = Reply::new(215, "UNIX Type: L8");
    pub const NO_FEATURES: Reply = Reply::new(211, "No features");
    pub const CURRENT_DIR: Reply = Reply::new(257, "\"/\" is current directory");
    pub const DIR_OK: Reply = Reply::new(250, "Directory successfully changed");
    pub const OK: Reply = Reply::new(200, "Command okay");
    pub const TYPE_NOT_SUPPORTED: Reply = Reply::new(504, "Type not supported");
    pub const USE_PASV: Reply = Reply::new(425, "Use PASV first");
    pub const NO_SUCH_DIR: Reply = Reply::new(550, "No such directory");
    pub const BAD_FILE_NAME: Reply = Reply::new(553, "File name not allowed");
    pub const NOT_IMPLEMENTED: Reply = Reply::new(502, "Command not implemented");
    pub const LINE_TOO_LONG: Reply = Reply::new(500, "Line too long");
    pub const OPENING_DATA: Reply = Reply::new(150, "Opening data connection");
    pub const TRANSFER_DONE: Reply = Reply::new(226, "Transfer complete");
    pub const TRANSFER_ABORTED: Reply = Reply::new(451, "Transfer aborted");
    pub const DATA_FAILED: Reply = Reply::new(425, "Can't open data connection");
    pub const FILE_UNAVAILABLE: Reply = Reply::new(550, "File unavailable");
    pub const FILE_DELETED: Reply = Reply::new(250, "File deleted");

    pub const fn new(code: u16, text: &'static str) -> Self {
        Self { code, text }
    }

    /// "CODE Text\r\n"
    pub fn render(&self) -> String<64> {
        let mut line = String::new();
        let _ = write!(line, "{} {}\r\n", self.code, self.text);
        line
    }
}

/// Was der Server nach einem Kommando tun muss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    Reply(Reply),
    /// Daten-Port öffnen und mit 227 antworten
    Passive,
    List { names_only: bool },
    Retrieve(&'a str),
    Store(&'a str),
    Delete(&'a str),
    Size(&'a str),
    /// 221 senden und Verbindung schließen
    Close,
}

/// Zustand einer Control-Verbindung
#[derive(Debug, Default)]
pub struct Session {
    user_accepted: bool,
    logged_in: bool,
    passive: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in
    }

    /// Ein Datenkanal ist für das nächste Transfer-Kommando vorbereitet
    pub fn has_passive(&self) -> bool {
        self.passive
    }

    /// Server konnte den Daten-Port nicht öffnen
    pub fn passive_failed(&mut self) {
        self.passive = false;
    }

    pub fn handle<'a>(&mut self, command: Command<'a>, login: &Credentials<'_>) -> Action<'a> {
        match command {
            Command::User(name) => {
                self.logged_in = false;
                self.user_accepted = name == login.name;
                return Action::Reply(Reply::NEED_PASSWORD);
            }
            Command::Pass(password) => {
                self.logged_in = self.user_accepted && password == login.password;
                self.user_accepted = false;
                return Action::Reply(if self.logged_in {
                    Reply::LOGGED_IN
                } else {
                    Reply::LOGIN_INCORRECT
                });
            }
            Command::Quit => return Action::Close,
            Command::Noop => return Action::Reply(Reply::OK),
            Command::Syst => return Action::Reply(Reply::SYSTEM),
            Command::Feat => return Action::Reply(Reply::NO_FEATURES),
            Command::Unknown(_) => return Action::Reply(Reply::NOT_IMPLEMENTED),
            _ if !self.logged_in => return Action::Reply(Reply::NOT_LOGGED_IN),
            _ => {}
        }

        match command {
            Command::Pwd => Action::Reply(Reply::CURRENT_DIR),
            Command::Cwd(path) if matches!(path, "/" | "." | "") => Action::Reply(Reply::DIR_OK),
            Command::Cwd(_) => Action::Reply(Reply::NO_SUCH_DIR),
            // Es gibt nur das Root-Verzeichnis
            Command::Cdup => Action::Reply(Reply::DIR_OK),
            Command::Type(kind) => match kind.chars().next().map(|c| c.to_ascii_uppercase()) {
                Some('A' | 'I') => Action::Reply(Reply::OK),
                _ => Action::Reply(Reply::TYPE_NOT_SUPPORTED),
            },
            Command::Pasv => {
                self.passive = true;
                Action::Passive
            }
            Command::List | Command::Nlst => {
                if !core::mem::take(&mut self.passive) {
                    return Action::Reply(Reply::USE_PASV);
                }
                Action::List {
                    names_only: command == Command::Nlst,
                }
            }
            Command::Retr(arg) | Command::Stor(arg) => {
                let Some(name) = short_name(arg) else {
                    return Action::Reply(Reply::BAD_FILE_NAME);
                };
                if !core::mem::take(&mut self.passive) {
                    return Action::Reply(Reply::USE_PASV);
                }
                if matches!(command, Command::Retr(_)) {
                    Action::Retrieve(name)
                } else {
                    Action::Store(name)
                }
            }
            Command::Dele(arg) => match short_name(arg) {
                Some(name) => Action::Delete(name),
                None => Action::Reply(Reply::BAD_FILE_NAME),
            },
            Command::Size(arg) => match short_name(arg) {
                Some(name) => Action::Size(name),
                None => Action::Reply(Reply::BAD_FILE_NAME),
            },
            _ => Action::Reply(Reply::NOT_IMPLEMENTED),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '~' | '!' | '#' | '$' | '&')
}

/// Prüft auf einen 8.3 Dateinamen im Root-Verzeichnis
///
/// Ein führendes `/` wird entfernt, Unterverzeichnisse sind nicht erlaubt.
///
/// # Beispiele
///
/// ```
/// # use esp_core::ftp::short_name;
/// assert_eq!(short_name("/LOG.TXT"), Some("LOG.TXT"));
/// assert_eq!(short_name("notes/a.txt"), None);
/// ```
pub fn short_name(path: &str) -> Option<&str> {
    let name = path.strip_prefix('/').unwrap_or(path);
    let (base, ext) = match name.split_once('.') {
        Some((base, ext)) => (base, ext),
        None => (name, ""),
    };
    let valid = (1..=8).contains(&base.len())
        && ext.len() <= 3
        && base.chars().chain(ext.chars()).all(is_name_char);
    valid.then_some(name)
}

/// "227 Entering Passive Mode (a,b,c,d,p1,p2)\r\n"
pub fn passive_reply(address: Ipv4Addr, port: u16) -> String<64> {
    let [a, b, c, d] = address.octets();
    let [hi, lo] = port.to_be_bytes();
    let mut line = String::new();
    let _ = write!(
        line,
        "227 Entering Passive Mode ({},{},{},{},{},{})\r\n",
        a, b, c, d, hi, lo
    );
    line
}

/// "213 <bytes>\r\n"
pub fn size_reply(size: u32) -> String<32> {
    let mut line = String::new();
    let _ = write!(line, "213 {}\r\n", size);
    line
}

/// Eine Zeile im `ls -l` Format (wird von allen gängigen Clients geparst)
pub fn list_line(name: &str, size: u32, is_dir: bool) -> String<96> {
    let mode = if is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
    let mut line = String::new();
    let _ = write!(
        line,
        "{} 1 owner group {:>10} Jan  1 00:00 {}\r\n",
        mode, size, name
    );
    line
}

/// Sammelt Bytes vom Control-Socket und liefert ganze Zeilen
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8, MAX_LINE_LEN>,
    /// Überlange Zeile: alles bis zum nächsten `\n` wird verworfen
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hängt empfangene Bytes an
    ///
    /// Gibt `false` zurück wenn eine Zeile zu lang war. Bereits vollständige
    /// Zeilen bleiben erhalten, die überlange Zeile wird bis zu ihrem
    /// Zeilenende komplett verworfen.
    pub fn extend(&mut self, data: &[u8]) -> bool {
        let mut overflowed = false;
        for &byte in data {
            if self.discarding {
                self.discarding = byte != b'\n';
                continue;
            }
            if self.pending.push(byte).is_err() {
                overflowed = true;
                let complete = self
                    .pending
                    .iter()
                    .rposition(|&b| b == b'\n')
                    .map_or(0, |end| end + 1);
                self.pending.truncate(complete);
                self.discarding = byte != b'\n';
            }
        }
        !overflowed
    }

    /// Nächste vollständige Zeile ohne CRLF (ungültiges UTF-8 wird verworfen)
    pub fn next_line(&mut self) -> Option<String<MAX_LINE_LEN>> {
        loop {
            let end = self.pending.iter().position(|&b| b == b'\n')?;
            let line = core::str::from_utf8(&self.pending[..end])
                .ok()
                .map(|text| text.trim_end_matches('\r'))
                .and_then(|text| String::try_from(text).ok());

            let rest = self.pending.len() - (end + 1);
            self.pending.copy_within(end + 1.., 0);
            self.pending.truncate(rest);

            if line.is_some() {
                return line;
            }
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

//! Passphrase sources for signing
//!
//! The environment variable wins when set and is treated as
//! non-interactive. Otherwise the passphrase is read from `/dev/tty` with
//! echo disabled.

use std::env;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};

/// Environment variable carrying the notarization passphrase
pub const PASSPHRASE_ENV: &str = "NOTARY_NOTARIZATION_PASSWORD";

const TTY_PATH: &str = "/dev/tty";

/// A passphrase and whether a person typed it
#[derive(Clone)]
pub struct Passphrase {
    value: String,
    interactive: bool,
}

impl Passphrase {
    pub fn new(value: impl Into<String>, interactive: bool) -> Self {
        Self {
            value: value.into(),
            interactive,
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    /// Interactive passphrases may be asked for again after a typo.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Passphrase")
            .field("value", &"<redacted>")
            .field("interactive", &self.interactive)
            .finish()
    }
}

/// Provides a passphrase for each signing attempt.
pub trait PassphraseSource {
    /// `attempt` starts at 1.
    fn provide(&mut self, attempt: u32) -> io::Result<Passphrase>;
}

/// Fixed, non-interactive passphrase
#[derive(Clone)]
pub struct EnvPassphrase {
    value: String,
}

impl EnvPassphrase {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Read [`PASSPHRASE_ENV`]; `None` when unset.
    pub fn from_env() -> Option<Self> {
        env::var(PASSPHRASE_ENV).ok().map(Self::new)
    }
}

impl PassphraseSource for EnvPassphrase {
    fn provide(&mut self, _attempt: u32) -> io::Result<Passphrase> {
        Ok(Passphrase::new(self.value.clone(), false))
    }
}

/// Prompts on the controlling terminal
#[derive(Debug, Clone)]
pub struct TerminalPassphrase {
    prompt: String,
}

impl Default for TerminalPassphrase {
    fn default() -> Self {
        Self::new("Notarization password: ")
    }
}

impl TerminalPassphrase {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    /// Prompt once and return what was typed, without the line ending.
    pub fn read(&self) -> io::Result<String> {
        let mut tty = OpenOptions::new().read(true).write(true).open(TTY_PATH)?;
        write!(tty, "{}", self.prompt)?;
        tty.flush()?;

        let line = {
            let _echo = EchoGuard::disable(&tty)?;
            let mut reader = BufReader::new(&tty);
            let mut line = String::new();
            reader.read_line(&mut line)?;
            line
        };
        writeln!(tty)?;

        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl PassphraseSource for TerminalPassphrase {
    fn provide(&mut self, _attempt: u32) -> io::Result<Passphrase> {
        Ok(Passphrase::new(self.read()?, true))
    }
}

/// Environment first, terminal otherwise.
pub fn default_source() -> Box<dyn PassphraseSource> {
    match EnvPassphrase::from_env() {
        Some(env) => Box::new(env),
        None => Box::new(TerminalPassphrase::default()),
    }
}

/// Restores terminal echo on drop
#[cfg(unix)]
struct EchoGuard<'a> {
    tty: &'a File,
    original: nix::sys::termios::Termios,
}

#[cfg(unix)]
impl<'a> EchoGuard<'a> {
    fn disable(tty: &'a File) -> io::Result<Self> {
        use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

        let original = tcgetattr(tty)?;
        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(tty, SetArg::TCSANOW, &silent)?;
        Ok(Self { tty, original })
    }
}

#[cfg(unix)]
impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        use nix::sys::termios::{tcsetattr, SetArg};
        let _ = tcsetattr(self.tty, SetArg::TCSANOW, &self.original);
    }
}

#[cfg(not(unix))]
struct EchoGuard;

#[cfg(not(unix))]
impl EchoGuard {
    fn disable(_tty: &File) -> io::Result<Self> {
        Ok(Self)
    }
}

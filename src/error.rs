use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Network failure or non-2xx status on any transport call.
    Transport(reqwest::Error),
    /// Missing or invalid startup parameter. Fatal; the caller must not start.
    Config(String),
    /// Setpoint request for a zone outside the configured set.
    UnknownZone(u8),
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(e) => write!(f, "transport error: {e}"),
            Error::Config(msg) => write!(f, "configuration error: {msg}"),
            Error::UnknownZone(id) => write!(f, "unknown zone: {id}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

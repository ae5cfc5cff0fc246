use std::fmt;
use std::io;

use castlink::frame::FrameError;
use castlink::transport::TransportError;
use castlink::{ConfigError, SocketError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;
pub const CANCELLED: i32 = 130;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => TRANSPORT_ERROR,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { ref source, .. } if source.kind() == io::ErrorKind::TimedOut => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Incomplete { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        FrameError::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
    }
}

pub fn socket_error(context: &str, err: SocketError) -> CliError {
    match err {
        SocketError::Transport(err) => transport_error(context, err),
        SocketError::Frame(err) => frame_error(context, err),
        SocketError::AlreadyConnected { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        SocketError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        SocketError::Cancelled => CliError::new(CANCELLED, format!("{context}: {err}")),
        SocketError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        SocketError::Handler(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        SocketError::ReadTask(_) => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn config_error(context: &str, err: ConfigError) -> CliError {
    match err {
        ConfigError::Io { source, path } => {
            let mut mapped = io_error(context, source);
            mapped.message = format!("{} ({})", mapped.message, path.display());
            mapped
        }
        ConfigError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConfigError::InvalidDeviceId(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ConfigError::NoLocalAddress(_) => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

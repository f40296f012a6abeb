use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

/// A single boxed-error wrapper for every fatal setup/runtime error this
/// binary can produce. Per-session I/O errors never reach this type — they
/// destroy only the offending `Connection` (see `connection.rs`).
pub struct GatewayError(pub Box<dyn Error + Send + Sync>);

impl Debug for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for GatewayError {}

impl From<std::io::Error> for GatewayError {
    fn from(e: std::io::Error) -> Self {
        GatewayError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for GatewayError {
    fn from(e: std::net::AddrParseError) -> Self {
        GatewayError(Box::new(e))
    }
}

impl From<clap::Error> for GatewayError {
    fn from(e: clap::Error) -> Self {
        GatewayError(Box::new(e))
    }
}

impl From<String> for GatewayError {
    fn from(s: String) -> Self {
        GatewayError(Box::new(std::io::Error::new(std::io::ErrorKind::Other, s)))
    }
}

impl From<&str> for GatewayError {
    fn from(s: &str) -> Self {
        GatewayError::from(s.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

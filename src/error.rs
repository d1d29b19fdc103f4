use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

/// Crate-wide error wrapper. Keeps the original cause behind `Box<dyn Error>`
/// so the source chain survives for logging, while giving call sites one
/// type to propagate with `?`.
pub struct ServerError(pub Box<dyn Error>);

impl Debug for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for ServerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug)]
pub enum Generic {
    Message(String),
}

impl Display for Generic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Generic::Message(s) => write!(f, "{s}"),
        }
    }
}

impl Error for Generic {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<mysql::Error> for ServerError {
    fn from(e: mysql::Error) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(e: std::net::AddrParseError) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<String> for ServerError {
    fn from(s: String) -> Self {
        ServerError(Box::new(Generic::Message(s)))
    }
}

impl From<&str> for ServerError {
    fn from(s: &str) -> Self {
        ServerError(Box::new(Generic::Message(s.to_string())))
    }
}

impl From<crate::db::PoolClosed> for ServerError {
    fn from(e: crate::db::PoolClosed) -> Self {
        ServerError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

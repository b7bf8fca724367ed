use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid address in {field}: {value:?} (expected dotted quad, octets 0-255)")]
    InvalidAddress { field: &'static str, value: String },

    #[error("invalid port in {field}: {value:?} (expected 1-65535)")]
    InvalidPort { field: &'static str, value: String },

    #[error("public port range exhausted")]
    PortExhausted,

    #[error("duplicate public port {0} in translation table")]
    DuplicatePublicPort(u16),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

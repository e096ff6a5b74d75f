use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no free {proto} port in range {lo}..={hi}")]
    PortExhausted {
        proto: &'static str,
        lo: u16,
        hi: u16,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

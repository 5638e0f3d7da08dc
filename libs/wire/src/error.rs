use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("{0} timed out")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

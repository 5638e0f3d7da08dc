use thiserror::Error;

use crate::call::Fault;

#[derive(Error, Debug)]
pub enum Error {
    /// The connection failed before a response was read; the call's true
    /// outcome is unknown.
    #[error("transport error: {0}")]
    Wire(#[from] lattice_wire::Error),

    #[error("could not resolve address {0}")]
    Resolve(String),

    /// Client-side programming error: the method is not declared on the
    /// proxy's schema. Raised before any network traffic.
    #[error("method {method} with this signature is not declared on {service}")]
    UnknownMethod { service: String, method: String },

    /// The server has no implementation bound for this interface identity.
    #[error("service {0} is not registered on the remote server")]
    ServiceNotRegistered(String),

    /// The remote dispatch failed; the server-side fault re-raised locally.
    #[error("remote fault: {0}")]
    Remote(Fault),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("server is already running")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, Error>;

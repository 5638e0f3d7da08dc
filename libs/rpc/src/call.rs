use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};

/// One remote invocation in flight, and its outcome once the server has
/// dispatched it.
///
/// A `Call` is created fresh for every proxy invocation, completed in place
/// on the server, read once on the client, and then discarded. After a
/// completed round trip exactly one of `result` and `fault` is set; a reply
/// with neither set means the service was not registered on the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Canonical interface identity; the registry lookup key.
    pub service: String,
    /// Method to invoke on the bound implementation.
    pub method: String,
    /// Ordered parameter-type descriptors, disambiguating overloads.
    pub param_types: Vec<String>,
    /// Encoded argument values, positionally aligned with `param_types`.
    pub args: Vec<Vec<u8>>,
    /// Encoded return value, set on successful dispatch.
    pub result: Option<Vec<u8>>,
    /// Failure raised during dispatch; mutually exclusive with `result`.
    pub fault: Option<Fault>,
}

impl Call {
    pub fn new(
        service: impl Into<String>,
        method: impl Into<String>,
        param_types: Vec<String>,
        args: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            param_types,
            args,
            result: None,
            fault: None,
        }
    }

    /// Whether the server attached an outcome to this call.
    pub fn is_completed(&self) -> bool {
        self.result.is_some() || self.fault.is_some()
    }
}

/// Server-side dispatch failure carried back inside the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    /// No method with the requested name and signature on the implementation.
    MethodNotFound,
    /// Arguments did not decode against the resolved method's signature.
    BadArguments,
    /// The implementation itself raised an error.
    Handler,
}

impl Fault {
    pub fn method_not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::MethodNotFound,
            message: message.into(),
        }
    }

    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::BadArguments,
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Self {
            kind: FaultKind::Handler,
            message: message.into(),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::MethodNotFound => "method not found",
            FaultKind::BadArguments => "bad arguments",
            FaultKind::Handler => "handler error",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Encode one value the way it travels inside a `Call`.
pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| Error::Codec(e.to_string()))
}

/// Decode one value carried inside a `Call`.
pub(crate) fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| Error::Codec(e.to_string()))
}

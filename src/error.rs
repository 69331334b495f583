use std::{net::SocketAddr, time::Duration};
use thiserror::Error;

/// Gsp uniform error definition.
///
/// Every failure maps to exactly one variant. Lower layers only add context
/// (the phase or protocol that failed), they never change the variant.
#[derive(Debug, Error)]
pub enum GspErr {
    /// The game identifier is not in the registry.
    #[error("Unknown game identifier: {0}")]
    UnknownGame(String),
    /// The address is malformed or the host cannot be resolved.
    #[error("Invalid address {addr}: {reason}")]
    AddressErr { addr: String, reason: String },
    /// The remote end could not be reached.
    #[error("{phase}: failed to connect to {addr}: {source}")]
    ConnectErr {
        phase: &'static str,
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// A deadline ran out before the operation completed.
    #[error("{phase}: timed out (budget {budget:?})")]
    TimeoutErr {
        phase: &'static str,
        budget: Duration,
    },
    /// Transport failure other than a timeout.
    #[error("{phase}: {source}")]
    IoErr {
        phase: &'static str,
        source: std::io::Error,
    },
    /// The server answered with something the protocol codec rejects.
    #[error("{protocol}: malformed response, {context}")]
    ParseErr {
        protocol: &'static str,
        context: String,
    },
    /// Decoding succeeded but a required field is missing.
    #[error("Required field `{field}` missing from server response")]
    NormalizationErr { field: &'static str },
}

/// Fieldless classification of [GspErr].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownGame,
    AddressError,
    ConnectError,
    TimeoutError,
    IoError,
    ParseError,
    NormalizationError,
}

impl GspErr {
    /// Returns the [ErrorKind] of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GspErr::UnknownGame(_) => ErrorKind::UnknownGame,
            GspErr::AddressErr { .. } => ErrorKind::AddressError,
            GspErr::ConnectErr { .. } => ErrorKind::ConnectError,
            GspErr::TimeoutErr { .. } => ErrorKind::TimeoutError,
            GspErr::IoErr { .. } => ErrorKind::IoError,
            GspErr::ParseErr { .. } => ErrorKind::ParseError,
            GspErr::NormalizationErr { .. } => ErrorKind::NormalizationError,
        }
    }

    pub(crate) fn address(addr: &str, reason: impl Into<String>) -> Self {
        GspErr::AddressErr {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(protocol: &'static str, context: impl Into<String>) -> Self {
        GspErr::ParseErr {
            protocol,
            context: context.into(),
        }
    }
}

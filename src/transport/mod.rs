mod http;
mod tcp;
mod udp;

use crate::GspErr;
pub use http::HttpTransport;
use serde::Serialize;
use std::{
    io::ErrorKind,
    time::{Duration, Instant},
};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

/// Network transport a protocol runs over.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Udp,
    Http,
}

/// Remaining time for one kind of operation within a query.
///
/// Every round of a protocol draws from the same budget, so a server that
/// answers slowly in several rounds cannot stretch the caller's deadline.
#[derive(Debug, Clone)]
pub struct Budget {
    phase: &'static str,
    total: Duration,
    remaining: Duration,
}

impl Budget {
    pub fn create(phase: &'static str, total: Duration) -> Self {
        Self {
            phase,
            total,
            remaining: total,
        }
    }

    pub fn timeout(&self) -> GspErr {
        GspErr::TimeoutErr {
            phase: self.phase,
            budget: self.total,
        }
    }

    /// The slice available to the next operation. Never zero.
    pub fn slice(&self) -> Result<Duration, GspErr> {
        match self.remaining.is_zero() {
            true => Err(self.timeout()),
            false => Ok(self.remaining),
        }
    }

    pub fn charge(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    /// Hand the remaining slice to `op` and charge the time it took.
    ///
    /// `WouldBlock` and `TimedOut` become [GspErr::TimeoutErr], everything
    /// else [GspErr::IoErr].
    pub fn run<T>(
        &mut self,
        op: impl FnOnce(Duration) -> std::io::Result<T>,
    ) -> Result<T, GspErr> {
        let slice = self.slice()?;
        let started = Instant::now();
        let result = op(slice);

        self.charge(started.elapsed());

        result.map_err(|err| self.map_io_err(err))
    }

    pub fn map_io_err(&self, err: std::io::Error) -> GspErr {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => self.timeout(),
            _ => GspErr::IoErr {
                phase: self.phase,
                source: err,
            },
        }
    }
}

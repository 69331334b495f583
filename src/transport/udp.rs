use super::Budget;
use crate::{conf::UdpDeadlines, GspErr};
use std::{
    io::ErrorKind,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};
use tracing::trace;

const MAX_DATAGRAM_SIZE: usize = 65_535;

/// A connected UDP socket owned by one query.
pub struct UdpTransport {
    socket: UdpSocket,
    addr: SocketAddr,
    read: Budget,
    write: Budget,
}

impl UdpTransport {
    /// Bind an ephemeral local port and connect it to `addr`.
    pub fn open(addr: &SocketAddr, deadlines: &UdpDeadlines) -> Result<Self, GspErr> {
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let to_err = |err| GspErr::IoErr {
            phase: "udp bind",
            source: err,
        };

        let socket = UdpSocket::bind(local).map_err(to_err)?;
        socket.connect(addr).map_err(to_err)?;

        Ok(Self {
            socket,
            addr: *addr,
            read: Budget::create("udp read", deadlines.read),
            write: Budget::create("udp write", deadlines.write),
        })
    }

    fn refine(&self, err: GspErr) -> GspErr {
        match err {
            GspErr::IoErr { phase, source } if source.kind() == ErrorKind::ConnectionRefused => {
                GspErr::ConnectErr {
                    phase,
                    addr: self.addr,
                    source,
                }
            }
            err => err,
        }
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<(), GspErr> {
        let socket = &self.socket;

        let result = self.write.run(|slice| {
            socket.set_write_timeout(Some(slice))?;
            socket.send(payload)
        });
        let sent = result.map_err(|err| self.refine(err))?;

        if sent != payload.len() {
            return Err(GspErr::IoErr {
                phase: "udp write",
                source: std::io::Error::new(
                    ErrorKind::WriteZero,
                    format!("sent {} of {} bytes", sent, payload.len()),
                ),
            });
        }

        trace!(len = sent, "udp send");

        Ok(())
    }

    /// Receive one datagram.
    pub fn recv(&mut self) -> Result<Vec<u8>, GspErr> {
        let socket = &self.socket;
        let mut bufs = vec![0u8; MAX_DATAGRAM_SIZE];

        let result = self.read.run(|slice| {
            socket.set_read_timeout(Some(slice))?;
            socket.recv(&mut bufs)
        });
        let size = result.map_err(|err| self.refine(err))?;

        bufs.truncate(size);
        trace!(len = size, "udp recv");

        Ok(bufs)
    }
}

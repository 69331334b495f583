use super::Budget;
use crate::{conf::TcpDeadlines, GspErr};
use std::{
    io::{ErrorKind, Read, Write},
    net::{SocketAddr, TcpStream},
};
use tracing::trace;

/// A TCP connection owned by one query. Closed on drop.
pub struct TcpTransport {
    socket: TcpStream,
    read: Budget,
    write: Budget,
}

impl TcpTransport {
    pub fn connect(addr: &SocketAddr, deadlines: &TcpDeadlines) -> Result<Self, GspErr> {
        let socket = match TcpStream::connect_timeout(addr, deadlines.connect) {
            Ok(socket) => socket,
            Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                return Err(GspErr::TimeoutErr {
                    phase: "tcp connect",
                    budget: deadlines.connect,
                });
            }
            Err(err) => {
                return Err(GspErr::ConnectErr {
                    phase: "tcp connect",
                    addr: *addr,
                    source: err,
                });
            }
        };

        socket.set_nodelay(true).map_err(|err| GspErr::IoErr {
            phase: "tcp connect",
            source: err,
        })?;
        trace!(%addr, "tcp connected");

        Ok(Self {
            socket,
            read: Budget::create("tcp read", deadlines.read),
            write: Budget::create("tcp write", deadlines.write),
        })
    }

    /// Write all of `bufs` within the write budget.
    pub fn write(&mut self, bufs: &[u8]) -> Result<(), GspErr> {
        let socket = &mut self.socket;

        self.write.run(|slice| {
            socket.set_write_timeout(Some(slice))?;
            socket.write_all(bufs)?;
            socket.flush()
        })?;
        trace!(len = bufs.len(), "tcp write");

        Ok(())
    }

    /// Read whatever arrives next, at most `max_len` bytes.
    ///
    /// A closed connection is [GspErr::IoErr] with `UnexpectedEof`.
    pub fn read(&mut self, max_len: usize) -> Result<Vec<u8>, GspErr> {
        let socket = &mut self.socket;
        let mut bufs = vec![0u8; max_len];

        let size = self.read.run(|slice| {
            socket.set_read_timeout(Some(slice))?;

            loop {
                match socket.read(&mut bufs) {
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    result => break result,
                }
            }
        })?;

        if size == 0 && max_len > 0 {
            return Err(GspErr::IoErr {
                phase: "tcp read",
                source: ErrorKind::UnexpectedEof.into(),
            });
        }

        bufs.truncate(size);
        trace!(len = size, "tcp read");

        Ok(bufs)
    }

    /// Like [TcpTransport::read], but a closed connection yields `None`.
    pub fn read_or_eof(&mut self, max_len: usize) -> Result<Option<Vec<u8>>, GspErr> {
        match self.read(max_len) {
            Ok(bufs) => Ok(Some(bufs)),
            Err(GspErr::IoErr { source, .. }) if source.kind() == ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

use crate::GspErr;

/// Bounded cursor over a received packet.
///
/// Every read is checked against the remaining length, failures become
/// [GspErr::ParseErr] naming the protocol and the byte offset.
pub struct ByteReader<'a> {
    protocol: &'static str,
    bufs: &'a [u8],
    current_idx: usize,
}

impl<'a> ByteReader<'a> {
    pub fn create(protocol: &'static str, bufs: &'a [u8]) -> Self {
        Self {
            protocol,
            bufs,
            current_idx: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.current_idx
    }

    pub fn remaining(&self) -> usize {
        self.bufs.len() - self.current_idx
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.bufs[self.current_idx..]
    }

    /// Build a parse error located at the current offset.
    pub fn err(&self, reason: impl std::fmt::Display) -> GspErr {
        GspErr::parse(
            self.protocol,
            format!("offset {}: {}", self.current_idx, reason),
        )
    }

    pub fn skip(&mut self, size: usize) -> Result<(), GspErr> {
        self.read_bufs(size).map(|_| ())
    }

    pub fn read_bufs(&mut self, size: usize) -> Result<&'a [u8], GspErr> {
        if self.remaining() < size {
            return Err(self.err(format!(
                "expected {} more bytes, but only {} remain",
                size,
                self.remaining()
            )));
        }

        let bufs = &self.bufs[self.current_idx..self.current_idx + size];
        self.current_idx += size;

        Ok(bufs)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], GspErr> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bufs(N)?);

        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, GspErr> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, GspErr> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u16_be(&mut self) -> Result<u16, GspErr> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, GspErr> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_be(&mut self) -> Result<i32, GspErr> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, GspErr> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_be(&mut self) -> Result<i64, GspErr> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_f32_le(&mut self) -> Result<f32, GspErr> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Consume `expected` or fail describing `what` was wrong.
    pub fn expect(&mut self, expected: &[u8], what: &str) -> Result<(), GspErr> {
        let start = self.current_idx;
        let got = self.read_bufs(expected.len())?;

        if got != expected {
            self.current_idx = start;

            return Err(self.err(format!(
                "invalid {}, expected {:02X?}, but got {:02X?}",
                what, expected, got
            )));
        }

        Ok(())
    }

    /// Read a NUL-terminated string, decoded as lossy UTF-8.
    pub fn read_nt_str(&mut self) -> Result<String, GspErr> {
        let rest = self.remaining_bytes();

        match rest.iter().position(|&b| b == 0x00) {
            Some(end) => {
                let result = String::from_utf8_lossy(&rest[..end]).into_owned();
                self.current_idx += end + 1;

                Ok(result)
            }
            None => Err(self.err("unterminated string")),
        }
    }

    /// Read bytes up to (and consuming) `delimiter`, or to the end.
    pub fn read_until(&mut self, delimiter: u8) -> &'a [u8] {
        let rest = self.remaining_bytes();

        match rest.iter().position(|&b| b == delimiter) {
            Some(end) => {
                self.current_idx += end + 1;
                &rest[..end]
            }
            None => {
                self.current_idx = self.bufs.len();
                rest
            }
        }
    }
}

/// Decode big-endian UTF-16, replacing invalid sequences.
pub fn bufs_to_utf16_str(protocol: &'static str, bufs: &[u8]) -> Result<String, GspErr> {
    if bufs.len() % 2 != 0 {
        return Err(GspErr::parse(
            protocol,
            format!(
                "Conversion from UTF-16 to string failed. Expected length to be even, but got: {}",
                bufs.len()
            ),
        ));
    }

    Ok(String::from_utf16_lossy(
        bufs.chunks(2)
            .map(|x| u16::from_be_bytes([x[0], x[1]]))
            .collect::<Vec<_>>()
            .as_slice(),
    ))
}

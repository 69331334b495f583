use crate::{reader::ByteReader, GspErr};

const SEGMENT_BITS: u32 = 0x7F;
const CHECKER_BIT: u8 = 0x80;
/// VarInts are never longer than 5 bytes.
pub const MAX_VARINT_LEN: usize = 5;

/// Encode the given number as a [VarInt](https://wiki.vg/Protocol#VarInt_and_VarLong).
pub fn encode_varint(num: i32) -> Vec<u8> {
    // Negative values always use the maximum number of bytes, so encode
    // the two's complement bit pattern.
    let mut num = num as u32;
    let mut result = Vec::<u8>::new();

    loop {
        if (num & (!SEGMENT_BITS)) == 0 {
            result.push(num as u8);

            return result;
        }

        result.push(((num & SEGMENT_BITS) | (!SEGMENT_BITS)) as u8);
        num >>= 7;
    }
}

/// Try to decode a VarInt at the start of `bufs`.
///
/// Returns `Ok(None)` if `bufs` ends before the VarInt does, otherwise the
/// value and the number of bytes it occupied.
pub fn peek_varint(protocol: &'static str, bufs: &[u8]) -> Result<Option<(i32, usize)>, GspErr> {
    let mut result = 0i32;

    for (i, &n) in bufs.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= ((n as i32) & (SEGMENT_BITS as i32)) << (i * 7);

        if n & CHECKER_BIT == 0 {
            return Ok(Some((result, i + 1)));
        }
    }

    if bufs.len() >= MAX_VARINT_LEN {
        return Err(GspErr::parse(
            protocol,
            format!("VarInts are never longer than {} bytes", MAX_VARINT_LEN),
        ));
    }

    Ok(None)
}

impl ByteReader<'_> {
    /// Read a VarInt from the cursor.
    pub fn read_varint(&mut self) -> Result<i32, GspErr> {
        let start = self.position();

        match peek_varint("varint", self.remaining_bytes()) {
            Ok(Some((value, len))) => {
                self.skip(len)?;
                Ok(value)
            }
            Ok(None) => Err(self.err("truncated VarInt")),
            Err(_) => Err(self.err(format!(
                "VarInt starting at {} is longer than {} bytes",
                start, MAX_VARINT_LEN
            ))),
        }
    }
}

use super::{drive, parse_count, State, Target};
use crate::{
    conf::UdpDeadlines, normalize::IntermediateFields, reader::ByteReader,
    transport::UdpTransport, GspErr,
};
use std::collections::HashMap;
use tracing::debug;

pub const PROTOCOL: &str = "minecraft query";
const MAGIC: [u8; 2] = [0xFE, 0xFD];
const HANDSHAKE: u8 = 0x09;
const STAT: u8 = 0x00;
/// Only the lower 4 bits of each session id byte are used.
const SESSION_MASK: i32 = 0x0F0F_0F0F;
/// `splitnum\0\x80\0`
const KV_PADDING: usize = 11;
/// `\x01player_\0\0`
const PLAYER_PADDING: usize = 10;

/// Full stat reply, key/values and player names.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FullStat {
    pub values: HashMap<String, String>,
    pub players: Vec<String>,
}

pub fn session_id(seed: u32) -> i32 {
    seed as i32 & SESSION_MASK
}

pub fn encode_handshake(session: i32) -> Vec<u8> {
    [&MAGIC[..], &[HANDSHAKE], &session.to_be_bytes()].concat()
}

pub fn encode_full_stat(session: i32, token: i32) -> Vec<u8> {
    [
        &MAGIC[..],
        &[STAT],
        &session.to_be_bytes(),
        &token.to_be_bytes(),
        // Padding to request the full stat.
        &[0x00; 4],
    ]
    .concat()
}

/// Check the reply header, `None` when it belongs to another session or
/// another round (a repeated handshake reply while waiting for the stat).
fn reply_body<'a>(
    bufs: &'a [u8],
    kind: u8,
    session: i32,
) -> Result<Option<ByteReader<'a>>, GspErr> {
    let mut reader = ByteReader::create(PROTOCOL, bufs);

    let got = reader.read_u8()?;
    if got != kind {
        if [HANDSHAKE, STAT].contains(&got) {
            debug!(expected = kind, got, "discarding reply of another round");
            return Ok(None);
        }

        return Err(reader.err(format!(
            "expected reply type 0x{:02X}, but got: 0x{:02X}",
            kind, got
        )));
    }

    match reader.read_i32_be()? == session {
        true => Ok(Some(reader)),
        false => Ok(None),
    }
}

/// Decode the handshake reply into the challenge token.
pub fn decode_handshake(bufs: &[u8], session: i32) -> Result<Option<i32>, GspErr> {
    let Some(mut reader) = reply_body(bufs, HANDSHAKE, session)? else {
        return Ok(None);
    };

    let token = reader.read_nt_str()?;

    token
        .trim()
        .parse::<i32>()
        .map(Some)
        .map_err(|_| GspErr::parse(PROTOCOL, format!("invalid challenge token {:?}", token)))
}

pub fn decode_full_stat(bufs: &[u8], session: i32) -> Result<Option<FullStat>, GspErr> {
    let Some(mut reader) = reply_body(bufs, STAT, session)? else {
        return Ok(None);
    };
    let mut stat = FullStat::default();

    reader.skip(KV_PADDING)?;

    loop {
        let key = reader.read_nt_str()?;
        if key.is_empty() {
            break;
        }

        let value = reader.read_nt_str()?;
        stat.values.insert(key, value);
    }

    reader.skip(PLAYER_PADDING)?;

    while !reader.is_empty() {
        let name = reader.read_nt_str()?;
        if name.is_empty() {
            break;
        }

        stat.players.push(name);
    }

    Ok(Some(stat))
}

/// Receive until `decode` accepts a datagram for this session.
fn recv_session<T>(
    udp: &mut UdpTransport,
    mut decode: impl FnMut(&[u8]) -> Result<Option<T>, GspErr>,
) -> Result<T, GspErr> {
    loop {
        if let Some(value) = decode(&udp.recv()?)? {
            return Ok(value);
        }

        debug!("discarding reply");
    }
}

pub fn run(target: &Target, deadlines: &UdpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(PROTOCOL, |machine| {
        let mut udp = UdpTransport::open(&target.addr, deadlines)?;
        let session = session_id(std::process::id());

        udp.send(&encode_handshake(session))?;
        machine.enter(State::Challenge);

        let token = recv_session(&mut udp, |bufs| decode_handshake(bufs, session))?;

        udp.send(&encode_full_stat(session, token))?;
        machine.enter(State::RequestSent);

        let mut stat = recv_session(&mut udp, |bufs| decode_full_stat(bufs, session))?;
        machine.enter(State::ResponseReceived);

        let count = |stat: &FullStat, key: &str| {
            stat.values
                .get(key)
                .map(|value| parse_count(PROTOCOL, key, value))
                .transpose()
        };
        let current_players = count(&stat, "numplayers")?;
        let max_players = count(&stat, "maxplayers")?;

        Ok(IntermediateFields {
            name: stat.values.remove("hostname"),
            map: stat.values.remove("map"),
            mode: stat.values.remove("gametype"),
            version: stat.values.remove("version"),
            max_players,
            current_players,
            players: Some(stat.players.into_iter().map(Some).collect()),
            ..Default::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn full_stat_reply(session: i32, values: &[(&str, &str)], players: &[&str]) -> Vec<u8> {
        let mut bufs = vec![STAT];
        bufs.extend_from_slice(&session.to_be_bytes());
        bufs.extend_from_slice(b"splitnum\x00\x80\x00");
        for (key, value) in values {
            bufs.extend_from_slice(key.as_bytes());
            bufs.push(0);
            bufs.extend_from_slice(value.as_bytes());
            bufs.push(0);
        }
        bufs.push(0);
        bufs.extend_from_slice(b"\x01player_\x00\x00");
        for name in players {
            bufs.extend_from_slice(name.as_bytes());
            bufs.push(0);
        }
        bufs.push(0);
        bufs
    }

    #[test]
    fn session_id_is_masked() {
        assert_eq!(session_id(0xFFFF_FFFF), 0x0F0F_0F0F);
        assert_eq!(session_id(0x1234_5678), 0x0204_0608);
    }

    #[test]
    fn handshake_token() {
        let mut bufs = vec![HANDSHAKE, 0, 0, 0, 1];
        bufs.extend_from_slice(b"-9513307\0");

        assert_eq!(decode_handshake(&bufs, 1).unwrap(), Some(-9513307));
        assert_eq!(decode_handshake(&bufs, 2).unwrap(), None);

        let mut bad = vec![HANDSHAKE, 0, 0, 0, 1];
        bad.extend_from_slice(b"abc\0");
        assert_eq!(
            decode_handshake(&bad, 1).unwrap_err().kind(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn full_stat_request_layout() {
        assert_eq!(
            encode_full_stat(1, 2),
            vec![0xFE, 0xFD, 0x00, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 0]
        );
    }

    #[test]
    fn decode_stat() {
        let bufs = full_stat_reply(
            3,
            &[("hostname", "A Server"), ("numplayers", "2"), ("maxplayers", "20")],
            &["Steve", "Alex"],
        );
        let stat = decode_full_stat(&bufs, 3).unwrap().unwrap();

        assert_eq!(stat.values["hostname"], "A Server");
        assert_eq!(stat.values["maxplayers"], "20");
        assert_eq!(stat.players, vec!["Steve", "Alex"]);
    }

    #[test]
    fn replies_of_another_round_are_skipped() {
        let mut handshake = vec![HANDSHAKE, 0, 0, 0, 3];
        handshake.extend_from_slice(b"42\0");

        assert_eq!(decode_full_stat(&handshake, 3).unwrap(), None);
        assert_eq!(
            decode_full_stat(&[0x07, 0, 0, 0, 3], 3).unwrap_err().kind(),
            ErrorKind::ParseError
        );
    }

    #[test]
    fn truncated_stat_fails() {
        let bufs = full_stat_reply(3, &[("hostname", "A Server")], &[]);

        assert!(decode_full_stat(&bufs[..20], 3).is_err());
    }
}

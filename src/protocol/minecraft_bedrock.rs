use super::{drive, parse_count, State, Target};
use crate::{
    conf::UdpDeadlines, normalize::IntermediateFields, reader::ByteReader,
    transport::UdpTransport, GspErr,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

pub const PROTOCOL: &str = "minecraft bedrock";
const UNCONNECTED_PING: u8 = 0x01;
const UNCONNECTED_PONG: u8 = 0x1C;
const MAGIC_BYTES: &[u8] = &[
    0x00, 0xFF, 0xFF, 0x00, 0xFE, 0xFE, 0xFE, 0xFE, 0xFD, 0xFD, 0xFD, 0xFD, 0x12, 0x34, 0x56, 0x78,
];

/// Fields of the pong's server id string.
///
/// `motd_line_1` is the upper line shown in the server list, `motd_line_2`
/// the lower one, usually the level name. See
/// <https://wiki.vg/images/b/bb/Server_ID_String_Example.png>.
#[derive(Debug, PartialEq, Eq)]
pub struct BedrockStatus {
    /// MOTD line 1 for upstream display.
    pub motd_line_1: String,
    pub version_name: String,
    pub online_players: u64,
    pub max_players: u64,
    /// MOTD line 2 for downstream display, the level name.
    pub motd_line_2: Option<String>,
    pub game_mode: Option<String>,
}

/// Build an unconnected ping.
pub fn encode_ping(timestamp: i64, client_guid: i64) -> Vec<u8> {
    [
        &[UNCONNECTED_PING][..],
        &timestamp.to_be_bytes(),
        MAGIC_BYTES,
        &client_guid.to_be_bytes(),
    ]
    .concat()
}

/// Decode an unconnected pong, returning the echoed timestamp and the status.
pub fn decode_pong(bufs: &[u8]) -> Result<(i64, BedrockStatus), GspErr> {
    let mut reader = ByteReader::create(PROTOCOL, bufs);

    let id = reader.read_u8()?;
    if id != UNCONNECTED_PONG {
        return Err(reader.err(format!(
            "Packet response expected to start with: 0x1C, but got: 0x{:02X}",
            id
        )));
    }

    let timestamp = reader.read_i64_be()?;
    let _server_guid = reader.read_i64_be()?;
    reader.expect(MAGIC_BYTES, "magic")?;

    let server_info_len = reader.read_u16_be()? as usize;
    let server_info = String::from_utf8_lossy(reader.read_bufs(server_info_len)?);
    let parts = server_info.split(';').collect::<Vec<_>>();

    // Edition, MOTD, protocol, version, online, max, then optional extras.
    if parts.len() < 6 {
        return Err(GspErr::parse(
            PROTOCOL,
            format!(
                "Expected at least 6 parts of server information, but {} were obtained.",
                parts.len()
            ),
        ));
    }

    let optional = |idx: usize| {
        parts
            .get(idx)
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
    };

    Ok((
        timestamp,
        BedrockStatus {
            motd_line_1: parts[1].into(),
            version_name: parts[3].into(),
            online_players: parse_count(PROTOCOL, "online players", parts[4])?,
            max_players: parse_count(PROTOCOL, "max players", parts[5])?,
            motd_line_2: optional(7),
            game_mode: optional(8),
        },
    ))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

pub fn run(target: &Target, deadlines: &UdpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(PROTOCOL, |machine| {
        let mut udp = UdpTransport::open(&target.addr, deadlines)?;
        let timestamp = now_millis();

        udp.send(&encode_ping(timestamp, std::process::id() as i64))?;
        machine.enter(State::RequestSent);

        // Stale pongs from earlier pings are dropped, the read budget bounds the wait.
        let status = loop {
            let (echo, status) = decode_pong(&udp.recv()?)?;

            if echo == timestamp {
                break status;
            }

            debug!(expected = timestamp, got = echo, "discarding stale pong");
        };
        machine.enter(State::ResponseReceived);

        Ok(IntermediateFields {
            name: Some(status.motd_line_1),
            map: status.motd_line_2,
            mode: status.game_mode,
            version: Some(status.version_name),
            max_players: Some(status.max_players),
            current_players: Some(status.online_players),
            ..Default::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn pong(timestamp: i64, info: &str) -> Vec<u8> {
        [
            &[UNCONNECTED_PONG][..],
            &timestamp.to_be_bytes(),
            &7i64.to_be_bytes(),
            MAGIC_BYTES,
            &(info.len() as u16).to_be_bytes(),
            info.as_bytes(),
        ]
        .concat()
    }

    #[test]
    fn ping_layout() {
        let bufs = encode_ping(0x0102, 9);

        assert_eq!(bufs.len(), 1 + 8 + 16 + 8);
        assert_eq!(bufs[0], UNCONNECTED_PING);
        assert_eq!(&bufs[1..9], &0x0102i64.to_be_bytes());
        assert_eq!(&bufs[9..25], MAGIC_BYTES);
    }

    #[test]
    fn decode_full_pong() {
        let info = "MCPE;Dedicated Server;390;1.14.60;2;10;13253860892328930865;Bedrock level;Survival;1;19132;19133;";
        let (echo, status) = decode_pong(&pong(42, info)).unwrap();

        assert_eq!(echo, 42);
        assert_eq!(status.motd_line_1, "Dedicated Server");
        assert_eq!(status.version_name, "1.14.60");
        assert_eq!(status.online_players, 2);
        assert_eq!(status.max_players, 10);
        assert_eq!(status.motd_line_2.as_deref(), Some("Bedrock level"));
        assert_eq!(status.game_mode.as_deref(), Some("Survival"));
    }

    #[test]
    fn short_server_id_string() {
        let (_, status) = decode_pong(&pong(1, "MCPE;Old;100;1.0;0;5")).unwrap();
        assert_eq!(status.motd_line_2, None);

        let err = decode_pong(&pong(1, "MCPE;Broken")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bufs = pong(1, "MCPE;x;1;1;0;1");
        bufs[17] = 0xAA;

        assert!(decode_pong(&bufs)
            .unwrap_err()
            .to_string()
            .contains("invalid magic"));
    }
}

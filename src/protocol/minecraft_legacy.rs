use super::{drive, parse_count, State, Target};
use crate::{
    conf::TcpDeadlines,
    normalize::IntermediateFields,
    reader::{bufs_to_utf16_str, ByteReader},
    transport::TcpTransport,
    GspErr,
};

pub const LEGACY_PROTOCOL: &str = "minecraft legacy";
pub const BETA_PROTOCOL: &str = "minecraft beta";
/// Protocol version sent in the 1.6 ping, servers reply with their own.
const PING_PROTOCOL_VERSION: u8 = 74;
const KICK_PACKET_ID: u8 = 0xFF;

/// Server [1.4 to 1.6](https://wiki.vg/Server_List_Ping#1.6) reply.
#[derive(Debug, PartialEq, Eq)]
pub struct LegacyStatus {
    pub protocol_version: String,
    pub server_version: String,
    pub motd: String,
    pub online_players: u64,
    pub max_players: u64,
}

/// Server [beta 1.8 to 1.3](https://wiki.vg/Server_List_Ping#Beta_1.8_to_1.3) reply.
#[derive(Debug, PartialEq, Eq)]
pub struct BetaStatus {
    pub motd: String,
    pub online_players: u64,
    pub max_players: u64,
}

fn utf16_be(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|c| c.to_be_bytes()).collect()
}

/// Build the 1.6 ping, which older servers also answer.
pub fn encode_legacy_request(host: &str, port: u16) -> Vec<u8> {
    let channel = "MC|PingHost";
    let host_bytes = utf16_be(host);
    let host_chars = host.encode_utf16().count() as u16;

    let mut packet = vec![0xFE, 0x01, 0xFA];

    packet.extend_from_slice(&(channel.len() as u16).to_be_bytes());
    packet.extend(utf16_be(channel));
    // Rest of the data: protocol (1) + host length (2) + host + port (4).
    packet.extend_from_slice(&(7 + host_bytes.len() as u16).to_be_bytes());
    packet.push(PING_PROTOCOL_VERSION);
    packet.extend_from_slice(&host_chars.to_be_bytes());
    packet.extend(host_bytes);
    packet.extend_from_slice(&(port as i32).to_be_bytes());

    packet
}

pub fn encode_beta_request() -> Vec<u8> {
    vec![0xFE]
}

/// Unwrap the kick packet both generations answer with.
fn decode_kick(protocol: &'static str, bufs: &[u8]) -> Result<String, GspErr> {
    let mut reader = ByteReader::create(protocol, bufs);

    let id = reader.read_u8()?;
    if id != KICK_PACKET_ID {
        return Err(GspErr::parse(
            protocol,
            format!(
                "Server response data is invalid, it should start with: 0xFF, but got: 0x{:02X}",
                id
            ),
        ));
    }

    let chars = reader.read_u16_be()? as usize;
    let text = reader.read_bufs(chars * 2)?;

    bufs_to_utf16_str(protocol, text)
}

pub fn decode_legacy_response(bufs: &[u8]) -> Result<LegacyStatus, GspErr> {
    let text = decode_kick(LEGACY_PROTOCOL, bufs)?;

    // The packet is a UTF-16BE string. It begins with two characters: §1
    let Some(body) = text.strip_prefix("§1\0") else {
        return Err(GspErr::parse(
            LEGACY_PROTOCOL,
            format!(
                "Server response info must start with: §1, but got: {:?}",
                text.chars().take(2).collect::<String>()
            ),
        ));
    };

    // Protocol version, server version, MOTD, current players, max players.
    let parts = body.split('\0').collect::<Vec<_>>();
    let [protocol_version, server_version, motd, online, max] = parts[..] else {
        return Err(GspErr::parse(
            LEGACY_PROTOCOL,
            format!(
                "Server response info len is invalid, it must be 5, but got {}",
                parts.len()
            ),
        ));
    };

    Ok(LegacyStatus {
        protocol_version: protocol_version.into(),
        server_version: server_version.into(),
        motd: motd.into(),
        online_players: parse_count(LEGACY_PROTOCOL, "online players", online)?,
        max_players: parse_count(LEGACY_PROTOCOL, "max players", max)?,
    })
}

pub fn decode_beta_response(bufs: &[u8]) -> Result<BetaStatus, GspErr> {
    let text = decode_kick(BETA_PROTOCOL, bufs)?;

    // The MOTD may itself contain §, the counts never do.
    let mut parts = text.rsplitn(3, '§');
    let (Some(max), Some(online), Some(motd)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(GspErr::parse(
            BETA_PROTOCOL,
            format!("expected `motd§online§max`, but got {:?}", text),
        ));
    };

    Ok(BetaStatus {
        motd: motd.into(),
        online_players: parse_count(BETA_PROTOCOL, "online players", online)?,
        max_players: parse_count(BETA_PROTOCOL, "max players", max)?,
    })
}

/// Read the kick packet until its declared length is met or the server hangs up.
fn read_kick(protocol: &'static str, tcp: &mut TcpTransport) -> Result<Vec<u8>, GspErr> {
    let mut bufs = Vec::<u8>::new();
    let mut expected = None;

    loop {
        if expected.is_none() && bufs.len() >= 3 {
            expected = Some(3 + u16::from_be_bytes([bufs[1], bufs[2]]) as usize * 2);
        }

        let want = match expected {
            Some(total) if bufs.len() >= total => break,
            Some(total) => total - bufs.len(),
            None => 3 - bufs.len(),
        };

        match tcp.read_or_eof(want)? {
            Some(more) => bufs.extend(more),
            None if bufs.is_empty() => {
                return Err(GspErr::parse(protocol, "connection closed without a reply"))
            }
            None => break,
        }
    }

    Ok(bufs)
}

pub fn run_legacy(target: &Target, deadlines: &TcpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(LEGACY_PROTOCOL, |machine| {
        let mut tcp = TcpTransport::connect(&target.addr, deadlines)?;

        tcp.write(&encode_legacy_request(&target.host, target.addr.port()))?;
        machine.enter(State::RequestSent);

        let bufs = read_kick(LEGACY_PROTOCOL, &mut tcp)?;
        machine.enter(State::ResponseReceived);

        let status = decode_legacy_response(&bufs)?;

        Ok(IntermediateFields {
            name: Some(status.motd),
            version: Some(status.server_version),
            max_players: Some(status.max_players),
            current_players: Some(status.online_players),
            ..Default::default()
        })
    })
}

pub fn run_beta(target: &Target, deadlines: &TcpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(BETA_PROTOCOL, |machine| {
        let mut tcp = TcpTransport::connect(&target.addr, deadlines)?;

        tcp.write(&encode_beta_request())?;
        machine.enter(State::RequestSent);

        let bufs = read_kick(BETA_PROTOCOL, &mut tcp)?;
        machine.enter(State::ResponseReceived);

        let status = decode_beta_response(&bufs)?;

        Ok(IntermediateFields {
            name: Some(status.motd),
            max_players: Some(status.max_players),
            current_players: Some(status.online_players),
            ..Default::default()
        })
    })
}

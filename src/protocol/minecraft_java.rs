use super::{drive, State, Target};
use crate::{
    conf::TcpDeadlines,
    normalize::IntermediateFields,
    reader::ByteReader,
    transport::TcpTransport,
    varint::{encode_varint, peek_varint, MAX_VARINT_LEN},
    GspErr,
};
use serde::Deserialize;

pub const PROTOCOL: &str = "minecraft java";
/// Packets cannot be larger than 2^21 bytes.
const MAX_PACKET_LEN: usize = 1 << 21;

/// Status response JSON.
#[derive(Deserialize, Debug)]
pub struct Status {
    pub version: Option<Version>,
    pub players: Option<Players>,
    pub description: Option<Description>,
}

#[derive(Deserialize, Debug)]
pub struct Version {
    pub name: String,
}

#[derive(Deserialize, Debug)]
pub struct Players {
    pub max: u64,
    pub online: u64,
    pub sample: Option<Vec<Player>>,
}

#[derive(Deserialize, Debug)]
pub struct Player {
    pub name: String,
}

/// Server description, similar to MOTD.
///
/// Either a plain string or a chat component tree.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum Description {
    Plain(String),
    Component(DescriptionComponent),
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct DescriptionComponent {
    pub text: String,
    pub extra: Vec<Description>,
}

impl Description {
    /// Concatenate every text node, depth first.
    pub fn flatten(&self) -> String {
        match self {
            Description::Plain(text) => text.clone(),
            Description::Component(component) => {
                let mut result = component.text.clone();

                for extra in &component.extra {
                    result.push_str(&extra.flatten());
                }

                result
            }
        }
    }
}

impl Status {
    fn into_fields(self) -> IntermediateFields {
        let motd = self.description.map(|d| d.flatten());
        let (max, online, players) = match self.players {
            Some(players) => {
                let names = match players.sample {
                    Some(sample) => Some(sample.into_iter().map(|p| Some(p.name)).collect()),
                    None if players.online == 0 => Some(vec![]),
                    // Player list hidden by the server.
                    None => None,
                };

                (Some(players.max), Some(players.online), names)
            }
            None => (None, None, None),
        };

        IntermediateFields {
            name: motd
                .as_deref()
                .map(|motd| motd.lines().next().unwrap_or_default().trim().to_string()),
            description: motd,
            version: self.version.map(|v| v.name),
            max_players: max,
            current_players: online,
            players,
            ..Default::default()
        }
    }
}

/// Build handshake and status request packets.
pub fn encode_request(host: &str, port: u16) -> Vec<u8> {
    let mut packet = Vec::<u8>::new();
    let mut packet_data = Vec::<u8>::new();
    let server_addr_bytes = host.as_bytes();

    // If the client is pinging to determine what version to use,
    // by convention -1 should be set.
    packet_data.append(&mut encode_varint(-1));
    // UTF-8 string prefixed with its size in bytes as a VarInt.
    packet_data.append(&mut encode_varint(server_addr_bytes.len() as i32));
    packet_data.extend_from_slice(server_addr_bytes);
    packet_data.extend_from_slice(&port.to_be_bytes());
    // Next state, 1 for status.
    packet_data.append(&mut encode_varint(1));

    // Handshake [packet](https://wiki.vg/Protocol#Packet_format)
    packet.append(&mut encode_varint(1 + packet_data.len() as i32));
    packet.append(&mut encode_varint(0x00));
    packet.append(&mut packet_data);

    // Status request
    packet.append(&mut encode_varint(1));
    packet.append(&mut encode_varint(0x00));

    packet
}

/// Decode a status response packet body (everything after the length).
pub fn decode_response(packet: &[u8]) -> Result<Status, GspErr> {
    let mut reader = ByteReader::create(PROTOCOL, packet);

    let id = reader.read_varint()?;
    if id != 0x00 {
        return Err(reader.err(format!(
            "Packet response expected id 0x00, but got: 0x{:02X}",
            id
        )));
    }

    let size = reader.read_varint()?;
    if size < 0 {
        return Err(reader.err(format!("negative string length {}", size)));
    }

    let json = String::from_utf8_lossy(reader.read_bufs(size as usize)?);

    serde_json::from_str::<Status>(&json)
        .map_err(|err| GspErr::parse(PROTOCOL, format!("status JSON: {}", err)))
}

/// Accumulate one length-prefixed packet, returning the body.
fn read_packet(tcp: &mut TcpTransport) -> Result<Vec<u8>, GspErr> {
    let mut bufs = Vec::<u8>::new();

    let (len, prefix) = loop {
        if let Some(found) = peek_varint(PROTOCOL, &bufs)? {
            break found;
        }

        match tcp.read_or_eof(MAX_VARINT_LEN)? {
            Some(more) => bufs.extend(more),
            None => return Err(truncated(bufs.len(), None)),
        }
    };

    if len < 0 || len as usize > MAX_PACKET_LEN {
        return Err(GspErr::parse(
            PROTOCOL,
            format!("invalid packet length {}", len),
        ));
    }

    let total = prefix + len as usize;
    while bufs.len() < total {
        match tcp.read_or_eof(total - bufs.len())? {
            Some(more) => bufs.extend(more),
            None => return Err(truncated(bufs.len(), Some(total))),
        }
    }

    Ok(bufs[prefix..total].to_vec())
}

fn truncated(got: usize, expected: Option<usize>) -> GspErr {
    GspErr::parse(
        PROTOCOL,
        match expected {
            Some(expected) => format!(
                "connection closed after {} of {} bytes",
                got, expected
            ),
            None => format!("connection closed after {} bytes", got),
        },
    )
}

pub fn run(target: &Target, deadlines: &TcpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(PROTOCOL, |machine| {
        let mut tcp = TcpTransport::connect(&target.addr, deadlines)?;

        tcp.write(&encode_request(&target.host, target.addr.port()))?;
        machine.enter(State::RequestSent);

        let packet = read_packet(&mut tcp)?;
        machine.enter(State::ResponseReceived);

        Ok(decode_response(&packet)?.into_fields())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn status_packet(json: &str) -> Vec<u8> {
        let mut packet = encode_varint(0x00);
        packet.append(&mut encode_varint(json.len() as i32));
        packet.extend_from_slice(json.as_bytes());
        packet
    }

    #[test]
    fn handshake_carries_host_and_port() {
        let bufs = encode_request("mc.example.com", 25566);
        let mut reader = ByteReader::create("test", &bufs);

        let len = reader.read_varint().unwrap() as usize;
        let start = reader.position();
        assert_eq!(reader.read_varint().unwrap(), 0x00);
        assert_eq!(reader.read_varint().unwrap(), -1);
        let host_len = reader.read_varint().unwrap() as usize;
        assert_eq!(reader.read_bufs(host_len).unwrap(), b"mc.example.com");
        assert_eq!(reader.read_u16_be().unwrap(), 25566);
        assert_eq!(reader.read_varint().unwrap(), 1);
        assert_eq!(reader.position() - start, len);
        // Status request
        assert_eq!(reader.remaining_bytes(), &[0x01, 0x00]);
    }

    #[test]
    fn decode_full_status() {
        let json = r#"{
            "version": {"name": "1.20.4", "protocol": 765},
            "players": {"max": 16, "online": 2, "sample": [{"name": "Steve", "id": "x"}, {"name": "Alex", "id": "y"}]},
            "description": {"text": "Arena", "extra": [{"text": "\nPvP"}, " only"]},
            "enforcesSecureChat": true
        }"#;

        let fields = decode_response(&status_packet(json)).unwrap().into_fields();

        assert_eq!(fields.name.as_deref(), Some("Arena"));
        assert_eq!(fields.description.as_deref(), Some("Arena\nPvP only"));
        assert_eq!(fields.version.as_deref(), Some("1.20.4"));
        assert_eq!(fields.current_players, Some(2));
        assert_eq!(
            fields.players,
            Some(vec![Some("Steve".into()), Some("Alex".into())])
        );
    }

    #[test]
    fn empty_server_has_empty_list_hidden_sample_has_none() {
        let empty = r#"{"players": {"max": 10, "online": 0}, "description": "x"}"#;
        let hidden = r#"{"players": {"max": 10, "online": 4}, "description": "x"}"#;

        assert_eq!(
            decode_response(&status_packet(empty)).unwrap().into_fields().players,
            Some(vec![])
        );
        assert_eq!(
            decode_response(&status_packet(hidden)).unwrap().into_fields().players,
            None
        );
    }

    #[test]
    fn malformed_packets_are_parse_errors() {
        let wrong_id = [0x01, 0x00];
        let short_string = [0x00, 0x10, b'{'];
        let bad_json = status_packet("{\"players\": 3");

        for packet in [&wrong_id[..], &short_string[..], &bad_json[..]] {
            assert_eq!(
                decode_response(packet).unwrap_err().kind(),
                ErrorKind::ParseError
            );
        }
    }
}

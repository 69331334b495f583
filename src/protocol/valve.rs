//! Valve A2S queries, documented on the
//! [Valve Developer Wiki](https://developer.valvesoftware.com/wiki/Server_queries).

use super::{drive, Machine, State, Target};
use crate::{
    conf::UdpDeadlines, info::TriBool, normalize::IntermediateFields, reader::ByteReader,
    transport::UdpTransport, GspErr,
};
use std::collections::BTreeMap;
use tracing::debug;

pub const PROTOCOL: &str = "valve";

const SINGLE_PACKET: i32 = -1;
const SPLIT_PACKET: i32 = -2;

const A2S_INFO: u8 = b'T';
const A2S_PLAYER: u8 = b'U';
const S2C_CHALLENGE: u8 = b'A';
const INFO_SOURCE: u8 = b'I';
const INFO_GOLDSRC: u8 = b'm';
const PLAYER_REPLY: u8 = b'D';
const REPLIES: &[u8] = &[INFO_SOURCE, INFO_GOLDSRC, PLAYER_REPLY];

const INFO_PAYLOAD: &[u8] = b"Source Engine Query\0";
/// Asks the server to hand out a challenge.
const NO_CHALLENGE: &[u8] = &[0xFF; 4];
const THE_SHIP_APP_ID: u16 = 2400;

/// A2S_INFO reply, both engine generations.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Info {
    pub name: String,
    pub map: String,
    pub folder: String,
    pub game: String,
    pub players: u8,
    pub max_players: u8,
    pub bots: u8,
    pub has_password: bool,
    pub vac_secured: bool,
    /// Not sent by GoldSrc servers.
    pub version: Option<String>,
    /// Not sent by GoldSrc servers.
    pub app_id: Option<u16>,
}

impl Info {
    /// The Ship appends deaths and money to every player entry.
    fn is_the_ship(&self) -> bool {
        self.app_id == Some(THE_SHIP_APP_ID)
    }
}

#[derive(Debug, PartialEq)]
pub struct Player {
    /// Empty while the player is still connecting.
    pub name: String,
    pub score: i32,
    pub duration: f32,
}

pub fn encode_request(kind: u8, payload: &[u8]) -> Vec<u8> {
    [&SINGLE_PACKET.to_le_bytes()[..], &[kind], payload].concat()
}

/// Split the `kind` byte off a reassembled payload.
pub fn decode_packet(bufs: &[u8]) -> Result<(u8, &[u8]), GspErr> {
    let mut reader = ByteReader::create(PROTOCOL, bufs);

    let header = reader.read_i32_le()?;
    if header != SINGLE_PACKET {
        return Err(reader.err(format!("unexpected packet header {}", header)));
    }

    let kind = reader.read_u8()?;

    Ok((kind, reader.remaining_bytes()))
}

/// Collects the fragments of one split response.
///
/// Source engine layout only, compressed responses are rejected.
#[derive(Debug, Default)]
pub struct Reassembly {
    id: Option<u32>,
    total: u8,
    chunks: BTreeMap<u8, Vec<u8>>,
}

impl Reassembly {
    /// Feed one datagram, returning the full payload once complete.
    pub fn push(&mut self, datagram: &[u8]) -> Result<Option<Vec<u8>>, GspErr> {
        let mut reader = ByteReader::create(PROTOCOL, datagram);

        match reader.read_i32_le()? {
            SINGLE_PACKET => return Ok(Some(datagram.to_vec())),
            SPLIT_PACKET => {}
            header => return Err(reader.err(format!("unexpected packet header {}", header))),
        }

        let id = reader.read_u32_le()?;
        let total = reader.read_u8()?;
        let number = reader.read_u8()?;
        let _size = reader.read_u16_le()?;

        if id >> 31 == 1 {
            return Err(reader.err("compressed split responses are not supported"));
        }

        if total == 0 || number >= total {
            return Err(reader.err(format!("fragment {} of {}", number, total)));
        }

        match self.id {
            Some(expected) if expected != id => {
                debug!(expected, got = id, "discarding fragment of another response");
                return Ok(None);
            }
            Some(_) if total != self.total => {
                return Err(reader.err(format!(
                    "fragment claims {} parts, response has {}",
                    total, self.total
                )));
            }
            Some(_) => {}
            None => {
                self.id = Some(id);
                self.total = total;
            }
        }

        if self.chunks.contains_key(&number) {
            debug!(id, number, "discarding duplicate fragment");
            return Ok(None);
        }

        self.chunks.insert(number, reader.remaining_bytes().to_vec());

        match self.chunks.len() == self.total as usize {
            true => Ok(Some(
                std::mem::take(&mut self.chunks).into_values().flatten().collect(),
            )),
            false => Ok(None),
        }
    }
}

/// Receive one logical packet, reassembling split responses.
fn receive(udp: &mut UdpTransport) -> Result<(u8, Vec<u8>), GspErr> {
    let mut reassembly = Reassembly::default();

    loop {
        if let Some(payload) = reassembly.push(&udp.recv()?)? {
            let (kind, body) = decode_packet(&payload)?;

            return Ok((kind, body.to_vec()));
        }
    }
}

/// Receive the reply of the round answering with `expected`.
///
/// Replies of another round (a duplicated info reply while waiting for
/// players) are dropped, the read budget bounds the wait. Unknown kinds are
/// returned for the decoder to reject.
fn receive_reply(udp: &mut UdpTransport, expected: &[u8]) -> Result<(u8, Vec<u8>), GspErr> {
    loop {
        let (kind, body) = receive(udp)?;

        if expected.contains(&kind) || !REPLIES.contains(&kind) {
            return Ok((kind, body));
        }

        debug!(kind, "discarding reply of another round");
    }
}

/// Send `kind`, answering at most one challenge.
fn request(
    udp: &mut UdpTransport,
    machine: &mut Machine,
    (kind, payload): (u8, &[u8]),
    expected: &[u8],
    with_challenge: impl Fn(&[u8]) -> Vec<u8>,
) -> Result<(u8, Vec<u8>), GspErr> {
    udp.send(&encode_request(kind, payload))?;
    machine.enter(State::RequestSent);

    let (mut reply, mut body) = receive_reply(udp, expected)?;

    if reply == S2C_CHALLENGE {
        machine.enter(State::Challenge);

        let challenge = ByteReader::create(PROTOCOL, &body).read_bufs(4)?.to_vec();
        udp.send(&encode_request(kind, &with_challenge(&challenge)))?;
        machine.enter(State::RequestSent);

        (reply, body) = receive_reply(udp, expected)?;

        if reply == S2C_CHALLENGE {
            return Err(GspErr::parse(PROTOCOL, "server answered a challenge with another challenge"));
        }
    }

    machine.enter(State::ResponseReceived);

    Ok((reply, body))
}

fn decode_source_info(reader: &mut ByteReader) -> Result<Info, GspErr> {
    let _protocol = reader.read_u8()?;
    let name = reader.read_nt_str()?;
    let map = reader.read_nt_str()?;
    let folder = reader.read_nt_str()?;
    let game = reader.read_nt_str()?;
    let app_id = reader.read_u16_le()?;
    let players = reader.read_u8()?;
    let max_players = reader.read_u8()?;
    let bots = reader.read_u8()?;
    let _server_type = reader.read_u8()?;
    let _environment = reader.read_u8()?;
    let has_password = reader.read_u8()? != 0;
    let vac_secured = reader.read_u8()? != 0;

    if app_id == THE_SHIP_APP_ID {
        // Mode, witnesses, duration.
        reader.skip(3)?;
    }

    let version = reader.read_nt_str()?;

    Ok(Info {
        name,
        map,
        folder,
        game,
        players,
        max_players,
        bots,
        has_password,
        vac_secured,
        version: Some(version),
        app_id: Some(app_id),
    })
}

/// Obsolete GoldSrc reply, still sent by some Half-Life servers.
fn decode_goldsrc_info(reader: &mut ByteReader) -> Result<Info, GspErr> {
    let _address = reader.read_nt_str()?;
    let name = reader.read_nt_str()?;
    let map = reader.read_nt_str()?;
    let folder = reader.read_nt_str()?;
    let game = reader.read_nt_str()?;
    let players = reader.read_u8()?;
    let max_players = reader.read_u8()?;
    let _protocol = reader.read_u8()?;
    let _server_type = reader.read_u8()?;
    let _environment = reader.read_u8()?;
    let has_password = reader.read_u8()? != 0;

    if reader.read_u8()? == 1 {
        let _link = reader.read_nt_str()?;
        let _download_link = reader.read_nt_str()?;
        // NUL, version, size, type, dll.
        reader.skip(1 + 4 + 4 + 1 + 1)?;
    }

    let vac_secured = reader.read_u8()? != 0;
    let bots = reader.read_u8()?;

    Ok(Info {
        name,
        map,
        folder,
        game,
        players,
        max_players,
        bots,
        has_password,
        vac_secured,
        version: None,
        app_id: None,
    })
}

pub fn decode_info(kind: u8, body: &[u8]) -> Result<Info, GspErr> {
    let mut reader = ByteReader::create(PROTOCOL, body);

    match kind {
        INFO_SOURCE => decode_source_info(&mut reader),
        INFO_GOLDSRC => decode_goldsrc_info(&mut reader),
        kind => Err(GspErr::parse(
            PROTOCOL,
            format!("expected an info reply, but got: 0x{:02X}", kind),
        )),
    }
}

pub fn decode_players(kind: u8, body: &[u8], the_ship: bool) -> Result<Vec<Player>, GspErr> {
    if kind != PLAYER_REPLY {
        return Err(GspErr::parse(
            PROTOCOL,
            format!("expected a player reply, but got: 0x{:02X}", kind),
        ));
    }

    let mut reader = ByteReader::create(PROTOCOL, body);
    let count = reader.read_u8()? as usize;
    let mut players = Vec::with_capacity(count);

    for _ in 0..count {
        let _index = reader.read_u8()?;

        players.push(Player {
            name: reader.read_nt_str()?,
            score: reader.read_i32_le()?,
            duration: reader.read_f32_le()?,
        });

        if the_ship {
            // Deaths, money.
            reader.skip(4 + 4)?;
        }
    }

    Ok(players)
}

pub fn run(target: &Target, deadlines: &UdpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(PROTOCOL, |machine| {
        let mut udp = UdpTransport::open(&target.addr, deadlines)?;

        let (kind, body) = request(
            &mut udp,
            machine,
            (A2S_INFO, INFO_PAYLOAD),
            &[INFO_SOURCE, INFO_GOLDSRC],
            |challenge| [INFO_PAYLOAD, challenge].concat(),
        )?;
        let info = decode_info(kind, &body)?;

        let (kind, body) = request(
            &mut udp,
            machine,
            (A2S_PLAYER, NO_CHALLENGE),
            &[PLAYER_REPLY],
            |challenge| challenge.to_vec(),
        )?;
        let players = decode_players(kind, &body, info.is_the_ship())?;

        Ok(IntermediateFields {
            name: Some(info.name),
            map: Some(info.map),
            mode: Some(info.game),
            version: info.version,
            anti_cheat: TriBool::from(info.vac_secured),
            has_password: TriBool::from(info.has_password),
            max_players: Some(info.max_players as u64),
            current_players: Some(info.players as u64),
            players: Some(
                players
                    .into_iter()
                    .map(|p| Some(p.name).filter(|name| !name.is_empty()))
                    .collect(),
            ),
            ..Default::default()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn fragment(id: u32, total: u8, number: u8, payload: &[u8]) -> Vec<u8> {
        [
            &SPLIT_PACKET.to_le_bytes()[..],
            &id.to_le_bytes(),
            &[total, number],
            &1248u16.to_le_bytes(),
            payload,
        ]
        .concat()
    }

    fn source_info_body() -> Vec<u8> {
        let mut body = vec![17];
        body.extend_from_slice(b"Arena\0de_dust2\0csgo\0Counter-Strike\0");
        body.extend_from_slice(&730u16.to_le_bytes());
        body.extend_from_slice(&[3, 16, 0, b'd', b'l', 1, 1]);
        body.extend_from_slice(b"1.38.7.9\0");
        body
    }

    #[test]
    fn request_layout() {
        assert_eq!(
            encode_request(A2S_INFO, INFO_PAYLOAD),
            b"\xFF\xFF\xFF\xFFTSource Engine Query\0".to_vec()
        );
        assert_eq!(
            encode_request(A2S_PLAYER, NO_CHALLENGE),
            vec![0xFF, 0xFF, 0xFF, 0xFF, b'U', 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn decode_source() {
        let info = decode_info(INFO_SOURCE, &source_info_body()).unwrap();

        assert_eq!(info.name, "Arena");
        assert_eq!(info.map, "de_dust2");
        assert_eq!(info.game, "Counter-Strike");
        assert_eq!((info.players, info.max_players), (3, 16));
        assert!(info.has_password);
        assert!(info.vac_secured);
        assert_eq!(info.version.as_deref(), Some("1.38.7.9"));
    }

    #[test]
    fn decode_goldsrc() {
        let mut body = Vec::new();
        body.extend_from_slice(b"127.0.0.1:27015\0Old\0crossfire\0valve\0Half-Life\0");
        body.extend_from_slice(&[2, 8, 47, b'd', b'w', 0, 0, 1, 4]);

        let info = decode_info(INFO_GOLDSRC, &body).unwrap();

        assert_eq!(info.name, "Old");
        assert_eq!(info.version, None);
        assert!(info.vac_secured);
        assert_eq!(info.bots, 4);
    }

    #[test]
    fn decode_player_list() {
        let mut body = vec![2];
        body.push(0);
        body.extend_from_slice(b"Gordon\0");
        body.extend_from_slice(&12i32.to_le_bytes());
        body.extend_from_slice(&1.5f32.to_le_bytes());
        body.push(1);
        body.extend_from_slice(b"\0");
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(&0f32.to_le_bytes());

        let players = decode_players(PLAYER_REPLY, &body, false).unwrap();

        assert_eq!(players.len(), 2);
        assert_eq!(players[0].name, "Gordon");
        assert_eq!(players[0].score, 12);
        assert_eq!(players[1].name, "");
    }

    #[test]
    fn fragments_reassemble_in_order() {
        let payload = encode_request(INFO_SOURCE, &source_info_body());
        let (head, tail) = payload.split_at(10);
        let mut reassembly = Reassembly::default();

        assert_eq!(reassembly.push(&fragment(7, 2, 1, tail)).unwrap(), None);
        // Duplicate and foreign fragments are ignored.
        assert_eq!(reassembly.push(&fragment(7, 2, 1, tail)).unwrap(), None);
        assert_eq!(reassembly.push(&fragment(8, 2, 0, b"junk")).unwrap(), None);

        let whole = reassembly.push(&fragment(7, 2, 0, head)).unwrap().unwrap();
        assert_eq!(whole, payload);

        let (kind, body) = decode_packet(&whole).unwrap();
        assert_eq!(kind, INFO_SOURCE);
        assert_eq!(decode_info(kind, body).unwrap().name, "Arena");
    }

    #[test]
    fn compressed_fragments_are_rejected() {
        let mut reassembly = Reassembly::default();

        let err = reassembly
            .push(&fragment(0x8000_0001, 2, 0, b"x"))
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn unknown_reply_kinds() {
        assert!(decode_info(b'X', &[]).is_err());
        assert!(decode_players(INFO_SOURCE, &[0], false).is_err());
    }

    #[test]
    fn the_ship_players_carry_deaths_and_money() {
        let mut body = vec![2];
        for name in ["Jones", "Smith"] {
            body.push(0);
            body.extend_from_slice(name.as_bytes());
            body.push(0);
            body.extend_from_slice(&3i32.to_le_bytes());
            body.extend_from_slice(&90f32.to_le_bytes());
            body.extend_from_slice(&1i32.to_le_bytes());
            body.extend_from_slice(&500i32.to_le_bytes());
        }

        let players = decode_players(PLAYER_REPLY, &body, true).unwrap();

        assert_eq!(players.len(), 2);
        assert_eq!(players[1].name, "Smith");
        assert_eq!(players[1].score, 3);
        // Read as a plain list, the extra fields shift the second entry.
        let plain = decode_players(PLAYER_REPLY, &body, false)
            .ok()
            .map(|players| players[1].name.clone());
        assert_ne!(plain.as_deref(), Some("Smith"));
    }

    #[test]
    fn the_ship_info_is_detected() {
        let mut body = vec![17];
        body.extend_from_slice(b"Ship\0batavier\0ship\0The Ship\0");
        body.extend_from_slice(&THE_SHIP_APP_ID.to_le_bytes());
        body.extend_from_slice(&[1, 8, 0, b'd', b'w', 0, 1]);
        body.extend_from_slice(&[0, 4, 120]);
        body.extend_from_slice(b"1.0.0.4\0");

        let info = decode_info(INFO_SOURCE, &body).unwrap();

        assert!(info.is_the_ship());
        assert_eq!(info.version.as_deref(), Some("1.0.0.4"));
        assert!(!decode_info(INFO_SOURCE, &source_info_body())
            .unwrap()
            .is_the_ship());
    }

    #[test]
    fn fragment_with_another_total_is_rejected() {
        let mut reassembly = Reassembly::default();

        assert_eq!(reassembly.push(&fragment(7, 2, 0, b"head")).unwrap(), None);

        let err = reassembly.push(&fragment(7, 5, 4, b"tail")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }
}

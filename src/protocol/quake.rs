//! Quake `status` queries, shared by the three engine generations.

use super::{drive, parse_count, State, Target};
use crate::{
    conf::UdpDeadlines, info::TriBool, normalize::IntermediateFields, reader::ByteReader,
    transport::UdpTransport, GspErr,
};
use std::collections::HashMap;

const HEADER: &[u8] = &[0xFF; 4];

/// Engine generation, they differ in framing and player lines only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    One,
    Two,
    Three,
}

impl Generation {
    pub fn protocol(self) -> &'static str {
        match self {
            Generation::One => "quake1",
            Generation::Two => "quake2",
            Generation::Three => "quake3",
        }
    }

    fn request(self) -> &'static [u8] {
        match self {
            Generation::One | Generation::Two => b"status",
            Generation::Three => b"getstatus",
        }
    }

    fn response(self) -> &'static [u8] {
        match self {
            Generation::One => b"n",
            Generation::Two => b"print\n",
            Generation::Three => b"statusResponse\n",
        }
    }

    /// Quake 1: `id score time ping "name" "skin" top bottom`.
    /// Later: `score ping "name"`, Quake 2 may append `"address"`.
    fn parse_player(self, line: &str) -> Result<Player, GspErr> {
        let invalid = || GspErr::parse(self.protocol(), format!("invalid player line {:?}", line));
        let tokens = tokens(line);

        let (score, ping, name) = match (self, tokens.as_slice()) {
            (Generation::One, [_id, score, _time, ping, name, ..]) => (score, ping, name),
            (Generation::Two | Generation::Three, [score, ping, name, ..]) => (score, ping, name),
            _ => return Err(invalid()),
        };

        Ok(Player {
            name: name.to_string(),
            score: score.parse().map_err(|_| invalid())?,
            ping: ping.parse().map_err(|_| invalid())?,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Player {
    pub name: String,
    pub score: i32,
    pub ping: u16,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Status {
    pub values: HashMap<String, String>,
    pub players: Vec<Player>,
}

pub fn encode_request(generation: Generation) -> Vec<u8> {
    [HEADER, generation.request(), &[0x00]].concat()
}

/// Space separated tokens, a double quoted token may hold spaces.
fn tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut rest = line.trim();

    while !rest.is_empty() {
        let (token, tail) = match rest.strip_prefix('"') {
            Some(quoted) => quoted.split_once('"').unwrap_or((quoted, "")),
            None => rest.split_once(' ').unwrap_or((rest, "")),
        };

        tokens.push(token);
        rest = tail.trim_start();
    }

    tokens
}

/// `\key\value\key\value`, a dangling key is dropped.
fn parse_values(line: &str) -> HashMap<String, String> {
    let line = line.strip_prefix('\\').unwrap_or(line);
    let parts = line.split('\\').collect::<Vec<_>>();

    parts
        .chunks_exact(2)
        .map(|pair| (pair[0].to_string(), pair[1].to_string()))
        .collect()
}

pub fn decode_response(generation: Generation, bufs: &[u8]) -> Result<Status, GspErr> {
    let mut reader = ByteReader::create(generation.protocol(), bufs);

    reader.expect(HEADER, "header")?;
    reader.expect(generation.response(), "response header")?;

    let values = parse_values(&String::from_utf8_lossy(reader.read_until(b'\n')));
    let mut players = Vec::new();

    while !reader.is_empty() {
        let line = String::from_utf8_lossy(reader.read_until(b'\n'));
        let line = line.trim_end_matches('\0');

        if line.trim().is_empty() {
            continue;
        }

        players.push(generation.parse_player(line)?);
    }

    Ok(Status { values, players })
}

pub fn run(
    generation: Generation,
    target: &Target,
    deadlines: &UdpDeadlines,
) -> Result<IntermediateFields, GspErr> {
    let protocol = generation.protocol();

    drive(protocol, |machine| {
        let mut udp = UdpTransport::open(&target.addr, deadlines)?;

        udp.send(&encode_request(generation))?;
        machine.enter(State::RequestSent);

        let mut status = decode_response(generation, &udp.recv()?)?;
        machine.enter(State::ResponseReceived);

        let mut take = |keys: &[&str]| keys.iter().find_map(|key| status.values.remove(*key));

        let name = take(&["sv_hostname", "hostname"]);
        let map = take(&["mapname", "map"]);
        let version = take(&["version", "*version", "shortversion"]);
        let mode = take(&["gamename"]);
        let has_password = match take(&["g_needpass"]).as_deref().map(str::trim) {
            Some("1") => TriBool::True,
            Some("0") => TriBool::False,
            _ => TriBool::Unknown,
        };
        let max_players = take(&["sv_maxclients", "maxclients"])
            .map(|max| parse_count(protocol, "sv_maxclients", &max))
            .transpose()?;

        Ok(IntermediateFields {
            name,
            map,
            mode,
            version,
            has_password,
            max_players,
            current_players: Some(status.players.len() as u64),
            players: Some(status.players.into_iter().map(|p| Some(p.name)).collect()),
            ..Default::default()
        })
    })
}

use super::{drive, parse_count, State, Target};
use crate::{conf::HttpDeadlines, normalize::IntermediateFields, transport::HttpTransport, GspErr};
use serde::Deserialize;
use std::collections::HashMap;

pub const PROTOCOL: &str = "fivem";

/// FXServer sends counts as numbers or as strings depending on the field.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Count {
    Number(u64),
    Text(String),
}

impl Count {
    fn value(&self, field: &str) -> Result<u64, GspErr> {
        match self {
            Count::Number(value) => Ok(*value),
            Count::Text(text) => parse_count(PROTOCOL, field, text),
        }
    }
}

/// `/dynamic.json`
#[derive(Deserialize, Debug)]
pub struct Dynamic {
    pub hostname: Option<String>,
    pub clients: Option<Count>,
    pub sv_maxclients: Option<Count>,
    pub mapname: Option<String>,
    pub gametype: Option<String>,
}

/// `/info.json`
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Info {
    pub server: Option<String>,
    pub vars: HashMap<String, serde_json::Value>,
}

/// One entry of `/players.json`.
#[derive(Deserialize, Debug)]
pub struct Player {
    pub name: Option<String>,
}

pub fn run(target: &Target, deadlines: &HttpDeadlines) -> Result<IntermediateFields, GspErr> {
    drive(PROTOCOL, |machine| {
        let mut http = HttpTransport::create(PROTOCOL, &target.addr, deadlines);
        machine.enter(State::RequestSent);

        let dynamic = http.get_json::<Dynamic>("/dynamic.json")?;
        let info = http.get_json::<Info>("/info.json")?;
        let players = http.get_json::<Vec<Player>>("/players.json")?;
        machine.enter(State::ResponseReceived);

        into_fields(dynamic, info, players)
    })
}

fn into_fields(
    dynamic: Dynamic,
    mut info: Info,
    players: Vec<Player>,
) -> Result<IntermediateFields, GspErr> {
    Ok(IntermediateFields {
        name: dynamic.hostname,
        description: info
            .vars
            .remove("sv_projectDesc")
            .and_then(|desc| desc.as_str().map(String::from)),
        map: dynamic.mapname,
        mode: dynamic.gametype,
        version: info.server.take(),
        max_players: dynamic
            .sv_maxclients
            .map(|count| count.value("sv_maxclients"))
            .transpose()?,
        current_players: dynamic
            .clients
            .map(|count| count.value("clients"))
            .transpose()?,
        players: Some(players.into_iter().map(|p| p.name).collect()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn counts_accept_numbers_and_strings() {
        let dynamic: Dynamic = serde_json::from_str(
            r#"{"hostname": "RP City", "clients": 4, "sv_maxclients": "48", "mapname": "fivem-map-skater", "gametype": "Freeroam"}"#,
        )
        .unwrap();
        let info: Info = serde_json::from_str(
            r#"{"server": "FXServer-master SERVER v1.0.0.7290 win32", "vars": {"sv_projectDesc": "Roleplay"}, "resources": []}"#,
        )
        .unwrap();
        let players: Vec<Player> =
            serde_json::from_str(r#"[{"id": 1, "name": "Niko", "ping": 30}, {"id": 2, "name": "Roman"}]"#)
                .unwrap();

        let fields = into_fields(dynamic, info, players).unwrap();

        assert_eq!(fields.name.as_deref(), Some("RP City"));
        assert_eq!(fields.description.as_deref(), Some("Roleplay"));
        assert_eq!(fields.max_players, Some(48));
        assert_eq!(fields.current_players, Some(4));
        assert_eq!(
            fields.players,
            Some(vec![Some("Niko".into()), Some("Roman".into())])
        );
    }

    #[test]
    fn non_numeric_count_is_parse_error() {
        let dynamic: Dynamic =
            serde_json::from_str(r#"{"hostname": "x", "sv_maxclients": "many"}"#).unwrap();

        let err = into_fields(dynamic, Info::default(), vec![]).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ParseError);
    }
}

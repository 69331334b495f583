use crate::{
    info::{Player, ServerInfo, TriBool},
    GspErr,
};

/// Loosely typed fields produced by a protocol state machine.
///
/// Every field is optional, protocols fill in what they know.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IntermediateFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub map: Option<String>,
    pub mode: Option<String>,
    pub version: Option<String>,
    pub anti_cheat: TriBool,
    pub has_password: TriBool,
    pub max_players: Option<u64>,
    pub current_players: Option<u64>,
    /// Player names in server order. `None` if the protocol has no list.
    pub players: Option<Vec<Option<String>>>,
}

/// Entries past this are dropped, [Player::index] cannot address them.
const MAX_PLAYERS_LISTED: usize = u16::MAX as usize + 1;

fn saturate(n: u64) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Map protocol fields onto [ServerInfo].
pub fn normalize(fields: IntermediateFields) -> Result<ServerInfo, GspErr> {
    let name = fields
        .name
        .ok_or(GspErr::NormalizationErr { field: "name" })?;

    let players = fields.players.map(|names| {
        names
            .into_iter()
            .take(MAX_PLAYERS_LISTED)
            .enumerate()
            .map(|(index, name)| Player {
                index: index as u16,
                name,
            })
            .collect::<Vec<_>>()
    });

    let current_players = match (fields.current_players, &players) {
        (Some(n), _) => saturate(n),
        (None, Some(list)) => saturate(list.len() as u64),
        (None, None) => 0,
    };

    Ok(ServerInfo {
        name,
        description: fields.description,
        map: fields.map,
        mode: fields.mode,
        version: fields.version,
        anti_cheat: fields.anti_cheat,
        has_password: fields.has_password,
        max_players: fields.max_players.map_or(0, saturate),
        current_players,
        players,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn missing_name_is_an_error() {
        let err = normalize(IntermediateFields::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NormalizationError);
    }

    #[test]
    fn empty_name_is_still_a_name() {
        let info = normalize(IntermediateFields {
            name: Some(String::new()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(info.name, "");
        assert_eq!(info.description, None);
    }

    #[test]
    fn player_list_states_survive() {
        let base = IntermediateFields {
            name: Some("srv".into()),
            ..Default::default()
        };

        let absent = normalize(base.clone()).unwrap();
        let empty = normalize(IntermediateFields {
            players: Some(vec![]),
            ..base.clone()
        })
        .unwrap();

        assert_eq!(absent.players, None);
        assert_eq!(empty.players, Some(vec![]));
        assert_ne!(absent, empty);
    }

    #[test]
    fn players_are_indexed_and_counted() {
        let info = normalize(IntermediateFields {
            name: Some("srv".into()),
            players: Some(vec![Some("alice".into()), None]),
            has_password: TriBool::True,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(info.current_players, 2);
        assert_eq!(
            info.players.unwrap(),
            vec![
                Player {
                    index: 0,
                    name: Some("alice".into())
                },
                Player {
                    index: 1,
                    name: None
                },
            ]
        );
        assert_eq!(info.has_password, TriBool::True);
        assert_eq!(info.anti_cheat, TriBool::Unknown);
    }

    #[test]
    fn reported_count_wins_and_saturates() {
        let info = normalize(IntermediateFields {
            name: Some("srv".into()),
            current_players: Some(70_000),
            max_players: Some(16),
            players: Some(vec![]),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(info.current_players, u16::MAX);
        assert_eq!(info.max_players, 16);
    }

    #[test]
    fn oversized_list_is_capped_at_the_index_range() {
        let info = normalize(IntermediateFields {
            name: Some("crowded".into()),
            players: Some(vec![None; 70_000]),
            ..Default::default()
        })
        .unwrap();
        let players = info.players.unwrap();

        assert_eq!(players.len(), MAX_PLAYERS_LISTED);
        assert_eq!(players.last().map(|p| p.index), Some(u16::MAX));
        assert_eq!(info.current_players, u16::MAX);
    }
}

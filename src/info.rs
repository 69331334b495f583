use serde::{Deserialize, Serialize};

/// Three-valued flag.
///
/// `Unknown` means the protocol does not expose the flag at all, which is
/// not the same as `False`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriBool {
    True,
    False,
    #[default]
    Unknown,
}

impl TriBool {
    pub fn as_option(self) -> Option<bool> {
        match self {
            TriBool::True => Some(true),
            TriBool::False => Some(false),
            TriBool::Unknown => None,
        }
    }
}

impl From<bool> for TriBool {
    fn from(v: bool) -> Self {
        match v {
            true => TriBool::True,
            false => TriBool::False,
        }
    }
}

impl From<Option<bool>> for TriBool {
    fn from(v: Option<bool>) -> Self {
        v.map_or(TriBool::Unknown, TriBool::from)
    }
}

/// A player returned from a server query.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Position within the returned list. Not stable between queries.
    ///
    /// Lists are capped at `u16::MAX + 1` entries, one per index, the
    /// same range as the player counts.
    pub index: u16,
    /// Display name, `None` if the protocol did not provide one.
    pub name: Option<String>,
}

/// Uniform server info returned by every protocol.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server name. Always present.
    pub name: String,
    /// Server description or MOTD.
    pub description: Option<String>,
    /// Current map.
    pub map: Option<String>,
    /// Current game mode.
    pub mode: Option<String>,
    /// Server version string.
    pub version: Option<String>,
    /// Anti cheat status.
    pub anti_cheat: TriBool,
    /// Password requirement.
    pub has_password: TriBool,
    /// Maximum reported player capacity.
    pub max_players: u16,
    /// Current number of connected players.
    pub current_players: u16,
    /// Connected players.
    ///
    /// `None` if the protocol cannot list players, `Some(vec![])` if it can
    /// and nobody is connected.
    pub players: Option<Vec<Player>>,
}

impl std::fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            serde_json::to_string_pretty(self).map_err(|_| std::fmt::Error)?
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_bool_conversions() {
        assert_eq!(TriBool::from(true), TriBool::True);
        assert_eq!(TriBool::from(Some(false)), TriBool::False);
        assert_eq!(TriBool::from(None), TriBool::Unknown);
        assert_eq!(TriBool::Unknown.as_option(), None);
        assert_eq!(TriBool::default(), TriBool::Unknown);
    }

    #[test]
    fn empty_and_absent_players_serialize_differently() {
        let mut info = ServerInfo {
            name: "Arena".into(),
            description: None,
            map: None,
            mode: None,
            version: None,
            anti_cheat: TriBool::Unknown,
            has_password: TriBool::False,
            max_players: 16,
            current_players: 0,
            players: None,
        };
        let absent = serde_json::to_value(&info).unwrap();

        info.players = Some(vec![]);
        let empty = serde_json::to_value(&info).unwrap();

        assert_eq!(absent["players"], serde_json::Value::Null);
        assert_eq!(empty["players"], serde_json::json!([]));
        assert_eq!(absent["anti_cheat"], "unknown");
        assert_eq!(absent["has_password"], "false");
    }
}

use crate::{protocol::Protocol, transport::TransportKind, GspErr};
use serde::Serialize;

/// Static description of one queryable game.
#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct ProtocolDescriptor {
    /// Canonical game id.
    pub id: &'static str,
    /// Human readable name.
    pub name: &'static str,
    /// Other ids resolving to this entry.
    pub aliases: &'static [&'static str],
    pub protocol: Protocol,
    /// Port used when the address has none.
    pub default_port: u16,
}

impl ProtocolDescriptor {
    pub fn transport(&self) -> TransportKind {
        self.protocol.transport()
    }

    fn matches(&self, game_id: &str) -> bool {
        self.id == game_id || self.aliases.iter().any(|alias| *alias == game_id)
    }
}

const fn game(
    id: &'static str,
    name: &'static str,
    aliases: &'static [&'static str],
    protocol: Protocol,
    default_port: u16,
) -> ProtocolDescriptor {
    ProtocolDescriptor {
        id,
        name,
        aliases,
        protocol,
        default_port,
    }
}

static GAMES: &[ProtocolDescriptor] = &[
    game("minecraft", "Minecraft: Java Edition", &["mc", "minecraft_java"], Protocol::MinecraftJava, 25565),
    game("minecraft_legacy", "Minecraft: Java Edition 1.4 - 1.6", &["mc_legacy"], Protocol::MinecraftLegacy, 25565),
    game("minecraft_beta", "Minecraft: Java Edition Beta 1.8 - 1.3", &["mc_beta"], Protocol::MinecraftBeta, 25565),
    game("minecraft_bedrock", "Minecraft: Bedrock Edition", &["mcbe"], Protocol::MinecraftBedrock, 19132),
    game("minecraft_query", "Minecraft: Java Edition (Query)", &["mc_query"], Protocol::MinecraftQuery, 25565),
    game("valve", "Source Engine", &["source"], Protocol::Valve, 27015),
    game("teamfortress2", "Team Fortress 2", &["tf2"], Protocol::Valve, 27015),
    game("counterstrike2", "Counter-Strike 2", &["cs2", "csgo"], Protocol::Valve, 27015),
    game("garrysmod", "Garry's Mod", &["gmod"], Protocol::Valve, 27015),
    game("left4dead2", "Left 4 Dead 2", &["l4d2"], Protocol::Valve, 27015),
    game("rust", "Rust", &[], Protocol::Valve, 28015),
    game("quake1", "Quake", &["quakeworld"], Protocol::Quake1, 27500),
    game("quake2", "Quake II", &[], Protocol::Quake2, 27910),
    game("quake3", "Quake III Arena", &["q3a"], Protocol::Quake3, 27960),
    game("fivem", "FiveM", &["gta5f"], Protocol::FiveM, 30120),
];

/// Every registered game, in registration order.
pub fn games() -> &'static [ProtocolDescriptor] {
    GAMES
}

/// Look up a game by id or alias. Matching is exact.
///
/// # Example
///
/// ```
/// # use gsp::{resolve, Protocol};
/// #
/// assert_eq!(resolve("tf2").unwrap().protocol, Protocol::Valve);
/// assert!(resolve("TF2").is_err());
/// ```
pub fn resolve(game_id: &str) -> Result<&'static ProtocolDescriptor, GspErr> {
    GAMES
        .iter()
        .find(|descriptor| descriptor.matches(game_id))
        .ok_or_else(|| GspErr::UnknownGame(game_id.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::collections::HashSet;

    #[test]
    fn aliases_resolve_to_the_same_descriptor() {
        let by_id = resolve("counterstrike2").unwrap();

        assert!(std::ptr::eq(by_id, resolve("cs2").unwrap()));
        assert!(std::ptr::eq(by_id, resolve("csgo").unwrap()));
        assert_eq!(resolve("rust").unwrap().default_port, 28015);
        assert_eq!(resolve("quakeworld").unwrap().protocol, Protocol::Quake1);
        assert_eq!(resolve("quake2").unwrap().default_port, 27910);
    }

    #[test]
    fn ids_and_aliases_are_unique() {
        let mut seen = HashSet::new();

        for descriptor in games() {
            assert!(seen.insert(descriptor.id), "duplicate {}", descriptor.id);
            for alias in descriptor.aliases {
                assert!(seen.insert(*alias), "duplicate {}", alias);
            }
        }
    }

    #[test]
    fn unknown_games() {
        for game_id in ["", "not-a-real-game", "Minecraft", " minecraft"] {
            let err = resolve(game_id).unwrap_err();

            assert_eq!(err.kind(), ErrorKind::UnknownGame);
        }
    }

    #[test]
    fn transports_follow_protocols() {
        assert_eq!(resolve("mc").unwrap().transport(), TransportKind::Tcp);
        assert_eq!(resolve("mcbe").unwrap().transport(), TransportKind::Udp);
        assert_eq!(resolve("fivem").unwrap().transport(), TransportKind::Http);
    }
}

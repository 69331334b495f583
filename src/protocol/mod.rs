mod fivem;
mod minecraft_bedrock;
mod minecraft_java;
mod minecraft_legacy;
mod minecraft_query;
mod quake;
mod valve;

use crate::{
    conf::ResolvedTimeouts, normalize::IntermediateFields, transport::TransportKind, GspErr,
};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::debug;

/// Wire protocols known to the engine.
///
/// Closed set, dispatched with a flat `match` in [Protocol::run].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Java Edition Server List Ping, 1.7 and above.
    MinecraftJava,
    /// Java Edition 1.4 to 1.6 ping.
    MinecraftLegacy,
    /// Java Edition beta 1.8 to 1.3 ping.
    MinecraftBeta,
    /// Bedrock Edition RakNet unconnected ping.
    MinecraftBedrock,
    /// Java Edition GameSpy4 query, full stat.
    MinecraftQuery,
    /// Valve A2S_INFO and A2S_PLAYER.
    Valve,
    /// QuakeWorld `status`.
    Quake1,
    /// Quake 2 `status`.
    Quake2,
    /// Quake 3 `getstatus`.
    Quake3,
    /// FiveM HTTP endpoints.
    FiveM,
}

/// Where a query goes.
#[derive(Debug, Clone)]
pub struct Target {
    /// Resolved socket address.
    pub addr: SocketAddr,
    /// Host as written by the caller, some handshakes echo it.
    pub host: String,
}

/// Common shape every protocol state machine follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Challenge,
    RequestSent,
    ResponseReceived,
    Done,
    Failed,
}

/// Tracks the state of one protocol run.
pub struct Machine {
    protocol: &'static str,
    state: State,
    failed_in: Option<State>,
}

impl Machine {
    fn create(protocol: &'static str) -> Self {
        Self {
            protocol,
            state: State::Init,
            failed_in: None,
        }
    }

    pub fn enter(&mut self, next: State) {
        debug!(protocol = self.protocol, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    fn fail(&mut self, err: &GspErr) {
        // Only the first failure is reported, later ones are symptoms.
        if self.failed_in.is_none() {
            debug!(protocol = self.protocol, state = ?self.state, error = %err, "query failed");
            self.failed_in = Some(self.state);
            self.state = State::Failed;
        }
    }
}

/// Run `rounds` as one state machine.
///
/// The first error ends the run and is returned unchanged.
pub(crate) fn drive<T>(
    protocol: &'static str,
    rounds: impl FnOnce(&mut Machine) -> Result<T, GspErr>,
) -> Result<T, GspErr> {
    let mut machine = Machine::create(protocol);

    match rounds(&mut machine) {
        Ok(value) => {
            machine.enter(State::Done);
            Ok(value)
        }
        Err(err) => {
            machine.fail(&err);
            Err(err)
        }
    }
}

impl Protocol {
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::MinecraftJava => minecraft_java::PROTOCOL,
            Protocol::MinecraftLegacy => minecraft_legacy::LEGACY_PROTOCOL,
            Protocol::MinecraftBeta => minecraft_legacy::BETA_PROTOCOL,
            Protocol::MinecraftBedrock => minecraft_bedrock::PROTOCOL,
            Protocol::MinecraftQuery => minecraft_query::PROTOCOL,
            Protocol::Valve => valve::PROTOCOL,
            Protocol::Quake1 => quake::Generation::One.protocol(),
            Protocol::Quake2 => quake::Generation::Two.protocol(),
            Protocol::Quake3 => quake::Generation::Three.protocol(),
            Protocol::FiveM => fivem::PROTOCOL,
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Protocol::MinecraftJava | Protocol::MinecraftLegacy | Protocol::MinecraftBeta => {
                TransportKind::Tcp
            }
            Protocol::MinecraftBedrock
            | Protocol::MinecraftQuery
            | Protocol::Valve
            | Protocol::Quake1
            | Protocol::Quake2
            | Protocol::Quake3 => TransportKind::Udp,
            Protocol::FiveM => TransportKind::Http,
        }
    }

    /// Run every round of the protocol against `target`.
    pub(crate) fn run(
        &self,
        target: &Target,
        timeouts: &ResolvedTimeouts,
    ) -> Result<IntermediateFields, GspErr> {
        match self {
            Protocol::MinecraftJava => minecraft_java::run(target, &timeouts.tcp),
            Protocol::MinecraftLegacy => minecraft_legacy::run_legacy(target, &timeouts.tcp),
            Protocol::MinecraftBeta => minecraft_legacy::run_beta(target, &timeouts.tcp),
            Protocol::MinecraftBedrock => minecraft_bedrock::run(target, &timeouts.udp),
            Protocol::MinecraftQuery => minecraft_query::run(target, &timeouts.udp),
            Protocol::Valve => valve::run(target, &timeouts.udp),
            Protocol::Quake1 => quake::run(quake::Generation::One, target, &timeouts.udp),
            Protocol::Quake2 => quake::run(quake::Generation::Two, target, &timeouts.udp),
            Protocol::Quake3 => quake::run(quake::Generation::Three, target, &timeouts.udp),
            Protocol::FiveM => fivem::run(target, &timeouts.http),
        }
    }
}

/// Parse a decimal count, naming the field on failure.
pub(crate) fn parse_count(protocol: &'static str, field: &str, value: &str) -> Result<u64, GspErr> {
    value.trim().parse::<u64>().map_err(|_| {
        GspErr::parse(
            protocol,
            format!("field `{}` is not a count: {:?}", field, value),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_reports_first_error_and_state() {
        let mut seen = None;

        let err = drive::<()>("test", |machine| {
            machine.enter(State::RequestSent);
            let first = Err(GspErr::parse("test", "first"));
            seen = Some(machine.state);
            first
        })
        .unwrap_err();

        assert_eq!(seen, Some(State::RequestSent));
        assert_eq!(err.to_string(), "test: malformed response, first");
    }

    #[test]
    fn machine_keeps_first_failure() {
        let mut machine = Machine::create("test");

        machine.enter(State::Challenge);
        machine.fail(&GspErr::parse("test", "cause"));
        machine.enter(State::ResponseReceived);
        machine.fail(&GspErr::parse("test", "symptom"));

        assert_eq!(machine.failed_in, Some(State::Challenge));
    }

    #[test]
    fn transports_match_protocols() {
        assert_eq!(Protocol::MinecraftJava.transport(), TransportKind::Tcp);
        assert_eq!(Protocol::Valve.transport(), TransportKind::Udp);
        assert_eq!(Protocol::FiveM.transport(), TransportKind::Http);
        assert_eq!(Protocol::Quake1.transport(), TransportKind::Udp);
    }

    #[test]
    fn quake_generations_have_their_own_names() {
        assert_eq!(Protocol::Quake1.name(), "quake1");
        assert_eq!(Protocol::Quake2.name(), "quake2");
        assert_eq!(Protocol::Quake3.name(), "quake3");
    }

    #[test]
    fn counts_must_be_numeric() {
        assert_eq!(parse_count("t", "max", " 16 ").unwrap(), 16);
        assert!(parse_count("t", "max", "lots").is_err());
    }
}

//! Query game servers over their native status protocols.
//!
//! A query names a game (`"minecraft"`, `"tf2"`, `"fivem"`, ...) and an
//! address, and yields one normalized [ServerInfo] whatever protocol the
//! game speaks.
//!
//! ```no_run
//! # use gsp::GspErr;
//! #
//! # fn main() -> Result<(), GspErr> {
//!     let info = gsp::query("minecraft", "mc.example.com", None)?;
//!
//!     println!("{} ({}/{})", info.name, info.current_players, info.max_players);
//! #   Ok(())
//! # }
//! ```

mod conf;
mod error;
mod info;
mod normalize;
mod protocol;
mod reader;
mod registry;
mod transport;
mod varint;

pub use conf::{
    Address, HttpDeadlines, HttpTimeout, QueryRequest, ResolvedTimeouts, TcpDeadlines, TcpTimeout,
    TimeoutConfig, UdpDeadlines, UdpTimeout, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_SOCKET_TIMEOUT_MS,
};
pub use error::{ErrorKind, GspErr};
pub use info::{Player, ServerInfo, TriBool};
pub use normalize::{normalize, IntermediateFields};
pub use protocol::Protocol;
pub use registry::{games, resolve, ProtocolDescriptor};
pub use transport::TransportKind;

use protocol::Target;
use tracing::{debug, info_span};

/// Query `address` as a server of `game_id`.
///
/// The game is looked up before anything touches the network, so an
/// unknown id fails without I/O. `timeout` of `None` uses the defaults.
///
/// # Example
///
/// ```
/// # use gsp::ErrorKind;
/// #
/// let err = gsp::query("not-a-real-game", "127.0.0.1:1", None).unwrap_err();
///
/// assert_eq!(err.kind(), ErrorKind::UnknownGame);
/// ```
pub fn query(
    game_id: &str,
    address: &str,
    timeout: Option<&TimeoutConfig>,
) -> Result<ServerInfo, GspErr> {
    let descriptor = registry::resolve(game_id)?;
    let address = Address::parse(address)?;

    run_query(descriptor, &address, &timeout.copied().unwrap_or_default())
}

pub(crate) fn run_query(
    descriptor: &'static ProtocolDescriptor,
    address: &Address,
    timeout: &TimeoutConfig,
) -> Result<ServerInfo, GspErr> {
    let span = info_span!("query", game = descriptor.id, %address);
    let _enter = span.enter();

    let timeouts = timeout.resolve();
    let addr = address.resolve(
        descriptor.default_port,
        timeouts.lookup(descriptor.transport()),
    )?;
    let target = Target {
        addr,
        host: address.host.clone(),
    };

    debug!(%addr, protocol = descriptor.protocol.name(), "running query");

    normalize(descriptor.protocol.run(&target, &timeouts)?)
}
